pub mod clock;
pub mod controller;
pub mod machine;
pub mod recorder;
pub mod state;

pub use clock::{focus_score_percent, SessionClock};
pub use controller::{Collaborators, SessionConfig, SessionController, SessionNotice};
pub use machine::{AttentionStateMachine, Effect, MachineConfig};
pub use recorder::SessionRecorder;
pub use state::{SessionSnapshot, SessionState, SessionStatus};
