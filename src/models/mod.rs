pub mod session;

pub use session::{EndReason, SessionRecord};
