/// Majority-vote debounce over the most recent raw presence samples.
///
/// Every slot starts out `false`, so a fresh stabilizer needs a strict majority
/// of `true` samples before it reports presence.
#[derive(Debug, Clone)]
pub struct PresenceStabilizer {
    window: Vec<bool>,
    cursor: usize,
}

pub const DEFAULT_WINDOW_SIZE: usize = 5;

impl Default for PresenceStabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl PresenceStabilizer {
    /// A zero-sized window is bumped to one slot.
    pub fn new(window_size: usize) -> Self {
        Self {
            window: vec![false; window_size.max(1)],
            cursor: 0,
        }
    }

    /// Records `raw` over the oldest slot and returns the stabilized verdict.
    pub fn update(&mut self, raw: bool) -> bool {
        self.window[self.cursor] = raw;
        self.cursor = (self.cursor + 1) % self.window.len();
        self.verdict()
    }

    /// Strict majority: ties resolve to "not present".
    pub fn verdict(&self) -> bool {
        let present = self.window.iter().filter(|sample| **sample).count();
        present > self.window.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(window: usize, samples: &[bool]) -> Vec<bool> {
        let mut stabilizer = PresenceStabilizer::new(window);
        samples.iter().map(|raw| stabilizer.update(*raw)).collect()
    }

    #[test]
    fn needs_strict_majority_from_cold_start() {
        let outputs = run(5, &[true, true, true, true]);
        assert_eq!(outputs, vec![false, false, true, true]);
    }

    #[test]
    fn tie_resolves_to_not_present() {
        let mut stabilizer = PresenceStabilizer::new(4);
        stabilizer.update(true);
        stabilizer.update(true);
        stabilizer.update(false);
        assert!(!stabilizer.update(false));
    }

    #[test]
    fn oldest_sample_is_overwritten() {
        let mut stabilizer = PresenceStabilizer::new(3);
        assert!(!stabilizer.update(true));
        assert!(stabilizer.update(true));
        assert!(stabilizer.update(false));
        // Overwrites the first `true`.
        assert!(!stabilizer.update(false));
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let samples = [
            true, false, true, true, false, false, false, true, true, true, false, true,
        ];
        assert_eq!(run(5, &samples), run(5, &samples));
        assert_eq!(run(4, &samples), run(4, &samples));
    }

    #[test]
    fn single_flicker_is_absorbed() {
        let outputs = run(5, &[true, true, true, true, true, false, true, true]);
        assert!(outputs[4..].iter().all(|present| *present));
    }

    #[test]
    fn zero_window_behaves_as_single_slot() {
        assert_eq!(run(0, &[true, false, true]), vec![true, false, true]);
    }
}
