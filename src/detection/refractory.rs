/// Jump-limit artifact rejection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpLimit {
    /// Minimum `|post - pre|` treated as an artifact
    pub limit: f32,
    /// Evaluated candidates kept silent after an artifact
    pub sleep: usize,
}

/// Decides whether a candidate crossing is allowed to trigger
///
/// Combines three inhibitions:
/// - timeout: no trigger before `samp_to_reenable`, an index relative to the
///   start of the buffer being processed
/// - buffer-end mask: only candidates within a number of samples of the buffer
///   end may trigger, so event latency relative to the buffer end stays bounded
/// - jump limit: a large step across the crossing is an artifact and silences
///   the next `sleep` evaluated candidates as well
#[derive(Debug, Clone)]
pub struct RefractoryController {
    samp_to_reenable: i64,
    sleep_remaining: usize,
}

impl RefractoryController {
    pub fn new(holdoff: i64) -> Self {
        Self {
            samp_to_reenable: holdoff,
            sleep_remaining: 0,
        }
    }

    /// Inhibit candidates before `holdoff` and clear any jump-limit sleep
    pub fn reset(&mut self, holdoff: i64) {
        self.samp_to_reenable = holdoff;
        self.sleep_remaining = 0;
    }

    pub fn samp_to_reenable(&self) -> i64 {
        self.samp_to_reenable
    }

    /// Candidates left to suppress after the last artifact
    pub fn sleep_remaining(&self) -> usize {
        self.sleep_remaining
    }

    /// Timeout and buffer-end mask check, free of side effects
    pub fn may_trigger(&self, ind_cross: i64, buffer_len: usize, end_mask: Option<usize>) -> bool {
        if ind_cross < self.samp_to_reenable {
            return false;
        }
        match end_mask {
            Some(mask) => buffer_len as i64 - ind_cross <= mask as i64,
            None => true,
        }
    }

    /// Jump-limit gate for one evaluated candidate
    ///
    /// Returns `true` when the candidate must be suppressed. A jump restarts
    /// the sleep; otherwise a running sleep counts down by one.
    pub fn jump_suppressed(&mut self, pre_val: f32, post_val: f32, jump: Option<JumpLimit>) -> bool {
        if let Some(jump) = jump
            && (post_val - pre_val).abs() >= jump.limit
        {
            self.sleep_remaining = jump.sleep;
            return true;
        }
        if self.sleep_remaining > 0 {
            self.sleep_remaining -= 1;
            return true;
        }
        false
    }

    /// Start the timeout after a trigger at `ind_cross`
    pub fn on_trigger(&mut self, ind_cross: i64, timeout_samples: usize) {
        self.samp_to_reenable = ind_cross + 1 + timeout_samples as i64;
    }

    /// Make `samp_to_reenable` relative to the next buffer
    ///
    /// `floor` is the earliest candidate index of the next buffer
    /// (`-future_span`); anything below it inhibits nothing.
    pub fn rebase(&mut self, buffer_len: usize, floor: i64) {
        self.samp_to_reenable = (self.samp_to_reenable - buffer_len as i64).max(floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_blocks_until_reenable() {
        let mut refractory = RefractoryController::new(0);
        assert!(refractory.may_trigger(0, 100, None));

        refractory.on_trigger(10, 5);
        assert_eq!(refractory.samp_to_reenable(), 16);
        for j in 10..16 {
            assert!(!refractory.may_trigger(j, 100, None));
        }
        assert!(refractory.may_trigger(16, 100, None));
    }

    #[test]
    fn test_rebase_subtracts_buffer_length() {
        let mut refractory = RefractoryController::new(0);
        refractory.on_trigger(90, 30);
        refractory.rebase(100, 0);
        assert_eq!(refractory.samp_to_reenable(), 21);

        refractory.rebase(100, 0);
        assert_eq!(refractory.samp_to_reenable(), 0);

        refractory.on_trigger(95, 0);
        refractory.rebase(100, -3);
        assert_eq!(refractory.samp_to_reenable(), -3);
    }

    #[test]
    fn test_buffer_end_mask() {
        let refractory = RefractoryController::new(0);
        assert!(!refractory.may_trigger(50, 100, Some(3)));
        assert!(!refractory.may_trigger(96, 100, Some(3)));
        assert!(refractory.may_trigger(97, 100, Some(3)));
        assert!(refractory.may_trigger(99, 100, Some(3)));
        assert!(refractory.may_trigger(50, 100, None));
    }

    #[test]
    fn test_jump_sleep_counts_candidates() {
        let mut refractory = RefractoryController::new(0);
        let jump = Some(JumpLimit {
            limit: 5.0,
            sleep: 2,
        });

        assert!(refractory.jump_suppressed(-5.0, 5.0, jump));
        assert!(refractory.jump_suppressed(0.0, 0.1, jump));
        assert!(refractory.jump_suppressed(0.0, 0.1, jump));
        assert!(!refractory.jump_suppressed(0.0, 0.1, jump));
        assert!(!refractory.jump_suppressed(0.0, 4.9, jump));
    }

    #[test]
    fn test_jump_limit_disabled() {
        let mut refractory = RefractoryController::new(0);
        assert!(!refractory.jump_suppressed(-50.0, 50.0, None));
    }

    #[test]
    fn test_reset_clears_sleep() {
        let mut refractory = RefractoryController::new(0);
        let jump = Some(JumpLimit {
            limit: 1.0,
            sleep: 100,
        });
        assert!(refractory.jump_suppressed(0.0, 2.0, jump));
        refractory.reset(3);
        assert_eq!(refractory.sleep_remaining(), 0);
        assert_eq!(refractory.samp_to_reenable(), 3);
        assert!(!refractory.jump_suppressed(0.0, 0.5, jump));
    }
}
