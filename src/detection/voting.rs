use crate::event::Direction;

/// Running counts of above-threshold samples around a candidate crossing
///
/// For a candidate at `ind_cross` (crossing between `ind_cross - 1` and
/// `ind_cross`), the past window covers `ind_cross - 1 - past_span ..= ind_cross - 2`
/// and the future window `ind_cross + 1 ..= ind_cross + future_span`. The two
/// samples adjacent to the crossing are tested separately by the engine.
///
/// Each [`advance`](Self::advance) slides both windows by one sample, so the
/// counts are maintained in O(1) per sample.
#[derive(Debug, Clone, Default)]
pub struct VotingWindow {
    past_span: usize,
    future_span: usize,
    past_above: usize,
    future_above: usize,
}

impl VotingWindow {
    pub fn new(past_span: usize, future_span: usize) -> Self {
        Self {
            past_span,
            future_span,
            past_above: 0,
            future_above: 0,
        }
    }

    pub fn past_span(&self) -> usize {
        self.past_span
    }

    pub fn future_span(&self) -> usize {
        self.future_span
    }

    pub fn past_above(&self) -> usize {
        self.past_above
    }

    pub fn future_above(&self) -> usize {
        self.future_above
    }

    /// Zero both counters
    pub fn reset(&mut self) {
        self.past_above = 0;
        self.future_above = 0;
    }

    /// Slide the windows so they surround `ind_cross`
    ///
    /// `is_above(index)` reports whether the sample at a buffer-relative
    /// index was above its threshold; samples with no data count as not above.
    pub fn advance<F>(&mut self, ind_cross: i64, is_above: F)
    where
        F: Fn(i64) -> bool,
    {
        if self.past_span > 0 {
            if is_above(ind_cross - 2 - self.past_span as i64) {
                debug_assert!(self.past_above > 0, "past count underflow");
                self.past_above = self.past_above.saturating_sub(1);
            }
            if is_above(ind_cross - 2) {
                self.past_above += 1;
            }
        }

        if self.future_span > 0 {
            if is_above(ind_cross) {
                debug_assert!(self.future_above > 0, "future count underflow");
                self.future_above = self.future_above.saturating_sub(1);
            }
            if is_above(ind_cross + self.future_span as i64) {
                self.future_above += 1;
            }
        }
    }

    /// Whether enough of the past window is on the pre-crossing side
    pub fn past_agrees(&self, direction: Direction, needed: usize) -> bool {
        let agreeing = match direction {
            Direction::Rising => self.past_span - self.past_above,
            Direction::Falling => self.past_above,
        };
        agreeing >= needed
    }

    /// Whether enough of the future window is on the post-crossing side
    pub fn future_agrees(&self, direction: Direction, needed: usize) -> bool {
        let agreeing = match direction {
            Direction::Rising => self.future_above,
            Direction::Falling => self.future_span - self.future_above,
        };
        agreeing >= needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn above_in(signal: &[f32], threshold: f32) -> impl Fn(i64) -> bool + '_ {
        move |index| {
            usize::try_from(index)
                .ok()
                .and_then(|i| signal.get(i))
                .is_some_and(|&v| v > threshold)
        }
    }

    #[test]
    fn test_counts_follow_sliding_windows() {
        let signal = [0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0];
        let (past, future) = (3, 2);
        let mut window = VotingWindow::new(past, future);

        for i in 0..signal.len() as i64 {
            let ind_cross = i - future as i64;
            window.advance(ind_cross, above_in(&signal, 0.5));

            let count = |range: std::ops::RangeInclusive<i64>| {
                range.filter(|&j| above_in(&signal, 0.5)(j)).count()
            };
            assert_eq!(
                window.past_above(),
                count(ind_cross - 1 - past as i64..=ind_cross - 2),
                "past count at i={}",
                i
            );
            assert_eq!(
                window.future_above(),
                count(ind_cross + 1..=ind_cross + future as i64),
                "future count at i={}",
                i
            );
            assert!(window.past_above() <= past);
            assert!(window.future_above() <= future);
        }
    }

    #[test]
    fn test_zero_spans_always_agree() {
        let window = VotingWindow::new(0, 0);
        for direction in [Direction::Rising, Direction::Falling] {
            assert!(window.past_agrees(direction, 0));
            assert!(window.future_agrees(direction, 0));
        }
    }

    #[test]
    fn test_agreement_by_direction() {
        let mut window = VotingWindow::new(4, 4);
        // past window all below, future window all above
        let signal = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        for i in 0..signal.len() as i64 {
            window.advance(i - 4, above_in(&signal, 0.5));
        }
        assert_eq!(window.past_above(), 0);
        assert_eq!(window.future_above(), 4);

        assert!(window.past_agrees(Direction::Rising, 4));
        assert!(window.future_agrees(Direction::Rising, 4));
        assert!(!window.past_agrees(Direction::Falling, 1));
        assert!(!window.future_agrees(Direction::Falling, 1));
    }

    #[test]
    fn test_reset_zeroes_counts() {
        let mut window = VotingWindow::new(2, 2);
        let signal = [1.0; 8];
        for i in 0..signal.len() as i64 {
            window.advance(i - 2, above_in(&signal, 0.0));
        }
        assert!(window.past_above() > 0);
        window.reset();
        assert_eq!(window.past_above(), 0);
        assert_eq!(window.future_above(), 0);
    }
}
