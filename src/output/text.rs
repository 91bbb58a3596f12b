use super::{EventOutput, Formatter};
use crate::event::{Direction, EventKind};

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, output: &EventOutput<'_>) -> String {
        let event = output.event;
        let kind = match event.kind {
            EventKind::Onset => "onset",
            EventKind::Offset => "offset",
        };
        let direction = match event.direction {
            Direction::Rising => "rising",
            Direction::Falling => "falling",
        };
        if self.verbose {
            format!(
                "{:>10.4}s stream {} ch {:>2} {:<6} {:<7} sample {} (crossing {}, level {:.3}, threshold {:.3})",
                output.seconds(),
                event.stream_id,
                event.event_channel,
                kind,
                direction,
                event.sample_number,
                event.crossing_point,
                event.crossing_level,
                event.threshold
            )
        } else {
            format!(
                "{:>10.4}s stream {} ch {:>2} {:<6} {}",
                output.seconds(),
                event.stream_id,
                event.event_channel,
                kind,
                direction
            )
        }
    }
}
