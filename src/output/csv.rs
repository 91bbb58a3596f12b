use super::{EventOutput, Formatter, iso8601_timestamp};
use crate::event::{Direction, EventKind};

pub struct CsvFormatter;

impl Formatter for CsvFormatter {
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
        format!(
            "{},{:.6},{},{},{},{},{},{},{:.4},{:.4}",
            iso8601_timestamp(),
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
    }

    fn header(&self) -> Option<&'static str> {
        Some(
            "ts,seconds,stream,event_channel,kind,direction,sample,crossing_point,level,threshold",
        )
    }
}
