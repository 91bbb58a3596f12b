use serde::Serialize;

use super::{EventOutput, Formatter, iso8601_timestamp};
use crate::event::CrossingEvent;

pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: String,
    seconds: f64,
    #[serde(flatten)]
    event: &'a CrossingEvent,
}

impl Formatter for JsonFormatter {
    fn format(&self, output: &EventOutput<'_>) -> String {
        let line = JsonLine {
            ts: iso8601_timestamp(),
            seconds: output.seconds(),
            event: output.event,
        };
        serde_json::to_string(&line).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }
}
