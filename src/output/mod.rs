mod csv;
mod json;
mod text;

use chrono::Utc;

use crate::event::CrossingEvent;

pub use self::csv::CsvFormatter;
pub use self::json::JsonFormatter;
pub use self::text::TextFormatter;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// An event with what is needed to place it in time
pub struct EventOutput<'a> {
    pub event: &'a CrossingEvent,
    pub sample_rate: f32,
}

impl EventOutput<'_> {
    /// Seconds since the start of acquisition at which the event takes effect
    pub fn seconds(&self) -> f64 {
        self.event.sample_number as f64 / self.sample_rate as f64
    }
}

pub trait Formatter: Send {
    fn format(&self, output: &EventOutput<'_>) -> String;

    fn header(&self) -> Option<&'static str> {
        None
    }
}

pub fn create_formatter(format: OutputFormat, verbose: bool) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(verbose)),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn iso8601_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
