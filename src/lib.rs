pub mod audio;
pub mod config;
pub mod constants;
pub mod detection;
pub mod error;
pub mod event;
pub mod output;
pub mod processing;
pub mod stream;
pub mod wav;

#[cfg(feature = "simulation")]
pub mod simulation;

pub use config::{DetectorConfig, ParameterUpdate, ThresholdMode};
pub use error::{CrossingError, Result};
pub use event::{CrossingEvent, Direction, EmittedEvent, EventKind, EventSink, FnSink};
pub use processing::CrossingDetector;
pub use stream::{ChannelInfo, StreamBuffer, StreamId, StreamInfo};
pub use wav::save_wav;
