use thiserror::Error;

use crate::stream::StreamId;

#[derive(Error, Debug)]
pub enum CrossingError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Unknown stream {0}")]
    UnknownStream(StreamId),

    #[error("Channel {channel} out of range for stream {stream} ({available} channels)")]
    ChannelOutOfRange {
        stream: StreamId,
        channel: usize,
        available: usize,
    },

    #[error("Threshold channel {0} is the input channel")]
    ThresholdChannelIsInput(usize),

    #[error(
        "Threshold channel {threshold} (device {threshold_device}) is not on the input channel's device {input_device}"
    )]
    ThresholdChannelDevice {
        threshold: usize,
        threshold_device: u16,
        input_device: u16,
    },

    #[error("No threshold channel selected for stream {0}")]
    NoThresholdChannel(StreamId),

    #[error("Event channel {channel} out of range (max {max})")]
    EventChannelOutOfRange { channel: u8, max: u8 },

    #[error("No event channel assigned for stream {0}")]
    NoEventChannel(StreamId),

    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Buffer channels have unequal lengths: {expected} vs {found}")]
    RaggedBuffer { expected: usize, found: usize },

    #[error("History buffer must be empty before resizing ({0} samples held)")]
    HistoryNotEmpty(usize),

    #[error("Acquisition is not running")]
    NotAcquiring,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CrossingError>;
