pub mod buffer;
pub mod capture;
pub mod source;

pub use buffer::{ChannelBuffers, SampleBlock};
pub use capture::AudioCapture;
pub use source::{DeviceSource, SampleSource, WavFileSource};
