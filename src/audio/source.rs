use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crossbeam_channel::Receiver;
use hound::WavReader;

use super::{AudioCapture, SampleBlock};
use crate::config::AudioConfig;

/// Producer of interleaved sample blocks
pub trait SampleSource: Send {
    /// Next interleaved block, or `None` once the source is exhausted
    fn next_buffer(&mut self) -> anyhow::Result<Option<SampleBlock>>;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
}

/// Blocks from the live input device
///
/// Blocks the capture had to drop show up as `gap_frames` on the block
/// that follows them.
pub struct DeviceSource {
    rx: Receiver<SampleBlock>,
    sample_rate: u32,
    channels: u16,
    _capture: AudioCapture,
}

impl DeviceSource {
    pub fn new(config: &AudioConfig) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(10);
        let capture = AudioCapture::new(config, tx)?;
        Ok(Self {
            rx,
            sample_rate: config.sample_rate,
            channels: config.channels,
            _capture: capture,
        })
    }
}

impl SampleSource for DeviceSource {
    fn next_buffer(&mut self) -> anyhow::Result<Option<SampleBlock>> {
        Ok(self.rx.recv().ok())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

/// Blocks of `chunk_frames` frames read from a WAV file of any channel count
pub struct WavFileSource {
    samples: Vec<f32>,
    position: usize,
    chunk_size: usize,
    sample_rate: u32,
    channels: u16,
}

impl WavFileSource {
    pub fn new<P: AsRef<Path>>(path: P, chunk_frames: usize) -> anyhow::Result<Self> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        if spec.channels == 0 {
            anyhow::bail!("WAV file has no channels");
        }
        if chunk_frames == 0 {
            anyhow::bail!("Chunk size must be at least one frame");
        }

        let samples = Self::read_samples(reader, &spec)?;
        log::debug!(
            "Read {} frames of {} channel(s) at {} Hz",
            samples.len() / spec.channels as usize,
            spec.channels,
            spec.sample_rate
        );

        Ok(Self {
            samples,
            position: 0,
            chunk_size: chunk_frames * spec.channels as usize,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    fn read_samples(
        mut reader: WavReader<BufReader<File>>,
        spec: &hound::WavSpec,
    ) -> anyhow::Result<Vec<f32>> {
        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = 2_i32.pow(spec.bits_per_sample as u32 - 1) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(samples)
    }

    /// Total frames in the file
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

impl SampleSource for WavFileSource {
    fn next_buffer(&mut self) -> anyhow::Result<Option<SampleBlock>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let end = (self.position + self.chunk_size).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(Some(SampleBlock::contiguous(chunk)))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
