//! Per-stream description, input buffers, and detector state.

use crate::config::{
    DetectorConfig, ThresholdMode, check_event_channel, ms_to_samples_ceil, ms_to_samples_floor,
};
use crate::detection::{BufferInput, CrossingEngine, EventTarget};
use crate::error::{CrossingError, Result};
use crate::event::{CrossingEvent, EventSink};

pub type StreamId = u16;

/// One continuous channel of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    /// Physical sub-device the channel is acquired by
    pub device_id: u16,
}

/// Host-provided description of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub id: StreamId,
    pub name: String,
    pub sample_rate: f32,
    pub channels: Vec<ChannelInfo>,
}

impl StreamInfo {
    /// Stream whose channels all sit on device 0, named `CH1`, `CH2`, ...
    pub fn new(id: StreamId, sample_rate: f32, channel_count: usize) -> Self {
        Self {
            id,
            name: format!("stream {}", id),
            sample_rate,
            channels: (0..channel_count)
                .map(|i| ChannelInfo {
                    name: format!("CH{}", i + 1),
                    device_id: 0,
                })
                .collect(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<ChannelInfo>) -> Self {
        self.channels = channels;
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Borrowed multi-channel block of samples for one stream
///
/// All channels have the same length; `first_sample` is the absolute index
/// of the first sample in every channel.
#[derive(Debug, Clone, Copy)]
pub struct StreamBuffer<'a> {
    first_sample: i64,
    channels: &'a [&'a [f32]],
    len: usize,
}

impl<'a> StreamBuffer<'a> {
    pub fn new(first_sample: i64, channels: &'a [&'a [f32]]) -> Result<Self> {
        let len = channels.first().map_or(0, |c| c.len());
        if let Some(ragged) = channels.iter().find(|c| c.len() != len) {
            return Err(CrossingError::RaggedBuffer {
                expected: len,
                found: ragged.len(),
            });
        }
        Ok(Self {
            first_sample,
            channels,
            len,
        })
    }

    pub fn first_sample(&self) -> i64 {
        self.first_sample
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&'a [f32]> {
        self.channels.get(index).copied()
    }
}

/// Millisecond settings converted to samples at a stream's rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamTiming {
    pub event_duration_samples: usize,
    pub timeout_samples: usize,
    pub buffer_end_mask_samples: usize,
}

impl StreamTiming {
    pub fn new(config: &DetectorConfig, sample_rate: f32) -> Self {
        Self {
            event_duration_samples: ms_to_samples_ceil(config.timing.event_duration_ms, sample_rate),
            timeout_samples: ms_to_samples_floor(config.timing.timeout_ms, sample_rate),
            buffer_end_mask_samples: ms_to_samples_ceil(
                config.timing.buffer_end_mask_ms,
                sample_rate,
            ),
        }
    }
}

/// Everything the detector keeps for one stream
///
/// Holds the stream's channel selection, its derived timing, the single
/// deferred offset slot and the engine. The pending offset follows
/// last-write-wins: a new onset whose offset falls past the buffer end
/// replaces whatever offset was still waiting.
#[derive(Debug, Clone)]
pub struct StreamState {
    info: StreamInfo,
    enabled: bool,
    input_channel: usize,
    event_channel: Option<u8>,
    threshold_channel: Option<usize>,
    timing: StreamTiming,
    pending_offset: Option<CrossingEvent>,
    engine: CrossingEngine,
}

impl StreamState {
    pub(crate) fn new(info: StreamInfo, config: &DetectorConfig) -> Result<Self> {
        check_sample_rate(info.sample_rate)?;
        let seed = config
            .threshold
            .seed
            .map(|s| s.wrapping_add(u64::from(info.id)));
        let mut state = Self {
            timing: StreamTiming::new(config, info.sample_rate),
            enabled: true,
            input_channel: 0,
            event_channel: None,
            threshold_channel: None,
            pending_offset: None,
            engine: CrossingEngine::new(config, seed),
            info,
        };
        state.set_input_channel(config.channels.input, config.threshold.mode)?;
        state.set_event_channel(config.channels.event)?;
        if let Some(channel) = config.channels.threshold {
            match state.set_threshold_channel(channel) {
                Ok(()) => {}
                Err(e) if config.threshold.mode == ThresholdMode::Channel => return Err(e),
                Err(e) => log::warn!(
                    "stream {}: default threshold channel {} not selected: {}",
                    state.info.id,
                    channel,
                    e
                ),
            }
        }
        Ok(state)
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn id(&self) -> StreamId {
        self.info.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn input_channel(&self) -> usize {
        self.input_channel
    }

    pub fn event_channel(&self) -> Option<u8> {
        self.event_channel
    }

    pub fn threshold_channel(&self) -> Option<usize> {
        self.threshold_channel
    }

    pub fn timing(&self) -> &StreamTiming {
        &self.timing
    }

    pub fn pending_offset(&self) -> Option<&CrossingEvent> {
        self.pending_offset.as_ref()
    }

    pub fn engine(&self) -> &CrossingEngine {
        &self.engine
    }

    pub(crate) fn engine_mut(&mut self) -> &mut CrossingEngine {
        &mut self.engine
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.info.channel_count() {
            return Err(CrossingError::ChannelOutOfRange {
                stream: self.info.id,
                channel,
                available: self.info.channel_count(),
            });
        }
        Ok(())
    }

    fn check_threshold_channel(&self, channel: usize) -> Result<()> {
        self.check_reference(channel, self.input_channel)
    }

    /// Whether `threshold` may serve as the reference for input channel `input`
    fn check_reference(&self, threshold: usize, input: usize) -> Result<()> {
        self.check_channel(input)?;
        self.check_channel(threshold)?;
        if threshold == input {
            return Err(CrossingError::ThresholdChannelIsInput(threshold));
        }
        let input_device = self.info.channels[input].device_id;
        let threshold_device = self.info.channels[threshold].device_id;
        if input_device != threshold_device {
            return Err(CrossingError::ThresholdChannelDevice {
                threshold,
                threshold_device,
                input_device,
            });
        }
        Ok(())
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Select the input channel
    ///
    /// In channel mode an input that would invalidate the selected reference
    /// is refused. Otherwise the reference is deselected, since it is not in
    /// use until channel mode is chosen again.
    pub(crate) fn set_input_channel(&mut self, channel: usize, mode: ThresholdMode) -> Result<()> {
        self.check_channel(channel)?;
        if let Some(threshold) = self.threshold_channel
            && let Err(e) = self.check_reference(threshold, channel)
        {
            if mode == ThresholdMode::Channel {
                return Err(e);
            }
            log::info!(
                "stream {}: threshold channel {} deselected, not usable with input {}",
                self.info.id,
                threshold,
                channel
            );
            self.threshold_channel = None;
        }
        self.input_channel = channel;
        Ok(())
    }

    pub(crate) fn set_event_channel(&mut self, channel: Option<u8>) -> Result<()> {
        if let Some(channel) = channel {
            check_event_channel(channel)?;
        }
        self.event_channel = channel;
        Ok(())
    }

    pub(crate) fn set_threshold_channel(&mut self, channel: usize) -> Result<()> {
        self.check_threshold_channel(channel)?;
        self.threshold_channel = Some(channel);
        Ok(())
    }

    /// Replace the host description
    ///
    /// Channel selections are kept as they are. Ones the new layout no longer
    /// supports are reported here and refused by [`validate`](Self::validate)
    /// until the host or the user fixes them.
    pub(crate) fn update_info(&mut self, info: StreamInfo, config: &DetectorConfig) -> Result<()> {
        check_sample_rate(info.sample_rate)?;
        self.info = info;
        if let Err(e) = self.check_channel(self.input_channel) {
            log::warn!("stream {}: input channel unusable: {}", self.info.id, e);
        } else if let Some(threshold) = self.threshold_channel
            && let Err(e) = self.check_threshold_channel(threshold)
        {
            log::warn!("stream {}: threshold channel unusable: {}", self.info.id, e);
        }
        self.update_timing(config);
        Ok(())
    }

    pub(crate) fn update_timing(&mut self, config: &DetectorConfig) {
        self.timing = StreamTiming::new(config, self.info.sample_rate);
    }

    /// Check that this stream can run under `config`
    pub(crate) fn validate(&self, config: &DetectorConfig) -> Result<()> {
        self.check_channel(self.input_channel)?;
        if self.event_channel.is_none() {
            return Err(CrossingError::NoEventChannel(self.info.id));
        }
        if config.threshold.mode == ThresholdMode::Channel {
            let channel = self
                .threshold_channel
                .ok_or(CrossingError::NoThresholdChannel(self.info.id))?;
            self.check_threshold_channel(channel)?;
        }
        Ok(())
    }

    pub(crate) fn start(&mut self, config: &DetectorConfig) {
        self.update_timing(config);
        self.pending_offset = None;
        self.engine.start();
    }

    pub(crate) fn stop(&mut self) {
        self.pending_offset = None;
        self.engine.stop();
    }

    /// Run the engine over one buffer of this stream
    pub(crate) fn process(
        &mut self,
        config: &DetectorConfig,
        buffer: &StreamBuffer<'_>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let samples = buffer
            .channel(self.input_channel)
            .ok_or(CrossingError::ChannelOutOfRange {
                stream: self.info.id,
                channel: self.input_channel,
                available: buffer.channel_count(),
            })?;
        let event_channel = self
            .event_channel
            .ok_or(CrossingError::NoEventChannel(self.info.id))?;

        let reference = match config.threshold.mode {
            ThresholdMode::Channel => {
                let channel = self
                    .threshold_channel
                    .ok_or(CrossingError::NoThresholdChannel(self.info.id))?;
                Some(
                    buffer
                        .channel(channel)
                        .ok_or(CrossingError::ChannelOutOfRange {
                            stream: self.info.id,
                            channel,
                            available: buffer.channel_count(),
                        })?,
                )
            }
            _ => None,
        };

        let input = BufferInput {
            first_sample: buffer.first_sample(),
            samples,
            reference,
        };
        let target = EventTarget {
            stream_id: self.info.id,
            event_channel,
        };
        self.engine.process(
            config,
            &self.timing,
            target,
            &input,
            &mut self.pending_offset,
            sink,
        )
    }
}

pub(crate) fn check_sample_rate(sample_rate: f32) -> Result<()> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(CrossingError::InvalidParameter {
            name: "sample rate",
            reason: format!("{} Hz", sample_rate),
        })
    }
}
