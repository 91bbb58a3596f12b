use std::collections::BTreeMap;

use crate::config::{
    DetectorConfig, ParameterUpdate, ThresholdMode, check_random_range, check_strictness,
};
use crate::error::{CrossingError, Result};
use crate::event::{CrossingEvent, EventSink};
use crate::stream::{StreamBuffer, StreamId, StreamInfo, StreamState};

/// Multi-stream threshold crossing detector
///
/// Holds the processor-wide configuration and one [`StreamState`] per
/// registered stream. Configuration arrives as [`ParameterUpdate`]s between
/// buffers; buffers arrive per stream through [`process`](Self::process).
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    config: DetectorConfig,
    streams: BTreeMap<StreamId, StreamState>,
    acquiring: bool,
}

impl CrossingDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            streams: BTreeMap::new(),
            acquiring: false,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    pub fn stream(&self, id: StreamId) -> Option<&StreamState> {
        self.streams.get(&id)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamState> {
        self.streams.values()
    }

    /// Register the host's current set of streams
    ///
    /// Streams that persist keep their channel selections and engine state;
    /// streams no longer listed are dropped. On error nothing changes.
    pub fn update_streams(&mut self, infos: &[StreamInfo]) -> Result<()> {
        let mut streams = BTreeMap::new();
        for info in infos {
            let state = match self.streams.get(&info.id) {
                Some(existing) => {
                    let mut state = existing.clone();
                    state.update_info(info.clone(), &self.config)?;
                    state
                }
                None => StreamState::new(info.clone(), &self.config)?,
            };
            streams.insert(info.id, state);
        }
        for (id, state) in &streams {
            if !self.streams.contains_key(id) {
                log::info!(
                    "Registered stream {} ({}, {} channels at {} Hz)",
                    id,
                    state.info().name,
                    state.info().channel_count(),
                    state.info().sample_rate
                );
            }
        }
        for id in self.streams.keys().filter(|id| !streams.contains_key(*id)) {
            log::info!("Removed stream {}", id);
        }
        self.streams = streams;
        Ok(())
    }

    /// Register or replace a single stream
    pub fn add_stream(&mut self, info: StreamInfo) -> Result<()> {
        let mut infos: Vec<StreamInfo> = self
            .streams
            .values()
            .filter(|s| s.id() != info.id)
            .map(|s| s.info().clone())
            .collect();
        infos.push(info);
        self.update_streams(&infos)
    }

    fn stream_mut(&mut self, id: StreamId) -> Result<&mut StreamState> {
        self.streams
            .get_mut(&id)
            .ok_or(CrossingError::UnknownStream(id))
    }

    /// Validate and apply one configuration change
    ///
    /// On error nothing changes.
    pub fn set_parameter(&mut self, update: ParameterUpdate) -> Result<()> {
        log::debug!("Parameter update: {:?}", update);
        match update {
            ParameterUpdate::StreamEnabled { stream, enabled } => {
                self.stream_mut(stream)?.set_enabled(enabled);
            }
            ParameterUpdate::InputChannel { stream, channel } => {
                let mode = self.config.threshold.mode;
                self.stream_mut(stream)?.set_input_channel(channel, mode)?;
            }
            ParameterUpdate::EventChannel { stream, channel } => {
                self.stream_mut(stream)?.set_event_channel(channel)?;
            }
            ParameterUpdate::ThresholdChannel { stream, channel } => {
                self.stream_mut(stream)?.set_threshold_channel(channel)?;
            }
            ParameterUpdate::ThresholdMode(mode) => {
                if mode == ThresholdMode::Channel
                    && let Some(missing) = self
                        .streams
                        .values()
                        .find(|s| s.is_enabled() && s.threshold_channel().is_none())
                {
                    return Err(CrossingError::NoThresholdChannel(missing.id()));
                }
                self.config.threshold.mode = mode;
                if mode == ThresholdMode::Random {
                    self.redraw_all();
                }
            }
            ParameterUpdate::ConstantThreshold(value) => {
                check_finite("constant threshold", value)?;
                self.config.threshold.constant = value;
            }
            ParameterUpdate::RandomThresholdMin(value) => {
                check_random_range(value, self.config.threshold.random_max)?;
                self.config.threshold.random_min = value;
                self.redraw_if_random();
            }
            ParameterUpdate::RandomThresholdMax(value) => {
                check_random_range(self.config.threshold.random_min, value)?;
                self.config.threshold.random_max = value;
                self.redraw_if_random();
            }
            ParameterUpdate::Rising(on) => self.config.rising = on,
            ParameterUpdate::Falling(on) => self.config.falling = on,
            ParameterUpdate::EventDurationMs(ms) => {
                self.config.timing.event_duration_ms = ms;
                self.update_timing();
            }
            ParameterUpdate::TimeoutMs(ms) => {
                self.config.timing.timeout_ms = ms;
                self.update_timing();
            }
            ParameterUpdate::UseBufferEndMask(on) => self.config.timing.use_buffer_end_mask = on,
            ParameterUpdate::BufferEndMaskMs(ms) => {
                self.config.timing.buffer_end_mask_ms = ms;
                self.update_timing();
            }
            ParameterUpdate::PastSpan(span) => {
                self.config.voting.past_span = span;
                self.reconfigure_spans()?;
            }
            ParameterUpdate::FutureSpan(span) => {
                self.config.voting.future_span = span;
                self.reconfigure_spans()?;
            }
            ParameterUpdate::PastStrictness(value) => {
                check_strictness("past strictness", value)?;
                self.config.voting.past_strictness = value;
            }
            ParameterUpdate::FutureStrictness(value) => {
                check_strictness("future strictness", value)?;
                self.config.voting.future_strictness = value;
            }
            ParameterUpdate::UseJumpLimit(on) => self.config.jump_limit.enabled = on,
            ParameterUpdate::JumpLimit(limit) => {
                if !limit.is_finite() || limit < 0.0 {
                    return Err(CrossingError::InvalidParameter {
                        name: "jump limit",
                        reason: format!("{} is not a non-negative number", limit),
                    });
                }
                self.config.jump_limit.limit = limit;
            }
            ParameterUpdate::JumpLimitSleep(samples) => {
                self.config.jump_limit.sleep_samples = samples;
            }
        }
        Ok(())
    }

    /// Apply updates in order, stopping at the first error
    pub fn apply<I>(&mut self, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = ParameterUpdate>,
    {
        updates
            .into_iter()
            .try_for_each(|update| self.set_parameter(update))
    }

    fn redraw_all(&mut self) {
        let (min, max) = (self.config.threshold.random_min, self.config.threshold.random_max);
        for state in self.streams.values_mut() {
            let drawn = state.engine_mut().redraw_threshold(min, max);
            log::debug!("stream {}: random threshold {:.3}", state.id(), drawn);
        }
    }

    fn redraw_if_random(&mut self) {
        if self.config.threshold.mode == ThresholdMode::Random {
            self.redraw_all();
        }
    }

    fn update_timing(&mut self) {
        for state in self.streams.values_mut() {
            state.update_timing(&self.config);
        }
    }

    fn reconfigure_spans(&mut self) -> Result<()> {
        log::debug!(
            "Voting spans now {} past / {} future, resetting history",
            self.config.voting.past_span,
            self.config.voting.future_span
        );
        for state in self.streams.values_mut() {
            state.engine_mut().reconfigure_spans(&self.config.voting)?;
        }
        Ok(())
    }

    /// Validate every enabled stream and reset state for a new acquisition
    pub fn start_acquisition(&mut self) -> Result<()> {
        self.config.validate()?;
        for state in self.streams.values().filter(|s| s.is_enabled()) {
            state.validate(&self.config)?;
        }
        for state in self.streams.values_mut() {
            state.start(&self.config);
        }
        self.acquiring = true;
        log::info!(
            "Acquisition started on {} stream(s), threshold mode {:?}",
            self.streams.values().filter(|s| s.is_enabled()).count(),
            self.config.threshold.mode
        );
        Ok(())
    }

    /// Stop acquisition, dropping any offset that was still pending
    pub fn stop_acquisition(&mut self) {
        for state in self.streams.values_mut() {
            state.stop();
        }
        if self.acquiring {
            log::info!("Acquisition stopped");
        }
        self.acquiring = false;
    }

    /// Process one buffer of `stream_id`
    pub fn process(
        &mut self,
        stream_id: StreamId,
        buffer: &StreamBuffer<'_>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        if !self.acquiring {
            return Err(CrossingError::NotAcquiring);
        }
        let state = self
            .streams
            .get_mut(&stream_id)
            .ok_or(CrossingError::UnknownStream(stream_id))?;
        state.process(&self.config, buffer, sink)
    }

    /// Threshold currently in effect for `stream`
    ///
    /// In channel mode this is the reference value at the last processed
    /// sample, if any.
    pub fn current_threshold(&self, stream: StreamId) -> Option<f32> {
        let state = self.streams.get(&stream)?;
        match self.config.threshold.mode {
            ThresholdMode::Constant => Some(self.config.threshold.constant),
            ThresholdMode::Random => Some(state.engine().thresholds().current_random()),
            ThresholdMode::Channel => state.engine().threshold_history().lookup(-1),
        }
    }

    /// Text shown for the threshold of `stream` in an operator display
    pub fn threshold_display(&self, stream: StreamId) -> String {
        match (self.config.threshold.mode, self.streams.get(&stream)) {
            (ThresholdMode::Channel, Some(state)) => match state.threshold_channel() {
                Some(channel) => format!("<chan {}>", channel + 1),
                None => "<none>".to_string(),
            },
            (_, Some(_)) => self
                .current_threshold(stream)
                .map(|t| format!("{}", t))
                .unwrap_or_default(),
            (_, None) => String::new(),
        }
    }

    pub fn pending_offset(&self, stream: StreamId) -> Option<&CrossingEvent> {
        self.streams.get(&stream)?.pending_offset()
    }
}

fn check_finite(name: &'static str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CrossingError::InvalidParameter {
            name,
            reason: format!("{} is not finite", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EmittedEvent, EventKind};
    use crate::stream::ChannelInfo;

    fn detector_with(streams: &[StreamInfo]) -> CrossingDetector {
        let mut config = DetectorConfig::default();
        config.timing.event_duration_ms = 2;
        config.timing.timeout_ms = 0;
        let mut detector = CrossingDetector::new(config).unwrap();
        detector.update_streams(streams).unwrap();
        detector
    }

    fn feed(
        detector: &mut CrossingDetector,
        stream: StreamId,
        first_sample: i64,
        channels: &[&[f32]],
    ) -> Vec<EmittedEvent> {
        let mut events = Vec::new();
        let buffer = StreamBuffer::new(first_sample, channels).unwrap();
        detector.process(stream, &buffer, &mut events).unwrap();
        events
    }

    #[test]
    fn test_process_requires_acquisition() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 1)]);
        let samples = [0.0f32; 4];
        let channels = [&samples[..]];
        let buffer = StreamBuffer::new(0, &channels).unwrap();
        let mut events: Vec<EmittedEvent> = Vec::new();
        assert!(matches!(
            detector.process(0, &buffer, &mut events),
            Err(CrossingError::NotAcquiring)
        ));

        detector.start_acquisition().unwrap();
        assert!(matches!(
            detector.process(9, &buffer, &mut events),
            Err(CrossingError::UnknownStream(9))
        ));
    }

    #[test]
    fn test_rejected_update_keeps_previous_value() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 2)]);
        assert!(detector.set_parameter(ParameterUpdate::PastStrictness(1.5)).is_err());
        assert_eq!(detector.config().voting.past_strictness, 1.0);

        assert!(
            detector
                .set_parameter(ParameterUpdate::InputChannel {
                    stream: 0,
                    channel: 5
                })
                .is_err()
        );
        assert_eq!(detector.stream(0).unwrap().input_channel(), 0);

        assert!(
            detector
                .set_parameter(ParameterUpdate::EventChannel {
                    stream: 0,
                    channel: Some(16)
                })
                .is_err()
        );
        assert_eq!(detector.stream(0).unwrap().event_channel(), Some(0));

        assert!(matches!(
            detector.set_parameter(ParameterUpdate::ThresholdMode(ThresholdMode::Channel)),
            Err(CrossingError::NoThresholdChannel(0))
        ));
        assert_eq!(detector.config().threshold.mode, ThresholdMode::Constant);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut detector = detector_with(&[
            StreamInfo::new(1, 1000.0, 1),
            StreamInfo::new(2, 1000.0, 1),
        ]);
        detector
            .set_parameter(ParameterUpdate::EventChannel {
                stream: 2,
                channel: Some(7),
            })
            .unwrap();
        detector.start_acquisition().unwrap();

        let rising = [-1.0, -1.0, 1.0, 1.0, 1.0, 1.0];
        let flat = [-1.0; 6];
        let a = feed(&mut detector, 1, 0, &[&rising]);
        let b = feed(&mut detector, 2, 0, &[&flat]);
        assert_eq!(a.len(), 2);
        assert!(b.is_empty());

        let b = feed(&mut detector, 2, 6, &[&rising]);
        assert_eq!(b[0].event.stream_id, 2);
        assert_eq!(b[0].event.event_channel, 7);
        assert_eq!(b[0].event.crossing_point, 8);
    }

    #[test]
    fn test_stop_discards_pending_offset() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 1)]);
        detector.start_acquisition().unwrap();

        let events = feed(&mut detector, 0, 0, &[&[-1.0, -1.0, -1.0, 1.0]]);
        assert_eq!(events.len(), 1);
        assert!(detector.pending_offset(0).is_some());

        detector.stop_acquisition();
        assert!(detector.pending_offset(0).is_none());
        assert!(!detector.is_acquiring());

        detector.start_acquisition().unwrap();
        let events = feed(&mut detector, 0, 4, &[&[1.0, 1.0, 1.0, 1.0]]);
        assert!(events.iter().all(|e| e.event.kind != EventKind::Offset));
    }

    #[test]
    fn test_span_change_resets_every_stream() {
        let mut detector = detector_with(&[
            StreamInfo::new(0, 1000.0, 1),
            StreamInfo::new(1, 1000.0, 1),
        ]);
        detector.start_acquisition().unwrap();
        feed(&mut detector, 0, 0, &[&[1.0; 8]]);
        feed(&mut detector, 1, 0, &[&[1.0; 8]]);

        detector.set_parameter(ParameterUpdate::PastSpan(5)).unwrap();
        for state in detector.streams() {
            assert!(state.engine().input_history().is_empty());
            assert_eq!(state.engine().input_history().capacity(), 7);
            assert_eq!(state.engine().refractory().samp_to_reenable(), 6);
        }
    }

    #[test]
    fn test_random_mode_redraws_on_selection_and_range_change() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 1)]);
        let draws = |d: &CrossingDetector| d.stream(0).unwrap().engine().thresholds().draws();
        assert_eq!(draws(&detector), 0);

        detector
            .set_parameter(ParameterUpdate::RandomThresholdMin(-1.0))
            .unwrap();
        assert_eq!(draws(&detector), 0);

        detector
            .set_parameter(ParameterUpdate::ThresholdMode(ThresholdMode::Random))
            .unwrap();
        assert_eq!(draws(&detector), 1);

        detector
            .set_parameter(ParameterUpdate::RandomThresholdMax(1.0))
            .unwrap();
        assert_eq!(draws(&detector), 2);

        let threshold = detector.current_threshold(0).unwrap();
        assert!((-1.0..=1.0).contains(&threshold));
        assert_eq!(detector.threshold_display(0), format!("{}", threshold));
    }

    #[test]
    fn test_random_range_must_be_representable() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 1)]);
        detector
            .set_parameter(ParameterUpdate::ThresholdMode(ThresholdMode::Random))
            .unwrap();
        detector
            .set_parameter(ParameterUpdate::RandomThresholdMin(-3e38))
            .unwrap();
        assert!(matches!(
            detector.set_parameter(ParameterUpdate::RandomThresholdMax(3e38)),
            Err(CrossingError::InvalidParameter { name: "random threshold range", .. })
        ));
        assert_eq!(detector.config().threshold.random_max, 180.0);
        assert!(
            detector
                .set_parameter(ParameterUpdate::RandomThresholdMax(f32::INFINITY))
                .is_err()
        );

        detector.start_acquisition().unwrap();
        let events = feed(&mut detector, 0, 0, &[&[-1e38, -1e38, 1e38, 1e38, 1e38]]);
        assert!(events.iter().all(|e| e.event.threshold.is_finite()));
    }

    #[test]
    fn test_channel_mode_display_and_validation() {
        let info = StreamInfo::new(0, 1000.0, 0).with_channels(vec![
            ChannelInfo {
                name: "signal".into(),
                device_id: 0,
            },
            ChannelInfo {
                name: "reference".into(),
                device_id: 0,
            },
        ]);
        let mut detector = detector_with(&[info]);
        detector
            .apply([
                ParameterUpdate::ThresholdChannel {
                    stream: 0,
                    channel: 1,
                },
                ParameterUpdate::ThresholdMode(ThresholdMode::Channel),
            ])
            .unwrap();
        assert_eq!(detector.threshold_display(0), "<chan 2>");
        assert_eq!(detector.current_threshold(0), None);

        detector.start_acquisition().unwrap();
        let events = feed(
            &mut detector,
            0,
            0,
            &[&[0.0, 0.0, 2.0, 2.0, 2.0], &[1.0, 1.0, 1.0, 1.0, 1.5]],
        );
        assert_eq!(events[0].event.threshold, 1.0);
        assert_eq!(detector.current_threshold(0), Some(1.5));
    }

    #[test]
    fn test_input_cannot_take_reference_in_channel_mode() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 3)]);
        detector
            .apply([
                ParameterUpdate::ThresholdChannel {
                    stream: 0,
                    channel: 1,
                },
                ParameterUpdate::ThresholdMode(ThresholdMode::Channel),
            ])
            .unwrap();
        detector.start_acquisition().unwrap();

        assert!(matches!(
            detector.set_parameter(ParameterUpdate::InputChannel {
                stream: 0,
                channel: 1
            }),
            Err(CrossingError::ThresholdChannelIsInput(1))
        ));
        assert_eq!(detector.stream(0).unwrap().input_channel(), 0);
        assert_eq!(detector.stream(0).unwrap().threshold_channel(), Some(1));

        let events = feed(
            &mut detector,
            0,
            0,
            &[&[0.0, 0.0, 2.0, 2.0], &[1.0; 4], &[0.0; 4]],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.crossing_point, 2);
        assert!(detector.pending_offset(0).is_some());
    }

    #[test]
    fn test_update_streams_is_atomic() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 1)]);
        let result = detector.update_streams(&[
            StreamInfo::new(0, 1000.0, 2),
            StreamInfo::new(1, -1.0, 1),
        ]);
        assert!(result.is_err());
        assert_eq!(detector.streams().count(), 1);
        assert_eq!(detector.stream(0).unwrap().info().channel_count(), 1);
    }

    #[test]
    fn test_update_streams_keeps_settings() {
        let mut detector = detector_with(&[StreamInfo::new(3, 1000.0, 4)]);
        detector
            .set_parameter(ParameterUpdate::InputChannel {
                stream: 3,
                channel: 2,
            })
            .unwrap();
        detector
            .add_stream(StreamInfo::new(4, 2000.0, 1))
            .unwrap();
        assert_eq!(detector.stream(3).unwrap().input_channel(), 2);
        assert_eq!(detector.streams().count(), 2);

        detector
            .update_streams(&[StreamInfo::new(4, 2000.0, 1)])
            .unwrap();
        assert!(detector.stream(3).is_none());
    }

    #[test]
    fn test_start_refuses_invalid_stream() {
        let mut detector = detector_with(&[StreamInfo::new(0, 1000.0, 1)]);
        detector
            .set_parameter(ParameterUpdate::EventChannel {
                stream: 0,
                channel: None,
            })
            .unwrap();
        assert!(detector.start_acquisition().is_err());
        assert!(!detector.is_acquiring());

        detector
            .set_parameter(ParameterUpdate::StreamEnabled {
                stream: 0,
                enabled: false,
            })
            .unwrap();
        detector.start_acquisition().unwrap();
    }
}
