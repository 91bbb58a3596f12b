use crate::config::{DetectorConfig, ThresholdMode, VotingConfig};
use crate::detection::history::HistoryBuffer;
use crate::detection::refractory::{JumpLimit, RefractoryController};
use crate::detection::threshold::{ThresholdProvider, ThresholdSource};
use crate::detection::voting::VotingWindow;
use crate::error::{CrossingError, Result};
use crate::event::{CrossingEvent, Direction, EventKind, EventSink};
use crate::stream::{StreamId, StreamTiming};

/// One stream's samples for a single processing call
#[derive(Debug, Clone, Copy)]
pub struct BufferInput<'a> {
    /// Absolute index of `samples[0]`
    pub first_sample: i64,
    pub samples: &'a [f32],
    /// Reference channel, same length as `samples`, required in channel mode
    pub reference: Option<&'a [f32]>,
}

/// Where emitted events are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTarget {
    pub stream_id: StreamId,
    pub event_channel: u8,
}

/// Per-stream crossing detection state machine
///
/// Owns the input and threshold history, the voting counters, the refractory
/// state and the threshold provider of one stream. Each call to
/// [`process`](Self::process) handles one buffer: candidates are evaluated
/// `future_span` samples late, once their future window is available, and
/// the state is carried over to the next buffer.
#[derive(Debug, Clone)]
pub struct CrossingEngine {
    input_history: HistoryBuffer<f32>,
    threshold_history: HistoryBuffer<f32>,
    voting: VotingWindow,
    refractory: RefractoryController,
    thresholds: ThresholdProvider,
    holdoff: i64,
    scratch: Vec<f32>,
}

impl CrossingEngine {
    pub fn new(config: &DetectorConfig, seed: Option<u64>) -> Self {
        let voting = &config.voting;
        let mut thresholds = ThresholdProvider::new(seed);
        if config.threshold.mode == ThresholdMode::Random {
            thresholds.redraw(config.threshold.random_min, config.threshold.random_max);
        }
        Self {
            input_history: HistoryBuffer::new(voting.history_capacity()),
            threshold_history: HistoryBuffer::new(voting.history_capacity()),
            voting: VotingWindow::new(voting.past_span, voting.future_span),
            refractory: RefractoryController::new(voting.initial_holdoff()),
            thresholds,
            holdoff: voting.initial_holdoff(),
            scratch: Vec::new(),
        }
    }

    /// Resize history for new spans. Discards history and voting counts,
    /// since counts over the old windows no longer describe anything.
    pub fn reconfigure_spans(&mut self, voting: &VotingConfig) -> Result<()> {
        self.input_history.reset();
        self.input_history.resize(voting.history_capacity())?;
        self.threshold_history.reset();
        self.threshold_history.resize(voting.history_capacity())?;
        self.voting = VotingWindow::new(voting.past_span, voting.future_span);
        self.holdoff = voting.initial_holdoff();
        self.refractory.reset(self.holdoff);
        Ok(())
    }

    /// Fresh start for a new acquisition
    pub fn start(&mut self) {
        self.input_history.reset();
        self.threshold_history.reset();
        self.voting.reset();
        self.refractory.reset(self.holdoff);
    }

    /// Stop acquisition; nothing may trigger on pre-stop data afterwards
    pub fn stop(&mut self) {
        self.refractory.reset(self.holdoff);
    }

    /// Draw a new random threshold
    pub fn redraw_threshold(&mut self, min: f32, max: f32) -> f32 {
        self.thresholds.redraw(min, max)
    }

    pub fn thresholds(&self) -> &ThresholdProvider {
        &self.thresholds
    }

    pub fn voting(&self) -> &VotingWindow {
        &self.voting
    }

    pub fn refractory(&self) -> &RefractoryController {
        &self.refractory
    }

    pub fn input_history(&self) -> &HistoryBuffer<f32> {
        &self.input_history
    }

    pub fn threshold_history(&self) -> &HistoryBuffer<f32> {
        &self.threshold_history
    }

    /// Process one buffer
    ///
    /// Flushes a deferred offset that falls inside this buffer, evaluates
    /// every candidate whose future window is now complete, emits onsets and
    /// their offsets (or defers the offset into `pending`, replacing whatever
    /// was there), and finally appends the buffer to history.
    pub fn process(
        &mut self,
        config: &DetectorConfig,
        timing: &StreamTiming,
        target: EventTarget,
        input: &BufferInput<'_>,
        pending: &mut Option<CrossingEvent>,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        let n = input.samples.len();
        let source = match config.threshold.mode {
            ThresholdMode::Constant => ThresholdSource::Constant(config.threshold.constant),
            ThresholdMode::Random => ThresholdSource::Random,
            ThresholdMode::Channel => match input.reference {
                Some(reference) if reference.len() >= n => ThresholdSource::Channel(reference),
                _ => return Err(CrossingError::NoThresholdChannel(target.stream_id)),
            },
        };

        flush_pending(pending, input.first_sample, n, sink);

        self.scratch.clear();
        self.scratch.resize(n, 0.0);

        let future = self.voting.future_span() as i64;
        let end_mask = config
            .timing
            .use_buffer_end_mask
            .then_some(timing.buffer_end_mask_samples);
        let jump = config.jump_limit.enabled.then_some(JumpLimit {
            limit: config.jump_limit.limit,
            sleep: config.jump_limit.sleep_samples,
        });

        for i in 0..n {
            self.scratch[i] = self.thresholds.threshold_at(&source, i);
            let ind_cross = i as i64 - future;

            let thresholds = &self.scratch;
            let input_history = &self.input_history;
            let threshold_history = &self.threshold_history;
            let sample = |index: i64| {
                sample_at(
                    index,
                    input.samples,
                    thresholds,
                    input_history,
                    threshold_history,
                )
            };
            self.voting
                .advance(ind_cross, |index| sample(index).is_some_and(|(v, t)| v > t));

            if !(config.rising || config.falling)
                || !self.refractory.may_trigger(ind_cross, n, end_mask)
            {
                continue;
            }

            let (Some((pre_val, pre_thresh)), Some((post_val, post_thresh))) =
                (sample(ind_cross - 1), sample(ind_cross))
            else {
                continue;
            };

            if self.refractory.jump_suppressed(pre_val, post_val, jump) {
                continue;
            }

            let enabled = [
                (config.rising, Direction::Rising),
                (config.falling, Direction::Falling),
            ];
            let Some(direction) = enabled
                .into_iter()
                .filter(|&(on, _)| on)
                .map(|(_, direction)| direction)
                .find(|&direction| {
                    self.should_trigger(config, direction, pre_val, post_val, pre_thresh, post_thresh)
                })
            else {
                continue;
            };

            let onset_offset = ind_cross.max(0);
            let onset = CrossingEvent {
                kind: EventKind::Onset,
                stream_id: target.stream_id,
                event_channel: target.event_channel,
                sample_number: input.first_sample + onset_offset,
                crossing_point: input.first_sample + ind_cross,
                crossing_level: post_val,
                threshold: post_thresh,
                direction,
            };
            log::trace!(
                "stream {}: {:?} crossing at sample {} (level {:.3}, threshold {:.3})",
                target.stream_id,
                direction,
                onset.crossing_point,
                post_val,
                post_thresh
            );
            sink.emit(onset, onset_offset as usize);

            let offset = onset.offset_after(timing.event_duration_samples);
            let offset_pos = onset_offset as usize + timing.event_duration_samples;
            if offset_pos < n {
                sink.emit(offset, offset_pos);
            } else {
                *pending = Some(offset);
            }

            self.refractory
                .on_trigger(ind_cross, timing.timeout_samples);

            if config.threshold.mode == ThresholdMode::Random {
                self.thresholds
                    .redraw(config.threshold.random_min, config.threshold.random_max);
            }
        }

        self.input_history.append(input.samples);
        self.threshold_history.append(&self.scratch);
        self.refractory.rebase(n, -future);
        Ok(())
    }

    /// Trigger predicate for one direction, given the current voting counts
    fn should_trigger(
        &self,
        config: &DetectorConfig,
        direction: Direction,
        pre_val: f32,
        post_val: f32,
        pre_thresh: f32,
        post_thresh: f32,
    ) -> bool {
        let rising = direction.is_rising();
        let pre_sat = rising != (pre_val > pre_thresh);
        let post_sat = rising == (post_val > post_thresh);
        pre_sat
            && post_sat
            && self
                .voting
                .past_agrees(direction, config.voting.past_samples_needed())
            && self
                .voting
                .future_agrees(direction, config.voting.future_samples_needed())
    }
}

/// Value and threshold at a buffer-relative index, from the current buffer
/// for `index >= 0` and from history otherwise
fn sample_at(
    index: i64,
    samples: &[f32],
    thresholds: &[f32],
    input_history: &HistoryBuffer<f32>,
    threshold_history: &HistoryBuffer<f32>,
) -> Option<(f32, f32)> {
    if index < 0 {
        Some((input_history.lookup(index)?, threshold_history.lookup(index)?))
    } else {
        let index = index as usize;
        Some((*samples.get(index)?, *thresholds.get(index)?))
    }
}

fn flush_pending(
    pending: &mut Option<CrossingEvent>,
    first_sample: i64,
    buffer_len: usize,
    sink: &mut dyn EventSink,
) {
    let Some(event) = pending else {
        return;
    };
    let offset = (event.sample_number - first_sample).max(0) as usize;
    if offset < buffer_len {
        sink.emit(*event, offset);
        *pending = None;
    }
}
