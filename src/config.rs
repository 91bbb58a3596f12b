//! Configuration for the crossing detector.
//!
//! [`DetectorConfig`] holds every processor-wide setting plus the channel
//! defaults applied to newly registered streams. It can be loaded from TOML:
//!
//! ```toml
//! rising = true
//! falling = false
//!
//! [threshold]
//! mode = "random"
//! random_min = -1.0
//! random_max = 1.0
//!
//! [voting]
//! past_span = 5
//! future_span = 5
//! past_strictness = 0.8
//!
//! [timing]
//! event_duration_ms = 5
//! timeout_ms = 250
//! ```
//!
//! Changes made while the detector is running go through [`ParameterUpdate`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{HISTORY_PADDING, MAX_EVENT_CHANNEL, MS_PER_SECOND};
use crate::error::{CrossingError, Result};
use crate::stream::StreamId;

/// Where the per-sample threshold comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Fixed threshold value
    #[default]
    Constant,
    /// Uniform draw from a range, redrawn after every onset
    Random,
    /// Simultaneous value of a reference channel
    Channel,
}

/// Threshold generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub mode: ThresholdMode,
    /// Threshold used in constant mode
    pub constant: f32,
    /// Lower bound of the random range
    pub random_min: f32,
    /// Upper bound of the random range. `random_max <= random_min` always yields `random_min`.
    pub random_max: f32,
    /// Seed for random thresholds; each stream derives its own generator from it
    pub seed: Option<u64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::Constant,
            constant: 0.0,
            random_min: -180.0,
            random_max: 180.0,
            seed: None,
        }
    }
}

/// Past/future voting windows around a candidate crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Additional samples examined before the crossing
    pub past_span: usize,
    /// Additional samples examined after the crossing (adds this much latency)
    pub future_span: usize,
    /// Fraction (0-1) of the past span that must be on the pre-crossing side
    pub past_strictness: f32,
    /// Fraction (0-1) of the future span that must be on the post-crossing side
    pub future_strictness: f32,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            past_span: 0,
            future_span: 0,
            past_strictness: 1.0,
            future_strictness: 1.0,
        }
    }
}

impl VotingConfig {
    /// Capacity of the per-stream history buffers
    pub fn history_capacity(&self) -> usize {
        self.past_span + self.future_span + HISTORY_PADDING
    }

    /// First candidate index allowed to trigger after a reset
    pub fn initial_holdoff(&self) -> i64 {
        (self.past_span + self.future_span + 1) as i64
    }

    pub fn past_samples_needed(&self) -> usize {
        samples_needed(self.past_span, self.past_strictness)
    }

    pub fn future_samples_needed(&self) -> usize {
        samples_needed(self.future_span, self.future_strictness)
    }
}

fn samples_needed(span: usize, strictness: f32) -> usize {
    if span == 0 {
        return 0;
    }
    (span as f32 * strictness).ceil() as usize
}

/// Millisecond-denominated timing, converted per stream sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Time between an onset and its offset event
    pub event_duration_ms: u32,
    /// Minimum time between consecutive onsets
    pub timeout_ms: u32,
    /// Ignore crossings more than the mask width before the end of a buffer
    pub use_buffer_end_mask: bool,
    /// Tail of each buffer in which crossings may still trigger
    pub buffer_end_mask_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            event_duration_ms: 5,
            timeout_ms: 1000,
            use_buffer_end_mask: false,
            buffer_end_mask_ms: 3,
        }
    }
}

/// Artifact rejection for large sample-to-sample jumps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpLimitConfig {
    pub enabled: bool,
    /// Minimum `|post - pre|` treated as an artifact
    pub limit: f32,
    /// Number of evaluated candidates kept silent after an artifact
    pub sleep_samples: usize,
}

impl Default for JumpLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 5.0,
            sleep_samples: 0,
        }
    }
}

/// Channel assignment applied to streams when they are first registered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Monitored input channel (stream-local index)
    pub input: usize,
    /// Output event channel, `None` leaves the stream unconnected
    pub event: Option<u8>,
    /// Reference channel for channel-mode thresholds
    pub threshold: Option<usize>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            input: 0,
            event: Some(0),
            threshold: None,
        }
    }
}

/// Processor-wide crossing detector configuration
///
/// # Example
/// ```
/// use crossing_detector::config::DetectorConfig;
///
/// let mut config = DetectorConfig::default();
/// config.falling = true;
/// config.voting.past_span = 4;
/// assert!(config.validate().is_ok());
/// assert_eq!(config.voting.history_capacity(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Trigger on crossings from below to above the threshold
    pub rising: bool,
    /// Trigger on crossings from above to below the threshold
    pub falling: bool,
    pub threshold: ThresholdConfig,
    pub voting: VotingConfig,
    pub timing: TimingConfig,
    pub jump_limit: JumpLimitConfig,
    pub channels: ChannelConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rising: true,
            falling: false,
            threshold: ThresholdConfig::default(),
            voting: VotingConfig::default(),
            timing: TimingConfig::default(),
            jump_limit: JumpLimitConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| CrossingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CrossingError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges that do not depend on any stream
    pub fn validate(&self) -> Result<()> {
        check_strictness("past strictness", self.voting.past_strictness)?;
        check_strictness("future strictness", self.voting.future_strictness)?;
        if !self.jump_limit.limit.is_finite() || self.jump_limit.limit < 0.0 {
            return Err(CrossingError::InvalidParameter {
                name: "jump limit",
                reason: format!("{} is not a non-negative number", self.jump_limit.limit),
            });
        }
        check_random_range(self.threshold.random_min, self.threshold.random_max)?;
        if let Some(channel) = self.channels.event {
            check_event_channel(channel)?;
        }
        Ok(())
    }

    /// Express the whole configuration as a sequence of updates for one stream
    /// followed by the processor-wide values. Channel-mode threshold selection
    /// is placed after the reference channel so it validates.
    pub fn updates_for_stream(&self, stream: StreamId) -> Vec<ParameterUpdate> {
        let mut updates = vec![
            ParameterUpdate::InputChannel {
                stream,
                channel: self.channels.input,
            },
            ParameterUpdate::EventChannel {
                stream,
                channel: self.channels.event,
            },
        ];
        if let Some(channel) = self.channels.threshold {
            updates.push(ParameterUpdate::ThresholdChannel { stream, channel });
        }
        updates.extend([
            ParameterUpdate::ConstantThreshold(self.threshold.constant),
            ParameterUpdate::RandomThresholdMin(self.threshold.random_min),
            ParameterUpdate::RandomThresholdMax(self.threshold.random_max),
            ParameterUpdate::ThresholdMode(self.threshold.mode),
            ParameterUpdate::Rising(self.rising),
            ParameterUpdate::Falling(self.falling),
            ParameterUpdate::EventDurationMs(self.timing.event_duration_ms),
            ParameterUpdate::TimeoutMs(self.timing.timeout_ms),
            ParameterUpdate::UseBufferEndMask(self.timing.use_buffer_end_mask),
            ParameterUpdate::BufferEndMaskMs(self.timing.buffer_end_mask_ms),
            ParameterUpdate::PastSpan(self.voting.past_span),
            ParameterUpdate::FutureSpan(self.voting.future_span),
            ParameterUpdate::PastStrictness(self.voting.past_strictness),
            ParameterUpdate::FutureStrictness(self.voting.future_strictness),
            ParameterUpdate::UseJumpLimit(self.jump_limit.enabled),
            ParameterUpdate::JumpLimit(self.jump_limit.limit),
            ParameterUpdate::JumpLimitSleep(self.jump_limit.sleep_samples),
        ]);
        updates
    }
}

pub(crate) fn check_strictness(name: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CrossingError::InvalidParameter {
            name,
            reason: format!("{} is outside [0, 1]", value),
        })
    }
}

/// Both bounds must be finite and so must their difference, or uniform
/// sampling over the range is undefined.
pub(crate) fn check_random_range(min: f32, max: f32) -> Result<()> {
    for (name, value) in [("random threshold minimum", min), ("random threshold maximum", max)] {
        if !value.is_finite() {
            return Err(CrossingError::InvalidParameter {
                name,
                reason: format!("{} is not finite", value),
            });
        }
    }
    if !(max - min).is_finite() {
        return Err(CrossingError::InvalidParameter {
            name: "random threshold range",
            reason: format!("span of [{}, {}] is not representable", min, max),
        });
    }
    Ok(())
}

pub(crate) fn check_event_channel(channel: u8) -> Result<()> {
    if channel > MAX_EVENT_CHANNEL {
        return Err(CrossingError::EventChannelOutOfRange {
            channel,
            max: MAX_EVENT_CHANNEL,
        });
    }
    Ok(())
}

/// Convert a millisecond duration to samples, rounding up
pub fn ms_to_samples_ceil(ms: u32, sample_rate: f32) -> usize {
    (ms as f32 * sample_rate / MS_PER_SECOND).ceil() as usize
}

/// Convert a millisecond duration to samples, rounding down
pub fn ms_to_samples_floor(ms: u32, sample_rate: f32) -> usize {
    (ms as f32 * sample_rate / MS_PER_SECOND).floor() as usize
}

/// A single configuration change
///
/// Stream-scoped variants name the stream they apply to; the others change
/// processor-wide settings shared by every stream. Each variant is validated
/// and applied together with the derived values it affects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterUpdate {
    StreamEnabled { stream: StreamId, enabled: bool },
    InputChannel { stream: StreamId, channel: usize },
    EventChannel { stream: StreamId, channel: Option<u8> },
    ThresholdChannel { stream: StreamId, channel: usize },
    ThresholdMode(ThresholdMode),
    ConstantThreshold(f32),
    RandomThresholdMin(f32),
    RandomThresholdMax(f32),
    Rising(bool),
    Falling(bool),
    EventDurationMs(u32),
    TimeoutMs(u32),
    PastSpan(usize),
    FutureSpan(usize),
    PastStrictness(f32),
    FutureStrictness(f32),
    UseJumpLimit(bool),
    JumpLimit(f32),
    JumpLimitSleep(usize),
    UseBufferEndMask(bool),
    BufferEndMaskMs(u32),
}

/// Command-line overrides shared by the binaries
///
/// Values given on the command line replace those from the `--config` file,
/// which in turn replace the defaults.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct DetectorArgs {
    /// TOML detector configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Threshold mode
    #[arg(long, value_enum)]
    pub threshold_mode: Option<ThresholdMode>,

    /// Constant threshold value
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<f32>,

    /// Random threshold range as MIN,MAX
    #[arg(long, value_delimiter = ',', num_args = 2, allow_negative_numbers = true)]
    pub random_range: Option<Vec<f32>>,

    /// Seed for random thresholds
    #[arg(long)]
    pub seed: Option<u64>,

    /// Detect falling crossings
    #[arg(long)]
    pub falling: bool,

    /// Do not detect rising crossings
    #[arg(long)]
    pub no_rising: bool,

    /// Input channel (0-based)
    #[arg(short, long)]
    pub input_channel: Option<usize>,

    /// Reference channel for channel-mode thresholds (0-based)
    #[arg(long)]
    pub threshold_channel: Option<usize>,

    /// Output event channel
    #[arg(short, long)]
    pub event_channel: Option<u8>,

    /// Samples before the crossing that vote
    #[arg(long)]
    pub past_span: Option<usize>,

    /// Samples after the crossing that vote
    #[arg(long)]
    pub future_span: Option<usize>,

    /// Fraction of past samples that must agree
    #[arg(long)]
    pub past_strictness: Option<f32>,

    /// Fraction of future samples that must agree
    #[arg(long)]
    pub future_strictness: Option<f32>,

    /// Event duration in ms
    #[arg(long)]
    pub event_duration_ms: Option<u32>,

    /// Minimum time between onsets in ms
    #[arg(long)]
    pub timeout_ms: Option<u32>,

    /// Reject crossings whose step exceeds this value
    #[arg(long)]
    pub jump_limit: Option<f32>,

    /// Candidates to skip after a rejected jump
    #[arg(long)]
    pub jump_sleep: Option<usize>,

    /// Ignore crossings occurring more than this many ms before the buffer end
    #[arg(long)]
    pub buffer_end_mask_ms: Option<u32>,
}

impl DetectorArgs {
    /// Build the effective configuration
    pub fn resolve(&self) -> Result<DetectorConfig> {
        let mut config = match self.config {
            Some(ref path) => DetectorConfig::load(path)?,
            None => DetectorConfig::default(),
        };

        if let Some(mode) = self.threshold_mode {
            config.threshold.mode = mode;
        }
        if let Some(value) = self.threshold {
            config.threshold.constant = value;
        }
        if let Some(ref range) = self.random_range
            && let [min, max] = range[..]
        {
            config.threshold.random_min = min;
            config.threshold.random_max = max;
        }
        if self.seed.is_some() {
            config.threshold.seed = self.seed;
        }
        if self.falling {
            config.falling = true;
        }
        if self.no_rising {
            config.rising = false;
        }
        if let Some(channel) = self.input_channel {
            config.channels.input = channel;
        }
        if self.threshold_channel.is_some() {
            config.channels.threshold = self.threshold_channel;
        }
        if self.event_channel.is_some() {
            config.channels.event = self.event_channel;
        }
        if let Some(span) = self.past_span {
            config.voting.past_span = span;
        }
        if let Some(span) = self.future_span {
            config.voting.future_span = span;
        }
        if let Some(value) = self.past_strictness {
            config.voting.past_strictness = value;
        }
        if let Some(value) = self.future_strictness {
            config.voting.future_strictness = value;
        }
        if let Some(ms) = self.event_duration_ms {
            config.timing.event_duration_ms = ms;
        }
        if let Some(ms) = self.timeout_ms {
            config.timing.timeout_ms = ms;
        }
        if let Some(limit) = self.jump_limit {
            config.jump_limit.enabled = true;
            config.jump_limit.limit = limit;
        }
        if let Some(sleep) = self.jump_sleep {
            config.jump_limit.sleep_samples = sleep;
        }
        if let Some(ms) = self.buffer_end_mask_ms {
            config.timing.use_buffer_end_mask = true;
            config.timing.buffer_end_mask_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Audio capture configuration for the live monitor
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Processing buffer size in frames
    pub buffer_size: usize,
    /// Number of interleaved input channels
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 1024,
            channels: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_detector_defaults() {
        let config = DetectorConfig::default();
        assert!(config.rising);
        assert!(!config.falling);
        assert_eq!(config.timing.event_duration_ms, 5);
        assert_eq!(config.timing.timeout_ms, 1000);
        assert_eq!(config.voting.history_capacity(), 2);
        assert_eq!(config.voting.initial_holdoff(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_samples_needed_rounds_up() {
        let voting = VotingConfig {
            past_span: 5,
            future_span: 3,
            past_strictness: 0.5,
            future_strictness: 0.34,
        };
        assert_eq!(voting.past_samples_needed(), 3);
        assert_eq!(voting.future_samples_needed(), 2);

        let empty = VotingConfig::default();
        assert_eq!(empty.past_samples_needed(), 0);
        assert_eq!(empty.future_samples_needed(), 0);
    }

    #[test]
    fn test_ms_conversion() {
        assert_eq!(ms_to_samples_ceil(5, 30000.0), 150);
        assert_eq!(ms_to_samples_ceil(1, 44100.0), 45);
        assert_eq!(ms_to_samples_floor(1, 44100.0), 44);
        assert_eq!(ms_to_samples_floor(0, 44100.0), 0);
    }

    #[test]
    fn test_from_toml() {
        let config = DetectorConfig::from_toml_str(
            r#"
            falling = true

            [threshold]
            mode = "random"
            random_min = -1.0
            random_max = 1.0
            seed = 7

            [voting]
            past_span = 5
            future_span = 2
            past_strictness = 0.6

            [jump_limit]
            enabled = true
            limit = 2.5
            sleep_samples = 10
            "#,
        )
        .unwrap();

        assert!(config.rising);
        assert!(config.falling);
        assert_eq!(config.threshold.mode, ThresholdMode::Random);
        assert_eq!(config.threshold.seed, Some(7));
        assert_eq!(config.voting.past_span, 5);
        assert!((config.voting.future_strictness - 1.0).abs() < f32::EPSILON);
        assert!(config.jump_limit.enabled);
        assert_eq!(config.jump_limit.sleep_samples, 10);
        assert_eq!(config.timing.timeout_ms, 1000);
    }

    #[test]
    fn test_from_toml_rejects_bad_strictness() {
        let err = DetectorConfig::from_toml_str("[voting]\npast_strictness = 1.5\n").unwrap_err();
        assert!(matches!(err, CrossingError::InvalidParameter { .. }));
    }

    #[test]
    fn test_from_toml_rejects_bad_event_channel() {
        let err = DetectorConfig::from_toml_str("[channels]\nevent = 16\n").unwrap_err();
        assert!(matches!(err, CrossingError::EventChannelOutOfRange { .. }));
    }

    #[test]
    fn test_from_toml_rejects_unbounded_random_range() {
        let err = DetectorConfig::from_toml_str("[threshold]\nmode = \"random\"\nrandom_max = inf\n")
            .unwrap_err();
        assert!(matches!(
            err,
            CrossingError::InvalidParameter { name: "random threshold maximum", .. }
        ));

        let err = DetectorConfig::from_toml_str("[threshold]\nrandom_min = -3e38\nrandom_max = 3e38\n")
            .unwrap_err();
        assert!(matches!(
            err,
            CrossingError::InvalidParameter { name: "random threshold range", .. }
        ));
    }

    #[test]
    fn test_updates_place_mode_after_reference_channel() {
        let mut config = DetectorConfig::default();
        config.threshold.mode = ThresholdMode::Channel;
        config.channels.threshold = Some(1);

        let updates = config.updates_for_stream(3);
        let reference = updates
            .iter()
            .position(|u| matches!(u, ParameterUpdate::ThresholdChannel { stream: 3, channel: 1 }))
            .unwrap();
        let mode = updates
            .iter()
            .position(|u| matches!(u, ParameterUpdate::ThresholdMode(ThresholdMode::Channel)))
            .unwrap();
        assert!(reference < mode);
    }

    #[test]
    fn test_args_override_defaults() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cli {
            #[command(flatten)]
            detector: DetectorArgs,
        }

        let cli = Cli::try_parse_from([
            "test",
            "--threshold",
            "-0.5",
            "--falling",
            "--past-span",
            "4",
            "--random-range",
            "-2,3",
            "--jump-limit",
            "1.5",
        ])
        .unwrap();
        let config = cli.detector.resolve().unwrap();
        assert_eq!(config.threshold.constant, -0.5);
        assert_eq!(config.threshold.random_min, -2.0);
        assert_eq!(config.threshold.random_max, 3.0);
        assert!(config.rising && config.falling);
        assert_eq!(config.voting.past_span, 4);
        assert!(config.jump_limit.enabled);

        let cli = Cli::try_parse_from(["test", "--past-strictness", "2"]).unwrap();
        assert!(cli.detector.resolve().is_err());
    }
}
