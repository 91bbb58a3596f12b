//! Limits and defaults shared by the configuration layer and the engine.

/// Highest selectable output event channel (0-based). Hosts expose 16 TTL lines.
pub const MAX_EVENT_CHANNEL: u8 = 15;

/// Milliseconds per second, for ms to sample conversions.
pub const MS_PER_SECOND: f32 = 1000.0;

/// Extra history slots kept beyond the two voting spans: the sample before
/// the crossing and the one leaving the past window.
pub const HISTORY_PADDING: usize = 2;
