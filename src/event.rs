//! Crossing events and the sink they are delivered to.

use serde::Serialize;

use crate::stream::StreamId;

/// Direction of a threshold crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From at-or-below to above the threshold
    Rising,
    /// From above to at-or-below the threshold
    Falling,
}

impl Direction {
    pub fn is_rising(self) -> bool {
        matches!(self, Self::Rising)
    }
}

/// Whether an event turns the output on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Onset,
    Offset,
}

/// One onset or offset produced by a detected crossing
///
/// Offsets carry the same crossing metadata as the onset they close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossingEvent {
    pub kind: EventKind,
    pub stream_id: StreamId,
    pub event_channel: u8,
    /// Absolute sample number at which the event takes effect
    pub sample_number: i64,
    /// Absolute index of the first sample after the crossing
    pub crossing_point: i64,
    /// Signal value at the first sample after the crossing
    pub crossing_level: f32,
    /// Threshold at the first sample after the crossing
    pub threshold: f32,
    pub direction: Direction,
}

impl CrossingEvent {
    pub fn is_onset(&self) -> bool {
        self.kind == EventKind::Onset
    }

    /// The offset event closing this onset `duration` samples later
    pub fn offset_after(&self, duration: usize) -> Self {
        Self {
            kind: EventKind::Offset,
            sample_number: self.sample_number + duration as i64,
            ..*self
        }
    }
}

/// Consumer of detector output
///
/// `buffer_offset` is the position within the buffer being processed at
/// which the event occurs.
pub trait EventSink {
    fn emit(&mut self, event: CrossingEvent, buffer_offset: usize);
}

/// An event together with its position in the buffer that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmittedEvent {
    pub buffer_offset: usize,
    pub event: CrossingEvent,
}

impl EventSink for Vec<EmittedEvent> {
    fn emit(&mut self, event: CrossingEvent, buffer_offset: usize) {
        self.push(EmittedEvent {
            buffer_offset,
            event,
        });
    }
}

/// Adapts a closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F: FnMut(CrossingEvent, usize)> EventSink for FnSink<F> {
    fn emit(&mut self, event: CrossingEvent, buffer_offset: usize) {
        (self.0)(event, buffer_offset)
    }
}
