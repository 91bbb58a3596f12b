use crate::error::{CrossingError, Result};

/// Fixed-capacity circular store of the most recent values of a stream
///
/// Values are addressed by negative offsets relative to the start of the
/// buffer currently being processed: `lookup(-1)` is the last value appended,
/// `lookup(-capacity)` the oldest one still held. Slots that have never been
/// written since the last [`reset`](Self::reset) return `None`.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    slots: Vec<T>,
    next: usize,
    len: usize,
}

impl<T: Copy + Default> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity],
            next: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots written since the last reset (at most the capacity)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value stored `-offset` samples before the current buffer start
    ///
    /// Non-negative offsets belong to the current buffer and are never served
    /// from history.
    pub fn lookup(&self, offset: i64) -> Option<T> {
        if offset >= 0 {
            return None;
        }
        let back = offset.unsigned_abs() as usize;
        if back > self.len {
            return None;
        }
        let capacity = self.slots.len();
        let index = (self.next + capacity - back) % capacity;
        self.slots.get(index).copied()
    }

    /// Push values in order, evicting the oldest once full
    pub fn append(&mut self, values: &[T]) {
        let capacity = self.slots.len();
        if capacity == 0 {
            return;
        }
        let kept = &values[values.len().saturating_sub(capacity)..];
        for &value in kept {
            self.slots[self.next] = value;
            self.next = (self.next + 1) % capacity;
        }
        self.len = (self.len + kept.len()).min(capacity);
    }

    /// Forget every stored value
    pub fn reset(&mut self) {
        self.next = 0;
        self.len = 0;
    }

    /// Change the capacity. Only valid on an empty buffer.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if !self.is_empty() {
            return Err(CrossingError::HistoryNotEmpty(self.len));
        }
        self.slots = vec![T::default(); capacity];
        self.next = 0;
        Ok(())
    }
}
