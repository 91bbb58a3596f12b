/// One block of interleaved frames from a [`SampleSource`](super::SampleSource)
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Frames lost between the previous block and this one
    pub gap_frames: u64,
    pub samples: Vec<f32>,
}

impl SampleBlock {
    /// A block that directly follows the previous one
    pub fn contiguous(samples: Vec<f32>) -> Self {
        Self {
            gap_frames: 0,
            samples,
        }
    }
}

/// Per-channel sample buffers filled from interleaved audio
///
/// Tracks the absolute index of the first sample so consecutive blocks can
/// be handed to the detector as one continuous stream.
#[derive(Debug, Clone)]
pub struct ChannelBuffers {
    channels: Vec<Vec<f32>>,
    first_sample: i64,
    next_sample: i64,
}

impl ChannelBuffers {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channels: vec![Vec::new(); channel_count],
            first_sample: 0,
            next_sample: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Replace the contents with one block of interleaved frames
    /// [c0, c1, ..., c0, c1, ...]. A trailing partial frame is ignored.
    fn push_interleaved(&mut self, data: &[f32]) {
        let count = self.channels.len();
        if count == 0 {
            return;
        }
        for channel in &mut self.channels {
            channel.clear();
        }
        for frame in data.chunks_exact(count) {
            for (channel, &sample) in self.channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        self.first_sample = self.next_sample;
        self.next_sample += self.len() as i64;
    }

    /// Replace the contents with `block`, numbering its first frame after
    /// any frames the source lost
    pub fn push_block(&mut self, block: &SampleBlock) {
        self.next_sample += block.gap_frames as i64;
        self.push_interleaved(&block.samples);
    }

    /// Absolute index of the first sample of the current block
    pub fn first_sample(&self) -> i64 {
        self.first_sample
    }

    /// Frames in the current block
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Borrow every channel, for building a [`StreamBuffer`](crate::stream::StreamBuffer)
    pub fn channel_slices(&self) -> Vec<&[f32]> {
        self.channels.iter().map(Vec::as_slice).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_and_count() {
        let mut buffers = ChannelBuffers::new(3);
        buffers.push_interleaved(&[0.0, 1.0, 2.0, 10.0, 11.0, 12.0, 99.0]);
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers.channel(0), Some(&[0.0, 10.0][..]));
        assert_eq!(buffers.channel(2), Some(&[2.0, 12.0][..]));
        assert_eq!(buffers.first_sample(), 0);

        buffers.push_interleaved(&[3.0, 4.0, 5.0]);
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers.first_sample(), 2);
        assert_eq!(buffers.channel_slices().len(), 3);
    }

    #[test]
    fn test_gap_advances_sample_numbering() {
        let mut buffers = ChannelBuffers::new(2);
        buffers.push_block(&SampleBlock::contiguous(vec![0.0; 8]));
        assert_eq!(buffers.first_sample(), 0);

        buffers.push_block(&SampleBlock {
            gap_frames: 12,
            samples: vec![1.0, 2.0, 3.0, 4.0],
        });
        assert_eq!(buffers.first_sample(), 16);
        assert_eq!(buffers.channel(1), Some(&[2.0, 4.0][..]));

        buffers.push_block(&SampleBlock::contiguous(Vec::new()));
        assert!(buffers.is_empty());
        assert_eq!(buffers.first_sample(), 18);
    }
}
