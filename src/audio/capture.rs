use crate::config::AudioConfig;
use crate::error::{CrossingError, Result};
use audio_thread_priority::RtPriorityHandle;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, TrySendError};

use super::SampleBlock;

/// Live capture of an N-channel input from the default device
///
/// Blocks are handed to the processing thread without ever blocking the
/// audio callback. Blocks that do not fit in the channel are dropped and
/// their length is reported as `gap_frames` on the next block that is
/// delivered, so sample numbering downstream stays aligned with the device.
pub struct AudioCapture {
    stream: cpal::Stream,
    _rt_handle: Option<RtPriorityHandle>,
}

impl AudioCapture {
    pub fn new(config: &AudioConfig, tx: Sender<SampleBlock>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| CrossingError::AudioDevice("No input device found".into()))?;

        match device.description() {
            Ok(desc) => log::info!("Input device: {:?}", desc),
            Err(_) => log::info!("Input device: Unknown"),
        }

        let max_channels = device
            .supported_input_configs()
            .map_err(|e| CrossingError::AudioDevice(e.to_string()))?
            .map(|range| range.channels())
            .max()
            .unwrap_or(0);
        if config.channels == 0 || config.channels > max_channels {
            return Err(CrossingError::AudioDevice(format!(
                "{} input channels requested, device offers at most {}",
                config.channels, max_channels
            )));
        }

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size as u32),
        };

        let mut sender = BlockSender::new(tx, config.channels as usize);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| sender.send(data),
                |err| log::warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| CrossingError::AudioStream(format!("{}", e)))?;

        let rt_handle = match audio_thread_priority::promote_current_thread_to_real_time(
            config.buffer_size as u32,
            config.sample_rate,
        ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Could not set real-time priority: {}", e);
                None
            }
        };

        stream
            .play()
            .map_err(|e| CrossingError::AudioStream(format!("{}", e)))?;
        log::info!(
            "Capturing {} channel(s) at {} Hz, {} frames per block",
            config.channels,
            config.sample_rate,
            config.buffer_size
        );

        Ok(Self {
            stream,
            _rt_handle: rt_handle,
        })
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        let _ = self.stream.pause();
    }
}

/// Callback side of the capture channel
///
/// Counts the frames of every block it has to drop and attaches the count to
/// the next block that gets through.
struct BlockSender {
    tx: Sender<SampleBlock>,
    channels: usize,
    dropped_frames: u64,
}

impl BlockSender {
    fn new(tx: Sender<SampleBlock>, channels: usize) -> Self {
        Self {
            tx,
            channels: channels.max(1),
            dropped_frames: 0,
        }
    }

    fn send(&mut self, data: &[f32]) {
        let block = SampleBlock {
            gap_frames: self.dropped_frames,
            samples: data.to_vec(),
        };
        match self.tx.try_send(block) {
            Ok(()) => self.dropped_frames = 0,
            Err(TrySendError::Full(block)) => {
                if self.dropped_frames == 0 {
                    log::warn!("Detector is not keeping up, dropping input");
                }
                self.dropped_frames += (block.samples.len() / self.channels) as u64;
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_frames_reported_on_next_block() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sender = BlockSender::new(tx, 2);

        sender.send(&[0.0; 8]);
        // channel full: the next two 4-frame blocks are lost
        sender.send(&[1.0; 8]);
        sender.send(&[2.0; 8]);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.gap_frames, 0);
        assert_eq!(first.samples, vec![0.0; 8]);

        sender.send(&[3.0; 8]);
        let resumed = rx.try_recv().unwrap();
        assert_eq!(resumed.gap_frames, 8);
        assert_eq!(resumed.samples, vec![3.0; 8]);

        sender.send(&[4.0; 8]);
        assert_eq!(rx.try_recv().unwrap().gap_frames, 0);
    }
}
