//! Output sinks for emitted audio and converted video

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::codec::PixelBuffer;

/// Speaker layout of an emitted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speakers {
    Mono,
    Stereo,
}

impl Speakers {
    /// Layout for a channel count, if supported
    pub fn from_channels(channels: i32) -> Option<Self> {
        match channels {
            1 => Some(Speakers::Mono),
            2 => Some(Speakers::Stereo),
            _ => None,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            Speakers::Mono => 1,
            Speakers::Stereo => 2,
        }
    }
}

/// Block of interleaved float samples ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    pub speakers: Speakers,
    /// Samples per channel
    pub frames: u32,
    pub sample_rate: u32,
    /// Replay timestamp as sent by the headset
    pub timestamp: u64,
    /// Audio-frame-index the block was cached under
    pub index: u64,
}

impl AudioBlock {
    /// Duration of the block in microseconds
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames as u64 * 1_000_000) / self.sample_rate as u64
    }
}

/// Converted picture ready for display
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub buffer: PixelBuffer,
    /// Value of the video frame counter after this picture was decoded
    pub sequence: u64,
    /// Arrival time of the VIDEO_DATA frame it was decoded from
    pub arrival: Instant,
}

/// Receives synchronized audio
pub trait AudioSink: Send + Sync {
    fn output_audio(&self, block: AudioBlock);
}

/// Receives converted video frames
pub trait VideoSink: Send + Sync {
    /// Replace the current frame
    fn present(&self, frame: Arc<VideoFrame>);

    /// Drop the current frame (connection closed)
    fn clear(&self) {}
}

/// Forwards audio blocks over a bounded channel, dropping when full
pub struct ChannelAudioSink {
    tx: Sender<AudioBlock>,
    dropped: AtomicU64,
}

impl ChannelAudioSink {
    /// Create the sink and the receiving end
    pub fn new(capacity: usize) -> (Self, Receiver<AudioBlock>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Blocks dropped because the consumer fell behind or went away
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AudioSink for ChannelAudioSink {
    fn output_audio(&self, block: AudioBlock) {
        match self.tx.try_send(block) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
