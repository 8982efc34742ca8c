//! Latest-frame handoff between the tick and render paths
//!
//! The tick path replaces the frame with a pointer swap; the render path
//! clones the `Arc` it finds. Neither holds the lock across any real work, so
//! rendering never waits on decoding.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::pipeline::sink::{VideoFrame, VideoSink};

/// Holds at most one converted frame
#[derive(Default)]
pub struct FrameSlot {
    current: Mutex<Option<Arc<VideoFrame>>>,
    presented: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame to display, or `None` if nothing has been decoded yet
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.current.lock().clone()
    }

    /// Total frames presented since creation
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

impl VideoSink for FrameSlot {
    fn present(&self, frame: Arc<VideoFrame>) {
        let previous = self.current.lock().replace(frame);
        self.presented.fetch_add(1, Ordering::Relaxed);
        // release the old buffer outside the lock
        drop(previous);
    }

    fn clear(&self) {
        let previous = self.current.lock().take();
        drop(previous);
    }
}
