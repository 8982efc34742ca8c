//! Pending audio cache
//!
//! Audio frames wait here until enough video has been decoded to release
//! them. Entries are appended at the tail with a strictly increasing
//! audio-frame-index and consumed only from the head. When the cache is full
//! the oldest entry is evicted to make room.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::protocol::Frame;

/// Cached AUDIO_DATA frame
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub index: u64,
    /// Sample rate in effect when the frame arrived
    pub sample_rate: u32,
    pub frame: Arc<Frame>,
}

/// FIFO of audio frames keyed by arrival index
#[derive(Debug)]
pub struct PendingAudioCache {
    entries: VecDeque<CachedAudio>,
    next_index: u64,
    limit: usize,
}

impl Default for PendingAudioCache {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

/// Result of appending to the cache
#[derive(Debug)]
pub struct Pushed {
    /// Index the new frame was tagged with
    pub index: u64,
    /// Oldest entry dropped to stay within the limit
    pub evicted: Option<CachedAudio>,
}

impl PendingAudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `limit` entries (at least one)
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_index: 0,
            limit: limit.max(1),
        }
    }

    /// Append a frame, evicting the oldest entry if the cache is full
    pub fn push(&mut self, frame: Arc<Frame>, sample_rate: u32) -> Pushed {
        let evicted = if self.entries.len() >= self.limit {
            self.entries.pop_front()
        } else {
            None
        };

        let index = self.next_index;
        self.entries.push_back(CachedAudio {
            index,
            sample_rate,
            frame,
        });
        self.next_index += 1;
        Pushed { index, evicted }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Remove every head entry whose index is `<= clock`, in index order
    pub fn drain_through(&mut self, clock: u64) -> Vec<CachedAudio> {
        let count = self
            .entries
            .iter()
            .take_while(|entry| entry.index <= clock)
            .count();
        self.entries.drain(..count).collect()
    }

    /// Index the next pushed frame will receive
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop pending entries without emitting them
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop pending entries and restart indices at zero
    pub fn reset(&mut self) {
        self.entries.clear();
        self.next_index = 0;
    }
}
