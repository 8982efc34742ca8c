//! Decode and synchronization pipeline

pub mod audio_cache;
pub mod sink;
pub mod slot;
pub mod sync;

pub use audio_cache::{CachedAudio, PendingAudioCache, Pushed};
pub use sink::{AudioBlock, AudioSink, ChannelAudioSink, Speakers, VideoFrame, VideoSink};
pub use slot::FrameSlot;
pub use sync::{DecodeSyncPipeline, PipelineState, PipelineStats, VideoGeometry};
