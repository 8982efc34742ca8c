//! # MRC Receiver
//!
//! Receives a mixed reality capture stream from a headset over TCP and turns
//! it into decoded video frames and synchronized audio blocks.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          HEADSET (peer)                              │
//! │   [type|length|payload] [type|length|payload] ...   over TCP        │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ arbitrary chunking
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ MrcSource (source)                   one lock, driven by on_tick()   │
//! │  ┌────────────────┐   ┌──────────────────────┐   ┌───────────────┐  │
//! │  │ TcpTransport   │──▶│ FrameDemultiplexer   │──▶│ Arc<Frame>    │  │
//! │  │ (network)      │   │ ByteIngestBuffer     │   │ FIFO          │  │
//! │  └────────────────┘   └──────────────────────┘   └───────┬───────┘  │
//! │                                                          ▼          │
//! │  ┌────────────────────────────────────────────────────────────────┐ │
//! │  │ DecodeSyncPipeline (pipeline)                                  │ │
//! │  │   VIDEO_DIMENSION ─▶ geometry    AUDIO_SAMPLERATE ─▶ rate      │ │
//! │  │   AUDIO_DATA ─▶ PendingAudioCache                              │ │
//! │  │   VIDEO_DATA ─▶ VideoDecoder ─▶ drain audio ≤ counter          │ │
//! │  │                       └─▶ ColorConverter ─▶ FrameSlot          │ │
//! │  └────────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────┬───────────────────────┬──────────────┘
//!                                ▼                       ▼
//!                          AudioSink               on_render()
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod source;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default output width (two eyes side by side)
    pub const DEFAULT_WIDTH: u32 = 1920 * 2;

    /// Default output height
    pub const DEFAULT_HEIGHT: u32 = 1080;

    /// Default audio sample rate until the peer announces one
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default headset address
    pub const DEFAULT_ADDRESS: &str = "192.168.0.1";

    /// Default headset capture port
    pub const DEFAULT_PORT: u16 = 28734;

    /// Bytes requested per non-blocking transport read
    pub const READ_CHUNK_SIZE: usize = 65536;

    /// Largest payload accepted before the stream is declared malformed
    pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

    /// Audio frames held while waiting for a decoded picture
    pub const DEFAULT_MAX_PENDING_AUDIO: usize = 1024;

    /// Default scheduling tick interval in milliseconds
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

    /// Default HTTP port for the control API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;
}
