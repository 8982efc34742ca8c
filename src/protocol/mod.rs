//! Wire protocol of the capture stream
//!
//! Every frame is an 8-byte little-endian header `{type: u32, length: u32}`
//! followed by exactly `length` payload bytes.

pub mod frame;
pub mod payload;

pub use frame::{Frame, FrameHeader, PayloadType, FRAME_HEADER_SIZE};
pub use payload::{AudioData, AudioSampleRate, VideoDimension, AUDIO_DATA_HEADER_SIZE};
