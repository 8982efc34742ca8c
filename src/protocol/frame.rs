//! Frame header and frame types

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Instant;

use crate::error::ProtocolError;

/// Size of the fixed frame header in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Payload types carried by the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PayloadType {
    VideoDimension = 10,
    VideoData = 11,
    AudioSampleRate = 12,
    AudioData = 13,
}

impl PayloadType {
    pub fn name(self) -> &'static str {
        match self {
            PayloadType::VideoDimension => "VIDEO_DIMENSION",
            PayloadType::VideoData => "VIDEO_DATA",
            PayloadType::AudioSampleRate => "AUDIO_SAMPLERATE",
            PayloadType::AudioData => "AUDIO_DATA",
        }
    }
}

impl TryFrom<u32> for PayloadType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(PayloadType::VideoDimension),
            11 => Ok(PayloadType::VideoData),
            12 => Ok(PayloadType::AudioSampleRate),
            13 => Ok(PayloadType::AudioData),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

impl From<PayloadType> for u32 {
    fn from(value: PayloadType) -> Self {
        value as u32
    }
}

/// Fixed-size frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type identifier, possibly unknown
    pub kind: u32,
    /// Payload length in bytes
    pub length: u32,
}

impl FrameHeader {
    /// Parse a header from the start of `buf`.
    /// Returns `None` if fewer than `FRAME_HEADER_SIZE` bytes are available.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        let kind = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Some(Self { kind, length })
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.kind);
        buf.put_u32_le(self.length);
    }

    /// Total size on the wire including the header
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.length as usize
    }
}

/// One complete frame reconstructed from the wire.
///
/// Immutable once built; shared as `Arc<Frame>` between the demultiplexer
/// queue and the pending audio cache.
#[derive(Debug, Clone)]
pub struct Frame {
    kind: u32,
    payload: Bytes,
    arrival: Instant,
}

impl Frame {
    pub fn new(kind: u32, payload: Bytes, arrival: Instant) -> Self {
        Self { kind, payload, arrival }
    }

    /// Build a frame of a known type stamped with the current time
    pub fn with_type(payload_type: PayloadType, payload: impl Into<Bytes>) -> Self {
        Self::new(payload_type.into(), payload.into(), Instant::now())
    }

    /// Raw type identifier as received
    pub fn kind(&self) -> u32 {
        self.kind
    }

    /// Resolve the type identifier
    pub fn payload_type(&self) -> Result<PayloadType, ProtocolError> {
        PayloadType::try_from(self.kind)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Time at which the frame header was first fully observed
    pub fn arrival(&self) -> Instant {
        self.arrival
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            kind: self.kind,
            length: self.payload.len() as u32,
        }
    }

    /// Serialize header and payload as they appear on the wire
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        self.header().write_to(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl PartialEq for Frame {
    /// Frames compare by content; arrival time is diagnostic only
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }
}

impl Eq for Frame {}
