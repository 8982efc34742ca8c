//! Typed views over frame payloads

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the header preceding the samples of an AUDIO_DATA payload
pub const AUDIO_DATA_HEADER_SIZE: usize = 16;

fn require(kind: &'static str, payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() < expected {
        return Err(ProtocolError::PayloadTooShort {
            kind,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// VIDEO_DIMENSION payload: `{i32 width; i32 height}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimension {
    pub width: u32,
    pub height: u32,
}

impl VideoDimension {
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        require("VIDEO_DIMENSION", payload, 8)?;
        let width = read_i32(payload, 0);
        let height = read_i32(payload, 4);
        if width <= 0 || height <= 0 {
            return Err(ProtocolError::InvalidPayload(format!(
                "non-positive dimension {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width: width as u32,
            height: height as u32,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_i32_le(self.width as i32);
        buf.put_i32_le(self.height as i32);
        buf.freeze()
    }
}

/// AUDIO_SAMPLERATE payload: `{u32 sampleRate}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSampleRate(pub u32);

impl AudioSampleRate {
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        require("AUDIO_SAMPLERATE", payload, 4)?;
        Ok(Self(read_u32(payload, 0)))
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_le_bytes())
    }
}

/// AUDIO_DATA payload: `{u64 timestamp; i32 channels; i32 dataLength}`
/// followed by `dataLength` bytes of interleaved `f32` samples.
#[derive(Debug, Clone, Copy)]
pub struct AudioData<'a> {
    pub timestamp: u64,
    pub channels: i32,
    /// Raw little-endian sample bytes, exactly `dataLength` long
    pub data: &'a [u8],
}

impl<'a> AudioData<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self, ProtocolError> {
        require("AUDIO_DATA", payload, AUDIO_DATA_HEADER_SIZE)?;
        let timestamp = u64::from_le_bytes([
            payload[0], payload[1], payload[2], payload[3],
            payload[4], payload[5], payload[6], payload[7],
        ]);
        let channels = read_i32(payload, 8);
        let data_length = read_i32(payload, 12);
        if data_length < 0 {
            return Err(ProtocolError::InvalidPayload(format!(
                "negative audio data length {}",
                data_length
            )));
        }

        let data_length = data_length as usize;
        require("AUDIO_DATA", payload, AUDIO_DATA_HEADER_SIZE + data_length)?;

        Ok(Self {
            timestamp,
            channels,
            data: &payload[AUDIO_DATA_HEADER_SIZE..AUDIO_DATA_HEADER_SIZE + data_length],
        })
    }

    /// Decode the sample bytes into `f32` values.
    /// A trailing partial sample is ignored.
    pub fn samples(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Build an AUDIO_DATA payload from interleaved samples
    pub fn encode(timestamp: u64, channels: i32, samples: &[f32]) -> Bytes {
        let mut buf = BytesMut::with_capacity(AUDIO_DATA_HEADER_SIZE + samples.len() * 4);
        buf.put_u64_le(timestamp);
        buf.put_i32_le(channels);
        buf.put_i32_le((samples.len() * 4) as i32);
        for s in samples {
            buf.put_f32_le(*s);
        }
        buf.freeze()
    }
}
