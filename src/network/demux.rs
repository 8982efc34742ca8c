//! Length-prefixed frame demultiplexer
//!
//! Turns an arbitrarily chunked byte stream into a FIFO of complete frames.
//! Transport reads may split a header, split a payload, or carry several
//! frames at once; `ingest` accepts any of these and the caller drains with
//! `has_complete_frame` / `pop_frame` until empty.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::constants::DEFAULT_MAX_PAYLOAD_LEN;
use crate::error::ProtocolError;
use crate::network::buffer::ByteIngestBuffer;
use crate::protocol::{Frame, FrameHeader, FRAME_HEADER_SIZE};

/// Streaming frame demultiplexer
pub struct FrameDemultiplexer {
    /// Unparsed bytes: at most one partial frame
    buffer: ByteIngestBuffer,
    /// Complete frames in arrival order
    ready: VecDeque<Arc<Frame>>,
    /// Header of the partial frame at the front of `buffer`, once seen
    pending: Option<(FrameHeader, Instant)>,
    max_payload_len: usize,
    /// Set after a malformed header; cleared only by `reset`
    fault: Option<ProtocolError>,
    first_frame_time: Option<Instant>,
    bytes_ingested: u64,
    frames_parsed: u64,
}

impl Default for FrameDemultiplexer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_LEN)
    }
}

impl FrameDemultiplexer {
    /// Create a demultiplexer rejecting payloads longer than `max_payload_len`
    pub fn new(max_payload_len: usize) -> Self {
        Self {
            buffer: ByteIngestBuffer::new(),
            ready: VecDeque::new(),
            pending: None,
            max_payload_len,
            fault: None,
            first_frame_time: None,
            bytes_ingested: 0,
            frames_parsed: 0,
        }
    }

    /// Append received bytes and extract every frame they complete.
    ///
    /// Fails only with `MalformedFrameHeader`, after which all further input
    /// is refused until `reset`.
    pub fn ingest(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        self.bytes_ingested += data.len() as u64;
        self.buffer.extend(data);
        self.extract()
    }

    /// Whether at least one complete frame is queued
    pub fn has_complete_frame(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Remove and return the oldest complete frame
    pub fn pop_frame(&mut self) -> Result<Arc<Frame>, ProtocolError> {
        self.ready.pop_front().ok_or(ProtocolError::PreconditionViolation(
            "pop_frame called without a complete frame",
        ))
    }

    /// Discard all buffered bytes, queued frames and partial state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.ready.clear();
        self.pending = None;
        self.fault = None;
        self.first_frame_time = None;
        self.bytes_ingested = 0;
        self.frames_parsed = 0;
    }

    /// Time the first frame header of this stream was observed
    pub fn first_frame_time(&self) -> Option<Instant> {
        self.first_frame_time
    }

    pub fn stats(&self) -> DemuxStats {
        DemuxStats {
            bytes_ingested: self.bytes_ingested,
            frames_parsed: self.frames_parsed,
            buffered_bytes: self.buffer.len(),
            queued_frames: self.ready.len(),
        }
    }

    fn extract(&mut self) -> Result<(), ProtocolError> {
        loop {
            let (header, arrival) = match self.pending {
                Some(pending) => pending,
                None => {
                    let Some(header) = FrameHeader::parse(self.buffer.peek()) else {
                        return Ok(());
                    };

                    if header.length as usize > self.max_payload_len {
                        let fault = ProtocolError::MalformedFrameHeader {
                            length: header.length as usize,
                            limit: self.max_payload_len,
                        };
                        tracing::error!("Demultiplexer: {}", fault);
                        self.fault = Some(fault.clone());
                        return Err(fault);
                    }

                    let arrival = Instant::now();
                    self.first_frame_time.get_or_insert(arrival);
                    self.buffer.reserve(header.frame_len().saturating_sub(self.buffer.len()));
                    self.pending = Some((header, arrival));
                    (header, arrival)
                }
            };

            if self.buffer.len() < header.frame_len() {
                return Ok(());
            }

            self.buffer.advance(FRAME_HEADER_SIZE);
            let payload = self.buffer.split_front(header.length as usize);
            self.pending = None;
            self.frames_parsed += 1;
            self.ready.push_back(Arc::new(Frame::new(header.kind, payload, arrival)));
        }
    }
}

/// Demultiplexer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DemuxStats {
    pub bytes_ingested: u64,
    pub frames_parsed: u64,
    pub buffered_bytes: usize,
    pub queued_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AudioData, AudioSampleRate, PayloadType, VideoDimension};
    use bytes::Bytes;
    use proptest::prelude::*;

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::with_type(
                PayloadType::VideoDimension,
                VideoDimension { width: 1280, height: 720 }.encode(),
            ),
            Frame::with_type(PayloadType::AudioSampleRate, AudioSampleRate(44100).encode()),
            Frame::with_type(
                PayloadType::AudioData,
                AudioData::encode(1, 2, &[0.1, 0.2, 0.3, 0.4]),
            ),
            Frame::with_type(PayloadType::VideoData, vec![0u8, 0, 0, 1, 0x65, 0x88, 0x84]),
            Frame::with_type(PayloadType::VideoData, Bytes::new()),
            Frame::new(77, Bytes::from_static(b"unknown"), Instant::now()),
        ]
    }

    fn wire(frames: &[Frame]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.encode().to_vec()).collect()
    }

    fn drain(demux: &mut FrameDemultiplexer) -> Vec<Arc<Frame>> {
        let mut out = Vec::new();
        while demux.has_complete_frame() {
            out.push(demux.pop_frame().unwrap());
        }
        out
    }

    #[test]
    fn test_single_ingest_many_frames() {
        let frames = sample_frames();
        let mut demux = FrameDemultiplexer::default();
        demux.ingest(&wire(&frames)).unwrap();

        let out = drain(&mut demux);
        assert_eq!(out.len(), frames.len());
        for (got, want) in out.iter().zip(&frames) {
            assert_eq!(got.as_ref(), want);
        }
        assert_eq!(demux.stats().buffered_bytes, 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let frames = sample_frames();
        let bytes = wire(&frames);
        let mut demux = FrameDemultiplexer::default();
        let mut out = Vec::new();
        for b in &bytes {
            demux.ingest(std::slice::from_ref(b)).unwrap();
            out.extend(drain(&mut demux));
        }
        assert_eq!(out.len(), frames.len());
        assert_eq!(demux.stats().bytes_ingested, bytes.len() as u64);
        assert_eq!(demux.stats().frames_parsed, frames.len() as u64);
    }

    #[test]
    fn test_partial_header_never_complete() {
        let bytes = wire(&sample_frames()[..1]);
        let mut demux = FrameDemultiplexer::default();
        for b in &bytes[..FRAME_HEADER_SIZE - 1] {
            demux.ingest(std::slice::from_ref(b)).unwrap();
            assert!(!demux.has_complete_frame());
        }
        // header complete but payload missing
        demux.ingest(&bytes[FRAME_HEADER_SIZE - 1..FRAME_HEADER_SIZE]).unwrap();
        assert!(!demux.has_complete_frame());
        demux.ingest(&bytes[FRAME_HEADER_SIZE..]).unwrap();
        assert!(demux.has_complete_frame());
    }

    #[test]
    fn test_empty_ingest_is_noop() {
        let mut demux = FrameDemultiplexer::default();
        demux.ingest(&[]).unwrap();
        assert!(!demux.has_complete_frame());
        assert_eq!(demux.stats(), DemuxStats::default());
    }

    #[test]
    fn test_pop_without_frame_fails() {
        let mut demux = FrameDemultiplexer::default();
        assert!(matches!(
            demux.pop_frame(),
            Err(ProtocolError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let frames = sample_frames();
        let bytes = wire(&frames[..1]);
        let mut demux = FrameDemultiplexer::default();

        // a complete frame and half of another
        demux.ingest(&bytes).unwrap();
        demux.ingest(&bytes[..bytes.len() / 2]).unwrap();
        demux.reset();
        assert!(!demux.has_complete_frame());

        // the old tail must not be completed by new bytes
        demux.ingest(&bytes[bytes.len() / 2..]).unwrap();
        assert!(!demux.has_complete_frame());

        // a fresh stream after reset parses normally
        let mut demux = FrameDemultiplexer::default();
        demux.ingest(&bytes[..3]).unwrap();
        demux.reset();
        demux.ingest(&bytes).unwrap();
        let out = drain(&mut demux);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref(), &frames[0]);
    }

    #[test]
    fn test_malformed_length_is_fatal_until_reset() {
        let mut demux = FrameDemultiplexer::new(1024);
        let mut header = bytes::BytesMut::new();
        FrameHeader { kind: 11, length: 4096 }.write_to(&mut header);

        assert_eq!(
            demux.ingest(&header),
            Err(ProtocolError::MalformedFrameHeader { length: 4096, limit: 1024 })
        );
        assert!(demux.stats().buffered_bytes <= FRAME_HEADER_SIZE);
        assert!(demux.ingest(&[0; 16]).is_err());

        demux.reset();
        demux.ingest(&wire(&sample_frames()[..1])).unwrap();
        assert!(demux.has_complete_frame());
    }

    #[test]
    fn test_frames_before_malformed_header_are_kept() {
        let frames = sample_frames();
        let mut bytes = wire(&frames[..2]);
        let mut bad = bytes::BytesMut::new();
        FrameHeader { kind: 11, length: u32::MAX }.write_to(&mut bad);
        bytes.extend_from_slice(&bad);

        let mut demux = FrameDemultiplexer::new(1 << 20);
        assert!(demux.ingest(&bytes).is_err());
        assert_eq!(drain(&mut demux).len(), 2);
    }

    #[test]
    fn test_arrival_time_recorded_at_header() {
        let bytes = wire(&sample_frames()[..1]);
        let mut demux = FrameDemultiplexer::default();
        demux.ingest(&bytes[..FRAME_HEADER_SIZE]).unwrap();
        let after_header = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        demux.ingest(&bytes[FRAME_HEADER_SIZE..]).unwrap();

        let frame = demux.pop_frame().unwrap();
        assert!(frame.arrival() <= after_header);
        assert_eq!(demux.first_frame_time(), Some(frame.arrival()));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_chunking_preserves_frames(
            payloads in prop::collection::vec(
                (
                    prop::sample::select(vec![10u32, 11, 12, 13, 99]),
                    prop::collection::vec(any::<u8>(), 0..64),
                ),
                1..12,
            ),
            cuts in prop::collection::vec(1usize..40, 1..64),
        ) {
            let frames: Vec<Frame> = payloads
                .into_iter()
                .map(|(kind, data)| Frame::new(kind, Bytes::from(data), Instant::now()))
                .collect();
            let bytes = wire(&frames);

            let mut demux = FrameDemultiplexer::default();
            let mut out = Vec::new();
            let mut offset = 0;
            let mut cut_iter = cuts.iter().cycle();
            while offset < bytes.len() {
                let len = (*cut_iter.next().unwrap()).min(bytes.len() - offset);
                demux.ingest(&bytes[offset..offset + len]).unwrap();
                offset += len;
                out.extend(drain(&mut demux));
            }

            prop_assert_eq!(out.len(), frames.len());
            for (got, want) in out.iter().zip(&frames) {
                prop_assert_eq!(got.as_ref(), want);
            }
            prop_assert_eq!(demux.stats().buffered_bytes, 0);
        }
    }
}
