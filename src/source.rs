//! Connection context
//!
//! `MrcSource` owns the transport, the demultiplexer and the decode pipeline
//! for a single headset connection. All mutating entry points (tick, connect,
//! disconnect, settings) serialize on one lock. The render path only reads
//! the latest-frame slot and never takes that lock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::codec::{ConverterFactory, DecoderFactory};
use crate::config::AppConfig;
use crate::error::{NetworkError, Result};
use crate::network::{Connector, DemuxStats, FrameDemultiplexer, Transport};
use crate::pipeline::{
    AudioSink, DecodeSyncPipeline, FrameSlot, PipelineState, PipelineStats, VideoFrame,
    VideoGeometry,
};

/// Remote endpoint of the headset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub address: String,
    pub port: u16,
}

/// Snapshot reported to the host
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub connected: bool,
    pub address: String,
    pub port: u16,
    pub peer: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
    /// Delay between connect and the first frame header
    pub first_frame_ms: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub video_frame_counter: u64,
    pub pending_audio: usize,
    pub frames_presented: u64,
    pub demux: DemuxStats,
    pub pipeline: PipelineStats,
}

/// Work done by one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub bytes_received: usize,
    pub frames_processed: usize,
    /// The connection was closed during this tick
    pub disconnected: bool,
}

struct Connection {
    transport: Box<dyn Transport>,
    since: DateTime<Utc>,
    opened: Instant,
    first_frame_seen: bool,
}

impl Connection {
    fn first_frame_ms(&self, demux: &FrameDemultiplexer) -> Option<u64> {
        demux
            .first_frame_time()
            .map(|first| first.saturating_duration_since(self.opened).as_millis() as u64)
    }
}

struct SourceInner {
    settings: SourceSettings,
    connection: Option<Connection>,
    demux: FrameDemultiplexer,
    pipeline: DecodeSyncPipeline,
    read_buf: Vec<u8>,
}

impl SourceInner {
    fn close(&mut self) -> std::result::Result<(), NetworkError> {
        let Some(connection) = self.connection.take() else {
            return Err(NetworkError::NotConnected);
        };

        self.pipeline.stop();
        drop(connection);
        tracing::info!("Socket disconnected");
        Ok(())
    }

    fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();
        let Some(connection) = self.connection.as_mut() else {
            return summary;
        };

        loop {
            match connection.transport.poll_read(&mut self.read_buf) {
                Ok(Some(n)) => {
                    summary.bytes_received += n;
                    if let Err(e) = self.demux.ingest(&self.read_buf[..n]) {
                        tracing::error!("Stream error: {}, closing socket", e);
                        return self.abort(summary);
                    }
                }
                Ok(None) => break,
                Err(NetworkError::PeerClosed) => {
                    tracing::info!("Peer closed the connection");
                    return self.abort(summary);
                }
                Err(e) => {
                    tracing::error!("{}, closing socket", e);
                    return self.abort(summary);
                }
            }
        }

        if !connection.first_frame_seen {
            if let Some(ms) = connection.first_frame_ms(&self.demux) {
                connection.first_frame_seen = true;
                tracing::debug!("First frame header {} ms after connect", ms);
            }
        }

        while self.demux.has_complete_frame() {
            match self.demux.pop_frame() {
                Ok(frame) => {
                    self.pipeline.process(&frame);
                    summary.frames_processed += 1;
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    break;
                }
            }
        }

        summary
    }

    fn abort(&mut self, mut summary: TickSummary) -> TickSummary {
        // connection is known to be open here
        let _ = self.close();
        summary.disconnected = true;
        summary
    }
}

/// Mixed reality capture stream source
pub struct MrcSource {
    inner: Mutex<SourceInner>,
    connector: Box<dyn Connector>,
    slot: Arc<FrameSlot>,
}

impl MrcSource {
    pub fn new(
        config: &AppConfig,
        connector: Box<dyn Connector>,
        decoder_factory: DecoderFactory,
        converter_factory: ConverterFactory,
        audio_sink: Arc<dyn AudioSink>,
    ) -> Self {
        let slot = Arc::new(FrameSlot::new());
        let geometry = VideoGeometry {
            width: config.stream.default_width,
            height: config.stream.default_height,
        };
        let pipeline =
            DecodeSyncPipeline::new(decoder_factory, converter_factory, audio_sink, slot.clone())
                .with_defaults(geometry, config.stream.default_sample_rate)
                .with_pending_audio_limit(config.stream.max_pending_audio);

        Self {
            inner: Mutex::new(SourceInner {
                settings: SourceSettings {
                    address: config.network.address.clone(),
                    port: config.network.port,
                },
                connection: None,
                demux: FrameDemultiplexer::new(config.stream.max_payload_len),
                pipeline,
                read_buf: vec![0u8; config.network.read_chunk_size.max(1)],
            }),
            connector,
            slot,
        }
    }

    /// Connect to the configured endpoint
    pub fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let SourceSettings { address, port } = inner.settings.clone();
        self.connect_locked(&mut inner, &address, port)
    }

    /// Store a new endpoint and connect to it
    pub fn connect_to(&self, address: &str, port: u16) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.connection.is_some() {
            tracing::error!("Already connected");
            return Err(NetworkError::AlreadyConnected.into());
        }
        inner.settings = SourceSettings {
            address: address.to_string(),
            port,
        };
        self.connect_locked(&mut inner, address, port)
    }

    fn connect_locked(&self, inner: &mut SourceInner, address: &str, port: u16) -> Result<()> {
        if inner.connection.is_some() {
            tracing::error!("Already connected");
            return Err(NetworkError::AlreadyConnected.into());
        }

        let transport = self.connector.connect(address, port).map_err(|e| {
            tracing::error!("Unable to connect to {}:{}: {}", address, port, e);
            e
        })?;
        tracing::info!("Socket connected to {}:{}", address, port);

        inner.demux.reset();
        if let Err(e) = inner.pipeline.start() {
            tracing::error!("Unable to start decoder: {}", e);
            drop(transport);
            return Err(e.into());
        }

        inner.connection = Some(Connection {
            transport,
            since: Utc::now(),
            opened: Instant::now(),
            first_frame_seen: false,
        });
        Ok(())
    }

    /// Stop decoding and close the transport
    pub fn disconnect(&self) -> Result<()> {
        self.inner.lock().close().map_err(|e| {
            tracing::error!("Not connected");
            e.into()
        })
    }

    /// Pull ready bytes and advance the pipeline
    pub fn on_tick(&self) -> TickSummary {
        self.inner.lock().tick()
    }

    /// `on_tick` from a task on a multi-threaded tokio runtime.
    ///
    /// Decode and conversion run synchronously, so the worker is handed over
    /// to the blocking pool for the duration of the tick. Panics on a
    /// current-thread runtime.
    pub fn on_tick_in_place(&self) -> TickSummary {
        tokio::task::block_in_place(|| self.on_tick())
    }

    /// Latest converted frame, or `None` if nothing is ready yet
    pub fn on_render(&self) -> Option<Arc<VideoFrame>> {
        self.slot.latest()
    }

    /// Change the endpoint used by the next `connect`
    pub fn update(&self, settings: SourceSettings) {
        tracing::debug!("Settings updated: {}:{}", settings.address, settings.port);
        self.inner.lock().settings = settings;
    }

    pub fn settings(&self) -> SourceSettings {
        self.inner.lock().settings.clone()
    }

    pub fn width(&self) -> u32 {
        self.inner.lock().pipeline.geometry().width
    }

    pub fn height(&self) -> u32 {
        self.inner.lock().pipeline.geometry().height
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.inner.lock().pipeline.state()
    }

    pub fn status(&self) -> SourceStatus {
        let inner = self.inner.lock();
        let geometry = inner.pipeline.geometry();
        SourceStatus {
            connected: inner.connection.is_some(),
            address: inner.settings.address.clone(),
            port: inner.settings.port,
            peer: inner
                .connection
                .as_ref()
                .and_then(|c| c.transport.peer_addr())
                .map(|addr| addr.to_string()),
            connected_since: inner.connection.as_ref().map(|c| c.since),
            first_frame_ms: inner
                .connection
                .as_ref()
                .and_then(|c| c.first_frame_ms(&inner.demux)),
            width: geometry.width,
            height: geometry.height,
            sample_rate: inner.pipeline.sample_rate(),
            video_frame_counter: inner.pipeline.video_frame_counter(),
            pending_audio: inner.pipeline.pending_audio(),
            frames_presented: self.slot.presented(),
            demux: inner.demux.stats(),
            pipeline: inner.pipeline.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decoder_factory, software_converter_factory, VideoDecoder};
    use crate::error::{CodecError, Error};
    use crate::network::{TcpConnector, TransportSubsystem};
    use crate::pipeline::sync::tests::{Event, Recorder, ScriptedDecoder, TEST_GEOMETRY};
    use crate::protocol::{AudioData, AudioSampleRate, Frame, PayloadType, VideoDimension};
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    enum Chunk {
        Data(Vec<u8>),
        Close,
        Fail,
    }

    /// In-memory transport fed by the test through a channel
    struct ChannelTransport {
        rx: Receiver<Chunk>,
        partial: Vec<u8>,
    }

    impl Transport for ChannelTransport {
        fn poll_read(
            &mut self,
            buf: &mut [u8],
        ) -> std::result::Result<Option<usize>, NetworkError> {
            if self.partial.is_empty() {
                match self.rx.try_recv() {
                    Ok(Chunk::Data(data)) => self.partial = data,
                    Ok(Chunk::Close) => return Err(NetworkError::PeerClosed),
                    Ok(Chunk::Fail) => return Err(NetworkError::ReceiveFailed("reset".into())),
                    Err(_) => return Ok(None),
                }
            }
            let n = self.partial.len().min(buf.len());
            buf[..n].copy_from_slice(&self.partial[..n]);
            self.partial.drain(..n);
            Ok(Some(n))
        }

        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }
    }

    /// Hands out queued transports, failing when none is queued
    #[derive(Default)]
    struct QueuedConnector {
        queue: Mutex<VecDeque<Receiver<Chunk>>>,
    }

    impl QueuedConnector {
        fn push(&self) -> Sender<Chunk> {
            let (tx, rx) = unbounded();
            self.queue.lock().push_back(rx);
            tx
        }
    }

    impl Connector for Arc<QueuedConnector> {
        fn connect(
            &self,
            _address: &str,
            _port: u16,
        ) -> std::result::Result<Box<dyn Transport>, NetworkError> {
            match self.queue.lock().pop_front() {
                Some(rx) => Ok(Box::new(ChannelTransport { rx, partial: Vec::new() })),
                None => Err(NetworkError::ConnectionFailed("refused".into())),
            }
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.stream.default_width = TEST_GEOMETRY.width;
        config.stream.default_height = TEST_GEOMETRY.height;
        config.network.read_chunk_size = 7;
        config.stream.max_payload_len = 1024;
        config
    }

    fn source(connector: Box<dyn Connector>, recorder: &Arc<Recorder>) -> MrcSource {
        MrcSource::new(
            &test_config(),
            connector,
            decoder_factory(|| Ok(ScriptedDecoder::default())),
            software_converter_factory(),
            recorder.clone(),
        )
    }

    fn mock() -> (Arc<QueuedConnector>, Arc<Recorder>, MrcSource) {
        let connector = Arc::new(QueuedConnector::default());
        let recorder = Arc::new(Recorder::default());
        let source = source(Box::new(connector.clone()), &recorder);
        (connector, recorder, source)
    }

    fn stream() -> Vec<u8> {
        [
            Frame::with_type(
                PayloadType::VideoDimension,
                VideoDimension { width: 16, height: 4 }.encode(),
            ),
            Frame::with_type(PayloadType::AudioSampleRate, AudioSampleRate(44100).encode()),
            Frame::with_type(PayloadType::AudioData, AudioData::encode(100, 2, &[0.5; 8])),
            Frame::with_type(PayloadType::AudioData, AudioData::encode(200, 2, &[0.5; 8])),
            Frame::with_type(PayloadType::VideoData, vec![4u8, 4, 0, 0]),
        ]
        .iter()
        .flat_map(|f| f.encode().to_vec())
        .collect()
    }

    fn audio_indices(recorder: &Recorder) -> Vec<u64> {
        recorder
            .events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Audio { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tick_delivers_audio_and_video() {
        let (connector, recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();
        assert!(source.on_render().is_none());
        assert_eq!(source.status().first_frame_ms, None);

        for chunk in stream().chunks(5) {
            tx.send(Chunk::Data(chunk.to_vec())).unwrap();
        }
        let summary = source.on_tick();

        assert_eq!(summary.bytes_received, stream().len());
        assert_eq!(summary.frames_processed, 5);
        assert!(!summary.disconnected);
        assert_eq!(audio_indices(&recorder), vec![0, 1]);
        assert_eq!((source.width(), source.height()), (16, 4));

        let frame = source.on_render().unwrap();
        assert_eq!((frame.buffer.width, frame.buffer.height), (16, 4));
        assert_eq!(frame.sequence, 1);

        let status = source.status();
        assert!(status.connected);
        assert_eq!(status.sample_rate, 44100);
        assert_eq!(status.video_frame_counter, 1);
        assert_eq!(status.frames_presented, 1);
        assert!(status.connected_since.is_some());
        assert!(status.first_frame_ms.is_some());
    }

    #[test]
    fn test_first_frame_latency_cleared_on_disconnect() {
        let (connector, _recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();

        // a partial header does not count as a frame
        tx.send(Chunk::Data(stream()[..4].to_vec())).unwrap();
        source.on_tick();
        assert_eq!(source.status().first_frame_ms, None);

        tx.send(Chunk::Data(stream()[4..8].to_vec())).unwrap();
        source.on_tick();
        assert!(source.status().first_frame_ms.is_some());

        source.disconnect().unwrap();
        assert_eq!(source.status().first_frame_ms, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tick_in_place_on_runtime_worker() {
        let (connector, recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();
        tx.send(Chunk::Data(stream())).unwrap();

        let source = Arc::new(source);
        let ticking = source.clone();
        let summary = tokio::spawn(async move { ticking.on_tick_in_place() }).await.unwrap();

        assert_eq!(summary.frames_processed, 5);
        assert_eq!(audio_indices(&recorder), vec![0, 1]);
        assert!(source.on_render().is_some());
    }

    #[test]
    fn test_frame_split_across_ticks() {
        let (connector, recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();

        let bytes = stream();
        let (head, tail) = bytes.split_at(bytes.len() - 3);
        tx.send(Chunk::Data(head.to_vec())).unwrap();
        assert_eq!(source.on_tick().frames_processed, 4);
        assert!(source.on_render().is_none());
        assert_eq!(source.status().pending_audio, 2);

        tx.send(Chunk::Data(tail.to_vec())).unwrap();
        assert_eq!(source.on_tick().frames_processed, 1);
        assert_eq!(audio_indices(&recorder), vec![0, 1]);
        assert!(source.on_render().is_some());
    }

    #[test]
    fn test_connect_twice_and_disconnect_twice() {
        let (connector, _recorder, source) = mock();
        connector.push();
        connector.push();

        source.connect().unwrap();
        assert!(matches!(
            source.connect(),
            Err(Error::Network(NetworkError::AlreadyConnected))
        ));
        assert!(source.is_connected());

        source.disconnect().unwrap();
        assert!(matches!(
            source.disconnect(),
            Err(Error::Network(NetworkError::NotConnected))
        ));
        assert!(!source.is_connected());
        assert_eq!(source.pipeline_state(), PipelineState::Idle);
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let (_connector, _recorder, source) = mock();
        assert!(matches!(
            source.connect(),
            Err(Error::Network(NetworkError::ConnectionFailed(_)))
        ));
        assert!(!source.is_connected());
        assert_eq!(source.on_tick(), TickSummary::default());
    }

    #[test]
    fn test_peer_close_disconnects_without_processing() {
        let (connector, recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();

        tx.send(Chunk::Data(stream())).unwrap();
        tx.send(Chunk::Close).unwrap();
        let summary = source.on_tick();

        assert!(summary.disconnected);
        assert_eq!(summary.frames_processed, 0);
        assert!(!source.is_connected());
        assert!(recorder.events.lock().is_empty());
        assert_eq!(source.pipeline_state(), PipelineState::Idle);
    }

    #[test]
    fn test_receive_error_disconnects() {
        let (connector, _recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();

        tx.send(Chunk::Fail).unwrap();
        assert!(source.on_tick().disconnected);
        assert!(!source.is_connected());
    }

    #[test]
    fn test_malformed_header_disconnects() {
        let (connector, _recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::from(PayloadType::VideoData).to_le_bytes());
        bytes.extend_from_slice(&4096u32.to_le_bytes());
        tx.send(Chunk::Data(bytes)).unwrap();

        assert!(source.on_tick().disconnected);
        assert!(!source.is_connected());
    }

    #[test]
    fn test_disconnect_drops_render_frame_and_reconnect_resets() {
        let (connector, recorder, source) = mock();
        let tx = connector.push();
        source.connect().unwrap();
        tx.send(Chunk::Data(stream())).unwrap();
        // a trailing partial frame stays buffered
        tx.send(Chunk::Data(stream()[..10].to_vec())).unwrap();
        source.on_tick();
        assert!(source.on_render().is_some());
        assert_eq!(source.status().demux.buffered_bytes, 10);

        source.disconnect().unwrap();
        assert!(source.on_render().is_none());
        // demultiplexer state is kept until the next connect
        assert_eq!(source.status().demux.buffered_bytes, 10);

        let tx = connector.push();
        source.connect().unwrap();
        assert_eq!(source.status().demux.buffered_bytes, 0);
        assert_eq!(source.status().video_frame_counter, 0);

        tx.send(Chunk::Data(stream())).unwrap();
        assert_eq!(source.on_tick().frames_processed, 5);
        // indices restart at zero on the new connection
        assert_eq!(audio_indices(&recorder), vec![0, 1, 0, 1]);
        assert_eq!(source.on_render().unwrap().sequence, 1);
    }

    #[test]
    fn test_decoder_start_failure_fails_connect() {
        let connector = Arc::new(QueuedConnector::default());
        connector.push();
        let recorder = Arc::new(Recorder::default());
        let source = MrcSource::new(
            &test_config(),
            Box::new(connector.clone()),
            Box::new(|| -> std::result::Result<Box<dyn VideoDecoder>, CodecError> {
                Err(CodecError::DecoderInit("no h264".into()))
            }),
            software_converter_factory(),
            recorder.clone(),
        );

        assert!(matches!(source.connect(), Err(Error::Codec(_))));
        assert!(!source.is_connected());
        assert_eq!(source.pipeline_state(), PipelineState::Idle);
    }

    #[test]
    fn test_update_and_connect_to() {
        let (connector, _recorder, source) = mock();
        source.update(SourceSettings {
            address: "10.0.0.2".into(),
            port: 1234,
        });
        assert_eq!(source.settings().port, 1234);

        connector.push();
        source.connect_to("10.0.0.3", 4321).unwrap();
        let status = source.status();
        assert_eq!(status.address, "10.0.0.3");
        assert_eq!(status.port, 4321);
    }

    #[test]
    fn test_tcp_loopback_end_to_end() {
        use std::io::Write;
        use std::net::TcpListener;

        let _subsystem = TransportSubsystem::init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let recorder = Arc::new(Recorder::default());
        let source = source(Box::new(TcpConnector::default()), &recorder);
        source.connect_to("127.0.0.1", port).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        let bytes = stream();
        let (a, b) = bytes.split_at(11);
        peer.write_all(a).unwrap();
        peer.flush().unwrap();
        source.on_tick();
        peer.write_all(b).unwrap();
        peer.flush().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.on_render().is_none() {
            assert!(Instant::now() < deadline, "no frame rendered");
            source.on_tick();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(audio_indices(&recorder), vec![0, 1]);
        assert!(source.status().peer.is_some());

        drop(peer);
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.is_connected() {
            assert!(Instant::now() < deadline, "close not observed");
            source.on_tick();
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
