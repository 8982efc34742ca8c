//! Decode and audio/video synchronization pipeline
//!
//! Frames are processed strictly in arrival order. Audio is held in the
//! pending cache and released in front of decoded pictures, using the count
//! of decoded pictures as the shared clock: a picture that brings the video
//! frame counter to `V` is preceded by every cached audio frame with index
//! `<= V`.
//!
//! Per-frame failures (unknown type, short payload, decode error) are logged
//! and skipped. They never change the pipeline state; only `stop` does.

use serde::Serialize;
use std::sync::Arc;

use crate::codec::{
    ColorConverter, ConverterConfig, ConverterFactory, DecodedPicture, DecoderFactory,
    VideoDecoder,
};
use crate::constants::{DEFAULT_HEIGHT, DEFAULT_SAMPLE_RATE, DEFAULT_WIDTH};
use crate::error::{CodecError, ProtocolError};
use crate::pipeline::audio_cache::{CachedAudio, PendingAudioCache};
use crate::pipeline::sink::{AudioBlock, AudioSink, Speakers, VideoFrame, VideoSink};
use crate::protocol::{AudioData, AudioSampleRate, Frame, PayloadType, VideoDimension};

/// Pipeline lifecycle, one cycle per connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No decoder resources
    Idle,
    /// Decoder live, counters and audio cache active
    Decoding,
}

/// Declared output geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Diagnostic counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub video_frames_decoded: u64,
    pub decode_errors: u64,
    pub conversion_errors: u64,
    pub converter_rebuilds: u64,
    pub audio_frames_cached: u64,
    pub audio_frames_emitted: u64,
    pub audio_frames_dropped: u64,
    pub unknown_frames: u64,
    pub invalid_payloads: u64,
}

/// Drives decoded video and cached audio out to the sinks
pub struct DecodeSyncPipeline {
    state: PipelineState,
    decoder_factory: DecoderFactory,
    decoder: Option<Box<dyn VideoDecoder>>,
    converter_factory: ConverterFactory,
    /// Live converter and the configuration it was built for
    converter: Option<(ConverterConfig, Box<dyn ColorConverter>)>,
    geometry: VideoGeometry,
    sample_rate: u32,
    audio_cache: PendingAudioCache,
    video_frame_counter: u64,
    audio_sink: Arc<dyn AudioSink>,
    video_sink: Arc<dyn VideoSink>,
    stats: PipelineStats,
}

impl DecodeSyncPipeline {
    pub fn new(
        decoder_factory: DecoderFactory,
        converter_factory: ConverterFactory,
        audio_sink: Arc<dyn AudioSink>,
        video_sink: Arc<dyn VideoSink>,
    ) -> Self {
        Self {
            state: PipelineState::Idle,
            decoder_factory,
            decoder: None,
            converter_factory,
            converter: None,
            geometry: VideoGeometry::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            audio_cache: PendingAudioCache::new(),
            video_frame_counter: 0,
            audio_sink,
            video_sink,
            stats: PipelineStats::default(),
        }
    }

    /// Override the geometry and sample rate used until the peer announces its own
    pub fn with_defaults(mut self, geometry: VideoGeometry, sample_rate: u32) -> Self {
        self.geometry = geometry;
        self.sample_rate = sample_rate;
        self
    }

    /// Bound the audio waiting for a picture; the oldest is dropped first
    pub fn with_pending_audio_limit(mut self, limit: usize) -> Self {
        self.audio_cache = PendingAudioCache::with_limit(limit);
        self
    }

    /// Start decoding for a new connection.
    ///
    /// Resets both frame counters and the audio cache, then creates the
    /// decoder. On failure the pipeline stays `Idle`.
    pub fn start(&mut self) -> Result<(), CodecError> {
        if self.state == PipelineState::Decoding {
            tracing::warn!("Decoder already started");
            return Ok(());
        }

        self.video_frame_counter = 0;
        self.audio_cache.reset();

        let decoder = (self.decoder_factory)()?;
        self.decoder = Some(decoder);
        self.state = PipelineState::Decoding;
        tracing::info!("Decode pipeline started");
        Ok(())
    }

    /// Release decoder and converter and drop all pending audio
    pub fn stop(&mut self) {
        if self.state == PipelineState::Idle {
            return;
        }

        let discarded = self.audio_cache.len();
        self.audio_cache.clear();
        self.decoder = None;
        self.converter = None;
        self.video_sink.clear();
        self.state = PipelineState::Idle;
        tracing::info!("Decode pipeline stopped ({} pending audio frames discarded)", discarded);
    }

    /// Dispatch one frame
    pub fn process(&mut self, frame: &Arc<Frame>) {
        let payload_type = match frame.payload_type() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Discarding frame: {}", e);
                self.stats.unknown_frames += 1;
                return;
            }
        };

        tracing::trace!(
            "[{}] {} bytes, queued {:?}",
            payload_type.name(),
            frame.payload().len(),
            frame.arrival().elapsed()
        );

        match payload_type {
            PayloadType::VideoDimension => match VideoDimension::parse(frame.payload()) {
                Ok(dim) => {
                    self.geometry = VideoGeometry {
                        width: dim.width,
                        height: dim.height,
                    };
                    tracing::info!("[VIDEO_DIMENSION] width {} height {}", dim.width, dim.height);
                }
                Err(e) => self.invalid_payload(payload_type, e),
            },
            PayloadType::AudioSampleRate => match AudioSampleRate::parse(frame.payload()) {
                Ok(AudioSampleRate(rate)) => {
                    self.sample_rate = rate;
                    tracing::debug!("[AUDIO_SAMPLERATE] {}", rate);
                }
                Err(e) => self.invalid_payload(payload_type, e),
            },
            PayloadType::AudioData => {
                if self.state == PipelineState::Idle {
                    tracing::debug!("[AUDIO_DATA] ignored while idle");
                    return;
                }
                let pushed = self.audio_cache.push(frame.clone(), self.sample_rate);
                self.stats.audio_frames_cached += 1;
                tracing::trace!("[AUDIO_DATA] cached as index {}", pushed.index);

                if let Some(evicted) = pushed.evicted {
                    tracing::warn!(
                        "[AUDIO_DATA] pending cache full ({}), dropped index {}",
                        self.audio_cache.limit(),
                        evicted.index
                    );
                    self.stats.audio_frames_dropped += 1;
                }
            }
            PayloadType::VideoData => self.process_video(frame),
        }
    }

    fn invalid_payload(&mut self, payload_type: PayloadType, error: ProtocolError) {
        tracing::warn!("[{}] discarded: {}", payload_type.name(), error);
        self.stats.invalid_payloads += 1;
    }

    fn process_video(&mut self, frame: &Arc<Frame>) {
        let Some(decoder) = self.decoder.as_mut() else {
            tracing::warn!("[VIDEO_DATA] no decoder running, frame skipped");
            self.stats.decode_errors += 1;
            return;
        };

        // TODO: a submit that succeeds followed by a failed retrieve leaves
        // the unit inside the engine; decide whether to drain it on the next frame.
        let picture = match decoder.submit(frame.payload()).and_then(|_| decoder.retrieve()) {
            Ok(picture) => picture,
            Err(e) => {
                tracing::error!("[VIDEO_DATA] {}", e);
                self.stats.decode_errors += 1;
                return;
            }
        };

        tracing::debug!(
            "[VIDEO_DATA] size {} width {} height {} format {}",
            frame.payload().len(),
            picture.width,
            picture.height,
            picture.format
        );

        // Release audio that belongs at or before this picture. Comparing
        // against the counter before the increment would hold back one more
        // frame (index == new counter) until the next picture.
        let clock = self.video_frame_counter + 1;
        for entry in self.audio_cache.drain_through(clock) {
            self.emit_audio(entry);
        }

        self.video_frame_counter = clock;
        self.stats.video_frames_decoded += 1;

        if let Err(e) = self.convert_and_present(&picture, frame) {
            tracing::error!("[VIDEO_DATA] conversion failed: {}", e);
            self.stats.conversion_errors += 1;
        }
    }

    fn emit_audio(&mut self, entry: CachedAudio) {
        let audio = match AudioData::parse(entry.frame.payload()) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!("[AUDIO_DATA] discarded: {}", e);
                self.stats.audio_frames_dropped += 1;
                return;
            }
        };

        let Some(speakers) = Speakers::from_channels(audio.channels) else {
            tracing::error!("[AUDIO_DATA] unimplemented audio channels {}", audio.channels);
            self.stats.audio_frames_dropped += 1;
            return;
        };

        let samples = audio.samples();
        let frames = (samples.len() / speakers.channels() as usize) as u32;

        self.audio_sink.output_audio(AudioBlock {
            samples,
            speakers,
            frames,
            sample_rate: entry.sample_rate,
            timestamp: audio.timestamp,
            index: entry.index,
        });
        self.stats.audio_frames_emitted += 1;
    }

    fn convert_and_present(
        &mut self,
        picture: &DecodedPicture,
        frame: &Frame,
    ) -> Result<(), CodecError> {
        let config = ConverterConfig {
            src_width: picture.width,
            src_height: picture.height,
            src_format: picture.format,
            dst_width: self.geometry.width,
            dst_height: self.geometry.height,
        };

        let up_to_date = matches!(&self.converter, Some((current, _)) if *current == config);
        if !up_to_date {
            if self.converter.take().is_some() {
                tracing::debug!("Converter configuration changed, recreating");
            }
            let mut converter = (self.converter_factory)();
            converter.configure(config)?;
            tracing::debug!(
                "Converter configured: {}x{} {} -> {}x{} rgba",
                config.src_width,
                config.src_height,
                config.src_format,
                config.dst_width,
                config.dst_height
            );
            self.stats.converter_rebuilds += 1;
            self.converter = Some((config, converter));
        }

        let Some((_, converter)) = self.converter.as_mut() else {
            return Err(CodecError::ConversionFailed("no converter available".into()));
        };
        let buffer = converter.convert(picture)?;

        self.video_sink.present(Arc::new(VideoFrame {
            buffer,
            sequence: self.video_frame_counter,
            arrival: frame.arrival(),
        }));
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn video_frame_counter(&self) -> u64 {
        self.video_frame_counter
    }

    /// Audio frames waiting for their video frame
    pub fn pending_audio(&self) -> usize {
        self.audio_cache.len()
    }

    /// Configuration of the live converter, if any
    pub fn converter_config(&self) -> Option<ConverterConfig> {
        self.converter.as_ref().map(|(config, _)| *config)
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }
}
