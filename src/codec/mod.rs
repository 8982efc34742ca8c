//! Video decode engine and color conversion
//!
//! The decode engine and converter sit behind traits so the pipeline can be
//! driven by FFmpeg in production and by scripted engines in tests.

pub mod converter;
pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod picture;

pub use converter::{
    software_converter_factory, ColorConverter, ConverterConfig, ConverterFactory,
    SoftwareConverter,
};
pub use decoder::{decoder_factory, DecoderFactory, VideoDecoder};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{ffmpeg_converter_factory, FfmpegConverter, FfmpegDecoder};
pub use picture::{DecodedPicture, PixelBuffer, PixelFormat, Plane};
