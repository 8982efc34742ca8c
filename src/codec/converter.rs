//! Color conversion to the display format
//!
//! Converters are configured for one source geometry/format and one output
//! geometry. The pipeline destroys and recreates its converter whenever any of
//! those change.

use crate::codec::picture::{DecodedPicture, PixelBuffer, PixelFormat};
use crate::error::CodecError;

/// Geometry and format a converter is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConverterConfig {
    pub src_width: u32,
    pub src_height: u32,
    pub src_format: PixelFormat,
    pub dst_width: u32,
    pub dst_height: u32,
}

impl ConverterConfig {
    pub fn has_valid_geometry(&self) -> bool {
        self.src_width != 0 && self.src_height != 0 && self.dst_width != 0 && self.dst_height != 0
    }

    /// Reject pictures that differ from the configured source or lack plane data
    pub fn check_source(&self, picture: &DecodedPicture) -> Result<(), CodecError> {
        if picture.width != self.src_width
            || picture.height != self.src_height
            || picture.format != self.src_format
        {
            return Err(CodecError::ConversionFailed(format!(
                "picture {}x{} {} does not match configuration {}x{} {}",
                picture.width,
                picture.height,
                picture.format,
                self.src_width,
                self.src_height,
                self.src_format
            )));
        }
        picture.check_planes()
    }

    pub(crate) fn invalid_geometry(&self) -> CodecError {
        CodecError::ConversionFailed(format!(
            "invalid geometry {}x{} -> {}x{}",
            self.src_width, self.src_height, self.dst_width, self.dst_height
        ))
    }
}

/// Converts decoded pictures into RGBA display buffers
pub trait ColorConverter: Send {
    fn configure(&mut self, config: ConverterConfig) -> Result<(), CodecError>;

    fn convert(&mut self, picture: &DecodedPicture) -> Result<PixelBuffer, CodecError>;
}

/// Creates an unconfigured converter
pub type ConverterFactory = Box<dyn Fn() -> Box<dyn ColorConverter> + Send + Sync>;

/// Factory for the built-in `SoftwareConverter`
pub fn software_converter_factory() -> ConverterFactory {
    Box::new(|| Box::new(SoftwareConverter::new()))
}

/// CPU converter with point sampling and BT.601 limited-range YUV
///
/// Used in tests and in builds without the `ffmpeg` feature; the receiver
/// binary scales through `FfmpegConverter`.
#[derive(Debug, Default)]
pub struct SoftwareConverter {
    config: Option<ConverterConfig>,
    /// Source column for each output column
    x_map: Vec<usize>,
    /// Source row for each output row
    y_map: Vec<usize>,
}

impl SoftwareConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<ConverterConfig> {
        self.config
    }
}

impl ColorConverter for SoftwareConverter {
    fn configure(&mut self, config: ConverterConfig) -> Result<(), CodecError> {
        if !config.has_valid_geometry() {
            return Err(config.invalid_geometry());
        }

        let sample = |dst: u32, src: u32| -> Vec<usize> {
            (0..dst as u64)
                .map(|d| (d * src as u64 / dst as u64) as usize)
                .collect()
        };
        self.x_map = sample(config.dst_width, config.src_width);
        self.y_map = sample(config.dst_height, config.src_height);
        self.config = Some(config);
        Ok(())
    }

    fn convert(&mut self, picture: &DecodedPicture) -> Result<PixelBuffer, CodecError> {
        let config = self
            .config
            .ok_or_else(|| CodecError::ConversionFailed("converter not configured".into()))?;

        config.check_source(picture)?;

        let mut data =
            Vec::with_capacity(config.dst_width as usize * config.dst_height as usize * 4);
        let planes = &picture.planes;

        for &sy in &self.y_map {
            for &sx in &self.x_map {
                let rgba = match picture.format {
                    PixelFormat::I420 => {
                        let y = planes[0].data[sy * planes[0].stride + sx];
                        let u = planes[1].data[(sy / 2) * planes[1].stride + sx / 2];
                        let v = planes[2].data[(sy / 2) * planes[2].stride + sx / 2];
                        yuv_to_rgba(y, u, v)
                    }
                    PixelFormat::Nv12 => {
                        let y = planes[0].data[sy * planes[0].stride + sx];
                        let at = (sy / 2) * planes[1].stride + (sx / 2) * 2;
                        yuv_to_rgba(y, planes[1].data[at], planes[1].data[at + 1])
                    }
                    PixelFormat::Rgba => {
                        let at = sy * planes[0].stride + sx * 4;
                        let p = &planes[0].data[at..at + 4];
                        [p[0], p[1], p[2], p[3]]
                    }
                    PixelFormat::Bgra => {
                        let at = sy * planes[0].stride + sx * 4;
                        let p = &planes[0].data[at..at + 4];
                        [p[2], p[1], p[0], p[3]]
                    }
                };
                data.extend_from_slice(&rgba);
            }
        }

        Ok(PixelBuffer {
            width: config.dst_width,
            height: config.dst_height,
            data,
        })
    }
}

#[inline]
fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
        255,
    ]
}
