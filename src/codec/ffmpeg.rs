//! H.264 decode engine and display scaler backed by FFmpeg

use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::scaler::{Algorithm, VideoFrameScaler};
use ac_ffmpeg::codec::video::{VideoDecoder as AvVideoDecoder, VideoFrame, VideoFrameMut};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp};

use crate::codec::converter::{ColorConverter, ConverterConfig, ConverterFactory};
use crate::codec::decoder::VideoDecoder;
use crate::codec::picture::{DecodedPicture, PixelBuffer, PixelFormat, Plane};
use crate::error::CodecError;

/// H.264 (Annex B) decoder using FFmpeg
pub struct FfmpegDecoder {
    decoder: AvVideoDecoder,
    frame_count: i64,
}

// The decoder is owned by a single pipeline and only used under its lock.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    pub fn new() -> Result<Self, CodecError> {
        let decoder = AvVideoDecoder::builder("h264")
            .and_then(|b| b.time_base(TimeBase::new(1, 90_000)).build())
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        tracing::info!("H.264 decoder opened");

        Ok(Self {
            decoder,
            frame_count: 0,
        })
    }

    #[inline]
    fn next_pts(&mut self) -> Timestamp {
        self.frame_count += 1;
        Timestamp::new(self.frame_count, TimeBase::new(1, 90_000))
    }

    fn to_picture(frame: &VideoFrame) -> Result<DecodedPicture, CodecError> {
        let pixel_format = frame.pixel_format();
        let format = if pixel_format == get_pixel_format("yuv420p")
            || pixel_format == get_pixel_format("yuvj420p")
        {
            PixelFormat::I420
        } else if pixel_format == get_pixel_format("nv12") {
            PixelFormat::Nv12
        } else if pixel_format == get_pixel_format("rgba") {
            PixelFormat::Rgba
        } else if pixel_format == get_pixel_format("bgra") {
            PixelFormat::Bgra
        } else {
            return Err(CodecError::UnsupportedFormat("decoder output pixel format".into()));
        };

        let planes = frame.planes();
        let planes = (0..format.plane_count())
            .map(|i| Plane {
                data: planes[i].data().to_vec(),
                stride: planes[i].line_size(),
            })
            .collect();

        Ok(DecodedPicture {
            width: frame.width() as u32,
            height: frame.height() as u32,
            format,
            planes,
        })
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn submit(&mut self, access_unit: &[u8]) -> Result<(), CodecError> {
        let pts = self.next_pts();
        let packet = PacketMut::from(access_unit).with_pts(pts).freeze();

        self.decoder
            .try_push(packet)
            .map_err(|e| CodecError::SubmitFailed(e.to_string()))
    }

    fn retrieve(&mut self) -> Result<DecodedPicture, CodecError> {
        match self.decoder.take() {
            Ok(Some(frame)) => Self::to_picture(&frame),
            Ok(None) => Err(CodecError::RetrieveFailed("no picture available".into())),
            Err(e) => Err(CodecError::RetrieveFailed(e.to_string())),
        }
    }
}

/// Factory for `FfmpegConverter`
pub fn ffmpeg_converter_factory() -> ConverterFactory {
    Box::new(|| Box::new(FfmpegConverter::new()))
}

/// swscale converter to RGBA with point sampling
#[derive(Default)]
pub struct FfmpegConverter {
    config: Option<ConverterConfig>,
    scaler: Option<VideoFrameScaler>,
}

// Same ownership as FfmpegDecoder: one pipeline, used under its lock.
unsafe impl Send for FfmpegConverter {}

impl FfmpegConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the picture into an FFmpeg frame of the configured source format
    fn to_frame(picture: &DecodedPicture) -> VideoFrame {
        let mut frame = VideoFrameMut::black(
            get_pixel_format(&picture.format.to_string()),
            picture.width as usize,
            picture.height as usize,
        );

        let layout = picture
            .format
            .plane_layout(picture.width as usize, picture.height as usize);
        {
            let mut planes = frame.planes_mut();
            for (i, (row_bytes, rows)) in layout.into_iter().enumerate() {
                if rows == 0 {
                    continue;
                }
                let target = planes[i].data_mut();
                let line_size = target.len() / rows;
                let source = &picture.planes[i];
                copy_rows(&source.data, source.stride, target, line_size, row_bytes, rows);
            }
        }

        frame.freeze()
    }
}

impl ColorConverter for FfmpegConverter {
    fn configure(&mut self, config: ConverterConfig) -> Result<(), CodecError> {
        if !config.has_valid_geometry() {
            return Err(config.invalid_geometry());
        }

        let scaler = VideoFrameScaler::builder()
            .source_pixel_format(get_pixel_format(&config.src_format.to_string()))
            .source_width(config.src_width as usize)
            .source_height(config.src_height as usize)
            .target_pixel_format(get_pixel_format(&PixelFormat::Rgba.to_string()))
            .target_width(config.dst_width as usize)
            .target_height(config.dst_height as usize)
            .algorithm(Algorithm::Point)
            .build()
            .map_err(|e| CodecError::ConversionFailed(e.to_string()))?;

        tracing::debug!(
            "Scaler {}x{} {} -> {}x{} rgba",
            config.src_width,
            config.src_height,
            config.src_format,
            config.dst_width,
            config.dst_height
        );

        self.scaler = Some(scaler);
        self.config = Some(config);
        Ok(())
    }

    fn convert(&mut self, picture: &DecodedPicture) -> Result<PixelBuffer, CodecError> {
        let (config, scaler) = match (self.config, self.scaler.as_mut()) {
            (Some(config), Some(scaler)) => (config, scaler),
            _ => return Err(CodecError::ConversionFailed("converter not configured".into())),
        };
        config.check_source(picture)?;

        let scaled = scaler
            .scale(&Self::to_frame(picture))
            .map_err(|e| CodecError::ConversionFailed(e.to_string()))?;

        let (width, height) = (config.dst_width as usize, config.dst_height as usize);
        let planes = scaled.planes();
        let output = &planes[0];
        let row_bytes = width * 4;
        if output.line_size() < row_bytes || output.data().len() < output.line_size() * height {
            return Err(CodecError::ConversionFailed("scaler output too small".into()));
        }

        let mut data = vec![0u8; row_bytes * height];
        copy_rows(output.data(), output.line_size(), &mut data, row_bytes, row_bytes, height);

        Ok(PixelBuffer {
            width: config.dst_width,
            height: config.dst_height,
            data,
        })
    }
}

/// Copy `rows` rows of `row_bytes` between buffers with different strides
#[inline]
fn copy_rows(
    source: &[u8],
    source_stride: usize,
    destination: &mut [u8],
    destination_stride: usize,
    row_bytes: usize,
    rows: usize,
) {
    let total = rows * source_stride;
    if source_stride == destination_stride && source.len() >= total && destination.len() >= total
    {
        destination[..total].copy_from_slice(&source[..total]);
        return;
    }

    let width = row_bytes.min(source_stride).min(destination_stride);
    for r in 0..rows {
        let (src, dst) = (r * source_stride, r * destination_stride);
        if src + width > source.len() || dst + width > destination.len() {
            break;
        }
        destination[dst..dst + width].copy_from_slice(&source[src..src + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_i420(w: u32, h: u32, y: u8) -> DecodedPicture {
        let (cw, ch) = ((w as usize).div_ceil(2), (h as usize).div_ceil(2));
        DecodedPicture::i420(
            w,
            h,
            vec![y; (w * h) as usize],
            vec![128; cw * ch],
            vec![128; cw * ch],
        )
    }

    fn config_for(picture: &DecodedPicture, dst_width: u32, dst_height: u32) -> ConverterConfig {
        ConverterConfig {
            src_width: picture.width,
            src_height: picture.height,
            src_format: picture.format,
            dst_width,
            dst_height,
        }
    }

    fn near(actual: &[u8], expected: [u8; 3]) -> bool {
        actual[..3]
            .iter()
            .zip(expected)
            .all(|(&a, e)| (a as i32 - e as i32).abs() <= 2)
    }

    #[test]
    fn test_copy_rows_repacks_stride() {
        let source = [1, 2, 0, 0, 3, 4, 0, 0];
        let mut destination = [9u8; 4];
        copy_rows(&source, 4, &mut destination, 2, 2, 2);
        assert_eq!(destination, [1, 2, 3, 4]);

        let mut same = [0u8; 8];
        copy_rows(&source, 4, &mut same, 4, 2, 2);
        assert_eq!(same, source);
    }

    #[test]
    fn test_limited_range_levels() {
        for (luma, expected) in [(235u8, [255u8; 3]), (16, [0; 3])] {
            let picture = solid_i420(16, 8, luma);
            let mut converter = FfmpegConverter::new();
            converter.configure(config_for(&picture, 16, 8)).unwrap();

            let out = converter.convert(&picture).unwrap();
            assert_eq!((out.width, out.height), (16, 8));
            assert_eq!(out.data.len(), 16 * 8 * 4);
            assert!(out.data.chunks(4).all(|p| near(p, expected)), "luma {}", luma);
        }
    }

    #[test]
    fn test_point_upscale_keeps_hard_edge() {
        // left half black, right half white
        let mut picture = solid_i420(16, 8, 16);
        for row in 0..8 {
            for col in 8..16 {
                picture.planes[0].data[row * 16 + col] = 235;
            }
        }

        let mut converter = FfmpegConverter::new();
        converter.configure(config_for(&picture, 32, 8)).unwrap();
        let out = converter.convert(&picture).unwrap();

        let px = |x: u32, y: u32| out.pixel(x, y).to_vec();
        assert!(near(&px(0, 0), [0; 3]));
        assert!(near(&px(8, 4), [0; 3]));
        assert!(near(&px(24, 4), [255; 3]));
        assert!(near(&px(31, 7), [255; 3]));
    }

    #[test]
    fn test_unconfigured_and_mismatch_rejected() {
        let picture = solid_i420(16, 8, 16);
        let mut converter = FfmpegConverter::new();
        assert!(converter.convert(&picture).is_err());

        converter.configure(config_for(&picture, 16, 8)).unwrap();
        assert!(converter.convert(&solid_i420(32, 8, 16)).is_err());

        let mut short = solid_i420(16, 8, 16);
        short.planes[0].data.truncate(10);
        assert!(converter.convert(&short).is_err());
    }

    #[test]
    fn test_zero_geometry_rejected() {
        let picture = solid_i420(16, 8, 16);
        let mut converter = FfmpegConverter::new();
        assert!(converter.configure(config_for(&picture, 0, 8)).is_err());
    }
}
