//! Decoded picture and converted pixel buffer types

use std::fmt;

use crate::error::CodecError;

/// Pixel layouts produced by decode engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar Y, U, V with 2x2 chroma subsampling
    I420,
    /// Planar Y, interleaved UV with 2x2 chroma subsampling
    Nv12,
    Rgba,
    Bgra,
}

impl PixelFormat {
    /// Number of planes in this layout
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::I420 => 3,
            PixelFormat::Nv12 => 2,
            PixelFormat::Rgba | PixelFormat::Bgra => 1,
        }
    }

    /// `(row bytes, rows)` of each plane for a `width` x `height` picture
    pub fn plane_layout(self, width: usize, height: usize) -> Vec<(usize, usize)> {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        match self {
            PixelFormat::I420 => vec![(width, height), (cw, ch), (cw, ch)],
            PixelFormat::Nv12 => vec![(width, height), (cw * 2, ch)],
            PixelFormat::Rgba | PixelFormat::Bgra => vec![(width * 4, height)],
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::I420 => "yuv420p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
        };
        f.write_str(name)
    }
}

/// One plane of a decoded picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes per row, including padding
    pub stride: usize,
}

/// Picture handed out by a decode engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
}

impl DecodedPicture {
    /// Build an I420 picture from tightly packed planes
    pub fn i420(width: u32, height: u32, y: Vec<u8>, u: Vec<u8>, v: Vec<u8>) -> Self {
        let cw = (width as usize).div_ceil(2);
        Self {
            width,
            height,
            format: PixelFormat::I420,
            planes: vec![
                Plane { data: y, stride: width as usize },
                Plane { data: u, stride: cw },
                Plane { data: v, stride: cw },
            ],
        }
    }

    /// Verify every plane holds enough rows for the declared geometry
    pub fn check_planes(&self) -> Result<(), CodecError> {
        let layout = self.format.plane_layout(self.width as usize, self.height as usize);

        if self.planes.len() < layout.len() {
            return Err(CodecError::ConversionFailed(format!(
                "{} picture has {} planes, expected {}",
                self.format,
                self.planes.len(),
                layout.len()
            )));
        }

        for (i, ((row_bytes, rows), plane)) in layout.iter().zip(&self.planes).enumerate() {
            if *rows == 0 {
                continue;
            }
            let required = (rows - 1) * plane.stride + row_bytes;
            if plane.stride < *row_bytes || plane.data.len() < required {
                return Err(CodecError::ConversionFailed(format!(
                    "plane {} too small: stride {}, {} bytes, need {}",
                    i,
                    plane.stride,
                    plane.data.len(),
                    required
                )));
            }
        }
        Ok(())
    }
}

/// Converted display buffer, always RGBA
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA rows (`width * 4` bytes each)
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// RGBA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let at = y as usize * self.stride() + x as usize * 4;
        [self.data[at], self.data[at + 1], self.data[at + 2], self.data[at + 3]]
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
