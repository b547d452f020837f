//! CPU-side pixel buffers and image decoding
//!
//! Everything here is safe to run on worker threads; nothing touches a context.

use crate::error::{DecodeError, RenderError};
use image::{ColorType, DynamicImage};

/// Memory layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Alpha8,
    LuminanceAlpha88,
    Rgb888,
    Rgba8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Alpha8 => 1,
            PixelFormat::LuminanceAlpha88 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgba8888 => 4,
        }
    }

    /// Parse the format names used by texture atlas files.
    ///
    /// 16-bit packed formats are widened to the closest 8-bit layout.
    pub fn from_atlas_name(name: &str) -> Option<Self> {
        match name.trim() {
            "Alpha" => Some(PixelFormat::Alpha8),
            "Intensity" | "LuminanceAlpha" => Some(PixelFormat::LuminanceAlpha88),
            "RGB565" | "RGB888" => Some(PixelFormat::Rgb888),
            "RGBA4444" | "RGBA8888" => Some(PixelFormat::Rgba8888),
            _ => None,
        }
    }

    pub fn atlas_name(self) -> &'static str {
        match self {
            PixelFormat::Alpha8 => "Alpha",
            PixelFormat::LuminanceAlpha88 => "LuminanceAlpha",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Rgba8888 => "RGBA8888",
        }
    }
}

/// Decoded, tightly packed pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, RenderError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(RenderError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A buffer where every pixel is `pixel`. `pixel` must match the format's width.
    pub fn filled(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixel: &[u8],
    ) -> Result<Self, RenderError> {
        let bpp = format.bytes_per_pixel();
        if pixel.len() != bpp {
            return Err(RenderError::SizeMismatch {
                expected: bpp,
                actual: pixel.len(),
            });
        }
        let data = pixel.repeat(width as usize * height as usize);
        Self::new(width, height, format, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.row_bytes() + x as usize * bpp;
        self.data.get(start..start + bpp)
    }

    /// Mirror rows top to bottom.
    pub fn flip_vertical(&mut self) {
        let row = self.row_bytes();
        let rows = self.height as usize;
        for y in 0..rows / 2 {
            let (top, bottom) = self.data.split_at_mut((rows - 1 - y) * row);
            top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
        }
    }

    /// Successive half-size levels down to 1x1, excluding level 0.
    pub fn mip_chain(&self) -> Vec<PixelBuffer> {
        let mut levels: Vec<PixelBuffer> = Vec::new();
        loop {
            let prev = levels.last().unwrap_or(self);
            if prev.width <= 1 && prev.height <= 1 {
                break;
            }
            let next = prev.downsample();
            levels.push(next);
        }
        levels
    }

    /// 2x2 box filter. Odd edges reuse the last row/column.
    fn downsample(&self) -> PixelBuffer {
        let bpp = self.format.bytes_per_pixel();
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width as usize * height as usize * bpp);

        for y in 0..height {
            let y0 = (y * 2).min(self.height - 1);
            let y1 = (y * 2 + 1).min(self.height - 1);
            for x in 0..width {
                let x0 = (x * 2).min(self.width - 1);
                let x1 = (x * 2 + 1).min(self.width - 1);
                for c in 0..bpp {
                    let sum: u32 = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)]
                        .iter()
                        .map(|&(sx, sy)| {
                            let idx = sy as usize * self.row_bytes() + sx as usize * bpp + c;
                            self.data[idx] as u32
                        })
                        .sum();
                    data.push(((sum + 2) / 4) as u8);
                }
            }
        }

        PixelBuffer {
            width,
            height,
            format: self.format,
            data,
        }
    }
}

/// Decode an encoded image (PNG, JPEG, BMP, TGA).
///
/// `hint` forces the output layout; without it the source layout is kept,
/// with single-channel images treated as alpha masks.
pub fn decode(bytes: &[u8], hint: Option<PixelFormat>) -> Result<PixelBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let img = image::load_from_memory(bytes)?;
    let format = hint.unwrap_or_else(|| source_format(&img));
    let (width, height) = (img.width(), img.height());

    let data = match format {
        PixelFormat::Alpha8 => img.to_luma8().into_raw(),
        PixelFormat::LuminanceAlpha88 => img.to_luma_alpha8().into_raw(),
        PixelFormat::Rgb888 => img.to_rgb8().into_raw(),
        PixelFormat::Rgba8888 => img.to_rgba8().into_raw(),
    };

    Ok(PixelBuffer::new(width, height, format, data)?)
}

fn source_format(img: &DynamicImage) -> PixelFormat {
    match img.color() {
        ColorType::L8 | ColorType::L16 => PixelFormat::Alpha8,
        ColorType::La8 | ColorType::La16 => PixelFormat::LuminanceAlpha88,
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => PixelFormat::Rgb888,
        _ => PixelFormat::Rgba8888,
    }
}
