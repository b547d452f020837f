//! Rendering context contract
//!
//! A context is bound to the thread that created it. The trait is
//! deliberately not `Send`: whoever holds it is the owning thread.

use crate::error::RenderError;
use crate::pixels::{PixelBuffer, PixelFormat};
use crate::DeviceCapabilities;

pub type TextureId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapLinearNearest,
    MipMapNearestLinear,
    MipMapLinearLinear,
}

impl TextureFilter {
    pub fn is_mipmap(self) -> bool {
        !matches!(self, TextureFilter::Nearest | TextureFilter::Linear)
    }

    /// Parse the filter names used by texture atlas files.
    pub fn from_atlas_name(name: &str) -> Option<Self> {
        match name.trim() {
            "Nearest" => Some(TextureFilter::Nearest),
            "Linear" => Some(TextureFilter::Linear),
            "MipMap" => Some(TextureFilter::MipMap),
            "MipMapNearestNearest" => Some(TextureFilter::MipMapNearestNearest),
            "MipMapLinearNearest" => Some(TextureFilter::MipMapLinearNearest),
            "MipMapNearestLinear" => Some(TextureFilter::MipMapNearestLinear),
            "MipMapLinearLinear" => Some(TextureFilter::MipMapLinearLinear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    MirroredRepeat,
    #[default]
    ClampToEdge,
    Repeat,
}

/// Sampling state applied when a texture is created or re-uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureOptions {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_u: TextureWrap,
    pub wrap_v: TextureWrap,
}

/// A texture living inside a context.
///
/// Not `Clone`: exactly one owner may hand it back to `destroy_texture`.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mip_levels: u32,
}

pub trait RenderContext {
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Create a texture from level 0 plus optional pre-generated mip levels.
    fn create_texture(
        &mut self,
        pixels: &PixelBuffer,
        mips: &[PixelBuffer],
        options: &TextureOptions,
    ) -> Result<GpuTexture, RenderError>;

    /// Re-point an existing texture at new pixel data, keeping its identity.
    fn upload_texture(
        &mut self,
        texture: &mut GpuTexture,
        pixels: &PixelBuffer,
        mips: &[PixelBuffer],
        options: &TextureOptions,
    ) -> Result<(), RenderError>;

    fn destroy_texture(&mut self, texture: GpuTexture);

    fn live_textures(&self) -> usize;
}

/// Shared size/capacity validation for context implementations.
pub(crate) fn check_limits(
    caps: &DeviceCapabilities,
    pixels: &PixelBuffer,
    live: usize,
) -> Result<(), RenderError> {
    let max = caps.max_texture_size;
    if pixels.width() > max || pixels.height() > max {
        return Err(RenderError::TextureTooLarge {
            width: pixels.width(),
            height: pixels.height(),
            max,
        });
    }
    if let Some(limit) = caps.max_textures {
        if live >= limit {
            return Err(RenderError::CapacityExhausted { live });
        }
    }
    Ok(())
}
