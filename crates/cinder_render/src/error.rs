use crate::context::TextureId;
use crate::pixels::PixelFormat;
use thiserror::Error;

/// Errors raised by a rendering context when it rejects a resource.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("texture {width}x{height} exceeds the maximum size of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("texture capacity exhausted ({live} live textures)")]
    CapacityExhausted { live: usize },

    #[error("pixel format {0:?} is not supported by this context")]
    UnsupportedFormat(PixelFormat),

    #[error("pixel data holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("texture {0} is not owned by this context")]
    UnknownTexture(TextureId),

    #[error("device error: {0}")]
    Device(String),
}

/// Errors raised while turning encoded bytes into a pixel buffer.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image data is empty")]
    Empty,

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Layout(#[from] RenderError),
}
