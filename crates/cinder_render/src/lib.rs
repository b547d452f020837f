//! Cinder Render Context
//!
//! The narrow slice of a graphics API the asset pipeline needs: texture
//! creation, in-place re-upload and destruction, all bound to the thread that
//! owns the context. Pixel decoding lives here too since its output is what
//! gets uploaded.

pub mod backend;
pub mod context;
pub mod error;
pub mod headless;
pub mod pixels;

pub use context::{GpuTexture, RenderContext, TextureFilter, TextureId, TextureOptions, TextureWrap};
pub use error::{DecodeError, RenderError};
pub use headless::HeadlessContext;
pub use pixels::{decode, PixelBuffer, PixelFormat};

#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuContext;
#[cfg(feature = "wgpu-backend")]
pub use wgpu;

/// Rendering backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Metal (macOS, iOS)
    Metal,
    /// DirectX 12 (Windows)
    DirectX12,
    /// Vulkan (cross-platform)
    Vulkan,
    /// OpenGL / GLES (cross-platform, fallback)
    OpenGL,
    /// WebGPU in a browser
    WebGpu,
    /// No device; textures live in host memory
    Software,
}

/// Capability probe result
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub backend: BackendType,
    pub max_texture_size: u32,
    /// Upper bound on simultaneously live textures, if the context imposes one.
    pub max_textures: Option<usize>,
    pub supports_mipmaps: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            backend: BackendType::Software,
            max_texture_size: 8192,
            max_textures: None,
            supports_mipmaps: true,
        }
    }
}
