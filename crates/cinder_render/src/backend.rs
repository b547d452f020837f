//! GPU rendering backend
//!
//! wgpu-based context. Runs without a surface: the asset pipeline only needs
//! texture objects, presentation is the host's business.

use crate::{BackendType, DeviceCapabilities};

/// Capabilities of a context with no device behind it.
pub fn probe_software_capabilities() -> DeviceCapabilities {
    DeviceCapabilities::default()
}

#[cfg(feature = "wgpu-backend")]
pub use self::gpu::WgpuContext;

#[cfg(feature = "wgpu-backend")]
fn backend_type(backend: wgpu::Backend) -> BackendType {
    match backend {
        wgpu::Backend::Vulkan => BackendType::Vulkan,
        wgpu::Backend::Metal => BackendType::Metal,
        wgpu::Backend::Dx12 => BackendType::DirectX12,
        wgpu::Backend::Gl => BackendType::OpenGL,
        wgpu::Backend::BrowserWebGpu => BackendType::WebGpu,
        _ => BackendType::Software,
    }
}

/// Probe available rendering capabilities from an adapter
#[cfg(feature = "wgpu-backend")]
pub fn probe_capabilities(adapter: &wgpu::Adapter) -> DeviceCapabilities {
    let info = adapter.get_info();
    let limits = adapter.limits();
    DeviceCapabilities {
        backend: backend_type(info.backend),
        max_texture_size: limits.max_texture_dimension_2d,
        max_textures: None,
        supports_mipmaps: true,
    }
}

#[cfg(feature = "wgpu-backend")]
mod gpu {
    use super::probe_capabilities;
    use crate::context::{
        check_limits, GpuTexture, RenderContext, TextureFilter, TextureId, TextureOptions,
        TextureWrap,
    };
    use crate::error::RenderError;
    use crate::pixels::{PixelBuffer, PixelFormat};
    use crate::DeviceCapabilities;
    use cinder_core::thread::OwnerThread;
    use std::collections::HashMap;

    struct LiveTexture {
        texture: wgpu::Texture,
        sampler: wgpu::Sampler,
    }

    pub struct WgpuContext {
        owner: OwnerThread,
        device: wgpu::Device,
        queue: wgpu::Queue,
        caps: DeviceCapabilities,
        next_id: TextureId,
        textures: HashMap<TextureId, LiveTexture>,
    }

    impl WgpuContext {
        /// Open a headless device on the calling thread, which becomes the owner.
        pub fn new_headless() -> Result<Self, RenderError> {
            pollster::block_on(Self::request())
        }

        async fn request() -> Result<Self, RenderError> {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| RenderError::Device("no suitable GPU adapter".to_string()))?;

            tracing::info!("GPU Adapter: {:?}", adapter.get_info());
            let caps = probe_capabilities(&adapter);

            let (device, queue) = adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("Asset Device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: wgpu::Limits::default(),
                        memory_hints: wgpu::MemoryHints::default(),
                    },
                    None,
                )
                .await
                .map_err(|e| RenderError::Device(e.to_string()))?;

            Ok(Self {
                owner: OwnerThread::current(),
                device,
                queue,
                caps,
                next_id: 1,
                textures: HashMap::new(),
            })
        }

        pub fn device(&self) -> &wgpu::Device {
            &self.device
        }

        /// The wgpu texture and sampler behind a handle.
        pub fn raw(&self, id: TextureId) -> Option<(&wgpu::Texture, &wgpu::Sampler)> {
            self.textures.get(&id).map(|t| (&t.texture, &t.sampler))
        }

        fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
            match format {
                PixelFormat::Alpha8 => wgpu::TextureFormat::R8Unorm,
                PixelFormat::LuminanceAlpha88 => wgpu::TextureFormat::Rg8Unorm,
                // No 3-channel formats on the GPU side; widened on upload.
                PixelFormat::Rgb888 | PixelFormat::Rgba8888 => wgpu::TextureFormat::Rgba8Unorm,
            }
        }

        fn upload_bytes(pixels: &PixelBuffer) -> (Vec<u8>, u32) {
            match pixels.format() {
                PixelFormat::Rgb888 => {
                    let data = pixels
                        .data()
                        .chunks_exact(3)
                        .flat_map(|px| [px[0], px[1], px[2], 255])
                        .collect();
                    (data, 4)
                }
                other => (pixels.data().to_vec(), other.bytes_per_pixel() as u32),
            }
        }

        fn filter_mode(filter: TextureFilter) -> wgpu::FilterMode {
            match filter {
                TextureFilter::Nearest
                | TextureFilter::MipMapNearestNearest
                | TextureFilter::MipMapNearestLinear => wgpu::FilterMode::Nearest,
                _ => wgpu::FilterMode::Linear,
            }
        }

        fn mipmap_mode(filter: TextureFilter) -> wgpu::FilterMode {
            match filter {
                TextureFilter::MipMapNearestLinear
                | TextureFilter::MipMapLinearLinear
                | TextureFilter::MipMap => wgpu::FilterMode::Linear,
                _ => wgpu::FilterMode::Nearest,
            }
        }

        fn address_mode(wrap: TextureWrap) -> wgpu::AddressMode {
            match wrap {
                TextureWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
                TextureWrap::Repeat => wgpu::AddressMode::Repeat,
                TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
            }
        }

        fn build(
            &self,
            pixels: &PixelBuffer,
            mips: &[PixelBuffer],
            options: &TextureOptions,
        ) -> LiveTexture {
            let size = wgpu::Extent3d {
                width: pixels.width(),
                height: pixels.height(),
                depth_or_array_layers: 1,
            };
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Asset Texture"),
                size,
                mip_level_count: 1 + mips.len() as u32,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::texture_format(pixels.format()),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            for (level, buffer) in std::iter::once(pixels).chain(mips.iter()).enumerate() {
                let (bytes, bpp) = Self::upload_bytes(buffer);
                self.queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &texture,
                        mip_level: level as u32,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    &bytes,
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(bpp * buffer.width()),
                        rows_per_image: Some(buffer.height()),
                    },
                    wgpu::Extent3d {
                        width: buffer.width(),
                        height: buffer.height(),
                        depth_or_array_layers: 1,
                    },
                );
            }

            let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Asset Sampler"),
                address_mode_u: Self::address_mode(options.wrap_u),
                address_mode_v: Self::address_mode(options.wrap_v),
                mag_filter: Self::filter_mode(options.mag_filter),
                min_filter: Self::filter_mode(options.min_filter),
                mipmap_filter: Self::mipmap_mode(options.min_filter),
                ..Default::default()
            });

            LiveTexture { texture, sampler }
        }
    }

    impl RenderContext for WgpuContext {
        fn capabilities(&self) -> &DeviceCapabilities {
            &self.caps
        }

        fn create_texture(
            &mut self,
            pixels: &PixelBuffer,
            mips: &[PixelBuffer],
            options: &TextureOptions,
        ) -> Result<GpuTexture, RenderError> {
            self.owner.assert_current("WgpuContext::create_texture");
            check_limits(&self.caps, pixels, self.textures.len())?;

            let live = self.build(pixels, mips, options);
            let id = self.next_id;
            self.next_id += 1;
            self.textures.insert(id, live);

            Ok(GpuTexture {
                id,
                width: pixels.width(),
                height: pixels.height(),
                format: pixels.format(),
                mip_levels: 1 + mips.len() as u32,
            })
        }

        fn upload_texture(
            &mut self,
            texture: &mut GpuTexture,
            pixels: &PixelBuffer,
            mips: &[PixelBuffer],
            options: &TextureOptions,
        ) -> Result<(), RenderError> {
            self.owner.assert_current("WgpuContext::upload_texture");
            check_limits(&self.caps, pixels, 0)?;
            if !self.textures.contains_key(&texture.id) {
                return Err(RenderError::UnknownTexture(texture.id));
            }

            // Dimensions may change, so the wgpu object is rebuilt under the same id.
            let live = self.build(pixels, mips, options);
            if let Some(old) = self.textures.insert(texture.id, live) {
                old.texture.destroy();
            }

            texture.width = pixels.width();
            texture.height = pixels.height();
            texture.format = pixels.format();
            texture.mip_levels = 1 + mips.len() as u32;
            Ok(())
        }

        fn destroy_texture(&mut self, texture: GpuTexture) {
            self.owner.assert_current("WgpuContext::destroy_texture");
            match self.textures.remove(&texture.id) {
                Some(live) => live.texture.destroy(),
                None => tracing::warn!(id = texture.id, "destroying unknown texture"),
            }
        }

        fn live_textures(&self) -> usize {
            self.textures.len()
        }
    }
}
