use crate::asset::{Asset, Texture};
use crate::descriptor::{AssetDescriptor, AssetKind, TextureParams};
use crate::error::AssetError;
use crate::loader::{AsyncPhase, FinalizeContext, LoadContext, Loader, Payload};
use cinder_render::RenderContext;
use std::sync::Arc;

/// Decodes on a worker, creates the texture on the owning thread.
///
/// With `TextureParams::pixels` set the file read is skipped. With
/// `TextureParams::reload_into` set the existing texture receives the new
/// pixels and is returned instead of a new one.
pub struct TextureLoader;

fn params(descriptor: &AssetDescriptor) -> TextureParams {
    descriptor.texture_params().cloned().unwrap_or_default()
}

impl AsyncPhase for TextureLoader {
    fn load_async(
        &self,
        ctx: &LoadContext<'_>,
        _parsed: Option<Payload>,
    ) -> Result<Payload, AssetError> {
        let params = params(ctx.descriptor);
        let path = ctx.descriptor.path();

        let mut pixels = match &params.pixels {
            Some(supplied) => (**supplied).clone(),
            None => {
                let bytes = ctx.read()?;
                cinder_render::decode(&bytes, params.format)
                    .map_err(|e| AssetError::decode(path, e))?
            }
        };
        if params.flip_y {
            pixels.flip_vertical();
        }
        let mips = if params.gen_mipmaps {
            pixels.mip_chain()
        } else {
            Vec::new()
        };

        tracing::trace!(
            path,
            width = pixels.width(),
            height = pixels.height(),
            mips = mips.len(),
            "texture decoded"
        );
        Ok(Payload::Texture { pixels, mips })
    }
}

impl Loader for TextureLoader {
    fn kind(&self) -> AssetKind {
        AssetKind::Texture
    }

    fn async_phase(&self) -> Option<&dyn AsyncPhase> {
        Some(self)
    }

    fn finalize(
        &self,
        ctx: FinalizeContext<'_>,
        payload: Option<Payload>,
    ) -> Result<Asset, AssetError> {
        let path = ctx.descriptor.path();
        let Some(Payload::Texture { pixels, mips }) = payload else {
            return Err(AssetError::decode(path, "texture finalized without pixels"));
        };
        let params = params(ctx.descriptor);

        if let Some(target) = params.reload_into {
            target
                .reload(ctx.render, &pixels, &mips, params.options)
                .map_err(|e| AssetError::resource(path, e))?;
            return Ok(Asset::Texture(target));
        }

        let gpu = ctx
            .render
            .create_texture(&pixels, &mips, &params.options)
            .map_err(|e| AssetError::resource(path, e))?;
        tracing::debug!(path, id = gpu.id, "texture created");
        Ok(Asset::Texture(Arc::new(Texture::new(gpu, params.options))))
    }

    fn dispose(&self, descriptor: &AssetDescriptor, asset: &Asset, render: &mut dyn RenderContext) {
        // A reload target belongs to the entry that created it.
        if params(descriptor).reload_into.is_some() {
            return;
        }
        if let Some(gpu) = asset.as_texture().and_then(|t| t.take_gpu()) {
            render.destroy_texture(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::testing::png_bytes;
    use crate::resolver::MemoryResolver;
    use cinder_render::{
        DeviceCapabilities, HeadlessContext, PixelBuffer, PixelFormat, RenderError,
        TextureFilter, TextureOptions,
    };

    fn run(
        desc: &AssetDescriptor,
        files: &MemoryResolver,
        render: &mut HeadlessContext,
    ) -> Result<Asset, AssetError> {
        let payload = TextureLoader.load_async(
            &LoadContext {
                descriptor: desc,
                resolver: files,
                dependencies: &[],
            },
            None,
        )?;
        TextureLoader.finalize(
            FinalizeContext {
                descriptor: desc,
                dependencies: &[],
                render,
            },
            Some(payload),
        )
    }

    #[test]
    fn creates_texture_with_mipmaps_and_options() {
        let files = MemoryResolver::new();
        files.insert("t.png", png_bytes(8, 4));
        let options = TextureOptions {
            min_filter: TextureFilter::MipMapLinearLinear,
            mag_filter: TextureFilter::Linear,
            ..Default::default()
        };
        let desc = AssetDescriptor::texture_with(
            "t.png",
            TextureParams {
                gen_mipmaps: true,
                options,
                ..Default::default()
            },
        );
        let mut render = HeadlessContext::new();
        let asset = run(&desc, &files, &mut render).unwrap();

        let texture = asset.as_texture().unwrap();
        assert_eq!(texture.size(), Some((8, 4)));
        assert_eq!(texture.mip_levels(), 4);
        assert_eq!(texture.options(), options);
        let record = render.texture(texture.id().unwrap()).unwrap();
        assert_eq!(record.options, options);

        TextureLoader.dispose(&desc, &asset, &mut render);
        assert!(texture.is_disposed());
        assert_eq!(render.live_textures(), 0);
    }

    #[test]
    fn default_options_are_nearest_and_clamped() {
        let options = TextureParams::default().options;
        assert_eq!(options.min_filter, TextureFilter::Nearest);
        assert_eq!(options.mag_filter, TextureFilter::Nearest);
        assert_eq!(options.wrap_u, cinder_render::TextureWrap::ClampToEdge);
    }

    #[test]
    fn supplied_pixels_skip_the_file() {
        let files = MemoryResolver::new();
        let supplied =
            Arc::new(PixelBuffer::filled(3, 3, PixelFormat::Alpha8, &[200]).unwrap());
        let desc = AssetDescriptor::texture_with(
            "generated",
            TextureParams {
                pixels: Some(supplied),
                ..Default::default()
            },
        );
        let mut render = HeadlessContext::new();
        let asset = run(&desc, &files, &mut render).unwrap();
        assert_eq!(asset.as_texture().unwrap().size(), Some((3, 3)));
    }

    #[test]
    fn reload_reuses_target_and_survives_dispose() {
        let files = MemoryResolver::new();
        files.insert("small.png", png_bytes(2, 2));
        files.insert("big.png", png_bytes(16, 16));
        let mut render = HeadlessContext::new();

        let original = run(&AssetDescriptor::texture("small.png"), &files, &mut render).unwrap();
        let target = Arc::clone(original.as_texture().unwrap());
        let reload = AssetDescriptor::texture_with(
            "big.png",
            TextureParams {
                reload_into: Some(Arc::clone(&target)),
                ..Default::default()
            },
        );
        let reloaded = run(&reload, &files, &mut render).unwrap();

        assert!(reloaded.ptr_eq(&original));
        assert_eq!(target.size(), Some((16, 16)));
        assert_eq!(render.created_count(), 1);

        TextureLoader.dispose(&reload, &reloaded, &mut render);
        assert!(!target.is_disposed());
    }

    #[test]
    fn context_rejection_is_resource_creation() {
        let files = MemoryResolver::new();
        files.insert("huge.png", png_bytes(64, 64));
        let mut render = HeadlessContext::with_capabilities(DeviceCapabilities {
            max_texture_size: 32,
            ..Default::default()
        });
        let err = run(&AssetDescriptor::texture("huge.png"), &files, &mut render).unwrap_err();
        assert!(matches!(
            err,
            AssetError::ResourceCreation {
                source: RenderError::TextureTooLarge { .. },
                ..
            }
        ));
        assert_eq!(render.live_textures(), 0);
    }
}
