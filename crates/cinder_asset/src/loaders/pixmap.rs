use crate::asset::{Asset, Pixmap};
use crate::descriptor::{AssetDescriptor, AssetKind, PixmapParams};
use crate::error::AssetError;
use crate::loader::{AsyncPhase, FinalizeContext, LoadContext, Loader, Payload};
use std::sync::Arc;

/// Decodes an image into host memory. No rendering-context work.
pub struct PixmapLoader;

fn params(descriptor: &AssetDescriptor) -> PixmapParams {
    descriptor.pixmap_params().cloned().unwrap_or_default()
}

impl AsyncPhase for PixmapLoader {
    fn load_async(
        &self,
        ctx: &LoadContext<'_>,
        _parsed: Option<Payload>,
    ) -> Result<Payload, AssetError> {
        let params = params(ctx.descriptor);
        let bytes = ctx.read()?;
        let mut pixels = cinder_render::decode(&bytes, params.format)
            .map_err(|e| AssetError::decode(ctx.descriptor.path(), e))?;
        if params.flip_y {
            pixels.flip_vertical();
        }
        Ok(Payload::Pixels(pixels))
    }
}

impl Loader for PixmapLoader {
    fn kind(&self) -> AssetKind {
        AssetKind::Pixmap
    }

    fn async_phase(&self) -> Option<&dyn AsyncPhase> {
        Some(self)
    }

    fn finalize(
        &self,
        ctx: FinalizeContext<'_>,
        payload: Option<Payload>,
    ) -> Result<Asset, AssetError> {
        match payload {
            Some(Payload::Pixels(pixels)) => Ok(Asset::Pixmap(Arc::new(Pixmap::new(pixels)))),
            _ => Err(AssetError::decode(
                ctx.descriptor.path(),
                "pixmap finalized without decoded pixels",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::AssetParams;
    use crate::loaders::testing::png_bytes;
    use crate::resolver::MemoryResolver;
    use cinder_render::{HeadlessContext, PixelFormat, RenderContext};

    #[test]
    fn decodes_and_flips_without_touching_the_context() {
        let files = MemoryResolver::new();
        files.insert("p.png", png_bytes(2, 3));
        let desc = AssetDescriptor::new(
            "p.png",
            AssetParams::Pixmap(PixmapParams {
                format: Some(PixelFormat::Rgb888),
                flip_y: true,
            }),
        );

        let loader = PixmapLoader;
        let ctx = LoadContext {
            descriptor: &desc,
            resolver: &files,
            dependencies: &[],
        };
        let payload = loader.load_async(&ctx, None).unwrap();

        let mut render = HeadlessContext::new();
        let asset = loader
            .finalize(
                FinalizeContext {
                    descriptor: &desc,
                    dependencies: &[],
                    render: &mut render,
                },
                Some(payload),
            )
            .unwrap();

        let pixmap = asset.as_pixmap().unwrap();
        assert_eq!(pixmap.format(), PixelFormat::Rgb888);
        // Row 0 now holds what was row 2.
        assert_eq!(pixmap.pixel(1, 0), Some(&[1u8, 2, 7][..]));
        assert_eq!(render.live_textures(), 0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let files = MemoryResolver::new();
        let desc = AssetDescriptor::pixmap("nope.png");
        let ctx = LoadContext {
            descriptor: &desc,
            resolver: &files,
            dependencies: &[],
        };
        let err = PixmapLoader.load_async(&ctx, None).unwrap_err();
        assert!(matches!(err, AssetError::Io { ref path, .. } if path == "nope.png"));
    }

    #[test]
    fn corrupt_file_is_decode_error() {
        let files = MemoryResolver::new();
        files.insert("bad.png", b"not an image".to_vec());
        let desc = AssetDescriptor::pixmap("bad.png");
        let ctx = LoadContext {
            descriptor: &desc,
            resolver: &files,
            dependencies: &[],
        };
        assert!(matches!(
            PixmapLoader.load_async(&ctx, None),
            Err(AssetError::Decode { .. })
        ));
    }
}
