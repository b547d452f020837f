use crate::asset::{Asset, AtlasPage, AtlasRegion, TextureAtlas};
use crate::atlas_data::{self, AtlasData};
use crate::descriptor::{AssetDescriptor, AssetKind, TextureParams};
use crate::error::AssetError;
use crate::loader::{Dependencies, FinalizeContext, Loader, Payload};
use crate::resolver::FileResolver;
use cinder_render::TextureOptions;
use std::sync::Arc;

/// Assembles a texture atlas from its page textures. Synchronous: all file
/// work happens while listing dependencies, and the parse is kept for
/// `finalize`.
pub struct TextureAtlasLoader;

impl TextureAtlasLoader {
    fn page_descriptor(page: &atlas_data::PageSpec) -> AssetDescriptor {
        AssetDescriptor::texture_with(
            &page.texture_path,
            TextureParams {
                format: page.format,
                gen_mipmaps: page.use_mipmaps(),
                options: TextureOptions {
                    min_filter: page.min_filter,
                    mag_filter: page.mag_filter,
                    wrap_u: page.wrap_u,
                    wrap_v: page.wrap_v,
                },
                ..Default::default()
            },
        )
    }
}

impl Loader for TextureAtlasLoader {
    fn kind(&self) -> AssetKind {
        AssetKind::Atlas
    }

    fn dependencies(
        &self,
        descriptor: &AssetDescriptor,
        resolver: &dyn FileResolver,
    ) -> Result<Dependencies, AssetError> {
        let path = descriptor.path();
        let bytes = resolver.read(path).map_err(|e| AssetError::io(path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| AssetError::decode(path, e))?;
        let data = atlas_data::parse(path, &text)?;

        Ok(Dependencies {
            descriptors: data.pages.iter().map(Self::page_descriptor).collect(),
            parsed: Some(Payload::Atlas(data)),
        })
    }

    fn finalize(
        &self,
        ctx: FinalizeContext<'_>,
        payload: Option<Payload>,
    ) -> Result<Asset, AssetError> {
        let path = ctx.descriptor.path();
        let Some(Payload::Atlas(AtlasData { pages, regions })) = payload else {
            return Err(AssetError::decode(path, "atlas finalized without a parse"));
        };
        let flip = ctx.descriptor.atlas_params().is_some_and(|p| p.flip);

        let pages = pages
            .into_iter()
            .zip(ctx.dependencies)
            .map(|(spec, dep)| {
                let texture = dep.as_texture().cloned().ok_or(AssetError::KindMismatch {
                    path: spec.texture_path.clone(),
                    expected: AssetKind::Texture,
                    actual: dep.kind(),
                })?;
                Ok(AtlasPage {
                    texture_path: spec.texture_path,
                    texture,
                })
            })
            .collect::<Result<Vec<_>, AssetError>>()?;

        let regions = regions
            .into_iter()
            .map(|r| AtlasRegion {
                name: r.name,
                page: r.page,
                x: r.x,
                y: r.y,
                width: r.width,
                height: r.height,
                rotate: r.rotate,
                original_width: r.original_width.unwrap_or(r.width),
                original_height: r.original_height.unwrap_or(r.height),
                offset_x: r.offset_x,
                offset_y: r.offset_y,
                index: r.index,
                flip_y: flip,
            })
            .collect();

        Ok(Asset::Atlas(Arc::new(TextureAtlas::new(pages, regions))))
    }
}
