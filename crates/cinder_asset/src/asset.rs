//! Finished assets
//!
//! An `Asset` is what the cache stores and what waiters receive. Clones share
//! the underlying object; disposal happens once, when the cache entry's
//! reference count reaches zero.

use crate::descriptor::AssetKind;
use cinder_render::{
    GpuTexture, PixelBuffer, RenderContext, RenderError, TextureId, TextureOptions,
};
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Asset {
    Pixmap(Arc<Pixmap>),
    Texture(Arc<Texture>),
    Atlas(Arc<TextureAtlas>),
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Pixmap(_) => AssetKind::Pixmap,
            Asset::Texture(_) => AssetKind::Texture,
            Asset::Atlas(_) => AssetKind::Atlas,
        }
    }

    pub fn as_pixmap(&self) -> Option<&Arc<Pixmap>> {
        match self {
            Asset::Pixmap(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&Arc<Texture>> {
        match self {
            Asset::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_atlas(&self) -> Option<&Arc<TextureAtlas>> {
        match self {
            Asset::Atlas(a) => Some(a),
            _ => None,
        }
    }

    /// Whether both values refer to the same object.
    pub fn ptr_eq(&self, other: &Asset) -> bool {
        match (self, other) {
            (Asset::Pixmap(a), Asset::Pixmap(b)) => Arc::ptr_eq(a, b),
            (Asset::Texture(a), Asset::Texture(b)) => Arc::ptr_eq(a, b),
            (Asset::Atlas(a), Asset::Atlas(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Decoded pixels kept in host memory.
#[derive(Debug)]
pub struct Pixmap {
    pixels: PixelBuffer,
}

impl Pixmap {
    pub fn new(pixels: PixelBuffer) -> Self {
        Self { pixels }
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }
}

impl Deref for Pixmap {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        &self.pixels
    }
}

/// A texture owned by the rendering context.
///
/// The GPU object is taken out on disposal; afterwards the texture reports
/// itself disposed and has no id.
#[derive(Debug)]
pub struct Texture {
    gpu: Mutex<Option<GpuTexture>>,
    options: Mutex<TextureOptions>,
}

impl Texture {
    pub fn new(gpu: GpuTexture, options: TextureOptions) -> Self {
        Self {
            gpu: Mutex::new(Some(gpu)),
            options: Mutex::new(options),
        }
    }

    pub fn id(&self) -> Option<TextureId> {
        self.gpu.lock().as_ref().map(|t| t.id)
    }

    /// Width and height, or `None` once disposed.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.gpu.lock().as_ref().map(|t| (t.width, t.height))
    }

    pub fn mip_levels(&self) -> u32 {
        self.gpu.lock().as_ref().map_or(0, |t| t.mip_levels)
    }

    pub fn options(&self) -> TextureOptions {
        *self.options.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.gpu.lock().is_none()
    }

    /// Upload new pixels into this texture, keeping its identity.
    pub fn reload(
        &self,
        render: &mut dyn RenderContext,
        pixels: &PixelBuffer,
        mips: &[PixelBuffer],
        options: TextureOptions,
    ) -> Result<(), RenderError> {
        let mut gpu = self.gpu.lock();
        let Some(texture) = gpu.as_mut() else {
            return Err(RenderError::Device("texture was disposed".to_string()));
        };
        render.upload_texture(texture, pixels, mips, &options)?;
        *self.options.lock() = options;
        Ok(())
    }

    /// Take the GPU object out for destruction. Loaders call this from
    /// `dispose`; the texture reads as disposed afterwards.
    pub fn take_gpu(&self) -> Option<GpuTexture> {
        self.gpu.lock().take()
    }
}

/// One page image of an atlas.
#[derive(Debug, Clone)]
pub struct AtlasPage {
    pub texture_path: String,
    pub texture: Arc<Texture>,
}

/// A named sub-rectangle of an atlas page.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRegion {
    pub name: String,
    pub page: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub rotate: bool,
    pub original_width: u32,
    pub original_height: u32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Frame number for animation sequences, -1 when the region stands alone.
    pub index: i32,
    pub flip_y: bool,
}

#[derive(Debug)]
pub struct TextureAtlas {
    pages: Vec<AtlasPage>,
    regions: Vec<AtlasRegion>,
}

impl TextureAtlas {
    pub fn new(pages: Vec<AtlasPage>, regions: Vec<AtlasRegion>) -> Self {
        Self { pages, regions }
    }

    pub fn pages(&self) -> &[AtlasPage] {
        &self.pages
    }

    pub fn regions(&self) -> &[AtlasRegion] {
        &self.regions
    }

    /// First region with this name.
    pub fn find_region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// All regions with this name, ordered by frame index.
    pub fn find_regions(&self, name: &str) -> Vec<&AtlasRegion> {
        let mut found: Vec<_> = self.regions.iter().filter(|r| r.name == name).collect();
        found.sort_by_key(|r| r.index);
        found
    }

    pub fn texture_for(&self, region: &AtlasRegion) -> Option<&Arc<Texture>> {
        self.pages.get(region.page).map(|p| &p.texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_render::{HeadlessContext, PixelFormat};

    fn region(name: &str, index: i32) -> AtlasRegion {
        AtlasRegion {
            name: name.to_string(),
            page: 0,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            rotate: false,
            original_width: 1,
            original_height: 1,
            offset_x: 0.0,
            offset_y: 0.0,
            index,
            flip_y: false,
        }
    }

    #[test]
    fn texture_reload_keeps_identity() {
        let mut ctx = HeadlessContext::new();
        let small = PixelBuffer::filled(2, 2, PixelFormat::Rgba8888, &[0, 0, 0, 255]).unwrap();
        let big = PixelBuffer::filled(8, 8, PixelFormat::Rgba8888, &[9, 9, 9, 255]).unwrap();
        let gpu = ctx
            .create_texture(&small, &[], &TextureOptions::default())
            .unwrap();
        let texture = Texture::new(gpu, TextureOptions::default());
        let id = texture.id();

        texture
            .reload(&mut ctx, &big, &[], TextureOptions::default())
            .unwrap();
        assert_eq!(texture.id(), id);
        assert_eq!(texture.size(), Some((8, 8)));

        let gpu = texture.take_gpu().unwrap();
        ctx.destroy_texture(gpu);
        assert!(texture.is_disposed());
        assert!(texture
            .reload(&mut ctx, &big, &[], TextureOptions::default())
            .is_err());
    }

    #[test]
    fn find_regions_orders_by_index() {
        let atlas = TextureAtlas::new(
            Vec::new(),
            vec![region("walk", 2), region("idle", -1), region("walk", 0)],
        );
        let frames: Vec<_> = atlas.find_regions("walk").iter().map(|r| r.index).collect();
        assert_eq!(frames, vec![0, 2]);
        assert_eq!(atlas.find_region("idle").map(|r| r.index), Some(-1));
        assert!(atlas.find_region("run").is_none());
    }

    #[test]
    fn ptr_eq_distinguishes_objects() {
        let pixels = PixelBuffer::filled(1, 1, PixelFormat::Alpha8, &[1]).unwrap();
        let a = Asset::Pixmap(Arc::new(Pixmap::new(pixels.clone())));
        let b = Asset::Pixmap(Arc::new(Pixmap::new(pixels)));
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.kind(), AssetKind::Pixmap);
        assert!(a.as_texture().is_none());
    }
}
