//! Asset descriptors
//!
//! A descriptor is the identity of a load: path, kind and parameters. Two
//! requests share a task and a cache entry exactly when their descriptors are
//! equal.

use crate::asset::Texture;
use crate::resolver;
use cinder_render::{PixelBuffer, PixelFormat, TextureOptions};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Pixmap,
    Texture,
    Atlas,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Pixmap => "pixmap",
            AssetKind::Texture => "texture",
            AssetKind::Atlas => "atlas",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PixmapParams {
    /// Convert to this layout while decoding; keep the source layout if `None`.
    pub format: Option<PixelFormat>,
    pub flip_y: bool,
}

/// Texture parameters.
///
/// `pixels` supplies an already-decoded payload, skipping the file read.
/// `reload_into` re-points an existing texture at the new data instead of
/// creating a new one. Both compare by identity.
#[derive(Debug, Clone, Default)]
pub struct TextureParams {
    pub format: Option<PixelFormat>,
    pub gen_mipmaps: bool,
    pub flip_y: bool,
    pub options: TextureOptions,
    pub pixels: Option<Arc<PixelBuffer>>,
    pub reload_into: Option<Arc<Texture>>,
}

fn same_arc<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn arc_addr<T>(value: &Option<Arc<T>>) -> usize {
    value.as_ref().map_or(0, |v| Arc::as_ptr(v) as usize)
}

impl PartialEq for TextureParams {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format
            && self.gen_mipmaps == other.gen_mipmaps
            && self.flip_y == other.flip_y
            && self.options == other.options
            && same_arc(&self.pixels, &other.pixels)
            && same_arc(&self.reload_into, &other.reload_into)
    }
}

impl Eq for TextureParams {}

impl Hash for TextureParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.format.hash(state);
        self.gen_mipmaps.hash(state);
        self.flip_y.hash(state);
        self.options.hash(state);
        arc_addr(&self.pixels).hash(state);
        arc_addr(&self.reload_into).hash(state);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AtlasParams {
    /// Flip every region vertically.
    pub flip: bool,
}

/// Kind-specific load parameters. The variant decides the asset kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetParams {
    Pixmap(PixmapParams),
    Texture(TextureParams),
    Atlas(AtlasParams),
}

impl AssetParams {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetParams::Pixmap(_) => AssetKind::Pixmap,
            AssetParams::Texture(_) => AssetKind::Texture,
            AssetParams::Atlas(_) => AssetKind::Atlas,
        }
    }

    pub fn default_for(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Pixmap => AssetParams::Pixmap(PixmapParams::default()),
            AssetKind::Texture => AssetParams::Texture(TextureParams::default()),
            AssetKind::Atlas => AssetParams::Atlas(AtlasParams::default()),
        }
    }
}

/// Identity of an asset load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetDescriptor {
    path: Arc<str>,
    params: AssetParams,
}

impl AssetDescriptor {
    /// Paths are normalized to forward slashes.
    pub fn new(path: impl AsRef<str>, params: AssetParams) -> Self {
        Self {
            path: resolver::normalize(path.as_ref()).into(),
            params,
        }
    }

    pub fn of_kind(path: impl AsRef<str>, kind: AssetKind) -> Self {
        Self::new(path, AssetParams::default_for(kind))
    }

    pub fn pixmap(path: impl AsRef<str>) -> Self {
        Self::of_kind(path, AssetKind::Pixmap)
    }

    pub fn texture(path: impl AsRef<str>) -> Self {
        Self::of_kind(path, AssetKind::Texture)
    }

    pub fn atlas(path: impl AsRef<str>) -> Self {
        Self::of_kind(path, AssetKind::Atlas)
    }

    pub fn texture_with(path: impl AsRef<str>, params: TextureParams) -> Self {
        Self::new(path, AssetParams::Texture(params))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> AssetKind {
        self.params.kind()
    }

    pub fn params(&self) -> &AssetParams {
        &self.params
    }

    pub fn pixmap_params(&self) -> Option<&PixmapParams> {
        match &self.params {
            AssetParams::Pixmap(p) => Some(p),
            _ => None,
        }
    }

    pub fn texture_params(&self) -> Option<&TextureParams> {
        match &self.params {
            AssetParams::Texture(p) => Some(p),
            _ => None,
        }
    }

    pub fn atlas_params(&self) -> Option<&AtlasParams> {
        match &self.params {
            AssetParams::Atlas(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for AssetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.kind())
    }
}
