//! Built-in loaders

mod atlas;
mod pixmap;
mod texture;

pub use atlas::TextureAtlasLoader;
pub use pixmap::PixmapLoader;
pub use texture::TextureLoader;
