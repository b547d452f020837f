//! Loader contract
//!
//! One loader per asset kind. Every loader can list dependencies and finalize
//! on the owning thread; loaders that also do heavy work off the owning thread
//! expose an [`AsyncPhase`].

use crate::asset::Asset;
use crate::atlas_data::AtlasData;
use crate::descriptor::{AssetDescriptor, AssetKind};
use crate::error::AssetError;
use crate::resolver::FileResolver;
use cinder_render::{PixelBuffer, RenderContext};
use std::collections::HashMap;
use std::sync::Arc;

/// Intermediate results handed from one phase to the next.
#[derive(Debug)]
pub enum Payload {
    Pixels(PixelBuffer),
    Texture {
        pixels: PixelBuffer,
        mips: Vec<PixelBuffer>,
    },
    Atlas(AtlasData),
}

/// Output of the dependency phase.
#[derive(Debug, Default)]
pub struct Dependencies {
    pub descriptors: Vec<AssetDescriptor>,
    /// Work done while discovering dependencies, kept for later phases.
    pub parsed: Option<Payload>,
}

impl Dependencies {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn on(descriptors: Vec<AssetDescriptor>) -> Self {
        Self {
            descriptors,
            parsed: None,
        }
    }
}

/// Inputs to the async phase. Runs on a worker thread.
pub struct LoadContext<'a> {
    pub descriptor: &'a AssetDescriptor,
    pub resolver: &'a dyn FileResolver,
    /// Finalized dependencies, in declaration order.
    pub dependencies: &'a [Asset],
}

impl LoadContext<'_> {
    pub fn read(&self) -> Result<Vec<u8>, AssetError> {
        let path = self.descriptor.path();
        self.resolver
            .read(path)
            .map_err(|e| AssetError::io(path, e))
    }
}

/// Inputs to finalization. Runs on the owning thread.
pub struct FinalizeContext<'a> {
    pub descriptor: &'a AssetDescriptor,
    pub dependencies: &'a [Asset],
    pub render: &'a mut dyn RenderContext,
}

pub trait AsyncPhase: Send + Sync {
    /// Heavy work (I/O, decoding). Must not touch the rendering context.
    fn load_async(&self, ctx: &LoadContext<'_>, parsed: Option<Payload>)
        -> Result<Payload, AssetError>;
}

pub trait Loader: Send + Sync + 'static {
    fn kind(&self) -> AssetKind;

    /// Descriptors that must be ready before this asset's later phases run.
    /// Runs on whichever thread issued the request.
    fn dependencies(
        &self,
        _descriptor: &AssetDescriptor,
        _resolver: &dyn FileResolver,
    ) -> Result<Dependencies, AssetError> {
        Ok(Dependencies::none())
    }

    /// `None` for loaders that do all their work in `finalize`.
    fn async_phase(&self) -> Option<&dyn AsyncPhase> {
        None
    }

    /// Produce the asset. `payload` is the async phase's output, or the
    /// dependency phase's parse for loaders without one.
    fn finalize(
        &self,
        ctx: FinalizeContext<'_>,
        payload: Option<Payload>,
    ) -> Result<Asset, AssetError>;

    /// Release whatever `finalize` acquired. Runs on the owning thread.
    fn dispose(
        &self,
        _descriptor: &AssetDescriptor,
        _asset: &Asset,
        _render: &mut dyn RenderContext,
    ) {
    }
}

/// Loaders by asset kind.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<AssetKind, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixmap, texture and atlas loaders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::loaders::PixmapLoader));
        registry.register(Arc::new(crate::loaders::TextureLoader));
        registry.register(Arc::new(crate::loaders::TextureAtlasLoader));
        registry
    }

    /// Install a loader, replacing any previous one for its kind.
    pub fn register(&mut self, loader: Arc<dyn Loader>) -> Option<Arc<dyn Loader>> {
        self.loaders.insert(loader.kind(), loader)
    }

    pub fn get(&self, kind: AssetKind) -> Result<Arc<dyn Loader>, AssetError> {
        self.loaders
            .get(&kind)
            .cloned()
            .ok_or(AssetError::NoLoader(kind))
    }

    pub fn kinds(&self) -> Vec<AssetKind> {
        let mut kinds: Vec<_> = self.loaders.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_kind() {
        let registry = LoaderRegistry::with_defaults();
        assert_eq!(
            registry.kinds(),
            vec![AssetKind::Pixmap, AssetKind::Texture, AssetKind::Atlas]
        );
        assert!(registry.get(AssetKind::Texture).unwrap().async_phase().is_some());
        assert!(registry.get(AssetKind::Atlas).unwrap().async_phase().is_none());
    }

    #[test]
    fn missing_loader_is_an_error() {
        let registry = LoaderRegistry::new();
        assert!(matches!(
            registry.get(AssetKind::Pixmap),
            Err(AssetError::NoLoader(AssetKind::Pixmap))
        ));
    }
}
