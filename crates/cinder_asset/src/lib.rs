//! Cinder Asset Pipeline
//!
//! Asynchronous, dependency-aware asset loading with a reference-counted
//! cache.
//!
//! A request names an asset by [`AssetDescriptor`]. The pipeline expands its
//! dependencies, runs each loader's heavy phase on a worker pool and finishes
//! it on the owning thread, which is the only thread allowed to touch the
//! rendering context. Equal descriptors share one task and one cache entry;
//! an entry is disposed when its last reference is released, and releasing
//! it releases its dependencies.
//!
//! ```ignore
//! let mut manager = AssetManager::new(config, resolver, Box::new(HeadlessContext::new()))?;
//! let handle = manager.load(&AssetDescriptor::atlas("ui/skin.atlas"));
//! while !manager.update() {
//!     clock.wait_for_next_tick();
//! }
//! let atlas = handle.poll().unwrap()?;
//! ```

pub mod asset;
pub mod atlas_data;
pub mod cache;
pub mod config;
mod deps;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod loader;
pub mod loaders;
pub mod manager;
pub mod resolver;
mod scheduler;
pub mod task;

pub use asset::{Asset, AtlasPage, AtlasRegion, Pixmap, Texture, TextureAtlas};
pub use config::{ConfigError, ManagerConfig, ResolverConfig};
pub use descriptor::{AssetDescriptor, AssetKind, AssetParams, AtlasParams, PixmapParams, TextureParams};
pub use error::AssetError;
pub use handle::LoadHandle;
pub use loader::{AsyncPhase, Dependencies, FinalizeContext, LoadContext, Loader, LoaderRegistry, Payload};
pub use manager::{AssetManager, AssetServer};
pub use resolver::{FileResolver, FileType, FsResolver, MemoryResolver};
pub use scheduler::LoadStats;
pub use task::{LoadCallback, TaskState};
