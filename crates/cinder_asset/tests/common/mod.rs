//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use cinder_asset::{
    Asset, AssetDescriptor, AssetError, AssetKind, AssetManager, AsyncPhase, Dependencies,
    FileResolver, FinalizeContext, LoadContext, Loader, LoaderRegistry, ManagerConfig,
    MemoryResolver, Payload, Pixmap, Texture,
};
use cinder_render::{HeadlessContext, PixelBuffer, PixelFormat, RenderContext, RenderError};
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Dependencies(String),
    AsyncLoad(String, ThreadId),
    Finalize(String, ThreadId),
    Dispose(String, ThreadId),
}

/// Ordered record of every loader phase that ran.
#[derive(Default)]
pub struct PhaseLog {
    events: Mutex<Vec<Event>>,
}

impl PhaseLog {
    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn async_loads(&self, path: &str) -> usize {
        self.count(|e| matches!(e, Event::AsyncLoad(p, _) if p == path))
    }

    pub fn finalizes(&self, path: &str) -> usize {
        self.count(|e| matches!(e, Event::Finalize(p, _) if p == path))
    }

    pub fn disposals(&self, path: &str) -> usize {
        self.count(|e| matches!(e, Event::Dispose(p, _) if p == path))
    }

    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events.lock().iter().position(pred)
    }
}

/// Scriptable loader: dependency graph, failure injection and phase logging.
pub struct ScriptedLoader {
    kind: AssetKind,
    graph: HashMap<String, Vec<AssetDescriptor>>,
    fail_async: HashSet<String>,
    fail_finalize: HashSet<String>,
    sync_only: bool,
    log: Arc<PhaseLog>,
}

impl ScriptedLoader {
    pub fn new(kind: AssetKind, log: Arc<PhaseLog>) -> Self {
        Self {
            kind,
            graph: HashMap::new(),
            fail_async: HashSet::new(),
            fail_finalize: HashSet::new(),
            sync_only: false,
            log,
        }
    }

    pub fn depends(mut self, path: &str, deps: &[&str]) -> Self {
        let kind = self.kind;
        self.graph.insert(
            path.to_string(),
            deps.iter().map(|d| AssetDescriptor::of_kind(d, kind)).collect(),
        );
        self
    }

    pub fn fail_async(mut self, path: &str) -> Self {
        self.fail_async.insert(path.to_string());
        self
    }

    pub fn fail_finalize(mut self, path: &str) -> Self {
        self.fail_finalize.insert(path.to_string());
        self
    }

    pub fn sync_only(mut self) -> Self {
        self.sync_only = true;
        self
    }
}

impl AsyncPhase for ScriptedLoader {
    fn load_async(
        &self,
        ctx: &LoadContext<'_>,
        _parsed: Option<Payload>,
    ) -> Result<Payload, AssetError> {
        let path = ctx.descriptor.path();
        self.log
            .push(Event::AsyncLoad(path.to_string(), thread::current().id()));
        if self.fail_async.contains(path) {
            return Err(AssetError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            ));
        }
        let declared = self.graph.get(path).map_or(0, Vec::len);
        assert_eq!(ctx.dependencies.len(), declared, "dependencies not ready for {path}");
        Ok(Payload::Pixels(pixel()))
    }
}

impl Loader for ScriptedLoader {
    fn kind(&self) -> AssetKind {
        self.kind
    }

    fn dependencies(
        &self,
        descriptor: &AssetDescriptor,
        _resolver: &dyn FileResolver,
    ) -> Result<Dependencies, AssetError> {
        self.log
            .push(Event::Dependencies(descriptor.path().to_string()));
        Ok(Dependencies::on(
            self.graph.get(descriptor.path()).cloned().unwrap_or_default(),
        ))
    }

    fn async_phase(&self) -> Option<&dyn AsyncPhase> {
        if self.sync_only {
            None
        } else {
            Some(self)
        }
    }

    fn finalize(
        &self,
        ctx: FinalizeContext<'_>,
        _payload: Option<Payload>,
    ) -> Result<Asset, AssetError> {
        let path = ctx.descriptor.path();
        self.log
            .push(Event::Finalize(path.to_string(), thread::current().id()));
        if self.fail_finalize.contains(path) {
            return Err(AssetError::resource(
                path,
                RenderError::CapacityExhausted { live: 0 },
            ));
        }
        match self.kind {
            AssetKind::Texture => {
                let gpu = ctx
                    .render
                    .create_texture(&pixel(), &[], &Default::default())
                    .map_err(|e| AssetError::resource(path, e))?;
                Ok(Asset::Texture(Arc::new(Texture::new(gpu, Default::default()))))
            }
            _ => Ok(Asset::Pixmap(Arc::new(Pixmap::new(pixel())))),
        }
    }

    fn dispose(&self, descriptor: &AssetDescriptor, asset: &Asset, render: &mut dyn RenderContext) {
        self.log
            .push(Event::Dispose(descriptor.path().to_string(), thread::current().id()));
        if let Some(gpu) = asset.as_texture().and_then(|t| t.take_gpu()) {
            render.destroy_texture(gpu);
        }
    }
}

pub fn pixel() -> PixelBuffer {
    PixelBuffer::filled(1, 1, PixelFormat::Rgba8888, &[1, 2, 3, 255]).unwrap()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn config() -> ManagerConfig {
    ManagerConfig {
        worker_threads: 4,
        thread_name_prefix: "test-loader".to_string(),
        ..Default::default()
    }
}

/// A manager whose only loader is `loader`.
pub fn manager_with(loader: ScriptedLoader) -> AssetManager {
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::new(loader));
    AssetManager::with_loaders(
        config(),
        Arc::new(MemoryResolver::new()),
        Box::new(HeadlessContext::new()),
        registry,
    )
    .unwrap()
}

/// A manager with the built-in loaders reading from `files`.
pub fn manager_over(files: MemoryResolver) -> AssetManager {
    AssetManager::new(config(), Arc::new(files), Box::new(HeadlessContext::new())).unwrap()
}

pub fn pixmap(path: &str) -> AssetDescriptor {
    AssetDescriptor::pixmap(path)
}
