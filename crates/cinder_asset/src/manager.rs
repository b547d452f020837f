//! Asset manager
//!
//! `AssetManager` lives on the owning thread: it holds the rendering context
//! and is the only place completions are finalized and assets disposed.
//! `AssetServer` is the cloneable handle other threads use to request and
//! release assets.

use crate::asset::Asset;
use crate::config::ManagerConfig;
use crate::descriptor::AssetDescriptor;
use crate::error::AssetError;
use crate::handle::{LoadHandle, LoadSlot};
use crate::loader::{Loader, LoaderRegistry};
use crate::resolver::FileResolver;
use crate::scheduler::{Completion, Finalized, LoadStats, Pipeline};
use crate::task::{TaskState, Waiter};
use cinder_metrics::{Counter, DrainTimer};
use cinder_render::RenderContext;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BLOCKING_POLL: Duration = Duration::from_millis(10);

type ErrorListener = Box<dyn FnMut(&AssetDescriptor, &AssetError)>;

pub struct AssetManager {
    pipeline: Arc<Pipeline>,
    completions: Receiver<Completion>,
    render: Box<dyn RenderContext>,
    config: ManagerConfig,
    error_listener: Option<ErrorListener>,
    drain_timer: DrainTimer,
    counters: Counter,
}

impl AssetManager {
    /// Create a manager with the built-in loaders. The calling thread becomes
    /// the owning thread.
    pub fn new(
        config: ManagerConfig,
        resolver: Arc<dyn FileResolver>,
        render: Box<dyn RenderContext>,
    ) -> Result<Self, AssetError> {
        Self::with_loaders(config, resolver, render, LoaderRegistry::with_defaults())
    }

    pub fn with_loaders(
        config: ManagerConfig,
        resolver: Arc<dyn FileResolver>,
        render: Box<dyn RenderContext>,
        loaders: LoaderRegistry,
    ) -> Result<Self, AssetError> {
        let (pipeline, completions) = Pipeline::new(&config, resolver, loaders)?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            completions,
            render,
            config,
            error_listener: None,
            drain_timer: DrainTimer::new(120),
            counters: Counter::new(),
        })
    }

    /// Install a loader for its kind, replacing the previous one. Assets the
    /// old loader finalized are still disposed by it.
    pub fn register_loader(&self, loader: Arc<dyn Loader>) {
        let kind = loader.kind();
        if self.pipeline.loaders.write().register(loader).is_some() {
            tracing::debug!(%kind, "loader replaced");
        }
    }

    /// A handle other threads can request and release through.
    pub fn server(&self) -> AssetServer {
        AssetServer {
            pipeline: Arc::clone(&self.pipeline),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn render_context(&self) -> &dyn RenderContext {
        self.render.as_ref()
    }

    pub fn render_context_mut(&mut self) -> &mut dyn RenderContext {
        self.render.as_mut()
    }

    /// Request an asset. Takes one reference, returned with `release`.
    pub fn load(&self, descriptor: &AssetDescriptor) -> LoadHandle {
        load(&self.pipeline, descriptor)
    }

    /// Request an asset and run `callback` on the owning thread when it
    /// finishes. Takes one reference.
    ///
    /// Callbacks run before the disposals queued in the same drain, so a load
    /// released while in flight still hands its callback a live asset.
    pub fn load_with_callback<F>(&self, descriptor: &AssetDescriptor, callback: F)
    where
        F: FnOnce(&AssetDescriptor, Result<&Asset, &AssetError>) + Send + 'static,
    {
        self.pipeline
            .request(descriptor, Waiter::Callback(Box::new(callback)));
    }

    /// Drop one reference. At zero the asset is disposed immediately and its
    /// dependencies are released in turn.
    pub fn release(&mut self, descriptor: &AssetDescriptor) -> Result<TaskState, AssetError> {
        let state = self.pipeline.release(descriptor);
        self.dispose_pending();
        state
    }

    /// Drain the completion queue once. Returns true when nothing is in flight.
    pub fn update(&mut self) -> bool {
        let deadline = self.config.update_budget().map(|b| Instant::now() + b);
        self.drain(deadline)
    }

    /// Drain until the queue is empty or `budget` is spent. At least one
    /// completion is processed per call.
    pub fn update_for(&mut self, budget: Duration) -> bool {
        self.drain(Some(Instant::now() + budget))
    }

    /// Block until every in-flight request has finished.
    pub fn finish_loading(&mut self) {
        while !self.drain(None) {
            self.block_for_completion();
        }
    }

    /// Block until `handle` has finished and return its result.
    pub fn finish_loading_asset(&mut self, handle: &LoadHandle) -> Result<Asset, AssetError> {
        loop {
            if let Some(result) = handle.poll() {
                return result;
            }
            let idle = self.drain(None);
            if let Some(result) = handle.poll() {
                return result;
            }
            if idle {
                return Err(AssetError::NotLoaded(handle.descriptor().path().to_string()));
            }
            self.block_for_completion();
        }
    }

    fn block_for_completion(&mut self) {
        match self.completions.recv_timeout(BLOCKING_POLL) {
            Ok(completion) => self.process(completion),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("completion queue disconnected");
            }
        }
    }

    fn drain(&mut self, deadline: Option<Instant>) -> bool {
        self.drain_timer.begin();
        self.flush();

        let mut processed = 0u64;
        loop {
            if processed > 0 && deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let Ok(completion) = self.completions.try_recv() else {
                break;
            };
            self.process(completion);
            processed += 1;
        }
        let spent = self.drain_timer.end();

        let idle = {
            let mut state = self.pipeline.state.lock();
            let idle = state.is_idle();
            if idle {
                state.created_since_idle = 0;
                state.settled_since_idle = 0;
            }
            idle
        };
        if processed > 0 {
            tracing::trace!(processed, idle, ?spent, "completions drained");
        }
        idle
    }

    fn process(&mut self, completion: Completion) {
        self.counters.increment("completions", 1);
        match self.pipeline.finalize(completion, self.render.as_mut()) {
            Finalized::Ready => self.counters.increment("finalized", 1),
            Finalized::Failed => self.counters.increment("failed", 1),
            Finalized::Stale => {}
        }
        self.flush();
    }

    /// Run owning-thread work queued by the scheduler: error reports,
    /// callbacks in completion order, then disposals.
    fn flush(&mut self) {
        let (failures, callbacks) = {
            let mut state = self.pipeline.state.lock();
            (
                std::mem::take(&mut state.failures),
                std::mem::take(&mut state.callbacks),
            )
        };
        if let Some(listener) = self.error_listener.as_mut() {
            for (descriptor, error) in &failures {
                listener(descriptor, error);
            }
        }
        for callback in callbacks {
            self.counters.increment("callbacks", 1);
            callback.run();
        }
        self.dispose_pending();
    }

    fn dispose_pending(&mut self) {
        let disposals = std::mem::take(&mut self.pipeline.state.lock().disposals);
        for disposal in disposals {
            disposal
                .loader
                .dispose(&disposal.descriptor, &disposal.asset, self.render.as_mut());
            self.counters.increment("disposed", 1);
            tracing::debug!(asset = %disposal.descriptor, "asset disposed");
        }
    }

    /// Called on the owning thread for every failed task.
    pub fn set_error_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&AssetDescriptor, &AssetError) + 'static,
    {
        self.error_listener = Some(Box::new(listener));
    }

    /// Dispose every cached asset regardless of reference counts. In-flight
    /// tasks keep running.
    pub fn clear(&mut self) {
        self.pipeline.clear_cache();
        self.dispose_pending();
    }

    pub fn get(&self, descriptor: &AssetDescriptor) -> Option<Asset> {
        self.pipeline.get(descriptor)
    }

    pub fn is_loaded(&self, descriptor: &AssetDescriptor) -> bool {
        self.pipeline.state.lock().cache.contains(descriptor)
    }

    pub fn reference_count(&self, descriptor: &AssetDescriptor) -> usize {
        self.pipeline.reference_count(descriptor)
    }

    pub fn task_state(&self, descriptor: &AssetDescriptor) -> Option<TaskState> {
        self.pipeline.task_state(descriptor)
    }

    /// Declared dependencies of a cached or in-flight descriptor.
    pub fn dependencies_of(&self, descriptor: &AssetDescriptor) -> Option<Vec<AssetDescriptor>> {
        let state = self.pipeline.state.lock();
        if let Some(entry) = state.cache.entry(descriptor) {
            return Some(entry.dependencies.clone());
        }
        state
            .active
            .get(descriptor)
            .and_then(|id| state.tasks.get(id))
            .map(|t| t.dependencies.clone())
    }

    /// Cached descriptors, sorted by path.
    pub fn loaded_descriptors(&self) -> Vec<AssetDescriptor> {
        let state = self.pipeline.state.lock();
        let mut descriptors: Vec<_> = state.cache.iter().map(|(d, _)| d.clone()).collect();
        descriptors.sort_by(|a, b| a.path().cmp(b.path()).then(a.kind().cmp(&b.kind())));
        descriptors
    }

    pub fn in_flight(&self) -> usize {
        self.pipeline.in_flight()
    }

    /// Fraction of tasks since the last idle point that have finished.
    pub fn progress(&self) -> f32 {
        let state = self.pipeline.state.lock();
        if state.created_since_idle == 0 {
            return 1.0;
        }
        state.settled_since_idle as f32 / state.created_since_idle as f32
    }

    pub fn stats(&self) -> LoadStats {
        self.pipeline.state.lock().stats
    }

    /// Owning-thread counters; empty unless metrics are compiled in.
    pub fn metrics(&self) -> Vec<(&'static str, u64)> {
        self.counters.snapshot()
    }

    pub fn drain_time_ms(&self) -> f64 {
        self.drain_timer.average_ms()
    }

    /// Cache entries with reference counts and dependencies, then in-flight
    /// tasks with their states.
    pub fn diagnostics(&self) -> String {
        let state = self.pipeline.state.lock();
        let mut out = String::new();

        let mut entries: Vec<_> = state.cache.iter().collect();
        entries.sort_by(|a, b| a.0.path().cmp(b.0.path()));
        let _ = writeln!(out, "cached: {}", entries.len());
        for (descriptor, entry) in entries {
            let _ = writeln!(out, "  {descriptor} refs={}", entry.ref_count);
            for dep in &entry.dependencies {
                let _ = writeln!(out, "    -> {dep}");
            }
        }

        let mut tasks: Vec<_> = state.tasks.values().collect();
        tasks.sort_by_key(|t| t.id);
        let _ = writeln!(out, "in flight: {}", tasks.len());
        for task in tasks {
            let _ = writeln!(
                out,
                "  #{} {} {} refs={} pending={}",
                task.id, task.descriptor, task.state, task.refs, task.pending
            );
        }
        out
    }
}

impl Drop for AssetManager {
    fn drop(&mut self) {
        self.pipeline.shutdown();
        self.clear();
    }
}

fn load(pipeline: &Pipeline, descriptor: &AssetDescriptor) -> LoadHandle {
    let slot = Arc::new(LoadSlot::new());
    pipeline.request(descriptor, Waiter::Handle(Arc::clone(&slot)));
    LoadHandle::new(descriptor.clone(), slot, pipeline.owner)
}

/// Thread-safe request handle onto a manager's pipeline.
///
/// Work it triggers on the owning thread (finalization, disposal, callbacks)
/// happens at that thread's next `update`.
#[derive(Clone)]
pub struct AssetServer {
    pipeline: Arc<Pipeline>,
}

impl AssetServer {
    pub fn load(&self, descriptor: &AssetDescriptor) -> LoadHandle {
        load(&self.pipeline, descriptor)
    }

    pub fn load_with_callback<F>(&self, descriptor: &AssetDescriptor, callback: F)
    where
        F: FnOnce(&AssetDescriptor, Result<&Asset, &AssetError>) + Send + 'static,
    {
        self.pipeline
            .request(descriptor, Waiter::Callback(Box::new(callback)));
    }

    /// Drop one reference. Disposal, if any, runs at the next `update`.
    pub fn release(&self, descriptor: &AssetDescriptor) -> Result<TaskState, AssetError> {
        self.pipeline.release(descriptor)
    }

    pub fn get(&self, descriptor: &AssetDescriptor) -> Option<Asset> {
        self.pipeline.get(descriptor)
    }

    pub fn reference_count(&self, descriptor: &AssetDescriptor) -> usize {
        self.pipeline.reference_count(descriptor)
    }

    pub fn task_state(&self, descriptor: &AssetDescriptor) -> Option<TaskState> {
        self.pipeline.task_state(descriptor)
    }

    pub fn in_flight(&self) -> usize {
        self.pipeline.in_flight()
    }
}
