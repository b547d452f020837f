//! Task scheduling
//!
//! All bookkeeping (tasks, cache, waiters) lives in one `SchedulerState` behind
//! a mutex shared by every requester. Async phases run on a rayon pool and
//! report back through a completion channel that only the owning thread
//! drains; finalization happens there with the lock released.

use crate::asset::Asset;
use crate::cache::{Cache, CacheEntry, Released};
use crate::config::ManagerConfig;
use crate::deps::{Expansion, Submitted};
use crate::descriptor::{AssetDescriptor, AssetKind};
use crate::error::AssetError;
use crate::loader::{FinalizeContext, LoadContext, Loader, LoaderRegistry, Payload};
use crate::resolver::FileResolver;
use crate::task::{notify, PendingCallback, Task, TaskId, TaskState, Waiter};
use cinder_core::thread::OwnerThread;
use cinder_render::RenderContext;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Message from a worker (or a synchronous dispatch) to the owning thread.
pub(crate) struct Completion {
    pub task: TaskId,
    pub result: Result<Option<Payload>, AssetError>,
}

/// Running totals since the manager was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub tasks_created: u64,
    pub cache_hits: u64,
    pub async_loads: u64,
    pub finalized: u64,
    pub failed: u64,
    pub disposed: u64,
}

pub(crate) struct Disposal {
    pub descriptor: AssetDescriptor,
    pub asset: Asset,
    pub loader: Arc<dyn Loader>,
}

/// Result of finalizing one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finalized {
    Ready,
    Failed,
    Stale,
}

#[derive(Default)]
pub(crate) struct SchedulerState {
    pub cache: Cache,
    pub tasks: HashMap<TaskId, Task>,
    /// In-flight task per descriptor.
    pub active: HashMap<AssetDescriptor, TaskId>,
    next_id: TaskId,
    /// Owning-thread work queued while the lock was held.
    pub disposals: Vec<Disposal>,
    pub callbacks: Vec<PendingCallback>,
    pub failures: Vec<(AssetDescriptor, AssetError)>,
    pub stats: LoadStats,
    pub created_since_idle: u64,
    pub settled_since_idle: u64,
    pub closed: bool,
}

impl SchedulerState {
    pub fn allocate_id(&mut self) -> TaskId {
        self.next_id += 1;
        self.next_id
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub(crate) struct Pipeline {
    pub state: Arc<Mutex<SchedulerState>>,
    pub loaders: RwLock<LoaderRegistry>,
    pub resolver: Arc<dyn FileResolver>,
    pub owner: OwnerThread,
    workers: rayon::ThreadPool,
    completions: Sender<Completion>,
}

struct AsyncJob {
    id: TaskId,
    loader: Arc<dyn Loader>,
    descriptor: AssetDescriptor,
    dependencies: Vec<Asset>,
    parsed: Option<Payload>,
    resolver: Arc<dyn FileResolver>,
    state: Arc<Mutex<SchedulerState>>,
    completions: Sender<Completion>,
}

impl AsyncJob {
    fn run(self) {
        let AsyncJob {
            id,
            loader,
            descriptor,
            dependencies,
            parsed,
            resolver,
            state,
            completions,
        } = self;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let ctx = LoadContext {
                descriptor: &descriptor,
                resolver: resolver.as_ref(),
                dependencies: &dependencies,
            };
            match loader.async_phase() {
                Some(phase) => phase.load_async(&ctx, parsed).map(Some),
                None => Ok(parsed),
            }
        }));
        let result = outcome.unwrap_or_else(|_| {
            tracing::error!(asset = %descriptor, "loader panicked in async phase");
            Err(AssetError::decode(descriptor.path(), "loader panicked"))
        });

        if let Some(task) = state.lock().tasks.get_mut(&id) {
            task.transition(TaskState::AwaitingSync);
        }
        if completions.send(Completion { task: id, result }).is_err() {
            tracing::debug!(asset = %descriptor, "completion dropped, manager is gone");
        }
    }
}

impl Pipeline {
    pub fn new(
        config: &ManagerConfig,
        resolver: Arc<dyn FileResolver>,
        loaders: LoaderRegistry,
    ) -> Result<(Self, Receiver<Completion>), AssetError> {
        let prefix = config.thread_name_prefix.clone();
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| AssetError::Workers(e.to_string()))?;
        let (tx, rx) = crossbeam_channel::unbounded();

        tracing::info!(
            workers = workers.current_num_threads(),
            loaders = ?loaders.kinds(),
            "asset pipeline started"
        );

        let pipeline = Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            loaders: RwLock::new(loaders),
            resolver,
            owner: OwnerThread::current(),
            workers,
            completions: tx,
        };
        Ok((pipeline, rx))
    }

    pub fn loader(&self, kind: AssetKind) -> Result<Arc<dyn Loader>, AssetError> {
        self.loaders.read().get(kind)
    }

    /// Entry point for a top-level request.
    pub fn request(&self, descriptor: &AssetDescriptor, waiter: Waiter) {
        let mut expansion = Expansion::default();
        let mut guard = self.state.lock();
        loop {
            if guard.closed {
                let err = AssetError::Disconnected(descriptor.path().to_string());
                notify(waiter, descriptor, &Err(err), &mut guard.callbacks);
                return;
            }
            let unplanned = self.unplanned(&guard, descriptor, &expansion);
            if unplanned.is_empty() {
                break;
            }
            MutexGuard::unlocked(&mut guard, || self.plan(unplanned, &mut expansion));
        }

        let state = &mut *guard;
        let submitted = self.submit(state, &mut expansion, descriptor, None);
        self.settle(state, expansion, submitted.is_ok());
        match submitted {
            Ok(Submitted::Ready(asset)) => {
                notify(waiter, descriptor, &Ok(asset), &mut state.callbacks);
            }
            Ok(Submitted::Pending(id)) => {
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.waiters.push(waiter);
                }
            }
            Err(err) => notify(waiter, descriptor, &Err(err), &mut state.callbacks),
        }
    }

    /// Start the task's next phase once its dependencies are in.
    pub fn dispatch(&self, state: &mut SchedulerState, id: TaskId) {
        let Some(task) = state.tasks.get_mut(&id) else {
            return;
        };
        let parsed = task.parsed.take();

        if task.loader.async_phase().is_none() {
            task.transition(TaskState::AwaitingSync);
            self.send(Completion {
                task: id,
                result: Ok(parsed),
            });
            return;
        }

        task.transition(TaskState::AsyncLoading);
        let job = AsyncJob {
            id,
            loader: Arc::clone(&task.loader),
            descriptor: task.descriptor.clone(),
            dependencies: task.resolved_assets(),
            parsed,
            resolver: Arc::clone(&self.resolver),
            state: Arc::clone(&self.state),
            completions: self.completions.clone(),
        };
        state.stats.async_loads += 1;
        self.workers.spawn(move || job.run());
    }

    fn send(&self, completion: Completion) {
        // The receiver lives as long as the manager, which owns this pipeline.
        if self.completions.send(completion).is_err() {
            tracing::warn!("completion queue closed");
        }
    }

    /// Run finalization for one completion. Owning thread only.
    pub fn finalize(&self, completion: Completion, render: &mut dyn RenderContext) -> Finalized {
        let Completion { task: id, result } = completion;

        let (loader, descriptor, dependencies, payload) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.tasks.contains_key(&id) {
                return Finalized::Stale;
            }
            let payload = match result {
                Ok(payload) => payload,
                Err(err) => {
                    self.fail_task(state, id, err);
                    return Finalized::Failed;
                }
            };
            let Some(task) = state.tasks.get_mut(&id) else {
                return Finalized::Stale;
            };
            task.transition(TaskState::Finalizing);
            (
                Arc::clone(&task.loader),
                task.descriptor.clone(),
                task.resolved_assets(),
                payload,
            )
        };

        let ctx = FinalizeContext {
            descriptor: &descriptor,
            dependencies: &dependencies,
            render: &mut *render,
        };
        let outcome = match loader.finalize(ctx, payload) {
            Ok(asset) if asset.kind() != descriptor.kind() => {
                loader.dispose(&descriptor, &asset, render);
                Err(AssetError::KindMismatch {
                    path: descriptor.path().to_string(),
                    expected: descriptor.kind(),
                    actual: asset.kind(),
                })
            }
            other => other,
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match outcome {
            Ok(asset) => {
                self.complete_task(state, id, asset);
                Finalized::Ready
            }
            Err(err) => {
                self.fail_task(state, id, err);
                Finalized::Failed
            }
        }
    }

    fn complete_task(&self, state: &mut SchedulerState, id: TaskId, asset: Asset) {
        let Some(mut task) = state.tasks.remove(&id) else {
            return;
        };
        state.active.remove(&task.descriptor);
        task.transition(TaskState::Ready);
        state.stats.finalized += 1;
        state.settled_since_idle += 1;
        tracing::debug!(task = id, asset = %task.descriptor, refs = task.refs, "asset ready");

        let descriptor = task.descriptor.clone();
        let dependencies = std::mem::take(&mut task.dependencies);
        state.cache.insert(
            descriptor.clone(),
            asset.clone(),
            task.refs,
            dependencies,
            Arc::clone(&task.loader),
        );

        let result = Ok(asset.clone());
        for waiter in std::mem::take(&mut task.waiters) {
            match waiter {
                Waiter::Dependent(parent) => {
                    self.dependency_ready(state, parent, &descriptor, asset.clone())
                }
                other => notify(other, &descriptor, &result, &mut state.callbacks),
            }
        }

        // Every requester let go before it finished.
        if task.refs == 0 {
            if let Some(entry) = state.cache.evict(&descriptor) {
                self.evicted(state, &descriptor, entry);
            }
        }
    }

    fn dependency_ready(
        &self,
        state: &mut SchedulerState,
        parent: TaskId,
        descriptor: &AssetDescriptor,
        asset: Asset,
    ) {
        let Some(task) = state.tasks.get_mut(&parent) else {
            tracing::warn!(asset = %descriptor, "dependent vanished, returning its reference");
            let _ = self.release_locked(state, descriptor);
            return;
        };
        if task.fill_dependency(descriptor, asset) {
            task.pending = task.pending.saturating_sub(1);
        }
        if task.pending == 0 && task.state == TaskState::ResolvingDependencies {
            self.dispatch(state, parent);
        }
    }

    /// Fail a task and everything waiting on it. Idempotent.
    pub fn fail_task(&self, state: &mut SchedulerState, id: TaskId, error: AssetError) {
        let Some(mut task) = state.tasks.remove(&id) else {
            return;
        };
        state.active.remove(&task.descriptor);
        task.transition(TaskState::Failed);
        state.stats.failed += 1;
        state.settled_since_idle += 1;
        tracing::warn!(task = id, asset = %task.descriptor, error = %error, "asset failed");
        state.failures.push((task.descriptor.clone(), error.clone()));

        self.return_dependencies(state, &task);

        let result = Err(error.clone());
        for waiter in std::mem::take(&mut task.waiters) {
            match waiter {
                Waiter::Dependent(parent) => {
                    let Some(parent_path) =
                        state.tasks.get(&parent).map(|t| t.descriptor.path().to_string())
                    else {
                        continue;
                    };
                    let wrapped = error
                        .clone()
                        .for_dependent(&parent_path, task.descriptor.path());
                    self.fail_task(state, parent, wrapped);
                }
                other => notify(other, &task.descriptor, &result, &mut state.callbacks),
            }
        }
    }

    /// Hand back the references `task` took on its dependencies.
    pub fn return_dependencies(&self, state: &mut SchedulerState, task: &Task) {
        for (dep, resolved) in task.dependencies.iter().zip(&task.resolved) {
            if resolved.is_some() {
                let _ = self.release_locked(state, dep);
            } else if let Some(dep_id) = state.active.get(dep).copied() {
                if let Some(dep_task) = state.tasks.get_mut(&dep_id) {
                    if dep_task.remove_dependent(task.id) {
                        dep_task.refs = dep_task.refs.saturating_sub(1);
                    }
                }
            }
        }
    }

    /// Drop one reference. Returns the descriptor's state afterwards.
    pub fn release_locked(
        &self,
        state: &mut SchedulerState,
        descriptor: &AssetDescriptor,
    ) -> Result<TaskState, AssetError> {
        match state.cache.release(descriptor) {
            Released::Retained(_) => Ok(TaskState::Ready),
            Released::Evicted(entry) => {
                self.evicted(state, descriptor, entry);
                Ok(TaskState::Released)
            }
            Released::Missing => {
                let task = state
                    .active
                    .get(descriptor)
                    .copied()
                    .and_then(|id| state.tasks.get_mut(&id));
                let Some(task) = task else {
                    return Err(AssetError::NotLoaded(descriptor.path().to_string()));
                };
                // References held by dependents are not the caller's to drop.
                let dependents = task
                    .waiters
                    .iter()
                    .filter(|w| matches!(w, Waiter::Dependent(_)))
                    .count();
                if task.refs <= dependents {
                    return Err(AssetError::NotLoaded(descriptor.path().to_string()));
                }
                task.refs -= 1;
                Ok(task.state)
            }
        }
    }

    fn evicted(&self, state: &mut SchedulerState, descriptor: &AssetDescriptor, entry: CacheEntry) {
        tracing::debug!(asset = %descriptor, "asset evicted");
        tracing::trace!(asset = %descriptor, from = %TaskState::Ready, to = %TaskState::Released, "task transition");
        let CacheEntry {
            asset,
            dependencies,
            loader,
            ..
        } = entry;
        state.stats.disposed += 1;
        state.disposals.push(Disposal {
            descriptor: descriptor.clone(),
            asset,
            loader,
        });
        for dep in &dependencies {
            if let Err(err) = self.release_locked(state, dep) {
                tracing::warn!(asset = %descriptor, dependency = %dep, error = %err, "dependency release failed");
            }
        }
    }

    pub fn release(&self, descriptor: &AssetDescriptor) -> Result<TaskState, AssetError> {
        let mut guard = self.state.lock();
        self.release_locked(&mut guard, descriptor)
    }

    /// Evict every cache entry, dependents first.
    pub fn clear_cache(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for descriptor in state.cache.disposal_order() {
            if let Some(entry) = state.cache.evict(&descriptor) {
                state.stats.disposed += 1;
                state.disposals.push(Disposal {
                    descriptor,
                    asset: entry.asset,
                    loader: entry.loader,
                });
            }
        }
    }

    /// Refuse new requests and fail every outstanding handle.
    pub fn shutdown(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.closed = true;
        state.active.clear();
        let tasks: Vec<Task> = state.tasks.drain().map(|(_, task)| task).collect();
        for task in tasks {
            let err = Err(AssetError::Disconnected(task.descriptor.path().to_string()));
            for waiter in task.waiters {
                notify(waiter, &task.descriptor, &err, &mut state.callbacks);
            }
        }
    }

    // Queries shared by the manager and its servers.

    pub fn get(&self, descriptor: &AssetDescriptor) -> Option<Asset> {
        self.state.lock().cache.get(descriptor).cloned()
    }

    pub fn reference_count(&self, descriptor: &AssetDescriptor) -> usize {
        let state = self.state.lock();
        if let Some(count) = state.cache.ref_count(descriptor) {
            return count;
        }
        state
            .active
            .get(descriptor)
            .and_then(|id| state.tasks.get(id))
            .map_or(0, |t| t.refs)
    }

    pub fn task_state(&self, descriptor: &AssetDescriptor) -> Option<TaskState> {
        let state = self.state.lock();
        if state.cache.contains(descriptor) {
            return Some(TaskState::Ready);
        }
        state
            .active
            .get(descriptor)
            .and_then(|id| state.tasks.get(id))
            .map(|t| t.state)
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;

    #[test]
    fn worker_threads_use_the_configured_prefix() {
        let config = ManagerConfig {
            worker_threads: 2,
            thread_name_prefix: "pool".to_string(),
            ..Default::default()
        };
        let (pipeline, _rx) = Pipeline::new(
            &config,
            Arc::new(MemoryResolver::new()),
            LoaderRegistry::with_defaults(),
        )
        .unwrap();
        let name = pipeline
            .workers
            .install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("pool-"));
        assert_eq!(pipeline.workers.current_num_threads(), 2);
    }

    #[test]
    fn release_of_unknown_descriptor_is_not_loaded() {
        let (pipeline, _rx) = Pipeline::new(
            &ManagerConfig::default(),
            Arc::new(MemoryResolver::new()),
            LoaderRegistry::with_defaults(),
        )
        .unwrap();
        let err = pipeline.release(&AssetDescriptor::texture("x.png")).unwrap_err();
        assert!(matches!(err, AssetError::NotLoaded(_)));
    }

    #[test]
    fn shutdown_refuses_new_requests() {
        let (pipeline, _rx) = Pipeline::new(
            &ManagerConfig::default(),
            Arc::new(MemoryResolver::new()),
            LoaderRegistry::with_defaults(),
        )
        .unwrap();
        pipeline.shutdown();

        let slot = Arc::new(crate::handle::LoadSlot::new());
        pipeline.request(&AssetDescriptor::texture("x.png"), Waiter::Handle(Arc::clone(&slot)));
        assert!(matches!(slot.get(), Some(Err(AssetError::Disconnected(_)))));
    }
}
