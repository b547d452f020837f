//! Per-descriptor load tasks
//!
//! ```text
//! Queued -> ResolvingDependencies -> AsyncLoading -> AwaitingSync -> Finalizing -> Ready -> Released
//!                                 \________________/
//!                                  (no async phase)
//! any state before Ready -> Failed
//! ```

use crate::asset::Asset;
use crate::descriptor::AssetDescriptor;
use crate::error::AssetError;
use crate::handle::LoadSlot;
use crate::loader::{Loader, Payload};
use std::fmt;
use std::sync::Arc;

pub type TaskId = u64;

/// Completion callback. Always invoked on the owning thread.
pub type LoadCallback = Box<dyn FnOnce(&AssetDescriptor, Result<&Asset, &AssetError>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    ResolvingDependencies,
    AsyncLoading,
    AwaitingSync,
    Finalizing,
    Ready,
    Failed,
    Released,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Failed | TaskState::Released)
    }

    pub fn can_transition(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Queued, ResolvingDependencies)
            | (ResolvingDependencies, AsyncLoading)
            | (ResolvingDependencies, AwaitingSync)
            | (AsyncLoading, AwaitingSync)
            | (AwaitingSync, Finalizing)
            | (Finalizing, Ready)
            | (Ready, Released) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Someone waiting on a task. Each waiter holds one reference on the result.
pub(crate) enum Waiter {
    Handle(Arc<LoadSlot>),
    Callback(LoadCallback),
    Dependent(TaskId),
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waiter::Handle(_) => f.write_str("Handle"),
            Waiter::Callback(_) => f.write_str("Callback"),
            Waiter::Dependent(id) => write!(f, "Dependent({id})"),
        }
    }
}

pub(crate) struct Task {
    pub id: TaskId,
    pub descriptor: AssetDescriptor,
    pub loader: Arc<dyn Loader>,
    pub state: TaskState,
    pub dependencies: Vec<AssetDescriptor>,
    /// Finalized dependencies, positionally matching `dependencies`.
    pub resolved: Vec<Option<Asset>>,
    pub pending: usize,
    pub parsed: Option<Payload>,
    /// References the cache entry starts with once the task is ready.
    pub refs: usize,
    pub waiters: Vec<Waiter>,
}

impl Task {
    pub fn new(id: TaskId, descriptor: AssetDescriptor, loader: Arc<dyn Loader>) -> Self {
        Self {
            id,
            descriptor,
            loader,
            state: TaskState::Queued,
            dependencies: Vec::new(),
            resolved: Vec::new(),
            pending: 0,
            parsed: None,
            refs: 0,
            waiters: Vec::new(),
        }
    }

    pub fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal transition {} -> {} for {}",
            self.state,
            next,
            self.descriptor
        );
        tracing::trace!(task = self.id, asset = %self.descriptor, from = %self.state, to = %next, "task transition");
        self.state = next;
    }

    /// Record a finalized dependency. Returns false if no slot was waiting for it.
    pub fn fill_dependency(&mut self, descriptor: &AssetDescriptor, asset: Asset) -> bool {
        let slot = self
            .dependencies
            .iter()
            .zip(self.resolved.iter_mut())
            .find(|(d, r)| *d == descriptor && r.is_none())
            .map(|(_, r)| r);
        match slot {
            Some(slot) => {
                *slot = Some(asset);
                true
            }
            None => false,
        }
    }

    /// Resolved dependencies in declaration order.
    pub fn resolved_assets(&self) -> Vec<Asset> {
        self.resolved.iter().flatten().cloned().collect()
    }

    /// Drop one `Dependent(id)` waiter, if present.
    pub fn remove_dependent(&mut self, id: TaskId) -> bool {
        match self
            .waiters
            .iter()
            .position(|w| matches!(w, Waiter::Dependent(d) if *d == id))
        {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Deliver a terminal result to a non-dependent waiter. Callbacks are queued
/// for the owning thread.
pub(crate) fn notify(
    waiter: Waiter,
    descriptor: &AssetDescriptor,
    result: &Result<Asset, AssetError>,
    callbacks: &mut Vec<PendingCallback>,
) {
    match waiter {
        Waiter::Handle(slot) => slot.complete(result.clone()),
        Waiter::Callback(callback) => callbacks.push(PendingCallback {
            descriptor: descriptor.clone(),
            result: result.clone(),
            callback,
        }),
        Waiter::Dependent(_) => {}
    }
}

pub(crate) struct PendingCallback {
    pub descriptor: AssetDescriptor,
    pub result: Result<Asset, AssetError>,
    pub callback: LoadCallback,
}

impl PendingCallback {
    pub fn run(self) {
        (self.callback)(&self.descriptor, self.result.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Pixmap;
    use crate::loaders::PixmapLoader;
    use cinder_render::{PixelBuffer, PixelFormat};

    fn pixmap() -> Asset {
        let pixels = PixelBuffer::filled(1, 1, PixelFormat::Alpha8, &[0]).unwrap();
        Asset::Pixmap(Arc::new(Pixmap::new(pixels)))
    }

    #[test]
    fn legal_transitions() {
        use TaskState::*;
        assert!(Queued.can_transition(ResolvingDependencies));
        assert!(ResolvingDependencies.can_transition(AwaitingSync));
        assert!(AsyncLoading.can_transition(Failed));
        assert!(Ready.can_transition(Released));
        assert!(!Ready.can_transition(Failed));
        assert!(!Failed.can_transition(Failed));
        assert!(!Queued.can_transition(Finalizing));
        assert!(!Released.can_transition(Ready));
    }

    #[test]
    fn duplicate_dependencies_fill_in_order() {
        let page = AssetDescriptor::pixmap("p.png");
        let mut task = Task::new(1, AssetDescriptor::atlas("a.atlas"), Arc::new(PixmapLoader));
        task.dependencies = vec![page.clone(), AssetDescriptor::pixmap("q.png"), page.clone()];
        task.resolved = vec![None, None, None];

        assert!(task.fill_dependency(&page, pixmap()));
        assert!(task.fill_dependency(&page, pixmap()));
        assert!(!task.fill_dependency(&page, pixmap()));
        assert!(task.resolved[1].is_none());
        assert_eq!(task.resolved_assets().len(), 2);
    }

    #[test]
    fn remove_dependent_takes_one_waiter() {
        let mut task = Task::new(1, AssetDescriptor::pixmap("p.png"), Arc::new(PixmapLoader));
        task.waiters.push(Waiter::Dependent(7));
        task.waiters.push(Waiter::Dependent(7));
        assert!(task.remove_dependent(7));
        assert_eq!(task.waiters.len(), 1);
        assert!(!task.remove_dependent(8));
    }
}
