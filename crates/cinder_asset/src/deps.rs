//! Dependency resolution
//!
//! Expanding a request takes two passes. Loaders list dependencies with the
//! scheduler lock released, since that may read and parse files. The graph is
//! then built under the lock in one go: cached descriptors are retained,
//! in-flight ones are joined and new ones get a task. Every edge is checked
//! for a cycle before it is added, and tasks the request created only start
//! once the whole request is accepted, so a cycle anywhere in the graph fails
//! it before any async work.

use crate::asset::Asset;
use crate::descriptor::AssetDescriptor;
use crate::error::AssetError;
use crate::loader::{Dependencies, Loader};
use crate::scheduler::{Pipeline, SchedulerState};
use crate::task::{Task, TaskId, TaskState, Waiter};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub(crate) enum Submitted {
    /// Cache hit; one reference was taken.
    Ready(Asset),
    /// In flight; one reference was added to the task.
    Pending(TaskId),
}

/// A loader and its dependency phase; the outer error is a missing loader.
type Planned = Result<(Arc<dyn Loader>, Result<Dependencies, AssetError>), AssetError>;

/// Bookkeeping for one top-level request.
#[derive(Default)]
pub(crate) struct Expansion {
    /// Dependency phases already run, keyed by descriptor.
    planned: HashMap<AssetDescriptor, Planned>,
    /// Tasks this request created, in creation order.
    created: Vec<TaskId>,
    /// Created tasks with every dependency in hand.
    ready: Vec<TaskId>,
}

impl Pipeline {
    /// Descriptors reachable from `root` that would need a new task but have
    /// no dependency list yet.
    pub(crate) fn unplanned(
        &self,
        state: &SchedulerState,
        root: &AssetDescriptor,
        expansion: &Expansion,
    ) -> Vec<AssetDescriptor> {
        let mut missing = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(descriptor) = stack.pop() {
            if state.cache.contains(&descriptor)
                || state.active.contains_key(&descriptor)
                || !seen.insert(descriptor.clone())
            {
                continue;
            }
            match expansion.planned.get(&descriptor) {
                Some(Ok((_, Ok(deps)))) => stack.extend(deps.descriptors.iter().cloned()),
                Some(_) => {}
                None => missing.push(descriptor),
            }
        }
        missing
    }

    /// Run the dependency phase for each descriptor. Call without the
    /// scheduler lock.
    pub(crate) fn plan(&self, descriptors: Vec<AssetDescriptor>, expansion: &mut Expansion) {
        for descriptor in descriptors {
            let planned = self.plan_one(&descriptor);
            expansion.planned.insert(descriptor, planned);
        }
    }

    fn plan_one(&self, descriptor: &AssetDescriptor) -> Planned {
        let loader = self.loader(descriptor.kind())?;
        let deps = loader.dependencies(descriptor, self.resolver.as_ref());
        Ok((loader, deps))
    }

    /// Take one reference on `descriptor`, creating its task if needed.
    ///
    /// `dependent` is the task that needs `descriptor`, if any. On error no
    /// reference is held and any task created for `descriptor` has failed.
    pub(crate) fn submit(
        &self,
        state: &mut SchedulerState,
        expansion: &mut Expansion,
        descriptor: &AssetDescriptor,
        dependent: Option<TaskId>,
    ) -> Result<Submitted, AssetError> {
        if let Some(asset) = state.cache.retain(descriptor) {
            state.stats.cache_hits += 1;
            tracing::trace!(asset = %descriptor, "cache hit");
            return Ok(Submitted::Ready(asset));
        }

        if let Some(id) = state.active.get(descriptor).copied() {
            if let Some(dependent) = dependent {
                if let Some(cycle) = cycle_through(state, id, dependent) {
                    tracing::warn!(cycle = %cycle.join(" -> "), "dependency cycle");
                    return Err(AssetError::DependencyCycle { cycle });
                }
            }
            if let Some(task) = state.tasks.get_mut(&id) {
                task.refs += 1;
            }
            return Ok(Submitted::Pending(id));
        }

        // Always planned, unless this request already created and lost a
        // task for the same descriptor.
        let planned = match expansion.planned.remove(descriptor) {
            Some(planned) => planned,
            None => self.plan_one(descriptor),
        };
        let (loader, deps) = planned?;
        let id = self.create_task(state, expansion, descriptor, loader);
        let deps = match deps {
            Ok(deps) => deps,
            Err(err) => {
                self.fail_task(state, id, err.clone());
                return Err(err);
            }
        };
        if let Some(task) = state.tasks.get_mut(&id) {
            task.dependencies = deps.descriptors.clone();
            task.resolved = vec![None; deps.descriptors.len()];
            task.parsed = deps.parsed;
        }

        for dep in &deps.descriptors {
            match self.submit(state, expansion, dep, Some(id)) {
                Ok(Submitted::Ready(asset)) => {
                    if let Some(task) = state.tasks.get_mut(&id) {
                        task.fill_dependency(dep, asset);
                    }
                }
                Ok(Submitted::Pending(dep_id)) => {
                    if let Some(dep_task) = state.tasks.get_mut(&dep_id) {
                        dep_task.waiters.push(Waiter::Dependent(id));
                    }
                    if let Some(task) = state.tasks.get_mut(&id) {
                        task.pending += 1;
                    }
                }
                Err(err) => {
                    let err = err.for_dependent(descriptor.path(), dep.path());
                    self.fail_task(state, id, err.clone());
                    return Err(err);
                }
            }
        }

        let ready = match state.tasks.get(&id) {
            Some(task) => task.pending == 0,
            None => return Err(AssetError::NotLoaded(descriptor.path().to_string())),
        };
        if ready {
            expansion.ready.push(id);
        }
        Ok(Submitted::Pending(id))
    }

    fn create_task(
        &self,
        state: &mut SchedulerState,
        expansion: &mut Expansion,
        descriptor: &AssetDescriptor,
        loader: Arc<dyn Loader>,
    ) -> TaskId {
        let id = state.allocate_id();
        let mut task = Task::new(id, descriptor.clone(), loader);
        task.refs = 1;
        task.transition(TaskState::ResolvingDependencies);
        state.tasks.insert(id, task);
        state.active.insert(descriptor.clone(), id);
        state.stats.tasks_created += 1;
        state.created_since_idle += 1;
        expansion.created.push(id);
        tracing::debug!(task = id, asset = %descriptor, "task created");
        id
    }

    /// Close out a request. Accepted requests start their ready tasks; a
    /// rejected one drops whatever it created that is still pending, since
    /// nothing outside the request can reach those tasks.
    pub(crate) fn settle(&self, state: &mut SchedulerState, expansion: Expansion, accepted: bool) {
        if accepted {
            for id in expansion.ready {
                let startable = state.tasks.get(&id).is_some_and(|t| {
                    t.pending == 0 && t.state == TaskState::ResolvingDependencies
                });
                if startable {
                    self.dispatch(state, id);
                }
            }
            return;
        }

        let abandoned: Vec<Task> = expansion
            .created
            .iter()
            .filter_map(|id| state.tasks.remove(id))
            .collect();
        for task in &abandoned {
            state.active.remove(&task.descriptor);
            state.settled_since_idle += 1;
            tracing::debug!(task = task.id, asset = %task.descriptor, "task abandoned");
        }
        for task in &abandoned {
            self.return_dependencies(state, task);
        }
    }
}

/// Would `dependent -> dependency` close a loop? Returns the loop as paths,
/// starting and ending at `dependent`.
fn cycle_through(
    state: &SchedulerState,
    dependency: TaskId,
    dependent: TaskId,
) -> Option<Vec<String>> {
    let mut came_from: HashMap<TaskId, TaskId> = HashMap::new();
    let mut seen = HashSet::from([dependency]);
    let mut stack = vec![dependency];

    while let Some(current) = stack.pop() {
        if current == dependent {
            let mut chain = vec![current];
            let mut node = current;
            while let Some(&prev) = came_from.get(&node) {
                chain.push(prev);
                node = prev;
            }
            chain.reverse();

            let path = |id: TaskId| {
                state
                    .tasks
                    .get(&id)
                    .map(|t| t.descriptor.path().to_string())
                    .unwrap_or_default()
            };
            let mut cycle = vec![path(dependent)];
            cycle.extend(chain.into_iter().map(path));
            return Some(cycle);
        }

        let Some(task) = state.tasks.get(&current) else {
            continue;
        };
        for dep in &task.dependencies {
            if let Some(&next) = state.active.get(dep) {
                if seen.insert(next) {
                    came_from.insert(next, current);
                    stack.push(next);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::PixmapLoader;

    fn state_with(edges: &[(&str, &[&str])]) -> (SchedulerState, HashMap<String, TaskId>) {
        let mut state = SchedulerState::default();
        let mut ids = HashMap::new();
        for (path, _) in edges {
            let id = state.allocate_id();
            let desc = AssetDescriptor::pixmap(path);
            state.active.insert(desc.clone(), id);
            state
                .tasks
                .insert(id, Task::new(id, desc, Arc::new(PixmapLoader)));
            ids.insert(path.to_string(), id);
        }
        for (path, deps) in edges {
            let task = state.tasks.get_mut(&ids[*path]).unwrap();
            task.dependencies = deps.iter().map(AssetDescriptor::pixmap).collect();
        }
        (state, ids)
    }

    #[test]
    fn finds_a_two_step_loop() {
        let (state, ids) = state_with(&[("a", &["b"]), ("b", &[])]);
        // b now wants a, and a already waits on b.
        let cycle = cycle_through(&state, ids["a"], ids["b"]).unwrap();
        assert_eq!(cycle, vec!["b", "a", "b"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let (state, ids) = state_with(&[("a", &[])]);
        assert_eq!(cycle_through(&state, ids["a"], ids["a"]).unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn shared_dependency_is_not_a_cycle() {
        let (state, ids) = state_with(&[("a", &["c"]), ("b", &["c"]), ("c", &[])]);
        assert!(cycle_through(&state, ids["c"], ids["b"]).is_none());
        assert!(cycle_through(&state, ids["a"], ids["b"]).is_none());
    }
}
