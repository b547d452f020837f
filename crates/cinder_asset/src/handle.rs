//! Request handles
//!
//! A `LoadHandle` observes one request. It completes when the task reaches a
//! terminal state, which only happens while the owning thread drains.

use crate::asset::Asset;
use crate::descriptor::AssetDescriptor;
use crate::error::AssetError;
use cinder_core::thread::OwnerThread;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct LoadSlot {
    result: Mutex<Option<Result<Asset, AssetError>>>,
    done: Condvar,
}

impl LoadSlot {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// First completion wins.
    pub fn complete(&self, result: Result<Asset, AssetError>) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(result);
            self.done.notify_all();
        }
    }

    pub fn get(&self) -> Option<Result<Asset, AssetError>> {
        self.result.lock().clone()
    }

    pub fn is_done(&self) -> bool {
        self.result.lock().is_some()
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Option<Result<Asset, AssetError>> {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return Some(result.clone());
            }
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut slot, deadline).timed_out() {
                        return slot.clone();
                    }
                }
                None => self.done.wait(&mut slot),
            }
        }
    }
}

/// Observer for one load request.
///
/// Holds no reference of its own: the reference taken by the request belongs
/// to the caller and is returned with `release`.
#[derive(Clone)]
pub struct LoadHandle {
    descriptor: AssetDescriptor,
    slot: Arc<LoadSlot>,
    owner: OwnerThread,
}

impl LoadHandle {
    pub(crate) fn new(descriptor: AssetDescriptor, slot: Arc<LoadSlot>, owner: OwnerThread) -> Self {
        Self {
            descriptor,
            slot,
            owner,
        }
    }

    pub fn descriptor(&self) -> &AssetDescriptor {
        &self.descriptor
    }

    pub fn is_done(&self) -> bool {
        self.slot.is_done()
    }

    /// The result, if the request has finished.
    pub fn poll(&self) -> Option<Result<Asset, AssetError>> {
        self.slot.get()
    }

    /// Block until the request finishes.
    ///
    /// On the owning thread this would never return, since completions are
    /// only finalized there; it fails with `WrongThread` unless the result is
    /// already in. Use `AssetManager::finish_loading_asset` instead.
    pub fn wait(&self) -> Result<Asset, AssetError> {
        if let Some(result) = self.slot.get() {
            return result;
        }
        if self.owner.is_current() {
            return Err(AssetError::WrongThread("LoadHandle::wait"));
        }
        self.slot
            .wait_until(None)
            .unwrap_or_else(|| Err(AssetError::Disconnected(self.descriptor.path().to_string())))
    }

    /// Like `wait`, giving up after `timeout`. `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<Asset, AssetError>> {
        if let Some(result) = self.slot.get() {
            return Some(result);
        }
        if self.owner.is_current() {
            return Some(Err(AssetError::WrongThread("LoadHandle::wait_timeout")));
        }
        self.slot.wait_until(Some(Instant::now() + timeout))
    }
}

impl std::fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadHandle")
            .field("descriptor", &self.descriptor)
            .field("done", &self.is_done())
            .finish()
    }
}
