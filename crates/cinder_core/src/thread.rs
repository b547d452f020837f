//! Owning-thread tracking
//!
//! Rendering-context objects may only be touched from the thread that created
//! the context. `OwnerThread` records that thread and answers "am I on it?".

use std::thread::{self, ThreadId};

/// Identity of the thread that owns a context-bound object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerThread {
    id: ThreadId,
}

impl OwnerThread {
    /// Claim the calling thread as owner.
    pub fn current() -> Self {
        Self {
            id: thread::current().id(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Panic if called off the owning thread.
    ///
    /// Reserved for invariants whose violation is a programming error; fallible
    /// entry points should check `is_current` and return an error instead.
    #[track_caller]
    pub fn assert_current(&self, what: &str) {
        if !self.is_current() {
            panic!(
                "{what} called from {:?}, but it is owned by {:?}",
                thread::current().id(),
                self.id
            );
        }
    }
}
