//! Cinder Core
//!
//! Contains the small set of primitives shared by every other crate:
//! - Fixed-rate tick clock driving the host update loop
//! - Owning-thread guard for context-bound objects
//! - Deterministic pseudo-random numbers

pub mod math;
pub mod thread;
pub mod time;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
