//! Scoped bump-allocated memory with a cleanup-on-drop chain (C1).
//!
//! The original pattern is a pool allocator whose blocks are freed in one
//! shot when the owning connection or request goes away, plus a LIFO chain
//! of cleanup callbacks that must run even on the error path. In safe Rust
//! the allocator itself is unnecessary (the system allocator plus `Vec`
//! already amortizes small allocations well); what's worth keeping is the
//! deterministic, drop-order-preserved cleanup chain, since several
//! subsystems (CGI child reaping, temp-file unlinking, cache lock release)
//! rely on "this runs exactly once, in reverse-registration order, no matter
//! which exit path was taken".

/// A scope whose registered cleanups run in LIFO order when it is dropped.
/// Analogous to the source's per-connection/per-request arena pool, minus the
/// bump allocator (see module docs).
pub struct Arena {
    cleanups: Vec<Box<dyn FnOnce() + Send>>,
}

impl Arena {
    pub fn new() -> Self {
        Self { cleanups: Vec::new() }
    }

    /// Registers a cleanup to run when this arena is dropped or explicitly
    /// `release`d, mirroring `ngx_pool_cleanup_add`.
    pub fn on_cleanup<F: FnOnce() + Send + 'static>(&mut self, f: F) {
        self.cleanups.push(Box::new(f));
    }

    /// Runs every registered cleanup now, in LIFO order, and clears the list.
    /// Called explicitly at request/connection teardown so cleanup ordering
    /// is visible at the call site rather than deferred to an implicit drop.
    pub fn release(&mut self) {
        while let Some(cleanup) = self.cleanups.pop() {
            cleanup();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cleanups.is_empty()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn cleanups_run_lifo_on_release() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut arena = Arena::new();
        for i in 0..3 {
            let order = order.clone();
            arena.on_cleanup(move || order.lock().unwrap().push(i));
        }
        arena.release();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert!(arena.is_empty());
    }

    #[test]
    fn cleanups_run_on_drop() {
        let order = Arc::new(AtomicUsize::new(0));
        {
            let o = order.clone();
            let mut arena = Arena::new();
            arena.on_cleanup(move || o.store(7, Ordering::SeqCst));
        }
        assert_eq!(order.load(Ordering::SeqCst), 7);
    }
}
