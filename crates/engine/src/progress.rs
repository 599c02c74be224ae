//! Build progress reporting and cooperative cancellation.
//!
//! Long builds report progress through a caller-supplied callback and can be
//! cancelled from another thread. Cancellation is cooperative: build code
//! polls [`Progress::is_cancelled`] at unit-of-work boundaries and unwinds
//! cleanly, keeping whatever partial state it has.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type Callback = Box<dyn Fn() + Send + Sync>;

/// Shared progress state for a graph build.
///
/// Thread-safe; a build's worker threads increment it while a UI thread may
/// observe or cancel it.
pub struct Progress {
    total: AtomicU64,
    current: AtomicU64,
    cancelled: AtomicBool,
    on_increment: Callback,
    on_reset: Callback,
}

impl Progress {
    pub fn new(
        on_increment: impl Fn() + Send + Sync + 'static,
        on_reset: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            total: AtomicU64::new(0),
            current: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            on_increment: Box::new(on_increment),
            on_reset: Box::new(on_reset),
        }
    }

    /// A progress sink that reports nowhere. Cancellation still works.
    pub fn noop() -> Self {
        Self::new(|| {}, || {})
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Sampling interval: the callback fires roughly once per percent of the
    /// total, and at least every unit for small totals.
    pub fn update_every(&self) -> u64 {
        (self.total() / 100).max(1)
    }

    /// Record one completed unit of work, firing the callback at the
    /// sampling interval.
    pub fn increment(&self) {
        let done = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.update_every() == 0 {
            (self.on_increment)();
        }
    }

    /// Request cancellation. Build code observes this at its next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Restart counting from zero, e.g. when a stale snapshot forces a full
    /// rebuild. Does not clear a pending cancellation.
    pub fn reset(&self) {
        self.current.store(0, Ordering::Relaxed);
        (self.on_reset)();
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total())
            .field("current", &self.current())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn test_update_every_is_one_percent_floored_at_one() {
        let p = Progress::noop();
        p.set_total(0);
        assert_eq!(p.update_every(), 1);
        p.set_total(50);
        assert_eq!(p.update_every(), 1);
        p.set_total(1000);
        assert_eq!(p.update_every(), 10);
    }

    #[test]
    fn test_increment_fires_at_sampling_interval() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = Arc::clone(&fired);
        let p = Progress::new(move || { fired2.fetch_add(1, Ordering::Relaxed); }, || {});
        p.set_total(200);

        for _ in 0..200 {
            p.increment();
        }
        // update_every = 2, so the callback fires on every even count.
        assert_eq!(fired.load(Ordering::Relaxed), 100);
        assert_eq!(p.current(), 200);
    }

    #[test]
    fn test_cancel_flag() {
        let p = Progress::noop();
        assert!(!p.is_cancelled());
        p.cancel();
        assert!(p.is_cancelled());
    }

    #[test]
    fn test_reset_zeroes_current_and_fires_callback() {
        let resets = Arc::new(AtomicU32::new(0));
        let resets2 = Arc::clone(&resets);
        let p = Progress::new(|| {}, move || { resets2.fetch_add(1, Ordering::Relaxed); });
        p.set_total(10);
        p.increment();
        p.increment();

        p.reset();
        assert_eq!(p.current(), 0);
        assert_eq!(resets.load(Ordering::Relaxed), 1);
    }
}
