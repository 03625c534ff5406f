#[doc(hidden)]
pub use ::log as __log;

/// Panics in debug builds, logs an error in release builds.
///
/// Use this for invariants whose violation is a bug, but where a release
/// build should rather drop a frame than take the whole process down.
#[macro_export]
macro_rules! debug_panic {
    ($($arg:tt)*) => {{
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        } else {
            $crate::__log::error!($($arg)*);
        }
    }};
}

/// Counts occurrences of something noisy and tells you when it's worth logging again.
///
/// The first occurrence is always reported, after that only every `every`-th one.
#[derive(Debug)]
pub struct RateLimiter {
    every: usize,
    count: std::sync::atomic::AtomicUsize,
}

impl RateLimiter {
    pub const fn new(every: usize) -> Self {
        Self {
            every,
            count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Registers one occurrence. Returns the running count if this one should be logged.
    pub fn hit(&self) -> Option<usize> {
        let count = self
            .count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        (count == 1 || count % self.every.max(1) == 0).then_some(count)
    }

    pub fn count(&self) -> usize {
        self.count.load(std::sync::atomic::Ordering::Relaxed)
    }
}
