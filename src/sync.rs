// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Spin lock with adaptive backoff, embeddable in shared-memory structures.
// Critical sections guarded by this lock must stay short: any cooperating
// process may crash while holding it, so nothing on the data path is allowed
// to sleep inside one.

use std::sync::atomic::{AtomicU32, Ordering};

/// Adaptive backoff: pause → yield → sleep.
///
/// - k < 4:  busy spin (do nothing)
/// - k < 16: CPU pause hint
/// - k < 32: thread yield
/// - k >= 32: sleep 1ms
#[inline]
pub(crate) fn adaptive_yield(k: &mut u32) {
    if *k < 4 {
        // busy spin
    } else if *k < 16 {
        std::hint::spin_loop();
    } else if *k < 32 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        return;
    }
    *k += 1;
}

/// A spin lock that lives inside a process-shared `repr(C)` structure.
///
/// `repr(transparent)` over an `AtomicU32` so it can be placed directly into
/// shared-memory headers. Fresh shared memory is zero-filled, which is the
/// unlocked state — no explicit initialisation required.
#[repr(transparent)]
pub struct RawSpinLock {
    lc: AtomicU32,
}

impl RawSpinLock {
    /// Create a new unlocked spin lock (for process-local use).
    pub const fn new() -> Self {
        Self {
            lc: AtomicU32::new(0),
        }
    }

    /// Acquire the lock, spinning with adaptive backoff.
    pub fn lock(&self) {
        let mut k = 0u32;
        while self.lc.swap(1, Ordering::Acquire) != 0 {
            adaptive_yield(&mut k);
        }
    }

    /// Release the lock.
    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }

    /// Run `f` with the lock held.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        let r = f();
        self.unlock();
        r
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: designed for concurrent access across threads and processes.
unsafe impl Send for RawSpinLock {}
unsafe impl Sync for RawSpinLock {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_unlock_single_thread() {
        let l = RawSpinLock::new();
        l.lock();
        l.unlock();
        l.lock();
        l.unlock();
    }

    #[test]
    fn with_serialises_increments() {
        let lock = Arc::new(RawSpinLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    lock.with(|| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 4000);
    }
}
