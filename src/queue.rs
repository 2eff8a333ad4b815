// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-capacity ring of chunk indices inside shared memory, used for each
// subscriber's receive queue and for the service history buffer. Multiple
// publishers may push concurrently and eviction must stay consistent with
// popping, so every operation runs under a short spin-locked section instead
// of the lock-free SPSC cursors a single-writer ring could use.
//
// Region layout:
//
//   [ RingHeader ]
//   [ u32 entry ] × capacity

use crate::sync::RawSpinLock;

#[repr(C)]
struct RingHeader {
    lock: RawSpinLock,
    head: u64, // next pop position
    tail: u64, // next push position
    capacity: u32,
    _pad: u32,
}

/// Bytes needed for a ring of `capacity` entries.
pub(crate) fn ring_bytes(capacity: u32) -> usize {
    crate::arena::align_up(
        std::mem::size_of::<RingHeader>() + capacity as usize * std::mem::size_of::<u32>(),
        std::mem::align_of::<u64>(),
    )
}

/// Transient view over one ring region.
pub(crate) struct ChunkQueue {
    base: *mut u8,
}

impl ChunkQueue {
    /// # Safety
    /// `base` must point to a ring region that stays mapped while the view is
    /// in use and was initialised by the segment creator via [`init`].
    ///
    /// [`init`]: ChunkQueue::init
    pub unsafe fn at(base: *mut u8) -> Self {
        Self { base }
    }

    /// Initialise an empty ring. Creator only; fresh shm is zero-filled, so
    /// only the capacity needs storing.
    pub fn init(&self, capacity: u32) {
        unsafe { (*self.hdr_mut()).capacity = capacity };
    }

    fn hdr(&self) -> &RingHeader {
        unsafe { &*(self.base as *const RingHeader) }
    }

    fn hdr_mut(&self) -> *mut RingHeader {
        self.base as *mut RingHeader
    }

    fn entry_ptr(&self, pos: u64) -> *mut u32 {
        let cap = self.hdr().capacity as u64;
        unsafe {
            (self.base.add(std::mem::size_of::<RingHeader>()) as *mut u32)
                .add((pos % cap) as usize)
        }
    }

    pub fn capacity(&self) -> u32 {
        self.hdr().capacity
    }

    /// Push `idx`; fails when the ring is full (reject-new policy).
    pub fn push(&self, idx: u32) -> bool {
        let hdr = self.hdr();
        if hdr.capacity == 0 {
            return false;
        }
        hdr.lock.with(|| {
            let h = self.hdr_mut();
            let (head, tail) = unsafe { ((*h).head, (*h).tail) };
            if tail - head >= hdr.capacity as u64 {
                return false;
            }
            unsafe {
                *self.entry_ptr(tail) = idx;
                (*h).tail = tail + 1;
            }
            true
        })
    }

    /// Push `idx`, evicting the oldest entry when full (drop-oldest policy).
    /// Returns the evicted index, if any. A zero-capacity ring swallows the
    /// push and reports the pushed index itself as evicted.
    pub fn push_overwrite(&self, idx: u32) -> Option<u32> {
        let hdr = self.hdr();
        if hdr.capacity == 0 {
            return Some(idx);
        }
        hdr.lock.with(|| {
            let h = self.hdr_mut();
            let (head, tail) = unsafe { ((*h).head, (*h).tail) };
            let evicted = if tail - head >= hdr.capacity as u64 {
                let old = unsafe { *self.entry_ptr(head) };
                unsafe { (*h).head = head + 1 };
                Some(old)
            } else {
                None
            };
            unsafe {
                *self.entry_ptr(tail) = idx;
                (*h).tail = tail + 1;
            }
            evicted
        })
    }

    /// Pop the oldest entry (FIFO). Non-blocking.
    pub fn pop(&self) -> Option<u32> {
        let hdr = self.hdr();
        if hdr.capacity == 0 {
            return None;
        }
        hdr.lock.with(|| {
            let h = self.hdr_mut();
            let (head, tail) = unsafe { ((*h).head, (*h).tail) };
            if head >= tail {
                return None;
            }
            let idx = unsafe { *self.entry_ptr(head) };
            unsafe { (*h).head = head + 1 };
            Some(idx)
        })
    }

    pub fn len(&self) -> usize {
        let hdr = self.hdr();
        if hdr.capacity == 0 {
            return 0;
        }
        hdr.lock
            .with(|| unsafe { ((*self.hdr_mut()).tail - (*self.hdr_mut()).head) as usize })
    }

    /// Visit up to the `n` most recent entries without consuming them,
    /// oldest first. Used for history catch-up of late-joining subscribers.
    pub fn for_each_latest(&self, n: usize, mut f: impl FnMut(u32)) {
        let hdr = self.hdr();
        if hdr.capacity == 0 || n == 0 {
            return;
        }
        hdr.lock.with(|| {
            let h = self.hdr_mut();
            let (head, tail) = unsafe { ((*h).head, (*h).tail) };
            let available = (tail - head) as usize;
            let take = available.min(n);
            for pos in (tail - take as u64)..tail {
                f(unsafe { *self.entry_ptr(pos) });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ring(capacity: u32) -> (Vec<u64>, ChunkQueue) {
        let words = ring_bytes(capacity) / 8 + 1;
        let mut buf = vec![0u64; words];
        let q = unsafe { ChunkQueue::at(buf.as_mut_ptr() as *mut u8) };
        q.init(capacity);
        (buf, q)
    }

    #[test]
    fn fifo_order() {
        let (_buf, q) = make_ring(8);
        for i in 0..5 {
            assert!(q.push(i));
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_rejects_when_full() {
        let (_buf, q) = make_ring(3);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(q.push(3));
        assert!(!q.push(4));
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(1));
    }

    #[test]
    fn push_overwrite_evicts_oldest() {
        let (_buf, q) = make_ring(3);
        for i in 1..=3 {
            assert_eq!(q.push_overwrite(i), None);
        }
        assert_eq!(q.push_overwrite(4), Some(1));
        assert_eq!(q.push_overwrite(5), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(4));
        assert_eq!(q.pop(), Some(5));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn zero_capacity_ring_swallows_everything() {
        let (_buf, q) = make_ring(0);
        assert_eq!(q.push_overwrite(9), Some(9));
        assert!(!q.push(9));
        assert_eq!(q.pop(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn for_each_latest_returns_tail_window_oldest_first() {
        let (_buf, q) = make_ring(4);
        for i in 1..=4 {
            q.push(i);
        }
        let mut seen = Vec::new();
        q.for_each_latest(2, |v| seen.push(v));
        assert_eq!(seen, vec![3, 4]);

        // Window larger than contents: everything, oldest first.
        seen.clear();
        q.for_each_latest(10, |v| seen.push(v));
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn wraparound_keeps_order() {
        let (_buf, q) = make_ring(2);
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(), Some(1));
        q.push(3);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }
}
