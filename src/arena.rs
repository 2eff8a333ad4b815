// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Chunk arena: fixed-count pool of payload chunks inside a shared memory
// region, with a spin-locked free list and a per-chunk atomic reference
// count. The free list guards allocation; the reference count governs a
// chunk's lifetime once it left the pool.
//
// Region layout:
//
//   [ ArenaHeader ]
//   [ chunk ] × chunk_count
//
// Each chunk:
//   [ ChunkHeader | padding to payload alignment | payload bytes ]
//
// Chunk life cycle: Free → Loaned (one writer) → Published (immutable,
// many readers) → Free when the last reference is released. Payload bytes
// are zeroed only when the segment is first mapped, never on slot reuse.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use tracing::warn;

use crate::sync::RawSpinLock;

/// Free-list terminator.
const NIL: u32 = u32::MAX;

/// Chunk states stored in `ChunkHeader::state`.
pub(crate) const STATE_FREE: u32 = 0;
pub(crate) const STATE_LOANED: u32 = 1;
pub(crate) const STATE_PUBLISHED: u32 = 2;

/// Round `v` up to the next multiple of `align` (power of two).
pub(crate) const fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// Shared-memory structures
// ---------------------------------------------------------------------------

#[repr(C)]
struct ArenaHeader {
    /// Protects `free_head`, `free_count`, and every `next_free` link.
    lock: RawSpinLock,
    free_head: u32,
    free_count: u32,
    chunk_count: u32,
    chunk_stride: u32,
    chunks_off: u32,
    payload_off: u32,
}

#[repr(C)]
struct ChunkHeader {
    /// Number of live references; 0 only while the chunk sits in the free list.
    refs: AtomicU32,
    state: AtomicU32,
    /// PID of the loaning publisher while Loaned; 0 otherwise.
    owner_pid: AtomicI32,
    /// Element count, written by the publisher at send time.
    len: AtomicU32,
    /// Free-list link, valid only while Free. Guarded by the arena lock.
    next_free: u32,
    _pad: u32,
}

/// Byte layout of an arena region, derived from the service configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArenaLayout {
    pub chunk_count: u32,
    pub chunk_stride: u32,
    pub chunks_off: u32,
    pub payload_off: u32,
    pub total_bytes: usize,
}

impl ArenaLayout {
    pub fn compute(chunk_count: u32, payload_capacity: usize, payload_align: usize) -> Self {
        let align = payload_align.max(std::mem::align_of::<u64>());
        let payload_off = align_up(std::mem::size_of::<ChunkHeader>(), align);
        let chunk_stride = align_up(payload_off + payload_capacity, align);
        let chunks_off = align_up(std::mem::size_of::<ArenaHeader>(), align);
        let total_bytes = chunks_off + chunk_count as usize * chunk_stride;
        Self {
            chunk_count,
            chunk_stride: chunk_stride as u32,
            chunks_off: chunks_off as u32,
            payload_off: payload_off as u32,
            total_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena view
// ---------------------------------------------------------------------------

/// A transient view over an arena region. The caller keeps the backing
/// segment mapped for at least the lifetime of the view.
pub(crate) struct Arena {
    base: *mut u8,
}

impl Arena {
    /// # Safety
    /// `base` must point to an arena region that stays mapped while the view
    /// is in use, initialised via [`Arena::init`] by the segment creator.
    pub unsafe fn at(base: *mut u8) -> Self {
        Self { base }
    }

    /// Initialise the header and thread all chunks onto the free list.
    /// Must run exactly once, by the segment creator, before any other view.
    pub fn init(&self, layout: ArenaLayout) {
        let hdr = self.hdr_mut();
        unsafe {
            (*hdr).chunk_count = layout.chunk_count;
            (*hdr).chunk_stride = layout.chunk_stride;
            (*hdr).chunks_off = layout.chunks_off;
            (*hdr).payload_off = layout.payload_off;
            (*hdr).free_count = layout.chunk_count;
            (*hdr).free_head = if layout.chunk_count == 0 { NIL } else { 0 };
        }
        for i in 0..layout.chunk_count {
            let c = self.chunk_mut(i);
            unsafe {
                (*c).next_free = if i + 1 < layout.chunk_count { i + 1 } else { NIL };
            }
        }
    }

    fn hdr(&self) -> &ArenaHeader {
        unsafe { &*(self.base as *const ArenaHeader) }
    }

    fn hdr_mut(&self) -> *mut ArenaHeader {
        self.base as *mut ArenaHeader
    }

    fn chunk(&self, idx: u32) -> &ChunkHeader {
        unsafe { &*self.chunk_mut(idx) }
    }

    fn chunk_mut(&self, idx: u32) -> *mut ChunkHeader {
        let hdr = self.hdr();
        debug_assert!(idx < hdr.chunk_count);
        unsafe {
            self.base
                .add(hdr.chunks_off as usize + idx as usize * hdr.chunk_stride as usize)
                as *mut ChunkHeader
        }
    }

    /// Pointer to the payload bytes of chunk `idx`.
    pub fn payload_ptr(&self, idx: u32) -> *mut u8 {
        let hdr = self.hdr();
        unsafe {
            self.base.add(
                hdr.chunks_off as usize
                    + idx as usize * hdr.chunk_stride as usize
                    + hdr.payload_off as usize,
            )
        }
    }

    /// Pop a free chunk and hand it to `owner_pid` as a writable loan.
    /// Returns `None` when the pool is exhausted; arena state is unchanged.
    pub fn allocate(&self, owner_pid: i32) -> Option<u32> {
        let hdr = self.hdr();
        let idx = hdr.lock.with(|| {
            let h = self.hdr_mut();
            let head = unsafe { (*h).free_head };
            if head == NIL {
                return None;
            }
            unsafe {
                (*h).free_head = (*self.chunk_mut(head)).next_free;
                (*h).free_count -= 1;
            }
            Some(head)
        })?;

        let c = self.chunk(idx);
        c.refs.store(1, Ordering::Relaxed);
        c.owner_pid.store(owner_pid, Ordering::Relaxed);
        c.len.store(0, Ordering::Relaxed);
        c.state.store(STATE_LOANED, Ordering::Release);
        Some(idx)
    }

    /// Transition a loaned chunk to the immutable Published state.
    pub fn publish(&self, idx: u32, len: u32) {
        let c = self.chunk(idx);
        debug_assert_eq!(c.state.load(Ordering::Relaxed), STATE_LOANED);
        c.len.store(len, Ordering::Relaxed);
        c.owner_pid.store(0, Ordering::Relaxed);
        c.state.store(STATE_PUBLISHED, Ordering::Release);
    }

    /// Take an additional reference on a chunk that already has one.
    pub fn add_ref(&self, idx: u32) {
        let prev = self.chunk(idx).refs.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "add_ref on an unreferenced chunk");
    }

    /// Drop one reference; the last release returns the chunk to the free
    /// pool. Releasing an already-free chunk is a logged no-op, never a
    /// double free. Returns `true` when this call freed the chunk.
    pub fn release(&self, idx: u32) -> bool {
        let c = self.chunk(idx);
        let mut cur = c.refs.load(Ordering::Acquire);
        loop {
            if cur == 0 {
                warn!(chunk = idx, "release of an unreferenced chunk ignored");
                return false;
            }
            match c
                .refs
                .compare_exchange_weak(cur, cur - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        if cur != 1 {
            return false;
        }

        c.state.store(STATE_FREE, Ordering::Relaxed);
        c.owner_pid.store(0, Ordering::Relaxed);
        let hdr = self.hdr();
        hdr.lock.with(|| {
            let h = self.hdr_mut();
            unsafe {
                (*self.chunk_mut(idx)).next_free = (*h).free_head;
                (*h).free_head = idx;
                (*h).free_count += 1;
            }
        });
        true
    }

    /// Element count recorded at publish time.
    pub fn chunk_len(&self, idx: u32) -> u32 {
        self.chunk(idx).len.load(Ordering::Acquire)
    }

    pub fn chunk_state(&self, idx: u32) -> u32 {
        self.chunk(idx).state.load(Ordering::Acquire)
    }

    pub fn chunk_refs(&self, idx: u32) -> u32 {
        self.chunk(idx).refs.load(Ordering::Acquire)
    }

    pub fn free_count(&self) -> u32 {
        let hdr = self.hdr();
        hdr.lock.with(|| unsafe { (*self.hdr_mut()).free_count })
    }

    pub fn chunk_count(&self) -> u32 {
        self.hdr().chunk_count
    }

    /// Force-release chunks still loaned by dead publishers. Returns the
    /// number reclaimed.
    pub fn reclaim_dead_loans(&self, is_alive: impl Fn(i32) -> bool) -> usize {
        let mut reclaimed = 0;
        for idx in 0..self.chunk_count() {
            let c = self.chunk(idx);
            if c.state.load(Ordering::Acquire) != STATE_LOANED {
                continue;
            }
            let pid = c.owner_pid.load(Ordering::Acquire);
            if pid != 0 && !is_alive(pid) {
                warn!(chunk = idx, pid, "reclaiming chunk loaned by dead process");
                if self.release(idx) {
                    reclaimed += 1;
                }
            }
        }
        reclaimed
    }
}
