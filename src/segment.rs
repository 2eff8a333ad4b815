// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform named shared memory segment.
// Delegates to platform::PlatformShm (POSIX or Windows).

use std::io;

use crate::platform::PlatformShm;

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    /// Create exclusively, fail if it already exists.
    Create,
    /// Open existing, fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

/// A named, inter-process shared memory region.
///
/// The mapped region carries a trailing mapping counter shared between all
/// processes; the last handle to drop unlinks the backing object. A freshly
/// created segment is zero-filled by the operating system — reused interior
/// chunks are NOT re-zeroed, callers must not assume zeroed payloads.
pub struct Segment {
    inner: PlatformShm,
}

impl Segment {
    /// Acquire a named region of `size` usable bytes.
    pub fn acquire(name: &str, size: usize, mode: SegmentMode) -> io::Result<Self> {
        let platform_mode = match mode {
            SegmentMode::Create => crate::platform::ShmMode::Create,
            SegmentMode::Open => crate::platform::ShmMode::Open,
            SegmentMode::CreateOrOpen => crate::platform::ShmMode::CreateOrOpen,
        };
        let inner = PlatformShm::acquire(name, size, platform_mode)?;
        Ok(Self { inner })
    }

    /// Base pointer of the user-visible region.
    pub fn base(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// User-requested size (the usable portion).
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// Whether this handle was the first to map the segment (it then saw the
    /// region zero-filled and is responsible for initialising headers).
    pub fn is_creator(&self) -> bool {
        self.inner.prev_ref_count() == 0
    }

    /// Current number of processes/handles mapping this segment.
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    /// Force-remove the backing object without needing an open handle.
    pub fn unlink_by_name(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}
