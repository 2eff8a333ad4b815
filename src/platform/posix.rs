// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shared memory backend: shm_open + mmap with a trailing atomic
// reference counter shared by every process that maps the segment. The last
// unmapping process unlinks the backing object, so segments of crashed
// participants are reclaimed as soon as the survivors drop their handles.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use crate::service_name::{fnv1a_64, to_hex};
use crate::sync::adaptive_yield;

/// Open mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

/// Maximum length for POSIX shm names. 0 disables truncation.
///
/// macOS caps names at `PSHMNAMLEN` (31); Linux allows up to 255.
#[cfg(target_os = "macos")]
const SHM_NAME_MAX: usize = 31;
#[cfg(not(target_os = "macos"))]
const SHM_NAME_MAX: usize = 0;

/// Produce a POSIX shm-safe name with a leading '/'. Overlong names are
/// shortened to a truncated prefix plus a 16-hex-digit FNV-1a hash so they
/// stay unique and debuggable.
fn make_posix_name(name: &str) -> String {
    let result = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if SHM_NAME_MAX == 0 || result.len() <= SHM_NAME_MAX {
        return result;
    }

    const HASH_SUFFIX_LEN: usize = 1 + 16; // '_' + 16 hex digits
    let prefix_len = SHM_NAME_MAX.saturating_sub(HASH_SUFFIX_LEN + 1);
    let hex = to_hex(fnv1a_64(result.as_bytes()));

    let mut shortened = String::with_capacity(SHM_NAME_MAX);
    shortened.push('/');
    let body = &result[1..];
    shortened.push_str(&body[..prefix_len.min(body.len())]);
    shortened.push('_');
    shortened.push_str(&hex);
    shortened
}

// ---------------------------------------------------------------------------
// Layout: user region, padded, then a trailing atomic<i32> mapping counter.
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

pub(crate) fn calc_size(user_size: usize) -> usize {
    let aligned = ((user_size.wrapping_sub(1) / ALIGN) + 1) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// The trailing mapping counter of a region of `total_size` bytes at `mem`.
///
/// # Safety
/// `mem` must point to a valid mapped region of at least `total_size` bytes.
unsafe fn acc_of(mem: *mut u8, total_size: usize) -> &'static AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PlatformShm {
    mem: *mut u8,
    size: usize,      // total mapped size (including the counter)
    user_size: usize, // user-requested size
    name: String,     // POSIX name (with leading '/')
    prev_ref: i32,    // counter value *before* our increment; 0 = we were first
}

// Safety: the region is process-shared by design.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = make_posix_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;
        let total_size = calc_size(user_size);

        // For CreateOrOpen: try exclusive create first, so ftruncate only runs
        // when we own the new object. On macOS, ftruncate on an already-sized
        // object can zero its contents before failing with EINVAL.
        let (fd, need_truncate) = match mode {
            ShmMode::Create => {
                let f = unsafe {
                    libc::shm_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                    )
                };
                if f == -1 {
                    return Err(io::Error::last_os_error());
                }
                (f, true)
            }
            ShmMode::Open => {
                let f =
                    unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
                if f == -1 {
                    return Err(io::Error::last_os_error());
                }
                (f, false)
            }
            ShmMode::CreateOrOpen => {
                let f = unsafe {
                    libc::shm_open(
                        c_name.as_ptr(),
                        libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                        perms as libc::c_uint,
                    )
                };
                if f != -1 {
                    (f, true)
                } else {
                    let e = io::Error::last_os_error();
                    if e.raw_os_error() != Some(libc::EEXIST) {
                        return Err(e);
                    }
                    let f2 = unsafe {
                        libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint)
                    };
                    if f2 == -1 {
                        return Err(io::Error::last_os_error());
                    }
                    (f2, false)
                }
            }
        };

        unsafe { libc::fchmod(fd, perms) };

        if need_truncate {
            let ret = unsafe { libc::ftruncate(fd, total_size as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
        } else {
            // An opened object may not be sized yet: the creator runs
            // ftruncate only after its exclusive shm_open wins the race.
            // Mapping past the current size SIGBUSes on first access, so
            // wait for the size to land before mmap.
            let deadline = Instant::now() + Duration::from_secs(2);
            let mut k = 0u32;
            loop {
                let mut st: libc::stat = unsafe { std::mem::zeroed() };
                if unsafe { libc::fstat(fd, &mut st) } != 0 {
                    let err = io::Error::last_os_error();
                    unsafe { libc::close(fd) };
                    return Err(err);
                }
                if st.st_size as usize >= total_size {
                    break;
                }
                if Instant::now() >= deadline {
                    unsafe { libc::close(fd) };
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "shared memory object is not yet sized",
                    ));
                }
                adaptive_yield(&mut k);
            }
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let prev = unsafe { acc_of(mem as *mut u8, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem: mem as *mut u8,
            size: total_size,
            user_size,
            name: posix_name,
            prev_ref: prev,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn mapped_size(&self) -> usize {
        self.size
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    /// The counter value before our own increment; 0 means this handle was
    /// the first to map the segment (and saw it zero-filled).
    pub fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    /// Current number of mappings.
    pub fn ref_count(&self) -> i32 {
        if self.mem.is_null() || self.size == 0 {
            return 0;
        }
        unsafe { acc_of(self.mem, self.size).load(Ordering::Acquire) }
    }

    /// Force-remove the backing object (shm_unlink). Does not unmap.
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    /// Unlink a named segment without an open handle.
    pub fn unlink_by_name(name: &str) {
        let posix_name = make_posix_name(name);
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Decrement the mapping counter; the last mapper also unlinks.
        let prev = unsafe { acc_of(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 {
            self.unlink();
        }
    }
}
