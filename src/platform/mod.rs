// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Platform backends for named shared memory and process liveness probes.

#[cfg(unix)]
pub(crate) mod posix;
#[cfg(unix)]
pub(crate) use posix::{PlatformShm, ShmMode};

#[cfg(windows)]
pub(crate) mod windows;
#[cfg(windows)]
pub(crate) use windows::{PlatformShm, ShmMode};

/// Whether the process with `pid` is still alive.
#[cfg(unix)]
pub(crate) fn is_pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // kill(pid, 0) probes existence; EPERM still means "alive".
    unsafe { libc::kill(pid, 0) == 0 || errno() != libc::ESRCH }
}

#[cfg(all(unix, any(target_os = "macos", target_os = "ios")))]
fn errno() -> i32 {
    unsafe { *libc::__error() }
}

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

#[cfg(windows)]
pub(crate) fn is_pid_alive(pid: i32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };
    if pid <= 0 {
        return false;
    }
    unsafe {
        let h = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid as u32);
        if h == 0 {
            return false;
        }
        let mut code: u32 = 0;
        let ok = GetExitCodeProcess(h, &mut code) != 0 && code == STILL_ACTIVE as u32;
        CloseHandle(h);
        ok
    }
}

/// The calling process's PID.
pub(crate) fn current_pid() -> i32 {
    std::process::id() as i32
}
