// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber filtered by the `SHMBUS_LOG`
/// environment variable, falling back to `RUST_LOG`, then to `info`.
///
/// Intended for binaries; libraries embedding this crate should configure
/// `tracing` themselves. Calling it twice is a no-op.
pub fn init_from_env() {
    let filter = EnvFilter::try_from_env("SHMBUS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
