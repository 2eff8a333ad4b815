// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Node: a process-local entry point into one domain. Opening a node maps the
// domain registry, installs the termination signal hook, and sweeps leftovers
// of crashed processes. Services, publishers, and subscribers all hang off a
// node and detach themselves when dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{CreationError, WaitError};
use crate::payload::PayloadDescriptor;
use crate::registry::{Registry, ServiceDetails};
use crate::service::{Service, ServiceConfig};
use crate::service_name::ServiceName;

/// Set by the SIGINT/SIGTERM (or console Ctrl-C) handler.
static TERMINATION: AtomicBool = AtomicBool::new(false);
static INSTALL_HOOK: Once = Once::new();

#[cfg(unix)]
fn install_termination_hook() {
    extern "C" fn on_signal(_sig: libc::c_int) {
        TERMINATION.store(true, Ordering::SeqCst);
    }
    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }
}

#[cfg(windows)]
fn install_termination_hook() {
    use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;

    unsafe extern "system" fn on_ctrl(_kind: u32) -> i32 {
        TERMINATION.store(true, Ordering::SeqCst);
        1
    }
    unsafe {
        SetConsoleCtrlHandler(Some(on_ctrl), 1);
    }
}

/// Node identity and domain selection.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Domain name; nodes only see services of their own domain. Empty means
    /// the default domain.
    pub domain: String,
    /// Free-form node name, for logs and diagnostics.
    pub name: String,
}

/// A handle on one domain.
///
/// Dropping the node detaches it from every service it opened; the last
/// participant of a service tears the service down.
pub struct Node {
    registry: Arc<Registry>,
    config: NodeConfig,
}

impl Node {
    /// Open the default domain with an unnamed node.
    pub fn new() -> Result<Self, CreationError> {
        Self::with_config(NodeConfig::default())
    }

    pub fn with_config(config: NodeConfig) -> Result<Self, CreationError> {
        INSTALL_HOOK.call_once(install_termination_hook);
        let registry = Arc::new(Registry::open(&config.domain)?);
        let swept = registry.sweep();
        if swept > 0 {
            info!(domain = %config.domain, swept, "reclaimed stale services");
        }
        debug!(node = %config.name, domain = %config.domain, "node created");
        Ok(Self { registry, config })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Open the named service, creating it if no live participant has it
    /// open. An existing service must match `descriptor` and `config`
    /// exactly.
    pub fn open_or_create(
        &self,
        name: &str,
        descriptor: PayloadDescriptor,
        config: ServiceConfig,
    ) -> Result<Service, CreationError> {
        let name = ServiceName::new(name)?;
        Service::open_or_create(Arc::clone(&self.registry), name, descriptor, config)
    }

    /// All services of this domain with at least one live participant.
    pub fn list_services(&self) -> Vec<ServiceDetails> {
        self.registry.list()
    }

    /// Drop every attachment held by dead processes; returns the number of
    /// services fully torn down.
    pub fn sweep(&self) -> usize {
        self.registry.sweep()
    }

    /// Has SIGINT/SIGTERM been observed since the first node was created?
    pub fn termination_requested() -> bool {
        TERMINATION.load(Ordering::SeqCst)
    }

    /// Sleep for `timeout`, waking early when a termination signal arrives.
    ///
    /// Returns `Ok(())` after a full timeout and `Err(WaitError::Interrupted)`
    /// once a signal was observed, including on every later call.
    pub fn wait(&self, timeout: Duration) -> Result<(), WaitError> {
        const SLICE: Duration = Duration::from_millis(10);
        let deadline = Instant::now() + timeout;
        loop {
            if TERMINATION.load(Ordering::SeqCst) {
                return Err(WaitError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.config.name)
            .field("domain", &self.config.domain)
            .finish()
    }
}
