// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared-memory service registry. One well-known segment per domain holds a
// fixed table of service records; every record carries the payload
// descriptor, the service configuration, and the PIDs of all attached
// participants. PIDs double as liveness markers: records whose participants
// are all dead are swept and reused by the next open_or_create, so crashed
// processes can never block new ones (mark-and-sweep, not destructors).

use std::io;

use tracing::{debug, warn};

use crate::error::CreationError;
use crate::payload::RawDescriptor;
use crate::platform::{current_pid, is_pid_alive};
use crate::segment::{Segment, SegmentMode};
use crate::service::{data_segment_name, RawServiceConfig};
use crate::service_name::{sanitize_component, ServiceName, MAX_NAME_LEN};
use crate::sync::RawSpinLock;

/// Maximum number of services per domain.
pub const MAX_SERVICES: usize = 32;
/// Hard upper bound on publisher ports per service.
pub const MAX_PUBLISHER_PORTS: usize = 16;
/// Hard upper bound on subscriber ports per service (one ring each).
pub const MAX_SUBSCRIBER_PORTS: usize = 32;
/// Hard upper bound on node handles attached to one service.
pub const MAX_NODE_ATTACHMENTS: usize = 32;

// ---------------------------------------------------------------------------
// Shared memory layout
// ---------------------------------------------------------------------------

#[repr(C)]
struct ServiceRecord {
    used: u32,
    name_len: u32,
    generation: u64,
    name: [u8; MAX_NAME_LEN],
    descriptor: RawDescriptor,
    config: RawServiceConfig,
    /// PID per attached node handle; 0 = free slot.
    node_pids: [i32; MAX_NODE_ATTACHMENTS],
    /// PID per publisher port; 0 = free slot.
    publisher_pids: [i32; MAX_PUBLISHER_PORTS],
    /// PID per subscriber port; the index doubles as the ring index
    /// inside the service data segment. 0 = free slot.
    subscriber_pids: [i32; MAX_SUBSCRIBER_PORTS],
}

impl ServiceRecord {
    fn name_str(&self) -> &str {
        let len = (self.name_len as usize).min(MAX_NAME_LEN);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn any_alive(&self) -> bool {
        self.node_pids
            .iter()
            .chain(self.publisher_pids.iter())
            .chain(self.subscriber_pids.iter())
            .any(|&p| p != 0 && is_pid_alive(p))
    }

    fn any_attached(&self) -> bool {
        self.node_pids
            .iter()
            .chain(self.publisher_pids.iter())
            .chain(self.subscriber_pids.iter())
            .any(|&p| p != 0)
    }

    fn clear(&mut self) {
        *self = unsafe { std::mem::zeroed() };
    }
}

#[repr(C)]
struct RegistryData {
    lock: RawSpinLock,
    next_generation: u64,
    records: [ServiceRecord; MAX_SERVICES],
}

// ---------------------------------------------------------------------------
// Registry handle
// ---------------------------------------------------------------------------

/// Result of a successful `open_or_create`.
pub(crate) struct OpenOutcome {
    pub slot: usize,
    pub node_slot: usize,
    pub generation: u64,
    pub created: bool,
    pub config: RawServiceConfig,
    pub descriptor: RawDescriptor,
}

/// Summary of one live service, for discovery/diagnostics.
#[derive(Debug, Clone)]
pub struct ServiceDetails {
    pub name: String,
    pub generation: u64,
    pub publishers: usize,
    pub subscribers: usize,
}

/// Handle on the per-domain registry segment. Any process opening the same
/// domain sees the same set of services.
pub struct Registry {
    _seg: Segment,
    data: *mut RegistryData,
    domain: String,
}

unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

fn registry_segment_name(domain: &str) -> String {
    if domain.is_empty() {
        "__shmbus_registry__default".to_owned()
    } else {
        format!("__shmbus_registry__{}", sanitize_component(domain))
    }
}

impl Registry {
    /// Open or create the registry for `domain`.
    pub fn open(domain: &str) -> io::Result<Self> {
        let seg = Segment::acquire(
            &registry_segment_name(domain),
            std::mem::size_of::<RegistryData>(),
            SegmentMode::CreateOrOpen,
        )?;
        let data = seg.base() as *mut RegistryData;
        // Fresh shm is zero-filled; a zeroed RegistryData is a valid empty
        // registry with an unlocked spin lock, so no creator init is needed.
        Ok(Self {
            _seg: seg,
            data,
            domain: domain.to_owned(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn reg(&self) -> &RegistryData {
        unsafe { &*self.data }
    }

    fn records(&self) -> &mut [ServiceRecord; MAX_SERVICES] {
        unsafe { &mut (*self.data).records }
    }

    /// Tear down a record: clear the slot and unlink the data segment of its
    /// generation. Must run under the registry lock.
    fn teardown_record(&self, rec: &mut ServiceRecord) {
        let name = rec.name_str().to_owned();
        let generation = rec.generation;
        debug!(service = %name, generation, "tearing down service record");
        Segment::unlink_by_name(&data_segment_name(&self.domain, &name, generation));
        rec.clear();
    }

    /// Find-or-create the record for `name`, attaching the calling process
    /// as a node handle. Stale records (all participants dead) are reclaimed
    /// on the way.
    pub(crate) fn open_or_create(
        &self,
        name: &ServiceName,
        descriptor: &RawDescriptor,
        config: &RawServiceConfig,
    ) -> Result<OpenOutcome, CreationError> {
        self.open_or_create_as(name, descriptor, config, current_pid())
    }

    /// Like [`open_or_create`](Self::open_or_create) with an explicit PID
    /// (used by tests to simulate foreign participants).
    pub(crate) fn open_or_create_as(
        &self,
        name: &ServiceName,
        descriptor: &RawDescriptor,
        config: &RawServiceConfig,
        pid: i32,
    ) -> Result<OpenOutcome, CreationError> {
        let reg = self.reg();
        reg.lock.with(|| {
            let records = self.records();

            // Existing record?
            for (slot, rec) in records.iter_mut().enumerate() {
                if rec.used == 0 || rec.name_str() != name.as_str() {
                    continue;
                }
                if !rec.any_alive() {
                    // Every participant vanished; reclaim and create fresh.
                    warn!(service = %name, "reclaiming stale service record");
                    self.teardown_record(rec);
                    break;
                }
                if !rec.descriptor.matches(descriptor) {
                    return Err(CreationError::IncompatibleService);
                }
                if rec.config != *config {
                    return Err(CreationError::IncompatibleConfig);
                }
                let node_slot = claim_slot(&mut rec.node_pids, pid)
                    .ok_or(CreationError::ExceedsMaxAttachments)?;
                return Ok(OpenOutcome {
                    slot,
                    node_slot,
                    generation: rec.generation,
                    created: false,
                    config: rec.config,
                    descriptor: rec.descriptor,
                });
            }

            // Create a new record. Prefer an unused slot so stale records of
            // other services stay visible to sweep(); displace one only when
            // the table is full.
            let slot = match self.records().iter().position(|r| r.used == 0) {
                Some(free) => free,
                None => {
                    let Some(stale) = self.records().iter().position(|r| !r.any_alive()) else {
                        return Err(CreationError::RegistryFull);
                    };
                    self.teardown_record(&mut self.records()[stale]);
                    stale
                }
            };

            let rec = &mut self.records()[slot];
            rec.clear();
            rec.used = 1;
            let generation = unsafe {
                let g = &mut (*self.data).next_generation;
                *g += 1;
                *g
            };
            rec.generation = generation;
            let bytes = name.as_str().as_bytes();
            rec.name[..bytes.len()].copy_from_slice(bytes);
            rec.name_len = bytes.len() as u32;
            rec.descriptor = *descriptor;
            rec.config = *config;
            rec.node_pids[0] = pid;
            debug!(service = %name, generation, "created service record");
            Ok(OpenOutcome {
                slot,
                node_slot: 0,
                generation,
                created: true,
                config: *config,
                descriptor: *descriptor,
            })
        })
    }

    /// Claim a publisher port slot. Dead holders are displaced first.
    pub(crate) fn attach_publisher(&self, slot: usize) -> Result<usize, CreationError> {
        self.attach_publisher_as(slot, current_pid())
    }

    pub(crate) fn attach_publisher_as(
        &self,
        slot: usize,
        pid: i32,
    ) -> Result<usize, CreationError> {
        let reg = self.reg();
        reg.lock.with(|| {
            let rec = &mut self.records()[slot];
            let max = (rec.config.max_publishers as usize).min(MAX_PUBLISHER_PORTS);
            claim_slot(&mut rec.publisher_pids[..max], pid)
                .ok_or(CreationError::ExceedsMaxPublishers)
        })
    }

    /// Claim a subscriber port slot; the returned index is also the ring
    /// index in the service data segment.
    pub(crate) fn attach_subscriber(&self, slot: usize) -> Result<usize, CreationError> {
        self.attach_subscriber_as(slot, current_pid())
    }

    pub(crate) fn attach_subscriber_as(
        &self,
        slot: usize,
        pid: i32,
    ) -> Result<usize, CreationError> {
        let reg = self.reg();
        reg.lock.with(|| {
            let rec = &mut self.records()[slot];
            let max = (rec.config.max_subscribers as usize).min(MAX_SUBSCRIBER_PORTS);
            claim_slot(&mut rec.subscriber_pids[..max], pid)
                .ok_or(CreationError::ExceedsMaxSubscribers)
        })
    }

    pub(crate) fn detach_publisher(&self, slot: usize, port: usize) {
        self.detach(slot, |rec| rec.publisher_pids[port] = 0);
    }

    pub(crate) fn detach_subscriber(&self, slot: usize, port: usize) {
        self.detach(slot, |rec| rec.subscriber_pids[port] = 0);
    }

    pub(crate) fn detach_node(&self, slot: usize, node_slot: usize) {
        self.detach(slot, |rec| rec.node_pids[node_slot] = 0);
    }

    /// Clear one attachment; the last detaching participant tears the
    /// record down.
    fn detach(&self, slot: usize, clear: impl FnOnce(&mut ServiceRecord)) {
        let reg = self.reg();
        reg.lock.with(|| {
            let rec = &mut self.records()[slot];
            if rec.used == 0 {
                return;
            }
            clear(rec);
            if !rec.any_attached() {
                self.teardown_record(rec);
            }
        });
    }

    /// Is the given subscriber port still registered? Used by senders to
    /// skip rings whose owner detached between fan-out steps.
    pub(crate) fn subscriber_pid(&self, slot: usize, port: usize) -> i32 {
        let reg = self.reg();
        reg.lock.with(|| self.records()[slot].subscriber_pids[port])
    }

    /// Current holder of a publisher port slot. A port whose PID no longer
    /// matches was displaced by a sweep; its handle is stale.
    pub(crate) fn publisher_pid(&self, slot: usize, port: usize) -> i32 {
        let reg = self.reg();
        reg.lock.with(|| self.records()[slot].publisher_pids[port])
    }

    /// Sweep all records: drop attachments of dead processes, tear down
    /// records that end up empty. Returns the number of records torn down.
    pub fn sweep(&self) -> usize {
        let reg = self.reg();
        reg.lock.with(|| {
            let mut removed = 0;
            for rec in self.records().iter_mut() {
                if rec.used == 0 {
                    continue;
                }
                for pid in rec
                    .node_pids
                    .iter_mut()
                    .chain(rec.publisher_pids.iter_mut())
                    .chain(rec.subscriber_pids.iter_mut())
                {
                    if *pid != 0 && !is_pid_alive(*pid) {
                        *pid = 0;
                    }
                }
                if !rec.any_attached() {
                    self.teardown_record(rec);
                    removed += 1;
                }
            }
            removed
        })
    }

    /// Clear dead subscriber ports of one service from the record and return
    /// their ring indices. The caller drains the matching rings.
    pub(crate) fn take_dead_subscribers(&self, slot: usize) -> Vec<usize> {
        let reg = self.reg();
        reg.lock.with(|| {
            let rec = &mut self.records()[slot];
            let name = rec.name_str().to_owned();
            let mut dead = Vec::new();
            for (port, pid) in rec.subscriber_pids.iter_mut().enumerate() {
                if *pid != 0 && !is_pid_alive(*pid) {
                    warn!(service = %name, port, pid = *pid, "clearing dead subscriber");
                    *pid = 0;
                    dead.push(port);
                }
            }
            dead
        })
    }

    /// List all services with at least one live participant.
    pub fn list(&self) -> Vec<ServiceDetails> {
        let reg = self.reg();
        reg.lock.with(|| {
            self.records()
                .iter()
                .filter(|r| r.used != 0 && r.any_alive())
                .map(|r| ServiceDetails {
                    name: r.name_str().to_owned(),
                    generation: r.generation,
                    publishers: r.publisher_pids.iter().filter(|&&p| p != 0).count(),
                    subscribers: r.subscriber_pids.iter().filter(|&&p| p != 0).count(),
                })
                .collect()
        })
    }
}

/// Claim the first free slot in `pids`, displacing dead holders.
fn claim_slot(pids: &mut [i32], pid: i32) -> Option<usize> {
    // Prefer a genuinely free slot so ring indices of live subscribers stay
    // stable; fall back to displacing a dead holder.
    if let Some(i) = pids.iter().position(|&p| p == 0) {
        pids[i] = pid;
        return Some(i);
    }
    if let Some(i) = pids.iter().position(|&p| !is_pid_alive(p)) {
        pids[i] = pid;
        return Some(i);
    }
    None
}
