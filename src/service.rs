// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A service is a named, typed channel binding publishers to subscribers.
// Its shared state lives in two places: a record in the per-domain registry
// (discovery, descriptor check, attachment slots) and a dedicated data
// segment per service generation:
//
//   [ ServiceHeader ]
//   [ subscriber ring ] × max_subscribers
//   [ history ring ]
//   [ chunk arena ]
//
// The segment is created and initialised by the first open_or_create and
// mapped read-write by everyone else; all offsets are derived from the
// configuration stored in the registry record.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::arena::{align_up, Arena, ArenaLayout};
use crate::error::CreationError;
use crate::payload::{PayloadDescriptor, RawDescriptor};
use crate::platform::is_pid_alive;
use crate::publisher::Publisher;
use crate::queue::{ring_bytes, ChunkQueue};
use crate::registry::{Registry, MAX_PUBLISHER_PORTS, MAX_SUBSCRIBER_PORTS};
use crate::segment::{Segment, SegmentMode};
use crate::service_name::{fnv1a_64, sanitize_component, to_hex, ServiceName};
use crate::subscriber::{Subscriber, SubscriberConfig};
use crate::sync::adaptive_yield;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What a full subscriber queue does with a new sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued sample to make room (late data wins).
    #[default]
    DropOldest,
    /// Keep the queue as-is; the full subscriber misses the sample. The send
    /// still succeeds for subscribers with room.
    RejectNew,
}

/// Upper bound on per-subscriber queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 1024;
/// Upper bound on the history buffer.
pub const MAX_HISTORY_CAPACITY: usize = 1024;
/// Upper bound on elements per slice loan.
pub const MAX_SLICE_ELEMENTS: usize = 1 << 20;
/// Upper bound on unsent loans per publisher.
pub const MAX_LOANS_PER_PUBLISHER: usize = 64;
/// Upper bound on the payload bytes of a single chunk.
pub const MAX_PAYLOAD_BYTES: usize = 1 << 30;

/// Static configuration of a service. Fixed at creation; later
/// `open_or_create` calls must pass an equal configuration.
///
/// Every field is bounded from both sides so the derived shared-memory
/// layout stays within fixed-width arithmetic; `open_or_create` rejects an
/// out-of-range configuration instead of clamping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Maximum concurrently attached publishers (1..=16).
    pub max_publishers: usize,
    /// Maximum concurrently attached subscribers (1..=32).
    pub max_subscribers: usize,
    /// Samples buffered per subscriber (1..=[`MAX_QUEUE_CAPACITY`]).
    pub subscriber_queue_capacity: usize,
    /// Recent samples retained for late joiners
    /// (0..=[`MAX_HISTORY_CAPACITY`]; 0 disables history).
    pub history_capacity: usize,
    /// Maximum elements per loaned sample (1..=[`MAX_SLICE_ELEMENTS`];
    /// > 1 only for slice payloads).
    pub max_slice_len: usize,
    /// Unsent loans each publisher may hold at once
    /// (1..=[`MAX_LOANS_PER_PUBLISHER`]).
    pub max_loaned_samples: usize,
    /// Queue overflow policy.
    pub overflow: OverflowPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_publishers: 4,
            max_subscribers: 8,
            subscriber_queue_capacity: 8,
            history_capacity: 0,
            max_slice_len: 1,
            max_loaned_samples: 2,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl ServiceConfig {
    fn validate(&self) -> Result<(), CreationError> {
        if self.max_publishers == 0 || self.max_publishers > MAX_PUBLISHER_PORTS {
            return Err(CreationError::InvalidConfig("max_publishers out of range"));
        }
        if self.max_subscribers == 0 || self.max_subscribers > MAX_SUBSCRIBER_PORTS {
            return Err(CreationError::InvalidConfig("max_subscribers out of range"));
        }
        if self.subscriber_queue_capacity == 0
            || self.subscriber_queue_capacity > MAX_QUEUE_CAPACITY
        {
            return Err(CreationError::InvalidConfig(
                "subscriber_queue_capacity out of range",
            ));
        }
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(CreationError::InvalidConfig("history_capacity out of range"));
        }
        if self.max_slice_len == 0 || self.max_slice_len > MAX_SLICE_ELEMENTS {
            return Err(CreationError::InvalidConfig("max_slice_len out of range"));
        }
        if self.max_loaned_samples == 0 || self.max_loaned_samples > MAX_LOANS_PER_PUBLISHER {
            return Err(CreationError::InvalidConfig(
                "max_loaned_samples out of range",
            ));
        }
        Ok(())
    }

    pub(crate) fn to_raw(self) -> RawServiceConfig {
        RawServiceConfig {
            max_publishers: self.max_publishers as u32,
            max_subscribers: self.max_subscribers as u32,
            subscriber_queue_capacity: self.subscriber_queue_capacity as u32,
            history_capacity: self.history_capacity as u32,
            max_slice_len: self.max_slice_len as u32,
            max_loaned_samples: self.max_loaned_samples as u32,
            overflow: match self.overflow {
                OverflowPolicy::DropOldest => 0,
                OverflowPolicy::RejectNew => 1,
            },
            _pad: 0,
        }
    }
}

/// Fixed-layout configuration as stored in the registry record.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawServiceConfig {
    pub max_publishers: u32,
    pub max_subscribers: u32,
    pub subscriber_queue_capacity: u32,
    pub history_capacity: u32,
    pub max_slice_len: u32,
    pub max_loaned_samples: u32,
    pub overflow: u32,
    pub _pad: u32,
}

impl RawServiceConfig {
    pub fn to_config(self) -> ServiceConfig {
        ServiceConfig {
            max_publishers: self.max_publishers as usize,
            max_subscribers: self.max_subscribers as usize,
            subscriber_queue_capacity: self.subscriber_queue_capacity as usize,
            history_capacity: self.history_capacity as usize,
            max_slice_len: self.max_slice_len as usize,
            max_loaned_samples: self.max_loaned_samples as usize,
            overflow: if self.overflow == 1 {
                OverflowPolicy::RejectNew
            } else {
                OverflowPolicy::DropOldest
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Segment naming & layout
// ---------------------------------------------------------------------------

/// Name of the data segment of one service generation. The generation is
/// part of the name so a recreated service never collides with a stale
/// segment left behind by a crash.
pub(crate) fn data_segment_name(domain: &str, name: &str, generation: u64) -> String {
    let prefix = if domain.is_empty() {
        String::new()
    } else {
        format!("{}_", sanitize_component(domain))
    };
    format!("{prefix}SB_SVC__{generation}_{}", to_hex(fnv1a_64(name.as_bytes())))
}

/// How long an opener waits for the segment creator to finish initialising.
const SEGMENT_READY_TIMEOUT: Duration = Duration::from_secs(2);

#[repr(C)]
struct ServiceHeader {
    /// Set to 1 by the creator once rings and arena are initialised.
    ready: AtomicU32,
    /// Bitmask of subscriber ports currently receiving fan-out.
    active_subs: AtomicU32,
}

#[derive(Debug, Clone, Copy)]
struct SegmentLayout {
    rings_off: usize,
    ring_stride: usize,
    history_off: usize,
    arena_off: usize,
    arena: ArenaLayout,
    total_bytes: usize,
}

fn segment_layout(config: &RawServiceConfig, descriptor: &RawDescriptor) -> SegmentLayout {
    let rings_off = align_up(std::mem::size_of::<ServiceHeader>(), 8);
    let ring_stride = ring_bytes(config.subscriber_queue_capacity);
    let history_off = rings_off + config.max_subscribers as usize * ring_stride;
    let arena_align = (descriptor.align as usize).max(8);
    let arena_off = align_up(history_off + ring_bytes(config.history_capacity), arena_align);

    // Worst case in flight: every publisher at its loan cap plus the sample
    // being sent, every subscriber queue full, and a full history buffer.
    let chunk_count = config.max_publishers * (config.max_loaned_samples + 1)
        + config.max_subscribers * config.subscriber_queue_capacity
        + config.history_capacity;
    let payload_capacity = descriptor.size as usize * config.max_slice_len as usize;
    let arena = ArenaLayout::compute(chunk_count, payload_capacity, descriptor.align as usize);

    SegmentLayout {
        rings_off,
        ring_stride,
        history_off,
        arena_off,
        arena,
        total_bytes: arena_off + arena.total_bytes,
    }
}

// ---------------------------------------------------------------------------
// Service handle
// ---------------------------------------------------------------------------

pub(crate) struct ServiceShared {
    name: ServiceName,
    descriptor: PayloadDescriptor,
    config: ServiceConfig,
    layout: SegmentLayout,
    slot: usize,
    node_slot: usize,
    generation: u64,
    registry: Arc<Registry>,
    data: Segment,
}

// Safety: all shared state behind `data` is guarded by atomics/spin locks.
unsafe impl Send for ServiceShared {}
unsafe impl Sync for ServiceShared {}

impl ServiceShared {
    fn header(&self) -> &ServiceHeader {
        unsafe { &*(self.data.base() as *const ServiceHeader) }
    }

    pub(crate) fn arena(&self) -> Arena {
        unsafe { Arena::at(self.data.base().add(self.layout.arena_off)) }
    }

    pub(crate) fn ring(&self, port: usize) -> ChunkQueue {
        debug_assert!(port < self.config.max_subscribers);
        unsafe {
            ChunkQueue::at(
                self.data
                    .base()
                    .add(self.layout.rings_off + port * self.layout.ring_stride),
            )
        }
    }

    pub(crate) fn history(&self) -> ChunkQueue {
        unsafe { ChunkQueue::at(self.data.base().add(self.layout.history_off)) }
    }

    pub(crate) fn active_subs(&self) -> u32 {
        self.header().active_subs.load(Ordering::Acquire)
    }

    pub(crate) fn set_sub_active(&self, port: usize, active: bool) {
        let bit = 1u32 << port;
        if active {
            self.header().active_subs.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.header().active_subs.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn descriptor(&self) -> &PayloadDescriptor {
        &self.descriptor
    }

    /// Drop attachments of dead processes: drain their rings, clear their
    /// fan-out bits, and reclaim chunks loaned by dead publishers.
    pub(crate) fn reclaim_dead_ports(&self) {
        let arena = self.arena();
        for port in self.registry.take_dead_subscribers(self.slot) {
            self.set_sub_active(port, false);
            let ring = self.ring(port);
            while let Some(idx) = ring.pop() {
                arena.release(idx);
            }
        }
        arena.reclaim_dead_loans(is_pid_alive);
    }
}

impl Drop for ServiceShared {
    fn drop(&mut self) {
        self.registry.detach_node(self.slot, self.node_slot);
    }
}

/// A named publish/subscribe channel, opened via
/// [`Node::open_or_create`](crate::Node::open_or_create). Cheap to clone
/// internally; ports keep the underlying segment alive.
pub struct Service {
    pub(crate) shared: Arc<ServiceShared>,
}

impl Service {
    pub(crate) fn open_or_create(
        registry: Arc<Registry>,
        name: ServiceName,
        descriptor: PayloadDescriptor,
        config: ServiceConfig,
    ) -> Result<Self, CreationError> {
        config.validate()?;
        match descriptor.size().checked_mul(config.max_slice_len) {
            Some(bytes) if bytes <= MAX_PAYLOAD_BYTES => {}
            _ => {
                return Err(CreationError::InvalidConfig(
                    "payload capacity exceeds the supported maximum",
                ))
            }
        }

        let raw_desc = descriptor.to_raw();
        let raw_config = config.to_raw();
        let outcome = registry.open_or_create(&name, &raw_desc, &raw_config)?;

        // Openers may carry a fresher view of the record than the caller
        // passed; always derive the layout from the registry's copy.
        let layout = segment_layout(&outcome.config, &outcome.descriptor);
        let seg_name = data_segment_name(registry.domain(), name.as_str(), outcome.generation);
        debug!(
            service = %name,
            generation = outcome.generation,
            created = outcome.created,
            "opening service data segment"
        );
        if outcome.created {
            // A crash can leak a segment under this name with a nonzero
            // mapping counter; the record is fresh, so the segment must be.
            Segment::unlink_by_name(&seg_name);
        }
        let data = match Segment::acquire(&seg_name, layout.total_bytes, SegmentMode::CreateOrOpen)
        {
            Ok(seg) => seg,
            Err(e) => {
                registry.detach_node(outcome.slot, outcome.node_slot);
                return Err(CreationError::Segment(e));
            }
        };

        if data.is_creator() {
            // Fresh zero-filled segment: lay out rings and arena, then
            // publish the ready flag for concurrent openers.
            let hdr = unsafe { &*(data.base() as *const ServiceHeader) };
            for port in 0..outcome.config.max_subscribers as usize {
                let ring = unsafe {
                    ChunkQueue::at(
                        data.base().add(layout.rings_off + port * layout.ring_stride),
                    )
                };
                ring.init(outcome.config.subscriber_queue_capacity);
            }
            let history = unsafe { ChunkQueue::at(data.base().add(layout.history_off)) };
            history.init(outcome.config.history_capacity);
            let arena = unsafe { Arena::at(data.base().add(layout.arena_off)) };
            arena.init(layout.arena);
            hdr.ready.store(1, Ordering::Release);
            debug!(service = %name, generation = outcome.generation, "service data segment initialised");
        } else {
            // Another process is mid-initialisation; wait for the ready
            // flag. Bounded: a creator that crashed before initialising
            // must not block openers forever. After the failed opener
            // detaches, the stale record is reclaimed on the next open and
            // the service comes back under a fresh generation.
            let hdr = unsafe { &*(data.base() as *const ServiceHeader) };
            let deadline = Instant::now() + SEGMENT_READY_TIMEOUT;
            let mut k = 0u32;
            while hdr.ready.load(Ordering::Acquire) == 0 {
                if Instant::now() >= deadline {
                    registry.detach_node(outcome.slot, outcome.node_slot);
                    return Err(CreationError::ServiceUninitialised);
                }
                adaptive_yield(&mut k);
            }
        }

        let shared = Arc::new(ServiceShared {
            name,
            descriptor: outcome.descriptor.to_descriptor(),
            config: outcome.config.to_config(),
            layout,
            slot: outcome.slot,
            node_slot: outcome.node_slot,
            generation: outcome.generation,
            registry,
            data,
        });

        shared.reclaim_dead_ports();

        Ok(Self { shared })
    }

    pub fn name(&self) -> &ServiceName {
        &self.shared.name
    }

    pub fn descriptor(&self) -> &PayloadDescriptor {
        &self.shared.descriptor
    }

    pub fn config(&self) -> ServiceConfig {
        self.shared.config
    }

    /// Creation generation of this service instance. A recreated service of
    /// the same name gets a fresh generation.
    pub fn generation(&self) -> u64 {
        self.shared.generation
    }

    /// Create a publisher port on this service.
    pub fn publisher(&self) -> Result<Publisher, CreationError> {
        Publisher::create(Arc::clone(&self.shared))
    }

    /// Create a subscriber port with default options (full history catch-up).
    pub fn subscriber(&self) -> Result<Subscriber, CreationError> {
        self.subscriber_with(SubscriberConfig::default())
    }

    /// Create a subscriber port with explicit options.
    pub fn subscriber_with(&self, config: SubscriberConfig) -> Result<Subscriber, CreationError> {
        Subscriber::create(Arc::clone(&self.shared), config)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.shared.name.as_str())
            .field("generation", &self.shared.generation)
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::TypeVariant;

    #[test]
    fn default_config_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn config_bounds_are_enforced() {
        let mut c = ServiceConfig::default();
        c.max_publishers = 0;
        assert!(c.validate().is_err());

        let mut c = ServiceConfig::default();
        c.max_subscribers = MAX_SUBSCRIBER_PORTS + 1;
        assert!(c.validate().is_err());

        let mut c = ServiceConfig::default();
        c.subscriber_queue_capacity = 0;
        assert!(c.validate().is_err());

        let mut c = ServiceConfig::default();
        c.subscriber_queue_capacity = MAX_QUEUE_CAPACITY + 1;
        assert!(c.validate().is_err());

        let mut c = ServiceConfig::default();
        c.history_capacity = MAX_HISTORY_CAPACITY + 1;
        assert!(c.validate().is_err());

        let mut c = ServiceConfig::default();
        c.max_slice_len = MAX_SLICE_ELEMENTS + 1;
        assert!(c.validate().is_err());

        // Extreme values must fail validation, not wrap in the layout math.
        let mut c = ServiceConfig::default();
        c.max_loaned_samples = u32::MAX as usize;
        assert!(c.validate().is_err());

        let mut c = ServiceConfig::default();
        c.max_loaned_samples = MAX_LOANS_PER_PUBLISHER + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn raw_config_roundtrip() {
        let c = ServiceConfig {
            overflow: OverflowPolicy::RejectNew,
            history_capacity: 3,
            ..Default::default()
        };
        assert_eq!(c.to_raw().to_config(), c);
    }

    #[test]
    fn layout_regions_do_not_overlap() {
        let desc = PayloadDescriptor::new("t", 24, 8, TypeVariant::FixedSize)
            .unwrap()
            .to_raw();
        let cfg = ServiceConfig::default().to_raw();
        let l = segment_layout(&cfg, &desc);
        assert!(l.rings_off >= std::mem::size_of::<ServiceHeader>());
        assert!(l.history_off >= l.rings_off + cfg.max_subscribers as usize * l.ring_stride);
        assert!(l.arena_off >= l.history_off);
        assert!(l.total_bytes > l.arena_off);
    }

    #[test]
    fn generation_is_part_of_segment_name() {
        let a = data_segment_name("dom", "svc", 1);
        let b = data_segment_name("dom", "svc", 2);
        assert_ne!(a, b);
        assert!(a.starts_with("dom_SB_SVC__"));
    }

    fn unique_domain(prefix: &str) -> String {
        format!("{prefix}p{}", std::process::id())
    }

    #[test]
    fn out_of_range_config_is_rejected_before_layout_math() {
        let registry = Arc::new(Registry::open(&unique_domain("svccfg")).unwrap());
        let config = ServiceConfig {
            max_loaned_samples: u32::MAX as usize,
            ..Default::default()
        };
        let err = Service::open_or_create(
            registry,
            ServiceName::new("huge").unwrap(),
            PayloadDescriptor::of::<u64>(),
            config,
        )
        .unwrap_err();
        assert!(matches!(err, CreationError::InvalidConfig(_)));
    }

    #[test]
    fn oversized_payload_capacity_is_rejected() {
        let registry = Arc::new(Registry::open(&unique_domain("svcpay")).unwrap());
        let descriptor =
            PayloadDescriptor::new("blob", MAX_PAYLOAD_BYTES, 8, TypeVariant::Slice).unwrap();
        let config = ServiceConfig {
            max_slice_len: 2,
            ..Default::default()
        };
        let err = Service::open_or_create(
            registry,
            ServiceName::new("blob").unwrap(),
            descriptor,
            config,
        )
        .unwrap_err();
        assert!(matches!(err, CreationError::InvalidConfig(_)));
    }

    #[test]
    fn opener_times_out_when_creator_never_initialises() {
        let registry = Arc::new(Registry::open(&unique_domain("svcinit")).unwrap());
        let name = ServiceName::new("stuck").unwrap();
        let descriptor = PayloadDescriptor::of::<u64>();
        let config = ServiceConfig::default();
        let outcome = registry
            .open_or_create(&name, &descriptor.to_raw(), &config.to_raw())
            .unwrap();

        // Map the data segment without initialising it, the way a creator
        // that crashed right after acquiring it would leave things.
        let layout = segment_layout(&outcome.config, &outcome.descriptor);
        let seg_name = data_segment_name(registry.domain(), name.as_str(), outcome.generation);
        let _stuck =
            Segment::acquire(&seg_name, layout.total_bytes, SegmentMode::CreateOrOpen).unwrap();

        let err = Service::open_or_create(Arc::clone(&registry), name, descriptor, config)
            .unwrap_err();
        assert!(matches!(err, CreationError::ServiceUninitialised));
        registry.detach_node(outcome.slot, outcome.node_slot);
    }
}
