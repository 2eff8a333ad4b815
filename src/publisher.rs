// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Publisher port: loans writable chunks from the service arena and fans
// published chunks out to every active subscriber ring. A publisher never
// copies payload bytes; subscribers read the same chunk the publisher wrote.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::error::{CreationError, LoanError, SendError};
use crate::payload::TypeVariant;
use crate::platform::current_pid;
use crate::sample::SampleMut;
use crate::service::{OverflowPolicy, ServiceShared};

pub(crate) struct PublisherShared {
    pub(crate) service: Arc<ServiceShared>,
    pub(crate) port: usize,
    pid: i32,
    /// Loans handed out and not yet sent or dropped.
    outstanding: AtomicU32,
}

impl PublisherShared {
    /// Fan a loaned chunk out to the active subscribers and the history
    /// buffer, then drop the loan reference. Returns the number of
    /// subscriber queues the sample landed in.
    pub(crate) fn send_chunk(&self, idx: u32, len: u32) -> Result<usize, SendError> {
        let svc = &self.service;
        if svc.registry().publisher_pid(svc.slot(), self.port) != self.pid {
            // Displaced by a sweep; the service was recreated underneath us.
            svc.arena().release(idx);
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(SendError::ServiceTornDown);
        }

        let arena = svc.arena();
        let config = svc.config();
        arena.publish(idx, len);

        let mut delivered = 0;
        let active = svc.active_subs();
        for port in 0..config.max_subscribers {
            if active & (1u32 << port) == 0 {
                continue;
            }
            // The reference is taken before the push so a concurrent pop can
            // never observe an unreferenced chunk.
            arena.add_ref(idx);
            let ring = svc.ring(port);
            match config.overflow {
                OverflowPolicy::DropOldest => {
                    if let Some(evicted) = ring.push_overwrite(idx) {
                        arena.release(evicted);
                    }
                    delivered += 1;
                }
                OverflowPolicy::RejectNew => {
                    if ring.push(idx) {
                        delivered += 1;
                    } else {
                        arena.release(idx);
                    }
                }
            }
        }

        if config.history_capacity > 0 {
            arena.add_ref(idx);
            if let Some(evicted) = svc.history().push_overwrite(idx) {
                arena.release(evicted);
            }
        }

        arena.release(idx);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        trace!(chunk = idx, delivered, "sample sent");
        Ok(delivered)
    }

    /// Return an unsent loan to the pool.
    pub(crate) fn abandon_loan(&self, idx: u32) {
        self.service.arena().release(idx);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for PublisherShared {
    fn drop(&mut self) {
        self.service
            .registry()
            .detach_publisher(self.service.slot(), self.port);
    }
}

/// Sending endpoint of a service.
///
/// Loans are writable until sent; `send` publishes the chunk without copying.
/// Samples held by subscribers outlive the publisher that produced them.
pub struct Publisher {
    shared: Arc<PublisherShared>,
}

impl Publisher {
    pub(crate) fn create(service: Arc<ServiceShared>) -> Result<Self, CreationError> {
        let port = service.registry().attach_publisher(service.slot())?;
        Ok(Self {
            shared: Arc::new(PublisherShared {
                service,
                port,
                pid: current_pid(),
                outstanding: AtomicU32::new(0),
            }),
        })
    }

    /// Loan a chunk for exactly one payload element.
    pub fn loan(&self) -> Result<SampleMut, LoanError> {
        self.loan_slice(1)
    }

    /// Loan a chunk for `len` payload elements. For fixed-size payloads only
    /// `len == 1` is valid.
    pub fn loan_slice(&self, len: usize) -> Result<SampleMut, LoanError> {
        let svc = &self.shared.service;
        let config = svc.config();
        let max = match svc.descriptor().variant() {
            TypeVariant::FixedSize => 1,
            TypeVariant::Slice => config.max_slice_len,
        };
        if len == 0 || len > max {
            return Err(LoanError::ExceedsMaxLoanSize {
                requested: len,
                max,
            });
        }

        // Reserve the loan slot before touching the arena so concurrent
        // loans never overshoot max_loaned_samples.
        let cap = config.max_loaned_samples as u32;
        if self
            .shared
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur < cap).then_some(cur + 1)
            })
            .is_err()
        {
            return Err(LoanError::ExceedsMaxLoans);
        }

        match svc.arena().allocate(self.shared.pid) {
            Some(idx) => Ok(SampleMut::new(Arc::clone(&self.shared), idx, len as u32)),
            None => {
                self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
                Err(LoanError::OutOfMemory)
            }
        }
    }

    /// Number of loans currently held.
    pub fn loaned_samples(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire) as usize
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("port", &self.shared.port)
            .field("loaned", &self.loaned_samples())
            .finish()
    }
}
