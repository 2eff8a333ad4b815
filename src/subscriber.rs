// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Subscriber port: owns one receive ring inside the service data segment.
// Received samples are reference-counted views into the shared arena; the
// chunk returns to the pool when the last holder releases it.

use std::sync::Arc;

use tracing::trace;

use crate::error::{CreationError, ReceiveError};
use crate::platform::current_pid;
use crate::sample::Sample;
use crate::service::ServiceShared;

/// Options for a subscriber port.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriberConfig {
    /// How many history samples to receive on attach. `None` requests the
    /// full history buffer; `Some(0)` opts out of catch-up.
    pub history_request: Option<usize>,
}

pub(crate) struct SubscriberShared {
    pub(crate) service: Arc<ServiceShared>,
    pub(crate) port: usize,
    pid: i32,
}

impl Drop for SubscriberShared {
    fn drop(&mut self) {
        let svc = &self.service;
        svc.set_sub_active(self.port, false);
        // Queued but never received samples go back to the pool. Anything a
        // racing sender pushes after this drain is reclaimed when the ring
        // index is next claimed.
        let arena = svc.arena();
        let ring = svc.ring(self.port);
        while let Some(idx) = ring.pop() {
            arena.release(idx);
        }
        svc.registry().detach_subscriber(svc.slot(), self.port);
    }
}

/// Receiving endpoint of a service.
pub struct Subscriber {
    shared: Arc<SubscriberShared>,
}

impl Subscriber {
    pub(crate) fn create(
        service: Arc<ServiceShared>,
        config: SubscriberConfig,
    ) -> Result<Self, CreationError> {
        let port = service.registry().attach_subscriber(service.slot())?;
        let arena = service.arena();
        let ring = service.ring(port);

        // The ring index may have belonged to a dead subscriber; anything it
        // left queued still holds references.
        while let Some(idx) = ring.pop() {
            arena.release(idx);
        }

        // History catch-up happens before the port goes active, so a sample
        // can be missed in between but never delivered twice.
        let history_cap = service.config().history_capacity;
        let want = config.history_request.unwrap_or(history_cap).min(history_cap);
        if want > 0 {
            service.history().for_each_latest(want, |idx| {
                arena.add_ref(idx);
                if let Some(evicted) = ring.push_overwrite(idx) {
                    arena.release(evicted);
                }
            });
        }
        service.set_sub_active(port, true);
        trace!(port, history = want, "subscriber attached");

        Ok(Self {
            shared: Arc::new(SubscriberShared {
                service,
                port,
                pid: current_pid(),
            }),
        })
    }

    /// Pop the oldest queued sample, if any. Non-blocking; samples arrive in
    /// publish order per publisher.
    pub fn try_receive(&self) -> Result<Option<Sample>, ReceiveError> {
        let svc = &self.shared.service;
        if svc.registry().subscriber_pid(svc.slot(), self.shared.port) != self.shared.pid {
            return Err(ReceiveError::ServiceTornDown);
        }
        Ok(svc
            .ring(self.shared.port)
            .pop()
            .map(|idx| Sample::new(Arc::clone(&self.shared), idx)))
    }

    /// Samples currently queued.
    pub fn pending(&self) -> usize {
        self.shared.service.ring(self.shared.port).len()
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("port", &self.shared.port)
            .field("pending", &self.pending())
            .finish()
    }
}
