// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Sample handles. A SampleMut is an exclusive, writable loan held by one
// publisher; a Sample is a shared, immutable view held by a subscriber. Both
// are RAII guards over a chunk reference in the service arena.

use std::sync::Arc;

use crate::error::SendError;
use crate::publisher::PublisherShared;
use crate::subscriber::SubscriberShared;

/// A writable, not yet published sample.
///
/// Dropping an unsent sample returns the chunk to the pool. Payload bytes of
/// a reused chunk are NOT zeroed; write every byte you intend to send.
pub struct SampleMut {
    publisher: Arc<PublisherShared>,
    idx: u32,
    len: u32,
    /// Cleared by `send`; while set, drop abandons the loan.
    armed: bool,
}

impl SampleMut {
    pub(crate) fn new(publisher: Arc<PublisherShared>, idx: u32, len: u32) -> Self {
        Self {
            publisher,
            idx,
            len,
            armed: true,
        }
    }

    fn byte_len(&self) -> usize {
        self.len as usize * self.publisher.service.descriptor().size()
    }

    /// Number of payload elements in this loan.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw payload bytes, writable. Aligned to the payload type's alignment.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let ptr = self.publisher.service.arena().payload_ptr(self.idx);
        unsafe { std::slice::from_raw_parts_mut(ptr, self.byte_len()) }
    }

    pub fn payload(&self) -> &[u8] {
        let ptr = self.publisher.service.arena().payload_ptr(self.idx);
        unsafe { std::slice::from_raw_parts(ptr, self.byte_len()) }
    }

    pub(crate) fn payload_ptr(&mut self) -> *mut u8 {
        self.publisher.service.arena().payload_ptr(self.idx)
    }

    /// Publish the sample to every active subscriber. Returns how many
    /// subscriber queues it landed in; zero-copy in all cases.
    pub fn send(mut self) -> Result<usize, SendError> {
        self.armed = false;
        self.publisher.send_chunk(self.idx, self.len)
    }
}

impl Drop for SampleMut {
    fn drop(&mut self) {
        if self.armed {
            self.publisher.abandon_loan(self.idx);
        }
    }
}

/// A received, immutable sample.
///
/// Holds one reference on the underlying chunk; the chunk cannot be reused
/// until every holder dropped its sample, publishers included.
pub struct Sample {
    subscriber: Arc<SubscriberShared>,
    idx: u32,
}

impl Sample {
    pub(crate) fn new(subscriber: Arc<SubscriberShared>, idx: u32) -> Self {
        Self { subscriber, idx }
    }

    /// Number of payload elements, as recorded by the publisher at send time.
    pub fn len(&self) -> usize {
        self.subscriber.service.arena().chunk_len(self.idx) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        let svc = &self.subscriber.service;
        let bytes = self.len() * svc.descriptor().size();
        let ptr = svc.arena().payload_ptr(self.idx);
        unsafe { std::slice::from_raw_parts(ptr, bytes) }
    }

    pub(crate) fn payload_ptr(&self) -> *const u8 {
        self.subscriber.service.arena().payload_ptr(self.idx)
    }
}

impl Drop for Sample {
    fn drop(&mut self) {
        self.subscriber.service.arena().release(self.idx);
    }
}
