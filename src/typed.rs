// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed wrappers over the byte-oriented port API. Zero-cost: a typed port is
// the untyped port plus a PhantomData, validated once at construction against
// the service's payload descriptor.

use std::marker::PhantomData;
use std::ops::Deref;

use crate::error::{CreationError, LoanError, ReceiveError, SendError};
use crate::payload::PayloadDescriptor;
use crate::publisher::Publisher;
use crate::sample::{Sample, SampleMut};
use crate::service::Service;
use crate::subscriber::{Subscriber, SubscriberConfig};

fn check_payload<T: Copy + 'static>(service: &Service) -> Result<(), CreationError> {
    let expect = PayloadDescriptor::of::<T>();
    let actual = service.descriptor();
    // Same full descriptor equality as the service-level check: the type
    // name distinguishes layout-identical types such as i64 and u64.
    if actual.type_name() != expect.type_name()
        || actual.size() != expect.size()
        || actual.align() != expect.align()
        || actual.variant() != expect.variant()
    {
        return Err(CreationError::IncompatibleService);
    }
    Ok(())
}

/// A publisher whose samples are single values of `T`.
pub struct TypedPublisher<T: Copy + 'static> {
    inner: Publisher,
    _payload: PhantomData<T>,
}

impl<T: Copy + 'static> TypedPublisher<T> {
    /// Attach a typed publisher; fails if the service's payload layout does
    /// not match `T`.
    pub fn create(service: &Service) -> Result<Self, CreationError> {
        check_payload::<T>(service)?;
        Ok(Self {
            inner: service.publisher()?,
            _payload: PhantomData,
        })
    }

    pub fn loan(&self) -> Result<TypedSampleMut<T>, LoanError> {
        Ok(TypedSampleMut {
            inner: self.inner.loan()?,
            _payload: PhantomData,
        })
    }

    /// Loan, write `value`, send. One copy into shared memory, none after.
    pub fn send_copy(&self, value: T) -> Result<usize, SendError> {
        let mut sample = self.loan()?;
        sample.write(value);
        sample.send()
    }
}

/// A writable loan typed as `T`. The payload is uninitialised until
/// [`write`](TypedSampleMut::write) runs.
pub struct TypedSampleMut<T: Copy + 'static> {
    inner: SampleMut,
    _payload: PhantomData<T>,
}

impl<T: Copy + 'static> TypedSampleMut<T> {
    pub fn write(&mut self, value: T) {
        unsafe { (self.inner.payload_ptr() as *mut T).write(value) };
    }

    pub fn send(self) -> Result<usize, SendError> {
        self.inner.send()
    }
}

/// A subscriber whose samples are single values of `T`.
pub struct TypedSubscriber<T: Copy + 'static> {
    inner: Subscriber,
    _payload: PhantomData<T>,
}

impl<T: Copy + 'static> TypedSubscriber<T> {
    pub fn create(service: &Service) -> Result<Self, CreationError> {
        Self::create_with(service, SubscriberConfig::default())
    }

    pub fn create_with(
        service: &Service,
        config: SubscriberConfig,
    ) -> Result<Self, CreationError> {
        check_payload::<T>(service)?;
        Ok(Self {
            inner: service.subscriber_with(config)?,
            _payload: PhantomData,
        })
    }

    pub fn try_receive(&self) -> Result<Option<TypedSample<T>>, ReceiveError> {
        Ok(self.inner.try_receive()?.map(|inner| TypedSample {
            inner,
            _payload: PhantomData,
        }))
    }

    pub fn pending(&self) -> usize {
        self.inner.pending()
    }
}

/// A received sample typed as `T`. Published payloads are always written, so
/// dereferencing is sound.
pub struct TypedSample<T: Copy + 'static> {
    inner: Sample,
    _payload: PhantomData<T>,
}

impl<T: Copy + 'static> Deref for TypedSample<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.inner.payload_ptr() as *const T) }
    }
}
