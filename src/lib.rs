// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// shmbus: zero-copy publish/subscribe over named shared memory. Processes
// discover each other through a per-domain registry segment, exchange
// payloads as reference-counted chunks in a per-service arena, and recover
// from peer crashes by PID liveness sweeps instead of destructors.

mod platform;
mod sync;

mod segment;
pub use segment::{Segment, SegmentMode};

mod service_name;
pub use service_name::{NameError, ServiceName, MAX_NAME_LEN};

mod payload;
pub use payload::{PayloadDescriptor, TypeVariant, MAX_ALIGNMENT, MAX_TYPE_NAME_LEN};

mod error;
pub use error::{CreationError, LoanError, ReceiveError, SendError, WaitError};

mod arena;
mod queue;

mod registry;
pub use registry::{ServiceDetails, MAX_PUBLISHER_PORTS, MAX_SERVICES, MAX_SUBSCRIBER_PORTS};

mod service;
pub use service::{
    OverflowPolicy, Service, ServiceConfig, MAX_HISTORY_CAPACITY, MAX_LOANS_PER_PUBLISHER,
    MAX_PAYLOAD_BYTES, MAX_QUEUE_CAPACITY, MAX_SLICE_ELEMENTS,
};

mod sample;
pub use sample::{Sample, SampleMut};

mod publisher;
pub use publisher::Publisher;

mod subscriber;
pub use subscriber::{Subscriber, SubscriberConfig};

mod typed;
pub use typed::{TypedPublisher, TypedSample, TypedSampleMut, TypedSubscriber};

mod node;
pub use node::{Node, NodeConfig};

pub mod log;
