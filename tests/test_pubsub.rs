// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end publish/subscribe tests: loan/send/receive, overflow policies,
// history catch-up, and port limits, all through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};

use shmbus::{
    CreationError, LoanError, Node, OverflowPolicy, PayloadDescriptor, ServiceConfig,
    TypedPublisher, TypedSubscriber,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test/{prefix}_{n}_{}", std::process::id())
}

fn node() -> Node {
    Node::new().expect("node")
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
struct TransmissionData {
    x: i32,
    y: i32,
    funky: f64,
}

// ===========================================================================
// Round trips
// ===========================================================================

#[test]
fn typed_round_trip_is_bit_exact() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("typed_rt"),
            PayloadDescriptor::of::<TransmissionData>(),
            ServiceConfig::default(),
        )
        .expect("service");

    let subscriber = TypedSubscriber::<TransmissionData>::create(&service).expect("subscriber");
    let publisher = TypedPublisher::<TransmissionData>::create(&service).expect("publisher");

    let sent = TransmissionData {
        x: 5,
        y: 15,
        funky: 5.0 * 812.12,
    };
    assert_eq!(publisher.send_copy(sent).expect("send"), 1);

    let got = subscriber
        .try_receive()
        .expect("receive")
        .expect("one sample");
    assert_eq!(*got, sent);
    assert!(subscriber.try_receive().expect("receive").is_none());
}

#[test]
fn untyped_slice_round_trip() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("slice_rt"),
            PayloadDescriptor::slice_of::<u8>(),
            ServiceConfig {
                max_slice_len: 16,
                ..Default::default()
            },
        )
        .expect("service");

    let subscriber = service.subscriber().expect("subscriber");
    let publisher = service.publisher().expect("publisher");

    let mut sample = publisher.loan_slice(4).expect("loan");
    sample.payload_mut().copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(sample.send().expect("send"), 1);

    let got = subscriber.try_receive().expect("receive").expect("sample");
    assert_eq!(got.len(), 4);
    assert_eq!(got.payload(), &[0xde, 0xad, 0xbe, 0xef]);
}

// ===========================================================================
// Queueing and overflow
// ===========================================================================

#[test]
fn samples_arrive_in_publish_order() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("fifo"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    let subscriber = TypedSubscriber::<u64>::create(&service).expect("subscriber");
    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");

    for i in 1..=5u64 {
        publisher.send_copy(i).expect("send");
    }
    for i in 1..=5u64 {
        assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), i);
    }
}

#[test]
fn drop_oldest_keeps_latest_samples() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("drop_oldest"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                subscriber_queue_capacity: 3,
                overflow: OverflowPolicy::DropOldest,
                ..Default::default()
            },
        )
        .expect("service");

    let subscriber = TypedSubscriber::<u64>::create(&service).expect("subscriber");
    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");

    for i in 1..=5u64 {
        assert_eq!(publisher.send_copy(i).expect("send"), 1);
    }
    // 1 and 2 were evicted.
    for i in 3..=5u64 {
        assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), i);
    }
    assert!(subscriber.try_receive().unwrap().is_none());
}

#[test]
fn reject_new_skips_full_subscribers() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("reject_new"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                subscriber_queue_capacity: 2,
                overflow: OverflowPolicy::RejectNew,
                ..Default::default()
            },
        )
        .expect("service");

    let subscriber = TypedSubscriber::<u64>::create(&service).expect("subscriber");
    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");

    assert_eq!(publisher.send_copy(1).expect("send"), 1);
    assert_eq!(publisher.send_copy(2).expect("send"), 1);
    // Queue full; the sample is not delivered anywhere.
    assert_eq!(publisher.send_copy(3).expect("send"), 0);

    assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), 1);
    assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), 2);
    assert!(subscriber.try_receive().unwrap().is_none());
}

#[test]
fn fanout_delivers_to_every_subscriber() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("fanout"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    let sub_a = TypedSubscriber::<u64>::create(&service).expect("sub a");
    let sub_b = TypedSubscriber::<u64>::create(&service).expect("sub b");
    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");

    assert_eq!(publisher.send_copy(7).expect("send"), 2);
    assert_eq!(*sub_a.try_receive().unwrap().expect("sample"), 7);
    // Queues are independent; a's pop does not consume b's copy.
    assert_eq!(*sub_b.try_receive().unwrap().expect("sample"), 7);
}

// ===========================================================================
// History
// ===========================================================================

#[test]
fn late_joiner_catches_up_on_history() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("history"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                history_capacity: 2,
                ..Default::default()
            },
        )
        .expect("service");

    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");
    for i in 1..=4u64 {
        // Nobody is listening yet.
        assert_eq!(publisher.send_copy(i).expect("send"), 0);
    }

    // The late joiner receives the last two samples, oldest first.
    let subscriber = TypedSubscriber::<u64>::create(&service).expect("subscriber");
    assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), 3);
    assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), 4);
    assert!(subscriber.try_receive().unwrap().is_none());

    // Live delivery continues after catch-up.
    assert_eq!(publisher.send_copy(5).expect("send"), 1);
    assert_eq!(*subscriber.try_receive().unwrap().expect("sample"), 5);
}

#[test]
fn history_request_can_opt_out() {
    use shmbus::SubscriberConfig;

    let node = node();
    let service = node
        .open_or_create(
            &unique_name("history_opt_out"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                history_capacity: 4,
                ..Default::default()
            },
        )
        .expect("service");

    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");
    publisher.send_copy(1).expect("send");
    publisher.send_copy(2).expect("send");

    let subscriber = TypedSubscriber::<u64>::create_with(
        &service,
        SubscriberConfig {
            history_request: Some(0),
        },
    )
    .expect("subscriber");
    assert!(subscriber.try_receive().unwrap().is_none());
}

// ===========================================================================
// Loans
// ===========================================================================

#[test]
fn loans_are_bounded_per_publisher() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("loan_cap"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                max_loaned_samples: 2,
                ..Default::default()
            },
        )
        .expect("service");
    let publisher = service.publisher().expect("publisher");

    let a = publisher.loan().expect("loan a");
    let _b = publisher.loan().expect("loan b");
    assert_eq!(publisher.loaned_samples(), 2);
    assert!(matches!(publisher.loan(), Err(LoanError::ExceedsMaxLoans)));

    // Dropping an unsent loan frees its slot.
    drop(a);
    assert_eq!(publisher.loaned_samples(), 1);
    let _c = publisher.loan().expect("loan c");
}

#[test]
fn oversized_loans_are_rejected() {
    let node = node();
    let fixed = node
        .open_or_create(
            &unique_name("loan_fixed"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");
    let publisher = fixed.publisher().expect("publisher");
    assert!(matches!(
        publisher.loan_slice(2),
        Err(LoanError::ExceedsMaxLoanSize {
            requested: 2,
            max: 1
        })
    ));

    let sliced = node
        .open_or_create(
            &unique_name("loan_slice"),
            PayloadDescriptor::slice_of::<u64>(),
            ServiceConfig {
                max_slice_len: 8,
                ..Default::default()
            },
        )
        .expect("service");
    let publisher = sliced.publisher().expect("publisher");
    assert!(publisher.loan_slice(8).is_ok());
    assert!(matches!(
        publisher.loan_slice(9),
        Err(LoanError::ExceedsMaxLoanSize {
            requested: 9,
            max: 8
        })
    ));
}

#[test]
fn received_sample_outlives_publisher() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("outlive"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    let subscriber = TypedSubscriber::<u64>::create(&service).expect("subscriber");
    let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");
    publisher.send_copy(42).expect("send");

    let sample = subscriber.try_receive().unwrap().expect("sample");
    drop(publisher);
    assert_eq!(*sample, 42);
}

// ===========================================================================
// Compatibility checks
// ===========================================================================

#[test]
fn incompatible_descriptor_is_rejected() {
    let node = node();
    let name = unique_name("incompat_desc");
    let _service = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    let err = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u32>(),
            ServiceConfig::default(),
        )
        .unwrap_err();
    assert!(matches!(err, CreationError::IncompatibleService));
}

#[test]
fn incompatible_config_is_rejected() {
    let node = node();
    let name = unique_name("incompat_cfg");
    let _service = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    let err = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                history_capacity: 1,
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, CreationError::IncompatibleConfig));
}

#[test]
fn typed_port_checks_payload_layout() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("typed_check"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    assert!(matches!(
        TypedPublisher::<u32>::create(&service),
        Err(CreationError::IncompatibleService)
    ));
    assert!(matches!(
        TypedSubscriber::<TransmissionData>::create(&service),
        Err(CreationError::IncompatibleService)
    ));
    // Layout-identical but differently named types do not match either.
    assert!(matches!(
        TypedPublisher::<i64>::create(&service),
        Err(CreationError::IncompatibleService)
    ));
}

#[test]
fn port_limits_are_enforced() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("port_limits"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                max_publishers: 1,
                max_subscribers: 1,
                ..Default::default()
            },
        )
        .expect("service");

    let _p = service.publisher().expect("publisher");
    assert!(matches!(
        service.publisher(),
        Err(CreationError::ExceedsMaxPublishers)
    ));

    let _s = service.subscriber().expect("subscriber");
    assert!(matches!(
        service.subscriber(),
        Err(CreationError::ExceedsMaxSubscribers)
    ));
}

#[test]
fn detached_port_slot_is_reusable() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("port_reuse"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                max_publishers: 1,
                ..Default::default()
            },
        )
        .expect("service");

    let p = service.publisher().expect("publisher");
    drop(p);
    service.publisher().expect("slot freed by drop");
}

// ===========================================================================
// Concurrency
// ===========================================================================

#[test]
fn concurrent_publishers_deliver_everything() {
    let node = node();
    let service = node
        .open_or_create(
            &unique_name("mpsc"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig {
                subscriber_queue_capacity: 64,
                overflow: OverflowPolicy::RejectNew,
                ..Default::default()
            },
        )
        .expect("service");

    let subscriber = TypedSubscriber::<u64>::create(&service).expect("subscriber");

    const PER_PUBLISHER: u64 = 16;
    let handles: Vec<_> = (0..2u64)
        .map(|p| {
            let publisher = TypedPublisher::<u64>::create(&service).expect("publisher");
            std::thread::spawn(move || {
                for i in 0..PER_PUBLISHER {
                    publisher.send_copy(p * PER_PUBLISHER + i).expect("send");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("join");
    }

    let mut got = Vec::new();
    while let Some(sample) = subscriber.try_receive().expect("receive") {
        got.push(*sample);
    }
    // Per-publisher order is preserved under interleaving; global order is
    // not, so compare as sets.
    got.sort_unstable();
    let want: Vec<u64> = (0..2 * PER_PUBLISHER).collect();
    assert_eq!(got, want);
}
