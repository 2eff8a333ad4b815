// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_subscriber [interval_ms]
//
// Polls the service "demo/transmission" every interval and prints received
// samples until Ctrl-C. Late joiners catch up on the history buffer first.

use std::time::Duration;

use shmbus::{Node, PayloadDescriptor, ServiceConfig, TypedSubscriber};

#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct TransmissionData {
    x: i32,
    y: i32,
    funky: f64,
}

fn main() {
    shmbus::log::init_from_env();

    let interval: u64 = std::env::args()
        .nth(1)
        .map(|a| a.parse().expect("interval_ms"))
        .unwrap_or(1000);

    let node = Node::new().expect("node");
    let service = node
        .open_or_create(
            "demo/transmission",
            PayloadDescriptor::of::<TransmissionData>(),
            ServiceConfig {
                history_capacity: 4,
                ..Default::default()
            },
        )
        .expect("service");
    let subscriber = TypedSubscriber::<TransmissionData>::create(&service).expect("subscriber");

    while node.wait(Duration::from_millis(interval)).is_ok() {
        while let Some(sample) = subscriber.try_receive().expect("receive") {
            println!("received {:?}", *sample);
        }
    }
    println!("exit");
}
