// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_publisher [interval_ms]
//
// Publishes one TransmissionData sample per interval on the service
// "demo/transmission" until Ctrl-C. Run demo_subscriber in another terminal
// (or several) to watch the fan-out.

use std::time::Duration;

use shmbus::{Node, PayloadDescriptor, ServiceConfig, TypedPublisher};

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
    let publisher = TypedPublisher::<TransmissionData>::create(&service).expect("publisher");

    let mut counter: i32 = 0;
    while node.wait(Duration::from_millis(interval)).is_ok() {
        counter += 1;
        let data = TransmissionData {
            x: counter,
            y: counter * 3,
            funky: counter as f64 * 812.12,
        };
        let delivered = publisher.send_copy(data).expect("send");
        println!("sent {data:?} to {delivered} subscriber(s)");
    }
    println!("exit");
}
