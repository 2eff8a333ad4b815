// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Node-level tests: wait, discovery, and domain isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use shmbus::{Node, NodeConfig, PayloadDescriptor, ServiceConfig};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test/{prefix}_{n}_{}", std::process::id())
}

fn unique_domain(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{n}p{}", std::process::id())
}

#[test]
fn wait_runs_the_full_timeout() {
    let node = Node::new().expect("node");
    let start = Instant::now();
    node.wait(Duration::from_millis(50)).expect("undisturbed wait");
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn wait_zero_returns_immediately() {
    let node = Node::new().expect("node");
    node.wait(Duration::ZERO).expect("undisturbed wait");
}

#[test]
fn list_services_reports_ports() {
    let domain = unique_domain("list");
    let node = Node::with_config(NodeConfig {
        domain,
        name: "lister".into(),
    })
    .expect("node");

    let name = unique_name("listed");
    let service = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");
    let _p = service.publisher().expect("publisher");
    let _s = service.subscriber().expect("subscriber");

    let details = node.list_services();
    assert_eq!(details.len(), 1);
    // Service names are normalised before storage.
    assert_eq!(details[0].name, name);
    assert_eq!(details[0].publishers, 1);
    assert_eq!(details[0].subscribers, 1);
}

#[test]
fn domains_are_isolated() {
    let node_a = Node::with_config(NodeConfig {
        domain: unique_domain("iso_a"),
        name: String::new(),
    })
    .expect("node a");
    let node_b = Node::with_config(NodeConfig {
        domain: unique_domain("iso_b"),
        name: String::new(),
    })
    .expect("node b");

    let _service = node_a
        .open_or_create(
            &unique_name("iso"),
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");

    assert_eq!(node_a.list_services().len(), 1);
    assert!(node_b.list_services().is_empty());
}

#[test]
fn same_domain_shares_services() {
    let domain = unique_domain("shared");
    let node_a = Node::with_config(NodeConfig {
        domain: domain.clone(),
        name: String::new(),
    })
    .expect("node a");
    let node_b = Node::with_config(NodeConfig {
        domain,
        name: String::new(),
    })
    .expect("node b");

    let name = unique_name("shared_svc");
    let service_a = node_a
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("create");
    // Second open attaches to the same instance.
    let service_b = node_b
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("open");
    assert_eq!(service_a.generation(), service_b.generation());
}

#[test]
fn service_is_torn_down_with_its_last_participant() {
    let domain = unique_domain("teardown");
    let node = Node::with_config(NodeConfig {
        domain,
        name: String::new(),
    })
    .expect("node");

    let name = unique_name("teardown_svc");
    let service = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("service");
    let gen_before = service.generation();
    assert_eq!(node.list_services().len(), 1);

    drop(service);
    assert!(node.list_services().is_empty());

    // Recreation yields a fresh instance.
    let service = node
        .open_or_create(
            &name,
            PayloadDescriptor::of::<u64>(),
            ServiceConfig::default(),
        )
        .expect("recreate");
    assert_ne!(service.generation(), gen_before);
}
