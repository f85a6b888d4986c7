// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::sim::SimClient;
use std::sync::Barrier;

fn registry() -> HandleRegistry {
    let sim = SimClient::new();
    HandleRegistry::new(
        ContextManager::shared(sim.shared()),
        HandleOptions::default(),
    )
}

#[test]
fn acquire_returns_same_instance() {
    let registry = registry();
    let a = registry.acquire("REG:A");
    let b = registry.acquire("REG:A");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 1);
}

#[test]
fn different_names_get_different_handles() {
    let registry = registry();
    let a = registry.acquire("REG:A");
    let b = registry.acquire("REG:B");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "REG:A");
    assert_eq!(b.name(), "REG:B");
    assert_eq!(registry.len(), 2);
}

#[test]
fn expired_entry_is_recreated() {
    let registry = registry();
    let first = Arc::downgrade(&registry.acquire("REG:A"));
    assert!(first.upgrade().is_none());
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.live_count(), 0);

    let second = registry.acquire("REG:A");
    assert!(first.upgrade().is_none());
    assert_eq!(second.name(), "REG:A");
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.live_count(), 1);
}

#[test]
fn collect_garbage_removes_only_expired() {
    let registry = registry();
    let keep = registry.acquire("REG:KEEP");
    drop(registry.acquire("REG:GONE1"));
    drop(registry.acquire("REG:GONE2"));
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.collect_garbage(), 2);
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("REG:KEEP"));
    assert!(!registry.contains("REG:GONE1"));
    assert_eq!(registry.collect_garbage(), 0);

    assert!(Arc::ptr_eq(&keep, &registry.acquire("REG:KEEP")));
}

#[test]
fn release_while_alive_gives_new_instance() {
    let registry = registry();
    let a = registry.acquire("REG:A");
    assert!(registry.release("REG:A"));
    assert!(!registry.release("REG:A"));
    assert_eq!(registry.len(), 0);

    let b = registry.acquire("REG:A");
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), b.name());
}

#[test]
fn clear_keeps_live_handles_usable() {
    let registry = registry();
    let a = registry.acquire("REG:A");
    let _b = registry.acquire("REG:B");
    registry.clear();
    assert!(registry.is_empty());
    assert_eq!(a.name(), "REG:A");
    assert!(registry.get("REG:A").is_none());
}

#[test]
fn get_does_not_create() {
    let registry = registry();
    assert!(registry.get("REG:A").is_none());
    assert!(registry.is_empty());
    let a = registry.acquire("REG:A");
    let found = registry.get("REG:A").expect("live");
    assert!(Arc::ptr_eq(&a, &found));
}

#[test]
fn concurrent_acquire_creates_one_handle() {
    const THREADS: usize = 8;
    let registry = Arc::new(registry());
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                registry.acquire("REG:SHARED")
            })
        })
        .collect();

    let handles: Vec<Arc<PvHandle>> = workers
        .into_iter()
        .map(|w| w.join().expect("worker"))
        .collect();

    for h in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], h));
    }
    assert_eq!(registry.len(), 1);
}
