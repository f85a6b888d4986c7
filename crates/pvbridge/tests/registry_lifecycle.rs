// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

//! Handle registry sharing, release and garbage collection across threads.

use pvbridge::{ContextManager, HandleOptions, HandleRegistry, PvHandle, SimClient, SimPv};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn registry(pvs: &[&str]) -> (SimClient, Arc<HandleRegistry>) {
    let sim = SimClient::new();
    for name in pvs {
        sim.add_pv(name, SimPv::new(1));
    }
    let context = ContextManager::shared(sim.shared());
    context.init().expect("init");
    (sim, HandleRegistry::shared(context, HandleOptions::default()))
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_concurrent_acquire_and_connect_share_one_channel() {
    let (sim, registry) = registry(&["REG:SHARED"]);
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let workers: Vec<_> = (0..threads)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                registry.context().ensure_attached().expect("attach");
                barrier.wait();
                let handle = registry.acquire("REG:SHARED");
                handle.connect().expect("connect");
                handle
            })
        })
        .collect();
    let handles: Vec<Arc<PvHandle>> = workers
        .into_iter()
        .map(|w| w.join().expect("worker"))
        .collect();

    assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(registry.len(), 1);
    assert_eq!(sim.channels_created(), 1);
    wait_for("connection", || handles[0].is_connected());
}

#[test]
fn test_gc_after_last_reference_creates_new_instance() {
    let (sim, registry) = registry(&["REG:A", "REG:B"]);
    let keep = registry.acquire("REG:A");
    let before = registry.len();

    let first = registry.acquire("REG:B");
    first.connect().expect("connect");
    let first_ptr = Arc::as_ptr(&first);
    assert_eq!(registry.len(), before + 1);
    drop(first);

    wait_for("expired entry", || registry.live_count() == before);
    assert_eq!(registry.collect_garbage(), 1);
    assert_eq!(registry.len(), before);
    wait_for("channel release", || sim.open_channels() == 0);

    let second = registry.acquire("REG:B");
    assert_ne!(Arc::as_ptr(&second), first_ptr);
    assert_eq!(registry.len(), before + 1);
    assert!(Arc::ptr_eq(&keep, &registry.acquire("REG:A")));
}

#[test]
fn test_release_while_referenced_detaches_entry() {
    let (_sim, registry) = registry(&["REG:R"]);
    let old = registry.acquire("REG:R");

    assert!(registry.release("REG:R"));
    assert!(!registry.contains("REG:R"));
    assert!(!registry.release("REG:R"));

    let new = registry.acquire("REG:R");
    assert!(!Arc::ptr_eq(&old, &new));
    assert_eq!(old.name(), new.name());
}

#[test]
fn test_gc_racing_acquire_never_loses_live_handle() {
    let (_sim, registry) = registry(&["REG:CHURN"]);
    let collector = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let mut removed = 0;
            for _ in 0..500 {
                removed += registry.collect_garbage();
                thread::yield_now();
            }
            removed
        })
    };

    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..500 {
        let held = registry.acquire("REG:CHURN");
        // Any lookup while `held` lives must see the same instance.
        let again = registry.acquire("REG:CHURN");
        assert!(Arc::ptr_eq(&held, &again));
        if rng.bool() {
            thread::yield_now();
        }
    }

    collector.join().expect("collector");
    assert!(registry.len() <= 1);
}
