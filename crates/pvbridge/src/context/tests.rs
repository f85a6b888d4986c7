// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::sim::{SimClient, SimFaults};

#[test]
fn init_is_idempotent() {
    let sim = SimClient::new();
    let manager = ContextManager::new(sim.shared());
    assert!(!manager.is_initialized());

    manager.init().expect("first init");
    let ctx = sim.current_context();
    manager.init().expect("second init");

    assert!(manager.is_initialized());
    assert_eq!(sim.current_context(), ctx);
    manager.shutdown();
}

#[test]
fn init_failure_is_runtime_init_error() {
    let sim = SimClient::new();
    sim.set_faults(SimFaults {
        fail_create_context: true,
        ..SimFaults::default()
    });
    let manager = ContextManager::new(sim.shared());

    let err = manager.init().expect_err("create refused");
    assert!(matches!(err, Error::RuntimeInit(_)));
    assert!(err.is_fatal());
    assert!(!manager.is_initialized());
}

#[test]
fn ensure_attached_attaches_other_threads() {
    let sim = SimClient::new();
    let manager = Arc::new(ContextManager::new(sim.shared()));
    manager.ensure_attached().expect("attach main");
    let ctx = sim.current_context().expect("main attached");

    let worker = {
        let manager = Arc::clone(&manager);
        let sim = sim.clone();
        std::thread::spawn(move || {
            let before = sim.current_context();
            manager.ensure_attached().expect("attach worker");
            (before, sim.current_context())
        })
    };
    let (before, after) = worker.join().expect("worker");
    assert_eq!(before, None);
    assert_eq!(after, Some(ctx));
    manager.shutdown();
}

#[test]
fn ensure_attached_initializes_lazily() {
    let sim = SimClient::new();
    let manager = ContextManager::new(sim.shared());
    manager.ensure_attached().expect("lazy init");
    assert!(manager.is_initialized());
    manager.shutdown();
}

#[test]
fn attach_failure_is_attach_error() {
    let sim = SimClient::new();
    let manager = Arc::new(ContextManager::new(sim.shared()));
    manager.init().expect("init");
    sim.set_faults(SimFaults {
        fail_attach: true,
        ..SimFaults::default()
    });

    let manager_worker = Arc::clone(&manager);
    let result = std::thread::spawn(move || manager_worker.ensure_attached())
        .join()
        .expect("worker");
    assert!(matches!(result, Err(Error::Attach(_))));
    manager.shutdown();
}

#[test]
fn shutdown_is_idempotent_and_allows_reinit() {
    let sim = SimClient::new();
    let manager = ContextManager::new(sim.shared());
    manager.init().expect("init");
    let first = sim.current_context();

    manager.shutdown();
    manager.shutdown();
    assert!(!manager.is_initialized());
    assert_eq!(sim.current_context(), None);

    manager.init().expect("reinit");
    assert_ne!(sim.current_context(), first);
    manager.shutdown();
}
