// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Timeout, race and cancellation behavior of read/write tasks.

use pvbridge::{
    ContextManager, Error, HandleOptions, HandleRegistry, PvValue, ReadInputs, ReadTask, SimClient,
    SimPv, TaskState, TaskStatus, ValueKind, WriteInputs, WriteTask,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for anything that should settle.
const LIMIT: Duration = Duration::from_secs(5);
/// Allowed lateness of a timeout, covering poll spacing and scheduler noise.
const EPSILON: Duration = Duration::from_millis(250);

fn setup(pvs: &[(&str, SimPv)]) -> (SimClient, Arc<ContextManager>, Arc<HandleRegistry>) {
    let sim = SimClient::new();
    for (name, pv) in pvs {
        sim.add_pv(name, pv.clone());
    }
    let context = ContextManager::shared(sim.shared());
    let registry = HandleRegistry::shared(Arc::clone(&context), HandleOptions::default());
    (sim, context, registry)
}

fn run_to_end(
    mut status: TaskStatus,
    started: Instant,
    mut poll: impl FnMut() -> pvbridge::Result<TaskStatus>,
) -> TaskStatus {
    while status == TaskStatus::Running {
        assert!(started.elapsed() < LIMIT, "task never settled");
        std::thread::sleep(Duration::from_millis(1));
        status = poll().expect("poll");
    }
    status
}

#[test]
fn test_never_connecting_read_fails_inside_window() {
    let (_sim, context, registry) = setup(&[("TIME:DEAD", SimPv::new(0).never_connect())]);
    let mut task = ReadTask::new(context, registry, ValueKind::Int32).expect("task");
    let timeout = Duration::from_millis(200);

    let started = Instant::now();
    let first = task
        .start(ReadInputs::new("TIME:DEAD").timeout(timeout))
        .expect("start");
    assert_eq!(first, TaskStatus::Running);
    let status = run_to_end(first, started, || task.poll());
    let elapsed = started.elapsed();

    assert_eq!(status, TaskStatus::Failed);
    assert!(elapsed >= timeout, "failed early: {:?}", elapsed);
    assert!(elapsed <= timeout + EPSILON, "failed late: {:?}", elapsed);
    assert!(matches!(task.last_error(), Some(Error::Timeout { .. })));
}

#[test]
fn test_silent_server_read_fails_inside_window() {
    let (sim, context, registry) = setup(&[("TIME:MUTE", SimPv::new(5).never_reply())]);
    let mut task = ReadTask::new(context, registry, ValueKind::Int32).expect("task");
    let timeout = Duration::from_millis(150);

    let started = Instant::now();
    let first = task
        .start(ReadInputs::new("TIME:MUTE").timeout(timeout))
        .expect("start");
    let status = run_to_end(first, started, || task.poll());

    assert_eq!(status, TaskStatus::Failed);
    assert!(started.elapsed() >= timeout);
    assert!(sim.get_count("TIME:MUTE") >= 1);
    assert!(task.value().is_none());
}

#[test]
fn test_completion_racing_timeout_settles_once() {
    let mut rng = fastrand::Rng::with_seed(0x5eed_cafe);
    let timeout = Duration::from_millis(20);

    for round in 0..40 {
        let reply = Duration::from_millis(rng.u64(10..30));
        let name = format!("RACE:{}", round);
        let (_sim, context, registry) =
            setup(&[(name.as_str(), SimPv::new(round).reply_after(reply))]);
        let mut task = ReadTask::new(context, registry, ValueKind::Int32).expect("task");

        let started = Instant::now();
        let first = task
            .start(ReadInputs::new(name.as_str()).timeout(timeout))
            .expect("start");
        let status = run_to_end(first, started, || task.poll());

        match status {
            TaskStatus::Succeeded => {
                assert_eq!(task.value(), Some(&PvValue::Int32(round)));
                assert!(task.last_error().is_none());
            }
            TaskStatus::Failed => {
                assert!(task.value().is_none(), "round {}: value after timeout", round);
                assert!(matches!(task.last_error(), Some(Error::Timeout { .. })));
            }
            TaskStatus::Running => unreachable!(),
        }

        // A late completion must not flip the outcome.
        std::thread::sleep(Duration::from_millis(rng.u64(0..15)));
        assert_eq!(task.poll().expect("repoll"), status, "round {}", round);
    }
}

#[test]
fn test_halt_before_delayed_reply() {
    let slow = SimPv::new(9).reply_after(Duration::from_millis(60));
    let (sim, context, registry) = setup(&[("TIME:SLOW", slow)]);
    let mut task = ReadTask::new(context, registry, ValueKind::Int32).expect("task");

    let started = Instant::now();
    let mut status = task
        .start(ReadInputs::new("TIME:SLOW").timeout(Duration::from_secs(2)))
        .expect("start");
    while sim.get_count("TIME:SLOW") == 0 {
        assert!(started.elapsed() < LIMIT, "get never issued");
        std::thread::sleep(Duration::from_millis(1));
        status = task.poll().expect("poll");
    }
    assert_eq!(status, TaskStatus::Running);

    task.halt();
    assert_eq!(task.state(), TaskState::Cancelled);
    std::thread::sleep(Duration::from_millis(120));

    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(task.value().is_none());
    assert!(matches!(task.poll(), Err(Error::InvalidState(_))));
}

#[test]
fn test_halt_then_restart_reads_fresh_value() {
    let delayed = SimPv::new(1).reply_after(Duration::from_millis(40));
    let (sim, context, registry) = setup(&[("TIME:AGAIN", delayed)]);
    let mut task = ReadTask::new(context, registry, ValueKind::Int32).expect("task");

    task.start(ReadInputs::new("TIME:AGAIN")).expect("start");
    task.halt();
    sim.set_value("TIME:AGAIN", 2);

    let started = Instant::now();
    let first = task.start(ReadInputs::new("TIME:AGAIN")).expect("restart");
    let status = run_to_end(first, started, || task.poll());

    assert_eq!(status, TaskStatus::Succeeded);
    assert_eq!(task.value(), Some(&PvValue::Int32(2)));
}

#[test]
fn test_write_timeout_on_silent_server() {
    let (sim, context, registry) = setup(&[("TIME:WMUTE", SimPv::new(0).never_reply())]);
    let mut task = WriteTask::new(context, registry, ValueKind::Int32).expect("task");
    let timeout = Duration::from_millis(100);

    let started = Instant::now();
    let first = task
        .start(
            WriteInputs::new("TIME:WMUTE", 3)
                .timeout(timeout)
                .force_write(true),
        )
        .expect("start");
    let status = run_to_end(first, started, || task.poll());

    assert_eq!(status, TaskStatus::Failed);
    assert!(started.elapsed() >= timeout);
    assert!(matches!(task.last_error(), Some(Error::Timeout { .. })));
    assert_eq!(sim.put_count("TIME:WMUTE"), 1);
}
