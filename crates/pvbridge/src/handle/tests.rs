// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::sim::{SimClient, SimFaults, SimPv};
use crossbeam::channel;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn setup(name: &str, pv: SimPv) -> (SimClient, Arc<ContextManager>) {
    let sim = SimClient::new();
    sim.add_pv(name, pv);
    let context = ContextManager::shared(sim.shared());
    context.ensure_attached().expect("attach");
    (sim, context)
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn connect_is_idempotent() {
    let (sim, context) = setup("HDL:A", SimPv::new(1));
    let handle = PvHandle::new("HDL:A", context, HandleOptions::default());

    handle.connect().expect("connect");
    handle.connect().expect("connect again");
    wait_for("connection", || handle.is_connected());

    assert_eq!(sim.channels_created(), 1);
    assert_eq!(
        handle.native(),
        Some(NativeInfo {
            kind: ValueKind::Int32,
            count: 1
        })
    );
}

#[test]
fn channel_create_failure_allows_retry() {
    let (sim, context) = setup("HDL:B", SimPv::new(1));
    sim.set_faults(SimFaults {
        fail_create_channel: true,
        ..SimFaults::default()
    });
    let handle = PvHandle::new("HDL:B", context, HandleOptions::default());

    let err = handle.connect().expect_err("refused");
    assert!(matches!(err, Error::ChannelCreate { .. }));
    assert!(!err.is_fatal());
    assert_eq!(handle.connection_state(), ConnectionState::Disconnected);

    sim.set_faults(SimFaults::default());
    handle.connect().expect("retry");
    wait_for("connection", || handle.is_connected());
}

#[test]
fn listeners_run_in_registration_order_and_may_reenter() {
    let (_sim, context) = setup("HDL:C", SimPv::new(1));
    let handle = PvHandle::new("HDL:C", context, HandleOptions::default());
    let (tx, rx) = channel::unbounded();

    for tag in 0..3 {
        let tx = tx.clone();
        let weak = Arc::downgrade(&handle);
        handle.add_connection_listener(move |connected| {
            // Re-entering the handle from a listener must not deadlock.
            let seen = weak.upgrade().map(|h| h.is_connected());
            let _ = tx.send((tag, connected, seen));
        });
    }
    handle.connect().expect("connect");

    let got: Vec<_> = (0..3)
        .map(|_| rx.recv_timeout(WAIT).expect("listener call"))
        .collect();
    assert_eq!(
        got,
        vec![
            (0, true, Some(true)),
            (1, true, Some(true)),
            (2, true, Some(true))
        ]
    );
}

#[test]
fn removed_listener_is_not_called() {
    let (sim, context) = setup("HDL:D", SimPv::new(1));
    let handle = PvHandle::new("HDL:D", context, HandleOptions::default());
    let (tx, rx) = channel::unbounded();

    let id = handle.add_connection_listener(move |c| {
        let _ = tx.send(c);
    });
    handle.connect().expect("connect");
    assert!(rx.recv_timeout(WAIT).expect("up"));

    assert!(handle.remove_connection_listener(id));
    assert!(!handle.remove_connection_listener(id));
    sim.disconnect("HDL:D");
    wait_for("disconnect", || !handle.is_connected());
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn request_get_delivers_sample() {
    let (_sim, context) = setup("HDL:E", SimPv::new(42));
    let handle = PvHandle::new("HDL:E", context, HandleOptions::default());
    handle.connect().expect("connect");
    wait_for("connection", || handle.is_connected());

    let (tx, rx) = channel::bounded(1);
    handle
        .request_get(None, move |r| {
            let _ = tx.send(r);
        })
        .expect("issued");

    let sample = rx.recv_timeout(WAIT).expect("reply").expect("ok");
    assert_eq!(sample.value, PvValue::Int32(42));
}

#[test]
fn request_before_connect_is_issue_error() {
    let (_sim, context) = setup("HDL:F", SimPv::new(1).never_connect());
    let handle = PvHandle::new("HDL:F", context, HandleOptions::default());
    handle.connect().expect("connect");

    let err = handle
        .request_get(None, |_| panic!("must not be called"))
        .expect_err("not connected");
    assert!(matches!(err, Error::Issue { .. }));
    let err = handle
        .request_put(PvValue::Int32(1), |_| panic!("must not be called"))
        .expect_err("not connected");
    assert!(matches!(err, Error::Issue { .. }));
}

#[test]
fn issue_failure_never_calls_back() {
    let (sim, context) = setup("HDL:G", SimPv::new(1));
    let handle = PvHandle::new("HDL:G", context, HandleOptions::default());
    handle.connect().expect("connect");
    wait_for("connection", || handle.is_connected());

    sim.set_faults(SimFaults {
        fail_issue_put: true,
        ..SimFaults::default()
    });
    let err = handle
        .request_put(PvValue::Int32(2), |_| panic!("must not be called"))
        .expect_err("refused");
    assert!(matches!(err, Error::Issue { .. }));
}

#[test]
fn put_failure_is_request_failed() {
    let (_sim, context) = setup("HDL:H", SimPv::new(1).reject_puts());
    let handle = PvHandle::new("HDL:H", context, HandleOptions::default());
    handle.connect().expect("connect");
    wait_for("connection", || handle.is_connected());

    let (tx, rx) = channel::bounded(1);
    handle
        .request_put(PvValue::Int32(5), move |r| {
            let _ = tx.send(r);
        })
        .expect("issued");
    let err = rx.recv_timeout(WAIT).expect("reply").expect_err("rejected");
    assert!(matches!(err, Error::RequestFailed { .. }));
}

#[test]
fn cached_value_follows_monitor_and_clears_on_disconnect() {
    let (sim, context) = setup("HDL:I", SimPv::new(1.5f64));
    let handle = PvHandle::new("HDL:I", context, HandleOptions::default());
    handle.connect().expect("connect");
    wait_for("initial monitor", || handle.cached_value().is_some());
    assert_eq!(
        handle.cached_value().map(|s| s.value),
        Some(PvValue::Float64(1.5))
    );

    sim.set_value("HDL:I", 2.5f64);
    wait_for("monitor update", || {
        handle.cached_value().map(|s| s.value) == Some(PvValue::Float64(2.5))
    });

    sim.disconnect("HDL:I");
    wait_for("disconnect", || !handle.is_connected());
    assert_eq!(handle.cached_value(), None);

    sim.reconnect("HDL:I");
    wait_for("value after reconnect", || handle.cached_value().is_some());
    assert_eq!(sim.open_subscriptions(), 1);
}

#[test]
fn no_cache_without_subscription() {
    let (sim, context) = setup("HDL:J", SimPv::new(3));
    let handle = PvHandle::new(
        "HDL:J",
        context,
        HandleOptions {
            subscribe_on_connect: false,
        },
    );
    handle.connect().expect("connect");
    wait_for("connection", || handle.is_connected());
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(handle.cached_value(), None);
    assert_eq!(sim.open_subscriptions(), 0);
}

#[test]
fn drop_releases_channel_and_subscription() {
    let (sim, context) = setup("HDL:K", SimPv::new(3));
    let handle = PvHandle::new("HDL:K", context, HandleOptions::default());
    handle.connect().expect("connect");
    wait_for("initial monitor", || handle.cached_value().is_some());
    assert_eq!(sim.open_channels(), 1);

    // The callback thread may briefly hold the last strong reference.
    drop(handle);
    wait_for("release", || sim.open_channels() == 0);
    assert_eq!(sim.open_subscriptions(), 0);
}

#[test]
fn array_channel_reads_first_element() {
    let (_sim, context) = setup("HDL:L", SimPv::new(7).with_count(16));
    let handle = PvHandle::new("HDL:L", context, HandleOptions::default());
    handle.connect().expect("connect");
    wait_for("connection", || handle.is_connected());

    assert_eq!(handle.native().map(|n| n.count), Some(16));
    let (tx, rx) = channel::bounded(1);
    handle
        .request_get(Some(ValueKind::Float64), move |r| {
            let _ = tx.send(r);
        })
        .expect("issued");
    let sample = rx.recv_timeout(WAIT).expect("reply").expect("ok");
    assert_eq!(sample.value, PvValue::Float64(7.0));
}
