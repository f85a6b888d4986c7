// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background callback thread for the simulated client.
//!
//! Jobs are closures with a due time. The thread keeps them in a min-heap and
//! runs each one once its due time has passed, in (due, submission) order.
//! The thread exits when every [`Dispatcher`] clone has been dropped and the
//! heap is drained of jobs that are already due.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type JobFn = Box<dyn FnOnce() + Send>;

struct Job {
    due: Instant,
    seq: u64,
    run: JobFn,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    // Reversed: BinaryHeap is a max-heap, we want the earliest job on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Handle used to submit delayed jobs to the callback thread.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: Sender<Job>,
    seq: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Spawn the callback thread.
    pub(crate) fn spawn(name: &str) -> Self {
        let (tx, rx) = channel::unbounded();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(rx));
        if let Err(e) = spawned {
            // Jobs sent to a dead receiver are silently dropped, which looks
            // like a remote that never answers.
            log::error!("[sim] failed to spawn dispatcher thread: {}", e);
        }
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `job` on the callback thread after `delay`.
    pub(crate) fn schedule(&self, delay: Duration, job: impl FnOnce() + Send + 'static) {
        let job = Job {
            due: Instant::now() + delay,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            run: Box::new(job),
        };
        if self.tx.send(job).is_err() {
            log::warn!("[sim] dispatcher thread gone, dropping job");
        }
    }
}

fn run_loop(rx: Receiver<Job>) {
    let mut heap: BinaryHeap<Job> = BinaryHeap::new();
    let mut connected = true;

    loop {
        let now = Instant::now();
        while heap.peek().is_some_and(|job| job.due <= now) {
            if let Some(job) = heap.pop() {
                (job.run)();
            }
        }

        if !connected {
            match heap.peek() {
                Some(job) => {
                    thread::sleep(job.due.saturating_duration_since(Instant::now()));
                    continue;
                }
                None => return,
            }
        }

        let received = match heap.peek() {
            Some(job) => rx.recv_timeout(job.due.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(job) => heap.push(job),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => connected = false,
        }
    }
}
