// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write-once result cell shared between a task and one client callback.
//!
//! ```text
//! callback thread            poll thread
//! try_complete(v) ----+      take()    -> Some(v) once
//!                     |      cancel()  -> true if nothing was written yet
//!               [done | cancelled]
//! ```
//!
//! Whichever of `try_complete` and `cancel` gets the lock first wins; the
//! other becomes a no-op. A task allocates a fresh cell per start cycle, so a
//! late callback from an earlier cycle can only touch its own stale cell.

use parking_lot::Mutex;
use std::sync::Arc;

struct Slot<T> {
    done: bool,
    cancelled: bool,
    payload: Option<T>,
}

pub(crate) struct ResultCell<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> ResultCell<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                done: false,
                cancelled: false,
                payload: None,
            }),
        })
    }

    /// Store `value` unless the cell was already written or cancelled.
    pub(crate) fn try_complete(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.done || slot.cancelled {
            return false;
        }
        slot.done = true;
        slot.payload = Some(value);
        true
    }

    /// Refuse any future write. Returns `false` if a result already landed.
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.done {
            return false;
        }
        slot.cancelled = true;
        true
    }

    /// Take the stored result. Yields `Some` at most once.
    pub(crate) fn take(&self) -> Option<T> {
        self.slot.lock().payload.take()
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.slot.lock().cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_wins() {
        let cell = ResultCell::new();
        assert!(cell.try_complete(1));
        assert!(!cell.try_complete(2));
        assert_eq!(cell.take(), Some(1));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn cancel_blocks_later_writes() {
        let cell = ResultCell::new();
        assert!(cell.cancel());
        assert!(!cell.try_complete(1));
        assert!(cell.is_cancelled());
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn cancel_after_completion_loses() {
        let cell = ResultCell::new();
        assert!(cell.try_complete("done"));
        assert!(!cell.cancel());
        assert_eq!(cell.take(), Some("done"));
    }

    #[test]
    fn racing_writers_produce_one_winner() {
        for _ in 0..200 {
            let cell = ResultCell::new();
            let writers: Vec<_> = (0..4)
                .map(|i| {
                    let cell = Arc::clone(&cell);
                    std::thread::spawn(move || cell.try_complete(i))
                })
                .collect();
            let canceller = {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || cell.cancel())
            };

            let wins = writers
                .into_iter()
                .map(|w| w.join().expect("writer"))
                .filter(|won| *won)
                .count();
            let cancelled = canceller.join().expect("canceller");
            assert_eq!(wins + usize::from(cancelled), 1);
        }
    }
}
