// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Attested Processor Contributors

//! # Once-Only Invoker
//!
//! Single-assignment delivery cell used when one logical operation races
//! across several RPC endpoints: whichever response arrives first is
//! delivered, every later delivery attempt is dropped. Losers are never
//! cancelled, only suppressed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

pub struct Once<T> {
    fired: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Once<T> {
    /// Create the cell together with the receiving end of the delivery.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                fired: AtomicBool::new(false),
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Deliver `value` if nothing has been delivered yet.
    ///
    /// Returns `true` for the single winning call, `false` for every other.
    pub fn deliver(&self, value: T) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn first_delivery_wins() {
        let (once, rx) = Once::channel();
        assert!(!once.has_fired());
        assert!(once.deliver(1));
        assert!(!once.deliver(2));
        assert!(once.has_fired());
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exactly_one_of_many_concurrent_deliveries_succeeds() {
        let (once, rx) = Once::channel();
        let once = Arc::new(once);

        let mut handles = Vec::new();
        for i in 0..32u32 {
            let once = once.clone();
            handles.push(tokio::spawn(async move { once.deliver(i) }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(rx.await.unwrap() < 32);
    }
}
