//! Readiness Barrier
//!
//! A one-shot gate that opens once the expected number of registrations has
//! been observed.
//!
//! # State Machine
//!
//! ```text
//! Waiting --(count reaches expected)--> Released (terminal)
//! ```
//!
//! The counter is advanced with a compare-and-swap loop that refuses to go
//! past `expected`, so it never over- or under-counts no matter how many
//! registration handlers race. Release goes through a separate latch that
//! only lets the first caller publish, and publishing is a non-blocking
//! `watch` send, so a late or duplicate registration can never wedge its
//! handler.

use backfleet_common::BoundBackend;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

/// Callback invoked by the metadata server the first time each backend
/// registers. Re-registrations of a known name are not reported.
///
/// Called while the registration lock is held, before the worker receives
/// its response.
pub trait RegistrationObserver: Send + Sync {
    fn on_registered(&self, backend: &BoundBackend);
}

/// Outcome of recording one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierSignal {
    /// Counted, still waiting for more
    Counted { count: usize, expected: usize },
    /// This registration opened the barrier
    Released,
    /// The barrier was already open; nothing counted
    AlreadyReleased,
}

pub struct ReadinessBarrier {
    expected: usize,
    count: AtomicUsize,
    released: AtomicBool,
    ready_tx: watch::Sender<bool>,
}

impl ReadinessBarrier {
    /// Creates a barrier waiting for `expected` registrations.
    ///
    /// A barrier expecting nothing starts released.
    pub fn new(expected: usize) -> Self {
        let (ready_tx, _) = watch::channel(false);
        let barrier = Self {
            expected,
            count: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            ready_tx,
        };
        if expected == 0 {
            barrier.release();
        }
        barrier
    }

    /// Counts one registration.
    pub fn record(&self) -> BarrierSignal {
        let expected = self.expected;
        let advanced = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < expected).then_some(c + 1)
            });

        match advanced {
            Err(_) => BarrierSignal::AlreadyReleased,
            Ok(prev) if prev + 1 == expected => {
                if self.release() {
                    BarrierSignal::Released
                } else {
                    BarrierSignal::AlreadyReleased
                }
            }
            Ok(prev) => BarrierSignal::Counted {
                count: prev + 1,
                expected,
            },
        }
    }

    /// Flips the latch. Only the first call publishes; returns whether this was it.
    fn release(&self) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.ready_tx.send_replace(true);
        true
    }

    /// Waits until the barrier has been released.
    ///
    /// Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut ready_rx = self.ready_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = ready_rx.wait_for(|ready| *ready).await;
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Registrations counted so far, never more than `expected`.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}

impl RegistrationObserver for ReadinessBarrier {
    fn on_registered(&self, backend: &BoundBackend) {
        match self.record() {
            BarrierSignal::Counted { count, expected } => {
                tracing::debug!("{} registered ({}/{})", backend.name, count, expected);
            }
            BarrierSignal::Released => {
                tracing::info!("{} registered, all {} backends ready", backend.name, self.expected);
            }
            BarrierSignal::AlreadyReleased => {
                tracing::debug!("{} re-registered after release", backend.name);
            }
        }
    }
}
