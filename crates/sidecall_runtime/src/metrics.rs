use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, InvokeError};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMetricsSnapshot {
    pub dispatched_total: u64,
    pub in_flight: u64,
    pub succeeded_total: u64,
    pub remote_failure_total: u64,
    pub unavailable_total: u64,
    pub timeout_total: u64,
    pub late_resolution_discarded_total: u64,
}

/// Invocation counters used for snapshots.
/// All counters are lock-free atomics; hot paths must remain O(1).
#[derive(Debug, Default)]
pub(crate) struct InvocationMetrics {
    dispatched_total: AtomicU64,
    in_flight: AtomicU64,
    succeeded_total: AtomicU64,
    remote_failure_total: AtomicU64,
    unavailable_total: AtomicU64,
    timeout_total: AtomicU64,
    late_resolution_discarded_total: AtomicU64,
}

impl InvocationMetrics {
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched call that has not resolved yet.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_dispatch(&self) {
        self.dispatched_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the transport outcome of one call, whether or not a waiter still wants it.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_outcome<T>(&self, outcome: &Result<T, InvokeError>) {
        saturating_dec(&self.in_flight);
        let counter = match outcome.as_ref().map_err(InvokeError::kind) {
            Ok(_) => &self.succeeded_total,
            Err(ErrorKind::Unavailable) => &self.unavailable_total,
            Err(_) => &self.remote_failure_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one waiter that gave up before the call resolved.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_timeout(&self) {
        self.timeout_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one transport outcome discarded because its waiter timed out.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn record_late_resolution(&self) {
        self.late_resolution_discarded_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter; counters are read independently.
    /// Allocation: none. Complexity: O(1).
    pub(crate) fn snapshot(&self) -> InvocationMetricsSnapshot {
        InvocationMetricsSnapshot {
            dispatched_total: self.dispatched_total.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            succeeded_total: self.succeeded_total.load(Ordering::Relaxed),
            remote_failure_total: self.remote_failure_total.load(Ordering::Relaxed),
            unavailable_total: self.unavailable_total.load(Ordering::Relaxed),
            timeout_total: self.timeout_total.load(Ordering::Relaxed),
            late_resolution_discarded_total: self
                .late_resolution_discarded_total
                .load(Ordering::Relaxed),
        }
    }
}

fn saturating_dec(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
        Some(value.saturating_sub(1))
    });
}
