// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dispatch counters kept by every bus.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by dispatch, connection and queue paths.
#[derive(Debug, Default)]
pub(crate) struct BusStats {
    broadcasts: AtomicU64,
    events: AtomicU64,
    handler_calls: AtomicU64,
    queued: AtomicU64,
    executed: AtomicU64,
    cleared: AtomicU64,
    replaced: AtomicU64,
    pruned: AtomicU64,
}

/// A point-in-time copy of a bus's counters, taken by [`Bus::stats`](crate::Bus::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusStatsSnapshot {
    /// Broadcasts dispatched (including reverse and fallible variants).
    pub broadcasts: u64,
    /// Targeted events dispatched.
    pub events: u64,
    /// Individual handler invocations.
    pub handler_calls: u64,
    /// Entries pushed onto the deferred queue.
    pub queued: u64,
    /// Queue entries executed.
    pub executed: u64,
    /// Queue entries discarded without running.
    pub cleared: u64,
    /// Handlers displaced under the single-handler policy.
    pub replaced: u64,
    /// Slots removed because their handler was dropped without disconnecting.
    pub pruned: u64,
}

impl BusStats {
    pub(crate) fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_call(&self) {
        self.handler_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self, count: u64) {
        self.executed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_cleared(&self, count: u64) {
        self.cleared.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_replaced(&self, count: u64) {
        self.replaced.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_pruned(&self) {
        self.pruned.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            handler_calls: self.handler_calls.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}

impl BusStatsSnapshot {
    /// Entries queued but not yet executed (or cleared) at snapshot time.
    pub fn pending(&self) -> u64 {
        self.queued
            .saturating_sub(self.executed)
            .saturating_sub(self.cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_records() {
        let stats = BusStats::default();
        stats.record_broadcast();
        stats.record_event();
        stats.record_event();
        stats.record_handler_call();
        stats.record_queued();
        stats.record_queued();
        stats.record_executed(1);
        stats.record_queued();
        stats.record_cleared(1);

        let snap = stats.snapshot();
        assert_eq!(snap.broadcasts, 1);
        assert_eq!(snap.events, 2);
        assert_eq!(snap.handler_calls, 1);
        assert_eq!(snap.pending(), 1);
    }
}
