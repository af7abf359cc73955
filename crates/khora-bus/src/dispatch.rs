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

//! Synchronous fan-out: broadcasts, targeted events and result folding.
//!
//! Every dispatch follows the same protocol:
//!
//! 1. Capture a snapshot of the targeted handler lists under the table lock.
//! 2. Release the lock and walk the snapshot.
//! 3. Before each call, check the connection is still registered and the
//!    handler still alive; skip it otherwise.
//!
//! Handlers may therefore connect, disconnect (themselves included) or
//! dispatch again on the same bus from inside a callback. Connections made
//! during a dispatch are not part of its snapshot. A panicking handler
//! unwinds to the caller of the dispatch and leaves the bus consistent.

use crate::aggregate;
use crate::bus::Bus;
use crate::guard::DispatchFrame;
use crate::lock::TableLock;
use crate::policy::BusDefinition;
use crate::table::AddressSnapshot;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

impl<B: BusDefinition> Bus<B> {
    fn dispatch(
        &self,
        address: Option<&B::Address>,
        direction: Direction,
        mut call: impl FnMut(&B::Interface),
    ) {
        let shared = &self.shared;
        match address {
            Some(_) => shared.stats.record_event(),
            None => shared.stats.record_broadcast(),
        }

        let mut snapshot: Vec<AddressSnapshot<B>> =
            shared.table.with(|table| table.snapshot(address));
        if snapshot.is_empty() {
            return;
        }
        if direction == Direction::Reverse {
            snapshot.reverse();
            for group in &mut snapshot {
                group.targets.reverse();
            }
        }

        let frame = DispatchFrame::enter(shared.uid);
        for group in snapshot {
            frame.set_address(&group.address);
            for (id, weak) in group.targets {
                if !shared.is_live(id) {
                    continue;
                }
                let Some(handler) = weak.upgrade() else {
                    log::warn!(
                        "{}: handler behind connection {id} was dropped without disconnecting.",
                        B::name()
                    );
                    if shared.remove(id) {
                        shared.stats.record_pruned();
                    }
                    continue;
                };
                shared.stats.record_handler_call();
                call(&*handler);
            }
        }
    }

    /// Calls `message` on every handler at every address.
    ///
    /// Addresses are visited in table order, handlers in per-address order.
    pub fn broadcast(&self, message: impl FnMut(&B::Interface)) {
        log::trace!("{}: broadcast.", B::name());
        self.dispatch(None, Direction::Forward, message);
    }

    /// Like [`broadcast`](Self::broadcast), in exactly the opposite order.
    pub fn broadcast_reverse(&self, message: impl FnMut(&B::Interface)) {
        log::trace!("{}: reverse broadcast.", B::name());
        self.dispatch(None, Direction::Reverse, message);
    }

    /// Calls `message` on the handlers connected at `address`.
    ///
    /// Nobody listening is not an error: the call is then a no-op.
    pub fn event(&self, address: &B::Address, message: impl FnMut(&B::Interface)) {
        log::trace!("{}: event at {:?}.", B::name(), address);
        self.dispatch(Some(address), Direction::Forward, message);
    }

    /// Like [`event`](Self::event), in reverse handler order.
    pub fn event_reverse(&self, address: &B::Address, message: impl FnMut(&B::Interface)) {
        log::trace!("{}: reverse event at {:?}.", B::name(), address);
        self.dispatch(Some(address), Direction::Reverse, message);
    }

    /// Broadcasts and keeps the last handler's return value in `result`.
    ///
    /// With no handler, `result` keeps the value the caller put there.
    pub fn broadcast_result<R>(&self, result: &mut R, message: impl FnMut(&B::Interface) -> R) {
        self.broadcast_result_with(result, message, aggregate::last);
    }

    /// Broadcasts and folds each return value into `result` with `combine`.
    ///
    /// ## Arguments
    /// * `result` - Accumulator, seeded by the caller and never reset.
    /// * `message` - The call made on each handler.
    /// * `combine` - Folds one handler's value into the accumulator.
    pub fn broadcast_result_with<R, T>(
        &self,
        result: &mut R,
        mut message: impl FnMut(&B::Interface) -> T,
        mut combine: impl FnMut(&mut R, T),
    ) {
        self.broadcast(|handler| combine(&mut *result, message(handler)));
    }

    /// Sends an event to `address` and keeps the last handler's return value.
    pub fn event_result<R>(
        &self,
        result: &mut R,
        address: &B::Address,
        message: impl FnMut(&B::Interface) -> R,
    ) {
        self.event_result_with(result, address, message, aggregate::last);
    }

    /// Sends an event to `address`, folding each return value with `combine`.
    pub fn event_result_with<R, T>(
        &self,
        result: &mut R,
        address: &B::Address,
        mut message: impl FnMut(&B::Interface) -> T,
        mut combine: impl FnMut(&mut R, T),
    ) {
        self.event(address, |handler| combine(&mut *result, message(handler)));
    }

    /// Broadcasts a fallible message.
    ///
    /// A failing handler does not stop the dispatch: every handler is called
    /// and all failures are handed back in call order.
    pub fn try_broadcast<E>(
        &self,
        mut message: impl FnMut(&B::Interface) -> Result<(), E>,
    ) -> Result<(), Vec<E>> {
        let mut failures = Vec::new();
        self.broadcast(|handler| {
            if let Err(err) = message(handler) {
                failures.push(err);
            }
        });
        self.collect_failures(failures)
    }

    /// Sends a fallible event to `address`; see [`try_broadcast`](Self::try_broadcast).
    pub fn try_event<E>(
        &self,
        address: &B::Address,
        mut message: impl FnMut(&B::Interface) -> Result<(), E>,
    ) -> Result<(), Vec<E>> {
        let mut failures = Vec::new();
        self.event(address, |handler| {
            if let Err(err) = message(handler) {
                failures.push(err);
            }
        });
        self.collect_failures(failures)
    }

    fn collect_failures<E>(&self, failures: Vec<E>) -> Result<(), Vec<E>> {
        if failures.is_empty() {
            Ok(())
        } else {
            log::debug!("{}: {} handler(s) failed.", B::name(), failures.len());
            Err(failures)
        }
    }
}
