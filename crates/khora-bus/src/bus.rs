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

//! The bus handle: construction, connection management and introspection.
//!
//! Dispatch lives in [`dispatch`](crate::dispatch) and the deferred queue in
//! [`queue`](crate::queue); both extend [`Bus`] with further methods.

use crate::connection::{Connection, MultiConnection};
use crate::error::{BusError, BusResult};
use crate::guard;
use crate::lock::{LockPolicy, TableLock};
use crate::policy::BusDefinition;
use crate::queue::EventQueue;
use crate::stats::{BusStats, BusStatsSnapshot};
use crate::table::{AddressTable, ConnectionId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_BUS_UID: AtomicU64 = AtomicU64::new(1);

type Table<B> = <<B as BusDefinition>::Lock as LockPolicy>::Lock<AddressTable<B>>;

/// State shared by a bus handle and the connections it hands out.
pub(crate) struct Shared<B: BusDefinition> {
    pub(crate) uid: u64,
    pub(crate) table: Table<B>,
    pub(crate) queue: EventQueue<B>,
    pub(crate) stats: Arc<BusStats>,
}

impl<B: BusDefinition> Shared<B> {
    /// Removes a connection. Returns `false` for stale or unknown ids.
    pub(crate) fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.table.with(|table| table.remove(id));
        if removed {
            log::debug!("{}: connection {id} disconnected", B::name());
        }
        removed
    }

    pub(crate) fn is_live(&self, id: ConnectionId) -> bool {
        self.table.with(|table| table.is_live(id))
    }
}

/// A typed registry of handlers for one message interface.
///
/// `Bus` is a cheap handle; clones share the same address table and queue.
/// Handlers are never owned by the bus: it keeps `Weak` references and the
/// [`Connection`] returned by [`connect`](Bus::connect) removes the binding
/// when dropped.
pub struct Bus<B: BusDefinition> {
    pub(crate) shared: Arc<Shared<B>>,
}

impl<B: BusDefinition> Clone for Bus<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: BusDefinition> std::fmt::Debug for Bus<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &B::name())
            .field("traits", &B::TRAITS)
            .field("uid", &self.shared.uid)
            .finish()
    }
}

impl<B: BusDefinition> Bus<B> {
    /// Creates a bus after validating its traits.
    ///
    /// ## Returns
    /// `Err(BusError::Configuration)` if the traits are incoherent for the
    /// declared address type.
    #[allow(clippy::arc_with_non_send_sync)]
    pub fn new() -> BusResult<Self> {
        B::TRAITS.validate::<B::Address>(B::name())?;

        let shared = Shared {
            uid: NEXT_BUS_UID.fetch_add(1, Ordering::Relaxed),
            table: <Table<B> as TableLock<AddressTable<B>>>::new(AddressTable::new()),
            queue: EventQueue::new(),
            stats: Arc::new(BusStats::default()),
        };
        log::info!("Bus '{}' initialized ({:?}).", B::name(), B::TRAITS);
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared<B>>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared<B>> {
        Arc::downgrade(&self.shared)
    }

    /// Connects `handler` at `address`.
    ///
    /// Under the single-handler policy an existing handler at `address` is
    /// replaced and a warning is logged; its [`Connection`] becomes stale.
    ///
    /// ## Arguments
    /// * `handler` - The handler. The bus keeps only a weak reference.
    /// * `address` - Where to connect; `()` on single-address buses.
    ///
    /// ## Returns
    /// The connection guard, or `BusError::AlreadyConnected` if this handler
    /// instance is already connected at `address`.
    pub fn connect(
        &self,
        handler: Arc<B::Interface>,
        address: B::Address,
    ) -> BusResult<Connection<B>> {
        let order = if B::TRAITS.handler_policy.is_ordered() {
            B::handler_order(&*handler)
        } else {
            0
        };
        let weak = Arc::downgrade(&handler);

        let inserted = self
            .shared
            .table
            .with(|table| table.insert(address.clone(), weak, order));
        let Some(inserted) = inserted else {
            return Err(BusError::AlreadyConnected {
                bus: B::name(),
                address: format!("{address:?}"),
            });
        };

        if !inserted.replaced.is_empty() {
            log::warn!(
                "{}: handler at {:?} replaced by connection {} (single-handler policy).",
                B::name(),
                address,
                inserted.id
            );
            self.shared
                .stats
                .record_replaced(inserted.replaced.len() as u64);
        }
        drop(inserted.replaced);
        log::debug!(
            "{}: connection {} at {:?}.",
            B::name(),
            inserted.id,
            address
        );

        let connection = Connection::new(inserted.id, address, self.downgrade());
        B::on_connected(self, &*handler, connection.address());
        Ok(connection)
    }

    /// Starts a multi-address binding for `handler`.
    ///
    /// No address is connected yet; see [`MultiConnection::connect`].
    pub fn connect_multi(&self, handler: Arc<B::Interface>) -> MultiConnection<B> {
        MultiConnection::new(self.clone(), Arc::downgrade(&handler))
    }

    /// Disconnects `connection`. Idempotent; stale connections are ignored.
    ///
    /// ## Returns
    /// `true` if a binding was removed by this call.
    pub fn disconnect(&self, connection: &Connection<B>) -> bool {
        if !connection.belongs_to(self) {
            return false;
        }
        self.shared.remove(connection.id())
    }

    /// Returns `true` if `handler` is connected at any address.
    pub fn is_connected(&self, handler: &B::Interface) -> bool {
        let ptr = handler as *const B::Interface as *const ();
        self.shared.table.with(|table| table.contains(ptr, None))
    }

    /// Returns `true` if `handler` is connected at `address`.
    pub fn is_connected_at(&self, handler: &B::Interface, address: &B::Address) -> bool {
        let ptr = handler as *const B::Interface as *const ();
        self.shared
            .table
            .with(|table| table.contains(ptr, Some(address)))
    }

    /// Returns `true` if at least one handler is connected.
    pub fn has_handlers(&self) -> bool {
        self.handler_count() > 0
    }

    /// Number of live connections across all addresses.
    pub fn handler_count(&self) -> usize {
        self.shared.table.with(|table| table.len())
    }

    /// Number of handlers connected at `address`.
    pub fn handler_count_at(&self, address: &B::Address) -> usize {
        self.shared.table.with(|table| table.count_at(address))
    }

    /// Number of addresses with at least one handler.
    pub fn address_count(&self) -> usize {
        self.shared.table.with(|table| table.address_count())
    }

    /// Returns the first live handler at `address`, in dispatch order.
    pub fn find_first_handler(&self, address: &B::Address) -> Option<Arc<B::Interface>> {
        let snapshot = self.shared.table.with(|table| table.snapshot(Some(address)));
        snapshot
            .into_iter()
            .flat_map(|s| s.targets)
            .find_map(|(_, handler)| handler.upgrade())
    }

    /// Visits every live handler in dispatch order until `visit` returns `false`.
    ///
    /// ## Returns
    /// `true` if every handler was visited.
    pub fn enumerate_handlers(&self, mut visit: impl FnMut(&B::Interface) -> bool) -> bool {
        let snapshot = self.shared.table.with(|table| table.snapshot(None));
        for (id, weak) in snapshot.into_iter().flat_map(|s| s.targets) {
            if !self.shared.is_live(id) {
                continue;
            }
            if let Some(handler) = weak.upgrade() {
                if !visit(&*handler) {
                    return false;
                }
            }
        }
        true
    }

    /// Address of the dispatch currently calling into a handler on this thread.
    ///
    /// Lets a handler connected at several addresses tell which one a
    /// message was sent to. `None` outside of a dispatch.
    pub fn current_address(&self) -> Option<B::Address> {
        guard::current_address::<B::Address>(self.shared.uid)
    }

    /// Returns `true` while this thread is inside a dispatch of this bus.
    pub fn is_in_dispatch(&self) -> bool {
        guard::in_dispatch(self.shared.uid)
    }

    /// Copies the bus counters.
    pub fn stats(&self) -> BusStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Returns `true` if both handles refer to the same bus.
    pub fn same_bus(&self, other: &Bus<B>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
