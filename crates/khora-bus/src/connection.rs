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

//! Scoped subscription handles.

use crate::bus::{Bus, Shared};
use crate::error::{BusError, BusResult};
use crate::policy::BusDefinition;
use crate::table::ConnectionId;
use std::fmt;
use std::sync::{Arc, Weak};

/// The live binding of one handler to one address.
///
/// Dropping the connection disconnects the handler. Once a disconnect has
/// returned, no dispatch started afterwards reaches the handler. A
/// connection displaced by a replacement, or whose bus is gone, is stale:
/// every operation on it is an inert no-op.
#[must_use = "dropping a Connection disconnects the handler immediately"]
pub struct Connection<B: BusDefinition> {
    id: ConnectionId,
    address: B::Address,
    bus: Weak<Shared<B>>,
}

impl<B: BusDefinition> Connection<B> {
    pub(crate) fn new(id: ConnectionId, address: B::Address, bus: Weak<Shared<B>>) -> Self {
        Self { id, address, bus }
    }

    /// The stable identity of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The address this connection was made at.
    pub fn address(&self) -> &B::Address {
        &self.address
    }

    /// Returns `true` while the binding is still registered.
    pub fn is_connected(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|shared| shared.is_live(self.id))
    }

    /// Removes the binding. Safe to call from inside the handler's own callback.
    ///
    /// ## Returns
    /// `true` if this call removed the binding, `false` if it was already gone.
    pub fn disconnect(&self) -> bool {
        match self.bus.upgrade() {
            Some(shared) => shared.remove(self.id),
            None => false,
        }
    }

    /// Returns a handle to the bus, if it still exists.
    pub fn bus(&self) -> Option<Bus<B>> {
        self.bus.upgrade().map(Bus::from_shared)
    }

    pub(crate) fn belongs_to(&self, bus: &Bus<B>) -> bool {
        std::ptr::eq(self.bus.as_ptr(), Arc::as_ptr(&bus.shared))
    }
}

impl<B: BusDefinition> Drop for Connection<B> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<B: BusDefinition> fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("bus", &B::name())
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}

/// One handler bound at several addresses of the same bus.
///
/// Each address gets its own [`Connection`]; dropping the multi-connection
/// disconnects all of them.
pub struct MultiConnection<B: BusDefinition> {
    bus: Bus<B>,
    handler: Weak<B::Interface>,
    connections: Vec<Connection<B>>,
}

impl<B: BusDefinition> MultiConnection<B> {
    pub(crate) fn new(bus: Bus<B>, handler: Weak<B::Interface>) -> Self {
        Self {
            bus,
            handler,
            connections: Vec::new(),
        }
    }

    /// Connects the handler at `address`. Connecting twice at the same
    /// address is a no-op.
    pub fn connect(&mut self, address: B::Address) -> BusResult<()> {
        self.connections.retain(Connection::is_connected);
        if self.is_connected_at(&address) {
            return Ok(());
        }

        let handler = self
            .handler
            .upgrade()
            .ok_or(BusError::HandlerDropped { bus: B::name() })?;
        let connection = self.bus.connect(handler, address)?;
        self.connections.push(connection);
        Ok(())
    }

    /// Disconnects the handler from `address`.
    ///
    /// ## Returns
    /// `true` if a live binding at `address` was removed.
    pub fn disconnect(&mut self, address: &B::Address) -> bool {
        match self
            .connections
            .iter()
            .position(|connection| connection.address() == address)
        {
            Some(position) => self.connections.remove(position).disconnect(),
            None => false,
        }
    }

    /// Disconnects every address. Returns how many live bindings were removed.
    pub fn disconnect_all(&mut self) -> usize {
        self.connections
            .drain(..)
            .filter(|connection| connection.disconnect())
            .count()
    }

    /// Returns `true` if the handler is currently bound at `address`.
    pub fn is_connected_at(&self, address: &B::Address) -> bool {
        self.connections
            .iter()
            .any(|connection| connection.address() == address && connection.is_connected())
    }

    /// Addresses with a live binding.
    pub fn addresses(&self) -> Vec<B::Address> {
        self.connections
            .iter()
            .filter(|connection| connection.is_connected())
            .map(|connection| connection.address().clone())
            .collect()
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.connections
            .iter()
            .filter(|connection| connection.is_connected())
            .count()
    }

    /// Returns `true` if the handler is bound nowhere.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B: BusDefinition> fmt::Debug for MultiConnection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiConnection")
            .field("bus", &B::name())
            .field("connections", &self.connections)
            .finish()
    }
}
