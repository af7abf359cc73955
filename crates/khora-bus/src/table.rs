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

//! The address table: address keys mapped to ordered handler slots.

use crate::policy::{BusDefinition, HandlerPolicy};
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Weak;

/// Stable identity of one connection.
///
/// Identities are never reused within a bus and survive any reordering of
/// the handler lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Returns the raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One connected handler.
pub(crate) struct Slot<B: BusDefinition> {
    pub(crate) id: ConnectionId,
    order: i32,
    pub(crate) handler: Weak<B::Interface>,
}

impl<B: BusDefinition> Slot<B> {
    fn data_ptr(&self) -> *const () {
        self.handler.as_ptr() as *const ()
    }
}

/// A captured handler list for one address.
pub(crate) struct AddressSnapshot<B: BusDefinition> {
    pub(crate) address: B::Address,
    pub(crate) targets: Vec<(ConnectionId, Weak<B::Interface>)>,
}

/// Result of a successful insert.
pub(crate) struct Inserted<B: BusDefinition> {
    pub(crate) id: ConnectionId,
    /// Slots displaced under [`HandlerPolicy::Single`].
    pub(crate) replaced: Vec<Slot<B>>,
}

enum Addresses<K, V> {
    Hashed(AHashMap<K, V>),
    Ordered(BTreeMap<K, V>),
}

impl<K: Ord + std::hash::Hash + Eq, V: Default> Addresses<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        match self {
            Addresses::Hashed(map) => map.get(key),
            Addresses::Ordered(map) => map.get(key),
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self {
            Addresses::Hashed(map) => map.get_mut(key),
            Addresses::Ordered(map) => map.get_mut(key),
        }
    }

    fn get_or_default(&mut self, key: K) -> &mut V {
        match self {
            Addresses::Hashed(map) => map.entry(key).or_default(),
            Addresses::Ordered(map) => map.entry(key).or_default(),
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        match self {
            Addresses::Hashed(map) => map.remove(key),
            Addresses::Ordered(map) => map.remove(key),
        }
    }

    fn len(&self) -> usize {
        match self {
            Addresses::Hashed(map) => map.len(),
            Addresses::Ordered(map) => map.len(),
        }
    }

    fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        match self {
            Addresses::Hashed(map) => map.iter().for_each(|(k, v)| f(k, v)),
            Addresses::Ordered(map) => map.iter().for_each(|(k, v)| f(k, v)),
        }
    }
}

/// Handler slots of one address.
///
/// Removal leaves a tombstone: the slot stays in `slots` but its id is gone
/// from the table index. `dead` counts those slots; the list is compacted
/// once they make up more than half of it.
struct AddressEntry<B: BusDefinition> {
    slots: Vec<Slot<B>>,
    dead: usize,
}

impl<B: BusDefinition> Default for AddressEntry<B> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            dead: 0,
        }
    }
}

impl<B: BusDefinition> AddressEntry<B> {
    fn live(&self) -> usize {
        self.slots.len() - self.dead
    }
}

/// Maps address keys to the handlers connected there.
///
/// The table only ever holds `Weak` references; handlers are owned by
/// whoever connected them.
pub(crate) struct AddressTable<B: BusDefinition> {
    addresses: Addresses<B::Address, AddressEntry<B>>,
    index: AHashMap<ConnectionId, B::Address>,
    next_id: u64,
}

impl<B: BusDefinition> AddressTable<B> {
    pub(crate) fn new() -> Self {
        let addresses = if B::TRAITS.address_policy.is_ordered() {
            Addresses::Ordered(BTreeMap::new())
        } else {
            Addresses::Hashed(AHashMap::new())
        };
        Self {
            addresses,
            index: AHashMap::new(),
            next_id: 1,
        }
    }

    /// Registers `handler` at `address`.
    ///
    /// Returns `None` if this exact handler instance is already connected
    /// there. Under [`HandlerPolicy::Single`] any previous occupant is
    /// removed and handed back in [`Inserted::replaced`].
    pub(crate) fn insert(
        &mut self,
        address: B::Address,
        handler: Weak<B::Interface>,
        order: i32,
    ) -> Option<Inserted<B>> {
        let ptr = handler.as_ptr() as *const ();
        let policy = B::TRAITS.handler_policy;
        let index = &self.index;
        let entry = self.addresses.get_or_default(address.clone());

        if entry.slots.iter().any(|slot| {
            slot.data_ptr() == ptr
                && slot.handler.strong_count() > 0
                && index.contains_key(&slot.id)
        }) {
            return None;
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let replaced: Vec<Slot<B>> = if policy == HandlerPolicy::Single {
            entry.dead = 0;
            std::mem::take(&mut entry.slots)
                .into_iter()
                .filter(|slot| index.contains_key(&slot.id))
                .collect()
        } else {
            Vec::new()
        };

        let slot = Slot { id, order, handler };
        if policy.is_ordered() {
            // Insertion after every equal key keeps ties in connection order.
            let position = entry.slots.partition_point(|s| s.order <= order);
            entry.slots.insert(position, slot);
        } else {
            entry.slots.push(slot);
        }

        for old in &replaced {
            self.index.remove(&old.id);
        }
        self.index.insert(id, address);
        Some(Inserted { id, replaced })
    }

    /// Removes a connection in O(1) amortized time. Unknown or stale ids
    /// are ignored.
    ///
    /// ## Returns
    /// `true` if `id` was live.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(address) = self.index.remove(&id) else {
            return false;
        };
        let index = &self.index;
        let Some(entry) = self.addresses.get_mut(&address) else {
            return true;
        };

        entry.dead += 1;
        if entry.live() == 0 {
            self.addresses.remove(&address);
        } else if entry.dead * 2 > entry.slots.len() {
            entry.slots.retain(|slot| index.contains_key(&slot.id));
            entry.dead = 0;
        }
        true
    }

    pub(crate) fn is_live(&self, id: ConnectionId) -> bool {
        self.index.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn address_count(&self) -> usize {
        self.addresses.len()
    }

    pub(crate) fn count_at(&self, address: &B::Address) -> usize {
        self.addresses
            .get(address)
            .map_or(0, AddressEntry::live)
    }

    /// Returns `true` if the handler at `ptr` is connected anywhere, or at
    /// `address` when one is given.
    pub(crate) fn contains(&self, ptr: *const (), address: Option<&B::Address>) -> bool {
        let in_entry = |entry: &AddressEntry<B>| {
            entry
                .slots
                .iter()
                .any(|slot| slot.data_ptr() == ptr && self.index.contains_key(&slot.id))
        };
        match address {
            Some(address) => self.addresses.get(address).is_some_and(in_entry),
            None => {
                let mut found = false;
                self.addresses.for_each(|_, entry| found |= in_entry(entry));
                found
            }
        }
    }

    /// Captures the handler lists of one address, or of every address.
    pub(crate) fn snapshot(&self, address: Option<&B::Address>) -> Vec<AddressSnapshot<B>> {
        let capture = |address: &B::Address, entry: &AddressEntry<B>| AddressSnapshot {
            address: address.clone(),
            targets: entry
                .slots
                .iter()
                .filter(|slot| self.index.contains_key(&slot.id))
                .map(|slot| (slot.id, slot.handler.clone()))
                .collect(),
        };

        match address {
            Some(address) => self
                .addresses
                .get(address)
                .map(|entry| vec![capture(address, entry)])
                .unwrap_or_default(),
            None => {
                let mut snapshots = Vec::with_capacity(self.addresses.len());
                self.addresses
                    .for_each(|address, entry| snapshots.push(capture(address, entry)));
                snapshots
            }
        }
    }
}
