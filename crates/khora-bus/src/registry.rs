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

//! An explicitly owned, type-keyed home for the buses of one application.
//!
//! The [`BusRegistry`] replaces implicit process-wide bus globals. Ordering
//! rules:
//!
//! - a bus is [`register`](BusRegistry::register)ed before anyone connects to it;
//! - it is [`unregister`](BusRegistry::unregister)ed only after its last handler
//!   disconnected;
//! - [`shutdown`](BusRegistry::shutdown) tears everything down at once and
//!   reports buses that still had handlers.
//!
//! Handles returned by the registry are clones. When the registry lets go of
//! a bus, connections stay live while any other `Bus` handle exists and go
//! inert once the last one is dropped.

use crate::bus::Bus;
use crate::error::{BusError, BusResult};
use crate::policy::BusDefinition;
use ahash::AHashMap;
use std::any::{Any, TypeId};

struct Entry {
    name: &'static str,
    bus: Box<dyn Any>,
    handler_count: fn(&dyn Any) -> usize,
}

fn handler_count_of<B: BusDefinition>(bus: &dyn Any) -> usize {
    bus.downcast_ref::<Bus<B>>()
        .map_or(0, |bus| bus.handler_count())
}

/// A registry of buses keyed by their definition type.
///
/// # Example
///
/// ```rust
/// use khora_bus::{BusDefinition, BusRegistry, SingleThreaded};
///
/// trait Shutdown {
///     fn on_shutdown(&self);
/// }
///
/// struct ShutdownBus;
///
/// impl BusDefinition for ShutdownBus {
///     type Interface = dyn Shutdown;
///     type Address = ();
///     type Lock = SingleThreaded;
/// }
///
/// let mut registry = BusRegistry::new();
/// registry.register::<ShutdownBus>().unwrap();
///
/// let bus = registry.get::<ShutdownBus>().unwrap();
/// bus.broadcast(|h| h.on_shutdown());
/// ```
#[derive(Default)]
pub struct BusRegistry {
    buses: AHashMap<TypeId, Entry>,
}

impl BusRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buses: AHashMap::new(),
        }
    }

    /// Creates and registers the bus for `B`.
    ///
    /// ## Returns
    /// A handle to the new bus, `BusError::Configuration` if its traits are
    /// incoherent, or `BusError::AlreadyRegistered`.
    pub fn register<B: BusDefinition>(&mut self) -> BusResult<Bus<B>> {
        if self.contains::<B>() {
            return Err(BusError::AlreadyRegistered { bus: B::name() });
        }
        let bus = Bus::<B>::new()?;
        self.buses.insert(
            TypeId::of::<B>(),
            Entry {
                name: B::name(),
                bus: Box::new(bus.clone()),
                handler_count: handler_count_of::<B>,
            },
        );
        log::info!("BusRegistry: registered '{}'.", B::name());
        Ok(bus)
    }

    /// Returns a handle to the bus for `B`, if registered.
    #[must_use]
    pub fn get<B: BusDefinition>(&self) -> Option<Bus<B>> {
        self.buses
            .get(&TypeId::of::<B>())
            .and_then(|entry| entry.bus.downcast_ref::<Bus<B>>())
            .cloned()
    }

    /// Returns the bus for `B`, registering it first if needed.
    pub fn get_or_register<B: BusDefinition>(&mut self) -> BusResult<Bus<B>> {
        match self.get::<B>() {
            Some(bus) => Ok(bus),
            None => self.register::<B>(),
        }
    }

    /// Returns `true` if a bus for `B` is registered.
    #[must_use]
    pub fn contains<B: BusDefinition>(&self) -> bool {
        self.buses.contains_key(&TypeId::of::<B>())
    }

    /// Removes the bus for `B`.
    ///
    /// ## Returns
    /// `BusError::NotRegistered`, or `BusError::HandlersStillConnected` if
    /// handlers are still connected; the bus stays registered in that case.
    pub fn unregister<B: BusDefinition>(&mut self) -> BusResult<()> {
        let bus = self
            .get::<B>()
            .ok_or(BusError::NotRegistered { bus: B::name() })?;

        let count = bus.handler_count();
        if count > 0 {
            return Err(BusError::HandlersStillConnected {
                bus: B::name(),
                count,
            });
        }

        let pending = bus.clear_queued_events();
        if pending > 0 {
            log::warn!(
                "BusRegistry: '{}' unregistered with {pending} queued call(s) discarded.",
                B::name()
            );
        }
        self.buses.remove(&TypeId::of::<B>());
        log::info!("BusRegistry: unregistered '{}'.", B::name());
        Ok(())
    }

    /// Number of registered buses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buses.len()
    }

    /// Returns `true` if no bus is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    /// Names of the registered buses, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.buses.values().map(|entry| entry.name).collect();
        names.sort_unstable();
        names
    }

    /// Drops every bus, logging those that still had connected handlers.
    ///
    /// ## Returns
    /// The number of buses that were torn down with handlers still connected.
    pub fn shutdown(mut self) -> usize {
        let mut leaked = 0;
        for (_, entry) in self.buses.drain() {
            let count = (entry.handler_count)(entry.bus.as_ref());
            if count > 0 {
                leaked += 1;
                log::warn!(
                    "BusRegistry: '{}' shut down with {count} handler(s) still connected.",
                    entry.name
                );
            }
        }
        log::info!("BusRegistry shut down.");
        leaked
    }
}
