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

//! Policy descriptors fixed per bus type.
//!
//! A bus type is declared by implementing [`BusDefinition`] on a marker type.
//! The definition names the message interface, the address key, the lock and
//! a const [`BusTraits`] record. The record is validated once, when the bus is
//! constructed; incoherent combinations are rejected rather than coerced.

use crate::bus::Bus;
use crate::error::{BusError, BusResult};
use crate::lock::LockPolicy;
use std::any::TypeId;
use std::fmt::Debug;
use std::hash::Hash;

/// How many handlers may share one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HandlerPolicy {
    /// At most one handler per address. A later connect replaces the earlier one.
    Single,
    /// Any number of handlers, called in connection order.
    Multiple,
    /// Any number of handlers, called by ascending [`BusDefinition::handler_order`],
    /// ties broken by connection order.
    MultipleAndOrdered,
}

/// How handlers are grouped for targeted dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressPolicy {
    /// One global address. The address type must be `()`.
    Single,
    /// Handlers are grouped by an id; addresses are visited in table order.
    ById,
    /// Handlers are grouped by an id; addresses are visited in ascending key order.
    ByIdAndOrdered,
}

impl HandlerPolicy {
    /// Returns `true` if several handlers may share one address.
    pub const fn allows_multiple(self) -> bool {
        !matches!(self, HandlerPolicy::Single)
    }

    /// Returns `true` if handlers are kept sorted by their order key.
    pub const fn is_ordered(self) -> bool {
        matches!(self, HandlerPolicy::MultipleAndOrdered)
    }
}

impl AddressPolicy {
    /// Returns `true` if the policy uses real address keys.
    pub const fn is_addressed(self) -> bool {
        !matches!(self, AddressPolicy::Single)
    }

    /// Returns `true` if addresses are iterated in key order.
    pub const fn is_ordered(self) -> bool {
        matches!(self, AddressPolicy::ByIdAndOrdered)
    }
}

/// The configuration record of a bus type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusTraits {
    /// Handler cardinality per address.
    pub handler_policy: HandlerPolicy,
    /// Addressing mode.
    pub address_policy: AddressPolicy,
    /// Whether the deferred event queue is available.
    pub event_queue: bool,
    /// Whether arbitrary closures may be queued. Requires `event_queue`.
    pub function_queue: bool,
}

impl BusTraits {
    /// Multiple handlers on a single global address, no queue.
    pub const DEFAULT: BusTraits = BusTraits {
        handler_policy: HandlerPolicy::Multiple,
        address_policy: AddressPolicy::Single,
        event_queue: false,
        function_queue: false,
    };

    /// Returns a copy with the given handler policy.
    pub const fn with_handler_policy(self, handler_policy: HandlerPolicy) -> Self {
        BusTraits {
            handler_policy,
            ..self
        }
    }

    /// Returns a copy with the given address policy.
    pub const fn with_address_policy(self, address_policy: AddressPolicy) -> Self {
        BusTraits {
            address_policy,
            ..self
        }
    }

    /// Returns a copy with the event queue enabled.
    pub const fn with_event_queue(self) -> Self {
        BusTraits {
            event_queue: true,
            ..self
        }
    }

    /// Returns a copy with the event queue and function queuing enabled.
    pub const fn with_function_queue(self) -> Self {
        BusTraits {
            event_queue: true,
            function_queue: true,
            ..self
        }
    }

    /// Checks that the traits are coherent for the address type `A`.
    ///
    /// ## Arguments
    /// * `bus` - The bus name used in the error.
    ///
    /// ## Returns
    /// `Err(BusError::Configuration)` describing the first violated rule.
    pub fn validate<A: 'static>(&self, bus: &'static str) -> BusResult<()> {
        let unit_address = TypeId::of::<A>() == TypeId::of::<()>();
        let reason = if !self.address_policy.is_addressed() && !unit_address {
            Some("single addressing requires the unit address type `()`")
        } else if self.address_policy.is_addressed() && unit_address {
            Some("addressed policies require a real address key type")
        } else if self.function_queue && !self.event_queue {
            Some("function queuing requires the event queue")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BusError::Configuration { bus, reason }),
            None => Ok(()),
        }
    }
}

impl Default for BusTraits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Declares a bus type.
///
/// Implement this on an empty marker type. The message interface is usually
/// a trait object; handlers implement that trait and are connected as
/// `Arc<dyn Trait>`. Interfaces of buses shared across threads need
/// `Send + Sync` supertraits.
///
/// # Example
///
/// ```rust
/// use khora_bus::{Bus, BusDefinition, BusTraits, SingleThreaded};
///
/// trait TickNotifications {
///     fn on_tick(&self, delta: f32);
/// }
///
/// struct TickBus;
///
/// impl BusDefinition for TickBus {
///     type Interface = dyn TickNotifications;
///     type Address = ();
///     type Lock = SingleThreaded;
///     const TRAITS: BusTraits = BusTraits::DEFAULT.with_event_queue();
/// }
///
/// let bus = Bus::<TickBus>::new().unwrap();
/// bus.broadcast(|h| h.on_tick(0.016));
/// ```
pub trait BusDefinition: Sized + 'static {
    /// The message interface handlers implement.
    type Interface: ?Sized + 'static;
    /// The address key. `()` for [`AddressPolicy::Single`].
    type Address: Clone + Eq + Hash + Ord + Debug + 'static;
    /// The lock guarding the address table.
    type Lock: LockPolicy;

    /// The policy record of this bus.
    const TRAITS: BusTraits = BusTraits::DEFAULT;

    /// Name used in diagnostics.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Order key of a handler under [`HandlerPolicy::MultipleAndOrdered`].
    ///
    /// Evaluated once, at connect time. Lower values are called first.
    fn handler_order(_handler: &Self::Interface) -> i32 {
        0
    }

    /// Called after every successful connect, with the table lock released.
    ///
    /// Lets a bus bring a late joiner up to date, e.g. by replaying the
    /// current state to it.
    fn on_connected(_bus: &Bus<Self>, _handler: &Self::Interface, _address: &Self::Address) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_traits_are_coherent_for_unit_address() {
        assert!(BusTraits::DEFAULT.validate::<()>("Default").is_ok());
    }

    #[test]
    fn single_address_rejects_keyed_address() {
        let err = BusTraits::DEFAULT.validate::<u64>("Keyed").unwrap_err();
        assert!(matches!(err, BusError::Configuration { bus: "Keyed", .. }));
    }

    #[test]
    fn by_id_requires_a_key() {
        let traits = BusTraits::DEFAULT.with_address_policy(AddressPolicy::ById);
        assert!(traits.validate::<()>("Unit").is_err());
        assert!(traits.validate::<u32>("Keyed").is_ok());

        let ordered = traits.with_address_policy(AddressPolicy::ByIdAndOrdered);
        assert!(ordered.validate::<String>("Ordered").is_ok());
    }

    #[test]
    fn single_handler_by_id_is_legal() {
        let traits = BusTraits::DEFAULT
            .with_handler_policy(HandlerPolicy::Single)
            .with_address_policy(AddressPolicy::ById);
        assert!(traits.validate::<u32>("Requests").is_ok());
    }

    #[test]
    fn function_queue_without_event_queue_is_rejected() {
        let traits = BusTraits {
            function_queue: true,
            ..BusTraits::DEFAULT
        };
        assert!(traits.validate::<()>("Broken").is_err());
        assert!(BusTraits::DEFAULT
            .with_function_queue()
            .validate::<()>("Fine")
            .is_ok());
    }

    #[test]
    fn policy_predicates() {
        assert!(!HandlerPolicy::Single.allows_multiple());
        assert!(HandlerPolicy::MultipleAndOrdered.allows_multiple());
        assert!(HandlerPolicy::MultipleAndOrdered.is_ordered());
        assert!(!AddressPolicy::Single.is_addressed());
        assert!(AddressPolicy::ByIdAndOrdered.is_ordered());
    }
}
