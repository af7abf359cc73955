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

//! # Khora Bus
//!
//! A policy-driven publish/subscribe engine for decoupled, in-process
//! communication between engine components.
//!
//! A bus type is declared once with a [`BusDefinition`]: its message
//! interface (a trait object), its address key, its lock and a const
//! [`BusTraits`] record choosing the handler cardinality
//! ([`HandlerPolicy`]) and addressing mode ([`AddressPolicy`]). Handlers
//! implement the interface and [`connect`](Bus::connect); callers
//! [`broadcast`](Bus::broadcast) to everyone, send an [`event`](Bus::event)
//! to one address, fold return values, or queue calls for a later
//! [`execute_queued_events`](Bus::execute_queued_events).
//!
//! Dispatch walks a snapshot of the handler lists taken under the table
//! lock, so handlers may connect, disconnect or dispatch again from inside
//! their callbacks.

#![warn(missing_docs)]

pub mod aggregate;
mod bus;
mod connection;
mod dispatch;
mod error;
mod guard;
pub mod lock;
mod policy;
mod queue;
mod registry;
mod stats;
mod table;

pub use self::bus::Bus;
pub use self::connection::{Connection, MultiConnection};
pub use self::error::{BusError, BusResult};
pub use self::lock::{LockPolicy, Locked, SingleThreaded};
pub use self::policy::{AddressPolicy, BusDefinition, BusTraits, HandlerPolicy};
pub use self::queue::QueueSender;
pub use self::registry::BusRegistry;
pub use self::stats::BusStatsSnapshot;
pub use self::table::ConnectionId;
