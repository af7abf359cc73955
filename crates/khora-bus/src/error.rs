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

//! Defines the error type shared by every bus operation.

use thiserror::Error;

/// Errors produced by bus construction, connection management and queueing.
///
/// Dispatching to an address nobody listens on is *not* an error; it is the
/// normal "nobody is listening" case and silently succeeds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus definition combines policies that cannot work together.
    #[error("Invalid configuration for bus '{bus}': {reason}")]
    Configuration {
        /// Name of the offending bus definition.
        bus: &'static str,
        /// Which rule the traits violate.
        reason: &'static str,
    },
    /// The same handler instance is already connected at this address.
    #[error("Handler is already connected to bus '{bus}' at address {address}")]
    AlreadyConnected {
        /// Name of the bus.
        bus: &'static str,
        /// Debug rendering of the address.
        address: String,
    },
    /// The handler behind a multi-connection has been dropped.
    #[error("Handler for bus '{bus}' has been dropped")]
    HandlerDropped {
        /// Name of the bus.
        bus: &'static str,
    },
    /// Queueing was requested on a bus whose traits disable the event queue.
    #[error("Bus '{bus}' does not enable the event queue")]
    QueueDisabled {
        /// Name of the bus.
        bus: &'static str,
    },
    /// Arbitrary function queueing was requested but not allowed by the traits.
    #[error("Bus '{bus}' does not allow function queuing")]
    FunctionQueueDisabled {
        /// Name of the bus.
        bus: &'static str,
    },
    /// A bus of this type is already present in the registry.
    #[error("Bus '{bus}' is already registered")]
    AlreadyRegistered {
        /// Name of the bus.
        bus: &'static str,
    },
    /// No bus of this type is present in the registry.
    #[error("Bus '{bus}' is not registered")]
    NotRegistered {
        /// Name of the bus.
        bus: &'static str,
    },
    /// Teardown was requested while handlers are still connected.
    #[error("Bus '{bus}' still has {count} connected handler(s)")]
    HandlersStillConnected {
        /// Name of the bus.
        bus: &'static str,
        /// Number of live connections.
        count: usize,
    },
}

/// A specialized `Result` type for bus operations.
pub type BusResult<T> = Result<T, BusError>;
