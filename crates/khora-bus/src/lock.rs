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

//! Locking policies guarding a bus's address table.
//!
//! The lock is chosen per bus type through [`BusDefinition::Lock`](crate::BusDefinition::Lock).
//! Access is closure-scoped so the guard can never outlive a table mutation
//! or a snapshot; handler callbacks always run with the lock released.

use std::cell::RefCell;
use std::sync::{Mutex, PoisonError};

/// Scoped exclusive access to a value.
pub trait TableLock<T> {
    /// Wraps `value` in the lock.
    fn new(value: T) -> Self;

    /// Runs `f` with exclusive access to the protected value.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

/// Compile-time choice of the table lock.
pub trait LockPolicy: 'static {
    /// The lock type wrapping a table of type `T`.
    type Lock<T>: TableLock<T>;
}

/// No locking: the bus is owned and driven by a single thread.
///
/// Buses using this policy are `!Sync`. Their deferred queue can still be fed
/// from other threads through a [`QueueSender`](crate::QueueSender).
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleThreaded;

/// A per-bus mutex serializing table mutations and dispatch snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct Locked;

impl LockPolicy for SingleThreaded {
    type Lock<T> = LocalLock<T>;
}

impl LockPolicy for Locked {
    type Lock<T> = MutexLock<T>;
}

/// [`TableLock`] backed by a `RefCell`.
#[derive(Debug)]
pub struct LocalLock<T>(RefCell<T>);

impl<T> TableLock<T> for LocalLock<T> {
    fn new(value: T) -> Self {
        Self(RefCell::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

/// [`TableLock`] backed by a `std::sync::Mutex`.
///
/// A poisoned mutex is recovered: the table is only ever mutated inside
/// short, non-panicking sections, so its contents stay coherent.
#[derive(Debug)]
pub struct MutexLock<T>(Mutex<T>);

impl<T> TableLock<T> for MutexLock<T> {
    fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
