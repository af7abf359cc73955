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

//! Per-thread record of in-flight dispatches.
//!
//! Every dispatch pushes a frame for its bus and pops it when the
//! [`DispatchFrame`] guard drops, including while a handler panic unwinds.
//! Handlers use the stack to learn which address they are being called for.

use std::any::Any;
use std::cell::RefCell;

struct Frame {
    bus: u64,
    address: Option<Box<dyn Any>>,
}

thread_local! {
    static DISPATCH_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// RAII marker of one dispatch on the current thread.
pub(crate) struct DispatchFrame {
    bus: u64,
    depth: usize,
}

impl DispatchFrame {
    pub(crate) fn enter(bus: u64) -> Self {
        let depth = DISPATCH_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Frame { bus, address: None });
            stack.len()
        });
        Self { bus, depth }
    }

    /// Records the address whose handlers are about to be called.
    pub(crate) fn set_address<A: Any + Clone>(&self, address: &A) {
        DISPATCH_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().get_mut(self.depth - 1) {
                debug_assert_eq!(frame.bus, self.bus);
                frame.address = Some(Box::new(address.clone()));
            }
        });
    }
}

impl Drop for DispatchFrame {
    fn drop(&mut self) {
        let _ = DISPATCH_STACK.try_with(|stack| {
            stack.borrow_mut().truncate(self.depth - 1);
        });
    }
}

/// Address of the innermost in-flight dispatch of `bus` on this thread.
pub(crate) fn current_address<A: Any + Clone>(bus: u64) -> Option<A> {
    DISPATCH_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|frame| frame.bus == bus)
            .and_then(|frame| frame.address.as_ref())
            .and_then(|address| address.downcast_ref::<A>())
            .cloned()
    })
}

/// Returns `true` if `bus` is dispatching on this thread.
pub(crate) fn in_dispatch(bus: u64) -> bool {
    DISPATCH_STACK.with(|stack| stack.borrow().iter().any(|frame| frame.bus == bus))
}
