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

//! The buses of the demo and the components that listen on them.

use khora_bus::{
    AddressPolicy, Bus, BusDefinition, BusTraits, HandlerPolicy, Locked, SingleThreaded,
};
use std::cell::Cell;
use std::sync::Mutex;

pub type EntityId = u64;

// --- Frame lifecycle: plain notifications ---

pub trait LifecycleNotifications {
    fn on_tick(&self, frame: u32);
    fn on_shutdown(&self);
}

pub struct LifecycleBus;

impl BusDefinition for LifecycleBus {
    type Interface = dyn LifecycleNotifications;
    type Address = ();
    type Lock = SingleThreaded;

    fn name() -> &'static str {
        "LifecycleBus"
    }
}

// --- Transforms: addressed, thread-fed through the queue ---

pub trait TransformNotifications: Send + Sync {
    fn on_moved(&self, position: [f32; 3]);
}

pub struct TransformBus;

impl BusDefinition for TransformBus {
    type Interface = dyn TransformNotifications;
    type Address = EntityId;
    type Lock = Locked;
    const TRAITS: BusTraits = BusTraits::DEFAULT
        .with_address_policy(AddressPolicy::ById)
        .with_function_queue();

    fn name() -> &'static str {
        "TransformBus"
    }
}

// --- Health: one provider per entity, queried for results ---

pub trait HealthRequests {
    fn health(&self) -> u32;
    fn apply_damage(&self, amount: u32) -> Result<(), String>;
}

pub struct HealthBus;

impl BusDefinition for HealthBus {
    type Interface = dyn HealthRequests;
    type Address = EntityId;
    type Lock = SingleThreaded;
    const TRAITS: BusTraits = BusTraits::DEFAULT
        .with_handler_policy(HandlerPolicy::Single)
        .with_address_policy(AddressPolicy::ByIdAndOrdered);

    fn name() -> &'static str {
        "HealthBus"
    }
}

// --- Input: layered handlers, highest priority first ---

pub trait InputLayer {
    fn priority(&self) -> i32;
    fn handle_key(&self, key: char) -> bool;
}

pub struct InputBus;

impl BusDefinition for InputBus {
    type Interface = dyn InputLayer;
    type Address = ();
    type Lock = SingleThreaded;
    const TRAITS: BusTraits =
        BusTraits::DEFAULT.with_handler_policy(HandlerPolicy::MultipleAndOrdered);

    fn name() -> &'static str {
        "InputBus"
    }

    fn handler_order(handler: &Self::Interface) -> i32 {
        -handler.priority()
    }

    fn on_connected(_bus: &Bus<Self>, handler: &Self::Interface, _address: &()) {
        log::debug!("InputBus: layer with priority {} joined.", handler.priority());
    }
}

// --- Components ---

/// Health pool of one entity.
pub struct Health {
    pub id: EntityId,
    current: Cell<u32>,
}

impl Health {
    pub fn new(id: EntityId, current: u32) -> Self {
        Self {
            id,
            current: Cell::new(current),
        }
    }
}

impl HealthRequests for Health {
    fn health(&self) -> u32 {
        self.current.get()
    }

    fn apply_damage(&self, amount: u32) -> Result<(), String> {
        if self.current.get() == 0 {
            return Err(format!("entity {} is already dead", self.id));
        }
        self.current.set(self.current.get().saturating_sub(amount));
        Ok(())
    }
}

/// Follows a set of entities and remembers where it last saw each.
#[derive(Default)]
pub struct Camera {
    sightings: Mutex<Vec<(EntityId, [f32; 3])>>,
    bus: Mutex<Option<Bus<TransformBus>>>,
}

impl Camera {
    pub fn attach(&self, bus: &Bus<TransformBus>) {
        if let Ok(mut slot) = self.bus.lock() {
            *slot = Some(bus.clone());
        }
    }

    pub fn sightings(&self) -> usize {
        self.sightings.lock().map_or(0, |s| s.len())
    }
}

impl TransformNotifications for Camera {
    fn on_moved(&self, position: [f32; 3]) {
        let entity = self
            .bus
            .lock()
            .ok()
            .and_then(|bus| bus.as_ref().and_then(Bus::current_address));
        if let (Some(entity), Ok(mut sightings)) = (entity, self.sightings.lock()) {
            log::trace!("Camera: entity {entity} moved to {position:?}.");
            sightings.push((entity, position));
        }
    }
}

/// Counts frames.
#[derive(Default)]
pub struct FrameCounter {
    pub frames: Cell<u32>,
}

impl LifecycleNotifications for FrameCounter {
    fn on_tick(&self, frame: u32) {
        self.frames.set(frame + 1);
    }

    fn on_shutdown(&self) {
        log::info!("FrameCounter: {} frame(s) simulated.", self.frames.get());
    }
}

/// An input layer that consumes a fixed set of keys.
pub struct KeyLayer {
    pub name: &'static str,
    pub priority: i32,
    pub keys: &'static [char],
}

impl InputLayer for KeyLayer {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn handle_key(&self, key: char) -> bool {
        let consumed = self.keys.contains(&key);
        if consumed {
            log::debug!("Input layer '{}' consumed '{key}'.", self.name);
        }
        consumed
    }
}
