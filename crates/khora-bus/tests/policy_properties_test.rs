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

use khora_bus::{AddressPolicy, Bus, BusDefinition, BusTraits, HandlerPolicy, SingleThreaded};
use std::sync::{Arc, Mutex};

// --- SHARED FIXTURES ---

type CallLog = Arc<Mutex<Vec<(&'static str, i32)>>>;

trait InputNotifications: Send + Sync {
    fn on_input(&self, value: i32);
}

struct Listener {
    name: &'static str,
    calls: CallLog,
}

impl Listener {
    fn new(name: &'static str, calls: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: Arc::clone(calls),
        })
    }
}

impl InputNotifications for Listener {
    fn on_input(&self, value: i32) {
        self.calls.lock().unwrap().push((self.name, value));
    }
}

fn names(calls: &CallLog) -> Vec<&'static str> {
    calls.lock().unwrap().iter().map(|(name, _)| *name).collect()
}

/// One global address, one handler.
struct ExclusiveBus;

impl BusDefinition for ExclusiveBus {
    type Interface = dyn InputNotifications;
    type Address = ();
    type Lock = SingleThreaded;
    const TRAITS: BusTraits = BusTraits::DEFAULT.with_handler_policy(HandlerPolicy::Single);
}

/// One global address, any number of handlers.
struct BroadcastBus;

impl BusDefinition for BroadcastBus {
    type Interface = dyn InputNotifications;
    type Address = ();
    type Lock = SingleThreaded;
}

/// Handlers grouped by a numeric id.
struct ChannelBus;

impl BusDefinition for ChannelBus {
    type Interface = dyn InputNotifications;
    type Address = u32;
    type Lock = SingleThreaded;
    const TRAITS: BusTraits = BusTraits::DEFAULT.with_address_policy(AddressPolicy::ById);
}

#[test]
fn test_exclusive_bus_keeps_only_the_latest_handler() {
    // --- 1. ARRANGE ---
    let calls = CallLog::default();
    let bus = Bus::<ExclusiveBus>::new().unwrap();
    let first = Listener::new("first", &calls);
    let second = Listener::new("second", &calls);

    // --- 2. ACT ---
    let old = bus.connect(first.clone(), ()).unwrap();
    let new = bus.connect(second.clone(), ()).unwrap();

    // --- 3. ASSERT ---
    assert_eq!(bus.handler_count(), 1);
    assert!(!bus.is_connected(&*first));
    assert!(bus.is_connected(&*second));
    assert!(!old.is_connected());
    assert!(new.is_connected());
    assert_eq!(bus.stats().replaced, 1);

    bus.broadcast(|h| h.on_input(1));
    assert_eq!(names(&calls), vec!["second"]);
}

#[test]
fn test_multiple_handlers_called_once_in_connection_order() {
    let calls = CallLog::default();
    let bus = Bus::<BroadcastBus>::new().unwrap();
    let listeners: Vec<Arc<Listener>> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|name| Listener::new(name, &calls))
        .collect();
    let _connections: Vec<_> = listeners
        .iter()
        .map(|l| bus.connect(l.clone(), ()).unwrap())
        .collect();

    bus.broadcast(|h| h.on_input(7));

    assert_eq!(names(&calls), vec!["a", "b", "c", "d", "e"]);
    assert!(calls.lock().unwrap().iter().all(|(_, v)| *v == 7));
}

#[test]
fn test_connect_then_disconnect_restores_empty_bus() {
    let calls = CallLog::default();
    let bus = Bus::<BroadcastBus>::new().unwrap();
    let listener = Listener::new("solo", &calls);

    let connection = bus.connect(listener.clone(), ()).unwrap();
    assert!(bus.is_connected(&*listener));
    assert!(bus.disconnect(&connection));

    assert!(!bus.is_connected(&*listener));
    assert!(!bus.has_handlers());
    assert_eq!(bus.address_count(), 0);
    bus.broadcast(|h| h.on_input(1));
    assert!(calls.lock().unwrap().is_empty());

    // A second disconnect is a no-op, and so is the drop at scope end.
    assert!(!bus.disconnect(&connection));
    assert!(!connection.disconnect());
}

#[test]
fn test_event_reaches_only_its_address_in_order() {
    // --- 1. ARRANGE ---
    // Three handlers at addresses {1, 2, 2}.
    let calls = CallLog::default();
    let bus = Bus::<ChannelBus>::new().unwrap();
    let at_one = Listener::new("at-1", &calls);
    let first_at_two = Listener::new("first-at-2", &calls);
    let second_at_two = Listener::new("second-at-2", &calls);
    let _c1 = bus.connect(at_one.clone(), 1).unwrap();
    let _c2 = bus.connect(first_at_two.clone(), 2).unwrap();
    let _c3 = bus.connect(second_at_two.clone(), 2).unwrap();

    // --- 2. ACT ---
    bus.event(&2, |h| h.on_input(42));

    // --- 3. ASSERT ---
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("first-at-2", 42), ("second-at-2", 42)]
    );
    assert_eq!(bus.handler_count_at(&1), 1);
    assert_eq!(bus.handler_count_at(&2), 2);
}

#[test]
fn test_event_without_listener_is_silent() {
    let calls = CallLog::default();
    let bus = Bus::<ChannelBus>::new().unwrap();
    let listener = Listener::new("elsewhere", &calls);
    let _c = bus.connect(listener.clone(), 3).unwrap();

    bus.event(&4, |h| h.on_input(1));

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(bus.stats().events, 1);
    assert_eq!(bus.stats().handler_calls, 0);
}

#[test]
fn test_broadcast_on_addressed_bus_visits_every_address() {
    let calls = CallLog::default();
    let bus = Bus::<ChannelBus>::new().unwrap();
    let listeners: Vec<_> = (0..4)
        .map(|i| (i, Listener::new(["w", "x", "y", "z"][i as usize], &calls)))
        .collect();
    let _connections: Vec<_> = listeners
        .iter()
        .map(|(address, l)| bus.connect(l.clone(), *address).unwrap())
        .collect();

    bus.broadcast(|h| h.on_input(0));

    let mut seen = names(&calls);
    seen.sort_unstable();
    assert_eq!(seen, vec!["w", "x", "y", "z"]);
}
