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

//! The deferred queue: "queue now, run later" dispatch.
//!
//! Queued entries are boxed closures carried by an unbounded flume channel.
//! The channel has its own lock, independent of the address table, so any
//! thread may enqueue through a [`QueueSender`] even when the bus itself is
//! single-threaded. The owner drains the queue with
//! [`Bus::execute_queued_events`], typically once per tick.

use crate::bus::Bus;
use crate::error::{BusError, BusResult};
use crate::policy::BusDefinition;
use crate::stats::BusStats;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type QueuedCall<B> = Box<dyn FnOnce(&Bus<B>) + Send>;

/// Channel ends owned by a bus.
///
/// `carry` holds entries of an interrupted drain. They were queued before
/// anything still in the channel, so they run first.
pub(crate) struct EventQueue<B: BusDefinition> {
    sender: flume::Sender<QueuedCall<B>>,
    receiver: flume::Receiver<QueuedCall<B>>,
    carry: Mutex<VecDeque<QueuedCall<B>>>,
}

impl<B: BusDefinition> EventQueue<B> {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            carry: Mutex::new(VecDeque::new()),
        }
    }

    fn carry(&self) -> MutexGuard<'_, VecDeque<QueuedCall<B>>> {
        self.carry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the current generation: carried entries, then the channel.
    fn take_batch(&self) -> VecDeque<QueuedCall<B>> {
        let mut batch = std::mem::take(&mut *self.carry());
        batch.extend(self.receiver.drain());
        batch
    }

    fn len(&self) -> usize {
        self.carry().len() + self.receiver.len()
    }
}

/// The undrained part of a batch. Whatever is left when it drops, including
/// during a panic, goes back in front of the carry-over list.
struct PendingBatch<'a, B: BusDefinition> {
    queue: &'a EventQueue<B>,
    calls: VecDeque<QueuedCall<B>>,
}

impl<B: BusDefinition> Drop for PendingBatch<'_, B> {
    fn drop(&mut self) {
        if self.calls.is_empty() {
            return;
        }
        log::warn!(
            "{}: queue drain interrupted, {} call(s) kept for the next drain.",
            B::name(),
            self.calls.len()
        );
        let mut carry = self.queue.carry();
        // Anything carried meanwhile by a nested drain was queued later.
        let later = std::mem::take(&mut *carry);
        carry.extend(self.calls.drain(..));
        carry.extend(later);
    }
}

/// A cloneable, thread-safe handle for feeding a bus's deferred queue.
///
/// The sender never touches the address table; queued calls run when the
/// bus owner calls [`Bus::execute_queued_events`].
pub struct QueueSender<B: BusDefinition> {
    sender: flume::Sender<QueuedCall<B>>,
    stats: Arc<BusStats>,
}

impl<B: BusDefinition> Clone for QueueSender<B> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<B: BusDefinition> fmt::Debug for QueueSender<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("bus", &B::name())
            .field("pending", &self.sender.len())
            .finish()
    }
}

impl<B: BusDefinition> QueueSender<B> {
    fn push(&self, call: QueuedCall<B>) {
        // The bus owns a receiver for as long as any sender can reach it,
        // so a send error means the bus is being torn down.
        if let Err(e) = self.sender.send(call) {
            log::error!("{}: failed to queue call: {e}.", B::name());
            return;
        }
        self.stats.record_queued();
    }

    /// Queues a broadcast of `message`.
    pub fn queue_broadcast<F>(&self, mut message: F)
    where
        F: FnMut(&B::Interface) + Send + 'static,
    {
        log::trace!("{}: broadcast queued.", B::name());
        self.push(Box::new(move |bus: &Bus<B>| bus.broadcast(&mut message)));
    }

    /// Queues an event of `message` at `address`.
    pub fn queue_event<F>(&self, address: B::Address, mut message: F)
    where
        F: FnMut(&B::Interface) + Send + 'static,
        B::Address: Send,
    {
        log::trace!("{}: event at {:?} queued.", B::name(), address);
        self.push(Box::new(move |bus: &Bus<B>| {
            bus.event(&address, &mut message)
        }));
    }

    /// Queues an arbitrary function.
    ///
    /// ## Returns
    /// `BusError::FunctionQueueDisabled` unless the bus traits allow it.
    pub fn queue_function<F>(&self, function: F) -> BusResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !B::TRAITS.function_queue {
            return Err(BusError::FunctionQueueDisabled { bus: B::name() });
        }
        log::trace!("{}: function queued.", B::name());
        self.push(Box::new(move |_: &Bus<B>| function()));
        Ok(())
    }

    /// Number of entries waiting in the channel. The remainder of an
    /// interrupted drain is only counted by [`Bus::queued_len`].
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

impl<B: BusDefinition> Bus<B> {
    /// Returns a handle for queueing from any thread.
    ///
    /// ## Returns
    /// `BusError::QueueDisabled` unless the bus traits enable the event queue.
    pub fn queue_sender(&self) -> BusResult<QueueSender<B>> {
        if !B::TRAITS.event_queue {
            return Err(BusError::QueueDisabled { bus: B::name() });
        }
        Ok(QueueSender {
            sender: self.shared.queue.sender.clone(),
            stats: Arc::clone(&self.shared.stats),
        })
    }

    /// Queues a broadcast to run at the next
    /// [`execute_queued_events`](Self::execute_queued_events).
    pub fn queue_broadcast<F>(&self, message: F) -> BusResult<()>
    where
        F: FnMut(&B::Interface) + Send + 'static,
    {
        self.queue_sender()?.queue_broadcast(message);
        Ok(())
    }

    /// Queues an event at `address` to run at the next drain.
    pub fn queue_event<F>(&self, address: B::Address, message: F) -> BusResult<()>
    where
        F: FnMut(&B::Interface) + Send + 'static,
        B::Address: Send,
    {
        self.queue_sender()?.queue_event(address, message);
        Ok(())
    }

    /// Queues an arbitrary function to run at the next drain.
    pub fn queue_function<F>(&self, function: F) -> BusResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue_sender()?.queue_function(function)
    }

    /// Runs every entry that was queued when this call started, in FIFO order.
    ///
    /// Each entry goes through the normal dispatch path. Entries queued while
    /// the drain is running, by handlers or other threads, wait for the next
    /// call.
    ///
    /// If a queued call panics, the panic propagates and the entries after it
    /// stay queued; the next drain runs them first.
    ///
    /// ## Returns
    /// The number of entries executed.
    pub fn execute_queued_events(&self) -> usize {
        let mut batch = PendingBatch {
            queue: &self.shared.queue,
            calls: self.shared.queue.take_batch(),
        };
        if batch.calls.is_empty() {
            return 0;
        }

        log::trace!(
            "{}: executing {} queued call(s).",
            B::name(),
            batch.calls.len()
        );
        let mut executed = 0;
        while let Some(call) = batch.calls.pop_front() {
            // Counted before the call so a panicking entry is not left pending.
            self.shared.stats.record_executed(1);
            executed += 1;
            call(self);
        }
        executed
    }

    /// Discards every pending entry without running it.
    ///
    /// ## Returns
    /// The number of entries discarded.
    pub fn clear_queued_events(&self) -> usize {
        let discarded = self.shared.queue.take_batch().len();
        if discarded > 0 {
            log::debug!("{}: discarded {discarded} queued call(s).", B::name());
            self.shared.stats.record_cleared(discarded as u64);
        }
        discarded
    }

    /// Number of entries waiting to be executed.
    pub fn queued_len(&self) -> usize {
        self.shared.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::lock::{Locked, SingleThreaded};
    use crate::policy::{AddressPolicy, BusDefinition, BusTraits};
    use crate::{Bus, BusError};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};
    use std::thread;

    trait Sink: Send + Sync {
        fn push(&self, value: u32);
    }

    #[derive(Default)]
    struct Collector(Mutex<Vec<u32>>);

    impl Collector {
        fn values(&self) -> Vec<u32> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Sink for Collector {
        fn push(&self, value: u32) {
            self.0.lock().unwrap().push(value);
        }
    }

    struct QueuedBus;

    impl BusDefinition for QueuedBus {
        type Interface = dyn Sink;
        type Address = u32;
        type Lock = SingleThreaded;
        const TRAITS: BusTraits = BusTraits::DEFAULT
            .with_address_policy(AddressPolicy::ById)
            .with_event_queue();
    }

    struct ThreadedBus;

    impl BusDefinition for ThreadedBus {
        type Interface = dyn Sink;
        type Address = ();
        type Lock = Locked;
        const TRAITS: BusTraits = BusTraits::DEFAULT.with_function_queue();
    }

    struct ImmediateBus;

    impl BusDefinition for ImmediateBus {
        type Interface = dyn Sink;
        type Address = ();
        type Lock = SingleThreaded;
    }

    #[test]
    fn queue_requires_traits() {
        let bus = Bus::<ImmediateBus>::new().unwrap();
        let err = bus.queue_broadcast(|h| h.push(1)).unwrap_err();
        assert!(matches!(err, BusError::QueueDisabled { .. }));

        let queued = Bus::<QueuedBus>::new().unwrap();
        let err = queued.queue_function(|| {}).unwrap_err();
        assert!(matches!(err, BusError::FunctionQueueDisabled { .. }));
    }

    #[test]
    fn nothing_runs_before_drain() {
        let bus = Bus::<QueuedBus>::new().unwrap();
        let sink = Arc::new(Collector::default());
        let _conn = bus.connect(sink.clone(), 1).unwrap();

        bus.queue_event(1, |h| h.push(5)).unwrap();
        assert!(sink.values().is_empty());
        assert_eq!(bus.queued_len(), 1);

        assert_eq!(bus.execute_queued_events(), 1);
        assert_eq!(sink.values(), vec![5]);
        assert_eq!(bus.execute_queued_events(), 0);
    }

    #[test]
    fn clear_discards_pending_entries() {
        let bus = Bus::<QueuedBus>::new().unwrap();
        let sink = Arc::new(Collector::default());
        let _conn = bus.connect(sink.clone(), 1).unwrap();

        bus.queue_broadcast(|h| h.push(1)).unwrap();
        bus.queue_broadcast(|h| h.push(2)).unwrap();
        assert_eq!(bus.clear_queued_events(), 2);
        assert_eq!(bus.execute_queued_events(), 0);
        assert!(sink.values().is_empty());

        let stats = bus.stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.cleared, 2);
        assert_eq!(stats.pending(), 0);
    }

    /// Rejects the value 2; accepts everything else.
    #[derive(Default)]
    struct Picky(Collector);

    impl Sink for Picky {
        fn push(&self, value: u32) {
            if value == 2 {
                panic!("value 2 rejected");
            }
            self.0.push(value);
        }
    }

    #[test]
    fn panicking_queued_call_keeps_the_rest_of_the_batch() {
        let bus = Bus::<QueuedBus>::new().unwrap();
        let sink = Arc::new(Picky::default());
        let _conn = bus.connect(sink.clone(), 1).unwrap();
        for value in 1..=3 {
            bus.queue_event(1, move |h| h.push(value)).unwrap();
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| bus.execute_queued_events()));
        assert!(outcome.is_err());
        assert_eq!(sink.0.values(), vec![1]);
        assert_eq!(bus.queued_len(), 1);
        let stats = bus.stats();
        assert_eq!(stats.executed, 2, "The failing entry counts as executed");
        assert_eq!(stats.pending(), 1);

        // Queued after the interrupted drain, so it runs after the remainder.
        bus.queue_event(1, |h| h.push(4)).unwrap();
        assert_eq!(bus.queued_len(), 2);
        assert_eq!(bus.execute_queued_events(), 2);
        assert_eq!(sink.0.values(), vec![1, 3, 4]);
        assert_eq!(bus.queued_len(), 0);
        assert_eq!(bus.stats().pending(), 0);
        assert!(!bus.is_in_dispatch());
    }

    #[test]
    fn clear_also_discards_an_interrupted_remainder() {
        let bus = Bus::<QueuedBus>::new().unwrap();
        let sink = Arc::new(Picky::default());
        let _conn = bus.connect(sink.clone(), 1).unwrap();
        for value in [2, 5, 6] {
            bus.queue_event(1, move |h| h.push(value)).unwrap();
        }
        let _ = panic::catch_unwind(AssertUnwindSafe(|| bus.execute_queued_events()));

        assert_eq!(bus.clear_queued_events(), 2);
        assert_eq!(bus.execute_queued_events(), 0);
        assert!(sink.0.values().is_empty());
        assert_eq!(bus.stats().pending(), 0);
    }

    #[test]
    fn queued_event_without_listener_is_a_no_op() {
        let bus = Bus::<QueuedBus>::new().unwrap();
        bus.queue_event(99, |h| h.push(1)).unwrap();
        assert_eq!(bus.execute_queued_events(), 1);
    }

    #[test]
    fn producers_on_other_threads_feed_the_queue() {
        let bus = Bus::<ThreadedBus>::new().unwrap();
        let sink = Arc::new(Collector::default());
        let _conn = bus.connect(sink.clone(), ()).unwrap();
        let sender = bus.queue_sender().unwrap();

        let producers: Vec<_> = (0..4u32)
            .map(|worker| {
                let sender = sender.clone();
                thread::spawn(move || {
                    for i in 0..25u32 {
                        sender.queue_broadcast(move |h| h.push(worker * 100 + i));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().expect("Producer thread panicked");
        }

        assert_eq!(sender.len(), 100);
        assert_eq!(bus.execute_queued_events(), 100);
        let values = sink.values();
        assert_eq!(values.len(), 100);

        // Per-producer FIFO order survives the interleaving.
        for worker in 0..4u32 {
            let mine: Vec<u32> = values
                .iter()
                .copied()
                .filter(|v| v / 100 == worker)
                .collect();
            let expected: Vec<u32> = (0..25).map(|i| worker * 100 + i).collect();
            assert_eq!(mine, expected);
        }
    }

    #[test]
    fn queued_functions_run_in_order_with_events() {
        let bus = Bus::<ThreadedBus>::new().unwrap();
        let sink = Arc::new(Collector::default());
        let _conn = bus.connect(sink.clone(), ()).unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        bus.queue_function(move || first.lock().unwrap().push("function"))
            .unwrap();
        let second = Arc::clone(&order);
        bus.queue_broadcast(move |_| second.lock().unwrap().push("broadcast"))
            .unwrap();

        bus.execute_queued_events();
        assert_eq!(*order.lock().unwrap(), vec!["function", "broadcast"]);
    }
}
