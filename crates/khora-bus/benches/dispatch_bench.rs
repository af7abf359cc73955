use criterion::{criterion_group, criterion_main, Criterion};
use khora_bus::{AddressPolicy, Bus, BusDefinition, BusTraits, Locked, SingleThreaded};
use std::cell::Cell;
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

trait Tick {
    fn tick(&self, dt: u64) -> u64;
}

#[derive(Default)]
struct LocalTicker(Cell<u64>);

impl Tick for LocalTicker {
    fn tick(&self, dt: u64) -> u64 {
        self.0.set(self.0.get() + dt);
        self.0.get()
    }
}

struct LocalBus;
impl BusDefinition for LocalBus {
    type Interface = dyn Tick;
    type Address = ();
    type Lock = SingleThreaded;
}

struct EntityBus;
impl BusDefinition for EntityBus {
    type Interface = dyn Tick;
    type Address = u32;
    type Lock = SingleThreaded;
    const TRAITS: BusTraits = BusTraits::DEFAULT.with_address_policy(AddressPolicy::ById);
}

trait SyncTick: Send + Sync {
    fn tick(&self, dt: u64);
}

#[derive(Default)]
struct AtomicTicker(AtomicU64);

impl SyncTick for AtomicTicker {
    fn tick(&self, dt: u64) {
        self.0.fetch_add(dt, Ordering::Relaxed);
    }
}

struct SharedBus;
impl BusDefinition for SharedBus {
    type Interface = dyn SyncTick;
    type Address = ();
    type Lock = Locked;
    const TRAITS: BusTraits = BusTraits::DEFAULT.with_event_queue();
}

fn bench_dispatch(c: &mut Criterion) {
    let local = Bus::<LocalBus>::new().unwrap();
    let local_handlers: Vec<_> = (0..100).map(|_| Arc::new(LocalTicker::default())).collect();
    let _local_conns: Vec<_> = local_handlers
        .iter()
        .map(|h| local.connect(h.clone(), ()).unwrap())
        .collect();

    // 1,000 entities, one handler each
    let entities = Bus::<EntityBus>::new().unwrap();
    let entity_handlers: Vec<_> = (0..1_000).map(|_| Arc::new(LocalTicker::default())).collect();
    let _entity_conns: Vec<_> = entity_handlers
        .iter()
        .enumerate()
        .map(|(i, h)| entities.connect(h.clone(), i as u32).unwrap())
        .collect();

    let shared = Bus::<SharedBus>::new().unwrap();
    let shared_handlers: Vec<_> = (0..100).map(|_| Arc::new(AtomicTicker::default())).collect();
    let _shared_conns: Vec<_> = shared_handlers
        .iter()
        .map(|h| shared.connect(h.clone(), ()).unwrap())
        .collect();

    let mut group = c.benchmark_group("Bus Dispatch");

    group.bench_function("Broadcast (100 handlers, single-threaded)", |b| {
        b.iter(|| local.broadcast(|h| {
            black_box(h.tick(1));
        }));
    });

    group.bench_function("Broadcast Result Sum (100 handlers)", |b| {
        b.iter(|| {
            let mut total = 0u64;
            local.broadcast_result_with(&mut total, |h| h.tick(1), khora_bus::aggregate::sum);
            black_box(total);
        });
    });

    group.bench_function("Event (1 of 1,000 addresses)", |b| {
        let mut address = 0u32;
        b.iter(|| {
            entities.event(&address, |h| {
                black_box(h.tick(1));
            });
            address = (address + 1) % 1_000;
        });
    });

    group.bench_function("Broadcast (100 handlers, locked)", |b| {
        b.iter(|| shared.broadcast(|h| h.tick(1)));
    });

    group.bench_function("Queue + Drain (100 broadcasts)", |b| {
        b.iter(|| {
            for _ in 0..100 {
                shared.queue_broadcast(|h| h.tick(1)).unwrap();
            }
            black_box(shared.execute_queued_events());
        });
    });

    group.finish();
}

fn bench_connect(c: &mut Criterion) {
    let bus = Bus::<LocalBus>::new().unwrap();
    let handler = Arc::new(LocalTicker::default());

    c.bench_function("Connect + Disconnect", |b| {
        b.iter(|| {
            let conn = bus.connect(handler.clone(), ()).unwrap();
            black_box(conn.id());
        });
    });
}

criterion_group!(benches, bench_dispatch, bench_connect);
criterion_main!(benches);
