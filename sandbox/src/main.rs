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

// Khora Bus Sandbox
// Drives a few buses through a short simulated frame loop.

mod buses;
mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use khora_bus::{aggregate, BusRegistry, BusStatsSnapshot};

use crate::buses::{
    Camera, EntityId, FrameCounter, Health, HealthBus, InputBus, KeyLayer, LifecycleBus,
    TransformBus,
};
use crate::config::SandboxConfig;

const KEYS: [char; 4] = ['w', 'e', 'q', 'x'];

fn run(config: &SandboxConfig) -> Result<BTreeMap<&'static str, BusStatsSnapshot>> {
    let mut registry = BusRegistry::new();
    let lifecycle = registry.register::<LifecycleBus>()?;
    let transforms = registry.register::<TransformBus>()?;
    let health = registry.register::<HealthBus>()?;
    let input = registry.register::<InputBus>()?;
    log::info!("Registered buses: {:?}", registry.names());

    // --- Listeners ---
    let frames = Arc::new(FrameCounter::default());
    let frames_conn = lifecycle.connect(frames.clone(), ())?;

    let entities: Vec<Arc<Health>> = (0..config.entities)
        .map(|id| Arc::new(Health::new(id, 100)))
        .collect();
    let health_conns = entities
        .iter()
        .map(|entity| health.connect(entity.clone(), entity.id))
        .collect::<Result<Vec<_>, _>>()?;

    let camera = Arc::new(Camera::default());
    camera.attach(&transforms);
    let mut camera_conn = transforms.connect_multi(camera.clone());
    for id in (0..config.entities).step_by(2) {
        camera_conn.connect(id)?;
    }

    let layers = [
        Arc::new(KeyLayer {
            name: "gameplay",
            priority: 0,
            keys: &['w', 'q'],
        }),
        Arc::new(KeyLayer {
            name: "console",
            priority: 10,
            keys: &['q'],
        }),
        Arc::new(KeyLayer {
            name: "debug",
            priority: 5,
            keys: &['x'],
        }),
    ];
    let layer_conns = layers
        .iter()
        .map(|layer| input.connect(layer.clone(), ()))
        .collect::<Result<Vec<_>, _>>()?;

    // --- Producer thread feeding the transform queue ---
    let sender = transforms.queue_sender()?;
    let entity_count = config.entities.max(1);
    let producer_events = config.producer_events;
    let producer = thread::spawn(move || {
        for i in 0..producer_events {
            let id: EntityId = u64::from(i) % entity_count;
            let position = [i as f32, 0.0, -(i as f32)];
            sender.queue_event(id, move |h| h.on_moved(position));
        }
        let done = sender.queue_function(|| log::debug!("Producer batch complete."));
        if let Err(e) = done {
            log::error!("Producer could not queue its completion marker: {e}");
        }
    });

    // --- Frame loop ---
    let target: EntityId = 0;
    for frame in 0..config.ticks {
        lifecycle.broadcast(|h| h.on_tick(frame));

        let executed = transforms.execute_queued_events();
        log::debug!("Frame {frame}: {executed} queued transform call(s) executed.");

        let key = KEYS[frame as usize % KEYS.len()];
        let mut consumed = false;
        input.broadcast_result_with(&mut consumed, |h| h.handle_key(key), aggregate::any);
        if !consumed {
            log::info!("Frame {frame}: key '{key}' was not handled by any layer.");
        }

        let damage = config.damage_per_tick;
        if let Err(failures) = health.try_event(&target, |h| h.apply_damage(damage)) {
            for failure in failures {
                log::warn!("Frame {frame}: {failure}");
            }
        }
        let mut remaining = 0;
        health.event_result(&mut remaining, &target, |h| h.health());
        log::info!("Frame {frame}: entity {target} has {remaining} health left.");
    }

    producer
        .join()
        .map_err(|_| anyhow!("Transform producer thread panicked"))?;
    let late = transforms.execute_queued_events();
    log::info!(
        "Drained {late} late transform call(s); camera saw {} movement(s).",
        camera.sightings()
    );

    let mut total_health = 0;
    health.broadcast_result_with(&mut total_health, |h| h.health(), aggregate::sum);
    log::info!("Total health across {} entities: {total_health}.", entities.len());

    lifecycle.broadcast_reverse(|h| h.on_shutdown());

    let mut stats = BTreeMap::new();
    stats.insert("LifecycleBus", lifecycle.stats());
    stats.insert("TransformBus", transforms.stats());
    stats.insert("HealthBus", health.stats());
    stats.insert("InputBus", input.stats());

    // --- Teardown: disconnect first, then unregister ---
    camera_conn.disconnect_all();
    drop((frames_conn, health_conns, layer_conns));
    registry.unregister::<InputBus>()?;
    let leaked = registry.shutdown();
    if leaked > 0 {
        log::warn!("{leaked} bus(es) were shut down with handlers still connected.");
    }

    Ok(stats)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SandboxConfig::load(config_path.as_deref())?;
    log::info!("Running sandbox with {config:?}");

    let stats = run(&config)?;
    let report = serde_json::to_string_pretty(&stats).context("Failed to serialize bus stats")?;
    match &config.stats_path {
        Some(path) => {
            std::fs::write(path, &report)
                .with_context(|| format!("Failed to write stats to {}", path.display()))?;
            log::info!("Bus stats written to {}.", path.display());
        }
        None => log::info!("Bus stats:\n{report}"),
    }
    Ok(())
}
