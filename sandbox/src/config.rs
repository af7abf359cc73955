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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings of the demo run, read from an optional JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Number of simulated frames.
    pub ticks: u32,
    /// Number of entities spawned at startup.
    pub entities: u64,
    /// Move events the producer thread queues in total.
    pub producer_events: u32,
    /// Damage dealt to the targeted entity each frame.
    pub damage_per_tick: u32,
    /// Where the final bus statistics are written. Logged when absent.
    pub stats_path: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            ticks: 5,
            entities: 4,
            producer_events: 32,
            damage_per_tick: 15,
            stats_path: None,
        }
    }
}

impl SandboxConfig {
    /// Loads the config at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            log::info!("No config file given, using defaults.");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::info!("Loaded config from {}.", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: SandboxConfig = serde_json::from_str(r#"{ "ticks": 2 }"#).unwrap();
        assert_eq!(config.ticks, 2);
        assert_eq!(config.entities, SandboxConfig::default().entities);
        assert!(config.stats_path.is_none());
    }
}
