//! Run metrics collected by the headless runner.

use std::path::Path;

use serde::{Deserialize, Serialize};

use colony_core::colony::TickReport;
use colony_core::host::SpawnOutcome;

use crate::world::WorldStats;

/// Summary of one headless run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Ticks run.
    pub ticks: u64,
    /// Living agents at the start of each tick.
    pub population_history: Vec<usize>,
    /// Autoscaler target after each tick.
    pub target_history: Vec<u32>,
    /// Idle agent-ticks over all agent-ticks.
    pub idle_ratio: f64,
    /// Energy extracted from resource nodes.
    pub energy_harvested: u64,
    /// Energy spent upgrading controllers.
    pub upgrade_work: u64,
    /// Road sites placed.
    pub roads_proposed: u64,
    /// Road sites withdrawn.
    pub roads_retracted: u64,
    /// Roads completed.
    pub roads_built: u64,
    /// Agents produced by spawns.
    pub agents_spawned: u64,
    /// Agents that died of old age.
    pub agents_expired: u64,
    /// Ticks the agent quota cut short.
    pub truncated_ticks: u64,
    /// Tasks abandoned after a failed action.
    pub abandoned: u64,
    /// Latch switches over the run.
    pub switches: u64,
    /// Planning rounds run.
    pub planning_rounds: u64,
    /// Spawn requests refused for lack of energy.
    pub spawn_starved: u64,
    /// Hash of world and autopilot state after the last tick.
    pub final_state_hash: u64,
    #[serde(skip)]
    idle_agent_ticks: u64,
    #[serde(skip)]
    agent_ticks: u64,
}

impl RunMetrics {
    /// Empty metrics for a scenario.
    #[must_use]
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            ..Default::default()
        }
    }

    /// Fold one tick report in.
    pub fn record_tick(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.population_history.push(report.population);
        self.target_history.push(report.population_target);
        self.idle_agent_ticks += report.idle as u64;
        self.agent_ticks += report.population as u64;
        self.idle_ratio = if self.agent_ticks == 0 {
            0.0
        } else {
            self.idle_agent_ticks as f64 / self.agent_ticks as f64
        };
        self.truncated_ticks += u64::from(report.truncated);
        self.abandoned += report.abandoned as u64;
        self.switches += report.switches as u64;
        self.planning_rounds += report.plans.len() as u64;
        if report.spawn == Some(SpawnOutcome::NotEnoughEnergy) {
            self.spawn_starved += 1;
        }
    }

    /// Copy the world's running totals and the final hash.
    pub fn finalize(&mut self, stats: &WorldStats, state_hash: u64) {
        self.energy_harvested = stats.energy_harvested;
        self.upgrade_work = stats.upgrade_work;
        self.roads_proposed = stats.roads_proposed;
        self.roads_retracted = stats.roads_retracted;
        self.roads_built = stats.roads_built;
        self.agents_spawned = stats.agents_spawned;
        self.agents_expired = stats.agents_expired;
        self.final_state_hash = state_hash;
    }

    /// Highest population seen.
    #[must_use]
    pub fn peak_population(&self) -> usize {
        self.population_history.iter().copied().max().unwrap_or(0)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the metrics as JSON to a file.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
