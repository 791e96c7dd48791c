//! Headless tick runner.
//!
//! Each step snapshots the [`SimWorld`], lets the autopilot act on it through
//! the host traits, then advances the world clock.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use tracing::{debug, info, warn};

use colony_core::budget::{AgentQuota, Unlimited};
use colony_core::colony::{Colony, TickReport};
use colony_core::store::MemoryStore;

use crate::error::{Result, SimError};
use crate::metrics::RunMetrics;
use crate::scenario::Scenario;
use crate::world::SimWorld;

/// How long to run and how much work each tick may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Ticks to run.
    pub ticks: u64,
    /// Agents processed per tick at most; unlimited when `None`.
    pub agent_quota: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ticks: 1000,
            agent_quota: None,
        }
    }
}

/// Drives one scenario tick by tick.
#[derive(Debug)]
pub struct HeadlessRunner {
    world: SimWorld,
    colony: Colony<MemoryStore>,
    config: RunnerConfig,
    metrics: RunMetrics,
}

impl HeadlessRunner {
    /// Build the scenario world and an autopilot with the scenario's config.
    pub fn new(scenario: &Scenario, config: RunnerConfig) -> Result<Self> {
        let world = scenario.build_world()?;
        let colony = Colony::new(scenario.colony_config(), MemoryStore::new())?;
        info!(
            scenario = %scenario.name,
            rooms = scenario.rooms.len(),
            agents = world.population(),
            ticks = config.ticks,
            quota = ?config.agent_quota,
            "Runner ready"
        );
        Ok(Self {
            world,
            colony,
            config,
            metrics: RunMetrics::new(scenario.name.clone()),
        })
    }

    /// The simulated world.
    #[must_use]
    pub const fn world(&self) -> &SimWorld {
        &self.world
    }

    /// The autopilot.
    #[must_use]
    pub const fn colony(&self) -> &Colony<MemoryStore> {
        &self.colony
    }

    /// Metrics so far.
    #[must_use]
    pub const fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Run a single tick.
    pub fn step(&mut self) -> Result<TickReport> {
        let snapshot = self.world.snapshot();
        let report = match self.config.agent_quota {
            Some(quota) => self
                .colony
                .tick(&snapshot, &mut self.world, &mut AgentQuota(quota))?,
            None => self.colony.tick(&snapshot, &mut self.world, &mut Unlimited)?,
        };
        self.metrics.record_tick(&report);
        self.world.advance();
        Ok(report)
    }

    /// Run every configured tick and return the final metrics.
    pub fn run(mut self) -> Result<RunMetrics> {
        for _ in 0..self.config.ticks {
            let report = self.step()?;
            if report.tick % 500 == 0 {
                debug!(
                    tick = report.tick,
                    population = report.population,
                    target = report.population_target,
                    tasks = report.tasks_live,
                    "Progress"
                );
            }
        }
        let hash = self.state_hash();
        self.metrics.finalize(self.world.stats(), hash);
        info!(
            ticks = self.metrics.ticks,
            harvested = self.metrics.energy_harvested,
            roads_built = self.metrics.roads_built,
            population = self.world.population(),
            hash = format_args!("{hash:016x}"),
            "Run complete"
        );
        Ok(self.metrics)
    }

    /// Hash of the world plus every persisted autopilot record.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.world.state_hash().hash(&mut hasher);
        self.colony.store().content_hash().hash(&mut hasher);
        hasher.finish()
    }
}

/// Run the scenario `runs` times and fail unless every run ends in the same
/// state. Returns the shared hash.
pub fn verify_determinism(scenario: &Scenario, config: RunnerConfig, runs: usize) -> Result<u64> {
    let mut hashes = Vec::with_capacity(runs);
    for run in 0..runs {
        let metrics = HeadlessRunner::new(scenario, config)?.run()?;
        debug!(run, hash = format_args!("{:016x}", metrics.final_state_hash), "Run finished");
        hashes.push(metrics.final_state_hash);
    }

    let distinct: BTreeSet<u64> = hashes.iter().copied().collect();
    if distinct.len() > 1 {
        warn!(runs, distinct = distinct.len(), "Runs diverged");
        return Err(SimError::Nondeterministic {
            runs,
            distinct: distinct.len(),
        });
    }
    Ok(hashes.first().copied().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(ticks: u64) -> RunnerConfig {
        RunnerConfig {
            ticks,
            agent_quota: None,
        }
    }

    #[test]
    fn test_step_advances_world() {
        let mut runner = HeadlessRunner::new(&Scenario::starter(), short(5)).unwrap();
        let report = runner.step().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.population, 4);
        assert_eq!(runner.world().tick(), 2);
        assert!(!runner.colony().board().unwrap().is_empty());
    }

    #[test]
    fn test_quota_truncates() {
        let config = RunnerConfig {
            ticks: 3,
            agent_quota: Some(2),
        };
        let metrics = HeadlessRunner::new(&Scenario::starter(), config)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(metrics.ticks, 3);
        assert_eq!(metrics.truncated_ticks, 3);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut scenario = Scenario::starter();
        scenario.config = Some(colony_core::config::ColonyConfig::default());
        if let Some(config) = scenario.config.as_mut() {
            config.autoscaler.min_population = 0;
        }
        assert!(HeadlessRunner::new(&scenario, short(1)).is_err());
    }
}
