//! Population autoscaling.
//!
//! Every tick the current population is a bucket in the score table, and
//! the tick adds `population` agent-ticks and `idle` idle agent-ticks to it.
//! Once a bucket has enough samples its idle ratio is trusted. The target
//! population is the trusted bucket closest to the desired idle ratio, nudged
//! one step toward an unexplored neighbor when that bucket is too idle (one
//! fewer) or too busy (one more). Until any bucket is trusted the target is a
//! fixed baseline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AutoscalerConfig;
use crate::math::{abs_diff, ratio, Fixed};
use crate::store::Persisted;

/// Samples observed at one population size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Agent-ticks observed.
    pub ticks: u64,
    /// Idle agent-ticks observed.
    pub idle_ticks: u64,
}

impl Bucket {
    /// Idle ratio of the bucket.
    #[must_use]
    pub fn ratio(&self) -> Fixed {
        let idle = i64::try_from(self.idle_ticks).unwrap_or(i64::MAX);
        let ticks = i64::try_from(self.ticks).unwrap_or(i64::MAX);
        ratio(idle, ticks)
    }
}

/// Persisted score table and current target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationScores {
    buckets: BTreeMap<u32, Bucket>,
    target: Option<u32>,
}

impl Persisted for PopulationScores {
    const KEY: &'static str = "population";
}

impl PopulationScores {
    /// Build a table from explicit buckets.
    #[must_use]
    pub fn from_buckets<I>(buckets: I) -> Self
    where
        I: IntoIterator<Item = (u32, Bucket)>,
    {
        Self {
            buckets: buckets.into_iter().collect(),
            target: None,
        }
    }

    /// Add one tick of samples for a population size.
    pub fn observe(&mut self, population: u32, idle: u32) {
        if population == 0 {
            return;
        }
        let bucket = self.buckets.entry(population).or_default();
        bucket.ticks += u64::from(population);
        bucket.idle_ticks += u64::from(idle.min(population));
    }

    /// Samples for a population size.
    #[must_use]
    pub fn bucket(&self, population: u32) -> Option<&Bucket> {
        self.buckets.get(&population)
    }

    /// All buckets in population order.
    pub fn buckets(&self) -> impl Iterator<Item = (u32, &Bucket)> {
        self.buckets.iter().map(|(p, b)| (*p, b))
    }

    /// Last computed target.
    #[must_use]
    pub const fn target(&self) -> Option<u32> {
        self.target
    }
}

/// Hill-climbing population search.
#[derive(Debug, Clone)]
pub struct Autoscaler {
    config: AutoscalerConfig,
}

impl Autoscaler {
    /// Create an autoscaler.
    #[must_use]
    pub fn new(config: AutoscalerConfig) -> Self {
        Self { config }
    }

    fn is_trusted(&self, bucket: &Bucket) -> bool {
        bucket.ticks >= self.config.min_samples
    }

    /// Trusted bucket whose ratio is closest to the target ratio. Ties go to
    /// the smaller population.
    #[must_use]
    pub fn best_bucket(&self, scores: &PopulationScores) -> Option<(u32, Fixed)> {
        let target = self.config.target_ratio();
        scores
            .buckets()
            .filter(|(_, bucket)| self.is_trusted(bucket))
            .map(|(population, bucket)| (population, bucket.ratio()))
            .min_by_key(|(population, r)| (abs_diff(*r, target), *population))
    }

    fn clamp(&self, population: u32) -> u32 {
        population.clamp(self.config.min_population, self.config.max_population)
    }

    /// Population to aim for next.
    #[must_use]
    pub fn next_target(&self, scores: &PopulationScores) -> u32 {
        let Some((best, best_ratio)) = self.best_bucket(scores) else {
            return self.clamp(self.config.baseline_population);
        };

        let target_ratio = self.config.target_ratio();
        let neighbor = if best_ratio > target_ratio {
            best.saturating_sub(1)
        } else if best_ratio < target_ratio {
            best.saturating_add(1)
        } else {
            best
        };
        let neighbor = self.clamp(neighbor);

        let explored = scores
            .bucket(neighbor)
            .is_some_and(|bucket| self.is_trusted(bucket));
        if explored {
            self.clamp(best)
        } else {
            neighbor
        }
    }

    /// Record this tick's counts and store the next target.
    pub fn update(&self, scores: &mut PopulationScores, population: u32, idle: u32) -> u32 {
        scores.observe(population, idle);
        let target = self.next_target(scores);
        if scores.target != Some(target) {
            debug!(population, idle, target, previous = ?scores.target, "Population target changed");
        }
        scores.target = Some(target);
        target
    }
}
