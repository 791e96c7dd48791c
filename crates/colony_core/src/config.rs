//! Tunable constants, loaded from RON.
//!
//! Every value is an integer (percent, permille, ticks, energy) so configs
//! stay exact on disk; use sites convert to [`Fixed`] through the helper
//! methods. Missing fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ColonyError, Result};
use crate::math::{percent, permille, Fixed};

/// How the harvest generator classifies tiles around a resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RingScan {
    /// Stop at the first classified item on each tile. A road ends the scan
    /// before anything else is looked at, and a benign item can publish a
    /// task before a later blocker is seen.
    #[default]
    FirstItem,
    /// Inspect every item on the tile before deciding.
    WholeTile,
}

/// Task generator constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// `K` in `amount / (amount + K)` for loot piles.
    pub resource_quantity_modifier: u32,
    /// `K` in `1 - t / (t + K)` for controller decay.
    pub controller_downgrade_modifier: u32,
    /// STORE weight for spawns and extensions.
    pub critical_weight_percent: u32,
    /// STORE weight for towers.
    pub defense_weight_percent: u32,
    /// STORE weight for bulk storage.
    pub bulk_weight_percent: u32,
    /// Harvest tile classification.
    pub ring_scan: RingScan,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            resource_quantity_modifier: 200,
            controller_downgrade_modifier: 20_000,
            critical_weight_percent: 100,
            defense_weight_percent: 66,
            bulk_weight_percent: 33,
            ring_scan: RingScan::FirstItem,
        }
    }
}

/// Task allocation constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Energy a store must hold before agents may withdraw from the room.
    pub refuel_safety_margin: u32,
    /// Dropped piles at or below this amount are not worth scavenging.
    pub scavenge_minimum: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            refuel_safety_margin: 300,
            scavenge_minimum: 20,
        }
    }
}

/// Infrastructure planner constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Ticks between ledger decays.
    pub decay_interval: u64,
    /// Ticks between planning rounds.
    pub planning_interval: u64,
    /// Fraction removed at each decay, in percent.
    pub decay_percent: u32,
    /// Entries below this score are pruned.
    pub prune_floor: u32,
    /// Build threshold on plain terrain.
    pub plain_threshold: u32,
    /// Build threshold on swamp terrain.
    pub swamp_threshold: u32,
    /// Road count at which thresholds reach their base value.
    pub soft_cap: u32,
    /// Lower bound of the threshold scale, in percent.
    pub min_scale_percent: u32,
    /// Repair threshold relative to the build threshold, in percent.
    pub repair_factor_percent: u32,
    /// Also lay roads along paths between key structures.
    pub spine_enabled: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            decay_interval: 50,
            planning_interval: 100,
            decay_percent: 10,
            prune_floor: 1,
            plain_threshold: 50,
            swamp_threshold: 10,
            soft_cap: 250,
            min_scale_percent: 20,
            repair_factor_percent: 75,
            spine_enabled: false,
        }
    }
}

impl PlannerConfig {
    /// Multiplier applied at each decay.
    #[must_use]
    pub fn retain_factor(&self) -> Fixed {
        Fixed::ONE - percent(self.decay_percent)
    }

    /// Prune floor as fixed-point.
    #[must_use]
    pub fn floor(&self) -> Fixed {
        Fixed::saturating_from_num(self.prune_floor)
    }

    /// Minimum threshold scale as fixed-point.
    #[must_use]
    pub fn min_scale(&self) -> Fixed {
        percent(self.min_scale_percent)
    }

    /// Repair factor as fixed-point.
    #[must_use]
    pub fn repair_factor(&self) -> Fixed {
        percent(self.repair_factor_percent)
    }
}

/// Population autoscaler constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// Target used until some bucket is trusted.
    pub baseline_population: u32,
    /// Lowest target ever proposed.
    pub min_population: u32,
    /// Highest target ever proposed.
    pub max_population: u32,
    /// Desired idle ratio, in permille.
    pub target_idle_permille: u32,
    /// Agent-ticks a bucket needs before its ratio is trusted.
    pub min_samples: u64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            baseline_population: 10,
            min_population: 1,
            max_population: 30,
            target_idle_permille: 100,
            min_samples: 100,
        }
    }
}

impl AutoscalerConfig {
    /// Desired idle ratio as fixed-point.
    #[must_use]
    pub fn target_ratio(&self) -> Fixed {
        permille(self.target_idle_permille)
    }
}

/// Complete autopilot configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    /// Task generator.
    pub generator: GeneratorConfig,
    /// Task allocation.
    pub allocation: AllocationConfig,
    /// Infrastructure planner.
    pub planner: PlannerConfig,
    /// Population autoscaler.
    pub autoscaler: AutoscalerConfig,
}

impl ColonyConfig {
    /// Parse a config from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| ColonyError::Config(e.to_string()))
    }

    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ColonyError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_ron_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the algorithms cannot run with.
    pub fn validate(&self) -> Result<()> {
        let planner = &self.planner;
        if planner.decay_interval == 0 || planner.planning_interval == 0 {
            return Err(ColonyError::Config(
                "planner intervals must be non-zero".into(),
            ));
        }
        if planner.decay_percent == 0 || planner.decay_percent >= 100 {
            return Err(ColonyError::Config(format!(
                "decay_percent must be in 1..100, got {}",
                planner.decay_percent
            )));
        }
        if planner.soft_cap == 0 {
            return Err(ColonyError::Config("soft_cap must be non-zero".into()));
        }

        let scaler = &self.autoscaler;
        if scaler.min_population == 0 || scaler.min_population > scaler.max_population {
            return Err(ColonyError::Config(format!(
                "invalid population bounds {}..={}",
                scaler.min_population, scaler.max_population
            )));
        }
        if scaler.target_idle_permille > 1000 {
            return Err(ColonyError::Config(
                "target_idle_permille must not exceed 1000".into(),
            ));
        }
        Ok(())
    }
}
