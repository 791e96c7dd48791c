//! Traffic-adaptive infrastructure planning.
//!
//! Every agent step deposits score on the tile it left. Scores decay
//! exponentially and are pruned below a floor, so the [`TrafficLedger`]
//! remembers only sustained traffic. On each planning round the
//! [`InfrastructurePlanner`] proposes roads where the score clears a
//! terrain-specific threshold and retracts proposals that fell below it.
//!
//! Thresholds scale with the number of roads already in the room: the more
//! paved the room is, the harder it gets to justify another road. Repairs use
//! a lower threshold than construction so a road is not built and then left
//! to rot on alternate rounds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::{RoomName, Tile};
use crate::config::PlannerConfig;
use crate::host::{ActionOutcome, Construction, PathCosts, PathOracle, IMPASSABLE};
use crate::math::{fixed_serde, ratio, Fixed};
use crate::snapshot::{RoomSnapshot, StructureKind, Terrain};
use crate::store::Persisted;

// ============================================================================
// Traffic ledger
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Score(#[serde(with = "fixed_serde")] Fixed);

/// Decaying per-tile traffic score of one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficLedger {
    scores: BTreeMap<Tile, Score>,
}

impl TrafficLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one traversal by an agent carrying `load` out of `capacity`.
    pub fn record(&mut self, tile: Tile, load: u32, capacity: u32) {
        let bump = Fixed::ONE + ratio(i64::from(load), i64::from(capacity));
        let entry = self.scores.entry(tile).or_insert(Score(Fixed::ZERO));
        entry.0 = entry.0.saturating_add(bump);
    }

    /// Set a score directly.
    pub fn set(&mut self, tile: Tile, score: Fixed) {
        self.scores.insert(tile, Score(score));
    }

    /// Score of a tile, zero when untracked.
    #[must_use]
    pub fn score(&self, tile: Tile) -> Fixed {
        self.scores.get(&tile).map_or(Fixed::ZERO, |s| s.0)
    }

    /// Multiply every score by `retain` and prune those below `floor`.
    /// Returns the number of pruned entries.
    pub fn decay(&mut self, retain: Fixed, floor: Fixed) -> usize {
        let before = self.scores.len();
        self.scores.retain(|_, score| {
            score.0 *= retain;
            score.0 >= floor
        });
        before - self.scores.len()
    }

    /// Tracked tiles and their scores, in tile order.
    pub fn iter(&self) -> impl Iterator<Item = (Tile, Fixed)> + '_ {
        self.scores.iter().map(|(tile, score)| (*tile, score.0))
    }

    /// Number of tracked tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether no tile is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Traffic ledgers of every room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficLedgers {
    rooms: BTreeMap<RoomName, TrafficLedger>,
}

impl Persisted for TrafficLedgers {
    const KEY: &'static str = "traffic";
}

impl TrafficLedgers {
    /// Ledger of a room, if it has one.
    #[must_use]
    pub fn get(&self, room: &RoomName) -> Option<&TrafficLedger> {
        self.rooms.get(room)
    }

    /// Ledger of a room, created on demand.
    pub fn entry(&mut self, room: &RoomName) -> &mut TrafficLedger {
        self.rooms.entry(room.clone()).or_default()
    }

    /// All ledgers in room order.
    pub fn iter(&self) -> impl Iterator<Item = (&RoomName, &TrafficLedger)> {
        self.rooms.iter()
    }

    /// Total tracked tiles over all rooms.
    #[must_use]
    pub fn tracked_tiles(&self) -> usize {
        self.rooms.values().map(TrafficLedger::len).sum()
    }
}

// ============================================================================
// Thresholds
// ============================================================================

/// Derives build thresholds from the room's road count.
#[derive(Debug, Clone)]
pub struct ThresholdScaler {
    soft_cap: i64,
    min_scale: Fixed,
    plain: Fixed,
    swamp: Fixed,
}

impl ThresholdScaler {
    /// Create a scaler from planner constants.
    #[must_use]
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            soft_cap: i64::from(config.soft_cap),
            min_scale: config.min_scale(),
            plain: Fixed::saturating_from_num(config.plain_threshold),
            swamp: Fixed::saturating_from_num(config.swamp_threshold),
        }
    }

    /// `max(road_count / soft_cap, min_scale)`. Not clamped above one.
    #[must_use]
    pub fn scale(&self, road_count: usize) -> Fixed {
        let count = i64::try_from(road_count).unwrap_or(i64::MAX);
        ratio(count, self.soft_cap).max(self.min_scale)
    }

    /// Build threshold of a terrain at a given scale. `None` for impassable
    /// terrain.
    #[must_use]
    pub fn threshold(&self, terrain: Terrain, scale: Fixed) -> Option<Fixed> {
        match terrain {
            Terrain::Plain => Some(self.plain * scale),
            Terrain::Swamp => Some(self.swamp * scale),
            Terrain::Wall => None,
        }
    }
}

// ============================================================================
// Maintenance
// ============================================================================

/// Decides whether a road on a tile is still worth repairing.
pub trait Maintenance {
    /// Whether the road on `tile` should be kept up.
    fn should_maintain(&self, room: &RoomSnapshot, tile: Tile) -> bool;
}

/// Keeps every road. Useful when traffic is not tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMaintain;

impl Maintenance for AlwaysMaintain {
    fn should_maintain(&self, _room: &RoomSnapshot, _tile: Tile) -> bool {
        true
    }
}

/// The planner's repair band applied to the current ledgers.
#[derive(Debug, Clone, Copy)]
pub struct RoadMaintenance<'a> {
    planner: &'a InfrastructurePlanner,
    ledgers: &'a TrafficLedgers,
}

impl<'a> RoadMaintenance<'a> {
    /// Bind a planner to a set of ledgers.
    #[must_use]
    pub fn new(planner: &'a InfrastructurePlanner, ledgers: &'a TrafficLedgers) -> Self {
        Self { planner, ledgers }
    }
}

impl Maintenance for RoadMaintenance<'_> {
    fn should_maintain(&self, room: &RoomSnapshot, tile: Tile) -> bool {
        let score = self
            .ledgers
            .get(&room.name)
            .map_or(Fixed::ZERO, |ledger| ledger.score(tile));
        self.planner.should_maintain(room, tile, score)
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Counters from one planning round in one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReport {
    /// Room that was planned.
    pub room: RoomName,
    /// Threshold scale used.
    #[serde(with = "fixed_serde")]
    pub scale: Fixed,
    /// Ledger tiles compared against a threshold.
    pub evaluated: usize,
    /// Ledger tiles skipped for impassable terrain.
    pub skipped: usize,
    /// Roads proposed from traffic.
    pub proposed: usize,
    /// Road proposals withdrawn.
    pub retracted: usize,
    /// Proposals the host refused.
    pub failed: usize,
    /// Roads proposed along structural paths.
    pub spine_proposed: usize,
}

/// Structural anchors for road spines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Spawn,
    Controller,
    Sources,
    Extensions,
    Storage,
    Towers,
    Ramparts,
    Terminal,
    Factory,
    Labs,
}

/// Anchor pairs in planning order: core spine first, optional links last.
const SPINE_PAIRS: [(Anchor, Anchor); 16] = [
    (Anchor::Spawn, Anchor::Controller),
    (Anchor::Spawn, Anchor::Sources),
    (Anchor::Spawn, Anchor::Extensions),
    (Anchor::Storage, Anchor::Extensions),
    (Anchor::Spawn, Anchor::Storage),
    (Anchor::Storage, Anchor::Sources),
    (Anchor::Storage, Anchor::Controller),
    (Anchor::Storage, Anchor::Towers),
    (Anchor::Extensions, Anchor::Towers),
    (Anchor::Storage, Anchor::Ramparts),
    (Anchor::Storage, Anchor::Terminal),
    (Anchor::Storage, Anchor::Factory),
    (Anchor::Storage, Anchor::Labs),
    (Anchor::Labs, Anchor::Terminal),
    (Anchor::Terminal, Anchor::Factory),
    (Anchor::Factory, Anchor::Labs),
];

impl Anchor {
    /// Tiles of the anchor's objects and the range a path must reach.
    fn tiles(self, room: &RoomSnapshot) -> (Vec<Tile>, u8) {
        let mine_of = |kind: StructureKind| -> Vec<Tile> {
            let built = room
                .structures
                .iter()
                .filter(|s| s.kind == kind && s.is_friendly())
                .map(|s| s.tile);
            let planned = room
                .sites
                .iter()
                .filter(|s| s.kind == kind && s.mine)
                .map(|s| s.tile);
            built.chain(planned).collect()
        };
        match self {
            Self::Spawn => (mine_of(StructureKind::Spawn), 1),
            Self::Controller => (
                room.controller
                    .iter()
                    .filter(|c| c.mine)
                    .map(|c| c.tile)
                    .collect(),
                3,
            ),
            Self::Sources => (room.nodes.iter().map(|n| n.tile).collect(), 1),
            Self::Extensions => (mine_of(StructureKind::Extension), 1),
            Self::Storage => (mine_of(StructureKind::Storage), 1),
            Self::Towers => (mine_of(StructureKind::Tower), 1),
            // Paths end on the rampart itself.
            Self::Ramparts => (mine_of(StructureKind::Rampart), 0),
            Self::Terminal => (mine_of(StructureKind::Terminal), 1),
            Self::Factory => (mine_of(StructureKind::Factory), 1),
            Self::Labs => (mine_of(StructureKind::Lab), 1),
        }
    }
}

/// Proposes and retracts roads from traffic.
#[derive(Debug, Clone)]
pub struct InfrastructurePlanner {
    config: PlannerConfig,
    scaler: ThresholdScaler,
}

impl InfrastructurePlanner {
    /// Create a planner.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        let scaler = ThresholdScaler::new(&config);
        Self { config, scaler }
    }

    /// Planner constants.
    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Threshold scaler.
    #[must_use]
    pub const fn scaler(&self) -> &ThresholdScaler {
        &self.scaler
    }

    /// Whether the ledgers decay on this tick.
    #[must_use]
    pub const fn is_decay_tick(&self, tick: u64) -> bool {
        tick % self.config.decay_interval == 0
    }

    /// Whether a planning round runs on this tick.
    #[must_use]
    pub const fn is_planning_tick(&self, tick: u64) -> bool {
        tick % self.config.planning_interval == 0
    }

    /// Apply one decay step to a ledger. Returns pruned entries.
    pub fn decay(&self, ledger: &mut TrafficLedger) -> usize {
        ledger.decay(self.config.retain_factor(), self.config.floor())
    }

    /// Maintenance predicate for a road on `tile` with the given traffic
    /// score. Roads tunnelled through impassable terrain are always kept.
    #[must_use]
    pub fn should_maintain(&self, room: &RoomSnapshot, tile: Tile, score: Fixed) -> bool {
        let terrain = room.terrain_at(tile);
        let Some(threshold) = self.scaler.threshold(terrain, self.scaler.scale(room.road_count()))
        else {
            return room
                .structures_at(tile)
                .any(|s| s.kind == StructureKind::Road);
        };
        score >= threshold * self.config.repair_factor()
    }

    /// Run one planning round for a room.
    pub fn plan<C>(&self, room: &RoomSnapshot, ledger: &TrafficLedger, host: &mut C) -> PlanReport
    where
        C: Construction + ?Sized,
    {
        let scale = self.scaler.scale(room.road_count());
        let mut report = PlanReport {
            room: room.name.clone(),
            scale,
            ..PlanReport::default()
        };

        for (tile, score) in ledger.iter() {
            let Some(threshold) = self.scaler.threshold(room.terrain_at(tile), scale) else {
                report.skipped += 1;
                continue;
            };
            report.evaluated += 1;

            let has_road = room
                .structures_at(tile)
                .any(|s| s.kind == StructureKind::Road);
            let mut has_site = room
                .sites_at(tile)
                .any(|s| s.kind == StructureKind::Road);

            if has_site && score < threshold {
                let outcome = host.retract_site(&room.name, tile, StructureKind::Road);
                if outcome.is_ok() {
                    report.retracted += 1;
                    has_site = false;
                    debug!(room = %room.name, %tile, score = %score, threshold = %threshold, "Retracted road proposal");
                }
            }

            if !has_road && !has_site && score > threshold {
                match host.propose_site(&room.name, tile, StructureKind::Road) {
                    ActionOutcome::Ok => {
                        report.proposed += 1;
                        debug!(room = %room.name, %tile, score = %score, threshold = %threshold, "Proposed road");
                    }
                    outcome => {
                        report.failed += 1;
                        debug!(room = %room.name, %tile, ?outcome, "Road proposal refused");
                    }
                }
            }
        }

        info!(
            room = %room.name,
            scale = %scale,
            evaluated = report.evaluated,
            total = ledger.len(),
            proposed = report.proposed,
            retracted = report.retracted,
            skipped = report.skipped,
            "Planned roads from traffic"
        );
        report
    }

    /// Path costs for spine planning: existing roads and road proposals are
    /// cheapest, other proposals and obstacles block.
    #[must_use]
    pub fn spine_costs(room: &RoomSnapshot) -> PathCosts {
        let mut costs = PathCosts {
            plain: 2,
            swamp: 10,
            overrides: BTreeMap::new(),
        };
        for structure in &room.structures {
            let cost = if structure.kind == StructureKind::Road {
                1
            } else if structure.kind.is_obstacle() {
                IMPASSABLE
            } else {
                continue;
            };
            costs.overrides.insert(structure.tile, cost);
        }
        for site in &room.sites {
            let cost = if site.kind == StructureKind::Road {
                1
            } else {
                IMPASSABLE
            };
            costs.overrides.insert(site.tile, cost);
        }
        costs
    }

    /// Propose roads along paths between key structures. Returns the number
    /// of roads proposed.
    pub fn plan_spine<H>(&self, room: &RoomSnapshot, host: &mut H) -> usize
    where
        H: Construction + PathOracle + ?Sized,
    {
        let costs = Self::spine_costs(room);
        let mut paved: BTreeSet<Tile> = BTreeSet::new();
        let mut proposed = 0;

        for (from, to) in SPINE_PAIRS {
            let (origins, _) = from.tiles(room);
            let (targets, range) = to.tiles(room);
            for origin in &origins {
                for target in &targets {
                    let Some(path) = host.find_path(&room.name, *origin, *target, range, &costs)
                    else {
                        debug!(room = %room.name, from = %origin, to = %target, "No spine path");
                        continue;
                    };
                    for tile in path {
                        if room.has_road_or_site(tile) || !paved.insert(tile) {
                            continue;
                        }
                        if host
                            .propose_site(&room.name, tile, StructureKind::Road)
                            .is_ok()
                        {
                            proposed += 1;
                        }
                    }
                }
            }
        }

        if proposed > 0 {
            info!(room = %room.name, proposed, "Planned road spine");
        }
        proposed
    }
}
