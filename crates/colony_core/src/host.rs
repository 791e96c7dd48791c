//! The boundary between the autopilot and the world it drives.
//!
//! The autopilot never mutates world state directly. Every side effect goes
//! through one of these traits, implemented by the host (the headless
//! simulator in `colony_sim`, or a test double).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::{AgentId, ObjectId, Position, RoomName, Tile};
use crate::snapshot::StructureKind;

/// Result of a capability call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// The action took effect.
    Ok,
    /// The target is too far away; move closer and retry.
    NotInRange,
    /// The target is invalid or blocked.
    Failed(String),
}

impl ActionOutcome {
    /// Shorthand for a failure with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Whether the action took effect.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Per-agent world actions.
pub trait Capabilities {
    /// Take one step toward `target`, stopping within `range` tiles.
    fn move_toward(&mut self, agent: AgentId, target: &Position, range: u8) -> ActionOutcome;

    /// Extract energy from a resource node.
    fn harvest(&mut self, agent: AgentId, node: ObjectId) -> ActionOutcome;

    /// Deliver carried energy into a store.
    fn transfer(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome;

    /// Take energy out of a store, tombstone or ruin.
    fn withdraw(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome;

    /// Pick up a dropped pile.
    fn pick_up(&mut self, agent: AgentId, loot: ObjectId) -> ActionOutcome;

    /// Spend carried energy on a construction site.
    fn build(&mut self, agent: AgentId, site: ObjectId) -> ActionOutcome;

    /// Spend carried energy restoring a structure.
    fn repair(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome;

    /// Spend carried energy on the growth controller.
    fn upgrade(&mut self, agent: AgentId, controller: ObjectId) -> ActionOutcome;
}

/// Placing and removing construction proposals.
pub trait Construction {
    /// Propose a structure on a tile.
    fn propose_site(&mut self, room: &RoomName, tile: Tile, kind: StructureKind) -> ActionOutcome;

    /// Remove our pending proposals of `kind` on a tile.
    fn retract_site(&mut self, room: &RoomName, tile: Tile, kind: StructureKind) -> ActionOutcome;
}

/// Result of a spawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnOutcome {
    /// A new agent is on its way.
    Ok,
    /// The spawner is already working.
    Busy,
    /// Not enough energy for even the cheapest agent.
    NotEnoughEnergy,
    /// No spawner we own exists.
    NoSpawner,
    /// The host refused for another reason.
    Rejected,
}

impl fmt::Display for SpawnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::Busy => "busy",
            Self::NotEnoughEnergy => "not enough energy",
            Self::NoSpawner => "no spawner",
            Self::Rejected => "rejected",
        };
        f.write_str(text)
    }
}

/// Creating new agents. Body composition is the host's business.
pub trait Spawner {
    /// Request one new agent in a room.
    fn spawn_agent(&mut self, room: &RoomName) -> SpawnOutcome;
}

/// Path cost that makes a tile impassable.
pub const IMPASSABLE: u8 = u8::MAX;

/// Movement costs for a path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCosts {
    /// Cost of a plain tile.
    pub plain: u8,
    /// Cost of a swamp tile.
    pub swamp: u8,
    /// Per-tile costs replacing the terrain cost. [`IMPASSABLE`] blocks.
    pub overrides: BTreeMap<Tile, u8>,
}

impl Default for PathCosts {
    fn default() -> Self {
        Self {
            plain: 1,
            swamp: 5,
            overrides: BTreeMap::new(),
        }
    }
}

/// Opaque path search.
pub trait PathOracle {
    /// Tiles from `from` (exclusive) to within `range` of `to`, or `None` when
    /// no path exists.
    fn find_path(
        &self,
        room: &RoomName,
        from: Tile,
        to: Tile,
        range: u8,
        costs: &PathCosts,
    ) -> Option<Vec<Tile>>;
}

/// Everything the tick driver needs from the world.
pub trait Host: Capabilities + Construction + Spawner + PathOracle {}

impl<T: Capabilities + Construction + Spawner + PathOracle> Host for T {}
