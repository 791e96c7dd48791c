//! Scenario loading and configuration.
//!
//! Scenarios describe the starting world for a headless run: rooms with
//! their terrain and objects, the starting agents, and optional overrides of
//! the autopilot configuration.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use colony_core::components::{Position, RoomName, Tile, ROOM_SIZE};
use colony_core::config::ColonyConfig;
use colony_core::snapshot::{
    ConstructionSite, Controller, Landmark, Loot, LootKind, ResourceNode, RoomSnapshot,
    StructureKind, Terrain,
};

use crate::world::{build_cost, new_structure, SimWorld, CONTROLLER_DOWNGRADE};

/// Name that [`Scenario::resolve`] maps to the built-in scenario.
pub const STARTER: &str = "starter";

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The scenario parsed but describes an impossible world.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// Axis-aligned block of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left column.
    pub x: u8,
    /// Top row.
    pub y: u8,
    /// Width in tiles.
    pub width: u8,
    /// Height in tiles.
    pub height: u8,
}

impl Rect {
    /// Tiles covered by the block, clipped to the room.
    pub fn tiles(self) -> impl Iterator<Item = Tile> {
        let x_end = self.x.saturating_add(self.width).min(ROOM_SIZE);
        let y_end = self.y.saturating_add(self.height).min(ROOM_SIZE);
        (self.y..y_end).flat_map(move |y| (self.x..x_end).map(move |x| Tile::new(x, y)))
    }
}

/// A structure to place at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructurePlacement {
    /// Structure kind.
    pub kind: StructureKind,
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Energy initially stored; ignored for kinds without a store.
    #[serde(default)]
    pub energy: u32,
}

/// A construction site to place at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePlacement {
    /// Kind being built.
    pub kind: StructureKind,
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Work already done.
    #[serde(default)]
    pub progress: u32,
}

fn default_node_capacity() -> u32 {
    3000
}

/// A resource node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePlacement {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Energy per regeneration cycle; the node starts full.
    #[serde(default = "default_node_capacity")]
    pub capacity: u32,
}

/// Energy lying around at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootPlacement {
    /// Loot kind.
    pub kind: LootKind,
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Energy held.
    pub amount: u32,
    /// Ticks until it disappears.
    #[serde(default)]
    pub ticks_to_decay: Option<u32>,
}

/// One room of the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSetup {
    /// Room name.
    pub name: String,
    /// Impassable blocks.
    #[serde(default)]
    pub walls: Vec<Rect>,
    /// Swamp blocks.
    #[serde(default)]
    pub swamps: Vec<Rect>,
    /// Finished structures.
    #[serde(default)]
    pub structures: Vec<StructurePlacement>,
    /// Construction sites.
    #[serde(default)]
    pub sites: Vec<SitePlacement>,
    /// Resource nodes.
    #[serde(default)]
    pub nodes: Vec<NodePlacement>,
    /// Loose energy.
    #[serde(default)]
    pub loot: Vec<LootPlacement>,
    /// Our controller, if the room has one.
    #[serde(default)]
    pub controller: Option<(u8, u8)>,
    /// Where idle agents gather.
    #[serde(default)]
    pub landmark: Option<(u8, u8)>,
}

fn default_count() -> u32 {
    1
}

/// Starting agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSetup {
    /// Room the agents start in.
    pub room: String,
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
    /// Energy each agent carries.
    #[serde(default)]
    pub carried: u32,
    /// How many agents start on this tile.
    #[serde(default = "default_count")]
    pub count: u32,
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Rooms in the world.
    pub rooms: Vec<RoomSetup>,
    /// Starting agents.
    #[serde(default)]
    pub agents: Vec<AgentSetup>,
    /// Autopilot configuration; defaults apply when absent.
    #[serde(default)]
    pub config: Option<ColonyConfig>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// The built-in scenario for `"starter"`, otherwise a RON file path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        if name_or_path == STARTER {
            Ok(Self::starter())
        } else {
            Self::load(name_or_path)
        }
    }

    /// One home room with a spawn, two nodes and four empty-handed agents.
    #[must_use]
    pub fn starter() -> Self {
        let structure = |kind, x, y, energy| StructurePlacement { kind, x, y, energy };
        Self {
            name: STARTER.to_string(),
            description: "Single room with a fresh spawn and a handful of workers".to_string(),
            rooms: vec![RoomSetup {
                name: "W1N1".to_string(),
                walls: vec![
                    Rect { x: 0, y: 0, width: 50, height: 2 },
                    Rect { x: 14, y: 32, width: 12, height: 3 },
                ],
                swamps: vec![Rect { x: 30, y: 14, width: 6, height: 6 }],
                structures: vec![
                    structure(StructureKind::Spawn, 25, 25, 300),
                    structure(StructureKind::Extension, 22, 23, 0),
                    structure(StructureKind::Extension, 23, 23, 0),
                    structure(StructureKind::Container, 12, 12, 0),
                    structure(StructureKind::Tower, 28, 22, 0),
                ],
                sites: vec![
                    SitePlacement { kind: StructureKind::Extension, x: 24, y: 23, progress: 0 },
                    SitePlacement { kind: StructureKind::Extension, x: 21, y: 23, progress: 0 },
                ],
                nodes: vec![
                    NodePlacement { x: 10, y: 10, capacity: 3000 },
                    NodePlacement { x: 40, y: 8, capacity: 3000 },
                ],
                loot: vec![LootPlacement {
                    kind: LootKind::Dropped,
                    x: 30,
                    y: 28,
                    amount: 120,
                    ticks_to_decay: Some(400),
                }],
                controller: Some((40, 40)),
                landmark: Some((30, 30)),
            }],
            agents: vec![AgentSetup {
                room: "W1N1".to_string(),
                x: 25,
                y: 27,
                carried: 0,
                count: 4,
            }],
            config: None,
        }
    }

    /// The autopilot configuration this scenario runs with.
    #[must_use]
    pub fn colony_config(&self) -> ColonyConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Reject scenarios that cannot be turned into a world.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.rooms.is_empty() {
            return Err(ScenarioError::Invalid("no rooms".into()));
        }
        let mut names = BTreeSet::new();
        for room in &self.rooms {
            if !names.insert(room.name.as_str()) {
                return Err(ScenarioError::Invalid(format!("duplicate room {}", room.name)));
            }
            let points = room
                .structures
                .iter()
                .map(|s| (s.x, s.y))
                .chain(room.sites.iter().map(|s| (s.x, s.y)))
                .chain(room.nodes.iter().map(|n| (n.x, n.y)))
                .chain(room.loot.iter().map(|l| (l.x, l.y)))
                .chain(room.controller)
                .chain(room.landmark);
            for (x, y) in points {
                if x >= ROOM_SIZE || y >= ROOM_SIZE {
                    return Err(ScenarioError::Invalid(format!(
                        "({x},{y}) is outside room {}",
                        room.name
                    )));
                }
            }
        }
        for agent in &self.agents {
            if !names.contains(agent.room.as_str()) {
                return Err(ScenarioError::Invalid(format!(
                    "agents placed in unknown room {}",
                    agent.room
                )));
            }
            if agent.x >= ROOM_SIZE || agent.y >= ROOM_SIZE {
                return Err(ScenarioError::Invalid(format!(
                    "agent at ({},{}) is outside room {}",
                    agent.x, agent.y, agent.room
                )));
            }
        }
        if let Some(config) = &self.config {
            config
                .validate()
                .map_err(|e| ScenarioError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Build the starting world.
    pub fn build_world(&self) -> Result<SimWorld, ScenarioError> {
        self.validate()?;
        let mut world = SimWorld::new();

        for setup in &self.rooms {
            let room = build_room(&mut world, setup);
            for agent in self.agents.iter().filter(|a| a.room == setup.name) {
                let tile = Tile::new(agent.x, agent.y);
                if !room.terrain_at(tile).is_passable() {
                    return Err(ScenarioError::Invalid(format!(
                        "agent at {tile} in {} stands in a wall",
                        setup.name
                    )));
                }
            }
            world.insert_room(room);
        }

        for agent in &self.agents {
            for _ in 0..agent.count {
                world.add_agent(
                    Position::new(RoomName::new(agent.room.as_str()), Tile::new(agent.x, agent.y)),
                    agent.carried,
                );
            }
        }
        Ok(world)
    }
}

fn build_room(world: &mut SimWorld, setup: &RoomSetup) -> RoomSnapshot {
    let mut room = RoomSnapshot::new(RoomName::new(setup.name.as_str()));
    for tile in setup.walls.iter().flat_map(|r| r.tiles()) {
        room.terrain.set(tile, Terrain::Wall);
    }
    for tile in setup.swamps.iter().flat_map(|r| r.tiles()) {
        room.terrain.set(tile, Terrain::Swamp);
    }

    for placement in &setup.structures {
        let mut structure = new_structure(
            world.allocate_id(),
            placement.kind,
            Tile::new(placement.x, placement.y),
        );
        if let Some(store) = structure.store.as_mut() {
            store.used = placement.energy.min(store.capacity);
        }
        room.structures.push(structure);
    }
    for site in &setup.sites {
        let total = build_cost(site.kind);
        room.sites.push(ConstructionSite {
            id: world.allocate_id(),
            kind: site.kind,
            tile: Tile::new(site.x, site.y),
            progress: site.progress.min(total.saturating_sub(1)),
            progress_total: total,
            mine: true,
        });
    }
    for node in &setup.nodes {
        room.nodes.push(ResourceNode {
            id: world.allocate_id(),
            tile: Tile::new(node.x, node.y),
            energy: node.capacity,
            energy_capacity: node.capacity,
        });
    }
    for loot in &setup.loot {
        room.loot.push(Loot {
            id: world.allocate_id(),
            kind: loot.kind,
            tile: Tile::new(loot.x, loot.y),
            amount: loot.amount,
            ticks_to_decay: loot.ticks_to_decay,
        });
    }
    if let Some((x, y)) = setup.controller {
        room.controller = Some(Controller {
            id: world.allocate_id(),
            tile: Tile::new(x, y),
            ticks_to_downgrade: CONTROLLER_DOWNGRADE,
            mine: true,
        });
    }
    if let Some((x, y)) = setup.landmark {
        room.idle_landmark = Some(Landmark {
            id: world.allocate_id(),
            tile: Tile::new(x, y),
        });
    }
    room
}
