//! Test fixtures and helpers.
//!
//! Builders for world snapshots and a recording host double, so tests can
//! describe a room in a few lines and inspect every side effect the
//! autopilot requested.

use std::collections::BTreeMap;

use colony_core::components::{AgentId, ObjectId, Position, RoomName, Tile};
use colony_core::host::{
    ActionOutcome, Capabilities, Construction, PathCosts, PathOracle, SpawnOutcome, Spawner,
};
use colony_core::math::Fixed;
use colony_core::snapshot::{
    AgentSnapshot, ConstructionSite, Controller, Landmark, Loot, LootKind, Ownership,
    ResourceNode, RoomSnapshot, Store, Structure, StructureKind, Terrain, WorldSnapshot,
};

/// Room name used by single-room fixtures.
pub const HOME: &str = "W1N1";

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In autopilot code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Position in the [`HOME`] room.
#[must_use]
pub fn home(x: u8, y: u8) -> Position {
    Position::new(RoomName::new(HOME), Tile::new(x, y))
}

// ============================================================================
// Room builder
// ============================================================================

/// Fluent builder for a [`RoomSnapshot`]. Object ids are assigned from a
/// counter so every object in a fixture is unique.
#[derive(Debug, Clone)]
pub struct RoomBuilder {
    room: RoomSnapshot,
    next_id: u64,
}

impl RoomBuilder {
    /// Start an empty room. Ids start at `first_id`.
    #[must_use]
    pub fn new(name: &str, first_id: u64) -> Self {
        Self {
            room: RoomSnapshot::new(RoomName::new(name)),
            next_id: first_id,
        }
    }

    /// Start the [`HOME`] room with ids from 1.
    #[must_use]
    pub fn home() -> Self {
        Self::new(HOME, 1)
    }

    fn id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Id the next added object will get.
    #[must_use]
    pub const fn peek_id(&self) -> ObjectId {
        ObjectId(self.next_id)
    }

    /// Set terrain on a tile.
    #[must_use]
    pub fn terrain(mut self, x: u8, y: u8, terrain: Terrain) -> Self {
        self.room.terrain.set(Tile::new(x, y), terrain);
        self
    }

    /// Wall off a rectangle, inclusive.
    #[must_use]
    pub fn walls(mut self, from: (u8, u8), to: (u8, u8)) -> Self {
        for x in from.0..=to.0 {
            for y in from.1..=to.1 {
                self.room.terrain.set(Tile::new(x, y), Terrain::Wall);
            }
        }
        self
    }

    /// Add a structure with full hits.
    #[must_use]
    pub fn structure(self, kind: StructureKind, x: u8, y: u8) -> Self {
        self.structure_with(kind, x, y, |_| {})
    }

    /// Add a structure and adjust it before insertion.
    #[must_use]
    pub fn structure_with<F>(mut self, kind: StructureKind, x: u8, y: u8, adjust: F) -> Self
    where
        F: FnOnce(&mut Structure),
    {
        let (hits, owner, store) = defaults_for(kind);
        let mut structure = Structure {
            id: self.id(),
            kind,
            tile: Tile::new(x, y),
            hits,
            hits_max: hits,
            owner,
            store,
        };
        adjust(&mut structure);
        self.room.structures.push(structure);
        self
    }

    /// Add a road with the given hits out of 5000.
    #[must_use]
    pub fn road(self, x: u8, y: u8, hits: u32) -> Self {
        self.structure_with(StructureKind::Road, x, y, |s| s.hits = hits)
    }

    /// Add a store structure holding `used` energy.
    #[must_use]
    pub fn store(self, kind: StructureKind, x: u8, y: u8, used: u32) -> Self {
        self.structure_with(kind, x, y, |s| {
            if let Some(store) = s.store.as_mut() {
                store.used = used.min(store.capacity);
            }
        })
    }

    /// Add one of our construction sites.
    #[must_use]
    pub fn site(mut self, kind: StructureKind, x: u8, y: u8, progress: u32, total: u32) -> Self {
        let site = ConstructionSite {
            id: self.id(),
            kind,
            tile: Tile::new(x, y),
            progress,
            progress_total: total,
            mine: true,
        };
        self.room.sites.push(site);
        self
    }

    /// Add a resource node.
    #[must_use]
    pub fn node(mut self, x: u8, y: u8, energy: u32, capacity: u32) -> Self {
        let node = ResourceNode {
            id: self.id(),
            tile: Tile::new(x, y),
            energy,
            energy_capacity: capacity,
        };
        self.room.nodes.push(node);
        self
    }

    /// Add a loot pile.
    #[must_use]
    pub fn loot(mut self, kind: LootKind, x: u8, y: u8, amount: u32, decay: Option<u32>) -> Self {
        let loot = Loot {
            id: self.id(),
            kind,
            tile: Tile::new(x, y),
            amount,
            ticks_to_decay: decay,
        };
        self.room.loot.push(loot);
        self
    }

    /// Add our controller.
    #[must_use]
    pub fn controller(mut self, x: u8, y: u8, ticks_to_downgrade: u32) -> Self {
        self.room.controller = Some(Controller {
            id: self.id(),
            tile: Tile::new(x, y),
            ticks_to_downgrade,
            mine: true,
        });
        self
    }

    /// Add the idle landmark.
    #[must_use]
    pub fn landmark(mut self, x: u8, y: u8) -> Self {
        self.room.idle_landmark = Some(Landmark {
            id: self.id(),
            tile: Tile::new(x, y),
        });
        self
    }

    /// The finished room.
    #[must_use]
    pub fn build(self) -> RoomSnapshot {
        self.room
    }
}

fn defaults_for(kind: StructureKind) -> (u32, Ownership, Option<Store>) {
    match kind {
        StructureKind::Spawn => (5000, Ownership::Mine, Some(Store::new(0, 300))),
        StructureKind::Extension => (1000, Ownership::Mine, Some(Store::new(0, 50))),
        StructureKind::Tower => (3000, Ownership::Mine, Some(Store::new(0, 1000))),
        StructureKind::Storage => (10_000, Ownership::Mine, Some(Store::new(0, 100_000))),
        StructureKind::Container => (250_000, Ownership::Neutral, Some(Store::new(0, 2000))),
        StructureKind::Link => (1000, Ownership::Mine, Some(Store::new(0, 800))),
        StructureKind::Terminal => (3000, Ownership::Mine, Some(Store::new(0, 300_000))),
        StructureKind::Road => (5000, Ownership::Neutral, None),
        StructureKind::Rampart => (10_000, Ownership::Mine, None),
        StructureKind::Wall => (1_000_000, Ownership::Neutral, None),
        StructureKind::KeeperLair | StructureKind::InvaderCore => (100_000, Ownership::Hostile, None),
        StructureKind::Lab | StructureKind::Factory => (500, Ownership::Mine, None),
    }
}

// ============================================================================
// World builder
// ============================================================================

/// Fluent builder for a [`WorldSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct WorldBuilder {
    tick: u64,
    rooms: Vec<RoomSnapshot>,
    agents: Vec<AgentSnapshot>,
}

impl WorldBuilder {
    /// Start a world at a tick.
    #[must_use]
    pub fn at(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Add a room.
    #[must_use]
    pub fn room(mut self, room: RoomSnapshot) -> Self {
        self.rooms.push(room);
        self
    }

    /// Add an agent in the [`HOME`] room.
    #[must_use]
    pub fn agent(mut self, id: u64, x: u8, y: u8, carried: u32) -> Self {
        self.agents.push(agent(id, home(x, y), carried, 50));
        self
    }

    /// Add a fully described agent.
    #[must_use]
    pub fn agent_snapshot(mut self, agent: AgentSnapshot) -> Self {
        self.agents.push(agent);
        self
    }

    /// The finished snapshot.
    #[must_use]
    pub fn build(self) -> WorldSnapshot {
        let mut world = WorldSnapshot::new(self.tick);
        for room in self.rooms {
            world.insert_room(room);
        }
        for agent in self.agents {
            world.insert_agent(agent);
        }
        world
    }
}

/// An unfatigued agent.
#[must_use]
pub fn agent(id: u64, pos: Position, carried: u32, capacity: u32) -> AgentSnapshot {
    AgentSnapshot {
        id: AgentId(id),
        pos,
        carried,
        capacity,
        fatigue: 0,
    }
}

/// A small working room: a spawn, two extensions, a container, one node, a
/// controller and a landmark, with ids from 1.
#[must_use]
pub fn starter_room() -> RoomSnapshot {
    RoomBuilder::home()
        .structure(StructureKind::Spawn, 25, 25)
        .store(StructureKind::Extension, 27, 25, 0)
        .store(StructureKind::Extension, 27, 26, 50)
        .store(StructureKind::Container, 11, 12, 400)
        .node(10, 10, 3000, 3000)
        .controller(40, 40, 20_000)
        .landmark(30, 30)
        .build()
}

// ============================================================================
// Recording host
// ============================================================================

/// One side effect requested from a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// `move_toward(agent, target, range)`.
    Move(AgentId, Position, u8),
    /// `harvest(agent, node)`.
    Harvest(AgentId, ObjectId),
    /// `transfer(agent, target)`.
    Transfer(AgentId, ObjectId),
    /// `withdraw(agent, target)`.
    Withdraw(AgentId, ObjectId),
    /// `pick_up(agent, loot)`.
    PickUp(AgentId, ObjectId),
    /// `build(agent, site)`.
    Build(AgentId, ObjectId),
    /// `repair(agent, target)`.
    Repair(AgentId, ObjectId),
    /// `upgrade(agent, controller)`.
    Upgrade(AgentId, ObjectId),
    /// `propose_site(room, tile, kind)`.
    Propose(RoomName, Tile, StructureKind),
    /// `retract_site(room, tile, kind)`.
    Retract(RoomName, Tile, StructureKind),
    /// `spawn_agent(room)`.
    Spawn(RoomName),
}

/// Host double that accepts everything and records what was asked.
///
/// Work actions answer with `work_outcome` (default [`ActionOutcome::Ok`]);
/// per-target overrides win. Paths are straight Chebyshev lines that treat
/// impassable overrides as blocking.
#[derive(Debug, Clone)]
pub struct RecordingHost {
    /// Every call, in order.
    pub calls: Vec<HostCall>,
    /// Outcome for work actions without an override.
    pub work_outcome: ActionOutcome,
    /// Outcome for moves.
    pub move_outcome: ActionOutcome,
    /// Outcome for spawn requests.
    pub spawn_outcome: SpawnOutcome,
    /// Per-target outcomes for work actions.
    pub overrides: BTreeMap<ObjectId, ActionOutcome>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            work_outcome: ActionOutcome::Ok,
            move_outcome: ActionOutcome::Ok,
            spawn_outcome: SpawnOutcome::Ok,
            overrides: BTreeMap::new(),
        }
    }
}

impl RecordingHost {
    /// A host that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every work action on `target` answer `outcome`.
    #[must_use]
    pub fn with_override(mut self, target: ObjectId, outcome: ActionOutcome) -> Self {
        self.overrides.insert(target, outcome);
        self
    }

    fn work(&mut self, call: HostCall, target: ObjectId) -> ActionOutcome {
        self.calls.push(call);
        self.overrides
            .get(&target)
            .cloned()
            .unwrap_or_else(|| self.work_outcome.clone())
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Recorded site proposals.
    #[must_use]
    pub fn proposals(&self) -> Vec<Tile> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Propose(_, tile, _) => Some(*tile),
                _ => None,
            })
            .collect()
    }

    /// Recorded site retractions.
    #[must_use]
    pub fn retractions(&self) -> Vec<Tile> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                HostCall::Retract(_, tile, _) => Some(*tile),
                _ => None,
            })
            .collect()
    }

    /// Calls made on behalf of one agent.
    #[must_use]
    pub fn calls_for(&self, agent: AgentId) -> Vec<&HostCall> {
        self.calls
            .iter()
            .filter(|call| call_agent(call) == Some(agent))
            .collect()
    }
}

fn call_agent(call: &HostCall) -> Option<AgentId> {
    match call {
        HostCall::Move(a, _, _)
        | HostCall::Harvest(a, _)
        | HostCall::Transfer(a, _)
        | HostCall::Withdraw(a, _)
        | HostCall::PickUp(a, _)
        | HostCall::Build(a, _)
        | HostCall::Repair(a, _)
        | HostCall::Upgrade(a, _) => Some(*a),
        HostCall::Propose(..) | HostCall::Retract(..) | HostCall::Spawn(_) => None,
    }
}

impl Capabilities for RecordingHost {
    fn move_toward(&mut self, agent: AgentId, target: &Position, range: u8) -> ActionOutcome {
        self.calls.push(HostCall::Move(agent, target.clone(), range));
        self.move_outcome.clone()
    }

    fn harvest(&mut self, agent: AgentId, node: ObjectId) -> ActionOutcome {
        self.work(HostCall::Harvest(agent, node), node)
    }

    fn transfer(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome {
        self.work(HostCall::Transfer(agent, target), target)
    }

    fn withdraw(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome {
        self.work(HostCall::Withdraw(agent, target), target)
    }

    fn pick_up(&mut self, agent: AgentId, loot: ObjectId) -> ActionOutcome {
        self.work(HostCall::PickUp(agent, loot), loot)
    }

    fn build(&mut self, agent: AgentId, site: ObjectId) -> ActionOutcome {
        self.work(HostCall::Build(agent, site), site)
    }

    fn repair(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome {
        self.work(HostCall::Repair(agent, target), target)
    }

    fn upgrade(&mut self, agent: AgentId, controller: ObjectId) -> ActionOutcome {
        self.work(HostCall::Upgrade(agent, controller), controller)
    }
}

impl Construction for RecordingHost {
    fn propose_site(&mut self, room: &RoomName, tile: Tile, kind: StructureKind) -> ActionOutcome {
        self.calls.push(HostCall::Propose(room.clone(), tile, kind));
        ActionOutcome::Ok
    }

    fn retract_site(&mut self, room: &RoomName, tile: Tile, kind: StructureKind) -> ActionOutcome {
        self.calls.push(HostCall::Retract(room.clone(), tile, kind));
        ActionOutcome::Ok
    }
}

impl Spawner for RecordingHost {
    fn spawn_agent(&mut self, room: &RoomName) -> SpawnOutcome {
        self.calls.push(HostCall::Spawn(room.clone()));
        self.spawn_outcome
    }
}

impl PathOracle for RecordingHost {
    fn find_path(
        &self,
        _room: &RoomName,
        from: Tile,
        to: Tile,
        range: u8,
        costs: &PathCosts,
    ) -> Option<Vec<Tile>> {
        let mut path = Vec::new();
        let mut at = from;
        while at.range_to(to) > range {
            let step = |a: u8, b: u8| match a.cmp(&b) {
                std::cmp::Ordering::Less => a + 1,
                std::cmp::Ordering::Greater => a - 1,
                std::cmp::Ordering::Equal => a,
            };
            at = Tile::new(step(at.x, to.x), step(at.y, to.y));
            if costs.overrides.get(&at) == Some(&colony_core::host::IMPASSABLE) {
                return None;
            }
            path.push(at);
        }
        Some(path)
    }
}
