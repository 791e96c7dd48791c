//! Mutable grid world that hosts the autopilot.
//!
//! [`SimWorld`] keeps each room as a [`RoomSnapshot`] it mutates in place,
//! plus the agents walking around in it. Capability calls take effect
//! immediately; [`SimWorld::advance`] then applies the passive rules
//! (fatigue recovery, regeneration, decay, agent expiry) and moves the clock.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use colony_core::components::{AgentId, ObjectId, Position, RoomName, Tile, ROOM_SIZE};
use colony_core::host::{
    ActionOutcome, Capabilities, Construction, PathCosts, PathOracle, SpawnOutcome, Spawner,
    IMPASSABLE,
};
use colony_core::snapshot::{
    AgentSnapshot, ConstructionSite, Loot, LootKind, Ownership, RoomSnapshot, Store, Structure,
    StructureKind, Terrain, WorldSnapshot,
};

use crate::pathfinding::{self, step_cost};

/// Range of harvest, transfer, withdraw and pick-up.
pub const TOUCH_RANGE: u8 = 1;
/// Range of build, repair and upgrade.
pub const WORK_RANGE: u8 = 3;

/// Energy an agent can carry.
pub const AGENT_CAPACITY: u32 = 50;
/// Work parts on every agent; scales all work actions.
pub const WORK_PARTS: u32 = 2;
/// Energy harvested per work part per tick.
pub const HARVEST_POWER: u32 = 2;
/// Construction progress per work part per tick, one energy each.
pub const BUILD_POWER: u32 = 5;
/// Hits restored per energy spent repairing.
pub const REPAIR_POWER: u32 = 100;
/// Energy drawn from spawns and extensions per new agent.
pub const AGENT_COST: u32 = 200;
/// Ticks a spawn stays busy after producing an agent.
pub const SPAWN_TIME: u64 = 9;
/// Ticks an agent lives.
pub const AGENT_LIFETIME: u64 = 1500;
/// Resource nodes refill on multiples of this tick count.
pub const NODE_REGEN_INTERVAL: u64 = 300;
/// Roads lose [`ROAD_DECAY_HITS`] on multiples of this tick count.
pub const ROAD_DECAY_INTERVAL: u64 = 100;
/// Hits a road loses per decay step.
pub const ROAD_DECAY_HITS: u32 = 100;
/// Ticks a tombstone lasts.
pub const TOMBSTONE_DECAY: u32 = 250;
/// Controller countdown after an upgrade.
pub const CONTROLLER_DOWNGRADE: u32 = 20_000;
/// Spawns trickle-charge up to this much energy.
pub const SPAWN_REGEN_CAP: u32 = 300;
/// Construction sites allowed per room.
pub const MAX_SITES: usize = 100;

/// Hits, owner and store of a freshly built structure.
#[must_use]
pub fn structure_template(kind: StructureKind) -> (u32, Ownership, Option<Store>) {
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
        StructureKind::KeeperLair | StructureKind::InvaderCore => {
            (100_000, Ownership::Hostile, None)
        }
        StructureKind::Lab | StructureKind::Factory => (500, Ownership::Mine, None),
    }
}

/// Work needed to finish a construction site.
#[must_use]
pub const fn build_cost(kind: StructureKind) -> u32 {
    match kind {
        StructureKind::Road => 300,
        StructureKind::Extension => 3000,
        StructureKind::Rampart | StructureKind::Wall => 1,
        StructureKind::Spawn => 15_000,
        StructureKind::Storage => 30_000,
        StructureKind::Terminal | StructureKind::Factory => 100_000,
        StructureKind::Lab => 50_000,
        _ => 5000,
    }
}

/// A new structure with template hits, owner and an empty store.
#[must_use]
pub fn new_structure(id: ObjectId, kind: StructureKind, tile: Tile) -> Structure {
    let (hits, owner, store) = structure_template(kind);
    Structure {
        id,
        kind,
        tile,
        hits,
        hits_max: hits,
        owner,
        store,
    }
}

/// Costs agents walk with: roads are cheapest, obstacles block.
#[must_use]
pub fn movement_costs(room: &RoomSnapshot) -> PathCosts {
    let mut costs = PathCosts {
        plain: 2,
        swamp: 10,
        overrides: BTreeMap::new(),
    };
    for structure in &room.structures {
        if structure.kind == StructureKind::Road {
            costs.overrides.entry(structure.tile).or_insert(1);
        } else if structure.kind.is_obstacle() {
            costs.overrides.insert(structure.tile, IMPASSABLE);
        }
    }
    costs
}

/// A worker agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimAgent {
    /// Agent id.
    pub id: AgentId,
    /// Current position.
    pub pos: Position,
    /// Energy carried.
    pub carried: u32,
    /// Carry capacity.
    pub capacity: u32,
    /// Ticks until the agent can move again.
    pub fatigue: u32,
    /// Tick the agent was created.
    pub born_at: u64,
}

/// Running totals of what happened in the world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldStats {
    /// Energy extracted from resource nodes.
    pub energy_harvested: u64,
    /// Energy spent on controllers.
    pub upgrade_work: u64,
    /// Road sites placed.
    pub roads_proposed: u64,
    /// Road sites retracted.
    pub roads_retracted: u64,
    /// Roads completed.
    pub roads_built: u64,
    /// Roads destroyed by decay.
    pub roads_decayed: u64,
    /// Agents produced by spawns.
    pub agents_spawned: u64,
    /// Agents that reached the end of their life.
    pub agents_expired: u64,
    /// Capability calls answered with a failure.
    pub actions_failed: u64,
}

/// The headless world.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimWorld {
    tick: u64,
    rooms: BTreeMap<RoomName, RoomSnapshot>,
    agents: BTreeMap<AgentId, SimAgent>,
    spawn_busy_until: BTreeMap<ObjectId, u64>,
    next_object: u64,
    next_agent: u64,
    stats: WorldStats,
}

impl SimWorld {
    /// An empty world at tick 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: 1,
            next_object: 1,
            next_agent: 1,
            ..Self::default()
        }
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Running totals.
    #[must_use]
    pub const fn stats(&self) -> &WorldStats {
        &self.stats
    }

    /// Reserve a fresh object id.
    pub fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object);
        self.next_object += 1;
        id
    }

    /// Add or replace a room.
    pub fn insert_room(&mut self, room: RoomSnapshot) {
        self.rooms.insert(room.name.clone(), room);
    }

    /// Look up a room.
    #[must_use]
    pub fn room(&self, name: &RoomName) -> Option<&RoomSnapshot> {
        self.rooms.get(name)
    }

    /// All rooms in name order.
    pub fn rooms(&self) -> impl Iterator<Item = &RoomSnapshot> {
        self.rooms.values()
    }

    /// Place a new agent.
    pub fn add_agent(&mut self, pos: Position, carried: u32) -> AgentId {
        let id = AgentId(self.next_agent);
        self.next_agent += 1;
        self.agents.insert(
            id,
            SimAgent {
                id,
                pos,
                carried: carried.min(AGENT_CAPACITY),
                capacity: AGENT_CAPACITY,
                fatigue: 0,
                born_at: self.tick,
            },
        );
        id
    }

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&SimAgent> {
        self.agents.get(&id)
    }

    /// Living agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &SimAgent> {
        self.agents.values()
    }

    /// Number of living agents.
    #[must_use]
    pub fn population(&self) -> usize {
        self.agents.len()
    }

    /// Read-only view for the current tick.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut world = WorldSnapshot::new(self.tick);
        for room in self.rooms.values() {
            world.insert_room(room.clone());
        }
        for agent in self.agents.values() {
            world.insert_agent(AgentSnapshot {
                id: agent.id,
                pos: agent.pos.clone(),
                carried: agent.carried,
                capacity: agent.capacity,
                fatigue: agent.fatigue,
            });
        }
        world
    }

    /// Hash of the whole world state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes.hash(&mut hasher),
            Err(err) => warn!(error = %err, "World state could not be serialized for hashing"),
        }
        hasher.finish()
    }

    /// Apply the passive rules and move to the next tick.
    pub fn advance(&mut self) {
        self.tick += 1;
        let tick = self.tick;

        for agent in self.agents.values_mut() {
            agent.fatigue = agent.fatigue.saturating_sub(1);
        }
        self.expire_agents();

        for room in self.rooms.values_mut() {
            if tick % NODE_REGEN_INTERVAL == 0 {
                for node in &mut room.nodes {
                    node.energy = node.energy_capacity;
                }
            }

            for loot in &mut room.loot {
                if let Some(ticks) = loot.ticks_to_decay.as_mut() {
                    *ticks = ticks.saturating_sub(1);
                }
            }
            room.loot
                .retain(|l| l.amount > 0 && l.ticks_to_decay.map_or(true, |t| t > 0));

            if let Some(controller) = room.controller.as_mut() {
                controller.ticks_to_downgrade = controller.ticks_to_downgrade.saturating_sub(1);
            }

            if tick % ROAD_DECAY_INTERVAL == 0 {
                for road in room
                    .structures
                    .iter_mut()
                    .filter(|s| s.kind == StructureKind::Road)
                {
                    road.hits = road.hits.saturating_sub(ROAD_DECAY_HITS);
                }
                let before = room.structures.len();
                room.structures
                    .retain(|s| s.kind != StructureKind::Road || s.hits > 0);
                let lost = before - room.structures.len();
                if lost > 0 {
                    debug!(room = %room.name, lost, "Roads crumbled");
                    self.stats.roads_decayed += lost as u64;
                }
            }

            for spawn in room
                .structures
                .iter_mut()
                .filter(|s| s.kind == StructureKind::Spawn && s.owner == Ownership::Mine)
            {
                if let Some(store) = spawn.store.as_mut() {
                    if store.used < SPAWN_REGEN_CAP.min(store.capacity) {
                        store.used += 1;
                    }
                }
            }
        }

        self.spawn_busy_until.retain(|_, until| *until > tick);
    }

    /// Remove agents past their lifetime, leaving tombstones behind.
    fn expire_agents(&mut self) {
        let tick = self.tick;
        let expired: Vec<AgentId> = self
            .agents
            .values()
            .filter(|a| a.born_at + AGENT_LIFETIME <= tick)
            .map(|a| a.id)
            .collect();

        for id in expired {
            let Some(agent) = self.agents.remove(&id) else {
                continue;
            };
            self.stats.agents_expired += 1;
            debug!(agent = %id, carried = agent.carried, "Agent expired");
            if agent.carried == 0 {
                continue;
            }
            let loot_id = self.allocate_id();
            if let Some(room) = self.rooms.get_mut(&agent.pos.room) {
                room.loot.push(Loot {
                    id: loot_id,
                    kind: LootKind::Tombstone,
                    tile: agent.pos.tile,
                    amount: agent.carried,
                    ticks_to_decay: Some(TOMBSTONE_DECAY),
                });
            }
        }
    }

    fn reject(&mut self, reason: &str) -> ActionOutcome {
        self.stats.actions_failed += 1;
        ActionOutcome::failed(reason)
    }

    /// Resolve the acting agent and its room, or the failure to report.
    fn actor(&mut self, agent: AgentId) -> Result<(&mut SimAgent, &mut RoomSnapshot), &'static str> {
        let actor = self.agents.get_mut(&agent).ok_or("no such agent")?;
        let room = self
            .rooms
            .get_mut(&actor.pos.room)
            .ok_or("agent is in an unknown room")?;
        Ok((actor, room))
    }

    fn store_energy(&mut self, agent: AgentId, target: ObjectId) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        let structure = room
            .structures
            .iter_mut()
            .find(|s| s.id == target)
            .ok_or("no such structure")?;
        if structure.owner == Ownership::Hostile {
            return Err("structure is hostile");
        }
        let store = structure.store.as_mut().ok_or("structure has no store")?;
        if actor.pos.tile.range_to(structure.tile) > TOUCH_RANGE {
            return Ok(ActionOutcome::NotInRange);
        }
        if actor.carried == 0 {
            return Err("agent carries nothing");
        }
        let amount = actor.carried.min(store.free());
        if amount == 0 {
            return Err("store is full");
        }
        store.used += amount;
        actor.carried -= amount;
        Ok(ActionOutcome::Ok)
    }

    fn take_energy(&mut self, agent: AgentId, target: ObjectId, pick_up: bool) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        let free = actor.capacity.saturating_sub(actor.carried);

        let (tile, available) = match room.loot.iter().position(|l| l.id == target) {
            Some(index) => {
                let loot = &mut room.loot[index];
                let allowed = match loot.kind {
                    LootKind::Dropped => pick_up,
                    LootKind::Tombstone | LootKind::Ruin => !pick_up,
                };
                if !allowed {
                    return Err("wrong action for this loot");
                }
                (loot.tile, &mut loot.amount)
            }
            None if pick_up => return Err("no such pile"),
            None => {
                let structure = room
                    .structures
                    .iter_mut()
                    .find(|s| s.id == target)
                    .ok_or("no such object")?;
                if structure.owner == Ownership::Hostile {
                    return Err("structure is hostile");
                }
                let tile = structure.tile;
                let store = structure.store.as_mut().ok_or("structure has no store")?;
                (tile, &mut store.used)
            }
        };

        if actor.pos.tile.range_to(tile) > TOUCH_RANGE {
            return Ok(ActionOutcome::NotInRange);
        }
        if free == 0 {
            return Err("agent is full");
        }
        let amount = free.min(*available);
        if amount == 0 {
            return Err("nothing left to take");
        }
        *available -= amount;
        actor.carried += amount;
        room.loot.retain(|l| l.amount > 0);
        Ok(ActionOutcome::Ok)
    }

    fn do_harvest(&mut self, agent: AgentId, node: ObjectId) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        let node = room
            .nodes
            .iter_mut()
            .find(|n| n.id == node)
            .ok_or("no such node")?;
        if actor.pos.tile.range_to(node.tile) > TOUCH_RANGE {
            return Ok(ActionOutcome::NotInRange);
        }
        if node.energy == 0 {
            return Err("node is depleted");
        }
        let free = actor.capacity.saturating_sub(actor.carried);
        if free == 0 {
            return Err("agent is full");
        }
        let amount = (HARVEST_POWER * WORK_PARTS).min(node.energy).min(free);
        node.energy -= amount;
        actor.carried += amount;
        self.stats.energy_harvested += u64::from(amount);
        Ok(ActionOutcome::Ok)
    }

    fn do_build(&mut self, agent: AgentId, site: ObjectId) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        let index = room
            .sites
            .iter()
            .position(|s| s.id == site && s.mine)
            .ok_or("no such site")?;
        let target = &mut room.sites[index];
        if actor.pos.tile.range_to(target.tile) > WORK_RANGE {
            return Ok(ActionOutcome::NotInRange);
        }
        if actor.carried == 0 {
            return Err("agent carries nothing");
        }
        let remaining = target.progress_total.saturating_sub(target.progress);
        let spent = (BUILD_POWER * WORK_PARTS).min(actor.carried).min(remaining);
        target.progress += spent;
        actor.carried -= spent;

        if target.is_complete() {
            let finished: ConstructionSite = room.sites.remove(index);
            room.structures
                .push(new_structure(finished.id, finished.kind, finished.tile));
            debug!(room = %room.name, tile = %finished.tile, kind = ?finished.kind, "Construction finished");
            if finished.kind == StructureKind::Road {
                self.stats.roads_built += 1;
            }
        }
        Ok(ActionOutcome::Ok)
    }

    fn do_repair(&mut self, agent: AgentId, target: ObjectId) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        let structure = room
            .structures
            .iter_mut()
            .find(|s| s.id == target)
            .ok_or("no such structure")?;
        if actor.pos.tile.range_to(structure.tile) > WORK_RANGE {
            return Ok(ActionOutcome::NotInRange);
        }
        if !structure.is_damaged() {
            return Err("structure is not damaged");
        }
        if actor.carried == 0 {
            return Err("agent carries nothing");
        }
        let missing = structure.hits_max - structure.hits;
        let spent = WORK_PARTS.min(actor.carried).min(missing.div_ceil(REPAIR_POWER));
        structure.hits = (structure.hits + spent * REPAIR_POWER).min(structure.hits_max);
        actor.carried -= spent;
        Ok(ActionOutcome::Ok)
    }

    fn do_upgrade(&mut self, agent: AgentId, controller: ObjectId) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        let target = room
            .controller
            .as_mut()
            .filter(|c| c.id == controller)
            .ok_or("no such controller")?;
        if !target.mine {
            return Err("controller is not ours");
        }
        if actor.pos.tile.range_to(target.tile) > WORK_RANGE {
            return Ok(ActionOutcome::NotInRange);
        }
        if actor.carried == 0 {
            return Err("agent carries nothing");
        }
        let spent = WORK_PARTS.min(actor.carried);
        actor.carried -= spent;
        target.ticks_to_downgrade = CONTROLLER_DOWNGRADE;
        self.stats.upgrade_work += u64::from(spent);
        Ok(ActionOutcome::Ok)
    }

    fn do_move(&mut self, agent: AgentId, target: &Position, range: u8) -> Result<ActionOutcome, &'static str> {
        let (actor, room) = self.actor(agent)?;
        if actor.fatigue > 0 {
            return Err("agent is fatigued");
        }
        if actor.pos.room != target.room {
            return Err("target is in another room");
        }
        let costs = movement_costs(room);
        let path = pathfinding::find_path(&room.terrain, actor.pos.tile, target.tile, range, &costs)
            .ok_or("no path")?;
        let Some(&next) = path.first() else {
            return Ok(ActionOutcome::Ok);
        };
        let cost = step_cost(&room.terrain, next, &costs).ok_or("no path")?;
        actor.pos.tile = next;
        actor.fatigue = cost;
        Ok(ActionOutcome::Ok)
    }

    fn settle(&mut self, result: Result<ActionOutcome, &'static str>) -> ActionOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(reason) => self.reject(reason),
        }
    }
}

impl Capabilities for SimWorld {
    fn move_toward(&mut self, agent: AgentId, target: &Position, range: u8) -> ActionOutcome {
        let result = self.do_move(agent, target, range);
        self.settle(result)
    }

    fn harvest(&mut self, agent: AgentId, node: ObjectId) -> ActionOutcome {
        let result = self.do_harvest(agent, node);
        self.settle(result)
    }

    fn transfer(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome {
        let result = self.store_energy(agent, target);
        self.settle(result)
    }

    fn withdraw(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome {
        let result = self.take_energy(agent, target, false);
        self.settle(result)
    }

    fn pick_up(&mut self, agent: AgentId, loot: ObjectId) -> ActionOutcome {
        let result = self.take_energy(agent, loot, true);
        self.settle(result)
    }

    fn build(&mut self, agent: AgentId, site: ObjectId) -> ActionOutcome {
        let result = self.do_build(agent, site);
        self.settle(result)
    }

    fn repair(&mut self, agent: AgentId, target: ObjectId) -> ActionOutcome {
        let result = self.do_repair(agent, target);
        self.settle(result)
    }

    fn upgrade(&mut self, agent: AgentId, controller: ObjectId) -> ActionOutcome {
        let result = self.do_upgrade(agent, controller);
        self.settle(result)
    }
}

impl Construction for SimWorld {
    fn propose_site(&mut self, room: &RoomName, tile: Tile, kind: StructureKind) -> ActionOutcome {
        let verdict = match self.rooms.get(room) {
            None => Some("unknown room"),
            Some(_) if tile.x >= ROOM_SIZE || tile.y >= ROOM_SIZE => Some("tile is outside the room"),
            Some(r) if r.terrain_at(tile) == Terrain::Wall && kind != StructureKind::Road => {
                Some("tile is a wall")
            }
            Some(r) if r.sites_at(tile).next().is_some() => Some("tile already has a site"),
            Some(r) if r.structures_at(tile).any(|s| s.kind == kind || s.kind.is_obstacle()) => {
                Some("tile is occupied")
            }
            Some(r) if r.sites.len() >= MAX_SITES => Some("too many sites"),
            Some(_) => None,
        };
        if let Some(reason) = verdict {
            return self.reject(reason);
        }

        let id = self.allocate_id();
        if let Some(r) = self.rooms.get_mut(room) {
            r.sites.push(ConstructionSite {
                id,
                kind,
                tile,
                progress: 0,
                progress_total: build_cost(kind),
                mine: true,
            });
        }
        if kind == StructureKind::Road {
            self.stats.roads_proposed += 1;
        }
        ActionOutcome::Ok
    }

    fn retract_site(&mut self, room: &RoomName, tile: Tile, kind: StructureKind) -> ActionOutcome {
        let Some(r) = self.rooms.get_mut(room) else {
            return self.reject("unknown room");
        };
        let before = r.sites.len();
        r.sites
            .retain(|s| !(s.mine && s.tile == tile && s.kind == kind));
        let removed = before - r.sites.len();
        if removed == 0 {
            return self.reject("no site to retract");
        }
        if kind == StructureKind::Road {
            self.stats.roads_retracted += removed as u64;
        }
        ActionOutcome::Ok
    }
}

impl Spawner for SimWorld {
    fn spawn_agent(&mut self, room: &RoomName) -> SpawnOutcome {
        let tick = self.tick;
        let Some(r) = self.rooms.get_mut(room) else {
            return SpawnOutcome::NoSpawner;
        };
        let Some((spawn_id, spawn_tile)) = r
            .structures
            .iter()
            .find(|s| s.kind == StructureKind::Spawn && s.owner == Ownership::Mine)
            .map(|s| (s.id, s.tile))
        else {
            return SpawnOutcome::NoSpawner;
        };
        if self.spawn_busy_until.get(&spawn_id).is_some_and(|until| *until > tick) {
            return SpawnOutcome::Busy;
        }

        let is_source = |s: &Structure| {
            s.owner == Ownership::Mine
                && matches!(s.kind, StructureKind::Spawn | StructureKind::Extension)
        };
        let available: u32 = r
            .structures
            .iter()
            .filter(|s| is_source(s))
            .filter_map(|s| s.store.map(|st| st.used))
            .sum();
        if available < AGENT_COST {
            return SpawnOutcome::NotEnoughEnergy;
        }

        let exit = spawn_tile.ring().into_iter().find(|tile| {
            r.terrain_at(*tile).is_passable() && !r.structures_at(*tile).any(|s| s.kind.is_obstacle())
        });
        let Some(exit) = exit else {
            return SpawnOutcome::Rejected;
        };

        let mut owed = AGENT_COST;
        for structure in r.structures.iter_mut().filter(|s| is_source(s)) {
            if let Some(store) = structure.store.as_mut() {
                let take = owed.min(store.used);
                store.used -= take;
                owed -= take;
            }
        }

        self.spawn_busy_until.insert(spawn_id, tick + SPAWN_TIME);
        let id = self.add_agent(Position::new(room.clone(), exit), 0);
        self.stats.agents_spawned += 1;
        info!(%room, agent = %id, tile = %exit, tick, "Agent spawned");
        SpawnOutcome::Ok
    }
}

impl PathOracle for SimWorld {
    fn find_path(
        &self,
        room: &RoomName,
        from: Tile,
        to: Tile,
        range: u8,
        costs: &PathCosts,
    ) -> Option<Vec<Tile>> {
        let r = self.rooms.get(room)?;
        pathfinding::find_path(&r.terrain, from, to, range, costs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colony_core::snapshot::{Controller, ResourceNode};

    const HOME: &str = "W1N1";

    fn home(x: u8, y: u8) -> Position {
        Position::new(RoomName::new(HOME), Tile::new(x, y))
    }

    /// Spawn at (25,25) with 300 energy, extension at (27,25), node at (10,10),
    /// controller at (40,40), one road at (20,20).
    fn world() -> SimWorld {
        let mut world = SimWorld::new();
        let mut room = RoomSnapshot::new(RoomName::new(HOME));
        let mut spawn = new_structure(world.allocate_id(), StructureKind::Spawn, Tile::new(25, 25));
        if let Some(store) = spawn.store.as_mut() {
            store.used = 300;
        }
        room.structures.push(spawn);
        room.structures.push(new_structure(
            world.allocate_id(),
            StructureKind::Extension,
            Tile::new(27, 25),
        ));
        room.structures
            .push(new_structure(world.allocate_id(), StructureKind::Road, Tile::new(20, 20)));
        room.nodes.push(ResourceNode {
            id: world.allocate_id(),
            tile: Tile::new(10, 10),
            energy: 3000,
            energy_capacity: 3000,
        });
        room.controller = Some(Controller {
            id: world.allocate_id(),
            tile: Tile::new(40, 40),
            ticks_to_downgrade: 100,
            mine: true,
        });
        world.insert_room(room);
        world
    }

    fn room(world: &SimWorld) -> &RoomSnapshot {
        world.room(&RoomName::new(HOME)).unwrap()
    }

    #[test]
    fn test_harvest_requires_touch_range() {
        let mut world = world();
        let node = room(&world).nodes[0].id;
        let far = world.add_agent(home(15, 15), 0);
        let near = world.add_agent(home(11, 11), 0);

        assert_eq!(world.harvest(far, node), ActionOutcome::NotInRange);
        assert_eq!(world.harvest(near, node), ActionOutcome::Ok);
        assert_eq!(world.agent(near).unwrap().carried, HARVEST_POWER * WORK_PARTS);
        assert_eq!(world.stats().energy_harvested, u64::from(HARVEST_POWER * WORK_PARTS));
    }

    #[test]
    fn test_transfer_fills_store_and_rejects_when_full() {
        let mut world = world();
        let extension = room(&world).structures[1].id;
        let agent = world.add_agent(home(26, 25), 50);

        assert_eq!(world.transfer(agent, extension), ActionOutcome::Ok);
        assert_eq!(world.agent(agent).unwrap().carried, 0);
        let other = world.add_agent(home(26, 26), 50);
        assert!(matches!(world.transfer(other, extension), ActionOutcome::Failed(_)));
        assert_eq!(world.stats().actions_failed, 1);
    }

    #[test]
    fn test_build_completes_road() {
        let mut world = world();
        let name = RoomName::new(HOME);
        assert!(world.propose_site(&name, Tile::new(30, 30), StructureKind::Road).is_ok());
        let site = room(&world).sites[0].id;
        let agent = world.add_agent(home(31, 31), 50);

        for _ in 0..30 {
            if world.agent(agent).unwrap().carried == 0 {
                world.agents.get_mut(&agent).unwrap().carried = 50;
            }
            if room(&world).sites.is_empty() {
                break;
            }
            assert!(world.build(agent, site).is_ok());
        }
        assert!(room(&world).sites.is_empty());
        assert!(room(&world).has_road_or_site(Tile::new(30, 30)));
        assert_eq!(world.stats().roads_built, 1);
    }

    #[test]
    fn test_propose_rules() {
        let mut world = world();
        let name = RoomName::new(HOME);
        // On top of the spawn.
        assert!(!world.propose_site(&name, Tile::new(25, 25), StructureKind::Road).is_ok());
        // A second road on an existing road.
        assert!(!world.propose_site(&name, Tile::new(20, 20), StructureKind::Road).is_ok());
        assert!(world.propose_site(&name, Tile::new(21, 20), StructureKind::Road).is_ok());
        assert!(!world.propose_site(&name, Tile::new(21, 20), StructureKind::Road).is_ok());
        assert!(world.retract_site(&name, Tile::new(21, 20), StructureKind::Road).is_ok());
        assert!(!world.retract_site(&name, Tile::new(21, 20), StructureKind::Road).is_ok());
        assert_eq!(world.stats().roads_proposed, 1);
        assert_eq!(world.stats().roads_retracted, 1);
    }

    #[test]
    fn test_move_steps_once_and_tires() {
        let mut world = world();
        let agent = world.add_agent(home(5, 5), 0);
        let target = home(10, 5);

        assert!(world.move_toward(agent, &target, 1).is_ok());
        let moved = world.agent(agent).unwrap();
        assert_eq!(moved.pos.tile.x, 6);
        assert_eq!(moved.fatigue, 2);
        assert!(!world.move_toward(agent, &target, 1).is_ok());

        world.advance();
        world.advance();
        assert!(world.move_toward(agent, &target, 1).is_ok());
    }

    #[test]
    fn test_spawn_draws_energy_and_gets_busy() {
        let mut world = world();
        let name = RoomName::new(HOME);
        assert_eq!(world.spawn_agent(&name), SpawnOutcome::Ok);
        assert_eq!(world.population(), 1);
        assert_eq!(room(&world).structures[0].store.unwrap().used, 100);
        assert_eq!(world.spawn_agent(&name), SpawnOutcome::Busy);

        for _ in 0..SPAWN_TIME {
            world.advance();
        }
        assert_eq!(world.spawn_agent(&name), SpawnOutcome::NotEnoughEnergy);
        assert_eq!(world.spawn_agent(&RoomName::new("W9N9")), SpawnOutcome::NoSpawner);
    }

    #[test]
    fn test_advance_applies_passive_rules() {
        let mut world = world();
        let node = room(&world).nodes[0].id;
        let agent = world.add_agent(home(11, 11), 0);
        for _ in 0..5 {
            world.harvest(agent, node);
        }
        let tombstone_owner = world.add_agent(home(12, 12), 30);

        for _ in 1..NODE_REGEN_INTERVAL {
            world.advance();
        }
        let r = room(&world);
        assert_eq!(r.nodes[0].energy, r.nodes[0].energy_capacity);
        assert_eq!(r.controller.as_ref().unwrap().ticks_to_downgrade, 0);
        // Decay steps at ticks 100, 200 and 300.
        assert_eq!(r.structures[2].hits, 5000 - 3 * ROAD_DECAY_HITS);
        assert!(world.agent(tombstone_owner).is_some());

        while world.tick() < 1 + AGENT_LIFETIME {
            world.advance();
        }
        assert_eq!(world.population(), 0);
        assert_eq!(world.stats().agents_expired, 2);
        let loot = &room(&world).loot;
        assert_eq!(loot.len(), 2);
        assert!(loot.iter().all(|l| l.kind == LootKind::Tombstone));
        assert!(loot.iter().any(|l| l.amount == 30 && l.tile == Tile::new(12, 12)));
    }

    #[test]
    fn test_snapshot_mirrors_world() {
        let mut world = world();
        let agent = world.add_agent(home(3, 3), 10);
        let snapshot = world.snapshot();
        assert_eq!(snapshot.tick(), world.tick());
        assert_eq!(snapshot.agent(agent).unwrap().carried, 10);
        assert!(snapshot.resolve(ObjectId(1)).is_some());
        assert_eq!(world.state_hash(), world.clone().state_hash());
    }
}
