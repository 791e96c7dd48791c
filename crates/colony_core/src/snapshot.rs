//! Read-only per-tick view of the world.
//!
//! The host builds one [`WorldSnapshot`] per tick and hands it to the
//! [`Colony`](crate::colony::Colony). Every decision in this crate is
//! derived from the snapshot plus persisted state; nothing reaches back
//! into the live world except through the capability traits in
//! [`host`](crate::host).
//!
//! Object references are weak. [`WorldSnapshot::resolve`] returns `None`
//! for ids that no longer exist, and every caller treats that as a normal
//! outcome.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::components::{AgentId, ObjectId, Position, RoomName, Tile, ROOM_SIZE};

// ============================================================================
// Terrain
// ============================================================================

/// Terrain classification of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Terrain {
    /// Open ground.
    #[default]
    Plain,
    /// Difficult ground, expensive to cross.
    Swamp,
    /// Impassable.
    Wall,
}

impl Terrain {
    /// Returns true if agents can stand on this terrain.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Self::Wall)
    }
}

/// Terrain of a whole room, stored in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainGrid {
    cells: Vec<Terrain>,
}

impl TerrainGrid {
    /// A room of plain terrain.
    #[must_use]
    pub fn plain() -> Self {
        let size = usize::from(ROOM_SIZE) * usize::from(ROOM_SIZE);
        Self {
            cells: vec![Terrain::Plain; size],
        }
    }

    #[inline]
    fn index(tile: Tile) -> usize {
        usize::from(tile.y) * usize::from(ROOM_SIZE) + usize::from(tile.x)
    }

    /// Terrain at a tile. Out-of-room tiles read as walls.
    #[must_use]
    pub fn get(&self, tile: Tile) -> Terrain {
        if tile.x >= ROOM_SIZE || tile.y >= ROOM_SIZE {
            return Terrain::Wall;
        }
        self.cells[Self::index(tile)]
    }

    /// Set the terrain of a tile. Returns `false` if out of bounds.
    pub fn set(&mut self, tile: Tile, terrain: Terrain) -> bool {
        if tile.x >= ROOM_SIZE || tile.y >= ROOM_SIZE {
            return false;
        }
        self.cells[Self::index(tile)] = terrain;
        true
    }
}

impl Default for TerrainGrid {
    fn default() -> Self {
        Self::plain()
    }
}

// ============================================================================
// Structures and other objects
// ============================================================================

/// Who owns an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Ownership {
    /// Ours.
    #[default]
    Mine,
    /// Someone else's.
    Hostile,
    /// Nobody's (roads, containers, walls).
    Neutral,
}

/// Structure types known to the autopilot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StructureKind {
    /// Produces agents; critical energy sink.
    Spawn,
    /// Extra spawn energy capacity; critical energy sink.
    Extension,
    /// Defense turret.
    Tower,
    /// Large bulk store.
    Storage,
    /// Small bulk store, walkable.
    Container,
    /// Energy teleporter, bulk store.
    Link,
    /// Trade store, bulk store.
    Terminal,
    /// Maintained infrastructure; cheap to walk on.
    Road,
    /// Protective cover, walkable for its owner.
    Rampart,
    /// Constructed wall.
    Wall,
    /// Neutral monster lair.
    KeeperLair,
    /// Hostile NPC core.
    InvaderCore,
    /// Laboratory.
    Lab,
    /// Factory.
    Factory,
}

/// Delivery class of a store, in decreasing urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreClass {
    /// Spawns and extensions.
    Critical,
    /// Towers.
    Defense,
    /// Storage, containers, links, terminals.
    Bulk,
}

impl StructureKind {
    /// Whether the structure blocks movement.
    #[must_use]
    pub const fn is_obstacle(self) -> bool {
        !matches!(self, Self::Road | Self::Container | Self::Rampart)
    }

    /// Store delivery class, if this kind takes energy deliveries.
    #[must_use]
    pub const fn store_class(self) -> Option<StoreClass> {
        match self {
            Self::Spawn | Self::Extension => Some(StoreClass::Critical),
            Self::Tower => Some(StoreClass::Defense),
            Self::Storage | Self::Container | Self::Link | Self::Terminal => {
                Some(StoreClass::Bulk)
            }
            _ => None,
        }
    }

    /// Whether workers ever repair this kind.
    #[must_use]
    pub const fn is_repairable(self) -> bool {
        !matches!(self, Self::Wall | Self::KeeperLair | Self::InvaderCore)
    }
}

/// Energy store of a structure or loot container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Store {
    /// Energy currently held.
    pub used: u32,
    /// Maximum energy.
    pub capacity: u32,
}

impl Store {
    /// Create a store.
    #[must_use]
    pub const fn new(used: u32, capacity: u32) -> Self {
        Self { used, capacity }
    }

    /// Remaining free capacity.
    #[must_use]
    pub const fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.used)
    }
}

/// A built structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    /// Object id.
    pub id: ObjectId,
    /// Structure type.
    pub kind: StructureKind,
    /// Location.
    pub tile: Tile,
    /// Current hit points.
    pub hits: u32,
    /// Maximum hit points.
    pub hits_max: u32,
    /// Owner.
    pub owner: Ownership,
    /// Energy store, if the structure has one.
    pub store: Option<Store>,
}

impl Structure {
    /// Whether the structure may be serviced by our workers.
    #[must_use]
    pub fn is_friendly(&self) -> bool {
        self.owner != Ownership::Hostile
    }

    /// Whether the structure has lost hit points.
    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.hits < self.hits_max
    }
}

/// A pending construction proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructionSite {
    /// Object id.
    pub id: ObjectId,
    /// Structure that will be built.
    pub kind: StructureKind,
    /// Location.
    pub tile: Tile,
    /// Work done so far.
    pub progress: u32,
    /// Work required.
    pub progress_total: u32,
    /// Whether we placed it.
    pub mine: bool,
}

impl ConstructionSite {
    /// Whether enough work has been done.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress >= self.progress_total
    }
}

/// A harvestable resource node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Object id.
    pub id: ObjectId,
    /// Location.
    pub tile: Tile,
    /// Energy currently available.
    pub energy: u32,
    /// Energy after regeneration.
    pub energy_capacity: u32,
}

impl ResourceNode {
    /// Whether the node currently yields energy.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.energy > 0
    }
}

/// Kind of scavengeable loot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LootKind {
    /// Remains of a dead agent.
    Tombstone,
    /// Remains of a destroyed structure.
    Ruin,
    /// A pile on the ground.
    Dropped,
}

/// Ambient loot lying around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loot {
    /// Object id.
    pub id: ObjectId,
    /// Loot type.
    pub kind: LootKind,
    /// Location.
    pub tile: Tile,
    /// Energy held.
    pub amount: u32,
    /// Ticks until the loot disappears, if it decays.
    pub ticks_to_decay: Option<u32>,
}

/// The room's growth controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    /// Object id.
    pub id: ObjectId,
    /// Location.
    pub tile: Tile,
    /// Ticks until the controller decays a level.
    pub ticks_to_downgrade: u32,
    /// Whether we own it.
    pub mine: bool,
}

/// A named idle spot agents drift to when they have nothing to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    /// Object id.
    pub id: ObjectId,
    /// Location.
    pub tile: Tile,
}

/// Read-only state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Agent id.
    pub id: AgentId,
    /// Current position.
    pub pos: Position,
    /// Energy carried.
    pub carried: u32,
    /// Carry capacity.
    pub capacity: u32,
    /// Movement fatigue; a fatigued agent cannot move this tick.
    pub fatigue: u32,
}

impl AgentSnapshot {
    /// Whether the agent carries nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.carried == 0
    }

    /// Whether the agent can carry more.
    #[must_use]
    pub const fn has_free_capacity(&self) -> bool {
        self.carried < self.capacity
    }
}

/// Anything with a location and an id.
pub trait Located {
    /// Object id.
    fn id(&self) -> ObjectId;
    /// Location within its room.
    fn tile(&self) -> Tile;
}

macro_rules! impl_located {
    ($($ty:ty),*) => {
        $(impl Located for $ty {
            fn id(&self) -> ObjectId {
                self.id
            }
            fn tile(&self) -> Tile {
                self.tile
            }
        })*
    };
}

impl_located!(Structure, ConstructionSite, ResourceNode, Loot, Controller, Landmark);

/// Closest item by range to `origin`; ties go to the lower id.
pub fn nearest_by_range<'a, T, I>(origin: Tile, items: I) -> Option<&'a T>
where
    T: Located + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items
        .into_iter()
        .min_by_key(|item| (origin.range_to(item.tile()), item.id()))
}

// ============================================================================
// Rooms
// ============================================================================

/// Everything visible in one room this tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room name.
    pub name: RoomName,
    /// Terrain grid.
    pub terrain: TerrainGrid,
    /// Built structures, in host enumeration order.
    pub structures: Vec<Structure>,
    /// Construction sites.
    pub sites: Vec<ConstructionSite>,
    /// Resource nodes.
    pub nodes: Vec<ResourceNode>,
    /// Loot piles.
    pub loot: Vec<Loot>,
    /// Growth controller.
    pub controller: Option<Controller>,
    /// Idle landmark.
    pub idle_landmark: Option<Landmark>,
}

impl RoomSnapshot {
    /// Create an empty room with plain terrain.
    #[must_use]
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Terrain at a tile.
    #[must_use]
    pub fn terrain_at(&self, tile: Tile) -> Terrain {
        self.terrain.get(tile)
    }

    /// Structures whose kind matches `filter`.
    pub fn structures_where<F>(&self, filter: F) -> impl Iterator<Item = &Structure>
    where
        F: Fn(&Structure) -> bool,
    {
        self.structures.iter().filter(move |s| filter(s))
    }

    /// Structures of any of the given kinds.
    pub fn structures_of<'a>(
        &'a self,
        kinds: &'a [StructureKind],
    ) -> impl Iterator<Item = &'a Structure> + 'a {
        self.structures.iter().filter(move |s| kinds.contains(&s.kind))
    }

    /// Structures standing on a tile.
    pub fn structures_at(&self, tile: Tile) -> impl Iterator<Item = &Structure> {
        self.structures.iter().filter(move |s| s.tile == tile)
    }

    /// Construction sites on a tile.
    pub fn sites_at(&self, tile: Tile) -> impl Iterator<Item = &ConstructionSite> {
        self.sites.iter().filter(move |s| s.tile == tile)
    }

    /// Whether a road or a road proposal occupies the tile.
    #[must_use]
    pub fn has_road_or_site(&self, tile: Tile) -> bool {
        self.structures_at(tile).any(|s| s.kind == StructureKind::Road)
            || self.sites_at(tile).any(|s| s.kind == StructureKind::Road)
    }

    /// Number of roads plus our road proposals.
    #[must_use]
    pub fn road_count(&self) -> usize {
        let roads = self
            .structures
            .iter()
            .filter(|s| s.kind == StructureKind::Road)
            .count();
        let sites = self
            .sites
            .iter()
            .filter(|s| s.mine && s.kind == StructureKind::Road)
            .count();
        roads + sites
    }
}

// ============================================================================
// World
// ============================================================================

/// One item found when looking at a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookItem<'a> {
    /// An agent standing on the tile.
    Agent(AgentId),
    /// A resource node.
    Node(&'a ResourceNode),
    /// A structure.
    Structure(&'a Structure),
    /// A construction site.
    Site(&'a ConstructionSite),
    /// A loot pile.
    Loot(&'a Loot),
    /// The tile's terrain; always the last item.
    Terrain(Terrain),
}

/// A resolved weak reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectRef<'a> {
    /// A structure.
    Structure(&'a Structure),
    /// A construction site.
    Site(&'a ConstructionSite),
    /// A resource node.
    Node(&'a ResourceNode),
    /// A loot pile.
    Loot(&'a Loot),
    /// A growth controller.
    Controller(&'a Controller),
    /// An idle landmark.
    Landmark(&'a Landmark),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Structure(usize),
    Site(usize),
    Node(usize),
    Loot(usize),
    Controller,
    Landmark,
}

/// Per-tick read-only view of every visible room and agent.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    tick: u64,
    rooms: BTreeMap<RoomName, RoomSnapshot>,
    agents: BTreeMap<AgentId, AgentSnapshot>,
    index: HashMap<ObjectId, (RoomName, Slot)>,
}

impl WorldSnapshot {
    /// Create an empty snapshot for a tick.
    #[must_use]
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Tick this snapshot was taken at.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Add a room, indexing its objects. Replaces a room of the same name.
    pub fn insert_room(&mut self, room: RoomSnapshot) {
        let name = room.name.clone();
        self.index.retain(|_, (r, _)| *r != name);
        let mut entries: Vec<(ObjectId, Slot)> = Vec::new();
        entries.extend(room.structures.iter().enumerate().map(|(i, s)| (s.id, Slot::Structure(i))));
        entries.extend(room.sites.iter().enumerate().map(|(i, s)| (s.id, Slot::Site(i))));
        entries.extend(room.nodes.iter().enumerate().map(|(i, n)| (n.id, Slot::Node(i))));
        entries.extend(room.loot.iter().enumerate().map(|(i, l)| (l.id, Slot::Loot(i))));
        if let Some(controller) = &room.controller {
            entries.push((controller.id, Slot::Controller));
        }
        if let Some(landmark) = &room.idle_landmark {
            entries.push((landmark.id, Slot::Landmark));
        }
        for (id, slot) in entries {
            self.index.insert(id, (name.clone(), slot));
        }
        self.rooms.insert(name, room);
    }

    /// Add an agent.
    pub fn insert_agent(&mut self, agent: AgentSnapshot) {
        self.agents.insert(agent.id, agent);
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

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(&id)
    }

    /// All agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.agents.values()
    }

    /// Number of living agents.
    #[must_use]
    pub fn population(&self) -> usize {
        self.agents.len()
    }

    /// Resolve a weak reference.
    #[must_use]
    pub fn resolve(&self, id: ObjectId) -> Option<ObjectRef<'_>> {
        let (room_name, slot) = self.index.get(&id)?;
        let room = self.rooms.get(room_name)?;
        match *slot {
            Slot::Structure(i) => room.structures.get(i).map(ObjectRef::Structure),
            Slot::Site(i) => room.sites.get(i).map(ObjectRef::Site),
            Slot::Node(i) => room.nodes.get(i).map(ObjectRef::Node),
            Slot::Loot(i) => room.loot.get(i).map(ObjectRef::Loot),
            Slot::Controller => room.controller.as_ref().map(ObjectRef::Controller),
            Slot::Landmark => room.idle_landmark.as_ref().map(ObjectRef::Landmark),
        }
    }

    /// Everything on a tile, in enumeration order: agents, nodes,
    /// structures, sites, loot, then terrain.
    #[must_use]
    pub fn look_at(&self, room_name: &RoomName, tile: Tile) -> Vec<LookItem<'_>> {
        let Some(room) = self.rooms.get(room_name) else {
            return Vec::new();
        };
        let mut items: Vec<LookItem<'_>> = self
            .agents
            .values()
            .filter(|a| a.pos.room == *room_name && a.pos.tile == tile)
            .map(|a| LookItem::Agent(a.id))
            .collect();
        items.extend(room.nodes.iter().filter(|n| n.tile == tile).map(LookItem::Node));
        items.extend(room.structures_at(tile).map(LookItem::Structure));
        items.extend(room.sites_at(tile).map(LookItem::Site));
        items.extend(room.loot.iter().filter(|l| l.tile == tile).map(LookItem::Loot));
        items.push(LookItem::Terrain(room.terrain_at(tile)));
        items
    }
}
