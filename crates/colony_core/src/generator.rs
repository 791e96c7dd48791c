//! Task generation.
//!
//! Once per room per tick, after the sweep, every opportunity the snapshot
//! shows is published to the board. Priorities sit roughly in `[-1, 1]`;
//! the fallback WAIT task is always `-1`. The generator only touches the
//! board, never agent state.

use tracing::trace;

use crate::board::{TaskBoard, TaskKind};
use crate::components::{ObjectId, Position, Tile};
use crate::config::{GeneratorConfig, RingScan};
use crate::math::{percent, ratio, Fixed};
use crate::oracle::is_repair_candidate;
use crate::planner::Maintenance;
use crate::snapshot::{
    LookItem, Ownership, RoomSnapshot, StoreClass, StructureKind, Terrain, WorldSnapshot,
};

/// Number of create-or-refresh calls per kind in one generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationCounts {
    /// BUILD tasks.
    pub build: usize,
    /// CLEANUP tasks.
    pub cleanup: usize,
    /// HARVEST tasks.
    pub harvest: usize,
    /// REPAIR tasks.
    pub repair: usize,
    /// STORE tasks.
    pub store: usize,
    /// UPGRADE tasks.
    pub upgrade: usize,
    /// WAIT tasks.
    pub wait: usize,
    /// WITHDRAW tasks.
    pub withdraw: usize,
}

impl GenerationCounts {
    /// Sum over all kinds.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.build
            + self.cleanup
            + self.harvest
            + self.repair
            + self.store
            + self.upgrade
            + self.wait
            + self.withdraw
    }
}

/// Publishes world opportunities to the board.
#[derive(Debug, Clone)]
pub struct TaskGenerator {
    config: GeneratorConfig,
}

impl TaskGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Populate the board from one room.
    pub fn generate(
        &self,
        world: &WorldSnapshot,
        room: &RoomSnapshot,
        board: &mut TaskBoard,
        maintenance: &dyn Maintenance,
    ) -> GenerationCounts {
        let tick = world.tick();
        let mut counts = GenerationCounts::default();
        let mut publish = |kind: TaskKind, target: ObjectId, tile: Tile, priority: Fixed| {
            board.create_or_refresh(
                kind,
                target,
                Position::new(room.name.clone(), tile),
                priority,
                tick,
            );
        };

        for site in room.sites.iter().filter(|s| s.mine) {
            let priority = ratio(i64::from(site.progress), i64::from(site.progress_total));
            publish(TaskKind::Build, site.id, site.tile, priority);
            counts.build += 1;
        }

        let quantity_k = i64::from(self.config.resource_quantity_modifier);
        for loot in room.loot.iter().filter(|l| l.amount > 0) {
            let amount = i64::from(loot.amount);
            let mut priority = ratio(amount, amount + quantity_k);
            if let Some(ticks) = loot.ticks_to_decay {
                priority *= ratio(1, i64::from(ticks.max(1)));
            }
            publish(TaskKind::Cleanup, loot.id, loot.tile, priority);
            counts.cleanup += 1;
        }

        for node in room.nodes.iter().filter(|n| n.is_active()) {
            let priority = ratio(i64::from(node.energy), i64::from(node.energy_capacity));
            for tile in node.tile.ring() {
                if self.harvest_spot(world, room, tile) {
                    publish(TaskKind::Harvest, node.id, tile, priority);
                    counts.harvest += 1;
                }
            }
        }

        for structure in room
            .structures
            .iter()
            .filter(|s| is_repair_candidate(room, s, maintenance))
        {
            let priority =
                Fixed::ONE - ratio(i64::from(structure.hits), i64::from(structure.hits_max));
            publish(TaskKind::Repair, structure.id, structure.tile, priority);
            counts.repair += 1;
        }

        for structure in room.structures.iter().filter(|s| s.is_friendly()) {
            let (Some(class), Some(store)) = (structure.kind.store_class(), structure.store) else {
                continue;
            };
            if store.free() == 0 {
                continue;
            }
            let weight = match class {
                StoreClass::Critical => self.config.critical_weight_percent,
                StoreClass::Defense => self.config.defense_weight_percent,
                StoreClass::Bulk => self.config.bulk_weight_percent,
            };
            let fill = ratio(i64::from(store.used), i64::from(store.capacity));
            publish(
                TaskKind::Store,
                structure.id,
                structure.tile,
                (Fixed::ONE - fill) * percent(weight),
            );
            counts.store += 1;
        }

        if let Some(controller) = room.controller.as_ref().filter(|c| c.mine) {
            let ticks = i64::from(controller.ticks_to_downgrade);
            let k = i64::from(self.config.controller_downgrade_modifier);
            publish(
                TaskKind::Upgrade,
                controller.id,
                controller.tile,
                Fixed::ONE - ratio(ticks, ticks + k),
            );
            counts.upgrade += 1;
        }

        if let Some(landmark) = &room.idle_landmark {
            publish(TaskKind::Wait, landmark.id, landmark.tile, Fixed::NEG_ONE);
            counts.wait += 1;
        }

        for structure in room.structures.iter().filter(|s| {
            s.is_friendly() && s.kind.store_class() == Some(StoreClass::Bulk)
        }) {
            let Some(store) = structure.store.filter(|st| st.used > 0) else {
                continue;
            };
            publish(
                TaskKind::Withdraw,
                structure.id,
                structure.tile,
                ratio(i64::from(store.used), i64::from(store.capacity)),
            );
            counts.withdraw += 1;
        }

        trace!(room = %room.name, tick, total = counts.total(), "Generated tasks");
        counts
    }

    /// Whether a tile next to a resource node can host a harvester.
    fn harvest_spot(&self, world: &WorldSnapshot, room: &RoomSnapshot, tile: Tile) -> bool {
        let items = world.look_at(&room.name, tile);
        match self.config.ring_scan {
            RingScan::FirstItem => first_item_spot(&items),
            RingScan::WholeTile => items.iter().all(|item| !blocks(item)),
        }
    }
}

/// Whether a look item stops a harvester from standing on its tile.
fn blocks(item: &LookItem<'_>) -> bool {
    match item {
        LookItem::Agent(_) | LookItem::Node(_) => true,
        LookItem::Structure(s) => {
            s.kind.is_obstacle()
                || (s.kind == StructureKind::Rampart && s.owner != Ownership::Mine)
        }
        LookItem::Terrain(terrain) => *terrain == Terrain::Wall,
        LookItem::Site(_) | LookItem::Loot(_) => false,
    }
}

/// Decide on the first item in enumeration order. A road ends the scan
/// without publishing; a benign first item publishes even if a later item
/// would have blocked.
fn first_item_spot(items: &[LookItem<'_>]) -> bool {
    let Some(first) = items.first() else {
        return false;
    };
    let is_road = matches!(first, LookItem::Structure(s) if s.kind == StructureKind::Road);
    !is_road && !blocks(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentId, RoomName};
    use crate::planner::AlwaysMaintain;
    use crate::snapshot::{
        AgentSnapshot, Controller, Landmark, Loot, LootKind, ResourceNode, Store, Structure,
    };

    fn name() -> RoomName {
        RoomName::new("W1N1")
    }

    fn structure(id: u64, kind: StructureKind, tile: Tile, store: Option<Store>) -> Structure {
        Structure {
            id: ObjectId(id),
            kind,
            tile,
            hits: 1000,
            hits_max: 1000,
            owner: Ownership::Mine,
            store,
        }
    }

    fn generate(room: RoomSnapshot, scan: RingScan) -> TaskBoard {
        let mut world = WorldSnapshot::new(10);
        world.insert_room(room);
        let config = GeneratorConfig {
            ring_scan: scan,
            ..GeneratorConfig::default()
        };
        let mut board = TaskBoard::new();
        let room = world.room(&name()).unwrap().clone();
        TaskGenerator::new(config).generate(&world, &room, &mut board, &AlwaysMaintain);
        board
    }

    #[test]
    fn test_store_class_weights() {
        let mut room = RoomSnapshot::new(name());
        room.structures.push(structure(1, StructureKind::Spawn, Tile::new(1, 1), Some(Store::new(0, 300))));
        room.structures.push(structure(2, StructureKind::Tower, Tile::new(2, 1), Some(Store::new(0, 1000))));
        room.structures.push(structure(3, StructureKind::Storage, Tile::new(3, 1), Some(Store::new(0, 10_000))));
        room.structures.push(structure(4, StructureKind::Extension, Tile::new(4, 1), Some(Store::new(50, 50))));

        let board = generate(room, RingScan::FirstItem);
        let prio = |id: u64| {
            board
                .tasks_of(TaskKind::Store)
                .find(|t| t.target == ObjectId(id))
                .map(|t| t.priority)
        };
        assert_eq!(prio(1), Some(Fixed::ONE));
        assert_eq!(prio(2), Some(percent(66)));
        assert_eq!(prio(3), Some(percent(33)));
        assert_eq!(prio(4), None);
    }

    #[test]
    fn test_upgrade_rises_near_decay() {
        let mut room = RoomSnapshot::new(name());
        room.controller = Some(Controller {
            id: ObjectId(5),
            tile: Tile::new(20, 20),
            ticks_to_downgrade: 20_000,
            mine: true,
        });
        let board = generate(room, RingScan::FirstItem);
        let task = board.tasks_of(TaskKind::Upgrade).next().unwrap();
        assert_eq!(task.priority, Fixed::from_num(0.5));
    }

    #[test]
    fn test_cleanup_prefers_large_urgent_piles() {
        let mut room = RoomSnapshot::new(name());
        room.loot.push(Loot {
            id: ObjectId(1),
            kind: LootKind::Dropped,
            tile: Tile::new(1, 1),
            amount: 200,
            ticks_to_decay: None,
        });
        room.loot.push(Loot {
            id: ObjectId(2),
            kind: LootKind::Tombstone,
            tile: Tile::new(2, 2),
            amount: 200,
            ticks_to_decay: Some(4),
        });
        let board = generate(room, RingScan::FirstItem);
        let prio: Vec<Fixed> = board.tasks_of(TaskKind::Cleanup).map(|t| t.priority).collect();
        assert_eq!(prio, vec![Fixed::from_num(0.5), Fixed::from_num(0.125)]);
    }

    #[test]
    fn test_cleanup_of_an_enormous_pile() {
        let mut room = RoomSnapshot::new(name());
        room.loot.push(Loot {
            id: ObjectId(1),
            kind: LootKind::Ruin,
            tile: Tile::new(1, 1),
            amount: u32::MAX,
            ticks_to_decay: None,
        });
        let board = generate(room, RingScan::FirstItem);
        let task = board.tasks_of(TaskKind::Cleanup).next().unwrap();
        assert!(task.priority > Fixed::from_num(0.99));
        assert!(task.priority < Fixed::ONE);
    }

    #[test]
    fn test_wait_fallback_is_negative() {
        let mut room = RoomSnapshot::new(name());
        room.idle_landmark = Some(Landmark {
            id: ObjectId(8),
            tile: Tile::new(25, 25),
        });
        let board = generate(room, RingScan::FirstItem);
        let wait = board.tasks_of(TaskKind::Wait).next().unwrap();
        assert_eq!(wait.priority, Fixed::NEG_ONE);
    }

    fn node_room() -> RoomSnapshot {
        let mut room = RoomSnapshot::new(name());
        room.nodes.push(ResourceNode {
            id: ObjectId(1),
            tile: Tile::new(10, 10),
            energy: 1500,
            energy_capacity: 3000,
        });
        room.terrain.set(Tile::new(9, 9), Terrain::Wall);
        room.structures.push(structure(2, StructureKind::Extension, Tile::new(10, 9), None));
        room.structures.push(structure(3, StructureKind::Road, Tile::new(11, 9), None));
        room
    }

    #[test]
    fn test_harvest_ring_first_item_quirk() {
        let mut room = node_room();
        // A container over wall terrain publishes under the literal scan.
        room.terrain.set(Tile::new(9, 11), Terrain::Wall);
        room.structures
            .push(structure(4, StructureKind::Container, Tile::new(9, 11), Some(Store::new(0, 2000))));

        let board = generate(room, RingScan::FirstItem);
        let tiles: Vec<Tile> = board.tasks_of(TaskKind::Harvest).map(|t| t.pos.tile).collect();
        // Wall, extension and road tiles are skipped; the container tile is not.
        assert_eq!(
            tiles,
            vec![
                Tile::new(9, 10),
                Tile::new(11, 10),
                Tile::new(9, 11),
                Tile::new(10, 11),
                Tile::new(11, 11),
            ]
        );
        assert!(board
            .tasks_of(TaskKind::Harvest)
            .all(|t| t.priority == Fixed::from_num(0.5)));
    }

    #[test]
    fn test_harvest_ring_whole_tile_scan() {
        let mut room = node_room();
        room.terrain.set(Tile::new(9, 11), Terrain::Wall);
        room.structures
            .push(structure(4, StructureKind::Container, Tile::new(9, 11), Some(Store::new(0, 2000))));

        let board = generate(room, RingScan::WholeTile);
        let tiles: Vec<Tile> = board.tasks_of(TaskKind::Harvest).map(|t| t.pos.tile).collect();
        // The road tile is usable and the container-over-wall tile is not.
        assert_eq!(
            tiles,
            vec![
                Tile::new(11, 9),
                Tile::new(9, 10),
                Tile::new(11, 10),
                Tile::new(10, 11),
                Tile::new(11, 11),
            ]
        );
    }

    #[test]
    fn test_agent_blocks_harvest_tile() {
        let mut world = WorldSnapshot::new(3);
        world.insert_room(node_room());
        world.insert_agent(AgentSnapshot {
            id: AgentId(1),
            pos: Position::new(name(), Tile::new(9, 10)),
            carried: 0,
            capacity: 50,
            fatigue: 0,
        });
        let room = world.room(&name()).unwrap().clone();
        let mut board = TaskBoard::new();
        TaskGenerator::new(GeneratorConfig::default()).generate(&world, &room, &mut board, &AlwaysMaintain);
        assert!(board
            .tasks_of(TaskKind::Harvest)
            .all(|t| t.pos.tile != Tile::new(9, 10)));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let mut world = WorldSnapshot::new(3);
        world.insert_room(node_room());
        let room = world.room(&name()).unwrap().clone();
        let generator = TaskGenerator::new(GeneratorConfig::default());
        let mut board = TaskBoard::new();
        generator.generate(&world, &room, &mut board, &AlwaysMaintain);
        let first = board.len();
        generator.generate(&world, &room, &mut board, &AlwaysMaintain);
        assert_eq!(board.len(), first);
    }
}
