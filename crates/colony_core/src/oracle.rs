//! Validity predicates.
//!
//! Two questions are answered here. [`target_still_valid`] decides whether a
//! single task on the board still points at something worth doing; the board
//! sweep drops tasks that fail it. [`Oracle::actionable`] decides whether a
//! whole task kind is worth latching onto in a room right now.

use crate::allocation::EnergySource;
use crate::board::{Task, TaskKind};
use crate::planner::Maintenance;
use crate::snapshot::{
    Loot, LootKind, ObjectRef, RoomSnapshot, StoreClass, Structure, StructureKind,
    WorldSnapshot,
};

/// Sweep predicate: whether a task's target still exists and still needs
/// the work. Road repairs also need `maintenance` to keep the road.
#[must_use]
pub fn target_still_valid(
    task: &Task,
    world: &WorldSnapshot,
    maintenance: &dyn Maintenance,
) -> bool {
    let Some(target) = world.resolve(task.target) else {
        return false;
    };
    match (task.kind, target) {
        (TaskKind::Repair, ObjectRef::Structure(s)) => {
            s.is_damaged()
                && (s.kind != StructureKind::Road
                    || world
                        .room(&task.pos.room)
                        .is_some_and(|room| maintenance.should_maintain(room, s.tile)))
        }
        (TaskKind::Build, ObjectRef::Site(site)) => !site.is_complete(),
        (TaskKind::Store, ObjectRef::Structure(s)) => s.store.is_some_and(|st| st.free() > 0),
        (TaskKind::Withdraw, ObjectRef::Structure(s)) => s.store.is_some_and(|st| st.used > 0),
        (TaskKind::Upgrade, ObjectRef::Controller(_)) => true,
        (TaskKind::Harvest, ObjectRef::Node(node)) => node.is_active(),
        (TaskKind::Cleanup, ObjectRef::Loot(loot)) => loot.amount > 0,
        (TaskKind::Wait, ObjectRef::Landmark(_)) => true,
        _ => false,
    }
}

/// Damaged, ours or unowned, repairable, and for roads still maintained.
pub fn is_repair_candidate(
    room: &RoomSnapshot,
    structure: &Structure,
    maintenance: &dyn Maintenance,
) -> bool {
    structure.is_damaged()
        && structure.is_friendly()
        && structure.kind.is_repairable()
        && (structure.kind != StructureKind::Road
            || maintenance.should_maintain(room, structure.tile))
}

/// A friendly store that can take more energy.
#[must_use]
pub fn is_store_candidate(structure: &Structure) -> bool {
    structure.is_friendly()
        && structure.kind.store_class().is_some()
        && structure.store.is_some_and(|st| st.free() > 0)
}

/// Loot worth a detour. Dropped piles must exceed `minimum`.
#[must_use]
pub fn is_scavengeable(loot: &Loot, minimum: u32) -> bool {
    match loot.kind {
        LootKind::Dropped => loot.amount > minimum,
        LootKind::Tombstone | LootKind::Ruin => loot.amount > 0,
    }
}

/// Whether the room can spare energy for withdrawals: some bulk or critical
/// store holds at least `margin`.
#[must_use]
pub fn room_has_surplus(room: &RoomSnapshot, margin: u32) -> bool {
    room.structures.iter().any(|s| {
        s.is_friendly()
            && matches!(
                s.kind.store_class(),
                Some(StoreClass::Bulk | StoreClass::Critical)
            )
            && s.store.is_some_and(|st| st.used >= margin && st.used > 0)
    })
}

/// Per-room kind predicate.
pub struct Oracle<'a> {
    room: &'a RoomSnapshot,
    maintenance: &'a dyn Maintenance,
}

impl<'a> Oracle<'a> {
    /// Bind the oracle to a room.
    pub fn new(room: &'a RoomSnapshot, maintenance: &'a dyn Maintenance) -> Self {
        Self { room, maintenance }
    }

    /// Room the oracle looks at.
    #[must_use]
    pub fn room(&self) -> &'a RoomSnapshot {
        self.room
    }

    /// Whether `kind` is actionable for an agent whose energy came from
    /// `source`. Only productive kinds ever pass.
    #[must_use]
    pub fn actionable(&self, kind: TaskKind, source: Option<EnergySource>) -> bool {
        match kind {
            TaskKind::Store => {
                source != Some(EnergySource::Withdraw)
                    && self.room.structures.iter().any(is_store_candidate)
            }
            TaskKind::Repair => self
                .room
                .structures
                .iter()
                .any(|s| is_repair_candidate(self.room, s, self.maintenance)),
            TaskKind::Build => self
                .room
                .sites
                .iter()
                .any(|site| site.mine && !site.is_complete()),
            TaskKind::Upgrade => true,
            TaskKind::Harvest | TaskKind::Withdraw | TaskKind::Cleanup | TaskKind::Wait => false,
        }
    }

    /// Productive kinds passing the oracle, in preference order.
    #[must_use]
    pub fn valid_productive(&self, source: Option<EnergySource>) -> Vec<TaskKind> {
        TaskKind::PRODUCTIVE
            .into_iter()
            .filter(|kind| self.actionable(*kind, source))
            .collect()
    }
}
