//! Spawn requests.
//!
//! At most one request per tick, issued while the population is below the
//! autoscaler's target. Host refusals are logged and retried next tick.

use tracing::{debug, info};

use crate::components::RoomName;
use crate::host::{SpawnOutcome, Spawner};
use crate::snapshot::{StructureKind, WorldSnapshot};

/// Room holding our first spawner, in room order.
#[must_use]
pub fn spawn_room(world: &WorldSnapshot) -> Option<&RoomName> {
    world
        .rooms()
        .find(|room| {
            room.structures
                .iter()
                .any(|s| s.kind == StructureKind::Spawn && s.is_friendly())
        })
        .map(|room| &room.name)
}

/// Request one agent when under target. Returns `None` when no request was
/// needed.
pub fn request_spawn<S>(world: &WorldSnapshot, target: u32, spawner: &mut S) -> Option<SpawnOutcome>
where
    S: Spawner + ?Sized,
{
    let population = world.population();
    if population >= target as usize {
        return None;
    }
    let Some(room) = spawn_room(world) else {
        debug!(population, target, "No spawner to request agents from");
        return Some(SpawnOutcome::NoSpawner);
    };

    let outcome = spawner.spawn_agent(room);
    match outcome {
        SpawnOutcome::Ok => info!(room = %room, population, target, "Spawning agent"),
        other => debug!(room = %room, population, target, outcome = %other, "Spawn refused"),
    }
    Some(outcome)
}
