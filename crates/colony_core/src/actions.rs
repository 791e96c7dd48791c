//! Per-kind action routines.
//!
//! One handler per [`TaskKind`]. A handler picks a concrete target (from the
//! board, or a cached target in the agent's scratch fields), issues the
//! capability call, and moves the agent closer when the world answers
//! [`ActionOutcome::NotInRange`]. Successful steps deposit traffic on the
//! tile the agent leaves.
//!
//! Handlers return recoverable [`ColonyError`]s; the caller abandons the task
//! and the agent chooses again next tick.

use tracing::debug;

use crate::allocation::{AgentTaskState, EnergySource};
use crate::board::{Task, TaskBoard, TaskKind};
use crate::components::{ObjectId, Position, Tile};
use crate::config::AllocationConfig;
use crate::error::{ColonyError, Result};
use crate::host::{ActionOutcome, Capabilities};
use crate::oracle::is_scavengeable;
use crate::planner::TrafficLedger;
use crate::snapshot::{
    nearest_by_range, AgentSnapshot, LootKind, ObjectRef, RoomSnapshot, StoreClass,
    WorldSnapshot,
};

/// Range for harvest, transfer, withdraw and pick-up.
pub const TOUCH_RANGE: u8 = 1;
/// Range for build, repair and upgrade.
pub const WORK_RANGE: u8 = 3;

/// What an agent achieved this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The action took effect.
    Worked,
    /// Took a step toward the target.
    Moving,
    /// Could not move (fatigue or blocked path).
    Stuck,
    /// Nothing to do.
    Idle,
}

/// Everything a handler may read or touch.
pub struct ActionContext<'a, H: ?Sized> {
    /// Snapshot of the whole world.
    pub world: &'a WorldSnapshot,
    /// Room the agent stands in.
    pub room: &'a RoomSnapshot,
    /// The acting agent.
    pub agent: &'a AgentSnapshot,
    /// Shared task board.
    pub board: &'a mut TaskBoard,
    /// Traffic ledger of the agent's room.
    pub ledger: &'a mut TrafficLedger,
    /// World capabilities.
    pub host: &'a mut H,
    /// Allocation constants.
    pub config: &'a AllocationConfig,
}

impl<H: Capabilities + ?Sized> ActionContext<'_, H> {
    /// Step toward a target unless fatigued; record traffic on success.
    fn travel(&mut self, target: &Position, range: u8) -> Progress {
        if self.agent.fatigue > 0 {
            return Progress::Stuck;
        }
        match self.host.move_toward(self.agent.id, target, range) {
            ActionOutcome::Ok => {
                self.ledger
                    .record(self.agent.pos.tile, self.agent.carried, self.agent.capacity);
                Progress::Moving
            }
            _ => Progress::Stuck,
        }
    }

    /// Turn a capability outcome into progress, moving when out of range.
    fn settle(
        &mut self,
        action: &'static str,
        outcome: ActionOutcome,
        target: &Position,
        range: u8,
    ) -> Result<Progress> {
        match outcome {
            ActionOutcome::Ok => Ok(Progress::Worked),
            ActionOutcome::NotInRange => Ok(self.travel(target, range)),
            ActionOutcome::Failed(reason) => Err(ColonyError::ActionRejected {
                agent: self.agent.id,
                action,
                reason,
            }),
        }
    }

    fn no_candidate(&self, reason: &str) -> ColonyError {
        ColonyError::NoCandidate {
            agent: self.agent.id,
            reason: reason.to_string(),
        }
    }

    fn at(&self, tile: Tile) -> Position {
        Position::new(self.room.name.clone(), tile)
    }
}

/// Run the handler for `kind`.
pub fn execute<H>(kind: TaskKind, state: &mut AgentTaskState, ctx: &mut ActionContext<'_, H>) -> Result<Progress>
where
    H: Capabilities + ?Sized,
{
    match kind {
        TaskKind::Harvest => harvest(state, ctx),
        TaskKind::Withdraw => withdraw(state, ctx),
        TaskKind::Cleanup => cleanup(state, ctx),
        TaskKind::Store => store(state, ctx),
        TaskKind::Build => build(ctx),
        TaskKind::Repair => repair(state, ctx),
        TaskKind::Upgrade => upgrade(ctx),
        TaskKind::Wait => wait(ctx),
    }
}

fn harvest<H: Capabilities + ?Sized>(state: &mut AgentTaskState, ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let agent = ctx.agent.id;
    let held = state
        .scratch
        .claim
        .and_then(|id| ctx.board.lookup(id))
        .filter(|task| task.assigned_to == Some(agent))
        .cloned();

    let task = match held {
        Some(task) => task,
        None => {
            if state.scratch.claim.is_some() {
                debug!(%agent, "Harvest claim vanished, reacquiring");
            }
            ctx.board.release(agent);
            state.scratch = Default::default();
            let Some(best) = ctx.board.best(TaskKind::Harvest, &ctx.agent.pos, agent).cloned()
            else {
                return Err(ctx.no_candidate("no free harvest spot"));
            };
            ctx.board.claim(best.id, agent);
            state.scratch.claim = Some(best.id);
            state.scratch.target = Some(best.target);
            state.scratch.room = Some(best.pos.room.clone());
            best
        }
    };

    state.last_energy_source = Some(EnergySource::Harvest);
    let outcome = ctx.host.harvest(agent, task.target);
    ctx.settle("harvest", outcome, &task.pos, 0)
}

/// Nearest friendly store of a class holding energy.
fn stocked_store(room: &RoomSnapshot, origin: Position, class: StoreClass) -> Option<(ObjectId, Position)> {
    let candidates: Vec<_> = room
        .structures
        .iter()
        .filter(|s| {
            s.is_friendly()
                && s.kind.store_class() == Some(class)
                && s.store.is_some_and(|st| st.used > 0)
        })
        .collect();
    nearest_by_range(origin.tile, candidates.iter().copied())
        .map(|s| (s.id, Position::new(room.name.clone(), s.tile)))
}

fn withdraw<H: Capabilities + ?Sized>(state: &mut AgentTaskState, ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let agent = ctx.agent.id;
    let target = ctx
        .board
        .best(TaskKind::Withdraw, &ctx.agent.pos, agent)
        .map(|task| (task.target, task.pos.clone()))
        .or_else(|| stocked_store(ctx.room, ctx.agent.pos.clone(), StoreClass::Critical))
        .or_else(|| stocked_store(ctx.room, ctx.agent.pos.clone(), StoreClass::Defense));

    let Some((target, pos)) = target else {
        debug!(%agent, "Nothing to withdraw, falling back to harvest");
        state.switch_to(agent, Some(TaskKind::Harvest), ctx.board);
        return Ok(Progress::Idle);
    };

    state.last_energy_source = Some(EnergySource::Withdraw);
    let outcome = ctx.host.withdraw(agent, target);
    ctx.settle("withdraw", outcome, &pos, TOUCH_RANGE)
}

fn cleanup<H: Capabilities + ?Sized>(state: &mut AgentTaskState, ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let agent = ctx.agent.id;
    let minimum = ctx.config.scavenge_minimum;
    let world = ctx.world;
    let found = ctx
        .board
        .best_matching(TaskKind::Cleanup, &ctx.agent.pos, agent, |task| {
            matches!(world.resolve(task.target), Some(ObjectRef::Loot(loot)) if is_scavengeable(loot, minimum))
        })
        .cloned();
    let Some(task) = found else {
        return Err(ctx.no_candidate("no loot worth scavenging"));
    };
    let Some(ObjectRef::Loot(loot)) = world.resolve(task.target) else {
        return Err(ColonyError::StaleReference(task.target));
    };

    state.last_energy_source = Some(EnergySource::Scavenge);
    let (action, outcome) = match loot.kind {
        LootKind::Dropped => ("pick_up", ctx.host.pick_up(agent, loot.id)),
        LootKind::Tombstone | LootKind::Ruin => ("withdraw", ctx.host.withdraw(agent, loot.id)),
    };
    ctx.settle(action, outcome, &task.pos, TOUCH_RANGE)
}

fn best_task<H: ?Sized>(ctx: &ActionContext<'_, H>, kind: TaskKind) -> Option<Task> {
    ctx.board.best(kind, &ctx.agent.pos, ctx.agent.id).cloned()
}

fn store<H: Capabilities + ?Sized>(state: &mut AgentTaskState, ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let Some(task) = best_task(ctx, TaskKind::Store) else {
        return Err(ctx.no_candidate("no store with free capacity"));
    };
    let outcome = ctx.host.transfer(ctx.agent.id, task.target);
    if outcome.is_ok() {
        state.last_energy_source = None;
    }
    ctx.settle("transfer", outcome, &task.pos, TOUCH_RANGE)
}

fn build<H: Capabilities + ?Sized>(ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let Some(task) = best_task(ctx, TaskKind::Build) else {
        return Err(ctx.no_candidate("no construction site"));
    };
    let outcome = ctx.host.build(ctx.agent.id, task.target);
    ctx.settle("build", outcome, &task.pos, WORK_RANGE)
}

fn repair<H: Capabilities + ?Sized>(state: &mut AgentTaskState, ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let agent = ctx.agent.id;
    // A cached target is kept only while the board still asks for it.
    let listed = |id: ObjectId| ctx.board.tasks_of(TaskKind::Repair).any(|t| t.target == id);
    let cached = state.scratch.target.and_then(|id| match ctx.world.resolve(id) {
        Some(ObjectRef::Structure(s)) if s.is_damaged() && listed(id) => {
            Some((s.id, ctx.at(s.tile)))
        }
        Some(_) => None,
        None => {
            debug!(%agent, target = %id, "Repair target is gone");
            None
        }
    });

    let (target, pos) = match cached {
        Some(found) => found,
        None => {
            state.scratch.target = None;
            let Some(task) = best_task(ctx, TaskKind::Repair) else {
                return Err(ctx.no_candidate("nothing to repair"));
            };
            state.scratch.target = Some(task.target);
            state.scratch.room = Some(task.pos.room.clone());
            (task.target, task.pos)
        }
    };

    let outcome = ctx.host.repair(agent, target);
    ctx.settle("repair", outcome, &pos, WORK_RANGE)
}

fn upgrade<H: Capabilities + ?Sized>(ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let target = best_task(ctx, TaskKind::Upgrade)
        .map(|task| (task.target, task.pos))
        .or_else(|| {
            ctx.room
                .controller
                .as_ref()
                .filter(|c| c.mine)
                .map(|c| (c.id, ctx.at(c.tile)))
        });
    let Some((target, pos)) = target else {
        return Err(ctx.no_candidate("no controller"));
    };
    let outcome = ctx.host.upgrade(ctx.agent.id, target);
    ctx.settle("upgrade", outcome, &pos, WORK_RANGE)
}

fn wait<H: Capabilities + ?Sized>(ctx: &mut ActionContext<'_, H>) -> Result<Progress> {
    let Some(task) = best_task(ctx, TaskKind::Wait) else {
        return Ok(Progress::Idle);
    };
    if ctx.agent.pos.tile.range_to(task.pos.tile) <= TOUCH_RANGE {
        return Ok(Progress::Idle);
    }
    Ok(ctx.travel(&task.pos, TOUCH_RANGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentId, RoomName};
    use crate::math::Fixed;
    use crate::snapshot::{Ownership, Store, Structure, StructureKind};

    /// Records calls and answers from a script.
    #[derive(Default)]
    struct Script {
        calls: Vec<(&'static str, ObjectId)>,
        moves: Vec<(Position, u8)>,
        answer: Option<ActionOutcome>,
    }

    impl Script {
        fn reply(&mut self, name: &'static str, target: ObjectId) -> ActionOutcome {
            self.calls.push((name, target));
            self.answer.clone().unwrap_or(ActionOutcome::Ok)
        }
    }

    impl Capabilities for Script {
        fn move_toward(&mut self, _: AgentId, target: &Position, range: u8) -> ActionOutcome {
            self.moves.push((target.clone(), range));
            ActionOutcome::Ok
        }
        fn harvest(&mut self, _: AgentId, node: ObjectId) -> ActionOutcome {
            self.reply("harvest", node)
        }
        fn transfer(&mut self, _: AgentId, target: ObjectId) -> ActionOutcome {
            self.reply("transfer", target)
        }
        fn withdraw(&mut self, _: AgentId, target: ObjectId) -> ActionOutcome {
            self.reply("withdraw", target)
        }
        fn pick_up(&mut self, _: AgentId, loot: ObjectId) -> ActionOutcome {
            self.reply("pick_up", loot)
        }
        fn build(&mut self, _: AgentId, site: ObjectId) -> ActionOutcome {
            self.reply("build", site)
        }
        fn repair(&mut self, _: AgentId, target: ObjectId) -> ActionOutcome {
            self.reply("repair", target)
        }
        fn upgrade(&mut self, _: AgentId, controller: ObjectId) -> ActionOutcome {
            self.reply("upgrade", controller)
        }
    }

    fn name() -> RoomName {
        RoomName::new("W1N1")
    }

    fn agent(carried: u32, fatigue: u32) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId(1),
            pos: Position::new(name(), Tile::new(10, 10)),
            carried,
            capacity: 50,
            fatigue,
        }
    }

    fn spawn_room(used: u32) -> RoomSnapshot {
        let mut room = RoomSnapshot::new(name());
        room.structures.push(Structure {
            id: ObjectId(3),
            kind: StructureKind::Spawn,
            tile: Tile::new(20, 20),
            hits: 5000,
            hits_max: 5000,
            owner: Ownership::Mine,
            store: Some(Store::new(used, 300)),
        });
        room
    }

    fn run(
        kind: TaskKind,
        state: &mut AgentTaskState,
        room: &RoomSnapshot,
        agent: &AgentSnapshot,
        board: &mut TaskBoard,
        host: &mut Script,
        ledger: &mut TrafficLedger,
    ) -> Result<Progress> {
        let mut world = WorldSnapshot::new(1);
        world.insert_room(room.clone());
        let config = AllocationConfig::default();
        let mut ctx = ActionContext {
            world: &world,
            room,
            agent,
            board,
            ledger,
            host,
            config: &config,
        };
        execute(kind, state, &mut ctx)
    }

    #[test]
    fn test_harvest_claims_and_moves_onto_tile() {
        let room = RoomSnapshot::new(name());
        let mut board = TaskBoard::new();
        let spot = Position::new(name(), Tile::new(14, 14));
        let id = board.create_or_refresh(TaskKind::Harvest, ObjectId(5), spot.clone(), Fixed::ONE, 1);
        let mut host = Script {
            answer: Some(ActionOutcome::NotInRange),
            ..Script::default()
        };
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState::default();

        let progress = run(TaskKind::Harvest, &mut state, &room, &agent(0, 0), &mut board, &mut host, &mut ledger);
        assert_eq!(progress.unwrap(), Progress::Moving);
        assert_eq!(board.lookup(id).unwrap().assigned_to, Some(AgentId(1)));
        assert_eq!(state.scratch.claim, Some(id));
        assert_eq!(state.last_energy_source, Some(EnergySource::Harvest));
        assert_eq!(host.moves, vec![(spot, 0)]);
        assert_eq!(ledger.score(Tile::new(10, 10)), Fixed::ONE);
    }

    #[test]
    fn test_fatigued_agent_does_not_move_or_record() {
        let room = spawn_room(0);
        let mut board = TaskBoard::new();
        board.create_or_refresh(
            TaskKind::Store,
            ObjectId(3),
            Position::new(name(), Tile::new(20, 20)),
            Fixed::ONE,
            1,
        );
        let mut host = Script {
            answer: Some(ActionOutcome::NotInRange),
            ..Script::default()
        };
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState::default();
        let progress = run(TaskKind::Store, &mut state, &room, &agent(50, 2), &mut board, &mut host, &mut ledger);
        assert_eq!(progress.unwrap(), Progress::Stuck);
        assert!(host.moves.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_successful_store_clears_energy_source() {
        let room = spawn_room(0);
        let mut board = TaskBoard::new();
        board.create_or_refresh(
            TaskKind::Store,
            ObjectId(3),
            Position::new(name(), Tile::new(20, 20)),
            Fixed::ONE,
            1,
        );
        let mut host = Script::default();
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState {
            last_energy_source: Some(EnergySource::Harvest),
            ..AgentTaskState::default()
        };
        let progress = run(TaskKind::Store, &mut state, &room, &agent(50, 0), &mut board, &mut host, &mut ledger);
        assert_eq!(progress.unwrap(), Progress::Worked);
        assert_eq!(state.last_energy_source, None);
        assert_eq!(host.calls, vec![("transfer", ObjectId(3))]);
    }

    #[test]
    fn test_withdraw_falls_back_to_critical_store() {
        let room = spawn_room(120);
        let mut board = TaskBoard::new();
        let mut host = Script::default();
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState {
            task: Some(TaskKind::Withdraw),
            ..AgentTaskState::default()
        };
        run(TaskKind::Withdraw, &mut state, &room, &agent(0, 0), &mut board, &mut host, &mut ledger).unwrap();
        assert_eq!(host.calls, vec![("withdraw", ObjectId(3))]);
        assert_eq!(state.last_energy_source, Some(EnergySource::Withdraw));
    }

    #[test]
    fn test_withdraw_with_nothing_stocked_relatches_harvest() {
        let room = spawn_room(0);
        let mut board = TaskBoard::new();
        let mut host = Script::default();
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState {
            task: Some(TaskKind::Withdraw),
            ..AgentTaskState::default()
        };
        let progress = run(TaskKind::Withdraw, &mut state, &room, &agent(0, 0), &mut board, &mut host, &mut ledger);
        assert_eq!(progress.unwrap(), Progress::Idle);
        assert_eq!(state.task, Some(TaskKind::Harvest));
        assert!(host.calls.is_empty());
    }

    #[test]
    fn test_rejection_surfaces_as_recoverable_error() {
        let room = spawn_room(0);
        let mut board = TaskBoard::new();
        board.create_or_refresh(
            TaskKind::Build,
            ObjectId(9),
            Position::new(name(), Tile::new(11, 11)),
            Fixed::from_num(0.5),
            1,
        );
        let mut host = Script {
            answer: Some(ActionOutcome::failed("not owner")),
            ..Script::default()
        };
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState::default();
        let err = run(TaskKind::Build, &mut state, &room, &agent(50, 0), &mut board, &mut host, &mut ledger)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, ColonyError::ActionRejected { action: "build", .. }));
    }

    #[test]
    fn test_repair_drops_cached_target_no_longer_listed() {
        let mut room = RoomSnapshot::new(name());
        for (id, kind, x) in [(7, StructureKind::Road, 5), (8, StructureKind::Container, 12)] {
            room.structures.push(Structure {
                id: ObjectId(id),
                kind,
                tile: Tile::new(x, 5),
                hits: 50,
                hits_max: 5000,
                owner: Ownership::Mine,
                store: None,
            });
        }
        let mut board = TaskBoard::new();
        board.create_or_refresh(
            TaskKind::Repair,
            ObjectId(8),
            Position::new(name(), Tile::new(12, 5)),
            Fixed::from_num(0.5),
            1,
        );
        let mut host = Script::default();
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState::default();
        state.scratch.target = Some(ObjectId(7));

        let progress = run(TaskKind::Repair, &mut state, &room, &agent(50, 0), &mut board, &mut host, &mut ledger);
        assert_eq!(progress.unwrap(), Progress::Worked);
        assert_eq!(host.calls, vec![("repair", ObjectId(8))]);
        assert_eq!(state.scratch.target, Some(ObjectId(8)));
    }

    #[test]
    fn test_missing_candidate_is_reported() {
        let room = RoomSnapshot::new(name());
        let mut board = TaskBoard::new();
        let mut host = Script::default();
        let mut ledger = TrafficLedger::new();
        let mut state = AgentTaskState::default();
        let err = run(TaskKind::Repair, &mut state, &room, &agent(50, 0), &mut board, &mut host, &mut ledger)
            .unwrap_err();
        assert!(matches!(err, ColonyError::NoCandidate { .. }));
        let idle = run(TaskKind::Wait, &mut state, &room, &agent(0, 0), &mut board, &mut host, &mut ledger);
        assert_eq!(idle.unwrap(), Progress::Idle);
    }
}
