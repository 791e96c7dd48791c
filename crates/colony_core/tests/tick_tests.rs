//! End-to-end ticks of the autopilot against a recording host.

use std::collections::BTreeSet;

use colony_core::autoscaler::{Autoscaler, PopulationScores};
use colony_core::board::TaskKind;
use colony_core::budget::{AgentQuota, Unlimited};
use colony_core::colony::Colony;
use colony_core::components::{AgentId, Tile};
use colony_core::config::{AutoscalerConfig, ColonyConfig};
use colony_core::host::{ActionOutcome, SpawnOutcome};
use colony_core::math::Fixed;
use colony_core::planner::TrafficLedgers;
use colony_core::snapshot::{StructureKind, WorldSnapshot};
use colony_core::store::{MemoryStore, StateStore, StateStoreExt};
use colony_test_utils::determinism::{store_hash, verify_determinism};
use colony_test_utils::fixtures::{starter_room, RecordingHost, RoomBuilder, WorldBuilder};

fn colony() -> Colony<MemoryStore> {
    Colony::new(ColonyConfig::default(), MemoryStore::new()).unwrap()
}

fn build_world(tick: u64) -> WorldSnapshot {
    let room = RoomBuilder::home()
        .structure(StructureKind::Spawn, 25, 25)
        .site(StructureKind::Extension, 27, 27, 100, 3000)
        .node(10, 10, 3000, 3000)
        .controller(40, 40, 20_000)
        .landmark(30, 30)
        .build();
    WorldBuilder::at(tick)
        .room(room)
        .agent(1, 26, 26, 50)
        .build()
}

fn crowded_world(tick: u64) -> WorldSnapshot {
    let mut world = WorldBuilder::at(tick).room(starter_room());
    for id in 1..=6u64 {
        let carried = if id % 2 == 0 { 0 } else { 50 };
        world = world.agent(id, 20 + id as u8, 20, carried);
    }
    world.build()
}

#[test]
fn latched_kind_survives_an_unchanged_world() {
    let mut colony = colony();
    let mut host = RecordingHost::new();

    let first = colony.tick(&build_world(1), &mut host, &mut Unlimited).unwrap();
    assert_eq!(first.switches, 1);
    let latched = colony.agents().unwrap().get(AgentId(1)).and_then(|s| s.task);
    assert_eq!(latched, Some(TaskKind::Store));

    for tick in 2..6 {
        let report = colony.tick(&build_world(tick), &mut host, &mut Unlimited).unwrap();
        assert_eq!(report.switches, 0, "switched on tick {tick}");
        let now = colony.agents().unwrap().get(AgentId(1)).and_then(|s| s.task);
        assert_eq!(now, latched);
    }
}

#[test]
fn truncated_tick_leaves_consistent_records() {
    let mut colony = colony();
    let mut host = RecordingHost::new();

    let partial = colony
        .tick(&crowded_world(1), &mut host, &mut AgentQuota(3))
        .unwrap();
    assert!(partial.truncated);
    assert_eq!(partial.agents_processed, 3);

    let registry = colony.agents().unwrap();
    assert_eq!(registry.len(), 3);
    assert_board_is_consistent(&colony, &crowded_world(1));

    let full = colony.tick(&crowded_world(2), &mut host, &mut Unlimited).unwrap();
    assert!(!full.truncated);
    assert_eq!(full.agents_processed, 6);
    let registry = colony.agents().unwrap();
    assert_eq!(registry.len(), 6);
    assert!(registry.iter().all(|(_, state)| state.task.is_some()));
    assert_board_is_consistent(&colony, &crowded_world(2));
}

fn assert_board_is_consistent(colony: &Colony<MemoryStore>, world: &WorldSnapshot) {
    let board = colony.board().unwrap();
    let mut keys = BTreeSet::new();
    for task in board.tasks() {
        assert!(keys.insert((task.kind, task.target, task.pos.clone())), "duplicate {task:?}");
        if let Some(holder) = task.assigned_to {
            assert!(world.agent(holder).is_some(), "claim held by missing {holder}");
        }
    }
    let claimed: Vec<_> = board
        .tasks()
        .filter(|t| t.kind == TaskKind::Harvest)
        .filter_map(|t| t.assigned_to)
        .collect();
    let distinct: BTreeSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), distinct.len(), "an agent holds two harvest spots");
}

#[test]
fn records_survive_a_process_restart() {
    let mut colony = colony();
    let mut host = RecordingHost::new();
    colony.tick(&crowded_world(1), &mut host, &mut Unlimited).unwrap();
    let board = colony.board().unwrap();
    let agents = colony.agents().unwrap();

    let restarted = Colony::new(ColonyConfig::default(), colony.into_store()).unwrap();
    assert_eq!(restarted.board().unwrap(), board);
    assert_eq!(restarted.agents().unwrap(), agents);
}

#[test]
fn corrupt_record_is_reset_not_fatal() {
    let mut store = MemoryStore::new();
    store.put("board", vec![0xff; 7]);
    let mut colony = Colony::new(ColonyConfig::default(), store).unwrap();
    assert!(colony.board().is_err());

    let mut host = RecordingHost::new();
    let report = colony.tick(&crowded_world(1), &mut host, &mut Unlimited).unwrap();
    assert!(report.tasks_live > 0);
    assert!(colony.board().is_ok());
}

#[test]
fn departed_agents_release_their_claims() {
    let mut colony = colony();
    let mut host = RecordingHost::new();
    colony.tick(&crowded_world(1), &mut host, &mut Unlimited).unwrap();

    let survivors = WorldBuilder::at(2)
        .room(starter_room())
        .agent(1, 21, 20, 50)
        .build();
    let report = colony.tick(&survivors, &mut host, &mut Unlimited).unwrap();
    assert_eq!(report.forgotten, 5);
    assert_eq!(colony.agents().unwrap().len(), 1);
    assert_board_is_consistent(&colony, &survivors);
}

#[test]
fn cold_start_requests_agents_up_to_baseline() {
    let mut colony = colony();
    let mut host = RecordingHost::new();
    let report = colony.tick(&crowded_world(1), &mut host, &mut Unlimited).unwrap();
    assert_eq!(report.population_target, 10);
    assert_eq!(report.spawn, Some(SpawnOutcome::Ok));

    host.spawn_outcome = SpawnOutcome::Busy;
    let report = colony.tick(&crowded_world(2), &mut host, &mut Unlimited).unwrap();
    assert_eq!(report.spawn, Some(SpawnOutcome::Busy));
}

#[test]
fn planning_round_proposes_roads_on_busy_tiles() {
    let mut colony = colony();
    let mut host = RecordingHost {
        work_outcome: ActionOutcome::NotInRange,
        ..RecordingHost::new()
    };
    // Every target is out of reach, so every agent steps and bumps the ledger.
    for tick in 1..100 {
        colony.tick(&crowded_world(tick), &mut host, &mut Unlimited).unwrap();
    }
    host.clear();
    let report = colony.tick(&crowded_world(100), &mut host, &mut Unlimited).unwrap();
    assert_eq!(report.plans.len(), 1);
    let plan = &report.plans[0];
    assert_eq!(plan.proposed, host.proposals().len());
    assert_eq!(plan.evaluated, 6);
    assert_eq!(plan.proposed, 6);
}

#[test]
fn roads_losing_traffic_lose_their_repair_task() {
    let road = Tile::new(5, 5);
    let room = RoomBuilder::home()
        .road(5, 5, 50)
        .structure_with(StructureKind::Container, 12, 12, |s| s.hits /= 2)
        .build();
    let world = |tick: u64| WorldBuilder::at(tick).room(room.clone()).build();
    let road_repairs = |colony: &Colony<MemoryStore>| {
        colony
            .board()
            .unwrap()
            .tasks_of(TaskKind::Repair)
            .filter(|t| t.pos.tile == road)
            .count()
    };
    let mut host = RecordingHost::new();

    let mut store = MemoryStore::new();
    let mut ledgers = TrafficLedgers::default();
    ledgers.entry(&room.name).set(road, Fixed::from_num(1000));
    store.save(&ledgers).unwrap();
    let mut colony = Colony::new(ColonyConfig::default(), store).unwrap();
    colony.tick(&world(1), &mut host, &mut Unlimited).unwrap();
    assert_eq!(road_repairs(&colony), 1);

    // Traffic is gone: the road falls out of the maintenance band.
    let mut store = colony.into_store();
    store.save(&TrafficLedgers::default()).unwrap();
    let mut colony = Colony::new(ColonyConfig::default(), store).unwrap();
    let report = colony.tick(&world(2), &mut host, &mut Unlimited).unwrap();
    assert_eq!(report.sweep.invalidated, 1);
    assert_eq!(road_repairs(&colony), 0);
    assert_eq!(colony.board().unwrap().tasks_of(TaskKind::Repair).count(), 1);
}

#[test]
fn ticks_are_deterministic() {
    struct Run {
        colony: Colony<MemoryStore>,
        host: RecordingHost,
        tick: u64,
    }

    let result = verify_determinism(
        3,
        120,
        || Run {
            colony: colony(),
            host: RecordingHost::new(),
            tick: 0,
        },
        |run: &mut Run| {
            run.tick += 1;
            let world = crowded_world(run.tick);
            run.colony.tick(&world, &mut run.host, &mut Unlimited).unwrap();
        },
        |run: &Run| store_hash(run.colony.store()),
    );
    result.assert_deterministic();
}

#[test]
fn autoscaler_settles_next_to_the_idle_sweet_spot() {
    // Beyond eight agents every extra agent idles.
    let idle_at = |population: u32| population.saturating_sub(8);
    let scaler = Autoscaler::new(AutoscalerConfig::default());
    let mut scores = PopulationScores::default();
    let mut population = 10;
    for _ in 0..400 {
        population = scaler.update(&mut scores, population, idle_at(population));
    }
    assert_eq!(population, 9);
    assert_eq!(scores.target(), Some(9));
}
