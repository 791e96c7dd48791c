//! Property tests for the board, the planner scaler, the ledger and the
//! balancer.

use std::collections::BTreeSet;

use colony_core::allocation::{balance, AgentRegistry, AgentTaskState, Allocator, TaskCensus};
use colony_core::board::{TaskBoard, TaskKind};
use colony_core::components::AgentId;
use colony_core::config::{AllocationConfig, PlannerConfig};
use colony_core::math::{percent, ratio, Fixed};
use colony_core::oracle::Oracle;
use colony_core::planner::{AlwaysMaintain, ThresholdScaler, TrafficLedger};
use colony_core::snapshot::StructureKind;
use colony_test_utils::fixtures::{RoomBuilder, WorldBuilder};
use colony_test_utils::strategies::{
    arb_census, arb_task_key, arb_tile, arb_traffic, arb_valid_productive,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn board_never_holds_duplicate_keys(keys in proptest::collection::vec(arb_task_key(), 1..80)) {
        let mut board = TaskBoard::new();
        for (tick, (kind, target, pos, priority)) in keys.iter().cloned().enumerate() {
            board.create_or_refresh(kind, target, pos, priority, tick as u64);
        }

        let mut seen = BTreeSet::new();
        for task in board.tasks() {
            prop_assert!(seen.insert((task.kind, task.target, task.pos.clone())));
        }
        let distinct: BTreeSet<_> = keys.iter().map(|(k, t, p, _)| (*k, *t, p.clone())).collect();
        prop_assert_eq!(board.len(), distinct.len());
    }

    #[test]
    fn sweep_is_idempotent(
        keys in proptest::collection::vec(arb_task_key(), 0..60),
        modulus in 2u64..5,
    ) {
        let mut board = TaskBoard::new();
        for (kind, target, pos, priority) in keys {
            board.create_or_refresh(kind, target, pos, priority, 1);
        }
        let valid = |task: &colony_core::board::Task| task.target.0 % modulus != 0;

        board.sweep(valid);
        let once = board.clone();
        let second = board.sweep(valid);

        prop_assert_eq!(&board, &once);
        prop_assert_eq!(second.invalidated, 0);
        prop_assert_eq!(second.removed, 0);
    }

    #[test]
    fn ledger_decay_prunes_within_bound(score in 2u16..2000, tile in arb_tile()) {
        let config = PlannerConfig::default();
        let retain = config.retain_factor();
        let floor = config.floor();
        let mut ledger = TrafficLedger::new();
        ledger.set(tile, Fixed::from_num(score));

        let bound = ((1.0 / f64::from(score)).ln() / 0.9f64.ln()).ceil() as usize;
        let mut applications = 0;
        while !ledger.is_empty() {
            ledger.decay(retain, floor);
            applications += 1;
            prop_assert!(applications <= bound, "still tracked after {} decays", applications);
        }
    }

    #[test]
    fn decay_never_raises_a_score(traffic in arb_traffic(40)) {
        let config = PlannerConfig::default();
        let mut ledger = TrafficLedger::new();
        for (tile, score) in &traffic {
            ledger.set(*tile, Fixed::from_num(*score));
        }
        let before = ledger.clone();
        ledger.decay(config.retain_factor(), config.floor());
        for (tile, score) in ledger.iter() {
            prop_assert!(score < before.score(tile) || score == Fixed::ZERO);
            prop_assert!(score >= config.floor());
        }
    }

    #[test]
    fn scale_is_monotonic_in_road_count(a in 0usize..1000, b in 0usize..1000) {
        let scaler = ThresholdScaler::new(&PlannerConfig::default());
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(scaler.scale(low) <= scaler.scale(high));
    }

    #[test]
    fn balancer_picks_a_valid_kind_or_upgrade(
        census in arb_census(30),
        valid in arb_valid_productive(),
    ) {
        let kind = balance(&census, &valid);
        prop_assert!(valid.contains(&kind) || kind == TaskKind::Upgrade);
    }

    #[test]
    fn census_ignores_registration_order(
        kinds in proptest::collection::vec(
            prop_oneof![
                Just(None),
                Just(Some(TaskKind::Store)),
                Just(Some(TaskKind::Build)),
                Just(Some(TaskKind::Repair)),
                Just(Some(TaskKind::Upgrade)),
                Just(Some(TaskKind::Harvest)),
                Just(Some(TaskKind::Wait)),
            ],
            1..20,
        ),
        seed in any::<u64>(),
    ) {
        let mut world = WorldBuilder::at(1).room(RoomBuilder::home().build());
        for id in 0..kinds.len() as u64 {
            world = world.agent(id + 1, 10, 10, 25);
        }
        let world = world.build();

        let forward = registry_in_order(&kinds, (0..kinds.len()).collect());
        let mut order: Vec<usize> = (0..kinds.len()).collect();
        // Reverse, then rotate by the seed for an adversarial insertion order.
        order.reverse();
        order.rotate_left((seed % kinds.len() as u64) as usize);
        let shuffled = registry_in_order(&kinds, order);

        prop_assert_eq!(TaskCensus::take(&world, &forward), TaskCensus::take(&world, &shuffled));
    }

    #[test]
    fn balancer_decisions_do_not_depend_on_agent_order(
        latched in proptest::collection::vec(
            prop_oneof![
                Just(None),
                Just(Some(TaskKind::Store)),
                Just(Some(TaskKind::Build)),
                Just(Some(TaskKind::Repair)),
            ],
            2..16,
        ),
    ) {
        let room = RoomBuilder::home()
            .structure(StructureKind::Spawn, 25, 25)
            .site(StructureKind::Extension, 27, 27, 0, 3000)
            .controller(40, 40, 20_000)
            .build();
        let mut world = WorldBuilder::at(1).room(room.clone());
        for id in 0..latched.len() as u64 {
            world = world.agent(id + 1, 20, 20, 30);
        }
        let world = world.build();
        let order: Vec<usize> = (0..latched.len()).collect();
        let registry = registry_in_order(&latched, order.clone());
        let census = TaskCensus::take(&world, &registry);

        let forward = decide_all(&world, &room, &registry, &census, order.iter().copied());
        let backward = decide_all(&world, &room, &registry, &census, order.iter().rev().copied());
        let interleaved = decide_all(
            &world,
            &room,
            &registry,
            &census,
            order.iter().step_by(2).chain(order.iter().skip(1).step_by(2)).copied(),
        );

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(&forward, &interleaved);
    }
}

fn registry_in_order(kinds: &[Option<TaskKind>], order: Vec<usize>) -> AgentRegistry {
    let mut registry = AgentRegistry::default();
    for index in order {
        let state = registry.entry(AgentId(index as u64 + 1));
        *state = AgentTaskState {
            task: kinds[index],
            ..AgentTaskState::default()
        };
    }
    registry
}

fn decide_all<I>(
    world: &colony_core::snapshot::WorldSnapshot,
    room: &colony_core::snapshot::RoomSnapshot,
    registry: &AgentRegistry,
    census: &TaskCensus,
    order: I,
) -> Vec<(AgentId, TaskKind)>
where
    I: Iterator<Item = usize>,
{
    let allocator = Allocator::new(AllocationConfig::default());
    let oracle = Oracle::new(room, &AlwaysMaintain);
    let mut registry = registry.clone();
    let mut board = TaskBoard::new();
    let mut choices: Vec<(AgentId, TaskKind)> = order
        .map(|index| {
            let id = AgentId(index as u64 + 1);
            let Some(agent) = world.agent(id) else {
                panic!("agent {id} missing from fixture");
            };
            let choice = allocator.decide(agent, registry.entry(id), &mut board, census, &oracle);
            (id, choice.kind)
        })
        .collect();
    choices.sort();
    choices
}

#[test]
fn threshold_scale_matches_reference_points() {
    let scaler = ThresholdScaler::new(&PlannerConfig::default());
    assert_eq!(scaler.scale(0), percent(20));
    assert_eq!(scaler.scale(125), ratio(1, 2));
    assert_eq!(scaler.scale(300), ratio(6, 5));
}

#[test]
fn balancer_reference_case_chooses_store() {
    let census = TaskCensus {
        total: 10,
        active: [(TaskKind::Store, 2)].into_iter().collect(),
    };
    assert_eq!(balance(&census, &TaskKind::PRODUCTIVE), TaskKind::Store);
}
