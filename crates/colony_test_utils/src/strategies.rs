//! Proptest strategies.
//!
//! These strategies generate random but reproducible inputs for
//! property-based tests of the board, the balancer, the planner and the
//! autoscaler.

use proptest::prelude::*;

use colony_core::allocation::TaskCensus;
use colony_core::autoscaler::Bucket;
use colony_core::board::TaskKind;
use colony_core::components::{ObjectId, Position, RoomName, Tile, ROOM_SIZE};
use colony_core::math::Fixed;

use crate::fixtures::HOME;

/// Any tile inside a room.
pub fn arb_tile() -> impl Strategy<Value = Tile> {
    (0..ROOM_SIZE, 0..ROOM_SIZE).prop_map(|(x, y)| Tile::new(x, y))
}

/// A tile in the [`HOME`] room.
pub fn arb_home_position() -> impl Strategy<Value = Position> {
    arb_tile().prop_map(|tile| Position::new(RoomName::new(HOME), tile))
}

/// Any task kind.
pub fn arb_task_kind() -> impl Strategy<Value = TaskKind> {
    prop_oneof![
        Just(TaskKind::Harvest),
        Just(TaskKind::Withdraw),
        Just(TaskKind::Cleanup),
        Just(TaskKind::Store),
        Just(TaskKind::Build),
        Just(TaskKind::Repair),
        Just(TaskKind::Upgrade),
        Just(TaskKind::Wait),
    ]
}

/// A priority in `(0, 1]` with 1/1000 resolution.
pub fn arb_priority() -> impl Strategy<Value = Fixed> {
    (1i32..=1000).prop_map(|p| Fixed::from_num(p) / Fixed::from_num(1000))
}

/// A task key and priority: `(kind, target, position, priority)`.
pub fn arb_task_key() -> impl Strategy<Value = (TaskKind, ObjectId, Position, Fixed)> {
    (
        arb_task_kind(),
        (1u64..20).prop_map(ObjectId),
        arb_home_position(),
        arb_priority(),
    )
}

/// A non-empty subset of the productive kinds, in preference order.
pub fn arb_valid_productive() -> impl Strategy<Value = Vec<TaskKind>> {
    proptest::sample::subsequence(TaskKind::PRODUCTIVE.to_vec(), 1..=TaskKind::PRODUCTIVE.len())
}

/// A census whose per-kind counts add up to at most its total.
pub fn arb_census(max_total: usize) -> impl Strategy<Value = TaskCensus> {
    proptest::collection::vec(0usize..=max_total, TaskKind::PRODUCTIVE.len()).prop_map(
        move |counts| {
            let mut census = TaskCensus::default();
            let mut left = max_total;
            for (kind, count) in TaskKind::PRODUCTIVE.iter().zip(counts) {
                let count = count.min(left);
                left -= count;
                if count > 0 {
                    census.active.insert(*kind, count);
                }
            }
            census.total = max_total;
            census
        },
    )
}

/// Sparse traffic scores: `(tile, integer score)` pairs.
pub fn arb_traffic(max_tiles: usize) -> impl Strategy<Value = Vec<(Tile, u16)>> {
    proptest::collection::vec((arb_tile(), 0u16..2000), 0..max_tiles)
}

/// A bucket with at least `min_ticks` samples and a sane idle count.
pub fn arb_bucket(min_ticks: u64) -> impl Strategy<Value = Bucket> {
    (min_ticks..min_ticks * 10 + 1)
        .prop_flat_map(|ticks| (Just(ticks), 0..=ticks))
        .prop_map(|(ticks, idle_ticks)| Bucket { ticks, idle_ticks })
}
