//! Grid-based pathfinding using the A* algorithm.
//!
//! Costs are small integers so results are identical on every platform.
//! Diagonal steps cost the same as cardinal ones, which makes Chebyshev
//! distance an admissible heuristic.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use colony_core::components::{Tile, ROOM_SIZE};
use colony_core::host::{PathCosts, IMPASSABLE};
use colony_core::snapshot::{Terrain, TerrainGrid};

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    tile: Tile,
    /// f_score = g_score + heuristic
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u16,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i16, i16); 8] = [
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

#[inline]
fn tie_breaker(tile: Tile) -> u16 {
    u16::from(tile.y) * u16::from(ROOM_SIZE) + u16::from(tile.x)
}

/// Steps still needed to come within `range` of `goal`.
#[inline]
fn heuristic(tile: Tile, goal: Tile, range: u8) -> u32 {
    u32::from(tile.range_to(goal).saturating_sub(range))
}

/// Cost of stepping onto a tile, `None` when impassable.
#[must_use]
pub fn step_cost(terrain: &TerrainGrid, tile: Tile, costs: &PathCosts) -> Option<u32> {
    let cost = match costs.overrides.get(&tile) {
        Some(&cost) => cost,
        None => match terrain.get(tile) {
            Terrain::Plain => costs.plain,
            Terrain::Swamp => costs.swamp,
            Terrain::Wall => IMPASSABLE,
        },
    };
    (cost != IMPASSABLE).then_some(u32::from(cost.max(1)))
}

fn neighbor(tile: Tile, (dx, dy): (i16, i16)) -> Option<Tile> {
    let x = i16::from(tile.x) + dx;
    let y = i16::from(tile.y) + dy;
    let size = i16::from(ROOM_SIZE);
    if x < 0 || y < 0 || x >= size || y >= size {
        return None;
    }
    Some(Tile::new(x as u8, y as u8))
}

/// Find a path from `start` to any tile within `range` of `goal`.
///
/// The returned tiles exclude `start`. An empty path means `start` is
/// already in range. `None` means no path exists.
#[must_use]
pub fn find_path(
    terrain: &TerrainGrid,
    start: Tile,
    goal: Tile,
    range: u8,
    costs: &PathCosts,
) -> Option<Vec<Tile>> {
    if start.range_to(goal) <= range {
        return Some(Vec::new());
    }

    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<Tile, Tile> = HashMap::new();
    let mut g_score: HashMap<Tile, u32> = HashMap::new();

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        tile: start,
        f_score: heuristic(start, goal, range),
        tie_breaker: tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if current.tile.range_to(goal) <= range {
            return Some(reconstruct_path(&came_from, start, current.tile));
        }

        let current_g = g_score.get(&current.tile).copied().unwrap_or(u32::MAX);
        // Stale heap entry.
        if current.f_score > current_g.saturating_add(heuristic(current.tile, goal, range)) {
            continue;
        }

        for direction in DIRECTIONS {
            let Some(next) = neighbor(current.tile, direction) else {
                continue;
            };
            let Some(cost) = step_cost(terrain, next, costs) else {
                continue;
            };

            let tentative_g = current_g + cost;
            let neighbor_g = g_score.get(&next).copied().unwrap_or(u32::MAX);
            if tentative_g < neighbor_g {
                came_from.insert(next, current.tile);
                g_score.insert(next, tentative_g);
                open_set.push(AStarNode {
                    tile: next,
                    f_score: tentative_g + heuristic(next, goal, range),
                    tie_breaker: tie_breaker(next),
                });
            }
        }
    }

    None
}

fn reconstruct_path(came_from: &HashMap<Tile, Tile>, start: Tile, end: Tile) -> Vec<Tile> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> TerrainGrid {
        TerrainGrid::plain()
    }

    #[test]
    fn test_straight_line_path() {
        let path = find_path(&open(), Tile::new(5, 5), Tile::new(10, 5), 0, &PathCosts::default())
            .unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.last(), Some(&Tile::new(10, 5)));
        assert!(!path.contains(&Tile::new(5, 5)));
    }

    #[test]
    fn test_diagonal_costs_one_step() {
        let path = find_path(&open(), Tile::new(0, 0), Tile::new(4, 4), 0, &PathCosts::default())
            .unwrap();
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_stops_within_range() {
        let path = find_path(&open(), Tile::new(5, 5), Tile::new(12, 5), 3, &PathCosts::default())
            .unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.last().map(|t| t.range_to(Tile::new(12, 5))), Some(3));
        let here = find_path(&open(), Tile::new(5, 5), Tile::new(6, 6), 1, &PathCosts::default());
        assert_eq!(here, Some(Vec::new()));
    }

    #[test]
    fn test_routes_around_walls() {
        let mut terrain = open();
        for y in 0..49 {
            terrain.set(Tile::new(10, y), Terrain::Wall);
        }
        let path = find_path(&terrain, Tile::new(5, 5), Tile::new(15, 5), 0, &PathCosts::default())
            .unwrap();
        assert!(path.iter().all(|t| terrain.get(*t) != Terrain::Wall));
        assert!(path.contains(&Tile::new(10, 49)));
    }

    #[test]
    fn test_no_path_when_sealed() {
        let mut terrain = open();
        for tile in Tile::new(20, 20).ring() {
            terrain.set(tile, Terrain::Wall);
        }
        assert!(find_path(&terrain, Tile::new(5, 5), Tile::new(20, 20), 0, &PathCosts::default())
            .is_none());
    }

    #[test]
    fn test_overrides_steer_the_path() {
        let mut costs = PathCosts {
            plain: 2,
            swamp: 10,
            ..PathCosts::default()
        };
        // A cheap road one row down beats the plain straight line.
        for x in 6..15 {
            costs.overrides.insert(Tile::new(x, 6), 1);
        }
        let path = find_path(&open(), Tile::new(5, 5), Tile::new(15, 5), 0, &costs).unwrap();
        assert!(path.iter().filter(|t| t.y == 6).count() >= 8);

        costs.overrides.insert(Tile::new(15, 5), IMPASSABLE);
        assert!(find_path(&open(), Tile::new(5, 5), Tile::new(15, 5), 0, &costs).is_none());
    }

    #[test]
    fn test_paths_are_deterministic() {
        let a = find_path(&open(), Tile::new(3, 3), Tile::new(40, 30), 1, &PathCosts::default());
        let b = find_path(&open(), Tile::new(3, 3), Tile::new(40, 30), 1, &PathCosts::default());
        assert_eq!(a, b);
    }
}
