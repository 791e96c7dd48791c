//! Task board: the shared registry of pending work.
//!
//! Tasks are keyed by `(kind, target, position)`. Re-creating a task that is
//! already on the board refreshes its priority and timestamp in place, so the
//! generator can run every tick without growing the board. The sweep removes
//! tasks whose target stopped being actionable.
//!
//! The board is process-wide and unsynchronized. It must only be mutated by
//! the single tick driver.

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::{AgentId, ObjectId, Position, RoomName};
use crate::math::{fixed_serde, Fixed};
use crate::store::Persisted;

/// Unique, opaque task identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Kinds of work an agent can latch onto.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TaskKind {
    /// Extract energy from a resource node.
    Harvest,
    /// Take energy out of a store.
    Withdraw,
    /// Scavenge loot piles, tombstones and ruins.
    Cleanup,
    /// Deliver energy to a store.
    Store,
    /// Work on a construction site.
    Build,
    /// Restore hit points of a structure.
    Repair,
    /// Feed the growth controller.
    Upgrade,
    /// Drift to the idle landmark.
    Wait,
}

impl TaskKind {
    /// Productive kinds in balancer preference order.
    pub const PRODUCTIVE: [Self; 4] = [Self::Store, Self::Build, Self::Repair, Self::Upgrade];

    /// Kinds that fill an agent up.
    #[must_use]
    pub const fn is_refuel(self) -> bool {
        matches!(self, Self::Harvest | Self::Withdraw | Self::Cleanup)
    }

    /// Kinds that spend carried energy.
    #[must_use]
    pub const fn is_productive(self) -> bool {
        matches!(self, Self::Store | Self::Build | Self::Repair | Self::Upgrade)
    }

    /// Kinds whose tasks may be held by at most one agent.
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Harvest)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::Withdraw => "withdraw",
            Self::Cleanup => "cleanup",
            Self::Store => "store",
            Self::Build => "build",
            Self::Repair => "repair",
            Self::Upgrade => "upgrade",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unit of pending work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id.
    pub id: TaskId,
    /// What to do.
    pub kind: TaskKind,
    /// Weak reference to the target; may dangle.
    pub target: ObjectId,
    /// Where to do it.
    pub pos: Position,
    /// Higher is more urgent. Zero means "remove", negative means fallback.
    #[serde(with = "fixed_serde")]
    pub priority: Fixed,
    /// Agent holding an exclusive claim.
    pub assigned_to: Option<AgentId>,
    /// Tick of the last create or refresh.
    pub updated_at: u64,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Tasks whose predicate failed this sweep.
    pub invalidated: usize,
    /// Tasks removed for having zero priority.
    pub removed: usize,
}

/// Registry of pending tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBoard {
    next_id: u64,
    tasks: Vec<Task>,
}

impl Persisted for TaskBoard {
    const KEY: &'static str = "board";
}

impl TaskBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the board is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All live tasks in creation order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Live tasks of one kind.
    pub fn tasks_of(&self, kind: TaskKind) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.kind == kind)
    }

    fn find_mut(&mut self, kind: TaskKind, target: ObjectId, pos: &Position) -> Option<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.kind == kind && t.target == target && t.pos == *pos)
    }

    /// Create a task, or refresh the existing one for the same
    /// `(kind, target, position)`.
    ///
    /// A refresh updates priority and timestamp and leaves any claim intact.
    pub fn create_or_refresh(
        &mut self,
        kind: TaskKind,
        target: ObjectId,
        pos: Position,
        priority: Fixed,
        tick: u64,
    ) -> TaskId {
        if let Some(task) = self.find_mut(kind, target, &pos) {
            task.priority = priority;
            task.updated_at = tick;
            return task.id;
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push(Task {
            id,
            kind,
            target,
            pos,
            priority,
            assigned_to: None,
            updated_at: tick,
        });
        id
    }

    /// Zero the priority of every task failing `still_valid`, then drop all
    /// zero-priority tasks.
    pub fn sweep<F>(&mut self, mut still_valid: F) -> SweepReport
    where
        F: FnMut(&Task) -> bool,
    {
        let mut report = SweepReport::default();
        for task in &mut self.tasks {
            if !still_valid(task) {
                task.priority = Fixed::ZERO;
                report.invalidated += 1;
            }
        }
        let before = self.tasks.len();
        self.tasks.retain(|t| t.priority != Fixed::ZERO);
        report.removed = before - self.tasks.len();
        report
    }

    /// Look up a task by id.
    ///
    /// `None` means the task is gone: the holder must drop it rather than
    /// retry the same id.
    #[must_use]
    pub fn lookup(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Claim a task for an agent. Fails if the task is gone or held by
    /// another agent.
    pub fn claim(&mut self, id: TaskId, agent: AgentId) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) if task.assigned_to.map_or(true, |holder| holder == agent) => {
                task.assigned_to = Some(agent);
                true
            }
            _ => false,
        }
    }

    /// Release every claim held by an agent. Returns the number released.
    pub fn release(&mut self, agent: AgentId) -> usize {
        let mut released = 0;
        for task in &mut self.tasks {
            if task.assigned_to == Some(agent) {
                task.assigned_to = None;
                released += 1;
            }
        }
        released
    }

    /// Release claims held by agents for which `alive` returns false.
    pub fn release_missing<F>(&mut self, alive: F) -> usize
    where
        F: Fn(AgentId) -> bool,
    {
        let mut released = 0;
        for task in &mut self.tasks {
            if let Some(holder) = task.assigned_to {
                if !alive(holder) {
                    task.assigned_to = None;
                    released += 1;
                }
            }
        }
        released
    }

    /// Best task of a kind for an agent: highest priority, then closest by
    /// range, then lowest id.
    ///
    /// Exclusive tasks claimed by other agents are skipped.
    #[must_use]
    pub fn best(&self, kind: TaskKind, origin: &Position, agent: AgentId) -> Option<&Task> {
        self.best_matching(kind, origin, agent, |_| true)
    }

    /// Like [`best`](Self::best), restricted to tasks passing `filter`.
    pub fn best_matching<F>(
        &self,
        kind: TaskKind,
        origin: &Position,
        agent: AgentId,
        filter: F,
    ) -> Option<&Task>
    where
        F: Fn(&Task) -> bool,
    {
        self.tasks
            .iter()
            .filter(|t| t.kind == kind && t.pos.room == origin.room)
            .filter(|t| {
                !kind.is_exclusive() || t.assigned_to.map_or(true, |holder| holder == agent)
            })
            .filter(|t| filter(t))
            .min_by_key(|t| (Reverse(t.priority), origin.tile.range_to(t.pos.tile), t.id))
    }

    /// Number of live tasks in a room.
    #[must_use]
    pub fn count_in(&self, room: &RoomName) -> usize {
        self.tasks.iter().filter(|t| t.pos.room == *room).count()
    }
}
