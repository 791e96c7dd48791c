//! Per-agent task allocation.
//!
//! Each agent carries a latched task kind across ticks. Every tick the kind
//! is re-evaluated in a fixed order:
//!
//! 1. An agent with free capacity that is latched to a refuel kind keeps it,
//!    even if a better source just appeared.
//! 2. An empty agent picks a refuel strategy: harvest if a node has a free
//!    spot, else withdraw if the room has a surplus, else scavenge loot, else
//!    wait.
//! 3. A carrying agent keeps its productive kind while the oracle still
//!    accepts it, and otherwise asks the balancer.
//!
//! The balancer works from a [`TaskCensus`] taken once at the start of the
//! tick, so every agent computes the same quotas whatever order agents are
//! processed in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::board::{TaskBoard, TaskId, TaskKind};
use crate::components::{AgentId, ObjectId, RoomName};
use crate::config::AllocationConfig;
use crate::oracle::{is_scavengeable, room_has_surplus, Oracle};
use crate::snapshot::{AgentSnapshot, WorldSnapshot};
use crate::store::Persisted;

/// Where an agent's carried energy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergySource {
    /// Extracted from a resource node.
    Harvest,
    /// Taken out of a store.
    Withdraw,
    /// Picked up from loot.
    Scavenge,
}

/// Task-specific fields. Cleared as a whole on every task switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScratch {
    /// Cached target object.
    pub target: Option<ObjectId>,
    /// Board task claimed by the agent.
    pub claim: Option<TaskId>,
    /// Room of the cached target.
    pub room: Option<RoomName>,
}

impl TaskScratch {
    /// Whether no field is set.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.target.is_none() && self.claim.is_none() && self.room.is_none()
    }
}

/// Persisted per-agent state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTaskState {
    /// Latched task kind.
    pub task: Option<TaskKind>,
    /// Fields owned by the current task.
    pub scratch: TaskScratch,
    /// Origin of the carried energy.
    pub last_energy_source: Option<EnergySource>,
}

impl AgentTaskState {
    /// Latch a new kind. Scratch fields and board claims go with the old
    /// kind. Returns whether the kind changed.
    pub fn switch_to(&mut self, agent: AgentId, kind: Option<TaskKind>, board: &mut TaskBoard) -> bool {
        if self.task == kind {
            return false;
        }
        board.release(agent);
        self.task = kind;
        self.scratch = TaskScratch::default();
        true
    }

    /// Drop the current task; the agent chooses again next tick.
    pub fn abandon(&mut self, agent: AgentId, board: &mut TaskBoard) {
        self.switch_to(agent, None, board);
    }

    /// Whether the agent is latched to the idle kind or to nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.task, None | Some(TaskKind::Wait))
    }
}

/// Task state of every known agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, AgentTaskState>,
}

impl Persisted for AgentRegistry {
    const KEY: &'static str = "agents";
}

impl AgentRegistry {
    /// State of an agent, if known.
    #[must_use]
    pub fn get(&self, agent: AgentId) -> Option<&AgentTaskState> {
        self.agents.get(&agent)
    }

    /// State of an agent, created on first sight.
    pub fn entry(&mut self, agent: AgentId) -> &mut AgentTaskState {
        self.agents.entry(agent).or_default()
    }

    /// Known agents and their state in id order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &AgentTaskState)> {
        self.agents.iter().map(|(id, state)| (*id, state))
    }

    /// Number of known agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Forget agents missing from the snapshot and release their claims.
    /// Returns the forgotten ids.
    pub fn forget_missing(&mut self, world: &WorldSnapshot, board: &mut TaskBoard) -> Vec<AgentId> {
        let gone: Vec<AgentId> = self
            .agents
            .keys()
            .filter(|id| world.agent(**id).is_none())
            .copied()
            .collect();
        for id in &gone {
            self.agents.remove(id);
            debug!(agent = %id, "Clearing state of missing agent");
        }
        board.release_missing(|id| world.agent(id).is_some());
        gone
    }
}

/// Shared counts the balancer divides work by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCensus {
    /// Agents carrying energy that are neither refueling nor idle.
    pub total: usize,
    /// Carrying agents per latched kind.
    pub active: BTreeMap<TaskKind, usize>,
}

impl TaskCensus {
    /// Count every agent in the snapshot against its latched kind.
    #[must_use]
    pub fn take(world: &WorldSnapshot, registry: &AgentRegistry) -> Self {
        let mut census = Self::default();
        for agent in world.agents().filter(|a| !a.is_empty()) {
            let task = registry.get(agent.id).and_then(|s| s.task);
            if let Some(kind) = task {
                *census.active.entry(kind).or_insert(0) += 1;
            }
            if !task.is_some_and(|k| k.is_refuel() || k == TaskKind::Wait) {
                census.total += 1;
            }
        }
        census
    }

    /// Carrying agents latched to `kind`.
    #[must_use]
    pub fn active(&self, kind: TaskKind) -> usize {
        self.active.get(&kind).copied().unwrap_or(0)
    }
}

/// Pick a productive kind from the valid ones in preference order.
///
/// At position `i` the quota is `ceil(total / (valid.len() + i))`; the first
/// kind under its quota wins. UPGRADE is the fallback.
#[must_use]
pub fn balance(census: &TaskCensus, valid: &[TaskKind]) -> TaskKind {
    for (i, kind) in valid.iter().enumerate() {
        let threshold = census.total.div_ceil(valid.len() + i);
        if census.active(*kind) < threshold {
            return *kind;
        }
    }
    TaskKind::Upgrade
}

/// Result of one allocation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    /// Kind the agent runs this tick.
    pub kind: TaskKind,
    /// Whether the kind changed.
    pub switched: bool,
}

/// Runs the latch state machine.
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocationConfig,
}

impl Allocator {
    /// Create an allocator.
    #[must_use]
    pub fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    /// Refuel strategy for an empty agent, in strict preference order.
    #[must_use]
    pub fn refuel_kind(&self, agent: &AgentSnapshot, board: &TaskBoard, oracle: &Oracle<'_>) -> TaskKind {
        let room = oracle.room();
        if board.best(TaskKind::Harvest, &agent.pos, agent.id).is_some() {
            TaskKind::Harvest
        } else if room_has_surplus(room, self.config.refuel_safety_margin) {
            TaskKind::Withdraw
        } else if room
            .loot
            .iter()
            .any(|l| is_scavengeable(l, self.config.scavenge_minimum))
        {
            TaskKind::Cleanup
        } else {
            TaskKind::Wait
        }
    }

    /// Choose the kind an agent runs this tick and latch it.
    pub fn decide(
        &self,
        agent: &AgentSnapshot,
        state: &mut AgentTaskState,
        board: &mut TaskBoard,
        census: &TaskCensus,
        oracle: &Oracle<'_>,
    ) -> Choice {
        if agent.has_free_capacity() {
            if let Some(kind) = state.task.filter(|k| k.is_refuel()) {
                return Choice {
                    kind,
                    switched: false,
                };
            }
        }

        let kind = if agent.is_empty() {
            self.refuel_kind(agent, board, oracle)
        } else {
            match state.task {
                Some(kind) if oracle.actionable(kind, state.last_energy_source) => kind,
                _ => balance(census, &oracle.valid_productive(state.last_energy_source)),
            }
        };

        let switched = state.switch_to(agent.id, Some(kind), board);
        if switched {
            debug!(agent = %agent.id, task = %kind, carried = agent.carried, "Latched new task");
        }
        Choice { kind, switched }
    }
}
