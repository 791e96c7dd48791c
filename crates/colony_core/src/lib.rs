//! # Colony Core
//!
//! Deterministic autopilot for worker agents in a tick-based economy.
//!
//! This crate contains **only** decision logic:
//! - No rendering
//! - No IO beyond loading a config file
//! - No randomness
//! - No floating-point math (uses fixed-point)
//!
//! The process is re-entered every tick. All memory that must survive a tick
//! goes through an injected [`store::StateStore`], and all world access goes
//! through a read-only [`snapshot::WorldSnapshot`] plus the traits in
//! [`host`].
//!
//! ## Crate Structure
//!
//! - [`board`] - Shared task registry with dedup, refresh and sweep
//! - [`generator`] - Publishes world opportunities as tasks
//! - [`oracle`] - Validity predicates per task and per kind
//! - [`allocation`] - Per-agent latch state machine and balancer
//! - [`actions`] - Per-kind action routines
//! - [`planner`] - Traffic ledger and road planning
//! - [`autoscaler`] - Population target search
//! - [`colony`] - The per-tick driver

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod actions;
pub mod allocation;
pub mod autoscaler;
pub mod board;
pub mod budget;
pub mod colony;
pub mod components;
pub mod config;
pub mod error;
pub mod generator;
pub mod host;
pub mod math;
pub mod oracle;
pub mod planner;
pub mod snapshot;
pub mod spawn;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::allocation::{AgentRegistry, AgentTaskState, EnergySource, TaskCensus};
    pub use crate::autoscaler::{Autoscaler, Bucket, PopulationScores};
    pub use crate::board::{Task, TaskBoard, TaskId, TaskKind};
    pub use crate::budget::{AgentQuota, CpuBudget, Unlimited};
    pub use crate::colony::{Colony, TickReport};
    pub use crate::components::*;
    pub use crate::config::ColonyConfig;
    pub use crate::error::{ColonyError, Result};
    pub use crate::host::{
        ActionOutcome, Capabilities, Construction, Host, PathCosts, PathOracle, SpawnOutcome,
        Spawner,
    };
    pub use crate::math::Fixed;
    pub use crate::planner::{InfrastructurePlanner, TrafficLedger, TrafficLedgers};
    pub use crate::snapshot::{
        AgentSnapshot, RoomSnapshot, StructureKind, Terrain, WorldSnapshot,
    };
    pub use crate::store::{MemoryStore, StateStore, StateStoreExt};
}
