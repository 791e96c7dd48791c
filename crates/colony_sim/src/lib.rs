//! Headless grid world for driving the colony autopilot.
//!
//! The crate plays the part of the game: it owns a mutable world, hands the
//! autopilot a fresh [`WorldSnapshot`](colony_core::snapshot::WorldSnapshot)
//! every tick and carries out the capability calls it makes back.
//!
//! - [`world`]: the simulated rooms, agents and the passive rules
//! - [`pathfinding`]: A* used for agent movement and the path oracle
//! - [`scenario`]: RON scenario files and the built-in `starter` scenario
//! - [`runner`]: tick loop, agent quota and determinism verification
//! - [`metrics`]: per-run summary serialized as JSON
//!
//! # Example
//!
//! ```bash
//! cargo run -p colony_sim -- run --scenario starter --ticks 2000
//! cargo run -p colony_sim -- verify --ticks 500 --runs 3
//! ```

pub mod error;
pub mod metrics;
pub mod pathfinding;
pub mod runner;
pub mod scenario;
pub mod world;

pub use error::SimError;
pub use metrics::RunMetrics;
pub use runner::{verify_determinism, HeadlessRunner, RunnerConfig};
pub use scenario::{Scenario, ScenarioError};
pub use world::{SimWorld, WorldStats};
