//! The per-tick driver.
//!
//! [`Colony::tick`] runs one synchronous pass:
//!
//! 1. Load persisted records; forget agents that no longer exist.
//! 2. Decay traffic and run planning rounds on their intervals.
//! 3. Sweep the board, then regenerate tasks for every room.
//! 4. Take the census, then decide and act for each agent until the budget
//!    runs out.
//! 5. Feed the autoscaler, request a spawn, write records back.
//!
//! Records are written back even when the agent loop was truncated.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actions::{self, ActionContext, Progress};
use crate::allocation::{AgentRegistry, AgentTaskState, Allocator, TaskCensus};
use crate::autoscaler::{Autoscaler, PopulationScores};
use crate::board::{SweepReport, TaskBoard};
use crate::budget::CpuBudget;
use crate::config::ColonyConfig;
use crate::error::Result;
use crate::generator::TaskGenerator;
use crate::host::{Capabilities, Host, SpawnOutcome};
use crate::oracle::{target_still_valid, Oracle};
use crate::planner::{InfrastructurePlanner, PlanReport, RoadMaintenance, TrafficLedgers};
use crate::snapshot::{AgentSnapshot, WorldSnapshot};
use crate::spawn::request_spawn;
use crate::store::{StateStore, StateStoreExt};

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number.
    pub tick: u64,
    /// Living agents.
    pub population: usize,
    /// Agents that ran this tick.
    pub agents_processed: usize,
    /// Whether the budget cut the agent loop short.
    pub truncated: bool,
    /// Agents whose state was dropped because they no longer exist.
    pub forgotten: usize,
    /// Board sweep counters.
    pub sweep: SweepReport,
    /// Create-or-refresh calls made by the generator.
    pub tasks_generated: usize,
    /// Tasks on the board at tick end.
    pub tasks_live: usize,
    /// Agents that latched a new kind.
    pub switches: usize,
    /// Agents whose action took effect.
    pub worked: usize,
    /// Agents that abandoned their task.
    pub abandoned: usize,
    /// Agents idle at tick end.
    pub idle: usize,
    /// Traffic entries pruned by decay.
    pub pruned_traffic: usize,
    /// Planning rounds run this tick.
    pub plans: Vec<PlanReport>,
    /// Population the autoscaler aims for.
    pub population_target: u32,
    /// Spawn request result, if one was made.
    pub spawn: Option<SpawnOutcome>,
}

/// Records loaded for the duration of a tick.
struct Records {
    board: TaskBoard,
    ledgers: TrafficLedgers,
    registry: AgentRegistry,
    scores: PopulationScores,
}

/// The colony autopilot.
#[derive(Debug)]
pub struct Colony<S> {
    config: ColonyConfig,
    store: S,
    generator: TaskGenerator,
    allocator: Allocator,
    planner: InfrastructurePlanner,
    autoscaler: Autoscaler,
}

impl<S: StateStore> Colony<S> {
    /// Create an autopilot over a store. Fails on an invalid config.
    pub fn new(config: ColonyConfig, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator: TaskGenerator::new(config.generator.clone()),
            allocator: Allocator::new(config.allocation.clone()),
            planner: InfrastructurePlanner::new(config.planner.clone()),
            autoscaler: Autoscaler::new(config.autoscaler.clone()),
            config,
            store,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ColonyConfig {
        &self.config
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Consume the autopilot and return its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Persisted task board.
    pub fn board(&self) -> Result<TaskBoard> {
        self.store.load()
    }

    /// Persisted traffic ledgers.
    pub fn ledgers(&self) -> Result<TrafficLedgers> {
        self.store.load()
    }

    /// Persisted agent states.
    pub fn agents(&self) -> Result<AgentRegistry> {
        self.store.load()
    }

    /// Persisted population scores.
    pub fn population_scores(&self) -> Result<PopulationScores> {
        self.store.load()
    }

    fn load_records(&self) -> Records {
        Records {
            board: self.store.load_or_reset(),
            ledgers: self.store.load_or_reset(),
            registry: self.store.load_or_reset(),
            scores: self.store.load_or_reset(),
        }
    }

    fn save_records(&mut self, records: &Records) -> Result<()> {
        self.store.save(&records.board)?;
        self.store.save(&records.ledgers)?;
        self.store.save(&records.registry)?;
        self.store.save(&records.scores)?;
        Ok(())
    }

    /// Run one tick.
    pub fn tick<H, B>(&mut self, world: &WorldSnapshot, host: &mut H, budget: &mut B) -> Result<TickReport>
    where
        H: Host + ?Sized,
        B: CpuBudget + ?Sized,
    {
        let tick = world.tick();
        let mut records = self.load_records();
        let mut report = TickReport {
            tick,
            population: world.population(),
            ..TickReport::default()
        };

        report.forgotten = records
            .registry
            .forget_missing(world, &mut records.board)
            .len();

        for room in world.rooms() {
            if self.planner.is_decay_tick(tick) {
                report.pruned_traffic += self.planner.decay(records.ledgers.entry(&room.name));
            }
            if self.planner.is_planning_tick(tick) {
                let ledger = records.ledgers.entry(&room.name);
                let mut plan = self.planner.plan(room, ledger, host);
                if self.config.planner.spine_enabled {
                    plan.spine_proposed = self.planner.plan_spine(room, host);
                }
                report.plans.push(plan);
            }
        }

        {
            let maintenance = RoadMaintenance::new(&self.planner, &records.ledgers);
            report.sweep = records
                .board
                .sweep(|task| target_still_valid(task, world, &maintenance));
            for room in world.rooms() {
                report.tasks_generated += self
                    .generator
                    .generate(world, room, &mut records.board, &maintenance)
                    .total();
            }
        }

        let census = TaskCensus::take(world, &records.registry);
        for agent in world.agents() {
            if !budget.should_continue(report.agents_processed) {
                report.truncated = true;
                warn!(
                    tick,
                    processed = report.agents_processed,
                    population = report.population,
                    "Compute budget exhausted, deferring remaining agents"
                );
                break;
            }
            self.run_agent(agent, world, &mut records, &census, host, &mut report);
            report.agents_processed += 1;
        }

        report.idle = world
            .agents()
            .filter(|a| records.registry.get(a.id).map_or(true, AgentTaskState::is_idle))
            .count();
        let population = u32::try_from(report.population).unwrap_or(u32::MAX);
        let idle = u32::try_from(report.idle).unwrap_or(u32::MAX);
        report.population_target = self.autoscaler.update(&mut records.scores, population, idle);
        report.spawn = request_spawn(world, report.population_target, host);

        report.tasks_live = records.board.len();
        self.save_records(&records)?;

        debug!(
            tick,
            processed = report.agents_processed,
            tasks = report.tasks_live,
            idle = report.idle,
            target = report.population_target,
            "Tick complete"
        );
        Ok(report)
    }

    /// Decide and act for one agent. Self-contained: the board, ledger and
    /// registry are consistent after every call.
    fn run_agent<H>(
        &self,
        agent: &AgentSnapshot,
        world: &WorldSnapshot,
        records: &mut Records,
        census: &TaskCensus,
        host: &mut H,
        report: &mut TickReport,
    ) where
        H: Capabilities + ?Sized,
    {
        let Some(room) = world.room(&agent.pos.room) else {
            debug!(agent = %agent.id, room = %agent.pos.room, "Agent is in an unseen room");
            return;
        };
        let state = records.registry.entry(agent.id);

        let choice = {
            let maintenance = RoadMaintenance::new(&self.planner, &records.ledgers);
            let oracle = Oracle::new(room, &maintenance);
            self.allocator
                .decide(agent, state, &mut records.board, census, &oracle)
        };
        if choice.switched {
            report.switches += 1;
        }

        let mut ctx = ActionContext {
            world,
            room,
            agent,
            board: &mut records.board,
            ledger: records.ledgers.entry(&agent.pos.room),
            host,
            config: &self.config.allocation,
        };
        match actions::execute(choice.kind, state, &mut ctx) {
            Ok(Progress::Worked) => report.worked += 1,
            Ok(_) => {}
            Err(err) => {
                debug!(agent = %agent.id, task = %choice.kind, error = %err, "Abandoning task");
                report.abandoned += 1;
                state.abandon(agent.id, ctx.board);
            }
        }
    }
}
