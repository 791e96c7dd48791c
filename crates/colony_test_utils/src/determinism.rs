//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the autopilot produces identical
//! persisted state given identical inputs.
//!
//! # Testing Strategy
//!
//! The autopilot is re-entered every tick and must make the same decisions
//! from the same snapshot and the same stored records. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`colony_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Everything persisted or iterated for decisions is a `BTreeMap` or a
//!   `Vec` in host order.
//!
//! - **System randomness**: None. Ties are broken by ids.
//!
//! The state hash is taken over the serialized records, so two runs match
//! only if every persisted byte matches.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use colony_core::store::MemoryStore;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Autopilot is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a setup-and-step loop multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks per run
/// * `setup` - Creates the initial state
/// * `step` - Advances the state by one tick
/// * `hash` - Computes the state hash
///
/// # Example
///
/// ```ignore
/// use colony_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     3,
///     200,
///     || HeadlessRunner::new(&Scenario::starter(), RunnerConfig::default()).unwrap(),
///     |runner| { runner.step().unwrap(); },
///     |runner| runner.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Step two states side by side, returning the first tick at which their
/// hashes differ.
///
/// Useful for debugging non-determinism by finding exactly when two runs
/// start to differ. `Some(0)` means the initial states already differ.
pub fn find_first_divergence<S, Setup, Step, HashFn>(
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> Option<u64>
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut first = setup();
    let mut second = setup();

    if hash(&first) != hash(&second) {
        return Some(0);
    }

    for tick in 1..=ticks {
        step(&mut first);
        step(&mut second);

        if hash(&first) != hash(&second) {
            return Some(tick);
        }
    }

    None
}

/// Hash every key and blob in a store, in key order.
#[must_use]
pub fn store_hash(store: &MemoryStore) -> u64 {
    store.content_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
