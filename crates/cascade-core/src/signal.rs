//! Signal ingestion: excitation deltas injected before a tick's tension
//! computation.
//!
//! A [`SignalSource`] hands the driver one [`SignalBatch`] per tick. The
//! engine itself only ever sees the batch, so any source (a recorded
//! sequence, live feed adapter, or seeded noise) yields the same results for
//! the same batches.

use std::collections::{BTreeMap, VecDeque};

use cascade_types::ModuleId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Excitation deltas for one tick, keyed by module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalBatch {
    deltas: BTreeMap<ModuleId, f64>,
}

impl SignalBatch {
    /// An empty batch.
    pub const fn new() -> Self {
        Self {
            deltas: BTreeMap::new(),
        }
    }

    /// Add a delta for a module, summing with any existing one.
    pub fn add(&mut self, module: impl Into<ModuleId>, delta: f64) {
        *self.deltas.entry(module.into()).or_insert(0.0) += delta;
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, module: impl Into<ModuleId>, delta: f64) -> Self {
        self.add(module, delta);
        self
    }

    /// Iterate over `(module, delta)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, f64)> {
        self.deltas.iter().map(|(id, d)| (id, *d))
    }

    /// Number of modules with a delta.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// A per-tick source of signal batches.
pub trait SignalSource: Send {
    /// The batch for `tick` (the tick about to be computed).
    fn next_signals(&mut self, tick: u64) -> SignalBatch;
}

/// Never injects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

impl SignalSource for NoSignals {
    fn next_signals(&mut self, _tick: u64) -> SignalBatch {
        SignalBatch::new()
    }
}

/// Replays a recorded sequence of batches, then nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSignals {
    batches: VecDeque<SignalBatch>,
}

impl ScriptedSignals {
    /// Replay `batches` in order, one per tick.
    pub fn new(batches: impl IntoIterator<Item = SignalBatch>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    /// Batches left to replay.
    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl SignalSource for ScriptedSignals {
    fn next_signals(&mut self, _tick: u64) -> SignalBatch {
        self.batches.pop_front().unwrap_or_default()
    }
}

/// Uniform random excitation in `[0, amplitude]` for a fixed set of
/// modules, from an explicitly seeded generator.
#[derive(Debug, Clone)]
pub struct SeededForcing {
    rng: StdRng,
    amplitude: f64,
    modules: Vec<ModuleId>,
}

impl SeededForcing {
    /// Create a forcing source. The same seed always yields the same
    /// sequence of batches.
    pub fn new(seed: u64, amplitude: f64, modules: Vec<ModuleId>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            amplitude,
            modules,
        }
    }
}

impl SignalSource for SeededForcing {
    fn next_signals(&mut self, _tick: u64) -> SignalBatch {
        let mut batch = SignalBatch::new();
        if !(self.amplitude.is_finite() && self.amplitude > 0.0) {
            return batch;
        }
        for module in &self.modules {
            let delta = self.rng.random_range(0.0..=self.amplitude);
            batch.add(module.clone(), delta);
        }
        batch
    }
}
