//! Randomness for simulated latency and failure outcomes.
//!
//! # Design Decisions
//! - The engine sees a trait object, so tests swap in a scripted source and
//!   replay exact outcomes
//! - `SimRng` is seedable for reproducible runs and entropy-seeded by
//!   default in production

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Supplier of bounded delays, failure decisions, and uniform selections.
///
/// Implementations have no side effects beyond the returned value.
pub trait RandomnessSource: Send + Sync {
    /// Uniform duration in `[min, max]`.
    fn delay(&self, min: Duration, max: Duration) -> Duration;

    /// True with the given probability; `p <= 0` never, `p >= 1` always.
    fn fails(&self, probability: f64) -> bool;

    /// Uniform integer in `[min, max]` inclusive.
    fn int_in(&self, min: i64, max: i64) -> i64;

    /// Uniform index into a sequence of `len` elements. `len` must be
    /// non-zero.
    fn index(&self, len: usize) -> usize;

    /// `k` distinct indices into a sequence of `len` elements, uniformly
    /// without replacement. `k` greater than `len` is clamped.
    fn sample_indices(&self, len: usize, k: usize) -> Vec<usize>;
}

/// Uniformly pick one element.
pub fn choose<'a, T>(rng: &dyn RandomnessSource, items: &'a [T]) -> &'a T {
    &items[rng.index(items.len())]
}

/// Uniformly pick `k` distinct elements.
pub fn sample<'a, T>(rng: &dyn RandomnessSource, items: &'a [T], k: usize) -> Vec<&'a T> {
    rng.sample_indices(items.len(), k)
        .into_iter()
        .map(|i| &items[i])
        .collect()
}

/// Production randomness source backed by a seedable PRNG.
pub struct SimRng {
    inner: Mutex<StdRng>,
}

impl SimRng {
    /// Entropy-seeded source for production use.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic source for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.inner.lock().expect("rng mutex poisoned")
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomnessSource for SimRng {
    fn delay(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let secs = self.lock().gen_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn fails(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            false
        } else if probability >= 1.0 {
            true
        } else {
            self.lock().gen_bool(probability)
        }
    }

    fn int_in(&self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.lock().gen_range(min..=max)
    }

    fn index(&self, len: usize) -> usize {
        self.lock().gen_range(0..len)
    }

    fn sample_indices(&self, len: usize, k: usize) -> Vec<usize> {
        let k = k.min(len);
        rand::seq::index::sample(&mut *self.lock(), len, k).into_vec()
    }
}
