// Batch planning — per-worker index orders and their grouping into batches

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Number of batches `n` samples produce at `batch_size`.
///
/// `ceil(n / batch_size)` when the trailing short batch is kept,
/// `floor(n / batch_size)` when it is dropped. Under `drop_last` a worker
/// with fewer than `batch_size` samples contributes zero batches.
///
/// # Panics
/// Panics if `batch_size == 0`; loaders validate it at construction.
pub fn num_batches(n: usize, batch_size: usize, drop_last: bool) -> usize {
    assert!(batch_size > 0, "num_batches: batch_size must be >= 1");
    if drop_last {
        n / batch_size
    } else {
        n.div_ceil(batch_size)
    }
}

/// One worker's batch layout for one pass.
///
/// An ordering of `0..n` (natural, or a uniform random permutation) cut into
/// consecutive groups of `batch_size`. When `drop_last` is set the trailing
/// short group is left out of this pass only; the next pass plans afresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchIndexPlan {
    order: Vec<usize>,
    batch_size: usize,
    num_batches: usize,
}

impl BatchIndexPlan {
    /// Natural-order plan: `0..n`.
    pub fn sequential(n: usize, batch_size: usize, drop_last: bool) -> Self {
        Self {
            order: (0..n).collect(),
            batch_size,
            num_batches: num_batches(n, batch_size, drop_last),
        }
    }

    /// Plan over a uniformly random permutation of `0..n` drawn from `rng`.
    pub fn shuffled(n: usize, batch_size: usize, drop_last: bool, rng: &mut StdRng) -> Self {
        let mut plan = Self::sequential(n, batch_size, drop_last);
        plan.order.shuffle(rng);
        plan
    }

    /// Number of groups in this plan.
    pub fn len(&self) -> usize {
        self.num_batches
    }

    pub fn is_empty(&self) -> bool {
        self.num_batches == 0
    }

    /// The sample indices of group `batch_idx`.
    ///
    /// # Panics
    /// Panics if `batch_idx >= self.len()`.
    pub fn group(&self, batch_idx: usize) -> &[usize] {
        assert!(
            batch_idx < self.num_batches,
            "BatchIndexPlan: group {} out of range ({} groups)",
            batch_idx,
            self.num_batches
        );
        let start = batch_idx * self.batch_size;
        let end = (start + self.batch_size).min(self.order.len());
        &self.order[start..end]
    }

    /// All groups, in order.
    pub fn groups(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.num_batches).map(move |b| self.group(b))
    }
}

/// A plan plus a read position; one per worker during a pass.
#[derive(Debug, Clone)]
pub(crate) struct PlanCursor {
    plan: BatchIndexPlan,
    next: usize,
}

impl PlanCursor {
    pub(crate) fn new(plan: BatchIndexPlan) -> Self {
        Self { plan, next: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.plan.len() - self.next
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next group, advancing the cursor.
    pub(crate) fn advance(&mut self) -> Option<Vec<usize>> {
        if self.is_exhausted() {
            return None;
        }
        let group = self.plan.group(self.next).to_vec();
        self.next += 1;
        Some(group)
    }
}

/// Seed for the RNG of the worker at `position`, derived from a loader-wide
/// base seed so that each worker draws an independent stream.
pub fn derive_worker_seed(base: u64, position: usize) -> u64 {
    // splitmix64 finaliser over the combined input
    let mut z = base ^ (position as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Build the RNG of one worker: explicit seed first, then a seed derived
/// from the loader-wide base, else OS entropy.
pub(crate) fn worker_rng(explicit: Option<u64>, base: Option<u64>, position: usize) -> StdRng {
    match (explicit, base) {
        (Some(seed), _) => StdRng::seed_from_u64(seed),
        (None, Some(base)) => StdRng::seed_from_u64(derive_worker_seed(base, position)),
        (None, None) => StdRng::from_entropy(),
    }
}
