// FederatedDataLoader — per-worker batching, shuffling, interleaved iteration

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use shoal_core::{Error, Result, WorkerId};

use crate::base::BaseDataset;
use crate::dataset::{Dataset, Sample};
use crate::federated::FederatedDataset;
use crate::plan::{self, BatchIndexPlan, PlanCursor};
use crate::prefetch::PrefetchIterator;

/// How the per-worker batch streams are merged into one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interleave {
    /// One batch per worker per turn, in worker order, skipping workers whose
    /// plan is exhausted. Keeps the set of live workers balanced across the
    /// pass.
    #[default]
    RoundRobin,
    /// Every batch of the first worker, then every batch of the next.
    Sequential,
}

/// Configuration for the FederatedDataLoader.
#[derive(Debug, Clone)]
pub struct FederatedDataLoaderConfig {
    /// Number of samples per batch. Must be at least 1.
    pub batch_size: usize,
    /// Whether to shuffle each worker's indices every pass.
    pub shuffle: bool,
    /// Whether to drop each worker's last incomplete batch.
    pub drop_last: bool,
    /// Base seed; every worker derives its own stream from it.
    pub seed: Option<u64>,
    /// Explicit per-worker seeds, taking precedence over `seed`.
    pub worker_seeds: HashMap<WorkerId, u64>,
    /// Gather a batch's samples on the rayon pool when > 0 (0 = sequential).
    pub num_workers: usize,
    /// Merge policy across workers.
    pub interleave: Interleave,
}

impl Default for FederatedDataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            drop_last: false,
            seed: None,
            worker_seeds: HashMap::new(),
            num_workers: 0,
            interleave: Interleave::RoundRobin,
        }
    }
}

impl FederatedDataLoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    pub fn worker_seed(mut self, worker: impl Into<WorkerId>, s: u64) -> Self {
        self.worker_seeds.insert(worker.into(), s);
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn interleave(mut self, policy: Interleave) -> Self {
        self.interleave = policy;
        self
    }
}

/// A batch of one worker's samples.
///
/// Features and labels are materialized copies stacked row-major, aligned
/// 1:1 with `indices` (the sample positions in the worker's dataset).
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// The worker these samples live on.
    pub worker: WorkerId,
    /// `[len, ...feature_shape]` values, row-major.
    pub features: Vec<f64>,
    /// `[len, ...feature_shape]`.
    pub feature_shape: Vec<usize>,
    /// `[len, ...label_shape]` values, row-major.
    pub labels: Vec<f64>,
    /// `[len, ...label_shape]`.
    pub label_shape: Vec<usize>,
    /// Positions of the samples in the worker's dataset.
    pub indices: Vec<usize>,
}

impl Batch {
    /// The originating worker.
    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Batches a [`FederatedDataset`] worker by worker and merges the streams.
///
/// Each pass starts by planning every worker independently: a fresh
/// permutation from that worker's own RNG when shuffling, natural order
/// otherwise. Batches never mix workers. The dataset is shared read-only, so
/// several loaders may be built over the same `Arc<FederatedDataset>`.
///
/// The only state carried between passes is the per-worker RNGs, which is
/// what makes a seeded loader reproducible while still re-shuffling every
/// pass.
pub struct FederatedDataLoader<D: Dataset = BaseDataset> {
    dataset: Arc<FederatedDataset<D>>,
    config: FederatedDataLoaderConfig,
    rngs: Vec<StdRng>,
}

impl<D: Dataset> FederatedDataLoader<D> {
    /// Create a loader over a federated dataset.
    ///
    /// Fails with a configuration error if `batch_size` is 0 or if a
    /// per-worker seed names a worker the dataset does not hold.
    pub fn new(
        dataset: Arc<FederatedDataset<D>>,
        config: FederatedDataLoaderConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            shoal_core::bail_config!("batch_size must be >= 1, got {}", config.batch_size);
        }
        if let Some(unknown) = config
            .worker_seeds
            .keys()
            .find(|w| !dataset.contains(w))
        {
            shoal_core::bail_config!("seed given for unknown worker {}", unknown);
        }

        let rngs = dataset
            .workers()
            .enumerate()
            .map(|(pos, w)| plan::worker_rng(config.worker_seeds.get(w).copied(), config.seed, pos))
            .collect();

        Ok(Self {
            dataset,
            config,
            rngs,
        })
    }

    pub fn config(&self) -> &FederatedDataLoaderConfig {
        &self.config
    }

    /// The dataset this loader reads from.
    pub fn dataset(&self) -> &Arc<FederatedDataset<D>> {
        &self.dataset
    }

    /// Total number of batches in one pass, summed over workers. Computed
    /// from sample counts alone.
    pub fn len(&self) -> usize {
        self.dataset
            .iter()
            .map(|(_, ds)| self.count_for(ds.len()))
            .sum()
    }

    /// Whether a pass yields no batches at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of batches `worker` contributes to one pass.
    pub fn num_batches_for(&self, worker: &WorkerId) -> Result<usize> {
        self.dataset.length(worker).map(|n| self.count_for(n))
    }

    /// `(worker, batches per pass)` in worker order.
    pub fn batches_per_worker(&self) -> Vec<(WorkerId, usize)> {
        self.dataset
            .iter()
            .map(|(w, ds)| (w.clone(), self.count_for(ds.len())))
            .collect()
    }

    fn count_for(&self, n: usize) -> usize {
        plan::num_batches(n, self.config.batch_size, self.config.drop_last)
    }

    /// Plan every worker for a new pass.
    fn start_pass(&mut self) -> Pass<D> {
        let bs = self.config.batch_size;
        let drop_last = self.config.drop_last;

        let mut cursors = Vec::with_capacity(self.dataset.len());
        for (pos, rng) in self.rngs.iter_mut().enumerate() {
            let (worker, ds) = self.dataset.shard(pos);
            let n = ds.len();
            let plan = if self.config.shuffle {
                BatchIndexPlan::shuffled(n, bs, drop_last, rng)
            } else {
                BatchIndexPlan::sequential(n, bs, drop_last)
            };
            if plan.is_empty() && n > 0 {
                warn!(
                    worker = %worker,
                    samples = n,
                    batch_size = bs,
                    "worker has fewer samples than one batch; skipped this pass"
                );
            }
            cursors.push(PlanCursor::new(plan));
        }

        let pass = Pass {
            dataset: Arc::clone(&self.dataset),
            cursors,
            parallel: self.config.num_workers > 0,
        };
        debug!(
            workers = self.dataset.len(),
            batches = pass.remaining(),
            shuffle = self.config.shuffle,
            drop_last,
            interleave = ?self.config.interleave,
            "starting pass"
        );
        pass
    }

    /// Start a pass and iterate its batches one at a time.
    pub fn iter_epoch(&mut self) -> EpochIter<D> {
        let pass = self.start_pass();
        let remaining = pass.remaining();
        EpochIter {
            pass,
            interleave: self.config.interleave,
            turn: 0,
            remaining,
        }
    }

    /// Start a pass and iterate it in rounds of at most one batch per live
    /// worker. Flattening the rounds gives the round-robin order.
    pub fn iter_rounds(&mut self) -> RoundIter<D> {
        RoundIter {
            pass: self.start_pass(),
        }
    }

    /// Produce all batches of one pass.
    pub fn epoch_batches(&mut self) -> Vec<Batch> {
        self.iter_epoch().collect()
    }
}

impl<D: Dataset + 'static> FederatedDataLoader<D> {
    /// Start a pass whose batches are assembled on a background thread,
    /// at most `depth` batches ahead of the consumer.
    ///
    /// The sequence is identical to [`iter_epoch`](Self::iter_epoch).
    pub fn iter_epoch_prefetch(&mut self, depth: usize) -> PrefetchIterator {
        PrefetchIterator::spawn(self.iter_epoch(), depth)
    }
}

impl<D: Dataset> IntoIterator for &mut FederatedDataLoader<D> {
    type Item = Batch;
    type IntoIter = EpochIter<D>;

    fn into_iter(self) -> EpochIter<D> {
        self.iter_epoch()
    }
}

/// The per-worker cursors of one pass.
struct Pass<D: Dataset> {
    dataset: Arc<FederatedDataset<D>>,
    cursors: Vec<PlanCursor>,
    parallel: bool,
}

impl<D: Dataset> Pass<D> {
    fn remaining(&self) -> usize {
        self.cursors.iter().map(PlanCursor::remaining).sum()
    }

    /// Next batch of the worker at `pos`, if its plan is not exhausted.
    fn take(&mut self, pos: usize) -> Option<Batch> {
        let indices = self.cursors[pos].advance()?;
        let (worker, ds) = self.dataset.shard(pos);
        let batch = collate(worker, ds, indices, self.parallel);
        trace!(worker = %batch.worker, size = batch.len(), "batch");
        Some(batch)
    }
}

/// Iterator over one pass, in the loader's interleave order.
pub struct EpochIter<D: Dataset> {
    pass: Pass<D>,
    interleave: Interleave,
    turn: usize,
    remaining: usize,
}

impl<D: Dataset> Iterator for EpochIter<D> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.remaining == 0 {
            return None;
        }
        let workers = self.pass.cursors.len();
        let pos = match self.interleave {
            Interleave::RoundRobin => (0..workers)
                .map(|k| (self.turn + k) % workers)
                .find(|&p| !self.pass.cursors[p].is_exhausted())?,
            Interleave::Sequential => (self.turn..workers)
                .find(|&p| !self.pass.cursors[p].is_exhausted())?,
        };
        self.turn = match self.interleave {
            Interleave::RoundRobin => (pos + 1) % workers,
            Interleave::Sequential => pos,
        };
        self.remaining -= 1;
        self.pass.take(pos)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<D: Dataset> ExactSizeIterator for EpochIter<D> {}

/// Iterator over one pass in rounds.
///
/// Each round holds the next batch of every worker whose plan is not yet
/// exhausted, in worker order.
pub struct RoundIter<D: Dataset> {
    pass: Pass<D>,
}

impl<D: Dataset> Iterator for RoundIter<D> {
    type Item = Vec<Batch>;

    fn next(&mut self) -> Option<Vec<Batch>> {
        let round: Vec<Batch> = (0..self.pass.cursors.len())
            .filter_map(|pos| self.pass.take(pos))
            .collect();
        if round.is_empty() {
            None
        } else {
            Some(round)
        }
    }
}

/// Stack the samples at `indices` into one batch tagged with `worker`.
fn collate<D: Dataset>(worker: &WorkerId, ds: &D, indices: Vec<usize>, parallel: bool) -> Batch {
    let samples: Vec<Sample> = if parallel && indices.len() > 1 {
        indices.par_iter().map(|&i| ds.get(i)).collect()
    } else {
        indices.iter().map(|&i| ds.get(i)).collect()
    };

    let n = samples.len();
    let feat_shape = ds.feature_shape();
    let label_shape = ds.label_shape();
    let feat_len: usize = feat_shape.iter().product();
    let label_len: usize = label_shape.iter().product();

    let mut features = Vec::with_capacity(n * feat_len);
    let mut labels = Vec::with_capacity(n * label_len);
    for s in samples {
        features.extend(s.features);
        labels.extend(s.label);
    }

    // [n, ...row_shape]
    let mut feature_shape = vec![n];
    feature_shape.extend_from_slice(feat_shape);
    let mut batch_label_shape = vec![n];
    batch_label_shape.extend_from_slice(label_shape);

    Batch {
        worker: worker.clone(),
        features,
        feature_shape,
        labels,
        label_shape: batch_label_shape,
        indices,
    }
}

/// Look up a worker's batch count without building a loader.
pub fn batches_for(
    dataset: &FederatedDataset<impl Dataset>,
    worker: &WorkerId,
    batch_size: usize,
    drop_last: bool,
) -> Result<usize> {
    if batch_size == 0 {
        return Err(Error::config("batch_size must be >= 1, got 0"));
    }
    dataset
        .length(worker)
        .map(|n| plan::num_batches(n, batch_size, drop_last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> BaseDataset {
        let features: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let labels: Vec<f64> = (0..n).map(|i| (i * 10) as f64).collect();
        BaseDataset::from_flat(features, &[1], labels, &[1]).unwrap()
    }

    fn two_workers() -> Arc<FederatedDataset> {
        Arc::new(
            FederatedDataset::new(vec![
                (WorkerId::new("A"), rows(10)),
                (WorkerId::new("B"), rows(3)),
            ])
            .unwrap(),
        )
    }

    fn sizes_by_worker(batches: &[Batch], worker: &str) -> Vec<usize> {
        batches
            .iter()
            .filter(|b| b.worker.as_str() == worker)
            .map(Batch::len)
            .collect()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = FederatedDataLoader::new(
            two_workers(),
            FederatedDataLoaderConfig::default().batch_size(0),
        )
        .err()
        .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn seed_for_unknown_worker_is_rejected() {
        let config = FederatedDataLoaderConfig::default().worker_seed("Z", 1);
        let err = FederatedDataLoader::new(two_workers(), config).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn keep_last_scenario() {
        let config = FederatedDataLoaderConfig::default()
            .batch_size(4)
            .shuffle(false);
        let mut loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        assert_eq!(loader.len(), 4);

        let batches = loader.epoch_batches();
        assert_eq!(batches.len(), 4);
        assert_eq!(sizes_by_worker(&batches, "A"), vec![4, 4, 2]);
        assert_eq!(sizes_by_worker(&batches, "B"), vec![3]);

        // round robin: A, B, A, A
        let order: Vec<&str> = batches.iter().map(|b| b.worker.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "A", "A"]);
    }

    #[test]
    fn drop_last_scenario() {
        let config = FederatedDataLoaderConfig::default()
            .batch_size(4)
            .shuffle(false)
            .drop_last(true);
        let mut loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.num_batches_for(&WorkerId::new("B")).unwrap(), 0);

        let batches = loader.epoch_batches();
        assert_eq!(sizes_by_worker(&batches, "A"), vec![4, 4]);
        assert!(sizes_by_worker(&batches, "B").is_empty());
    }

    #[test]
    fn batch_contents_are_aligned() {
        let config = FederatedDataLoaderConfig::default()
            .batch_size(4)
            .shuffle(false);
        let mut loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        let first = loader.iter_epoch().next().unwrap();
        assert_eq!(first.worker(), &WorkerId::new("A"));
        assert_eq!(first.indices, vec![0, 1, 2, 3]);
        assert_eq!(first.features, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(first.labels, vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(first.feature_shape, vec![4, 1]);
        assert_eq!(first.label_shape, vec![4, 1]);
    }

    #[test]
    fn sequential_interleave() {
        let config = FederatedDataLoaderConfig::default()
            .batch_size(4)
            .shuffle(false)
            .interleave(Interleave::Sequential);
        let mut loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        let order: Vec<String> = loader
            .iter_epoch()
            .map(|b| b.worker.to_string())
            .collect();
        assert_eq!(order, vec!["A", "A", "A", "B"]);
    }

    #[test]
    fn exact_size_iteration() {
        let config = FederatedDataLoaderConfig::default().batch_size(3).seed(5);
        let mut loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        let mut it = loader.iter_epoch();
        assert_eq!(it.len(), 5);
        it.next();
        assert_eq!(it.len(), 4);
        assert_eq!(it.count(), 4);
    }

    #[test]
    fn rounds_flatten_to_round_robin() {
        let config = FederatedDataLoaderConfig::default().batch_size(2).seed(11);
        let mut a = FederatedDataLoader::new(two_workers(), config.clone()).unwrap();
        let mut b = FederatedDataLoader::new(two_workers(), config).unwrap();

        let rounds: Vec<Vec<Batch>> = a.iter_rounds().collect();
        // A has 5 batches, B has 2
        assert_eq!(rounds.len(), 5);
        assert_eq!(rounds[0].len(), 2);
        assert_eq!(rounds[2].len(), 1);

        let flat: Vec<Batch> = rounds.into_iter().flatten().collect();
        let seq: Vec<Batch> = b.iter_epoch().collect();
        assert_eq!(flat, seq);
    }

    #[test]
    fn per_worker_counts() {
        let config = FederatedDataLoaderConfig::default().batch_size(4);
        let loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        assert_eq!(
            loader.batches_per_worker(),
            vec![(WorkerId::new("A"), 3), (WorkerId::new("B"), 1)]
        );
        assert!(loader
            .num_batches_for(&WorkerId::new("C"))
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            batches_for(&*two_workers(), &WorkerId::new("A"), 4, true).unwrap(),
            2
        );
        assert!(batches_for(&*two_workers(), &WorkerId::new("A"), 0, true).is_err());
    }

    #[test]
    fn parallel_gather_matches_sequential() {
        let base = FederatedDataLoaderConfig::default().batch_size(4).seed(3);
        let mut seq = FederatedDataLoader::new(two_workers(), base.clone()).unwrap();
        let mut par = FederatedDataLoader::new(two_workers(), base.num_workers(4)).unwrap();
        assert_eq!(seq.epoch_batches(), par.epoch_batches());
    }

    #[test]
    fn loop_over_loader_reference() {
        let config = FederatedDataLoaderConfig::default().batch_size(5).shuffle(false);
        let mut loader = FederatedDataLoader::new(two_workers(), config).unwrap();
        let mut seen = 0;
        for batch in &mut loader {
            assert!(!batch.is_empty());
            seen += 1;
        }
        assert_eq!(seen, loader.len());
    }
}
