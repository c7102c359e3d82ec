// FederatedDataset — an immutable index of per-worker datasets

use std::collections::HashMap;

use shoal_core::{Error, Result, WorkerId};
use tracing::debug;

use crate::base::BaseDataset;
use crate::dataset::Dataset;

/// A dataset partitioned across workers.
///
/// Holds exactly one local dataset per worker. Membership is fixed at
/// construction and the value is read-only afterwards, so any number of
/// loaders may share one `FederatedDataset` (typically through an `Arc`).
///
/// Workers are kept in **insertion order**: the order the shards were handed
/// to [`FederatedDataset::new`]. Every loader iterates workers in this order.
#[derive(Debug, Clone)]
pub struct FederatedDataset<D: Dataset = BaseDataset> {
    shards: Vec<(WorkerId, D)>,
    index: HashMap<WorkerId, usize>,
    total: usize,
}

impl<D: Dataset> FederatedDataset<D> {
    /// Build from `(worker, dataset)` pairs.
    ///
    /// Fails with a configuration error if `shards` is empty or if a worker
    /// appears more than once. A worker with zero samples is accepted.
    pub fn new(shards: impl IntoIterator<Item = (WorkerId, D)>) -> Result<Self> {
        let shards: Vec<(WorkerId, D)> = shards.into_iter().collect();
        if shards.is_empty() {
            return Err(Error::config("a federated dataset needs at least one worker"));
        }

        let mut index = HashMap::with_capacity(shards.len());
        for (pos, (worker, _)) in shards.iter().enumerate() {
            if index.insert(worker.clone(), pos).is_some() {
                shoal_core::bail_config!("worker {} registered more than once", worker);
            }
        }

        let total: usize = shards.iter().map(|(_, ds)| ds.len()).sum();
        debug!(workers = shards.len(), samples = total, "federated dataset built");

        Ok(Self {
            shards,
            index,
            total,
        })
    }

    /// Build from the result of a discovery lookup (worker → local data).
    ///
    /// A map carries no insertion order, so workers are ordered by id.
    pub fn from_discovered(found: HashMap<WorkerId, D>) -> Result<Self> {
        let mut shards: Vec<(WorkerId, D)> = found.into_iter().collect();
        shards.sort_by(|a, b| a.0.cmp(&b.0));
        Self::new(shards)
    }

    /// The workers holding data, in insertion order.
    pub fn workers(&self) -> impl ExactSizeIterator<Item = &WorkerId> + '_ {
        self.shards.iter().map(|(w, _)| w)
    }

    /// The local dataset of `worker`.
    pub fn get(&self, worker: &WorkerId) -> Result<&D> {
        self.position(worker).map(|pos| &self.shards[pos].1)
    }

    /// Number of samples held by `worker`.
    pub fn length(&self, worker: &WorkerId) -> Result<usize> {
        self.get(worker).map(|ds| ds.len())
    }

    /// Sum of all workers' sample counts. Informational only; loaders count
    /// batches per worker.
    pub fn total_length(&self) -> usize {
        self.total
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always false: construction rejects an empty worker set.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn contains(&self, worker: &WorkerId) -> bool {
        self.index.contains_key(worker)
    }

    /// `(worker, dataset)` pairs in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&WorkerId, &D)> + '_ {
        self.shards.iter().map(|(w, ds)| (w, ds))
    }

    /// The shard at `pos` in worker order.
    pub(crate) fn shard(&self, pos: usize) -> (&WorkerId, &D) {
        let (w, ds) = &self.shards[pos];
        (w, ds)
    }

    fn position(&self, worker: &WorkerId) -> Result<usize> {
        self.index
            .get(worker)
            .copied()
            .ok_or_else(|| Error::NotFound {
                worker: worker.clone(),
            })
    }
}
