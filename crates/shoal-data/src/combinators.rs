// Sharding — spread one dataset across workers

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use shoal_core::{Result, WorkerId};

use crate::base::BaseDataset;
use crate::dataset::Dataset;
use crate::federated::FederatedDataset;

/// Split `dataset` into one contiguous shard per worker.
///
/// Shards are as equal as possible: with `n` samples and `k` workers the
/// first `n % k` workers receive one extra sample. Workers beyond `n` get
/// empty shards. Tags and description are copied onto every shard.
///
/// Fails with a configuration error if `workers` is empty or repeats a
/// worker.
pub fn federate(dataset: &BaseDataset, workers: &[WorkerId]) -> Result<FederatedDataset> {
    check_workers(workers)?;
    let n = dataset.len();
    let shards = shard_bounds(n, workers.len())
        .into_iter()
        .zip(workers)
        .map(|((start, end), w)| (w.clone(), dataset.slice(start..end)));
    FederatedDataset::new(shards)
}

/// Like [`federate`], but samples are dealt out after a seeded shuffle, so
/// each worker receives a random subset instead of a contiguous block.
pub fn federate_shuffled(
    dataset: &BaseDataset,
    workers: &[WorkerId],
    seed: u64,
) -> Result<FederatedDataset> {
    check_workers(workers)?;
    let n = dataset.len();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let shards = shard_bounds(n, workers.len())
        .into_iter()
        .zip(workers)
        .map(|((start, end), w)| (w.clone(), dataset.select(&indices[start..end])));
    FederatedDataset::new(shards)
}

fn check_workers(workers: &[WorkerId]) -> Result<()> {
    if workers.is_empty() {
        shoal_core::bail_config!("cannot federate a dataset across zero workers");
    }
    let mut seen = HashSet::with_capacity(workers.len());
    for w in workers {
        if !seen.insert(w) {
            shoal_core::bail_config!("worker {} listed more than once", w);
        }
    }
    Ok(())
}

/// `[start, end)` of each of `k` near-equal shards over `n` samples.
fn shard_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut bounds = Vec::with_capacity(k);
    let mut offset = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        bounds.push((offset, offset + size));
        offset += size;
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> BaseDataset {
        let features: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let labels: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        BaseDataset::from_flat(features, &[1], labels, &[1])
            .unwrap()
            .tag("#numbers")
    }

    fn workers(names: &[&str]) -> Vec<WorkerId> {
        names.iter().map(|n| WorkerId::new(n)).collect()
    }

    #[test]
    fn bounds_cover_everything() {
        assert_eq!(shard_bounds(10, 3), vec![(0, 4), (4, 7), (7, 10)]);
        assert_eq!(shard_bounds(2, 3), vec![(0, 1), (1, 2), (2, 2)]);
        assert_eq!(shard_bounds(0, 2), vec![(0, 0), (0, 0)]);
    }

    #[test]
    fn federate_contiguous() {
        let fd = federate(&numbered(10), &workers(&["bob", "alice"])).unwrap();
        let bob = fd.get(&WorkerId::new("bob")).unwrap();
        let alice = fd.get(&WorkerId::new("alice")).unwrap();
        assert_eq!(bob.len(), 5);
        assert_eq!(alice.len(), 5);
        assert_eq!(alice.feature_row(0), &[5.0]);
        assert!(alice.has_tag("#numbers"));
        assert_eq!(fd.total_length(), 10);
    }

    #[test]
    fn federate_shuffled_partitions_all_samples() {
        let fd = federate_shuffled(&numbered(25), &workers(&["a", "b", "c"]), 7).unwrap();
        let mut values: Vec<i64> = fd
            .iter()
            .flat_map(|(_, ds)| (0..ds.len()).map(move |i| ds.feature_row(i)[0] as i64))
            .collect();
        values.sort_unstable();
        assert_eq!(values, (0..25).collect::<Vec<_>>());
        assert_eq!(fd.length(&WorkerId::new("a")).unwrap(), 9);
        assert_eq!(fd.length(&WorkerId::new("c")).unwrap(), 8);
    }

    #[test]
    fn federate_rejects_bad_worker_lists() {
        let ds = numbered(4);
        assert!(federate(&ds, &[]).unwrap_err().is_configuration());
        assert!(federate(&ds, &workers(&["a", "a"]))
            .unwrap_err()
            .is_configuration());
    }
}
