// PrefetchIterator — assemble batches of a pass on a background thread
//
// The producer thread drives an ordinary EpochIter and pushes each batch into
// a bounded channel; the consumer pulls them out in the same order. Only
// gathering and stacking move off the consumer's thread: planning, order and
// batch counts are exactly those of the sequential pass.
//
// Usage:
//
//   let mut loader = FederatedDataLoader::new(dataset, config)?;
//   for epoch in 0..num_epochs {
//       for batch in loader.iter_epoch_prefetch(4) {
//           // route batch.worker ...
//       }
//   }

use std::panic;
use std::sync::mpsc;
use std::thread;

use tracing::debug;

use crate::dataset::Dataset;
use crate::loader::{Batch, EpochIter};

/// An iterator that yields batches assembled ahead of time by a producer
/// thread.
///
/// The producer is stopped and joined when the iterator is fully consumed or
/// dropped, so abandoning a pass early needs no cleanup by the caller. A
/// panic on the producer (e.g. from `Dataset::get`) is re-raised on the
/// consumer, as it would be with the sequential pass.
pub struct PrefetchIterator {
    rx: Option<mpsc::Receiver<Batch>>,
    handle: Option<thread::JoinHandle<()>>,
    remaining: usize,
}

impl PrefetchIterator {
    /// Run `pass` on a background thread, buffering at most `depth` batches
    /// (at least one).
    pub(crate) fn spawn<D: Dataset + 'static>(pass: EpochIter<D>, depth: usize) -> Self {
        let remaining = pass.len();
        let (tx, rx) = mpsc::sync_channel::<Batch>(depth.max(1));

        let handle = thread::spawn(move || {
            let mut sent = 0usize;
            for batch in pass {
                // receiver dropped: the consumer abandoned the pass
                if tx.send(batch).is_err() {
                    debug!(sent, "prefetch consumer went away; producer stopping");
                    return;
                }
                sent += 1;
            }
        });

        Self {
            rx: Some(rx),
            handle: Some(handle),
            remaining,
        }
    }

    fn shutdown(&mut self) {
        // Dropping the receiver first unblocks a producer waiting on a full
        // channel.
        self.rx = None;
        if let Some(h) = self.handle.take() {
            if let Err(payload) = h.join() {
                // never unwind out of a drop that is already unwinding
                if !thread::panicking() {
                    panic::resume_unwind(payload);
                }
            }
        }
    }
}

impl Iterator for PrefetchIterator {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.remaining == 0 {
            self.shutdown();
            return None;
        }
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(batch) => {
                self.remaining -= 1;
                Some(batch)
            }
            Err(_) => {
                // Channel closed early: the producer is gone, either by
                // panicking (re-raised by shutdown) or not at all.
                self.remaining = 0;
                self.shutdown();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PrefetchIterator {}

impl Drop for PrefetchIterator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    use shoal_core::WorkerId;

    use crate::base::BaseDataset;
    use crate::dataset::{Dataset, Sample};
    use crate::federated::FederatedDataset;
    use crate::loader::{FederatedDataLoader, FederatedDataLoaderConfig};

    fn dataset() -> Arc<FederatedDataset> {
        let shard = |n: usize| {
            let features: Vec<f64> = (0..n).map(|i| i as f64).collect();
            BaseDataset::from_flat(features, &[1], vec![1.0; n], &[1]).unwrap()
        };
        Arc::new(
            FederatedDataset::new(vec![
                (WorkerId::new("alice"), shard(17)),
                (WorkerId::new("bob"), shard(9)),
                (WorkerId::new("carol"), shard(4)),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn prefetch_matches_sequential_order() {
        let config = FederatedDataLoaderConfig::default().batch_size(3).seed(99);
        let mut seq = FederatedDataLoader::new(dataset(), config.clone()).unwrap();
        let mut pre = FederatedDataLoader::new(dataset(), config).unwrap();

        for _ in 0..3 {
            let expected: Vec<_> = seq.iter_epoch().collect();
            let got: Vec<_> = pre.iter_epoch_prefetch(2).collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn prefetch_reports_exact_length() {
        let config = FederatedDataLoaderConfig::default().batch_size(4).drop_last(true);
        let mut loader = FederatedDataLoader::new(dataset(), config).unwrap();
        let it = loader.iter_epoch_prefetch(1);
        assert_eq!(it.len(), loader.len());
        assert_eq!(it.count(), 7);
    }

    #[test]
    fn early_drop_stops_producer() {
        let config = FederatedDataLoaderConfig::default().batch_size(1);
        let mut loader = FederatedDataLoader::new(dataset(), config).unwrap();
        let mut it = loader.iter_epoch_prefetch(1);
        assert!(it.next().is_some());
        drop(it);
        // a fresh pass still works after abandoning the previous one
        assert_eq!(loader.iter_epoch_prefetch(0).count(), 30);
    }

    /// Ten rows; reading row 5 panics.
    struct BrokenRow;

    impl Dataset for BrokenRow {
        fn len(&self) -> usize {
            10
        }

        fn get(&self, index: usize) -> Sample {
            assert_ne!(index, 5, "row 5 is unreadable");
            Sample {
                features: vec![index as f64],
                feature_shape: vec![1],
                label: vec![0.0],
                label_shape: vec![1],
            }
        }

        fn feature_shape(&self) -> &[usize] {
            &[1]
        }

        fn label_shape(&self) -> &[usize] {
            &[1]
        }
    }

    #[test]
    fn producer_panic_reaches_consumer() {
        let fd = Arc::new(FederatedDataset::new(vec![(WorkerId::new("w"), BrokenRow)]).unwrap());
        let config = FederatedDataLoaderConfig::default()
            .batch_size(2)
            .shuffle(false);
        let mut loader = FederatedDataLoader::new(fd, config).unwrap();
        assert_eq!(loader.len(), 5);

        let mut got = 0;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for _ in loader.iter_epoch_prefetch(1) {
                got += 1;
            }
        }));

        // batches [0,1] and [2,3] arrive, then [4,5] fails
        assert_eq!(got, 2);
        let payload = outcome.unwrap_err();
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert!(message.contains("row 5 is unreadable"), "{message}");
    }
}
