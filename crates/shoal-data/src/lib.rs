//! # shoal-data
//!
//! Federated datasets and batching for shoal.
//!
//! This crate provides:
//! - [`Dataset`] trait — unified interface for one worker's local data
//! - [`BaseDataset`] — in-memory, row-aligned features and labels
//! - [`FederatedDataset`] — immutable index of per-worker datasets
//! - [`FederatedDataLoader`] — per-worker batching and shuffling, merged into
//!   one sequence of worker-tagged [`Batch`]es
//! - [`PrefetchIterator`] — the same sequence, assembled on a background thread
//   - Batch planning utilities (batch counts, per-worker index plans)
//   - Sharding helpers: split one dataset across simulated workers

pub mod base;
pub mod combinators;
pub mod dataset;
pub mod federated;
pub mod loader;
pub mod plan;
pub mod prefetch;

pub use base::BaseDataset;
pub use combinators::{federate, federate_shuffled};
pub use dataset::{Dataset, DatasetIter, Sample};
pub use federated::FederatedDataset;
pub use loader::{
    batches_for, Batch, EpochIter, FederatedDataLoader, FederatedDataLoaderConfig, Interleave,
    RoundIter,
};
pub use plan::{num_batches, BatchIndexPlan};
pub use prefetch::PrefetchIterator;

pub use shoal_core::{Error, Result, WorkerId};
