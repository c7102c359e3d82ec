// BaseDataset — one worker's in-memory features and labels

use std::collections::BTreeSet;
use std::ops::Range;

use shoal_core::{Error, Result};

use crate::dataset::{Dataset, Sample};

/// An immutable in-memory dataset: a features container and a labels
/// container, row-aligned, both indexed `0..n`.
///
/// Features and labels are stored flattened row-major. A worker's dataset
/// does not know which worker it belongs to; that association lives in the
/// [`FederatedDataset`](crate::FederatedDataset).
///
/// Tags and a description can be attached so discovery tooling can find
/// the shard; they do not affect batching.
#[derive(Debug, Clone)]
pub struct BaseDataset {
    features: Vec<f64>,
    feature_shape: Vec<usize>,
    labels: Vec<f64>,
    label_shape: Vec<usize>,
    n: usize,
    tags: BTreeSet<String>,
    description: Option<String>,
}

impl BaseDataset {
    /// Build from flattened feature/label matrices.
    ///
    /// `features`: `[n, ...feature_shape]` row-major
    /// `labels`:   `[n, ...label_shape]` row-major
    ///
    /// Fails if a row shape has zero elements, if a buffer is not a whole
    /// number of rows, or if the two buffers disagree on `n`.
    pub fn from_flat(
        features: Vec<f64>,
        feature_shape: &[usize],
        labels: Vec<f64>,
        label_shape: &[usize],
    ) -> Result<Self> {
        let feat_per_row = row_len(feature_shape, "feature")?;
        let label_per_row = row_len(label_shape, "label")?;

        if features.len() % feat_per_row != 0 {
            shoal_core::bail_config!(
                "feature buffer of {} values is not a multiple of row size {}",
                features.len(),
                feat_per_row
            );
        }
        if labels.len() % label_per_row != 0 {
            shoal_core::bail_config!(
                "label buffer of {} values is not a multiple of row size {}",
                labels.len(),
                label_per_row
            );
        }

        let n_features = features.len() / feat_per_row;
        let n_labels = labels.len() / label_per_row;
        if n_features != n_labels {
            return Err(Error::SampleCountMismatch {
                features: n_features,
                labels: n_labels,
            });
        }

        Ok(Self {
            features,
            feature_shape: feature_shape.to_vec(),
            labels,
            label_shape: label_shape.to_vec(),
            n: n_features,
            tags: BTreeSet::new(),
            description: None,
        })
    }

    /// Build from a list of samples.
    ///
    /// All samples must share the first sample's shapes. An empty list has
    /// no shape to infer from; use [`BaseDataset::empty`] for that.
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(Error::config("cannot infer shapes from an empty sample list"));
        };
        let feature_shape = first.feature_shape.clone();
        let label_shape = first.label_shape.clone();

        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (i, s) in samples.into_iter().enumerate() {
            if s.feature_shape != feature_shape || s.label_shape != label_shape {
                shoal_core::bail_config!(
                    "sample {} has shapes {:?}/{:?}, expected {:?}/{:?}",
                    i,
                    s.feature_shape,
                    s.label_shape,
                    feature_shape,
                    label_shape
                );
            }
            features.extend(s.features);
            labels.extend(s.label);
        }

        Self::from_flat(features, &feature_shape, labels, &label_shape)
    }

    /// A dataset with zero samples but known row shapes.
    pub fn empty(feature_shape: &[usize], label_shape: &[usize]) -> Result<Self> {
        Self::from_flat(Vec::new(), feature_shape, Vec::new(), label_shape)
    }

    /// Attach a searchable tag (e.g. `"#mnist"`).
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Attach a human-readable description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The feature row at `index`.
    pub fn feature_row(&self, index: usize) -> &[f64] {
        let w = self.features_per_row();
        &self.features[index * w..(index + 1) * w]
    }

    /// The label row at `index`.
    pub fn label_row(&self, index: usize) -> &[f64] {
        let w = self.labels_per_row();
        &self.labels[index * w..(index + 1) * w]
    }

    /// Copy out the contiguous rows in `range` as a new dataset, keeping
    /// tags and description.
    ///
    /// # Panics
    /// Panics if `range.end > self.len()`.
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.n,
            "BaseDataset::slice: range {:?} out of bounds for {} samples",
            range,
            self.n
        );
        let fw = self.features_per_row();
        let lw = self.labels_per_row();
        Self {
            features: self.features[range.start * fw..range.end * fw].to_vec(),
            feature_shape: self.feature_shape.clone(),
            labels: self.labels[range.start * lw..range.end * lw].to_vec(),
            label_shape: self.label_shape.clone(),
            n: range.end - range.start,
            tags: self.tags.clone(),
            description: self.description.clone(),
        }
    }

    /// Copy out the rows at `indices`, in that order, as a new dataset.
    ///
    /// # Panics
    /// Panics if any index is out of range.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut features = Vec::with_capacity(indices.len() * self.features_per_row());
        let mut labels = Vec::with_capacity(indices.len() * self.labels_per_row());
        for &i in indices {
            features.extend_from_slice(self.feature_row(i));
            labels.extend_from_slice(self.label_row(i));
        }
        Self {
            features,
            feature_shape: self.feature_shape.clone(),
            labels,
            label_shape: self.label_shape.clone(),
            n: indices.len(),
            tags: self.tags.clone(),
            description: self.description.clone(),
        }
    }

    fn features_per_row(&self) -> usize {
        self.feature_shape.iter().product()
    }

    fn labels_per_row(&self) -> usize {
        self.label_shape.iter().product()
    }
}

fn row_len(shape: &[usize], what: &str) -> Result<usize> {
    let len: usize = shape.iter().product();
    if len == 0 {
        shoal_core::bail_config!("{} row shape {:?} has no elements", what, shape);
    }
    Ok(len)
}

impl Dataset for BaseDataset {
    fn len(&self) -> usize {
        self.n
    }

    fn get(&self, index: usize) -> Sample {
        Sample {
            features: self.feature_row(index).to_vec(),
            feature_shape: self.feature_shape.clone(),
            label: self.label_row(index).to_vec(),
            label_shape: self.label_shape.clone(),
        }
    }

    fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    fn label_shape(&self) -> &[usize] {
        &self.label_shape
    }

    fn name(&self) -> &str {
        self.description.as_deref().unwrap_or("base")
    }
}
