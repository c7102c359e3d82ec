// Dataset trait — unified interface for one worker's local data

/// A single sample: a pair of (input features, label).
///
/// Both are stored flattened as `Vec<f64>` with their associated shapes so
/// they can be stacked into batches later.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Input feature vector (flattened).
    pub features: Vec<f64>,
    /// Shape of one feature row (e.g. `[784]`, `[3,32,32]`).
    pub feature_shape: Vec<usize>,
    /// Label value(s) (flattened). For classification this is typically a
    /// single-element vec holding the class index as `f64`.
    pub label: Vec<f64>,
    /// Shape of one label row (e.g. `[1]` for a class index).
    pub label_shape: Vec<usize>,
}

/// A dataset is an indexed collection of samples.
///
/// Implementations must be `Send + Sync` so a loader can gather samples from
/// several threads and hand the dataset to a prefetch thread.
pub trait Dataset: Send + Sync {
    /// Total number of samples in the dataset.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the sample at position `index`.
    ///
    /// # Panics
    /// May panic if `index >= self.len()`.
    fn get(&self, index: usize) -> Sample;

    /// The shape of a single feature row (without batch dim).
    fn feature_shape(&self) -> &[usize];

    /// The shape of a single label row (without batch dim).
    fn label_shape(&self) -> &[usize];

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }

    /// Iterate over all samples in index order.
    fn iter(&self) -> DatasetIter<'_, Self>
    where
        Self: Sized,
    {
        DatasetIter {
            dataset: self,
            pos: 0,
        }
    }
}

/// Iterator over the samples of a [`Dataset`], in index order.
pub struct DatasetIter<'a, D: Dataset> {
    dataset: &'a D,
    pos: usize,
}

impl<D: Dataset> Iterator for DatasetIter<'_, D> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.pos >= self.dataset.len() {
            return None;
        }
        let s = self.dataset.get(self.pos);
        self.pos += 1;
        Some(s)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.dataset.len().saturating_sub(self.pos);
        (rest, Some(rest))
    }
}

impl<D: Dataset> ExactSizeIterator for DatasetIter<'_, D> {}
