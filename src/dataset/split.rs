//! Stratified train/validation/test splitting.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::error::{Error, Result};

/// A sample ready for splitting: an image path and its class index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub label: usize,
}

/// The three disjoint partitions of a dataset.
#[derive(Debug, Clone, Default)]
pub struct SplitSets {
    pub train: Vec<LabeledImage>,
    pub val: Vec<LabeledImage>,
    pub test: Vec<LabeledImage>,
}

impl SplitSets {
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}

/// Partition samples into train/val/test, stratified by class.
///
/// Within each class, samples are shuffled with a ChaCha8 RNG seeded from
/// `seed`, the test portion is peeled off first, then the validation
/// portion is drawn from the remainder with its fraction renormalized to
/// `val / (1 - test)` so the requested fractions hold against the full
/// set. The same seed always produces the same partition.
pub fn build_splits(
    samples: Vec<LabeledImage>,
    val_fraction: f64,
    test_fraction: f64,
    seed: u64,
) -> Result<SplitSets> {
    if !(0.0..=1.0).contains(&val_fraction)
        || !(0.0..=1.0).contains(&test_fraction)
        || val_fraction + test_fraction > 1.0
    {
        return Err(Error::Dataset(format!(
            "invalid split fractions: val={val_fraction}, test={test_fraction}"
        )));
    }

    // BTreeMap keeps class iteration order stable across runs.
    let mut by_class: BTreeMap<usize, Vec<LabeledImage>> = BTreeMap::new();
    for sample in samples {
        by_class.entry(sample.label).or_default().push(sample);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut splits = SplitSets::default();

    for (_, mut class_samples) in by_class {
        class_samples.shuffle(&mut rng);
        let n = class_samples.len();

        let n_test = ((n as f64) * test_fraction).round() as usize;
        let remainder = n - n_test;
        let renorm_val = if test_fraction < 1.0 {
            val_fraction / (1.0 - test_fraction)
        } else {
            0.0
        };
        let n_val = ((remainder as f64) * renorm_val).round() as usize;

        let mut iter = class_samples.into_iter();
        splits.test.extend(iter.by_ref().take(n_test));
        splits.val.extend(iter.by_ref().take(n_val));
        splits.train.extend(iter);
    }

    info!(
        "Split {} samples: {} train, {} val, {} test",
        splits.total(),
        splits.train.len(),
        splits.val.len(),
        splits.test.len()
    );
    Ok(splits)
}
