//! Burn dataset and batcher integration.
//!
//! Items are loaded lazily from disk, pushed through the appropriate
//! transform pipeline, and stacked into [N, 3, H, W] tensors. The
//! transforms already normalize, so the batcher only stacks.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::error;

use crate::error::{Error, Result};

use super::split::LabeledImage;
use super::transform::{EvalTransform, TrainTransform};

/// A single lesion image ready for batching.
#[derive(Clone, Debug)]
pub struct LesionItem {
    /// Normalized CHW float data, `3 * size * size` long
    pub image: Vec<f32>,
    /// Class index within the taxonomy
    pub label: usize,
    /// Source path, kept for logging
    pub path: String,
}

/// Which transform pipeline a dataset applies when loading items.
#[derive(Clone, Debug)]
pub enum TransformMode {
    Train(TrainTransform),
    Eval(EvalTransform),
}

/// Lazily-loading lesion dataset.
///
/// Each `get` opens the image, decodes it, and runs the transform. The
/// training transform draws randomness from a per-item ChaCha8 stream
/// seeded from the dataset seed and the item index, so loading is safe
/// from multiple worker threads and reproducible for a fixed seed.
#[derive(Clone, Debug)]
pub struct LesionDataset {
    samples: Vec<LabeledImage>,
    mode: TransformMode,
    seed: u64,
}

impl LesionDataset {
    pub fn new(samples: Vec<LabeledImage>, mode: TransformMode, seed: u64) -> Self {
        Self { samples, mode, seed }
    }

    pub fn for_training(samples: Vec<LabeledImage>, transform: TrainTransform, seed: u64) -> Self {
        Self::new(samples, TransformMode::Train(transform), seed)
    }

    pub fn for_evaluation(samples: Vec<LabeledImage>, transform: EvalTransform) -> Self {
        Self::new(samples, TransformMode::Eval(transform), 0)
    }

    pub fn samples(&self) -> &[LabeledImage] {
        &self.samples
    }

    /// Per-class sample counts, for imbalance reporting.
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for sample in &self.samples {
            if sample.label < num_classes {
                counts[sample.label] += 1;
            }
        }
        counts
    }

    /// Load and transform one item, surfacing failures to the caller.
    pub fn load_item(&self, index: usize) -> Result<LesionItem> {
        let sample = self
            .samples
            .get(index)
            .ok_or_else(|| Error::Dataset(format!("index {index} out of bounds")))?;

        let img = image::open(&sample.path)
            .map_err(|e| Error::Image(format!("failed to load {}: {e}", sample.path.display())))?;

        let image = match &self.mode {
            TransformMode::Train(transform) => {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ (index as u64));
                transform.apply(&img, &mut rng)
            }
            TransformMode::Eval(transform) => transform.apply(&img),
        };

        Ok(LesionItem {
            image,
            label: sample.label,
            path: sample.path.to_string_lossy().to_string(),
        })
    }
}

impl Dataset<LesionItem> for LesionDataset {
    // Undecodable files are logged and dropped here; `load_item` is the
    // hard-error path for callers that need to know.
    fn get(&self, index: usize) -> Option<LesionItem> {
        match self.load_item(index) {
            Ok(item) => Some(item),
            Err(e) => {
                error!("Skipping unreadable sample at index {index}: {e}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of lesion images.
#[derive(Clone, Debug)]
pub struct LesionBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks pre-normalized items into batch tensors.
#[derive(Clone, Debug)]
pub struct LesionBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> LesionBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<LesionItem, LesionBatch<B>> for LesionBatcher<B> {
    fn batch(&self, items: Vec<LesionItem>) -> LesionBatch<B> {
        let batch_size = items.len();
        let height = self.image_size;
        let width = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, height, width]),
            &self.device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        LesionBatch { images, targets }
    }
}

/// Build a shuffling training dataloader.
pub fn train_dataloader<B: Backend>(
    dataset: LesionDataset,
    device: B::Device,
    image_size: usize,
    batch_size: usize,
    num_workers: usize,
    seed: u64,
) -> std::sync::Arc<dyn DataLoader<LesionBatch<B>>> {
    let batcher = LesionBatcher::<B>::new(device, image_size);
    DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .shuffle(seed)
        .num_workers(num_workers)
        .build(dataset)
}

/// Build an ordered evaluation dataloader.
pub fn eval_dataloader<B: Backend>(
    dataset: LesionDataset,
    device: B::Device,
    image_size: usize,
    batch_size: usize,
    num_workers: usize,
) -> std::sync::Arc<dyn DataLoader<LesionBatch<B>>> {
    let batcher = LesionBatcher::<B>::new(device, image_size);
    DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .num_workers(num_workers)
        .build(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    fn write_test_image(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let img = ImageBuffer::from_fn(48, 48, |x, y| {
            Rgb([(x * 5) as u8, (y * 5) as u8, 128u8])
        });
        img.save(&path).unwrap();
        path
    }

    fn eval_dataset(dir: &TempDir, names: &[&str]) -> LesionDataset {
        let samples: Vec<LabeledImage> = names
            .iter()
            .enumerate()
            .map(|(i, name)| LabeledImage {
                path: write_test_image(dir, name),
                label: i % 2,
            })
            .collect();
        LesionDataset::for_evaluation(
            samples,
            EvalTransform {
                size: 32,
                mean: MEAN,
                std: STD,
            },
        )
    }

    #[test]
    fn test_get_loads_and_transforms() {
        let dir = TempDir::new().unwrap();
        let dataset = eval_dataset(&dir, &["a.png", "b.png"]);

        assert_eq!(dataset.len(), 2);
        let item = dataset.get(0).unwrap();
        assert_eq!(item.image.len(), 3 * 32 * 32);
        assert_eq!(item.label, 0);
    }

    #[test]
    fn test_unreadable_file_yields_none() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not an image").unwrap();
        let dataset = LesionDataset::for_evaluation(
            vec![LabeledImage { path: bad, label: 0 }],
            EvalTransform {
                size: 32,
                mean: MEAN,
                std: STD,
            },
        );

        assert!(dataset.get(0).is_none());
        assert!(dataset.load_item(0).is_err());
    }

    #[test]
    fn test_train_loading_is_reproducible_per_index() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(&dir, "a.png");
        let transform = TrainTransform {
            size: 32,
            margin: 8,
            mean: MEAN,
            std: STD,
            rotation_degrees: 20.0,
            jitter: 0.2,
            hue_jitter: 0.1,
        };
        let samples = vec![LabeledImage { path, label: 0 }];
        let a = LesionDataset::for_training(samples.clone(), transform.clone(), 42);
        let b = LesionDataset::for_training(samples, transform, 42);

        assert_eq!(a.load_item(0).unwrap().image, b.load_item(0).unwrap().image);
    }

    #[test]
    fn test_batcher_shapes() {
        let dir = TempDir::new().unwrap();
        let dataset = eval_dataset(&dir, &["a.png", "b.png", "c.png"]);
        let items: Vec<LesionItem> = (0..3).map(|i| dataset.get(i).unwrap()).collect();

        let batcher = LesionBatcher::<TestBackend>::new(Default::default(), 32);
        let batch = batcher.batch(items);

        assert_eq!(batch.images.dims(), [3, 3, 32, 32]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn test_class_distribution() {
        let samples = vec![
            LabeledImage { path: PathBuf::from("a.jpg"), label: 0 },
            LabeledImage { path: PathBuf::from("b.jpg"), label: 0 },
            LabeledImage { path: PathBuf::from("c.jpg"), label: 2 },
        ];
        let dataset = LesionDataset::for_evaluation(
            samples,
            EvalTransform {
                size: 32,
                mean: MEAN,
                std: STD,
            },
        );
        assert_eq!(dataset.class_distribution(3), vec![2, 0, 1]);
    }
}
