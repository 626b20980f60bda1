//! Dataset management: image discovery, metadata, stratified splits, and
//! transform pipelines.

pub mod batch;
pub mod discover;
pub mod metadata;
pub mod split;
pub mod transform;

pub use batch::{
    eval_dataloader, train_dataloader, LesionBatch, LesionBatcher, LesionDataset, LesionItem,
    TransformMode,
};
pub use discover::discover_images;
pub use metadata::{label_images, load_metadata, LesionRecord};
pub use split::{build_splits, LabeledImage, SplitSets};
pub use transform::{EvalTransform, TrainTransform};
