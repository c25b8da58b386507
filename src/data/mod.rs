//! Datasets, transforms and batching.

pub mod cifar;
pub mod dataset;
pub mod sampler;
pub mod transform;

pub use cifar::CifarDataset;
pub use dataset::{
    numbered_classes, Dataset, ImageShape, InMemoryDataset, Sample, Split, SyntheticDataset,
};
pub use sampler::{batch_count, split_indices, Batch, BatchIter};
pub use transform::Normalize;
