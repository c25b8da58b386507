//! Layer abstractions and the layer types used by the classifier.

mod r#trait;
pub mod batchnorm;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod pooling;
pub mod relu;

pub use batchnorm::BatchNormLayer;
pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use pooling::{AdaptiveAvgPool2DLayer, MaxPool2DLayer};
pub use r#trait::Layer;
pub use relu::ReluLayer;
