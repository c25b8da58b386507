//! Declarative network architecture.
//!
//! A network is an input shape plus an ordered list of layer descriptions. Only the
//! parameters that cannot be inferred are given; channel counts and sizes
//! flow from one layer to the next. The optional `in_channels` /
//! `input_size` fields are checked against the inferred shape so that a
//! hand-written config fails loudly when layers do not connect.
//!
//! # Example
//!
//! ```json
//! {
//!   "input": { "channels": 3, "height": 32, "width": 32 },
//!   "layers": [
//!     { "layer_type": "conv2d", "out_channels": 16, "kernel_size": 3, "padding": 1 },
//!     { "layer_type": "relu" },
//!     { "layer_type": "maxpool2d", "kernel_size": 2 },
//!     { "layer_type": "dense", "output_size": 10 }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::ImageShape;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::layers::conv2d::conv_output_dim;
use crate::layers::{
    AdaptiveAvgPool2DLayer, BatchNormLayer, Conv2DLayer, DenseLayer, DropoutLayer, Layer,
    MaxPool2DLayer, ReluLayer,
};
use crate::model::Sequential;
use crate::utils::SimpleRng;

fn default_stride() -> usize {
    1
}

fn default_epsilon() -> f32 {
    1e-5
}

fn default_momentum() -> f32 {
    0.9
}

/// One layer of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case", deny_unknown_fields)]
pub enum LayerConfig {
    Conv2d {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_channels: Option<usize>,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default)]
        padding: usize,
        #[serde(default = "default_stride")]
        stride: usize,
    },
    Relu,
    #[serde(rename = "maxpool2d")]
    MaxPool2d {
        kernel_size: usize,
        /// Defaults to `kernel_size`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stride: Option<usize>,
    },
    #[serde(rename = "batchnorm")]
    BatchNorm {
        #[serde(default = "default_epsilon")]
        epsilon: f32,
        #[serde(default = "default_momentum")]
        momentum: f32,
    },
    #[serde(rename = "adaptive_avgpool2d")]
    AdaptiveAvgPool2d {
        output_height: usize,
        output_width: usize,
    },
    Dropout {
        drop_rate: f32,
    },
    Dense {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_size: Option<usize>,
        output_size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureConfig {
    /// Shape of one input sample
    pub input: ImageShape,
    /// Applied in order
    pub layers: Vec<LayerConfig>,
}

/// A validated layer with its resolved input and output shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLayer {
    pub config: LayerConfig,
    pub input: ImageShape,
    pub output: ImageShape,
}

fn invalid(layer: usize, reason: impl Into<String>) -> Error {
    Error::InvalidArchitecture {
        layer,
        reason: reason.into(),
    }
}

impl ArchitectureConfig {
    /// The reference CIFAR-10 network.
    ///
    /// ```text
    /// 3x32x32 -> conv16 -> relu -> conv32 -> relu -> maxpool   (32x16x16)
    ///         -> conv64 -> relu -> bn -> conv128 -> relu -> maxpool -> bn (128x8x8)
    ///         -> adaptive avgpool (128x6x6)
    ///         -> dropout -> fc1024 -> relu -> dropout -> fc1024 -> relu -> fc(n_classes)
    /// ```
    pub fn cifar_net(n_classes: usize) -> Self {
        let conv = |out_channels| LayerConfig::Conv2d {
            in_channels: None,
            out_channels,
            kernel_size: 3,
            padding: 1,
            stride: 1,
        };
        let pool = LayerConfig::MaxPool2d {
            kernel_size: 2,
            stride: Some(2),
        };
        let bn = LayerConfig::BatchNorm {
            epsilon: default_epsilon(),
            momentum: default_momentum(),
        };
        let dense = |output_size| LayerConfig::Dense {
            input_size: None,
            output_size,
        };
        let dropout = LayerConfig::Dropout { drop_rate: 0.5 };

        Self {
            input: ImageShape::new(3, 32, 32),
            layers: vec![
                conv(16),
                LayerConfig::Relu,
                conv(32),
                LayerConfig::Relu,
                pool.clone(),
                conv(64),
                LayerConfig::Relu,
                bn.clone(),
                conv(128),
                LayerConfig::Relu,
                pool,
                bn,
                LayerConfig::AdaptiveAvgPool2d {
                    output_height: 6,
                    output_width: 6,
                },
                dropout.clone(),
                dense(1024),
                LayerConfig::Relu,
                dropout,
                dense(1024),
                LayerConfig::Relu,
                dense(n_classes),
            ],
        }
    }

    /// Number of classes the network scores (its final output size).
    pub fn n_classes(&self) -> Result<usize> {
        let plan = self.plan()?;
        Ok(plan.last().map(|l| l.output.len()).unwrap_or(0))
    }

    /// Validates every layer and resolves the shape flowing through it.
    pub fn plan(&self) -> Result<Vec<PlannedLayer>> {
        if self.layers.is_empty() {
            return Err(invalid(0, "architecture must have at least one layer"));
        }
        if self.input.len() == 0 {
            return Err(invalid(0, "input shape must be non-empty"));
        }

        let mut shape = self.input;
        let mut planned = Vec::with_capacity(self.layers.len());

        for (i, layer) in self.layers.iter().enumerate() {
            let output = match *layer {
                LayerConfig::Conv2d {
                    in_channels,
                    out_channels,
                    kernel_size,
                    padding,
                    stride,
                } => {
                    if let Some(expected) = in_channels {
                        if expected != shape.channels {
                            return Err(invalid(
                                i,
                                format!(
                                    "connection mismatch: in_channels is {} but previous layer produces {} channels",
                                    expected, shape.channels
                                ),
                            ));
                        }
                    }
                    if out_channels == 0 || kernel_size == 0 || stride == 0 {
                        return Err(invalid(
                            i,
                            "out_channels, kernel_size and stride must be greater than 0",
                        ));
                    }
                    let h = conv_output_dim(shape.height, kernel_size, padding, stride);
                    let w = conv_output_dim(shape.width, kernel_size, padding, stride);
                    match (h, w) {
                        (Some(h), Some(w)) => ImageShape::new(out_channels, h, w),
                        _ => {
                            return Err(invalid(
                                i,
                                format!("kernel {} does not fit input {}", kernel_size, shape),
                            ))
                        }
                    }
                }
                LayerConfig::Relu => shape,
                LayerConfig::MaxPool2d {
                    kernel_size,
                    stride,
                } => {
                    let stride = stride.unwrap_or(kernel_size);
                    if kernel_size == 0 || stride == 0 {
                        return Err(invalid(i, "kernel_size and stride must be greater than 0"));
                    }
                    let h = conv_output_dim(shape.height, kernel_size, 0, stride);
                    let w = conv_output_dim(shape.width, kernel_size, 0, stride);
                    match (h, w) {
                        (Some(h), Some(w)) => ImageShape::new(shape.channels, h, w),
                        _ => {
                            return Err(invalid(
                                i,
                                format!("pool window {} does not fit input {}", kernel_size, shape),
                            ))
                        }
                    }
                }
                LayerConfig::BatchNorm { epsilon, momentum } => {
                    if !(epsilon > 0.0) {
                        return Err(invalid(i, "epsilon must be positive"));
                    }
                    if !(0.0..=1.0).contains(&momentum) {
                        return Err(invalid(i, "momentum must be in range [0.0, 1.0]"));
                    }
                    shape
                }
                LayerConfig::AdaptiveAvgPool2d {
                    output_height,
                    output_width,
                } => {
                    if output_height == 0 || output_width == 0 {
                        return Err(invalid(i, "output grid must be non-empty"));
                    }
                    if output_height > shape.height || output_width > shape.width {
                        return Err(invalid(
                            i,
                            format!(
                                "cannot pool {} up to {}x{}",
                                shape, output_height, output_width
                            ),
                        ));
                    }
                    ImageShape::new(shape.channels, output_height, output_width)
                }
                LayerConfig::Dropout { drop_rate } => {
                    if !(0.0..1.0).contains(&drop_rate) {
                        return Err(invalid(i, "drop_rate must be in range [0.0, 1.0)"));
                    }
                    shape
                }
                LayerConfig::Dense {
                    input_size,
                    output_size,
                } => {
                    if let Some(expected) = input_size {
                        if expected != shape.len() {
                            return Err(invalid(
                                i,
                                format!(
                                    "connection mismatch: input_size is {} but previous layer produces {}",
                                    expected,
                                    shape.len()
                                ),
                            ));
                        }
                    }
                    if output_size == 0 {
                        return Err(invalid(i, "output_size must be greater than 0"));
                    }
                    ImageShape::flat(output_size)
                }
            };

            planned.push(PlannedLayer {
                config: layer.clone(),
                input: shape,
                output,
            });
            shape = output;
        }

        Ok(planned)
    }
}

/// Loads and validates an architecture from a JSON file.
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    config.plan()?;
    Ok(config)
}

/// Instantiates a validated architecture on `device`.
pub fn build_model(
    config: &ArchitectureConfig,
    rng: &mut SimpleRng,
    device: Device,
) -> Result<Sequential> {
    let plan = config.plan()?;
    let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(plan.len());

    for step in &plan {
        let (input, output) = (step.input, step.output);
        let layer: Box<dyn Layer> = match step.config {
            LayerConfig::Conv2d {
                out_channels,
                kernel_size,
                padding,
                stride,
                ..
            } => Box::new(Conv2DLayer::new(
                input.channels,
                out_channels,
                kernel_size,
                padding,
                stride,
                input.height,
                input.width,
                rng,
            )),
            LayerConfig::Relu => Box::new(ReluLayer::new(input.len())),
            LayerConfig::MaxPool2d {
                kernel_size,
                stride,
            } => Box::new(MaxPool2DLayer::new(
                input.channels,
                input.height,
                input.width,
                kernel_size,
                stride.unwrap_or(kernel_size),
            )),
            LayerConfig::BatchNorm { epsilon, momentum } => Box::new(BatchNormLayer::new(
                input.channels,
                input.height * input.width,
                epsilon,
                momentum,
            )),
            LayerConfig::AdaptiveAvgPool2d {
                output_height,
                output_width,
            } => Box::new(AdaptiveAvgPool2DLayer::new(
                input.channels,
                input.height,
                input.width,
                output_height,
                output_width,
            )),
            LayerConfig::Dropout { drop_rate } => {
                Box::new(DropoutLayer::new(input.len(), drop_rate, rng))
            }
            LayerConfig::Dense { output_size, .. } => {
                Box::new(DenseLayer::new(input.len(), output_size, rng))
            }
        };
        debug_assert_eq!(layer.output_size(), output.len());
        layers.push(layer);
    }

    let shapes = std::iter::once(config.input)
        .chain(plan.iter().map(|p| p.output))
        .collect();
    Ok(Sequential::new(layers, shapes, device))
}
