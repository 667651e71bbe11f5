//! The four layer kinds a [`Network`](super::Network) is assembled from, and
//! the caches their forward passes leave for the backward pass.
//!
//! Dense layers run on `[features, batch]` columns through the same
//! [`linear_activation_forward`] / [`linear_backward_with`] pair as the
//! reference engine. Conv and MaxPool layers run on NHWC tensors through the
//! kernels in [`crate::ops::cpu`]. Flatten is the bridge between the two
//! layouts.

use crate::activation::Activation;
use crate::backprop::{LayerGrads, linear_backward_with};
use crate::forward::{LayerCache, linear_activation_forward};
use crate::ops::cpu::{self, Nhwc, Window};
use crate::params::LayerParams;
use crate::tensors::Ten64;

/// Fully connected layer, `W: [out, in]`, `b: [out, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub params: LayerParams,
    pub activation: Activation,
}

/// Square-kernel convolution, `W: [out_c, k, k, in_c]`, `b: [out_c, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Conv {
    pub params: LayerParams,
    pub window: Window,
    pub activation: Activation,
}

impl Conv {
    #[must_use]
    pub fn filters(&self) -> usize {
        self.params.w.shape[0]
    }
}

/// Max pooling over square windows, without padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPool {
    pub window: Window,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Dense(Dense),
    Conv(Conv),
    MaxPool(MaxPool),
    Flatten,
}

impl Layer {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Dense(_) => "dense",
            Self::Conv(_) => "conv",
            Self::MaxPool(_) => "maxpool",
            Self::Flatten => "flatten",
        }
    }

    /// Trainable parameters, if the layer has any.
    #[must_use]
    pub fn params(&self) -> Option<&LayerParams> {
        match self {
            Self::Dense(d) => Some(&d.params),
            Self::Conv(c) => Some(&c.params),
            Self::MaxPool(_) | Self::Flatten => None,
        }
    }

    pub fn params_mut(&mut self) -> Option<&mut LayerParams> {
        match self {
            Self::Dense(d) => Some(&mut d.params),
            Self::Conv(c) => Some(&mut c.params),
            Self::MaxPool(_) | Self::Flatten => None,
        }
    }

    /// Runs the layer on `input` and records what its backward step needs.
    ///
    /// # Panics
    /// Panics if `input` does not have the layout the layer was built for.
    #[must_use]
    pub fn forward(&self, input: Ten64) -> (Ten64, Cache<'_>) {
        match self {
            Self::Dense(dense) => {
                let (a, cache) = linear_activation_forward(input, &dense.params, dense.activation);
                (a, Cache::Dense(cache))
            }
            Self::Conv(conv) => {
                let dims = Nhwc::from_shape(&input.shape);
                let (z, out) = cpu::conv2d(
                    &input.data,
                    dims,
                    &conv.params.w.data,
                    &conv.params.b.data,
                    conv.filters(),
                    conv.window,
                );
                let z = Ten64::new(out.to_shape(), z);
                let a = conv.activation.forward(&z);
                (a, Cache::Conv { layer: conv, input, z })
            }
            Self::MaxPool(pool) => {
                let dims = Nhwc::from_shape(&input.shape);
                let (values, argmax, out) = cpu::max_pool(&input.data, dims, pool.window);
                let a = Ten64::new(out.to_shape(), values);
                (a, Cache::MaxPool { argmax, input_shape: input.shape })
            }
            Self::Flatten => {
                let input_shape = input.shape.clone();
                let samples = input_shape[0];
                let features = input.len() / samples.max(1);
                let a = input.reshape([samples, features]).transpose();
                (a, Cache::Flatten { input_shape })
            }
        }
    }
}

/// What one layer's forward pass left behind.
///
/// Dense and Conv caches borrow the layer they came from, so a cache cannot
/// outlive the network state that produced it.
#[derive(Debug, Clone)]
pub enum Cache<'n> {
    Dense(LayerCache<'n>),
    Conv { layer: &'n Conv, input: Ten64, z: Ten64 },
    MaxPool { argmax: Vec<usize>, input_shape: Vec<usize> },
    Flatten { input_shape: Vec<usize> },
}

impl Cache<'_> {
    /// Pre-activation output, for layers that have one.
    #[must_use]
    pub fn z(&self) -> Option<&Ten64> {
        match self {
            Self::Dense(cache) => Some(&cache.z),
            Self::Conv { z, .. } => Some(z),
            Self::MaxPool { .. } | Self::Flatten { .. } => None,
        }
    }

    /// Backward step: `da` is the gradient of the layer's output, `m` the
    /// batch width every parameter gradient is averaged over.
    ///
    /// Returns the gradient of the layer's input, plus parameter gradients
    /// for Dense and Conv layers.
    #[must_use]
    pub fn backward(&self, da: &Ten64, m: f64) -> (Ten64, Option<LayerGrads>) {
        match self {
            Self::Dense(cache) => {
                let dz = cache.activation.backward(da, &cache.z);
                let grads = linear_backward_with(&dz, &cache.linear, m);
                (grads.da_prev.clone(), Some(grads))
            }
            Self::Conv { layer, input, z } => {
                let dz = layer.activation.backward(da, z);
                let raw = cpu::conv2d_backward(
                    &input.data,
                    Nhwc::from_shape(&input.shape),
                    &layer.params.w.data,
                    layer.window,
                    &dz.data,
                    Nhwc::from_shape(&z.shape),
                );
                let da_prev = Ten64::new(input.shape.clone(), raw.d_input);
                let grads = LayerGrads {
                    da_prev: da_prev.clone(),
                    dw: Ten64::new(layer.params.w.shape.clone(), raw.d_weights).scale(1.0 / m),
                    db: Ten64::new(layer.params.b.shape.clone(), raw.d_bias).scale(1.0 / m),
                };
                (da_prev, Some(grads))
            }
            Self::MaxPool { argmax, input_shape } => {
                let len = input_shape.iter().product();
                let dx = cpu::max_pool_backward(&da.data, argmax, len);
                (Ten64::new(input_shape.clone(), dx), None)
            }
            Self::Flatten { input_shape } => (da.transpose().reshape(input_shape.clone()), None),
        }
    }
}
