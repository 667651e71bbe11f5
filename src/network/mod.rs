//! Networks assembled from an editor layer configuration.
//!
//! # Building
//!
//! [`Network::build`] walks the configuration once, tracking the running
//! `H`, `W`, `C` of the data and whether it has been flattened yet, and
//! rejects sequences that cannot be trained before any weight is touched:
//!
//! - a Dense layer first, or before a Flatten
//! - a second Flatten
//! - Conv or MaxPool once the data is flat
//! - windows that leave a non-positive spatial output
//! - an output layer that is not Dense with sigmoid (binary) or softmax
//!   (multiclass) activation
//!
//! Conv output is `floor((H - k + 2p) / s) + 1`, pool output
//! `floor((H - p) / s) + 1`.
//!
//! # Layout
//!
//! Inputs arrive batch-first: `[samples, features]` or
//! `[samples, H, W, C]`. Spatial layers keep that NHWC layout; Flatten turns
//! it into the `[features, samples]` columns Dense layers work on. Network
//! output is therefore `[classes, samples]`, and labels must be transposed to
//! match before computing a cost.

pub mod config;
pub mod layers;

pub use config::LayerConfig;
pub use layers::{Cache, Conv, Dense, Layer, MaxPool};

use crate::activation::Activation;
use crate::backprop::GradientBundle;
use crate::cost::{self, Loss};
use crate::error::{ConfigError, NumericError};
use crate::ops::cpu::Window;
use crate::params::LayerParams;
use crate::tensors::Ten64;
use rand::Rng;
use tracing::debug;

/// One layer's outputs on a single sample, batch-first (`[1, n]` for dense
/// columns, `[1, H, W, C]` for spatial maps).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pub z: Option<Ten64>,
    pub a: Option<Ten64>,
}

/// A validated, trainable layer sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
    loss: Loss,
}

fn nonzero(index: usize, field: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroSized { index, field })
    } else {
        Ok(value)
    }
}

/// Floor-division output length, signed so the error can show how far off it is.
fn signed_len(win: Window, len: usize) -> i64 {
    let padded = len as i64 + 2 * win.padding as i64 - win.size as i64;
    padded.div_euclid(win.stride as i64) + 1
}

fn spatial_output(
    index: usize,
    kind: &'static str,
    win: Window,
    (h, w): (usize, usize),
) -> Result<(usize, usize), ConfigError> {
    match (win.output_len(h), win.output_len(w)) {
        (Some(oh), Some(ow)) => Ok((oh, ow)),
        _ => Err(ConfigError::NonPositiveOutput {
            index,
            kind,
            h: signed_len(win, h),
            w: signed_len(win, w),
        }),
    }
}

impl Network {
    /// Builds and initialises a network for inputs of `input_shape`
    /// (`[samples, features]` or `[samples, H, W, C]`).
    ///
    /// Weights are drawn from `N(0, 1/fan_in)`, biases start at zero.
    ///
    /// # Errors
    /// A [`ConfigError`] naming the first offending layer.
    pub fn build<R: Rng + ?Sized>(
        configs: &[LayerConfig],
        input_shape: &[usize],
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::EmptyNetwork);
        }
        let rank = input_shape.len();
        let mut spatial = match rank {
            2 => None,
            4 => Some((input_shape[1], input_shape[2])),
            r => return Err(ConfigError::InputRank(r)),
        };
        let mut channels = input_shape[rank - 1];
        let mut flattened = false;
        let mut layers = Vec::with_capacity(configs.len());

        debug!(?input_shape, "building network");

        for (index, config) in configs.iter().enumerate() {
            let kind = config.kind();
            let layer = match *config {
                LayerConfig::Flatten {} => {
                    if flattened {
                        return Err(ConfigError::DuplicateFlatten { index });
                    }
                    if let Some((h, w)) = spatial.take() {
                        channels *= h * w;
                    }
                    flattened = true;
                    Layer::Flatten
                }
                LayerConfig::Dense { neurons, activation } => {
                    if index == 0 {
                        return Err(ConfigError::DenseFirst { index });
                    }
                    if !flattened {
                        return Err(ConfigError::DenseBeforeFlatten { index });
                    }
                    let neurons = nonzero(index, "neurons", neurons)?;
                    let scale = (1.0 / channels as f64).sqrt();
                    let params = LayerParams::new(
                        Ten64::randn([neurons, channels], scale, &mut *rng),
                        Ten64::zeros([neurons, 1]),
                    );
                    channels = neurons;
                    Layer::Dense(Dense { params, activation })
                }
                LayerConfig::Conv { out_channels, kernel_size, stride, padding, activation } => {
                    if flattened {
                        return Err(ConfigError::SpatialAfterFlatten { index, kind });
                    }
                    let Some(dims) = spatial else {
                        return Err(ConfigError::MissingSpatialDims { index, kind, rank });
                    };
                    let window = Window {
                        size: nonzero(index, "kernel_size", kernel_size)?,
                        stride: nonzero(index, "stride", stride)?,
                        padding,
                    };
                    let filters = nonzero(index, "out_channels", out_channels)?;
                    spatial = Some(spatial_output(index, kind, window, dims)?);
                    let fan_in = kernel_size * kernel_size * channels;
                    let params = LayerParams::new(
                        Ten64::randn(
                            [filters, kernel_size, kernel_size, channels],
                            (1.0 / fan_in as f64).sqrt(),
                            &mut *rng,
                        ),
                        Ten64::zeros([filters, 1]),
                    );
                    channels = filters;
                    Layer::Conv(Conv { params, window, activation })
                }
                LayerConfig::MaxPool { pool_size, stride } => {
                    if flattened {
                        return Err(ConfigError::SpatialAfterFlatten { index, kind });
                    }
                    let Some(dims) = spatial else {
                        return Err(ConfigError::MissingSpatialDims { index, kind, rank });
                    };
                    let window = Window {
                        size: nonzero(index, "pool_size", pool_size)?,
                        stride: nonzero(index, "stride", stride)?,
                        padding: 0,
                    };
                    spatial = Some(spatial_output(index, kind, window, dims)?);
                    Layer::MaxPool(MaxPool { window })
                }
            };
            debug!(index, kind, ?spatial, channels, "layer added");
            layers.push(layer);
        }

        let loss = match layers.last() {
            Some(Layer::Dense(Dense { activation: Activation::Sigmoid, .. })) => {
                Loss::BinaryCrossEntropy
            }
            Some(Layer::Dense(Dense { activation: Activation::Softmax, .. })) => {
                Loss::CategoricalCrossEntropy
            }
            Some(Layer::Dense(Dense { activation, .. })) => {
                return Err(ConfigError::OutputActivation(activation.name()));
            }
            _ => return Err(ConfigError::OutputNotDense),
        };

        Ok(Self { layers, loss })
    }

    /// Checks `[samples, columns]` labels against the output layer.
    ///
    /// # Errors
    /// [`ConfigError::LabelRank`], [`ConfigError::BinaryWidth`] or
    /// [`ConfigError::OutputWidth`].
    pub fn check_labels(&self, label_shape: &[usize]) -> Result<(), ConfigError> {
        let [_, columns] = *label_shape else {
            return Err(ConfigError::LabelRank(label_shape.len()));
        };
        let units = self.output_units();
        if self.loss == Loss::BinaryCrossEntropy && units != 1 {
            return Err(ConfigError::BinaryWidth(units));
        }
        if units != columns {
            return Err(ConfigError::OutputWidth { units, labels: columns });
        }
        Ok(())
    }

    #[must_use]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    /// Whether the output layer is softmax.
    #[must_use]
    pub fn is_multiclass(&self) -> bool {
        self.loss == Loss::CategoricalCrossEntropy
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Width of the output layer.
    #[must_use]
    pub fn output_units(&self) -> usize {
        self.layers
            .last()
            .and_then(Layer::params)
            .map_or(0, LayerParams::units)
    }

    /// Parameters of every Dense and Conv layer, in layer order.
    pub fn params(&self) -> impl Iterator<Item = &LayerParams> {
        self.layers.iter().filter_map(Layer::params)
    }

    pub fn params_mut(&mut self) -> impl Iterator<Item = &mut LayerParams> {
        self.layers.iter_mut().filter_map(Layer::params_mut)
    }

    /// Forward pass over a batch. Returns `AL: [classes, samples]` and one
    /// cache per layer.
    #[must_use]
    pub fn forward(&self, x: &Ten64) -> (Ten64, Vec<Cache<'_>>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut a = x.clone();
        for layer in &self.layers {
            let (next, cache) = layer.forward(a);
            caches.push(cache);
            a = next;
        }
        (a, caches)
    }

    /// Network output without keeping caches.
    #[must_use]
    pub fn predict(&self, x: &Ten64) -> Ten64 {
        self.layers
            .iter()
            .fold(x.clone(), |a, layer| layer.forward(a).0)
    }

    /// Backward pass from `AL` against `y: [classes, samples]`.
    ///
    /// The bundle holds one entry per Dense/Conv layer, in layer order.
    ///
    /// # Errors
    /// [`NumericError::NonFiniteGradient`] with the 1-based layer position.
    pub fn backward(
        &self,
        al: &Ten64,
        y: &Ten64,
        caches: &[Cache<'_>],
    ) -> Result<GradientBundle, NumericError> {
        let m = al.cols() as f64;
        let mut da = self.loss.seed(al, y);
        let mut reversed = Vec::new();
        for (index, cache) in caches.iter().enumerate().rev() {
            let (da_prev, grads) = cache.backward(&da, m);
            if let Some(grads) = grads {
                if !(grads.dw.is_finite() && grads.db.is_finite()) {
                    return Err(NumericError::NonFiniteGradient { layer: index + 1 });
                }
                reversed.push(grads);
            }
            da = da_prev;
        }
        reversed.reverse();
        Ok(GradientBundle::new(reversed))
    }

    /// Gradient-descent step on every Dense and Conv layer.
    ///
    /// # Panics
    /// Panics if the bundle was produced by a different network.
    pub fn update(&mut self, grads: &GradientBundle, learning_rate: f64) {
        let mut applied = 0;
        for (params, g) in self.params_mut().zip(grads.iter()) {
            params.apply(&g.dw, &g.db, learning_rate);
            applied += 1;
        }
        assert_eq!(applied, grads.len(), "gradient bundle does not match the network");
    }

    /// Accuracy in percent of `al` against `y: [classes, samples]`.
    #[must_use]
    pub fn accuracy(&self, al: &Ten64, y: &Ten64) -> f64 {
        cost::accuracy(self.loss, al, y)
    }

    /// Inference on one batch-first sample (`[1, ...]`), recording each
    /// layer's `Z` and `A`. Dense and Conv report both, MaxPool and Flatten
    /// only `A`.
    #[must_use]
    pub fn trace(&self, sample: &Ten64) -> Vec<LayerSnapshot> {
        let mut out = Vec::with_capacity(self.layers.len());
        let mut a = sample.clone();
        for layer in &self.layers {
            let (next, cache) = layer.forward(a);
            out.push(LayerSnapshot {
                z: cache.z().map(batch_first),
                a: Some(batch_first(&next)),
            });
            a = next;
        }
        out
    }
}

/// `[n, 1]` columns become `[1, n]` rows; spatial maps are already batch-first.
fn batch_first(t: &Ten64) -> Ten64 {
    if t.rank() == 2 { t.transpose() } else { t.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn dense(neurons: usize, activation: Activation) -> LayerConfig {
        LayerConfig::Dense { neurons, activation }
    }

    fn conv(out_channels: usize, kernel_size: usize, stride: usize, padding: usize) -> LayerConfig {
        let activation = Activation::Relu;
        LayerConfig::Conv { out_channels, kernel_size, stride, padding, activation }
    }

    fn build(configs: &[LayerConfig], shape: &[usize]) -> Result<Network, ConfigError> {
        Network::build(configs, shape, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn dense_first_is_rejected() {
        let err = build(&[dense(1, Activation::Sigmoid)], &[4, 3]).unwrap_err();
        assert_eq!(err, ConfigError::DenseFirst { index: 0 });
    }

    #[test]
    fn dense_before_flatten_is_rejected() {
        let layers = [conv(2, 3, 1, 0), dense(1, Activation::Sigmoid)];
        let err = build(&layers, &[4, 8, 8, 1]).unwrap_err();
        assert_eq!(err, ConfigError::DenseBeforeFlatten { index: 1 });
    }

    #[test]
    fn second_flatten_is_rejected() {
        let layers =
            [LayerConfig::Flatten {}, LayerConfig::Flatten {}, dense(1, Activation::Sigmoid)];
        let err = build(&layers, &[4, 3]).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateFlatten { index: 1 });
    }

    #[test]
    fn pool_after_flatten_is_rejected() {
        let layers = [
            LayerConfig::Flatten {},
            LayerConfig::MaxPool { pool_size: 2, stride: 2 },
            dense(1, Activation::Sigmoid),
        ];
        let err = build(&layers, &[4, 6, 6, 1]).unwrap_err();
        assert_eq!(err, ConfigError::SpatialAfterFlatten { index: 1, kind: "maxpool" });
    }

    #[test]
    fn oversized_kernel_reports_output_dims() {
        let layers = [conv(1, 5, 1, 0), LayerConfig::Flatten {}, dense(1, Activation::Sigmoid)];
        let err = build(&layers, &[2, 3, 3, 1]).unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveOutput { index: 0, kind: "conv", h: -1, w: -1 });
    }

    #[test]
    fn output_must_be_sigmoid_or_softmax() {
        let layers = [LayerConfig::Flatten {}, dense(1, Activation::Relu)];
        assert_eq!(build(&layers, &[4, 3]).unwrap_err(), ConfigError::OutputActivation("relu"));
        let layers = [conv(1, 1, 1, 0), LayerConfig::Flatten {}];
        assert_eq!(build(&layers, &[4, 2, 2, 1]).unwrap_err(), ConfigError::OutputNotDense);
    }

    #[test]
    fn softmax_output_selects_multiclass_and_checks_labels() {
        let layers = [
            conv(2, 3, 1, 1),
            LayerConfig::MaxPool { pool_size: 2, stride: 2 },
            LayerConfig::Flatten {},
            dense(3, Activation::Softmax),
        ];
        let net = build(&layers, &[5, 4, 4, 1]).unwrap();
        assert!(net.is_multiclass());
        assert_eq!(net.params().count(), 2);
        assert_eq!(net.params().nth(1).map(|p| p.w.shape.clone()), Some(vec![3, 8]));
        assert!(net.check_labels(&[5, 3]).is_ok());
        assert_eq!(
            net.check_labels(&[5, 2]),
            Err(ConfigError::OutputWidth { units: 3, labels: 2 })
        );
    }

    #[test]
    fn trace_reports_batch_first_outputs() {
        let layers = [
            conv(2, 3, 1, 1),
            LayerConfig::MaxPool { pool_size: 2, stride: 2 },
            LayerConfig::Flatten {},
            dense(1, Activation::Sigmoid),
        ];
        let net = build(&layers, &[1, 4, 4, 1]).unwrap();
        let sample = Ten64::new(vec![1, 4, 4, 1], (0..16).map(f64::from).collect());
        let snaps = net.trace(&sample);
        assert_eq!(snaps.len(), 4);
        assert_eq!(snaps[0].z.as_ref().map(|z| z.shape.clone()), Some(vec![1, 4, 4, 2]));
        assert!(snaps[1].z.is_none());
        assert_eq!(snaps[2].a.as_ref().map(|a| a.shape.clone()), Some(vec![1, 8]));
        assert_eq!(snaps[3].a.as_ref().map(|a| a.shape.clone()), Some(vec![1, 1]));
    }
}
