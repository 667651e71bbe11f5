//! Backward propagation over the caches recorded by [`crate::forward`].
//!
//! # Gradient flow
//!
//! 1. The loss seeds `dAL` from the output `AL` and labels `Y` ([`Loss::seed`]).
//! 2. Each layer, last to first, turns `dA` into `dZ` through its activation
//!    derivative evaluated at the cached `Z`.
//! 3. The linear step turns `dZ` into
//!    - `dW = (1/m) · dZ · A_prevᵀ`
//!    - `db = (1/m) · Σ_columns dZ`
//!    - `dA_prev = Wᵀ · dZ`
//!
//! `m` is the batch width, read once from `AL`. Gradients never touch the
//! parameters: applying them is [`crate::params::update_parameters`]'s job.
//!
//! # Failure
//!
//! A non-finite `dW` or `db` aborts the pass with
//! [`NumericError::NonFiniteGradient`]; the parameters stay as they were.

use crate::cost::Loss;
use crate::error::NumericError;
use crate::forward::{LayerCache, LinearCache};
use crate::tensors::Ten64;

/// Gradients of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGrads {
    /// Gradient with respect to the layer's input activation.
    pub da_prev: Ten64,
    pub dw: Ten64,
    pub db: Ten64,
}

/// Per-layer gradients in layer order (index `l - 1` holds layer `l`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientBundle {
    layers: Vec<LayerGrads>,
}

impl GradientBundle {
    #[must_use]
    pub fn new(layers: Vec<LayerGrads>) -> Self {
        Self { layers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Gradients of layer `index` (0-based).
    #[must_use]
    pub fn layer(&self, index: usize) -> &LayerGrads {
        &self.layers[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerGrads> {
        self.layers.iter()
    }

    /// `dA0`, the gradient with respect to the network input.
    #[must_use]
    pub fn input_grad(&self) -> Option<&Ten64> {
        self.layers.first().map(|g| &g.da_prev)
    }
}

/// Linear part of one layer's backward step, averaging over `m` samples.
#[must_use]
pub fn linear_backward_with(dz: &Ten64, cache: &LinearCache<'_>, m: f64) -> LayerGrads {
    let dw = dz.matmul(&cache.a_prev.transpose()).scale(1.0 / m);
    let db = dz.sum_rows().scale(1.0 / m);
    let da_prev = cache.params.w.transpose().matmul(dz);
    LayerGrads { da_prev, dw, db }
}

/// [`linear_backward_with`] where `m` is the column count of `dz`.
///
/// # Panics
/// Panics if `dz` is not `[out, m]` with `out` matching the cached `W`.
#[must_use]
pub fn linear_backward(dz: &Ten64, cache: &LinearCache<'_>) -> LayerGrads {
    linear_backward_with(dz, cache, dz.cols() as f64)
}

/// Activation derivative at the cached `Z`, then [`linear_backward`].
#[must_use]
pub fn linear_activation_backward(da: &Ten64, cache: &LayerCache<'_>) -> LayerGrads {
    let dz = cache.activation.backward(da, &cache.z);
    linear_backward(&dz, &cache.linear)
}

/// Full backward pass from `AL` and `Y` through every cache.
///
/// # Errors
/// [`NumericError::NonFiniteGradient`] with the 1-based layer number if any
/// weight or bias gradient is `NaN` or infinite.
///
/// # Panics
/// Panics if `al` and `y` differ in shape or the caches are inconsistent.
pub fn model_backward(
    al: &Ten64,
    y: &Ten64,
    caches: &[LayerCache<'_>],
    loss: Loss,
) -> Result<GradientBundle, NumericError> {
    let m = al.cols() as f64;
    let mut da = loss.seed(al, y);
    let mut reversed = Vec::with_capacity(caches.len());

    for (l, cache) in caches.iter().enumerate().rev() {
        let dz = cache.activation.backward(&da, &cache.z);
        let grads = linear_backward_with(&dz, &cache.linear, m);
        if !(grads.dw.is_finite() && grads.db.is_finite()) {
            return Err(NumericError::NonFiniteGradient { layer: l + 1 });
        }
        da = grads.da_prev.clone();
        reversed.push(grads);
    }

    reversed.reverse();
    Ok(GradientBundle::new(reversed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::forward::model_forward;
    use crate::params::{LayerParams, ParamStore};
    use crate::tensor;

    #[test]
    fn bundle_is_in_layer_order() {
        let store = ParamStore::new(vec![
            LayerParams::new(
                tensor!([[0.5, -0.2], [0.1, 0.3], [-0.4, 0.2]]),
                Ten64::zeros([3, 1]),
            ),
            LayerParams::new(tensor!([[0.3, -0.1, 0.2]]), Ten64::zeros([1, 1])),
        ]);
        let x = tensor!([[1.0, -1.0], [0.5, 2.0]]);
        let y = tensor!([[1.0, 0.0]]);
        let (al, caches) = model_forward(&x, &store, Activation::Sigmoid);
        let grads = model_backward(&al, &y, &caches, Loss::BinaryCrossEntropy).unwrap();
        assert_eq!(grads.len(), 2);
        assert_eq!(grads.layer(0).dw.shape, vec![3, 2]);
        assert_eq!(grads.layer(1).dw.shape, vec![1, 3]);
        assert_eq!(grads.input_grad().map(|g| g.shape.clone()), Some(vec![2, 2]));
    }

    #[test]
    fn saturated_output_reports_the_layer() {
        let store = ParamStore::new(vec![LayerParams::new(tensor!([[1000.0]]), tensor!([[0.0]]))]);
        let x = tensor!([[1.0]]);
        let y = tensor!([[0.0]]);
        let (al, caches) = model_forward(&x, &store, Activation::Sigmoid);
        assert_eq!(
            model_backward(&al, &y, &caches, Loss::BinaryCrossEntropy),
            Err(NumericError::NonFiniteGradient { layer: 1 })
        );
    }

    #[test]
    fn confident_softmax_keeps_gradients_finite() {
        let store = ParamStore::new(vec![LayerParams::new(
            tensor!([[800.0], [0.0]]),
            Ten64::zeros([2, 1]),
        )]);
        let x = tensor!([[1.0]]);
        let y = tensor!([[1.0], [0.0]]);
        let (al, caches) = model_forward(&x, &store, Activation::Softmax);
        assert_eq!(al.data, vec![1.0, 0.0]);
        let grads = model_backward(&al, &y, &caches, Loss::CategoricalCrossEntropy).unwrap();
        assert_eq!(grads.layer(0).dw.data, vec![0.0, 0.0]);
        assert_eq!(grads.layer(0).db.data, vec![0.0, 0.0]);
    }
}
