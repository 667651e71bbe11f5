//! Forward propagation with explicit per-layer caches.
//!
//! Each layer computes `Z = W · A_prev + b` (bias broadcast over the batch
//! columns), applies its activation, and records a [`LayerCache`] holding
//! `A_prev`, a borrow of the layer's parameters, and `Z`.
//!
//! Caches borrow the parameter store, so the store cannot be updated while a
//! cache from the same cycle is still alive: they are consumed by the backward
//! pass and dropped before the update step.

use crate::activation::Activation;
use crate::params::{LayerParams, ParamStore};
use crate::tensors::Ten64;

/// The inputs of one layer's linear step.
#[derive(Debug, Clone)]
pub struct LinearCache<'p> {
    pub a_prev: Ten64,
    pub params: &'p LayerParams,
}

/// Linear cache plus the pre-activation `Z` and the activation applied to it.
#[derive(Debug, Clone)]
pub struct LayerCache<'p> {
    pub linear: LinearCache<'p>,
    pub z: Ten64,
    pub activation: Activation,
}

/// `Z = W · A + b`.
///
/// # Panics
/// Panics if `W.shape[1] != A.shape[0]`.
#[must_use]
pub fn linear_forward(a: &Ten64, params: &LayerParams) -> Ten64 {
    params.w.matmul(a).add_column(&params.b)
}

/// One layer: linear step, then `activation`. Returns `A` and the layer cache.
#[must_use]
pub fn linear_activation_forward(
    a_prev: Ten64,
    params: &LayerParams,
    activation: Activation,
) -> (Ten64, LayerCache<'_>) {
    let z = linear_forward(&a_prev, params);
    let a = activation.forward(&z);
    let cache = LayerCache {
        linear: LinearCache { a_prev, params },
        z,
        activation,
    };
    (a, cache)
}

/// Full forward pass of an L-layer network on `x: [features, batch]`.
///
/// Layers `1..L-1` use ReLU, layer `L` uses `output` (sigmoid for binary,
/// softmax for multiclass). A single-layer store runs only the output step.
/// Returns `AL` and one cache per layer, in layer order.
#[must_use]
pub fn model_forward<'p>(
    x: &Ten64,
    params: &'p ParamStore,
    output: Activation,
) -> (Ten64, Vec<LayerCache<'p>>) {
    let layers = params.len();
    let mut caches = Vec::with_capacity(layers);
    let mut a = x.clone();

    for (l, layer) in params.iter().enumerate() {
        let activation = if l + 1 == layers { output } else { Activation::Relu };
        let (next, cache) = linear_activation_forward(a, layer, activation);
        caches.push(cache);
        a = next;
    }

    (a, caches)
}
