//! The parameter store: one weight/bias pair per layer, in layer order.
//!
//! Layer `l` (1-based in the maths, index `l - 1` here) owns
//! `W_l: [out_l, in_l]` and `b_l: [out_l, 1]`. The store is allocated once,
//! updated in place by [`update_parameters`], and never resized.

use crate::backprop::GradientBundle;
use crate::tensors::Ten64;
use rand::Rng;

/// Weights and bias of a single layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    pub w: Ten64,
    pub b: Ten64,
}

impl LayerParams {
    /// Pairs a weight tensor with its bias column.
    ///
    /// # Panics
    /// Panics if `w.shape[0] != b.shape[0]` or `b` is not a column.
    #[must_use]
    pub fn new(w: Ten64, b: Ten64) -> Self {
        assert_eq!(b.shape, vec![w.shape[0], 1], "bias must be [out, 1] matching W");
        Self { w, b }
    }

    /// Output width of the layer.
    #[must_use]
    pub fn units(&self) -> usize {
        self.w.shape[0]
    }

    /// Applies `W -= lr * dW`, `b -= lr * db`.
    pub fn apply(&mut self, dw: &Ten64, db: &Ten64, lr: f64) {
        self.w.sub_scaled(dw, lr);
        self.b.sub_scaled(db, lr);
    }
}

/// Ordered, index-addressed parameters of an L-layer dense network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamStore {
    layers: Vec<LayerParams>,
}

impl ParamStore {
    #[must_use]
    pub fn new(layers: Vec<LayerParams>) -> Self {
        Self { layers }
    }

    /// Number of layers `L`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Parameters of layer `index` (0-based).
    #[must_use]
    pub fn layer(&self, index: usize) -> &LayerParams {
        &self.layers[index]
    }

    pub fn layer_mut(&mut self, index: usize) -> &mut LayerParams {
        &mut self.layers[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerParams> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LayerParams> {
        self.layers.iter_mut()
    }

    /// Flattens to `[W1, b1, W2, b2, ...]`, the checkpoint order.
    #[must_use]
    pub fn tensors(&self) -> Vec<&Ten64> {
        self.layers.iter().flat_map(|p| [&p.w, &p.b]).collect()
    }
}

/// Random `W_l` scaled by `0.01`, zero `b_l`, for `layer_dims = [n_0, ..., n_L]`.
///
/// # Example
/// ```
/// use rand::SeedableRng;
/// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// let params = netvis::params::initialize_params(&[5, 4, 3], &mut rng);
/// assert_eq!(params.layer(0).w.shape, vec![4, 5]);
/// assert_eq!(params.layer(1).b.shape, vec![3, 1]);
/// ```
pub fn initialize_params<R: Rng + ?Sized>(layer_dims: &[usize], rng: &mut R) -> ParamStore {
    initialize_params_scaled(layer_dims, 0.01, rng)
}

/// [`initialize_params`] with an explicit weight scale.
pub fn initialize_params_scaled<R: Rng + ?Sized>(
    layer_dims: &[usize],
    scale: f64,
    rng: &mut R,
) -> ParamStore {
    let layers = layer_dims
        .windows(2)
        .map(|pair| {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            LayerParams::new(
                Ten64::randn(vec![fan_out, fan_in], scale, &mut *rng),
                Ten64::zeros(vec![fan_out, 1]),
            )
        })
        .collect();
    ParamStore::new(layers)
}

/// One gradient-descent step: `W_l -= lr * dW_l`, `b_l -= lr * db_l` for every layer.
///
/// Takes the store by value and hands it back, so callers that think of the
/// update functionally never observe the pre-update store again.
///
/// # Panics
/// Panics if the bundle was produced for a different number of layers.
#[must_use]
pub fn update_parameters(
    mut params: ParamStore,
    grads: &GradientBundle,
    learning_rate: f64,
) -> ParamStore {
    assert_eq!(params.len(), grads.len(), "gradient bundle does not match the store");
    for (p, g) in params.iter_mut().zip(grads.iter()) {
        p.apply(&g.dw, &g.db, learning_rate);
    }
    params
}
