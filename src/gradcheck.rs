//! Numerical gradient checking.
//!
//! Every weight and bias entry is nudged by `±epsilon` and the cost is
//! re-evaluated; the central difference
//! `(J(θ + ε) − J(θ − ε)) / 2ε` is compared with the analytic gradient
//! through [`relative_difference`]. A correct backward pass lands well below
//! `1e-5` with `epsilon = 1e-7`.

use crate::activation::Activation;
use crate::approx::relative_difference;
use crate::backprop::{GradientBundle, model_backward};
use crate::cost::Loss;
use crate::error::NumericError;
use crate::forward::model_forward;
use crate::network::Network;
use crate::params::{LayerParams, ParamStore};
use crate::tensors::Ten64;

/// Anything whose trainable state is an ordered list of [`LayerParams`].
pub trait Parameterized: Clone {
    fn layer_params_mut(&mut self) -> Vec<&mut LayerParams>;
}

impl Parameterized for ParamStore {
    fn layer_params_mut(&mut self) -> Vec<&mut LayerParams> {
        self.iter_mut().collect()
    }
}

impl Parameterized for Network {
    fn layer_params_mut(&mut self) -> Vec<&mut LayerParams> {
        self.params_mut().collect()
    }
}

/// Analytic and numerical gradients, flattened as `dW1, db1, dW2, ...`.
#[derive(Debug, Clone)]
pub struct GradCheck {
    pub analytic: Vec<f64>,
    pub numerical: Vec<f64>,
}

impl GradCheck {
    /// `‖num − ana‖ / (‖num‖ + ‖ana‖)`.
    #[must_use]
    pub fn difference(&self) -> f64 {
        relative_difference(&self.numerical, &self.analytic)
    }
}

fn flatten(grads: &GradientBundle) -> Vec<f64> {
    grads
        .iter()
        .flat_map(|g| g.dw.data.iter().chain(&g.db.data).copied())
        .collect()
}

fn entry<P: Parameterized>(model: &mut P, layer: usize, bias: bool) -> &mut Ten64 {
    let params = model.layer_params_mut().swap_remove(layer);
    if bias { &mut params.b } else { &mut params.w }
}

fn numerical<P: Parameterized>(
    model: &P,
    epsilon: f64,
    cost: impl Fn(&P) -> Result<f64, NumericError>,
) -> Result<Vec<f64>, NumericError> {
    let mut perturbed = model.clone();
    let layers = perturbed.layer_params_mut().len();
    let mut out = Vec::new();

    for layer in 0..layers {
        for bias in [false, true] {
            for j in 0..entry(&mut perturbed, layer, bias).len() {
                let original = entry(&mut perturbed, layer, bias).data[j];
                entry(&mut perturbed, layer, bias).data[j] = original + epsilon;
                let plus = cost(&perturbed);
                entry(&mut perturbed, layer, bias).data[j] = original - epsilon;
                let minus = cost(&perturbed);
                entry(&mut perturbed, layer, bias).data[j] = original;
                out.push((plus? - minus?) / (2.0 * epsilon));
            }
        }
    }
    Ok(out)
}

/// Checks [`model_backward`] on an L-layer dense store.
///
/// # Errors
/// Any [`NumericError`] raised while evaluating the cost or gradients.
pub fn gradient_check(
    params: &ParamStore,
    x: &Ten64,
    y: &Ten64,
    output: Activation,
    loss: Loss,
    epsilon: f64,
) -> Result<GradCheck, NumericError> {
    let (al, caches) = model_forward(x, params, output);
    let analytic = flatten(&model_backward(&al, y, &caches, loss)?);
    let numerical = numerical(params, epsilon, |p| {
        let (al, _) = model_forward(x, p, output);
        loss.cost(&al, y)
    })?;
    Ok(GradCheck { analytic, numerical })
}

/// Checks [`Network::backward`], Conv and MaxPool layers included.
///
/// `y` is `[classes, samples]`, as the network outputs it.
///
/// # Errors
/// Any [`NumericError`] raised while evaluating the cost or gradients.
pub fn network_gradient_check(
    network: &Network,
    x: &Ten64,
    y: &Ten64,
    epsilon: f64,
) -> Result<GradCheck, NumericError> {
    let (al, caches) = network.forward(x);
    let analytic = flatten(&network.backward(&al, y, &caches)?);
    let numerical = numerical(network, epsilon, |n| n.loss().cost(&n.predict(x), y))?;
    Ok(GradCheck { analytic, numerical })
}
