//! netvis: interactive, tick-driven neural network training with
//! hand-derived backpropagation.
//!
//! Gradients are not traced: every activation and layer kind carries its own
//! local derivative, and the backward pass walks explicit per-layer caches in
//! reverse. Training advances one mini-batch per externally issued `tick`, so
//! a consumer can pause, resume or stop between any two batches and render
//! the network's activations after each one.
//!
//! # Features
//!
//! - L-layer dense forward/backward/update over `[features, batch]` columns
//! - Conv, MaxPool and Flatten layers for NHWC image batches
//! - Binary and softmax cross-entropy
//! - A validated state machine (`IDLE`, `TRAINING`, `PAUSED`, `STOPPING`)
//!   answering every command with a typed event
//! - Thread-hosted controller speaking the JSON wire format
//! - `.bpat` checkpoints and numerical gradient checking
//!
//! # Modules
//!
//! - [`tensors`] — The row-major tensor every routine computes with.
//! - [`activation`] — ReLU, sigmoid, tanh and softmax with their derivatives.
//! - [`params`] — Per-layer weights and biases, initialisation, updates.
//! - [`forward`] / [`backprop`] — The cached forward pass and its reverse.
//! - [`cost`] — Cross-entropy costs and accuracy.
//! - [`network`] — Networks built and validated from an editor layer list.
//! - [`protocol`] / [`controller`] / [`worker`] — Commands, events and the
//!   training state machine, in-process or on a worker thread.
//! - [`modelio`] — Saving and restoring parameters.
//!
//! # Example
//!
//! ```rust
//! use netvis::activation::Activation;
//! use netvis::backprop::model_backward;
//! use netvis::cost::{Loss, compute_cost};
//! use netvis::forward::model_forward;
//! use netvis::params::{initialize_params, update_parameters};
//! use netvis::tensor;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(3);
//! let mut params = initialize_params(&[2, 4, 1], &mut rng);
//! let x = tensor!([[0.5, -1.0, 1.5], [1.0, 0.0, -0.5]]);
//! let y = tensor!([[1.0, 0.0, 1.0]]);
//!
//! let (al, caches) = model_forward(&x, &params, Activation::Sigmoid);
//! let cost = compute_cost(&al, &y).unwrap();
//! let grads = model_backward(&al, &y, &caches, Loss::BinaryCrossEntropy).unwrap();
//! drop(caches);
//! params = update_parameters(params, &grads, 0.1);
//! assert!(cost > 0.0 && params.len() == 2);
//! ```

pub mod activation;
pub mod approx;
pub mod backprop;
pub mod controller;
pub mod cost;
pub mod error;
pub mod forward;
pub mod gradcheck;
pub mod modelio;
pub mod network;
pub mod ops;
pub mod params;
pub mod protocol;
pub mod tensors;
pub mod worker;

pub use error::{Error, Result};
