//! # Numeric Kernels
//!
//! Flat-buffer kernels behind the tensor methods and the spatial layers.
//!
//! ## Submodules
//!
//! - [`cpu`] — Multi-threaded CPU operations built on `rayon`
//!
//! ## Notes
//!
//! - Kernels take and return plain `Vec<f64>`/slices; shape checks happen in
//!   the callers (`tensors`, `network`), not here
//! - Every kernel is deterministic: parallel reductions combine per-sample
//!   partials in a fixed order

pub mod cpu;
