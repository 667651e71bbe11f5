//! Parallel CPU tensor kernels
//!
//! # CPU Backend
//!
//! High-throughput implementations of the inner loops used by forward and
//! backward propagation.
//!
//! ## Implemented Ops
//!
//! - `matmul`: row-parallel matrix multiplication
//! - `conv2d` / `conv2d_backward`: NHWC convolution with stride and zero padding
//! - `max_pool` / `max_pool_backward`: NHWC max pooling with argmax routing
//!
//! ## Design Goals
//!
//! - Deterministic results: per-sample partial gradients are collected in
//!   order and summed sequentially
//! - Zero dependencies beyond `rayon`

use rayon::prelude::*;

/// Batch-first spatial dimensions `[n, h, w, c]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nhwc {
    pub n: usize,
    pub h: usize,
    pub w: usize,
    pub c: usize,
}

impl Nhwc {
    /// Reads the dimensions of a rank-4 shape.
    ///
    /// # Panics
    /// Panics if `shape` is not rank 4.
    #[must_use]
    pub fn from_shape(shape: &[usize]) -> Self {
        assert_eq!(shape.len(), 4, "expected an NHWC shape, got {shape:?}");
        Self { n: shape[0], h: shape[1], w: shape[2], c: shape[3] }
    }

    #[must_use]
    pub fn to_shape(self) -> Vec<usize> {
        vec![self.n, self.h, self.w, self.c]
    }

    /// Elements in one sample.
    #[must_use]
    pub const fn sample_len(self) -> usize {
        self.h * self.w * self.c
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.n * self.sample_len()
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[inline]
    const fn at(self, s: usize, y: usize, x: usize, ch: usize) -> usize {
        ((s * self.h + y) * self.w + x) * self.c + ch
    }
}

/// A sliding window: square kernel or pool size, stride and zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub size: usize,
    pub stride: usize,
    pub padding: usize,
}

impl Window {
    /// `floor((len - size + 2 * padding) / stride) + 1`, or `None` when the
    /// window does not fit at all.
    #[must_use]
    pub const fn output_len(self, len: usize) -> Option<usize> {
        let padded = len + 2 * self.padding;
        if self.stride == 0 || self.size == 0 || padded < self.size {
            return None;
        }
        Some((padded - self.size) / self.stride + 1)
    }

    /// Input coordinate under output position `o` and kernel offset `k`,
    /// or `None` inside the zero padding.
    #[inline]
    const fn source(self, o: usize, k: usize, len: usize) -> Option<usize> {
        let pos = o * self.stride + k;
        if pos < self.padding || pos - self.padding >= len {
            None
        } else {
            Some(pos - self.padding)
        }
    }
}

/// Performs a matrix multiplication `C = A × B` on row-major buffers
/// (`A: m×k`, `B: k×n`), returning `C: m×n`.
///
/// Rows of the output are computed in parallel with `rayon`.
#[must_use]
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);

    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }

    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (l, &a_il) in a_row.iter().enumerate() {
            let b_row = &b[l * n..(l + 1) * n];
            for (r, &b_lj) in row.iter_mut().zip(b_row) {
                *r += a_il * b_lj;
            }
        }
    });

    out
}

/// Output dims of a convolution, or `None` when the window does not fit.
#[must_use]
pub fn conv2d_dims(input: Nhwc, filters: usize, win: Window) -> Option<Nhwc> {
    Some(Nhwc {
        n: input.n,
        h: win.output_len(input.h)?,
        w: win.output_len(input.w)?,
        c: filters,
    })
}

/// NHWC convolution. `weights` is `[filters, size, size, in_c]`, `bias` is
/// `[filters]`; returns the pre-activation output and its dims.
///
/// # Panics
/// Panics if the window does not fit the input.
#[must_use]
pub fn conv2d(
    input: &[f64],
    dims: Nhwc,
    weights: &[f64],
    bias: &[f64],
    filters: usize,
    win: Window,
) -> (Vec<f64>, Nhwc) {
    let out = conv2d_dims(dims, filters, win).expect("convolution window does not fit");
    let k = win.size;
    let mut z = vec![0.0; out.len()];
    if out.is_empty() {
        return (z, out);
    }

    z.par_chunks_mut(out.sample_len())
        .enumerate()
        .for_each(|(s, sample)| {
            for oy in 0..out.h {
                for ox in 0..out.w {
                    for f in 0..filters {
                        let mut acc = bias[f];
                        for ky in 0..k {
                            let Some(iy) = win.source(oy, ky, dims.h) else { continue };
                            for kx in 0..k {
                                let Some(ix) = win.source(ox, kx, dims.w) else { continue };
                                let x_base = dims.at(s, iy, ix, 0);
                                let w_base = ((f * k + ky) * k + kx) * dims.c;
                                for ch in 0..dims.c {
                                    acc += input[x_base + ch] * weights[w_base + ch];
                                }
                            }
                        }
                        sample[(oy * out.w + ox) * filters + f] = acc;
                    }
                }
            }
        });

    (z, out)
}

/// Unscaled gradients of a convolution.
#[derive(Debug, Clone)]
pub struct ConvGrads {
    pub d_input: Vec<f64>,
    pub d_weights: Vec<f64>,
    pub d_bias: Vec<f64>,
}

/// Backward pass of [`conv2d`] given `dz` with dims `out`.
#[must_use]
pub fn conv2d_backward(
    input: &[f64],
    dims: Nhwc,
    weights: &[f64],
    win: Window,
    dz: &[f64],
    out: Nhwc,
) -> ConvGrads {
    let k = win.size;
    let filters = out.c;
    let w_len = filters * k * k * dims.c;

    let per_sample: Vec<(Vec<f64>, Vec<f64>, Vec<f64>)> = (0..dims.n)
        .into_par_iter()
        .map(|s| {
            let mut dx = vec![0.0; dims.sample_len()];
            let mut dw = vec![0.0; w_len];
            let mut db = vec![0.0; filters];
            let x_off = s * dims.sample_len();
            for oy in 0..out.h {
                for ox in 0..out.w {
                    for f in 0..filters {
                        let g = dz[out.at(s, oy, ox, f)];
                        db[f] += g;
                        for ky in 0..k {
                            let Some(iy) = win.source(oy, ky, dims.h) else { continue };
                            for kx in 0..k {
                                let Some(ix) = win.source(ox, kx, dims.w) else { continue };
                                let x_base = dims.at(s, iy, ix, 0);
                                let w_base = ((f * k + ky) * k + kx) * dims.c;
                                for ch in 0..dims.c {
                                    dx[x_base - x_off + ch] += g * weights[w_base + ch];
                                    dw[w_base + ch] += g * input[x_base + ch];
                                }
                            }
                        }
                    }
                }
            }
            (dx, dw, db)
        })
        .collect();

    let mut d_input = Vec::with_capacity(dims.len());
    let mut d_weights = vec![0.0; w_len];
    let mut d_bias = vec![0.0; filters];
    for (dx, dw, db) in per_sample {
        d_input.extend(dx);
        for (acc, v) in d_weights.iter_mut().zip(dw) {
            *acc += v;
        }
        for (acc, v) in d_bias.iter_mut().zip(db) {
            *acc += v;
        }
    }

    ConvGrads { d_input, d_weights, d_bias }
}

/// NHWC max pooling. Returns the pooled values, the flat input index each
/// value came from, and the output dims.
///
/// # Panics
/// Panics if the window does not fit the input.
#[must_use]
pub fn max_pool(input: &[f64], dims: Nhwc, win: Window) -> (Vec<f64>, Vec<usize>, Nhwc) {
    let out = Nhwc {
        n: dims.n,
        h: win.output_len(dims.h).expect("pool window does not fit"),
        w: win.output_len(dims.w).expect("pool window does not fit"),
        c: dims.c,
    };

    let pooled: Vec<(f64, usize)> = (0..out.len())
        .into_par_iter()
        .map(|o| {
            let ch = o % out.c;
            let ox = (o / out.c) % out.w;
            let oy = (o / (out.c * out.w)) % out.h;
            let s = o / out.sample_len();
            let mut best = (f64::NEG_INFINITY, dims.at(s, oy * win.stride, ox * win.stride, ch));
            for ky in 0..win.size {
                for kx in 0..win.size {
                    let idx = dims.at(s, oy * win.stride + ky, ox * win.stride + kx, ch);
                    if input[idx] > best.0 {
                        best = (input[idx], idx);
                    }
                }
            }
            best
        })
        .collect();

    let (values, argmax): (Vec<f64>, Vec<usize>) = pooled.into_iter().unzip();
    (values, argmax, out)
}

/// Routes each upstream gradient to the input position that won the max.
#[must_use]
pub fn max_pool_backward(dout: &[f64], argmax: &[usize], input_len: usize) -> Vec<f64> {
    let mut dx = vec![0.0; input_len];
    for (&g, &idx) in dout.iter().zip(argmax) {
        dx[idx] += g;
    }
    dx
}
