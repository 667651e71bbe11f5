//! Checkpointing of trained parameters.
//!
//! # `.bpat` Format
//!
//! ```text
//! ┌────────────┬────────────┬─────────────────────┐
//! │ Header     │ Tensor N   │ Tensor N+1 …        │
//! ├────────────┼────────────┼─────────────────────┤
//! │ "bpat"[4]  │ u64: ndim  │ u64: ndim           │
//! │ u8: count  │ [u64; ndim] shape                │
//! │            │ [f64; prod(shape)] data          │
//! └────────────┴──────────────────────────────────┘
//! ```
//!
//! All integers and floats are little endian. Parameters are stored in layer
//! order as `W1, b1, W2, b2, ...`, so a file written from a [`ParamStore`]
//! or a [`Network`] can be restored into any store or network with the same
//! layer shapes.
//!
//! # Limitations
//! - `f64` elements only
//! - At most 255 tensors per file (`u8` count), i.e. 127 parametrised layers
//! - At most 8 dimensions and 2^28 elements per tensor
//! - No per-tensor names: restoring relies on order and shape
//!
//! # Example
//!
//! ```rust,no_run
//! use netvis::modelio::{restore_params, save_params};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let params = netvis::params::initialize_params(&[4, 3, 1], &mut rng);
//! save_params("model.bpat", params.iter())?;
//!
//! let mut fresh = netvis::params::initialize_params(&[4, 3, 1], &mut rng);
//! restore_params("model.bpat", fresh.iter_mut())?;
//! assert_eq!(fresh, params);
//! # Ok::<(), netvis::error::CheckpointError>(())
//! ```
//!
//! [`ParamStore`]: crate::params::ParamStore
//! [`Network`]: crate::network::Network

use crate::error::CheckpointError;
use crate::params::LayerParams;
use crate::tensors::Ten64;
use briny::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

const BPAT_MAGIC: &[u8; 4] = b"bpat";

/// Largest rank a stored tensor may declare.
const MAX_NDIM: u64 = 8;
/// Largest element count a stored tensor may declare (2 GiB of `f64`).
const MAX_ELEMENTS: u64 = 1 << 28;

/// A tensor shape as read from disk, before any data is read for it.
struct PackedShape(Vec<u64>);

impl PackedShape {
    fn elements(&self) -> Option<u64> {
        self.0.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }
}

impl Validate for PackedShape {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.elements() {
            Some(n) if n <= MAX_ELEMENTS => Ok(()),
            _ => Err(ValidationError),
        }
    }
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, CheckpointError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Encodes `tensors` in `.bpat` format.
///
/// # Errors
/// [`CheckpointError::TooMany`] past 255 tensors, or the writer's I/O error.
pub fn write_bpat<W: Write>(writer: &mut W, tensors: &[&Ten64]) -> Result<(), CheckpointError> {
    let count = u8::try_from(tensors.len()).map_err(|_| CheckpointError::TooMany(tensors.len()))?;
    writer.write_all(BPAT_MAGIC)?;
    writer.write_all(&[count])?;

    for tensor in tensors {
        writer.write_all(&(tensor.shape.len() as u64).to_le_bytes())?;
        for &dim in &tensor.shape {
            writer.write_all(&(dim as u64).to_le_bytes())?;
        }
        for &val in &tensor.data {
            writer.write_all(&val.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Decodes every tensor of a `.bpat` stream.
///
/// # Errors
/// [`CheckpointError::BadMagic`] for foreign data,
/// [`CheckpointError::Corrupted`] if a tensor declares more than 8 dimensions
/// or more than 2^28 elements (checked before its data is read), or the
/// reader's I/O error (a truncated stream ends in `UnexpectedEof`).
pub fn read_bpat<R: Read>(reader: &mut R) -> Result<Vec<Ten64>, CheckpointError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != BPAT_MAGIC {
        return Err(CheckpointError::BadMagic);
    }
    let mut count = [0u8; 1];
    reader.read_exact(&mut count)?;

    let mut tensors = Vec::with_capacity(usize::from(count[0]));
    for index in 0..usize::from(count[0]) {
        let ndim = read_u64(reader)?;
        if ndim > MAX_NDIM {
            return Err(CheckpointError::Corrupted { index });
        }
        let shape = (0..ndim).map(|_| read_u64(reader)).collect::<Result<Vec<_>, _>>()?;
        let shape = TrustedData::new(PackedShape(shape))
            .map_err(|_| CheckpointError::Corrupted { index })?
            .into_inner();
        let size = shape.elements().ok_or(CheckpointError::Corrupted { index })?;
        let data = (0..size)
            .map(|_| read_u64(reader).map(f64::from_bits))
            .collect::<Result<Vec<_>, _>>()?;

        let shape: Vec<usize> = shape.0.iter().map(|&d| d as usize).collect();
        tensors.push(Ten64::new(shape, data));
    }
    Ok(tensors)
}

/// Writes `tensors` to a `.bpat` file.
///
/// # Errors
/// See [`write_bpat`]; also fails if the file cannot be created.
pub fn save_model(path: impl AsRef<Path>, tensors: &[&Ten64]) -> Result<(), CheckpointError> {
    let mut file = BufWriter::new(File::create(path)?);
    write_bpat(&mut file, tensors)
}

/// Reads every tensor of a `.bpat` file.
///
/// # Errors
/// See [`read_bpat`]; also fails if the file cannot be opened.
pub fn load_model(path: impl AsRef<Path>) -> Result<Vec<Ten64>, CheckpointError> {
    let mut file = BufReader::new(File::open(path)?);
    read_bpat(&mut file)
}

/// Saves layer parameters as `W1, b1, W2, b2, ...`.
///
/// # Errors
/// See [`save_model`].
pub fn save_params<'a>(
    path: impl AsRef<Path>,
    layers: impl IntoIterator<Item = &'a LayerParams>,
) -> Result<(), CheckpointError> {
    let tensors: Vec<&Ten64> = layers.into_iter().flat_map(|p| [&p.w, &p.b]).collect();
    debug!(tensors = tensors.len(), "saving checkpoint");
    save_model(path, &tensors)
}

/// Replaces layer parameters from tensors in `W1, b1, W2, b2, ...` order.
///
/// Nothing is overwritten unless every tensor matches its target's shape.
///
/// # Errors
/// [`CheckpointError::Count`] or [`CheckpointError::Shape`] on mismatch.
pub fn restore_layers<'a>(
    tensors: Vec<Ten64>,
    layers: impl IntoIterator<Item = &'a mut LayerParams>,
) -> Result<(), CheckpointError> {
    let mut targets: Vec<&mut LayerParams> = layers.into_iter().collect();
    let expected = targets.len() * 2;
    if tensors.len() != expected {
        return Err(CheckpointError::Count { expected, found: tensors.len() });
    }
    let wanted = targets.iter().flat_map(|p| [p.w.shape.clone(), p.b.shape.clone()]);
    for (index, (tensor, shape)) in tensors.iter().zip(wanted).enumerate() {
        if tensor.shape != shape {
            return Err(CheckpointError::Shape {
                index,
                expected: shape,
                found: tensor.shape.clone(),
            });
        }
    }

    let mut tensors = tensors.into_iter();
    for target in &mut targets {
        if let (Some(w), Some(b)) = (tensors.next(), tensors.next()) {
            target.w = w;
            target.b = b;
        }
    }
    Ok(())
}

/// Loads a `.bpat` file into layer parameters; see [`restore_layers`].
///
/// # Errors
/// Any [`load_model`] or [`restore_layers`] failure.
pub fn restore_params<'a>(
    path: impl AsRef<Path>,
    layers: impl IntoIterator<Item = &'a mut LayerParams>,
) -> Result<(), CheckpointError> {
    let tensors = load_model(path)?;
    debug!(tensors = tensors.len(), "restoring checkpoint");
    restore_layers(tensors, layers)
}
