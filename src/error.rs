//! Error types.
//!
//! Configuration problems are detected when a network is built, numeric
//! faults when a tick runs, payload and checkpoint problems at the decode
//! boundary. Protocol misuse is not an error: the controller answers it with
//! a `rejected` event instead.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Any fault surfaced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid network configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("numeric fault: {0}")]
    Numeric(#[from] NumericError),
    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("the training worker has shut down")]
    Disconnected,
}

/// A layer sequence or training setup that cannot be trained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("network has no layers")]
    EmptyNetwork,
    #[error("layer {index}: the first layer cannot be dense, flatten the data first")]
    DenseFirst { index: usize },
    #[error("layer {index}: dense layer received unflattened input")]
    DenseBeforeFlatten { index: usize },
    #[error("layer {index}: multiple flatten layers")]
    DuplicateFlatten { index: usize },
    #[error("layer {index}: {kind} requires spatial input but the data is already flattened")]
    SpatialAfterFlatten { index: usize, kind: &'static str },
    #[error("layer {index}: {kind} needs [samples, height, width, channels] input, got rank {rank}")]
    MissingSpatialDims { index: usize, kind: &'static str, rank: usize },
    #[error("layer {index}: {kind} results in non-positive output dimension (H_out={h}, W_out={w})")]
    NonPositiveOutput { index: usize, kind: &'static str, h: i64, w: i64 },
    #[error("layer {index}: {field} must be positive")]
    ZeroSized { index: usize, field: &'static str },
    #[error("the last layer must be dense to produce predictions")]
    OutputNotDense,
    #[error("the output layer must use sigmoid or softmax, got {0}")]
    OutputActivation(&'static str),
    #[error("output layer has {units} units but labels have {labels} columns")]
    OutputWidth { units: usize, labels: usize },
    #[error("binary output must have exactly one unit, got {0}")]
    BinaryWidth(usize),
    #[error("inputs hold {inputs} samples but labels hold {labels}")]
    SampleMismatch { inputs: usize, labels: usize },
    #[error("unsupported input rank {0}, expected [samples, features] or [samples, height, width, channels]")]
    InputRank(usize),
    #[error("labels must be [samples, classes], got rank {0}")]
    LabelRank(usize),
    #[error("training set is empty")]
    EmptyDataset,
    #[error("visualization sample {index} is outside a dataset of {samples}")]
    VisSample { index: usize, samples: usize },
    #[error("invalid training parameters: l_rate must be finite and positive, epochs and batch_size at least 1")]
    TrainingParams,
}

/// Non-finite values produced by cost or gradient computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumericError {
    #[error("cost is not finite (log of 0 or overflow in the output layer)")]
    NonFiniteCost,
    #[error("gradient of layer {layer} is not finite")]
    NonFiniteGradient { layer: usize },
}

/// A transferred tensor that does not describe itself consistently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("{name}: shape {shape:?} needs {expected} values, buffer holds {actual}")]
    Length {
        name: &'static str,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("{name}: shape {shape:?} has more elements than can be addressed")]
    Overflow { name: &'static str, shape: Vec<usize> },
    #[error("{name}: buffer contains non-finite values")]
    NonFinite { name: &'static str },
}

/// Failures reading or writing `.bpat` checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("file does not start with the bpat magic")]
    BadMagic,
    #[error("tensor {index} is corrupted")]
    Corrupted { index: usize },
    #[error("checkpoint holds {found} tensors, expected {expected}")]
    Count { expected: usize, found: usize },
    #[error("tensor {index} has shape {found:?}, expected {expected:?}")]
    Shape {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("at most 255 tensors fit in one checkpoint, got {0}")]
    TooMany(usize),
}
