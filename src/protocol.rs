//! Messages exchanged between a training consumer and the controller.
//!
//! # Direction
//!
//! - [`Command`]: consumer → controller (`setup`, `tick`, `pause`, `resume`, `stop`)
//! - [`Event`]: controller → consumer (`setupComplete`, `batchEnd`, `epochEnd`,
//!   `complete`, `paused`, `resumed`, `rejected`, `error`)
//!
//! Both are closed enums tagged by a `type` field on the wire, so every
//! handler matches them exhaustively. Field names follow the wire contract
//! (`x_train`, `layerConfig`, `iterTime`, `sampleY_label`, ...).
//!
//! # Trust boundary
//!
//! Tensors cross the boundary as `{shape, buffer}` pairs. A payload only
//! becomes a [`Ten64`] after [`briny`] validation confirms that the buffer
//! length matches the shape and that every value is finite.
//!
//! # Example
//!
//! ```rust
//! use netvis::protocol::Command;
//! let cmd = Command::from_json(r#"{"type": "tick"}"#).unwrap();
//! assert_eq!(cmd, Command::Tick);
//! ```

use crate::controller::ControllerState;
use crate::error::{ConfigError, PayloadError, Result};
use crate::network::{LayerConfig, LayerSnapshot};
use crate::tensors::Ten64;
use briny::prelude::*;
use serde::{Deserialize, Serialize};

/// Seed used when `trainingParams.seed` is absent.
pub const DEFAULT_SEED: u64 = 42;

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// A tensor in transit: row-major `buffer` for `shape`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorPayload {
    pub shape: Vec<usize>,
    pub buffer: Vec<f64>,
}

/// Product of `shape`, or `None` if it does not fit in `usize`.
fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl Validate for TensorPayload {
    fn validate(&self) -> Result<(), ValidationError> {
        if element_count(&self.shape) != Some(self.buffer.len()) {
            return Err(ValidationError);
        }
        if !self.buffer.iter().all(|v| v.is_finite()) {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl TensorPayload {
    /// Validates the payload and takes ownership of its buffer.
    ///
    /// # Errors
    /// [`PayloadError::Overflow`] if the element count of the shape overflows
    /// `usize`, [`PayloadError::Length`] if the buffer does not fill
    /// the shape, [`PayloadError::NonFinite`] if it holds `NaN` or infinities.
    pub fn into_tensor(self, name: &'static str) -> Result<Ten64, PayloadError> {
        let Some(expected) = element_count(&self.shape) else {
            return Err(PayloadError::Overflow { name, shape: self.shape });
        };
        let actual = self.buffer.len();
        let shape = self.shape.clone();
        let trusted = TrustedData::new(self).map_err(|_| {
            if expected == actual {
                PayloadError::NonFinite { name }
            } else {
                PayloadError::Length { name, shape, expected, actual }
            }
        })?;
        let payload = trusted.into_inner();
        Ok(Ten64::new(payload.shape, payload.buffer))
    }
}

impl From<Ten64> for TensorPayload {
    fn from(t: Ten64) -> Self {
        Self { shape: t.shape, buffer: t.data }
    }
}

/// Optimisation settings carried by `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub l_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Training-set index of the sample rendered after each batch.
    #[serde(default)]
    pub vis_sample: usize,
}

impl TrainingParams {
    #[must_use]
    pub const fn new(l_rate: f64, epochs: usize, batch_size: usize) -> Self {
        Self { l_rate, epochs, batch_size, seed: DEFAULT_SEED, vis_sample: 0 }
    }

    /// # Errors
    /// [`ConfigError::TrainingParams`] unless `l_rate` is finite and positive
    /// and `epochs`, `batch_size` are at least 1.
    pub fn checked(self) -> Result<Self, ConfigError> {
        TrustedData::new(self)
            .map(TrustedData::into_inner)
            .map_err(|_| ConfigError::TrainingParams)
    }
}

impl Validate for TrainingParams {
    fn validate(&self) -> Result<(), ValidationError> {
        if !(self.l_rate.is_finite() && self.l_rate > 0.0) {
            return Err(ValidationError);
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Consumer → controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Setup {
        #[serde(rename = "layerConfig")]
        layer_config: Vec<LayerConfig>,
        x_train: TensorPayload,
        y_train: TensorPayload,
        #[serde(rename = "trainingParams")]
        training_params: TrainingParams,
    },
    Tick,
    Pause,
    Resume,
    Stop,
}

impl Command {
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Setup { .. } => CommandKind::Setup,
            Self::Tick => CommandKind::Tick,
            Self::Pause => CommandKind::Pause,
            Self::Resume => CommandKind::Resume,
            Self::Stop => CommandKind::Stop,
        }
    }

    /// # Errors
    /// [`crate::Error::Json`] on malformed input.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// # Errors
    /// [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload-free name of a [`Command`], echoed back in `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Setup,
    Tick,
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompleteReason {
    /// Every epoch ran.
    Finished,
    /// A `stop` was honoured.
    Stopped,
}

/// A tensor copied out for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl From<Ten64> for TensorData {
    fn from(t: Ten64) -> Self {
        Self { shape: t.shape, data: t.data }
    }
}

/// One layer of a visualization snapshot; absent halves are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerOutput {
    #[serde(rename = "Zshape", default, skip_serializing_if = "Option::is_none")]
    pub z_shape: Option<Vec<usize>>,
    #[serde(rename = "Zdata", default, skip_serializing_if = "Option::is_none")]
    pub z_data: Option<Vec<f64>>,
    #[serde(rename = "Ashape", default, skip_serializing_if = "Option::is_none")]
    pub a_shape: Option<Vec<usize>>,
    #[serde(rename = "Adata", default, skip_serializing_if = "Option::is_none")]
    pub a_data: Option<Vec<f64>>,
}

impl From<LayerSnapshot> for LayerOutput {
    fn from(snap: LayerSnapshot) -> Self {
        let (z_shape, z_data) = snap.z.map(|z| (z.shape, z.data)).unzip();
        let (a_shape, a_data) = snap.a.map(|a| (a.shape, a.data)).unzip();
        Self { z_shape, z_data, a_shape, a_data }
    }
}

/// Activations of one training sample after a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisData {
    #[serde(rename = "sampleX")]
    pub sample_x: TensorData,
    #[serde(rename = "sampleY_label")]
    pub sample_y_label: usize,
    #[serde(rename = "layerOutputs")]
    pub layer_outputs: Vec<LayerOutput>,
}

/// Controller → consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    SetupComplete {
        #[serde(rename = "totalBatches")]
        total_batches: usize,
        multiclass: bool,
    },
    BatchEnd {
        epoch: usize,
        batch_idx: usize,
        loss: f64,
        /// Percent of the batch classified correctly.
        accuracy: f64,
        /// Milliseconds spent on forward, backward and update.
        #[serde(rename = "iterTime")]
        iter_time: f64,
        #[serde(rename = "visData")]
        vis_data: VisData,
    },
    EpochEnd {
        epoch: usize,
    },
    Complete {
        reason: CompleteReason,
    },
    Paused,
    Resumed,
    Rejected {
        command: CommandKind,
        state: ControllerState,
    },
    Error {
        message: String,
    },
}

impl Event {
    /// # Errors
    /// [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    /// [`crate::Error::Json`] on malformed input.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
