//! Layer configuration as produced by the network editor.
//!
//! One JSON object per layer, tagged by `type`:
//!
//! ```json
//! [
//!   {"type": "conv", "out_channels": 4, "kernel_size": 3, "stride": 1, "padding": 1, "activation": "relu"},
//!   {"type": "maxpool", "pool_size": 2, "stride": 2},
//!   {"type": "flatten"},
//!   {"type": "dense", "neurons": 10, "activation": "softmax"}
//! ]
//! ```
//!
//! Unknown keys (the editor's `id`, for instance) are ignored.

use crate::activation::Activation;
use serde::{Deserialize, Serialize};

const fn one() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerConfig {
    Dense {
        neurons: usize,
        activation: Activation,
    },
    Conv {
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "one")]
        stride: usize,
        #[serde(default)]
        padding: usize,
        activation: Activation,
    },
    #[serde(rename = "maxpool")]
    MaxPool {
        pool_size: usize,
        #[serde(default = "one")]
        stride: usize,
    },
    Flatten {},
}

impl LayerConfig {
    /// The `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Dense { .. } => "dense",
            Self::Conv { .. } => "conv",
            Self::MaxPool { .. } => "maxpool",
            Self::Flatten {} => "flatten",
        }
    }
}
