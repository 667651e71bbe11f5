//! Tick-driven training controller.
//!
//! # State machine
//!
//! ```text
//!            setup            pause
//!   IDLE ───────────► TRAINING ◄──────► PAUSED
//!    ▲                   │      resume    │
//!    │                   │ stop           │ stop
//!    │                   ▼                │
//!    └──── tick ───── STOPPING            │
//!    └────────────────────────────────────┘
//! ```
//!
//! The controller never schedules work on its own. Each accepted `tick`
//! runs at most one mini-batch (forward, cost, backward, update) and answers
//! with exactly one [`Event`]:
//!
//! - `batchEnd` after a batch ran
//! - `epochEnd` when the epoch's batches were already exhausted; the epoch
//!   rolls over and no batch runs
//! - `complete {finished}` instead of the last `epochEnd`
//! - `complete {stopped}` when a stop was pending
//!
//! Pause and stop therefore act on batch boundaries only. Commands that are
//! not valid in the current state are answered with `rejected` and change
//! nothing. A numeric fault during a tick is answered with `error`; the
//! session is discarded and the controller is back to `IDLE`.

use crate::error::{ConfigError, Error, Result};
use crate::network::{LayerConfig, Network};
use crate::protocol::{
    Command, CommandKind, CompleteReason, Event, LayerOutput, TensorData, TensorPayload,
    TrainingParams, VisData,
};
use crate::tensors::Ten64;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    #[default]
    Idle,
    Training,
    Paused,
    Stopping,
}

/// Everything one training run owns: the network, the dataset and the
/// position of the next batch.
#[derive(Debug, Clone)]
pub struct Session {
    network: Network,
    /// Inputs, batch-first.
    x: Ten64,
    /// Labels, `[samples, columns]`.
    y: Ten64,
    params: TrainingParams,
    epoch: usize,
    batch_index: usize,
    total_batches: usize,
}

/// Outcome of one batch cycle.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub epoch: usize,
    pub batch_idx: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub iter_time: f64,
}

impl Session {
    /// Validates the dataset and parameters, then builds the network with
    /// `params.seed`.
    ///
    /// # Errors
    /// [`Error::Config`] for any rejected setup, including a network that
    /// cannot be built for this data.
    pub fn new(
        layer_config: &[LayerConfig],
        x: Ten64,
        y: Ten64,
        params: TrainingParams,
    ) -> Result<Self> {
        let params = params.checked()?;
        let samples = x.shape.first().copied().unwrap_or(0);
        if samples == 0 {
            return Err(ConfigError::EmptyDataset.into());
        }
        let labels = y.shape.first().copied().unwrap_or(0);
        if samples != labels {
            return Err(ConfigError::SampleMismatch { inputs: samples, labels }.into());
        }
        if params.vis_sample >= samples {
            return Err(ConfigError::VisSample { index: params.vis_sample, samples }.into());
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let network = Network::build(layer_config, &x.shape, &mut rng)?;
        network.check_labels(&y.shape)?;

        Ok(Self {
            network,
            x,
            y,
            params,
            epoch: 0,
            batch_index: 0,
            total_batches: samples.div_ceil(params.batch_size),
        })
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    #[must_use]
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    #[must_use]
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    fn samples(&self) -> usize {
        self.x.shape[0]
    }

    /// Whether every batch of the current epoch has run.
    #[must_use]
    pub fn epoch_exhausted(&self) -> bool {
        self.batch_index >= self.total_batches
    }

    /// Moves to the next epoch. Returns `false` once every epoch has run.
    pub fn roll_epoch(&mut self) -> bool {
        self.epoch += 1;
        self.batch_index = 0;
        self.epoch < self.params.epochs
    }

    /// One forward → cost → backward → update cycle on the next batch.
    ///
    /// The last batch of an epoch may be short; its own width scales the
    /// gradients.
    ///
    /// # Errors
    /// [`Error::Numeric`] if the cost or a gradient is not finite. The
    /// parameters are left untouched in that case.
    pub fn run_batch(&mut self) -> Result<BatchReport> {
        let start = self.batch_index * self.params.batch_size;
        let end = (start + self.params.batch_size).min(self.samples());
        let x = self.x.slice_samples(start..end);
        let y = self.y.slice_samples(start..end).transpose();

        let timer = Instant::now();
        let (al, caches) = self.network.forward(&x);
        let loss = self.network.loss().cost(&al, &y)?;
        let accuracy = self.network.accuracy(&al, &y);
        let grads = self.network.backward(&al, &y, &caches)?;
        drop(caches);
        self.network.update(&grads, self.params.l_rate);
        let iter_time = timer.elapsed().as_secs_f64() * 1000.0;

        let report = BatchReport {
            epoch: self.epoch,
            batch_idx: self.batch_index,
            loss,
            accuracy,
            iter_time,
        };
        self.batch_index += 1;
        Ok(report)
    }

    /// Inference on the visualization sample with the current parameters.
    #[must_use]
    pub fn snapshot(&self) -> VisData {
        let index = self.params.vis_sample;
        let sample = self.x.slice_samples(index..index + 1);
        let columns = self.y.shape[1];
        let label_row = &self.y.data[index * columns..(index + 1) * columns];
        let sample_y_label = if self.network.is_multiclass() {
            label_row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(i, _)| i)
        } else {
            usize::from(label_row[0] > 0.5)
        };

        VisData {
            layer_outputs: self.network.trace(&sample).into_iter().map(LayerOutput::from).collect(),
            sample_x: TensorData::from(sample),
            sample_y_label,
        }
    }
}

/// Owns at most one [`Session`] and validates every transition.
#[derive(Debug, Default)]
pub struct Controller {
    state: ControllerState,
    session: Option<Session>,
}

impl Controller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Dispatches one command. Only a `stop` that is already pending
    /// produces no event.
    pub fn handle(&mut self, command: Command) -> Option<Event> {
        match command {
            Command::Setup { layer_config, x_train, y_train, training_params } => {
                Some(self.setup(&layer_config, x_train, y_train, training_params))
            }
            Command::Tick => Some(self.tick()),
            Command::Pause => Some(self.pause()),
            Command::Resume => Some(self.resume()),
            Command::Stop => self.stop(),
        }
    }

    fn reject(&self, command: CommandKind) -> Event {
        warn!(?command, state = ?self.state, "command rejected");
        Event::Rejected { command, state: self.state }
    }

    fn finish(&mut self, reason: CompleteReason) -> Event {
        self.session = None;
        self.state = ControllerState::Idle;
        info!(?reason, "training complete");
        Event::Complete { reason }
    }

    /// Starts a session from `IDLE`. Training waits for the first `tick`.
    pub fn setup(
        &mut self,
        layer_config: &[LayerConfig],
        x_train: TensorPayload,
        y_train: TensorPayload,
        params: TrainingParams,
    ) -> Event {
        if self.state != ControllerState::Idle {
            return self.reject(CommandKind::Setup);
        }
        let session = x_train.into_tensor("x_train").map_err(Error::from).and_then(|x| {
            let y = y_train.into_tensor("y_train")?;
            Session::new(layer_config, x, y, params)
        });
        match session {
            Ok(session) => {
                let event = Event::SetupComplete {
                    total_batches: session.total_batches,
                    multiclass: session.network.is_multiclass(),
                };
                info!(
                    layers = session.network.len(),
                    samples = session.samples(),
                    total_batches = session.total_batches,
                    epochs = params.epochs,
                    "session ready"
                );
                self.session = Some(session);
                self.state = ControllerState::Training;
                event
            }
            Err(err) => {
                error!(%err, "setup failed");
                Event::Error { message: err.to_string() }
            }
        }
    }

    /// Runs at most one batch; see the module docs for which event comes back.
    pub fn tick(&mut self) -> Event {
        match self.state {
            ControllerState::Training => {}
            ControllerState::Stopping => return self.finish(CompleteReason::Stopped),
            ControllerState::Idle | ControllerState::Paused => {
                return self.reject(CommandKind::Tick);
            }
        }
        let Some(session) = self.session.as_mut() else {
            return self.reject(CommandKind::Tick);
        };

        if session.epoch_exhausted() {
            let finished = session.epoch;
            if !session.roll_epoch() {
                return self.finish(CompleteReason::Finished);
            }
            info!(epoch = finished, "epoch finished");
            return Event::EpochEnd { epoch: finished };
        }

        match session.run_batch() {
            Ok(report) => {
                debug!(
                    epoch = report.epoch,
                    batch = report.batch_idx,
                    loss = report.loss,
                    accuracy = report.accuracy,
                    iter_ms = report.iter_time,
                    "batch finished"
                );
                Event::BatchEnd {
                    epoch: report.epoch,
                    batch_idx: report.batch_idx,
                    loss: report.loss,
                    accuracy: report.accuracy,
                    iter_time: report.iter_time,
                    vis_data: session.snapshot(),
                }
            }
            Err(err) => {
                error!(%err, "training aborted");
                self.session = None;
                self.state = ControllerState::Idle;
                Event::Error { message: err.to_string() }
            }
        }
    }

    /// `TRAINING → PAUSED`.
    pub fn pause(&mut self) -> Event {
        if self.state != ControllerState::Training {
            return self.reject(CommandKind::Pause);
        }
        self.state = ControllerState::Paused;
        info!("training paused");
        Event::Paused
    }

    /// `PAUSED → TRAINING`. The consumer issues the next `tick`.
    pub fn resume(&mut self) -> Event {
        if self.state != ControllerState::Paused {
            return self.reject(CommandKind::Resume);
        }
        self.state = ControllerState::Training;
        info!("training resumed");
        Event::Resumed
    }

    /// From `PAUSED` completes at once; from `TRAINING` completes on the next
    /// tick. Ignored while a stop is already pending, rejected in `IDLE`.
    pub fn stop(&mut self) -> Option<Event> {
        match self.state {
            ControllerState::Paused => Some(self.finish(CompleteReason::Stopped)),
            ControllerState::Training => {
                self.state = ControllerState::Stopping;
                info!("stop requested");
                None
            }
            ControllerState::Stopping => None,
            ControllerState::Idle => Some(self.reject(CommandKind::Stop)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;

    fn binary_setup(samples: usize, batch_size: usize, epochs: usize) -> Command {
        let x: Vec<f64> = (0..samples).map(|i| i as f64 / samples as f64 - 0.5).collect();
        let y: Vec<f64> = x.iter().map(|&v| f64::from(u8::from(v > 0.0))).collect();
        Command::Setup {
            layer_config: vec![
                LayerConfig::Flatten {},
                LayerConfig::Dense { neurons: 1, activation: Activation::Sigmoid },
            ],
            x_train: TensorPayload { shape: vec![samples, 1], buffer: x },
            y_train: TensorPayload { shape: vec![samples, 1], buffer: y },
            training_params: TrainingParams::new(0.5, epochs, batch_size),
        }
    }

    #[test]
    fn short_last_batch_is_counted() {
        let mut c = Controller::new();
        let event = c.handle(binary_setup(5, 2, 1));
        assert_eq!(event, Some(Event::SetupComplete { total_batches: 3, multiclass: false }));
    }

    #[test]
    fn pending_stop_is_ignored() {
        let mut c = Controller::new();
        c.handle(binary_setup(4, 2, 1));
        assert_eq!(c.stop(), None);
        assert_eq!(c.stop(), None);
        assert_eq!(c.state(), ControllerState::Stopping);
        assert_eq!(c.tick(), Event::Complete { reason: CompleteReason::Stopped });
        assert!(c.session().is_none());
    }

    #[test]
    fn bad_vis_sample_fails_setup() {
        let mut c = Controller::new();
        let Command::Setup { layer_config, x_train, y_train, mut training_params } =
            binary_setup(3, 1, 1)
        else {
            unreachable!()
        };
        training_params.vis_sample = 3;
        let event = c.setup(&layer_config, x_train, y_train, training_params);
        assert!(matches!(event, Event::Error { .. }));
        assert_eq!(c.state(), ControllerState::Idle);
    }
}
