//! Hosting a [`Controller`] on its own thread.
//!
//! The consumer and the controller share no memory: commands travel to the
//! worker and events travel back over two `mpsc` channels, and every tensor
//! buffer is moved through them by value. The worker handles commands
//! strictly in arrival order, one at a time, so a `pause` or `stop` sent
//! while a batch is running is seen right after that batch.
//!
//! [`handle_json`] is the same dispatch for consumers that speak the JSON
//! wire format.

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::protocol::{Command, Event};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Consumer side of a worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    commands: Option<Sender<Command>>,
    events: Receiver<Event>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns a worker thread with an idle controller.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn() -> std::io::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (event_tx, event_rx) = mpsc::channel::<Event>();

        let thread = thread::Builder::new()
            .name("netvis-trainer".into())
            .spawn(move || {
                let mut controller = Controller::new();
                for command in command_rx {
                    let kind = command.kind();
                    let Some(event) = controller.handle(command) else {
                        debug!(?kind, "no event for command");
                        continue;
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                debug!("trainer thread exiting");
            })?;

        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            thread: Some(thread),
        })
    }

    /// Queues a command for the worker.
    ///
    /// # Errors
    /// [`Error::Disconnected`] if the worker thread has exited.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(Error::Disconnected)?
            .send(command)
            .map_err(|_| Error::Disconnected)
    }

    /// Blocks for the next event.
    ///
    /// # Errors
    /// [`Error::Disconnected`] if the worker thread has exited.
    pub fn recv(&self) -> Result<Event> {
        self.events.recv().map_err(|_| Error::Disconnected)
    }

    /// Waits up to `timeout` for the next event; `Ok(None)` on timeout.
    ///
    /// # Errors
    /// [`Error::Disconnected`] if the worker thread has exited.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Event>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }

    /// Closes the command channel and waits for the worker to finish.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.commands = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("trainer thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decodes one JSON command, dispatches it and encodes the resulting event.
///
/// An undecodable message is answered with an `error` event and leaves the
/// controller untouched.
///
/// # Errors
/// [`Error::Json`] if the event cannot be encoded.
pub fn handle_json(controller: &mut Controller, message: &str) -> Result<Option<String>> {
    let event = match Command::from_json(message) {
        Ok(command) => controller.handle(command),
        Err(err) => {
            warn!(%err, "undecodable command");
            Some(Event::Error { message: err.to_string() })
        }
    };
    event.as_ref().map(Event::to_json).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerState;
    use crate::protocol::CommandKind;

    #[test]
    fn worker_answers_in_order() {
        let worker = WorkerHandle::spawn().unwrap();
        worker.send(Command::Tick).unwrap();
        worker.send(Command::Pause).unwrap();
        let expected = |command| Event::Rejected { command, state: ControllerState::Idle };
        assert_eq!(worker.recv().unwrap(), expected(CommandKind::Tick));
        assert_eq!(worker.recv().unwrap(), expected(CommandKind::Pause));
        worker.shutdown();
    }

    #[test]
    fn malformed_json_becomes_an_error_event() {
        let mut controller = Controller::new();
        let reply = handle_json(&mut controller, r#"{"type": "warp"}"#).unwrap().unwrap();
        assert!(reply.starts_with(r#"{"type":"error","message":"#));
        assert_eq!(controller.state(), ControllerState::Idle);
    }
}
