use crossbeam::channel::Sender;
use thiserror::Error;

use crate::engine::state::ServiceState;

/// The four commands a [`crate::engine::ServiceEngine`] accepts through its inbox (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Restart,
    Shutdown,
}

impl Command {
    fn target_state_name(self) -> &'static str {
        match self {
            Command::Start | Command::Restart => "Starting",
            Command::Stop => "Stopping",
            Command::Shutdown => "n/a",
        }
    }
}

/// Errors a command's response sink may be resolved with (§7).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid state transition: {from} → {to}")]
    InvalidState { from: ServiceState, to: &'static str },
    #[error("launch failed: {0}")]
    LaunchFailed(String),
    #[error("process exited before reaching Running: {0}")]
    ExitedBeforeRunning(String),
    #[error("superseded by a later command")]
    Superseded,
    #[error("service is shutting down")]
    ShuttingDown,
}

impl EngineError {
    pub(crate) fn invalid_state(from: ServiceState, command: Command) -> Self {
        EngineError::InvalidState {
            from,
            to: command.target_state_name(),
        }
    }
}

/// The outcome delivered on a command's response sink: `Ok(())` on success, or the reason it
/// did not succeed.
pub type CommandOutcome = Result<(), EngineError>;

/// A command together with the optional sink its outcome should be delivered to. The sender may
/// drop the receiving end without consequence to the engine (§5): `Sender::send` failing is a
/// silent, non-fatal discard.
pub struct Submission {
    pub command: Command,
    pub response: Option<Sender<CommandOutcome>>,
}

impl Submission {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            response: None,
        }
    }

    pub fn with_response(command: Command, response: Sender<CommandOutcome>) -> Self {
        Self {
            command,
            response: Some(response),
        }
    }

    /// Resolves the response sink, if any, discarding send failures (an abandoned receiver).
    pub(crate) fn resolve(self, outcome: CommandOutcome) {
        if let Some(response) = self.response {
            let _ = response.send(outcome);
        }
    }
}
