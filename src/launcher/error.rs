use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to open {what} stream: {source}")]
    StreamOpen {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("process was not started")]
    NotStarted,
    #[error("signal delivery failed: {0}")]
    Signal(#[source] nix::Error),
    #[error("io error waiting for process: {0}")]
    Wait(#[source] std::io::Error),
}
