pub mod command;
pub mod state;
pub mod supervisor;

pub use command::{Command, CommandOutcome, EngineError, Submission};
pub use state::{LifecycleEvent, ServiceState};
pub use supervisor::{spawn, ServiceEngine, ServiceEngineHandle};
