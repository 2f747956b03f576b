pub mod aggregator;
pub mod engine;
pub mod event;
pub mod hook;
pub mod launcher;
pub mod logging;
pub mod restart;
pub mod signal;
pub mod spec;

pub use aggregator::{AggregatorError, SupervisorAggregator};
pub use engine::{Command, CommandOutcome, EngineError, LifecycleEvent, ServiceEngine, ServiceState};
pub use event::{EventConsumer, EventPublisher};
pub use hook::{HookContext, HookError, NoopHook, PreStartHook};
pub use launcher::{ChildHandle, LaunchError, OsProcessLauncher, ProcessLauncher};
pub use logging::{Logging, LoggingError};
pub use spec::{ServiceSpec, ValidationError};
