pub mod error;
pub mod process;
pub mod terminator;

pub use error::LaunchError;
pub use process::{ChildHandle, OsChildHandle, OsProcessLauncher, ProcessLauncher};
pub use terminator::arm_kill_timer;

#[cfg(test)]
pub use process::{MockChildHandle, MockProcessLauncher};
