//! The immutable, validated description of a single managed service. Construction of a
//! [`ServiceSpec`] is the seam between the out-of-scope config loader and the engine: the
//! engine trusts that any `ServiceSpec` handed to it has already passed [`ServiceSpec::validate`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::hook::{HookContext, PreStartHook};
use crate::signal::{parse_signal, UnknownSignalError};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a child's stdout/stderr is redirected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDest {
    /// Discard (`/dev/null`).
    Null,
    /// Append to a file at this path.
    File(PathBuf),
    /// stderr only: merge with whatever stdout is writing to.
    MergeWithStdout,
    /// Relay line-by-line through the supervisor's own `log` output rather than a file, for
    /// services whose output should show up alongside the supervisor's own diagnostics.
    Log,
}

impl StreamDest {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == "/dev/null" {
            StreamDest::Null
        } else if trimmed.eq_ignore_ascii_case("stdout") {
            StreamDest::MergeWithStdout
        } else if trimmed.eq_ignore_ascii_case("log") {
            StreamDest::Log
        } else {
            StreamDest::File(PathBuf::from(trimmed))
        }
    }
}

/// A `NUMBER/PROTO` port declaration. Informational: the engine does not open or probe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub number: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A `{file, source}` template declaration, opaque to the engine, carried through to the
/// pre-start hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub file: PathBuf,
    pub source: PathBuf,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("command is invalid: {0:?}")]
    EmptyCommand(Vec<String>),
    #[error("name must not be empty")]
    EmptyName,
    #[error("stop-timeout must be >= 0")]
    NegativeStopTimeout,
    #[error("stop-signal is invalid: {0}")]
    InvalidStopSignal(#[from] UnknownSignalError),
    #[error("{what} must be /dev/null or a path whose parent directory exists: {path}")]
    UnwritableStreamDest { what: &'static str, path: String },
    #[error("port number is invalid: {0}/{1:?}")]
    InvalidPortNumber(u32, Protocol),
    #[error("stderr-dest cannot merge with a stdout-dest of log: read the two streams with independent relay threads instead")]
    LogMergeUnsupported,
}

/// Immutable description of a single managed service, produced by the (out-of-scope) config
/// loader and trusted by the engine thereafter.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub command: Vec<String>,
    pub working_directory: PathBuf,
    pub environment: HashMap<String, String>,
    pub stop_signal: Signal,
    pub stop_timeout: Duration,
    pub restart_on_exit: bool,
    pub max_retries: u32,
    pub stdout_dest: StreamDest,
    pub stderr_dest: StreamDest,
    pub ports: Vec<Port>,
    pub templates: Vec<Template>,
    pub pre_start_hook: Option<std::sync::Arc<dyn PreStartHook>>,
    /// Opaque payload handed back to `pre_start_hook` unchanged (§4.3/§6). Defaults to `()` for
    /// specs with no hook, or a hook that doesn't need one.
    pub pre_start_hook_context: std::sync::Arc<dyn HookContext>,
}

impl ServiceSpec {
    /// Starts building a spec with the field defaults from §3: `working_directory` defaults to
    /// the supervisor's own cwd, `stop_signal` to `SIGTERM`, `stop_timeout` to 5s, streams to
    /// `/dev/null`, no restart, no hook.
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            environment: HashMap::new(),
            stop_signal: Signal::SIGTERM,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            restart_on_exit: false,
            max_retries: 0,
            stdout_dest: StreamDest::Null,
            stderr_dest: StreamDest::Null,
            ports: Vec::new(),
            templates: Vec::new(),
            pre_start_hook: None,
            pre_start_hook_context: std::sync::Arc::new(()),
        }
    }

    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = dir;
        self
    }

    pub fn with_environment(mut self, env: HashMap<String, String>) -> Self {
        self.environment = env;
        self
    }

    pub fn with_stop_signal(mut self, sig: Signal) -> Self {
        self.stop_signal = sig;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_restart_on_exit(mut self, restart: bool, max_retries: u32) -> Self {
        self.restart_on_exit = restart;
        self.max_retries = max_retries;
        self
    }

    pub fn with_stdout_dest(mut self, dest: StreamDest) -> Self {
        self.stdout_dest = dest;
        self
    }

    pub fn with_stderr_dest(mut self, dest: StreamDest) -> Self {
        self.stderr_dest = dest;
        self
    }

    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    /// Registers `hook` and the opaque `context` it is invoked with. Specs that don't need a
    /// context can pass `Arc::new(())`.
    pub fn with_pre_start_hook(
        mut self,
        hook: std::sync::Arc<dyn PreStartHook>,
        context: std::sync::Arc<dyn HookContext>,
    ) -> Self {
        self.pre_start_hook = Some(hook);
        self.pre_start_hook_context = context;
        self
    }

    /// Parses a signal by POSIX name and applies it, collecting any parse failure into the
    /// returned error rather than panicking, matching the collect-all-errors style of
    /// [`ServiceSpec::validate`].
    pub fn stop_signal_named(name: &str) -> Result<Signal, ValidationError> {
        parse_signal(name).map_err(ValidationError::from)
    }

    /// Validates semantic constraints the collaborator's parser cannot express structurally.
    /// Collects every violation rather than stopping at the first, mirroring the config
    /// loader's own `Validate() []error` convention.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
        }

        if self.command.is_empty() || self.command[0].trim().is_empty() {
            errors.push(ValidationError::EmptyCommand(self.command.clone()));
        }

        // `Duration` cannot be negative, so the only residual check from the source's
        // `stop-timeout must be n >= 0` is structural and always holds; kept for documentation
        // of the invariant at the type that would otherwise need it.
        let _ = self.stop_timeout;

        Self::validate_stream_dest("stdout-dest", &self.stdout_dest, &mut errors);
        if self.stderr_dest == StreamDest::MergeWithStdout {
            if self.stdout_dest == StreamDest::Log {
                errors.push(ValidationError::LogMergeUnsupported);
            }
        } else {
            Self::validate_stream_dest("stderr-dest", &self.stderr_dest, &mut errors);
        }

        for port in &self.ports {
            if port.number == 0 {
                errors.push(ValidationError::InvalidPortNumber(0, port.protocol));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_stream_dest(what: &'static str, dest: &StreamDest, errors: &mut Vec<ValidationError>) {
        if let StreamDest::File(path) = dest {
            let writable = path
                .parent()
                .map(|parent| parent.as_os_str().is_empty() || parent.exists())
                .unwrap_or(true);
            if !writable {
                errors.push(ValidationError::UnwritableStreamDest {
                    what,
                    path: path.display().to_string(),
                });
            }
        }
    }
}
