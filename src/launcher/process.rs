//! Process Launcher (§4.2): fork/exec with configured argv, working directory, environment,
//! and stdout/stderr redirection, following the order of operations the spec calls out as
//! critical for the no-leak guarantee.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
#[cfg(test)]
use mockall::automock;

use crate::launcher::error::LaunchError;
use crate::spec::{ServiceSpec, StreamDest};

/// A spawned child, abstracted so the engine can be tested without spawning real processes.
#[cfg_attr(test, automock)]
pub trait ChildHandle: Send {
    fn pid(&self) -> u32;
    fn signal(&self, sig: Signal) -> Result<(), LaunchError>;
    fn try_wait(&mut self) -> Result<Option<ExitStatus>, LaunchError>;
    fn wait(&mut self) -> Result<ExitStatus, LaunchError>;
}

/// Launches a [`ServiceSpec`]'s command, abstracted so the engine can be tested against a
/// mock rather than real processes. Returns a boxed handle rather than an associated type so
/// the engine can hold a single `Arc<dyn ProcessLauncher>` regardless of which launcher backs it.
#[cfg_attr(test, automock)]
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &ServiceSpec) -> Result<Box<dyn ChildHandle>, LaunchError>;
}

/// A stream destination resolved to an open (or null, or piped) file, kept distinct from a
/// `Stdio` until the merge decision for stderr has been made, so a file can still be cloned.
enum OpenedStream {
    Null,
    File(File),
    /// Resolved from [`StreamDest::Log`]: piped back to the supervisor to be relayed line by
    /// line through the `log` crate once the child has been spawned.
    Piped,
}

impl OpenedStream {
    fn try_clone(&self) -> io::Result<OpenedStream> {
        match self {
            OpenedStream::Null => Ok(OpenedStream::Null),
            OpenedStream::File(file) => Ok(OpenedStream::File(file.try_clone()?)),
            // Merging a `Log` stdout into stderr is rejected at validation time
            // (`ValidationError::LogMergeUnsupported`); reached only if that check was bypassed,
            // in which case each stream still gets its own independent pipe rather than a panic.
            OpenedStream::Piped => Ok(OpenedStream::Piped),
        }
    }
}

impl From<OpenedStream> for Stdio {
    fn from(stream: OpenedStream) -> Self {
        match stream {
            OpenedStream::Null => Stdio::null(),
            OpenedStream::File(file) => Stdio::from(file),
            OpenedStream::Piped => Stdio::piped(),
        }
    }
}

fn open_dest(dest: &StreamDest, what: &'static str) -> Result<OpenedStream, LaunchError> {
    match dest {
        StreamDest::Null => Ok(OpenedStream::Null),
        StreamDest::Log => Ok(OpenedStream::Piped),
        StreamDest::File(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .write(true)
            .open(path)
            .map(OpenedStream::File)
            .map_err(|source| LaunchError::StreamOpen { what, source }),
        StreamDest::MergeWithStdout => {
            unreachable!("stderr merge sentinel is resolved by the caller, not opened directly")
        }
    }
}

#[derive(Clone, Copy)]
enum RelayStream {
    Stdout,
    Stderr,
}

/// Relays a piped child stream line by line through the `log` crate, tagging each line with the
/// service name as a key-value field, mirroring the teacher's own stdout/stderr event-logging
/// split (debug for stdout, error for stderr).
fn spawn_log_relay(service: String, which: RelayStream, pipe: impl Read + Send + 'static) {
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines().map_while(Result::ok) {
            match which {
                RelayStream::Stdout => log::debug!(service = service.as_str(); "{}", line),
                RelayStream::Stderr => log::error!(service = service.as_str(); "{}", line),
            }
        }
    });
}

/// Launches real OS processes via [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcessLauncher;

impl ProcessLauncher for OsProcessLauncher {
    fn launch(&self, spec: &ServiceSpec) -> Result<Box<dyn ChildHandle>, LaunchError> {
        // 1. stdout
        let stdout_logged = spec.stdout_dest == StreamDest::Log;
        let stdout = open_dest(&spec.stdout_dest, "stdout")?;

        // 2. stderr, including the STDOUT-merge sentinel
        let stderr_logged = spec.stderr_dest == StreamDest::Log;
        let stderr = if spec.stderr_dest == StreamDest::MergeWithStdout {
            stdout
                .try_clone()
                .map_err(|source| LaunchError::StreamOpen { what: "stderr", source })?
        } else {
            // 3. on stderr open failure, stdout (a distinct fd here) is dropped, closing it.
            open_dest(&spec.stderr_dest, "stderr")?
        };

        // 4. assemble the spawn request: null stdin, both streams attached, env replaced wholesale.
        let mut command = Command::new(&spec.command[0]);
        command
            .args(&spec.command[1..])
            .current_dir(&spec.working_directory)
            .env_clear()
            .envs(spec.environment.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // 5. on spawn failure, the Stdio values constructed above own their file descriptors
        // and close them on drop here, whether or not stdout == stderr.
        let mut child = command.spawn().map_err(LaunchError::Spawn)?;

        // 6. ownership of the opened streams has transferred to the child; a `Log`-destined
        // stream is taken back out as a pipe and handed to its own relay thread.
        if stdout_logged {
            if let Some(pipe) = child.stdout.take() {
                spawn_log_relay(spec.name.clone(), RelayStream::Stdout, pipe);
            }
        }
        if stderr_logged {
            if let Some(pipe) = child.stderr.take() {
                spawn_log_relay(spec.name.clone(), RelayStream::Stderr, pipe);
            }
        }

        Ok(Box::new(OsChildHandle { child }))
    }
}

pub struct OsChildHandle {
    child: Child,
}

impl ChildHandle for OsChildHandle {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn signal(&self, sig: Signal) -> Result<(), LaunchError> {
        signal::kill(Pid::from_raw(self.pid() as i32), sig).map_err(LaunchError::Signal)
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>, LaunchError> {
        self.child.try_wait().map_err(LaunchError::Wait)
    }

    fn wait(&mut self) -> Result<ExitStatus, LaunchError> {
        self.child.wait().map_err(LaunchError::Wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    fn spec_with(command: Vec<&str>) -> ServiceSpec {
        ServiceSpec::new("t", command.into_iter().map(str::to_string).collect())
    }

    #[test]
    fn launches_and_waits_for_exit() {
        let spec = spec_with(vec!["/bin/true"]);
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        let status = handle.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn false_exits_nonzero() {
        let spec = spec_with(vec!["/bin/false"]);
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        let status = handle.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn redirects_stdout_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.log");
        let spec = spec_with(vec!["/bin/sh", "-c", "echo hello"])
            .with_stdout_dest(StreamDest::File(out_path.clone()));
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        handle.wait().unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[test]
    fn merges_stderr_into_stdout_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("combined.log");
        let spec = spec_with(vec!["/bin/sh", "-c", "echo out; echo err 1>&2"])
            .with_stdout_dest(StreamDest::File(out_path.clone()))
            .with_stderr_dest(StreamDest::MergeWithStdout);
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        handle.wait().unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[test]
    fn log_dest_drains_output_without_deadlocking() {
        // A stdout destination of `Log` is relayed off a pipe by a background thread; if that
        // thread were never spawned, a child producing enough output to fill the pipe buffer
        // would block forever on write() and this test would hang rather than complete.
        let spec = spec_with(vec!["/bin/sh", "-c", "i=0; while [ $i -lt 5000 ]; do echo line$i; i=$((i+1)); done"])
            .with_stdout_dest(StreamDest::Log);
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        let status = handle.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn missing_executable_surfaces_spawn_error() {
        let spec = spec_with(vec!["/no/such/executable"]);
        let err = OsProcessLauncher.launch(&spec).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn(_)));
    }

    #[test]
    fn can_signal_a_running_child() {
        let spec = spec_with(vec!["/bin/sleep", "30"]);
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        handle.signal(Signal::SIGTERM).unwrap();
        let status = handle.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }

    #[test]
    fn try_wait_reports_none_for_a_still_running_child() {
        let spec = spec_with(vec!["/bin/sleep", "30"]);
        let mut handle = OsProcessLauncher.launch(&spec).unwrap();
        assert!(handle.try_wait().unwrap().is_none());
        handle.signal(Signal::SIGKILL).unwrap();
        handle.wait().unwrap();
    }
}
