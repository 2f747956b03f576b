//! The Service Engine (§4.1): a single-threaded state machine run on its own named OS thread,
//! serialising three asynchronous event sources — the command inbox, a worker's reports of
//! child liveness, and kill-timer firings — via `crossbeam_channel::select!`. The loop is the
//! sole mutator of `state`, `child_pid`, `retries`, `generation` and `pending`.

use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{select, Receiver, Sender};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::engine::command::{Command, CommandOutcome, EngineError, Submission};
use crate::engine::state::{LifecycleEvent, ServiceState};
use crate::event::EventPublisher;
use crate::hook::NoopHook;
use crate::launcher::{arm_kill_timer, ProcessLauncher};
use crate::restart::should_restart;
use crate::spec::ServiceSpec;

/// Reported by the launch-and-wait worker into the engine's internal "child transition" channel.
enum WorkerEvent {
    Running { generation: u64, pid: u32 },
    Exited { generation: u64, cause: ExitCause },
}

enum ExitCause {
    HookFailed(String),
    LaunchFailed(String),
    Status(ExitStatus),
}

impl ExitCause {
    fn into_engine_error(self) -> EngineError {
        match self {
            ExitCause::HookFailed(msg) => EngineError::LaunchFailed(msg),
            ExitCause::LaunchFailed(msg) => EngineError::LaunchFailed(msg),
            ExitCause::Status(status) => EngineError::ExitedBeforeRunning(status.to_string()),
        }
    }
}

/// Runs one launch attempt end to end: the pre-start hook, the launcher, an immediate
/// non-blocking liveness check (resolving whether a `Running` event is warranted at all for a
/// child that exits before the engine can observe it as alive), and finally the blocking wait.
fn run_attempt(
    spec: Arc<ServiceSpec>,
    launcher: Arc<dyn ProcessLauncher>,
    generation: u64,
    tx: Sender<WorkerEvent>,
) {
    let hook_result = match &spec.pre_start_hook {
        Some(hook) => hook.run(&spec, spec.pre_start_hook_context.as_ref()),
        None => NoopHook.run(&spec, spec.pre_start_hook_context.as_ref()),
    };
    if let Err(err) = hook_result {
        let _ = tx.send(WorkerEvent::Exited {
            generation,
            cause: ExitCause::HookFailed(err.to_string()),
        });
        return;
    }

    let mut handle = match launcher.launch(&spec) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(service = %spec.name, "error while launching supervisor process: {}", err);
            let _ = tx.send(WorkerEvent::Exited {
                generation,
                cause: ExitCause::LaunchFailed(err.to_string()),
            });
            return;
        }
    };

    let pid = handle.pid();
    match handle.try_wait() {
        Ok(Some(status)) => {
            let _ = tx.send(WorkerEvent::Exited {
                generation,
                cause: ExitCause::Status(status),
            });
            return;
        }
        Ok(None) => {}
        Err(err) => {
            let _ = tx.send(WorkerEvent::Exited {
                generation,
                cause: ExitCause::LaunchFailed(err.to_string()),
            });
            return;
        }
    }

    let _ = tx.send(WorkerEvent::Running { generation, pid });

    match handle.wait() {
        Ok(status) => {
            let _ = tx.send(WorkerEvent::Exited {
                generation,
                cause: ExitCause::Status(status),
            });
        }
        Err(err) => {
            let _ = tx.send(WorkerEvent::Exited {
                generation,
                cause: ExitCause::LaunchFailed(err.to_string()),
            });
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: ServiceState,
    pid: u32,
}

struct EngineLoop {
    spec: Arc<ServiceSpec>,
    launcher: Arc<dyn ProcessLauncher>,
    events: EventPublisher<LifecycleEvent>,
    snapshot: Arc<Mutex<Snapshot>>,

    state: ServiceState,
    child_pid: Option<u32>,
    generation: u64,
    retries: u32,
    pending: Option<Submission>,
    shutting_down: bool,
    restart_requested: bool,

    cmd_rx: Receiver<Submission>,
    worker_tx: Sender<WorkerEvent>,
    worker_rx: Receiver<WorkerEvent>,
    kill_tx: Sender<u64>,
    kill_rx: Receiver<u64>,
}

impl EngineLoop {
    fn run(mut self) {
        loop {
            select! {
                recv(self.cmd_rx) -> msg => match msg {
                    Ok(submission) => self.handle_submission(submission),
                    Err(_) => return,
                },
                recv(self.worker_rx) -> msg => {
                    if let Ok(event) = msg {
                        self.handle_worker_event(event);
                    }
                },
                recv(self.kill_rx) -> msg => {
                    if let Ok(generation) = msg {
                        self.handle_kill_timer(generation);
                    }
                },
            }

            if self.is_done() {
                self.finish();
                return;
            }
        }
    }

    fn is_done(&self) -> bool {
        self.shutting_down && matches!(self.state, ServiceState::Stopped | ServiceState::Exited)
    }

    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.resolve(Ok(()));
        }
    }

    fn set_state(&mut self, new_state: ServiceState) {
        self.state = new_state;
        {
            let mut snapshot = self.snapshot.lock().expect("engine snapshot lock poisoned");
            snapshot.state = new_state;
            snapshot.pid = self.child_pid.unwrap_or(0);
        }
        let _ = self
            .events
            .publish(LifecycleEvent::new(self.spec.name.clone(), new_state));
    }

    fn supersede_pending_with(&mut self, outcome: EngineError) {
        if let Some(old) = self.pending.take() {
            old.resolve(Err(outcome));
        }
    }

    fn begin_attempt(&mut self) {
        self.generation += 1;
        self.child_pid = None;
        self.set_state(ServiceState::Starting);

        let spec = self.spec.clone();
        let launcher = self.launcher.clone();
        let tx = self.worker_tx.clone();
        let generation = self.generation;
        thread::spawn(move || run_attempt(spec, launcher, generation, tx));
    }

    fn begin_graceful_stop(&mut self) {
        self.set_state(ServiceState::Stopping);
        if let Some(pid) = self.child_pid {
            let _ = signal::kill(Pid::from_raw(pid as i32), self.spec.stop_signal);
        }
        arm_kill_timer(self.generation, self.spec.stop_timeout, self.kill_tx.clone());
    }

    fn handle_submission(&mut self, submission: Submission) {
        if self.shutting_down {
            submission.resolve(Err(EngineError::ShuttingDown));
            return;
        }

        match submission.command {
            Command::Shutdown => self.handle_shutdown(submission),
            Command::Start => self.handle_start(submission),
            Command::Stop => self.handle_stop(submission),
            Command::Restart => self.handle_restart(submission),
        }
    }

    fn handle_start(&mut self, submission: Submission) {
        match self.state {
            ServiceState::Stopped | ServiceState::Exited => {
                self.supersede_pending_with(EngineError::Superseded);
                self.retries = 0;
                self.restart_requested = false;
                self.pending = Some(submission);
                self.begin_attempt();
            }
            other => submission.resolve(Err(EngineError::invalid_state(other, Command::Start))),
        }
    }

    fn handle_stop(&mut self, submission: Submission) {
        match self.state {
            ServiceState::Running => {
                self.supersede_pending_with(EngineError::Superseded);
                self.restart_requested = false;
                self.pending = Some(submission);
                self.begin_graceful_stop();
            }
            other => submission.resolve(Err(EngineError::invalid_state(other, Command::Stop))),
        }
    }

    fn handle_restart(&mut self, submission: Submission) {
        match self.state {
            ServiceState::Stopped | ServiceState::Exited => self.handle_start(submission),
            ServiceState::Running => {
                self.supersede_pending_with(EngineError::Superseded);
                self.restart_requested = true;
                self.pending = Some(submission);
                self.begin_graceful_stop();
            }
            other => submission.resolve(Err(EngineError::invalid_state(other, Command::Restart))),
        }
    }

    fn handle_shutdown(&mut self, submission: Submission) {
        self.supersede_pending_with(EngineError::ShuttingDown);
        self.shutting_down = true;
        self.restart_requested = false;
        self.pending = Some(submission);

        match self.state {
            ServiceState::Stopped | ServiceState::Exited => {
                // nothing running; `is_done` will catch this right after we return.
            }
            ServiceState::Running => self.begin_graceful_stop(),
            ServiceState::Stopping | ServiceState::Starting => {
                // an attempt or a stop is already in flight; its worker/kill event drives us
                // the rest of the way once it arrives.
            }
        }
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Running { generation, pid } => {
                if generation != self.generation {
                    return;
                }
                self.child_pid = Some(pid);
                self.retries = 0;
                self.set_state(ServiceState::Running);
                if self.shutting_down {
                    // a Shutdown arrived while this attempt was in flight; the child is now
                    // alive, so it still needs to be stopped before the loop can return.
                    self.begin_graceful_stop();
                } else {
                    self.resolve_pending_on_running();
                }
            }
            WorkerEvent::Exited { generation, cause } => {
                if generation != self.generation {
                    return;
                }
                self.child_pid = None;
                match self.state {
                    ServiceState::Starting => self.handle_exit_while_starting(cause),
                    ServiceState::Running => self.handle_exit_while_running(),
                    ServiceState::Stopping => self.handle_exit_while_stopping(),
                    ServiceState::Stopped | ServiceState::Exited => {}
                }
            }
        }
    }

    fn resolve_pending_on_running(&mut self) {
        if matches!(
            self.pending.as_ref().map(|p| p.command),
            Some(Command::Start) | Some(Command::Restart)
        ) {
            if let Some(pending) = self.pending.take() {
                pending.resolve(Ok(()));
            }
        }
    }

    fn resolve_pending_with_cause(&mut self, cause: ExitCause) {
        if matches!(
            self.pending.as_ref().map(|p| p.command),
            Some(Command::Start) | Some(Command::Restart)
        ) {
            if let Some(pending) = self.pending.take() {
                pending.resolve(Err(cause.into_engine_error()));
            }
        }
    }

    fn handle_exit_while_starting(&mut self, cause: ExitCause) {
        if self.shutting_down {
            self.set_state(ServiceState::Exited);
            self.resolve_pending_with_cause(cause);
            return;
        }
        if should_restart(self.spec.restart_on_exit, self.retries, self.spec.max_retries) {
            self.retries += 1;
            self.set_state(ServiceState::Exited);
            self.begin_attempt();
        } else {
            self.set_state(ServiceState::Exited);
            self.resolve_pending_with_cause(cause);
        }
    }

    fn handle_exit_while_running(&mut self) {
        if !self.shutting_down
            && should_restart(self.spec.restart_on_exit, self.retries, self.spec.max_retries)
        {
            self.retries += 1;
            self.set_state(ServiceState::Exited);
            self.begin_attempt();
        } else {
            self.set_state(ServiceState::Exited);
        }
    }

    fn handle_exit_while_stopping(&mut self) {
        self.set_state(ServiceState::Stopped);
        if self.restart_requested {
            self.restart_requested = false;
            self.retries = 0;
            self.begin_attempt();
        } else if matches!(self.pending.as_ref().map(|p| p.command), Some(Command::Stop)) {
            if let Some(pending) = self.pending.take() {
                pending.resolve(Ok(()));
            }
        }
    }

    fn handle_kill_timer(&mut self, generation: u64) {
        if generation != self.generation || self.state != ServiceState::Stopping {
            return;
        }
        if let Some(pid) = self.child_pid {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
}

/// Handle to a running [`ServiceEngine`]'s command inbox and observability snapshot. Cloning is
/// not provided: a single handle per engine is the intended shape, matching one inbox per
/// service (§5); administrative callers share a `&ServiceEngineHandle` instead.
pub struct ServiceEngineHandle {
    name: String,
    command: Vec<String>,
    cmd_tx: Sender<Submission>,
    snapshot: Arc<Mutex<Snapshot>>,
    join: Option<JoinHandle<()>>,
}

impl ServiceEngineHandle {
    /// Enqueues a command with no response sink; the outcome is only observable via `events()`.
    pub fn submit(&self, command: Command) {
        let _ = self.cmd_tx.send(Submission::new(command));
    }

    /// Enqueues a command, delivering its terminal outcome on `response`. Dropping `response`'s
    /// receiving end before the outcome arrives is tolerated (§5): the engine's send is a
    /// non-fatal discard.
    pub fn submit_with_response(&self, command: Command, response: Sender<CommandOutcome>) {
        let _ = self
            .cmd_tx
            .send(Submission::with_response(command, response));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn state(&self) -> ServiceState {
        self.snapshot.lock().expect("engine snapshot lock poisoned").state
    }

    /// `0` unless the engine is in `Running` or `Stopping`.
    pub fn pid(&self) -> u32 {
        self.snapshot.lock().expect("engine snapshot lock poisoned").pid
    }

    /// Blocks until the engine's run loop has returned, i.e. until a prior `Shutdown` has fully
    /// resolved. A no-op if already joined.
    pub fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_named_thread<F>(name: &str, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("failed to spawn engine thread")
}

/// Constructs a [`ServiceEngine`] for `spec` and starts its run loop on a dedicated named
/// thread. Returns the handle used to submit commands and query observability state, together
/// with the consumer half of its lifecycle-event stream.
pub fn spawn(
    spec: ServiceSpec,
    launcher: Arc<dyn ProcessLauncher>,
    events: EventPublisher<LifecycleEvent>,
) -> ServiceEngineHandle {
    let spec = Arc::new(spec);
    let name = spec.name.clone();
    let command = spec.command.clone();

    let (cmd_tx, cmd_rx) = crossbeam::channel::bounded(1);
    let (worker_tx, worker_rx) = crossbeam::channel::unbounded();
    let (kill_tx, kill_rx) = crossbeam::channel::unbounded();
    let snapshot = Arc::new(Mutex::new(Snapshot {
        state: ServiceState::Stopped,
        pid: 0,
    }));

    let engine_loop = EngineLoop {
        spec,
        launcher,
        events,
        snapshot: snapshot.clone(),
        state: ServiceState::Stopped,
        child_pid: None,
        generation: 0,
        retries: 0,
        pending: None,
        shutting_down: false,
        restart_requested: false,
        cmd_rx,
        worker_tx,
        worker_rx,
        kill_tx,
        kill_rx,
    };

    let join = spawn_named_thread(&format!("engine-{name}"), move || engine_loop.run());

    ServiceEngineHandle {
        name,
        command,
        cmd_tx,
        snapshot,
        join: Some(join),
    }
}

/// A marker type for documentation purposes: the engine itself has no standalone struct, since
/// its state lives entirely inside [`EngineLoop`] on the loop's own thread and is only ever
/// observed from outside through [`ServiceEngineHandle`].
pub type ServiceEngine = ServiceEngineHandle;
