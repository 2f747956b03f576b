//! Supervisor Aggregator (§4.4): owns one [`ServiceEngine`] per validated [`ServiceSpec`],
//! multiplexes their lifecycle events into a single outbound stream, and orchestrates an
//! orderly shutdown of every engine it owns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::bounded;
use thiserror::Error;

use crate::engine::{spawn, Command, EngineError, LifecycleEvent, ServiceEngineHandle, ServiceState};
use crate::event::{pub_sub_bounded, EventConsumer};
use crate::launcher::ProcessLauncher;
use crate::spec::{ServiceSpec, ValidationError};

/// Per-engine event buffer (§5): "a bounded buffer of 10 per engine is sufficient to absorb
/// bursts without amplifying stalls." The aggregator shares one channel across every engine
/// rather than merging N separate ones, since `crossbeam_channel` already supports multiple
/// producers, so the shared capacity scales with the number of engines it serves.
const EVENTS_PER_ENGINE: usize = 10;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("service spec {name:?} failed validation: {errors:?}")]
    InvalidSpec {
        name: String,
        errors: Vec<ValidationError>,
    },
    #[error("duplicate service name: {0:?}")]
    DuplicateName(String),
    #[error("no such service: {0:?}")]
    NoSuchService(String),
    #[error("command failed: {0}")]
    Command(#[from] EngineError),
    #[error("service {0:?} did not confirm shutdown before its response channel closed")]
    ShutdownNotConfirmed(String),
}

/// Owns every [`ServiceEngineHandle`] for a supervised set of services, plus the consumer half
/// of their shared lifecycle-event stream. Construction validates and spawns every spec; any
/// failure tears down the engines already spawned so no orphan threads are left running.
pub struct SupervisorAggregator {
    engines: HashMap<String, ServiceEngineHandle>,
    events: EventConsumer<LifecycleEvent>,
}

impl SupervisorAggregator {
    /// Validates and spawns an engine for each of `specs`, sharing `launcher` across all of
    /// them. On the first validation or duplicate-name failure, every engine already spawned is
    /// shut down before the error is returned.
    pub fn build(
        specs: Vec<ServiceSpec>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self, AggregatorError> {
        let (publisher, events) = pub_sub_bounded(EVENTS_PER_ENGINE * specs.len().max(1));
        let mut engines = HashMap::new();

        for spec in specs {
            if let Err(errors) = spec.validate() {
                Self::teardown(&mut engines);
                return Err(AggregatorError::InvalidSpec {
                    name: spec.name,
                    errors,
                });
            }
            if engines.contains_key(&spec.name) {
                Self::teardown(&mut engines);
                return Err(AggregatorError::DuplicateName(spec.name));
            }

            let name = spec.name.clone();
            let handle = spawn(spec, launcher.clone(), publisher.clone());
            engines.insert(name, handle);
        }

        Ok(Self { engines, events })
    }

    /// The consumer half of the merged lifecycle-event stream, ordered per service but with no
    /// ordering guarantee across distinct services (§5).
    pub fn events(&self) -> &EventConsumer<LifecycleEvent> {
        &self.events
    }

    /// Submits `command` to the named engine's inbox, awaiting its terminal outcome.
    pub fn submit(&self, name: &str, command: Command) -> Result<(), AggregatorError> {
        let engine = self
            .engines
            .get(name)
            .ok_or_else(|| AggregatorError::NoSuchService(name.to_string()))?;
        let (tx, rx) = bounded(1);
        engine.submit_with_response(command, tx);
        match rx.recv() {
            Ok(outcome) => outcome.map_err(AggregatorError::from),
            Err(_) => Err(AggregatorError::ShutdownNotConfirmed(name.to_string())),
        }
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.engines.get(name).map(|engine| engine.state())
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// Broadcasts `Shutdown` to every engine, waits for each to confirm, then joins its thread.
    /// Engines are shut down concurrently (the `Shutdown` submissions are fire-and-forget to
    /// every inbox before any response is awaited) so the total wait is the slowest single
    /// engine's graceful-stop timeout, not their sum.
    pub fn shutdown_all(&mut self) {
        let waiters: Vec<_> = self
            .engines
            .iter()
            .map(|(name, engine)| {
                let (tx, rx) = bounded(1);
                engine.submit_with_response(Command::Shutdown, tx);
                (name.clone(), rx)
            })
            .collect();

        for (name, rx) in waiters {
            if rx.recv_timeout(Duration::from_secs(30)).is_err() {
                tracing::warn!(service = %name, "shutdown did not confirm within the grace window");
            }
        }

        for engine in self.engines.values_mut() {
            engine.join();
        }
    }

    fn teardown(engines: &mut HashMap<String, ServiceEngineHandle>) {
        for engine in engines.values() {
            engine.submit(Command::Shutdown);
        }
        for engine in engines.values_mut() {
            engine.join();
        }
        engines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::OsProcessLauncher;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_one_engine_per_spec_and_reports_names() {
        let specs = vec![
            ServiceSpec::new("a", argv(&["/bin/true"])),
            ServiceSpec::new("b", argv(&["/bin/true"])),
        ];
        let aggregator = SupervisorAggregator::build(specs, Arc::new(OsProcessLauncher)).unwrap();
        let mut names: Vec<_> = aggregator.service_names().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rejects_duplicate_names_and_tears_down_prior_engines() {
        let specs = vec![
            ServiceSpec::new("dup", argv(&["/bin/true"])),
            ServiceSpec::new("dup", argv(&["/bin/true"])),
        ];
        let err = SupervisorAggregator::build(specs, Arc::new(OsProcessLauncher)).unwrap_err();
        assert!(matches!(err, AggregatorError::DuplicateName(name) if name == "dup"));
    }

    #[test]
    fn rejects_invalid_spec() {
        let specs = vec![ServiceSpec::new("bad", vec![])];
        let err = SupervisorAggregator::build(specs, Arc::new(OsProcessLauncher)).unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidSpec { .. }));
    }

    #[test]
    fn submit_to_unknown_service_is_reported() {
        let aggregator =
            SupervisorAggregator::build(Vec::new(), Arc::new(OsProcessLauncher)).unwrap();
        let err = aggregator.submit("ghost", Command::Start).unwrap_err();
        assert!(matches!(err, AggregatorError::NoSuchService(name) if name == "ghost"));
    }

    #[test]
    fn start_and_shutdown_all_drains_events_and_joins() {
        let specs = vec![ServiceSpec::new("sleeper", argv(&["/bin/sleep", "30"]))];
        let mut aggregator =
            SupervisorAggregator::build(specs, Arc::new(OsProcessLauncher)).unwrap();

        aggregator.submit("sleeper", Command::Start).unwrap();
        assert_eq!(aggregator.state("sleeper"), Some(ServiceState::Running));

        aggregator.shutdown_all();
        assert_eq!(aggregator.state("sleeper"), Some(ServiceState::Stopped));
    }
}
