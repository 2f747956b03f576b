use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

/// One of the five states a [`crate::engine::ServiceEngine`] can be in (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Exited,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Stopped => "Stopped",
            ServiceState::Starting => "Starting",
            ServiceState::Running => "Running",
            ServiceState::Stopping => "Stopping",
            ServiceState::Exited => "Exited",
        };
        f.write_str(name)
    }
}

/// A single state transition, emitted by the engine's run loop in the order the transitions
/// actually occurred. Serializable so a publisher collaborator (§2 component E) can forward it
/// as JSON without a bespoke wire format.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub service_name: String,
    pub state: ServiceState,
    pub timestamp: SystemTime,
}

impl LifecycleEvent {
    pub fn new(service_name: impl Into<String>, state: ServiceState) -> Self {
        Self {
            service_name: service_name.into(),
            state,
            timestamp: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_event_serializes_to_json() {
        let event = LifecycleEvent::new("web", ServiceState::Running);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"service_name\":\"web\""));
        assert!(json.contains("\"state\":\"Running\""));
    }

    #[test]
    fn display_matches_serialized_variant_name() {
        for state in [
            ServiceState::Stopped,
            ServiceState::Starting,
            ServiceState::Running,
            ServiceState::Stopping,
            ServiceState::Exited,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
