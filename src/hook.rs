//! Pre-start hook contract (§4.3): a synchronous side effect invoked immediately before the
//! launcher, on the engine's own thread. This is the extension point through which the
//! out-of-scope config-template collaborator injects rendered files into the filesystem before
//! the child observes them.

use std::fmt::Debug;
use thiserror::Error;

use crate::spec::ServiceSpec;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("pre-start hook failed: {0}")]
    Failed(String),
    #[error("io error during pre-start hook: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque, per-service payload registered alongside a hook and handed back to it unchanged.
/// The engine never inspects it; `as_any` exists only so a hook implementation can downcast
/// back to the concrete context type it expects.
pub trait HookContext: Debug + Send + Sync {
    fn as_any(&self) -> &dyn std::any::Any;
}

impl HookContext for () {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A side effect run synchronously inside `Starting`, before the launcher. If it returns `Err`,
/// the engine transitions `Starting → Exited` without ever creating a child, and the triggering
/// command's response sink receives the hook's error.
///
/// `context` is the opaque payload registered alongside the hook on the [`ServiceSpec`]
/// (`ServiceSpec::with_pre_start_hook`); the engine itself never inspects it, only threads it
/// through unchanged from spec to hook.
pub trait PreStartHook: Debug + Send + Sync {
    fn run(&self, spec: &ServiceSpec, context: &dyn HookContext) -> Result<(), HookError>;
}

/// The hook used by specs that declare none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl PreStartHook for NoopHook {
    fn run(&self, _spec: &ServiceSpec, _context: &dyn HookContext) -> Result<(), HookError> {
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A hook that always fails, used to exercise the §8 scenario 6 pre-start-hook-failure path.
    #[derive(Debug, Default)]
    pub struct FailingHook {
        pub message: String,
    }

    impl PreStartHook for FailingHook {
        fn run(&self, _spec: &ServiceSpec, _context: &dyn HookContext) -> Result<(), HookError> {
            Err(HookError::Failed(self.message.clone()))
        }
    }

    /// A hook that counts its invocations, used to assert it runs exactly once per launch.
    #[derive(Debug, Default)]
    pub struct CountingHook {
        pub calls: AtomicUsize,
    }

    impl PreStartHook for CountingHook {
        fn run(&self, _spec: &ServiceSpec, _context: &dyn HookContext) -> Result<(), HookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A hook that records the context it was handed, used to assert the registered context is
    /// the one actually threaded through by the engine.
    #[derive(Debug)]
    pub struct RecordingHook {
        pub seen: std::sync::Mutex<Option<String>>,
    }

    impl Default for RecordingHook {
        fn default() -> Self {
            Self {
                seen: std::sync::Mutex::new(None),
            }
        }
    }

    #[derive(Debug)]
    pub struct StringContext(pub String);

    impl HookContext for StringContext {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl PreStartHook for RecordingHook {
        fn run(&self, _spec: &ServiceSpec, context: &dyn HookContext) -> Result<(), HookError> {
            let context = context
                .as_any()
                .downcast_ref::<StringContext>()
                .expect("test always registers a StringContext");
            *self.seen.lock().unwrap() = Some(context.0.clone());
            Ok(())
        }
    }

    #[test]
    fn noop_hook_always_succeeds() {
        let spec = crate::spec::ServiceSpec::new("web", vec!["/bin/true".to_string()]);
        assert!(NoopHook.run(&spec, &()).is_ok());
    }

    #[test]
    fn failing_hook_reports_its_message() {
        let spec = crate::spec::ServiceSpec::new("web", vec!["/bin/true".to_string()]);
        let hook = FailingHook {
            message: "boom".to_string(),
        };
        let err = hook.run(&spec, &()).unwrap_err();
        assert_eq!(err.to_string(), "pre-start hook failed: boom");
    }

    #[test]
    fn hook_receives_the_context_registered_on_the_spec() {
        let spec = crate::spec::ServiceSpec::new("web", vec!["/bin/true".to_string()]);
        let hook = RecordingHook::default();
        hook.run(&spec, &StringContext("rendered-config-path".to_string()))
            .unwrap();
        assert_eq!(
            hook.seen.lock().unwrap().as_deref(),
            Some("rendered-config-path")
        );
    }
}
