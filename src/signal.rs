//! POSIX signal name lookup for the subset of signals a service spec may name as its
//! `stop_signal`.

use nix::sys::signal::Signal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unrecognised signal name: `{0}`")]
pub struct UnknownSignalError(pub String);

const ACCEPTED: &[Signal] = &[
    Signal::SIGABRT,
    Signal::SIGALRM,
    Signal::SIGBUS,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGFPE,
    Signal::SIGHUP,
    Signal::SIGILL,
    Signal::SIGINT,
    Signal::SIGKILL,
    Signal::SIGPIPE,
    Signal::SIGPOLL,
    Signal::SIGPROF,
    Signal::SIGQUIT,
    Signal::SIGSEGV,
    Signal::SIGSTOP,
    Signal::SIGSYS,
    Signal::SIGTERM,
    Signal::SIGTRAP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGURG,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGVTALRM,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
];

/// Parses a signal name (e.g. `"SIGTERM"`, `"term"`, `" Term "`) into a [`Signal`].
/// Lookup is case-insensitive after trimming; the leading `SIG` is optional.
pub fn parse_signal(name: &str) -> Result<Signal, UnknownSignalError> {
    let trimmed = name.trim().to_ascii_uppercase();
    let canonical = if trimmed.starts_with("SIG") {
        trimmed
    } else {
        format!("SIG{trimmed}")
    };

    ACCEPTED
        .iter()
        .copied()
        .find(|sig| sig.as_str() == canonical)
        .ok_or_else(|| UnknownSignalError(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_name() {
        assert_eq!(parse_signal("SIGTERM").unwrap(), Signal::SIGTERM);
    }

    #[test]
    fn parses_case_insensitive_without_prefix() {
        assert_eq!(parse_signal("term").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("Hup").unwrap(), Signal::SIGHUP);
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(parse_signal("  sigint  ").unwrap(), Signal::SIGINT);
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(
            parse_signal("SIGBOGUS").unwrap_err(),
            UnknownSignalError("SIGBOGUS".to_string())
        );
    }
}
