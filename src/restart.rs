//! Auto-restart policy (§4.1): on an unexpected `Running → Exited`, the engine either relaunches
//! or gives up, purely as a function of a bounded retry counter. Unlike some restart policies,
//! no backoff delay is introduced between attempts: the spec's bound is a *count*
//! (`max_retries`), not a rate, and scenario 3 in §8 expects the three attempts to happen
//! back-to-back.

/// Decides whether another automatic restart is permitted, given the spec's policy and the
/// number of consecutive restarts already performed since the last confirmed `Running`.
pub fn should_restart(restart_on_exit: bool, retries: u32, max_retries: u32) -> bool {
    restart_on_exit && retries < max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_when_restart_on_exit_is_false() {
        assert!(!should_restart(false, 0, 5));
    }

    #[test]
    fn allows_restarts_under_the_cap() {
        assert!(should_restart(true, 0, 2));
        assert!(should_restart(true, 1, 2));
    }

    #[test]
    fn stops_once_the_cap_is_reached() {
        assert!(!should_restart(true, 2, 2));
    }
}
