//! The timer half of the graceful-stop algorithm (§4.1 step 3-4). Arming a kill timer spawns a
//! one-shot thread that sleeps for `stop_timeout` and then posts the generation it was armed
//! for; the engine loop decides, on receipt, whether that generation is still the one it is
//! trying to stop.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;

/// Spawns the single-shot kill timer. The returned `JoinHandle` is detached by callers that do
/// not need to wait on it; the thread exits on its own once it has posted (or failed to post,
/// if the engine has already shut the channel down).
pub fn arm_kill_timer(generation: u64, timeout: Duration, sink: Sender<u64>) -> JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(timeout);
        let _ = sink.send(generation);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn fires_after_the_configured_timeout() {
        let (tx, rx) = unbounded();
        let start = std::time::Instant::now();
        arm_kill_timer(7, Duration::from_millis(50), tx);
        let generation = rx.recv().unwrap();
        assert_eq!(generation, 7);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn tolerates_a_dropped_receiver() {
        let (tx, rx) = unbounded::<u64>();
        drop(rx);
        let handle = arm_kill_timer(1, Duration::from_millis(10), tx);
        handle.join().unwrap();
    }
}
