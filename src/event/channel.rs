use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendError, Sender};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventPublisherError {
    #[error("event channel is disconnected, no consumer is listening")]
    Disconnected,
}

/// The sending half of an event channel. Cheap to clone; every clone shares the same
/// underlying queue, so cloning is how multiple producers are obtained.
#[derive(Debug)]
pub struct EventPublisher<E>(Sender<E>);

impl<E> EventPublisher<E> {
    /// Sends `event`, blocking if the channel is bounded and full.
    pub fn publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.0
            .send(event)
            .map_err(|_: SendError<E>| EventPublisherError::Disconnected)
    }

    /// Sends `event` without blocking; used where a stalled consumer must not stall the caller.
    pub fn try_publish(&self, event: E) -> Result<(), EventPublisherError> {
        self.0
            .try_send(event)
            .map_err(|_| EventPublisherError::Disconnected)
    }
}

impl<E> Clone for EventPublisher<E> {
    fn clone(&self) -> Self {
        EventPublisher(self.0.clone())
    }
}

/// The receiving half of an event channel.
#[derive(Debug)]
pub struct EventConsumer<E>(Receiver<E>);

impl<E> EventConsumer<E> {
    pub fn recv(&self) -> Result<E, EventPublisherError> {
        self.0.recv().map_err(|_| EventPublisherError::Disconnected)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<E>, EventPublisherError> {
        match self.0.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EventPublisherError::Disconnected),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        self.0.iter()
    }
}

impl<E> AsRef<Receiver<E>> for EventConsumer<E> {
    fn as_ref(&self) -> &Receiver<E> {
        &self.0
    }
}

/// Builds an unbounded publisher/consumer pair.
pub fn pub_sub<E>() -> (EventPublisher<E>, EventConsumer<E>) {
    let (tx, rx) = channel::unbounded();
    (EventPublisher(tx), EventConsumer(rx))
}

/// Builds a bounded publisher/consumer pair, used where backpressure must propagate to the
/// producer rather than grow memory without bound.
pub fn pub_sub_bounded<E>(capacity: usize) -> (EventPublisher<E>, EventConsumer<E>) {
    let (tx, rx) = channel::bounded(capacity);
    (EventPublisher(tx), EventConsumer(rx))
}
