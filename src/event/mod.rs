pub mod channel;

pub use channel::{pub_sub, pub_sub_bounded, EventConsumer, EventPublisher, EventPublisherError};
