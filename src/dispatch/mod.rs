pub mod amqp;
pub mod router;

pub use amqp::AmqpPublisher;
pub use router::{DispatchError, DispatchRouter, PublishError, Publisher};
