//! Durable AMQP work queues and the per-queue token bucket rate limiter
//! (§4.2, §4.3).

pub mod error;
pub mod queue;
pub mod rate;

pub use error::{QueueError, Result};
pub use queue::{load_checkpoint, AckHandle, Producer, WorkConsumer};
pub use rate::TokenBucket;
