//! Queue module: retry policy and the in-memory queue implementation.

mod memory;
mod retry;

pub use memory::{InMemoryQueue, InMemoryQueueFactory};
pub use retry::RetryPolicy;
