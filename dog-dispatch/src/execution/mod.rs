pub mod retry;
pub mod shard;

pub use retry::{RetryPolicy, RetryDecision};
pub use shard::{QueueShard, CurrentTask};
