//! Shard Client: thin async I/O abstraction over one kv-shard.

mod shard_client;

pub use shard_client::{ShardClient, ShardEvent};
