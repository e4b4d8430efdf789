//! C3 (UVE Streamer) + C4 (UVE Cache).

pub mod backoff;
pub mod cache;
pub mod streamer;

pub use cache::{ProducerKey, UveCache, UveFilters, UveIdent};
pub use streamer::StreamerSupervisor;
