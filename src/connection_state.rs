//! Process-wide connection-state registry.
//!
//! Every kv-shard or query-engine RPC failure/recovery updates a slot keyed
//! by `(role, shard address)`. Modeled on `opserver.py`'s
//! `ConnectionState.update(conn_type=..., name=..., status=..., server_addrs=...)`
//! calls sprinkled through the query and UVE paths; generalized here into an
//! explicit process-scoped service rather than module-level globals.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionType {
    RedisUve,
    RedisQuery,
    UvePartitions,
    Discovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Up,
    Down,
    Init,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSlot {
    pub conn_type: ConnectionType,
    pub name: String,
    pub status: ConnectionStatus,
    pub message: Option<String>,
    pub server_addrs: Vec<String>,
    pub updated_at_usec: u64,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    slots: DashMap<(ConnectionType, String), ConnectionSlot>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update(
        &self,
        conn_type: ConnectionType,
        name: &str,
        status: ConnectionStatus,
        message: Option<String>,
        server_addrs: Vec<String>,
    ) {
        let key = (conn_type, name.to_string());
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        self.slots.insert(
            key,
            ConnectionSlot {
                conn_type,
                name: name.to_string(),
                status,
                message,
                server_addrs,
                updated_at_usec: now,
            },
        );
    }

    pub fn snapshot(&self) -> Vec<ConnectionSlot> {
        self.slots.iter().map(|e| e.value().clone()).collect()
    }

    pub fn is_down(&self, conn_type: ConnectionType, name: &str) -> bool {
        self.slots
            .get(&(conn_type, name.to_string()))
            .map(|s| s.status == ConnectionStatus::Down)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transitions_per_role_and_address() {
        let registry = ConnectionRegistry::new();
        registry.update(
            ConnectionType::RedisQuery,
            "Query",
            ConnectionStatus::Down,
            Some("timeout".into()),
            vec!["127.0.0.1:6379".into()],
        );
        assert!(registry.is_down(ConnectionType::RedisQuery, "Query"));

        registry.update(
            ConnectionType::RedisQuery,
            "Query",
            ConnectionStatus::Up,
            None,
            vec!["127.0.0.1:6379".into()],
        );
        assert!(!registry.is_down(ConnectionType::RedisQuery, "Query"));
    }
}
