//! UVE Streamer.
//!
//! One long-lived task per partition, supervised so that an `owner-changed`
//! event tears down the old subscription, clears that partition's
//! contributions from the cache, and re-establishes against the new owner,
//! clearing strictly before any new-owner ingestion.

use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection_state::{ConnectionRegistry, ConnectionStatus, ConnectionType};
use crate::kv::ShardClient;
use crate::partition_map::{OwnerChanged, PartitionId, PartitionMap, PartitionOwner};
use crate::uve::cache::{ProducerKey, UveCache, UveIdent};

/// Wire shape of one change event published by a partition owner. The
/// owner/producer protocol itself is an external collaborator;
/// this is the minimal envelope C3 needs to ingest `add`/`mod`/`del`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum UveEventWire {
    Add {
        table: String,
        uve_key: String,
        producer: ProducerKey,
        attr: String,
        value: serde_json::Value,
    },
    Mod {
        table: String,
        uve_key: String,
        producer: ProducerKey,
        attr: String,
        value: serde_json::Value,
    },
    Del {
        table: String,
        uve_key: String,
        producer: ProducerKey,
        attr: Option<String>,
    },
}

pub struct StreamerSupervisor {
    cache: Arc<UveCache>,
    partition_map: Arc<PartitionMap>,
    registry: Arc<ConnectionRegistry>,
    redis_password: Option<String>,
    tasks: DashMap<PartitionId, JoinHandle<()>>,
}

impl StreamerSupervisor {
    pub fn new(cache: Arc<UveCache>, partition_map: Arc<PartitionMap>, registry: Arc<ConnectionRegistry>, redis_password: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            partition_map,
            registry,
            redis_password,
            tasks: DashMap::new(),
        })
    }

    /// Drives the supervisor off a `PartitionMap`'s `OwnerChanged` event
    /// stream until the channel closes (shutdown).
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<OwnerChanged>) {
        while let Some(event) = events.recv().await {
            self.handle_owner_changed(event).await;
        }
    }

    async fn handle_owner_changed(self: &Arc<Self>, event: OwnerChanged) {
        if let Some((_, handle)) = self.tasks.remove(&event.partition) {
            handle.abort();
        }
        // Clearing must precede any new-owner ingestion.
        self.cache.clear_partition(event.partition);

        let supervisor = Arc::clone(self);
        let partition = event.partition;
        let owner = event.new;
        let handle = tokio::spawn(async move {
            supervisor.run_partition(partition, owner).await;
        });
        self.tasks.insert(partition, handle);
    }

    async fn run_partition(self: Arc<Self>, partition: PartitionId, owner: PartitionOwner) {
        let mut backoff = super::backoff::ReconnectBackoff::default();
        loop {
            // Abandon this loop once the partition map no longer agrees this
            // is the owner (a newer owner-changed event already respawned us).
            if self.partition_map.owner(partition).as_ref() != Some(&owner) {
                return;
            }

            match self.stream_from_owner(partition, &owner).await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    self.registry.update(
                        ConnectionType::RedisUve,
                        "UVE",
                        ConnectionStatus::Down,
                        Some(e.to_string()),
                        vec![format!("{}:{}", owner.ip, owner.port)],
                    );
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }

    async fn stream_from_owner(&self, partition: PartitionId, owner: &PartitionOwner) -> crate::error::Result<()> {
        let addr = format!("{}:{}", owner.ip, owner.port);
        let client = ShardClient::connect(
            &addr,
            ConnectionType::RedisUve,
            "UVE",
            self.redis_password.as_deref(),
            Arc::clone(&self.registry),
        )
        .await?;

        let channel = format!("UVE-PARTITION-{partition}");
        let mut events = client.subscribe(&channel).await?;

        while let Some(event) = events.recv().await {
            if self.partition_map.owner(partition).as_ref() != Some(owner) {
                // Owner changed mid-stream; supervisor will tear us down.
                return Ok(());
            }
            self.apply_event(partition, &event.payload);
        }
        Ok(())
    }

    fn apply_event(&self, partition: PartitionId, payload: &str) {
        let parsed: Result<UveEventWire, _> = serde_json::from_str(payload);
        let Ok(event) = parsed else {
            tracing::warn!(partition, "discarding malformed UVE event");
            return;
        };
        match event {
            UveEventWire::Add { table, uve_key, producer, attr, value }
            | UveEventWire::Mod { table, uve_key, producer, attr, value } => {
                self.cache.upsert(partition, UveIdent { table, key: uve_key }, producer, attr, value);
            }
            UveEventWire::Del { table, uve_key, producer, attr } => {
                let ident = UveIdent { table, key: uve_key };
                self.cache.remove(partition, &ident, &producer, attr.as_deref());
            }
        }
    }
}

/// A standalone single-partition streamer for ad hoc consumers, e.g. the SSE
/// endpoint's per-request live feed, which needs its own output
/// channel rather than feeding C4 directly.
pub async fn tail_partition_to_channel(
    owner: PartitionOwner,
    partition: PartitionId,
    redis_password: Option<String>,
    registry: Arc<ConnectionRegistry>,
    out: mpsc::Sender<serde_json::Value>,
) -> crate::error::Result<()> {
    let addr = format!("{}:{}", owner.ip, owner.port);
    let client = ShardClient::connect(&addr, ConnectionType::RedisUve, "UVE-stream", redis_password.as_deref(), registry).await?;
    let channel = format!("UVE-PARTITION-{partition}");
    let mut events = client.subscribe(&channel).await?;
    while let Some(event) = events.recv().await {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&event.payload) {
            if out.send(value).await.is_err() {
                break;
            }
        }
    }
    Ok(())
}
