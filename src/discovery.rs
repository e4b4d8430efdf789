//! Discovery polling feeding the shard client's shard list and the
//! partition map.
//!
//! Mirrors `opserver.py`'s `ServicePoller`-driven `disc_cb`
//! (collector list) and `disc_agp` (partition ownership) callbacks: a
//! periodic poll against a discovery service, reduced here to an HTTP GET
//! against `disc_server_ip:disc_server_port` returning a JSON array of
//! service entries. The discovery service itself is an external
//! collaborator; this module owns only the polling loop and the
//! reduction into `PartitionMap::apply_snapshot`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::connection_state::{ConnectionRegistry, ConnectionStatus, ConnectionType};
use crate::partition_map::{PartitionAnnouncement, PartitionMap, PartitionOwner};

const COLLECTOR_SERVICE: &str = "Collector";
const ALARM_PARTITION_SERVICE: &str = "AlarmGenerator-Partitions";
const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct CollectorEntry {
    #[serde(rename = "ip-address")]
    ip_address: String,
}

#[derive(Debug, Deserialize)]
struct PartitionEntry {
    #[serde(rename = "instance-id")]
    instance_id: String,
    #[serde(rename = "ip-address")]
    ip_address: String,
    #[serde(rename = "acq-time")]
    acq_time: i64,
    port: u16,
    partition: u32,
}

pub struct DiscoveryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DiscoveryClient {
    pub fn new(server_ip: &str, server_port: u16) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("http://{server_ip}:{server_port}"),
        }
    }

    async fn poll(&self, service: &str) -> reqwest::Result<Vec<Value>> {
        self.http
            .get(format!("{}/services/{service}", self.base_url))
            .send()
            .await?
            .json()
            .await
    }
}

/// Periodically polls the collector list, feeding C1's set of known
/// kv-shards. The shard list itself currently only feeds
/// the alarm/module column-values scan (§4.6); the partition stream is
/// driven separately by `poll_partitions`.
pub async fn poll_collectors(client: DiscoveryClient, config: Arc<Config>, registry: Arc<ConnectionRegistry>, shards: Arc<tokio::sync::RwLock<Vec<String>>>) {
    loop {
        match client.poll(COLLECTOR_SERVICE).await {
            Ok(entries) => {
                let mut addrs = Vec::with_capacity(entries.len());
                for entry in entries {
                    if let Ok(parsed) = serde_json::from_value::<CollectorEntry>(entry) {
                        addrs.push(format!("{}:{}", parsed.ip_address, config.redis_server_port));
                    }
                }
                registry.update(ConnectionType::Discovery, "Collector", ConnectionStatus::Up, None, addrs.clone());
                *shards.write().await = addrs;
            }
            Err(e) => {
                registry.update(ConnectionType::Discovery, "Collector", ConnectionStatus::Down, Some(e.to_string()), vec![]);
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Periodically polls partition ownership announcements and reduces them
/// into a `PartitionMap` snapshot. Conflict resolution
/// (greatest `acq_time` wins) happens inside `PartitionMap::apply_snapshot`;
/// this loop only has to reduce discovery's duplicate-per-reporter entries
/// down to one candidate per partition, same as the original's `new_agp`
/// dict-building loop.
pub async fn poll_partitions(client: DiscoveryClient, partition_map: Arc<PartitionMap>, registry: Arc<ConnectionRegistry>, total_partitions: u32) {
    loop {
        match client.poll(ALARM_PARTITION_SERVICE).await {
            Ok(entries) => {
                // `apply_snapshot` performs the greatest-acq_time-wins
                // reduction per partition itself; this loop just adapts the
                // wire shape.
                let announcements: Vec<PartitionAnnouncement> = entries
                    .into_iter()
                    .filter_map(|entry| serde_json::from_value::<PartitionEntry>(entry).ok())
                    .map(|parsed| PartitionAnnouncement {
                        partition: parsed.partition,
                        owner: PartitionOwner {
                            instance_id: parsed.instance_id,
                            ip: parsed.ip_address,
                            port: parsed.port,
                            acq_time: parsed.acq_time.max(0) as u64,
                        },
                    })
                    .collect();

                partition_map.apply_snapshot(announcements).await;

                let covered = partition_map.partitions_covered();
                let status = if covered == total_partitions { ConnectionStatus::Up } else { ConnectionStatus::Down };
                registry.update(
                    ConnectionType::UvePartitions,
                    "UVE-Aggregation",
                    status,
                    Some(format!("Partitions:{covered}")),
                    vec![],
                );
            }
            Err(e) => {
                registry.update(
                    ConnectionType::UvePartitions,
                    "UVE-Aggregation",
                    ConnectionStatus::Down,
                    Some(e.to_string()),
                    vec![],
                );
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
