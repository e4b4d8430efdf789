//! Purge Coordinator.
//!
//! Claims a cluster-wide `DB_PURGE_STATUS` lock via "GET then SET-if-absent"
//! on the kv-fleet, runs the purge as a background task, and publishes a
//! structured completion event. A background watchdog triggers the same
//! path on its own schedule when a node's disk usage crosses the configured
//! threshold, mirroring `_auto_purge`.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::connection_state::{ConnectionRegistry, ConnectionType};
use crate::error::{OpError, Result};
use crate::kv::ShardClient;
use crate::query::generate_qid;

const PURGE_STATUS_KEY: &str = "DB_PURGE_STATUS";
const WATCHDOG_WARMUP: Duration = Duration::from_secs(10 * 60);
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct StartTimes {
    pub other: i64,
    pub flow: i64,
    pub stats: i64,
    pub msg: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PurgeCutoffs {
    pub other_cutoff: i64,
    pub flow_cutoff: i64,
    pub stats_cutoff: i64,
    pub msg_cutoff: i64,
}

/// A backing store that knows the per-class start times and can execute a
/// physical purge. The column-store driver itself is an external
/// collaborator; this crate only needs the shape it returns.
#[async_trait::async_trait]
pub trait PurgeBackend: Send + Sync {
    async fn start_times(&self) -> Result<StartTimes>;
    /// Deletes rows older than `cutoffs`; returns `(rows_deleted, details)`.
    /// A negative `rows_deleted` signals failure.
    async fn purge(&self, cutoffs: &PurgeCutoffs, purge_id: &str) -> Result<(i64, Value)>;
    async fn update_start_times(&self, cutoffs: &PurgeCutoffs) -> Result<()>;
    /// Per-node disk usage percentage, keyed by node name.
    async fn disk_usage(&self) -> Result<Vec<(String, u8)>>;
}

/// Percentage form: `cutoff_class = now - ((100-p)/100) * min(now - start, ttl_hours*1h)`
///. `purge_input` is `(0, 100]`.
pub fn cutoffs_from_percent(purge_input: f64, start: &StartTimes, config: &Config) -> PurgeCutoffs {
    let now = Utc::now().timestamp_micros();
    let hour_usec = |hours: i64| 60 * 60 * 1_000_000 * hours;

    let range = |start_time: i64, ttl_hours: i64| {
        (now - start_time).min(hour_usec(ttl_hours)) as f64
    };
    let scaled = |start_time: i64, ttl_hours: i64| {
        now - ((100.0 - purge_input) * range(start_time, ttl_hours) / 100.0) as i64
    };

    PurgeCutoffs {
        other_cutoff: scaled(start.other, config.analytics_data_ttl),
        flow_cutoff: scaled(start.flow, config.analytics_flow_ttl),
        stats_cutoff: scaled(start.stats, config.analytics_statistics_ttl),
        msg_cutoff: scaled(start.msg, config.analytics_config_audit_ttl),
    }
}

/// Absolute-time form: one cutoff applied uniformly to all four classes.
pub fn cutoffs_from_absolute(cutoff_usec: i64) -> PurgeCutoffs {
    PurgeCutoffs {
        other_cutoff: cutoff_usec,
        flow_cutoff: cutoff_usec,
        stats_cutoff: cutoff_usec,
        msg_cutoff: cutoff_usec,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeRequestOutcome {
    Started,
    AlreadyRunning,
    LockFailed,
}

pub struct PurgeCoordinator {
    config: Arc<Config>,
    backend: Arc<dyn PurgeBackend>,
    registry: Arc<ConnectionRegistry>,
}

impl PurgeCoordinator {
    pub fn new(config: Arc<Config>, backend: Arc<dyn PurgeBackend>, registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new(Self { config, backend, registry })
    }

    /// Per-class start times from the backing store, used by the
    /// percentage-purge REST path to compute cutoffs.
    pub async fn start_times(&self) -> Result<StartTimes> {
        self.backend.start_times().await
    }

    async fn lock_client(&self) -> Result<ShardClient> {
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

    /// `POST /analytics/operation/database-purge`.
    pub async fn request_purge(&self, originator_ip: Ipv4Addr, cutoffs: PurgeCutoffs) -> Result<(PurgeRequestOutcome, Value)> {
        let client = self.lock_client().await?;

        if let Some(raw) = client.get(PURGE_STATUS_KEY).await? {
            let status: Value = serde_json::from_str(&raw).unwrap_or(json!({}));
            return match status.get("status").and_then(Value::as_str) {
                Some("running") => Ok((PurgeRequestOutcome::AlreadyRunning, status)),
                Some("failed") => Err(OpError::EngineFailure { errno: crate::error::libc_errno::EBUSY, message: None }),
                _ => Ok((PurgeRequestOutcome::AlreadyRunning, status)),
            };
        }

        let purge_id = generate_qid(originator_ip);
        let lock_body = json!({ "status": "running", "purge_id": purge_id, "cutoffs": cutoffs });
        let claimed = client.set_nx(PURGE_STATUS_KEY, &lock_body.to_string()).await?;
        if !claimed {
            return Ok((PurgeRequestOutcome::LockFailed, json!({ "status": "failed" })));
        }

        let coordinator = self.clone_handles();
        let purge_id_task = purge_id.clone();
        tokio::spawn(async move {
            coordinator.run_purge(cutoffs, purge_id_task).await;
        });

        Ok((PurgeRequestOutcome::Started, json!({ "status": "started", "purge_id": purge_id })))
    }

    fn clone_handles(&self) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::clone(&self.config),
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Runs to completion: purge, release the lock, conditionally persist
    /// new start times, publish completion.
    async fn run_purge(&self, cutoffs: PurgeCutoffs, purge_id: String) {
        let request_time = Utc::now().timestamp_micros();
        tracing::info!(purge_id, "purge started");

        let outcome = self.backend.purge(&cutoffs, &purge_id).await;

        if let Ok(client) = self.lock_client().await {
            let _ = client.del(PURGE_STATUS_KEY).await;
        }

        let (rows_deleted, details) = match &outcome {
            Ok((rows, details)) => (*rows, details.clone()),
            Err(e) => (-1, json!({ "error": e.to_string() })),
        };

        if rows_deleted > 0 {
            if let Err(e) = self.backend.update_start_times(&cutoffs).await {
                tracing::warn!(purge_id, error = %e, "failed to persist new start times after purge");
            }
        }

        let duration = Utc::now().timestamp_micros() - request_time;
        let status = if rows_deleted < 0 { "failure" } else { "success" };
        tracing::info!(purge_id, status, rows_deleted, duration, "purge complete");

        if let Ok(client) = self.lock_client().await {
            let event = json!({
                "purge_id": purge_id,
                "status": status,
                "rows_deleted": rows_deleted,
                "duration": duration,
                "details": details,
            });
            let _ = client.publish("ANALYTICS-PURGE-COMPLETE", &event.to_string()).await;
        }
    }

    /// Background watchdog: 10-minute warm-up, then a 30-minute loop, skipping
    /// if a purge is already running.
    pub async fn run_watchdog(self: Arc<Self>) {
        if !self.config.auto_db_purge {
            return;
        }
        tokio::time::sleep(WATCHDOG_WARMUP).await;
        loop {
            self.watchdog_tick().await;
            tokio::time::sleep(WATCHDOG_INTERVAL).await;
        }
    }

    async fn watchdog_tick(&self) {
        let usage = match self.backend.disk_usage().await {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(error = %e, "watchdog: failed to read disk usage");
                return;
            }
        };

        let threshold = self.config.db_purge_threshold;
        let exceeded = usage.iter().any(|(node, pct)| {
            let over = *pct > threshold;
            if over {
                tracing::error!(node, pct, threshold, "database usage exceeds threshold");
            }
            over
        });
        if !exceeded {
            return;
        }

        let client = match self.lock_client().await {
            Ok(c) => c,
            Err(_) => return,
        };
        if client.get(PURGE_STATUS_KEY).await.ok().flatten().is_some() {
            return; // already running
        }

        let start_times = match self.backend.start_times().await {
            Ok(s) => s,
            Err(_) => return,
        };
        let percent = 100.0 - self.config.db_purge_level as f64;
        let cutoffs = cutoffs_from_percent(percent, &start_times, &self.config);

        let purge_id = generate_qid(self.config.host_ip);
        let lock_body = json!({ "status": "running", "purge_id": purge_id, "cutoffs": cutoffs });
        if !client.set_nx(PURGE_STATUS_KEY, &lock_body.to_string()).await.unwrap_or(false) {
            return;
        }

        tracing::info!("watchdog starting purge");
        self.run_purge(cutoffs, purge_id).await;
        tracing::info!("watchdog purge complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_cutoff_moves_forward_as_percent_increases() {
        let config = Config::default();
        let start = StartTimes { other: 0, flow: 0, stats: 0, msg: 0 };
        let low = cutoffs_from_percent(1.0, &start, &config);
        let high = cutoffs_from_percent(99.0, &start, &config);
        assert!(high.other_cutoff > low.other_cutoff);
    }

    #[test]
    fn absolute_cutoff_applies_uniformly() {
        let cutoffs = cutoffs_from_absolute(12345);
        assert_eq!(cutoffs.other_cutoff, 12345);
        assert_eq!(cutoffs.flow_cutoff, 12345);
        assert_eq!(cutoffs.stats_cutoff, 12345);
        assert_eq!(cutoffs.msg_cutoff, 12345);
    }
}
