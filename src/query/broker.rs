//! Query Broker.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use chrono::Utc;
use futures_util::Stream;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::connection_state::{ConnectionRegistry, ConnectionStatus, ConnectionType};
use crate::error::{OpError, Result};
use crate::kv::ShardClient;

use super::qid::{generate_qid, ip_from_qid};

pub const OVERLAY_TO_UNDERLAY_FLOW_MAP: &str = "OverlayToUnderlayFlowMap";
pub const STAT_TABLE_PREFIX: &str = "StatTable.";

const SUBMIT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Bypassed the engine entirely.
    OverlayBypass(Value),
    Progress { qid: String, progress: i32 },
}

pub struct QueryBroker {
    config: Arc<Config>,
    registry: Arc<ConnectionRegistry>,
}

impl QueryBroker {
    pub fn new(config: Arc<Config>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { config, registry }
    }

    async fn local_engine_client(&self) -> Result<ShardClient> {
        let addr = format!("127.0.0.1:{}", self.config.redis_query_port);
        ShardClient::connect(
            &addr,
            ConnectionType::RedisQuery,
            "Query",
            self.config.redis_password.as_deref(),
            Arc::clone(&self.registry),
        )
        .await
    }

    async fn engine_client_for(&self, ip: Ipv4Addr) -> Result<ShardClient> {
        let addr = format!("{ip}:{}", self.config.redis_query_port);
        ShardClient::connect(
            &addr,
            ConnectionType::RedisQuery,
            "Query",
            self.config.redis_password.as_deref(),
            Arc::clone(&self.registry),
        )
        .await
    }

    /// Submits a structured query.
    pub async fn submit(&self, originator_ip: Ipv4Addr, mut body: Map<String, Value>, table_known: impl Fn(&str) -> bool) -> Result<SubmitOutcome> {
        let table = body
            .get("table")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if table.is_empty() {
            return Err(OpError::InvalidInput("missing 'table' field".to_string()));
        }
        if table == OVERLAY_TO_UNDERLAY_FLOW_MAP {
            return Ok(SubmitOutcome::OverlayBypass(overlay_to_underlay_map(&body, &self.config)));
        }
        if !table.starts_with(STAT_TABLE_PREFIX) && !table_known(&table) {
            return Err(OpError::InvalidInput(format!("table {table} not found")));
        }

        let qid = generate_qid(originator_ip);
        let client = self.local_engine_client().await?;

        let enqueue_time = Utc::now().timestamp_micros();
        body.insert("enqueue_time".to_string(), json!(enqueue_time));
        let metadata = json!({ "enqueue_time": enqueue_time });

        for (field, value) in &body {
            client
                .hset(&format!("QUERY:{qid}"), field, &value.to_string())
                .await?;
        }
        client
            .hset(&format!("QUERY:{qid}"), "query_metadata", &metadata.to_string())
            .await?;
        client.lpush("QUERYQ", &qid).await?;

        let ack = client.blpop(&format!("REPLY:{qid}"), SUBMIT_ACK_TIMEOUT).await?;
        let Some((_, payload)) = ack else {
            self.registry.update(
                ConnectionType::RedisQuery,
                "Query",
                ConnectionStatus::Down,
                Some(format!("Query[{qid}] Query Engine not responding")),
                vec![client.addr().to_string()],
            );
            return Err(OpError::QueryEngineUnavailable(qid));
        };
        // Put the status back on the queue for the use of the status URI.
        client.lpush(&format!("REPLY:{qid}"), &payload).await?;

        let reply: Value = serde_json::from_str(&payload)
            .map_err(|e| OpError::Internal(format!("malformed engine reply: {e}")))?;
        let progress = reply
            .get("progress")
            .and_then(Value::as_i64)
            .ok_or_else(|| OpError::Internal("engine reply missing progress".to_string()))? as i32;

        if progress < 0 {
            return Err(OpError::EngineFailure { errno: -progress, message: None });
        }
        Ok(SubmitOutcome::Progress { qid, progress })
    }

    /// Status poll.
    pub async fn status(&self, qid: &str) -> Result<Value> {
        let ip = ip_from_qid(qid).ok_or_else(|| OpError::InvalidInput("invalid query id".to_string()))?;
        let client = self.engine_client_for(ip).await?;

        let replies = client.lrange(&format!("REPLY:{qid}"), -1, -1).await?;
        let Some(raw) = replies.into_iter().next() else {
            return Err(OpError::NotFound(format!("invalid or abandoned query id {qid}")));
        };
        let mut resp: Value = serde_json::from_str(&raw)
            .map_err(|e| OpError::Internal(format!("malformed reply for {qid}: {e}")))?;

        let ttl = client.ttl(&format!("REPLY:{qid}")).await?;
        if ttl != -1 {
            resp["ttl"] = json!(ttl);
        }

        let times = client.hmget(&format!("QUERY:{qid}"), &["start_time", "end_time"]).await?;
        resp["start_time"] = json!(times.first().cloned().flatten());
        resp["end_time"] = json!(times.get(1).cloned().flatten());

        if resp.get("progress").and_then(Value::as_i64) == Some(100) {
            resp["href"] = json!(format!("/analytics/query/{qid}/chunk-final/0"));
        }
        Ok(resp)
    }

    /// Streams `RESULT:<qid>:<n>` chunk-by-chunk as a JSON `{"value": [...]}`
    /// document. Each list is `persist`-ed for the
    /// duration of the read so TTL can't reap mid-stream, then deleted.
    pub fn chunk_document(&self, qid: String, start_chunk: u64) -> impl Stream<Item = Result<String>> + Send {
        let config = Arc::clone(&self.config);
        let registry = Arc::clone(&self.registry);
        stream! {
            let ip = match ip_from_qid(&qid) {
                Some(ip) => ip,
                None => {
                    yield Err(OpError::InvalidInput("invalid query id".to_string()));
                    return;
                }
            };
            let addr = format!("{ip}:{}", config.redis_query_port);
            let client = match ShardClient::connect(&addr, ConnectionType::RedisQuery, "Query", config.redis_password.as_deref(), registry).await {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            yield Ok("{\"value\": [".to_string());
            let mut iters: u64 = start_chunk;
            let mut out_count: u64 = 0;
            loop {
                let key = format!("RESULT:{qid}:{iters}");
                if let Err(e) = client.persist(&key).await {
                    yield Err(e);
                    return;
                }
                let elems = match client.lrange(&key, 0, -1).await {
                    Ok(e) => e,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if elems.is_empty() {
                    break;
                }
                let mut line = String::new();
                for elem in &elems {
                    if out_count > 0 {
                        line.push_str(", ");
                    }
                    line.push_str(elem);
                    out_count += 1;
                }
                yield Ok(line);
                let _ = client.del(&key).await;
                iters += 1;
            }
            yield Ok("]}".to_string());
        }
    }

    /// Queues enumeration for `GET /analytics/queries`.
    pub async fn show_queries(&self, hostname: &str) -> Result<Value> {
        let client = self.local_engine_client().await?;
        let pending = client.lrange("QUERYQ", 0, -1).await?;
        let processing_ids = client.lrange(&format!("ENGINE:{hostname}"), 0, -1).await?;

        let mut pending_info = Vec::new();
        for qid in &pending {
            pending_info.push(self.query_info(&client, qid).await?);
        }

        let mut processing = Vec::new();
        let mut abandoned = Vec::new();
        let mut errored = Vec::new();
        for qid in &processing_ids {
            let mut info = self.query_info(&client, qid).await?;
            match self.status(qid).await {
                Err(OpError::NotFound(_)) => abandoned.push(info),
                Ok(status) => {
                    let progress = status.get("progress").and_then(Value::as_i64).unwrap_or(0);
                    if progress < 0 {
                        info["error_code"] = json!(progress);
                        errored.push(info);
                    } else {
                        info["progress"] = json!(progress);
                        processing.push(info);
                    }
                }
                Err(_) => abandoned.push(info),
            }
        }

        Ok(json!({
            "pending_queries": pending_info,
            "queries_being_processed": processing,
            "abandoned_queries": abandoned,
            "error_queries": errored,
        }))
    }

    async fn query_info(&self, client: &ShardClient, qid: &str) -> Result<Value> {
        let mut fields = client.hgetall(&format!("QUERY:{qid}")).await?;
        let metadata = fields.remove("query_metadata");
        let enqueue_time = metadata
            .as_ref()
            .and_then(|m| serde_json::from_str::<Value>(m).ok())
            .and_then(|v| v.get("enqueue_time").cloned());
        Ok(json!({
            "query_id": qid,
            "query": fields,
            "enqueue_time": enqueue_time,
        }))
    }
}

/// Pure function of the request and process config. The overlay/underlay
/// address-translation algorithm itself lives in an external collaborator;
/// this reflects the request back annotated with the resolving node's
/// identity, which is the shape `_query` yields for this table.
fn overlay_to_underlay_map(request: &Map<String, Value>, config: &Config) -> Value {
    json!({
        "request": request,
        "resolved_by": {
            "host_ip": config.host_ip.to_string(),
            "rest_api_port": config.rest_api_port,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_bypass_is_a_pure_function_of_request_and_config() {
        let config = Config::default();
        let mut req = Map::new();
        req.insert("table".to_string(), json!(OVERLAY_TO_UNDERLAY_FLOW_MAP));
        let a = overlay_to_underlay_map(&req, &config);
        let b = overlay_to_underlay_map(&req, &config);
        assert_eq!(a, b);
    }
}
