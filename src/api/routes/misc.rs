//! Top-level links, trace-buffer redirection, and the live UVE SSE feed.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use futures_util::StreamExt as _;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::state::AppState;
use crate::connection_state::ConnectionType;
use crate::kv::ShardClient;
use crate::uve::streamer::tail_partition_to_channel;

/// `GET /`.
pub async fn index() -> Json<Value> {
    Json(json!({ "href": "/analytics" }))
}

/// `GET /analytics`.
pub async fn home() -> Json<Value> {
    Json(json!([
        { "name": "uves", "href": "/analytics/uves" },
        { "name": "alarms", "href": "/analytics/alarms" },
        { "name": "tables", "href": "/analytics/tables" },
        { "name": "queries", "href": "/analytics/queries" },
    ]))
}

/// `GET /analytics/send-tracebuffer/{source}/{module}/{instance_id}/{name}`:
/// publishes a trace-dump request to the addressed generator rather than
/// reading the buffer itself, since the generator-side Sandesh trace
/// machinery is an external collaborator this crate doesn't own.
pub async fn send_tracebuffer(
    State(state): State<Arc<AppState>>,
    Path((source, module, instance_id, name)): Path<(String, String, String, String)>,
) -> Json<Value> {
    let Some(addr) = state.config.redis_uve_list.first() else {
        return Json(json!({ "status": "fail", "error": "no redis shards configured" }));
    };
    let client = ShardClient::connect(
        addr,
        ConnectionType::RedisUve,
        "send-tracebuffer",
        state.config.redis_password.as_deref(),
        Arc::clone(&state.registry),
    )
    .await;
    let Ok(client) = client else {
        return Json(json!({ "status": "fail", "error": "No connection to Redis" }));
    };

    let channel = format!("send-tracebuffer:{source}:{module}:{instance_id}");
    match client.publish(&channel, &json!({ "name": name }).to_string()).await {
        Ok(_) => Json(json!({ "status": "pass" })),
        Err(_) => Json(json!({ "status": "fail", "error": "No connection to Redis" })),
    }
}

/// `GET /analytics/uve-stream`: fans out a subscriber task per owned
/// partition into a single SSE feed.
pub async fn uve_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel(256);
    let owners = state.partition_map.load();
    for (partition, owner) in owners.iter() {
        let owner = owner.clone();
        let partition = *partition;
        let redis_password = state.config.redis_password.clone();
        let registry = Arc::clone(&state.registry);
        let out = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tail_partition_to_channel(owner, partition, redis_password, registry, out).await {
                tracing::warn!(partition, error = %e, "uve-stream subscriber exited");
            }
        });
    }
    drop(tx);

    let stream = ReceiverStream::new(rx)
        .map(|value| Ok::<_, std::convert::Infallible>(Event::default().json_data(value).unwrap_or_else(|_| Event::default())));
    Sse::new(stream)
}
