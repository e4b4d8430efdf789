//! `/analytics/query*` routes.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::error::{OpError, Result};
use crate::query::SubmitOutcome;

fn originator_ip(addr: &SocketAddr) -> Ipv4Addr {
    match addr.ip() {
        std::net::IpAddr::V4(ip) => ip,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

fn wants_async(headers: &HeaderMap) -> bool {
    let is_202 = |v: &str| v == "202-accepted";
    headers.get("Expect").and_then(|v| v.to_str().ok()).is_some_and(is_202)
        || headers.get("Postman-Expect").and_then(|v| v.to_str().ok()).is_some_and(is_202)
}

/// `POST /analytics/query`.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response> {
    let map = body
        .as_object()
        .cloned()
        .ok_or_else(|| OpError::InvalidInput("query body must be a JSON object".to_string()))?;

    let catalog = Arc::clone(&state.catalog);
    let outcome = state
        .broker
        .submit(originator_ip(&addr), map, move |table| catalog.contains(table) || table.starts_with("StatTable."))
        .await?;

    match outcome {
        SubmitOutcome::OverlayBypass(value) => Ok(Json(value).into_response()),
        SubmitOutcome::Progress { qid, progress } => {
            if wants_async(&headers) {
                let href = format!("/analytics/query/{qid}");
                return Ok((StatusCode::ACCEPTED, Json(json!({ "href": href }))).into_response());
            }
            sync_query(&state, qid, progress).await
        }
    }
}

/// Polls `REPLY:<qid>` every second until terminal, then streams the result.
async fn sync_query(state: &Arc<AppState>, qid: String, initial_progress: i32) -> Result<Response> {
    let mut last_progress = initial_progress;
    loop {
        let status = state.broker.status(&qid).await?;
        let progress = status.get("progress").and_then(Value::as_i64).unwrap_or(0) as i32;
        if progress != last_progress {
            tracing::info!(qid, progress, "query progress");
            last_progress = progress;
        }
        if progress < 0 {
            return Err(OpError::EngineFailure { errno: -progress, message: None });
        }
        if progress == 100 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let stream = state.broker.chunk_document(qid, 0).map(|chunk| {
        chunk
            .map(Bytes::from)
            .map_err(|e| std::io::Error::other(e.to_string()))
    });
    Ok(Response::builder()
        .header("Content-Type", "application/json")
        .body(Body::from_stream(stream))
        .unwrap())
}

/// `GET /analytics/query/{qid}`.
pub async fn status(State(state): State<Arc<AppState>>, Path(qid): Path<String>) -> Result<Json<Value>> {
    Ok(Json(state.broker.status(&qid).await?))
}

/// `GET /analytics/query/{qid}/chunk-final/{chunk_id}`.
pub async fn chunk(State(state): State<Arc<AppState>>, Path((qid, chunk_id)): Path<(String, u64)>) -> Response {
    let stream = state.broker.chunk_document(qid, chunk_id).map(|chunk| {
        chunk
            .map(Bytes::from)
            .map_err(|e| std::io::Error::other(e.to_string()))
    });
    Response::builder()
        .header("Content-Type", "application/json")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// `GET /analytics/queries`.
pub async fn show_queries(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(state.broker.show_queries(&state.hostname).await?))
}
