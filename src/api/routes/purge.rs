//! `/analytics/operation/*` routes.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::error::{OpError, Result};
use crate::purge::{cutoffs_from_absolute, cutoffs_from_percent, PurgeRequestOutcome};

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    pub purge_input: Value,
}

fn originator_ip(addr: &SocketAddr) -> Ipv4Addr {
    match addr.ip() {
        std::net::IpAddr::V4(ip) => ip,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

/// `POST /analytics/operation/database-purge`. `purge_input` is either a
/// percentage in `[1, 100]` or an absolute microsecond timestamp strictly
/// after the analytics start time.
pub async fn database_purge(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<PurgeRequest>,
) -> Result<Response> {
    let cutoffs = match &req.purge_input {
        Value::Number(n) if n.as_i64().is_some_and(|v| (1..=100).contains(&v)) => {
            let percent = n.as_i64().unwrap() as f64;
            let start = state.purge.start_times().await?;
            cutoffs_from_percent(percent, &start, &state.config)
        }
        Value::Number(n) => {
            let cutoff = n
                .as_i64()
                .ok_or_else(|| OpError::InvalidInput("purge_input must be an integer".to_string()))?;
            if cutoff <= state.analytics_start_time {
                return Err(OpError::InvalidInput(
                    "purge_input must be after the analytics start time".to_string(),
                ));
            }
            cutoffs_from_absolute(cutoff)
        }
        _ => return Err(OpError::InvalidInput("purge_input must be a number".to_string())),
    };

    let (outcome, body) = state.purge.request_purge(originator_ip(&addr), cutoffs).await?;
    let status = match outcome {
        PurgeRequestOutcome::Started => StatusCode::OK,
        PurgeRequestOutcome::AlreadyRunning => StatusCode::OK,
        PurgeRequestOutcome::LockFailed => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status, Json(body)).into_response())
}

/// `GET /analytics/operation/analytics-data-start-time`.
pub async fn analytics_data_start_time(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "start_time": state.analytics_start_time }))
}
