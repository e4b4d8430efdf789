//! `/analytics/alarms` routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::alarm_ack::decode_token;
use crate::api::state::AppState;
use crate::error::{OpError, Result};

pub async fn home(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let links: Vec<Value> = state
        .catalog
        .all()
        .filter(|t| !state.catalog.alarm_types_for(&t.name).is_empty())
        .map(|t| json!({ "name": t.name, "href": format!("/analytics/alarms/{}", t.name) }))
        .collect();
    Ok(Json(Value::Array(links)))
}

/// `GET /analytics/alarms/{table}/types`.
pub async fn types(State(state): State<Arc<AppState>>, Path(table): Path<String>) -> Json<Value> {
    Json(json!(state.catalog.alarm_types_for(&table)))
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub token: String,
}

/// `POST /analytics/alarms/acknowledge`.
pub async fn acknowledge(State(state): State<Arc<AppState>>, Json(req): Json<AckRequest>) -> Result<()> {
    if req.table.is_empty() || req.name.is_empty() || req.alarm_type.is_empty() || req.token.is_empty() {
        return Err(OpError::InvalidInput(
            "Alarm acknowledge request does not contain the fields {table, name, type, token}".to_string(),
        ));
    }
    let token = decode_token(&req.token)?;
    state.alarm_ack.forward(&token, &req.table, &req.name, &req.alarm_type).await
}
