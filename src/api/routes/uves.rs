//! `GET /analytics/uves`.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::catalog::SchemaType;
use crate::error::Result;

pub async fn home(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let links: Vec<Value> = state
        .catalog
        .all()
        .filter(|t| t.schema.schema_type == SchemaType::Object)
        .map(|t| json!({ "name": t.name, "href": format!("/analytics/uves/{}", t.name) }))
        .collect();
    Ok(Json(Value::Array(links)))
}
