//! `/analytics/table*` routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::error::{OpError, Result};

/// `GET /analytics/tables`.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tables: Vec<Value> = state
        .catalog
        .all()
        .map(|t| {
            let mut entry = json!({
                "name": t.name,
                "href": format!("/analytics/table/{}", t.name),
                "type": t.schema.schema_type,
            });
            if let Some(display_name) = &t.display_name {
                entry["display_name"] = json!(display_name);
            }
            entry
        })
        .collect();
    Json(Value::Array(tables))
}

/// `GET /analytics/table/{table}`.
pub async fn links(State(state): State<Arc<AppState>>, Path(table): Path<String>) -> Result<Json<Value>> {
    let vt = state.catalog.get(&table).ok_or_else(|| OpError::NotFound(format!("table {table} not found")))?;
    let base = format!("/analytics/table/{table}/");
    let mut links = vec![json!({ "name": "schema", "href": format!("{base}schema") })];
    if !vt.column_values.is_empty() {
        links.push(json!({ "name": "column-values", "href": format!("{base}column-values") }));
    }
    Ok(Json(Value::Array(links)))
}

/// `GET /analytics/table/{table}/schema`.
pub async fn schema(State(state): State<Arc<AppState>>, Path(table): Path<String>) -> Json<Value> {
    match state.catalog.get(&table) {
        Some(vt) => Json(json!(vt.schema)),
        None => Json(json!({})),
    }
}

/// `GET /analytics/table/{table}/column-values`.
pub async fn column_values(State(state): State<Arc<AppState>>, Path(table): Path<String>) -> Result<Json<Value>> {
    let vt = state.catalog.get(&table).ok_or_else(|| OpError::NotFound(format!("table {table} not found")))?;
    let base = format!("/analytics/table/{table}/column-values/");
    let links: Vec<Value> = vt
        .column_values
        .iter()
        .map(|col| json!({ "name": col, "href": format!("{base}{col}") }))
        .collect();
    Ok(Json(Value::Array(links)))
}

/// `GET /analytics/table/{table}/column-values/{column}`.
pub async fn column(
    State(state): State<Arc<AppState>>,
    Path((table, column)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let vt = state.catalog.get(&table).ok_or_else(|| OpError::NotFound(format!("table {table} not found")))?;
    if !vt.column_values.contains(&column) {
        return Ok(Json(Value::Array(vec![])));
    }
    let values = state
        .catalog
        .column_values(
            &table,
            &column,
            &state.config.redis_uve_list,
            state.config.redis_password.as_deref(),
            Arc::clone(&state.registry),
            &state.cache,
        )
        .await?;
    Ok(Json(json!(values)))
}
