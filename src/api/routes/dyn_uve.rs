//! Generic `uves`/`alarms` dispatch. Both link sets share the same cache
//! lookup path; only the base URL segment differs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};

use crate::api::filters::{self, FilterQuery};
use crate::api::state::AppState;
use crate::error::{OpError, Result};

/// `GET /analytics/{uvealarm}/{table}`: key listing with link hrefs.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path((uvealarm, table)): Path<(String, String)>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>> {
    let filters = filters::from_query(&query)?;
    let keys = state.cache.get_uve_list(&table, &filters);
    let links: Vec<Value> = keys
        .into_iter()
        .map(|key| json!({ "name": key, "href": format!("/analytics/{uvealarm}/{table}/{key}") }))
        .collect();
    Ok(Json(Value::Array(links)))
}

/// `GET /analytics/{uvealarm}/{table}/{name}`: point lookup, or a
/// `{"value": [...]}` multi-result when `name` carries a glob, mirroring
/// the `*` branch of `batch` below.
pub async fn single(
    State(state): State<Arc<AppState>>,
    Path((_uvealarm, table, name)): Path<(String, String, String)>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Value>> {
    let mut filters = filters::from_query(&query)?;
    if name.contains('*') {
        filters.kfilt = Some(vec![name]);
        let pairs = state.cache.multi_uve_get(&table, &filters, state.config.partitions).await;
        let values: Vec<Value> = pairs.into_iter().map(|(_, value)| value).collect();
        return Ok(Json(json!({ "value": values })));
    }

    let value = state
        .cache
        .get_uve(&table, &name, &filters, state.config.partitions)
        .ok_or_else(|| OpError::NotFound(format!("{table}:{name} not found")))?;
    Ok(Json(value))
}

/// `POST /analytics/{uvealarm}/{table}`: batch fetch, one or more `kfilt`
/// entries, wildcard entries expand via `multi_uve_get`.
pub async fn batch(
    State(state): State<Arc<AppState>>,
    Path((_uvealarm, table)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let filters = filters::from_body(&body)?;
    let keys = filters.kfilt.clone().unwrap_or_else(|| vec!["*".to_string()]);

    let mut out = serde_json::Map::new();
    if keys.iter().any(|k| k.contains('*')) {
        let pairs = state.cache.multi_uve_get(&table, &filters, state.config.partitions).await;
        for (key, value) in pairs {
            out.insert(key, value);
        }
    } else {
        for key in keys {
            if let Some(value) = state.cache.get_uve(&table, &key, &filters, state.config.partitions) {
                out.insert(key, value);
            }
        }
    }
    Ok(Json(json!({ "value": out })))
}
