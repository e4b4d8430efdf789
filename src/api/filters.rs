//! Query-string and JSON-body UVE/alarm filter parsing.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{OpError, Result};
use crate::uve::UveFilters;

#[derive(Debug, Deserialize, Default)]
pub struct FilterQuery {
    pub sfilt: Option<String>,
    pub mfilt: Option<String>,
    pub cfilt: Option<String>,
    pub kfilt: Option<String>,
    pub ackfilt: Option<String>,
}

fn parse_tfilter(parts: &str) -> HashMap<String, HashSet<String>> {
    let mut out: HashMap<String, HashSet<String>> = HashMap::new();
    for entry in parts.split(',') {
        let mut pieces = entry.splitn(2, ':');
        let Some(attr) = pieces.next() else { continue };
        let fields = out.entry(attr.to_string()).or_default();
        if let Some(field) = pieces.next() {
            fields.insert(field.to_string());
        }
    }
    out
}

/// Query-string form (`GET` requests): `ackfilt` must be the literal string
/// `"true"`/`"false"` when present.
pub fn from_query(q: &FilterQuery) -> Result<UveFilters> {
    let ackfilt = match q.ackfilt.as_deref() {
        None => None,
        Some("true") => Some(true),
        Some("false") => Some(false),
        Some(_) => return Err(OpError::InvalidInput("Invalid ackfilt. ackfilt must be true|false".to_string())),
    };
    Ok(UveFilters {
        sfilt: q.sfilt.clone(),
        mfilt: q.mfilt.clone(),
        cfilt: q.cfilt.as_deref().map(parse_tfilter),
        kfilt: q.kfilt.as_deref().map(|s| s.split(',').map(str::to_string).collect()),
        ackfilt,
    })
}

/// JSON-body form (`POST` batch fetch): `kfilt` defaults to `["*"]` when
/// absent, `ackfilt` must be a JSON bool.
pub fn from_body(body: &Value) -> Result<UveFilters> {
    let kfilt = match body.get("kfilt") {
        None => vec!["*".to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| OpError::InvalidInput("Invalid kfilt".to_string()))?,
        Some(_) => return Err(OpError::InvalidInput("Invalid kfilt".to_string())),
    };

    let cfilt = match body.get("cfilt") {
        None => None,
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| OpError::InvalidInput("Invalid cfilt".to_string()))?
                .join(",");
            Some(parse_tfilter(&joined))
        }
        Some(_) => return Err(OpError::InvalidInput("Invalid cfilt".to_string())),
    };

    let ackfilt = match body.get("ackfilt") {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return Err(OpError::InvalidInput("Invalid ackfilt. ackfilt must be bool".to_string())),
    };

    Ok(UveFilters {
        sfilt: body.get("sfilt").and_then(Value::as_str).map(str::to_string),
        mfilt: body.get("mfilt").and_then(Value::as_str).map(str::to_string),
        cfilt,
        kfilt: Some(kfilt),
        ackfilt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_ackfilt_rejects_non_boolean_literal() {
        let q = FilterQuery { ackfilt: Some("maybe".to_string()), ..Default::default() };
        assert!(from_query(&q).is_err());
    }

    #[test]
    fn body_kfilt_defaults_to_wildcard() {
        let body = serde_json::json!({});
        let filters = from_body(&body).unwrap();
        assert_eq!(filters.kfilt, Some(vec!["*".to_string()]));
    }

    #[test]
    fn cfilt_groups_fields_by_struct_name() {
        let parsed = parse_tfilter("UveAlarms:alarms,UveAlarms:ack");
        let fields = &parsed["UveAlarms"];
        assert!(fields.contains("alarms"));
        assert!(fields.contains("ack"));
    }
}
