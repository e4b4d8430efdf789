//! Alarm-Ack Forwarder.
//!
//! The acknowledge token is `base64(json({host_ip, http_port, timestamp}))`,
//! minted by the producer that raised the alarm. Forwarding an
//! acknowledgement means decoding the token and POSTing an introspection
//! request directly to that producer, mirroring `opserver.py`'s
//! `alarms_ack_http_post`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{libc_errno, OpError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AckToken {
    pub host_ip: String,
    pub http_port: u16,
    pub timestamp: i64,
}

pub fn decode_token(token_b64: &str) -> Result<AckToken> {
    let raw = BASE64
        .decode(token_b64)
        .map_err(|_| OpError::InvalidInput("failed to decode \"token\"".to_string()))?;
    serde_json::from_slice(&raw).map_err(|_| OpError::InvalidInput("invalid token value".to_string()))
}

pub struct AlarmAckForwarder {
    http: reqwest::Client,
}

impl Default for AlarmAckForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmAckForwarder {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Forwards `{table, name, type, timestamp}` to the originating
    /// producer's introspection endpoint at `host_ip:http_port`.
    pub async fn forward(&self, token: &AckToken, table: &str, name: &str, alarm_type: &str) -> Result<()> {
        let url = format!("http://{}:{}/Snh_SandeshUVECacheReq", token.host_ip, token.http_port);
        let body = json!({
            "table": table,
            "name": name,
            "type": alarm_type,
            "timestamp": token.timestamp,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OpError::EngineFailure { errno: libc_errno::EBUSY, message: Some(e.to_string()) })?;

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| OpError::EngineFailure { errno: libc_errno::EBUSY, message: Some(e.to_string()) })?;

        if parsed.get("status").and_then(Value::as_str) == Some("false") {
            let msg = parsed
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("alarm acknowledge rejected by producer");
            tracing::warn!(table, name, error = msg, "alarm acknowledge rejected by producer");
            return Err(OpError::EngineFailure { errno: libc_errno::EIO, message: Some(msg.to_string()) });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_token() {
        let payload = json!({ "host_ip": "10.0.0.5", "http_port": 8085, "timestamp": 1234567 });
        let encoded = BASE64.encode(payload.to_string());
        let token = decode_token(&encoded).unwrap();
        assert_eq!(token.host_ip, "10.0.0.5");
        assert_eq!(token.http_port, 8085);
        assert_eq!(token.timestamp, 1234567);
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(decode_token("not base64!!").is_err());
    }

    #[test]
    fn rejects_token_missing_fields() {
        let encoded = BASE64.encode(json!({ "host_ip": "10.0.0.5" }).to_string());
        assert!(decode_token(&encoded).is_err());
    }
}
