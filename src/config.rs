//! Process configuration. The CLI/file loader itself is an
//! out-of-scope external collaborator; this module only owns the
//! merged, validated result: a plain struct with defaults matching
//! `opserver.py`'s `_parse_args` defaults, overridable from
//! environment variables (`ANALYTICS_API_<FIELD>`), with CLI values (if any)
//! taking precedence over both.

use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host_ip: Ipv4Addr,
    pub rest_api_ip: String,
    pub rest_api_port: u16,
    pub http_server_port: u16,
    pub collectors: Vec<String>,
    pub cassandra_server_list: Vec<String>,
    pub cassandra_user: Option<String>,
    pub cassandra_password: Option<String>,
    pub redis_uve_list: Vec<String>,
    pub redis_server_port: u16,
    pub redis_query_port: u16,
    pub redis_password: Option<String>,
    pub partitions: u32,
    pub auto_db_purge: bool,
    pub db_purge_threshold: u8,
    pub db_purge_level: u8,
    pub analytics_data_ttl: i64,
    pub analytics_flow_ttl: i64,
    pub analytics_statistics_ttl: i64,
    pub analytics_config_audit_ttl: i64,
    pub disc_server_ip: Option<String>,
    pub disc_server_port: u16,
    pub worker_id: String,
    pub dup: bool,
}

impl Default for Config {
    fn default() -> Self {
        let analytics_data_ttl = 48;
        Self {
            host_ip: Ipv4Addr::new(127, 0, 0, 1),
            rest_api_ip: "0.0.0.0".to_string(),
            rest_api_port: 8081,
            http_server_port: 8090,
            collectors: vec!["127.0.0.1:8086".to_string()],
            cassandra_server_list: vec!["127.0.0.1:9160".to_string()],
            cassandra_user: None,
            cassandra_password: None,
            redis_uve_list: vec!["127.0.0.1:6379".to_string()],
            redis_server_port: 6379,
            redis_query_port: 6379,
            redis_password: None,
            partitions: 5,
            auto_db_purge: true,
            db_purge_threshold: 70,
            db_purge_level: 40,
            analytics_data_ttl,
            // -1 inherits analytics_data_ttl, resolved below.
            analytics_flow_ttl: -1,
            analytics_statistics_ttl: -1,
            analytics_config_audit_ttl: -1,
            disc_server_ip: None,
            disc_server_port: 5998,
            worker_id: "0".to_string(),
            dup: false,
        }
        .resolve_ttls()
    }
}

impl Config {
    fn resolve_ttls(mut self) -> Self {
        if self.analytics_flow_ttl == -1 {
            self.analytics_flow_ttl = self.analytics_data_ttl;
        }
        if self.analytics_statistics_ttl == -1 {
            self.analytics_statistics_ttl = self.analytics_data_ttl;
        }
        if self.analytics_config_audit_ttl == -1 {
            self.analytics_config_audit_ttl = self.analytics_data_ttl;
        }
        self
    }

    /// Overlays environment variables on top of the defaults. Recognizes the
    /// subset of options that plausibly vary per-deployment; list fields are
    /// `,`-separated.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        let env: HashMap<String, String> = std::env::vars().collect();

        if let Some(v) = env.get("ANALYTICS_API_HOST_IP") {
            if let Ok(ip) = v.parse() {
                cfg.host_ip = ip;
            }
        }
        if let Some(v) = env.get("ANALYTICS_API_REST_API_IP") {
            cfg.rest_api_ip = v.clone();
        }
        if let Some(v) = env.get("ANALYTICS_API_REST_API_PORT") {
            if let Ok(p) = v.parse() {
                cfg.rest_api_port = p;
            }
        }
        if let Some(v) = env.get("ANALYTICS_API_REDIS_UVE_LIST") {
            cfg.redis_uve_list = v.split(',').map(str::to_string).collect();
        }
        if let Some(v) = env.get("ANALYTICS_API_REDIS_QUERY_PORT") {
            if let Ok(p) = v.parse() {
                cfg.redis_query_port = p;
            }
        }
        if let Some(v) = env.get("ANALYTICS_API_REDIS_PASSWORD") {
            cfg.redis_password = Some(v.clone());
        }
        if let Some(v) = env.get("ANALYTICS_API_PARTITIONS") {
            if let Ok(p) = v.parse() {
                cfg.partitions = p;
            }
        }
        if let Some(v) = env.get("ANALYTICS_API_AUTO_DB_PURGE") {
            cfg.auto_db_purge = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = env.get("ANALYTICS_API_DB_PURGE_THRESHOLD") {
            if let Ok(p) = v.parse() {
                cfg.db_purge_threshold = p;
            }
        }
        if let Some(v) = env.get("ANALYTICS_API_DB_PURGE_LEVEL") {
            if let Ok(p) = v.parse() {
                cfg.db_purge_level = p;
            }
        }
        cfg.resolve_ttls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_inheritance_matches_data_ttl_when_unset() {
        let cfg = Config::default();
        assert_eq!(cfg.analytics_flow_ttl, cfg.analytics_data_ttl);
        assert_eq!(cfg.analytics_statistics_ttl, cfg.analytics_data_ttl);
        assert_eq!(cfg.analytics_config_audit_ttl, cfg.analytics_data_ttl);
    }

    #[test]
    fn defaults_match_original_implementation() {
        let cfg = Config::default();
        assert_eq!(cfg.rest_api_port, 8081);
        assert_eq!(cfg.redis_server_port, 6379);
        assert_eq!(cfg.partitions, 5);
        assert_eq!(cfg.db_purge_threshold, 70);
        assert_eq!(cfg.db_purge_level, 40);
    }
}
