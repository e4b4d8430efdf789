//! Entry point for the analytics API server: wires together the nine
//! components (C1-C9) and starts the REST surface.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;

use analytics_api::alarm_ack::AlarmAckForwarder;
use analytics_api::api::server::ApiServer;
use analytics_api::api::state::AppState;
use analytics_api::catalog::stats::{StatAttrDef, StatTableDef};
use analytics_api::catalog::Catalog;
use analytics_api::config::Config;
use analytics_api::connection_state::ConnectionRegistry;
use analytics_api::discovery::{poll_collectors, poll_partitions, DiscoveryClient};
use analytics_api::partition_map::PartitionMap;
use analytics_api::purge::PurgeCoordinator;
use analytics_api::purge_backend::RedisStartTimeBackend;
use analytics_api::query::QueryBroker;
use analytics_api::uve::{StreamerSupervisor, UveCache};

fn print_banner() {
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║        Analytics API — operational-state aggregator       ║");
    println!("╚══════════════════════════════════════════════════════════╝");
}

/// Built-in statistics-table declarations. The sandesh schema compiler that
/// produces these from `.sandesh` struct definitions is an external
/// collaborator; the shapes below are the ones the REST surface
/// needs to serve a non-empty `/analytics/tables` catalog.
fn stat_table_defs() -> Vec<StatTableDef> {
    vec![
        StatTableDef {
            stat_type: "UveVrouterStats".to_string(),
            stat_attr: "phy_if_stats".to_string(),
            display_name: Some("Physical Interface Statistics".to_string()),
            attributes: vec![
                StatAttrDef { name: "in_bytes".to_string(), datatype: "int".to_string() },
                StatAttrDef { name: "out_bytes".to_string(), datatype: "int".to_string() },
            ],
            obj_table: Some("ObjectVRouter".to_string()),
        },
        StatTableDef {
            stat_type: "UveVMInterfaceAgent".to_string(),
            stat_attr: "if_stats".to_string(),
            display_name: Some("VM Interface Statistics".to_string()),
            attributes: vec![
                StatAttrDef { name: "in_pkts".to_string(), datatype: "int".to_string() },
                StatAttrDef { name: "out_pkts".to_string(), datatype: "int".to_string() },
            ],
            obj_table: Some("ObjectVMTable".to_string()),
        },
    ]
}

#[tokio::main]
async fn main() -> analytics_api::error::Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();
    print_banner();

    let config = Arc::new(Config::from_env());
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "analytics-api".to_string());
    let analytics_start_time = Utc::now().timestamp_micros();

    let registry = ConnectionRegistry::new();
    let cache = Arc::new(UveCache::new());
    let (partition_map, owner_events) = PartitionMap::new(config.partitions);
    let catalog = Catalog::build(&stat_table_defs());
    let broker = QueryBroker::new(Arc::clone(&config), Arc::clone(&registry));
    let broker = Arc::new(broker);
    let alarm_ack = Arc::new(AlarmAckForwarder::new());

    let purge_backend = RedisStartTimeBackend::new(Arc::clone(&config), Arc::clone(&registry));
    let purge = PurgeCoordinator::new(Arc::clone(&config), purge_backend, Arc::clone(&registry));

    let streamer = StreamerSupervisor::new(
        Arc::clone(&cache),
        Arc::clone(&partition_map),
        Arc::clone(&registry),
        config.redis_password.clone(),
    );
    tokio::spawn(Arc::clone(&streamer).run(owner_events));

    tokio::spawn(Arc::clone(&purge).run_watchdog());

    let discovery = if let Some(ip) = &config.disc_server_ip {
        let shards = Arc::new(tokio::sync::RwLock::new(config.redis_uve_list.clone()));
        tokio::spawn(poll_collectors(
            DiscoveryClient::new(ip, config.disc_server_port),
            Arc::clone(&config),
            Arc::clone(&registry),
            shards,
        ));
        tokio::spawn(poll_partitions(
            DiscoveryClient::new(ip, config.disc_server_port),
            Arc::clone(&partition_map),
            Arc::clone(&registry),
            config.partitions,
        ));
        Some(Arc::new(DiscoveryClient::new(ip, config.disc_server_port)))
    } else {
        None
    };

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        cache,
        partition_map,
        catalog,
        broker,
        purge,
        registry,
        alarm_ack,
        discovery,
        hostname,
        analytics_start_time,
    });

    let addr: SocketAddr = format!("{}:{}", config.rest_api_ip, config.rest_api_port)
        .parse()
        .map_err(|e| analytics_api::error::OpError::Internal(format!("invalid bind address: {e}")))?;

    ApiServer::new(state).run(addr).await
}
