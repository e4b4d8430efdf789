//! End-to-end REST surface tests against routes that don't require a live
//! kv-fleet.

use std::sync::Arc;

use analytics_api::alarm_ack::AlarmAckForwarder;
use analytics_api::api::routes::{misc, tables, uves};
use analytics_api::api::state::AppState;
use analytics_api::catalog::Catalog;
use analytics_api::config::Config;
use analytics_api::connection_state::ConnectionRegistry;
use analytics_api::error::Result;
use analytics_api::partition_map::PartitionMap;
use analytics_api::purge::{PurgeBackend, PurgeCoordinator, PurgeCutoffs, StartTimes};
use analytics_api::query::QueryBroker;
use analytics_api::uve::UveCache;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

struct NoopPurgeBackend;

#[async_trait::async_trait]
impl PurgeBackend for NoopPurgeBackend {
    async fn start_times(&self) -> Result<StartTimes> {
        Ok(StartTimes::default())
    }
    async fn purge(&self, _cutoffs: &PurgeCutoffs, _purge_id: &str) -> Result<(i64, Value)> {
        Ok((0, serde_json::json!({})))
    }
    async fn update_start_times(&self, _cutoffs: &PurgeCutoffs) -> Result<()> {
        Ok(())
    }
    async fn disk_usage(&self) -> Result<Vec<(String, u8)>> {
        Ok(vec![])
    }
}

fn test_state() -> Arc<AppState> {
    let config = Arc::new(Config::default());
    let registry = ConnectionRegistry::new();
    let (partition_map, _events) = PartitionMap::new(config.partitions);
    let catalog = Catalog::build(&[]);
    let broker = Arc::new(QueryBroker::new(Arc::clone(&config), Arc::clone(&registry)));
    let purge = PurgeCoordinator::new(Arc::clone(&config), Arc::new(NoopPurgeBackend), Arc::clone(&registry));

    Arc::new(AppState {
        config,
        cache: Arc::new(UveCache::new()),
        partition_map,
        catalog,
        broker,
        purge,
        registry,
        alarm_ack: Arc::new(AlarmAckForwarder::new()),
        discovery: None,
        hostname: "test-host".to_string(),
        analytics_start_time: 0,
    })
}

fn test_router() -> Router {
    Router::new()
        .route("/", get(misc::index))
        .route("/analytics", get(misc::home))
        .route("/analytics/uves", get(uves::home))
        .route("/analytics/tables", get(tables::list))
        .route("/analytics/table/{table}/schema", get(tables::schema))
        .with_state(test_state())
}

#[tokio::test]
async fn index_points_at_analytics_root() {
    let response = test_router()
        .oneshot(Request::builder().uri("/").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn analytics_home_lists_top_level_links() {
    let response = test_router()
        .oneshot(Request::builder().uri("/analytics").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = json.as_array().unwrap().iter().map(|v| v["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"uves"));
    assert!(names.contains(&"tables"));
}

#[tokio::test]
async fn uves_home_lists_only_object_tables() {
    let response = test_router()
        .oneshot(Request::builder().uri("/analytics/uves").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = json.as_array().unwrap().iter().map(|v| v["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"ObjectVNTable"));
    assert!(!names.contains(&"MessageTable"));
}

#[tokio::test]
async fn table_schema_reports_log_table_columns() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/analytics/table/MessageTable/schema")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let columns: Vec<&str> = json["columns"].as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert!(columns.contains(&"Messagetype"));
}

#[tokio::test]
async fn unknown_table_schema_returns_empty_object() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .uri("/analytics/table/NoSuchTable/schema")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json.as_object().unwrap().is_empty());
}
