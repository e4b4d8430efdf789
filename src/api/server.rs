//! Router assembly and the bound HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::routes::{alarms, dyn_uve, misc, purge, query, tables, uves};
use crate::api::state::AppState;
use crate::error::OpError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/", get(misc::index))
            .route("/analytics", get(misc::home))
            .route("/analytics/uves", get(uves::home))
            .route("/analytics/alarms", get(alarms::home))
            .route("/analytics/alarms/{table}/types", get(alarms::types))
            .route("/analytics/alarms/acknowledge", post(alarms::acknowledge))
            .route("/analytics/tables", get(tables::list))
            .route("/analytics/table/{table}", get(tables::links))
            .route("/analytics/table/{table}/schema", get(tables::schema))
            .route("/analytics/table/{table}/column-values", get(tables::column_values))
            .route("/analytics/table/{table}/column-values/{column}", get(tables::column))
            .route("/analytics/query", post(query::submit))
            .route("/analytics/query/{qid}", get(query::status))
            .route("/analytics/query/{qid}/chunk-final/{chunk_id}", get(query::chunk))
            .route("/analytics/queries", get(query::show_queries))
            .route("/analytics/operation/database-purge", post(purge::database_purge))
            .route(
                "/analytics/operation/analytics-data-start-time",
                get(purge::analytics_data_start_time),
            )
            .route(
                "/analytics/send-tracebuffer/{source}/{module}/{instance_id}/{name}",
                get(misc::send_tracebuffer),
            )
            .route("/analytics/uve-stream", get(misc::uve_stream))
            .route("/analytics/{uvealarm}/{table}", get(dyn_uve::list).post(dyn_uve::batch))
            .route("/analytics/{uvealarm}/{table}/{name}", get(dyn_uve::single))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
            .layer(
                CorsLayer::new()
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers(Any)
                    .allow_origin(Any),
            )
    }

    pub async fn run(&self, addr: SocketAddr) -> Result<(), OpError> {
        let router = self.build_router().into_make_service_with_connect_info::<SocketAddr>();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| OpError::NetworkUnavailable(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "analytics API listening");

        axum::serve(listener, router)
            .await
            .map_err(|e| OpError::Internal(format!("server error: {e}")))?;

        Ok(())
    }
}
