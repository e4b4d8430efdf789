//! Shared state handed to every REST handler.

use std::sync::Arc;

use crate::alarm_ack::AlarmAckForwarder;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::connection_state::ConnectionRegistry;
use crate::discovery::DiscoveryClient;
use crate::partition_map::PartitionMap;
use crate::purge::PurgeCoordinator;
use crate::query::QueryBroker;
use crate::uve::UveCache;

pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<UveCache>,
    pub partition_map: Arc<PartitionMap>,
    pub catalog: Arc<Catalog>,
    pub broker: Arc<QueryBroker>,
    pub purge: Arc<PurgeCoordinator>,
    pub registry: Arc<ConnectionRegistry>,
    pub alarm_ack: Arc<AlarmAckForwarder>,
    pub discovery: Option<Arc<DiscoveryClient>>,
    pub hostname: String,
    pub analytics_start_time: i64,
}
