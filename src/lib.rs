//! Operational-state aggregation and query front-end for a distributed
//! analytics fabric: merges per-partition UVE state from producers (C3/C4),
//! brokers ad hoc queries against a query-engine fleet (C5), serves a
//! virtual-table catalog (C6), coordinates cluster-wide data purges (C7),
//! and exposes all of it over a REST surface (C8).

pub mod alarm_ack;
pub mod api;
pub mod catalog;
pub mod config;
pub mod connection_state;
pub mod discovery;
pub mod error;
pub mod kv;
pub mod partition_map;
pub mod purge;
pub mod purge_backend;
pub mod query;
pub mod uve;
