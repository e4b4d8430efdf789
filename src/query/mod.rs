//! Query Broker.

pub mod broker;
pub mod qid;

pub use broker::{QueryBroker, SubmitOutcome, OVERLAY_TO_UNDERLAY_FLOW_MAP, STAT_TABLE_PREFIX};
pub use qid::{generate_qid, ip_from_qid};
