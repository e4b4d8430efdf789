//! REST handler modules, one per route group.

pub mod alarms;
pub mod dyn_uve;
pub mod misc;
pub mod purge;
pub mod query;
pub mod tables;
pub mod uves;
