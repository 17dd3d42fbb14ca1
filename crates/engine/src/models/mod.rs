//! Typed data model for topology snapshots and diagnostic reports

pub mod diagnostics;
pub mod topology;
