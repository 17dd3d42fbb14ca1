//! Rule-based diagnostic evaluation of topology snapshots

mod runner;

pub use runner::{DiagnosticRunner, RESTART_LOOP_THRESHOLD};
