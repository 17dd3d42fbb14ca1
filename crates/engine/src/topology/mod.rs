//! Topology graph construction from raw cluster resources

mod builder;

pub use builder::TopologyBuilder;
