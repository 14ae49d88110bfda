//! JetStream operator - wiring for the Stream controller binary

pub mod config;
pub mod controller_runner;
pub mod crds;
