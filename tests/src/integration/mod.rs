//! Cross-crate integration flows.

pub mod config_flows;
pub mod event_flows;
pub mod registry_flows;
