//! Configuration for the document tree bridge
//!
//! Hosts embed [`BridgeConfig`] in their own configuration files; every field
//! has a default so a partial section deserializes cleanly.

pub mod bridge_config;

pub use bridge_config::*;
