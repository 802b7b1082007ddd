//! Configuration Module
//!
//! TOML-backed settings for the master and replica nodes. Every field has a
//! default, so a config file only needs to name what it changes; command-line
//! flags are applied on top by the binary.

pub mod settings;

pub use settings::{CacheConfig, CoordinatorConfig, ReplicaConfig};
