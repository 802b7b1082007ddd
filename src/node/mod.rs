//! Node Module
//!
//! Bootstrap for the two process roles. Each `start` wires the layers
//! together from a config and returns a handle owning the background tasks.
//!
//! ## Core Concepts
//! - **MasterNode**: coordinator, registration port and client HTTP API.
//! - **ReplicaNode**: recovery log replay, key server and participant port,
//!   followed by registration with the master.

pub mod master;
pub mod replica;

pub use master::MasterNode;
pub use replica::ReplicaNode;
