//! Network Module
//!
//! Message schema and the plumbing that moves messages between nodes.
//!
//! ## Core Concepts
//! - **Protocol**: `KvMessage` is the single tagged record used for client reads,
//!   2PC phases, registration and failure injection.
//! - **Transport**: one request/response pair per TCP connection; the end of a
//!   frame is signalled by shutting down the write half.
//! - **Server**: an accept loop with a fixed-size worker pool that dispatches
//!   each decoded message to a handler closure.

pub mod protocol;
pub mod server;
pub mod transport;
