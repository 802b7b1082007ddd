//! Two-Phase Commit Module
//!
//! Keeps the two replicas of every key in step.
//!
//! ## Core Concepts
//! - **Ring**: replicas sorted by id; a key's primary is the first replica whose id
//!   is not below the key's hash, and its successor is the next one around the ring.
//! - **Coordinator**: assigns operation ids, collects votes from both replicas and
//!   delivers the decision until both acknowledge.
//! - **Participant**: votes on requests, applies committed ones and records each
//!   step in a recovery log before replying.
//! - **Recovery log**: durable history that a restarted replica replays, leaving
//!   at most one undecided operation to finish when the decision arrives.

pub mod coordinator;
pub mod log;
pub mod participant;
pub mod ring;
