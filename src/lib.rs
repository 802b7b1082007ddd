//! Replicated Key-Value Store Library
//!
//! Every key is stored on two replicas, and the master keeps them in step
//! with two-phase commit. This crate holds the layers behind the
//! `replicated-kv` binary (`main.rs`).
//!
//! ## Architecture Modules
//!
//! - **`storage`**: Node-local state. A set-associative second-chance cache in front of
//!   a backing store, combined by the `KeyServer`.
//! - **`network`**: The JSON wire message, one-exchange-per-connection transport and
//!   the socket server with its bounded worker pool.
//! - **`tpc`**: Two-phase commit. Replica ring, coordinator, participant and the
//!   durable recovery log that lets a replica finish an interrupted operation.
//! - **`api`**: The master's HTTP API for clients; **`client`** is its counterpart.
//! - **`config`** / **`node`**: TOML settings and the bootstrap of master and replica
//!   processes.
//! - **`error`**: The shared error taxonomy.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod tpc;
