//! Storage Module
//!
//! Node-local state: a bounded cache in front of a backing store.
//!
//! ## Core Concepts
//! - **Cache**: set-associative, second-chance (CLOCK) eviction, one lock per set.
//! - **Store**: the durable key-value map behind the cache, with simulated latency
//!   and dump/restore to a flat key-value file.
//! - **KeyServer**: combines the two so that, once an operation returns, the cache
//!   and the store agree on every key it touched.

pub mod cache;
pub mod server;
pub mod store;

#[cfg(test)]
mod tests;
