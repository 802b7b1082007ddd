//! Client API Protocol
//!
//! Endpoints and Data Transfer Objects (DTOs) served by the master's HTTP API.
//! Every body is JSON.

use serde::{Deserialize, Serialize};

use crate::storage::cache::CacheSetSnapshot;
use crate::tpc::ring::ReplicaInfo;

// --- API Endpoints ---

/// Public endpoint for client writes.
pub const ENDPOINT_PUT: &str = "/put";
/// Public endpoint for client reads; the key is the last path segment.
pub const ENDPOINT_GET: &str = "/get";
/// Public endpoint for client deletes; the key is the last path segment.
pub const ENDPOINT_DELETE: &str = "/delete";
/// Registered replicas in ring order.
pub const ENDPOINT_REPLICAS: &str = "/replicas";
/// Failure injection: the replica drops its next 2PC message.
pub const ENDPOINT_IGNORE_NEXT: &str = "/ignore_next";
/// Contents of the master's cache, set by set.
pub const ENDPOINT_CACHE: &str = "/cache";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub value: String,
}

/// Outcome of a put, delete or ignore-next call.
///
/// `message` carries the error text when `success` is false; for an aborted
/// write that is every replica's reason, one `@<id>:=<reason>` per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WriteResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetResponse {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaListResponse {
    pub replicas: Vec<ReplicaInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSnapshotResponse {
    pub sets: Vec<CacheSetSnapshot>,
}
