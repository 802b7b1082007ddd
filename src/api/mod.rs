//! Client API Module
//!
//! The master's HTTP front door. Clients never speak the replica socket
//! protocol; they call these endpoints and the coordinator does the rest.

pub mod handlers;
pub mod protocol;

use axum::{
    Extension, Router,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::tpc::coordinator::Coordinator;
use handlers::{
    handle_cache_snapshot, handle_delete, handle_get, handle_ignore_next, handle_list_replicas,
    handle_put,
};

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/put", post(handle_put))
        .route("/get/:key", get(handle_get))
        .route("/delete/:key", delete(handle_delete))
        .route("/replicas", get(handle_list_replicas))
        .route("/ignore_next/:id", post(handle_ignore_next))
        .route("/cache", get(handle_cache_snapshot))
        .layer(Extension(coordinator))
}

#[cfg(test)]
mod tests;
