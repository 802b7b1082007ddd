use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{
    CacheSnapshotResponse, GetResponse, PutRequest, ReplicaListResponse, WriteResponse,
};
use crate::error::KvError;
use crate::tpc::coordinator::Coordinator;

/// HTTP status for a failed store operation.
pub fn status_for(err: &KvError) -> StatusCode {
    match err {
        KvError::OversizedKey | KvError::OversizedValue | KvError::MalformedMessage(_) => {
            StatusCode::BAD_REQUEST
        }
        KvError::NotFound(_) => StatusCode::NOT_FOUND,
        KvError::Aborted(_) => StatusCode::CONFLICT,
        KvError::InsufficientReplicas { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn write_result(result: Result<(), KvError>, action: &str, key: &str) -> (StatusCode, Json<WriteResponse>) {
    match result {
        Ok(()) => (StatusCode::OK, Json(WriteResponse::ok())),
        Err(e) => {
            tracing::warn!("Failed to {} {}: {}", action, key, e);
            (status_for(&e), Json(WriteResponse::failed(e.to_string())))
        }
    }
}

pub async fn handle_put(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<WriteResponse>) {
    let result = coordinator.put(&req.key, &req.value).await;
    write_result(result, "put", &req.key)
}

pub async fn handle_delete(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<WriteResponse>) {
    let result = coordinator.del(&key).await;
    write_result(result, "delete", &key)
}

pub async fn handle_get(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<GetResponse>) {
    match coordinator.handle_get(&key).await {
        Ok(value) => (
            StatusCode::OK,
            Json(GetResponse {
                key,
                value: Some(value),
                message: None,
            }),
        ),
        Err(e) => {
            if !e.is_not_found() {
                tracing::warn!("Failed to get {}: {}", key, e);
            }
            (
                status_for(&e),
                Json(GetResponse {
                    key,
                    value: None,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_list_replicas(
    Extension(coordinator): Extension<Arc<Coordinator>>,
) -> (StatusCode, Json<ReplicaListResponse>) {
    let replicas = coordinator.replicas().await;
    (StatusCode::OK, Json(ReplicaListResponse { replicas }))
}

pub async fn handle_ignore_next(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(replica_id): Path<u64>,
) -> (StatusCode, Json<WriteResponse>) {
    let result = coordinator.ignore_next(replica_id).await;
    write_result(result, "ignore-next on replica", &replica_id.to_string())
}

pub async fn handle_cache_snapshot(
    Extension(coordinator): Extension<Arc<Coordinator>>,
) -> (StatusCode, Json<CacheSnapshotResponse>) {
    let sets = coordinator.cache().snapshot().await;
    (StatusCode::OK, Json(CacheSnapshotResponse { sets }))
}
