//! Client API Module Tests
//!
//! Calls the handlers directly with extracted arguments; no HTTP server needed.

#[cfg(test)]
mod tests {
    use crate::api::handlers::{
        handle_cache_snapshot, handle_delete, handle_get, handle_ignore_next, handle_list_replicas,
        handle_put, status_for,
    };
    use crate::api::protocol::{PutRequest, WriteResponse};
    use crate::error::KvError;
    use crate::tpc::coordinator::Coordinator;
    use crate::tpc::ring::ReplicaInfo;
    use axum::{
        Json,
        extract::{Extension, Path},
        http::StatusCode,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn coordinator() -> Arc<Coordinator> {
        Arc::new(Coordinator::new(4, 4, Duration::from_millis(500)))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&KvError::OversizedKey), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&KvError::OversizedValue), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&KvError::does_not_exist()), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&KvError::Aborted("@1:=x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&KvError::InsufficientReplicas { registered: 1 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&KvError::Network("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_put_without_replicas_is_unavailable() {
        let (status, Json(body)) = handle_put(
            Extension(coordinator()),
            Json(PutRequest {
                key: "a".into(),
                value: "1".into(),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.success);
        assert!(body.message.unwrap().contains("need 2"));
    }

    #[tokio::test]
    async fn test_oversized_key_is_bad_request() {
        let (status, Json(body)) = handle_put(
            Extension(coordinator()),
            Json(PutRequest {
                key: "k".repeat(257),
                value: "1".into(),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, WriteResponse::failed("Oversized key"));

        let (status, Json(body)) = handle_get(Extension(coordinator()), Path("k".repeat(257))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.value, None);

        let (status, _) = handle_delete(Extension(coordinator()), Path("k".repeat(257))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_replicas_in_ring_order() {
        let coordinator = coordinator();
        coordinator.register(ReplicaInfo::new(20, "127.0.0.1", 9002)).await;
        coordinator.register(ReplicaInfo::new(10, "127.0.0.1", 9001)).await;

        let (status, Json(body)) = handle_list_replicas(Extension(coordinator)).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<u64> = body.replicas.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_ignore_next_unknown_replica_is_not_found() {
        let (status, Json(body)) = handle_ignore_next(Extension(coordinator()), Path(7)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_cache_snapshot_lists_every_set() {
        let coordinator = coordinator();
        coordinator.cache().lock("a").await.put("a", "1");
        let set_id = coordinator.cache().set_id("a");

        let (status, Json(body)) = handle_cache_snapshot(Extension(coordinator)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.sets.len(), 4);
        assert!(body.sets.iter().all(|set| set.capacity == 4));

        let entries = &body.sets[set_id].entries;
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].key.as_str(), entries[0].value.as_str()), ("a", "1"));
        let others: usize = body.sets.iter().map(|set| set.entries.len()).sum();
        assert_eq!(others, 1);
    }
}
