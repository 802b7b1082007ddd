//! End-to-end: a master and two replicas on loopback, driven through the HTTP client.

use replicated_kv::client::KvClient;
use replicated_kv::config::{CoordinatorConfig, ReplicaConfig};
use replicated_kv::network::protocol::MessageType;
use replicated_kv::node::{MasterNode, ReplicaNode};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn master_config() -> CoordinatorConfig {
    CoordinatorConfig {
        registration_addr: "127.0.0.1:0".to_string(),
        http_addr: "127.0.0.1:0".to_string(),
        timeout_ms: 2000,
        retry_initial_ms: 10,
        retry_max_ms: 200,
        ..CoordinatorConfig::default()
    }
}

fn replica_config(id: u64, master: &MasterNode, dir: &Path) -> ReplicaConfig {
    ReplicaConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        master_addr: master.registration_addr().to_string(),
        log_path: dir.join(format!("replica-{}.log", id)),
        timeout_ms: 2000,
        ..ReplicaConfig::new(id)
    }
}

async fn log_kinds(replica: &ReplicaNode) -> Vec<MessageType> {
    replica
        .participant()
        .log()
        .lock()
        .await
        .entries()
        .iter()
        .map(|entry| entry.kind)
        .collect()
}

#[tokio::test]
async fn test_put_replicates_and_get_is_served_from_master_cache() {
    let dir = TempDir::new().unwrap();
    let master = MasterNode::start(&master_config()).await.unwrap();
    let r10 = ReplicaNode::start(&replica_config(10, &master, dir.path())).await.unwrap();
    let r20 = ReplicaNode::start(&replica_config(20, &master, dir.path())).await.unwrap();

    let client = KvClient::new(&master.http_addr().to_string(), Duration::from_secs(10)).unwrap();
    let ids: Vec<u64> = client.replicas().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![10, 20]);

    let (primary, successor) = master.coordinator().route("a").await.unwrap();
    assert_eq!(primary.id, 10);
    assert_eq!(successor.id, 20);

    let response = client.put("a", "1").await.unwrap();
    assert!(response.success, "{:?}", response.message);

    for replica in [&r10, &r20] {
        assert_eq!(
            log_kinds(replica).await,
            vec![MessageType::PutRequest, MessageType::Ready, MessageType::Commit]
        );
        assert_eq!(replica.participant().server().get("a").await.unwrap(), "1");
    }

    assert_eq!(client.get("a").await.unwrap().as_deref(), Some("1"));
    let cached: Vec<(String, String)> = client
        .cache_snapshot()
        .await
        .unwrap()
        .into_iter()
        .flat_map(|set| set.entries)
        .map(|entry| (entry.key, entry.value))
        .collect();
    assert_eq!(cached, vec![("a".to_string(), "1".to_string())]);

    // With both replicas gone the value can only come from the master's cache.
    r10.shutdown();
    r20.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.get("a").await.unwrap().as_deref(), Some("1"));

    master.shutdown();
}

#[tokio::test]
async fn test_ignored_vote_aborts_and_delete_removes() {
    let dir = TempDir::new().unwrap();
    let master = MasterNode::start(&master_config()).await.unwrap();
    let r10 = ReplicaNode::start(&replica_config(10, &master, dir.path())).await.unwrap();
    let r20 = ReplicaNode::start(&replica_config(20, &master, dir.path())).await.unwrap();
    let client = KvClient::new(&master.http_addr().to_string(), Duration::from_secs(10)).unwrap();

    assert!(client.ignore_next(20).await.unwrap().success);
    let response = client.put("b", "2").await.unwrap();
    assert!(!response.success);
    let message = response.message.unwrap();
    assert!(message.contains("@10:="), "{}", message);
    assert!(message.contains("@20:=IgnoreNext Error"), "{}", message);
    assert_eq!(client.get("b").await.unwrap(), None);

    assert!(client.put("b", "3").await.unwrap().success);
    assert_eq!(client.get("b").await.unwrap().as_deref(), Some("3"));

    assert!(client.delete("b").await.unwrap().success);
    assert_eq!(client.get("b").await.unwrap(), None);

    let response = client.delete("b").await.unwrap();
    assert!(!response.success);
    assert!(response.message.unwrap().contains("Does not exist"));

    r10.shutdown();
    r20.shutdown();
    master.shutdown();
}

#[tokio::test]
async fn test_restarted_replica_recovers_from_its_log() {
    let dir = TempDir::new().unwrap();
    let master = MasterNode::start(&master_config()).await.unwrap();
    let r10 = ReplicaNode::start(&replica_config(10, &master, dir.path())).await.unwrap();
    let r20 = ReplicaNode::start(&replica_config(20, &master, dir.path())).await.unwrap();
    let client = KvClient::new(&master.http_addr().to_string(), Duration::from_secs(10)).unwrap();

    assert!(client.put("k", "v").await.unwrap().success);

    r20.shutdown();
    let r20 = ReplicaNode::start(&replica_config(20, &master, dir.path())).await.unwrap();

    assert_eq!(r20.participant().server().get("k").await.unwrap(), "v");
    assert_eq!(master.coordinator().replicas().await.len(), 2);

    // The re-registered address is used for the next operation.
    assert!(client.put("k", "w").await.unwrap().success);
    assert_eq!(r20.participant().server().get("k").await.unwrap(), "w");

    r10.shutdown();
    r20.shutdown();
    master.shutdown();
}

#[tokio::test]
async fn test_replica_starts_from_dumped_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("replica-20.snapshot");
    let master = MasterNode::start(&master_config()).await.unwrap();
    let r10 = ReplicaNode::start(&replica_config(10, &master, dir.path())).await.unwrap();
    let r20 = ReplicaNode::start(&replica_config(20, &master, dir.path())).await.unwrap();
    let client = KvClient::new(&master.http_addr().to_string(), Duration::from_secs(10)).unwrap();

    assert!(client.put("k", "v").await.unwrap().success);
    r20.shutdown();
    r20.dump_snapshot(&snapshot).await.unwrap();

    // A fresh log: the value can only come from the snapshot.
    let config = ReplicaConfig {
        log_path: dir.path().join("replica-20-fresh.log"),
        snapshot_path: Some(snapshot),
        ..replica_config(20, &master, dir.path())
    };
    let r20 = ReplicaNode::start(&config).await.unwrap();
    assert_eq!(r20.participant().server().get("k").await.unwrap(), "v");
    assert!(log_kinds(&r20).await.is_empty());

    r10.shutdown();
    r20.shutdown();
    master.shutdown();
}

#[tokio::test]
async fn test_writes_need_two_replicas() {
    let dir = TempDir::new().unwrap();
    let master = MasterNode::start(&master_config()).await.unwrap();
    let r10 = ReplicaNode::start(&replica_config(10, &master, dir.path())).await.unwrap();
    let client = KvClient::new(&master.http_addr().to_string(), Duration::from_secs(10)).unwrap();

    let response = client.put("a", "1").await.unwrap();
    assert!(!response.success);
    assert!(response.message.unwrap().contains("need 2, have 1"));
    assert!(client.get("a").await.is_err());

    r10.shutdown();
    master.shutdown();
}
