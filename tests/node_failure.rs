//! Node failure, administrative overrides, and re-replication

mod common;

use common::{start_cluster, test_bytes, upload_request};
use scatterfs::coordinator::metadata::ChunkRecord;
use scatterfs::coordinator::registry::{NodeEvent, NodeStatus};

const MIB: u64 = 1024 * 1024;

#[tokio::test]
async fn test_offline_node_recovery_and_download() {
    let mut cluster = start_cluster(4).await;
    let data = test_bytes(3 * MIB as usize, 41);

    let file = cluster
        .coordinator
        .upload(data.clone(), upload_request(MIB, 2))
        .await
        .unwrap();

    // Pick a node that holds at least one replica.
    let victim = cluster
        .synced_nodes(&ChunkRecord::id_for(&file.file_id, 0))
        .first()
        .cloned()
        .unwrap();

    cluster.coordinator.node_offline(&victim).unwrap();
    assert_eq!(
        cluster.events.try_recv().unwrap(),
        NodeEvent::Failed(victim.clone())
    );

    let status = cluster.coordinator.status().unwrap();
    assert_eq!(status.healthy_nodes, 3);
    assert_eq!(status.failed_nodes, 1);

    let report = cluster.recovery.handle_node_failure(&victim).await.unwrap();
    assert!(report.chunks_recovered > 0);
    assert_eq!(report.chunks_lost, 0);

    // Every chunk is back at full replication on live nodes only.
    for index in 0..file.total_chunks {
        let chunk_id = ChunkRecord::id_for(&file.file_id, index);
        let nodes = cluster.synced_nodes(&chunk_id);
        assert_eq!(nodes.len(), 2, "chunk {} not re-replicated", chunk_id);
        assert!(!nodes.contains(&victim));

        // Stale records referencing the failed node are gone.
        assert!(cluster
            .placements(&chunk_id)
            .iter()
            .all(|p| p.node_id != victim));
    }

    let downloaded = cluster.coordinator.download(&file.file_id).await.unwrap();
    assert_eq!(downloaded, data);
}

#[tokio::test]
async fn test_download_survives_offline_node_before_recovery() {
    let cluster = start_cluster(4).await;
    let data = test_bytes(3 * MIB as usize, 43);

    let file = cluster
        .coordinator
        .upload(data.clone(), upload_request(MIB, 2))
        .await
        .unwrap();

    let victim = cluster
        .synced_nodes(&ChunkRecord::id_for(&file.file_id, 1))
        .first()
        .cloned()
        .unwrap();
    cluster.agent(&victim).stop();
    cluster.coordinator.node_offline(&victim).unwrap();

    // No recovery has run yet; the second replica carries the download.
    let downloaded = cluster.coordinator.download(&file.file_id).await.unwrap();
    assert_eq!(downloaded, data);
}

#[tokio::test]
async fn test_node_online_override() {
    let cluster = start_cluster(3).await;

    cluster.coordinator.node_offline("node-0").unwrap();
    assert_eq!(
        cluster.registry.get("node-0").unwrap().status,
        NodeStatus::Failed
    );

    cluster.coordinator.node_online("node-0").unwrap();
    assert_eq!(
        cluster.registry.get("node-0").unwrap().status,
        NodeStatus::Healthy
    );

    // The revived node takes placements again.
    let file = cluster
        .coordinator
        .upload(test_bytes(1000, 47), upload_request(MIB, 3))
        .await
        .unwrap();
    let nodes = cluster.synced_nodes(&ChunkRecord::id_for(&file.file_id, 0));
    assert!(nodes.contains(&"node-0".to_string()));
}

#[tokio::test]
async fn test_offline_unknown_node() {
    let cluster = start_cluster(1).await;
    assert!(matches!(
        cluster.coordinator.node_offline("ghost"),
        Err(scatterfs::Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rejoin_emits_event() {
    let mut cluster = start_cluster(2).await;

    cluster.coordinator.node_offline("node-1").unwrap();
    assert_eq!(
        cluster.events.try_recv().unwrap(),
        NodeEvent::Failed("node-1".into())
    );

    cluster.coordinator.node_online("node-1").unwrap();
    assert_eq!(
        cluster.events.try_recv().unwrap(),
        NodeEvent::Rejoined("node-1".into())
    );

    // Exactly one event per transition.
    assert!(cluster.events.try_recv().is_err());
}
