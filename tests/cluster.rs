//! Three real `openraft` nodes wired over the TCP transport, proving a
//! write proposed through any node's consensus handle commits and is
//! visible on every replica's own store once applied.

use std::sync::Arc;
use std::time::Duration;

use pouchd::cluster::ClusterHandle;
use pouchd::raft::start_raft_node;
use pouchd::store::{ConsensusHandle, Store};

async fn wait_for_leader(nodes: &[Arc<pouchd::raft::RaftNode>]) -> usize {
    for _ in 0..100 {
        for (i, n) in nodes.iter().enumerate() {
            if n.is_leader() {
                return i;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("no leader elected within the test deadline");
}

#[tokio::test]
async fn three_node_cluster_converges_on_a_write() {
    let addrs = [
        "127.0.0.1:18801".to_string(),
        "127.0.0.1:18802".to_string(),
        "127.0.0.1:18803".to_string(),
    ];
    let ids = ["node-a".to_string(), "node-b".to_string(), "node-c".to_string()];

    let stores: Vec<Arc<Store>> = (0..3).map(|_| Arc::new(Store::new())).collect();

    let mut nodes = Vec::new();
    for i in 0..3 {
        let peers: Vec<(String, String)> = (0..3)
            .filter(|&j| j != i)
            .map(|j| (ids[j].clone(), addrs[j].clone()))
            .collect();
        let handle = ClusterHandle::new(ids[i].clone());
        let node = start_raft_node(
            ids[i].clone(),
            addrs[i].clone(),
            peers,
            stores[i].clone(),
            handle,
        )
        .await;
        nodes.push(node);
    }

    let leader_idx = wait_for_leader(&nodes).await;

    nodes[leader_idx]
        .propose("SET greeting hello")
        .await
        .expect("leader commit succeeds");

    for _ in 0..50 {
        if stores.iter().all(|s| s.get_for_test("greeting").is_some()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for (i, store) in stores.iter().enumerate() {
        assert!(
            store.get_for_test("greeting").is_some(),
            "replica {i} never applied the committed write"
        );
    }
}
