//! Cluster status tracking.
//!
//! Grounded in the reference `ClusterHandle`/`NodeState` pair: a cheap-to-
//! clone, mutex-backed handle the consensus layer pushes state transitions
//! into, logged on every change. `NodeState` is reduced to the states
//! openraft's own `ServerState` actually distinguishes (Leader vs. every
//! other non-leader state); the Consul discovery mode and HTTP health
//! endpoint are dropped — peers come from the JSON config's
//! `cluster.peer_addrs`, not service discovery, and nothing in this spec
//! calls for an HTTP surface alongside the wire protocols.

use std::sync::{Arc, Mutex};

use tracing::info;

/// This node's last-observed Raft role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Still forming the cluster or in an election; not yet routing writes.
    Forming,
    /// Replicating from the current leader.
    Follower,
    /// Accepting client writes and driving replication.
    Leader,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Forming => "forming",
            NodeState::Follower => "follower",
            NodeState::Leader => "leader",
        }
    }
}

/// Shared cluster state handle, updated by the background task in
/// [`crate::raft`] that watches `Raft::metrics()`.
#[derive(Clone)]
pub struct ClusterHandle {
    state: Arc<Mutex<NodeState>>,
    node_id: String,
}

impl ClusterHandle {
    pub fn new(node_id: String) -> Self {
        ClusterHandle {
            state: Arc::new(Mutex::new(NodeState::Forming)),
            node_id,
        }
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_state(&self, new_state: NodeState) {
        let old = {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let old = *guard;
            *guard = new_state;
            old
        };
        if old != new_state {
            info!(
                node_id = %self.node_id,
                old_state = old.as_str(),
                new_state = new_state.as_str(),
                "cluster node state changed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_forming() {
        let handle = ClusterHandle::new("n1".to_string());
        assert_eq!(handle.state(), NodeState::Forming);
    }

    #[test]
    fn state_transitions_are_observed_across_clones() {
        let handle = ClusterHandle::new("n1".to_string());
        let clone = handle.clone();
        handle.set_state(NodeState::Leader);
        assert_eq!(clone.state(), NodeState::Leader);
    }

    #[test]
    fn node_state_strings() {
        assert_eq!(NodeState::Forming.as_str(), "forming");
        assert_eq!(NodeState::Follower.as_str(), "follower");
        assert_eq!(NodeState::Leader.as_str(), "leader");
    }
}
