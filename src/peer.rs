//! Peer bootstrap protocol: a UDP listener co-located with the Raft TCP
//! transport on the same configured cluster address.
//!
//! Grounded in §4.5: a `JOIN nodeId addr` datagram gets a JSON `{ok,err}`
//! reply; any other datagram is a write command forwarded by a follower to
//! the leader, and gets the raw formatted response line back. Datagrams are
//! capped at 1024 bytes. Startup JOIN to a configured peer is best-effort —
//! no retry on failure, per the design note.

use std::sync::Arc;

use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::raft::RaftNode;
use crate::store::{ConsensusHandle, Node};

const MAX_DATAGRAM: usize = 1024;

#[derive(Serialize)]
struct JoinReply {
    ok: bool,
    err: Option<String>,
}

/// Forwards a write command line to the leader over UDP and returns its
/// raw reply line verbatim. Used by a follower's write path.
pub async fn forward_write(leader_addr: &str, line: &str) -> Result<String, String> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| e.to_string())?;
    socket.connect(leader_addr).await.map_err(|e| e.to_string())?;
    socket.send(line.as_bytes()).await.map_err(|e| e.to_string())?;
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let n = socket.recv(&mut buf).await.map_err(|e| e.to_string())?;
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}

/// Sends a one-shot JOIN request to `peer_addr` at startup. Any failure
/// (unreachable peer, rejected join) is logged and left alone — there is
/// no retry loop.
pub async fn send_join(peer_addr: &str, node_id: &str, addr: &str) {
    let line = format!("JOIN {node_id} {addr}");
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to bind UDP socket for startup JOIN");
            return;
        }
    };
    if let Err(e) = socket.connect(peer_addr).await {
        warn!(peer = peer_addr, error = %e, "failed to reach peer for startup JOIN");
        return;
    }
    if let Err(e) = socket.send(line.as_bytes()).await {
        warn!(peer = peer_addr, error = %e, "failed to send startup JOIN request");
        return;
    }
    let mut buf = vec![0u8; MAX_DATAGRAM];
    match socket.recv(&mut buf).await {
        Ok(n) => info!(
            peer = peer_addr,
            reply = %String::from_utf8_lossy(&buf[..n]),
            "startup JOIN acknowledged"
        ),
        Err(e) => warn!(peer = peer_addr, error = %e, "no reply to startup JOIN request"),
    }
}

/// Serves the peer bootstrap protocol on `addr`.
pub async fn serve_peer_udp(addr: String, node: Arc<Node<RaftNode>>) {
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!(addr = %addr, error = %e, "failed to bind peer bootstrap socket");
            return;
        }
    };
    info!(addr = %addr, "peer bootstrap listening");

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "peer bootstrap recv failed");
                continue;
            }
        };
        let line = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        let reply = handle_datagram(&node, &line).await;
        if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
            warn!(peer = %from, error = %e, "failed to send peer bootstrap reply");
        }
    }
}

async fn handle_datagram<C: ConsensusHandle>(node: &Arc<Node<C>>, line: &str) -> String {
    let mut parts = line.splitn(3, ' ');
    if parts.next() == Some("JOIN") {
        let reply = match (parts.next(), parts.next()) {
            (Some(node_id), Some(addr)) => match node.consensus().join(node_id, addr).await {
                Ok(()) => JoinReply { ok: true, err: None },
                Err(e) => JoinReply {
                    ok: false,
                    err: Some(e.to_string()),
                },
            },
            _ => JoinReply {
                ok: false,
                err: Some("invalid command".to_string()),
            },
        };
        serde_json::to_string(&reply)
            .unwrap_or_else(|_| "{\"ok\":false,\"err\":\"internal error\"}".to_string())
    } else {
        node.apply_cmd(line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;

    struct AlwaysJoins;
    #[async_trait::async_trait]
    impl ConsensusHandle for AlwaysJoins {
        fn is_leader(&self) -> bool {
            true
        }
        async fn propose(&self, line: &str) -> Result<String, StoreError> {
            Ok(format!("COUNT 1 from {line}"))
        }
        async fn forward_to_leader(&self, _line: &str) -> Result<String, StoreError> {
            Err(StoreError::Consensus("no leader".to_string()))
        }
        async fn join(&self, _node_id: &str, _addr: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn join_datagram_replies_with_ok_json() {
        let node = Arc::new(Node::new(Arc::new(crate::store::Store::new()), AlwaysJoins));
        let reply = handle_datagram(&node, "JOIN node-b 127.0.0.1:9001").await;
        assert_eq!(reply, r#"{"ok":true,"err":null}"#);
    }

    #[tokio::test]
    async fn malformed_join_replies_with_error_json() {
        let node = Arc::new(Node::new(Arc::new(crate::store::Store::new()), AlwaysJoins));
        let reply = handle_datagram(&node, "JOIN only-one-arg").await;
        assert_eq!(reply, r#"{"ok":false,"err":"invalid command"}"#);
    }

    #[tokio::test]
    async fn non_join_datagram_is_applied_as_a_command() {
        let node = Arc::new(Node::new(Arc::new(crate::store::Store::new()), AlwaysJoins));
        let reply = handle_datagram(&node, "SET k v").await;
        assert_eq!(reply, "COUNT 1 from SET k v");
    }
}
