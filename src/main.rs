//! Process entry point: load configuration, start the Raft node, the peer
//! bootstrap service, and the TCP/Unix listeners, then wait for shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pouchd::auth::{Authenticator, ClientRegistry, Ed448RustKeys};
use pouchd::cluster::ClusterHandle;
use pouchd::config::Config;
use pouchd::connection::handle_connection;
use pouchd::peer::{send_join, serve_peer_udp};
use pouchd::raft::{start_raft_node, RaftNode};
use pouchd::store::{Node, Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(node_id = %config.cluster.node_id, addr = %config.cluster.addr, "starting");

    // One Store instance is shared by the Raft state machine (which
    // mutates it on every committed entry) and every Node the listeners
    // use for local reads — they must observe the same data.
    let store = Arc::new(Store::new());
    let cluster_handle = ClusterHandle::new(config.cluster.node_id.clone());

    let peers: Vec<(String, String)> = config
        .cluster
        .peer_addrs
        .iter()
        .map(|p| (p.node_id.clone(), p.addr.clone()))
        .collect();

    let raft_node = start_raft_node(
        config.cluster.node_id.clone(),
        config.cluster.addr.clone(),
        peers,
        store.clone(),
        cluster_handle,
    )
    .await;

    if let Some(first_peer) = config.cluster.peer_addrs.first() {
        send_join(&first_peer.addr, &config.cluster.node_id, &config.cluster.addr).await;
    }

    tokio::spawn(serve_peer_udp(
        config.cluster.addr.clone(),
        Arc::new(Node::new(store.clone(), (*raft_node).clone())),
    ));

    let mut client_keys = HashMap::new();
    for (id, client) in &config.auth.clients {
        client_keys.insert(id.clone(), client.hex_public_key.clone());
    }
    let authenticator = Arc::new(Authenticator::new(
        Ed448RustKeys,
        ClientRegistry::new(client_keys),
    ));

    if config.tcp.enabled {
        tokio::spawn(run_tcp_listener(
            config.tcp.addr.clone(),
            Arc::new(Node::new(store.clone(), (*raft_node).clone())),
            authenticator.clone(),
        ));
    }

    if config.unix.enabled {
        tokio::spawn(run_unix_listener(
            config.unix.path.clone(),
            Arc::new(Node::new(store.clone(), (*raft_node).clone())),
            authenticator.clone(),
        ));
    }

    if config.ws.enabled || config.quic.enabled {
        warn!("ws/quic transports are configured but not implemented; ignoring");
    }

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
}

async fn run_tcp_listener(
    addr: String,
    node: Arc<Node<RaftNode>>,
    authenticator: Arc<Authenticator<Ed448RustKeys>>,
) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!(addr = %addr, error = %e, "failed to bind TCP listener");
            return;
        }
    };
    info!(addr = %addr, "TCP listener started");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "TCP accept failed");
                continue;
            }
        };
        let node = node.clone();
        let authenticator = authenticator.clone();
        tokio::spawn(async move {
            info!(peer = %peer, "connection accepted");
            handle_connection(stream, node, authenticator).await;
        });
    }
}

async fn run_unix_listener(
    path: String,
    node: Arc<Node<RaftNode>>,
    authenticator: Arc<Authenticator<Ed448RustKeys>>,
) {
    let _ = std::fs::remove_file(&path);
    let listener = match UnixListener::bind(&path) {
        Ok(l) => l,
        Err(e) => {
            warn!(path = %path, error = %e, "failed to bind unix listener");
            return;
        }
    };
    info!(path = %path, "unix listener started");
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unix accept failed");
                continue;
            }
        };
        let node = node.clone();
        let authenticator = authenticator.clone();
        tokio::spawn(async move {
            handle_connection(stream, node, authenticator).await;
        });
    }
}
