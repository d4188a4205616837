//! Consensus adapter: a thin wrapper over the `openraft` crate providing
//! config, transport binding, log/stable/snapshot stores, and bootstrap.
//!
//! ## Storage
//!
//! Uses openraft's `Adaptor` to bridge an in-memory combined `RaftStorage`
//! implementation (v1 API) into the v2 `RaftLogStorage` + `RaftStateMachine`
//! split interface required by `Raft::new`, exactly as the teacher does.
//! The state machine delegates every apply/snapshot/restore call straight
//! through to [`crate::store::Store`] — the FSM trait the design notes call
//! for to break the store/consensus cycle.
//!
//! ## Transport
//!
//! `AppendEntries`, `Vote`, and `InstallSnapshot` requests are JSON-encoded
//! and sent over a length-prefixed TCP connection to the peer's configured
//! cluster address — a TCP transport bound to that address, per §4.4,
//! replacing the teacher's gRPC transport (dropped along with tonic/prost;
//! see DESIGN.md).
//!
//! ## Implementation note on async traits
//!
//! openraft uses RPITIT (return-position impl Trait in trait) rather than
//! `async_trait::async_trait`. Implementations of its traits must use plain
//! `async fn`, matching the expected signature.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::ops::RangeBounds;
use std::sync::{Arc, Mutex};

use openraft::error::{InstallSnapshotError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::storage::{Adaptor, RaftLogReader, RaftSnapshotBuilder, RaftStorage};
use openraft::{
    AnyError, BasicNode, Entry, LogId, LogState, RaftLogId, Snapshot, SnapshotMeta, StorageError,
    StoredMembership, TokioRuntime, Vote,
};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::cluster::{ClusterHandle, NodeState};
use crate::errors::StoreError;
use crate::store::{ConsensusHandle, Store, RAFT_APPLY_TIMEOUT};

// ── Type configuration ─────────────────────────────────────────────────

// The `declare_raft_types!` macro generates the TypeConfig struct and all
// required trait impls. `D` is the raw request line submitted for
// consensus (§4.3: "submit the original line, not a re-serialized
// variant"); `R` is the formatted response line the apply function
// produces.
openraft::declare_raft_types!(
    pub TypeConfig:
        D            = String,
        R            = String,
        NodeId       = u64,
        Node         = BasicNode,
        Entry        = Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

pub type NodeId = u64;
pub type RaftInstance = openraft::Raft<TypeConfig>;

/// Derives a stable u64 node ID from a human-readable string identifier
/// (the configured `node_id`, which defaults to a UUIDv7).
pub fn node_id_from_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut h);
    h.finish()
}

// ── In-memory combined storage (openraft v1 RaftStorage) ────────────────

/// Combined in-memory Raft storage: log entries + a handle to the FSM.
///
/// Wrapped by `openraft::storage::Adaptor::new(store)` to produce the v2
/// `(RaftLogStorage, RaftStateMachine)` split required by `Raft::new`.
pub struct MemStorage {
    vote: Option<Vote<NodeId>>,
    log: BTreeMap<u64, Entry<TypeConfig>>,
    committed: Option<LogId<NodeId>>,
    last_purged: Option<LogId<NodeId>>,
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, BasicNode>,
    /// The replicated store this Raft instance drives. Apply/snapshot/
    /// restore all delegate here.
    fsm: Arc<Store>,
    /// Last two built snapshots, retained per §4.4.
    snapshots: Vec<Snapshot<TypeConfig>>,
}

impl MemStorage {
    pub fn new(fsm: Arc<Store>) -> Self {
        MemStorage {
            vote: None,
            log: BTreeMap::new(),
            committed: None,
            last_purged: None,
            last_applied: None,
            last_membership: StoredMembership::default(),
            fsm,
            snapshots: Vec::new(),
        }
    }
}

impl RaftLogReader<TypeConfig> for MemStorage {
    async fn try_get_log_entries<RB>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
    where
        RB: RangeBounds<u64> + Clone + std::fmt::Debug + Send,
    {
        Ok(self.log.range(range).map(|(_, e)| e.clone()).collect())
    }
}

/// Log reader backed by a snapshot of the log at a point in time.
pub struct MemLogReader {
    log: BTreeMap<u64, Entry<TypeConfig>>,
}

impl RaftLogReader<TypeConfig> for MemLogReader {
    async fn try_get_log_entries<RB>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
    where
        RB: RangeBounds<u64> + Clone + std::fmt::Debug + Send,
    {
        Ok(self.log.range(range).map(|(_, e)| e.clone()).collect())
    }
}

/// Snapshot builder: serializes the FSM's key -> value map to JSON.
pub struct MemSnapshotBuilder {
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, BasicNode>,
    fsm: Arc<Store>,
}

impl RaftSnapshotBuilder<TypeConfig> for MemSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let data = self.fsm.snapshot().unwrap_or_default();

        let snap_id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .to_string();

        Ok(Snapshot {
            meta: SnapshotMeta {
                last_log_id: self.last_applied,
                last_membership: self.last_membership.clone(),
                snapshot_id: snap_id,
            },
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

/// openraft v1 `RaftStorage` implementation for `MemStorage`. Method names
/// follow the v1 API (`append_to_log`, `apply_to_state_machine`, etc.),
/// wrapped by `Adaptor::new(store)` to produce the v2 split traits.
impl RaftStorage<TypeConfig> for MemStorage {
    type LogReader = MemLogReader;
    type SnapshotBuilder = MemSnapshotBuilder;

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.vote = Some(*vote);
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        Ok(self.vote)
    }

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last = self.log.values().next_back().map(|e| *e.get_log_id());
        Ok(LogState {
            last_purged_log_id: self.last_purged,
            last_log_id: last,
        })
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<NodeId>>,
    ) -> Result<(), StorageError<NodeId>> {
        self.committed = committed;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        Ok(self.committed)
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        MemLogReader {
            log: self.log.clone(),
        }
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + Send,
    {
        for entry in entries {
            self.log.insert(entry.get_log_id().index, entry);
        }
        Ok(())
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId<NodeId>,
    ) -> Result<(), StorageError<NodeId>> {
        self.log.retain(|&idx, _| idx < log_id.index);
        Ok(())
    }

    async fn purge_logs_upto(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.log.retain(|&idx, _| idx > log_id.index);
        self.last_purged = Some(log_id);
        Ok(())
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, BasicNode>), StorageError<NodeId>>
    {
        Ok((self.last_applied, self.last_membership.clone()))
    }

    /// Applies committed entries in log-index order. Membership entries
    /// are bookkeeping only; `Normal` entries are raw request lines handed
    /// to [`Store::apply_line`], whose return value becomes the entry's
    /// response — this is what a leader's blocked `propose` call and a
    /// follower's log replay both observe.
    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<TypeConfig>],
    ) -> Result<Vec<String>, StorageError<NodeId>> {
        let mut responses = Vec::with_capacity(entries.len());

        for entry in entries {
            self.last_applied = Some(*entry.get_log_id());

            match &entry.payload {
                openraft::EntryPayload::Blank => responses.push(String::new()),
                openraft::EntryPayload::Normal(line) => {
                    responses.push(self.fsm.apply_line(line));
                }
                openraft::EntryPayload::Membership(m) => {
                    self.last_membership =
                        StoredMembership::new(Some(*entry.get_log_id()), m.clone());
                    responses.push(String::new());
                }
            }
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        MemSnapshotBuilder {
            last_applied: self.last_applied,
            last_membership: self.last_membership.clone(),
            fsm: self.fsm.clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        let bytes = snapshot.get_ref().clone();
        if let Err(e) = self.fsm.restore(&bytes) {
            warn!(error = %e, "snapshot restore failed");
        }
        self.last_applied = meta.last_log_id;
        self.last_membership = meta.last_membership.clone();

        let installed = Snapshot {
            meta: meta.clone(),
            snapshot: Box::new(Cursor::new(bytes)),
        };
        self.snapshots.push(installed);
        if self.snapshots.len() > 2 {
            self.snapshots.remove(0);
        }
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        Ok(self.snapshots.last().cloned())
    }
}

// ── TCP network transport ────────────────────────────────────────────────

const RPC_APPEND_ENTRIES: u8 = 0;
const RPC_VOTE: u8 = 1;
const RPC_INSTALL_SNAPSHOT: u8 = 2;

fn unreachable(msg: impl std::fmt::Display) -> Unreachable {
    Unreachable::new(&AnyError::error(msg.to_string()))
}

async fn send_rpc(
    addr: &str,
    tag: u8,
    payload: Vec<u8>,
) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_u8(tag).await?;
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(&payload).await?;
    let resp_len = stream.read_u32().await?;
    let mut buf = vec![0u8; resp_len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

fn decode_rpc_result<T: for<'de> Deserialize<'de>>(
    buf: &[u8],
) -> Result<T, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
    let result: Result<T, String> =
        serde_json::from_slice(buf).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
    result.map_err(|e| RPCError::Unreachable(unreachable(e)))
}

/// Per-peer TCP connection implementing openraft's `RaftNetwork`. Dials
/// fresh for every RPC; the peer's process is long-lived so a connect
/// failure surfaces promptly as `Unreachable` rather than hanging on a
/// stale pooled connection.
pub struct TcpNetwork {
    target_addr: String,
}

impl RaftNetwork<TypeConfig> for TcpNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let payload =
            serde_json::to_vec(&rpc).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let buf = send_rpc(&self.target_addr, RPC_APPEND_ENTRIES, payload)
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        decode_rpc_result(&buf)
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let payload =
            serde_json::to_vec(&rpc).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let buf = send_rpc(&self.target_addr, RPC_VOTE, payload)
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        decode_rpc_result(&buf)
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        let payload =
            serde_json::to_vec(&rpc).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let buf = send_rpc(&self.target_addr, RPC_INSTALL_SNAPSHOT, payload)
            .await
            .map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        let result: Result<InstallSnapshotResponse<NodeId>, String> =
            serde_json::from_slice(&buf).map_err(|e| RPCError::Unreachable(unreachable(e)))?;
        result.map_err(|e| RPCError::Unreachable(unreachable(e)))
    }
}

pub struct TcpNetworkFactory;

impl RaftNetworkFactory<TypeConfig> for TcpNetworkFactory {
    type Network = TcpNetwork;

    async fn new_client(&mut self, _target: NodeId, node: &BasicNode) -> Self::Network {
        TcpNetwork {
            target_addr: node.addr.clone(),
        }
    }
}

/// Serves the receiving half of [`TcpNetwork`]: accepts connections on the
/// configured cluster address and dispatches each length-prefixed RPC to
/// the local `Raft` instance.
async fn serve_raft_tcp(addr: String, raft: Arc<RaftInstance>) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!(addr = %addr, error = %e, "failed to bind raft TCP transport");
            return;
        }
    };
    info!(addr = %addr, "raft TCP transport listening");

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "raft TCP accept failed");
                continue;
            }
        };
        let raft = raft.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_raft_conn(stream, raft).await {
                warn!(error = %e, "raft TCP connection error");
            }
        });
    }
}

async fn handle_raft_conn(mut stream: TcpStream, raft: Arc<RaftInstance>) -> std::io::Result<()> {
    let tag = stream.read_u8().await?;
    let len = stream.read_u32().await?;
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;

    let response_bytes = match tag {
        RPC_APPEND_ENTRIES => {
            let req: AppendEntriesRequest<TypeConfig> = serde_json::from_slice(&buf)?;
            let result = raft.append_entries(req).await.map_err(|e| e.to_string());
            serde_json::to_vec(&result)?
        }
        RPC_VOTE => {
            let req: VoteRequest<NodeId> = serde_json::from_slice(&buf)?;
            let result = raft.vote(req).await.map_err(|e| e.to_string());
            serde_json::to_vec(&result)?
        }
        RPC_INSTALL_SNAPSHOT => {
            let req: InstallSnapshotRequest<TypeConfig> = serde_json::from_slice(&buf)?;
            let result = raft.install_snapshot(req).await.map_err(|e| e.to_string());
            serde_json::to_vec(&result)?
        }
        other => {
            warn!(tag = other, "unknown raft RPC tag");
            return Ok(());
        }
    };

    stream.write_u32(response_bytes.len() as u32).await?;
    stream.write_all(&response_bytes).await?;
    Ok(())
}

// ── RaftNode public API ──────────────────────────────────────────────────

/// A running Raft node, exposing exactly the surface §4.4 names:
/// `State()`, `Apply`, `LeaderWithID()`, `GetConfiguration()`,
/// `RemoveServer(id)`, `AddVoter(id, addr)`.
#[derive(Clone)]
pub struct RaftNode {
    pub raft: Arc<RaftInstance>,
    pub node_id: NodeId,
    /// node_id -> cluster address, used both to build membership changes
    /// and to resolve the leader's peer address for UDP forwarding.
    peer_addrs: Arc<Mutex<HashMap<NodeId, String>>>,
}

impl RaftNode {
    pub fn is_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.node_id)
    }

    pub fn leader_addr(&self) -> Option<String> {
        let leader_id = self.raft.metrics().borrow().current_leader?;
        self.peer_addrs.lock().unwrap().get(&leader_id).cloned()
    }
}

#[async_trait::async_trait]
impl ConsensusHandle for RaftNode {
    fn is_leader(&self) -> bool {
        RaftNode::is_leader(self)
    }

    async fn propose(&self, line: &str) -> Result<String, StoreError> {
        let write = self.raft.client_write(line.to_string());
        match tokio::time::timeout(RAFT_APPLY_TIMEOUT, write).await {
            Ok(Ok(resp)) => Ok(resp.data),
            Ok(Err(e)) => Err(StoreError::Consensus(e.to_string())),
            Err(_) => Err(StoreError::Consensus("raft commit timed out".to_string())),
        }
    }

    async fn forward_to_leader(&self, line: &str) -> Result<String, StoreError> {
        let Some(addr) = self.leader_addr() else {
            return Err(StoreError::Consensus("no known leader".to_string()));
        };
        crate::peer::forward_write(&addr, line)
            .await
            .map_err(StoreError::Transport)
    }

    /// Join semantics per §4.3: no-op on an exact (id, addr) match; drop
    /// any entry that collides on just one of the two; then add the new
    /// server as a voter.
    async fn join(&self, node_id: &str, addr: &str) -> Result<(), StoreError> {
        let id = node_id_from_str(node_id);

        let membership = self.raft.metrics().borrow().membership_config.clone();
        let mut voters: BTreeMap<NodeId, BasicNode> = membership
            .nodes()
            .map(|(id, node)| (*id, node.clone()))
            .collect();

        if voters.get(&id).map(|n| n.addr.as_str()) == Some(addr) {
            return Ok(());
        }
        voters.retain(|existing_id, existing_node| {
            *existing_id != id && existing_node.addr != addr
        });
        voters.insert(id, BasicNode { addr: addr.to_string() });

        self.peer_addrs
            .lock()
            .unwrap()
            .insert(id, addr.to_string());

        self.raft
            .change_membership(voters.into_keys().collect::<Vec<_>>(), false)
            .await
            .map_err(|e| StoreError::Consensus(e.to_string()))?;
        Ok(())
    }
}

// ── Startup ───────────────────────────────────────────────────────────────

/// Initializes and starts a Raft node bound to `cluster_addr`, wired to
/// `fsm`. `peers` lists every other node's `(node_id, addr)` pair known at
/// startup from configuration; an empty list bootstraps this node as the
/// sole voter (§4.4).
pub async fn start_raft_node(
    node_id: String,
    cluster_addr: String,
    peers: Vec<(String, String)>,
    fsm: Arc<Store>,
    cluster_handle: ClusterHandle,
) -> Arc<RaftNode> {
    let this_node_id = node_id_from_str(&node_id);

    let config = Arc::new(
        openraft::Config {
            heartbeat_interval: 500,
            election_timeout_min: 1_500,
            election_timeout_max: 3_000,
            ..Default::default()
        }
        .validate()
        .expect("valid openraft config"),
    );

    let storage = MemStorage::new(fsm);
    let (log_store, state_machine) = Adaptor::new(storage);

    let raft = Arc::new(
        openraft::Raft::new(
            this_node_id,
            config,
            TcpNetworkFactory,
            log_store,
            state_machine,
        )
        .await
        .expect("failed to create Raft instance"),
    );

    tokio::spawn(serve_raft_tcp(cluster_addr.clone(), raft.clone()));

    let mut peer_addrs = HashMap::new();
    peer_addrs.insert(this_node_id, cluster_addr.clone());
    for (peer_id, peer_addr) in &peers {
        peer_addrs.insert(node_id_from_str(peer_id), peer_addr.clone());
    }

    // Exactly one node in a freshly-forming cluster calls `initialize`,
    // with the full voter set known from configuration; every other node
    // learns about the cluster once that call replicates. The lowest node
    // id is an arbitrary but deterministic tie-breaker every node in the
    // set agrees on without needing to coordinate first.
    let min_id = *peer_addrs.keys().min().expect("peer_addrs always has self");
    if this_node_id == min_id {
        let members: BTreeMap<NodeId, BasicNode> = peer_addrs
            .iter()
            .map(|(id, addr)| (*id, BasicNode { addr: addr.clone() }))
            .collect();
        if let Err(e) = raft.initialize(members).await {
            info!(error = %e, "raft already initialized (ignoring on restart)");
        }
    }

    info!(node_id = this_node_id, peers = peers.len(), "raft node started");

    tokio::spawn(watch_metrics(raft.clone(), this_node_id, cluster_handle));

    Arc::new(RaftNode {
        raft,
        node_id: this_node_id,
        peer_addrs: Arc::new(Mutex::new(peer_addrs)),
    })
}

/// Mirrors `raft.metrics()` into the shared [`ClusterHandle`] so the rest
/// of the process (and, in principle, an operator-facing status surface)
/// can observe this node's role without reaching into openraft directly.
async fn watch_metrics(raft: Arc<RaftInstance>, this_node_id: NodeId, handle: ClusterHandle) {
    let mut rx = raft.metrics();
    loop {
        let metrics = rx.borrow().clone();
        let state = match metrics.state {
            openraft::ServerState::Leader if metrics.current_leader == Some(this_node_id) => {
                NodeState::Leader
            }
            openraft::ServerState::Follower | openraft::ServerState::Candidate => {
                NodeState::Follower
            }
            _ => NodeState::Forming,
        };
        handle.set_state(state);

        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_deterministic() {
        assert_eq!(node_id_from_str("node-a"), node_id_from_str("node-a"));
    }

    #[test]
    fn different_node_ids_differ() {
        assert_ne!(node_id_from_str("node-a"), node_id_from_str("node-b"));
    }

    #[tokio::test]
    async fn mem_storage_vote_roundtrip() {
        let mut s = MemStorage::new(Arc::new(Store::new()));
        let vote = Vote::new(1, 42);
        s.save_vote(&vote).await.unwrap();
        assert_eq!(s.read_vote().await.unwrap(), Some(vote));
    }

    #[tokio::test]
    async fn mem_storage_applies_write_line_through_the_fsm() {
        let fsm = Arc::new(Store::new());
        let mut s = MemStorage::new(fsm.clone());

        use openraft::{CommittedLeaderId, Entry, EntryPayload, LogId};
        let log_id = LogId::new(CommittedLeaderId::new(1, 1), 1);
        let entry = Entry::<TypeConfig> {
            log_id,
            payload: EntryPayload::Normal("SET k v".to_string()),
        };
        let resps = s.apply_to_state_machine(&[entry]).await.unwrap();
        assert_eq!(resps[0], "COUNT 1");
        assert!(fsm.get_for_test("k").is_some());
    }

    #[tokio::test]
    async fn snapshot_roundtrip_through_the_fsm() {
        let fsm = Arc::new(Store::new());
        fsm.apply_line("SET k v");
        let mut s = MemStorage::new(fsm);
        let mut builder = s.get_snapshot_builder().await;
        let snap = builder.build_snapshot().await.unwrap();

        let fsm2 = Arc::new(Store::new());
        let mut s2 = MemStorage::new(fsm2.clone());
        s2.install_snapshot(&snap.meta, snap.snapshot).await.unwrap();
        assert!(fsm2.get_for_test("k").is_some());
    }
}
