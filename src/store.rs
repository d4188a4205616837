//! The replicated store: command dispatch, read path, leader write path,
//! apply path, snapshot/restore, and join semantics.
//!
//! Grounded in `server/store/{sets,lists,hyperloglog,store,node}.go`: the
//! mutex-guarded map, the per-verb dispatch switch on the stored variant's
//! type tag, and the silent-skip-missing-key policy for set-algebra verbs
//! over multiple keys are all taken directly from there.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::{Request, Response};
use crate::errors::StoreError;
use crate::hll::HyperLogLog;
use crate::value::{add_many, Value};

/// Fixed timeout a leader blocks on waiting for its own Raft proposal to
/// commit, per §4.3.
pub const RAFT_APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// What the write path needs from the consensus layer. Implemented by the
/// concrete Raft adapter; declared here (rather than imported from it) so
/// `store` and `raft` don't depend on each other cyclically — the adapter
/// depends on `Store`, not the other way around.
#[async_trait::async_trait]
pub trait ConsensusHandle: Send + Sync {
    fn is_leader(&self) -> bool;

    /// Submits `line` as a log entry and blocks until it commits or
    /// [`RAFT_APPLY_TIMEOUT`] elapses. Returns the apply function's
    /// formatted response line on success.
    async fn propose(&self, line: &str) -> Result<String, StoreError>;

    /// Forwards `line` to the current leader over the peer channel and
    /// returns its reply verbatim.
    async fn forward_to_leader(&self, line: &str) -> Result<String, StoreError>;

    /// Adds/repositions a voter per §4.3's Join semantics.
    async fn join(&self, node_id: &str, addr: &str) -> Result<(), StoreError>;
}

/// The key -> Value map plus its guarding mutex. Holds no reference to the
/// consensus layer; it is invoked by it (apply/snapshot/restore) and used
/// by [`Node`] to implement the write path.
#[derive(Default)]
pub struct Store {
    map: Mutex<HashMap<Vec<u8>, Value>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    key: String,
    #[serde(flatten)]
    value: Value,
}

impl Store {
    pub fn new() -> Self {
        Store {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Read path for verbs that never enter consensus. Acquires the store
    /// mutex, dispatches by variant, and formats the response.
    pub fn read(&self, req: &Request) -> Response {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        match req {
            Request::Get { key } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_string() {
                    Ok(s) => Response::Str(String::from_utf8_lossy(s).into_owned()),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::LLen { key } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_list() {
                    Ok(l) => Response::Count(l.len() as i64),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::LRange { key, start, end } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_list() {
                    Ok(l) => lrange(l, *start, *end),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::SCard { key } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_set() {
                    Ok(s) => Response::Count(s.len() as i64),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::SMembers { key } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_set() {
                    Ok(s) => Response::List(bytes_to_strings(s.iter())),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::SIsMember { key, member } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_set() {
                    Ok(s) => Response::Bool(s.contains(member.as_bytes())),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::SUnion { key, other_keys } => {
                set_algebra(&map, key, other_keys, SetOp::Union)
            }
            Request::SInter { key, other_keys } => {
                set_algebra(&map, key, other_keys, SetOp::Inter)
            }
            Request::SDiff { key, other_keys } => {
                set_algebra(&map, key, other_keys, SetOp::Diff)
            }
            Request::PfCount { key } => match map.get(key.as_bytes()) {
                Some(v) => match v.as_hll() {
                    Ok(h) => Response::Count(h.estimate() as i64),
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            _ => Response::from_store_error(&StoreError::InvalidCommand),
        }
    }

    /// Apply function: invoked in log-index order on every replica
    /// (leader included) once a write commits. Mutates the map under the
    /// store mutex and returns the formatted response.
    fn apply(&self, req: &Request) -> Response {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        match req {
            Request::Set { key, value } => {
                map.insert(key.as_bytes().to_vec(), Value::String(value.as_bytes().to_vec()));
                Response::Count(1)
            }
            Request::Del { key } => {
                map.remove(key.as_bytes());
                Response::Count(1)
            }
            Request::LPush { key, values } => {
                let entry = map
                    .entry(key.as_bytes().to_vec())
                    .or_insert_with(|| Value::List(VecDeque::new()));
                match entry.as_list_mut() {
                    Ok(list) => {
                        for v in values {
                            list.push_front(v.as_bytes().to_vec());
                        }
                        Response::Count(values.len() as i64)
                    }
                    Err(e) => Response::from_store_error(&e),
                }
            }
            Request::RPush { key, values } => {
                let entry = map
                    .entry(key.as_bytes().to_vec())
                    .or_insert_with(|| Value::List(VecDeque::new()));
                match entry.as_list_mut() {
                    Ok(list) => {
                        for v in values {
                            list.push_back(v.as_bytes().to_vec());
                        }
                        Response::Count(values.len() as i64)
                    }
                    Err(e) => Response::from_store_error(&e),
                }
            }
            Request::LPop { key, count } => match map.get_mut(key.as_bytes()) {
                Some(v) => match v.as_list_mut() {
                    Ok(list) => {
                        let mut popped = Vec::new();
                        for _ in 0..(*count).max(0) {
                            match list.pop_front() {
                                Some(item) => popped.push(String::from_utf8_lossy(&item).into_owned()),
                                None => break,
                            }
                        }
                        Response::List(popped)
                    }
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::RPop { key, count } => match map.get_mut(key.as_bytes()) {
                Some(v) => match v.as_list_mut() {
                    Ok(list) => {
                        let mut popped = Vec::new();
                        for _ in 0..(*count).max(0) {
                            match list.pop_back() {
                                Some(item) => popped.push(String::from_utf8_lossy(&item).into_owned()),
                                None => break,
                            }
                        }
                        Response::List(popped)
                    }
                    Err(e) => Response::from_store_error(&e),
                },
                None => Response::from_store_error(&StoreError::NotFound),
            },
            Request::SAdd { key, values } => {
                let entry = map
                    .entry(key.as_bytes().to_vec())
                    .or_insert_with(|| Value::Set(HashSet::new()));
                match entry.as_set_mut() {
                    Ok(set) => {
                        let n = add_many(set, values.iter().map(|v| v.as_bytes().to_vec()));
                        Response::Count(n as i64)
                    }
                    Err(e) => Response::from_store_error(&e),
                }
            }
            Request::PfAdd { key, values } => {
                let entry = map
                    .entry(key.as_bytes().to_vec())
                    .or_insert_with(|| Value::Hll(HyperLogLog::with_error_rate(crate::hll::DEFAULT_ERROR_RATE)));
                match entry.as_hll_mut() {
                    Ok(hll) => {
                        let changed = hll.add_many(values.iter().map(|v| v.as_bytes()));
                        Response::Count(changed as i64)
                    }
                    Err(e) => Response::from_store_error(&e),
                }
            }
            Request::PfMerge { dest_key, source_keys } => {
                let mut sources = Vec::new();
                for k in source_keys {
                    match map.get(k.as_bytes()) {
                        Some(v) => match v.as_hll() {
                            Ok(h) => sources.push(h.clone()),
                            Err(e) => return Response::from_store_error(&e),
                        },
                        None => continue,
                    }
                }
                let entry = map
                    .entry(dest_key.as_bytes().to_vec())
                    .or_insert_with(|| Value::Hll(HyperLogLog::with_error_rate(crate::hll::DEFAULT_ERROR_RATE)));
                match entry.as_hll_mut() {
                    Ok(hll) => {
                        for s in &sources {
                            hll.merge(s);
                        }
                        Response::Ok(true)
                    }
                    Err(e) => Response::from_store_error(&e),
                }
            }
            _ => Response::from_store_error(&StoreError::InvalidCommand),
        }
    }

    /// Invoked by the consensus layer with the raw committed line, in
    /// log-index order. Unknown verbs (e.g. from a newer software version
    /// during a rolling upgrade) are logged and ignored, never panic.
    pub fn apply_line(&self, line: &str) -> String {
        match Request::parse(line) {
            Ok(req) => self.apply(&req).format(),
            Err(StoreError::EmptyCommand) => {
                warn!("committed log entry was empty, ignoring");
                Response::from_store_error(&StoreError::EmptyCommand).format()
            }
            Err(_) => {
                warn!(line = %line, "committed log entry had an unrecognized verb, ignoring");
                Response::from_store_error(&StoreError::InvalidCommand).format()
            }
        }
    }

    /// Shallow-clones the map and serializes it as JSON, each value
    /// carrying its type tag, per §4.3's Snapshot contract.
    pub fn snapshot(&self) -> Result<Vec<u8>, StoreError> {
        let entries: Vec<SnapshotEntry> = {
            let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
            map.iter()
                .map(|(k, v)| SnapshotEntry {
                    key: String::from_utf8_lossy(k).into_owned(),
                    value: v.clone(),
                })
                .collect()
        };
        serde_json::to_vec(&entries).map_err(|e| StoreError::Consensus(e.to_string()))
    }

    /// Replaces the map wholesale from a snapshot. No lock is required
    /// here (the FSM is quiesced by the consensus layer while restoring).
    pub fn restore(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let entries: Vec<SnapshotEntry> =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Consensus(e.to_string()))?;
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.clear();
        for entry in entries {
            map.insert(entry.key.into_bytes(), entry.value);
        }
        Ok(())
    }

    /// Exposed for tests (both colocated and under `tests/`, which link
    /// against this crate without the `cfg(test)` that colocated modules
    /// get) to assert on applied state without going through the wire
    /// codec.
    pub fn get_for_test(&self, key: &str) -> Option<Value> {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key.as_bytes())
            .cloned()
    }
}

fn bytes_to_strings<'a>(iter: impl Iterator<Item = &'a Vec<u8>>) -> Vec<String> {
    iter.map(|b| String::from_utf8_lossy(b).into_owned()).collect()
}

fn lrange(list: &VecDeque<Vec<u8>>, start: i64, end: i64) -> Response {
    if start < 0 {
        return Response::from_store_error(&StoreError::InvalidCommand);
    }
    let len = list.len() as i64;
    if start >= len {
        return Response::from_store_error(&StoreError::OutOfRange);
    }
    let end = if end < 0 { len - 1 } else { end.min(len - 1) };
    if end < start {
        return Response::List(Vec::new());
    }
    let values = list
        .iter()
        .skip(start as usize)
        .take((end - start + 1) as usize)
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .collect();
    Response::List(values)
}

enum SetOp {
    Union,
    Inter,
    Diff,
}

/// Union/Intersection/Difference over the first key and N other keys.
/// Missing other-key sets are skipped silently, per §4.2's documented
/// policy (not an error).
fn set_algebra(
    map: &HashMap<Vec<u8>, Value>,
    key: &str,
    other_keys: &[String],
    op: SetOp,
) -> Response {
    let base = match map.get(key.as_bytes()) {
        Some(v) => match v.as_set() {
            Ok(s) => s.clone(),
            Err(e) => return Response::from_store_error(&e),
        },
        None => HashSet::new(),
    };

    let mut result = base;
    for other_key in other_keys {
        let Some(other_value) = map.get(other_key.as_bytes()) else {
            continue;
        };
        let other = match other_value.as_set() {
            Ok(s) => s,
            Err(e) => return Response::from_store_error(&e),
        };
        result = match op {
            SetOp::Union => result.union(other).cloned().collect(),
            SetOp::Inter => result.intersection(other).cloned().collect(),
            SetOp::Diff => result.difference(other).cloned().collect(),
        };
    }
    Response::List(bytes_to_strings(result.iter()))
}

/// Ties the store, the consensus handle, and the peer-forwarding path
/// together behind the single entry point the connection loop and the
/// peer bootstrap service both call — the in-process equivalent of the
/// reference implementation's `node.ApplyCmd(cmd)`.
pub struct Node<C: ConsensusHandle> {
    pub store: std::sync::Arc<Store>,
    consensus: C,
}

impl<C: ConsensusHandle> Node<C> {
    pub fn new(store: std::sync::Arc<Store>, consensus: C) -> Self {
        Node { store, consensus }
    }

    pub fn consensus(&self) -> &C {
        &self.consensus
    }

    /// Dispatches one parsed/unparsed line to the read path, the write
    /// path, or an error response. Never panics.
    pub async fn apply_cmd(&self, line: &str) -> String {
        match Request::parse(line) {
            Ok(req) if req.is_write() => self.respond_after_raft_commit(line).await,
            Ok(Request::Join { node_id, addr }) => match self.consensus.join(&node_id, &addr).await
            {
                Ok(()) => Response::Ok(true).format(),
                Err(e) => Response::from_store_error(&e).format(),
            },
            Ok(req) => self.store.read(&req).format(),
            Err(e) => Response::from_store_error(&e).format(),
        }
    }

    async fn respond_after_raft_commit(&self, line: &str) -> String {
        if self.consensus.is_leader() {
            match self.consensus.propose(line).await {
                Ok(response_line) => response_line,
                Err(e) => Response::from_store_error(&e).format(),
            }
        } else {
            match self.consensus.forward_to_leader(line).await {
                Ok(response_line) => response_line,
                Err(e) => Response::from_store_error(&e).format(),
            }
        }
    }
}
