//! Line-oriented command codec: parses a request line into a typed
//! [`Request`], and formats a typed [`Response`] back into a line.
//!
//! Grounded in `sdk/commands/{command,client,response,errors}.go`: the verb
//! dispatch table, per-verb arity, and the exact response tag strings are
//! all taken from there. Argument splitting uses spaces everywhere (the
//! spec's resolution of the `:`-vs-space inconsistency found in some of
//! that source's command parsers).

use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Join { node_id: String, addr: String },
    Get { key: String },
    Set { key: String, value: String },
    Del { key: String },
    LPush { key: String, values: Vec<String> },
    RPush { key: String, values: Vec<String> },
    LPop { key: String, count: i64 },
    RPop { key: String, count: i64 },
    LRange { key: String, start: i64, end: i64 },
    LLen { key: String },
    SAdd { key: String, values: Vec<String> },
    SCard { key: String },
    SDiff { key: String, other_keys: Vec<String> },
    SInter { key: String, other_keys: Vec<String> },
    SUnion { key: String, other_keys: Vec<String> },
    SIsMember { key: String, member: String },
    SMembers { key: String },
    PfAdd { key: String, values: Vec<String> },
    PfCount { key: String },
    PfMerge { dest_key: String, source_keys: Vec<String> },
    AuthChallengeReq { challenge_hex: String },
    AuthChallengeRes { client_id: String, signature_hex: String },
}

impl Request {
    /// Parses one trimmed line. Empty lines return `EmptyCommand`; unknown
    /// verbs or arity violations return `InvalidCommand`.
    pub fn parse(line: &str) -> Result<Request, StoreError> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        if line.is_empty() {
            return Err(StoreError::EmptyCommand);
        }

        let parts: Vec<&str> = line.split(' ').collect();
        let verb = parts[0];
        let args = &parts[1..];

        match verb {
            "JOIN" => match args {
                [node_id, addr] => Ok(Request::Join {
                    node_id: node_id.to_string(),
                    addr: addr.to_string(),
                }),
                _ => Err(StoreError::InvalidCommand),
            },
            "GET" => one_key(args).map(|key| Request::Get { key }),
            "SET" => match args {
                [key, value] => Ok(Request::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                _ => Err(StoreError::InvalidCommand),
            },
            "DEL" => one_key(args).map(|key| Request::Del { key }),
            "LPUSH" => key_and_values(args).map(|(key, values)| Request::LPush { key, values }),
            "RPUSH" => key_and_values(args).map(|(key, values)| Request::RPush { key, values }),
            "LPOP" => key_and_count(args).map(|(key, count)| Request::LPop { key, count }),
            "RPOP" => key_and_count(args).map(|(key, count)| Request::RPop { key, count }),
            "LRANGE" => match args {
                [key] => Ok(Request::LRange {
                    key: key.to_string(),
                    start: 0,
                    end: -1,
                }),
                [key, start] => Ok(Request::LRange {
                    key: key.to_string(),
                    start: parse_i64(start)?,
                    end: -1,
                }),
                [key, start, end] => Ok(Request::LRange {
                    key: key.to_string(),
                    start: parse_i64(start)?,
                    end: parse_i64(end)?,
                }),
                _ => Err(StoreError::InvalidCommand),
            },
            "LLEN" => one_key(args).map(|key| Request::LLen { key }),
            "SADD" => key_and_values(args).map(|(key, values)| Request::SAdd { key, values }),
            "SCARD" => one_key(args).map(|key| Request::SCard { key }),
            "SDIFF" => {
                key_and_rest(args).map(|(key, other_keys)| Request::SDiff { key, other_keys })
            }
            "SINTER" => {
                key_and_rest(args).map(|(key, other_keys)| Request::SInter { key, other_keys })
            }
            "SUNION" => {
                key_and_rest(args).map(|(key, other_keys)| Request::SUnion { key, other_keys })
            }
            "SISMEMBER" => match args {
                [key, member] => Ok(Request::SIsMember {
                    key: key.to_string(),
                    member: member.to_string(),
                }),
                _ => Err(StoreError::InvalidCommand),
            },
            "SMEMBERS" => one_key(args).map(|key| Request::SMembers { key }),
            "PFADD" => key_and_values(args).map(|(key, values)| Request::PfAdd { key, values }),
            "PFCOUNT" => one_key(args).map(|key| Request::PfCount { key }),
            "PFMERGE" => key_and_values(args)
                .map(|(dest_key, source_keys)| Request::PfMerge { dest_key, source_keys }),
            "AUTH.CHALLENGE.REQ" => match args {
                [challenge_hex] => Ok(Request::AuthChallengeReq {
                    challenge_hex: challenge_hex.to_string(),
                }),
                _ => Err(StoreError::InvalidCommand),
            },
            "AUTH.CHALLENGE.RES" => match args {
                [client_id, signature_hex] => Ok(Request::AuthChallengeRes {
                    client_id: client_id.to_string(),
                    signature_hex: signature_hex.to_string(),
                }),
                _ => Err(StoreError::InvalidCommand),
            },
            _ => Err(StoreError::InvalidCommand),
        }
    }

    /// Re-serializes a parsed request to its canonical wire line (no
    /// trailing newline). Used by the round-trip property and by callers
    /// (follower forwarding, peer JOIN) that need to re-emit a line they
    /// built programmatically rather than received verbatim.
    pub fn format(&self) -> String {
        match self {
            Request::Join { node_id, addr } => format!("JOIN {node_id} {addr}"),
            Request::Get { key } => format!("GET {key}"),
            Request::Set { key, value } => format!("SET {key} {value}"),
            Request::Del { key } => format!("DEL {key}"),
            Request::LPush { key, values } => format!("LPUSH {key} {}", values.join(" ")),
            Request::RPush { key, values } => format!("RPUSH {key} {}", values.join(" ")),
            Request::LPop { key, count } => format!("LPOP {key} {count}"),
            Request::RPop { key, count } => format!("RPOP {key} {count}"),
            Request::LRange { key, start, end } => format!("LRANGE {key} {start} {end}"),
            Request::LLen { key } => format!("LLEN {key}"),
            Request::SAdd { key, values } => format!("SADD {key} {}", values.join(" ")),
            Request::SCard { key } => format!("SCARD {key}"),
            Request::SDiff { key, other_keys } => format!("SDIFF {key} {}", other_keys.join(" ")),
            Request::SInter { key, other_keys } => {
                format!("SINTER {key} {}", other_keys.join(" "))
            }
            Request::SUnion { key, other_keys } => {
                format!("SUNION {key} {}", other_keys.join(" "))
            }
            Request::SIsMember { key, member } => format!("SISMEMBER {key} {member}"),
            Request::SMembers { key } => format!("SMEMBERS {key}"),
            Request::PfAdd { key, values } => format!("PFADD {key} {}", values.join(" ")),
            Request::PfCount { key } => format!("PFCOUNT {key}"),
            Request::PfMerge { dest_key, source_keys } => {
                format!("PFMERGE {dest_key} {}", source_keys.join(" "))
            }
            Request::AuthChallengeReq { challenge_hex } => {
                format!("AUTH.CHALLENGE.REQ {challenge_hex}")
            }
            Request::AuthChallengeRes { client_id, signature_hex } => {
                format!("AUTH.CHALLENGE.RES {client_id} {signature_hex}")
            }
        }
    }

    /// True for verbs that go through the Raft write path; false for verbs
    /// served straight from local memory.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::Set { .. }
                | Request::Del { .. }
                | Request::LPush { .. }
                | Request::RPush { .. }
                | Request::LPop { .. }
                | Request::RPop { .. }
                | Request::SAdd { .. }
                | Request::PfAdd { .. }
                | Request::PfMerge { .. }
        )
    }
}

fn one_key(args: &[&str]) -> Result<String, StoreError> {
    match args {
        [key] => Ok(key.to_string()),
        _ => Err(StoreError::InvalidCommand),
    }
}

fn key_and_values(args: &[&str]) -> Result<(String, Vec<String>), StoreError> {
    match args {
        [key, rest @ ..] if !rest.is_empty() => {
            Ok((key.to_string(), rest.iter().map(|s| s.to_string()).collect()))
        }
        _ => Err(StoreError::InvalidCommand),
    }
}

fn key_and_rest(args: &[&str]) -> Result<(String, Vec<String>), StoreError> {
    match args {
        [key, rest @ ..] => Ok((key.to_string(), rest.iter().map(|s| s.to_string()).collect())),
        _ => Err(StoreError::InvalidCommand),
    }
}

fn key_and_count(args: &[&str]) -> Result<(String, i64), StoreError> {
    match args {
        [key] => Ok((key.to_string(), 1)),
        [key, count] => Ok((key.to_string(), parse_i64(count)?)),
        _ => Err(StoreError::InvalidCommand),
    }
}

fn parse_i64(s: &str) -> Result<i64, StoreError> {
    s.parse::<i64>().map_err(|_| StoreError::InvalidCommand)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Err(String),
    Count(i64),
    Str(String),
    Bool(bool),
    Ok(bool),
    List(Vec<String>),
}

impl Response {
    pub fn from_store_error(e: &StoreError) -> Response {
        Response::Err(e.as_wire_message())
    }

    /// Formats the response line, without the trailing newline the
    /// connection loop appends once per request.
    pub fn format(&self) -> String {
        match self {
            Response::Err(msg) => format!("ERR {msg}"),
            Response::Count(n) => format!("COUNT {n}"),
            Response::Str(s) => format!("STRING {s}"),
            Response::Bool(b) => format!("BOOLEAN {b}"),
            Response::Ok(b) => format!("OK {b}"),
            Response::List(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| format!("({i}): {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
