//! The tagged-union value model: a key holds exactly one of these variants.
//!
//! Grounded in the reference store's `datatypes` package — a doubly-linked
//! list, a generic hash set, and the HyperLogLog sketch — re-expressed as an
//! exhaustive Rust enum instead of a runtime-dispatched interface, per the
//! "tagged variants over inheritance" design note.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::hll::HyperLogLog;

pub type Bytes = Vec<u8>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[serde(rename = "string")]
    String(Bytes),
    #[serde(rename = "list")]
    List(VecDeque<Bytes>),
    #[serde(rename = "set")]
    Set(HashSet<Bytes>),
    #[serde(rename = "hll")]
    Hll(HyperLogLog),
}

impl Value {
    /// The wire/snapshot type tag: `"string"`, `"list"`, `"set"`, or `"hll"`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hll(_) => "hll",
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, StoreError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StoreError::InvalidDataType),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, StoreError> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StoreError::InvalidDataType),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, StoreError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StoreError::InvalidDataType),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, StoreError> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StoreError::InvalidDataType),
        }
    }

    pub fn as_string(&self) -> Result<&Bytes, StoreError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(StoreError::InvalidDataType),
        }
    }

    pub fn as_hll_mut(&mut self) -> Result<&mut HyperLogLog, StoreError> {
        match self {
            Value::Hll(h) => Ok(h),
            _ => Err(StoreError::InvalidDataType),
        }
    }

    pub fn as_hll(&self) -> Result<&HyperLogLog, StoreError> {
        match self {
            Value::Hll(h) => Ok(h),
            _ => Err(StoreError::InvalidDataType),
        }
    }
}

/// `AddMany` semantics: inserts each value, returns the count of elements
/// that were newly inserted (duplicates within the same call don't count
/// twice, matching the reference `Set.AddMany` reduction over `Add`).
pub fn add_many(set: &mut HashSet<Bytes>, values: impl IntoIterator<Item = Bytes>) -> u64 {
    let mut inserted = 0u64;
    for v in values {
        if set.insert(v) {
            inserted += 1;
        }
    }
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_match_wire_names() {
        assert_eq!(Value::String(vec![]).type_tag(), "string");
        assert_eq!(Value::List(VecDeque::new()).type_tag(), "list");
        assert_eq!(Value::Set(HashSet::new()).type_tag(), "set");
        assert_eq!(
            Value::Hll(HyperLogLog::with_precision(4)).type_tag(),
            "hll"
        );
    }

    #[test]
    fn wrong_variant_access_is_invalid_data_type() {
        let v = Value::String(b"hi".to_vec());
        assert_eq!(v.as_list().unwrap_err(), StoreError::InvalidDataType);
        assert_eq!(v.as_set().unwrap_err(), StoreError::InvalidDataType);
    }

    #[test]
    fn add_many_counts_only_new_insertions() {
        let mut set = HashSet::new();
        let n = add_many(&mut set, vec![b"x".to_vec(), b"y".to_vec(), b"x".to_vec()]);
        assert_eq!(n, 2);
        let n2 = add_many(&mut set, vec![b"x".to_vec()]);
        assert_eq!(n2, 0);
    }
}
