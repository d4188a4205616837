//! End-to-end scenario tests driving a single node through its full
//! command surface: parse -> write path (through a stub consensus handle
//! that always applies locally, since there's only one voter) -> read
//! path -> formatted response line.

use std::sync::Arc;

use pouchd::codec::{Request, Response};
use pouchd::errors::StoreError;
use pouchd::store::{ConsensusHandle, Node, Store};

struct SoloLeader {
    store: Arc<Store>,
}

#[async_trait::async_trait]
impl ConsensusHandle for SoloLeader {
    fn is_leader(&self) -> bool {
        true
    }

    async fn propose(&self, line: &str) -> Result<String, StoreError> {
        Ok(self.store.apply_line(line))
    }

    async fn forward_to_leader(&self, _line: &str) -> Result<String, StoreError> {
        unreachable!("a solo node is always its own leader")
    }

    async fn join(&self, _node_id: &str, _addr: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

fn solo_node() -> Node<SoloLeader> {
    let store = Arc::new(Store::new());
    let consensus = SoloLeader { store: store.clone() };
    Node::new(store, consensus)
}

async fn run(node: &Node<SoloLeader>, line: &str) -> String {
    node.apply_cmd(line).await
}

#[tokio::test]
async fn scenario_set_then_get_returns_the_stored_string() {
    let node = solo_node();
    assert_eq!(run(&node, "SET greeting hello").await, "COUNT 1");
    assert_eq!(run(&node, "GET greeting").await, "STRING hello");
}

#[tokio::test]
async fn scenario_get_on_a_missing_key_is_not_found() {
    let node = solo_node();
    assert_eq!(run(&node, "GET absent").await, "ERR not found");
}

#[tokio::test]
async fn scenario_del_then_get_is_not_found() {
    let node = solo_node();
    run(&node, "SET k v").await;
    assert_eq!(run(&node, "DEL k").await, "COUNT 1");
    assert_eq!(run(&node, "GET k").await, "ERR not found");
}

#[tokio::test]
async fn scenario_list_push_pop_and_range() {
    let node = solo_node();
    assert_eq!(run(&node, "RPUSH queue a b c").await, "COUNT 3");
    assert_eq!(run(&node, "LLEN queue").await, "COUNT 3");
    assert_eq!(
        run(&node, "LRANGE queue 0 -1").await,
        "(0): a\n(1): b\n(2): c"
    );
    assert_eq!(run(&node, "LPOP queue").await, "(0): a");
    assert_eq!(run(&node, "RPOP queue 2").await, "(0): c\n(1): b");
}

#[tokio::test]
async fn scenario_set_algebra_across_three_keys() {
    let node = solo_node();
    run(&node, "SADD a 1 2 3").await;
    run(&node, "SADD b 2 3 4").await;

    let union = run(&node, "SUNION a b").await;
    let mut union_values: Vec<&str> = union.lines().map(|l| l.split(": ").nth(1).unwrap()).collect();
    union_values.sort();
    assert_eq!(union_values, vec!["1", "2", "3", "4"]);

    let inter = run(&node, "SINTER a b").await;
    let mut inter_values: Vec<&str> = inter.lines().map(|l| l.split(": ").nth(1).unwrap()).collect();
    inter_values.sort();
    assert_eq!(inter_values, vec!["2", "3"]);

    let diff = run(&node, "SDIFF a b").await;
    assert_eq!(diff, "(0): 1");
}

#[tokio::test]
async fn scenario_sunion_over_a_missing_key_is_not_an_error() {
    let node = solo_node();
    run(&node, "SADD a x").await;
    let resp = run(&node, "SUNION a missing").await;
    assert_eq!(resp, "(0): x");
}

#[tokio::test]
async fn scenario_pfadd_then_pfcount_is_an_approximate_cardinality() {
    let node = solo_node();
    for i in 0..500 {
        run(&node, &format!("PFADD hll item-{i}")).await;
    }
    let count_line = run(&node, "PFCOUNT hll").await;
    let count: i64 = count_line.strip_prefix("COUNT ").unwrap().parse().unwrap();
    assert!((count - 500).abs() < 50, "estimate {count} too far from 500");
}

#[tokio::test]
async fn scenario_pfmerge_combines_two_sketches() {
    let node = solo_node();
    run(&node, "PFADD h1 a b c").await;
    run(&node, "PFADD h2 c d e").await;
    assert_eq!(run(&node, "PFMERGE dest h1 h2").await, "OK true");
    let count_line = run(&node, "PFCOUNT dest").await;
    assert!(count_line.starts_with("COUNT "));
}

#[tokio::test]
async fn scenario_type_mismatch_does_not_mutate_the_existing_value() {
    let node = solo_node();
    run(&node, "SET k v").await;
    assert_eq!(run(&node, "SADD k x").await, "ERR invalid data type");
    assert_eq!(run(&node, "GET k").await, "STRING v");
}

#[tokio::test]
async fn scenario_unknown_verb_is_rejected_without_panicking() {
    let node = solo_node();
    assert_eq!(run(&node, "FROBNICATE k").await, "ERR invalid command");
}

#[tokio::test]
async fn scenario_join_through_the_command_path_delegates_to_consensus() {
    let node = solo_node();
    assert_eq!(run(&node, "JOIN node-b 127.0.0.1:9100").await, "OK true");
}

#[test]
fn response_formatting_matches_request_parsing_round_trip() {
    let req = Request::parse("SET a b").unwrap();
    assert_eq!(req, Request::Set { key: "a".into(), value: "b".into() });
    assert_eq!(Response::Count(1).format(), "COUNT 1");
}
