//! End-to-end scenarios, `SPEC_FULL.md` §8 — exact Cypher text in, exact JSON
//! shape out.

use cyphergraph::response::QueryResponse;
use cyphergraph::GraphEngine;
use serde_json::{json, Map, Value as Json};

fn engine() -> GraphEngine {
    GraphEngine::open_in_memory().expect("in-memory store opens")
}

fn run(engine: &GraphEngine, cypher: &str, params: Map<String, Json>) -> Vec<Json> {
    match engine.execute(cypher, &params) {
        QueryResponse::Success { data, .. } => data,
        QueryResponse::Failure { error, .. } => panic!("query failed: {}", error.message),
    }
}

#[test]
fn scenario_1_parameter_roundtrip() {
    let engine = engine();
    let mut params = Map::new();
    params.insert("n".to_string(), json!("Bob"));

    run(&engine, "CREATE (u:User {name: $n})", params.clone());
    let result = run(&engine, "MATCH (u:User {name:$n}) RETURN u.name AS name", params);

    assert_eq!(result, vec![json!({"name": "Bob"})]);
}

#[test]
fn scenario_2_multi_hop_relationship_match() {
    let engine = engine();
    run(
        &engine,
        "CREATE (a:U {id:'a'})-[:K]->(b:U {id:'b'})-[:K]->(c:U {id:'c'})",
        Map::new(),
    );

    let result = run(
        &engine,
        "MATCH (x:U {id:'a'})-[:K]->(y)-[:K]->(z) RETURN z.id AS id",
        Map::new(),
    );

    assert_eq!(result, vec![json!({"id": "c"})]);
}

#[test]
fn scenario_3_merge_on_match_on_create() {
    let engine = engine();
    let cypher = "MERGE (n:Counter {k:'x'}) ON CREATE SET n.c = 1 ON MATCH SET n.c = n.c + 1 RETURN n.c AS c";

    let run1 = run(&engine, cypher, Map::new());
    assert_eq!(run1, vec![json!({"c": 1})]);

    let run2 = run(&engine, cypher, Map::new());
    assert_eq!(run2, vec![json!({"c": 2})]);
}

#[test]
fn scenario_4_variable_length_path() {
    let engine = engine();
    run(
        &engine,
        "CREATE (n1:N {k:1})-[:E]->(n2:N {k:2})-[:E]->(n3:N {k:3})-[:E]->(n4:N {k:4})",
        Map::new(),
    );

    let result = run(&engine, "MATCH (n1:N {k:1})-[:E*1..3]->(x) RETURN count(x) AS k", Map::new());

    assert_eq!(result, vec![json!({"k": 3})]);
}

#[test]
fn scenario_5_unwind_collect() {
    let engine = engine();
    let result = run(&engine, "UNWIND [1,2,3] AS x RETURN collect(x) AS xs", Map::new());
    assert_eq!(result, vec![json!({"xs": [1, 2, 3]})]);
}

#[test]
fn scenario_6_detach_delete_cascade() {
    let engine = engine();
    run(&engine, "CREATE (a:T)-[:R]->(b:T)", Map::new());

    run(&engine, "MATCH (a:T)-[:R]->() DETACH DELETE a", Map::new());

    let remaining_edges = run(&engine, "MATCH ()-[r:R]->() RETURN count(r) AS k", Map::new());
    assert_eq!(remaining_edges, vec![json!({"k": 0})]);

    let remaining_nodes = run(&engine, "MATCH (b:T) RETURN count(b) AS k", Map::new());
    assert_eq!(remaining_nodes, vec![json!({"k": 1})]);
}
