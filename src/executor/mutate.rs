//! Mutation execution (§4.3): `CREATE`/`SET`/`DELETE`/`MERGE` applied
//! directly against storage, driven by the value-level evaluator in
//! [`super::eval`] rather than through the translator — the translator's
//! contract is read-only SQL generation (§4.2).

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as Json};

use crate::cypher::ast::*;
use crate::errors::EngineError;
use crate::storage::{Edge, Node, TxHandle};
use crate::translator::context::{TranslationContext, VarKind};
use crate::translator::match_;

use super::eval::{self, BoundValue, Env};

pub fn create_patterns(
    patterns: &[Pattern],
    env: &mut Env,
    tx: &TxHandle,
    query_params: &Map<String, Json>,
) -> Result<(), EngineError> {
    for pattern in patterns {
        create_pattern(pattern, env, tx, query_params)?;
    }
    Ok(())
}

fn create_pattern(pattern: &Pattern, env: &mut Env, tx: &TxHandle, query_params: &Map<String, Json>) -> Result<(), EngineError> {
    match pattern {
        Pattern::Node(n) => {
            create_node(n, env, tx, query_params)?;
        }
        Pattern::Relationship(rel) => {
            let source_id = create_node(&rel.source, env, tx, query_params)?;
            let target_id = create_node(&rel.target, env, tx, query_params)?;
            let edge_type = rel
                .edge
                .edge_type
                .as_deref()
                .ok_or_else(|| EngineError::UnsupportedFeature("CREATE relationship requires a type".to_string()))?;
            let properties = eval_properties(rel.edge.properties.as_ref(), env, query_params)?;
            // An undirected `CREATE` pattern has no ambiguity to preserve at
            // write time (§9's open question is read-only) — it is stored
            // left-to-right exactly as parsed.
            let (from_id, to_id) = match rel.edge.direction {
                Direction::Left => (target_id, source_id),
                Direction::Right | Direction::None => (source_id, target_id),
            };
            let edge = tx.insert_edge(edge_type, &from_id, &to_id, properties)?;
            if let Some(name) = &rel.edge.variable {
                env.insert(name.clone(), BoundValue::Edge(edge));
            }
        }
    }
    Ok(())
}

/// Creates `n` unless its variable is already bound (a relationship hop
/// reusing the prior hop's target, per the parser's pattern-chain contract —
/// §4.1), and returns its id either way.
fn create_node(n: &NodePattern, env: &mut Env, tx: &TxHandle, query_params: &Map<String, Json>) -> Result<String, EngineError> {
    if let Some(name) = &n.variable {
        if let Some(bound) = env.get(name) {
            return bound
                .id()
                .map(str::to_string)
                .ok_or_else(|| EngineError::UnsupportedFeature(format!("'{name}' is not a node or relationship")));
        }
    }
    let label = node_label_json(n);
    let properties = eval_properties(n.properties.as_ref(), env, query_params)?;
    let node = tx.insert_node(label, properties)?;
    let id = node.id.clone();
    if let Some(name) = &n.variable {
        env.insert(name.clone(), BoundValue::Node(node));
    }
    Ok(id)
}

fn node_label_json(n: &NodePattern) -> Json {
    match &n.label {
        Some(l) => Json::Array(vec![Json::String(l.clone())]),
        None => Json::Array(Vec::new()),
    }
}

pub fn eval_properties(
    props: Option<&HashMap<String, Expression>>,
    env: &Env,
    query_params: &Map<String, Json>,
) -> Result<Json, EngineError> {
    let mut map = Map::new();
    if let Some(props) = props {
        for (key, value) in props {
            map.insert(key.clone(), eval::eval(value, env, query_params)?);
        }
    }
    Ok(Json::Object(map))
}

/// `SET v.k = expr`, also used for `ON CREATE`/`ON MATCH SET`: a
/// read-modify-write over the bound entity's JSON properties object, one
/// assignment at a time so later assignments in the same clause observe
/// earlier ones.
pub fn apply_set(
    assignments: &[SetAssignment],
    env: &mut Env,
    tx: &TxHandle,
    query_params: &Map<String, Json>,
) -> Result<(), EngineError> {
    for assignment in assignments {
        let value = eval::eval(&assignment.value, env, query_params)?;
        let bound = env
            .get(&assignment.variable)
            .ok_or_else(|| EngineError::UnresolvedVariable(assignment.variable.clone()))?
            .clone();
        match bound {
            BoundValue::Node(mut node) => {
                set_property(&mut node.properties, &assignment.property, value);
                tx.update_node_properties(&node.id, &node.properties)?;
                env.insert(assignment.variable.clone(), BoundValue::Node(node));
            }
            BoundValue::Edge(mut edge) => {
                set_property(&mut edge.properties, &assignment.property, value);
                tx.update_edge_properties(&edge.id, &edge.properties)?;
                env.insert(assignment.variable.clone(), BoundValue::Edge(edge));
            }
            BoundValue::Scalar(_) => {
                return Err(EngineError::UnsupportedFeature(format!(
                    "'{}' is not a node or relationship",
                    assignment.variable
                )))
            }
        }
    }
    Ok(())
}

fn set_property(properties: &mut Json, key: &str, value: Json) {
    if !properties.is_object() {
        *properties = Json::Object(Map::new());
    }
    properties.as_object_mut().expect("normalized above").insert(key.to_string(), value);
}

/// `DELETE`/`DETACH DELETE`: edges are removed before nodes so invariant 1
/// (§3) never observes a dangling reference, regardless of clause order.
pub fn apply_delete(delete: &DeleteClause, env: &Env, tx: &TxHandle) -> Result<(), EngineError> {
    let mut node_ids = Vec::new();
    let mut edge_ids = Vec::new();
    for name in &delete.variables {
        let bound = env.get(name).ok_or_else(|| EngineError::UnresolvedVariable(name.clone()))?;
        match bound {
            BoundValue::Node(n) => node_ids.push(n.id.clone()),
            BoundValue::Edge(e) => edge_ids.push(e.id.clone()),
            BoundValue::Scalar(_) => {
                return Err(EngineError::UnsupportedFeature(format!("'{name}' is not a node or relationship")))
            }
        }
    }
    for id in &edge_ids {
        tx.delete_edge(id)?;
    }
    for id in &node_ids {
        if delete.detach {
            tx.delete_edges_touching(id)?;
        }
        tx.delete_node(id)?;
    }
    Ok(())
}

/// `MERGE (n:L {k:v})`: a node-only pattern, upserted by probing on its
/// label+property signature (§4.3 strategy 4).
pub fn merge_node(
    n: &NodePattern,
    on_create: &Option<Vec<SetAssignment>>,
    on_match: &Option<Vec<SetAssignment>>,
    ctx: &mut TranslationContext,
    tx: &TxHandle,
    query_params: &Map<String, Json>,
    max_path_depth: u32,
) -> Result<Env, EngineError> {
    let mut env: Env = HashMap::new();
    let (_, created) = resolve_or_create_node(n, &mut env, ctx, tx, query_params, max_path_depth)?;
    apply_merge_set(created, on_create, on_match, &mut env, tx, query_params)?;
    Ok(env)
}

/// `MERGE (a)-[:R]->(b)`: source and target are each resolved/created by
/// their own label+property signature, then the edge itself is probed by
/// type plus endpoint ids (§4.3 strategy 4).
pub fn merge_relationship(
    rel: &RelationshipPattern,
    on_create: &Option<Vec<SetAssignment>>,
    on_match: &Option<Vec<SetAssignment>>,
    ctx: &mut TranslationContext,
    tx: &TxHandle,
    query_params: &Map<String, Json>,
    max_path_depth: u32,
) -> Result<Env, EngineError> {
    let mut env: Env = HashMap::new();
    let (source_id, source_created) = resolve_or_create_node(&rel.source, &mut env, ctx, tx, query_params, max_path_depth)?;
    let (target_id, target_created) = resolve_or_create_node(&rel.target, &mut env, ctx, tx, query_params, max_path_depth)?;

    let edge_type = rel
        .edge
        .edge_type
        .as_deref()
        .ok_or_else(|| EngineError::UnsupportedFeature("MERGE relationship requires a type".to_string()))?;

    let existing = tx.execute(
        "SELECT id, type, source_id, target_id, properties FROM edges \
         WHERE type = ?1 AND source_id = ?2 AND target_id = ?3 LIMIT 1",
        &[
            Json::String(edge_type.to_string()),
            Json::String(source_id.clone()),
            Json::String(target_id.clone()),
        ],
    )?;

    let edge_created = existing.rows.is_empty();
    if let Some(row) = existing.rows.first() {
        let edge = row_to_edge(row);
        if let Some(name) = &rel.edge.variable {
            env.insert(name.clone(), BoundValue::Edge(edge));
        }
    } else {
        let properties = eval_properties(rel.edge.properties.as_ref(), &env, query_params)?;
        let edge = tx.insert_edge(edge_type, &source_id, &target_id, properties)?;
        if let Some(name) = &rel.edge.variable {
            env.insert(name.clone(), BoundValue::Edge(edge));
        }
    }

    let created = source_created || target_created || edge_created;
    apply_merge_set(created, on_create, on_match, &mut env, tx, query_params)?;
    Ok(env)
}

fn apply_merge_set(
    created: bool,
    on_create: &Option<Vec<SetAssignment>>,
    on_match: &Option<Vec<SetAssignment>>,
    env: &mut Env,
    tx: &TxHandle,
    query_params: &Map<String, Json>,
) -> Result<(), EngineError> {
    if created {
        if let Some(assignments) = on_create {
            apply_set(assignments, env, tx, query_params)?;
        }
    } else if let Some(assignments) = on_match {
        apply_set(assignments, env, tx, query_params)?;
    }
    Ok(())
}

/// Probes for an existing node matching `n`'s label+property signature
/// (reusing the translator's own pattern→predicate logic so the probe's
/// notion of "matches" is identical to a plain `MATCH`), creating one on a
/// miss. Returns its id and whether it had to be created.
fn resolve_or_create_node(
    n: &NodePattern,
    env: &mut Env,
    ctx: &mut TranslationContext,
    tx: &TxHandle,
    query_params: &Map<String, Json>,
    max_path_depth: u32,
) -> Result<(String, bool), EngineError> {
    // `match_::build` binds its own alias for the pattern's variable — for an
    // anonymous pattern that alias is otherwise unrecoverable, so probe under
    // a synthetic name instead of pre-binding one ourselves. The synthetic
    // name must still be unique per call: a `MERGE` relationship probes its
    // source and target separately, and two anonymous endpoints reusing the
    // same placeholder would alias one onto the other.
    let probe_name = n
        .variable
        .clone()
        .unwrap_or_else(|| format!("__merge_probe_{}", ctx.fresh_alias(VarKind::Scalar)));
    let probe_pattern = NodePattern { variable: Some(probe_name.clone()), ..n.clone() };
    let build = match_::build(
        std::slice::from_ref(&Pattern::Node(probe_pattern)),
        None,
        false,
        ctx,
        query_params,
        max_path_depth,
        &HashSet::new(),
    )?;
    let alias = ctx
        .lookup(&probe_name)
        .and_then(|info| info.table_alias())
        .expect("just bound by match_::build above")
        .to_string();
    let (from_items, predicates, params, ctes) = build.into_flat();
    let where_sql = if predicates.is_empty() { "1 = 1".to_string() } else { predicates.join(" AND ") };
    let ctes_sql = if ctes.is_empty() { String::new() } else { format!("WITH RECURSIVE {} ", ctes.join(", ")) };
    let sql = format!(
        "{ctes_sql}SELECT {alias}.id, {alias}.label, {alias}.properties FROM {} WHERE {where_sql} LIMIT 1",
        from_items.join(", ")
    );
    let rows = tx.execute(&sql, &params)?;

    let (node, created) = match rows.rows.first() {
        Some(row) => (row_to_node(row), false),
        None => {
            let label = node_label_json(n);
            let properties = eval_properties(n.properties.as_ref(), env, query_params)?;
            (tx.insert_node(label, properties)?, true)
        }
    };
    let id = node.id.clone();
    if let Some(name) = &n.variable {
        env.insert(name.clone(), BoundValue::Node(node));
    }
    Ok((id, created))
}

fn row_to_node(row: &[Json]) -> Node {
    Node {
        id: row[0].as_str().unwrap_or_default().to_string(),
        label: row[1].as_str().and_then(|s| serde_json::from_str(s).ok()).unwrap_or(Json::Null),
        properties: row[2].as_str().and_then(|s| serde_json::from_str(s).ok()).unwrap_or(Json::Null),
    }
}

fn row_to_edge(row: &[Json]) -> Edge {
    Edge {
        id: row[0].as_str().unwrap_or_default().to_string(),
        edge_type: row[1].as_str().unwrap_or_default().to_string(),
        source_id: row[2].as_str().unwrap_or_default().to_string(),
        target_id: row[3].as_str().unwrap_or_default().to_string(),
        properties: row[4].as_str().and_then(|s| serde_json::from_str(s).ok()).unwrap_or(Json::Null),
    }
}
