//! `MATCH` pattern → `FROM`/`JOIN` SQL, including variable-length paths
//! compiled to a recursive CTE (§4.2).
//!
//! Patterns are walked left to right, and every predicate a pattern element
//! contributes is attached to the `JoinItem` introduced at that point in the
//! walk — by construction a predicate never references an alias that has
//! not yet appeared earlier in `items`. For a plain (non-`OPTIONAL`) clause
//! none of that ON/WHERE placement actually matters semantically (an inner
//! join's `ON` and a trailing `WHERE` are equivalent), so after the walk
//! every item's predicates are drained into one flat `WHERE` list — this
//! keeps ordinary `MATCH` SQL reading as plain `FROM a, b, c WHERE ...`
//! rather than a wall of `ON 1=1` joins. `OPTIONAL MATCH` keeps predicates
//! pinned to their introducing item's own `ON` clause instead, which is
//! what makes the null-extension behavior correct once `translator::mod`
//! renders that item as a `LEFT JOIN`.

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::cypher::ast::*;
use crate::errors::EngineError;

use super::context::{Scope, TranslationContext, VarKind};
use super::expr;

/// One `FROM`/`JOIN` table. For a mandatory clause this ends up with empty
/// `predicates` (everything drained into [`MatchBuild::where_preds`]); for
/// an optional clause it keeps the predicates that became resolvable
/// exactly when this item was introduced, rendered as that item's own
/// `LEFT JOIN ... ON ...`.
#[derive(Debug, Default)]
pub struct JoinItem {
    pub sql: String,
    pub predicates: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MatchBuild {
    pub items: Vec<JoinItem>,
    /// Parameters consumed by `items[*].predicates`, in the same left to
    /// right order those predicates are generated (and hence rendered).
    pub params: Vec<Json>,
    pub where_preds: Vec<String>,
    pub where_params: Vec<Json>,
    /// `name(cols...) AS (recursive union query)` fragments to prepend as
    /// `WITH RECURSIVE` on the terminal statement.
    pub ctes: Vec<String>,
    /// Params bound inside `ctes`' own SQL text. Kept apart from `params`
    /// because a `WITH RECURSIVE` prefix physically precedes the rest of the
    /// statement — its `?`s must come first in the bound vector regardless
    /// of where in the pattern walk the CTE was introduced.
    pub cte_params: Vec<Json>,
}

impl MatchBuild {
    /// Flattens the join chain into a plain comma-joined `FROM` list and a
    /// single predicate list — correct for a self-contained `EXISTS`
    /// subquery, where there is no null-extension to preserve.
    pub fn into_flat(mut self) -> (Vec<String>, Vec<String>, Vec<Json>, Vec<String>) {
        let mut from_items = Vec::with_capacity(self.items.len());
        let mut predicates = self.where_preds;
        let mut params = self.cte_params;
        params.extend(self.where_params);
        for item in &mut self.items {
            from_items.push(std::mem::take(&mut item.sql));
            predicates.append(&mut item.predicates);
        }
        params.extend(self.params);
        (from_items, predicates, params, self.ctes)
    }
}

/// Builds the join chain for `patterns` plus, if present, the clause's own
/// `WHERE` condition. `optional` selects whether predicates are drained
/// into a flat `WHERE` list (mandatory `MATCH`) or kept per-item for
/// `LEFT JOIN ... ON ...` rendering (`OPTIONAL MATCH`). `already_in_scope`
/// names the aliases an enclosing query has already placed in its `FROM`
/// clause (used by `EXISTS` to correlate against the outer `MATCH` instead
/// of re-joining the same table under the same alias).
pub fn build(
    patterns: &[Pattern],
    where_condition: Option<&WhereCondition>,
    optional: bool,
    ctx: &mut TranslationContext,
    query_params: &Map<String, Json>,
    max_path_depth: u32,
    already_in_scope: &HashSet<String>,
) -> Result<MatchBuild, EngineError> {
    let mut build = MatchBuild::default();
    let mut joined: HashSet<String> = already_in_scope.clone();

    for pattern in patterns {
        match pattern {
            Pattern::Node(n) => {
                let alias = ctx.bind_optional(n.variable.as_deref(), VarKind::Node);
                let mut item = JoinItem::default();
                if joined.insert(alias.clone()) {
                    item.sql = format!("nodes {alias}");
                }
                add_node_predicates(n, &alias, ctx, query_params, &mut item.predicates, &mut build.params)?;
                push_item(&mut build, item);
            }
            Pattern::Relationship(rel) => {
                let source_alias = ctx.bind_optional(rel.source.variable.as_deref(), VarKind::Node);
                let mut source_item = JoinItem::default();
                if joined.insert(source_alias.clone()) {
                    source_item.sql = format!("nodes {source_alias}");
                }
                add_node_predicates(
                    &rel.source,
                    &source_alias,
                    ctx,
                    query_params,
                    &mut source_item.predicates,
                    &mut build.params,
                )?;
                push_item(&mut build, source_item);

                let target_alias = ctx.bind_optional(rel.target.variable.as_deref(), VarKind::Node);

                if let Some(vl) = rel.edge.variable_length {
                    let cte_name = ctx.fresh_cte_name();
                    let cte_sql = build_variable_length_cte(&cte_name, rel, max_path_depth, &mut build.cte_params)?;
                    build.ctes.push(cte_sql);

                    let mut cte_item = JoinItem::default();
                    if joined.insert(cte_name.clone()) {
                        cte_item.sql = cte_name.clone();
                    }
                    cte_item
                        .predicates
                        .push(format!("{cte_name}.start_id = {source_alias}.id"));
                    cte_item.predicates.push(format!("{cte_name}.depth >= {}", vl.min_hops));
                    if let Some(max) = vl.max_hops {
                        cte_item.predicates.push(format!("{cte_name}.depth <= {max}"));
                    }
                    push_item(&mut build, cte_item);

                    let mut target_item = JoinItem::default();
                    if joined.insert(target_alias.clone()) {
                        target_item.sql = format!("nodes {target_alias}");
                    }
                    target_item
                        .predicates
                        .push(format!("{cte_name}.end_id = {target_alias}.id"));
                    add_node_predicates(
                        &rel.target,
                        &target_alias,
                        ctx,
                        query_params,
                        &mut target_item.predicates,
                        &mut build.params,
                    )?;
                    push_item(&mut build, target_item);
                } else {
                    let edge_alias = ctx.bind_optional(rel.edge.variable.as_deref(), VarKind::Edge);
                    let mut edge_item = JoinItem::default();
                    if joined.insert(edge_alias.clone()) {
                        edge_item.sql = format!("edges {edge_alias}");
                    }
                    if let Some(edge_type) = &rel.edge.edge_type {
                        edge_item.predicates.push(format!("{edge_alias}.type = ?"));
                        build.params.push(Json::String(edge_type.clone()));
                    }
                    add_edge_property_predicates(
                        rel,
                        &edge_alias,
                        ctx,
                        query_params,
                        &mut edge_item.predicates,
                        &mut build.params,
                    )?;

                    match rel.edge.direction {
                        Direction::Right => {
                            edge_item
                                .predicates
                                .push(format!("{edge_alias}.source_id = {source_alias}.id"));
                        }
                        Direction::Left => {
                            edge_item
                                .predicates
                                .push(format!("{edge_alias}.target_id = {source_alias}.id"));
                        }
                        Direction::None => {}
                    }
                    push_item(&mut build, edge_item);

                    let mut target_item = JoinItem::default();
                    if joined.insert(target_alias.clone()) {
                        target_item.sql = format!("nodes {target_alias}");
                    }
                    match rel.edge.direction {
                        Direction::Right => target_item
                            .predicates
                            .push(format!("{edge_alias}.target_id = {target_alias}.id")),
                        Direction::Left => target_item
                            .predicates
                            .push(format!("{edge_alias}.source_id = {target_alias}.id")),
                        // Undirected match: a row satisfies the pattern in either
                        // orientation (§9 — read semantics only; writes always
                        // pick a concrete direction, see executor mutation phases).
                        Direction::None => target_item.predicates.push(format!(
                            "(({e}.source_id = {s}.id AND {e}.target_id = {t}.id) OR \
                              ({e}.source_id = {t}.id AND {e}.target_id = {s}.id))",
                            e = edge_alias,
                            s = source_alias,
                            t = target_alias
                        )),
                    }
                    add_node_predicates(
                        &rel.target,
                        &target_alias,
                        ctx,
                        query_params,
                        &mut target_item.predicates,
                        &mut build.params,
                    )?;
                    push_item(&mut build, target_item);
                }
            }
        }
    }

    if !optional {
        for item in &mut build.items {
            build.where_preds.append(&mut item.predicates);
        }
        build.where_params.append(&mut build.params);
    }

    if let Some(cond) = where_condition {
        let scope = Scope::new(ctx, query_params);
        if optional {
            let mut params = Vec::new();
            let sql = super::where_::render_into(cond, &scope, &mut params)?;
            build.params.extend(params);
            match build.items.last_mut() {
                Some(last) => last.predicates.push(sql),
                None => build.items.push(JoinItem {
                    sql: String::new(),
                    predicates: vec![sql],
                }),
            }
        } else {
            let mut params = Vec::new();
            let sql = super::where_::render_into(cond, &scope, &mut params)?;
            build.where_preds.push(sql);
            build.where_params.extend(params);
        }
    }

    Ok(build)
}

/// An item whose `sql` is empty means the alias it names was already joined
/// (reused variable, or correlated against the outer query) — only its
/// predicates, if any, are kept, folded onto the previous item so they
/// still appear somewhere in the chain.
fn push_item(build: &mut MatchBuild, item: JoinItem) {
    if item.sql.is_empty() {
        if item.predicates.is_empty() {
            return;
        }
        match build.items.last_mut() {
            Some(last) => last.predicates.extend(item.predicates),
            None => build.items.push(item),
        }
    } else {
        build.items.push(item);
    }
}

fn add_node_predicates(
    node: &NodePattern,
    alias: &str,
    ctx: &TranslationContext,
    query_params: &Map<String, Json>,
    predicates: &mut Vec<String>,
    params: &mut Vec<Json>,
) -> Result<(), EngineError> {
    if let Some(label) = &node.label {
        predicates.push(format!("json_extract({alias}.label, '$[0]') = ?"));
        params.push(Json::String(label.clone()));
    }
    if let Some(props) = &node.properties {
        let scope = Scope::new(ctx, query_params);
        for (key, value) in props {
            let rendered = expr::render(value, &scope)?;
            predicates.push(format!("json_extract({alias}.properties, '$.{key}') = {}", rendered.sql));
            params.extend(rendered.params);
        }
    }
    Ok(())
}

fn add_edge_property_predicates(
    rel: &RelationshipPattern,
    alias: &str,
    ctx: &TranslationContext,
    query_params: &Map<String, Json>,
    predicates: &mut Vec<String>,
    params: &mut Vec<Json>,
) -> Result<(), EngineError> {
    if let Some(props) = &rel.edge.properties {
        let scope = Scope::new(ctx, query_params);
        for (key, value) in props {
            let rendered = expr::render(value, &scope)?;
            predicates.push(format!("json_extract({alias}.properties, '$.{key}') = {}", rendered.sql));
            params.extend(rendered.params);
        }
    }
    Ok(())
}

/// Compiles a `*min..max` relationship into a bounded recursive CTE over the
/// `edges` table. `maxDepth` (from `EngineConfig::max_path_depth`) bounds an
/// otherwise-unbounded `*min..` pattern so the recursion always terminates.
fn build_variable_length_cte(
    cte_name: &str,
    rel: &RelationshipPattern,
    max_path_depth: u32,
    params: &mut Vec<Json>,
) -> Result<String, EngineError> {
    let vl = rel.edge.variable_length.expect("caller checked Some");
    let bound = vl.max_hops.unwrap_or(max_path_depth).min(max_path_depth);

    // Each call appends exactly one `?` and its bound value, so the
    // parameter vector always stays in lockstep with the SQL text built
    // below regardless of how many times the filter is substituted.
    let mut type_filter = || -> String {
        match &rel.edge.edge_type {
            Some(t) => {
                params.push(Json::String(t.clone()));
                "type = ?".to_string()
            }
            None => "1 = 1".to_string(),
        }
    };

    let (base, step) = match rel.edge.direction {
        Direction::Right => (
            format!(
                "SELECT source_id AS start_id, target_id AS end_id, 1 AS depth FROM edges WHERE {}",
                type_filter()
            ),
            format!(
                "SELECT {cte}.start_id, e.target_id, {cte}.depth + 1 \
                 FROM {cte} JOIN edges e ON e.source_id = {cte}.end_id AND ({tf}) \
                 WHERE {cte}.depth < {bound}",
                cte = cte_name,
                tf = type_filter(),
                bound = bound
            ),
        ),
        Direction::Left => (
            format!(
                "SELECT target_id AS start_id, source_id AS end_id, 1 AS depth FROM edges WHERE {}",
                type_filter()
            ),
            format!(
                "SELECT {cte}.start_id, e.source_id, {cte}.depth + 1 \
                 FROM {cte} JOIN edges e ON e.target_id = {cte}.end_id AND ({tf}) \
                 WHERE {cte}.depth < {bound}",
                cte = cte_name,
                tf = type_filter(),
                bound = bound
            ),
        ),
        Direction::None => (
            format!(
                "SELECT source_id AS start_id, target_id AS end_id, 1 AS depth FROM edges WHERE {a} \
                 UNION ALL \
                 SELECT target_id AS start_id, source_id AS end_id, 1 AS depth FROM edges WHERE {b}",
                a = type_filter(),
                b = type_filter()
            ),
            format!(
                "SELECT {cte}.start_id, e.target_id, {cte}.depth + 1 \
                 FROM {cte} JOIN edges e ON e.source_id = {cte}.end_id AND ({a}) \
                 WHERE {cte}.depth < {bound} \
                 UNION ALL \
                 SELECT {cte}.start_id, e.source_id, {cte}.depth + 1 \
                 FROM {cte} JOIN edges e ON e.target_id = {cte}.end_id AND ({b}) \
                 WHERE {cte}.depth < {bound}",
                cte = cte_name,
                a = type_filter(),
                b = type_filter(),
                bound = bound
            ),
        ),
    };

    Ok(format!("{cte_name}(start_id, end_id, depth) AS ({base} UNION ALL {step})"))
}
