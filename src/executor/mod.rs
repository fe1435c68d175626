//! Query execution (§4.3): dispatches a parsed query onto one of six
//! execution strategies and shapes its result into the external response
//! envelope (§6).
//!
//! `plan::select` picks the strategy; `mutate` applies `CREATE`/`SET`/
//! `DELETE`/`MERGE` directly against storage for the strategies that need it;
//! `eval` computes the property values those mutations write; `format` turns
//! the read-path's raw SQL rows back into the response's `data` array.

pub mod eval;
pub mod format;
mod mutate;
pub mod plan;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde_json::{Map, Value as Json};

use crate::config::EngineConfig;
use crate::cypher::{self, ast::*};
use crate::errors::EngineError;
use crate::response::QueryResponse;
use crate::storage::Storage;
use crate::translator::{self, context::TranslationContext};

use eval::{BoundValue, Env};
use plan::PlannedExecution;

pub struct Executor {
    storage: Storage,
    config: EngineConfig,
}

impl Executor {
    pub fn new(storage: Storage, config: EngineConfig) -> Self {
        Executor { storage, config }
    }

    /// Parses, plans and runs `cypher`, timing the whole pass (§4.3's
    /// millisecond wall-clock, rounded to two decimals by
    /// [`QueryResponse::success`]).
    pub fn execute(&self, cypher_text: &str, params: &Map<String, Json>) -> QueryResponse {
        let start = Instant::now();
        match self.run(cypher_text, params) {
            Ok(data) => QueryResponse::success(data, start.elapsed().as_secs_f64() * 1000.0),
            Err(err) => QueryResponse::failure(&err),
        }
    }

    fn run(&self, cypher_text: &str, params: &Map<String, Json>) -> Result<Vec<Json>, EngineError> {
        let union = cypher::parse(cypher_text)?;
        let mut data = self.run_query(&union.first, params)?;
        let mut has_plain_union = false;
        for (all, query) in &union.rest {
            data.extend(self.run_query(query, params)?);
            has_plain_union |= !all;
        }
        if has_plain_union {
            dedup_by_value(&mut data);
        }
        Ok(data)
    }

    fn run_query(&self, query: &Query, params: &Map<String, Json>) -> Result<Vec<Json>, EngineError> {
        match plan::select(&query.clauses) {
            PlannedExecution::UnwindCreate { unwinds, creates, return_ } => {
                self.run_unwind_create(&unwinds, &creates, return_, params)
            }
            PlannedExecution::CollectUnwindReturn {
                match_,
                collect_expr,
                collect_alias: _,
                unwind_alias,
                return_,
            } => self.run_collect_unwind_return(match_, collect_expr, unwind_alias, return_, params),
            PlannedExecution::CreateReturn { creates, return_ } => self.run_create_return(&creates, return_, params),
            PlannedExecution::Merge { merge, return_ } => self.run_merge(merge, return_, params),
            PlannedExecution::MultiPhase { matches, creates, sets, deletes, return_ } => {
                self.run_multi_phase(&matches, &creates, &sets, &deletes, return_, params)
            }
            PlannedExecution::Fallback => self.run_fallback(&query.clauses, params),
        }
    }

    /// Strategy 6: a pure read pipeline, translated and executed in one pass.
    fn run_fallback(&self, clauses: &[Clause], params: &Map<String, Json>) -> Result<Vec<Json>, EngineError> {
        let mut ctx = TranslationContext::new();
        let translation = translator::translate_read(clauses, &mut ctx, params, self.config.max_path_depth)?;
        let rows = self.storage.execute(&translation.statement.sql, &translation.statement.params)?;
        Ok(format::format_rows(&rows, &translation.columns, &self.config))
    }

    /// Strategy 1: every `UNWIND`'s cartesian product, each tuple feeding one
    /// `CREATE` pass inside a single transaction.
    fn run_unwind_create(
        &self,
        unwinds: &[&UnwindClause],
        creates: &[&CreateClause],
        return_: Option<&ReturnClause>,
        params: &Map<String, Json>,
    ) -> Result<Vec<Json>, EngineError> {
        let mut tuples: Vec<Env> = vec![HashMap::new()];
        for u in unwinds {
            let mut next = Vec::new();
            for base_env in &tuples {
                for item in eval::eval_as_array(&u.expression, base_env, params)? {
                    let mut env = base_env.clone();
                    env.insert(u.alias.clone(), BoundValue::Scalar(item));
                    next.push(env);
                }
            }
            tuples = next;
        }

        let config = &self.config;
        let rows = self.storage.transaction(|tx| {
            let mut rows = Vec::with_capacity(tuples.len());
            for env in &mut tuples {
                for create in creates {
                    mutate::create_patterns(&create.patterns, env, tx, params)?;
                }
                if let Some(r) = return_ {
                    rows.push(project_return_row(r, env, params, config)?);
                }
            }
            Ok::<_, EngineError>(rows)
        })?;

        Ok(match return_ {
            Some(r) => apply_return_shaping(rows, r),
            None => rows,
        })
    }

    /// Strategy 3: `CREATE`, no prior `MATCH`.
    fn run_create_return(
        &self,
        creates: &[&CreateClause],
        return_: Option<&ReturnClause>,
        params: &Map<String, Json>,
    ) -> Result<Vec<Json>, EngineError> {
        let config = &self.config;
        self.storage.transaction(|tx| {
            let mut env: Env = HashMap::new();
            for create in creates {
                mutate::create_patterns(&create.patterns, &mut env, tx, params)?;
            }
            match return_ {
                Some(r) => Ok(vec![project_return_row(r, &env, params, config)?]),
                None => Ok(Vec::new()),
            }
        })
    }

    /// Strategy 4: a lone `MERGE`, probed and upserted against its
    /// label+property signature.
    fn run_merge(
        &self,
        merge: &MergeClause,
        return_: Option<&ReturnClause>,
        params: &Map<String, Json>,
    ) -> Result<Vec<Json>, EngineError> {
        let max_path_depth = self.config.max_path_depth;
        let env = self.storage.transaction(|tx| {
            let mut ctx = TranslationContext::new();
            match &merge.pattern {
                Pattern::Node(n) => {
                    mutate::merge_node(n, &merge.on_create_set, &merge.on_match_set, &mut ctx, tx, params, max_path_depth)
                }
                Pattern::Relationship(rel) => mutate::merge_relationship(
                    rel,
                    &merge.on_create_set,
                    &merge.on_match_set,
                    &mut ctx,
                    tx,
                    params,
                    max_path_depth,
                ),
            }
        })?;
        match return_ {
            Some(r) => Ok(vec![project_return_row(r, &env, params, &self.config)?]),
            None => Ok(Vec::new()),
        }
    }

    /// Strategy 2: `MATCH` + `WITH collect(expr) AS x` + `UNWIND x AS y` +
    /// `RETURN`, collapsed into one SQL round-trip for the aggregate plus an
    /// application-level loop over its single JSON-array row.
    fn run_collect_unwind_return(
        &self,
        match_: &MatchClause,
        collect_expr: &Expression,
        unwind_alias: &str,
        return_: &ReturnClause,
        params: &Map<String, Json>,
    ) -> Result<Vec<Json>, EngineError> {
        let synthetic_return = ReturnClause {
            distinct: false,
            items: vec![ReturnItem {
                expression: Expression::FunctionCall {
                    name: "collect".to_string(),
                    args: vec![collect_expr.clone()],
                    distinct: false,
                },
                alias: Some("__collected".to_string()),
            }],
            order_by: None,
            skip: None,
            limit: None,
        };
        let clauses = vec![Clause::Match(match_.clone()), Clause::Return(synthetic_return)];

        let mut ctx = TranslationContext::new();
        let translation = translator::translate_read(&clauses, &mut ctx, params, self.config.max_path_depth)?;
        let rows = self.storage.execute(&translation.statement.sql, &translation.statement.params)?;

        let collected = rows.rows.first().and_then(|row| row.first()).cloned().unwrap_or(Json::Null);
        let items: Vec<Json> = match collected {
            Json::String(s) => match serde_json::from_str::<Json>(&s) {
                Ok(Json::Array(a)) => a,
                _ => Vec::new(),
            },
            Json::Array(a) => a,
            _ => Vec::new(),
        };

        let mut output = Vec::with_capacity(items.len());
        for item in items {
            let mut env: Env = HashMap::new();
            env.insert(unwind_alias.to_string(), BoundValue::Scalar(item));
            output.push(project_return_row(return_, &env, params, &self.config)?);
        }
        Ok(apply_return_shaping(output, return_))
    }

    /// Strategy 5: one or more `MATCH`es resolved to ids in a single SQL
    /// round-trip, then `CREATE`/`SET`/`DELETE` applied per resulting row
    /// inside one transaction.
    fn run_multi_phase(
        &self,
        matches: &[&MatchClause],
        creates: &[&CreateClause],
        sets: &[&SetClause],
        deletes: &[&DeleteClause],
        return_: Option<&ReturnClause>,
        params: &Map<String, Json>,
    ) -> Result<Vec<Json>, EngineError> {
        let mut ctx = TranslationContext::new();
        let stmt = translator::translate_match_ids(matches, &mut ctx, params, self.config.max_path_depth)?;
        let id_rows = self.storage.execute(&stmt.sql, &stmt.params)?;

        let var_kinds: Vec<(String, translator::context::VarKind)> = id_rows
            .columns
            .iter()
            .filter_map(|name| ctx.lookup(name).map(|info| (name.clone(), info.kind)))
            .collect();

        let config = &self.config;
        let output = self.storage.transaction(|tx| {
            let mut output = Vec::new();
            for row in &id_rows.rows {
                let mut env: Env = HashMap::new();
                for (name, kind) in &var_kinds {
                    let idx = id_rows.columns.iter().position(|c| c == name).expect("kind came from this column");
                    let id_value = &row[idx];
                    if id_value.is_null() {
                        continue;
                    }
                    let id = id_value
                        .as_str()
                        .ok_or_else(|| EngineError::TypeError(format!("'{name}' resolved to a non-string id")))?;
                    match kind {
                        translator::context::VarKind::Node => {
                            env.insert(name.clone(), BoundValue::Node(tx.get_node(id)?));
                        }
                        translator::context::VarKind::Edge => {
                            env.insert(name.clone(), BoundValue::Edge(tx.get_edge(id)?));
                        }
                        translator::context::VarKind::Scalar => {}
                    }
                }

                for create in creates {
                    mutate::create_patterns(&create.patterns, &mut env, tx, params)?;
                }
                for set in sets {
                    mutate::apply_set(&set.assignments, &mut env, tx, params)?;
                }
                for delete in deletes {
                    mutate::apply_delete(delete, &env, tx)?;
                }

                if let Some(r) = return_ {
                    output.push(project_return_row(r, &env, params, config)?);
                }
            }
            Ok::<_, EngineError>(output)
        })?;

        Ok(match return_ {
            Some(r) => apply_return_shaping(output, r),
            None => output,
        })
    }
}

/// Projects one `RETURN` clause's items against a value-level environment —
/// the mutation strategies' counterpart to `translator::project_item`, which
/// only ever projects out of a SQL row.
fn project_return_row(
    r: &ReturnClause,
    env: &Env,
    params: &Map<String, Json>,
    config: &EngineConfig,
) -> Result<Json, EngineError> {
    let mut out = Map::new();
    for item in &r.items {
        let name = item.alias.clone().unwrap_or_else(|| translator::default_name(&item.expression));
        if let Expression::Variable(var_name) = &item.expression {
            if let Some(bound) = env.get(var_name) {
                match bound {
                    BoundValue::Node(n) => {
                        out.insert(name, entity_json(&n.id, &n.label, &n.properties, "label", config));
                        continue;
                    }
                    BoundValue::Edge(e) => {
                        out.insert(
                            name,
                            entity_json(&e.id, &Json::String(e.edge_type.clone()), &e.properties, "type", config),
                        );
                        continue;
                    }
                    BoundValue::Scalar(_) => {}
                }
            }
        }
        let value = eval::eval(&item.expression, env, params)?;
        out.insert(name, format::auto_parse(value, config.json_string_auto_parse));
    }
    Ok(Json::Object(out))
}

fn entity_json(id: &str, label_or_type: &Json, properties: &Json, field: &str, config: &EngineConfig) -> Json {
    let mut obj = Map::new();
    obj.insert("id".to_string(), Json::String(id.to_string()));
    obj.insert(field.to_string(), label_or_type.clone());
    obj.insert(
        "properties".to_string(),
        format::auto_parse(properties.clone(), config.json_string_auto_parse),
    );
    Json::Object(obj)
}

/// Applies `DISTINCT`/`ORDER BY`/`SKIP`/`LIMIT` to a value-level strategy's
/// already-materialized rows — the read pipeline gets these for free from
/// SQL, so only the mutation strategies that loop in application code need
/// this done explicitly.
fn apply_return_shaping(mut rows: Vec<Json>, r: &ReturnClause) -> Vec<Json> {
    if let Some(order_by) = &r.order_by {
        rows.sort_by(|a, b| {
            for item in order_by {
                let key = translator::default_name(&item.expression);
                let av = a.get(&key).cloned().unwrap_or(Json::Null);
                let bv = b.get(&key).cloned().unwrap_or(Json::Null);
                let ord = if item.descending { json_cmp(&bv, &av) } else { json_cmp(&av, &bv) };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
    if r.distinct {
        dedup_by_value(&mut rows);
    }
    let skip = r.skip.unwrap_or(0).max(0) as usize;
    let rows: Vec<Json> = rows.into_iter().skip(skip).collect();
    match r.limit {
        Some(limit) => rows.into_iter().take(limit.max(0) as usize).collect(),
        None => rows,
    }
}

fn json_cmp(a: &Json, b: &Json) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn dedup_by_value(rows: &mut Vec<Json>) {
    let mut seen = HashSet::new();
    rows.retain(|row| seen.insert(row.to_string()));
}
