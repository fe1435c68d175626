//! Cypher read pipeline → SQL (§4.2).
//!
//! A query's `MATCH`/`OPTIONAL MATCH`/`UNWIND`/`CALL`/`WITH`/`RETURN` clauses
//! are stitched together into one [`Segment`] at a time: `MATCH` and `UNWIND`
//! extend the current segment's `FROM` chain, while `WITH`/`CALL` close the
//! current segment off as a derived-table subquery and open a fresh one
//! rooted on it. `RETURN` terminates the pipeline into the query's one
//! [`Statement`].
//!
//! Mutating clauses (`CREATE`/`MERGE`/`SET`/`DELETE`) never appear here —
//! those are executed directly against [`crate::storage`] by the executor.

pub mod context;
pub mod expr;
pub mod functions;
pub mod match_;
pub mod procedures;
pub mod where_;

use std::collections::HashSet;

use serde_json::{Map, Value as Json};

use crate::cypher::ast::*;
use crate::errors::EngineError;

use context::{TranslationContext, VarKind};

/// One terminal SQL statement plus its positional parameters, in `?` order.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Json>,
}

/// How a `RETURN`/`WITH` item's column(s) should be read back out of a row.
#[derive(Debug, Clone)]
pub enum ReturnColumn {
    /// `is_boolean` marks an item whose top-level expression was a
    /// comparison/boolean condition, so the executor's result formatter
    /// normalizes SQLite's 0/1 integer back to `false`/`true` (§4.3).
    Scalar { name: String, is_boolean: bool },
    Entity { alias: String, kind: VarKind },
}

#[derive(Debug, Clone)]
pub struct Translation {
    pub statement: Statement,
    pub columns: Vec<ReturnColumn>,
}

/// What a single projected `RETURN`/`WITH` item turned into on the select
/// list: either one scalar column or a node/edge's three-column triad.
enum ProjectedKind {
    Scalar,
    Entity(VarKind),
}

struct Projection {
    name: String,
    kind: ProjectedKind,
}

/// Assembles the select-list fragment(s) for one `ReturnItem`, pushing them
/// onto `select_list` (already `AS`-aliased) and their params onto
/// `params_out`. Shared between `WITH` and `RETURN` handling so both name a
/// bare entity variable's three carried columns identically.
fn project_item(
    item: &ReturnItem,
    ctx: &TranslationContext,
    scope_params: &Map<String, Json>,
    select_list: &mut Vec<String>,
    params_out: &mut Vec<Json>,
) -> Result<Projection, EngineError> {
    let name = item
        .alias
        .clone()
        .unwrap_or_else(|| default_name(&item.expression));

    if let Expression::Variable(var_name) = &item.expression {
        if let Some(info) = ctx.lookup(var_name) {
            if info.kind != VarKind::Scalar {
                let id = info.id_sql().expect("entity var always has id_sql");
                let label_or_type = info.label_or_type_sql().expect("entity var always has label_or_type_sql");
                let properties = info.properties_sql().expect("entity var always has properties_sql");
                let field = if info.kind == VarKind::Edge { "type" } else { "label" };
                select_list.push(format!("{id} AS {name}__id"));
                select_list.push(format!("{label_or_type} AS {name}__{field}"));
                select_list.push(format!("{properties} AS {name}__properties"));
                return Ok(Projection { name, kind: ProjectedKind::Entity(info.kind) });
            }
        }
    }

    let scope = context::Scope::new(ctx, scope_params);
    let rendered = expr::render(&item.expression, &scope)?;
    select_list.push(format!("{} AS {name}", rendered.sql));
    params_out.extend(rendered.params);
    Ok(Projection { name, kind: ProjectedKind::Scalar })
}

/// A readable default name for an unaliased projection, matching how Cypher
/// implementations typically stringify a bare expression for its column
/// header.
pub(crate) fn default_name(expr: &Expression) -> String {
    match expr {
        Expression::Variable(name) => name.clone(),
        Expression::PropertyAccess { base, key } => format!("{base}.{key}"),
        Expression::FunctionCall { name, .. } => name.to_lowercase(),
        Expression::Literal(_) => "literal".to_string(),
        Expression::Case(_) => "case".to_string(),
        _ => "expr".to_string(),
    }
}

fn is_aggregate_item(expr: &Expression) -> bool {
    matches!(expr, Expression::FunctionCall { name, .. } if functions::lookup(name).is_some_and(|m| m.is_aggregate))
}

fn ons_or_true(preds: &[String]) -> String {
    if preds.is_empty() {
        "1 = 1".to_string()
    } else {
        preds.join(" AND ")
    }
}

fn order_by_sql(
    order_by: &[OrderByItem],
    scope: &context::Scope,
    params: &mut Vec<Json>,
) -> Result<String, EngineError> {
    let mut parts = Vec::with_capacity(order_by.len());
    for item in order_by {
        let rendered = expr::render(&item.expression, scope)?;
        params.extend(rendered.params);
        parts.push(format!("{} {}", rendered.sql, if item.descending { "DESC" } else { "ASC" }));
    }
    Ok(parts.join(", "))
}

/// A chain of `FROM`/`JOIN` items rooted either on a real table (from the
/// first `MATCH`) or on a prior segment's wrapped derived table (`WITH`,
/// `CALL`).
#[derive(Debug, Default)]
struct Segment {
    root: Option<String>,
    /// `(optional, item)` in the order each item was introduced.
    items: Vec<(bool, match_::JoinItem)>,
    where_preds: Vec<String>,
    where_extra_params: Vec<Json>,
    params: Vec<Json>,
    ctes: Vec<String>,
    /// Params bound inside `ctes`' own SQL text — physically first in the
    /// assembled statement, so kept apart from `params` until
    /// `assemble_params` puts them at the front of the bound vector.
    cte_params: Vec<Json>,
}

impl Segment {
    fn already_in_scope(&self, ctx: &TranslationContext) -> HashSet<String> {
        ctx.variables()
            .filter_map(|name| ctx.lookup(name))
            .filter_map(|info| info.table_alias().map(str::to_string))
            .collect()
    }

    fn add_match(
        &mut self,
        m: &MatchClause,
        ctx: &mut TranslationContext,
        query_params: &Map<String, Json>,
        max_path_depth: u32,
    ) -> Result<(), EngineError> {
        let already_in_scope = self.already_in_scope(ctx);
        let build = match_::build(
            &m.patterns,
            m.where_condition.as_ref(),
            m.optional,
            ctx,
            query_params,
            max_path_depth,
            &already_in_scope,
        )?;
        self.ctes.extend(build.ctes);
        self.cte_params.extend(build.cte_params);
        self.params.extend(build.params);
        self.where_preds.extend(build.where_preds);
        self.where_extra_params.extend(build.where_params);
        for item in build.items {
            self.items.push((m.optional, item));
        }
        Ok(())
    }

    fn add_unwind(
        &mut self,
        u: &UnwindClause,
        ctx: &mut TranslationContext,
        query_params: &Map<String, Json>,
    ) -> Result<(), EngineError> {
        let scope = context::Scope::new(ctx, query_params);
        let rendered = expr::render(&u.expression, &scope)?;
        self.params.extend(rendered.params);
        let alias = ctx.fresh_alias(VarKind::Scalar);
        self.items.push((
            false,
            match_::JoinItem {
                sql: format!("json_each({}) AS {alias}", rendered.sql),
                predicates: Vec::new(),
            },
        ));
        ctx.bind_scalar(&u.alias, format!("{alias}.value"));
        Ok(())
    }

    /// `root, mandatory_item_1.sql, ...` followed by each optional item
    /// rendered as its own `LEFT JOIN ... ON ...`, in original relative
    /// order (mandatory items carry no `ON` predicates by construction, so
    /// their relative position doesn't matter; optional items may reference
    /// an earlier optional item's alias and so must stay in order).
    fn from_sql(&self) -> String {
        let mandatory: Vec<&str> = self
            .items
            .iter()
            .filter(|(optional, _)| !optional)
            .map(|(_, item)| item.sql.as_str())
            .collect();

        let base = match &self.root {
            Some(root) => {
                if mandatory.is_empty() {
                    root.clone()
                } else {
                    format!("{root}, {}", mandatory.join(", "))
                }
            }
            None => {
                if mandatory.is_empty() {
                    "(SELECT 1)".to_string()
                } else {
                    mandatory.join(", ")
                }
            }
        };

        let mut sql = base;
        for (optional, item) in &self.items {
            if *optional {
                sql.push_str(&format!(" LEFT JOIN {} ON {}", item.sql, ons_or_true(&item.predicates)));
            }
        }
        sql
    }

    #[allow(clippy::too_many_arguments)]
    fn build_sql(
        &self,
        distinct: bool,
        select_list: &[String],
        group_by: &[String],
        order_by: Option<&str>,
        skip: Option<i64>,
        limit: Option<i64>,
    ) -> String {
        let mut sql = String::new();
        if !self.ctes.is_empty() {
            sql.push_str(&format!("WITH RECURSIVE {} ", self.ctes.join(", ")));
        }
        sql.push_str("SELECT ");
        if distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&select_list.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.from_sql());
        if !self.where_preds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_preds.join(" AND "));
        }
        if !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }
        if let Some(order_by) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(skip) = skip {
                sql.push_str(&format!(" OFFSET {skip}"));
            }
        } else if let Some(skip) = skip {
            // SQLite requires a LIMIT before OFFSET is usable.
            sql.push_str(&format!(" LIMIT -1 OFFSET {skip}"));
        }
        sql
    }

    /// `[cte params] ++ [select-list params] ++ [from/join params] ++
    /// [where params] ++ [order-by params]` — the order each `?` placeholder
    /// physically appears in the text `build_sql` produces (`WITH RECURSIVE`
    /// precedes `SELECT`, which precedes `FROM`/`WHERE`).
    fn assemble_params(&self, select_params: Vec<Json>, order_by_params: Vec<Json>) -> Vec<Json> {
        let mut params = self.cte_params.clone();
        params.extend(select_params);
        params.extend(self.params.clone());
        params.extend(self.where_extra_params.clone());
        params.extend(order_by_params);
        params
    }

    fn wrap_call(
        self,
        c: &CallClause,
        ctx: &mut TranslationContext,
        query_params: &Map<String, Json>,
    ) -> Result<Segment, EngineError> {
        if !self.items.is_empty() || self.root.is_some() {
            return Err(EngineError::UnsupportedFeature(
                "CALL is only supported as the first stage of a query".to_string(),
            ));
        }
        let proc = procedures::resolve(c)?;
        let wrapped = format!("({}) AS callsrc", proc.sql);
        let yield_name = procedures::yielded_name(c, proc.default_column);
        ctx.bind_scalar(&yield_name, format!("callsrc.{}", proc.default_column));

        let mut seg = Segment { root: Some(wrapped), ..Segment::default() };
        if let Some(cond) = &c.where_condition {
            let scope = context::Scope::new(ctx, query_params);
            let mut params = Vec::new();
            let sql = where_::render_into(cond, &scope, &mut params)?;
            seg.where_preds.push(sql);
            seg.where_extra_params.extend(params);
        }
        Ok(seg)
    }

    fn wrap_with(
        self,
        w: &WithClause,
        ctx: &mut TranslationContext,
        query_params: &Map<String, Json>,
    ) -> Result<Segment, EngineError> {
        let mut select_list = Vec::new();
        let mut select_params = Vec::new();
        let mut group_by = Vec::new();
        let mut projections = Vec::with_capacity(w.items.len());
        let has_aggregate = w.items.iter().any(|item| is_aggregate_item(&item.expression));

        for item in &w.items {
            let before = select_list.len();
            let projection = project_item(item, ctx, query_params, &mut select_list, &mut select_params)?;
            if has_aggregate && !is_aggregate_item(&item.expression) {
                for fragment in &select_list[before..] {
                    let key = fragment.rsplit_once(" AS ").map(|(key, _)| key).unwrap_or(fragment);
                    group_by.push(key.to_string());
                }
            }
            projections.push(projection);
        }

        let (order_sql, order_params) = match &w.order_by {
            Some(order_items) => {
                let scope = context::Scope::new(ctx, query_params);
                let mut order_params = Vec::new();
                let sql = order_by_sql(order_items, &scope, &mut order_params)?;
                (Some(sql), order_params)
            }
            None => (None, Vec::new()),
        };

        let group_by_out = if has_aggregate { group_by } else { Vec::new() };
        let inner_sql = self.build_sql(w.distinct, &select_list, &group_by_out, order_sql.as_deref(), w.skip, w.limit);
        let inner_params = self.assemble_params(select_params, order_params);

        let with_alias = ctx.fresh_with_alias();
        let wrapped = format!("({inner_sql}) AS {with_alias}");

        let projected_names: HashSet<String> = projections.iter().map(|p| p.name.clone()).collect();
        ctx.retain_only(&projected_names);
        for projection in &projections {
            match projection.kind {
                ProjectedKind::Entity(kind) => ctx.bind_carried_entity(&projection.name, kind, &with_alias),
                ProjectedKind::Scalar => ctx.bind_scalar(&projection.name, format!("{with_alias}.{}", projection.name)),
            }
        }

        let mut seg = Segment { root: Some(wrapped), params: inner_params, ..Segment::default() };
        if let Some(cond) = &w.where_condition {
            let scope = context::Scope::new(ctx, query_params);
            let mut params = Vec::new();
            let sql = where_::render_into(cond, &scope, &mut params)?;
            seg.where_preds.push(sql);
            seg.where_extra_params.extend(params);
        }
        Ok(seg)
    }

    fn finish_return(
        &self,
        r: &ReturnClause,
        ctx: &mut TranslationContext,
        query_params: &Map<String, Json>,
    ) -> Result<(Statement, Vec<ReturnColumn>), EngineError> {
        let mut select_list = Vec::new();
        let mut select_params = Vec::new();
        let mut group_by = Vec::new();
        let mut columns = Vec::with_capacity(r.items.len());
        let has_aggregate = r.items.iter().any(|item| is_aggregate_item(&item.expression));

        for item in &r.items {
            let before = select_list.len();
            let projection = project_item(item, ctx, query_params, &mut select_list, &mut select_params)?;
            if has_aggregate && !is_aggregate_item(&item.expression) {
                for fragment in &select_list[before..] {
                    let key = fragment.rsplit_once(" AS ").map(|(key, _)| key).unwrap_or(fragment);
                    group_by.push(key.to_string());
                }
            }
            columns.push(match projection.kind {
                ProjectedKind::Scalar => ReturnColumn::Scalar {
                    name: projection.name,
                    is_boolean: matches!(item.expression, Expression::Comparison(_)),
                },
                ProjectedKind::Entity(kind) => ReturnColumn::Entity { alias: projection.name, kind },
            });
        }

        let (order_sql, order_params) = match &r.order_by {
            Some(order_items) => {
                let scope = context::Scope::new(ctx, query_params);
                let mut order_params = Vec::new();
                let sql = order_by_sql(order_items, &scope, &mut order_params)?;
                (Some(sql), order_params)
            }
            None => (None, Vec::new()),
        };

        let group_by_out = if has_aggregate { group_by } else { Vec::new() };
        let sql = self.build_sql(r.distinct, &select_list, &group_by_out, order_sql.as_deref(), r.skip, r.limit);
        let params = self.assemble_params(select_params, order_params);

        Ok((Statement { sql, params }, columns))
    }
}

/// Translates a query's full clause pipeline (everything up to and including
/// its terminal `RETURN`) into one SQL statement.
pub fn translate_read(
    clauses: &[Clause],
    ctx: &mut TranslationContext,
    query_params: &Map<String, Json>,
    max_path_depth: u32,
) -> Result<Translation, EngineError> {
    let mut seg = Segment::default();
    let mut result: Option<(Statement, Vec<ReturnColumn>)> = None;

    for clause in clauses {
        match clause {
            Clause::Match(m) => seg.add_match(m, ctx, query_params, max_path_depth)?,
            Clause::Unwind(u) => seg.add_unwind(u, ctx, query_params)?,
            Clause::Call(c) => seg = seg.wrap_call(c, ctx, query_params)?,
            Clause::With(w) => seg = seg.wrap_with(w, ctx, query_params)?,
            Clause::Return(r) => {
                result = Some(seg.finish_return(r, ctx, query_params)?);
            }
            Clause::Create(_) | Clause::Merge(_) | Clause::Set(_) | Clause::Delete(_) => {
                return Err(EngineError::UnsupportedFeature(
                    "mutating clauses are executed directly, not translated to a read statement".to_string(),
                ));
            }
        }
    }

    let (statement, columns) =
        result.ok_or_else(|| EngineError::UnsupportedFeature("query has no RETURN clause".to_string()))?;
    Ok(Translation { statement, columns })
}

/// Builds a single statement that resolves every variable bound by
/// `match_clauses` to its internal id — used by the executor's general
/// multi-phase strategy to pin down ids before applying write phases.
pub fn translate_match_ids(
    match_clauses: &[&MatchClause],
    ctx: &mut TranslationContext,
    query_params: &Map<String, Json>,
    max_path_depth: u32,
) -> Result<Statement, EngineError> {
    let mut seg = Segment::default();
    for m in match_clauses {
        seg.add_match(m, ctx, query_params, max_path_depth)?;
    }

    let names: Vec<String> = ctx.variables().cloned().collect();
    let mut select_list = Vec::with_capacity(names.len());
    for name in &names {
        let info = ctx.lookup(name).expect("name came from ctx.variables()");
        if let Some(id_sql) = info.id_sql() {
            select_list.push(format!("{id_sql} AS {name}"));
        }
    }
    if select_list.is_empty() {
        select_list.push("1 AS _dummy".to_string());
    }

    let sql = seg.build_sql(false, &select_list, &[], None, None, None);
    let params = seg.assemble_params(Vec::new(), Vec::new());
    Ok(Statement { sql, params })
}
