//! `WhereCondition` tree → SQL boolean expression (§4.2).
//!
//! `IN` is resolved the same way whether its right-hand side is a literal
//! list or a parameter-bound array: both sides go through SQLite's
//! `json_each`, so a heterogeneous list behaves identically regardless of
//! where it came from (§9's open question — documented in DESIGN.md).

use std::collections::HashSet;

use serde_json::Value as Json;

use crate::cypher::ast::*;
use crate::errors::EngineError;

use super::context::Scope;
use super::expr;
use super::match_;

pub struct Rendered {
    pub sql: String,
    pub params: Vec<Json>,
}

pub fn render(cond: &WhereCondition, scope: &Scope) -> Result<Rendered, EngineError> {
    let mut params = Vec::new();
    let sql = render_into(cond, scope, &mut params)?;
    Ok(Rendered { sql, params })
}

pub(super) fn render_into(cond: &WhereCondition, scope: &Scope, params: &mut Vec<Json>) -> Result<String, EngineError> {
    Ok(match cond {
        WhereCondition::Compare { op, left, right } => {
            let l = expr_sql(left, scope, params)?;
            let r = expr_sql(right, scope, params)?;
            format!("({l} {} {r})", compare_op_sql(*op))
        }
        WhereCondition::And(l, r) => {
            format!("({} AND {})", render_into(l, scope, params)?, render_into(r, scope, params)?)
        }
        WhereCondition::Or(l, r) => {
            format!("({} OR {})", render_into(l, scope, params)?, render_into(r, scope, params)?)
        }
        WhereCondition::Not(inner) => format!("(NOT {})", render_into(inner, scope, params)?),
        WhereCondition::Contains { haystack, needle } => {
            let h = expr_sql(haystack, scope, params)?;
            let n = expr_sql(needle, scope, params)?;
            format!("({h} LIKE '%' || {n} || '%')")
        }
        WhereCondition::StartsWith { value, prefix } => {
            let v = expr_sql(value, scope, params)?;
            let p = expr_sql(prefix, scope, params)?;
            format!("({v} LIKE {p} || '%')")
        }
        WhereCondition::EndsWith { value, suffix } => {
            let v = expr_sql(value, scope, params)?;
            let s = expr_sql(suffix, scope, params)?;
            format!("({v} LIKE '%' || {s})")
        }
        WhereCondition::IsNull(e) => format!("({} IS NULL)", expr_sql(e, scope, params)?),
        WhereCondition::IsNotNull(e) => format!("({} IS NOT NULL)", expr_sql(e, scope, params)?),
        WhereCondition::In { value, list } => {
            let v = expr_sql(value, scope, params)?;
            let l = expr_sql(list, scope, params)?;
            format!("({v} IN (SELECT value FROM json_each({l})))")
        }
        WhereCondition::Exists(pattern, inner_where) => render_exists(pattern, inner_where.as_deref(), scope, params)?,
    })
}

fn expr_sql(expression: &Expression, scope: &Scope, params: &mut Vec<Json>) -> Result<String, EngineError> {
    let rendered = expr::render(expression, scope)?;
    params.extend(rendered.params);
    Ok(rendered.sql)
}

fn compare_op_sql(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Gt => ">",
        CompareOp::Le => "<=",
        CompareOp::Ge => ">=",
    }
}

/// `EXISTS(pattern [WHERE ...])` becomes a correlated `EXISTS (SELECT 1 ...)`
/// subquery. Variables the pattern shares with the outer query are matched
/// by alias rather than re-joined, so the subquery genuinely correlates.
fn render_exists(
    pattern: &Pattern,
    inner_where: Option<&WhereCondition>,
    scope: &Scope,
    params: &mut Vec<Json>,
) -> Result<String, EngineError> {
    let already_in_scope: HashSet<String> = scope
        .vars
        .variables()
        .filter_map(|name| scope.vars.lookup(name))
        .filter_map(|info| info.table_alias().map(str::to_string))
        .collect();

    // `EXISTS` only ever introduces variables that are either already bound
    // or scoped to the subquery itself, so mutating a clone of the registry
    // (rather than the outer one) keeps the outer query's aliasing stable.
    let mut local_ctx_holder = scope.vars.clone();
    let build = match_::build(
        std::slice::from_ref(pattern),
        None,
        false,
        &mut local_ctx_holder,
        scope.params,
        100,
        &already_in_scope,
    )?;
    let (from_items, mut predicates, build_params, ctes) = build.into_flat();

    // `build_params` binds the placeholders in `predicates`/`ctes`, which sit
    // textually before the inner `WHERE` rendered below — extend with them
    // first so the bound vector matches the physical `?` order.
    params.extend(build_params);

    if let Some(cond) = inner_where {
        let inner_scope = Scope::new(&local_ctx_holder, scope.params);
        predicates.push(render_into(cond, &inner_scope, params)?);
    }

    let where_sql = if predicates.is_empty() {
        "1 = 1".to_string()
    } else {
        predicates.join(" AND ")
    };

    let sql = if from_items.is_empty() {
        format!("EXISTS (SELECT 1 WHERE {where_sql})")
    } else {
        let ctes_sql = if ctes.is_empty() {
            String::new()
        } else {
            format!("WITH RECURSIVE {} ", ctes.join(", "))
        };
        format!("EXISTS ({ctes_sql}SELECT 1 FROM {} WHERE {where_sql})", from_items.join(", "))
    };
    Ok(sql)
}
