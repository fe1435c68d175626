//! Expression → SQL rendering (§4.2).

use serde_json::Value as Json;

use crate::cypher::ast::*;
use crate::errors::EngineError;

use super::context::{Scope, VarKind};
use super::functions;

/// A rendered SQL fragment plus the positional parameter values it consumed,
/// in the order their `?` placeholders appear in `sql`.
pub struct Rendered {
    pub sql: String,
    pub params: Vec<Json>,
}

pub fn render(expr: &Expression, scope: &Scope) -> Result<Rendered, EngineError> {
    let mut params = Vec::new();
    let sql = render_into(expr, scope, &mut params)?;
    Ok(Rendered { sql, params })
}

fn render_into(expr: &Expression, scope: &Scope, params: &mut Vec<Json>) -> Result<String, EngineError> {
    Ok(match expr {
        Expression::Literal(lit) => render_literal(lit, params),
        Expression::Parameter(name) => {
            let value = scope
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::TypeError(format!("parameter '${name}' was not supplied")))?;
            params.push(value);
            "?".to_string()
        }
        Expression::Variable(name) => {
            let info = scope
                .vars
                .lookup(name)
                .ok_or_else(|| EngineError::UnresolvedVariable(name.clone()))?;
            // A scalar binding (an `UNWIND` alias, or a non-entity `WITH`
            // projection) renders as its own column directly. A bare
            // node/edge variable used anywhere but `id`/`labels`/`type`/
            // `properties` (dispatched in `render_function_call`, ahead of
            // this function) has no single scalar SQL value to stand for it.
            info.scalar_sql().ok_or_else(|| {
                EngineError::UnsupportedFeature(format!(
                    "variable '{name}' cannot be used as a scalar value directly; project a property or apply a function"
                ))
            })?
        }
        Expression::PropertyAccess { base, key } => render_property_access(base, key, scope)?,
        Expression::FunctionCall { name, args, distinct } => {
            render_function_call(name, args, *distinct, scope, params)?
        }
        Expression::Binary { op, left, right } => {
            let l = render_into(left, scope, params)?;
            let r = render_into(right, scope, params)?;
            format!("({l} {} {r})", arith_op_sql(*op))
        }
        Expression::Comparison(cond) => super::where_::render_into(cond, scope, params)?,
        Expression::Object(fields) => {
            let mut parts = Vec::with_capacity(fields.len());
            for (key, value) in fields {
                let v = render_into(value, scope, params)?;
                parts.push(format!("'{}', {v}", escape_sql_string_literal(key)));
            }
            format!("json_object({})", parts.join(", "))
        }
        Expression::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(render_into(item, scope, params)?);
            }
            format!("json_array({})", parts.join(", "))
        }
        Expression::Case(case) => render_case(case, scope, params)?,
    })
}

fn render_property_access(base: &str, key: &str, scope: &Scope) -> Result<String, EngineError> {
    let info = scope
        .vars
        .lookup(base)
        .ok_or_else(|| EngineError::UnresolvedVariable(base.to_string()))?;
    let properties = info
        .properties_sql()
        .ok_or_else(|| EngineError::UnsupportedFeature(format!("'{base}' has no properties to access")))?;
    Ok(format!("json_extract({}, '$.{}')", properties, escape_json_path_segment(key)))
}

fn render_function_call(
    name: &str,
    args: &[Expression],
    distinct: bool,
    scope: &Scope,
    params: &mut Vec<Json>,
) -> Result<String, EngineError> {
    let lower = name.to_lowercase();

    // Node/edge introspection functions need the variable's *kind*, not its
    // rendered value, so they are special-cased ahead of the generic
    // function registry (§4.2).
    if matches!(lower.as_str(), "id" | "labels" | "type" | "properties") {
        if let [Expression::Variable(var_name)] = args {
            let info = scope
                .vars
                .lookup(var_name)
                .ok_or_else(|| EngineError::UnresolvedVariable(var_name.clone()))?;
            let missing = || {
                EngineError::UnsupportedFeature(format!(
                    "'{var_name}' is a scalar binding and has no {lower}()"
                ))
            };
            return Ok(match lower.as_str() {
                "id" => info.id_sql().ok_or_else(missing)?,
                "labels" if info.kind == VarKind::Node => info.label_or_type_sql().ok_or_else(missing)?,
                "labels" => return Err(EngineError::UnsupportedFeature("labels() expects a node".into())),
                "type" if info.kind == VarKind::Edge => info.label_or_type_sql().ok_or_else(missing)?,
                "type" => return Err(EngineError::UnsupportedFeature("type() expects a relationship".into())),
                "properties" => info.properties_sql().ok_or_else(missing)?,
                _ => unreachable!(),
            });
        }
        return Err(EngineError::UnsupportedFeature(format!(
            "{name}() expects a single variable argument"
        )));
    }

    let rendered_args: Vec<String> = args
        .iter()
        .map(|a| render_into(a, scope, params))
        .collect::<Result<_, _>>()?;

    let mapping = functions::lookup(&lower)
        .ok_or_else(|| EngineError::UnsupportedFeature(format!("unknown function '{name}'")))?;

    if distinct && mapping.is_aggregate {
        if rendered_args.len() != 1 {
            return Err(EngineError::UnsupportedFeature(format!(
                "DISTINCT is only supported with a single argument to {name}()"
            )));
        }
        return Ok(format!("{}(DISTINCT {})", mapping.agg_sql_name, rendered_args[0]));
    }

    Ok((mapping.render)(&rendered_args))
}

fn render_case(case: &CaseExpr, scope: &Scope, params: &mut Vec<Json>) -> Result<String, EngineError> {
    let mut sql = String::from("CASE");
    if let Some(subject) = &case.subject {
        sql.push(' ');
        sql.push_str(&render_into(subject, scope, params)?);
    }
    for (cond, then) in &case.whens {
        let cond_sql = render_into(cond, scope, params)?;
        let then_sql = render_into(then, scope, params)?;
        sql.push_str(&format!(" WHEN {cond_sql} THEN {then_sql}"));
    }
    if let Some(else_value) = &case.else_value {
        sql.push_str(" ELSE ");
        sql.push_str(&render_into(else_value, scope, params)?);
    }
    sql.push_str(" END");
    Ok(sql)
}

fn render_literal(lit: &Literal, params: &mut Vec<Json>) -> String {
    let value = match lit {
        Literal::Integer(n) => Json::from(*n),
        Literal::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Literal::Boolean(b) => Json::Bool(*b),
        Literal::String(s) => Json::String(s.clone()),
        Literal::Null => Json::Null,
    };
    params.push(value);
    "?".to_string()
}

fn arith_op_sql(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
        ArithOp::Mod => "%",
    }
}

fn escape_json_path_segment(key: &str) -> String {
    key.replace('\'', "''")
}

fn escape_sql_string_literal(key: &str) -> String {
    key.replace('\'', "''")
}
