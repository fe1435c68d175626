//! Value-level `Expression` evaluation (§4.3, §9).
//!
//! The translator only ever emits SQL; computing the concrete property value
//! a `CREATE`/`SET`/`MERGE ... SET` assignment writes is executor work,
//! since the values involved (an `UNWIND` tuple, a just-resolved node's
//! current properties) don't live in a row the SQL engine is about to
//! produce. Mirrors the scalar half of [`crate::translator::functions`] and
//! [`crate::storage::functions`] in plain Rust instead of SQL.

use std::collections::HashMap;

use serde_json::{Map, Value as Json};

use crate::cypher::ast::*;
use crate::errors::EngineError;
use crate::storage::{Edge, Node};

/// What a name is bound to while evaluating one mutation's assignments.
#[derive(Debug, Clone)]
pub enum BoundValue {
    Node(Node),
    Edge(Edge),
    Scalar(Json),
}

impl BoundValue {
    pub fn properties(&self) -> Option<&Json> {
        match self {
            BoundValue::Node(n) => Some(&n.properties),
            BoundValue::Edge(e) => Some(&e.properties),
            BoundValue::Scalar(_) => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            BoundValue::Node(n) => Some(&n.id),
            BoundValue::Edge(e) => Some(&e.id),
            BoundValue::Scalar(_) => None,
        }
    }

    pub fn label_or_type(&self) -> Option<Json> {
        match self {
            BoundValue::Node(n) => Some(n.label.clone()),
            BoundValue::Edge(e) => Some(Json::String(e.edge_type.clone())),
            BoundValue::Scalar(_) => None,
        }
    }
}

pub type Env = HashMap<String, BoundValue>;

pub fn eval(expr: &Expression, env: &Env, params: &Map<String, Json>) -> Result<Json, EngineError> {
    Ok(match expr {
        Expression::Literal(lit) => literal_to_json(lit),
        Expression::Parameter(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::TypeError(format!("parameter '${name}' was not supplied")))?,
        Expression::Variable(name) => {
            let bound = env
                .get(name)
                .ok_or_else(|| EngineError::UnresolvedVariable(name.clone()))?;
            match bound {
                BoundValue::Scalar(v) => v.clone(),
                BoundValue::Node(n) => Json::String(n.id.clone()),
                BoundValue::Edge(e) => Json::String(e.id.clone()),
            }
        }
        Expression::PropertyAccess { base, key } => {
            let bound = env
                .get(base)
                .ok_or_else(|| EngineError::UnresolvedVariable(base.clone()))?;
            let properties = bound
                .properties()
                .ok_or_else(|| EngineError::UnsupportedFeature(format!("'{base}' has no properties to access")))?;
            properties.get(key).cloned().unwrap_or(Json::Null)
        }
        Expression::FunctionCall { name, args, distinct: _ } => eval_function_call(name, args, env, params)?,
        Expression::Binary { op, left, right } => {
            let l = eval(left, env, params)?;
            let r = eval(right, env, params)?;
            eval_arith(*op, &l, &r)?
        }
        Expression::Comparison(cond) => Json::Bool(eval_condition(cond, env, params)?),
        Expression::Object(fields) => {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key.clone(), eval(value, env, params)?);
            }
            Json::Object(map)
        }
        Expression::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env, params)?);
            }
            Json::Array(values)
        }
        Expression::Case(case) => eval_case(case, env, params)?,
    })
}

/// Evaluates `expr` and requires the result be a JSON array, for `UNWIND`
/// (§7's `TypeError`).
pub fn eval_as_array(expr: &Expression, env: &Env, params: &Map<String, Json>) -> Result<Vec<Json>, EngineError> {
    match eval(expr, env, params)? {
        Json::Array(items) => Ok(items),
        other => Err(EngineError::TypeError(format!(
            "UNWIND expression must evaluate to a list, got {other}"
        ))),
    }
}

fn literal_to_json(lit: &Literal) -> Json {
    match lit {
        Literal::Integer(n) => Json::from(*n),
        Literal::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Literal::Boolean(b) => Json::Bool(*b),
        Literal::String(s) => Json::String(s.clone()),
        Literal::Null => Json::Null,
    }
}

fn eval_arith(op: ArithOp, l: &Json, r: &Json) -> Result<Json, EngineError> {
    // String `+` concatenates, matching Cypher's overload of `+`; everything
    // else requires both sides to be numeric.
    if op == ArithOp::Add {
        if let (Json::String(a), Json::String(b)) = (l, r) {
            return Ok(Json::String(format!("{a}{b}")));
        }
    }
    let a = as_f64(l)?;
    let b = as_f64(r)?;
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
    };
    Ok(if result.fract() == 0.0 && matches!(l, Json::Number(n) if n.is_i64()) && matches!(r, Json::Number(n) if n.is_i64())
    {
        Json::from(result as i64)
    } else {
        serde_json::Number::from_f64(result).map(Json::Number).unwrap_or(Json::Null)
    })
}

fn as_f64(v: &Json) -> Result<f64, EngineError> {
    v.as_f64()
        .ok_or_else(|| EngineError::TypeError(format!("expected a number, got {v}")))
}

fn eval_function_call(name: &str, args: &[Expression], env: &Env, params: &Map<String, Json>) -> Result<Json, EngineError> {
    let lower = name.to_lowercase();

    if matches!(lower.as_str(), "id" | "labels" | "type" | "properties") {
        if let [Expression::Variable(var_name)] = args {
            let bound = env
                .get(var_name)
                .ok_or_else(|| EngineError::UnresolvedVariable(var_name.clone()))?;
            let missing = || {
                EngineError::UnsupportedFeature(format!("'{var_name}' is a scalar binding and has no {lower}()"))
            };
            return Ok(match lower.as_str() {
                "id" => Json::String(bound.id().ok_or_else(missing)?.to_string()),
                "labels" if matches!(bound, BoundValue::Node(_)) => bound.label_or_type().ok_or_else(missing)?,
                "labels" => return Err(EngineError::UnsupportedFeature("labels() expects a node".into())),
                "type" if matches!(bound, BoundValue::Edge(_)) => bound.label_or_type().ok_or_else(missing)?,
                "type" => return Err(EngineError::UnsupportedFeature("type() expects a relationship".into())),
                "properties" => bound.properties().cloned().ok_or_else(missing)?,
                _ => unreachable!(),
            });
        }
        return Err(EngineError::UnsupportedFeature(format!("{name}() expects a single variable argument")));
    }

    let values: Vec<Json> = args.iter().map(|a| eval(a, env, params)).collect::<Result<_, _>>()?;

    Ok(match lower.as_str() {
        "coalesce" => values.into_iter().find(|v| !v.is_null()).unwrap_or(Json::Null),
        "size" => Json::from(match values.first() {
            Some(Json::Array(a)) => a.len() as i64,
            Some(Json::String(s)) => s.chars().count() as i64,
            Some(Json::Null) | None => 0,
            Some(other) => other.to_string().len() as i64,
        }),
        "head" => match values.first() {
            Some(Json::Array(a)) => a.first().cloned().unwrap_or(Json::Null),
            _ => Json::Null,
        },
        "last" => match values.first() {
            Some(Json::Array(a)) => a.last().cloned().unwrap_or(Json::Null),
            other => other.cloned().unwrap_or(Json::Null),
        },
        "tail" => match values.first() {
            Some(Json::Array(a)) => Json::Array(a.iter().skip(1).cloned().collect()),
            _ => Json::Array(Vec::new()),
        },
        "keys" => match values.first() {
            Some(Json::Object(map)) => Json::Array(map.keys().map(|k| Json::String(k.clone())).collect()),
            _ => Json::Array(Vec::new()),
        },
        "range" => {
            let start = values.first().and_then(Json::as_i64).unwrap_or(0);
            let end = values.get(1).and_then(Json::as_i64).unwrap_or(0);
            let step = values.get(2).and_then(Json::as_i64).unwrap_or(1);
            let step = if step == 0 { 1 } else { step };
            let mut out = Vec::new();
            let mut i = start;
            if step > 0 {
                while i <= end {
                    out.push(Json::from(i));
                    i += step;
                }
            } else {
                while i >= end {
                    out.push(Json::from(i));
                    i += step;
                }
            }
            Json::Array(out)
        }
        "toupper" => Json::String(values.first().and_then(Json::as_str).unwrap_or("").to_uppercase()),
        "tolower" => Json::String(values.first().and_then(Json::as_str).unwrap_or("").to_lowercase()),
        "trim" => Json::String(values.first().and_then(Json::as_str).unwrap_or("").trim().to_string()),
        "substring" => {
            let s = values.first().and_then(Json::as_str).unwrap_or("");
            let start = values.get(1).and_then(Json::as_i64).unwrap_or(0).max(0) as usize;
            let chars: Vec<char> = s.chars().collect();
            let end = values
                .get(2)
                .and_then(Json::as_i64)
                .map(|len| (start + len.max(0) as usize).min(chars.len()))
                .unwrap_or(chars.len());
            let start = start.min(chars.len());
            Json::String(chars[start..end.max(start)].iter().collect())
        }
        "replace" => {
            let s = values.first().and_then(Json::as_str).unwrap_or("");
            let from = values.get(1).and_then(Json::as_str).unwrap_or("");
            let to = values.get(2).and_then(Json::as_str).unwrap_or("");
            Json::String(s.replace(from, to))
        }
        "tostring" => Json::String(match values.first() {
            Some(Json::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }),
        "split" => {
            let s = values.first().and_then(Json::as_str).unwrap_or("");
            let sep = values.get(1).and_then(Json::as_str).unwrap_or("");
            let parts: Vec<Json> = if sep.is_empty() {
                vec![Json::String(s.to_string())]
            } else {
                s.split(sep).map(|p| Json::String(p.to_string())).collect()
            };
            Json::Array(parts)
        }
        "abs" => Json::from(values.first().and_then(Json::as_f64).unwrap_or(0.0).abs()),
        "ceil" => Json::from(values.first().and_then(Json::as_f64).unwrap_or(0.0).ceil()),
        "floor" => Json::from(values.first().and_then(Json::as_f64).unwrap_or(0.0).floor()),
        "round" => {
            let x = values.first().and_then(Json::as_f64).unwrap_or(0.0);
            let precision = values.get(1).and_then(Json::as_i64).unwrap_or(0) as i32;
            let factor = 10f64.powi(precision);
            json_f64((x * factor).round() / factor)
        }
        "rand" => json_f64(rand_unit()),
        "sqrt" => json_f64(values.first().and_then(Json::as_f64).unwrap_or(0.0).sqrt()),
        "date" | "datetime" | "timestamp" => {
            return Err(EngineError::UnsupportedFeature(format!(
                "{name}() is only supported in a translated read statement"
            )))
        }
        other => return Err(EngineError::UnsupportedFeature(format!("unknown function '{other}'"))),
    })
}

fn json_f64(x: f64) -> Json {
    serde_json::Number::from_f64(x).map(Json::Number).unwrap_or(Json::Null)
}

fn rand_unit() -> f64 {
    use std::cell::Cell;
    thread_local! {
        static STATE: Cell<u64> = Cell::new(0x2545_F491_4F6C_DD1D);
    }
    STATE.with(|s| {
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        (x >> 11) as f64 / (1u64 << 53) as f64
    })
}

fn eval_case(case: &CaseExpr, env: &Env, params: &Map<String, Json>) -> Result<Json, EngineError> {
    let subject = case.subject.as_ref().map(|s| eval(s, env, params)).transpose()?;
    for (cond, then) in &case.whens {
        let matched = match &subject {
            Some(subject_value) => {
                let cond_value = eval(cond, env, params)?;
                json_eq(subject_value, &cond_value)
            }
            None => match cond {
                Expression::Comparison(wc) => eval_condition(wc, env, params)?,
                other => eval(other, env, params)?.as_bool().unwrap_or(false),
            },
        };
        if matched {
            return eval(then, env, params);
        }
    }
    match &case.else_value {
        Some(e) => eval(e, env, params),
        None => Ok(Json::Null),
    }
}

fn json_eq(a: &Json, b: &Json) -> bool {
    a == b
}

pub fn eval_condition(cond: &WhereCondition, env: &Env, params: &Map<String, Json>) -> Result<bool, EngineError> {
    Ok(match cond {
        WhereCondition::Compare { op, left, right } => {
            let l = eval(left, env, params)?;
            let r = eval(right, env, params)?;
            compare(*op, &l, &r)
        }
        WhereCondition::And(l, r) => eval_condition(l, env, params)? && eval_condition(r, env, params)?,
        WhereCondition::Or(l, r) => eval_condition(l, env, params)? || eval_condition(r, env, params)?,
        WhereCondition::Not(inner) => !eval_condition(inner, env, params)?,
        WhereCondition::Contains { haystack, needle } => {
            let h = eval(haystack, env, params)?;
            let n = eval(needle, env, params)?;
            match (h.as_str(), n.as_str()) {
                (Some(h), Some(n)) => h.contains(n),
                _ => false,
            }
        }
        WhereCondition::StartsWith { value, prefix } => {
            let v = eval(value, env, params)?;
            let p = eval(prefix, env, params)?;
            matches!((v.as_str(), p.as_str()), (Some(v), Some(p)) if v.starts_with(p))
        }
        WhereCondition::EndsWith { value, suffix } => {
            let v = eval(value, env, params)?;
            let s = eval(suffix, env, params)?;
            matches!((v.as_str(), s.as_str()), (Some(v), Some(s)) if v.ends_with(s))
        }
        WhereCondition::IsNull(e) => eval(e, env, params)?.is_null(),
        WhereCondition::IsNotNull(e) => !eval(e, env, params)?.is_null(),
        WhereCondition::In { value, list } => {
            let v = eval(value, env, params)?;
            match eval(list, env, params)? {
                Json::Array(items) => items.contains(&v),
                _ => false,
            }
        }
        WhereCondition::Exists(..) => {
            return Err(EngineError::UnsupportedFeature(
                "EXISTS(pattern) is only supported in a translated read statement".to_string(),
            ))
        }
    })
}

fn compare(op: CompareOp, l: &Json, r: &Json) -> bool {
    let ordering = match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    match op {
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
        CompareOp::Lt => ordering == Some(std::cmp::Ordering::Less),
        CompareOp::Gt => ordering == Some(std::cmp::Ordering::Greater),
        CompareOp::Le => matches!(ordering, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        CompareOp::Ge => matches!(ordering, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
    }
}
