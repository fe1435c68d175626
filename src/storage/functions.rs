//! Custom SQLite scalar functions backing the translator's function registry.
//!
//! SQLite's core build does not guarantee `ceil`/`floor`/`sqrt`, and has no
//! list-slicing or range-generation primitives at all, so the handful of
//! Cypher list/math functions that need them are registered here as `cg_*`
//! scalar functions rather than hoped for from the SQL dialect (the
//! `functions` feature on `rusqlite` exists for exactly this).

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value as Json;

use super::StorageError;

const FLAGS: FunctionFlags = FunctionFlags::SQLITE_UTF8.union(FunctionFlags::SQLITE_DETERMINISTIC);

pub fn register(conn: &Connection) -> Result<(), StorageError> {
    conn.create_scalar_function("cg_size", 1, FLAGS, |ctx| {
        let raw = ctx.get_raw(0);
        let n = match raw {
            ValueRef::Text(t) => {
                let text = String::from_utf8_lossy(t);
                match serde_json::from_str::<Json>(&text) {
                    Ok(Json::Array(a)) => a.len() as i64,
                    _ => text.chars().count() as i64,
                }
            }
            ValueRef::Null => 0,
            other => format!("{other:?}").len() as i64,
        };
        Ok(n)
    })?;

    conn.create_scalar_function("cg_last", 1, FLAGS, |ctx| {
        let value = json_arg(ctx, 0)?;
        Ok(match value {
            Json::Array(a) => a.last().cloned().unwrap_or(Json::Null).to_string(),
            other => other.to_string(),
        })
    })?;

    conn.create_scalar_function("cg_tail", 1, FLAGS, |ctx| {
        let value = json_arg(ctx, 0)?;
        let out = match value {
            Json::Array(a) => Json::Array(a.into_iter().skip(1).collect()),
            _ => Json::Array(Vec::new()),
        };
        Ok(out.to_string())
    })?;

    conn.create_scalar_function("cg_keys", 1, FLAGS, |ctx| {
        let value = json_arg(ctx, 0)?;
        let out = match value {
            Json::Object(map) => Json::Array(map.keys().map(|k| Json::String(k.clone())).collect()),
            _ => Json::Array(Vec::new()),
        };
        Ok(out.to_string())
    })?;

    conn.create_scalar_function("cg_split", 2, FLAGS, |ctx| {
        let s: String = ctx.get(0)?;
        let sep: String = ctx.get(1)?;
        let parts: Vec<Json> = if sep.is_empty() {
            vec![Json::String(s)]
        } else {
            s.split(sep.as_str()).map(|p| Json::String(p.to_string())).collect()
        };
        Ok(Json::Array(parts).to_string())
    })?;

    conn.create_scalar_function("cg_range", -1, FLAGS, |ctx| {
        let start: i64 = ctx.get(0)?;
        let end: i64 = ctx.get(1)?;
        let step: i64 = if ctx.len() >= 3 { ctx.get(2)? } else { 1 };
        let step = if step == 0 { 1 } else { step };
        let mut values = Vec::new();
        let mut i = start;
        if step > 0 {
            while i <= end {
                values.push(Json::from(i));
                i += step;
            }
        } else {
            while i >= end {
                values.push(Json::from(i));
                i += step;
            }
        }
        Ok(Json::Array(values).to_string())
    })?;

    conn.create_scalar_function("cg_ceil", 1, FLAGS, |ctx| {
        let x: f64 = ctx.get(0)?;
        Ok(x.ceil())
    })?;

    conn.create_scalar_function("cg_floor", 1, FLAGS, |ctx| {
        let x: f64 = ctx.get(0)?;
        Ok(x.floor())
    })?;

    conn.create_scalar_function("cg_sqrt", 1, FLAGS, |ctx| {
        let x: f64 = ctx.get(0)?;
        Ok(x.sqrt())
    })?;

    conn.create_scalar_function("cg_round", 2, FLAGS, |ctx| {
        let x: f64 = ctx.get(0)?;
        let precision: i32 = ctx.get(1)?;
        let factor = 10f64.powi(precision);
        Ok((x * factor).round() / factor)
    })?;

    // Not `SQLITE_DETERMINISTIC`: each call must draw a fresh value.
    conn.create_scalar_function(
        "cg_rand",
        0,
        FunctionFlags::SQLITE_UTF8,
        |_ctx| Ok(rand_unit()),
    )?;

    Ok(())
}

fn json_arg(ctx: &rusqlite::functions::Context<'_>, idx: usize) -> rusqlite::Result<Json> {
    match ctx.get_raw(idx) {
        ValueRef::Text(t) => Ok(serde_json::from_slice(t).unwrap_or(Json::Null)),
        ValueRef::Null => Ok(Json::Null),
        ValueRef::Integer(i) => Ok(Json::from(i)),
        ValueRef::Real(f) => Ok(serde_json::Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)),
        ValueRef::Blob(b) => Ok(Json::String(String::from_utf8_lossy(b).to_string())),
    }
}

/// A small xorshift PRNG seeded from the address of a stack value. Good
/// enough for Cypher's `rand()`, which carries no reproducibility guarantee.
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
