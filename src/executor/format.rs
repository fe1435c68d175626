//! Result shaping (`formatResults`, §4.3): raw SQL rows → the `data` array
//! of the query response.

use serde_json::{Map, Value as Json};

use crate::config::EngineConfig;
use crate::storage::QueryRows;
use crate::translator::context::VarKind;
use crate::translator::ReturnColumn;

/// Reassembles every `QueryRows` row into a `{alias: value, ...}` object per
/// [`ReturnColumn`], applying auto-parse/boolean normalization and
/// reconstructing node/edge triads along the way.
pub fn format_rows(rows: &QueryRows, columns: &[ReturnColumn], config: &EngineConfig) -> Vec<Json> {
    rows.rows
        .iter()
        .map(|row| format_row(&rows.columns, row, columns, config))
        .collect()
}

fn format_row(column_names: &[String], row: &[Json], columns: &[ReturnColumn], config: &EngineConfig) -> Json {
    let mut out = Map::new();
    for column in columns {
        match column {
            ReturnColumn::Scalar { name, is_boolean } => {
                let raw = find(column_names, row, name);
                let value = raw.cloned().unwrap_or(Json::Null);
                let value = if *is_boolean {
                    normalize_bool(value)
                } else {
                    auto_parse(value, config.json_string_auto_parse)
                };
                out.insert(name.clone(), value);
            }
            ReturnColumn::Entity { alias, kind } => {
                let field = if *kind == VarKind::Edge { "type" } else { "label" };
                let id = find(column_names, row, &format!("{alias}__id")).cloned().unwrap_or(Json::Null);
                let label_or_type = find(column_names, row, &format!("{alias}__{field}"))
                    .cloned()
                    .map(|v| auto_parse(v, config.json_string_auto_parse))
                    .unwrap_or(Json::Null);
                let properties = find(column_names, row, &format!("{alias}__properties"))
                    .cloned()
                    .map(|v| auto_parse(v, config.json_string_auto_parse))
                    .unwrap_or(Json::Object(Map::new()));

                if id.is_null() {
                    out.insert(alias.clone(), Json::Null);
                    continue;
                }
                let mut entity = Map::new();
                entity.insert("id".to_string(), id);
                entity.insert(field.to_string(), label_or_type);
                entity.insert("properties".to_string(), properties);
                out.insert(alias.clone(), Json::Object(entity));
            }
        }
    }
    Json::Object(out)
}

fn find<'a>(column_names: &[String], row: &'a [Json], name: &str) -> Option<&'a Json> {
    column_names.iter().position(|c| c == name).and_then(|i| row.get(i))
}

/// `0`/`1` stored for a boolean expression is normalized back to
/// `false`/`true` (§4.3). Only applied to columns the translator marked as
/// boolean-valued — an ordinary integer `0` or `1` elsewhere is left alone.
fn normalize_bool(value: Json) -> Json {
    match value {
        Json::Number(n) if n.as_i64() == Some(0) => Json::Bool(false),
        Json::Number(n) if n.as_i64() == Some(1) => Json::Bool(true),
        other => other,
    }
}

/// Speculatively parses a string value as JSON, recursively, replacing it on
/// success (§3 invariant 3, §9's documented ambiguity — gated by
/// [`EngineConfig::json_string_auto_parse`]).
pub(crate) fn auto_parse(value: Json, enabled: bool) -> Json {
    if !enabled {
        return value;
    }
    match value {
        Json::String(s) => match serde_json::from_str::<Json>(&s) {
            Ok(parsed) => auto_parse(parsed, enabled),
            Err(_) => Json::String(s),
        },
        Json::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, auto_parse(v, enabled))).collect()),
        Json::Array(items) => Json::Array(items.into_iter().map(|v| auto_parse(v, enabled)).collect()),
        other => other,
    }
}
