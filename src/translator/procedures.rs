//! `CALL db.*` introspection procedures (§4.2, §6). Each yields exactly one
//! column over the stored data; no argument is accepted by any of them.

use crate::cypher::ast::CallClause;
use crate::errors::EngineError;

/// One yielded column's default name plus the SQL that produces it.
pub struct ProcedureQuery {
    pub sql: String,
    pub default_column: &'static str,
}

pub fn resolve(call: &CallClause) -> Result<ProcedureQuery, EngineError> {
    if !call.args.is_empty() {
        return Err(EngineError::UnsupportedFeature(format!(
            "{} takes no arguments",
            call.procedure
        )));
    }
    match call.procedure.as_str() {
        "db.labels" => Ok(ProcedureQuery {
            sql: "SELECT DISTINCT value AS label FROM nodes, json_each(nodes.label)".to_string(),
            default_column: "label",
        }),
        "db.relationshipTypes" => Ok(ProcedureQuery {
            sql: "SELECT DISTINCT type AS relationshipType FROM edges".to_string(),
            default_column: "relationshipType",
        }),
        "db.propertyKeys" => Ok(ProcedureQuery {
            sql: "SELECT DISTINCT key AS propertyKey FROM ( \
                    SELECT key FROM nodes, json_each(nodes.properties) \
                    UNION \
                    SELECT key FROM edges, json_each(edges.properties) \
                  )"
            .to_string(),
            default_column: "propertyKey",
        }),
        other => Err(EngineError::UnsupportedFeature(format!("unknown procedure '{other}'"))),
    }
}

/// The yielded column's external name: the `YIELD` alias if one was given,
/// otherwise the procedure's own default column name.
pub fn yielded_name(call: &CallClause, default_column: &str) -> String {
    call.yields
        .as_ref()
        .and_then(|y| y.first())
        .cloned()
        .unwrap_or_else(|| default_column.to_string())
}

