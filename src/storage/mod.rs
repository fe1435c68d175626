//! Thin façade over an embedded relational engine (SQLite via `rusqlite`).
//!
//! Mirrors the storage contract the translator and executor are written
//! against: prepared-SQL execution with positional parameters, explicit
//! transactions, and typed node/edge CRUD helpers. Nothing above this module
//! is aware that the backing engine is SQLite rather than any other engine
//! exposing the same prepared-statement/transaction/JSON-extraction surface.

mod functions;
mod schema;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::Value as Json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("node '{0}' not found")]
    NodeNotFound(String),
    #[error("edge '{0}' not found")]
    EdgeNotFound(String),
}

/// The result of a single prepared-statement execution.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Json>>,
    pub changes: usize,
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub label: Json, // string or array of strings, per §3
    pub properties: Json,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: String,
    pub edge_type: String,
    pub source_id: String,
    pub target_id: String,
    pub properties: Json,
}

/// A single connection guarded by a mutex. An embedded engine like SQLite
/// serializes writers internally; this mutex only protects the `Connection`
/// handle itself from concurrent `&mut` use across threads (§5).
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        schema::apply(&conn)?;
        functions::register(&conn)?;
        Ok(Storage {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        schema::apply(&conn)?;
        functions::register(&conn)?;
        Ok(Storage {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a single prepared statement with positional parameters.
    pub fn execute(&self, sql: &str, params: &[Json]) -> Result<QueryRows, StorageError> {
        let conn = self.conn.lock();
        Self::execute_on(&conn, sql, params)
    }

    fn execute_on(conn: &Connection, sql: &str, params: &[Json]) -> Result<QueryRows, StorageError> {
        let bound: Vec<Box<dyn ToSql>> = params.iter().map(json_to_sql).collect();
        let bound_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        if columns.is_empty() {
            let changes = stmt.execute(params_from_iter(bound_refs.iter()))?;
            return Ok(QueryRows {
                columns: Vec::new(),
                rows: Vec::new(),
                changes,
                last_insert_id: Some(conn.last_insert_rowid()),
            });
        }

        let mut rows_out = Vec::new();
        let mut rows = stmt.query(params_from_iter(bound_refs.iter()))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(sql_value_to_json(&row, i)?);
            }
            rows_out.push(values);
        }

        Ok(QueryRows {
            columns,
            rows: rows_out,
            changes: 0,
            last_insert_id: None,
        })
    }

    /// Run `body` inside a single SQLite transaction. Committed if `body`
    /// returns `Ok`, rolled back otherwise — the engine never partially
    /// commits a query's mutations (§7). Generic over `body`'s error type so
    /// a multi-phase executor plan can freely mix `StorageError` (from the
    /// `TxHandle` helpers) with its own richer error kind via `?`.
    pub fn transaction<T, E>(&self, body: impl FnOnce(&TxHandle) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN").map_err(StorageError::from)?;
        let handle = TxHandle { conn: &conn };
        match body(&handle) {
            Ok(value) => {
                conn.execute_batch("COMMIT").map_err(StorageError::from)?;
                Ok(value)
            }
            Err(err) => {
                conn.execute_batch("ROLLBACK").ok();
                Err(err)
            }
        }
    }

    pub fn insert_node(&self, label: Json, properties: Json) -> Result<Node, StorageError> {
        self.transaction(|tx| tx.insert_node(label, properties))
    }

    pub fn insert_edge(
        &self,
        edge_type: &str,
        source_id: &str,
        target_id: &str,
        properties: Json,
    ) -> Result<Edge, StorageError> {
        self.transaction(|tx| tx.insert_edge(edge_type, source_id, target_id, properties))
    }

    pub fn get_node(&self, id: &str) -> Result<Node, StorageError> {
        let conn = self.conn.lock();
        TxHandle { conn: &conn }.get_node(id)
    }

    pub fn get_edge(&self, id: &str) -> Result<Edge, StorageError> {
        let conn = self.conn.lock();
        TxHandle { conn: &conn }.get_edge(id)
    }

    pub fn get_nodes_by_label(&self, label: &str) -> Result<Vec<Node>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, label, properties FROM nodes \
             WHERE json_extract(label, '$[0]') = ?1",
        )?;
        let rows = stmt
            .query_map([label], row_to_node)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_edges_by_type(&self, edge_type: &str) -> Result<Vec<Edge>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, type, source_id, target_id, properties FROM edges WHERE type = ?1")?;
        let rows = stmt
            .query_map([edge_type], row_to_edge)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_node(&self, id: &str) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?)
    }

    pub fn delete_edge(&self, id: &str) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM edges WHERE id = ?1", [id])?)
    }

    pub fn update_node_properties(&self, id: &str, properties: &Json) -> Result<usize, StorageError> {
        let conn = self.conn.lock();
        let text = properties.to_string();
        Ok(conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = ?2",
            rusqlite::params![text, id],
        )?)
    }

    pub fn count_nodes(&self) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))
            .map_err(StorageError::from)
    }

    pub fn count_edges(&self) -> Result<i64, StorageError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))
            .map_err(StorageError::from)
    }

    pub fn close(self) {
        // Connection is dropped along with the last Arc reference.
    }
}

/// A handle scoped to one open transaction; exposes the same CRUD helpers so
/// multi-phase plans can compose several mutations atomically (§4.3).
pub struct TxHandle<'a> {
    conn: &'a Connection,
}

impl<'a> TxHandle<'a> {
    pub fn execute(&self, sql: &str, params: &[Json]) -> Result<QueryRows, StorageError> {
        Storage::execute_on(self.conn, sql, params)
    }

    pub fn insert_node(&self, label: Json, properties: Json) -> Result<Node, StorageError> {
        let id = Uuid::new_v4().to_string();
        let label = normalize_label(label);
        self.conn.execute(
            "INSERT INTO nodes (id, label, properties) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, label.to_string(), properties.to_string()],
        )?;
        Ok(Node {
            id,
            label,
            properties,
        })
    }

    pub fn insert_edge(
        &self,
        edge_type: &str,
        source_id: &str,
        target_id: &str,
        properties: Json,
    ) -> Result<Edge, StorageError> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO edges (id, type, source_id, target_id, properties) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, edge_type, source_id, target_id, properties.to_string()],
        )?;
        Ok(Edge {
            id,
            edge_type: edge_type.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            properties,
        })
    }

    pub fn get_node(&self, id: &str) -> Result<Node, StorageError> {
        self.conn
            .query_row(
                "SELECT id, label, properties FROM nodes WHERE id = ?1",
                [id],
                row_to_node,
            )
            .map_err(|_| StorageError::NodeNotFound(id.to_string()))
    }

    pub fn get_edge(&self, id: &str) -> Result<Edge, StorageError> {
        self.conn
            .query_row(
                "SELECT id, type, source_id, target_id, properties FROM edges WHERE id = ?1",
                [id],
                row_to_edge,
            )
            .map_err(|_| StorageError::EdgeNotFound(id.to_string()))
    }

    pub fn delete_node(&self, id: &str) -> Result<usize, StorageError> {
        Ok(self.conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?)
    }

    /// Deletes every edge touching `id`. `DETACH DELETE` calls this before
    /// deleting the node itself, preserving invariant 1 of §3.
    pub fn delete_edges_touching(&self, id: &str) -> Result<usize, StorageError> {
        Ok(self.conn.execute(
            "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
            [id],
        )?)
    }

    pub fn delete_edge(&self, id: &str) -> Result<usize, StorageError> {
        Ok(self.conn.execute("DELETE FROM edges WHERE id = ?1", [id])?)
    }

    pub fn update_node_properties(&self, id: &str, properties: &Json) -> Result<usize, StorageError> {
        Ok(self.conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = ?2",
            rusqlite::params![properties.to_string(), id],
        )?)
    }

    pub fn update_edge_properties(&self, id: &str, properties: &Json) -> Result<usize, StorageError> {
        Ok(self.conn.execute(
            "UPDATE edges SET properties = ?1 WHERE id = ?2",
            rusqlite::params![properties.to_string(), id],
        )?)
    }
}

/// Labels are stored as a JSON-encoded array even for a single label, so the
/// translator can use the same shape at write time as at read time (§9).
fn normalize_label(label: Json) -> Json {
    match label {
        Json::Array(_) => label,
        Json::String(s) => Json::Array(vec![Json::String(s)]),
        other => Json::Array(vec![other]),
    }
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let id: String = row.get(0)?;
    let label_text: String = row.get(1)?;
    let properties_text: String = row.get(2)?;
    Ok(Node {
        id,
        label: serde_json::from_str(&label_text).unwrap_or(Json::Null),
        properties: serde_json::from_str(&properties_text).unwrap_or(Json::Null),
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        id: row.get(0)?,
        edge_type: row.get(1)?,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        properties: serde_json::from_str::<Json>(&row.get::<_, String>(4)?).unwrap_or(Json::Null),
    })
}

fn json_to_sql(value: &Json) -> Box<dyn ToSql> {
    match value {
        Json::Null => Box::new(Option::<String>::None),
        Json::Bool(b) => Box::new(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}

fn sql_value_to_json(row: &rusqlite::Row<'_>, idx: usize) -> Result<Json, StorageError> {
    use rusqlite::types::ValueRef;
    let value = row.get_ref(idx)?;
    Ok(match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Json::String(String::from_utf8_lossy(b).to_string()),
    })
}
