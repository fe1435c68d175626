//! An embeddable graph database: an openCypher query engine over a
//! relational (SQLite) store.
//!
//! [`GraphEngine`] is the crate's one public entry point — open a store,
//! then run Cypher text against it and get back the external response
//! envelope described in `cypher::error`/`response` (§6). Everything else
//! (`cypher`, `translator`, `executor`, `storage`) is organized as a
//! pipeline: parse → translate-or-plan → execute → shape.

pub mod config;
pub mod cypher;
pub mod errors;
pub mod executor;
pub mod response;
pub mod storage;
pub mod translator;

use std::path::Path;

use serde_json::{Map, Value as Json};

pub use config::EngineConfig;
pub use errors::EngineError;
pub use response::QueryResponse;

use executor::Executor;
use storage::{Storage, StorageError};

/// The crate's embeddable handle: one open store plus the config governing
/// how queries against it are planned and shaped.
pub struct GraphEngine {
    executor: Executor,
}

impl GraphEngine {
    /// Opens (creating if absent) the SQLite file at `config.db_path`, or an
    /// in-memory database if it is `:memory:`.
    pub fn open(config: EngineConfig) -> Result<Self, StorageError> {
        let storage = if config.db_path == ":memory:" {
            Storage::open_in_memory()?
        } else {
            Storage::open(Path::new(&config.db_path))?
        };
        Ok(GraphEngine { executor: Executor::new(storage, config) })
    }

    /// Opens a fresh in-memory store under the default config — convenient
    /// for embedding tests and short-lived tooling.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open(EngineConfig { db_path: ":memory:".to_string(), ..EngineConfig::default() })
    }

    /// Runs one Cypher statement (or `UNION`/`UNION ALL` chain of them)
    /// against the store and returns the external response envelope (§6).
    /// Never returns `Err`: parse, planning and execution failures are all
    /// folded into [`QueryResponse::Failure`].
    pub fn execute(&self, cypher: &str, params: &Map<String, Json>) -> QueryResponse {
        self.executor.execute(cypher, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opens_in_memory_and_runs_a_trivial_query() {
        let engine = GraphEngine::open_in_memory().expect("in-memory store opens");
        let response = engine.execute("RETURN 1 AS one", &Map::new());
        assert!(response.is_success());
    }

    #[test]
    fn create_then_match_round_trips_a_parameter() {
        let engine = GraphEngine::open_in_memory().expect("in-memory store opens");
        let mut params = Map::new();
        params.insert("n".to_string(), json!("Ada"));
        let created = engine.execute("CREATE (u:User {name: $n})", &params);
        assert!(created.is_success());

        let found = engine.execute("MATCH (u:User) WHERE u.name = $n RETURN u.name AS name", &params);
        assert!(found.is_success());
    }

    #[test]
    fn reports_parse_failures_as_a_structured_error() {
        let engine = GraphEngine::open_in_memory().expect("in-memory store opens");
        let response = engine.execute("RETURN THIS IS NOT CYPHER )))", &Map::new());
        assert!(!response.is_success());
    }
}
