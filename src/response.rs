//! The external query request/response envelope (§6).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::errors::EngineError;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub cypher: String,
    #[serde(default)]
    pub params: Map<String, Json>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub count: usize,
    pub time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Success {
        success: bool,
        data: Vec<Json>,
        meta: Meta,
    },
    Failure {
        success: bool,
        error: ErrorBody,
    },
}

impl QueryResponse {
    pub fn success(data: Vec<Json>, time_ms: f64) -> Self {
        QueryResponse::Success {
            success: true,
            meta: Meta {
                count: data.len(),
                time_ms: round_2dp(time_ms),
            },
            data,
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        let (position, line, column) = match err.source_position() {
            Some((p, l, c)) => (Some(p), Some(l), Some(c)),
            None => (None, None, None),
        };
        QueryResponse::Failure {
            success: false,
            error: ErrorBody {
                message: err.to_string(),
                position,
                line,
                column,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResponse::Success { .. })
    }
}

fn round_2dp(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
