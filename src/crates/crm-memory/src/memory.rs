//! The `Memory` row type and recall options (§3, §4.G).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recalled memory row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub text: String,
    pub score: f64,
    pub kind: String,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Tuning knobs for a `recall` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecallOptions {
    pub limit: usize,
    pub threshold: f64,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            threshold: 0.0,
        }
    }
}
