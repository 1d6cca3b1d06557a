use serde::{Deserialize, Serialize};

use crate::entity::TransactionRecord;

/// One page of `GET /activity`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    #[serde(default)]
    pub items: Vec<TransactionRecord>,
    /// Opaque cursor of the next page, absent on the last one
    #[serde(default)]
    pub next_cursor: Option<String>,
}

// Error body the backend sends with non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(alias = "message")]
    pub error: String,
}
