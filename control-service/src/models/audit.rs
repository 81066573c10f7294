use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One immutable row in the audit ledger. Rows are written once per action
/// attempt (including denials) and never updated or deleted.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_email: String,
    pub action: String,
    pub org: String,
    pub repo: Option<String>,
    pub parameters: String,
    pub result: String,
}

/// Audit entry as returned by the admin query surface.
#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub timestamp: DateTime<Utc>,
    pub email: String,
    pub action: String,
    pub org: String,
    pub repo: Option<String>,
    pub parameters: String,
    pub result: String,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            email: entry.user_email,
            action: entry.action,
            org: entry.org,
            repo: entry.repo,
            parameters: entry.parameters,
            result: entry.result,
        }
    }
}
