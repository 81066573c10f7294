use chrono::Utc;
use service_core::error::AppError;
use sqlx::SqlitePool;

use crate::models::{AuditEntry, Identity};

/// Append-only ledger of attempted actions.
///
/// Every attempt gets exactly one row, including denials and upstream
/// failures. Rows are written once and never updated or deleted.
#[derive(Clone)]
pub struct AuditLedger {
    pool: SqlitePool,
}

/// Exact-match filters plus pagination for the admin query surface.
#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub email: Option<String>,
    pub action: Option<String>,
    pub org: Option<String>,
    pub repo: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append one row for an action attempt. `result` is `"success"` or an
    /// error-tagged string.
    pub async fn record(
        &self,
        identity: &Identity,
        action: &str,
        org: &str,
        repo: Option<&str>,
        parameters: &str,
        result: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (timestamp, user_email, action, org, repo, parameters, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Utc::now())
        .bind(&identity.email)
        .bind(action)
        .bind(org)
        .bind(repo)
        .bind(parameters)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Query entries newest-first. `limit` is clamped to [1, 1000] and
    /// `offset` to >= 0; ties on timestamp break by insertion order so the
    /// pagination window is stable.
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AppError> {
        let limit = filter.limit.clamp(1, 1000);
        let offset = filter.offset.max(0);

        let mut conditions = Vec::new();
        let mut param_idx = 1;
        if filter.email.is_some() {
            conditions.push(format!("user_email = ${param_idx}"));
            param_idx += 1;
        }
        if filter.action.is_some() {
            conditions.push(format!("action = ${param_idx}"));
            param_idx += 1;
        }
        if filter.org.is_some() {
            conditions.push(format!("org = ${param_idx}"));
            param_idx += 1;
        }
        if filter.repo.is_some() {
            conditions.push(format!("repo = ${param_idx}"));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let query = format!(
            "SELECT * FROM audit_log WHERE {} ORDER BY timestamp DESC, id DESC LIMIT ${} OFFSET ${}",
            where_clause,
            param_idx,
            param_idx + 1
        );

        let mut q = sqlx::query_as::<_, AuditEntry>(&query);
        if let Some(email) = &filter.email {
            q = q.bind(email);
        }
        if let Some(action) = &filter.action {
            q = q.bind(action);
        }
        if let Some(org) = &filter.org {
            q = q.bind(org);
        }
        if let Some(repo) = &filter.repo {
            q = q.bind(repo);
        }

        q.bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_ledger() -> AuditLedger {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to open in-memory database");
        crate::db::MIGRATOR
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        AuditLedger::new(pool)
    }

    fn operator(email: &str) -> Identity {
        Identity {
            subject: "sub".to_string(),
            email: email.to_string(),
            name: "Operator".to_string(),
            expiry: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_appear_newest_first() {
        let ledger = test_ledger().await;
        let alice = operator("alice@example.com");

        for i in 0..3 {
            ledger
                .record(
                    &alice,
                    "create_repo",
                    "acme",
                    None,
                    &format!(r#"{{"name":"r{i}"}}"#),
                    "success",
                )
                .await
                .unwrap();
        }

        let entries = ledger
            .query(&AuditFilter {
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries[0].parameters.contains("r2"));
        assert!(entries[2].parameters.contains("r0"));
    }

    #[tokio::test]
    async fn offset_skips_the_most_recent_entries() {
        let ledger = test_ledger().await;
        let alice = operator("alice@example.com");

        for i in 0..5 {
            ledger
                .record(&alice, "delete_repo", "acme", None, &format!("{i}"), "success")
                .await
                .unwrap();
        }

        let window = ledger
            .query(&AuditFilter {
                limit: 2,
                offset: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(window.len(), 2);
        assert_eq!(window[0].parameters, "2");
        assert_eq!(window[1].parameters, "1");
    }

    #[tokio::test]
    async fn limits_are_clamped_to_the_allowed_window() {
        let ledger = test_ledger().await;
        let alice = operator("alice@example.com");

        for _ in 0..3 {
            ledger
                .record(&alice, "create_repo", "acme", None, "{}", "success")
                .await
                .unwrap();
        }

        let entries = ledger
            .query(&AuditFilter {
                limit: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn filters_match_exactly() {
        let ledger = test_ledger().await;
        ledger
            .record(
                &operator("alice@example.com"),
                "create_repo",
                "acme",
                Some("x"),
                "{}",
                "success",
            )
            .await
            .unwrap();
        ledger
            .record(
                &operator("bob@example.com"),
                "delete_secret",
                "globex",
                Some("y"),
                "{}",
                "error: authorization denied: user bob is not in team infrastructure-admins for org globex",
            )
            .await
            .unwrap();

        let by_email = ledger
            .query(&AuditFilter {
                email: Some("bob@example.com".to_string()),
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].org, "globex");

        let by_action = ledger
            .query(&AuditFilter {
                action: Some("create_repo".to_string()),
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_action.len(), 1);
        assert_eq!(by_action[0].user_email, "alice@example.com");

        let by_org_and_repo = ledger
            .query(&AuditFilter {
                org: Some("globex".to_string()),
                repo: Some("y".to_string()),
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_org_and_repo.len(), 1);
        assert!(by_org_and_repo[0].result.starts_with("error: authorization denied"));
    }

    #[tokio::test]
    async fn denied_attempts_are_recorded_like_any_other() {
        let ledger = test_ledger().await;
        ledger
            .record(
                &operator("mallory@example.com"),
                "delete_repo",
                "acme",
                None,
                r#"{"name":"prod"}"#,
                "error: authorization denied: user mallory is not in team infrastructure-admins for org acme",
            )
            .await
            .unwrap();

        let entries = ledger
            .query(&AuditFilter {
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].result.starts_with("error:"));
    }
}
