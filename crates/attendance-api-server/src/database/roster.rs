use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::DbPool;

/// Read-only lookup into the roster owned by the surrounding CRUD
/// subsystem: maps the upstream caller id to the student's record-book
/// number, the identifier attendance is recorded under.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RosterDirectory: Send + Sync {
    async fn resolve_identity(&self, external_id: &str) -> Result<Option<String>>;
}

pub struct PgRosterDirectory {
    pool: DbPool,
}

impl PgRosterDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterDirectory for PgRosterDirectory {
    async fn resolve_identity(&self, external_id: &str) -> Result<Option<String>> {
        let record_book_number = sqlx::query_scalar::<_, String>(
            r#"SELECT si.record_book_number
               FROM users u
               JOIN student_info si ON si.user_id = u.id
               WHERE u.external_id = $1"#,
        )
        .bind(external_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        if record_book_number.is_none() {
            debug!("No roster entry for caller {}", external_id);
        }

        Ok(record_book_number)
    }
}
