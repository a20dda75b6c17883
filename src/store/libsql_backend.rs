//! libSQL implementation of `ProfileStore`.
//!
//! Supports local file and in-memory databases. Session snapshots are
//! stored whole as JSON; the indexed columns beside them are for queries.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::onboarding::model::{OnboardingSession, Role};
use crate::store::migrations;
use crate::store::traits::{ProfileStore, UserRecord};

/// libSQL-backed profile store.
///
/// Holds a single connection reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(|e| {
            PersistenceError::Unavailable(format!("Failed to open libSQL database: {e}"))
        })?;
        let store = Self::connect(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// In-memory database (for tests).
    pub async fn new_memory() -> Result<Self, PersistenceError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                PersistenceError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::connect(db).await
    }

    async fn connect(db: LibSqlDatabase) -> Result<Self, PersistenceError> {
        let conn = db.connect().map_err(|e| {
            PersistenceError::Unavailable(format!("Failed to create connection: {e}"))
        })?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|ndt| ndt.and_utc())
}

fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn row_to_user(row: &libsql::Row) -> Result<UserRecord, PersistenceError> {
    let read = |e: libsql::Error| PersistenceError::Query(format!("user row parse: {e}"));

    let user_id: String = row.get(0).map_err(read)?;
    let role: Role = row
        .get::<String>(1)
        .map_err(read)?
        .parse()
        .map_err(|e| PersistenceError::Serialization(format!("users.role: {e}")))?;
    let completed: i64 = row.get(2).map_err(read)?;
    let completed_at: Option<String> = row.get(3).map_err(read)?;
    let data: String = row.get(4).map_err(read)?;

    Ok(UserRecord {
        user_id,
        role,
        onboarding_completed: completed != 0,
        onboarding_completed_at: completed_at.as_deref().and_then(parse_datetime),
        onboarding_data: serde_json::from_str(&data)?,
    })
}

#[async_trait]
impl ProfileStore for LibSqlStore {
    // ── Sessions ────────────────────────────────────────────────────

    async fn load(&self, user_id: &str) -> Result<Option<OnboardingSession>, PersistenceError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT snapshot FROM onboarding_sessions WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("load: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let snapshot: String = row
                    .get(0)
                    .map_err(|e| PersistenceError::Query(format!("load row parse: {e}")))?;
                Ok(Some(serde_json::from_str(&snapshot)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(PersistenceError::Query(format!("load: {e}"))),
        }
    }

    async fn save(
        &self,
        user_id: &str,
        session: &OnboardingSession,
    ) -> Result<(), PersistenceError> {
        let snapshot = serde_json::to_string(session)?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO onboarding_sessions (user_id, session_id, role, current_step, snapshot, completed_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (user_id) DO UPDATE SET
                    session_id = ?2, role = ?3, current_step = ?4, snapshot = ?5,
                    completed_at = ?6, updated_at = ?7",
                params![
                    user_id,
                    session.id.as_str(),
                    session.role.as_str(),
                    session.current_step.as_str(),
                    snapshot,
                    opt_text(session.completed_at.map(|t| t.to_rfc3339())),
                    now,
                ],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("save: {e}")))?;

        debug!(user_id = %user_id, step_id = %session.current_step, "Session saved");
        Ok(())
    }

    async fn finalize(
        &self,
        user_id: &str,
        session: &OnboardingSession,
    ) -> Result<UserRecord, PersistenceError> {
        self.save(user_id, session).await?;

        let completed_at = session.completed_at.unwrap_or_else(Utc::now);
        let data = serde_json::to_string(&session.data)?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO users (user_id, role, onboarding_completed, onboarding_completed_at, onboarding_data, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?5)
                 ON CONFLICT (user_id) DO UPDATE SET
                    role = ?2, onboarding_completed = 1, onboarding_completed_at = ?3,
                    onboarding_data = ?4, updated_at = ?5",
                params![
                    user_id,
                    session.role.as_str(),
                    completed_at.to_rfc3339(),
                    data,
                    now,
                ],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("finalize: {e}")))?;

        info!(user_id = %user_id, role = %session.role, "Onboarding finalized");

        self.user(user_id).await?.ok_or(PersistenceError::NotFound {
            entity: "user".to_string(),
            id: user_id.to_string(),
        })
    }

    async fn reset(&self, user_id: &str) -> Result<bool, PersistenceError> {
        let conn = self.conn();
        let sessions = conn
            .execute(
                "DELETE FROM onboarding_sessions WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("reset: {e}")))?;

        let users = conn
            .execute(
                "UPDATE users SET onboarding_completed = 0, onboarding_completed_at = NULL,
                    onboarding_data = '{}', updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("reset: {e}")))?;

        Ok(sessions + users > 0)
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, PersistenceError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, role, onboarding_completed, onboarding_completed_at, onboarding_data
                 FROM users WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| PersistenceError::Query(format!("user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(PersistenceError::Query(format!("user: {e}"))),
        }
    }
}
