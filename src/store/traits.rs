//! The `ProfileStore` trait, the persistence boundary of the onboarding flow.
//!
//! The engine never talks to storage directly. Hosts checkpoint session
//! snapshots through `save` and hand the finished session to `finalize`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::onboarding::model::{OnboardingSession, Role};

/// Authoritative user record after onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub role: Role,
    pub onboarding_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    /// Answer payloads keyed by step id, as collected during onboarding.
    pub onboarding_data: Value,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    // ── Sessions ────────────────────────────────────────────────────

    /// Last saved snapshot, if any.
    async fn load(&self, user_id: &str) -> Result<Option<OnboardingSession>, PersistenceError>;

    /// Upsert a snapshot. Last write wins.
    async fn save(&self, user_id: &str, session: &OnboardingSession)
    -> Result<(), PersistenceError>;

    /// Mark onboarding complete and return the stored user record.
    async fn finalize(
        &self,
        user_id: &str,
        session: &OnboardingSession,
    ) -> Result<UserRecord, PersistenceError>;

    /// Drop saved progress and clear the completion flag. Returns whether
    /// anything was removed.
    async fn reset(&self, user_id: &str) -> Result<bool, PersistenceError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn user(&self, user_id: &str) -> Result<Option<UserRecord>, PersistenceError>;
}
