//! Error types for the onboarding engine.
//!
//! Validation refusals are not errors: a step whose answers do not pass its
//! validator produces a `Transition::Refused` value (see `onboarding::engine`).

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Step registry and runtime configuration errors.
///
/// Registry errors are fatal at startup: the onboarding flow must not be
/// served from a broken catalog.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No steps configured for role {role}")]
    MissingRole { role: String },

    #[error("Role {role} has no role-specific steps")]
    EmptyRole { role: String },

    #[error("Completion step {step_id} does not sort last for role {role}")]
    CompletionNotLast { role: String, step_id: String },

    #[error("Duplicate step id: {id}")]
    DuplicateStepId { id: String },

    #[error("Duplicate badge id: {id}")]
    DuplicateBadgeId { id: String },

    #[error("Duplicate achievement id: {id}")]
    DuplicateAchievementId { id: String },

    #[error("Achievement trigger for step {step_id} references unknown achievement {achievement_id}")]
    UnknownTriggerAchievement {
        achievement_id: String,
        step_id: String,
    },

    #[error("Invalid onboarding configuration: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Rejected state machine operations.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Step {step_id} is not reachable: {reason}")]
    Unreachable { step_id: String, reason: String },

    #[error("No onboarding session for user {user_id}")]
    UnknownSession { user_id: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StepError {
    pub fn unreachable(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }
}

/// Persistence adapter failures (load, save, finalize).
///
/// These are recovered locally: the in-memory session is kept and the user
/// is offered a retry.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl PersistenceError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Query(_))
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
