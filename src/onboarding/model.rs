//! Onboarding data model: roles, step progress, badges, and the session
//! aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Account type chosen at registration. Decides which steps apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Expert,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Customer, Role::Expert, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Expert => "expert",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "expert" => Ok(Self::Expert),
            "admin" => Ok(Self::Admin),
            other => Err(ConfigError::InvalidValue {
                key: "role".to_string(),
                message: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// Status of a single step within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Paused,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

/// Progress record for one touched step.
///
/// Only the timestamp matching `status` is ever set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

impl StepProgress {
    /// First touch of a step.
    pub fn new(step_id: impl Into<String>, status: StepStatus, now: DateTime<Utc>) -> Self {
        let mut progress = Self {
            step_id: step_id.into(),
            status,
            completed_at: None,
            skipped_at: None,
            paused_at: None,
            attempts: 1,
        };
        progress.set_status(status, now);
        progress
    }

    /// Replace the status, keeping only the matching timestamp.
    pub fn set_status(&mut self, status: StepStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = (status == StepStatus::Completed).then_some(now);
        self.skipped_at = (status == StepStatus::Skipped).then_some(now);
        self.paused_at = (status == StepStatus::Paused).then_some(now);
    }
}

/// Unlock rule for a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadgeCriteria {
    /// Earned while the elapsed time since session start is under the limit.
    TimeLimit { minutes: u32 },
    /// Earned when no step has been skipped.
    NoSkips,
    /// Earned once the given step is completed.
    StepCompleted { step_id: String },
    /// Awarded by the host, never by the evaluator.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub criteria: BadgeCriteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
}

impl Badge {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
        criteria: BadgeCriteria,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            criteria,
            earned_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    /// 0..=max_progress.
    pub progress: u32,
    pub max_progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earned_at: Option<DateTime<Utc>>,
}

impl Achievement {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            progress: 0,
            max_progress: 100,
            earned_at: None,
        }
    }

    /// A copy of this catalog entry with the given progress.
    pub fn with_progress(&self, progress: u32) -> Self {
        Self {
            progress: progress.min(self.max_progress),
            ..self.clone()
        }
    }

    pub fn is_earned(&self) -> bool {
        self.progress >= self.max_progress
    }
}

/// One user's onboarding run.
///
/// Mutated only through `session::reduce`, which returns a new value per
/// action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSession {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub current_step: String,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Active seconds, excluding time spent paused.
    #[serde(default)]
    pub total_time_spent: i64,
    #[serde(default)]
    pub progress: Vec<StepProgress>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    /// Answer payloads keyed by the step that produced them.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl OnboardingSession {
    pub fn progress_for(&self, step_id: &str) -> Option<&StepProgress> {
        self.progress.iter().find(|p| p.step_id == step_id)
    }

    /// Status of a step; untouched steps are pending.
    pub fn status_of(&self, step_id: &str) -> StepStatus {
        self.progress_for(step_id)
            .map(|p| p.status)
            .unwrap_or(StepStatus::Pending)
    }

    pub fn completed_steps(&self) -> Vec<&str> {
        self.steps_with_status(StepStatus::Completed)
    }

    pub fn skipped_steps(&self) -> Vec<&str> {
        self.steps_with_status(StepStatus::Skipped)
    }

    fn steps_with_status(&self, status: StepStatus) -> Vec<&str> {
        self.progress
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.step_id.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b.id == badge_id)
    }

    pub fn achievement(&self, achievement_id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == achievement_id)
    }

    /// Answer payload for a step, `{}` if nothing was entered yet.
    pub fn answers_for(&self, step_id: &str) -> Value {
        self.data
            .get(step_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn role_display_matches_serde() {
        for role in Role::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(format!("\"{role}\""), json);
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("plumber".parse::<Role>().is_err());
    }

    #[test]
    fn step_status_display_matches_serde() {
        let all = [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Completed,
            StepStatus::Skipped,
            StepStatus::Paused,
        ];
        for status in all {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
        }
    }

    #[test]
    fn progress_keeps_only_matching_timestamp() {
        let mut p = StepProgress::new("welcome", StepStatus::Skipped, t0());
        assert_eq!(p.skipped_at, Some(t0()));
        assert!(p.completed_at.is_none());
        assert_eq!(p.attempts, 1);

        let later = t0() + chrono::Duration::minutes(2);
        p.set_status(StepStatus::Completed, later);
        assert_eq!(p.completed_at, Some(later));
        assert!(p.skipped_at.is_none());
        assert!(p.paused_at.is_none());
    }

    #[test]
    fn badge_criteria_serde_is_tagged() {
        let c = BadgeCriteria::TimeLimit { minutes: 10 };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "time_limit", "minutes": 10}));

        let parsed: BadgeCriteria =
            serde_json::from_value(serde_json::json!({"kind": "no_skips"})).unwrap();
        assert_eq!(parsed, BadgeCriteria::NoSkips);
    }

    #[test]
    fn achievement_progress_is_clamped() {
        let a = Achievement::new("profile-completion", "Profile Master", "", "");
        assert_eq!(a.with_progress(250).progress, 100);
        assert!(a.with_progress(100).is_earned());
        assert!(!a.is_earned());
    }

    #[test]
    fn session_snapshot_uses_camel_case() {
        let session = OnboardingSession {
            id: "s1".into(),
            user_id: "u1".into(),
            role: Role::Expert,
            current_step: "welcome".into(),
            started_at: t0(),
            last_active_at: t0(),
            completed_at: None,
            paused_at: None,
            total_time_spent: 0,
            progress: vec![StepProgress::new("welcome", StepStatus::Completed, t0())],
            badges: vec![],
            achievements: vec![],
            data: Map::new(),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["currentStep"], "welcome");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["progress"][0]["stepId"], "welcome");
        assert_eq!(json["progress"][0]["status"], "completed");
        assert!(json.get("completedAt").is_none());

        let parsed: OnboardingSession = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, session);
        assert_eq!(parsed.status_of("welcome"), StepStatus::Completed);
        assert_eq!(parsed.status_of("profile-setup"), StepStatus::Pending);
        assert_eq!(parsed.answers_for("profile-setup"), serde_json::json!({}));
    }
}
