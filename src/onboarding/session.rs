//! Session reducer.
//!
//! `reduce` is the only way an `OnboardingSession` changes: it takes the
//! current value and one `SessionAction` and returns the next value. A
//! completed session is terminal; every action except `Complete` leaves it
//! untouched, and `Complete` itself is idempotent.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::StepError;

use super::model::{Achievement, Badge, OnboardingSession, Role, StepProgress, StepStatus};
use super::registry::{ROLE_SELECTION_STEP, StepRegistry};

/// A single state change applied to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    SetCurrentStep(String),
    UpsertProgress { step_id: String, status: StepStatus },
    /// Shallow merge keyed by step id.
    MergeData(Map<String, Value>),
    Pause,
    Resume,
    Complete,
    EarnBadge(Badge),
    UpsertAchievement(Achievement),
}

impl SessionAction {
    pub fn progress(step_id: impl Into<String>, status: StepStatus) -> Self {
        Self::UpsertProgress {
            step_id: step_id.into(),
            status,
        }
    }

    /// Merge one step's answer payload.
    pub fn answers(step_id: impl Into<String>, data: Value) -> Self {
        let mut map = Map::new();
        map.insert(step_id.into(), data);
        Self::MergeData(map)
    }
}

impl OnboardingSession {
    /// Fresh session for a user whose role is already known.
    ///
    /// The role picker, if the role's flow contains one, is recorded as
    /// skipped with the role as its answer, and the session starts on the
    /// first step after it.
    pub fn initialize(
        user_id: impl Into<String>,
        role: Role,
        registry: &StepRegistry,
        now: DateTime<Utc>,
    ) -> Result<Self, StepError> {
        let steps = registry.steps_for_role(role)?;
        let first = steps
            .iter()
            .find(|s| s.id != ROLE_SELECTION_STEP)
            .or(steps.first())
            .ok_or_else(|| StepError::unreachable("", format!("no steps for role {role}")))?;

        let mut session = Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            role,
            current_step: first.id.clone(),
            started_at: now,
            last_active_at: now,
            completed_at: None,
            paused_at: None,
            total_time_spent: 0,
            progress: Vec::new(),
            badges: Vec::new(),
            achievements: Vec::new(),
            data: Map::new(),
        };

        if steps.iter().any(|s| s.id == ROLE_SELECTION_STEP) {
            session.progress.push(StepProgress::new(
                ROLE_SELECTION_STEP,
                StepStatus::Skipped,
                now,
            ));
            session
                .data
                .insert(ROLE_SELECTION_STEP.to_string(), json!({ "role": role }));
        }

        Ok(session)
    }

    /// Accrue active time since the last action and mark the session active.
    fn touch(&mut self, now: DateTime<Utc>) {
        if !self.is_paused() {
            let elapsed = (now - self.last_active_at).num_seconds().max(0);
            self.total_time_spent += elapsed;
        }
        self.last_active_at = now;
    }
}

/// Apply one action, returning the next session value.
pub fn reduce(
    session: &OnboardingSession,
    action: SessionAction,
    registry: &StepRegistry,
    now: DateTime<Utc>,
) -> Result<OnboardingSession, StepError> {
    if session.is_complete() {
        return Ok(session.clone());
    }

    let mut next = session.clone();
    match action {
        SessionAction::SetCurrentStep(step_id) => {
            if !registry.contains_step(&step_id, session.role) {
                return Err(StepError::unreachable(
                    step_id,
                    format!("not part of the {} flow", session.role),
                ));
            }
            next.touch(now);
            next.current_step = step_id;
        }
        SessionAction::UpsertProgress { step_id, status } => {
            next.touch(now);
            match next.progress.iter_mut().find(|p| p.step_id == step_id) {
                Some(existing) => existing.set_status(status, now),
                None => next.progress.push(StepProgress::new(step_id, status, now)),
            }
        }
        SessionAction::MergeData(entries) => {
            next.touch(now);
            next.data.extend(entries);
        }
        SessionAction::Pause => {
            if !next.is_paused() {
                next.touch(now);
                next.paused_at = Some(now);
            }
        }
        SessionAction::Resume => {
            if next.is_paused() {
                next.paused_at = None;
                next.last_active_at = now;
            }
        }
        SessionAction::Complete => {
            next.touch(now);
            next.completed_at = Some(now);
        }
        SessionAction::EarnBadge(mut badge) => {
            if !next.has_badge(&badge.id) {
                badge.earned_at = Some(now);
                next.badges.push(badge);
            }
        }
        SessionAction::UpsertAchievement(mut achievement) => {
            match next.achievements.iter_mut().find(|a| a.id == achievement.id) {
                Some(existing) => {
                    if achievement.progress > existing.progress {
                        existing.progress = achievement.progress.min(existing.max_progress);
                    }
                    if existing.is_earned() && existing.earned_at.is_none() {
                        existing.earned_at = Some(now);
                    }
                }
                None => {
                    if achievement.is_earned() && achievement.earned_at.is_none() {
                        achievement.earned_at = Some(now);
                    }
                    next.achievements.push(achievement);
                }
            }
        }
    }
    Ok(next)
}
