//! Badge and achievement evaluation.
//!
//! `evaluate` is pure and deterministic: it walks the catalog in declaration
//! order and reports only what is new. `apply` folds the result through the
//! session reducer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StepError;

use super::model::{Achievement, Badge, BadgeCriteria, OnboardingSession, StepStatus};
use super::registry::StepRegistry;
use super::session::{SessionAction, reduce};

/// Newly unlocked badges and achievement upserts that raise progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationUpdate {
    pub badges: Vec<Badge>,
    pub achievements: Vec<Achievement>,
}

impl GamificationUpdate {
    pub fn is_empty(&self) -> bool {
        self.badges.is_empty() && self.achievements.is_empty()
    }
}

fn badge_unlocked(session: &OnboardingSession, criteria: &BadgeCriteria, now: DateTime<Utc>) -> bool {
    match criteria {
        BadgeCriteria::TimeLimit { minutes } => {
            let elapsed = (now - session.started_at).num_minutes();
            !session.is_complete() && elapsed < i64::from(*minutes)
        }
        BadgeCriteria::NoSkips => session.skipped_steps().is_empty(),
        BadgeCriteria::StepCompleted { step_id } => {
            session.status_of(step_id) == StepStatus::Completed
        }
        BadgeCriteria::Manual => false,
    }
}

pub fn evaluate(
    session: &OnboardingSession,
    registry: &StepRegistry,
    now: DateTime<Utc>,
) -> GamificationUpdate {
    let badges = registry
        .badges()
        .iter()
        .filter(|b| !session.has_badge(&b.id) && badge_unlocked(session, &b.criteria, now))
        .cloned()
        .collect();

    let mut achievements: Vec<Achievement> = Vec::new();
    for trigger in registry.triggers() {
        if session.status_of(&trigger.step_id) != StepStatus::Completed {
            continue;
        }
        let Some(catalog) = registry.achievement(&trigger.achievement_id) else {
            continue;
        };
        let current = session
            .achievement(&catalog.id)
            .map(|a| a.progress)
            .unwrap_or(0);
        if current < catalog.max_progress && !achievements.iter().any(|a| a.id == catalog.id) {
            achievements.push(catalog.with_progress(catalog.max_progress));
        }
    }

    GamificationUpdate {
        badges,
        achievements,
    }
}

pub fn apply(
    session: &OnboardingSession,
    update: GamificationUpdate,
    registry: &StepRegistry,
    now: DateTime<Utc>,
) -> Result<OnboardingSession, StepError> {
    let mut actions = update
        .badges
        .into_iter()
        .map(SessionAction::EarnBadge)
        .chain(
            update
                .achievements
                .into_iter()
                .map(SessionAction::UpsertAchievement),
        );
    actions.try_fold(session.clone(), |current, action| {
        reduce(&current, action, registry, now)
    })
}
