//! The onboarding state machine for one session.
//!
//! Navigation outcomes are values: a refused move is `Transition::Refused`
//! and leaves the session exactly as it was. `StepError` is reserved for
//! requests that name steps outside the role's flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StepError;

use super::gamification;
use super::model::{Achievement, Badge, OnboardingSession, Role, StepStatus};
use super::registry::{StepDefinition, StepRegistry, StepSummary};
use super::rules::ValidationResult;
use super::session::{SessionAction, reduce};

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Moved { from: String, to: String },
    Completed,
    Stayed,
    Refused { refusal: Refusal },
}

impl Transition {
    fn refused(refusal: Refusal) -> Self {
        Self::Refused { refusal }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }
}

/// Why a navigation request was not carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Refusal {
    ValidationFailed { step_id: String, errors: Vec<String> },
    NotSkippable { step_id: String },
    SkipDisabled,
    PauseDisabled,
    NotPaused,
    AlreadyPaused,
    /// Navigation while the session is paused.
    Paused,
    AtFirstStep,
    SessionComplete,
    /// The next step's prerequisites are not all completed.
    Locked { step_id: String, missing: Vec<String> },
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValidationFailed { step_id, errors } => {
                write!(f, "step {step_id} failed validation: {}", errors.join("; "))
            }
            Self::NotSkippable { step_id } => write!(f, "step {step_id} cannot be skipped"),
            Self::SkipDisabled => write!(f, "skipping is disabled"),
            Self::PauseDisabled => write!(f, "pausing is disabled"),
            Self::NotPaused => write!(f, "session is not paused"),
            Self::AlreadyPaused => write!(f, "session is already paused"),
            Self::Paused => write!(f, "session is paused"),
            Self::AtFirstStep => write!(f, "already at the first step"),
            Self::SessionComplete => write!(f, "onboarding is already complete"),
            Self::Locked { step_id, missing } => {
                write!(f, "step {step_id} requires {}", missing.join(", "))
            }
        }
    }
}

/// Where the session sits in its role's step list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub current: String,
    pub previous: Option<String>,
    pub next: Option<String>,
    /// Zero-based index of the current step.
    pub position: usize,
    pub total: usize,
}

/// Everything a host needs to render the current step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub step: StepSummary,
    pub answers: Value,
    pub validation: ValidationResult,
    pub navigation: Navigation,
    pub can_advance: bool,
    pub can_skip: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_go_back: bool,
    /// Hidden when the flow is configured not to show progress.
    pub progress_percent: Option<u32>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub estimated_minutes_remaining: u32,
    pub badges: Vec<Badge>,
    pub achievements: Vec<Achievement>,
    pub recommended_steps: Vec<StepSummary>,
    pub is_paused: bool,
    pub is_complete: bool,
}

/// The state machine driving one session against a shared registry.
#[derive(Debug, Clone)]
pub struct StepEngine {
    registry: Arc<StepRegistry>,
    session: OnboardingSession,
}

impl StepEngine {
    /// Begin a fresh session.
    pub fn start(
        registry: Arc<StepRegistry>,
        user_id: impl Into<String>,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Self, StepError> {
        let session = OnboardingSession::initialize(user_id, role, &registry, now)?;
        Ok(Self { registry, session })
    }

    /// Rehydrate from a stored snapshot.
    pub fn resume_from(
        registry: Arc<StepRegistry>,
        session: OnboardingSession,
    ) -> Result<Self, StepError> {
        if !registry.contains_step(&session.current_step, session.role) {
            return Err(StepError::unreachable(
                session.current_step,
                format!("not part of the {} flow", session.role),
            ));
        }
        Ok(Self { registry, session })
    }

    pub fn session(&self) -> &OnboardingSession {
        &self.session
    }

    pub fn into_session(self) -> OnboardingSession {
        self.session
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    fn current_definition<'r>(
        &self,
        registry: &'r StepRegistry,
    ) -> Result<&'r StepDefinition, StepError> {
        registry
            .step_by_id(&self.session.current_step, self.session.role)
            .ok_or_else(|| StepError::unreachable(&self.session.current_step, "unknown step"))
    }

    fn apply(&mut self, action: SessionAction, now: DateTime<Utc>) -> Result<(), StepError> {
        self.session = reduce(&self.session, action, &self.registry, now)?;
        Ok(())
    }

    /// Neighbouring step, passing over steps already marked skipped (such
    /// as the pre-seeded role picker).
    fn neighbour<'r>(
        &self,
        registry: &'r StepRegistry,
        from: &str,
        forward: bool,
    ) -> Option<&'r StepDefinition> {
        let role = self.session.role;
        let mut step = if forward {
            registry.next_step(from, role)
        } else {
            registry.previous_step(from, role)
        }?;
        while self.session.status_of(&step.id) == StepStatus::Skipped {
            step = if forward {
                registry.next_step(&step.id, role)
            } else {
                registry.previous_step(&step.id, role)
            }?;
        }
        Some(step)
    }

    /// Prerequisites of `step` that are not completed. `assume_done` is
    /// treated as completed, for checks made before the move is applied.
    fn missing_prerequisites(&self, step: &StepDefinition, assume_done: Option<&str>) -> Vec<String> {
        step.prerequisites
            .iter()
            .filter(|p| {
                Some(p.as_str()) != assume_done && self.session.status_of(p) != StepStatus::Completed
            })
            .cloned()
            .collect()
    }

    fn next_is_locked(&self, assume_done: Option<&str>) -> bool {
        self.neighbour(&self.registry, &self.session.current_step, true)
            .is_some_and(|next| !self.missing_prerequisites(next, assume_done).is_empty())
    }

    /// Completed sessions and paused sessions do not navigate.
    fn navigation_refusal(&self) -> Option<Refusal> {
        if self.session.is_complete() {
            Some(Refusal::SessionComplete)
        } else if self.session.is_paused() {
            Some(Refusal::Paused)
        } else {
            None
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Validate the current step and move past it.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<Transition, StepError> {
        if let Some(refusal) = self.navigation_refusal() {
            return Ok(Transition::refused(refusal));
        }
        let registry = Arc::clone(&self.registry);
        let step = self.current_definition(&registry)?;

        let report = step.validator.report(&self.session.answers_for(&step.id));
        if !report.is_valid {
            debug!(user_id = %self.session.user_id, step_id = %step.id, "Step refused: validation failed");
            return Ok(Transition::refused(Refusal::ValidationFailed {
                step_id: step.id.clone(),
                errors: report.errors,
            }));
        }

        let before = self.session.clone();
        self.apply(SessionAction::progress(&step.id, StepStatus::Completed), now)?;
        self.continue_from(&step.id, before, now)
    }

    /// Go back one step. The step being left keeps its status.
    ///
    /// Steps already marked skipped are passed over, so this can land
    /// further back than the positional previous step.
    pub fn retreat(&mut self, now: DateTime<Utc>) -> Result<Transition, StepError> {
        if let Some(refusal) = self.navigation_refusal() {
            return Ok(Transition::refused(refusal));
        }
        let registry = Arc::clone(&self.registry);
        let from = self.session.current_step.clone();
        let Some(previous) = self.neighbour(&registry, &from, false) else {
            return Ok(Transition::refused(Refusal::AtFirstStep));
        };
        self.apply(SessionAction::SetCurrentStep(previous.id.clone()), now)?;
        debug!(user_id = %self.session.user_id, from = %from, to = %previous.id, "Moved back");
        Ok(Transition::Moved {
            from,
            to: previous.id.clone(),
        })
    }

    /// Mark the current step skipped and move past it without validation.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<Transition, StepError> {
        if let Some(refusal) = self.navigation_refusal() {
            return Ok(Transition::refused(refusal));
        }
        if !self.registry.settings().allow_skip {
            return Ok(Transition::refused(Refusal::SkipDisabled));
        }
        let registry = Arc::clone(&self.registry);
        let step = self.current_definition(&registry)?;
        if !step.is_skippable {
            return Ok(Transition::refused(Refusal::NotSkippable {
                step_id: step.id.clone(),
            }));
        }

        let before = self.session.clone();
        self.apply(SessionAction::progress(&step.id, StepStatus::Skipped), now)?;
        self.continue_from(&step.id, before, now)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<Transition, StepError> {
        if self.session.is_complete() {
            return Ok(Transition::refused(Refusal::SessionComplete));
        }
        if !self.registry.settings().allow_pause {
            return Ok(Transition::refused(Refusal::PauseDisabled));
        }
        if self.session.is_paused() {
            return Ok(Transition::refused(Refusal::AlreadyPaused));
        }
        self.apply(SessionAction::Pause, now)?;
        Ok(Transition::Stayed)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<Transition, StepError> {
        if self.session.is_complete() {
            return Ok(Transition::refused(Refusal::SessionComplete));
        }
        if !self.session.is_paused() {
            return Ok(Transition::refused(Refusal::NotPaused));
        }
        self.apply(SessionAction::Resume, now)?;
        Ok(Transition::Stayed)
    }

    /// Revisit a completed step, or stay on the current one. Any other
    /// target, including one whose prerequisites are not completed, is
    /// unreachable; the engine never redirects.
    pub fn jump_to(&mut self, step_id: &str, now: DateTime<Utc>) -> Result<Transition, StepError> {
        if let Some(refusal) = self.navigation_refusal() {
            return Ok(Transition::refused(refusal));
        }
        if !self.registry.contains_step(step_id, self.session.role) {
            return Err(StepError::unreachable(
                step_id,
                format!("not part of the {} flow", self.session.role),
            ));
        }
        if step_id == self.session.current_step {
            return Ok(Transition::Stayed);
        }
        if let Some(target) = self.registry.step_by_id(step_id, self.session.role) {
            let missing = self.missing_prerequisites(target, None);
            if !missing.is_empty() {
                return Err(StepError::unreachable(
                    step_id,
                    format!("requires {}", missing.join(", ")),
                ));
            }
        }
        if self.session.status_of(step_id) != StepStatus::Completed {
            return Err(StepError::unreachable(step_id, "step has not been completed"));
        }

        let from = self.session.current_step.clone();
        self.apply(SessionAction::SetCurrentStep(step_id.to_string()), now)?;
        Ok(Transition::Moved {
            from,
            to: step_id.to_string(),
        })
    }

    /// Store the answer payload for one step.
    pub fn update_answers(
        &mut self,
        step_id: &str,
        data: Value,
        now: DateTime<Utc>,
    ) -> Result<Transition, StepError> {
        if self.session.is_complete() {
            return Ok(Transition::refused(Refusal::SessionComplete));
        }
        if self.registry.step_by_id(step_id, self.session.role).is_none() {
            return Err(StepError::unreachable(step_id, "unknown step"));
        }
        self.apply(SessionAction::answers(step_id, data), now)?;
        Ok(Transition::Stayed)
    }

    /// Award badges and achievements, then move to the next step or finish.
    /// A locked next step restores `before` and refuses the move.
    fn continue_from(
        &mut self,
        step_id: &str,
        before: OnboardingSession,
        now: DateTime<Utc>,
    ) -> Result<Transition, StepError> {
        let registry = Arc::clone(&self.registry);
        let next = self.neighbour(&registry, step_id, true);
        if let Some(next) = next {
            let missing = self.missing_prerequisites(next, None);
            if !missing.is_empty() {
                self.session = before;
                debug!(user_id = %self.session.user_id, step_id = %next.id, "Step refused: prerequisites missing");
                return Ok(Transition::refused(Refusal::Locked {
                    step_id: next.id.clone(),
                    missing,
                }));
            }
        }

        self.reward(now)?;
        match next {
            Some(next) => {
                self.apply(SessionAction::SetCurrentStep(next.id.clone()), now)?;
                debug!(user_id = %self.session.user_id, from = %step_id, to = %next.id, "Moved forward");
                Ok(Transition::Moved {
                    from: step_id.to_string(),
                    to: next.id.clone(),
                })
            }
            None => {
                self.apply(SessionAction::Complete, now)?;
                info!(
                    user_id = %self.session.user_id,
                    seconds = self.session.total_time_spent,
                    "Onboarding completed"
                );
                Ok(Transition::Completed)
            }
        }
    }

    fn reward(&mut self, now: DateTime<Utc>) -> Result<(), StepError> {
        if !self.registry.settings().enable_gamification {
            return Ok(());
        }
        let update = gamification::evaluate(&self.session, &self.registry, now);
        if update.is_empty() {
            return Ok(());
        }
        for badge in &update.badges {
            info!(user_id = %self.session.user_id, badge_id = %badge.id, "Badge earned");
        }
        self.session = gamification::apply(&self.session, update, &self.registry, now)?;
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn can_advance(&self) -> bool {
        self.navigation_refusal().is_none()
            && self.validation_report().is_valid
            && !self.next_is_locked(Some(self.session.current_step.as_str()))
    }

    pub fn can_skip(&self) -> bool {
        self.navigation_refusal().is_none()
            && self.registry.settings().allow_skip
            && self
                .current_definition(&self.registry)
                .is_ok_and(|s| s.is_skippable)
            && !self.next_is_locked(None)
    }

    pub fn can_pause(&self) -> bool {
        self.registry.settings().allow_pause
            && !self.session.is_paused()
            && !self.session.is_complete()
    }

    pub fn can_resume(&self) -> bool {
        self.session.is_paused() && !self.session.is_complete()
    }

    pub fn can_go_back(&self) -> bool {
        self.navigation_refusal().is_none()
            && self
                .neighbour(&self.registry, &self.session.current_step, false)
                .is_some()
    }

    /// Field-level messages for the current step's answers.
    pub fn validation_report(&self) -> ValidationResult {
        match self.current_definition(&self.registry) {
            Ok(step) => step
                .validator
                .report(&self.session.answers_for(&step.id)),
            Err(e) => ValidationResult::failed(vec![e.to_string()]),
        }
    }

    pub fn navigation(&self) -> Navigation {
        let role = self.session.role;
        let current = &self.session.current_step;
        let total = self
            .registry
            .steps_for_role(role)
            .map(|s| s.len())
            .unwrap_or(0);
        Navigation {
            current: current.clone(),
            previous: self
                .neighbour(&self.registry, current, false)
                .map(|s| s.id.clone()),
            next: self
                .neighbour(&self.registry, current, true)
                .map(|s| s.id.clone()),
            position: self.registry.position_of(current, role).unwrap_or(0),
            total,
        }
    }

    /// Optional and verification extras the user can still visit, with
    /// prerequisites met, in catalog order.
    pub fn recommended_steps(&self) -> Vec<&StepDefinition> {
        let mut steps: Vec<&StepDefinition> = self
            .registry
            .optional_steps_for_role(self.session.role)
            .into_iter()
            .filter(|s| {
                !matches!(
                    self.session.status_of(&s.id),
                    StepStatus::Completed | StepStatus::Skipped
                )
            })
            .filter(|s| self.missing_prerequisites(s, None).is_empty())
            .collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    pub fn view(&self) -> StepView {
        let session = &self.session;
        let settings = self.registry.settings();
        let completed = session.completed_steps();
        let navigation = self.navigation();
        let step = self
            .current_definition(&self.registry)
            .map(StepSummary::from)
            .unwrap_or_else(|_| StepSummary::from(self.registry.completion_step()));

        StepView {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            role: session.role,
            answers: session.answers_for(&step.id),
            step,
            validation: self.validation_report(),
            can_advance: self.can_advance(),
            can_skip: self.can_skip(),
            can_pause: self.can_pause(),
            can_resume: self.can_resume(),
            can_go_back: self.can_go_back(),
            progress_percent: settings
                .show_progress
                .then(|| self.registry.progress_percentage(&completed, session.role)),
            completed_steps: completed.len(),
            total_steps: navigation.total,
            estimated_minutes_remaining: self
                .registry
                .estimated_minutes_remaining(&completed, session.role),
            navigation,
            badges: session.badges.clone(),
            achievements: session.achievements.clone(),
            recommended_steps: self
                .recommended_steps()
                .into_iter()
                .map(StepSummary::from)
                .collect(),
            is_paused: session.is_paused(),
            is_complete: session.is_complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use crate::onboarding::registry::{COMPLETION_STEP, OnboardingSettings};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn engine(role: Role) -> StepEngine {
        StepEngine::start(Arc::new(StepRegistry::handie_default()), "u1", role, t0()).unwrap()
    }

    fn profile() -> Value {
        json!({
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "phone": "9876543210"
        })
    }

    /// Walk a customer to the completion step.
    fn customer_at_completion(at: DateTime<Utc>) -> StepEngine {
        let mut e = engine(Role::Customer);
        e.update_answers("welcome", json!({"started": true}), at).unwrap();
        e.advance(at).unwrap();
        e.update_answers("profile-setup", profile(), at).unwrap();
        e.advance(at).unwrap();
        e.update_answers(
            "customer-location-setup",
            json!({"street": "12 MG Road", "city": "Pune", "state": "MH"}),
            at,
        )
        .unwrap();
        e.advance(at).unwrap();
        assert_eq!(e.session().current_step, COMPLETION_STEP);
        e
    }

    #[test]
    fn welcome_advances_to_profile() {
        let mut e = engine(Role::Customer);
        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        let t = e.advance(t0()).unwrap();
        assert_eq!(
            t,
            Transition::Moved {
                from: "welcome".into(),
                to: "profile-setup".into()
            }
        );
        assert_eq!(e.session().status_of("welcome"), StepStatus::Completed);
    }

    #[test]
    fn failed_validation_leaves_session_untouched() {
        let mut e = engine(Role::Customer);
        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        e.advance(t0()).unwrap();
        let mut answers = profile();
        answers.as_object_mut().unwrap().remove("firstName");
        e.update_answers("profile-setup", answers, t0()).unwrap();

        let before = e.session().clone();
        let t = e.advance(t0() + Duration::minutes(1)).unwrap();
        match t {
            Transition::Refused {
                refusal: Refusal::ValidationFailed { step_id, errors },
            } => {
                assert_eq!(step_id, "profile-setup");
                assert_eq!(errors, vec!["firstName is required".to_string()]);
            }
            other => panic!("expected refusal, got {other:?}"),
        }
        assert_eq!(e.session(), &before);
        assert!(e.session().progress_for("profile-setup").is_none());
    }

    #[test]
    fn required_steps_cannot_be_skipped() {
        let mut e = engine(Role::Expert);
        let t = e.skip(t0()).unwrap();
        assert_eq!(
            t,
            Transition::Refused {
                refusal: Refusal::NotSkippable {
                    step_id: "welcome".into()
                }
            }
        );
    }

    #[test]
    fn skip_respects_flow_setting() {
        let registry = StepRegistry::handie_default().with_settings(OnboardingSettings {
            allow_skip: false,
            ..OnboardingSettings::default()
        });
        let mut e = StepEngine::start(Arc::new(registry), "u1", Role::Customer, t0()).unwrap();
        assert_eq!(
            e.skip(t0()).unwrap(),
            Transition::Refused {
                refusal: Refusal::SkipDisabled
            }
        );
    }

    #[test]
    fn retreat_keeps_status_and_stops_at_first() {
        let mut e = engine(Role::Customer);
        assert_eq!(
            e.retreat(t0()).unwrap(),
            Transition::Refused {
                refusal: Refusal::AtFirstStep
            }
        );
        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        e.advance(t0()).unwrap();
        let t = e.retreat(t0()).unwrap();
        assert_eq!(
            t,
            Transition::Moved {
                from: "profile-setup".into(),
                to: "welcome".into()
            }
        );
        assert_eq!(e.session().status_of("profile-setup"), StepStatus::Pending);
        assert_eq!(e.session().status_of("welcome"), StepStatus::Completed);
        assert_eq!(e.session().status_of("role-selection"), StepStatus::Skipped);
    }

    #[test]
    fn jump_rules() {
        let mut e = engine(Role::Expert);
        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        e.advance(t0()).unwrap();
        e.update_answers("profile-setup", profile(), t0()).unwrap();
        e.advance(t0()).unwrap();
        assert_eq!(e.session().current_step, "verification");

        let err = e.jump_to("availability", t0()).unwrap_err();
        assert!(matches!(err, StepError::Unreachable { .. }));
        assert_eq!(e.session().current_step, "verification");

        assert_eq!(e.jump_to("verification", t0()).unwrap(), Transition::Stayed);

        let t = e.jump_to("welcome", t0()).unwrap();
        assert_eq!(
            t,
            Transition::Moved {
                from: "verification".into(),
                to: "welcome".into()
            }
        );

        assert!(e.jump_to("customer-location-setup", t0()).is_err());
        assert!(e.jump_to("no-such-step", t0()).is_err());
    }

    #[test]
    fn pause_blocks_navigation_until_resumed() {
        let mut e = engine(Role::Customer);
        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        assert_eq!(e.pause(t0()).unwrap(), Transition::Stayed);
        assert_eq!(
            e.pause(t0()).unwrap(),
            Transition::Refused {
                refusal: Refusal::AlreadyPaused
            }
        );
        assert_eq!(
            e.advance(t0()).unwrap(),
            Transition::Refused {
                refusal: Refusal::Paused
            }
        );
        assert!(!e.can_advance());
        assert!(e.can_resume());

        assert_eq!(e.resume(t0() + Duration::hours(2)).unwrap(), Transition::Stayed);
        assert_eq!(
            e.resume(t0()).unwrap(),
            Transition::Refused {
                refusal: Refusal::NotPaused
            }
        );
        assert!(matches!(
            e.advance(t0() + Duration::hours(2)).unwrap(),
            Transition::Moved { .. }
        ));
        assert_eq!(e.session().current_step, "profile-setup");
    }

    #[test]
    fn completion_is_terminal() {
        let mut e = customer_at_completion(t0() + Duration::minutes(3));
        let done_at = t0() + Duration::minutes(4);
        assert_eq!(e.advance(done_at).unwrap(), Transition::Completed);
        assert_eq!(e.session().completed_at, Some(done_at));

        let snapshot = e.session().clone();
        assert_eq!(
            e.advance(done_at + Duration::minutes(1)).unwrap(),
            Transition::Refused {
                refusal: Refusal::SessionComplete
            }
        );
        assert_eq!(
            e.update_answers("welcome", json!({}), done_at).unwrap(),
            Transition::Refused {
                refusal: Refusal::SessionComplete
            }
        );
        assert_eq!(e.session(), &snapshot);
    }

    #[test]
    fn fast_customer_earns_speed_demon_and_profile_master() {
        let mut e = customer_at_completion(t0() + Duration::minutes(2));
        e.advance(t0() + Duration::minutes(4)).unwrap();
        let session = e.session();
        assert!(session.has_badge("speed-demon"));
        assert!(!session.has_badge("perfectionist"));
        assert_eq!(session.badges.iter().filter(|b| b.id == "speed-demon").count(), 1);
        assert!(session.achievement("profile-completion").unwrap().is_earned());
        assert!(session.achievement("location-setup").unwrap().is_earned());
        assert!(!session.has_badge("detail-oriented"));
    }

    #[test]
    fn gamification_can_be_disabled() {
        let registry = StepRegistry::handie_default().with_settings(OnboardingSettings {
            enable_gamification: false,
            ..OnboardingSettings::default()
        });
        let mut e = StepEngine::start(Arc::new(registry), "u1", Role::Admin, t0()).unwrap();
        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        e.advance(t0()).unwrap();
        assert!(e.session().badges.is_empty());
    }

    #[test]
    fn resume_from_rejects_foreign_current_step() {
        let registry = Arc::new(StepRegistry::handie_default());
        let mut session = engine(Role::Customer).into_session();
        session.current_step = "availability".into();
        assert!(StepEngine::resume_from(Arc::clone(&registry), session.clone()).is_err());

        session.current_step = "profile-setup".into();
        let e = StepEngine::resume_from(registry, session).unwrap();
        let nav = e.navigation();
        assert_eq!(nav.previous.as_deref(), Some("welcome"));
        assert_eq!(nav.next.as_deref(), Some("customer-location-setup"));
        assert_eq!(nav.position, 2);
    }

    #[test]
    fn view_reports_progress_and_recommendations() {
        let mut e = engine(Role::Customer);
        let view = e.view();
        assert_eq!(view.step.id, "welcome");
        assert!(!view.can_advance);
        assert!(!view.can_go_back);
        assert_eq!(view.total_steps, 5);
        assert_eq!(view.progress_percent, Some(0));
        // verification extras wait for the profile
        let ids: Vec<&str> = view.recommended_steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["preferences", "notifications", "privacy"]);

        e.update_answers("welcome", json!({"started": true}), t0()).unwrap();
        e.advance(t0()).unwrap();
        e.update_answers("profile-setup", profile(), t0()).unwrap();
        e.advance(t0()).unwrap();

        let view = e.view();
        assert_eq!(view.step.id, "customer-location-setup");
        assert_eq!(view.completed_steps, 2);
        assert_eq!(view.progress_percent, Some(40));
        assert_eq!(view.estimated_minutes_remaining, 3 + 3 + 1);
        assert_eq!(view.recommended_steps.len(), 5);
        assert_eq!(view.validation.errors.len(), 3);
    }

    /// intro, an optional extra, and a step that needs the extra.
    fn gated_engine() -> StepEngine {
        let registry = StepRegistry::builder()
            .core(StepDefinition::new("intro", "Intro", 1))
            .core(StepDefinition::new("extra", "Extra", 2).skippable())
            .core(StepDefinition::new("needs-extra", "Needs extra", 3).requires(&["extra"]))
            .role(Role::Customer)
            .badge(Badge::new(
                "perfectionist",
                "Perfectionist",
                "",
                "",
                crate::onboarding::model::BadgeCriteria::NoSkips,
            ))
            .build();
        StepEngine::start(Arc::new(registry), "u1", Role::Customer, t0()).unwrap()
    }

    #[test]
    fn skipping_a_prerequisite_is_refused() {
        let mut e = gated_engine();
        e.advance(t0()).unwrap();
        assert_eq!(e.session().current_step, "extra");
        assert!(!e.can_skip());
        assert!(e.can_advance());

        let before = e.session().clone();
        let t = e.skip(t0()).unwrap();
        assert_eq!(
            t,
            Transition::Refused {
                refusal: Refusal::Locked {
                    step_id: "needs-extra".into(),
                    missing: vec!["extra".into()],
                }
            }
        );
        assert_eq!(e.session(), &before);
        assert_eq!(e.session().status_of("extra"), StepStatus::Pending);

        let t = e.advance(t0()).unwrap();
        assert_eq!(
            t,
            Transition::Moved {
                from: "extra".into(),
                to: "needs-extra".into()
            }
        );
    }

    #[test]
    fn jump_to_locked_step_is_unreachable() {
        let mut e = gated_engine();
        let err = e.jump_to("needs-extra", t0()).unwrap_err();
        match err {
            StepError::Unreachable { reason, .. } => assert!(reason.contains("extra")),
            other => panic!("expected unreachable, got {other:?}"),
        }
        assert_eq!(e.session().current_step, "intro");
    }

    #[test]
    fn skipping_a_step_forfeits_perfectionist() {
        let registry = StepRegistry::builder()
            .core(StepDefinition::new("tour", "Tour", 1).skippable())
            .core(StepDefinition::new("intro", "Intro", 2))
            .role(Role::Customer)
            .badge(Badge::new(
                "perfectionist",
                "Perfectionist",
                "",
                "",
                crate::onboarding::model::BadgeCriteria::NoSkips,
            ))
            .build();
        let mut e = StepEngine::start(Arc::new(registry), "u1", Role::Customer, t0()).unwrap();
        assert!(e.session().skipped_steps().is_empty());

        assert!(matches!(e.skip(t0()).unwrap(), Transition::Moved { .. }));
        assert_eq!(e.session().status_of("tour"), StepStatus::Skipped);
        assert!(matches!(e.advance(t0()).unwrap(), Transition::Moved { .. }));
        assert_eq!(e.advance(t0()).unwrap(), Transition::Completed);
        assert!(!e.session().has_badge("perfectionist"));
    }

    #[test]
    fn transition_wire_shape() {
        let t = Transition::Refused {
            refusal: Refusal::ValidationFailed {
                step_id: "profile-setup".into(),
                errors: vec!["firstName is required".into()],
            },
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["kind"], "refused");
        assert_eq!(json["refusal"]["reason"], "validation_failed");
        assert_eq!(json["refusal"]["stepId"], "profile-setup");
    }
}
