//! The immutable catalog of onboarding steps, badges and
//! achievements.
//!
//! A registry is built once (see `catalog::handie_default` for the product
//! catalog), checked with `ensure_valid()` at startup, and shared as
//! `Arc<StepRegistry>` by every session. Rendering is not part of a step
//! definition; hosts map step ids to their own views.

use std::collections::{HashMap, HashSet};
use std::iter;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

use super::model::{Achievement, Badge, Role};
use super::rules::StepValidator;

/// Id of the role picker, pre-skipped when the role is known at session start.
pub const ROLE_SELECTION_STEP: &str = "role-selection";

/// Id of the terminal step every role ends with.
pub const COMPLETION_STEP: &str = "completion";

/// One screen of the wizard.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_time_minutes: u32,
    pub is_required: bool,
    pub is_skippable: bool,
    /// Sort key within the steps of a role.
    pub order: i32,
    /// Empty means every role.
    pub applicable_roles: Vec<Role>,
    /// Steps that must be completed before this one is reachable.
    pub prerequisites: Vec<String>,
    pub validator: StepValidator,
}

impl StepDefinition {
    pub fn new(id: impl Into<String>, title: impl Into<String>, order: i32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            estimated_time_minutes: 0,
            is_required: true,
            is_skippable: false,
            order,
            applicable_roles: Vec::new(),
            prerequisites: Vec::new(),
            validator: StepValidator::Always,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn estimate(mut self, minutes: u32) -> Self {
        self.estimated_time_minutes = minutes;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.is_skippable = true;
        self
    }

    /// Not required and skippable.
    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self.is_skippable = true;
        self
    }

    pub fn for_roles(mut self, roles: &[Role]) -> Self {
        self.applicable_roles = roles.to_vec();
        self
    }

    pub fn requires(mut self, step_ids: &[&str]) -> Self {
        self.prerequisites = step_ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn validated_by(mut self, validator: StepValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn applies_to(&self, role: Role) -> bool {
        self.applicable_roles.is_empty() || self.applicable_roles.contains(&role)
    }

    pub fn validate(&self, data: &Value) -> bool {
        self.validator.validate(data)
    }
}

/// Catalog group a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepGroup {
    Core,
    RoleSpecific,
    Optional,
    Verification,
    Completion,
}

/// Serializable view of a step for host views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_time_minutes: u32,
    pub is_required: bool,
    pub is_skippable: bool,
    pub order: i32,
}

impl From<&StepDefinition> for StepSummary {
    fn from(step: &StepDefinition) -> Self {
        Self {
            id: step.id.clone(),
            title: step.title.clone(),
            description: step.description.clone(),
            estimated_time_minutes: step.estimated_time_minutes,
            is_required: step.is_required,
            is_skippable: step.is_skippable,
            order: step.order,
        }
    }
}

/// Flow-level switches, read once at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSettings {
    pub allow_skip: bool,
    pub allow_pause: bool,
    pub show_progress: bool,
    pub enable_gamification: bool,
    pub auto_save: bool,
    #[serde(rename = "saveInterval")]
    pub save_interval_secs: u64,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self {
            allow_skip: true,
            allow_pause: true,
            show_progress: true,
            enable_gamification: true,
            auto_save: true,
            save_interval_secs: 30,
        }
    }
}

/// Completing `step_id` sets the achievement's progress to its maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementTrigger {
    pub achievement_id: String,
    pub step_id: String,
}

/// Result of the startup self-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Immutable catalog of steps partitioned into core, per-role, optional,
/// and verification groups, plus the terminal completion step.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    core: Vec<StepDefinition>,
    role_steps: HashMap<Role, Vec<StepDefinition>>,
    optional: Vec<StepDefinition>,
    verification: Vec<StepDefinition>,
    completion: StepDefinition,
    badges: Vec<Badge>,
    achievements: Vec<Achievement>,
    triggers: Vec<AchievementTrigger>,
    settings: OnboardingSettings,
}

impl StepRegistry {
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// Core steps, the role's steps, and the completion step, sorted by
    /// `order`. Ties keep declaration order.
    pub fn steps_for_role(&self, role: Role) -> Result<Vec<&StepDefinition>, ConfigError> {
        let role_steps = self
            .role_steps
            .get(&role)
            .ok_or_else(|| ConfigError::MissingRole {
                role: role.to_string(),
            })?;
        let mut steps: Vec<&StepDefinition> = self
            .core
            .iter()
            .chain(role_steps)
            .chain(iter::once(&self.completion))
            .collect();
        steps.sort_by_key(|s| s.order);
        Ok(steps)
    }

    /// Optional and verification steps that apply to the role.
    pub fn optional_steps_for_role(&self, role: Role) -> Vec<&StepDefinition> {
        self.optional
            .iter()
            .chain(&self.verification)
            .filter(|s| s.applies_to(role))
            .collect()
    }

    /// Find a step in any group visible to the role.
    pub fn step_by_id(&self, id: &str, role: Role) -> Option<&StepDefinition> {
        let role_steps = self.role_steps.get(&role).map(Vec::as_slice).unwrap_or(&[]);
        let extras = self
            .optional
            .iter()
            .chain(&self.verification)
            .filter(|s| s.applies_to(role));
        self.core
            .iter()
            .chain(role_steps)
            .chain(extras)
            .chain(iter::once(&self.completion))
            .find(|s| s.id == id)
    }

    pub fn group_of(&self, id: &str, role: Role) -> Option<StepGroup> {
        let in_group = |steps: &[StepDefinition]| steps.iter().any(|s| s.id == id);
        if in_group(&self.core) {
            Some(StepGroup::Core)
        } else if self.role_steps.get(&role).is_some_and(|steps| in_group(steps)) {
            Some(StepGroup::RoleSpecific)
        } else if in_group(&self.optional) {
            Some(StepGroup::Optional)
        } else if in_group(&self.verification) {
            Some(StepGroup::Verification)
        } else if self.completion.id == id {
            Some(StepGroup::Completion)
        } else {
            None
        }
    }

    pub fn position_of(&self, id: &str, role: Role) -> Option<usize> {
        self.steps_for_role(role)
            .ok()?
            .iter()
            .position(|s| s.id == id)
    }

    pub fn contains_step(&self, id: &str, role: Role) -> bool {
        self.position_of(id, role).is_some()
    }

    pub fn next_step(&self, current_id: &str, role: Role) -> Option<&StepDefinition> {
        let steps = self.steps_for_role(role).ok()?;
        let index = steps.iter().position(|s| s.id == current_id)?;
        steps.get(index + 1).copied()
    }

    pub fn previous_step(&self, current_id: &str, role: Role) -> Option<&StepDefinition> {
        let steps = self.steps_for_role(role).ok()?;
        let index = steps.iter().position(|s| s.id == current_id)?;
        index.checked_sub(1).and_then(|i| steps.get(i).copied())
    }

    /// Share of the role's steps found in `completed`, rounded to a percent.
    pub fn progress_percentage(&self, completed: &[&str], role: Role) -> u32 {
        let Ok(steps) = self.steps_for_role(role) else {
            return 0;
        };
        if steps.is_empty() {
            return 0;
        }
        let done = steps.iter().filter(|s| completed.contains(&s.id.as_str())).count();
        ((done as f64 / steps.len() as f64) * 100.0).round() as u32
    }

    /// Sum of estimates for the role's steps not in `completed`.
    pub fn estimated_minutes_remaining(&self, completed: &[&str], role: Role) -> u32 {
        self.steps_for_role(role)
            .map(|steps| {
                steps
                    .iter()
                    .filter(|s| !completed.contains(&s.id.as_str()))
                    .map(|s| s.estimated_time_minutes)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn completion_step(&self) -> &StepDefinition {
        &self.completion
    }

    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    pub fn badge(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|b| b.id == id)
    }

    pub fn achievements(&self) -> &[Achievement] {
        &self.achievements
    }

    pub fn achievement(&self, id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == id)
    }

    pub fn triggers(&self) -> &[AchievementTrigger] {
        &self.triggers
    }

    pub fn settings(&self) -> &OnboardingSettings {
        &self.settings
    }

    /// Same catalog with different flow settings.
    pub fn with_settings(mut self, settings: OnboardingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Self-check run at startup.
    pub fn validate_config(&self) -> ConfigReport {
        let errors: Vec<String> = self.config_errors().iter().map(|e| e.to_string()).collect();
        ConfigReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Fail-fast wrapper around `validate_config`.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let report = self.validate_config();
        if report.is_valid {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                errors: report.errors,
            })
        }
    }

    fn config_errors(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for role in Role::ALL {
            match self.role_steps.get(&role) {
                None => errors.push(ConfigError::MissingRole {
                    role: role.to_string(),
                }),
                Some(steps) if steps.is_empty() => errors.push(ConfigError::EmptyRole {
                    role: role.to_string(),
                }),
                Some(steps) => {
                    if let Some(last) = steps.iter().chain(&self.core).map(|s| s.order).max()
                        && last >= self.completion.order
                    {
                        errors.push(ConfigError::CompletionNotLast {
                            role: role.to_string(),
                            step_id: self.completion.id.clone(),
                        });
                    }
                }
            }
        }

        let role_steps = Role::ALL
            .iter()
            .filter_map(|role| self.role_steps.get(role))
            .flatten();
        let all_steps = self
            .core
            .iter()
            .chain(role_steps)
            .chain(&self.optional)
            .chain(&self.verification)
            .chain(iter::once(&self.completion));
        for id in duplicates(all_steps.map(|s| s.id.as_str())) {
            errors.push(ConfigError::DuplicateStepId { id });
        }

        for id in duplicates(self.badges.iter().map(|b| b.id.as_str())) {
            errors.push(ConfigError::DuplicateBadgeId { id });
        }

        for id in duplicates(self.achievements.iter().map(|a| a.id.as_str())) {
            errors.push(ConfigError::DuplicateAchievementId { id });
        }

        for trigger in &self.triggers {
            if self.achievement(&trigger.achievement_id).is_none() {
                errors.push(ConfigError::UnknownTriggerAchievement {
                    achievement_id: trigger.achievement_id.clone(),
                    step_id: trigger.step_id.clone(),
                });
            }
        }

        errors
    }
}

/// Ids seen more than once, each reported once, in first-repeat order.
fn duplicates<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut dups = Vec::new();
    for id in ids {
        if !seen.insert(id) && reported.insert(id) {
            dups.push(id.to_string());
        }
    }
    dups
}

/// Builder for `StepRegistry`. Building does not validate; call
/// `ensure_valid()` on the result.
#[derive(Debug, Default)]
pub struct StepRegistryBuilder {
    core: Vec<StepDefinition>,
    role_steps: HashMap<Role, Vec<StepDefinition>>,
    optional: Vec<StepDefinition>,
    verification: Vec<StepDefinition>,
    completion: Option<StepDefinition>,
    badges: Vec<Badge>,
    achievements: Vec<Achievement>,
    triggers: Vec<AchievementTrigger>,
    settings: OnboardingSettings,
}

impl StepRegistryBuilder {
    pub fn core(mut self, step: StepDefinition) -> Self {
        self.core.push(step);
        self
    }

    pub fn role_step(mut self, role: Role, step: StepDefinition) -> Self {
        self.role_steps.entry(role).or_default().push(step);
        self
    }

    /// Register a role with no role-specific steps yet.
    pub fn role(mut self, role: Role) -> Self {
        self.role_steps.entry(role).or_default();
        self
    }

    pub fn optional(mut self, step: StepDefinition) -> Self {
        self.optional.push(step);
        self
    }

    pub fn verification(mut self, step: StepDefinition) -> Self {
        self.verification.push(step);
        self
    }

    pub fn completion(mut self, step: StepDefinition) -> Self {
        self.completion = Some(step);
        self
    }

    pub fn badge(mut self, badge: Badge) -> Self {
        self.badges.push(badge);
        self
    }

    pub fn achievement(mut self, achievement: Achievement) -> Self {
        self.achievements.push(achievement);
        self
    }

    pub fn trigger(mut self, achievement_id: &str, step_id: &str) -> Self {
        self.triggers.push(AchievementTrigger {
            achievement_id: achievement_id.to_string(),
            step_id: step_id.to_string(),
        });
        self
    }

    pub fn settings(mut self, settings: OnboardingSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> StepRegistry {
        StepRegistry {
            core: self.core,
            role_steps: self.role_steps,
            optional: self.optional,
            verification: self.verification,
            completion: self.completion.unwrap_or_else(|| {
                StepDefinition::new(COMPLETION_STEP, "Setup Complete", 99).estimate(1)
            }),
            badges: self.badges,
            achievements: self.achievements,
            triggers: self.triggers,
            settings: self.settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::BadgeCriteria;

    fn small_registry() -> StepRegistry {
        StepRegistry::builder()
            .core(StepDefinition::new("welcome", "Welcome", 1).estimate(2))
            .core(StepDefinition::new("profile", "Profile", 3).estimate(5))
            .role_step(Role::Customer, StepDefinition::new("address", "Address", 4).estimate(3))
            .role_step(Role::Expert, StepDefinition::new("skills", "Skills", 2).estimate(4))
            .role_step(Role::Admin, StepDefinition::new("admin", "Admin", 4))
            .optional(StepDefinition::new("privacy", "Privacy", 9).optional())
            .verification(
                StepDefinition::new("id-check", "ID check", 10)
                    .optional()
                    .for_roles(&[Role::Expert]),
            )
            .build()
    }

    #[test]
    fn steps_are_sorted_with_completion_last() {
        let registry = small_registry();
        let ids: Vec<&str> = registry
            .steps_for_role(Role::Expert)
            .unwrap()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["welcome", "skills", "profile", COMPLETION_STEP]);
    }

    #[test]
    fn equal_order_keeps_declaration_order() {
        let registry = StepRegistry::builder()
            .core(StepDefinition::new("a", "A", 1))
            .core(StepDefinition::new("b", "B", 1))
            .role_step(Role::Customer, StepDefinition::new("c", "C", 1))
            .build();
        let ids: Vec<&str> = registry
            .steps_for_role(Role::Customer)
            .unwrap()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", COMPLETION_STEP]);
    }

    #[test]
    fn missing_role_is_a_config_error() {
        let registry = StepRegistry::builder()
            .role_step(Role::Customer, StepDefinition::new("c", "C", 1))
            .build();
        assert!(matches!(
            registry.steps_for_role(Role::Admin),
            Err(ConfigError::MissingRole { .. })
        ));
        assert!(registry.next_step("c", Role::Admin).is_none());
    }

    #[test]
    fn neighbours_stop_at_boundaries() {
        let registry = small_registry();
        assert_eq!(registry.next_step("welcome", Role::Customer).unwrap().id, "profile");
        assert_eq!(registry.previous_step("profile", Role::Customer).unwrap().id, "welcome");
        assert!(registry.previous_step("welcome", Role::Customer).is_none());
        assert!(registry.next_step(COMPLETION_STEP, Role::Customer).is_none());
        assert!(registry.next_step("nope", Role::Customer).is_none());
    }

    #[test]
    fn optional_steps_filter_by_role() {
        let registry = small_registry();
        let customer: Vec<&str> = registry
            .optional_steps_for_role(Role::Customer)
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(customer, vec!["privacy"]);
        assert_eq!(registry.optional_steps_for_role(Role::Expert).len(), 2);
    }

    #[test]
    fn step_lookup_spans_all_groups_for_role() {
        let registry = small_registry();
        assert!(registry.step_by_id("privacy", Role::Customer).is_some());
        assert!(registry.step_by_id(COMPLETION_STEP, Role::Customer).is_some());
        assert!(registry.step_by_id("skills", Role::Customer).is_none());
        assert!(registry.step_by_id("skills", Role::Expert).is_some());
        assert!(registry.step_by_id("id-check", Role::Customer).is_none());
        assert_eq!(registry.group_of("skills", Role::Expert), Some(StepGroup::RoleSpecific));
        assert_eq!(registry.group_of("id-check", Role::Expert), Some(StepGroup::Verification));
        assert_eq!(registry.group_of(COMPLETION_STEP, Role::Admin), Some(StepGroup::Completion));
        assert_eq!(registry.group_of("skills", Role::Customer), None);
    }

    #[test]
    fn progress_and_remaining_time() {
        let registry = small_registry();
        // welcome, profile, address, completion
        assert_eq!(registry.progress_percentage(&["welcome"], Role::Customer), 25);
        assert_eq!(registry.progress_percentage(&[], Role::Customer), 0);
        assert_eq!(
            registry.estimated_minutes_remaining(&["welcome"], Role::Customer),
            5 + 3 + 1
        );
    }

    #[test]
    fn valid_registry_passes_self_check() {
        let report = small_registry().validate_config();
        assert!(report.is_valid, "{:?}", report.errors);
        assert!(small_registry().ensure_valid().is_ok());
    }

    #[test]
    fn self_check_reports_every_problem() {
        let registry = StepRegistry::builder()
            .core(StepDefinition::new("welcome", "Welcome", 1))
            .role_step(Role::Customer, StepDefinition::new("welcome", "Again", 2))
            .role(Role::Expert)
            .optional(StepDefinition::new("late", "Late", 120))
            .badge(Badge::new("fast", "Fast", "", "", BadgeCriteria::NoSkips))
            .badge(Badge::new("fast", "Fast", "", "", BadgeCriteria::NoSkips))
            .trigger("ghost", "welcome")
            .build();

        let report = registry.validate_config();
        assert!(!report.is_valid);
        let joined = report.errors.join("\n");
        assert!(joined.contains("Role expert has no role-specific steps"));
        assert!(joined.contains("No steps configured for role admin"));
        assert!(joined.contains("Duplicate step id: welcome"));
        assert!(joined.contains("Duplicate badge id: fast"));
        assert!(joined.contains("unknown achievement ghost"));

        let err = registry.ensure_valid().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn completion_must_sort_last() {
        let registry = StepRegistry::builder()
            .core(StepDefinition::new("welcome", "Welcome", 1))
            .role_step(Role::Customer, StepDefinition::new("late", "Late", 150))
            .role_step(Role::Expert, StepDefinition::new("e", "E", 2))
            .role_step(Role::Admin, StepDefinition::new("a", "A", 2))
            .build();
        let report = registry.validate_config();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("customer"));
    }
}
