//! Role-dependent, resumable multi-step onboarding wizard.
//!
//! A `StepRegistry` describes the steps each role walks through. A
//! `StepEngine` drives one user's `OnboardingSession` through those steps,
//! validating answers, honouring skip and pause rules, and awarding badges.
//! The `OnboardingManager` hosts engines per user and syncs them with a
//! `ProfileStore`.

pub mod catalog;
pub mod engine;
pub mod gamification;
pub mod manager;
pub mod model;
pub mod registry;
pub mod routes;
pub mod rules;
pub mod session;

pub use engine::{Navigation, Refusal, StepEngine, StepView, Transition};
pub use gamification::GamificationUpdate;
pub use manager::{
    DispatchOutcome, FlowAction, OnboardingManager, SyncStatus, spawn_autosave_task,
};
pub use model::{
    Achievement, Badge, BadgeCriteria, OnboardingSession, Role, StepProgress, StepStatus,
};
pub use registry::{
    AchievementTrigger, ConfigReport, OnboardingSettings, StepDefinition, StepGroup, StepRegistry,
};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use rules::{StepValidator, ValidationResult};
pub use session::{SessionAction, reduce};
