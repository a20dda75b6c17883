//! `OnboardingManager` hosts one `StepEngine` per user and syncs it with
//! the profile store.
//!
//! Transitions always commit in memory first. Saving is best-effort: a
//! failed save is reported back as `SyncStatus::Failed` and the local
//! session stays the source of truth until the next successful sync.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, StepError};
use crate::store::{ProfileStore, UserRecord};

use super::engine::{StepEngine, StepView, Transition};
use super::model::{OnboardingSession, Role};
use super::registry::StepRegistry;

/// A navigation or data-entry request from the host view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FlowAction {
    Advance,
    Retreat,
    Skip,
    Pause,
    Resume,
    JumpTo { step_id: String },
    UpdateAnswers { step_id: String, data: Value },
}

/// Outcome of the last sync attempt for a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Saved,
    /// Local changes waiting for the next auto-save or checkpoint.
    Unsaved,
    Failed { retryable: bool, message: String },
}

impl SyncStatus {
    fn failed(e: &PersistenceError) -> Self {
        Self::Failed {
            retryable: true,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub transition: Transition,
    pub view: StepView,
    pub sync: SyncStatus,
    /// Set once the finished session has been finalized with the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,
}

/// In-memory state of one user's flow.
#[derive(Debug)]
pub struct OnboardingFlow {
    engine: StepEngine,
    /// Changed since the last successful save.
    dirty: bool,
    /// Completion has been recorded with the store.
    finalized: bool,
}

impl OnboardingFlow {
    pub fn session(&self) -> &OnboardingSession {
        self.engine.session()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Complete locally but not yet recorded on the user's account.
    fn needs_finalize(&self) -> bool {
        self.session().is_complete() && !self.finalized
    }
}

pub struct OnboardingManager {
    registry: Arc<StepRegistry>,
    store: Arc<dyn ProfileStore>,
    flows: RwLock<HashMap<String, Arc<Mutex<OnboardingFlow>>>>,
}

impl OnboardingManager {
    pub fn new(registry: Arc<StepRegistry>, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            registry,
            store,
            flows: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    async fn flow(&self, user_id: &str) -> Result<Arc<Mutex<OnboardingFlow>>, StepError> {
        self.flows
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StepError::UnknownSession {
                user_id: user_id.to_string(),
            })
    }

    /// Open the user's flow: the in-memory one if present, else the saved
    /// snapshot, else a fresh session.
    pub async fn start(&self, user_id: &str, role: Role) -> Result<StepView, StepError> {
        if let Ok(existing) = self.flow(user_id).await {
            let flow = existing.lock().await;
            if flow.session().role == role {
                return Ok(flow.engine.view());
            }
            warn!(user_id = %user_id, role = %role, "Role changed; discarding in-memory session");
        }

        let flow = self.open(user_id, role).await?;
        let view = flow.engine.view();
        self.flows
            .write()
            .await
            .insert(user_id.to_string(), Arc::new(Mutex::new(flow)));
        Ok(view)
    }

    async fn open(&self, user_id: &str, role: Role) -> Result<OnboardingFlow, StepError> {
        let snapshot = match self.store.load(user_id).await {
            Ok(Some(snapshot)) if snapshot.role == role => Some(snapshot),
            Ok(Some(snapshot)) => {
                warn!(
                    user_id = %user_id,
                    stored_role = %snapshot.role,
                    role = %role,
                    "Saved session has a different role, starting fresh"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to load saved session, starting fresh");
                None
            }
        };

        if let Some(snapshot) = snapshot {
            let finalized = snapshot.is_complete() && self.account_finalized(user_id).await;
            match StepEngine::resume_from(Arc::clone(&self.registry), snapshot) {
                Ok(engine) => {
                    info!(
                        user_id = %user_id,
                        step_id = %engine.session().current_step,
                        "Onboarding session resumed"
                    );
                    let mut flow = OnboardingFlow {
                        engine,
                        dirty: false,
                        finalized,
                    };
                    flow.dirty = flow.needs_finalize();
                    return Ok(flow);
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Saved session is invalid, starting fresh");
                }
            }
        }

        let engine = StepEngine::start(Arc::clone(&self.registry), user_id, role, Utc::now())?;
        info!(user_id = %user_id, role = %role, session_id = %engine.session().id, "Onboarding session started");
        Ok(OnboardingFlow {
            engine,
            dirty: true,
            finalized: false,
        })
    }

    /// Whether the store has the user's onboarding marked complete. An
    /// unreadable record counts as not finalized.
    async fn account_finalized(&self, user_id: &str) -> bool {
        match self.store.user(user_id).await {
            Ok(record) => record.is_some_and(|r| r.onboarding_completed),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read user record");
                false
            }
        }
    }

    /// Apply one action to the user's flow, then sync.
    ///
    /// Navigation is checkpointed immediately when auto-save is on. Answer
    /// edits are left for the auto-save interval. A finished flow that has
    /// not been finalized retries finalization on every action.
    pub async fn dispatch(
        &self,
        user_id: &str,
        action: FlowAction,
    ) -> Result<DispatchOutcome, StepError> {
        let flow = self.flow(user_id).await?;
        let mut flow = flow.lock().await;
        let now = Utc::now();

        let navigation = !matches!(action, FlowAction::UpdateAnswers { .. });
        let transition = match action {
            FlowAction::Advance => flow.engine.advance(now)?,
            FlowAction::Retreat => flow.engine.retreat(now)?,
            FlowAction::Skip => flow.engine.skip(now)?,
            FlowAction::Pause => flow.engine.pause(now)?,
            FlowAction::Resume => flow.engine.resume(now)?,
            FlowAction::JumpTo { step_id } => flow.engine.jump_to(&step_id, now)?,
            FlowAction::UpdateAnswers { step_id, data } => {
                flow.engine.update_answers(&step_id, data, now)?
            }
        };
        debug!(user_id = %user_id, transition = ?transition, "Dispatched onboarding action");

        if !transition.is_refused() {
            flow.dirty = true;
        }

        let mut user = None;
        let sync = if flow.needs_finalize() {
            let (sync, record) = self.finalize_flow(user_id, &mut flow).await;
            user = record;
            sync
        } else if navigation && flow.dirty && self.registry.settings().auto_save {
            self.save_flow(user_id, &mut flow).await
        } else if flow.dirty {
            SyncStatus::Unsaved
        } else {
            SyncStatus::Saved
        };

        Ok(DispatchOutcome {
            transition,
            view: flow.engine.view(),
            sync,
            user,
        })
    }

    async fn save_flow(&self, user_id: &str, flow: &mut OnboardingFlow) -> SyncStatus {
        match self.store.save(user_id, flow.session()).await {
            Ok(()) => {
                flow.dirty = false;
                SyncStatus::Saved
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Failed to save onboarding session"
                );
                SyncStatus::failed(&e)
            }
        }
    }

    async fn finalize_flow(
        &self,
        user_id: &str,
        flow: &mut OnboardingFlow,
    ) -> (SyncStatus, Option<UserRecord>) {
        if let SyncStatus::Failed { retryable, message } = self.save_flow(user_id, flow).await {
            return (SyncStatus::Failed { retryable, message }, None);
        }
        match self.store.finalize(user_id, flow.session()).await {
            Ok(record) => {
                flow.finalized = true;
                (SyncStatus::Saved, Some(record))
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to finalize onboarding");
                flow.dirty = true;
                (SyncStatus::failed(&e), None)
            }
        }
    }

    /// Save now, finalizing a completed session that has not been
    /// finalized yet. Used for explicit retries.
    pub async fn checkpoint(&self, user_id: &str) -> Result<DispatchOutcome, StepError> {
        let flow = self.flow(user_id).await?;
        let mut flow = flow.lock().await;

        let (sync, user) = if flow.needs_finalize() {
            self.finalize_flow(user_id, &mut flow).await
        } else {
            (self.save_flow(user_id, &mut flow).await, None)
        };

        Ok(DispatchOutcome {
            transition: Transition::Stayed,
            view: flow.engine.view(),
            sync,
            user,
        })
    }

    /// Save every flow with unsaved changes. Returns how many were saved.
    pub async fn flush_dirty(&self) -> usize {
        let flows: Vec<(String, Arc<Mutex<OnboardingFlow>>)> = self
            .flows
            .read()
            .await
            .iter()
            .map(|(id, flow)| (id.clone(), Arc::clone(flow)))
            .collect();

        let mut saved = 0;
        for (user_id, flow) in flows {
            let mut flow = flow.lock().await;
            if !flow.dirty && !flow.needs_finalize() {
                continue;
            }
            let sync = if flow.needs_finalize() {
                self.finalize_flow(&user_id, &mut flow).await.0
            } else {
                self.save_flow(&user_id, &mut flow).await
            };
            if sync == SyncStatus::Saved {
                saved += 1;
            }
        }
        if saved > 0 {
            debug!(count = saved, "Auto-saved onboarding sessions");
        }
        saved
    }

    pub async fn view(&self, user_id: &str) -> Result<StepView, StepError> {
        let flow = self.flow(user_id).await?;
        let flow = flow.lock().await;
        Ok(flow.engine.view())
    }

    /// Drop the in-memory flow and the saved state.
    pub async fn reset(&self, user_id: &str) -> Result<bool, PersistenceError> {
        let dropped = self.flows.write().await.remove(user_id).is_some();
        let removed = self.store.reset(user_id).await?;
        info!(user_id = %user_id, "Onboarding reset");
        Ok(dropped || removed)
    }

    /// Forget the in-memory flow; saved state is kept for resumption.
    pub async fn discard(&self, user_id: &str) -> bool {
        self.flows.write().await.remove(user_id).is_some()
    }
}

/// Periodically save flows with unsaved changes.
pub fn spawn_autosave_task(
    manager: Arc<OnboardingManager>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            manager.flush_dirty().await;
        }
    })
}
