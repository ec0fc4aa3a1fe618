//! Plan executor for applying plans.
//!
//! Actions run strictly one after another in plan order. A failed action
//! fails its dependents without running them.

use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::config::StackConfig;
use crate::error::{ReconcileError, Result, TgwError};
use crate::reconciler::ResourceData;
use crate::state::{HistoryEntry, ResourceState, StackState};

use super::diff::ResourceType;
use super::plan::{ActionType, ApplyPlan, PlannedAction};
use super::refresh::StackReconcilers;

/// Executor for apply plans.
pub struct PlanExecutor<'a> {
    /// Reconcilers for both resource kinds.
    reconcilers: &'a StackReconcilers,
    /// Stack declarations.
    config: &'a StackConfig,
    /// Whether to continue on errors.
    continue_on_error: bool,
}

/// Outcome of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// The action converged.
    Succeeded,
    /// The action failed.
    Failed,
    /// A dependency failed; the action did not run.
    Skipped,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: PlannedAction,
    /// Outcome.
    pub status: ActionStatus,
    /// Remote identifier involved, if any.
    pub resource_id: Option<String>,
    /// Error message (if failed or skipped).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions.
    pub skipped: usize,
    /// Number of actions never reached after a stop.
    pub not_run: usize,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(reconcilers: &'a StackReconcilers, config: &'a StackConfig) -> Self {
        Self {
            reconcilers,
            config,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes a plan, recording every outcome in `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan violates guardrails. Action failures are
    /// reported in the result instead.
    pub async fn execute(&self, plan: &ApplyPlan, state: &mut StackState) -> Result<ExecutionResult> {
        if !plan.passes_guardrails {
            error!("Plan does not pass guardrails");
            for violation in &plan.guardrail_violations {
                error!("  - {violation}");
            }
            return Err(TgwError::Reconcile(ReconcileError::Aborted {
                reason: plan.guardrail_violations.join("; "),
            }));
        }

        info!("Executing plan with {} actions", plan.actions.len());

        let mut results = Vec::new();
        let mut unsuccessful: HashSet<usize> = HashSet::new();

        for (index, action) in plan.actions.iter().enumerate() {
            if action.dependencies.iter().any(|dep| unsuccessful.contains(dep)) {
                warn!("Skipping {} due to failed dependencies", action.address());
                unsuccessful.insert(index);
                results.push(ActionResult {
                    index,
                    action: action.clone(),
                    status: ActionStatus::Skipped,
                    resource_id: action.resource_id.clone(),
                    error: Some(String::from("dependency failed")),
                });
                continue;
            }

            info!("Executing action {index}: {}", action.description());
            let result = match action.action_type {
                ActionType::Create => self.execute_create(index, action, state).await,
                ActionType::Delete => self.execute_delete(index, action, state).await,
            };

            let failed = result.status == ActionStatus::Failed;
            if failed {
                unsuccessful.insert(index);
            }
            results.push(result);

            if failed && !self.continue_on_error {
                break;
            }
        }

        let count = |status| results.iter().filter(|r| r.status == status).count();
        let execution = ExecutionResult {
            successful: count(ActionStatus::Succeeded),
            failed: count(ActionStatus::Failed),
            skipped: count(ActionStatus::Skipped),
            not_run: plan.actions.len() - results.len(),
            results,
        };

        let resources = plan.actions.iter().map(PlannedAction::address).collect();
        let entry = if execution.all_successful() {
            HistoryEntry::new(plan.operation, resources)
        } else {
            HistoryEntry::failed(
                plan.operation,
                resources,
                &format!("{} actions failed", execution.failed),
            )
        };
        state.add_history(entry);

        Ok(execution)
    }

    async fn execute_create(
        &self,
        index: usize,
        action: &PlannedAction,
        state: &mut StackState,
    ) -> ActionResult {
        let name = action.resource_name.as_str();
        let hash = action.new_hash.as_deref().unwrap_or_default();

        match action.resource_type {
            ResourceType::Attachment => {
                let Some(declared) = self.config.find_attachment(name) else {
                    return ActionResult::failed(index, action, None, "not declared");
                };

                let mut data = ResourceData::new();
                let outcome = self
                    .reconcilers
                    .attachments
                    .create(&declared.to_spec(), &mut data)
                    .await;

                match (outcome, data.id, data.attributes) {
                    (Ok(()), Some(id), Some(attributes)) => {
                        state.set_attachment(
                            ResourceState::new(name, &id, hash).with_attributes(attributes),
                        );
                        info!("Created attachment {name} ({id})");
                        ActionResult::succeeded(index, action, Some(id))
                    }
                    (outcome, id, _) => {
                        if let Some(id) = &id {
                            warn!("Attachment {name} ({id}) did not converge, recording as tainted");
                            state.set_attachment(ResourceState::new(name, id, hash));
                        }
                        let message = outcome.err().map_or_else(
                            || String::from("create returned no identifier"),
                            |e| e.to_string(),
                        );
                        error!("Failed to create attachment {name}: {message}");
                        ActionResult::failed(index, action, id, &message)
                    }
                }
            }
            ResourceType::Peer => {
                let Some(declared) = self.config.find_peer(name) else {
                    return ActionResult::failed(index, action, None, "not declared");
                };

                let attachment_id = match &declared.attachment {
                    Some(attachment) => match state.attachment_id(attachment) {
                        Some(id) => Some(id.to_string()),
                        None => {
                            let message =
                                format!("attachment '{attachment}' has no identifier in state");
                            return ActionResult::failed(index, action, None, &message);
                        }
                    },
                    None => None,
                };

                let mut data = ResourceData::new();
                let outcome = self
                    .reconcilers
                    .peers
                    .create(&declared.to_spec(attachment_id.as_deref()), &mut data)
                    .await;

                match (outcome, data.id, data.attributes) {
                    (Ok(()), Some(id), Some(attributes)) => {
                        state.set_peer(
                            ResourceState::new(name, &id, hash)
                                .with_attributes(attributes)
                                .with_attachment(declared.attachment.clone()),
                        );
                        info!("Created peer {name} ({id})");
                        ActionResult::succeeded(index, action, Some(id))
                    }
                    (outcome, id, _) => {
                        if let Some(id) = &id {
                            warn!("Peer {name} ({id}) did not converge, recording as tainted");
                            state.set_peer(
                                ResourceState::new(name, id, hash)
                                    .with_attachment(declared.attachment.clone()),
                            );
                        }
                        let message = outcome.err().map_or_else(
                            || String::from("create returned no identifier"),
                            |e| e.to_string(),
                        );
                        error!("Failed to create peer {name}: {message}");
                        ActionResult::failed(index, action, id, &message)
                    }
                }
            }
        }
    }

    async fn execute_delete(
        &self,
        index: usize,
        action: &PlannedAction,
        state: &mut StackState,
    ) -> ActionResult {
        let name = action.resource_name.as_str();

        let recorded = match action.resource_type {
            ResourceType::Attachment => state.attachment_id(name).map(str::to_string),
            ResourceType::Peer => state.peers.get(name).map(|p| p.id.clone()),
        };
        let Some(id) = action.resource_id.clone().or(recorded) else {
            debug!("No identifier recorded for {}, nothing to delete", action.address());
            return ActionResult::succeeded(index, action, None);
        };

        let outcome = match action.resource_type {
            ResourceType::Attachment => {
                let mut data = ResourceData::with_id(id.clone());
                self.reconcilers.attachments.delete(&mut data).await
            }
            ResourceType::Peer => {
                let mut data = ResourceData::with_id(id.clone());
                self.reconcilers.peers.delete(&mut data).await
            }
        };

        match outcome {
            Ok(()) => {
                match action.resource_type {
                    ResourceType::Attachment => {
                        state.remove_attachment(name);
                    }
                    ResourceType::Peer => {
                        state.remove_peer(name);
                    }
                }
                info!("Deleted {} ({id})", action.address());
                ActionResult::succeeded(index, action, Some(id))
            }
            Err(e) => {
                error!("Failed to delete {}: {e}", action.address());
                ActionResult::failed(index, action, Some(id), &e.to_string())
            }
        }
    }
}

impl ActionResult {
    fn succeeded(index: usize, action: &PlannedAction, resource_id: Option<String>) -> Self {
        Self {
            index,
            action: action.clone(),
            status: ActionStatus::Succeeded,
            resource_id,
            error: None,
        }
    }

    fn failed(
        index: usize,
        action: &PlannedAction,
        resource_id: Option<String>,
        error: &str,
    ) -> Self {
        Self {
            index,
            action: action.clone(),
            status: ActionStatus::Failed,
            resource_id,
            error: Some(error.to_string()),
        }
    }
}

impl ExecutionResult {
    /// Returns true if every planned action ran and succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.not_run == 0
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.results.len(),
            self.successful,
            self.failed,
            self.skipped
        )?;
        if self.not_run > 0 {
            write!(f, ", {} not run", self.not_run)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::{self, ScriptedGateway};
    use crate::error::GatewayError;
    use crate::gateway::{AttachmentState, PeerState};
    use crate::planner::DiffEngine;
    use crate::planner::diff::tests::{config, converged_state};
    use crate::state::StateOperation;
    use std::sync::Arc;

    const ATTACHMENT_ID: &str = "tgw-attach-connect-1";
    const PEER_ID: &str = "tgw-connect-peer-1";

    fn plan_for(config: &StackConfig, state: &StackState) -> ApplyPlan {
        let diff = DiffEngine::new().compute_diff(config, state);
        ApplyPlan::from_diff(&diff, config, state)
    }

    fn creating_gateway() -> ScriptedGateway {
        ScriptedGateway::new()
            .on_create_attachment(Ok(fake::attachment(ATTACHMENT_ID, AttachmentState::Pending)))
            .with_attachment_states(ATTACHMENT_ID, &[AttachmentState::Available])
            .on_create_peer(Ok(fake::peer(PEER_ID, PeerState::Pending)))
            .with_peer_states(PEER_ID, &[PeerState::Available])
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_creates_attachment_then_peer() {
        let config = config();
        let mut state = StackState::new("edge-network");
        let gateway = Arc::new(creating_gateway());
        let reconcilers = StackReconcilers::new(gateway.clone(), &config);
        let plan = plan_for(&config, &state);

        let result = PlanExecutor::new(&reconcilers, &config)
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(result.all_successful());
        assert_eq!(result.successful, 2);
        assert_eq!(state.attachment_id("edge"), Some(ATTACHMENT_ID));
        assert_eq!(state.peers["edge-peer"].id, PEER_ID);
        assert_eq!(state.peers["edge-peer"].attachment.as_deref(), Some("edge"));
        assert_eq!(
            state.attachments["edge"].spec_hash,
            plan.actions[0].new_hash.clone().unwrap()
        );
        assert_eq!(
            gateway.peer_requests()[0].transit_gateway_attachment_id,
            ATTACHMENT_ID
        );
        assert_eq!(state.history.last().unwrap().operation, StateOperation::Apply);
        assert!(state.history.last().unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_create_is_tainted_and_dependents_skipped() {
        let config = config();
        let mut state = StackState::new("edge-network");
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on_create_attachment(Ok(fake::attachment(ATTACHMENT_ID, AttachmentState::Pending)))
                .with_attachment_states(ATTACHMENT_ID, &[AttachmentState::Failed]),
        );
        let reconcilers = StackReconcilers::new(gateway.clone(), &config);
        let plan = plan_for(&config, &state);

        let result = PlanExecutor::new(&reconcilers, &config)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.results[1].status, ActionStatus::Skipped);
        assert!(state.attachments["edge"].is_tainted());
        assert!(state.peers.is_empty());
        assert!(!gateway.calls().contains(&String::from("create_peer")));
        assert!(!state.history.last().unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_failure_by_default() {
        let config = config();
        let mut state = StackState::new("edge-network");
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on_create_attachment(Err(GatewayError::api("InvalidParameterValue", "bad"))),
        );
        let reconcilers = StackReconcilers::new(gateway, &config);
        let plan = plan_for(&config, &state);

        let result = PlanExecutor::new(&reconcilers, &config)
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.not_run, 1);
        assert!(!result.all_successful());
        assert!(state.is_empty());
        assert!(
            result.results[0]
                .error
                .as_deref()
                .unwrap()
                .contains("InvalidParameterValue")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_removes_everything() {
        let config = config();
        let mut state = converged_state(&config);
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on_delete_peer(Ok(()))
                .with_peer_states(PEER_ID, &[PeerState::Deleting, PeerState::Deleted])
                .on_delete_attachment(Ok(()))
                .on_describe_attachments(Ok(vec![])),
        );
        let reconcilers = StackReconcilers::new(gateway.clone(), &config);
        let plan = ApplyPlan::destroy(&state, false);

        let result = PlanExecutor::new(&reconcilers, &config)
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert!(result.all_successful());
        assert!(state.is_empty());
        let calls = gateway.calls();
        let peer_delete = calls.iter().position(|c| c == "delete_peer tgw-connect-peer-1");
        let attachment_delete = calls
            .iter()
            .position(|c| c == "delete_attachment tgw-attach-connect-1");
        assert!(peer_delete.unwrap() < attachment_delete.unwrap());
    }

    #[tokio::test]
    async fn test_guardrail_violation_aborts() {
        let config = config();
        let mut state = converged_state(&config);
        let reconcilers = StackReconcilers::new(Arc::new(ScriptedGateway::new()), &config);
        let plan = ApplyPlan::destroy(&state, true);

        let err = PlanExecutor::new(&reconcilers, &config)
            .execute(&plan, &mut state)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TgwError::Reconcile(ReconcileError::Aborted { .. })
        ));
        assert_eq!(state.resource_count(), 2);
    }
}
