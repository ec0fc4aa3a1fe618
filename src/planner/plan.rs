//! Apply plan types and construction.
//!
//! Ordering is fixed: peer deletes, attachment deletes, attachment creates,
//! peer creates. A replacement is a delete followed by a create of the same
//! resource, the create depending on the delete.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::config::StackConfig;
use crate::state::{StackState, StateOperation};

use super::diff::{DiffResult, DiffType, ResourceDiff, ResourceType};

/// A complete apply plan.
#[derive(Debug)]
pub struct ApplyPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// What the plan is recorded as in the history.
    pub operation: StateOperation,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
    /// Changes that need attention but have no action.
    pub warnings: Vec<String>,
    /// Whether the plan passes guardrails.
    pub passes_guardrails: bool,
    /// Guardrail violations (if any).
    pub guardrail_violations: Vec<String>,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Resource kind.
    pub resource_type: ResourceType,
    /// Declared name.
    pub resource_name: String,
    /// Remote identifier (deletes only).
    pub resource_id: Option<String>,
    /// Reason for this action.
    pub reason: String,
    /// Declaration hash recorded after a create.
    pub new_hash: Option<String>,
    /// Indices of actions that must succeed first.
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create the resource and wait for it to become available.
    Create,
    /// Delete the resource and wait for it to disappear.
    Delete,
}

/// Accumulates actions while remembering where each landed.
#[derive(Default)]
struct Builder {
    actions: Vec<PlannedAction>,
    deletes: HashMap<(ResourceType, String), usize>,
    creates: HashMap<(ResourceType, String), usize>,
}

impl Builder {
    fn delete(&mut self, diff: &ResourceDiff, reason: String, dependencies: Vec<usize>) -> usize {
        let index = self.actions.len();
        self.actions.push(PlannedAction {
            action_type: ActionType::Delete,
            resource_type: diff.resource_type,
            resource_name: diff.name.clone(),
            resource_id: diff.id.clone(),
            reason,
            new_hash: None,
            dependencies,
        });
        self.deletes
            .insert((diff.resource_type, diff.name.clone()), index);
        index
    }

    fn create(&mut self, diff: &ResourceDiff, reason: String, mut dependencies: Vec<usize>) {
        if let Some(delete) = self.deletes.get(&(diff.resource_type, diff.name.clone())) {
            dependencies.insert(0, *delete);
        }
        let index = self.actions.len();
        self.actions.push(PlannedAction {
            action_type: ActionType::Create,
            resource_type: diff.resource_type,
            resource_name: diff.name.clone(),
            resource_id: None,
            reason,
            new_hash: diff.new_hash.clone(),
            dependencies,
        });
        self.creates
            .insert((diff.resource_type, diff.name.clone()), index);
    }
}

fn replacement_reason(diff: &ResourceDiff) -> String {
    match diff.diff_type {
        DiffType::Update => String::from("declaration changed"),
        DiffType::Drift => {
            let fields: Vec<&str> = diff.details.iter().map(|d| d.field.as_str()).collect();
            format!("remote drift on {}", fields.join(", "))
        }
        DiffType::Tainted => String::from("previous create did not converge"),
        _ => diff.diff_type.to_string(),
    }
}

impl ApplyPlan {
    /// Creates a plan from a diff result.
    ///
    /// Peers declared over a replaced attachment are replaced with it.
    #[must_use]
    pub fn from_diff(diff: &DiffResult, config: &StackConfig, state: &StackState) -> Self {
        let replaced_attachments: HashSet<&str> = diff
            .diffs
            .iter()
            .filter(|d| d.resource_type == ResourceType::Attachment)
            .filter(|d| d.diff_type.requires_replacement())
            .map(|d| d.name.as_str())
            .collect();

        // Peers to replace, with the reason
        let mut peer_replacements: Vec<(&ResourceDiff, String)> = Vec::new();
        for d in diff.diffs.iter().filter(|d| d.resource_type == ResourceType::Peer) {
            if d.diff_type.requires_replacement() {
                peer_replacements.push((d, replacement_reason(d)));
            } else if matches!(d.diff_type, DiffType::NoChange | DiffType::TagDrift) {
                let parent = config
                    .find_peer(&d.name)
                    .and_then(|p| p.attachment.as_deref())
                    .filter(|a| replaced_attachments.contains(a));
                if let Some(parent) = parent {
                    peer_replacements.push((d, format!("attachment '{parent}' is replaced")));
                }
            }
        }

        let of_type = |resource_type: ResourceType, diff_type: DiffType| {
            diff.diffs
                .iter()
                .filter(move |d| d.resource_type == resource_type && d.diff_type == diff_type)
        };

        let mut builder = Builder::default();

        for d in of_type(ResourceType::Peer, DiffType::Delete) {
            builder.delete(d, String::from("removed from configuration"), vec![]);
        }
        for (d, reason) in &peer_replacements {
            builder.delete(d, format!("replacing: {reason}"), vec![]);
        }

        let attachment_replacements: Vec<&ResourceDiff> = diff
            .diffs
            .iter()
            .filter(|d| d.resource_type == ResourceType::Attachment)
            .filter(|d| d.diff_type.requires_replacement())
            .collect();

        for d in of_type(ResourceType::Attachment, DiffType::Delete) {
            let deps = Self::peer_delete_dependencies(&builder, state, &d.name);
            builder.delete(d, String::from("removed from configuration"), deps);
        }
        for d in &attachment_replacements {
            let deps = Self::peer_delete_dependencies(&builder, state, &d.name);
            builder.delete(d, format!("replacing: {}", replacement_reason(d)), deps);
        }

        for d in of_type(ResourceType::Attachment, DiffType::Create) {
            builder.create(d, String::from("declared in configuration"), vec![]);
        }
        for d in &attachment_replacements {
            builder.create(d, format!("replacing: {}", replacement_reason(d)), vec![]);
        }

        let peer_creates = of_type(ResourceType::Peer, DiffType::Create)
            .map(|d| (d, String::from("declared in configuration")))
            .chain(
                peer_replacements
                    .iter()
                    .map(|(d, reason)| (*d, format!("replacing: {reason}"))),
            );
        for (d, reason) in peer_creates {
            let deps: Vec<usize> = config
                .find_peer(&d.name)
                .and_then(|p| p.attachment.as_ref())
                .and_then(|a| builder.creates.get(&(ResourceType::Attachment, a.clone())))
                .copied()
                .into_iter()
                .collect();
            builder.create(d, reason, deps);
        }

        let warnings = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::TagDrift)
            .map(|d| {
                format!(
                    "{} tags differ from the declaration and cannot be updated in place",
                    d.address()
                )
            })
            .collect();

        Self::finish(
            StateOperation::Apply,
            builder.actions,
            warnings,
            config.guardrails.prevent_destroy,
        )
    }

    /// Creates a plan that deletes every recorded resource.
    #[must_use]
    pub fn destroy(state: &StackState, prevent_destroy: bool) -> Self {
        let mut builder = Builder::default();

        for entry in state.peers.values() {
            let diff = ResourceDiff::recorded(ResourceType::Peer, &entry.name, &entry.id);
            builder.delete(&diff, String::from("destroy"), vec![]);
        }
        for entry in state.attachments.values() {
            let diff = ResourceDiff::recorded(ResourceType::Attachment, &entry.name, &entry.id);
            let deps = Self::peer_delete_dependencies(&builder, state, &entry.name);
            builder.delete(&diff, String::from("destroy"), deps);
        }

        Self::finish(
            StateOperation::Destroy,
            builder.actions,
            vec![],
            prevent_destroy,
        )
    }

    fn peer_delete_dependencies(builder: &Builder, state: &StackState, attachment: &str) -> Vec<usize> {
        let mut deps: Vec<usize> = state
            .peers_over(attachment)
            .into_iter()
            .filter_map(|peer| {
                builder
                    .deletes
                    .get(&(ResourceType::Peer, peer.to_string()))
                    .copied()
            })
            .collect();
        deps.sort_unstable();
        deps
    }

    fn finish(
        operation: StateOperation,
        actions: Vec<PlannedAction>,
        warnings: Vec<String>,
        prevent_destroy: bool,
    ) -> Self {
        let mut guardrail_violations = Vec::new();

        let deletes = actions
            .iter()
            .filter(|a| a.action_type == ActionType::Delete)
            .count();
        if prevent_destroy && deletes > 0 {
            guardrail_violations.push(format!(
                "prevent_destroy is set but the plan deletes {deletes} resource(s)"
            ));
        }

        Self {
            created_at: Utc::now(),
            operation,
            actions,
            warnings,
            passes_guardrails: guardrail_violations.is_empty(),
            guardrail_violations,
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of create actions.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == ActionType::Create)
            .count()
    }

    /// Returns the number of delete actions.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == ActionType::Delete)
            .count()
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {} '{}'", self.resource_type, self.resource_name),
            ActionType::Delete => format!("Delete {} '{}'", self.resource_type, self.resource_name),
        }
    }

    /// Address of the resource, e.g. `attachment.edge`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.resource_name)
    }
}

impl ResourceDiff {
    fn recorded(resource_type: ResourceType, name: &str, id: &str) -> Self {
        Self {
            resource_type,
            name: name.to_string(),
            diff_type: DiffType::Delete,
            details: vec![],
            id: Some(id.to_string()),
            old_hash: None,
            new_hash: None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.address())?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ApplyPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            writeln!(f, "No changes required")?;
        } else {
            writeln!(f, "Plan ({} actions):", self.actions.len())?;
            for (i, action) in self.actions.iter().enumerate() {
                writeln!(f, "  {i}. {action}")?;
            }
        }

        for warning in &self.warnings {
            writeln!(f, "Warning: {warning}")?;
        }

        if !self.guardrail_violations.is_empty() {
            writeln!(f, "\nGuardrail violations:")?;
            for violation in &self.guardrail_violations {
                writeln!(f, "  - {violation}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::diff::tests::{config, converged_state};
    use crate::planner::DiffEngine;
    use crate::reconciler::AttachmentAttributes;
    use crate::state::ResourceState;

    fn plan_for(config: &StackConfig, state: &StackState) -> ApplyPlan {
        let diff = DiffEngine::new().compute_diff(config, state);
        ApplyPlan::from_diff(&diff, config, state)
    }

    fn summary(plan: &ApplyPlan) -> Vec<String> {
        plan.actions
            .iter()
            .map(|a| format!("{} {}", a.action_type, a.address()))
            .collect()
    }

    #[test]
    fn test_creates_attachment_before_peer() {
        let config = config();
        let plan = plan_for(&config, &StackState::new("edge-network"));

        assert_eq!(summary(&plan), vec!["create attachment.edge", "create peer.edge-peer"]);
        assert_eq!(plan.actions[1].dependencies, vec![0]);
        assert!(plan.actions[0].new_hash.is_some());
        assert!(plan.passes_guardrails);
    }

    #[test]
    fn test_converged_stack_has_empty_plan() {
        let config = config();
        let plan = plan_for(&config, &converged_state(&config));

        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required\n");
    }

    #[test]
    fn test_attachment_drift_replaces_its_peers() {
        let config = config();
        let mut state = converged_state(&config);
        state
            .attachments
            .get_mut("edge")
            .unwrap()
            .set_attributes(AttachmentAttributes {
                transport_transit_gateway_attachment_id: String::from("tgw-attach-9"),
                ..crate::planner::diff::tests::attachment_attributes()
            });

        let plan = plan_for(&config, &state);

        assert_eq!(
            summary(&plan),
            vec![
                "delete peer.edge-peer",
                "delete attachment.edge",
                "create attachment.edge",
                "create peer.edge-peer",
            ]
        );
        assert_eq!(plan.actions[0].reason, "replacing: attachment 'edge' is replaced");
        assert_eq!(plan.actions[0].resource_id.as_deref(), Some("tgw-connect-peer-1"));
        assert_eq!(plan.actions[1].dependencies, vec![0]);
        assert_eq!(plan.actions[2].dependencies, vec![1]);
        assert_eq!(plan.actions[3].dependencies, vec![0, 2]);
    }

    #[test]
    fn test_tag_drift_is_a_warning() {
        let mut config = config();
        config.attachments[0].tags.insert("Name", "edge");
        let plan = plan_for(&config, &converged_state(&config));

        assert!(plan.is_empty());
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].starts_with("attachment.edge tags differ"));
    }

    #[test]
    fn test_prevent_destroy_blocks_deletes() {
        let mut config = config();
        let state = converged_state(&config);
        config.peers.clear();
        config.guardrails.prevent_destroy = true;

        let plan = plan_for(&config, &state);

        assert_eq!(summary(&plan), vec!["delete peer.edge-peer"]);
        assert!(!plan.passes_guardrails);
        assert_eq!(plan.guardrail_violations.len(), 1);
    }

    #[test]
    fn test_destroy_deletes_peers_first() {
        let config = config();
        let mut state = converged_state(&config);
        state.set_attachment(ResourceState::new("spare", "tgw-attach-connect-2", "abc"));

        let plan = ApplyPlan::destroy(&state, false);

        assert_eq!(
            summary(&plan),
            vec![
                "delete peer.edge-peer",
                "delete attachment.edge",
                "delete attachment.spare",
            ]
        );
        assert_eq!(plan.actions[1].dependencies, vec![0]);
        assert!(plan.actions[2].dependencies.is_empty());
        assert_eq!(plan.operation, StateOperation::Destroy);
    }
}
