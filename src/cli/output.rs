//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{ActionStatus, ActionType, ApplyPlan, ExecutionResult, RefreshReport};
use crate::reconciler::AttachmentLookupResult;
use crate::schema::{AttributeType, ResourceSchema};
use crate::state::StackState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Executed action row for table display.
#[derive(Tabled)]
struct ActionResultRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Recorded resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    address: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

/// Schema attribute row for table display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: &'static str,
    #[tabled(rename = "Type")]
    attr_type: &'static str,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "ForceNew")]
    force_new: &'static str,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an apply plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ApplyPlan) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &ApplyPlan) -> String {
        let mut output = String::new();

        if plan.is_empty() {
            let _ = writeln!(
                output,
                "{} No changes required - resources match the configuration.",
                "✓".green()
            );
        } else {
            output.push_str("\nApply plan\n\n");

            let rows: Vec<PlanActionRow> = plan
                .actions
                .iter()
                .enumerate()
                .map(|(i, a)| PlanActionRow {
                    index: i + 1,
                    action: Self::format_action_type(a.action_type),
                    resource: a.address(),
                    reason: Self::truncate(&a.reason, 60),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');

            let _ = writeln!(
                output,
                "\nPlan: {} to create, {} to destroy",
                plan.create_count().to_string().green(),
                plan.delete_count().to_string().red()
            );
        }

        if !plan.warnings.is_empty() {
            let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
            for warning in &plan.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        if !plan.passes_guardrails {
            let _ = writeln!(output, "\n{} Guardrail violations:", "✗".red());
            for violation in &plan.guardrail_violations {
                let _ = writeln!(output, "   - {violation}");
            }
        }

        output
    }

    /// Formats the outcome of an executed plan.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ExecutionJson::from(result)),
            OutputFormat::Text => {
                let mut output = String::new();

                let rows: Vec<ActionResultRow> = result
                    .results
                    .iter()
                    .map(|r| ActionResultRow {
                        index: r.index + 1,
                        action: Self::format_action_type(r.action.action_type),
                        resource: r.action.address(),
                        status: Self::format_status(r.status),
                        id: r.resource_id.clone().unwrap_or_else(|| String::from("-")),
                    })
                    .collect();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let errors: Vec<_> = result
                    .results
                    .iter()
                    .filter_map(|r| r.error.as_ref().map(|e| (r.action.address(), e)))
                    .collect();
                if !errors.is_empty() {
                    let _ = writeln!(output, "\n{} Errors:", "⚠".yellow());
                    for (address, error) in errors {
                        let _ = writeln!(output, "   - {address}: {error}");
                    }
                }

                let mark = if result.all_successful() {
                    "✓".green()
                } else {
                    "✗".red()
                };
                let _ = writeln!(output, "\n{mark} {result}");
                output
            }
        }
    }

    /// Formats local state.
    #[must_use]
    pub fn format_state(&self, state: &StackState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "\nState: {}\n", state.stack);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);

                let attachments = state.attachments.values().map(|e| {
                    (format!("attachment.{}", e.name), &e.id, e.is_tainted(), &e.spec_hash)
                });
                let peers = state
                    .peers
                    .values()
                    .map(|e| (format!("peer.{}", e.name), &e.id, e.is_tainted(), &e.spec_hash));
                let rows: Vec<ResourceRow> = attachments
                    .chain(peers)
                    .map(|(address, id, tainted, hash)| ResourceRow {
                        address,
                        id: id.clone(),
                        status: if tainted {
                            "tainted".red().to_string()
                        } else {
                            "ready".green().to_string()
                        },
                        hash: Self::truncate(hash, 12),
                    })
                    .collect();

                if rows.is_empty() {
                    output.push_str("\n   No resources recorded.\n");
                } else {
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(&json!({
                "refreshed": report.refreshed,
                "vanished": report.vanished,
            })),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Refreshed {} resource(s)\n",
                    "✓".green(),
                    report.refreshed.len()
                );
                for address in &report.vanished {
                    let _ = writeln!(
                        output,
                        "   {} {address} no longer exists and was removed from state",
                        "-".red()
                    );
                }
                output
            }
        }
    }

    /// Formats the attachment a lookup resolved.
    #[must_use]
    pub fn format_lookup(&self, result: &AttachmentLookupResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "id                                      = {}", result.id);
                let _ = writeln!(output, "protocol                                = {}", result.protocol);
                let _ = writeln!(
                    output,
                    "transit_gateway_id                      = {}",
                    result.transit_gateway_id
                );
                let _ = writeln!(
                    output,
                    "transport_transit_gateway_attachment_id = {}",
                    result.transport_transit_gateway_attachment_id
                );
                for (key, value) in result.tags.iter() {
                    let _ = writeln!(output, "tags.{key} = {value}");
                }
                output
            }
        }
    }

    /// Formats an attribute schema.
    #[must_use]
    pub fn format_schema(&self, schema: &ResourceSchema) -> String {
        match self.format {
            OutputFormat::Json => to_json(schema),
            OutputFormat::Text => {
                let rows: Vec<AttributeRow> = schema
                    .attributes
                    .iter()
                    .map(|(name, attribute)| {
                        let mut mode = Vec::new();
                        if attribute.required {
                            mode.push("required");
                        }
                        if attribute.optional {
                            mode.push("optional");
                        }
                        if attribute.computed {
                            mode.push("computed");
                        }
                        AttributeRow {
                            name: *name,
                            attr_type: Self::type_name(attribute.attr_type),
                            mode: mode.join(", "),
                            force_new: if attribute.force_new { "yes" } else { "" },
                        }
                    })
                    .collect();

                format!("{}\n\n{}\n", schema.type_name.bold(), Table::new(rows))
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        let warnings: &[String] = if show_warnings { &result.warnings } else { &[] };

        match self.format {
            OutputFormat::Json => {
                let errors: Vec<_> = result
                    .errors
                    .iter()
                    .map(|e| json!({ "field": e.field, "message": e.message }))
                    .collect();
                to_json(&json!({
                    "valid": result.is_valid(),
                    "errors": errors,
                    "warnings": warnings,
                }))
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!(
                        "{} Configuration has {} error(s)\n",
                        "✗".red(),
                        result.error_count()
                    )
                };
                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }
                if !warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn format_message(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&json!({ "status": "success", "message": message })),
            OutputFormat::Text => format!("{} {message}\n", "✓".green()),
        }
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    /// Formats an action status with color.
    fn format_status(status: ActionStatus) -> String {
        match status {
            ActionStatus::Succeeded => status.to_string().green().to_string(),
            ActionStatus::Failed => status.to_string().red().to_string(),
            ActionStatus::Skipped => status.to_string().dimmed().to_string(),
        }
    }

    const fn type_name(attr_type: AttributeType) -> &'static str {
        match attr_type {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::StringList => "list(string)",
            AttributeType::StringMap => "map(string)",
            AttributeType::FilterSet => "set(filter)",
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson {
    operation: String,
    creates: usize,
    deletes: usize,
    passes_guardrails: bool,
    guardrail_violations: Vec<String>,
    warnings: Vec<String>,
    actions: Vec<ActionJson>,
}

#[derive(Serialize)]
struct ActionJson {
    action_type: String,
    resource: String,
    id: Option<String>,
    reason: String,
    dependencies: Vec<usize>,
}

impl From<&ApplyPlan> for PlanJson {
    fn from(plan: &ApplyPlan) -> Self {
        Self {
            operation: plan.operation.to_string(),
            creates: plan.create_count(),
            deletes: plan.delete_count(),
            passes_guardrails: plan.passes_guardrails,
            guardrail_violations: plan.guardrail_violations.clone(),
            warnings: plan.warnings.clone(),
            actions: plan
                .actions
                .iter()
                .map(|a| ActionJson {
                    action_type: a.action_type.to_string(),
                    resource: a.address(),
                    id: a.resource_id.clone(),
                    reason: a.reason.clone(),
                    dependencies: a.dependencies.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ExecutionJson {
    successful: usize,
    failed: usize,
    skipped: usize,
    not_run: usize,
    results: Vec<ActionResultJson>,
}

#[derive(Serialize)]
struct ActionResultJson {
    action_type: String,
    resource: String,
    status: String,
    id: Option<String>,
    error: Option<String>,
}

impl From<&ExecutionResult> for ExecutionJson {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            successful: result.successful,
            failed: result.failed,
            skipped: result.skipped,
            not_run: result.not_run,
            results: result
                .results
                .iter()
                .map(|r| ActionResultJson {
                    action_type: r.action.action_type.to_string(),
                    resource: r.action.address(),
                    status: r.status.to_string(),
                    id: r.resource_id.clone(),
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}
