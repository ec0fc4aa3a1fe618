//! Planning module for apply operations.
//!
//! This module refreshes recorded state, compares it with the declarations,
//! and turns the differences into an ordered plan that the executor runs.

mod diff;
mod executor;
mod plan;
mod refresh;

pub use diff::{DiffDetail, DiffEngine, DiffResult, DiffType, ResourceDiff, ResourceType};
pub use executor::{ActionResult, ActionStatus, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, ApplyPlan, PlannedAction};
pub use refresh::{RefreshReport, StackReconcilers};
