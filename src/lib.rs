// ============================================================================
// Strict linting
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![allow(clippy::module_name_repetitions)]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # tgw_connect
//!
//! A declarative, idempotent reconciler for Transit Gateway Connect
//! attachments and the BGP peers that run over them.
//!
//! ## Overview
//!
//! - Declare attachments and peers in a YAML stack file
//! - Create them and wait until the gateway reports them available
//! - Detect remote drift and replace what cannot be changed in place
//! - Delete them and wait until they are gone
//! - Look up an existing attachment by id or filters
//!
//! ## Architecture
//!
//! 1. **Declarations**: `tgwc.yaml`, parsed by [`config`]
//! 2. **Recorded state**: remote ids and attributes, kept by [`state`]
//! 3. **Reconcilers**: per-kind create, read, delete and import in [`reconciler`],
//!    driving the control plane through [`gateway`] and waiting via [`poller`]
//! 4. **Planner**: refresh, diff, ordered plan and execution in [`planner`]
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and hashing
//! - [`gateway`]: Control-plane client and wire types
//! - [`poller`]: Generic state waiter with backoff and deadlines
//! - [`tags`]: Default and ignored tag handling
//! - [`schema`]: Attribute schemas of every kind
//! - [`reconciler`]: Resource lifecycles and the attachment lookup
//! - [`state`]: Local state store and locking
//! - [`planner`]: Diff computation, planning and execution
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! stack:
//!   name: edge-network
//!
//! attachments:
//!   - name: edge
//!     protocol: gre
//!     transport_transit_gateway_attachment_id: tgw-attach-0123456789abcdef0
//!
//! peers:
//!   - name: edge-peer
//!     attachment: edge
//!     peer_address: 172.16.0.1
//!     transit_gateway_address: 10.0.0.1
//!     peer_asn: 64512
//!     inside_cidr_blocks: ["169.254.6.0/29"]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod planner;
pub mod poller;
pub mod reconciler;
pub mod schema;
pub mod state;
pub mod tags;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, StackConfig};
pub use error::{Result, TgwError};
pub use gateway::{GatewayClient, HttpGatewayClient};
pub use planner::{ApplyPlan, DiffEngine, PlanExecutor, StackReconcilers};
pub use reconciler::{Attachment, AttachmentLookup, Peer, Reconciler};
pub use state::{LocalStateStore, StackState, StateStore};
