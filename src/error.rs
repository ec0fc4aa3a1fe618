//! Error types for the Transit Gateway Connect reconciler.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation cycle: configuration, local state, the remote gateway
//! control plane, and the reconciliation engine itself.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the reconciler.
#[derive(Debug, Error)]
pub enum TgwError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local state errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Gateway control-plane errors.
    #[error("Gateway API error: {0}")]
    Gateway(#[from] GatewayError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (attachment or peer).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },
}

/// Local state errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing the state to disk failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Gateway control-plane errors.
///
/// The remote system reports failures with resource-kind specific codes
/// (for example `InvalidTransitGatewayAttachmentID.NotFound`), so callers
/// match on [`GatewayError::is_code`] rather than on a generic variant.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The API rejected the request with an error code.
    #[error("{code}: {message}")]
    Api {
        /// Remote error code.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// Rate limited.
    #[error("rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// The reconciliation operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Creating a resource.
    Create,
    /// Reading a resource.
    Read,
    /// Deleting a resource.
    Delete,
    /// Importing a resource by identifier.
    Import,
    /// Looking up a resource by criteria.
    Lookup,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The remote object disappeared while it was expected to exist.
    #[error("{kind} ({id}) not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Remote identifier.
        id: String,
    },

    /// A lookup matched nothing.
    #[error("error reading {kind}: no results found, try adjusting search criteria")]
    NoResults {
        /// Resource kind.
        kind: String,
    },

    /// A lookup matched more than one object.
    #[error("error reading {kind}: {count} results found, try adjusting search criteria")]
    AmbiguousResult {
        /// Resource kind.
        kind: String,
        /// Number of matching objects.
        count: usize,
    },

    /// A required nested structure was missing from a remote object.
    #[error("error reading {kind} ({id}): {message}")]
    Decode {
        /// Resource kind.
        kind: String,
        /// Remote identifier.
        id: String,
        /// What was missing.
        message: String,
    },

    /// A required attribute was not set on a create request.
    #[error("{kind}: required attribute \"{attribute}\" is not set")]
    MissingAttribute {
        /// Resource kind.
        kind: String,
        /// Attribute name.
        attribute: String,
    },

    /// Lookup criteria were unusable.
    #[error("invalid {kind} lookup: {message}")]
    InvalidCriteria {
        /// Resource kind.
        kind: String,
        /// Description of the problem.
        message: String,
    },

    /// Convergence was not observed before the deadline.
    ///
    /// The remote side effect may or may not have completed.
    #[error(
        "timeout {operation} {kind} ({id}): state {expected} not observed, last observed {last_state}; the remote change may still complete"
    )]
    Timeout {
        /// Resource kind.
        kind: String,
        /// Remote identifier.
        id: String,
        /// Operation being waited on.
        operation: Operation,
        /// Expected terminal states.
        expected: String,
        /// Last observed state.
        last_state: String,
    },

    /// The remote object reached a failure state.
    #[error("error {operation} {kind} ({id}): reached state {state}: {reason}")]
    TerminalState {
        /// Resource kind.
        kind: String,
        /// Remote identifier.
        id: String,
        /// Operation being waited on.
        operation: Operation,
        /// Observed failure state.
        state: String,
        /// Remote-reported reason.
        reason: String,
    },

    /// A remote call failed.
    #[error("error {operation} {kind}{}: {source}", id_suffix(.id.as_deref()))]
    Operation {
        /// Resource kind.
        kind: String,
        /// Attempted operation.
        operation: Operation,
        /// Remote identifier, when one is known.
        id: Option<String>,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

fn id_suffix(id: Option<&str>) -> String {
    id.map(|id| format!(" ({id})")).unwrap_or_default()
}

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, TgwError>;

/// Result type alias for raw gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// API error codes that indicate throttling.
const THROTTLING_CODES: &[&str] = &["Throttling", "RequestLimitExceeded", "ServiceUnavailable"];

impl TgwError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is transient and may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway(e) | Self::Reconcile(ReconcileError::Operation { source: e, .. }) => {
                e.is_retryable()
            }
            Self::State(StateError::LockFailed { .. }) => true,
            _ => false,
        }
    }

    /// Returns true if this error means the remote object is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Reconcile(ReconcileError::NotFound { .. } | ReconcileError::NoResults { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl GatewayError {
    /// Creates an API error.
    #[must_use]
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Returns true if this is an API error carrying exactly `code`.
    #[must_use]
    pub fn is_code(&self, code: &str) -> bool {
        matches!(self, Self::Api { code: c, .. } if c == code)
    }

    /// Returns true if this error is transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::NetworkError { .. } => true,
            Self::Api { code, .. } => THROTTLING_CODES.contains(&code.as_str()),
            Self::AuthenticationFailed { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Create => "creating",
            Self::Read => "reading",
            Self::Delete => "deleting",
            Self::Import => "importing",
            Self::Lookup => "looking up",
        };
        write!(f, "{op}")
    }
}
