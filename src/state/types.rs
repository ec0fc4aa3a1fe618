//! State types for tracking managed resources.
//!
//! These types record what the last apply left behind on the gateway:
//! remote identifiers, the declaration hash each resource was built from,
//! and the decoded attributes from the most recent read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::reconciler::{AttachmentAttributes, PeerAttributes, ResourceData};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete state of one stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackState {
    /// State format version.
    pub version: String,
    /// Stack name.
    pub stack: String,
    /// Connect attachments by declared name.
    #[serde(default)]
    pub attachments: BTreeMap<String, ResourceState<AttachmentAttributes>>,
    /// Connect peers by declared name.
    #[serde(default)]
    pub peers: BTreeMap<String, ResourceState<PeerAttributes>>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of a single managed resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState<A> {
    /// Declared name.
    pub name: String,
    /// Remote identifier.
    pub id: String,
    /// Hash of the declaration the resource was created from.
    pub spec_hash: String,
    /// Attributes from the last read. `None` marks a tainted resource whose
    /// create never converged.
    pub attributes: Option<A>,
    /// Name of the attachment a peer was declared over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    /// When the resource was created or imported.
    pub created_at: DateTime<Utc>,
    /// When the entry was last written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StateOperation,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Operations recorded in the history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateOperation {
    /// Plan applied.
    Apply,
    /// Every resource destroyed.
    Destroy,
    /// Existing resource adopted.
    Import,
    /// Entries re-read from the gateway.
    Refresh,
}

impl StackState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new(stack: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            stack: stack.to_string(),
            attachments: BTreeMap::new(),
            peers: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Adds or replaces an attachment entry.
    pub fn set_attachment(&mut self, entry: ResourceState<AttachmentAttributes>) {
        self.attachments.insert(entry.name.clone(), entry);
        self.last_updated = Utc::now();
    }

    /// Removes an attachment entry.
    pub fn remove_attachment(&mut self, name: &str) -> Option<ResourceState<AttachmentAttributes>> {
        let removed = self.attachments.remove(name);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Adds or replaces a peer entry.
    pub fn set_peer(&mut self, entry: ResourceState<PeerAttributes>) {
        self.peers.insert(entry.name.clone(), entry);
        self.last_updated = Utc::now();
    }

    /// Removes a peer entry.
    pub fn remove_peer(&mut self, name: &str) -> Option<ResourceState<PeerAttributes>> {
        let removed = self.peers.remove(name);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Remote identifier of a recorded attachment.
    #[must_use]
    pub fn attachment_id(&self, name: &str) -> Option<&str> {
        self.attachments.get(name).map(|a| a.id.as_str())
    }

    /// Names of recorded peers declared over the named attachment.
    #[must_use]
    pub fn peers_over(&self, attachment: &str) -> Vec<&str> {
        self.peers
            .values()
            .filter(|p| p.attachment.as_deref() == Some(attachment))
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Total number of recorded resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.attachments.len() + self.peers.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resource_count() == 0
    }

    /// Adds a history entry, dropping the oldest past the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl<A> ResourceState<A> {
    /// Creates an entry with no attributes yet.
    #[must_use]
    pub fn new(name: &str, id: &str, spec_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            id: id.to_string(),
            spec_hash: spec_hash.to_string(),
            attributes: None,
            attachment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the read attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: A) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Sets the attachment a peer was declared over.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Option<String>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Returns true if the create never converged.
    #[must_use]
    pub const fn is_tainted(&self) -> bool {
        self.attributes.is_none()
    }

    /// Stores freshly read attributes.
    pub fn set_attributes(&mut self, attributes: A) {
        self.attributes = Some(attributes);
        self.updated_at = Utc::now();
    }
}

impl<A: Clone> ResourceState<A> {
    /// Reconciler view of the entry.
    #[must_use]
    pub fn to_data(&self) -> ResourceData<A> {
        ResourceData {
            id: Some(self.id.clone()),
            attributes: self.attributes.clone(),
        }
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: StateOperation, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: StateOperation, resources: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for StateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Import => "import",
            Self::Refresh => "refresh",
        };
        write!(f, "{op}")
    }
}
