//! Declaration types for the stack file.
//!
//! This module defines all the structs that map to the `tgwc.yaml` file.
//! These types are declarative and fully describe the desired state of the
//! Connect attachments and Connect peers in one stack.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::poller::PollSettings;
use crate::reconciler::{AttachmentSpec, PeerSpec};
use crate::tags::{DefaultTagsConfig, IgnoreTagsConfig, KeyValueTags, TagSettings};

/// The root configuration structure of a stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackConfig {
    /// Stack-level configuration.
    pub stack: StackInfo,
    /// Gateway provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Local state configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Guardrails.
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    /// Connect attachments to manage.
    #[serde(default)]
    pub attachments: Vec<AttachmentConfig>,
    /// Connect peers to manage.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// Stack-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackInfo {
    /// Stack name.
    pub name: String,
}

/// Gateway provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Control-plane endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Region.
    #[serde(default)]
    pub region: Option<String>,
    /// Tags applied to every resource.
    #[serde(default)]
    pub default_tags: KeyValueTags,
    /// Tags never managed.
    #[serde(default)]
    pub ignore_tags: IgnoreTagsConfig,
    /// Operation deadlines.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Poll timing.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Operation deadlines in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutsConfig {
    /// Create deadline.
    #[serde(default = "default_timeout_secs")]
    pub create_secs: u64,
    /// Delete deadline.
    #[serde(default = "default_timeout_secs")]
    pub delete_secs: u64,
}

/// Poll timing in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Delay before the first refresh.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// Initial interval between refreshes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Cap on the backed-off interval.
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
}

/// Local state configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Directory holding the state and lock files.
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

/// Guardrails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardrailsConfig {
    /// Refuse to apply plans that delete anything.
    #[serde(default)]
    pub prevent_destroy: bool,
}

/// A declared Connect attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentConfig {
    /// Unique name within the stack.
    pub name: String,
    /// Tunnel protocol.
    pub protocol: String,
    /// Underlying transport attachment.
    pub transport_transit_gateway_attachment_id: String,
    /// Explicit tags.
    #[serde(default)]
    pub tags: KeyValueTags,
}

/// A declared Connect peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    /// Unique name within the stack.
    pub name: String,
    /// Name of a declared attachment to peer over.
    #[serde(default)]
    pub attachment: Option<String>,
    /// Explicit Connect attachment identifier.
    #[serde(default)]
    pub transport_transit_gateway_attachment_id: Option<String>,
    /// Gateway-side tunnel address.
    pub transit_gateway_address: String,
    /// Peer tunnel address.
    pub peer_address: String,
    /// Peer ASN.
    pub peer_asn: i64,
    /// Inside-tunnel CIDR blocks.
    #[serde(default)]
    pub inside_cidr_blocks: Vec<String>,
    /// Explicit tags.
    #[serde(default)]
    pub tags: KeyValueTags,
}

const fn default_timeout_secs() -> u64 {
    600
}

const fn default_delay_secs() -> u64 {
    10
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_max_interval_secs() -> u64 {
    30
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".tgwc")
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            create_secs: default_timeout_secs(),
            delete_secs: default_timeout_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            interval_secs: default_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl StackConfig {
    /// Tag settings injected into the reconcilers.
    #[must_use]
    pub fn tag_settings(&self) -> TagSettings {
        TagSettings::new(
            DefaultTagsConfig::new(self.provider.default_tags.clone()),
            self.provider.ignore_tags.clone(),
        )
    }

    /// Poll timing shared by creates and deletes.
    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        let polling = self.provider.polling;
        PollSettings {
            delay: Duration::from_secs(polling.delay_secs),
            interval: Duration::from_secs(polling.interval_secs),
            max_interval: Duration::from_secs(polling.max_interval_secs),
            timeout: Duration::from_secs(self.provider.timeouts.create_secs),
        }
    }

    /// Create deadline.
    #[must_use]
    pub const fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeouts.create_secs)
    }

    /// Delete deadline.
    #[must_use]
    pub const fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeouts.delete_secs)
    }

    /// Finds a declared attachment by name.
    #[must_use]
    pub fn find_attachment(&self, name: &str) -> Option<&AttachmentConfig> {
        self.attachments.iter().find(|a| a.name == name)
    }

    /// Finds a declared peer by name.
    #[must_use]
    pub fn find_peer(&self, name: &str) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.name == name)
    }

    /// Peers declared over the named attachment.
    pub fn peers_of<'a>(&'a self, attachment: &'a str) -> impl Iterator<Item = &'a PeerConfig> {
        self.peers
            .iter()
            .filter(move |p| p.attachment.as_deref() == Some(attachment))
    }

    /// Total number of declared resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.attachments.len() + self.peers.len()
    }
}

impl AttachmentConfig {
    /// Desired attributes for the reconciler.
    #[must_use]
    pub fn to_spec(&self) -> AttachmentSpec {
        AttachmentSpec {
            protocol: Some(self.protocol.clone()),
            transport_transit_gateway_attachment_id: Some(
                self.transport_transit_gateway_attachment_id.clone(),
            ),
            tags: self.tags.clone(),
        }
    }
}

impl PeerConfig {
    /// Desired attributes for the reconciler.
    ///
    /// `attachment_id` is the identifier resolved from the `attachment`
    /// reference; an explicit identifier in the declaration takes its place.
    #[must_use]
    pub fn to_spec(&self, attachment_id: Option<&str>) -> PeerSpec {
        PeerSpec {
            transport_transit_gateway_attachment_id: self
                .transport_transit_gateway_attachment_id
                .clone()
                .or_else(|| attachment_id.map(str::to_string)),
            transit_gateway_address: Some(self.transit_gateway_address.clone()),
            peer_address: Some(self.peer_address.clone()),
            peer_asn: Some(self.peer_asn),
            inside_cidr_blocks: self.inside_cidr_blocks.clone(),
            tags: self.tags.clone(),
        }
    }
}
