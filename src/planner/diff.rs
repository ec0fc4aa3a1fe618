//! Diff engine for comparing declarations against recorded state.
//!
//! The state is expected to be freshly refreshed: every entry re-read from
//! the gateway, vanished ones removed. What is left is compared field by
//! field against the declarations.

use std::collections::BTreeSet;
use tracing::debug;

use crate::config::{AttachmentConfig, ConfigHasher, PeerConfig, StackConfig};
use crate::reconciler::{AttachmentAttributes, PeerAttributes};
use crate::state::{ResourceState, StackState};
use crate::tags::{KeyValueTags, TagSettings};

/// Engine for computing diffs between declarations and state.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Declaration hasher.
    hasher: ConfigHasher,
}

/// Kind of managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    /// Connect attachment.
    Attachment,
    /// Connect peer.
    Peer,
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource kind.
    pub resource_type: ResourceType,
    /// Declared name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Fields that differ.
    pub details: Vec<DiffDetail>,
    /// Remote identifier, when recorded.
    pub id: Option<String>,
    /// Hash recorded in state.
    pub old_hash: Option<String>,
    /// Hash of the current declaration.
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Declared but not recorded, or vanished remotely.
    Create,
    /// A force-new attribute changed in the declaration.
    Update,
    /// The remote object diverged from the declaration on a force-new attribute.
    Drift,
    /// The last create never converged.
    Tainted,
    /// Only attachment tags differ. There is no in-place tag update.
    TagDrift,
    /// Nothing to do.
    NoChange,
    /// Recorded but no longer declared.
    Delete,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Recorded value.
    pub old_value: Option<String>,
    /// Declared value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All resource diffs.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to replace.
    pub replacements: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of resources with tag-only drift.
    pub tag_drifts: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between declarations and refreshed state.
    #[must_use]
    pub fn compute_diff(&self, config: &StackConfig, state: &StackState) -> DiffResult {
        let tags = config.tag_settings();
        let mut diffs = Vec::new();

        for attachment in &config.attachments {
            let new_hash = self.hasher.hash_attachment(attachment);
            let recorded = state.attachments.get(&attachment.name);
            diffs.push(Self::attachment_diff(attachment, recorded, &tags, new_hash));
        }

        for peer in &config.peers {
            let new_hash = self.hasher.hash_peer(peer);
            let recorded = state.peers.get(&peer.name);
            // Explicit identifier first, then whatever the named attachment resolved to
            let attachment_id = peer
                .transport_transit_gateway_attachment_id
                .as_deref()
                .or_else(|| peer.attachment.as_deref().and_then(|n| state.attachment_id(n)));
            diffs.push(Self::peer_diff(peer, recorded, attachment_id, &tags, new_hash));
        }

        for (name, entry) in &state.peers {
            if config.find_peer(name).is_none() {
                debug!("Peer {name} is no longer declared");
                diffs.push(ResourceDiff::deleted(ResourceType::Peer, entry));
            }
        }

        for (name, entry) in &state.attachments {
            if config.find_attachment(name).is_none() {
                debug!("Attachment {name} is no longer declared");
                diffs.push(ResourceDiff::deleted(ResourceType::Attachment, entry));
            }
        }

        DiffResult::from_diffs(diffs)
    }

    fn attachment_diff(
        config: &AttachmentConfig,
        recorded: Option<&ResourceState<AttachmentAttributes>>,
        tags: &TagSettings,
        new_hash: String,
    ) -> ResourceDiff {
        let mut diff = ResourceDiff::declared(ResourceType::Attachment, &config.name, new_hash);

        let Some(entry) = recorded else {
            debug!("Attachment {} needs to be created", config.name);
            return diff;
        };
        diff.id = Some(entry.id.clone());
        diff.old_hash = Some(entry.spec_hash.clone());

        let Some(attributes) = &entry.attributes else {
            diff.diff_type = DiffType::Tainted;
            return diff;
        };

        if diff.old_hash != diff.new_hash {
            diff.diff_type = DiffType::Update;
            return diff;
        }

        push_if_differs(&mut diff.details, "protocol", &attributes.protocol, &config.protocol);
        push_if_differs(
            &mut diff.details,
            "transport_transit_gateway_attachment_id",
            &attributes.transport_transit_gateway_attachment_id,
            &config.transport_transit_gateway_attachment_id,
        );
        if !diff.details.is_empty() {
            diff.diff_type = DiffType::Drift;
            return diff;
        }

        diff.details = tag_details(&attributes.tags_all, &desired_tags(tags, &config.tags));
        diff.diff_type = if diff.details.is_empty() {
            DiffType::NoChange
        } else {
            DiffType::TagDrift
        };
        diff
    }

    fn peer_diff(
        config: &PeerConfig,
        recorded: Option<&ResourceState<PeerAttributes>>,
        attachment_id: Option<&str>,
        tags: &TagSettings,
        new_hash: String,
    ) -> ResourceDiff {
        let mut diff = ResourceDiff::declared(ResourceType::Peer, &config.name, new_hash);

        let Some(entry) = recorded else {
            debug!("Peer {} needs to be created", config.name);
            return diff;
        };
        diff.id = Some(entry.id.clone());
        diff.old_hash = Some(entry.spec_hash.clone());

        let Some(attributes) = &entry.attributes else {
            diff.diff_type = DiffType::Tainted;
            return diff;
        };

        if diff.old_hash != diff.new_hash {
            diff.diff_type = DiffType::Update;
            return diff;
        }

        let details = &mut diff.details;
        if let Some(attachment_id) = attachment_id {
            push_if_differs(
                details,
                "transport_transit_gateway_attachment_id",
                &attributes.transport_transit_gateway_attachment_id,
                attachment_id,
            );
        }
        push_if_differs(
            details,
            "transit_gateway_address",
            &attributes.transit_gateway_address,
            &config.transit_gateway_address,
        );
        push_if_differs(details, "peer_address", &attributes.peer_address, &config.peer_address);
        push_if_differs(
            details,
            "peer_asn",
            &attributes.peer_asn.to_string(),
            &config.peer_asn.to_string(),
        );

        // An ordered list: reordering or repeating a block is a change
        if attributes.inside_cidr_blocks != config.inside_cidr_blocks {
            details.push(DiffDetail {
                field: String::from("inside_cidr_blocks"),
                old_value: Some(attributes.inside_cidr_blocks.join(",")),
                new_value: Some(config.inside_cidr_blocks.join(",")),
            });
        }

        // Peer tags are force-new
        details.extend(tag_details(&attributes.tags_all, &desired_tags(tags, &config.tags)));

        diff.diff_type = if diff.details.is_empty() {
            DiffType::NoChange
        } else {
            DiffType::Drift
        };
        diff
    }
}

/// The `tags_all` view a create with `explicit` tags would read back.
fn desired_tags(tags: &TagSettings, explicit: &KeyValueTags) -> KeyValueTags {
    tags.views(tags.tags_for_create(explicit)).tags_all
}

fn push_if_differs(details: &mut Vec<DiffDetail>, field: &str, old: &str, new: &str) {
    if old != new {
        details.push(DiffDetail {
            field: field.to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
        });
    }
}

fn tag_details(recorded: &KeyValueTags, declared: &KeyValueTags) -> Vec<DiffDetail> {
    let keys: BTreeSet<&String> = recorded.iter().chain(declared.iter()).map(|(k, _)| k).collect();

    keys.into_iter()
        .filter(|k| recorded.get(k) != declared.get(k))
        .map(|k| DiffDetail {
            field: format!("tags.{k}"),
            old_value: recorded.get(k).map(str::to_string),
            new_value: declared.get(k).map(str::to_string),
        })
        .collect()
}

impl ResourceDiff {
    fn declared(resource_type: ResourceType, name: &str, new_hash: String) -> Self {
        Self {
            resource_type,
            name: name.to_string(),
            diff_type: DiffType::Create,
            details: vec![],
            id: None,
            old_hash: None,
            new_hash: Some(new_hash),
        }
    }

    fn deleted<A>(resource_type: ResourceType, entry: &ResourceState<A>) -> Self {
        Self {
            resource_type,
            name: entry.name.clone(),
            diff_type: DiffType::Delete,
            details: vec![],
            id: Some(entry.id.clone()),
            old_hash: Some(entry.spec_hash.clone()),
            new_hash: None,
        }
    }

    /// Address of the resource, e.g. `peer.edge-peer`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

impl DiffType {
    /// Returns true if the resource must be deleted and created again.
    #[must_use]
    pub const fn requires_replacement(self) -> bool {
        matches!(self, Self::Update | Self::Drift | Self::Tainted)
    }
}

impl DiffResult {
    fn from_diffs(diffs: Vec<ResourceDiff>) -> Self {
        let count = |pred: fn(DiffType) -> bool| diffs.iter().filter(|d| pred(d.diff_type)).count();

        Self {
            creates: count(|t| t == DiffType::Create),
            replacements: count(DiffType::requires_replacement),
            deletes: count(|t| t == DiffType::Delete),
            tag_drifts: count(|t| t == DiffType::TagDrift),
            unchanged: count(|t| t == DiffType::NoChange),
            diffs,
        }
    }

    /// Returns true if any resource needs an action.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.replacements > 0 || self.deletes > 0
    }

    /// Finds the diff for a resource.
    #[must_use]
    pub fn find(&self, resource_type: ResourceType, name: &str) -> Option<&ResourceDiff> {
        self.diffs
            .iter()
            .find(|d| d.resource_type == resource_type && d.name == name)
    }

    /// Diffs that are not `NoChange`.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .collect()
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Attachment => "attachment",
            Self::Peer => "peer",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Drift => "drift",
            Self::Tainted => "tainted",
            Self::TagDrift => "tag drift",
            Self::NoChange => "no change",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address(), self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConfigParser;

    pub const STACK: &str = r#"
stack:
  name: edge-network
provider:
  default_tags:
    team: network
  polling:
    delay_secs: 1
    interval_secs: 1
    max_interval_secs: 4
attachments:
  - name: edge
    protocol: gre
    transport_transit_gateway_attachment_id: tgw-attach-1
peers:
  - name: edge-peer
    attachment: edge
    transit_gateway_address: 10.0.0.1
    peer_address: 172.16.0.1
    peer_asn: 64512
    inside_cidr_blocks: ["169.254.6.0/29"]
"#;

    pub fn config() -> StackConfig {
        ConfigParser::new().parse_yaml(STACK, None).unwrap()
    }

    fn team_tags() -> KeyValueTags {
        [("team", "network")].into_iter().collect()
    }

    pub fn attachment_attributes() -> AttachmentAttributes {
        AttachmentAttributes {
            protocol: String::from("gre"),
            transit_gateway_id: String::from("tgw-1"),
            transport_transit_gateway_attachment_id: String::from("tgw-attach-1"),
            tags: KeyValueTags::new(),
            tags_all: team_tags(),
        }
    }

    pub fn peer_attributes() -> PeerAttributes {
        PeerAttributes {
            transport_transit_gateway_attachment_id: String::from("tgw-attach-connect-1"),
            transit_gateway_address: String::from("10.0.0.1"),
            peer_address: String::from("172.16.0.1"),
            peer_asn: 64512,
            transit_gateway_asn: Some(64000),
            inside_cidr_blocks: vec![String::from("169.254.6.0/29")],
            tags: KeyValueTags::new(),
            tags_all: team_tags(),
        }
    }

    /// State matching `STACK` exactly.
    pub fn converged_state(config: &StackConfig) -> StackState {
        let hasher = ConfigHasher::new();
        let mut state = StackState::new("edge-network");
        state.set_attachment(
            ResourceState::new(
                "edge",
                "tgw-attach-connect-1",
                &hasher.hash_attachment(&config.attachments[0]),
            )
            .with_attributes(attachment_attributes()),
        );
        state.set_peer(
            ResourceState::new("edge-peer", "tgw-connect-peer-1", &hasher.hash_peer(&config.peers[0]))
                .with_attributes(peer_attributes())
                .with_attachment(Some(String::from("edge"))),
        );
        state
    }

    #[test]
    fn test_empty_state_creates_everything() {
        let config = config();
        let diff = DiffEngine::new().compute_diff(&config, &StackState::new("edge-network"));

        assert_eq!(diff.creates, 2);
        assert!(diff.has_changes());
        assert!(diff.diffs.iter().all(|d| d.id.is_none()));
    }

    #[test]
    fn test_converged_state_has_no_changes() {
        let config = config();
        let diff = DiffEngine::new().compute_diff(&config, &converged_state(&config));

        assert_eq!(diff.unchanged, 2);
        assert!(!diff.has_changes());
        assert!(diff.actionable_diffs().is_empty());
    }

    #[test]
    fn test_remote_protocol_change_is_drift() {
        let config = config();
        let mut state = converged_state(&config);
        let entry = state.attachments.get_mut("edge").unwrap();
        entry.set_attributes(AttachmentAttributes {
            protocol: String::from("ipsec"),
            ..attachment_attributes()
        });

        let diff = DiffEngine::new().compute_diff(&config, &state);
        let edge = diff.find(ResourceType::Attachment, "edge").unwrap();

        assert_eq!(edge.diff_type, DiffType::Drift);
        assert_eq!(edge.details[0].field, "protocol");
        assert_eq!(edge.details[0].old_value.as_deref(), Some("ipsec"));
    }

    #[test]
    fn test_attachment_tag_change_is_reported_only() {
        let mut config = config();
        config.attachments[0].tags.insert("Name", "edge");
        let state = converged_state(&config);

        let diff = DiffEngine::new().compute_diff(&config, &state);
        let edge = diff.find(ResourceType::Attachment, "edge").unwrap();

        assert_eq!(edge.diff_type, DiffType::TagDrift);
        assert_eq!(edge.details[0].field, "tags.Name");
        assert_eq!(diff.tag_drifts, 1);
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_peer_declaration_change_is_update() {
        let config = config();
        let state = converged_state(&config);
        let mut changed = config.clone();
        changed.peers[0].peer_asn = 65001;

        let diff = DiffEngine::new().compute_diff(&changed, &state);

        assert_eq!(
            diff.find(ResourceType::Peer, "edge-peer").unwrap().diff_type,
            DiffType::Update
        );
        assert_eq!(diff.replacements, 1);
    }

    #[test]
    fn test_peer_block_order_is_drift() {
        let mut config = config();
        config.peers[0].inside_cidr_blocks =
            vec![String::from("fd00::8/125"), String::from("169.254.6.0/29")];
        let mut state = converged_state(&config);
        let entry = state.peers.get_mut("edge-peer").unwrap();
        entry.set_attributes(PeerAttributes {
            inside_cidr_blocks: vec![String::from("169.254.6.0/29"), String::from("fd00::8/125")],
            ..peer_attributes()
        });

        let diff = DiffEngine::new().compute_diff(&config, &state);
        let peer = diff.find(ResourceType::Peer, "edge-peer").unwrap();

        assert_eq!(peer.diff_type, DiffType::Drift);
        assert_eq!(peer.details[0].field, "inside_cidr_blocks");
        assert_eq!(
            peer.details[0].old_value.as_deref(),
            Some("169.254.6.0/29,fd00::8/125")
        );
    }

    #[test]
    fn test_peer_repeated_block_is_drift() {
        let config = config();
        let mut state = converged_state(&config);
        let mut blocks = config.peers[0].inside_cidr_blocks.clone();
        blocks.push(blocks[0].clone());
        state
            .peers
            .get_mut("edge-peer")
            .unwrap()
            .set_attributes(PeerAttributes {
                inside_cidr_blocks: blocks,
                ..peer_attributes()
            });

        let diff = DiffEngine::new().compute_diff(&config, &state);

        assert_eq!(
            diff.find(ResourceType::Peer, "edge-peer").unwrap().diff_type,
            DiffType::Drift
        );
    }

    #[test]
    fn test_tainted_and_undeclared_entries() {
        let mut config = config();
        let mut state = converged_state(&config);
        config.peers.clear();
        state.set_attachment(ResourceState::new(
            "edge",
            "tgw-attach-connect-1",
            &ConfigHasher::new().hash_attachment(&config.attachments[0]),
        ));

        let diff = DiffEngine::new().compute_diff(&config, &state);

        let edge = diff.find(ResourceType::Attachment, "edge").unwrap();
        assert_eq!(edge.diff_type, DiffType::Tainted);
        let peer = diff.find(ResourceType::Peer, "edge-peer").unwrap();
        assert_eq!(peer.diff_type, DiffType::Delete);
        assert_eq!(peer.id.as_deref(), Some("tgw-connect-peer-1"));
        assert_eq!(peer.to_string(), "peer.edge-peer: delete");
    }
}
