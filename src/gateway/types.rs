//! Gateway control-plane types and data structures.
//!
//! This module defines the wire shapes exchanged with the remote control
//! plane for Connect attachments and Connect peers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tags::KeyValueTags;

/// An object owned by the remote control plane with an observable lifecycle.
pub trait RemoteObject: Clone + Send + Sync {
    /// Lifecycle state type.
    type State: Copy + Eq + fmt::Display + Send + Sync + 'static;

    /// Remote-assigned identifier.
    fn remote_id(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> Self::State;

    /// Remote-reported reason for the current state, if any.
    fn status_message(&self) -> Option<&str>;
}

/// A remote tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// A server-side filter predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Attribute name to filter on.
    pub name: String,
    /// Accepted values.
    pub values: Vec<String>,
}

/// Describe query: explicit identifiers, filters, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeQuery {
    /// Identifiers to match.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    /// Filters to apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
}

/// Lifecycle state of a Connect attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentState {
    /// Attachment request is being initiated.
    Initiating,
    /// Waiting for the owner to accept.
    PendingAcceptance,
    /// Being provisioned.
    Pending,
    /// Ready for use.
    Available,
    /// Being modified.
    Modifying,
    /// Being deleted.
    Deleting,
    /// Deleted.
    Deleted,
    /// Failing.
    Failing,
    /// Failed.
    Failed,
    /// Being rejected.
    Rejecting,
    /// Rejected.
    Rejected,
    /// Rolling back a failed change.
    RollingBack,
    /// A state this client does not know.
    #[serde(other)]
    Unknown,
}

/// Lifecycle state of a Connect peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerState {
    /// Being provisioned.
    Pending,
    /// Ready for use.
    Available,
    /// Being deleted.
    Deleting,
    /// Deleted.
    Deleted,
    /// Failed.
    Failed,
    /// A state this client does not know.
    #[serde(other)]
    Unknown,
}

/// Connect attachment options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// Tunnel protocol.
    #[serde(default)]
    pub protocol: Option<String>,
}

/// A Connect attachment as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttachment {
    /// Attachment identifier.
    pub transit_gateway_attachment_id: String,
    /// Underlying transport attachment.
    #[serde(default)]
    pub transport_transit_gateway_attachment_id: Option<String>,
    /// Owning transit gateway.
    #[serde(default)]
    pub transit_gateway_id: Option<String>,
    /// Lifecycle state.
    pub state: AttachmentState,
    /// Creation time.
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    /// Attachment options.
    #[serde(default)]
    pub options: Option<ConnectOptions>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Reason for the current state.
    #[serde(default)]
    pub status_message: Option<String>,
}

/// BGP configuration of one Connect peer session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpConfiguration {
    /// Gateway-side ASN.
    #[serde(default)]
    pub transit_gateway_asn: Option<i64>,
    /// Peer ASN.
    #[serde(default)]
    pub peer_asn: Option<i64>,
    /// Session status.
    #[serde(default)]
    pub bgp_status: Option<String>,
}

/// Connect peer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPeerConfiguration {
    /// Gateway-side tunnel address.
    #[serde(default)]
    pub transit_gateway_address: Option<String>,
    /// Peer tunnel address.
    #[serde(default)]
    pub peer_address: Option<String>,
    /// Inside-tunnel CIDR blocks.
    #[serde(default)]
    pub inside_cidr_blocks: Vec<String>,
    /// Tunnel protocol.
    #[serde(default)]
    pub protocol: Option<String>,
    /// BGP sessions.
    #[serde(default)]
    pub bgp_configurations: Vec<BgpConfiguration>,
}

/// A Connect peer as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePeer {
    /// Peer identifier.
    pub transit_gateway_connect_peer_id: String,
    /// Parent Connect attachment.
    #[serde(default)]
    pub transit_gateway_attachment_id: Option<String>,
    /// Lifecycle state.
    pub state: PeerState,
    /// Creation time.
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    /// Peer configuration.
    #[serde(default)]
    pub connect_peer_configuration: Option<ConnectPeerConfiguration>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Reason for the current state.
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Request to create a Connect attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachmentRequest {
    /// Underlying transport attachment.
    pub transport_transit_gateway_attachment_id: String,
    /// Tunnel protocol.
    pub protocol: String,
    /// Tags to apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Request to create a Connect peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeerRequest {
    /// Parent Connect attachment.
    pub transit_gateway_attachment_id: String,
    /// Gateway-side tunnel address.
    pub transit_gateway_address: String,
    /// Peer tunnel address.
    pub peer_address: String,
    /// Peer ASN.
    pub peer_asn: i64,
    /// Inside-tunnel CIDR blocks.
    pub inside_cidr_blocks: Vec<String>,
    /// Tags to apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Tag {
    /// Converts a tag set into its wire list.
    #[must_use]
    pub fn list(tags: &KeyValueTags) -> Vec<Self> {
        tags.iter()
            .map(|(key, value)| Self {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Converts a wire list into a tag set.
    #[must_use]
    pub fn to_key_value_tags(tags: &[Self]) -> KeyValueTags {
        tags.iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect()
    }
}

impl Filter {
    /// Creates a filter.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

impl DescribeQuery {
    /// Query by a single identifier.
    #[must_use]
    pub fn by_id(id: &str) -> Self {
        Self {
            ids: vec![id.to_string()],
            filters: Vec::new(),
        }
    }
}

impl RemoteObject for RemoteAttachment {
    type State = AttachmentState;

    fn remote_id(&self) -> &str {
        &self.transit_gateway_attachment_id
    }

    fn state(&self) -> AttachmentState {
        self.state
    }

    fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

impl RemoteObject for RemotePeer {
    type State = PeerState;

    fn remote_id(&self) -> &str {
        &self.transit_gateway_connect_peer_id
    }

    fn state(&self) -> PeerState {
        self.state
    }

    fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Initiating => "initiating",
            Self::PendingAcceptance => "pendingAcceptance",
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Modifying => "modifying",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Failing => "failing",
            Self::Failed => "failed",
            Self::Rejecting => "rejecting",
            Self::Rejected => "rejected",
            Self::RollingBack => "rollingBack",
            Self::Unknown => "unknown",
        };
        write!(f, "{state}")
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        write!(f, "{state}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_attachment() {
        let json = r#"{
            "transitGatewayAttachmentId": "tgw-attach-connect-1",
            "transportTransitGatewayAttachmentId": "tgw-attach-1",
            "transitGatewayId": "tgw-1",
            "state": "pendingAcceptance",
            "options": { "protocol": "gre" },
            "tags": [{ "key": "Name", "value": "edge" }]
        }"#;

        let attachment: RemoteAttachment = serde_json::from_str(json).unwrap();
        assert_eq!(attachment.state, AttachmentState::PendingAcceptance);
        assert_eq!(attachment.options.unwrap().protocol.as_deref(), Some("gre"));
        assert_eq!(attachment.tags.len(), 1);
        assert!(attachment.creation_time.is_none());
    }

    #[test]
    fn test_unknown_state_tolerated() {
        let json = r#"{ "transitGatewayConnectPeerId": "tgw-connect-peer-1", "state": "quarantined" }"#;
        let peer: RemotePeer = serde_json::from_str(json).unwrap();
        assert_eq!(peer.state, PeerState::Unknown);
        assert!(peer.connect_peer_configuration.is_none());
    }

    #[test]
    fn test_create_peer_request_wire_shape() {
        let request = CreatePeerRequest {
            transit_gateway_attachment_id: String::from("tgw-attach-connect-1"),
            transit_gateway_address: String::from("10.0.0.1"),
            peer_address: String::from("172.16.0.1"),
            peer_asn: 64512,
            inside_cidr_blocks: vec![String::from("169.254.6.0/29")],
            tags: vec![],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["peerAsn"], 64512);
        assert_eq!(value["insideCidrBlocks"][0], "169.254.6.0/29");
        assert!(value.get("tags").is_none());
    }
}
