//! Connect peer resource kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayResult, ReconcileError};
use crate::gateway::{
    CreatePeerRequest, GatewayClient, PeerState, RemoteObject, RemotePeer, Tag,
};
use crate::poller::StateWait;
use crate::schema::{Attribute, AttributeType, ResourceSchema};
use crate::tags::{KeyValueTags, TagSettings};

use super::ResourceKind;

/// The Connect peer kind.
#[derive(Debug, Clone, Copy)]
pub struct Peer;

/// Desired attributes of a Connect peer. All of them are create-time only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSpec {
    /// Parent Connect attachment.
    pub transport_transit_gateway_attachment_id: Option<String>,
    /// Gateway-side tunnel address.
    pub transit_gateway_address: Option<String>,
    /// Peer tunnel address.
    pub peer_address: Option<String>,
    /// Peer ASN.
    pub peer_asn: Option<i64>,
    /// Inside-tunnel CIDR blocks.
    pub inside_cidr_blocks: Vec<String>,
    /// Explicit tags.
    pub tags: KeyValueTags,
}

/// Decoded Connect peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAttributes {
    /// Parent Connect attachment.
    pub transport_transit_gateway_attachment_id: String,
    /// Gateway-side tunnel address.
    pub transit_gateway_address: String,
    /// Peer tunnel address.
    pub peer_address: String,
    /// Peer ASN, from the first BGP configuration.
    pub peer_asn: i64,
    /// Gateway-side ASN.
    pub transit_gateway_asn: Option<i64>,
    /// Inside-tunnel CIDR blocks.
    pub inside_cidr_blocks: Vec<String>,
    /// Explicitly set tags.
    pub tags: KeyValueTags,
    /// All tags including inherited defaults.
    pub tags_all: KeyValueTags,
}

#[async_trait]
impl ResourceKind for Peer {
    type Spec = PeerSpec;
    type CreateRequest = CreatePeerRequest;
    type Remote = RemotePeer;
    type Attributes = PeerAttributes;

    const NAME: &'static str = "peer";
    const DISPLAY: &'static str = "Transit Gateway Connect Peer";
    const NOT_FOUND_CODES: &'static [&'static str] =
        &["InvalidTransitGatewayConnectPeerID.NotFound"];

    const CREATION: StateWait<PeerState> = StateWait {
        target: &[PeerState::Available],
        failure: &[PeerState::Failed, PeerState::Deleting, PeerState::Deleted],
        absent_is_target: false,
    };

    const DELETION: StateWait<PeerState> = StateWait {
        target: &[PeerState::Deleted],
        failure: &[PeerState::Failed],
        absent_is_target: true,
    };

    const VANISHING: &'static [PeerState] = &[PeerState::Deleting, PeerState::Deleted];

    fn schema() -> ResourceSchema {
        ResourceSchema::new("tgw_connect_peer")
            .with_attribute(
                "transport_transit_gateway_attachment_id",
                Attribute::required_string().force_new(),
            )
            .with_attribute(
                "transit_gateway_address",
                Attribute::required_string().force_new(),
            )
            .with_attribute("peer_address", Attribute::required_string().force_new())
            .with_attribute(
                "peer_asn",
                Attribute::of(AttributeType::Int).required().force_new(),
            )
            .with_attribute(
                "inside_cidr_blocks",
                Attribute::of(AttributeType::StringList).required().force_new(),
            )
            .with_attribute(
                "transit_gateway_asn",
                Attribute::of(AttributeType::Int).computed(),
            )
            .with_attribute("tags", Attribute::tags().force_new())
            .with_attribute("tags_all", Attribute::tags_all())
    }

    fn build_create(spec: &PeerSpec, tags: &TagSettings) -> Result<CreatePeerRequest, ReconcileError> {
        let attachment = required(
            spec.transport_transit_gateway_attachment_id.clone(),
            "transport_transit_gateway_attachment_id",
        )?;
        let transit_gateway_address =
            required(spec.transit_gateway_address.clone(), "transit_gateway_address")?;
        let peer_address = required(spec.peer_address.clone(), "peer_address")?;
        let peer_asn = spec.peer_asn.ok_or_else(|| missing("peer_asn"))?;
        if spec.inside_cidr_blocks.is_empty() {
            return Err(missing("inside_cidr_blocks"));
        }

        Ok(CreatePeerRequest {
            transit_gateway_attachment_id: attachment,
            transit_gateway_address,
            peer_address,
            peer_asn,
            inside_cidr_blocks: spec.inside_cidr_blocks.clone(),
            tags: Tag::list(&tags.tags_for_create(&spec.tags)),
        })
    }

    fn decode(remote: &RemotePeer, tags: &TagSettings) -> Result<PeerAttributes, ReconcileError> {
        let decode_error = |message: &str| ReconcileError::Decode {
            kind: Self::DISPLAY.to_string(),
            id: remote.remote_id().to_string(),
            message: message.to_string(),
        };

        let configuration = remote
            .connect_peer_configuration
            .as_ref()
            .ok_or_else(|| decode_error("missing options"))?;

        // The ASN lives in the BGP block, not next to the addresses.
        let bgp = configuration
            .bgp_configurations
            .first()
            .ok_or_else(|| decode_error("missing BGP configuration"))?;
        let peer_asn = bgp
            .peer_asn
            .ok_or_else(|| decode_error("missing peer ASN"))?;

        let views = tags.views(Tag::to_key_value_tags(&remote.tags));

        Ok(PeerAttributes {
            transport_transit_gateway_attachment_id: remote
                .transit_gateway_attachment_id
                .clone()
                .unwrap_or_default(),
            transit_gateway_address: configuration
                .transit_gateway_address
                .clone()
                .unwrap_or_default(),
            peer_address: configuration.peer_address.clone().unwrap_or_default(),
            peer_asn,
            transit_gateway_asn: bgp.transit_gateway_asn,
            inside_cidr_blocks: configuration.inside_cidr_blocks.clone(),
            tags: views.tags,
            tags_all: views.tags_all,
        })
    }

    async fn submit_create(
        client: &dyn GatewayClient,
        request: &CreatePeerRequest,
    ) -> GatewayResult<RemotePeer> {
        client.create_peer(request).await
    }

    async fn describe(client: &dyn GatewayClient, id: &str) -> GatewayResult<Option<RemotePeer>> {
        client.describe_peer(id).await
    }

    async fn submit_delete(client: &dyn GatewayClient, id: &str) -> GatewayResult<()> {
        client.delete_peer(id).await
    }
}

fn missing(attribute: &str) -> ReconcileError {
    ReconcileError::MissingAttribute {
        kind: Peer::DISPLAY.to_string(),
        attribute: attribute.to_string(),
    }
}

fn required(value: Option<String>, attribute: &str) -> Result<String, ReconcileError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| missing(attribute))
}
