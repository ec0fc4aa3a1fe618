//! Connect attachment resource kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayResult, ReconcileError};
use crate::gateway::{
    AttachmentState, CreateAttachmentRequest, DescribeQuery, GatewayClient, RemoteAttachment,
    RemoteObject, Tag,
};
use crate::poller::StateWait;
use crate::schema::{Attribute, ResourceSchema};
use crate::tags::{KeyValueTags, TagSettings};

use super::ResourceKind;

/// The Connect attachment kind.
#[derive(Debug, Clone, Copy)]
pub struct Attachment;

/// Desired attributes of a Connect attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    /// Tunnel protocol.
    pub protocol: Option<String>,
    /// Underlying transport attachment.
    pub transport_transit_gateway_attachment_id: Option<String>,
    /// Explicit tags.
    pub tags: KeyValueTags,
}

/// Decoded Connect attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentAttributes {
    /// Tunnel protocol.
    pub protocol: String,
    /// Owning transit gateway.
    pub transit_gateway_id: String,
    /// Underlying transport attachment.
    pub transport_transit_gateway_attachment_id: String,
    /// Explicitly set tags.
    pub tags: KeyValueTags,
    /// All tags including inherited defaults.
    pub tags_all: KeyValueTags,
}

#[async_trait]
impl ResourceKind for Attachment {
    type Spec = AttachmentSpec;
    type CreateRequest = CreateAttachmentRequest;
    type Remote = RemoteAttachment;
    type Attributes = AttachmentAttributes;

    const NAME: &'static str = "attachment";
    const DISPLAY: &'static str = "Transit Gateway Connect";
    const NOT_FOUND_CODES: &'static [&'static str] = &[
        "InvalidTransitGatewayAttachmentID.NotFound",
        "InvalidTransitGatewayConnectID.NotFound",
    ];

    const CREATION: StateWait<AttachmentState> = StateWait {
        target: &[AttachmentState::Available],
        failure: &[
            AttachmentState::Failing,
            AttachmentState::Failed,
            AttachmentState::Rejecting,
            AttachmentState::Rejected,
            AttachmentState::Deleting,
            AttachmentState::Deleted,
        ],
        absent_is_target: false,
    };

    const DELETION: StateWait<AttachmentState> = StateWait {
        target: &[AttachmentState::Deleted],
        failure: &[AttachmentState::Failed],
        absent_is_target: true,
    };

    const VANISHING: &'static [AttachmentState] =
        &[AttachmentState::Deleting, AttachmentState::Deleted];

    fn schema() -> ResourceSchema {
        ResourceSchema::new("tgw_connect_attachment")
            .with_attribute("protocol", Attribute::required_string().force_new())
            .with_attribute(
                "transport_transit_gateway_attachment_id",
                Attribute::required_string().force_new(),
            )
            .with_attribute("transit_gateway_id", Attribute::computed_string())
            .with_attribute("tags", Attribute::tags())
            .with_attribute("tags_all", Attribute::tags_all())
    }

    fn build_create(
        spec: &AttachmentSpec,
        tags: &TagSettings,
    ) -> Result<CreateAttachmentRequest, ReconcileError> {
        let protocol = required(spec.protocol.as_deref(), "protocol")?;
        let transport = required(
            spec.transport_transit_gateway_attachment_id.as_deref(),
            "transport_transit_gateway_attachment_id",
        )?;

        Ok(CreateAttachmentRequest {
            transport_transit_gateway_attachment_id: transport.to_string(),
            protocol: protocol.to_string(),
            tags: Tag::list(&tags.tags_for_create(&spec.tags)),
        })
    }

    fn decode(
        remote: &RemoteAttachment,
        tags: &TagSettings,
    ) -> Result<AttachmentAttributes, ReconcileError> {
        let options = remote.options.as_ref().ok_or_else(|| ReconcileError::Decode {
            kind: Self::DISPLAY.to_string(),
            id: remote.remote_id().to_string(),
            message: String::from("missing options"),
        })?;

        let views = tags.views(Tag::to_key_value_tags(&remote.tags));

        Ok(AttachmentAttributes {
            protocol: options.protocol.clone().unwrap_or_default(),
            transit_gateway_id: remote.transit_gateway_id.clone().unwrap_or_default(),
            transport_transit_gateway_attachment_id: remote
                .transport_transit_gateway_attachment_id
                .clone()
                .unwrap_or_default(),
            tags: views.tags,
            tags_all: views.tags_all,
        })
    }

    async fn submit_create(
        client: &dyn GatewayClient,
        request: &CreateAttachmentRequest,
    ) -> GatewayResult<RemoteAttachment> {
        client.create_attachment(request).await
    }

    async fn describe(
        client: &dyn GatewayClient,
        id: &str,
    ) -> GatewayResult<Option<RemoteAttachment>> {
        let found = client.describe_attachments(&DescribeQuery::by_id(id)).await?;
        Ok(found
            .into_iter()
            .find(|a| a.transit_gateway_attachment_id == id))
    }

    async fn submit_delete(client: &dyn GatewayClient, id: &str) -> GatewayResult<()> {
        client.delete_attachment(id).await
    }
}

fn required<'a>(value: Option<&'a str>, attribute: &str) -> Result<&'a str, ReconcileError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReconcileError::MissingAttribute {
            kind: Attachment::DISPLAY.to_string(),
            attribute: attribute.to_string(),
        })
}
