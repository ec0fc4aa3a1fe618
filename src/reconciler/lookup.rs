//! Read-only lookup of a single Connect attachment.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Operation, ReconcileError, Result};
use crate::gateway::{DescribeQuery, Filter, GatewayClient};
use crate::schema::{Attribute, AttributeType, ResourceSchema};
use crate::tags::{KeyValueTags, TagSettings};

use super::{Attachment, ResourceKind};

/// Lookup criteria: an identifier, filters, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupCriteria {
    /// Explicit attachment identifier.
    pub id: Option<String>,
    /// Server-side filters.
    pub filters: Vec<Filter>,
}

/// The one attachment a lookup matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentLookupResult {
    /// Remote-assigned identifier.
    pub id: String,
    /// Tunnel protocol.
    pub protocol: String,
    /// Owning transit gateway.
    pub transit_gateway_id: String,
    /// Underlying transport attachment.
    pub transport_transit_gateway_attachment_id: String,
    /// Remote tags, reserved and ignored keys removed.
    pub tags: KeyValueTags,
}

/// Finds exactly one Connect attachment.
pub struct AttachmentLookup {
    client: Arc<dyn GatewayClient>,
    tags: TagSettings,
}

impl LookupCriteria {
    /// Criteria matching a single identifier.
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            filters: Vec::new(),
        }
    }

    /// Adds a filter.
    #[must_use]
    pub fn with_filter(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.filters.push(Filter::new(name, values));
        self
    }

    fn validate(&self) -> std::result::Result<(), ReconcileError> {
        let invalid = |message: &str| ReconcileError::InvalidCriteria {
            kind: Attachment::DISPLAY.to_string(),
            message: message.to_string(),
        };

        if self.id.as_deref().is_none_or(str::is_empty) && self.filters.is_empty() {
            return Err(invalid("an id or at least one filter is required"));
        }
        if self.filters.iter().any(|f| f.name.is_empty() || f.values.is_empty()) {
            return Err(invalid("every filter needs a name and at least one value"));
        }
        Ok(())
    }
}

impl AttachmentLookup {
    /// Creates a lookup resolver.
    #[must_use]
    pub fn new(client: Arc<dyn GatewayClient>, tags: TagSettings) -> Self {
        Self { client, tags }
    }

    /// Attribute schema of the lookup.
    #[must_use]
    pub fn schema() -> ResourceSchema {
        ResourceSchema::new("tgw_connect_attachment_lookup")
            .with_attribute(
                "id",
                Attribute::of(AttributeType::String).optional().computed(),
            )
            .with_attribute("filter", Attribute::of(AttributeType::FilterSet).optional())
            .with_attribute("protocol", Attribute::computed_string())
            .with_attribute("transit_gateway_id", Attribute::computed_string())
            .with_attribute(
                "transport_transit_gateway_attachment_id",
                Attribute::computed_string(),
            )
            .with_attribute("tags", Attribute::of(AttributeType::StringMap).computed())
    }

    /// Resolves the criteria to exactly one attachment.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidCriteria`] for empty criteria,
    /// [`ReconcileError::NoResults`] when nothing matches or the identifier is unknown,
    /// [`ReconcileError::AmbiguousResult`] when several objects match, and
    /// [`ReconcileError::Decode`] when the match lacks its options.
    pub async fn find_one(&self, criteria: &LookupCriteria) -> Result<AttachmentLookupResult> {
        criteria.validate()?;

        let query = DescribeQuery {
            ids: criteria.id.iter().cloned().collect(),
            filters: criteria.filters.clone(),
        };
        debug!("Looking up {}: {query:?}", Attachment::DISPLAY);

        let mut found = self
            .client
            .describe_attachments(&query)
            .await
            .map_err(|source| {
                if Attachment::is_missing(&source) {
                    ReconcileError::NoResults {
                        kind: Attachment::DISPLAY.to_string(),
                    }
                } else {
                    ReconcileError::Operation {
                        kind: Attachment::DISPLAY.to_string(),
                        operation: Operation::Lookup,
                        id: criteria.id.clone(),
                        source,
                    }
                }
            })?;

        let remote = match found.len() {
            0 => {
                return Err(ReconcileError::NoResults {
                    kind: Attachment::DISPLAY.to_string(),
                }
                .into());
            }
            1 => found.remove(0),
            count => {
                return Err(ReconcileError::AmbiguousResult {
                    kind: Attachment::DISPLAY.to_string(),
                    count,
                }
                .into());
            }
        };

        let attributes = Attachment::decode(&remote, &self.tags)?;

        Ok(AttachmentLookupResult {
            id: remote.transit_gateway_attachment_id,
            protocol: attributes.protocol,
            transit_gateway_id: attributes.transit_gateway_id,
            transport_transit_gateway_attachment_id: attributes
                .transport_transit_gateway_attachment_id,
            tags: attributes.tags_all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, TgwError};
    use crate::gateway::fake::{ScriptedGateway, attachment};
    use crate::gateway::{AttachmentState, MockGatewayClient, Tag};
    use crate::tags::{DefaultTagsConfig, IgnoreTagsConfig};
    use mockall::predicate::function;

    fn lookup(gateway: ScriptedGateway) -> AttachmentLookup {
        AttachmentLookup::new(Arc::new(gateway), TagSettings::default())
    }

    fn by_transport() -> LookupCriteria {
        LookupCriteria::default().with_filter(
            "transport-transit-gateway-attachment-id",
            vec![String::from("tgw-attach-1")],
        )
    }

    #[tokio::test]
    async fn test_no_match_is_no_results() {
        let gateway = ScriptedGateway::new().on_describe_attachments(Ok(vec![]));

        let err = lookup(gateway).find_one(&by_transport()).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(err.to_string().contains("no results found"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_no_results() {
        let mut client = MockGatewayClient::new();
        client
            .expect_describe_attachments()
            .times(1)
            .returning(|_| {
                Err(GatewayError::api(
                    "InvalidTransitGatewayAttachmentID.NotFound",
                    "does not exist",
                ))
            });
        let resolver = AttachmentLookup::new(Arc::new(client), TagSettings::default());

        let err = resolver
            .find_one(&LookupCriteria::by_id("tgw-attach-connect-9"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(matches!(err, TgwError::Reconcile(ReconcileError::NoResults { .. })));
    }

    #[tokio::test]
    async fn test_other_describe_errors_stay_lookup_failures() {
        let gateway = ScriptedGateway::new()
            .on_describe_attachments(Err(GatewayError::api("UnauthorizedOperation", "denied")));

        let err = lookup(gateway)
            .find_one(&LookupCriteria::by_id("tgw-attach-connect-9"))
            .await
            .unwrap_err();

        assert!(!err.is_not_found());
        assert!(matches!(
            err,
            TgwError::Reconcile(ReconcileError::Operation { operation: Operation::Lookup, .. })
        ));
    }

    #[tokio::test]
    async fn test_two_matches_is_ambiguous() {
        let gateway = ScriptedGateway::new().on_describe_attachments(Ok(vec![
            attachment("tgw-attach-connect-1", AttachmentState::Available),
            attachment("tgw-attach-connect-2", AttachmentState::Available),
        ]));

        let err = lookup(gateway).find_one(&by_transport()).await.unwrap_err();

        assert!(matches!(
            err,
            TgwError::Reconcile(ReconcileError::AmbiguousResult { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_single_match_is_decoded() {
        let mut remote = attachment("tgw-attach-connect-1", AttachmentState::Available);
        remote.tags = Tag::list(&[("team", "net"), ("Name", "edge")].into_iter().collect());
        let gateway = ScriptedGateway::new().on_describe_attachments(Ok(vec![remote]));
        let settings = TagSettings::new(
            DefaultTagsConfig::new([("team", "net")].into_iter().collect()),
            IgnoreTagsConfig::default(),
        );

        let found = AttachmentLookup::new(Arc::new(gateway), settings)
            .find_one(&LookupCriteria::by_id("tgw-attach-connect-1"))
            .await
            .unwrap();

        assert_eq!(found.id, "tgw-attach-connect-1");
        assert_eq!(found.protocol, "gre");
        assert_eq!(found.transit_gateway_id, "tgw-1");
        // lookups expose every non-reserved tag, defaults included
        assert_eq!(found.tags.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_options_is_decode_error() {
        let mut remote = attachment("tgw-attach-connect-1", AttachmentState::Available);
        remote.options = None;
        let gateway = ScriptedGateway::new().on_describe_attachments(Ok(vec![remote]));

        let err = lookup(gateway).find_one(&by_transport()).await.unwrap_err();

        assert!(matches!(err, TgwError::Reconcile(ReconcileError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_empty_criteria_rejected_before_calling() {
        let mut client = MockGatewayClient::new();
        client.expect_describe_attachments().never();
        let resolver = AttachmentLookup::new(Arc::new(client), TagSettings::default());

        let err = resolver.find_one(&LookupCriteria::default()).await.unwrap_err();

        assert!(matches!(err, TgwError::Reconcile(ReconcileError::InvalidCriteria { .. })));
    }

    #[tokio::test]
    async fn test_id_and_filters_are_combined() {
        let mut client = MockGatewayClient::new();
        client
            .expect_describe_attachments()
            .with(function(|q: &DescribeQuery| {
                q.ids == ["tgw-attach-connect-1"] && q.filters.len() == 1
            }))
            .times(1)
            .returning(|_| {
                Ok(vec![attachment(
                    "tgw-attach-connect-1",
                    AttachmentState::Available,
                )])
            });
        let resolver = AttachmentLookup::new(Arc::new(client), TagSettings::default());
        let criteria = LookupCriteria::by_id("tgw-attach-connect-1")
            .with_filter("state", vec![String::from("available")]);

        let found = resolver.find_one(&criteria).await.unwrap();

        assert_eq!(
            found.transport_transit_gateway_attachment_id,
            "tgw-attach-1"
        );
    }
}
