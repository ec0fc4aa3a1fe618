//! Gateway control-plane client.
//!
//! [`GatewayClient`] is the seam the reconcilers are written against; the
//! HTTP implementation never retries on its own, retry and backoff belong to
//! the state poller.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{GatewayError, GatewayResult};

use super::types::{
    CreateAttachmentRequest, CreatePeerRequest, DescribeQuery, RemoteAttachment, RemotePeer,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Path segment of the Connect attachment collection.
const ATTACHMENTS: &str = "transit-gateway-connects";

/// Path segment of the Connect peer collection.
const PEERS: &str = "transit-gateway-connect-peers";

/// Retry delay reported when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Remote operations on Connect attachments and Connect peers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Submits a Connect attachment creation.
    async fn create_attachment(
        &self,
        request: &CreateAttachmentRequest,
    ) -> GatewayResult<RemoteAttachment>;

    /// Describes Connect attachments matching the query.
    async fn describe_attachments(&self, query: &DescribeQuery)
    -> GatewayResult<Vec<RemoteAttachment>>;

    /// Submits a Connect attachment deletion.
    async fn delete_attachment(&self, id: &str) -> GatewayResult<()>;

    /// Submits a Connect peer creation.
    async fn create_peer(&self, request: &CreatePeerRequest) -> GatewayResult<RemotePeer>;

    /// Describes one Connect peer; `None` when the remote reports no object.
    async fn describe_peer(&self, id: &str) -> GatewayResult<Option<RemotePeer>>;

    /// Submits a Connect peer deletion.
    async fn delete_peer(&self, id: &str) -> GatewayResult<()>;
}

/// HTTP/JSON gateway client.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    /// HTTP client.
    client: Client,
    /// Control-plane base URL.
    endpoint: Url,
    /// Bearer token.
    api_token: String,
}

/// Error body returned by the control plane.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentEnvelope {
    transit_gateway_connect: RemoteAttachment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentListEnvelope {
    #[serde(default)]
    transit_gateway_connects: Vec<RemoteAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerEnvelope {
    #[serde(default)]
    transit_gateway_connect_peer: Option<RemotePeer>,
}

impl HttpGatewayClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, api_token: &str) -> GatewayResult<Self> {
        Self::with_timeout(endpoint, api_token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a base URL or the HTTP client
    /// cannot be created.
    pub fn with_timeout(endpoint: &str, api_token: &str, timeout_secs: u64) -> GatewayResult<Self> {
        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| GatewayError::network(format!("Invalid endpoint URL '{endpoint}'")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_token: api_token.to_string(),
        })
    }

    /// Builds a request to the endpoint path extended by `segments`.
    ///
    /// Each segment is percent-encoded, so an identifier can never add path
    /// components or a query of its own.
    fn request(&self, method: Method, segments: &[&str]) -> GatewayResult<RequestBuilder> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::network(format!("Invalid endpoint URL '{}'", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        trace!("{method} {url}");

        Ok(self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token)))
    }

    /// Sends a request and maps non-success statuses to gateway errors.
    async fn send(request: RequestBuilder) -> GatewayResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

            return Err(GatewayError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::AuthenticationFailed {
                message: String::from("Invalid API token"),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Gateway returned {status}: {body}");
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => GatewayError::api(err.code, err.message),
                Err(_) => GatewayError::api(format!("Http{}", status.as_u16()), body),
            });
        }

        Ok(response)
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> GatewayResult<T> {
        Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn create_attachment(
        &self,
        request: &CreateAttachmentRequest,
    ) -> GatewayResult<RemoteAttachment> {
        let envelope: AttachmentEnvelope =
            Self::json(self.request(Method::POST, &[ATTACHMENTS])?.json(request)).await?;
        Ok(envelope.transit_gateway_connect)
    }

    async fn describe_attachments(
        &self,
        query: &DescribeQuery,
    ) -> GatewayResult<Vec<RemoteAttachment>> {
        let envelope: AttachmentListEnvelope = Self::json(
            self.request(Method::POST, &[ATTACHMENTS, "describe"])?
                .json(query),
        )
        .await?;
        Ok(envelope.transit_gateway_connects)
    }

    async fn delete_attachment(&self, id: &str) -> GatewayResult<()> {
        Self::send(self.request(Method::DELETE, &[ATTACHMENTS, id])?).await?;
        Ok(())
    }

    async fn create_peer(&self, request: &CreatePeerRequest) -> GatewayResult<RemotePeer> {
        let envelope: PeerEnvelope = Self::json(
            self.request(Method::POST, &[PEERS])?
                .json(request),
        )
        .await?;
        envelope
            .transit_gateway_connect_peer
            .ok_or_else(|| GatewayError::InvalidResponse {
                message: String::from("No peer in create response"),
            })
    }

    async fn describe_peer(&self, id: &str) -> GatewayResult<Option<RemotePeer>> {
        let envelope: PeerEnvelope = Self::json(self.request(Method::GET, &[PEERS, id])?).await?;
        Ok(envelope.transit_gateway_connect_peer)
    }

    async fn delete_peer(&self, id: &str) -> GatewayResult<()> {
        Self::send(self.request(Method::DELETE, &[PEERS, id])?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::{AttachmentState, Filter, PeerState};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> HttpGatewayClient {
        HttpGatewayClient::new(&server.uri(), "secret").unwrap()
    }

    #[tokio::test]
    async fn test_describe_attachments_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transit-gateway-connects/describe"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({
                "filters": [{ "name": "transport-transit-gateway-attachment-id", "values": ["tgw-attach-1"] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transitGatewayConnects": [{
                    "transitGatewayAttachmentId": "tgw-attach-connect-1",
                    "state": "available",
                    "options": { "protocol": "gre" }
                }]
            })))
            .mount(&server)
            .await;

        let query = DescribeQuery {
            ids: vec![],
            filters: vec![Filter::new(
                "transport-transit-gateway-attachment-id",
                vec![String::from("tgw-attach-1")],
            )],
        };
        let found = client(&server).await.describe_attachments(&query).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].state, AttachmentState::Available);
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_code() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/transit-gateway-connect-peers/tgw-connect-peer-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "InvalidTransitGatewayConnectPeerID.NotFound",
                "message": "The connect peer ID 'tgw-connect-peer-1' does not exist"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .delete_peer("tgw-connect-peer-1")
            .await
            .unwrap_err();

        assert!(err.is_code("InvalidTransitGatewayConnectPeerID.NotFound"));
    }

    #[tokio::test]
    async fn test_throttle_and_auth_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transit-gateway-connect-peers/slow"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transit-gateway-connect-peers/denied"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client(&server).await;

        let err = client.describe_peer("slow").await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { retry_after_secs: 7 }));
        assert!(err.is_retryable());

        let err = client.describe_peer("denied").await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_describe_peer_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transit-gateway-connect-peers/tgw-connect-peer-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transit-gateway-connect-peers/tgw-connect-peer-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transitGatewayConnectPeer": {
                    "transitGatewayConnectPeerId": "tgw-connect-peer-2",
                    "state": "deleting"
                }
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert!(client.describe_peer("tgw-connect-peer-1").await.unwrap().is_none());
        let peer = client.describe_peer("tgw-connect-peer-2").await.unwrap().unwrap();
        assert_eq!(peer.state, PeerState::Deleting);
    }

    #[tokio::test]
    async fn test_ids_are_escaped_into_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/transit-gateway-connects/tgw-attach%2Fadmin%3Fforce"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpGatewayClient::new(&format!("{}/api/", server.uri()), "secret").unwrap();

        client.delete_attachment("tgw-attach/admin?force").await.unwrap();
    }

    #[test]
    fn test_endpoint_must_be_a_base_url() {
        assert!(HttpGatewayClient::new("gateway.example.net", "secret").is_err());
        assert!(HttpGatewayClient::new("mailto:ops@example.net", "secret").is_err());
        assert!(HttpGatewayClient::new("https://gateway.example.net", "secret").is_ok());
    }
}
