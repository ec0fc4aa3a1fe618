//! Scripted in-memory gateway used by tests.
//!
//! Describe calls pop the next scripted response; the last one keeps being
//! returned once the script runs dry, so a trailing `available` holds.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{GatewayError, GatewayResult};

use super::client::GatewayClient;
use super::types::{
    AttachmentState, BgpConfiguration, ConnectOptions, ConnectPeerConfiguration,
    CreateAttachmentRequest, CreatePeerRequest, DescribeQuery, PeerState, RemoteAttachment,
    RemotePeer,
};

type Script<T> = Mutex<VecDeque<GatewayResult<T>>>;

/// A gateway whose responses are queued up front.
#[derive(Default)]
pub struct ScriptedGateway {
    create_attachment: Script<RemoteAttachment>,
    describe_attachments: Script<Vec<RemoteAttachment>>,
    delete_attachment: Script<()>,
    create_peer: Script<RemotePeer>,
    describe_peer: Script<Option<RemotePeer>>,
    delete_peer: Script<()>,
    calls: Mutex<Vec<String>>,
    attachment_requests: Mutex<Vec<CreateAttachmentRequest>>,
    peer_requests: Mutex<Vec<CreatePeerRequest>>,
}

fn push<T>(script: &Script<T>, response: GatewayResult<T>) {
    script.lock().unwrap().push_back(response);
}

fn next<T: Clone>(script: &Script<T>, call: &str) -> GatewayResult<T> {
    let mut queue = script.lock().unwrap();
    if queue.len() > 1 {
        return queue.pop_front().unwrap();
    }
    queue
        .front()
        .cloned()
        .unwrap_or_else(|| Err(GatewayError::api("Unscripted", call)))
}

impl ScriptedGateway {
    /// Creates a gateway with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an attachment creation response.
    pub fn on_create_attachment(self, response: GatewayResult<RemoteAttachment>) -> Self {
        push(&self.create_attachment, response);
        self
    }

    /// Queues an attachment describe response.
    pub fn on_describe_attachments(self, response: GatewayResult<Vec<RemoteAttachment>>) -> Self {
        push(&self.describe_attachments, response);
        self
    }

    /// Queues one describe response per state, each a single attachment.
    pub fn with_attachment_states(mut self, id: &str, states: &[AttachmentState]) -> Self {
        for state in states {
            self = self.on_describe_attachments(Ok(vec![attachment(id, *state)]));
        }
        self
    }

    /// Queues an attachment deletion response.
    pub fn on_delete_attachment(self, response: GatewayResult<()>) -> Self {
        push(&self.delete_attachment, response);
        self
    }

    /// Queues a peer creation response.
    pub fn on_create_peer(self, response: GatewayResult<RemotePeer>) -> Self {
        push(&self.create_peer, response);
        self
    }

    /// Queues a peer describe response.
    pub fn on_describe_peer(self, response: GatewayResult<Option<RemotePeer>>) -> Self {
        push(&self.describe_peer, response);
        self
    }

    /// Queues one describe response per state, each a single peer.
    pub fn with_peer_states(mut self, id: &str, states: &[PeerState]) -> Self {
        for state in states {
            self = self.on_describe_peer(Ok(Some(peer(id, *state))));
        }
        self
    }

    /// Queues a peer deletion response.
    pub fn on_delete_peer(self, response: GatewayResult<()>) -> Self {
        push(&self.delete_peer, response);
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Attachment creation requests received so far.
    pub fn attachment_requests(&self) -> Vec<CreateAttachmentRequest> {
        self.attachment_requests.lock().unwrap().clone()
    }

    /// Peer creation requests received so far.
    pub fn peer_requests(&self) -> Vec<CreatePeerRequest> {
        self.peer_requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GatewayClient for ScriptedGateway {
    async fn create_attachment(
        &self,
        request: &CreateAttachmentRequest,
    ) -> GatewayResult<RemoteAttachment> {
        self.record(String::from("create_attachment"));
        self.attachment_requests.lock().unwrap().push(request.clone());
        next(&self.create_attachment, "create_attachment")
    }

    async fn describe_attachments(
        &self,
        query: &DescribeQuery,
    ) -> GatewayResult<Vec<RemoteAttachment>> {
        self.record(format!("describe_attachments {}", query.ids.join(",")));
        next(&self.describe_attachments, "describe_attachments")
    }

    async fn delete_attachment(&self, id: &str) -> GatewayResult<()> {
        self.record(format!("delete_attachment {id}"));
        next(&self.delete_attachment, "delete_attachment")
    }

    async fn create_peer(&self, request: &CreatePeerRequest) -> GatewayResult<RemotePeer> {
        self.record(String::from("create_peer"));
        self.peer_requests.lock().unwrap().push(request.clone());
        next(&self.create_peer, "create_peer")
    }

    async fn describe_peer(&self, id: &str) -> GatewayResult<Option<RemotePeer>> {
        self.record(format!("describe_peer {id}"));
        next(&self.describe_peer, "describe_peer")
    }

    async fn delete_peer(&self, id: &str) -> GatewayResult<()> {
        self.record(format!("delete_peer {id}"));
        next(&self.delete_peer, "delete_peer")
    }
}

/// A gre attachment on `tgw-1` over `tgw-attach-1`.
pub fn attachment(id: &str, state: AttachmentState) -> RemoteAttachment {
    RemoteAttachment {
        transit_gateway_attachment_id: id.to_string(),
        transport_transit_gateway_attachment_id: Some(String::from("tgw-attach-1")),
        transit_gateway_id: Some(String::from("tgw-1")),
        state,
        creation_time: None,
        options: Some(ConnectOptions {
            protocol: Some(String::from("gre")),
        }),
        tags: vec![],
        status_message: None,
    }
}

/// A peer on `tgw-attach-connect-1` with peer ASN 64512.
pub fn peer(id: &str, state: PeerState) -> RemotePeer {
    RemotePeer {
        transit_gateway_connect_peer_id: id.to_string(),
        transit_gateway_attachment_id: Some(String::from("tgw-attach-connect-1")),
        state,
        creation_time: None,
        connect_peer_configuration: Some(ConnectPeerConfiguration {
            transit_gateway_address: Some(String::from("10.0.0.1")),
            peer_address: Some(String::from("172.16.0.1")),
            inside_cidr_blocks: vec![String::from("169.254.6.0/29")],
            protocol: Some(String::from("gre")),
            bgp_configurations: vec![BgpConfiguration {
                transit_gateway_asn: Some(64_000),
                peer_asn: Some(64_512),
                bgp_status: Some(String::from("up")),
            }],
        }),
        tags: vec![],
        status_message: None,
    }
}
