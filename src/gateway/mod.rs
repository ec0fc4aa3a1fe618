//! Gateway control-plane integration module.
//!
//! This module provides the client for the remote control plane that owns
//! Connect attachments and Connect peers, plus the wire types it exchanges.

mod client;
#[cfg(test)]
pub mod fake;
mod types;

#[cfg(test)]
pub use client::MockGatewayClient;
pub use client::{GatewayClient, HttpGatewayClient};
pub use types::{
    AttachmentState, BgpConfiguration, ConnectOptions, ConnectPeerConfiguration,
    CreateAttachmentRequest, CreatePeerRequest, DescribeQuery, Filter, PeerState,
    RemoteAttachment, RemoteObject, RemotePeer, Tag,
};
