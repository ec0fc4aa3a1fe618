//! Refreshing recorded state against the gateway.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StackConfig;
use crate::error::Result;
use crate::gateway::GatewayClient;
use crate::reconciler::{Attachment, Peer, Reconciler};
use crate::state::StackState;

/// One reconciler per resource kind, configured from the stack.
pub struct StackReconcilers {
    /// Connect attachment reconciler.
    pub attachments: Reconciler<Attachment>,
    /// Connect peer reconciler.
    pub peers: Reconciler<Peer>,
}

/// What a refresh changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entries re-read successfully.
    pub refreshed: Vec<String>,
    /// Entries removed because the remote object is gone.
    pub vanished: Vec<String>,
}

impl StackReconcilers {
    /// Builds reconcilers sharing one client, with the stack's tag
    /// settings, poll timing and timeouts.
    #[must_use]
    pub fn new(client: Arc<dyn GatewayClient>, config: &StackConfig) -> Self {
        let tags = config.tag_settings();
        let polling = config.poll_settings();
        let (create, delete) = (config.create_timeout(), config.delete_timeout());

        Self {
            attachments: Reconciler::new(Arc::clone(&client), tags.clone())
                .with_polling(polling)
                .with_timeouts(create, delete),
            peers: Reconciler::new(client, tags)
                .with_polling(polling)
                .with_timeouts(create, delete),
        }
    }

    /// Re-reads every recorded resource.
    ///
    /// Entries whose remote object is gone (or going) are removed. Tainted
    /// entries stay tainted: only their existence is checked.
    ///
    /// # Errors
    ///
    /// Returns the first read failure; entries refreshed before it keep
    /// their new attributes.
    pub async fn refresh(&self, state: &mut StackState) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        let names: Vec<String> = state.attachments.keys().cloned().collect();
        for name in names {
            let Some(entry) = state.attachments.get(&name) else {
                continue;
            };
            let tainted = entry.is_tainted();
            let mut data = entry.to_data();
            self.attachments.read(&mut data).await?;

            if !data.exists() {
                warn!("Attachment {name} no longer exists remotely");
                state.remove_attachment(&name);
                report.vanished.push(format!("attachment.{name}"));
                continue;
            }
            if !tainted {
                if let (Some(attributes), Some(entry)) =
                    (data.attributes, state.attachments.get_mut(&name))
                {
                    entry.set_attributes(attributes);
                }
            }
            report.refreshed.push(format!("attachment.{name}"));
        }

        let names: Vec<String> = state.peers.keys().cloned().collect();
        for name in names {
            let Some(entry) = state.peers.get(&name) else {
                continue;
            };
            let tainted = entry.is_tainted();
            let mut data = entry.to_data();
            self.peers.read(&mut data).await?;

            if !data.exists() {
                warn!("Peer {name} no longer exists remotely");
                state.remove_peer(&name);
                report.vanished.push(format!("peer.{name}"));
                continue;
            }
            if !tainted {
                if let (Some(attributes), Some(entry)) =
                    (data.attributes, state.peers.get_mut(&name))
                {
                    entry.set_attributes(attributes);
                }
            }
            report.refreshed.push(format!("peer.{name}"));
        }

        info!(
            "Refreshed {} resources, {} vanished",
            report.refreshed.len(),
            report.vanished.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::ScriptedGateway;
    use crate::gateway::{AttachmentState, PeerState};
    use crate::planner::diff::tests::{config, converged_state};
    use crate::state::ResourceState;

    #[tokio::test]
    async fn test_refresh_updates_attributes() {
        let config = config();
        let mut state = converged_state(&config);
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_attachment_states("tgw-attach-connect-1", &[AttachmentState::Available])
                .with_peer_states("tgw-connect-peer-1", &[PeerState::Available]),
        );

        let report = StackReconcilers::new(gateway.clone(), &config)
            .refresh(&mut state)
            .await
            .unwrap();

        assert_eq!(report.refreshed, vec!["attachment.edge", "peer.edge-peer"]);
        assert!(report.vanished.is_empty());
        // The scripted remote carries no tags
        let attributes = state.attachments["edge"].attributes.as_ref().unwrap();
        assert!(attributes.tags_all.is_empty());
        assert_eq!(
            gateway.calls(),
            vec![
                "describe_attachments tgw-attach-connect-1",
                "describe_peer tgw-connect-peer-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_drops_vanished_entries() {
        let config = config();
        let mut state = converged_state(&config);
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on_describe_attachments(Ok(vec![]))
                .with_peer_states("tgw-connect-peer-1", &[PeerState::Deleted]),
        );

        let report = StackReconcilers::new(gateway, &config)
            .refresh(&mut state)
            .await
            .unwrap();

        assert_eq!(report.vanished, vec!["attachment.edge", "peer.edge-peer"]);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_tainted_entries_tainted() {
        let config = config();
        let mut state = StackState::new("edge-network");
        state.set_attachment(ResourceState::new("edge", "tgw-attach-connect-1", "abc"));
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_attachment_states("tgw-attach-connect-1", &[AttachmentState::Pending]),
        );

        StackReconcilers::new(gateway, &config)
            .refresh(&mut state)
            .await
            .unwrap();

        assert!(state.attachments["edge"].is_tainted());
    }
}
