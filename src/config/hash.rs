//! Declaration hashing for change detection.
//!
//! The state file records a hash of the declaration each resource was
//! created from, so `plan` can tell a changed declaration from remote drift.

use sha2::{Digest, Sha256};

use super::spec::{AttachmentConfig, PeerConfig, StackConfig};
use crate::tags::KeyValueTags;

/// Hasher for computing declaration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of every declaration in the stack.
    #[must_use]
    pub fn hash_config(&self, config: &StackConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.stack.name.as_bytes());

        // Declaration order does not matter
        let mut attachments: Vec<_> = config.attachments.iter().collect();
        attachments.sort_by(|a, b| a.name.cmp(&b.name));
        for attachment in attachments {
            hasher.update(self.hash_attachment(attachment).as_bytes());
        }

        let mut peers: Vec<_> = config.peers.iter().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        for peer in peers {
            hasher.update(self.hash_peer(peer).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single attachment declaration.
    ///
    /// Tags are left out: a tag change on an attachment is reported, never
    /// turned into a replacement.
    #[must_use]
    pub fn hash_attachment(&self, attachment: &AttachmentConfig) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, &attachment.name);
        field(&mut hasher, &attachment.protocol);
        field(&mut hasher, &attachment.transport_transit_gateway_attachment_id);

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single peer declaration.
    #[must_use]
    pub fn hash_peer(&self, peer: &PeerConfig) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, &peer.name);
        field(&mut hasher, peer.attachment.as_deref().unwrap_or_default());
        field(
            &mut hasher,
            peer.transport_transit_gateway_attachment_id
                .as_deref()
                .unwrap_or_default(),
        );
        field(&mut hasher, &peer.transit_gateway_address);
        field(&mut hasher, &peer.peer_address);
        hasher.update(peer.peer_asn.to_be_bytes());
        for block in &peer.inside_cidr_blocks {
            field(&mut hasher, block);
        }
        tags(&mut hasher, &peer.tags);

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Hashes a length-prefixed string so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

fn tags(hasher: &mut Sha256, tags: &KeyValueTags) {
    // KeyValueTags iterates in key order
    for (key, value) in tags.iter() {
        field(hasher, key);
        field(hasher, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str) -> AttachmentConfig {
        AttachmentConfig {
            name: name.to_string(),
            protocol: String::from("gre"),
            transport_transit_gateway_attachment_id: String::from("tgw-attach-0a1b"),
            tags: KeyValueTags::new(),
        }
    }

    fn peer() -> PeerConfig {
        PeerConfig {
            name: String::from("edge-peer"),
            attachment: Some(String::from("edge")),
            transport_transit_gateway_attachment_id: None,
            transit_gateway_address: String::from("10.0.0.1"),
            peer_address: String::from("172.16.0.1"),
            peer_asn: 64512,
            inside_cidr_blocks: vec![String::from("169.254.6.0/29")],
            tags: KeyValueTags::new(),
        }
    }

    #[test]
    fn test_attachment_hash_deterministic() {
        let hasher = ConfigHasher::new();
        assert_eq!(
            hasher.hash_attachment(&attachment("edge")),
            hasher.hash_attachment(&attachment("edge"))
        );
        assert_ne!(
            hasher.hash_attachment(&attachment("edge")),
            hasher.hash_attachment(&attachment("core"))
        );
    }

    #[test]
    fn test_attachment_hash_ignores_tags() {
        let hasher = ConfigHasher::new();
        let mut tagged = attachment("edge");
        tagged.tags.insert("Name", "edge");

        assert_eq!(
            hasher.hash_attachment(&attachment("edge")),
            hasher.hash_attachment(&tagged)
        );
    }

    #[test]
    fn test_peer_hash_tracks_asn_and_tags() {
        let hasher = ConfigHasher::new();
        let base = hasher.hash_peer(&peer());

        let mut changed = peer();
        changed.peer_asn = 64513;
        assert_ne!(base, hasher.hash_peer(&changed));

        let mut tagged = peer();
        tagged.tags.insert("Name", "edge");
        assert_ne!(base, hasher.hash_peer(&tagged));
    }

    #[test]
    fn test_field_boundaries_matter() {
        let hasher = ConfigHasher::new();
        let mut a = peer();
        a.transit_gateway_address = String::from("10.0.0.1");
        a.peer_address = String::from("72.16.0.1");
        let mut b = peer();
        b.transit_gateway_address = String::from("10.0.0.17");
        b.peer_address = String::from("2.16.0.1");

        assert_ne!(hasher.hash_peer(&a), hasher.hash_peer(&b));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
    }
}
