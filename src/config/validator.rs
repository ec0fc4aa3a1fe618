//! Configuration validation for stack files.
//!
//! This module validates declarations before anything is sent to the
//! gateway, so a bad address or ASN fails locally instead of halfway
//! through an apply.

use crate::error::{ConfigError, Result, TgwError};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

use super::spec::{AttachmentConfig, PeerConfig, ProviderConfig, StackConfig};

/// Supported tunnel protocols.
const SUPPORTED_PROTOCOLS: &[&str] = &["gre"];

/// Highest valid peer ASN (4294967295 is reserved).
const MAX_ASN: i64 = 4_294_967_294;

/// IPv4 inside blocks the gateway reserves for itself.
const RESERVED_INSIDE_BLOCKS: &[&str] = &[
    "169.254.0.0/29",
    "169.254.1.0/29",
    "169.254.2.0/29",
    "169.254.3.0/29",
    "169.254.4.0/29",
    "169.254.5.0/29",
    "169.254.169.248/29",
];

/// Validator for stack configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a stack configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &StackConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(TgwError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and collects all findings.
    #[must_use]
    pub fn check(&self, config: &StackConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.stack.name.is_empty() {
            result.error("stack.name", "Stack name cannot be empty");
        } else if !is_valid_name(&config.stack.name) {
            result.error(
                "stack.name",
                format!(
                    "Stack name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.stack.name
                ),
            );
        }

        Self::validate_provider(&config.provider, &mut result);
        let attachment_names = Self::validate_attachments(&config.attachments, &mut result);
        Self::validate_peers(&config.peers, &attachment_names, &mut result);

        if config.resource_count() == 0 {
            result
                .warnings
                .push(String::from("No attachments or peers defined in configuration"));
        }

        result
    }

    fn validate_provider(provider: &ProviderConfig, result: &mut ValidationResult) {
        if provider.timeouts.create_secs == 0 {
            result.error("provider.timeouts.create_secs", "Create timeout must be positive");
        }
        if provider.timeouts.delete_secs == 0 {
            result.error("provider.timeouts.delete_secs", "Delete timeout must be positive");
        }
        if provider.polling.interval_secs == 0 {
            result.error("provider.polling.interval_secs", "Poll interval must be positive");
        }
        if provider.polling.max_interval_secs < provider.polling.interval_secs {
            result.error(
                "provider.polling.max_interval_secs",
                "Maximum poll interval cannot be shorter than the poll interval",
            );
        }
        if provider.endpoint.is_none() {
            result.warnings.push(String::from(
                "provider.endpoint is not set; TGWC_ENDPOINT must be provided at run time",
            ));
        }
    }

    fn validate_attachments<'a>(
        attachments: &'a [AttachmentConfig],
        result: &mut ValidationResult,
    ) -> HashSet<&'a str> {
        let mut seen_names = HashSet::new();

        for (i, attachment) in attachments.iter().enumerate() {
            let prefix = format!("attachments[{i}]");

            Self::validate_name(&attachment.name, &prefix, "attachment", &mut seen_names, result);

            if !SUPPORTED_PROTOCOLS.contains(&attachment.protocol.as_str()) {
                result.error(
                    format!("{prefix}.protocol"),
                    format!(
                        "Unsupported protocol '{}'. Supported: {}",
                        attachment.protocol,
                        SUPPORTED_PROTOCOLS.join(", ")
                    ),
                );
            }

            if attachment.transport_transit_gateway_attachment_id.is_empty() {
                result.error(
                    format!("{prefix}.transport_transit_gateway_attachment_id"),
                    "Transport attachment id cannot be empty",
                );
            }
        }

        seen_names
    }

    fn validate_peers(
        peers: &[PeerConfig],
        attachment_names: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let mut seen_names = HashSet::new();

        for (i, peer) in peers.iter().enumerate() {
            let prefix = format!("peers[{i}]");

            Self::validate_name(&peer.name, &prefix, "peer", &mut seen_names, result);

            match (&peer.attachment, &peer.transport_transit_gateway_attachment_id) {
                (Some(_), Some(_)) | (None, None) => result.error(
                    format!("{prefix}.attachment"),
                    "Exactly one of attachment or transport_transit_gateway_attachment_id must be set",
                ),
                (Some(name), None) if !attachment_names.contains(name.as_str()) => result.error(
                    format!("{prefix}.attachment"),
                    format!("Unknown attachment '{name}'"),
                ),
                _ => {}
            }

            if !(1..=MAX_ASN).contains(&peer.peer_asn) {
                result.error(
                    format!("{prefix}.peer_asn"),
                    format!("Peer ASN {} is outside 1..={MAX_ASN}", peer.peer_asn),
                );
            }

            let gateway_address = peer.transit_gateway_address.parse::<IpAddr>();
            let peer_address = peer.peer_address.parse::<IpAddr>();
            if gateway_address.is_err() {
                result.error(
                    format!("{prefix}.transit_gateway_address"),
                    format!("Invalid IP address '{}'", peer.transit_gateway_address),
                );
            }
            if peer_address.is_err() {
                result.error(
                    format!("{prefix}.peer_address"),
                    format!("Invalid IP address '{}'", peer.peer_address),
                );
            }
            if let (Ok(a), Ok(b)) = (gateway_address, peer_address) {
                if a.is_ipv4() != b.is_ipv4() {
                    result.error(
                        format!("{prefix}.peer_address"),
                        "Gateway and peer addresses must be of the same IP family",
                    );
                }
            }

            if peer.inside_cidr_blocks.is_empty() {
                result.error(
                    format!("{prefix}.inside_cidr_blocks"),
                    "At least one inside CIDR block is required",
                );
            }
            for (j, block) in peer.inside_cidr_blocks.iter().enumerate() {
                if let Err(message) = check_inside_block(block) {
                    result.error(format!("{prefix}.inside_cidr_blocks[{j}]"), message);
                }
            }
        }
    }

    fn validate_name<'a>(
        name: &'a str,
        prefix: &str,
        kind: &str,
        seen: &mut HashSet<&'a str>,
        result: &mut ValidationResult,
    ) {
        if !seen.insert(name) {
            result.error(format!("{prefix}.name"), format!("Duplicate {kind} name: {name}"));
        }

        if !is_valid_name(name) {
            result.error(
                format!("{prefix}.name"),
                format!(
                    "{} name '{name}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    capitalize(kind)
                ),
            );
        }
    }
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates one inside-tunnel CIDR block.
///
/// IPv4 blocks must be a /29 inside 169.254.0.0/16 and not reserved; IPv6
/// blocks must be a /125 inside fd00::/8. Blocks must be network-aligned.
fn check_inside_block(block: &str) -> std::result::Result<(), String> {
    let net: IpNet = block
        .parse()
        .map_err(|_| format!("'{block}' is not a valid CIDR block"))?;
    if net.trunc() != net {
        return Err(format!(
            "'{block}' is not aligned to a /{} boundary",
            net.prefix_len()
        ));
    }

    match net {
        IpNet::V4(v4) => check_inside_v4(block, v4),
        IpNet::V6(v6) => check_inside_v6(block, v6),
    }
}

fn check_inside_v4(block: &str, net: Ipv4Net) -> std::result::Result<(), String> {
    if net.prefix_len() != 29 {
        return Err(format!("'{block}' must be a /29"));
    }
    if !Ipv4Net::new(Ipv4Addr::new(169, 254, 0, 0), 16).is_ok_and(|range| range.contains(&net)) {
        return Err(format!("'{block}' must be inside 169.254.0.0/16"));
    }
    let reserved = RESERVED_INSIDE_BLOCKS
        .iter()
        .filter_map(|r| r.parse::<Ipv4Net>().ok())
        .any(|r| r == net);
    if reserved {
        return Err(format!("'{block}' is reserved"));
    }
    Ok(())
}

fn check_inside_v6(block: &str, net: Ipv6Net) -> std::result::Result<(), String> {
    if net.prefix_len() != 125 {
        return Err(format!("'{block}' must be a /125"));
    }
    let unique_local = Ipv6Net::new(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 0), 8);
    if !unique_local.is_ok_and(|range| range.contains(&net)) {
        return Err(format!("'{block}' must be inside fd00::/8"));
    }
    Ok(())
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn config(yaml: &str) -> StackConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    const VALID: &str = r#"
stack:
  name: edge-network
provider:
  endpoint: https://gateway.example.net
attachments:
  - name: edge
    protocol: gre
    transport_transit_gateway_attachment_id: tgw-attach-0a1b
peers:
  - name: edge-peer
    attachment: edge
    transit_gateway_address: 10.0.0.1
    peer_address: 172.16.0.1
    peer_asn: 64512
    inside_cidr_blocks: ["169.254.6.0/29", "fd00::8/125"]
"#;

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("edge"));
        assert!(is_valid_name("edge-peer-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Edge"));
        assert!(!is_valid_name("2-edge"));
        assert!(!is_valid_name("edge_peer"));
        assert!(!is_valid_name("edge-"));
        assert!(!is_valid_name("edge--peer"));
    }

    #[test]
    fn test_valid_stack_passes() {
        let result = ConfigValidator::new().validate(&config(VALID)).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_inside_blocks() {
        assert!(check_inside_block("169.254.10.8/29").is_ok());
        assert!(check_inside_block("fd00::10/125").is_ok());
        assert!(check_inside_block("169.254.10.8/30").is_err());
        assert!(check_inside_block("10.0.0.0/29").is_err());
        assert!(check_inside_block("169.254.10.9/29").is_err());
        assert!(check_inside_block("169.254.169.248/29").is_err());
        assert!(check_inside_block("fe80::/125").is_err());
        assert!(check_inside_block("169.254.10.8").is_err());
    }

    #[test]
    fn test_inside_block_messages() {
        assert_eq!(
            check_inside_block("169.254.10.12/29").unwrap_err(),
            "'169.254.10.12/29' is not aligned to a /29 boundary"
        );
        assert_eq!(
            check_inside_block("169.254.10.0/28").unwrap_err(),
            "'169.254.10.0/28' must be a /29"
        );
        assert_eq!(
            check_inside_block("169.255.0.0/29").unwrap_err(),
            "'169.255.0.0/29' must be inside 169.254.0.0/16"
        );
        assert_eq!(
            check_inside_block("169.254.3.0/29").unwrap_err(),
            "'169.254.3.0/29' is reserved"
        );
        assert_eq!(
            check_inside_block("fd00::c/125").unwrap_err(),
            "'fd00::c/125' is not aligned to a /125 boundary"
        );
        assert_eq!(
            check_inside_block("fc00::8/125").unwrap_err(),
            "'fc00::8/125' must be inside fd00::/8"
        );
        assert_eq!(
            check_inside_block("fd00::/124").unwrap_err(),
            "'fd00::/124' must be a /125"
        );
        assert!(check_inside_block("fdff:ffff::8/125").is_ok());
    }

    #[test]
    fn test_peer_errors_are_collected() {
        let mut stack = config(VALID);
        stack.peers[0].peer_asn = 0;
        stack.peers[0].attachment = Some(String::from("missing"));
        stack.peers[0].peer_address = String::from("not-an-ip");
        stack.attachments[0].protocol = String::from("ipsec");

        let result = ConfigValidator::new().check(&stack);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"attachments[0].protocol"));
        assert!(fields.contains(&"peers[0].attachment"));
        assert!(fields.contains(&"peers[0].peer_asn"));
        assert!(fields.contains(&"peers[0].peer_address"));
    }

    #[test]
    fn test_peer_reference_exactly_one() {
        let mut stack = config(VALID);
        stack.peers[0].transport_transit_gateway_attachment_id =
            Some(String::from("tgw-attach-connect-1"));

        let err = ConfigValidator::new().validate(&stack).unwrap_err();
        assert!(err.to_string().contains("Exactly one of"));
    }

    #[test]
    fn test_duplicate_names_and_polling() {
        let mut stack = config(VALID);
        stack.attachments.push(stack.attachments[0].clone());
        stack.provider.polling.max_interval_secs = 1;

        let result = ConfigValidator::new().check(&stack);
        let messages: Vec<String> = result.errors.iter().map(ToString::to_string).collect();

        assert!(messages.iter().any(|m| m.contains("Duplicate attachment name: edge")));
        assert!(messages.iter().any(|m| m.starts_with("provider.polling.max_interval_secs")));
    }

    #[test]
    fn test_init_template_is_valid() {
        let stack = config(include_str!("../../templates/tgwc.yaml"));
        let result = ConfigValidator::new().check(&stack);

        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.warning_count(), 0);
        assert_eq!(stack.resource_count(), 2);
    }
}
