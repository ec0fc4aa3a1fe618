//! Configuration module for the Connect reconciler.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `tgwc.yaml`
//! - Validation of declarations
//! - Computing declaration hashes for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    API_TOKEN_VAR, ConfigParser, DEFAULT_CONFIG_FILES, ENDPOINT_VAR, REGION_VAR, find_config_file,
};
pub use spec::{
    AttachmentConfig, GuardrailsConfig, PeerConfig, PollingConfig, ProviderConfig, StackConfig,
    StackInfo, StateConfig, TimeoutsConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
