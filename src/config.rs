//! Configuration types for the Layout validator.

use crate::policy::{LayoutType, SecurityPolicyVersion};
use serde::{Deserialize, Serialize};

/// Main configuration for the Layout validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutValidatorConfig {
    /// Config version
    pub version: String,

    /// General settings
    pub settings: SettingsConfig,

    /// Layout policies bound to SOAP operations
    pub policies: Vec<PolicyBinding>,
}

impl Default for LayoutValidatorConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            policies: Vec::new(),
        }
    }
}

/// General settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Action on failure: "block" or "allow"
    pub fail_action: FailAction,
}

/// Failure action when a Layout assertion is not satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailAction {
    /// Reject the message
    #[default]
    Block,
    /// Accept the message (log only)
    Allow,
}

/// Layout policy declared for a set of SOAP operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyBinding {
    /// Operations the policy applies to (supports glob patterns)
    pub operations: Vec<String>,

    /// WS-SecurityPolicy version the Layout assertion is declared in
    pub namespace: SecurityPolicyVersion,

    /// Declared layout; omitted means no constraint
    pub layout: Option<LayoutType>,
}

impl Default for PolicyBinding {
    fn default() -> Self {
        Self {
            operations: vec!["*".to_string()],
            namespace: SecurityPolicyVersion::default(),
            layout: None,
        }
    }
}
