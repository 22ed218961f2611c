//! Service configuration, loadable from TOML

use crate::{ServiceError, ServiceResult, TracingConfig};
use intersection_invite::InvitationConfig;
use intersection_negotiation::NegotiationConfig;
use intersection_trust::TrustPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for every component behind [`crate::IntersectionService`].
///
/// Missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub invitation: InvitationConfig,
    pub negotiation: NegotiationConfig,
    pub trust: TrustPolicy,
    pub tracing: TracingConfig,
}

impl ServiceConfig {
    pub fn from_toml_str(contents: &str) -> ServiceResult<Self> {
        toml::from_str(contents).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Load from a TOML file. A missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> ServiceResult<String> {
        toml::to_string(self).map_err(|e| ServiceError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intersection_types::TrustLevel;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ServiceConfig::from_toml_str("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            [invitation]
            provision_missing_acceptor = true

            [negotiation]
            min_submitter_trust = "medium"

            [trust]
            settlement_delta = 5
            "#,
        )
        .unwrap();

        assert!(config.invitation.provision_missing_acceptor);
        assert_eq!(config.invitation.default_validity_secs, 86_400);
        assert_eq!(config.negotiation.min_submitter_trust, Some(TrustLevel::Medium));
        assert!(!config.negotiation.require_reason);
        assert_eq!(config.trust.settlement_delta, 5);
        assert_eq!(config.trust.acceptance_delta, 1);
        assert_eq!(config.tracing.log_level, "info");
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = ServiceConfig::from_toml_str("[trust\nbroken").unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn missing_file_loads_default() {
        let config = ServiceConfig::load("/nonexistent/intersection/config.toml").unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn written_config_reads_back() {
        let mut config = ServiceConfig::default();
        config.tracing.json_format = true;
        config.invitation.default_validity_secs = 60;
        let text = config.to_toml_string().unwrap();
        assert_eq!(ServiceConfig::from_toml_str(&text).unwrap(), config);
    }
}
