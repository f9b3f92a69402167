//! Typed configuration for the registry and for individual endpoints.

use crate::data_plane::message::AssociationId;
use crate::error::{MuxError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_ASSOCIATIONS: usize = 1024;
pub const DEFAULT_HIGH_WATERMARK: usize = 256;
pub const DEFAULT_SOURCE_POLL_INTERVAL_MS: u64 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MuxConfig {
    /// Upper bound on simultaneously live associations.
    pub max_associations: usize,
    /// Queue depth at which producers are told they are congested.
    pub high_watermark: usize,
    /// How long a decoder source loop waits per receive before re-checking
    /// whether it has been asked to stop.
    pub source_poll_interval_ms: u64,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_associations: DEFAULT_MAX_ASSOCIATIONS,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            source_poll_interval_ms: DEFAULT_SOURCE_POLL_INTERVAL_MS,
        }
    }
}

impl MuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_associations == 0 {
            return Err(MuxError::Config(
                "max-associations must be at least 1".to_string(),
            ));
        }
        if self.high_watermark == 0 {
            return Err(MuxError::Config(
                "high-watermark must be at least 1".to_string(),
            ));
        }
        if self.source_poll_interval_ms == 0 {
            return Err(MuxError::Config(
                "source-poll-interval-ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn source_poll_interval(&self) -> Duration {
        Duration::from_millis(self.source_poll_interval_ms)
    }
}

/// Per-endpoint settings, the `sctp-association-id` property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EndpointConfig {
    pub association_id: AssociationId,
}

impl EndpointConfig {
    pub fn new(association_id: u16) -> Self {
        Self {
            association_id: AssociationId::new(association_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EndpointConfig, MuxConfig, DEFAULT_HIGH_WATERMARK};
    use crate::data_plane::message::AssociationId;
    use crate::error::MuxError;

    #[test]
    fn endpoint_config_defaults_to_association_zero() {
        assert_eq!(
            EndpointConfig::default().association_id,
            AssociationId::new(0)
        );
    }

    #[test]
    fn partial_mux_config_fills_in_defaults() {
        let config: MuxConfig =
            serde_json::from_str(r#"{ "max-associations": 4 }"#).expect("valid config");

        assert_eq!(config.max_associations, 4);
        assert_eq!(config.high_watermark, DEFAULT_HIGH_WATERMARK);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = MuxConfig {
            max_associations: 0,
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(MuxError::Config(_))));
    }

    #[test]
    fn endpoint_config_reads_association_id() {
        let config: EndpointConfig =
            serde_json::from_str(r#"{ "association-id": 2 }"#).expect("valid config");
        assert_eq!(config.association_id.get(), 2);
    }
}
