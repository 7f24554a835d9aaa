/// Replay configuration
///
/// Loaded from TOML. Every section is optional; a missing key takes its
/// default.

use crate::packet::{EndpointRule, LayerType, Transport};
use crate::subscr::{Subscription, SubscriptionError, SubscriptionMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to load subscription file")]
    Subscription(#[from] SubscriptionError),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub path: Option<PathBuf>,
    /// Packets to replay, 0 = all
    #[serde(default)]
    pub limit: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub port: u16,
    #[serde(default = "defaults::transport")]
    pub transport: String,
    pub protocol: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BookConfig {
    #[serde(default)]
    pub max_orders: usize,
    #[serde(default)]
    pub max_levels: usize,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub file: Option<PathBuf>,
    #[serde(default = "defaults::auto_subscribe")]
    pub auto_subscribe: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        SubscriptionConfig {
            file: None,
            auto_subscribe: defaults::auto_subscribe(),
        }
    }
}

mod defaults {
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn transport() -> String {
        "udp".into()
    }

    pub fn auto_subscribe() -> bool {
        true
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            log_level: defaults::log_level(),
            capture: CaptureConfig::default(),
            endpoints: Vec::new(),
            book: BookConfig::default(),
            subscription: SubscriptionConfig::default(),
        }
    }
}

impl EndpointConfig {
    pub fn rule(&self) -> Result<EndpointRule, ConfigError> {
        let transport = match self.transport.to_ascii_lowercase().as_str() {
            "udp" => Transport::Udp,
            "tcp" => Transport::Tcp,
            other => return Err(ConfigError::Invalid(format!("unknown transport '{}'", other))),
        };
        let layer = LayerType::from_name(&self.protocol)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown protocol '{}'", self.protocol)))?;
        Ok(EndpointRule {
            transport,
            port: self.port,
            layer,
        })
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.endpoint_rules()?;
        Ok(config)
    }

    pub fn endpoint_rules(&self) -> Result<Vec<EndpointRule>, ConfigError> {
        self.endpoints.iter().map(EndpointConfig::rule).collect()
    }

    /// Filter from the subscription file, or an empty one in the configured
    /// mode. `auto_subscribe = false` forces explicit mode.
    pub fn subscription(&self) -> Result<Subscription, ConfigError> {
        let mut sub = match &self.subscription.file {
            Some(path) => Subscription::load(path)?,
            None => Subscription::auto(),
        };
        if !self.subscription.auto_subscribe {
            sub.set_mode(SubscriptionMode::Explicit);
        }
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OptionId;

    #[test]
    fn test_full_config() {
        let config = SimConfig::parse(
            r#"
            log_level = "debug"
            [capture]
            path = "feed.pcap"
            limit = 100
            [[endpoints]]
            port = 18000
            protocol = "moldudp64"
            [[endpoints]]
            port = 18001
            transport = "tcp"
            protocol = "SoupBinTCP"
            [book]
            max_levels = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.capture.limit, 100);
        assert_eq!(config.book.max_levels, 16);
        assert_eq!(config.book.max_orders, 0);
        let rules = config.endpoint_rules().unwrap();
        assert_eq!(
            rules,
            vec![
                EndpointRule { transport: Transport::Udp, port: 18000, layer: LayerType::MoldUdp64 },
                EndpointRule { transport: Transport::Tcp, port: 18001, layer: LayerType::SoupBinTcp },
            ]
        );
    }

    #[test]
    fn test_defaults() {
        let config = SimConfig::parse("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert!(config.subscription().unwrap().is_subscribed(OptionId(5)));
    }

    #[test]
    fn test_bad_protocol_is_invalid() {
        let err = SimConfig::parse("[[endpoints]]\nport = 1\nprotocol = \"fix\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_explicit_without_file() {
        let config = SimConfig::parse("[subscription]\nauto_subscribe = false\n").unwrap();
        assert!(!config.subscription().unwrap().is_subscribed(OptionId(5)));
    }

    #[test]
    fn test_missing_file() {
        let err = SimConfig::load("/nonexistent/feed-sim.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
