//! Client configuration.

use std::fmt;
use std::time::Duration;

use crate::caps::Capability;

/// Default chat host.
pub const DEFAULT_HOST: &str = "irc.chat.twitch.tv";
/// Default plaintext port.
pub const DEFAULT_PORT: u16 = 6667;

/// Identity and authentication secret. Loaded once, never mutated.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    /// Create credentials. The identity is lowercased.
    pub fn new(identity: impl AsRef<str>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.as_ref().to_lowercase(),
            secret: secret.into(),
        }
    }

    /// Anonymous read-only login (`justinfan` style).
    pub fn anonymous() -> Self {
        Self::new("justinfan12345", "SCHMOOPIIE")
    }

    /// The lowercased login name.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The authentication secret, e.g. `oauth:...`.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &crate::observe::mask_secret(&self.secret))
            .finish()
    }
}

/// Delay between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RetryPolicy {
    /// Same delay every time.
    Fixed(Duration),
    /// Doubling delay, capped.
    Exponential {
        /// First delay.
        initial: Duration,
        /// Upper bound.
        max: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Everything the client needs to run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// Chat server host.
    pub host: String,
    /// Chat server port.
    pub port: u16,
    /// Login.
    pub credentials: Credentials,
    /// Capabilities requested after login.
    pub capabilities: Vec<Capability>,
    /// Channels to join once ready.
    pub channels: Vec<String>,
    /// Reconnect when no PING arrives for this long.
    pub liveness_timeout: Duration,
    /// Upper bound on a single socket wait, so liveness is checked even
    /// without traffic.
    pub poll_interval: Duration,
    /// Upper bound on resolving and connecting.
    pub connect_timeout: Duration,
    /// Delay between reconnect attempts.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            credentials: Credentials::anonymous(),
            capabilities: Capability::all(),
            channels: Vec::new(),
            liveness_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration with the given login.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Self::default()
        }
    }

    /// `host:port` for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(feature = "serde")]
impl ClientConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::ConfigurationError> {
        let mut config: Self = toml::from_str(s)?;
        let Credentials { identity, secret } = config.credentials;
        config.credentials = Credentials::new(identity, secret);
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::ConfigurationError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_lowercased() {
        let creds = Credentials::new("MyBot", "oauth:abc");
        assert_eq!(creds.identity(), "mybot");
        assert_eq!(creds.secret(), "oauth:abc");
    }

    #[test]
    fn test_debug_masks_secret() {
        let creds = Credentials::new("bot", "oauth:supersecrettoken");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("supersecrettoken"));
        assert!(debug.contains("bot"));
    }

    #[test]
    fn test_fixed_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(5));
        assert_eq!(policy.delay(10), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_retry() {
        let policy = RetryPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(10), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.address(), "irc.chat.twitch.tv:6667");
        assert_eq!(config.liveness_timeout, Duration::from_secs(300));
        assert_eq!(config.capabilities.len(), 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            channels = ["ninja"]
            [credentials]
            identity = "MyBot"
            secret = "oauth:abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.credentials.identity(), "mybot");
        assert_eq!(config.channels, vec!["ninja".to_string()]);
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
