//! Server connection configuration
//!
//! The configuration file holds one credential block for the IMAP
//! account and one for the SMTP account:
//!
//! ```json
//! {
//!   "imap": { "host": "imap.example.com", "port": 993,
//!             "auth": { "user": "me", "pass": "secret" } },
//!   "smtp": { "host": "smtp.example.com", "port": 587,
//!             "auth": { "user": "me", "pass": "secret" } }
//! }
//! ```
//!
//! Each block optionally takes `security` (`"tls"`, `"starttls"`,
//! `"plain"`) and `accept_invalid_certs`. The top level optionally takes
//! `timeout_secs`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How the transport to a mail server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// TLS from the first byte (IMAPS on 993, SMTPS on 465).
    Tls,
    /// Plaintext greeting, then upgrade with STARTTLS.
    Starttls,
    /// No transport security at all.
    Plain,
}

/// Login credentials for one account.
#[derive(Clone, Deserialize)]
pub struct Auth {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// Connection parameters for one IMAP or SMTP account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub host: String,
    pub port: u16,
    pub auth: Auth,
    #[serde(default)]
    pub security: Option<Security>,
    /// Skip certificate verification for this account's connections.
    ///
    /// Only meant for servers with self-signed certificates (local
    /// bridges, test servers).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl AccountConfig {
    /// The effective transport security.
    ///
    /// Falls back to implicit TLS on the well-known secure ports (993,
    /// 465) and STARTTLS everywhere else.
    #[must_use]
    pub fn security(&self) -> Security {
        self.security.unwrap_or(match self.port {
            993 | 465 => Security::Tls,
            _ => Security::Starttls,
        })
    }

    /// `host:port`, ready for `TcpStream::connect`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(format!("{section}.host is empty")));
        }
        if self.port == 0 {
            return Err(Error::Config(format!("{section}.port must not be 0")));
        }
        Ok(())
    }
}

/// IMAP and SMTP account configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub imap: AccountConfig,
    pub smtp: AccountConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ServerConfig {
    /// Parse a configuration from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed, a required
    /// field is missing, or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid server info: {e}")))?;
        config.imap.validate("imap")?;
        config.smtp.validate("smtp")?;
        if config.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must not be 0".into()));
        }
        Ok(config)
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or does not
    /// hold a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Upper bound for one network operation, connect included.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
