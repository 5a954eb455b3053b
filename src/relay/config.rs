//! Probe configuration.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::nostr::{CanonicalForm, HmacTestSigner, SchnorrSigner, Signer, KIND_TEXT_NOTE};

use super::error::{RelayError, RelayResult};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/".to_string()
}

const fn default_timeout_seconds() -> u64 {
    10
}

fn default_content() -> String {
    "Hello from relay-probe".to_string()
}

const fn default_kind() -> u16 {
    KIND_TEXT_NOTE
}

fn default_subscription_id() -> String {
    "test-sub".to_string()
}

/// How the probe signs its event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// BIP-340 Schnorr over secp256k1. Relays that verify signatures accept
    /// these.
    #[default]
    Schnorr,

    /// Keyed-hash stand-in. Not a real signature; only for relays that skip
    /// verification.
    HmacTestStub,
}

/// Settings for a single probe run.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Relay host name or address.
    pub host: String,
    /// Relay TCP port.
    pub port: u16,
    /// Request path for the upgrade.
    pub path: String,
    /// Bound on connect and on each read, in seconds.
    pub timeout_seconds: u64,
    /// Hex secret for the signer. A fresh key is generated when absent.
    pub author_credential: Option<String>,
    /// Signing scheme.
    pub signing: SigningMode,
    /// Serialization hashed into the event id.
    pub canonical_form: CanonicalForm,
    /// Event content.
    pub content: String,
    /// Event kind.
    pub kind: u16,
    /// Hashtags attached as `t` tags.
    pub hashtags: Vec<String>,
    /// Subscription id for the `REQ`.
    pub subscription_id: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            timeout_seconds: default_timeout_seconds(),
            author_credential: None,
            signing: SigningMode::default(),
            canonical_form: CanonicalForm::default(),
            content: default_content(),
            kind: default_kind(),
            hashtags: Vec::new(),
            subscription_id: default_subscription_id(),
        }
    }
}

// Hand-written so the credential never reaches logs.
impl fmt::Debug for ProbeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("timeout_seconds", &self.timeout_seconds)
            .field(
                "author_credential",
                &self.author_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("signing", &self.signing)
            .field("canonical_form", &self.canonical_form)
            .field("content", &self.content)
            .field("kind", &self.kind)
            .field("hashtags", &self.hashtags)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

impl ProbeConfig {
    /// Parses a config from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the JSON is malformed or the result
    /// fails [`ProbeConfig::validate`].
    pub fn from_json(json: &str) -> RelayResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RelayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets host and port.
    #[must_use]
    pub fn with_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Sets the upgrade path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the signer secret.
    #[must_use]
    pub fn with_author_credential(mut self, secret_hex: impl Into<String>) -> Self {
        self.author_credential = Some(secret_hex.into());
        self
    }

    /// Sets the signing scheme.
    #[must_use]
    pub const fn with_signing(mut self, signing: SigningMode) -> Self {
        self.signing = signing;
        self
    }

    /// Sets the identifier serialization.
    #[must_use]
    pub const fn with_canonical_form(mut self, form: CanonicalForm) -> Self {
        self.canonical_form = form;
        self
    }

    /// Sets the event content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Sets the event kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: u16) -> Self {
        self.kind = kind;
        self
    }

    /// Adds a hashtag.
    #[must_use]
    pub fn with_hashtag(mut self, hashtag: impl Into<String>) -> Self {
        self.hashtags.push(hashtag.into());
        self
    }

    /// Sets the subscription id.
    #[must_use]
    pub fn with_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = id.into();
        self
    }

    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks the settings a run cannot proceed without.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] naming the first bad field.
    pub fn validate(&self) -> RelayResult<()> {
        if self.host.is_empty() {
            return Err(RelayError::Config("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(RelayError::Config("port must be non-zero".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(RelayError::Config(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(RelayError::Config(
                "timeout_seconds must be non-zero".to_string(),
            ));
        }
        if self.subscription_id.is_empty() {
            return Err(RelayError::Config("subscription_id is empty".to_string()));
        }
        Ok(())
    }

    /// Builds the signer described by `signing` and `author_credential`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the credential is not a usable key.
    pub fn signer(&self) -> RelayResult<Box<dyn Signer + Send + Sync>> {
        let signer: Box<dyn Signer + Send + Sync> =
            match (self.signing, self.author_credential.as_deref()) {
                (SigningMode::Schnorr, Some(secret)) => Box::new(SchnorrSigner::from_hex(secret)?),
                (SigningMode::Schnorr, None) => Box::new(SchnorrSigner::generate()),
                (SigningMode::HmacTestStub, Some(secret)) => {
                    Box::new(HmacTestSigner::from_hex(secret)?)
                }
                (SigningMode::HmacTestStub, None) => Box::new(HmacTestSigner::generate()),
            };
        Ok(signer)
    }
}
