//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use wxpay::Environment;

use crate::cert::{CertificateSource, PemSource};
use crate::error::GatewayError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`Client`](crate::Client).
pub struct ClientConfig {
    /// Application id, injected as `appid`.
    pub app_id: String,

    /// Merchant id, injected as `mch_id`.
    pub mch_id: String,

    /// Merchant API secret used for production signing.
    pub api_key: String,

    /// Talk to the live gateway instead of the sandbox.
    pub production: bool,

    /// Replaces the gateway host for relative paths.
    pub base_url: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Log request and reply bodies at debug level.
    pub debug: bool,

    /// Client certificate, attached on first use of an endpoint that needs it.
    pub certificate: Option<CertificateSource>,

    /// Pre-issued sandbox signing key; skips the key exchange.
    pub sandbox_key: Option<String>,

    /// Optional pre-configured reqwest client for calls without a client
    /// certificate. If `None`, one is created with the configured timeout.
    pub http_client: Option<reqwest::Client>,
}

impl ClientConfig {
    /// Creates a config with the default timeout and no certificate.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        mch_id: impl Into<String>,
        api_key: impl Into<String>,
        production: bool,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            mch_id: mch_id.into(),
            api_key: api_key.into(),
            production,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            debug: false,
            certificate: None,
            sandbox_key: None,
            http_client: None,
        }
    }

    /// Loads the config from `WXPAY_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `WXPAY_APP_ID` | `app_id` (required) |
    /// | `WXPAY_MCH_ID` | `mch_id` (required) |
    /// | `WXPAY_API_KEY` | `api_key` (required) |
    /// | `WXPAY_PRODUCTION` | `production` |
    /// | `WXPAY_BASE_URL` | `base_url` |
    /// | `WXPAY_TIMEOUT_SECS` | `timeout` |
    /// | `WXPAY_DEBUG` | `debug` |
    /// | `WXPAY_SANDBOX_KEY` | `sandbox_key` |
    /// | `WXPAY_CERT_PATH` + `WXPAY_KEY_PATH` | `certificate` |
    /// | `WXPAY_ROOT_CA_PATH` | `certificate.root_ca` |
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if a required variable is missing or
    /// a value does not parse.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| GatewayError::Config(format!("{name} is not set")))
        };

        let mut config = Self::new(
            required("WXPAY_APP_ID")?,
            required("WXPAY_MCH_ID")?,
            required("WXPAY_API_KEY")?,
            var("WXPAY_PRODUCTION").map_or(Ok(false), |v| parse_flag("WXPAY_PRODUCTION", &v))?,
        );
        config.base_url = var("WXPAY_BASE_URL");
        config.debug = var("WXPAY_DEBUG").map_or(Ok(false), |v| parse_flag("WXPAY_DEBUG", &v))?;
        config.sandbox_key = var("WXPAY_SANDBOX_KEY");
        if let Some(secs) = var("WXPAY_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                GatewayError::Config(format!("WXPAY_TIMEOUT_SECS is not a number: `{secs}`"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        match (var("WXPAY_CERT_PATH"), var("WXPAY_KEY_PATH")) {
            (Some(cert), Some(key)) => {
                let mut source = CertificateSource::from_files(cert, key);
                if let Some(ca) = var("WXPAY_ROOT_CA_PATH") {
                    source = source.with_root_ca(PemSource::File(PathBuf::from(ca)));
                }
                config.certificate = Some(source);
            }
            (None, None) => {}
            _ => {
                return Err(GatewayError::Config(
                    "WXPAY_CERT_PATH and WXPAY_KEY_PATH must be set together".to_owned(),
                ));
            }
        }
        Ok(config)
    }

    /// The environment this config targets.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        Environment::from_production_flag(self.production)
    }

    /// Overrides the gateway base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Turns body logging on or off.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the client certificate.
    #[must_use]
    pub fn with_certificate(mut self, certificate: CertificateSource) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Sets a pre-issued sandbox signing key.
    #[must_use]
    pub fn with_sandbox_key(mut self, key: impl Into<String>) -> Self {
        self.sandbox_key = Some(key.into());
        self
    }

    /// Sets a pre-configured reqwest client.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("mch_id", &self.mch_id)
            .field("api_key", &"<redacted>")
            .field("production", &self.production)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("certificate", &self.certificate)
            .field("has_sandbox_key", &self.sandbox_key.is_some())
            .field("has_http_client", &self.http_client.is_some())
            .finish()
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, GatewayError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GatewayError::Config(format!(
            "{name} must be a boolean, got `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("WXPAY_APP_ID", "wx123"),
        ("WXPAY_MCH_ID", "1900000109"),
        ("WXPAY_API_KEY", "secret"),
    ];

    #[test]
    fn loads_minimal_env() {
        let config = ClientConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.app_id, "wx123");
        assert_eq!(config.environment(), Environment::Sandbox);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.certificate.is_none());
        assert!(!config.debug);
    }

    #[test]
    fn loads_full_env() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("WXPAY_PRODUCTION", "true"),
            ("WXPAY_BASE_URL", "http://127.0.0.1:9000"),
            ("WXPAY_TIMEOUT_SECS", "5"),
            ("WXPAY_DEBUG", "1"),
            ("WXPAY_CERT_PATH", "/etc/wxpay/cert.pem"),
            ("WXPAY_KEY_PATH", "/etc/wxpay/key.pem"),
            ("WXPAY_ROOT_CA_PATH", "/etc/wxpay/ca.pem"),
        ]);
        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.base_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.debug);
        let cert = config.certificate.unwrap();
        assert_eq!(cert.root_ca, Some(PemSource::File("/etc/wxpay/ca.pem".into())));
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let err = ClientConfig::from_lookup(lookup(&BASE[..2])).unwrap_err();
        assert!(matches!(err, GatewayError::Config(ref m) if m.contains("WXPAY_API_KEY")));
    }

    #[test]
    fn half_configured_certificate_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("WXPAY_CERT_PATH", "/etc/wxpay/cert.pem"));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&vars)),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn bad_flag_is_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("WXPAY_PRODUCTION", "maybe"));
        assert!(ClientConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ClientConfig::new("wx123", "1900000109", "topsecret", false)
            .with_sandbox_key("sandboxsecret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("topsecret"));
        assert!(!debug.contains("sandboxsecret"));
        assert!(debug.contains("<redacted>"));
    }
}
