//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use wxpay::{Endpoint, ParameterSet, SignType};
use wxpay_http::{CertificateSource, ClientConfig, PemSource};

/// WeChat Pay V2 gateway client
#[derive(Debug, Parser)]
#[command(name = "wxpay")]
#[command(version, about)]
pub struct Cli {
    /// Merchant credentials and transport settings
    #[command(flatten)]
    pub merchant: MerchantArgs,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Merchant credentials and transport settings, shared by every command.
#[derive(Debug, Args)]
pub struct MerchantArgs {
    /// Application id
    #[arg(long, env = "WXPAY_APP_ID", global = true)]
    pub app_id: Option<String>,

    /// Merchant id
    #[arg(long, env = "WXPAY_MCH_ID", global = true)]
    pub mch_id: Option<String>,

    /// Merchant API secret
    #[arg(long, env = "WXPAY_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Talk to the live gateway instead of the sandbox
    #[arg(long, env = "WXPAY_PRODUCTION", global = true)]
    pub production: bool,

    /// Replace the gateway host
    #[arg(long, env = "WXPAY_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "WXPAY_TIMEOUT_SECS", global = true, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log request and reply bodies
    #[arg(long, env = "WXPAY_DEBUG", global = true)]
    pub debug: bool,

    /// Pre-issued sandbox signing key
    #[arg(long, env = "WXPAY_SANDBOX_KEY", global = true, hide_env_values = true)]
    pub sandbox_key: Option<String>,

    /// PEM client certificate
    #[arg(long, env = "WXPAY_CERT_PATH", global = true, requires = "key_path")]
    pub cert_path: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "WXPAY_KEY_PATH", global = true, requires = "cert_path")]
    pub key_path: Option<PathBuf>,

    /// PEM root CA to trust in addition to the platform roots
    #[arg(long, env = "WXPAY_ROOT_CA_PATH", global = true)]
    pub root_ca_path: Option<PathBuf>,
}

impl MerchantArgs {
    /// Builds a client configuration, failing if a credential is missing.
    ///
    /// # Errors
    ///
    /// Returns a message naming the missing flag.
    pub fn client_config(&self) -> Result<ClientConfig, String> {
        let required = |value: &Option<String>, flag: &str| {
            value
                .clone()
                .ok_or_else(|| format!("--{flag} is required for this command"))
        };
        let mut config = ClientConfig::new(
            required(&self.app_id, "app-id")?,
            required(&self.mch_id, "mch-id")?,
            required(&self.api_key, "api-key")?,
            self.production,
        )
        .with_timeout(Duration::from_secs(self.timeout_secs))
        .with_debug(self.debug);

        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(key) = &self.sandbox_key {
            config = config.with_sandbox_key(key);
        }
        if let (Some(cert), Some(key)) = (&self.cert_path, &self.key_path) {
            let mut source = CertificateSource::from_files(cert, key);
            if let Some(ca) = &self.root_ca_path {
                source = source.with_root_ca(PemSource::File(ca.clone()));
            }
            config = config.with_certificate(source);
        }
        Ok(config)
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the signature of a parameter set
    Sign {
        /// Signing algorithm
        #[arg(long, default_value = "MD5")]
        sign_type: SignType,

        /// Parameters as `key=value`
        #[arg(value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Check the signature of a gateway reply read from a file (`-` for stdin)
    Verify {
        /// Signing algorithm
        #[arg(long, default_value = "MD5")]
        sign_type: SignType,

        /// Reply XML
        file: PathBuf,
    },

    /// Call a catalogue endpoint and print the reply body
    Call {
        /// Endpoint name, such as `orderquery` or `refund`
        #[arg(value_parser = parse_endpoint)]
        endpoint: Endpoint,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// POST to an arbitrary gateway path with production signing
    Post {
        /// Relative path or absolute URL
        path: String,

        /// Present the client certificate
        #[arg(long)]
        cert: bool,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Issue a signed GET to a gateway path
    Get {
        /// Relative path or absolute URL
        path: String,

        /// Signing algorithm
        #[arg(long, default_value = "MD5")]
        sign_type: SignType,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Print a fresh `nonce_str`
    Nonce,
}

/// Request parameters for the network commands.
#[derive(Debug, Args)]
pub struct ParamArgs {
    /// Do not add a generated `nonce_str` when none is given
    #[arg(long)]
    pub no_nonce: bool,

    /// Parameters as `key=value`
    #[arg(value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

impl ParamArgs {
    /// The parameters in command-line order, with a generated `nonce_str`
    /// appended unless one was given or `--no-nonce` is set.
    #[must_use]
    pub fn to_params(&self) -> ParameterSet {
        let mut params = to_params(&self.params);
        if !self.no_nonce && params.is_empty_value(wxpay::params::NONCE_STR_FIELD) {
            params.set(wxpay::params::NONCE_STR_FIELD, wxpay::nonce_str());
        }
        params
    }
}

/// Collects `key=value` pairs into a parameter set, in order.
#[must_use]
pub fn to_params(pairs: &[(String, String)]) -> ParameterSet {
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

fn parse_endpoint(raw: &str) -> Result<Endpoint, String> {
    Endpoint::from_name(raw).ok_or_else(|| {
        let names: Vec<_> = Endpoint::ALL.iter().map(|e| e.name()).collect();
        format!("unknown endpoint `{raw}`, expected one of: {}", names.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_call_with_params() {
        let cli = Cli::try_parse_from([
            "wxpay",
            "--app-id",
            "A",
            "--mch-id",
            "M",
            "--api-key",
            "K",
            "call",
            "orderquery",
            "out_trade_no=o1",
            "attach=a=b",
        ])
        .unwrap();
        let Command::Call { endpoint, params } = cli.command else {
            panic!("expected call");
        };
        assert_eq!(endpoint, Endpoint::OrderQuery);
        let params = params.to_params();
        assert_eq!(params.get_string("out_trade_no"), "o1");
        assert_eq!(params.get_string("attach"), "a=b");
        assert_eq!(params.get_string("nonce_str").len(), wxpay::nonce::NONCE_LEN);
        assert!(cli.merchant.client_config().is_ok());
    }

    #[test]
    fn rejects_unknown_endpoint_and_bad_params() {
        assert!(Cli::try_parse_from(["wxpay", "call", "nope"]).is_err());
        assert!(Cli::try_parse_from(["wxpay", "sign", "novalue"]).is_err());
    }

    #[test]
    fn missing_credentials_are_reported() {
        let cli = Cli::try_parse_from(["wxpay", "--app-id", "A", "nonce"]).unwrap();
        let err = cli.merchant.client_config().unwrap_err();
        assert!(err.contains("--mch-id"));
    }
}
