//! Errors surfaced by the gateway client.
//!
//! Every failure of a gateway call lands in exactly one [`GatewayError`]
//! variant. Variants raised before any bytes leave the process
//! ([`GatewayError::is_local`]) are distinguishable from those raised by the
//! exchange itself.

use http::{HeaderMap, StatusCode};
use url::Url;
use wxpay::{UnsupportedModeError, ValidationError};

use crate::cert::CertificateError;

/// Errors that can occur while calling the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required request field is missing or invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation is not available in the configured environment.
    #[error(transparent)]
    UnsupportedMode(#[from] UnsupportedModeError),

    /// The client certificate is required but unavailable or unusable.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// A protocol-level failure outside the exchange, such as an
    /// unparsable endpoint path.
    #[error("protocol error: {0}")]
    Protocol(#[source] wxpay::Error),

    /// The client could not be built from its configuration.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// The request never produced an HTTP response.
    #[error("network error calling {url}: {source}")]
    Network {
        /// Dispatch URL.
        url: Url,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The caller cancelled the call before the reply arrived.
    #[error("call to {url} was cancelled")]
    Cancelled {
        /// Dispatch URL.
        url: Url,
    },

    /// The gateway answered with a status other than 200.
    #[error("unexpected HTTP status {status} from {url}: {}", String::from_utf8_lossy(.body))]
    Transport {
        /// Dispatch URL.
        url: Url,
        /// Status code of the reply.
        status: StatusCode,
        /// Reply headers.
        headers: HeaderMap,
        /// Raw reply bytes.
        body: Vec<u8>,
    },

    /// The gateway (or a proxy in front of it) answered with an HTML page
    /// instead of an XML document.
    #[error("gateway returned an HTML page from {url} (status {status})")]
    GatewayHtml {
        /// Dispatch URL.
        url: Url,
        /// Status code of the reply.
        status: StatusCode,
        /// Reply headers.
        headers: HeaderMap,
        /// Raw reply bytes.
        body: Vec<u8>,
    },

    /// A 200 reply could not be decoded into the expected shape.
    #[error("failed to decode reply from {url}: {source}")]
    Decode {
        /// Dispatch URL.
        url: Url,
        /// Raw reply bytes.
        raw: Vec<u8>,
        /// The underlying decoder error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The sandbox refused to issue a signing key.
    #[error("sandbox sign key request failed: {message}")]
    SandboxKey {
        /// `return_msg` of the refusal.
        message: String,
    },
}

impl GatewayError {
    /// Returns `true` when no HTTP response was obtained.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns `true` when the error was raised before anything was sent.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnsupportedMode(_)
                | Self::Certificate(_)
                | Self::Protocol(_)
                | Self::Config(_)
        )
    }

    /// Status code of the reply, for errors raised after one arrived.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport { status, .. } | Self::GatewayHtml { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw reply body, for errors raised after one arrived.
    #[must_use]
    pub fn raw_body(&self) -> Option<&[u8]> {
        match self {
            Self::Transport { body, .. } | Self::GatewayHtml { body, .. } => Some(body),
            Self::Decode { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<wxpay::Error> for GatewayError {
    fn from(err: wxpay::Error) -> Self {
        match err {
            wxpay::Error::Validation(e) => Self::Validation(e),
            wxpay::Error::UnsupportedMode(e) => Self::UnsupportedMode(e),
            other => Self::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxpay::Environment;

    fn url() -> Url {
        Url::parse("https://api.mch.weixin.qq.com/pay/orderquery").unwrap()
    }

    #[test]
    fn core_errors_keep_their_kind() {
        let err: GatewayError = wxpay::Error::from(ValidationError::missing("nonce_str")).into();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.is_local());

        let err: GatewayError = wxpay::Error::from(UnsupportedModeError::new(
            "downloadfundflow",
            Environment::Sandbox,
            "nope",
        ))
        .into();
        assert!(matches!(err, GatewayError::UnsupportedMode(_)));
        assert_eq!(
            err.to_string(),
            "`downloadfundflow` is not supported in sandbox mode: nope"
        );
    }

    #[test]
    fn reply_errors_expose_status_and_body() {
        let err = GatewayError::Transport {
            url: url(),
            status: StatusCode::BAD_GATEWAY,
            headers: HeaderMap::new(),
            body: b"upstream down".to_vec(),
        };
        assert!(!err.is_local());
        assert!(!err.is_network());
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.raw_body(), Some(b"upstream down".as_slice()));
        assert_eq!(
            err.to_string(),
            "unexpected HTTP status 502 Bad Gateway from \
             https://api.mch.weixin.qq.com/pay/orderquery: upstream down"
        );

        let err = GatewayError::Cancelled { url: url() };
        assert_eq!(err.status(), None);
        assert_eq!(err.raw_body(), None);
        assert!(!err.is_local());
    }
}
