//! Gateway replies and their classification.

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;
use wxpay::{ParameterSet, SignType, verify_signature};

use crate::error::GatewayError;

/// `Content-Type` of every XML request.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// A gateway reply that passed classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// URL the request was sent to.
    pub url: Url,
    /// Always 200.
    pub status: StatusCode,
    /// Reply headers.
    pub headers: HeaderMap,
    /// Reply body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Reply body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the XML body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Decode`] carrying the raw body if the reply is
    /// not valid UTF-8 or does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        let text = std::str::from_utf8(&self.body).map_err(|e| self.decode_error(e))?;
        quick_xml::de::from_str(text).map_err(|e| self.decode_error(e))
    }

    /// Parses the XML body into an ordered parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Decode`] if the body is not a flat XML document.
    pub fn params(&self) -> Result<ParameterSet, GatewayError> {
        let text = std::str::from_utf8(&self.body).map_err(|e| self.decode_error(e))?;
        ParameterSet::from_xml(text).map_err(|e| self.decode_error(e))
    }

    /// Checks the `sign` field of the reply against `secret`.
    ///
    /// Replies without a `sign` field (for example error replies) do not
    /// verify.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Decode`] if the body cannot be parsed.
    pub fn verify(&self, secret: &str, sign_type: SignType) -> Result<bool, GatewayError> {
        Ok(verify_signature(&self.params()?, secret, sign_type))
    }

    fn decode_error(&self, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> GatewayError {
        GatewayError::Decode {
            url: self.url.clone(),
            raw: self.body.clone(),
            source: source.into(),
        }
    }
}

/// Returns `true` if the body looks like an HTML page.
#[must_use]
pub fn looks_like_html(body: &[u8]) -> bool {
    body.windows(4).any(|w| w.eq_ignore_ascii_case(b"html"))
}

/// Sorts an HTTP reply into success or one of the reply-level errors.
///
/// HTML is checked first, so an HTML error page is reported as
/// [`GatewayError::GatewayHtml`] whatever its status; any other non-200
/// status is a [`GatewayError::Transport`].
///
/// # Errors
///
/// See above.
pub fn classify(
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
) -> Result<RawResponse, GatewayError> {
    if looks_like_html(&body) {
        return Err(GatewayError::GatewayHtml {
            url,
            status,
            headers,
            body,
        });
    }
    if status != StatusCode::OK {
        return Err(GatewayError::Transport {
            url,
            status,
            headers,
            body,
        });
    }
    Ok(RawResponse {
        url,
        status,
        headers,
        body,
    })
}
