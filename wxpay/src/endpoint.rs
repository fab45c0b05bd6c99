//! Endpoint catalogue and environment routing.
//!
//! Per-endpoint differences between sandbox and production (path, forced
//! signing algorithm, client certificate, required fields) live in a single
//! table, [`EndpointSpec`], consumed by one routing function,
//! [`Router::route`].

use std::fmt::{self, Display, Formatter};

use url::Url;

use crate::environment::{Environment, GATEWAY_BASE_URL};
use crate::error::{Error, UnsupportedModeError, ValidationError};
use crate::params::ParameterSet;
use crate::sign::SignType;

/// A business endpoint of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Create a prepaid order.
    UnifiedOrder,
    /// Charge a customer's payment code.
    Micropay,
    /// Query an order.
    OrderQuery,
    /// Close an unpaid order.
    CloseOrder,
    /// Request a refund.
    Refund,
    /// Query refund progress.
    RefundQuery,
    /// Reverse (cancel) a payment-code transaction.
    Reverse,
    /// Download the daily transaction bill.
    DownloadBill,
    /// Download the daily fund-flow statement.
    DownloadFundFlow,
    /// Report interface latency and result to the gateway.
    Report,
    /// Batch-download order comments.
    BatchQueryComment,
    /// Resolve a payment code to the payer's openid.
    AuthCodeToOpenId,
    /// Shorten a native-payment URL.
    ShortUrl,
}

/// How an endpoint is dispatched when the client runs against the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxRoute {
    /// The sandbox serves the endpoint at this path.
    Path(&'static str),
    /// The sandbox has no counterpart; the production path is called with
    /// production signing.
    Production,
    /// The endpoint cannot run against the sandbox.
    Unsupported(&'static str),
}

/// A field validation rule, evaluated before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Every listed field must be present and non-empty.
    Required(&'static [&'static str]),
    /// At least one of the listed fields must be non-empty.
    AnyOf(&'static [&'static str]),
    /// The field must be non-empty and hold one of the allowed values.
    OneOfValues {
        /// Field name.
        field: &'static str,
        /// Accepted values.
        allowed: &'static [&'static str],
    },
}

impl Rule {
    /// Checks this rule against `params`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first violation.
    pub fn check(&self, params: &ParameterSet) -> Result<(), ValidationError> {
        match *self {
            Self::Required(fields) => params.require_non_empty(fields),
            Self::AnyOf(fields) => {
                if fields.iter().any(|f| !params.is_empty_value(f)) {
                    Ok(())
                } else {
                    Err(ValidationError::new(format!(
                        "{} are not allowed to be empty at the same time",
                        fields.join(", ")
                    )))
                }
            }
            Self::OneOfValues { field, allowed } => {
                params.require_non_empty(&[field])?;
                let value = params.get_string(field);
                if allowed.contains(&value.as_str()) {
                    Ok(())
                } else {
                    Err(ValidationError::invalid_value(field, &value, allowed))
                }
            }
        }
    }
}

/// Static description of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Logical name, also the last path segment.
    pub name: &'static str,
    /// Path relative to the gateway host.
    pub path: &'static str,
    /// Sandbox dispatch.
    pub sandbox: SandboxRoute,
    /// Production calls must present the merchant's client certificate.
    pub certificate: bool,
    /// Algorithm the endpoint insists on, written into `sign_type`.
    pub sign_type: Option<SignType>,
    /// Rules checked before dispatch.
    pub rules: &'static [Rule],
    /// Values forced onto the request in the sandbox (acceptance-case amounts).
    pub sandbox_overrides: &'static [(&'static str, i64)],
}

impl EndpointSpec {
    /// Runs every rule in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(&self, params: &ParameterSet) -> Result<(), ValidationError> {
        self.rules.iter().try_for_each(|rule| rule.check(params))
    }
}

const TRADE_REF: &[&str] = &["out_trade_no", "transaction_id"];
const BILL_TYPES: &[&str] = &["ALL", "SUCCESS", "REFUND", "RECHARGE_REFUND"];
const ACCOUNT_TYPES: &[&str] = &["Basic", "Operation", "Fees"];
const SANDBOX_NEEDS_SHA256: &str =
    "the sandbox only verifies MD5 signatures and this endpoint requires HMAC-SHA256";

const UNIFIED_ORDER: EndpointSpec = EndpointSpec {
    name: "unifiedorder",
    path: "pay/unifiedorder",
    sandbox: SandboxRoute::Path("sandboxnew/pay/unifiedorder"),
    certificate: false,
    sign_type: None,
    rules: &[],
    sandbox_overrides: &[("total_fee", 101)],
};

const MICROPAY: EndpointSpec = EndpointSpec {
    name: "micropay",
    path: "pay/micropay",
    sandbox: SandboxRoute::Path("sandboxnew/pay/micropay"),
    certificate: false,
    sign_type: None,
    rules: &[],
    sandbox_overrides: &[("total_fee", 1)],
};

const ORDER_QUERY: EndpointSpec = EndpointSpec {
    name: "orderquery",
    path: "pay/orderquery",
    sandbox: SandboxRoute::Path("sandboxnew/pay/orderquery"),
    certificate: false,
    sign_type: None,
    rules: &[Rule::Required(&["nonce_str"]), Rule::AnyOf(TRADE_REF)],
    sandbox_overrides: &[],
};

const CLOSE_ORDER: EndpointSpec = EndpointSpec {
    name: "closeorder",
    path: "pay/closeorder",
    sandbox: SandboxRoute::Path("sandboxnew/pay/closeorder"),
    certificate: false,
    sign_type: None,
    rules: &[Rule::Required(&["nonce_str", "out_trade_no"])],
    sandbox_overrides: &[],
};

const REFUND: EndpointSpec = EndpointSpec {
    name: "refund",
    path: "secapi/pay/refund",
    sandbox: SandboxRoute::Path("sandboxnew/pay/refund"),
    certificate: true,
    sign_type: None,
    rules: &[
        Rule::Required(&["nonce_str", "out_refund_no", "total_fee", "refund_fee"]),
        Rule::AnyOf(TRADE_REF),
    ],
    sandbox_overrides: &[],
};

const REFUND_QUERY: EndpointSpec = EndpointSpec {
    name: "refundquery",
    path: "pay/refundquery",
    sandbox: SandboxRoute::Path("sandboxnew/pay/refundquery"),
    certificate: false,
    sign_type: None,
    rules: &[
        Rule::Required(&["nonce_str"]),
        Rule::AnyOf(&["refund_id", "out_refund_no", "transaction_id", "out_trade_no"]),
    ],
    sandbox_overrides: &[],
};

const REVERSE: EndpointSpec = EndpointSpec {
    name: "reverse",
    path: "secapi/pay/reverse",
    sandbox: SandboxRoute::Path("sandboxnew/pay/reverse"),
    certificate: true,
    sign_type: None,
    rules: &[Rule::Required(&["nonce_str", "out_trade_no"])],
    sandbox_overrides: &[],
};

const DOWNLOAD_BILL: EndpointSpec = EndpointSpec {
    name: "downloadbill",
    path: "pay/downloadbill",
    sandbox: SandboxRoute::Path("sandboxnew/pay/downloadbill"),
    certificate: false,
    sign_type: None,
    rules: &[
        Rule::Required(&["nonce_str", "bill_date"]),
        Rule::OneOfValues {
            field: "bill_type",
            allowed: BILL_TYPES,
        },
    ],
    sandbox_overrides: &[],
};

const DOWNLOAD_FUND_FLOW: EndpointSpec = EndpointSpec {
    name: "downloadfundflow",
    path: "pay/downloadfundflow",
    sandbox: SandboxRoute::Unsupported(SANDBOX_NEEDS_SHA256),
    certificate: true,
    sign_type: Some(SignType::HmacSha256),
    rules: &[
        Rule::Required(&["nonce_str", "bill_date"]),
        Rule::OneOfValues {
            field: "account_type",
            allowed: ACCOUNT_TYPES,
        },
    ],
    sandbox_overrides: &[],
};

const REPORT: EndpointSpec = EndpointSpec {
    name: "report",
    path: "payitil/report",
    sandbox: SandboxRoute::Path("sandboxnew/payitil/report"),
    certificate: false,
    sign_type: None,
    rules: &[Rule::Required(&[
        "nonce_str",
        "interface_url",
        "execute_time",
        "return_code",
        "return_msg",
        "result_code",
        "user_ip",
    ])],
    sandbox_overrides: &[],
};

const BATCH_QUERY_COMMENT: EndpointSpec = EndpointSpec {
    name: "batchquerycomment",
    path: "billcommentsp/batchquerycomment",
    sandbox: SandboxRoute::Unsupported(SANDBOX_NEEDS_SHA256),
    certificate: true,
    sign_type: Some(SignType::HmacSha256),
    rules: &[Rule::Required(&["nonce_str", "begin_time", "end_time", "offset"])],
    sandbox_overrides: &[],
};

const AUTH_CODE_TO_OPENID: EndpointSpec = EndpointSpec {
    name: "authcodetoopenid",
    path: "tools/authcodetoopenid",
    sandbox: SandboxRoute::Production,
    certificate: false,
    sign_type: None,
    rules: &[Rule::Required(&["nonce_str", "auth_code"])],
    sandbox_overrides: &[],
};

const SHORT_URL: EndpointSpec = EndpointSpec {
    name: "shorturl",
    path: "tools/shorturl",
    sandbox: SandboxRoute::Production,
    certificate: false,
    sign_type: None,
    rules: &[Rule::Required(&["nonce_str", "long_url"])],
    sandbox_overrides: &[],
};

impl Endpoint {
    /// Every endpoint in the catalogue.
    pub const ALL: [Self; 13] = [
        Self::UnifiedOrder,
        Self::Micropay,
        Self::OrderQuery,
        Self::CloseOrder,
        Self::Refund,
        Self::RefundQuery,
        Self::Reverse,
        Self::DownloadBill,
        Self::DownloadFundFlow,
        Self::Report,
        Self::BatchQueryComment,
        Self::AuthCodeToOpenId,
        Self::ShortUrl,
    ];

    /// The static description of this endpoint.
    #[must_use]
    pub const fn spec(self) -> &'static EndpointSpec {
        match self {
            Self::UnifiedOrder => &UNIFIED_ORDER,
            Self::Micropay => &MICROPAY,
            Self::OrderQuery => &ORDER_QUERY,
            Self::CloseOrder => &CLOSE_ORDER,
            Self::Refund => &REFUND,
            Self::RefundQuery => &REFUND_QUERY,
            Self::Reverse => &REVERSE,
            Self::DownloadBill => &DOWNLOAD_BILL,
            Self::DownloadFundFlow => &DOWNLOAD_FUND_FLOW,
            Self::Report => &REPORT,
            Self::BatchQueryComment => &BATCH_QUERY_COMMENT,
            Self::AuthCodeToOpenId => &AUTH_CODE_TO_OPENID,
            Self::ShortUrl => &SHORT_URL,
        }
    }

    /// Logical name of the endpoint.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.spec().name
    }

    /// Looks an endpoint up by its logical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of routing one endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Fully resolved dispatch URL.
    pub url: Url,
    /// Signing regime to apply: sandbox routes sign with the sandbox key.
    pub mode: Environment,
    /// Algorithm the endpoint forces, if any.
    pub sign_type: Option<SignType>,
    /// Whether the call must present the client certificate.
    pub certificate: bool,
}

/// Resolves endpoints and paths to dispatch URLs for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    environment: Environment,
    base_url: Url,
    overridden: bool,
}

impl Router {
    /// Creates a router.
    ///
    /// `base_url`, when given, replaces the gateway host for every relative
    /// path; it is normalised to end with exactly one `/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the override is not a valid absolute URL.
    pub fn new(environment: Environment, base_url: Option<&str>) -> Result<Self, Error> {
        let (raw, overridden) = match base_url.filter(|s| !s.trim().is_empty()) {
            Some(custom) => (custom.trim(), true),
            None => (GATEWAY_BASE_URL, false),
        };
        let mut normalized = raw.trim_end_matches('/').to_owned();
        normalized.push('/');
        let base_url = Url::parse(&normalized).map_err(|source| Error::Url {
            url: raw.to_owned(),
            source,
        })?;
        Ok(Self {
            environment,
            base_url,
            overridden,
        })
    }

    /// Environment this router targets.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Base URL that relative paths are joined onto.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns `true` when a base-URL override is in effect.
    #[must_use]
    pub const fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Resolves a caller-supplied path.
    ///
    /// Absolute `http://` / `https://` URLs are used verbatim; anything else
    /// is joined onto the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the result is not a valid URL.
    pub fn resolve(&self, path: &str) -> Result<Url, Error> {
        let url_err = |source| Error::Url {
            url: path.to_owned(),
            source,
        };
        if path.starts_with("http://") || path.starts_with("https://") {
            Url::parse(path).map_err(url_err)
        } else {
            self.base_url
                .join(path.trim_start_matches('/'))
                .map_err(url_err)
        }
    }

    /// Routes `endpoint` for this router's environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMode`] for endpoints the sandbox cannot
    /// serve, or [`Error::Url`] if the dispatch URL cannot be built.
    pub fn route(&self, endpoint: Endpoint) -> Result<Route, Error> {
        let spec = endpoint.spec();
        let (path, mode) = match (self.environment, spec.sandbox) {
            (Environment::Production, _) | (Environment::Sandbox, SandboxRoute::Production) => {
                (spec.path, Environment::Production)
            }
            (Environment::Sandbox, SandboxRoute::Path(path)) => (path, Environment::Sandbox),
            (Environment::Sandbox, SandboxRoute::Unsupported(reason)) => {
                return Err(
                    UnsupportedModeError::new(spec.name, Environment::Sandbox, reason).into(),
                );
            }
        };
        Ok(Route {
            url: self.resolve(path)?,
            mode,
            sign_type: spec.sign_type,
            certificate: spec.certificate && self.environment.is_production(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> Router {
        Router::new(Environment::Production, None).unwrap()
    }

    fn sandbox() -> Router {
        Router::new(Environment::Sandbox, None).unwrap()
    }

    #[test]
    fn production_routes_to_gateway_host() {
        let route = production().route(Endpoint::Refund).unwrap();
        assert_eq!(
            route.url.as_str(),
            "https://api.mch.weixin.qq.com/secapi/pay/refund"
        );
        assert_eq!(route.mode, Environment::Production);
        assert!(route.certificate);
        assert_eq!(route.sign_type, None);
    }

    #[test]
    fn sandbox_routes_to_sandbox_paths_without_certificate() {
        let route = sandbox().route(Endpoint::Refund).unwrap();
        assert_eq!(
            route.url.as_str(),
            "https://api.mch.weixin.qq.com/sandboxnew/pay/refund"
        );
        assert_eq!(route.mode, Environment::Sandbox);
        assert!(!route.certificate);
    }

    #[test]
    fn sandbox_refuses_hmac_only_endpoints() {
        for endpoint in [Endpoint::DownloadFundFlow, Endpoint::BatchQueryComment] {
            let err = sandbox().route(endpoint).unwrap_err();
            assert!(matches!(err, Error::UnsupportedMode(ref e) if e.operation == endpoint.name()));
        }
        let route = production().route(Endpoint::DownloadFundFlow).unwrap();
        assert_eq!(route.sign_type, Some(SignType::HmacSha256));
        assert!(route.certificate);
    }

    #[test]
    fn sandbox_falls_back_to_production_tools() {
        let route = sandbox().route(Endpoint::ShortUrl).unwrap();
        assert_eq!(route.url.as_str(), "https://api.mch.weixin.qq.com/tools/shorturl");
        assert_eq!(route.mode, Environment::Production);
    }

    #[test]
    fn base_url_override_is_normalised() {
        for base in ["http://127.0.0.1:8080", "http://127.0.0.1:8080/", "http://127.0.0.1:8080//"] {
            let router = Router::new(Environment::Sandbox, Some(base)).unwrap();
            assert!(router.is_overridden());
            let route = router.route(Endpoint::OrderQuery).unwrap();
            assert_eq!(
                route.url.as_str(),
                "http://127.0.0.1:8080/sandboxnew/pay/orderquery"
            );
        }
    }

    #[test]
    fn absolute_paths_are_used_verbatim() {
        let router = Router::new(Environment::Production, Some("http://localhost:1")).unwrap();
        let url = router.resolve("https://api2.mch.weixin.qq.com/pay/micropay").unwrap();
        assert_eq!(url.as_str(), "https://api2.mch.weixin.qq.com/pay/micropay");
        let url = router.resolve("/pay/micropay").unwrap();
        assert_eq!(url.as_str(), "http://localhost:1/pay/micropay");
    }

    #[test]
    fn invalid_override_is_rejected() {
        assert!(matches!(
            Router::new(Environment::Production, Some("not a url")),
            Err(Error::Url { .. })
        ));
    }

    #[test]
    fn order_query_needs_a_trade_reference() {
        let spec = Endpoint::OrderQuery.spec();
        let params = ParameterSet::new().with("nonce_str", "n1");
        let err = spec.validate(&params).unwrap_err();
        assert!(err.reason.contains("out_trade_no, transaction_id"));
        assert!(spec.validate(&params.clone().with("transaction_id", "42")).is_ok());
        assert!(spec.validate(&params.with("out_trade_no", "o1")).is_ok());
    }

    #[test]
    fn bill_type_must_be_known() {
        let spec = Endpoint::DownloadBill.spec();
        let params = ParameterSet::new()
            .with("nonce_str", "n1")
            .with("bill_date", "20240101");
        let err = spec.validate(&params).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("bill_type"));
        let err = spec
            .validate(&params.clone().with("bill_type", "EVERYTHING"))
            .unwrap_err();
        assert!(err.reason.contains("RECHARGE_REFUND"));
        assert!(spec.validate(&params.with("bill_type", "ALL")).is_ok());
    }

    #[test]
    fn names_round_trip() {
        for endpoint in Endpoint::ALL {
            assert_eq!(Endpoint::from_name(endpoint.name()), Some(endpoint));
            assert!(endpoint.spec().path.ends_with(endpoint.name()));
        }
        assert_eq!(Endpoint::from_name("nope"), None);
    }
}
