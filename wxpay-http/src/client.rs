//! The gateway client.
//!
//! [`Client`] turns a [`ParameterSet`] into a signed XML POST (or a signed
//! GET query string), sends it over the plain or certificate-bearing HTTP
//! client, and classifies the reply.
//!
//! ## Pipeline
//!
//! 1. Validate the endpoint's required fields.
//! 2. Route: pick the URL, the signing regime and whether a certificate is
//!    needed.
//! 3. Normalize: inject `appid` / `mch_id` per the regime's precedence rules.
//! 4. Sign, unless the caller already supplied `sign`.
//! 5. Dispatch and classify.
//!
//! Steps 1 to 4 fail without touching the network.

use std::time::Duration;

use http::header::CONTENT_TYPE;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use url::Url;
use wxpay::params::{
    APP_ID_FIELD, COMBINE_APP_ID_FIELD, COMBINE_MCH_ID_FIELD, MCH_ID_FIELD, SIGN_FIELD,
    SIGN_TYPE_FIELD,
};
use wxpay::{
    Endpoint, Environment, ParameterSet, Router, SignType, UnsupportedModeError,
    compute_signature, sandbox_signature,
};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::cert::{CertificateSource, CertificateStore, MutualTls};
use crate::config::ClientConfig;
use crate::error::GatewayError;
use crate::transport::{self, RawResponse, XML_CONTENT_TYPE};

/// How the client's own identifiers are written into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// Always write them, replacing caller values (sandbox POST).
    Overwrite,
    /// Write them only where absent (GET).
    FillAbsent,
    /// Write them only where absent and the combined-payment counterpart
    /// (`combine_appid` / `combine_mch_id`) is absent too (production POST).
    FillAbsentUnlessCombined,
}

/// Writes `appid` and `mch_id` into `params` according to `policy`.
pub fn inject_identity(
    params: &mut ParameterSet,
    app_id: &str,
    mch_id: &str,
    policy: IdentityPolicy,
) {
    let fields = [
        (APP_ID_FIELD, COMBINE_APP_ID_FIELD, app_id),
        (MCH_ID_FIELD, COMBINE_MCH_ID_FIELD, mch_id),
    ];
    for (field, combined, value) in fields {
        let write = match policy {
            IdentityPolicy::Overwrite => true,
            IdentityPolicy::FillAbsent => params.is_empty_value(field),
            IdentityPolicy::FillAbsentUnlessCombined => {
                params.is_empty_value(field) && params.is_empty_value(combined)
            }
        };
        if write {
            params.set(field, value);
        }
    }
}

/// Asynchronous client for the WeChat Pay V2 gateway.
///
/// The client is safe to share across tasks (wrap it in an `Arc`); the
/// certificate store and the sandbox key cache synchronise internally.
pub struct Client {
    app_id: String,
    mch_id: String,
    api_key: String,
    router: Router,
    http: reqwest::Client,
    timeout: Duration,
    debug: bool,
    certificate: Option<CertificateSource>,
    certificates: CertificateStore,
    pub(crate) sandbox_signkey: OnceCell<String>,
}

impl Client {
    /// Builds a client from its configuration.
    ///
    /// The configured certificate, if any, is not loaded here; it is
    /// attached on the first call that needs it, or eagerly through
    /// [`Self::attach_certificate`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Protocol`] for an invalid base URL, or
    /// [`GatewayError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        let environment = config.environment();
        let router = Router::new(environment, config.base_url.as_deref())?;
        let http = match config.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?,
        };

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            environment = %environment,
            base_url = %router.base_url(),
            has_certificate = config.certificate.is_some(),
            "wxpay client created"
        );

        Ok(Self {
            app_id: config.app_id,
            mch_id: config.mch_id,
            api_key: config.api_key,
            router,
            http,
            timeout: config.timeout,
            debug: config.debug,
            certificate: config.certificate,
            certificates: CertificateStore::new(config.timeout),
            sandbox_signkey: OnceCell::new_with(config.sandbox_key.filter(|k| !k.is_empty())),
        })
    }

    /// Environment the client targets.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.router.environment()
    }

    /// Router used to resolve endpoints and paths.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Application id injected into requests.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Merchant id injected into requests.
    #[must_use]
    pub fn mch_id(&self) -> &str {
        &self.mch_id
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether request and reply bodies are logged.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Loads `source` and installs it as the client certificate, replacing
    /// any previous one.
    ///
    /// Client certificates are only presented to the production gateway; in
    /// sandbox mode this is a no-op returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Certificate`] if the material is unusable.
    pub async fn attach_certificate(
        &self,
        source: &CertificateSource,
    ) -> Result<Option<std::sync::Arc<MutualTls>>, GatewayError> {
        if !self.environment().is_production() {
            return Ok(None);
        }
        let tls = self.certificates.attach(source).await?;

        #[cfg(feature = "telemetry")]
        tracing::info!("client certificate attached");

        Ok(Some(tls))
    }

    /// Returns `true` once a client certificate is installed.
    pub async fn has_certificate(&self) -> bool {
        self.certificates.is_attached().await
    }

    /// Calls a catalogue endpoint.
    ///
    /// `params` is normalized and signed in place, so after the call it holds
    /// exactly what was sent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`]; validation, routing, certificate and
    /// sandbox-signing failures are raised before anything is sent.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "wxpay.call",
            skip_all,
            fields(
                endpoint = %endpoint,
                environment = %self.environment(),
                otel.kind = "client",
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            )
        )
    )]
    pub async fn call(
        &self,
        endpoint: Endpoint,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let result = self.call_endpoint(endpoint, params, cancel).await;
        record_result_on_span(&result);
        result
    }

    async fn call_endpoint(
        &self,
        endpoint: Endpoint,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let spec = endpoint.spec();
        spec.validate(params)?;
        let route = self.router.route(endpoint)?;

        let tls = if route.certificate {
            Some(
                self.certificates
                    .get_or_attach(spec.name, self.certificate.as_ref())
                    .await?,
            )
        } else {
            None
        };

        match route.mode {
            Environment::Production => {
                inject_identity(
                    params,
                    &self.app_id,
                    &self.mch_id,
                    IdentityPolicy::FillAbsentUnlessCombined,
                );
                self.sign_production(params, route.sign_type);
            }
            Environment::Sandbox => {
                for &(field, value) in spec.sandbox_overrides {
                    params.set(field, value);
                }
                inject_identity(params, &self.app_id, &self.mch_id, IdentityPolicy::Overwrite);
                self.sign_sandbox(params, cancel).await?;
            }
        }

        self.post_xml(route.url, params, tls.as_deref(), cancel).await
    }

    /// POSTs to an arbitrary gateway path with production signing.
    ///
    /// `path` is either absolute (`http://` / `https://`, used verbatim) or
    /// relative to the gateway host. With `certificate` set, the call
    /// presents the client certificate when running in production.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`]. In sandbox mode a parameter set asking for
    /// `sign_type=HMAC-SHA256` is refused with
    /// [`GatewayError::UnsupportedMode`] unless it is already signed.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "wxpay.post_api",
            skip(self, params, cancel),
            fields(
                otel.kind = "client",
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            )
        )
    )]
    pub async fn post_api(
        &self,
        path: &str,
        params: &mut ParameterSet,
        certificate: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let result = self.post_path(path, params, certificate, cancel).await;
        record_result_on_span(&result);
        result
    }

    async fn post_path(
        &self,
        path: &str,
        params: &mut ParameterSet,
        certificate: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        if params.is_empty_value(SIGN_FIELD) {
            self.refuse_sandbox_hmac(SignType::of(params))?;
        }
        let url = self.router.resolve(path)?;
        let tls = if certificate && self.environment().is_production() {
            Some(
                self.certificates
                    .get_or_attach(path, self.certificate.as_ref())
                    .await?,
            )
        } else {
            None
        };
        inject_identity(
            params,
            &self.app_id,
            &self.mch_id,
            IdentityPolicy::FillAbsentUnlessCombined,
        );
        self.sign_production(params, None);
        self.post_xml(url, params, tls.as_deref(), cancel).await
    }

    /// Issues a signed GET to `path`.
    ///
    /// Identifiers are filled where absent, any existing `sign` is dropped
    /// and a fresh one computed with `sign_type` and the merchant key, then
    /// the parameters are appended as the query string.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`]. In sandbox mode
    /// [`SignType::HmacSha256`] is refused with
    /// [`GatewayError::UnsupportedMode`].
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "wxpay.get",
            skip(self, params, cancel),
            fields(
                otel.kind = "client",
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            )
        )
    )]
    pub async fn get(
        &self,
        path: &str,
        params: &mut ParameterSet,
        sign_type: SignType,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let result = self.get_path(path, params, sign_type, cancel).await;
        record_result_on_span(&result);
        result
    }

    async fn get_path(
        &self,
        path: &str,
        params: &mut ParameterSet,
        sign_type: SignType,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        self.refuse_sandbox_hmac(sign_type)?;
        let mut url = self.router.resolve(path)?;
        inject_identity(params, &self.app_id, &self.mch_id, IdentityPolicy::FillAbsent);
        params.remove(SIGN_FIELD);
        let sign = compute_signature(params, &self.api_key, sign_type);
        params.set(SIGN_FIELD, sign);
        url.set_query(Some(&params.to_query_string()));

        #[cfg(feature = "telemetry")]
        if self.debug {
            tracing::debug!(url = %url, "gateway GET request");
        }

        let request = self.http.get(url.clone()).timeout(self.timeout);
        self.dispatch(url, request, cancel).await
    }

    /// Signs with the merchant key unless `sign` is already present.
    ///
    /// A forced algorithm is written into `sign_type` first; otherwise the
    /// algorithm named by `sign_type` (MD5 by default) is used.
    fn sign_production(&self, params: &mut ParameterSet, forced: Option<SignType>) {
        if !params.is_empty_value(SIGN_FIELD) {
            return;
        }
        if let Some(sign_type) = forced {
            params.set(SIGN_TYPE_FIELD, sign_type.as_str());
        }
        let sign = compute_signature(params, &self.api_key, SignType::of(params));
        params.set(SIGN_FIELD, sign);
    }

    /// Signs with the sandbox key unless `sign` is already present.
    async fn sign_sandbox(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), GatewayError> {
        if !params.is_empty_value(SIGN_FIELD) {
            return Ok(());
        }
        self.refuse_sandbox_hmac(SignType::of(params))?;
        params.set(SIGN_TYPE_FIELD, SignType::Md5.as_str());
        let key = self.sandbox_key(cancel).await?;
        let sign = sandbox_signature(params, &self.mch_id, key, SignType::Md5)?;
        params.set(SIGN_FIELD, sign);
        Ok(())
    }

    /// Fails if the client targets the sandbox and `sign_type` is not MD5.
    fn refuse_sandbox_hmac(&self, sign_type: SignType) -> Result<(), UnsupportedModeError> {
        if self.environment().is_production() || sign_type == SignType::Md5 {
            return Ok(());
        }
        Err(UnsupportedModeError::new(
            "sign",
            Environment::Sandbox,
            "the sandbox only verifies MD5 signatures",
        ))
    }

    /// Serializes `params` and POSTs them as XML.
    pub(crate) async fn post_xml(
        &self,
        url: Url,
        params: &ParameterSet,
        tls: Option<&MutualTls>,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let body = params.to_xml();

        #[cfg(feature = "telemetry")]
        if self.debug {
            tracing::debug!(url = %url, request = %body, "gateway POST request");
        }

        let http = tls.map_or(&self.http, MutualTls::http_client);
        let request = http
            .post(url.clone())
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .timeout(self.timeout)
            .body(body);
        self.dispatch(url, request, cancel).await
    }

    /// Sends `request`, racing it against `cancel`, and classifies the reply.
    async fn dispatch(
        &self,
        url: Url,
        request: reqwest::RequestBuilder,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let exchange = async move {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(url = %url, "gateway call cancelled");
                    return Err(GatewayError::Cancelled { url });
                }
                outcome = exchange => outcome,
            },
            None => exchange.await,
        };
        let (status, headers, body) = outcome.map_err(|source| GatewayError::Network {
            url: url.clone(),
            source,
        })?;

        #[cfg(feature = "telemetry")]
        if self.debug {
            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                response = %String::from_utf8_lossy(&body),
                "gateway response"
            );
        }

        transport::classify(url, status, headers, body.to_vec())
    }
}

/// Records the outcome of a call on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R>(result: &Result<R, GatewayError>) {
    let span = tracing::Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "gateway call failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R>(_result: &Result<R, GatewayError>) {}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("app_id", &self.app_id)
            .field("mch_id", &self.mch_id)
            .field("api_key", &"<redacted>")
            .field("router", &self.router)
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .field("certificate", &self.certificate)
            .field("has_sandbox_key", &self.sandbox_signkey.initialized())
            .finish_non_exhaustive()
    }
}
