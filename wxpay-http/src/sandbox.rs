//! Sandbox signing-key exchange.
//!
//! The sandbox rejects signatures made with the merchant's real key. It
//! issues a separate key on request, which the client fetches once and keeps
//! for its lifetime.

use tokio_util::sync::CancellationToken;
use wxpay::environment::SANDBOX_SIGN_KEY_PATH;
use wxpay::params::{MCH_ID_FIELD, NONCE_STR_FIELD, SIGN_FIELD};
use wxpay::{ParameterSet, SignType, compute_signature, nonce_str};

use crate::client::Client;
use crate::error::GatewayError;
use crate::response::{SUCCESS, SandboxSignKeyResponse};

impl Client {
    /// Returns the sandbox signing key, fetching it on first use.
    ///
    /// Concurrent first callers share a single exchange; a failed exchange
    /// is not cached. `cancel` also covers the wait for an exchange started
    /// by another caller.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SandboxKey`] if the sandbox refuses,
    /// [`GatewayError::Cancelled`] if `cancel` fires first, or the transport
    /// error of the exchange.
    pub async fn sandbox_key(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<&str, GatewayError> {
        let init = self
            .sandbox_signkey
            .get_or_try_init(|| self.fetch_sandbox_key(cancel));
        let key = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    let url = self.router().resolve(SANDBOX_SIGN_KEY_PATH)?;
                    return Err(GatewayError::Cancelled { url });
                }
                key = init => key?,
            },
            None => init.await?,
        };
        Ok(key.as_str())
    }

    async fn fetch_sandbox_key(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, GatewayError> {
        #[cfg(feature = "telemetry")]
        tracing::info!("fetching sandbox sign key");

        let mut params = ParameterSet::new()
            .with(MCH_ID_FIELD, self.mch_id())
            .with(NONCE_STR_FIELD, nonce_str());
        let sign = compute_signature(&params, self.api_key(), SignType::Md5);
        params.set(SIGN_FIELD, sign);

        let url = self.router().resolve(SANDBOX_SIGN_KEY_PATH)?;
        let reply: SandboxSignKeyResponse = self.post_xml(url, &params, None, cancel).await?.decode()?;

        if reply.return_code.as_deref() != Some(SUCCESS) {
            return Err(GatewayError::SandboxKey {
                message: reply
                    .return_msg
                    .unwrap_or_else(|| "sandbox refused to issue a sign key".to_owned()),
            });
        }
        reply
            .sandbox_signkey
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GatewayError::SandboxKey {
                message: "reply carried no sandbox_signkey".to_owned(),
            })
    }
}
