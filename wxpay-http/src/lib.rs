#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the WeChat Pay V2 gateway.
//!
//! Builds on the protocol core in [`wxpay`]: routes each call to the
//! sandbox or production gateway, injects the merchant identifiers, signs,
//! attaches the merchant's client certificate where required, and sorts the
//! reply into a decoded response or a [`GatewayError`].
//!
//! # Modules
//!
//! - [`client`] - [`Client`], the request pipeline
//! - [`api`] - Typed callers for the endpoint catalogue
//! - [`cert`] - Client certificates and mutual TLS
//! - [`config`] - [`ClientConfig`] and environment loading
//! - [`transport`] - Raw replies and their classification
//! - [`response`] - Typed reply structs
//! - [`error`] - [`GatewayError`]
//!
//! # Feature Flags
//!
//! - `telemetry` (default) - `tracing` spans and events; with
//!   [`ClientConfig::debug`] set, request and reply bodies are logged at
//!   debug level
//!
//! # Example
//!
//! ```no_run
//! use wxpay::ParameterSet;
//! use wxpay_http::{Client, ClientConfig};
//!
//! # async fn run() -> Result<(), wxpay_http::GatewayError> {
//! let client = Client::new(ClientConfig::new("wx8888888888888888", "1900000109", "secret", false))?;
//! let mut params = ParameterSet::new()
//!     .with("nonce_str", wxpay::nonce_str())
//!     .with("out_trade_no", "20240101000001");
//! let reply = client.query_order(&mut params, None).await?;
//! println!("{:?}", reply.trade_state);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cert;
pub mod client;
pub mod config;
pub mod error;
pub mod response;
mod sandbox;
pub mod transport;

pub use cert::{CertificateError, CertificateSource, CertificateStore, MutualTls, PemSource};
pub use client::{Client, IdentityPolicy, inject_identity};
pub use config::ClientConfig;
pub use error::GatewayError;
pub use response::GatewayReply;
pub use transport::RawResponse;
pub use tokio_util::sync::CancellationToken;
