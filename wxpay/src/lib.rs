#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the WeChat Pay V2 gateway protocol.
//!
//! This crate holds everything about a gateway request that does not touch
//! the network: the parameter container, the canonical signature, the
//! sandbox/production routing table and the per-endpoint validation rules.
//! The HTTP transport lives in `wxpay-http`.
//!
//! # Modules
//!
//! - [`params`] - Ordered parameter sets, XML and query-string encoding
//! - [`sign`] - MD5 / HMAC-SHA256 request signing and reply verification
//! - [`environment`] - Sandbox vs. production
//! - [`endpoint`] - Endpoint catalogue, routing and validation rules
//! - [`error`] - Errors raised before dispatch
//! - [`nonce`] - `nonce_str` generation
//!
//! # Example
//!
//! ```rust
//! use wxpay::{ParameterSet, SignType, compute_signature};
//!
//! let params = ParameterSet::new()
//!     .with("appid", "A")
//!     .with("mch_id", "M")
//!     .with("nonce_str", "n1");
//! let sign = compute_signature(&params, "K", SignType::Md5);
//! assert_eq!(sign, "5C1EA866C3477EADBBBA6D663A66EBFD");
//! ```

pub mod endpoint;
pub mod environment;
pub mod error;
pub mod nonce;
pub mod params;
pub mod sign;

pub use endpoint::{Endpoint, EndpointSpec, Route, Router, Rule, SandboxRoute};
pub use environment::Environment;
pub use error::{Error, UnsupportedModeError, ValidationError};
pub use nonce::nonce_str;
pub use params::{ParamValue, ParameterSet};
pub use sign::{SignType, compute_signature, sandbox_signature, verify_signature};
