//! Typed gateway replies.
//!
//! Every field is optional: the gateway omits most of them on failure, and
//! which ones appear on success depends on the trade type. Fields the types
//! do not name (such as the indexed `refund_fee_$n` family of a refund
//! query) are still reachable through [`RawResponse::params`].
//!
//! [`RawResponse::params`]: crate::RawResponse::params

#![allow(missing_docs)] // fields carry the gateway's wire names

use serde::Deserialize;

/// `return_code` / `result_code` value of a successful reply.
pub const SUCCESS: &str = "SUCCESS";

/// Status fields shared by every business reply.
pub trait GatewayReply {
    /// Communication-level status.
    fn return_code(&self) -> Option<&str>;
    /// Communication-level message.
    fn return_msg(&self) -> Option<&str>;
    /// Business-level status.
    fn result_code(&self) -> Option<&str>;
    /// Business error code.
    fn err_code(&self) -> Option<&str>;

    /// Returns `true` when both the communication and the business status
    /// are `SUCCESS`.
    fn is_success(&self) -> bool {
        self.return_code() == Some(SUCCESS) && self.result_code() == Some(SUCCESS)
    }
}

macro_rules! gateway_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl GatewayReply for $ty {
                fn return_code(&self) -> Option<&str> {
                    self.return_code.as_deref()
                }
                fn return_msg(&self) -> Option<&str> {
                    self.return_msg.as_deref()
                }
                fn result_code(&self) -> Option<&str> {
                    self.result_code.as_deref()
                }
                fn err_code(&self) -> Option<&str> {
                    self.err_code.as_deref()
                }
            }
        )*
    };
}

gateway_reply!(
    UnifiedOrderResponse,
    MicropayResponse,
    QueryOrderResponse,
    CloseOrderResponse,
    RefundResponse,
    QueryRefundResponse,
    ReverseResponse,
    ReportResponse,
    AuthCodeToOpenIdResponse,
    ShortUrlResponse,
);

/// Reply of the unified-order endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UnifiedOrderResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub device_info: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    pub trade_type: Option<String>,
    /// Prepay session id, valid for two hours.
    pub prepay_id: Option<String>,
    /// QR-code URL for native payments.
    pub code_url: Option<String>,
    /// Redirect URL for H5 payments.
    pub mweb_url: Option<String>,
}

/// Reply of the micropay (payment code) endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MicropayResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub device_info: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    pub openid: Option<String>,
    pub is_subscribe: Option<String>,
    pub trade_type: Option<String>,
    pub bank_type: Option<String>,
    pub fee_type: Option<String>,
    pub total_fee: Option<i64>,
    pub settlement_total_fee: Option<i64>,
    pub coupon_fee: Option<i64>,
    pub cash_fee_type: Option<String>,
    pub cash_fee: Option<i64>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub attach: Option<String>,
    pub time_end: Option<String>,
    pub promotion_detail: Option<String>,
}

/// Reply of the order-query endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryOrderResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub device_info: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    pub openid: Option<String>,
    pub is_subscribe: Option<String>,
    pub trade_type: Option<String>,
    /// `SUCCESS`, `REFUND`, `NOTPAY`, `CLOSED`, `REVOKED`, `USERPAYING` or
    /// `PAYERROR`.
    pub trade_state: Option<String>,
    pub trade_state_desc: Option<String>,
    pub bank_type: Option<String>,
    pub total_fee: Option<i64>,
    pub settlement_total_fee: Option<i64>,
    pub fee_type: Option<String>,
    pub cash_fee: Option<i64>,
    pub cash_fee_type: Option<String>,
    pub coupon_fee: Option<i64>,
    pub coupon_count: Option<i64>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub attach: Option<String>,
    pub time_end: Option<String>,
}

/// Reply of the close-order endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CloseOrderResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub result_msg: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
}

/// Reply of the refund endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RefundResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub out_refund_no: Option<String>,
    pub refund_id: Option<String>,
    pub refund_fee: Option<i64>,
    pub settlement_refund_fee: Option<i64>,
    pub total_fee: Option<i64>,
    pub settlement_total_fee: Option<i64>,
    pub fee_type: Option<String>,
    pub cash_fee: Option<i64>,
    pub cash_fee_type: Option<String>,
    pub cash_refund_fee: Option<i64>,
    pub coupon_refund_fee: Option<i64>,
    pub coupon_refund_count: Option<i64>,
}

/// Reply of the refund-query endpoint.
///
/// Per-refund details come as indexed fields (`out_refund_no_0`,
/// `refund_status_0`, ...); read them from the raw parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryRefundResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    pub total_refund_count: Option<i64>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub total_fee: Option<i64>,
    pub settlement_total_fee: Option<i64>,
    pub fee_type: Option<String>,
    pub cash_fee: Option<i64>,
    pub refund_count: Option<i64>,
}

/// Reply of the reverse endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReverseResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
    /// `Y` when the reversal must be retried.
    pub recall: Option<String>,
}

/// Reply of the report endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReportResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
}

/// Reply of the auth-code-to-openid endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthCodeToOpenIdResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub openid: Option<String>,
}

/// Reply of the short-url endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShortUrlResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub nonce_str: Option<String>,
    pub sign: Option<String>,
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub short_url: Option<String>,
}

/// Reply of the sandbox sign-key exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct SandboxSignKeyResponse {
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    pub sandbox_signkey: Option<String>,
}
