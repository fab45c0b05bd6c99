//! Typed callers for the endpoint catalogue.
//!
//! Each method is [`Client::call`] followed by decoding. The downloads
//! return the body text as-is: bills and statements are CSV-like text, not
//! XML.

use tokio_util::sync::CancellationToken;
use wxpay::{Endpoint, ParameterSet};

use crate::client::Client;
use crate::error::GatewayError;
use crate::response::{
    AuthCodeToOpenIdResponse, CloseOrderResponse, MicropayResponse, QueryOrderResponse,
    QueryRefundResponse, RefundResponse, ReportResponse, ReverseResponse, ShortUrlResponse,
    UnifiedOrderResponse,
};

impl Client {
    /// Creates a prepaid order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn unified_order(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<UnifiedOrderResponse, GatewayError> {
        self.call(Endpoint::UnifiedOrder, params, cancel).await?.decode()
    }

    /// Charges a customer's payment code.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn micropay(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<MicropayResponse, GatewayError> {
        self.call(Endpoint::Micropay, params, cancel).await?.decode()
    }

    /// Queries an order by `out_trade_no` or `transaction_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if both are missing, otherwise
    /// see [`GatewayError`].
    pub async fn query_order(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<QueryOrderResponse, GatewayError> {
        self.call(Endpoint::OrderQuery, params, cancel).await?.decode()
    }

    /// Closes an unpaid order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn close_order(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<CloseOrderResponse, GatewayError> {
        self.call(Endpoint::CloseOrder, params, cancel).await?.decode()
    }

    /// Requests a refund. Needs the client certificate in production.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Certificate`] when no certificate is attached
    /// or configured, otherwise see [`GatewayError`].
    pub async fn refund(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<RefundResponse, GatewayError> {
        self.call(Endpoint::Refund, params, cancel).await?.decode()
    }

    /// Queries refund progress.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn query_refund(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<QueryRefundResponse, GatewayError> {
        self.call(Endpoint::RefundQuery, params, cancel).await?.decode()
    }

    /// Reverses a payment-code transaction. Needs the client certificate in
    /// production.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn reverse(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReverseResponse, GatewayError> {
        self.call(Endpoint::Reverse, params, cancel).await?.decode()
    }

    /// Downloads the daily transaction bill.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn download_bill(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, GatewayError> {
        Ok(self.call(Endpoint::DownloadBill, params, cancel).await?.text())
    }

    /// Downloads the daily fund-flow statement. Production only.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnsupportedMode`] in sandbox mode, otherwise
    /// see [`GatewayError`].
    pub async fn download_fund_flow(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, GatewayError> {
        Ok(self
            .call(Endpoint::DownloadFundFlow, params, cancel)
            .await?
            .text())
    }

    /// Reports interface latency and outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn report(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReportResponse, GatewayError> {
        self.call(Endpoint::Report, params, cancel).await?.decode()
    }

    /// Batch-downloads order comments. Production only.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnsupportedMode`] in sandbox mode, otherwise
    /// see [`GatewayError`].
    pub async fn batch_query_comment(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, GatewayError> {
        Ok(self
            .call(Endpoint::BatchQueryComment, params, cancel)
            .await?
            .text())
    }

    /// Resolves a payment code to the payer's openid.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn auth_code_to_openid(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<AuthCodeToOpenIdResponse, GatewayError> {
        self.call(Endpoint::AuthCodeToOpenId, params, cancel)
            .await?
            .decode()
    }

    /// Shortens a native-payment URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`].
    pub async fn short_url(
        &self,
        params: &mut ParameterSet,
        cancel: Option<&CancellationToken>,
    ) -> Result<ShortUrlResponse, GatewayError> {
        self.call(Endpoint::ShortUrl, params, cancel).await?.decode()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::cert::CertificateSource;
    use crate::response::GatewayReply;
    use crate::{ClientConfig, GatewayError};

    use super::*;

    fn production(server: &MockServer) -> Client {
        Client::new(ClientConfig::new("A", "M", "K", true).with_base_url(server.uri())).unwrap()
    }

    fn refund_params() -> ParameterSet {
        ParameterSet::new()
            .with("nonce_str", "n1")
            .with("out_trade_no", "o1")
            .with("out_refund_no", "r1")
            .with("total_fee", 100)
            .with("refund_fee", 100)
    }

    #[tokio::test]
    async fn order_query_without_reference_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut params = ParameterSet::new().with("nonce_str", "n1");
        let err = production(&server)
            .query_order(&mut params, None)
            .await
            .unwrap_err();
        match err {
            GatewayError::Validation(e) => {
                assert!(e.reason.contains("out_trade_no"));
                assert!(e.reason.contains("transaction_id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_order_decodes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pay/orderquery"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<xml><return_code><![CDATA[SUCCESS]]></return_code>\
                 <result_code><![CDATA[SUCCESS]]></result_code>\
                 <trade_state><![CDATA[SUCCESS]]></trade_state>\
                 <transaction_id><![CDATA[4200001]]></transaction_id>\
                 <total_fee>100</total_fee></xml>",
            ))
            .mount(&server)
            .await;

        let mut params = ParameterSet::new()
            .with("nonce_str", "n1")
            .with("out_trade_no", "o1");
        let reply = production(&server)
            .query_order(&mut params, None)
            .await
            .unwrap();
        assert!(reply.is_success());
        assert_eq!(reply.transaction_id.as_deref(), Some("4200001"));
        assert_eq!(reply.total_fee, Some(100));
    }

    #[tokio::test]
    async fn malformed_reply_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<xml><return_code>SUCCESS</xml>"))
            .mount(&server)
            .await;

        let mut params = ParameterSet::new()
            .with("nonce_str", "n1")
            .with("out_trade_no", "o1");
        let err = production(&server)
            .close_order(&mut params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
        assert_eq!(err.raw_body(), Some(b"<xml><return_code>SUCCESS</xml>".as_slice()));
    }

    #[tokio::test]
    async fn refund_without_certificate_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = production(&server)
            .refund(&mut refund_params(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Certificate(_)));
        assert!(err.is_local());
    }

    #[tokio::test]
    async fn refund_with_attached_certificate_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/secapi/pay/refund"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<xml><return_code>SUCCESS</return_code><result_code>SUCCESS</result_code>\
                 <refund_id>50000</refund_id><refund_fee>100</refund_fee></xml>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = production(&server);
        let source = CertificateSource::from_pem(
            include_bytes!("../testdata/client_cert.pem").as_slice(),
            include_bytes!("../testdata/client_key.pem").as_slice(),
        );
        assert!(client.attach_certificate(&source).await.unwrap().is_some());

        let reply = client.refund(&mut refund_params(), None).await.unwrap();
        assert_eq!(reply.refund_id.as_deref(), Some("50000"));
        assert_eq!(reply.refund_fee, Some(100));
    }

    #[tokio::test]
    async fn fund_flow_is_unsupported_in_sandbox() {
        let client = Client::new(
            ClientConfig::new("A", "M", "K", false)
                .with_base_url("http://127.0.0.1:9")
                .with_sandbox_key("SBK"),
        )
        .unwrap();
        let mut params = ParameterSet::new()
            .with("nonce_str", "n1")
            .with("bill_date", "20240101")
            .with("account_type", "Basic");
        let err = client
            .download_fund_flow(&mut params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedMode(_)));
    }

    #[tokio::test]
    async fn download_bill_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pay/downloadbill"))
            .respond_with(ResponseTemplate::new(200).set_body_string("交易时间,公众账号ID\n`2024-01-01,`wx1\n"))
            .mount(&server)
            .await;

        let mut params = ParameterSet::new()
            .with("nonce_str", "n1")
            .with("bill_date", "20240101")
            .with("bill_type", "ALL");
        let text = production(&server)
            .download_bill(&mut params, None)
            .await
            .unwrap();
        assert!(text.starts_with("交易时间"));
    }

    #[tokio::test]
    async fn sandbox_short_url_uses_production_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/shorturl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<xml><return_code>SUCCESS</return_code><result_code>SUCCESS</result_code>\
                 <short_url>weixin://wxpay/s/An4baqw</short_url></xml>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(
            ClientConfig::new("A", "M", "K", false).with_base_url(server.uri()),
        )
        .unwrap();
        let mut params = ParameterSet::new()
            .with("nonce_str", "n1")
            .with("long_url", "weixin://wxpay/bizpayurl?pr=abc");
        let reply = client.short_url(&mut params, None).await.unwrap();
        assert_eq!(reply.short_url.as_deref(), Some("weixin://wxpay/s/An4baqw"));
        assert!(wxpay::verify_signature(&params, "K", wxpay::SignType::Md5));
    }
}
