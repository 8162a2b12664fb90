//! `WeChat` Pay (v2 XML protocol) adapter.
//!
//! Requests and notifications are signed over the non-empty parameters sorted
//! by name, joined as `k=v&...`, with `&key=<api key>` appended. The digest is
//! MD5 (the protocol default) or HMAC-SHA256 keyed by the API key, chosen by
//! [`WechatSignType`]; notifications are checked with the type they declare.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use xcredits_core::{random_hex, PaymentOrder};
use xcredits_engine::{
    Acknowledgement, CheckoutPayload, GatewayError, PaymentProvider, RefundOutcome,
    VerifiedCallback,
};

use super::types::{NotificationReply, PaymentNotification, UnifiedOrderRequest, UnifiedOrderResponse};
use crate::config::{WechatConfig, WechatSignType};
use crate::crypto::{constant_time_eq, hmac_sha256_hex, md5_hex};

/// Registry name of the `WeChat` Pay provider.
pub const WECHAT_PROVIDER: &str = "wechat";

const SUCCESS: &str = "SUCCESS";
const TIME_END_FORMAT: &str = "%Y%m%d%H%M%S";
/// China Standard Time, the zone of `time_end`.
const CST_OFFSET_SECONDS: i32 = 8 * 3600;

/// Sign `params` with `api_key` using `sign_type`. Empty values are skipped.
///
/// # Errors
///
/// Returns `GatewayError::Malformed` if the key cannot be used for HMAC.
pub fn sign_params(
    params: &[(&str, &str)],
    api_key: &str,
    sign_type: WechatSignType,
) -> Result<String, GatewayError> {
    let mut fields: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let mut query = fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    query.push_str("&key=");
    query.push_str(api_key);

    let digest = match sign_type {
        WechatSignType::Md5 => md5_hex(&query),
        WechatSignType::HmacSha256 => {
            hmac_sha256_hex(api_key, &query).map_err(|e| GatewayError::Malformed(e.to_string()))?
        }
    };
    Ok(digest.to_uppercase())
}

/// `WeChat` Pay native (QR code) payments.
#[derive(Debug, Clone)]
pub struct WechatProvider {
    client: Client,
    config: WechatConfig,
}

impl WechatProvider {
    /// Create a provider.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Request` if the HTTP client cannot be built.
    pub fn new(config: WechatConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn unified_order(&self, order: &PaymentOrder) -> Result<UnifiedOrderRequest, GatewayError> {
        let mut request = UnifiedOrderRequest {
            appid: self.config.app_id.clone(),
            mch_id: self.config.mch_id.clone(),
            nonce_str: random_hex(16),
            sign: String::new(),
            sign_type: self.config.sign_type.as_str().to_string(),
            body: format!("Credits purchase - {} credits", order.credits),
            out_trade_no: order.order_no.clone(),
            total_fee: order.amount_minor,
            spbill_create_ip: "127.0.0.1".to_string(),
            notify_url: self.config.notify_url.clone(),
            trade_type: "NATIVE".to_string(),
        };
        let total_fee = request.total_fee.to_string();
        request.sign = sign_params(
            &[
                ("appid", request.appid.as_str()),
                ("mch_id", request.mch_id.as_str()),
                ("nonce_str", request.nonce_str.as_str()),
                ("sign_type", request.sign_type.as_str()),
                ("body", request.body.as_str()),
                ("out_trade_no", request.out_trade_no.as_str()),
                ("total_fee", total_fee.as_str()),
                ("spbill_create_ip", request.spbill_create_ip.as_str()),
                ("notify_url", request.notify_url.as_str()),
                ("trade_type", request.trade_type.as_str()),
            ],
            &self.config.api_key,
            self.config.sign_type,
        )?;
        Ok(request)
    }
}

#[async_trait]
impl PaymentProvider for WechatProvider {
    fn name(&self) -> &str {
        WECHAT_PROVIDER
    }

    async fn create_order(&self, order: &PaymentOrder) -> Result<CheckoutPayload, GatewayError> {
        let request = self.unified_order(order)?;
        let xml = quick_xml::se::to_string_with_root("xml", &request)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let response = self
            .client
            .post(&self.config.gateway_url)
            .header("content-type", "application/xml")
            .body(xml)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let reply: UnifiedOrderResponse =
            quick_xml::de::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if reply.return_code != SUCCESS {
            return Err(GatewayError::Request(format!(
                "wechat error: {}",
                reply.return_msg
            )));
        }
        if reply.result_code != SUCCESS {
            return Err(GatewayError::Request(format!(
                "wechat error: {} - {}",
                reply.err_code, reply.err_code_des
            )));
        }

        tracing::debug!(
            order_no = %order.order_no,
            prepay_id = %reply.prepay_id,
            "WeChat unified order created"
        );

        Ok(CheckoutPayload {
            payment_url: None,
            qr_code: Some(reply.code_url.clone()),
            data: serde_json::json!({
                "provider": WECHAT_PROVIDER,
                "prepay_id": reply.prepay_id,
                "code_url": reply.code_url,
                "trade_type": reply.trade_type,
            }),
        })
    }

    fn verify_callback(&self, raw: &[u8]) -> Result<VerifiedCallback, GatewayError> {
        let text = std::str::from_utf8(raw).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let notification: PaymentNotification =
            quick_xml::de::from_str(text).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if notification.sign.is_empty() {
            return Err(GatewayError::SignatureInvalid("missing sign".into()));
        }
        let sign_type = if notification.sign_type.is_empty() {
            WechatSignType::Md5
        } else {
            WechatSignType::parse(&notification.sign_type).ok_or_else(|| {
                GatewayError::Malformed(format!("unknown sign_type {}", notification.sign_type))
            })?
        };
        let expected = sign_params(&notification.signed_fields(), &self.config.api_key, sign_type)?;
        if !constant_time_eq(&expected, &notification.sign) {
            return Err(GatewayError::SignatureInvalid(
                "notification sign mismatch".into(),
            ));
        }
        if notification.mch_id != self.config.mch_id || notification.appid != self.config.app_id {
            return Err(GatewayError::SignatureInvalid(
                "notification for another merchant".into(),
            ));
        }
        if notification.out_trade_no.is_empty() {
            return Err(GatewayError::Malformed("missing out_trade_no".into()));
        }

        let valid = notification.return_code == SUCCESS && notification.result_code == SUCCESS;
        // Failed payments carry no amount or completion time worth recording.
        let (amount_minor, paid_at) = if valid {
            let amount = notification
                .total_fee
                .parse()
                .map_err(|_| GatewayError::Malformed("total_fee is not an integer".into()))?;
            let paid_at = parse_time_end(&notification.time_end).ok_or_else(|| {
                GatewayError::Malformed(format!(
                    "time_end {:?} is not a yyyyMMddHHmmss timestamp",
                    notification.time_end
                ))
            })?;
            (amount, paid_at)
        } else {
            (notification.total_fee.parse().unwrap_or_default(), Utc::now())
        };

        Ok(VerifiedCallback {
            order_no: notification.out_trade_no,
            provider_transaction_id: notification.transaction_id,
            amount_minor,
            paid_at,
            valid,
        })
    }

    async fn refund(
        &self,
        order: &PaymentOrder,
        _amount_minor: i64,
    ) -> Result<RefundOutcome, GatewayError> {
        // Refunds need the merchant TLS certificate, which is not provisioned.
        tracing::warn!(order_no = %order.order_no, "WeChat refund requested but not supported");
        Err(GatewayError::Unsupported(
            "wechat refunds are not supported".into(),
        ))
    }

    fn acknowledgement(&self, success: bool) -> Acknowledgement {
        let reply = if success {
            NotificationReply {
                return_code: SUCCESS,
                return_msg: "OK",
            }
        } else {
            NotificationReply {
                return_code: "FAIL",
                return_msg: "ERROR",
            }
        };
        let body = quick_xml::se::to_string_with_root("xml", &reply).unwrap_or_else(|_| {
            format!(
                "<xml><return_code>{}</return_code><return_msg>{}</return_msg></xml>",
                reply.return_code, reply.return_msg
            )
        });
        Acknowledgement {
            content_type: "application/xml",
            body,
        }
    }
}

fn parse_time_end(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, TIME_END_FORMAT).ok()?;
    let cst = FixedOffset::east_opt(CST_OFFSET_SECONDS)?;
    cst.from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use xcredits_core::UserId;

    fn provider() -> WechatProvider {
        WechatProvider::new(WechatConfig {
            app_id: "wx-app".into(),
            mch_id: "mch-1".into(),
            api_key: "merchant-key".into(),
            notify_url: "https://example.test/webhooks/payments/wechat".into(),
            gateway_url: "http://127.0.0.1:9/unifiedorder".into(),
            sign_type: WechatSignType::HmacSha256,
        })
        .unwrap()
    }

    fn resign(p: &WechatProvider, n: &mut PaymentNotification) {
        let sign_type = WechatSignType::parse(&n.sign_type).unwrap_or_default();
        n.sign = sign_params(&n.signed_fields(), &p.config.api_key, sign_type).unwrap();
    }

    fn signed_notification(p: &WechatProvider, total_fee: &str) -> PaymentNotification {
        let mut n = PaymentNotification {
            return_code: SUCCESS.into(),
            appid: "wx-app".into(),
            mch_id: "mch-1".into(),
            nonce_str: "abc".into(),
            sign_type: "HMAC-SHA256".into(),
            result_code: SUCCESS.into(),
            openid: "o-1".into(),
            trade_type: "NATIVE".into(),
            bank_type: "CMC".into(),
            total_fee: total_fee.into(),
            transaction_id: "4200001".into(),
            out_trade_no: "XC1700000000ABCDEFGH".into(),
            time_end: "20240101120000".into(),
            ..PaymentNotification::default()
        };
        resign(p, &mut n);
        n
    }

    fn to_xml(n: &PaymentNotification) -> Vec<u8> {
        quick_xml::se::to_string_with_root("xml", n)
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn sign_skips_empty_values_and_sorts() {
        for (sign_type, len) in [(WechatSignType::Md5, 32), (WechatSignType::HmacSha256, 64)] {
            let a = sign_params(&[("b", "2"), ("a", "1"), ("c", "")], "k", sign_type).unwrap();
            let b = sign_params(&[("a", "1"), ("b", "2")], "k", sign_type).unwrap();
            assert_eq!(a, b);
            assert_eq!(a, a.to_uppercase());
            assert_eq!(a.len(), len);
        }
    }

    #[test]
    fn md5_sign_hashes_query_with_key() {
        let sign = sign_params(&[("a", "1")], "k", WechatSignType::Md5).unwrap();
        assert_eq!(sign, md5_hex("a=1&key=k").to_uppercase());
    }

    #[test]
    fn md5_notifications_verify() {
        let p = provider();
        let mut n = signed_notification(&p, "1500");
        n.sign_type = "MD5".into();
        resign(&p, &mut n);
        assert!(p.verify_callback(&to_xml(&n)).unwrap().valid);

        // No sign_type means MD5.
        n.sign_type = String::new();
        resign(&p, &mut n);
        assert!(p.verify_callback(&to_xml(&n)).unwrap().valid);
    }

    #[test]
    fn unknown_sign_type_is_malformed() {
        let p = provider();
        let mut n = signed_notification(&p, "1500");
        n.sign_type = "SM3".into();
        assert!(matches!(
            p.verify_callback(&to_xml(&n)),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn unparsable_time_end_is_malformed() {
        let p = provider();
        for time_end in ["", "2024-01-01 12:00:00", "20241301120000"] {
            let mut n = signed_notification(&p, "1500");
            n.time_end = time_end.into();
            resign(&p, &mut n);
            let err = p.verify_callback(&to_xml(&n)).unwrap_err();
            assert!(matches!(err, GatewayError::Malformed(_)), "{time_end:?}: {err:?}");
        }
    }

    #[test]
    fn unified_order_declares_configured_sign_type() {
        let mut p = provider();
        let order = PaymentOrder::pending(
            UserId::generate(),
            5,
            50,
            "CNY",
            WECHAT_PROVIDER,
            Utc::now(),
            chrono::Duration::minutes(30),
        );
        assert_eq!(p.unified_order(&order).unwrap().sign_type, "HMAC-SHA256");
        p.config.sign_type = WechatSignType::Md5;
        let request = p.unified_order(&order).unwrap();
        assert_eq!(request.sign_type, "MD5");
        assert_eq!(request.sign.len(), 32);
    }

    #[test]
    fn verifies_signed_notification() {
        let p = provider();
        let n = signed_notification(&p, "1500");
        let cb = p.verify_callback(&to_xml(&n)).unwrap();
        assert!(cb.valid);
        assert_eq!(cb.amount_minor, 1500);
        assert_eq!(cb.order_no, "XC1700000000ABCDEFGH");
        assert_eq!(cb.provider_transaction_id, "4200001");
        // 12:00 CST is 04:00 UTC.
        assert_eq!(cb.paid_at.hour(), 4);
    }

    #[test]
    fn rejects_tampered_amount() {
        let p = provider();
        let mut n = signed_notification(&p, "1500");
        n.total_fee = "1".into();
        let err = p.verify_callback(&to_xml(&n)).unwrap_err();
        assert!(matches!(err, GatewayError::SignatureInvalid(_)));
    }

    #[test]
    fn rejects_unsigned_and_garbage() {
        let p = provider();
        let mut n = signed_notification(&p, "1500");
        n.sign = String::new();
        assert!(matches!(
            p.verify_callback(&to_xml(&n)),
            Err(GatewayError::SignatureInvalid(_))
        ));
        assert!(p.verify_callback(b"\xff\xfe").is_err());
    }

    #[test]
    fn failed_payment_verifies_as_invalid() {
        let p = provider();
        let mut n = signed_notification(&p, "1500");
        n.result_code = "FAIL".into();
        n.time_end = String::new();
        resign(&p, &mut n);
        let cb = p.verify_callback(&to_xml(&n)).unwrap();
        assert!(!cb.valid);
    }

    #[test]
    fn acknowledgement_is_xml() {
        let ack = provider().acknowledgement(true);
        assert_eq!(ack.content_type, "application/xml");
        assert!(ack.body.contains("SUCCESS"));
    }
}
