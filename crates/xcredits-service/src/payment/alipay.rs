//! Alipay open-platform adapter (`alipay.trade.precreate` QR payments).
//!
//! Requests and notifications use the `RSA2` sign type: PKCS#1 v1.5 over
//! SHA-256 of the non-empty parameters sorted by name and joined as
//! `k=v&...`, base64 encoded. Requests are signed with the app private key;
//! notifications are verified with the Alipay platform public key and carry
//! neither `sign` nor `sign_type` in the signed content.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use sha2::Sha256;
use xcredits_core::PaymentOrder;
use xcredits_engine::{
    Acknowledgement, CheckoutPayload, GatewayError, PaymentProvider, RefundOutcome,
    VerifiedCallback,
};

use crate::config::AlipayConfig;

/// Registry name of the Alipay provider.
pub const ALIPAY_PROVIDER: &str = "alipay";

const PRECREATE_METHOD: &str = "alipay.trade.precreate";
const REFUND_METHOD: &str = "alipay.trade.refund";
const SIGN_TYPE: &str = "RSA2";
const SUCCESS_CODE: &str = "10000";
const ORDER_TIMEOUT: &str = "30m";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// China Standard Time, the zone of request timestamps and `gmt_payment`.
const CST_OFFSET_SECONDS: i32 = 8 * 3600;

// ============================================================================
// Signing
// ============================================================================

/// Parse the app private key: PEM (PKCS#8 or PKCS#1) or bare base64 DER.
///
/// # Errors
///
/// Returns `GatewayError::Malformed` if the text is not an RSA private key.
pub fn signing_key(text: &str) -> Result<SigningKey<Sha256>, GatewayError> {
    let text = text.trim();
    let key = if text.starts_with("-----BEGIN") {
        RsaPrivateKey::from_pkcs8_pem(text)
            .map_err(|e| e.to_string())
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text).map_err(|e| e.to_string()))
    } else {
        let der = decode_base64(text)?;
        RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| e.to_string())
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der).map_err(|e| e.to_string()))
    }
    .map_err(|e| GatewayError::Malformed(format!("app private key: {e}")))?;
    Ok(SigningKey::new(key))
}

/// Parse the Alipay public key: PEM or bare base64 DER (SPKI).
///
/// # Errors
///
/// Returns `GatewayError::Malformed` if the text is not an RSA public key.
pub fn verifying_key(text: &str) -> Result<VerifyingKey<Sha256>, GatewayError> {
    let text = text.trim();
    let key = if text.starts_with("-----BEGIN") {
        RsaPublicKey::from_public_key_pem(text)
    } else {
        RsaPublicKey::from_public_key_der(&decode_base64(text)?)
    }
    .map_err(|e| GatewayError::Malformed(format!("alipay public key: {e}")))?;
    Ok(VerifyingKey::new(key))
}

/// The string that is signed: non-empty `params` other than `sign`, sorted.
#[must_use]
pub fn signing_content(params: &[(&str, &str)]) -> String {
    let mut fields: Vec<_> = params
        .iter()
        .filter(|(k, v)| *k != "sign" && !v.is_empty())
        .collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign `params` with `key`, returning the base64 signature.
///
/// # Errors
///
/// Returns `GatewayError::Malformed` if the key cannot produce a signature.
pub fn sign_params(
    params: &[(&str, &str)],
    key: &SigningKey<Sha256>,
) -> Result<String, GatewayError> {
    let signature = key
        .try_sign(signing_content(params).as_bytes())
        .map_err(|e| GatewayError::Malformed(format!("rsa sign: {e}")))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Check a base64 `sign` over `params` against `key`.
///
/// # Errors
///
/// Returns `GatewayError::SignatureInvalid` if the signature does not verify.
pub fn verify_params(
    params: &[(&str, &str)],
    sign: &str,
    key: &VerifyingKey<Sha256>,
) -> Result<(), GatewayError> {
    let raw = STANDARD
        .decode(sign)
        .map_err(|_| GatewayError::SignatureInvalid("sign is not base64".into()))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|_| GatewayError::SignatureInvalid("sign has the wrong length".into()))?;
    key.verify(signing_content(params).as_bytes(), &signature)
        .map_err(|_| GatewayError::SignatureInvalid("notification sign mismatch".into()))
}

fn decode_base64(text: &str) -> Result<Vec<u8>, GatewayError> {
    let compact: String = text.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map_err(|e| GatewayError::Malformed(format!("key is not base64: {e}")))
}

// ============================================================================
// Amounts and times
// ============================================================================

/// Minor units as a yuan string with two decimals (`1500` is `"15.00"`).
#[must_use]
pub fn format_yuan(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a yuan string with at most two decimals into minor units.
#[must_use]
pub fn parse_yuan(value: &str) -> Option<i64> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty()
        || fraction.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let cents = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse::<i64>().ok()?,
    };
    whole.parse::<i64>().ok()?.checked_mul(100)?.checked_add(cents)
}

fn form_field<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map_or("", String::as_str)
}

fn cst() -> Result<FixedOffset, GatewayError> {
    FixedOffset::east_opt(CST_OFFSET_SECONDS)
        .ok_or_else(|| GatewayError::Malformed("invalid CST offset".into()))
}

fn parse_gmt_payment(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()?;
    FixedOffset::east_opt(CST_OFFSET_SECONDS)?
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

// ============================================================================
// Provider
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GatewayReply {
    code: String,
    msg: String,
    sub_code: String,
    sub_msg: String,
    out_trade_no: String,
    qr_code: String,
    out_request_no: String,
}

impl GatewayReply {
    fn succeeded(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    fn describe(&self) -> String {
        if self.sub_code.is_empty() {
            format!("{} - {}", self.code, self.msg)
        } else {
            format!("{} - {} ({}: {})", self.code, self.msg, self.sub_code, self.sub_msg)
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrecreateEnvelope {
    alipay_trade_precreate_response: GatewayReply,
}

#[derive(Debug, Deserialize)]
struct RefundEnvelope {
    alipay_trade_refund_response: GatewayReply,
}

/// Alipay face-to-face (QR code) payments.
#[derive(Clone)]
pub struct AlipayProvider {
    client: Client,
    config: AlipayConfig,
    signer: SigningKey<Sha256>,
    verifier: VerifyingKey<Sha256>,
}

impl fmt::Debug for AlipayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlipayProvider")
            .field("app_id", &self.config.app_id)
            .field("gateway_url", &self.config.gateway_url)
            .finish_non_exhaustive()
    }
}

impl AlipayProvider {
    /// Create a provider, parsing both keys up front.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Malformed` for unusable keys and
    /// `GatewayError::Request` if the HTTP client cannot be built.
    pub fn new(config: AlipayConfig) -> Result<Self, GatewayError> {
        let signer = signing_key(&config.private_key)?;
        let verifier = verifying_key(&config.alipay_public_key)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self {
            client,
            config,
            signer,
            verifier,
        })
    }

    /// Common request parameters for `method`, signed, with `biz_content`.
    fn signed_request(
        &self,
        method: &str,
        biz_content: &serde_json::Value,
    ) -> Result<Vec<(&'static str, String)>, GatewayError> {
        let timestamp = Utc::now()
            .with_timezone(&cst()?)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let mut params: Vec<(&'static str, String)> = vec![
            ("app_id", self.config.app_id.clone()),
            ("method", method.to_string()),
            ("charset", "utf-8".to_string()),
            ("sign_type", SIGN_TYPE.to_string()),
            ("timestamp", timestamp),
            ("version", "1.0".to_string()),
            ("notify_url", self.config.notify_url.clone()),
            ("return_url", self.config.return_url.clone()),
            ("biz_content", biz_content.to_string()),
        ];
        let borrowed: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let sign = sign_params(&borrowed, &self.signer)?;
        params.push(("sign", sign));
        Ok(params)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(&self.config.gateway_url)
            .form(params)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for AlipayProvider {
    fn name(&self) -> &str {
        ALIPAY_PROVIDER
    }

    async fn create_order(&self, order: &PaymentOrder) -> Result<CheckoutPayload, GatewayError> {
        let biz_content = serde_json::json!({
            "out_trade_no": order.order_no,
            "total_amount": format_yuan(order.amount_minor),
            "subject": format!("Credits purchase - {} credits", order.credits),
            "body": format!("Purchase {} credits", order.credits),
            "timeout_express": ORDER_TIMEOUT,
        });
        let params = self.signed_request(PRECREATE_METHOD, &biz_content)?;
        let envelope: PrecreateEnvelope = self.call(&params).await?;
        let reply = envelope.alipay_trade_precreate_response;
        if !reply.succeeded() {
            return Err(GatewayError::Request(format!(
                "alipay error: {}",
                reply.describe()
            )));
        }

        tracing::debug!(order_no = %order.order_no, "Alipay precreate succeeded");

        Ok(CheckoutPayload {
            payment_url: None,
            qr_code: Some(reply.qr_code.clone()),
            data: serde_json::json!({
                "provider": ALIPAY_PROVIDER,
                "qr_code": reply.qr_code,
                "out_trade_no": reply.out_trade_no,
            }),
        })
    }

    fn verify_callback(&self, raw: &[u8]) -> Result<VerifiedCallback, GatewayError> {
        let fields: BTreeMap<String, String> = serde_urlencoded::from_bytes(raw)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let field = |name: &str| form_field(&fields, name);

        let sign = field("sign");
        if sign.is_empty() {
            return Err(GatewayError::SignatureInvalid("missing sign".into()));
        }
        let signed: Vec<(&str, &str)> = fields
            .iter()
            .filter(|(k, _)| k.as_str() != "sign_type")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        verify_params(&signed, sign, &self.verifier)?;

        if field("app_id") != self.config.app_id {
            return Err(GatewayError::SignatureInvalid(
                "notification for another app".into(),
            ));
        }
        let order_no = field("out_trade_no");
        if order_no.is_empty() {
            return Err(GatewayError::Malformed("missing out_trade_no".into()));
        }

        let valid = matches!(field("trade_status"), "TRADE_SUCCESS" | "TRADE_FINISHED");
        // Unpaid notifications carry no amount or payment time worth recording.
        let (amount_minor, paid_at) = if valid {
            let amount = parse_yuan(field("total_amount")).ok_or_else(|| {
                GatewayError::Malformed("total_amount is not a yuan amount".into())
            })?;
            let paid_at = parse_gmt_payment(field("gmt_payment")).ok_or_else(|| {
                GatewayError::Malformed(format!(
                    "gmt_payment {:?} is not a timestamp",
                    field("gmt_payment")
                ))
            })?;
            (amount, paid_at)
        } else {
            (parse_yuan(field("total_amount")).unwrap_or_default(), Utc::now())
        };

        Ok(VerifiedCallback {
            order_no: order_no.to_string(),
            provider_transaction_id: field("trade_no").to_string(),
            amount_minor,
            paid_at,
            valid,
        })
    }

    async fn refund(
        &self,
        order: &PaymentOrder,
        amount_minor: i64,
    ) -> Result<RefundOutcome, GatewayError> {
        let out_request_no = format!("{}_refund_{}", order.order_no, Utc::now().timestamp());
        let biz_content = serde_json::json!({
            "out_trade_no": order.order_no,
            "refund_amount": format_yuan(amount_minor),
            "refund_reason": "Credits refund",
            "out_request_no": out_request_no,
        });
        let params = self.signed_request(REFUND_METHOD, &biz_content)?;
        let envelope: RefundEnvelope = self.call(&params).await?;
        let reply = envelope.alipay_trade_refund_response;

        if !reply.succeeded() {
            tracing::warn!(
                order_no = %order.order_no,
                code = %reply.code,
                sub_code = %reply.sub_code,
                "Alipay refund rejected"
            );
            return Ok(RefundOutcome {
                success: false,
                refund_id: None,
                message: reply.describe(),
            });
        }

        let refund_id = if reply.out_request_no.is_empty() {
            out_request_no
        } else {
            reply.out_request_no
        };
        Ok(RefundOutcome {
            success: true,
            refund_id: Some(refund_id),
            message: reply.msg,
        })
    }

    fn acknowledgement(&self, success: bool) -> Acknowledgement {
        Acknowledgement {
            content_type: "text/plain",
            body: if success { "success" } else { "fail" }.to_string(),
        }
    }
}
