//! `WeChat` Pay v2 XML message types.

use serde::{Deserialize, Serialize};

/// Unified-order request body (`<xml>...</xml>`).
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedOrderRequest {
    /// App id.
    pub appid: String,
    /// Merchant id.
    pub mch_id: String,
    /// Random request nonce.
    pub nonce_str: String,
    /// Request signature.
    pub sign: String,
    /// Signature algorithm.
    pub sign_type: String,
    /// Order description shown to the payer.
    pub body: String,
    /// Our order number.
    pub out_trade_no: String,
    /// Amount in minor units (fen).
    pub total_fee: i64,
    /// Client IP.
    pub spbill_create_ip: String,
    /// Callback URL.
    pub notify_url: String,
    /// Payment type; `NATIVE` for QR code payments.
    pub trade_type: String,
}

/// Unified-order response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnifiedOrderResponse {
    /// Communication status.
    pub return_code: String,
    /// Communication message.
    pub return_msg: String,
    /// Business status.
    pub result_code: String,
    /// Business error code.
    pub err_code: String,
    /// Business error description.
    pub err_code_des: String,
    /// Prepay session id.
    pub prepay_id: String,
    /// QR code content for native payments.
    pub code_url: String,
    /// Echoed payment type.
    pub trade_type: String,
}

/// Asynchronous payment notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentNotification {
    /// Communication status.
    pub return_code: String,
    /// Communication message.
    pub return_msg: String,
    /// App id.
    pub appid: String,
    /// Merchant id.
    pub mch_id: String,
    /// Random nonce.
    pub nonce_str: String,
    /// Notification signature.
    pub sign: String,
    /// Signature algorithm.
    pub sign_type: String,
    /// Business status.
    pub result_code: String,
    /// Payer's open id.
    pub openid: String,
    /// Payment type.
    pub trade_type: String,
    /// Paying bank.
    pub bank_type: String,
    /// Amount paid in minor units, as sent.
    pub total_fee: String,
    /// Provider transaction id.
    pub transaction_id: String,
    /// Our order number.
    pub out_trade_no: String,
    /// Payment completion time, `yyyyMMddHHmmss` China Standard Time.
    pub time_end: String,
}

impl PaymentNotification {
    /// Every signed field as `(name, value)`; `sign` itself is excluded.
    #[must_use]
    pub fn signed_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("return_code", self.return_code.as_str()),
            ("return_msg", self.return_msg.as_str()),
            ("appid", self.appid.as_str()),
            ("mch_id", self.mch_id.as_str()),
            ("nonce_str", self.nonce_str.as_str()),
            ("sign_type", self.sign_type.as_str()),
            ("result_code", self.result_code.as_str()),
            ("openid", self.openid.as_str()),
            ("trade_type", self.trade_type.as_str()),
            ("bank_type", self.bank_type.as_str()),
            ("total_fee", self.total_fee.as_str()),
            ("transaction_id", self.transaction_id.as_str()),
            ("out_trade_no", self.out_trade_no.as_str()),
            ("time_end", self.time_end.as_str()),
        ]
    }
}

/// Reply to a notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationReply {
    /// `SUCCESS` or `FAIL`.
    pub return_code: &'static str,
    /// Free-text message.
    pub return_msg: &'static str,
}
