//! Service configuration.

use std::path::Path;

use chrono::Duration;
use serde::Deserialize;
use xcredits_core::{DEFAULT_CURRENCY, DEFAULT_ORDER_TTL_MINUTES};
use xcredits_engine::OrderConfig;

/// Default `WeChat` Pay unified-order endpoint.
pub const WECHAT_DEFAULT_GATEWAY: &str = "https://api.mch.weixin.qq.com/pay/unifiedorder";

/// Default Alipay open-API gateway.
pub const ALIPAY_DEFAULT_GATEWAY: &str = "https://openapi.alipay.com/gateway.do";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/xcredits").
    pub data_dir: String,

    /// HS256 secret for user JWTs. Without it only test tokens authenticate.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT issuer (default: "xcredits").
    pub auth_issuer: String,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Seconds between expiry sweeps.
    pub sweep_interval_seconds: u64,

    /// Minutes a payment order stays payable.
    pub order_ttl_minutes: i64,

    /// Price of one credit in minor currency units.
    pub credit_price_minor: i64,

    /// ISO currency code for orders.
    pub currency: String,

    /// `WeChat` Pay settings (optional).
    pub wechat: Option<WechatConfig>,

    /// Alipay settings (optional).
    pub alipay: Option<AlipayConfig>,
}

/// `WeChat` Pay merchant settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WechatConfig {
    /// Official account / app id.
    pub app_id: String,
    /// Merchant id.
    pub mch_id: String,
    /// Merchant API key used for signing.
    pub api_key: String,
    /// Callback URL registered with the order.
    pub notify_url: String,
    /// Unified-order endpoint.
    #[serde(default = "default_wechat_gateway")]
    pub gateway_url: String,
    /// Digest used to sign requests.
    #[serde(default)]
    pub sign_type: WechatSignType,
}

/// `WeChat` Pay v2 signature algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum WechatSignType {
    /// Uppercase hex MD5, the protocol default.
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    /// Uppercase hex HMAC-SHA256 keyed by the API key.
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl WechatSignType {
    /// Wire name carried in `sign_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MD5" => Some(Self::Md5),
            "HMAC-SHA256" => Some(Self::HmacSha256),
            _ => None,
        }
    }
}

/// Alipay open-platform app settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AlipayConfig {
    /// Open-platform app id.
    pub app_id: String,
    /// App private key, PEM (PKCS#8 or PKCS#1) or bare base64.
    pub private_key: String,
    /// Alipay platform public key, PEM or bare base64.
    pub alipay_public_key: String,
    /// Asynchronous notification URL.
    pub notify_url: String,
    /// Browser return URL.
    #[serde(default)]
    pub return_url: String,
    /// Open-API gateway.
    #[serde(default = "default_alipay_gateway")]
    pub gateway_url: String,
}

fn default_wechat_gateway() -> String {
    WECHAT_DEFAULT_GATEWAY.to_string()
}

fn default_alipay_gateway() -> String {
    ALIPAY_DEFAULT_GATEWAY.to_string()
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/xcredits".into()),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").ok(),
            auth_issuer: std::env::var("AUTH_ISSUER").unwrap_or_else(|_| "xcredits".into()),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS").unwrap_or(30),
            sweep_interval_seconds: env_parse("SWEEP_INTERVAL_SECONDS").unwrap_or(60),
            order_ttl_minutes: env_parse("ORDER_TTL_MINUTES").unwrap_or(DEFAULT_ORDER_TTL_MINUTES),
            credit_price_minor: env_parse("CREDIT_PRICE_MINOR").unwrap_or(1),
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.into()),
            wechat: load_wechat_secrets(),
            alipay: load_alipay_secrets(),
        }
    }

    /// Order settings for the order engine.
    #[must_use]
    pub fn order_config(&self) -> OrderConfig {
        OrderConfig {
            ttl: Duration::minutes(self.order_ttl_minutes),
            credit_price_minor: self.credit_price_minor,
            currency: self.currency.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Load `WeChat` Pay secrets from file or environment.
fn load_wechat_secrets() -> Option<WechatConfig> {
    let secret_paths = [
        ".secrets/wechat.json",
        "xcredits/.secrets/wechat.json",
        "../.secrets/wechat.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<WechatConfig>(path) {
            tracing::info!(path = %path, "Loaded WeChat Pay secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("WeChat Pay secrets file not found, using environment variables");
    Some(WechatConfig {
        app_id: std::env::var("WECHAT_APP_ID").ok()?,
        mch_id: std::env::var("WECHAT_MCH_ID").ok()?,
        api_key: std::env::var("WECHAT_API_KEY").ok()?,
        notify_url: std::env::var("WECHAT_NOTIFY_URL").ok()?,
        gateway_url: std::env::var("WECHAT_GATEWAY_URL")
            .unwrap_or_else(|_| default_wechat_gateway()),
        sign_type: match std::env::var("WECHAT_SIGN_TYPE") {
            Ok(value) => WechatSignType::parse(&value).unwrap_or_else(|| {
                tracing::warn!(sign_type = %value, "Unknown WECHAT_SIGN_TYPE, using MD5");
                WechatSignType::Md5
            }),
            Err(_) => WechatSignType::default(),
        },
    })
}

/// Load Alipay secrets from file or environment.
fn load_alipay_secrets() -> Option<AlipayConfig> {
    let secret_paths = [
        ".secrets/alipay.json",
        "xcredits/.secrets/alipay.json",
        "../.secrets/alipay.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<AlipayConfig>(path) {
            tracing::info!(path = %path, "Loaded Alipay secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Alipay secrets file not found, using environment variables");
    Some(AlipayConfig {
        app_id: std::env::var("ALIPAY_APP_ID").ok()?,
        private_key: std::env::var("ALIPAY_PRIVATE_KEY").ok()?,
        alipay_public_key: std::env::var("ALIPAY_PUBLIC_KEY").ok()?,
        notify_url: std::env::var("ALIPAY_NOTIFY_URL").ok()?,
        return_url: std::env::var("ALIPAY_RETURN_URL").unwrap_or_default(),
        gateway_url: std::env::var("ALIPAY_GATEWAY_URL")
            .unwrap_or_else(|_| default_alipay_gateway()),
    })
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/xcredits".into(),
            auth_jwt_secret: None,
            auth_issuer: "xcredits".into(),
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            sweep_interval_seconds: 60,
            order_ttl_minutes: DEFAULT_ORDER_TTL_MINUTES,
            credit_price_minor: 1,
            currency: DEFAULT_CURRENCY.into(),
            wechat: None,
            alipay: None,
        }
    }
}
