//! Common test utilities for xcredits service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use xcredits_core::{UserId, VerificationPurpose};
use xcredits_engine::{Clock, ManualClock, PaymentGateways};
use xcredits_service::auth::JwtClaims;
use xcredits_service::{
    create_router, AlipayConfig, AlipayProvider, AppState, ServiceConfig, WechatConfig,
    WechatProvider, WechatSignType,
};
use xcredits_store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ISSUER: &str = "xcredits-tests";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const WECHAT_APP_ID: &str = "wx-test-app";
pub const WECHAT_MCH_ID: &str = "mch-test";
pub const WECHAT_API_KEY: &str = "wechat-merchant-key";
pub const ALIPAY_APP_ID: &str = "2021000000000001";
/// Key the harness's Alipay platform signs notifications with.
pub const ALIPAY_PLATFORM_PRIVATE_KEY: &str =
    include_str!("fixtures/alipay_platform_private.pem");
const ALIPAY_PLATFORM_PUBLIC_KEY: &str = include_str!("fixtures/alipay_platform_public.pem");
const ALIPAY_MERCHANT_PRIVATE_KEY: &str = include_str!("fixtures/alipay_merchant_private.pem");
/// Price of one credit in the harness, in minor units.
pub const CREDIT_PRICE_MINOR: i64 = 10;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for reading what the API never returns.
    pub store: Arc<MemoryStore>,
    /// The engines' clock.
    pub clock: Arc<ManualClock>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a harness with no payment providers.
    pub fn new() -> Self {
        Self::build(PaymentGateways::new())
    }

    /// Create a harness with `WeChat` Pay pointed at `gateway_url`.
    pub fn with_wechat(gateway_url: &str) -> Self {
        let mut gateways = PaymentGateways::new();
        let provider = WechatProvider::new(wechat_config(gateway_url))
            .expect("Failed to create WeChat provider");
        gateways.register(Arc::new(provider));
        Self::build(gateways)
    }

    /// Create a harness with Alipay pointed at `gateway_url`.
    pub fn with_alipay(gateway_url: &str) -> Self {
        let mut gateways = PaymentGateways::new();
        let provider = AlipayProvider::new(alipay_config(gateway_url))
            .expect("Failed to create Alipay provider");
        gateways.register(Arc::new(provider));
        Self::build(gateways)
    }

    fn build(gateways: PaymentGateways) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            auth_issuer: ISSUER.into(),
            admin_api_key: Some(ADMIN_KEY.into()),
            credit_price_minor: CREDIT_PRICE_MINOR,
            ..ServiceConfig::default()
        };

        let state = AppState::with_gateways(
            Arc::clone(&store) as Arc<dyn Store>,
            config,
            gateways,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            clock,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        auth_header_for(&self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        auth_header_for(&UserId::generate())
    }

    /// Get the admin key header value.
    pub fn admin_key_header(&self) -> String {
        ADMIN_KEY.to_string()
    }

    /// Grant the test user credits through the admin API.
    pub async fn fund(&self, amount: i64) {
        self.server
            .post("/v1/admin/credits/grant")
            .add_header("x-admin-key", self.admin_key_header())
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "amount": amount,
                "reason": "Test funding"
            }))
            .await
            .assert_status_ok();
    }

    /// Current balance of the test user, read through the API.
    pub async fn balance(&self) -> i64 {
        let response = self
            .server
            .get("/v1/credits/balance")
            .add_header("authorization", self.user_auth_header())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["balance"].as_i64().expect("balance is a number")
    }

    /// The verification token an applicant would receive by email.
    pub fn registration_token(&self, email: &str) -> String {
        self.store
            .find_registration_by_email(email)
            .expect("store read")
            .and_then(|r| r.token)
            .expect("registration has a token")
    }

    /// The verification code an applicant would receive by email.
    pub fn verification_code(&self, email: &str, purpose: VerificationPurpose) -> String {
        self.store
            .get_verification_code(email, purpose)
            .expect("store read")
            .expect("code was issued")
            .code
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Mint a bearer header carrying an HS256 JWT for `user_id`.
pub fn auth_header_for(user_id: &UserId) -> String {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        iss: ISSUER.into(),
        exp: now + 3600,
        iat: now,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign JWT");
    format!("Bearer {token}")
}

/// `WeChat` Pay settings for the harness merchant.
pub fn wechat_config(gateway_url: &str) -> WechatConfig {
    WechatConfig {
        app_id: WECHAT_APP_ID.into(),
        mch_id: WECHAT_MCH_ID.into(),
        api_key: WECHAT_API_KEY.into(),
        notify_url: "https://files.example.test/webhooks/payments/wechat".into(),
        gateway_url: gateway_url.into(),
        sign_type: WechatSignType::HmacSha256,
    }
}

/// Alipay app settings for the harness merchant.
pub fn alipay_config(gateway_url: &str) -> AlipayConfig {
    AlipayConfig {
        app_id: ALIPAY_APP_ID.into(),
        private_key: ALIPAY_MERCHANT_PRIVATE_KEY.into(),
        alipay_public_key: ALIPAY_PLATFORM_PUBLIC_KEY.into(),
        notify_url: "https://files.example.test/webhooks/payments/alipay".into(),
        return_url: String::new(),
        gateway_url: gateway_url.into(),
    }
}
