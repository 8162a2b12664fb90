//! Application state.

use std::sync::Arc;

use xcredits_engine::{Clock, Engines, PaymentGateways, SystemClock};
use xcredits_store::Store;

use crate::config::ServiceConfig;
use crate::payment::{AlipayProvider, WechatProvider};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Ledger, pricing, redemption, order and registration engines.
    pub engines: Engines,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create application state with the providers the configuration enables.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let mut gateways = PaymentGateways::new();

        if let Some(wechat) = &config.wechat {
            match WechatProvider::new(wechat.clone()) {
                Ok(provider) => {
                    tracing::info!(gateway_url = %wechat.gateway_url, "WeChat Pay enabled");
                    gateways.register(Arc::new(provider));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create WeChat Pay provider");
                }
            }
        } else {
            tracing::warn!("WeChat Pay not configured");
        }

        if let Some(alipay) = &config.alipay {
            match AlipayProvider::new(alipay.clone()) {
                Ok(provider) => {
                    tracing::info!(gateway_url = %alipay.gateway_url, "Alipay enabled");
                    gateways.register(Arc::new(provider));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Alipay provider");
                }
            }
        } else {
            tracing::warn!("Alipay not configured");
        }

        if gateways.names().is_empty() {
            tracing::warn!("No payment provider configured - payment orders will not be available");
        }

        Self::with_gateways(store, config, gateways, Arc::new(SystemClock))
    }

    /// Create application state with explicit providers and clock.
    #[must_use]
    pub fn with_gateways(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        gateways: PaymentGateways,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engines = Engines::new(Arc::clone(&store), gateways, clock, config.order_config());
        Self {
            store,
            engines,
            config,
        }
    }
}
