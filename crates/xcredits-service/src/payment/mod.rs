//! Payment provider adapters.
//!
//! Each adapter implements [`xcredits_engine::PaymentProvider`] and is
//! registered with the order engine under its name.

pub mod alipay;
pub mod types;
pub mod wechat;

pub use alipay::{AlipayProvider, ALIPAY_PROVIDER};
pub use wechat::{sign_params, WechatProvider, WECHAT_PROVIDER};
