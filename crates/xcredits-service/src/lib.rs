//! xcredits HTTP API service.
//!
//! This crate exposes the credits engines over HTTP:
//!
//! - Balance and transaction history
//! - Download checks and charges against path pricing
//! - Redeem codes
//! - Payment orders and provider callbacks
//! - Registration and verification codes
//! - Admin operations (pricing rules, code batches, grants, approvals)
//!
//! # Authentication
//!
//! 1. **User JWT tokens** (HS256) - for end-user requests
//! 2. **Admin API key** - `X-Admin-Key` for privileged endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for the router

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod payment;
pub mod routes;
pub mod state;

pub use config::{AlipayConfig, ServiceConfig, WechatConfig, WechatSignType};
pub use error::ApiError;
pub use maintenance::spawn_maintenance;
pub use payment::{AlipayProvider, WechatProvider};
pub use routes::create_router;
pub use state::AppState;
