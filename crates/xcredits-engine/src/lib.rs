//! Credit engines for xcredits.
//!
//! This crate holds the domain logic that sits between the HTTP layer and the
//! store:
//!
//! - [`Ledger`]: balance mutation with per-account optimistic concurrency
//! - [`PricingResolver`]: longest-prefix price inheritance
//! - [`DownloadGate`]: check and charge a download
//! - [`RedeemEngine`]: code generation and redemption
//! - [`OrderEngine`]: payment orders, callbacks and the expiry sweep
//! - [`RegistrationEngine`]: application, verification and approval
//!
//! Components are built explicitly and share a store, a clock and the
//! payment provider registry; [`Engines`] wires a full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod download;
pub mod gateway;
pub mod ledger;
pub mod orders;
pub mod pricing;
pub mod redeem;
pub mod registration;

use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use download::{DownloadCheck, DownloadGate, DownloadReceipt};
pub use gateway::{
    Acknowledgement, CheckoutPayload, GatewayError, PaymentGateways, PaymentProvider,
    RefundOutcome, VerifiedCallback,
};
pub use ledger::{Ledger, MAX_CAS_ATTEMPTS};
pub use orders::{CallbackOutcome, OrderConfig, OrderEngine};
pub use pricing::{PricingResolver, RuleInput};
pub use redeem::{GenerateCodes, RedeemEngine, MAX_CODES_PER_BATCH, MAX_DESCRIPTION_CHARS};
pub use registration::{PurgeReport, RegistrationEngine};

use xcredits_store::Store;

/// A full set of engines over one store.
#[derive(Debug, Clone)]
pub struct Engines {
    /// Balance mutation and history.
    pub ledger: Ledger,
    /// Path pricing.
    pub pricing: PricingResolver,
    /// Download checks and charges.
    pub downloads: DownloadGate,
    /// Redeem codes.
    pub redeem: RedeemEngine,
    /// Payment orders.
    pub orders: OrderEngine,
    /// Registrations and verification codes.
    pub registrations: RegistrationEngine,
}

impl Engines {
    /// Wire every engine to `store`, `gateways` and `clock`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateways: PaymentGateways,
        clock: Arc<dyn Clock>,
        order_config: OrderConfig,
    ) -> Self {
        let ledger = Ledger::new(Arc::clone(&store));
        let pricing = PricingResolver::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            downloads: DownloadGate::new(pricing.clone(), ledger.clone()),
            redeem: RedeemEngine::new(Arc::clone(&store), ledger.clone(), Arc::clone(&clock)),
            orders: OrderEngine::new(
                Arc::clone(&store),
                ledger.clone(),
                Arc::new(gateways),
                Arc::clone(&clock),
                order_config,
            ),
            registrations: RegistrationEngine::new(store, ledger.clone(), clock),
            pricing,
            ledger,
        }
    }
}
