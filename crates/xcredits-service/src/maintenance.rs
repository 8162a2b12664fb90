//! Background expiry sweeper.

use std::time::Duration;

use tokio::task::JoinHandle;
use xcredits_engine::Engines;

/// Run one maintenance pass: expire overdue orders and purge stale
/// registrations and codes. Failures are logged, never propagated.
pub fn run_once(engines: &Engines) {
    match engines.orders.sweep_expired() {
        Ok(0) => {}
        Ok(count) => tracing::debug!(count, "Maintenance expired orders"),
        Err(e) => tracing::warn!(error = %e, "Order expiry sweep failed"),
    }
    match engines.registrations.purge_expired() {
        Ok(report) => {
            if report.registrations > 0 || report.verification_codes > 0 {
                tracing::debug!(
                    registrations = report.registrations,
                    verification_codes = report.verification_codes,
                    "Maintenance purged expired records"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "Registration purge failed"),
    }
}

/// Spawn the periodic maintenance task.
pub fn spawn_maintenance(engines: Engines, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_once(&engines);
        }
    })
}
