//! Built-in credential-less providers.
//!
//! These stand in for the real custody, payout, and mail integrations so
//! the daemon runs end to end without external credentials. Each one keeps
//! the real provider's observable contract (references returned, statuses
//! reported) while doing all the work locally and loudly.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use legator_core::{
    AdapterError, NotifyAdapter, PayoutAck, PayoutAdapter, PayoutDestination, PayoutReceipt,
    SweepAdapter, SweepReceipt,
};

/// Sweep provider that reports a fixed pool balance for every account.
#[derive(Debug)]
pub struct SimulatedSweep {
    pool_minor: u64,
}

impl SimulatedSweep {
    /// Creates a sweep provider that reports `pool_minor` as every
    /// account's swept balance.
    #[must_use]
    pub fn new(pool_minor: u64) -> Self {
        Self { pool_minor }
    }
}

#[async_trait]
impl SweepAdapter for SimulatedSweep {
    async fn sweep(&self, owner_key: &str) -> Result<SweepReceipt, AdapterError> {
        let tx_ref = format!("sweep-{}", Uuid::new_v4());
        info!(
            owner_key,
            tx_ref, amount_minor = self.pool_minor, "simulated balance sweep"
        );
        Ok(SweepReceipt {
            tx_ref,
            amount_minor: self.pool_minor,
        })
    }
}

/// Payout provider that accepts every transfer and mints local references.
///
/// Repeating an idempotency key returns the reference minted for the first
/// attempt, like a real provider would.
#[derive(Debug, Default)]
pub struct StubPayout {
    issued: Mutex<Vec<(String, String)>>,
}

impl StubPayout {
    /// Creates an empty stub provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutAdapter for StubPayout {
    async fn create_payout(
        &self,
        idempotency_key: &str,
        destination_ref: &str,
        amount_minor: u64,
        currency: &str,
    ) -> Result<PayoutReceipt, AdapterError> {
        let mut issued = self
            .issued
            .lock()
            .map_err(|_| AdapterError::unavailable("payout", "provider state poisoned"))?;
        let payout_ref = match issued.iter().find(|(key, _)| key == idempotency_key) {
            Some((_, existing)) => existing.clone(),
            None => {
                let minted = format!("pout-{}", Uuid::new_v4());
                issued.push((idempotency_key.to_string(), minted.clone()));
                minted
            }
        };
        info!(
            idempotency_key,
            destination_ref, amount_minor, currency, payout_ref, "stub payout accepted"
        );
        Ok(PayoutReceipt {
            payout_ref,
            status: PayoutAck::Paid,
        })
    }

    async fn register_destination(
        &self,
        name: &str,
        contact: &str,
        destination: &PayoutDestination,
    ) -> Result<String, AdapterError> {
        let destination_ref = format!("fa-{}", Uuid::new_v4());
        info!(
            name,
            contact,
            bank_code = %destination.bank_code,
            destination_ref,
            "stub destination registered"
        );
        Ok(destination_ref)
    }
}

/// Notification provider that writes the message to the log instead of
/// sending mail.
#[derive(Debug)]
pub struct LogNotify {
    from: String,
}

impl LogNotify {
    /// Creates a log-backed notifier with the given sender identity.
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl NotifyAdapter for LogNotify {
    async fn send(&self, destination: &str, subject: &str, body: &str) -> Result<(), AdapterError> {
        info!(
            from = %self.from,
            to = destination,
            subject,
            body,
            "notification (log delivery)"
        );
        Ok(())
    }
}
