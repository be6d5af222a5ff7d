//! Settlement adapter capability traits.
//!
//! The core never talks to a ledger, payout provider, or mail gateway
//! directly; it consumes these narrow capability interfaces so vendors can
//! be substituted and tests can run against deterministic fakes. No
//! transaction spans two adapters: each call carries its own at-least-once
//! delivery risk, mitigated by idempotency keys.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::PayoutDestination;

/// Failure signals shared by all settlement adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// Transient failure; safe to retry on a later reconciliation pass,
    /// never retried in a tight loop within one settlement run.
    #[error("{adapter} unavailable: {reason}")]
    Unavailable {
        /// Which adapter failed.
        adapter: &'static str,
        /// Provider-supplied detail.
        reason: String,
    },

    /// Permanent rejection for this attempt.
    #[error("{adapter} rejected the request: {reason}")]
    Rejected {
        /// Which adapter failed.
        adapter: &'static str,
        /// Provider-supplied detail.
        reason: String,
    },
}

impl AdapterError {
    /// Builds a transient [`AdapterError::Unavailable`].
    pub fn unavailable(adapter: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            adapter,
            reason: reason.into(),
        }
    }

    /// Builds a permanent [`AdapterError::Rejected`].
    pub fn rejected(adapter: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            adapter,
            reason: reason.into(),
        }
    }
}

/// Outcome of a custodian balance sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReceipt {
    /// Opaque ledger transaction reference.
    pub tx_ref: String,
    /// Swept value in the smallest payout-provider currency unit. This is
    /// the total the settlement divides between recipients.
    pub amount_minor: u64,
}

/// Provider-reported status of a created payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutAck {
    /// Accepted and queued by the provider.
    Pending,
    /// Processed by the provider.
    Paid,
    /// Rejected or failed on the provider side.
    Failed,
}

/// Outcome of a payout creation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Opaque provider payout reference; the idempotency proof on retry.
    pub payout_ref: String,
    /// Provider-reported status.
    pub status: PayoutAck,
}

/// Moves the custodian's funds out of the monitored account.
///
/// Modeled as an opaque, idempotent external call; how funds move on the
/// ledger is not this system's concern.
#[async_trait]
pub trait SweepAdapter: Send + Sync {
    /// Sweeps the balance held under `owner_key`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unavailable`] on transient failure or
    /// [`AdapterError::Rejected`] if the ledger refuses the sweep.
    async fn sweep(&self, owner_key: &str) -> Result<SweepReceipt, AdapterError>;
}

/// Creates beneficiary-routed money transfers.
#[async_trait]
pub trait PayoutAdapter: Send + Sync {
    /// Creates a transfer. `idempotency_key` is deterministic per
    /// `(account, recipient)` so a retried call with an already-completed
    /// reference does not create a duplicate transfer.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unavailable`] or [`AdapterError::Rejected`].
    async fn create_payout(
        &self,
        idempotency_key: &str,
        destination_ref: &str,
        amount_minor: u64,
        currency: &str,
    ) -> Result<PayoutReceipt, AdapterError>;

    /// Registers a payout destination with the provider ahead of
    /// settlement, returning the provider-side destination reference.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unavailable`] or [`AdapterError::Rejected`].
    async fn register_destination(
        &self,
        name: &str,
        contact: &str,
        destination: &PayoutDestination,
    ) -> Result<String, AdapterError>;
}

/// Best-effort message delivery to beneficiaries.
///
/// Failures are logged by the caller and never retried synchronously;
/// notification never blocks settlement progress.
#[async_trait]
pub trait NotifyAdapter: Send + Sync {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Unavailable`] or [`AdapterError::Rejected`].
    async fn send(&self, destination: &str, subject: &str, body: &str)
        -> Result<(), AdapterError>;
}
