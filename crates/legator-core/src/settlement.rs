//! Settlement orchestration.
//!
//! Drives one account from `Settling` to `Settled`: sweep the custodian
//! balance once, disburse per-recipient shares through the payout adapter,
//! notify each beneficiary best-effort, then mark the account settled.
//!
//! # Invariants
//!
//! - Every state write is persisted before the side effect it guards is
//!   assumed durable by the next step. A crash after the sweep but before
//!   any payout does not re-sweep on retry; a crash mid-payout retries
//!   under the same idempotency key.
//! - One recipient's failure never blocks or reverses another's payout.
//! - `Settled` means "the settlement workflow completed", not "all payouts
//!   succeeded"; callers must inspect the per-recipient outcomes.
//! - Re-entrant: a second invocation for a `Settled` account is a no-op,
//!   and an invocation for a still-`Settling` account resumes from the
//!   persisted sweep record and per-recipient states.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::account::{Account, AccountId, LifecycleState, PayoutState, RecipientId, SweepRecord};
use crate::adapters::{NotifyAdapter, PayoutAck, PayoutAdapter, SweepAdapter};
use crate::error::CoreError;
use crate::store::AccountStore;

/// Final state of one recipient after a settlement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientOutcome {
    /// The recipient.
    pub recipient_id: RecipientId,
    /// Contact address, for operator-facing reporting.
    pub contact: String,
    /// Amount disbursed (or attempted) in minor currency units.
    pub amount_minor: u64,
    /// Terminal payout state.
    pub payout_state: PayoutState,
    /// Provider payout reference, if an attempt was made.
    pub payout_ref: Option<String>,
}

/// Outcome of a settlement run. Partial payout failure still reports the
/// account as settled; the per-recipient array carries the detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    /// The settled account.
    pub account_id: AccountId,
    /// Ledger sweep reference.
    pub sweep_tx_ref: Option<String>,
    /// Account lifecycle state after the run.
    pub lifecycle_state: LifecycleState,
    /// Per-recipient outcomes in stored order.
    pub recipients: Vec<RecipientOutcome>,
}

impl SettlementReport {
    fn from_account(account: &Account) -> Self {
        let total = account.sweep.as_ref().map_or(0, |s| s.amount_minor);
        Self {
            account_id: account.id,
            sweep_tx_ref: account.sweep.as_ref().map(|s| s.tx_ref.clone()),
            lifecycle_state: account.lifecycle_state,
            recipients: account
                .recipients
                .iter()
                .map(|r| RecipientOutcome {
                    recipient_id: r.id,
                    contact: r.contact.clone(),
                    amount_minor: share_amount(total, r.share_percent),
                    payout_state: r.payout_state,
                    payout_ref: r.payout_ref.clone(),
                })
                .collect(),
        }
    }
}

/// Computes one recipient's share of the settlement value, rounding down
/// to the smallest currency unit. Residual dust is not redistributed.
fn share_amount(total_minor: u64, share_percent: u8) -> u64 {
    let exact = u128::from(total_minor) * u128::from(share_percent) / 100;
    u64::try_from(exact).unwrap_or(u64::MAX)
}

/// Executes the settlement workflow for accounts that have crossed their
/// inactivity threshold.
pub struct SettlementOrchestrator {
    store: Arc<dyn AccountStore>,
    sweep: Arc<dyn SweepAdapter>,
    payout: Arc<dyn PayoutAdapter>,
    notify: Arc<dyn NotifyAdapter>,
    currency: String,
}

impl SettlementOrchestrator {
    /// Wires the orchestrator to its collaborators. `currency` is the
    /// payout-provider currency code used for every transfer.
    pub fn new(
        store: Arc<dyn AccountStore>,
        sweep: Arc<dyn SweepAdapter>,
        payout: Arc<dyn PayoutAdapter>,
        notify: Arc<dyn NotifyAdapter>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sweep,
            payout,
            notify,
            currency: currency.into(),
        }
    }

    /// Runs (or resumes) settlement for `account_id`.
    ///
    /// The account must already be `Settling` -- callers win that
    /// transition through the store's compare-and-update gate before
    /// invoking this. A `Settled` account is a no-op.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] for an unknown account.
    /// - [`CoreError::Validation`] if the account was never marked
    ///   `Settling`.
    /// - [`CoreError::Adapter`] if the sweep itself fails; no payout has
    ///   been attempted and the run can be retried.
    /// - [`CoreError::Store`] if persisting progress fails; a version
    ///   conflict means another actor holds the account and this run must
    ///   stand down.
    pub async fn settle(&self, account_id: AccountId) -> Result<SettlementReport, CoreError> {
        let mut account = self
            .store
            .get(account_id)
            .await?
            .ok_or_else(|| CoreError::not_found("account", account_id.to_string()))?;

        match account.lifecycle_state {
            LifecycleState::Settled => {
                return Ok(SettlementReport::from_account(&account));
            }
            LifecycleState::Settling => {}
            LifecycleState::Active | LifecycleState::Warned => {
                return Err(CoreError::validation(
                    "lifecycle_state",
                    format!("account {account_id} is not marked settling"),
                ));
            }
        }

        // Step 1: sweep once. The reference and swept value are persisted
        // together before any payout attempt.
        if account.sweep.is_none() {
            let receipt = self.sweep.sweep(&account.owner_key).await?;
            info!(
                account_id = %account.id,
                tx_ref = %receipt.tx_ref,
                amount_minor = receipt.amount_minor,
                "custodian balance swept"
            );
            account.sweep = Some(SweepRecord {
                tx_ref: receipt.tx_ref,
                amount_minor: receipt.amount_minor,
            });
            account = self.store.compare_and_update(account).await?;
        }
        let total_minor = account.sweep.as_ref().map_or(0, |s| s.amount_minor);

        // Step 2: disburse to every recipient not already paid, in stored
        // order. A `Pending` recipient left behind by an interrupted run is
        // retried here; the idempotency key makes the repeat call safe.
        for idx in 0..account.recipients.len() {
            let (recipient_id, state, contact, destination_ref, share) = {
                let r = &account.recipients[idx];
                (
                    r.id,
                    r.payout_state,
                    r.contact.clone(),
                    r.payout_destination_ref().to_string(),
                    r.share_percent,
                )
            };
            if state == PayoutState::Paid {
                continue;
            }

            let amount_minor = share_amount(total_minor, share);
            if amount_minor == 0 {
                // Nothing to transfer; no adapter call is made.
                warn!(
                    account_id = %account.id,
                    recipient_id = %recipient_id,
                    "zero payout amount, marking recipient failed"
                );
                account.recipients[idx].payout_state = PayoutState::Failed;
                account = self.store.compare_and_update(account).await?;
                continue;
            }

            if state != PayoutState::Pending {
                account.recipients[idx].payout_state = PayoutState::Pending;
                account = self.store.compare_and_update(account).await?;
            }

            let idempotency_key = format!("{}:{}", account.id, recipient_id);
            match self
                .payout
                .create_payout(&idempotency_key, &destination_ref, amount_minor, &self.currency)
                .await
            {
                Ok(receipt) => {
                    let state = match receipt.status {
                        // Provider-acknowledged transfers (queued or
                        // processed) count as paid; webhook reconciliation
                        // of queued transfers is out of scope here.
                        PayoutAck::Pending | PayoutAck::Paid => PayoutState::Paid,
                        PayoutAck::Failed => PayoutState::Failed,
                    };
                    info!(
                        account_id = %account.id,
                        recipient_id = %recipient_id,
                        payout_ref = %receipt.payout_ref,
                        amount_minor,
                        state = state.as_str(),
                        "payout attempt completed"
                    );
                    account.recipients[idx].payout_state = state;
                    account.recipients[idx].payout_ref = Some(receipt.payout_ref);
                }
                Err(e) => {
                    warn!(
                        account_id = %account.id,
                        recipient_id = %recipient_id,
                        error = %e,
                        "payout attempt failed, continuing with remaining recipients"
                    );
                    account.recipients[idx].payout_state = PayoutState::Failed;
                }
            }
            account = self.store.compare_and_update(account).await?;

            // Best-effort notification regardless of payout outcome; a
            // delivery failure is logged and never retried synchronously.
            let payout_ref = account.recipients[idx].payout_ref.clone();
            let (subject, body) =
                notification(account.recipients[idx].payout_state, payout_ref.as_deref());
            if let Err(e) = self.notify.send(&contact, subject, &body).await {
                warn!(
                    account_id = %account.id,
                    recipient_id = %recipient_id,
                    error = %e,
                    "beneficiary notification failed"
                );
            }
        }

        // Step 3: every recipient is terminal; the workflow is complete.
        account.lifecycle_state = LifecycleState::Settled;
        let account = self.store.compare_and_update(account).await?;
        info!(account_id = %account.id, "settlement workflow completed");

        Ok(SettlementReport::from_account(&account))
    }
}

fn notification(state: PayoutState, payout_ref: Option<&str>) -> (&'static str, String) {
    match (state, payout_ref) {
        (PayoutState::Paid, Some(payout_ref)) => (
            "Settlement payout initiated",
            format!(
                "A settlement payout has been initiated for you. Provider reference: {payout_ref}."
            ),
        ),
        _ => (
            "Settlement payout needs review",
            "A settlement was triggered for an account naming you as a beneficiary. \
             Your payout could not be completed automatically; it will be reviewed."
                .to_string(),
        ),
    }
}
