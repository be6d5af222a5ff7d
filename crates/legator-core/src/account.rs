//! Account and recipient data model.
//!
//! The [`Account`] aggregate is the unit of monitoring and settlement: a
//! custodian identified by an owner key, an inactivity threshold, and an
//! ordered set of [`Recipient`] beneficiaries whose shares are fixed at
//! creation. All lifecycle and payout state lives on the persisted record;
//! the store's version counter is the compare-and-update token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Unique account identifier, assigned at creation, immutable.
pub type AccountId = Uuid;

/// Unique recipient identifier within the whole store (not just one account).
pub type RecipientId = Uuid;

/// Lifecycle progression of an account.
///
/// Monotonic except for the `Warned -> Active` reset on a fresh activity
/// signal. `Settling` and `Settled` are never left once entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Activity recorded recently enough; nothing to do.
    Active,
    /// The warning window before the threshold has been crossed.
    Warned,
    /// Settlement has been triggered and is in progress (terminal-in-progress).
    Settling,
    /// The settlement workflow has completed (terminal). Note this means
    /// "workflow finished", not "every payout succeeded".
    Settled,
}

impl LifecycleState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Warned => "warned",
            Self::Settling => "settling",
            Self::Settled => "settled",
        }
    }

    /// Whether settlement has been triggered for this account.
    ///
    /// Triggered accounts ignore activity signals and are never compared
    /// against the evaluator output again.
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        matches!(self, Self::Settling | Self::Settled)
    }
}

/// Per-recipient payout progression.
///
/// Transitions only happen inside the settlement orchestrator. `Failed` is
/// terminal for the settlement workflow but eligible for a separately
/// invoked reconciliation retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutState {
    /// No payout attempt has been made.
    NotTriggered,
    /// A payout attempt is in flight (persisted before the adapter call).
    Pending,
    /// The payout provider accepted the transfer.
    Paid,
    /// The payout attempt failed; settlement continued without it.
    Failed,
}

impl PayoutState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotTriggered => "not_triggered",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// Whether the settlement workflow considers this state finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }
}

/// Bank-style payout destination details attached to a recipient before
/// settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayoutDestination {
    /// Routing code of the receiving institution.
    pub bank_code: String,
    /// Account number at the receiving institution.
    pub account_number: String,
}

/// A beneficiary entry owned by exactly one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Unique recipient identifier.
    pub id: RecipientId,
    /// Display name used when registering payout destinations.
    pub name: String,
    /// Contact address for notifications (and the payout fallback reference
    /// when no destination has been registered).
    pub contact: String,
    /// Fixed share of the settlement value, 1-100.
    pub share_percent: u8,
    /// Destination details supplied before settlement, if any.
    pub destination: Option<PayoutDestination>,
    /// Provider-side destination reference returned by registration.
    pub destination_ref: Option<String>,
    /// Payout progression, written only by the orchestrator.
    pub payout_state: PayoutState,
    /// Opaque provider reference once a transfer attempt has been made.
    /// Doubles as the proof that an idempotent retry is safe.
    pub payout_ref: Option<String>,
}

impl Recipient {
    /// Builds a fresh recipient in the `NotTriggered` state.
    #[must_use]
    pub fn new(name: impl Into<String>, contact: impl Into<String>, share_percent: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            contact: contact.into(),
            share_percent,
            destination: None,
            destination_ref: None,
            payout_state: PayoutState::NotTriggered,
            payout_ref: None,
        }
    }

    /// The reference handed to the payout provider: the registered
    /// destination if one exists, otherwise the contact address.
    #[must_use]
    pub fn payout_destination_ref(&self) -> &str {
        self.destination_ref.as_deref().unwrap_or(&self.contact)
    }
}

/// Sweep outcome recorded on the account before any payout attempt.
///
/// Persisting the reference and the swept value together is what lets a
/// resumed settlement skip the sweep and divide the same total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepRecord {
    /// Transaction reference returned by the sweep adapter.
    pub tx_ref: String,
    /// Total settlement value in the smallest payout-provider currency unit.
    pub amount_minor: u64,
}

/// The aggregate root: one monitored custodian account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque unique identifier.
    pub id: AccountId,
    /// External custodian identity (e.g. a wallet address).
    /// Case-insensitively unique across accounts.
    pub owner_key: String,
    /// Operator-configured inactivity threshold in whole days.
    pub inactivity_threshold_days: u32,
    /// Advanced only by an explicit activity signal. Absent until the first
    /// signal is recorded.
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Lifecycle progression.
    pub lifecycle_state: LifecycleState,
    /// Ordered beneficiaries; set and shares fixed once the account exists.
    pub recipients: Vec<Recipient>,
    /// Optional secondary contact carried on the record.
    pub backup_contact: Option<String>,
    /// Sweep outcome, recorded once by the orchestrator.
    pub sweep: Option<SweepRecord>,
    /// Maintained by the store.
    pub created_at: DateTime<Utc>,
    /// Maintained by the store.
    pub updated_at: DateTime<Utc>,
    /// Compare-and-update token; the store bumps it on every write.
    pub version: u64,
}

impl Account {
    /// Maximum accepted inactivity threshold.
    pub const MAX_THRESHOLD_DAYS: u32 = 365;

    /// Builds a new account, validating the fields that are fixed for the
    /// account's lifetime. Timestamps and version are stamped by the store
    /// on insert.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the owner key is empty, the
    /// threshold is out of range, the recipient set is empty, any share is
    /// outside 1-100, or the shares do not sum to exactly 100.
    pub fn new(
        owner_key: impl Into<String>,
        inactivity_threshold_days: u32,
        recipients: Vec<Recipient>,
        backup_contact: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let owner_key = owner_key.into();
        if owner_key.trim().is_empty() {
            return Err(CoreError::validation("owner_key", "must not be empty"));
        }
        if inactivity_threshold_days == 0 || inactivity_threshold_days > Self::MAX_THRESHOLD_DAYS {
            return Err(CoreError::validation(
                "inactivity_threshold_days",
                format!("must be 1-{}", Self::MAX_THRESHOLD_DAYS),
            ));
        }
        validate_recipients(&recipients)?;

        Ok(Self {
            id: Uuid::new_v4(),
            owner_key,
            inactivity_threshold_days,
            last_activity_at: Some(now),
            lifecycle_state: LifecycleState::Active,
            recipients,
            backup_contact,
            sweep: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Looks up a recipient by id.
    #[must_use]
    pub fn recipient(&self, id: RecipientId) -> Option<&Recipient> {
        self.recipients.iter().find(|r| r.id == id)
    }

    /// Whether every recipient has reached a terminal payout state.
    #[must_use]
    pub fn all_payouts_terminal(&self) -> bool {
        self.recipients.iter().all(|r| r.payout_state.is_terminal())
    }
}

/// Validates a recipient set: non-empty, shares in 1-100, summing to 100.
///
/// Share percentages are validated here, at creation time, and trusted
/// unchanged during settlement.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] describing the first violation found.
pub fn validate_recipients(recipients: &[Recipient]) -> Result<(), CoreError> {
    if recipients.is_empty() {
        return Err(CoreError::validation(
            "recipients",
            "at least one recipient is required",
        ));
    }
    let mut sum: u32 = 0;
    for recipient in recipients {
        if recipient.name.trim().is_empty() {
            return Err(CoreError::validation("recipients", "name must not be empty"));
        }
        if recipient.contact.trim().is_empty() {
            return Err(CoreError::validation(
                "recipients",
                "contact must not be empty",
            ));
        }
        if recipient.share_percent == 0 || recipient.share_percent > 100 {
            return Err(CoreError::validation(
                "recipients",
                format!(
                    "share for {} must be 1-100, got {}",
                    recipient.contact, recipient.share_percent
                ),
            ));
        }
        sum += u32::from(recipient.share_percent);
    }
    if sum != 100 {
        return Err(CoreError::validation(
            "recipients",
            format!("shares must sum to 100, got {sum}"),
        ));
    }
    Ok(())
}
