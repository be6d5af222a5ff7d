//! Account service: the operations consumed by the HTTP boundary and the
//! monitor loop.
//!
//! All writes go through the store's compare-and-update, so a lost race on
//! the reconcile path is silently absorbed -- another tick or actor already
//! progressed the account. Only the `Active/Warned -> Settling` winner
//! invokes the settlement orchestrator, which is what keeps settlement
//! exactly-once under overlapping ticks and multiple processes.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::account::{Account, LifecycleState, PayoutDestination, Recipient, RecipientId};
use crate::adapters::PayoutAdapter;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::evaluator::{evaluate, InactivitySignal};
use crate::settlement::{SettlementOrchestrator, SettlementReport};
use crate::store::{AccountStore, StoreError};

/// Payload for account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountRequest {
    /// Custodian identity, case-insensitively unique.
    pub owner_key: String,
    /// Inactivity threshold in whole days.
    pub inactivity_threshold_days: u32,
    /// Optional secondary contact.
    #[serde(default)]
    pub backup_contact: Option<String>,
    /// Beneficiaries; shares must sum to 100.
    pub recipients: Vec<NewRecipient>,
}

/// One beneficiary in a creation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipient {
    /// Display name.
    pub name: String,
    /// Contact address.
    pub contact: String,
    /// Fixed share, 1-100.
    pub share_percent: u8,
}

/// How many times a ping retries a lost compare-and-update race before
/// giving up.
const PING_RETRIES: usize = 3;

/// Core operations over the account population.
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    orchestrator: Arc<SettlementOrchestrator>,
    payout: Arc<dyn PayoutAdapter>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    /// Wires the service to its collaborators.
    pub fn new(
        store: Arc<dyn AccountStore>,
        orchestrator: Arc<SettlementOrchestrator>,
        payout: Arc<dyn PayoutAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            payout,
            clock,
        }
    }

    /// Creates an account, or replaces the configuration of an existing
    /// one for the same owner key (threshold, recipients, backup contact)
    /// while preserving its identity and creation time. An account whose
    /// settlement has been triggered cannot be re-created.
    ///
    /// # Errors
    ///
    /// [`CoreError::Validation`] for malformed input (rejected before any
    /// state is written) or an already-triggered account.
    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<Account, CoreError> {
        let now = self.clock.now();
        let recipients: Vec<Recipient> = request
            .recipients
            .into_iter()
            .map(|r| Recipient::new(r.name, r.contact, r.share_percent))
            .collect();
        // Validate everything up front, even on the replace path.
        let fresh = Account::new(
            request.owner_key,
            request.inactivity_threshold_days,
            recipients,
            request.backup_contact,
            now,
        )?;

        match self.store.get_by_owner(&fresh.owner_key).await? {
            Some(mut existing) => {
                if existing.lifecycle_state.is_triggered() {
                    return Err(CoreError::validation(
                        "owner_key",
                        format!(
                            "account {} is {} and cannot be replaced",
                            existing.id,
                            existing.lifecycle_state.as_str()
                        ),
                    ));
                }
                existing.inactivity_threshold_days = fresh.inactivity_threshold_days;
                existing.recipients = fresh.recipients;
                existing.backup_contact = fresh.backup_contact;
                existing.last_activity_at = Some(now);
                existing.lifecycle_state = LifecycleState::Active;
                let updated = self.store.compare_and_update(existing).await?;
                info!(account_id = %updated.id, owner_key = %updated.owner_key, "account replaced");
                Ok(updated)
            }
            None => {
                let inserted = self.store.insert(fresh).await?;
                info!(account_id = %inserted.id, owner_key = %inserted.owner_key, "account created");
                Ok(inserted)
            }
        }
    }

    /// Records an activity signal (ping) for the owner: advances
    /// `last_activity_at` and resets `Warned` back to `Active`.
    ///
    /// Activity on an already-triggered account is a no-op by design --
    /// funds are already in flight -- and returns the account unchanged.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown owner key, or the store
    /// error if every retry loses its compare-and-update race.
    pub async fn record_activity(&self, owner_key: &str) -> Result<Account, CoreError> {
        let mut last_conflict = None;
        for _ in 0..PING_RETRIES {
            let Some(mut account) = self.store.get_by_owner(owner_key).await? else {
                return Err(CoreError::not_found("account", owner_key));
            };
            if account.lifecycle_state.is_triggered() {
                debug!(
                    account_id = %account.id,
                    state = account.lifecycle_state.as_str(),
                    "ignoring activity signal on triggered account"
                );
                return Ok(account);
            }
            account.last_activity_at = Some(self.clock.now());
            if account.lifecycle_state == LifecycleState::Warned {
                account.lifecycle_state = LifecycleState::Active;
            }
            match self.store.compare_and_update(account).await {
                Ok(updated) => {
                    debug!(account_id = %updated.id, "activity recorded");
                    return Ok(updated);
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    last_conflict = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_conflict
            .map(CoreError::from)
            .unwrap_or_else(|| CoreError::not_found("account", owner_key)))
    }

    /// Fetches an account by owner key, running an on-demand evaluator
    /// pass first so the caller sees current state rather than the state
    /// as of the last tick.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown owner key.
    pub async fn get_account(&self, owner_key: &str) -> Result<Account, CoreError> {
        let Some(account) = self.store.get_by_owner(owner_key).await? else {
            return Err(CoreError::not_found("account", owner_key));
        };
        let id = account.id;
        if let Err(e) = self.check_account(account).await {
            warn!(account_id = %id, error = %e, "on-demand account check failed");
        }
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("account", owner_key))
    }

    /// Attaches payout destination details to a recipient and registers
    /// them with the payout provider.
    ///
    /// Rejected once settlement has been triggered: a write landing
    /// mid-settlement would steal the account's version and strand the
    /// orchestrator on a conflict it cannot distinguish from a competing
    /// run.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] for an unknown owner or recipient,
    /// [`CoreError::Validation`] for a triggered account,
    /// [`CoreError::Adapter`] if the provider rejects the registration.
    pub async fn update_recipient_destination(
        &self,
        owner_key: &str,
        recipient_id: RecipientId,
        destination: PayoutDestination,
    ) -> Result<Account, CoreError> {
        let Some(mut account) = self.store.get_by_owner(owner_key).await? else {
            return Err(CoreError::not_found("account", owner_key));
        };
        if account.lifecycle_state.is_triggered() {
            return Err(CoreError::validation(
                "owner_key",
                format!(
                    "account {} is {} and no longer accepts destination updates",
                    account.id,
                    account.lifecycle_state.as_str()
                ),
            ));
        }
        let Some(idx) = account.recipients.iter().position(|r| r.id == recipient_id) else {
            return Err(CoreError::not_found("recipient", recipient_id.to_string()));
        };

        let destination_ref = self
            .payout
            .register_destination(
                &account.recipients[idx].name,
                &account.recipients[idx].contact,
                &destination,
            )
            .await?;
        account.recipients[idx].destination = Some(destination);
        account.recipients[idx].destination_ref = Some(destination_ref);
        let updated = self.store.compare_and_update(account).await?;
        info!(
            account_id = %updated.id,
            recipient_id = %recipient_id,
            "recipient payout destination registered"
        );
        Ok(updated)
    }

    /// Reconciles one account's persisted state with the evaluator signal,
    /// and kicks off settlement if this call wins the `Active/Warned ->
    /// Settling` transition. Accounts already `Settling` or `Settled` are
    /// skipped unconditionally -- that is what prevents double-settlement
    /// across overlapping ticks.
    ///
    /// A lost compare-and-update race is absorbed silently: another tick
    /// or actor already advanced the account.
    ///
    /// Returns the settlement report if this call triggered (and ran)
    /// settlement.
    ///
    /// # Errors
    ///
    /// Store or adapter failures other than version conflicts.
    pub async fn check_account(
        &self,
        mut account: Account,
    ) -> Result<Option<SettlementReport>, CoreError> {
        if account.lifecycle_state.is_triggered() {
            return Ok(None);
        }

        let signal = evaluate(
            self.clock.now(),
            account.last_activity_at,
            account.inactivity_threshold_days,
        );
        let target = match signal {
            InactivitySignal::Active => LifecycleState::Active,
            InactivitySignal::Warned => LifecycleState::Warned,
            InactivitySignal::Inactive => LifecycleState::Settling,
        };
        if target == account.lifecycle_state {
            return Ok(None);
        }

        let previous = account.lifecycle_state;
        account.lifecycle_state = target;
        let account = match self.store.compare_and_update(account).await {
            Ok(updated) => updated,
            Err(StoreError::Conflict { id, .. }) => {
                debug!(account_id = %id, "lost reconcile race, skipping");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            account_id = %account.id,
            from = previous.as_str(),
            to = target.as_str(),
            "account state updated"
        );

        if target != LifecycleState::Settling {
            return Ok(None);
        }

        // This call won the settling gate; it alone proceeds into the
        // settlement workflow.
        match self.orchestrator.settle(account.id).await {
            Ok(report) => Ok(Some(report)),
            Err(e) if e.is_conflict() => {
                debug!(account_id = %account.id, "settlement progressed by another actor");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resumes settlement for accounts left `Settling` by an interrupted
    /// process. Run once at startup, before the monitor loop begins; the
    /// orchestrator's persisted sweep record and per-recipient states make
    /// the resume idempotent.
    ///
    /// Returns how many accounts were resumed. Individual failures are
    /// logged and never abort the pass.
    ///
    /// # Errors
    ///
    /// Only if the account listing itself fails.
    pub async fn resume_pending_settlements(&self) -> Result<usize, CoreError> {
        let mut resumed = 0;
        for account in self.store.list().await? {
            if account.lifecycle_state != LifecycleState::Settling {
                continue;
            }
            info!(account_id = %account.id, "resuming interrupted settlement");
            match self.orchestrator.settle(account.id).await {
                Ok(_) => resumed += 1,
                Err(e) => {
                    warn!(account_id = %account.id, error = %e, "settlement resume failed");
                }
            }
        }
        Ok(resumed)
    }

    /// The store this service operates on.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use futures::future::join_all;

    use super::*;
    use crate::account::PayoutState;
    use crate::adapters::{
        AdapterError, NotifyAdapter, PayoutAck, PayoutReceipt, SweepAdapter, SweepReceipt,
    };
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct CountingSweep {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SweepAdapter for CountingSweep {
        async fn sweep(&self, _owner_key: &str) -> Result<SweepReceipt, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SweepReceipt {
                tx_ref: "tx-1".to_string(),
                amount_minor: 1_000,
            })
        }
    }

    #[derive(Default)]
    struct CountingPayout {
        calls: AtomicUsize,
        registered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PayoutAdapter for CountingPayout {
        async fn create_payout(
            &self,
            idempotency_key: &str,
            _destination_ref: &str,
            _amount_minor: u64,
            _currency: &str,
        ) -> Result<PayoutReceipt, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PayoutReceipt {
                payout_ref: format!("pay-{idempotency_key}"),
                status: PayoutAck::Paid,
            })
        }

        async fn register_destination(
            &self,
            _name: &str,
            contact: &str,
            _destination: &PayoutDestination,
        ) -> Result<String, AdapterError> {
            let destination_ref = format!("dest-{contact}");
            self.registered.lock().unwrap().push(destination_ref.clone());
            Ok(destination_ref)
        }
    }

    #[derive(Default)]
    struct SilentNotify;

    #[async_trait]
    impl NotifyAdapter for SilentNotify {
        async fn send(
            &self,
            _destination: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    struct Harness {
        service: Arc<AccountService>,
        store: Arc<MemoryStore>,
        sweep: Arc<CountingSweep>,
        payout: Arc<CountingPayout>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sweep = Arc::new(CountingSweep::default());
        let payout = Arc::new(CountingPayout::default());
        let notify = Arc::new(SilentNotify);
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            store.clone(),
            sweep.clone(),
            payout.clone(),
            notify,
            "INR",
        ));
        let service = Arc::new(AccountService::new(
            store.clone(),
            orchestrator,
            payout.clone(),
            clock.clone(),
        ));
        Harness {
            service,
            store,
            sweep,
            payout,
            clock,
        }
    }

    fn request(owner: &str) -> CreateAccountRequest {
        CreateAccountRequest {
            owner_key: owner.to_string(),
            inactivity_threshold_days: 30,
            backup_contact: None,
            recipients: vec![
                NewRecipient {
                    name: "A".to_string(),
                    contact: "a@example.com".to_string(),
                    share_percent: 60,
                },
                NewRecipient {
                    name: "B".to_string(),
                    contact: "b@example.com".to_string(),
                    share_percent: 40,
                },
            ],
        }
    }

    #[tokio::test]
    async fn create_rejects_bad_shares_before_writing() {
        let h = harness();
        let mut bad = request("owner-wallet-1");
        bad.recipients[1].share_percent = 50;
        let err = h.service.create_account(bad).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(h.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_replaces_configuration_but_preserves_identity() {
        let h = harness();
        let first = h.service.create_account(request("owner-wallet-1")).await.unwrap();

        let mut replace = request("OWNER-WALLET-1");
        replace.inactivity_threshold_days = 60;
        let second = h.service.create_account(replace).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.inactivity_threshold_days, 60);
        assert_ne!(second.recipients[0].id, first.recipients[0].id);
        assert_eq!(h.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_refuses_to_replace_a_triggered_account() {
        let h = harness();
        let account = h.service.create_account(request("owner-wallet-1")).await.unwrap();
        let mut stored = h.store.get(account.id).await.unwrap().unwrap();
        stored.lifecycle_state = LifecycleState::Settling;
        h.store.compare_and_update(stored).await.unwrap();

        let err = h
            .service
            .create_account(request("owner-wallet-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn ping_resets_warned_to_active_and_advances_activity() {
        let h = harness();
        let account = h.service.create_account(request("owner-wallet-1")).await.unwrap();
        let before = account.last_activity_at.unwrap();

        // Let the account drift into the warning window.
        h.clock.advance(Duration::days(22));
        h.service.check_account(account).await.unwrap();
        let warned = h.store.get_by_owner("owner-wallet-1").await.unwrap().unwrap();
        assert_eq!(warned.lifecycle_state, LifecycleState::Warned);

        let pinged = h.service.record_activity("owner-wallet-1").await.unwrap();
        assert_eq!(pinged.lifecycle_state, LifecycleState::Active);
        assert!(pinged.last_activity_at.unwrap() > before);
    }

    #[tokio::test]
    async fn ping_is_a_no_op_on_triggered_accounts() {
        let h = harness();
        let account = h.service.create_account(request("owner-wallet-1")).await.unwrap();
        let mut stored = h.store.get(account.id).await.unwrap().unwrap();
        stored.lifecycle_state = LifecycleState::Settling;
        let stored = h.store.compare_and_update(stored).await.unwrap();

        let after = h.service.record_activity("owner-wallet-1").await.unwrap();
        assert_eq!(after.lifecycle_state, LifecycleState::Settling);
        assert_eq!(after.last_activity_at, stored.last_activity_at);
        assert_eq!(after.version, stored.version);
    }

    #[tokio::test]
    async fn ping_unknown_owner_is_not_found() {
        let h = harness();
        let err = h.service.record_activity("nobody").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn threshold_crossing_settles_exactly_once_under_contention() {
        let h = harness();
        let account = h.service.create_account(request("owner-wallet-1")).await.unwrap();
        h.clock.advance(Duration::days(30));

        // Many actors race the same snapshot; one wins the settling gate.
        let checks = (0..8).map(|_| {
            let service = h.service.clone();
            let snapshot = account.clone();
            async move { service.check_account(snapshot).await }
        });
        let results: Vec<_> = join_all(checks).await;

        let reports: Vec<_> = results
            .into_iter()
            .map(Result::unwrap)
            .flatten()
            .collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(h.sweep.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.payout.calls.load(Ordering::SeqCst), 2);

        let settled = h.store.get(account.id).await.unwrap().unwrap();
        assert_eq!(settled.lifecycle_state, LifecycleState::Settled);
    }

    #[tokio::test]
    async fn get_account_runs_an_on_demand_check() {
        let h = harness();
        h.service.create_account(request("owner-wallet-1")).await.unwrap();
        h.clock.advance(Duration::days(25));

        let fetched = h.service.get_account("owner-wallet-1").await.unwrap();
        assert_eq!(fetched.lifecycle_state, LifecycleState::Warned);
    }

    #[tokio::test]
    async fn destination_update_registers_with_the_provider() {
        let h = harness();
        let account = h.service.create_account(request("owner-wallet-1")).await.unwrap();
        let recipient_id = account.recipients[0].id;

        let updated = h
            .service
            .update_recipient_destination(
                "owner-wallet-1",
                recipient_id,
                PayoutDestination {
                    bank_code: "TEST0001234".to_string(),
                    account_number: "000111222333".to_string(),
                },
            )
            .await
            .unwrap();

        let recipient = updated.recipient(recipient_id).unwrap();
        assert_eq!(
            recipient.destination_ref.as_deref(),
            Some("dest-a@example.com")
        );
        assert_eq!(
            h.payout.registered.lock().unwrap().as_slice(),
            &["dest-a@example.com".to_string()]
        );

        let err = h
            .service
            .update_recipient_destination(
                "owner-wallet-1",
                uuid::Uuid::new_v4(),
                PayoutDestination {
                    bank_code: "TEST0001234".to_string(),
                    account_number: "000111222333".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    /// Payout adapter that tries to update its recipient's destination
    /// through the service while the transfer is being created.
    #[derive(Default)]
    struct MeddlingPayout {
        service: Mutex<Option<Arc<AccountService>>>,
        rejected_updates: AtomicUsize,
    }

    #[async_trait]
    impl PayoutAdapter for MeddlingPayout {
        async fn create_payout(
            &self,
            idempotency_key: &str,
            _destination_ref: &str,
            _amount_minor: u64,
            _currency: &str,
        ) -> Result<PayoutReceipt, AdapterError> {
            let service = self.service.lock().unwrap().clone().unwrap();
            let recipient_id = idempotency_key
                .split(':')
                .nth(1)
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .unwrap();
            let result = service
                .update_recipient_destination(
                    "owner-wallet-1",
                    recipient_id,
                    PayoutDestination {
                        bank_code: "TEST0001234".to_string(),
                        account_number: "000111222333".to_string(),
                    },
                )
                .await;
            if matches!(result, Err(CoreError::Validation { .. })) {
                self.rejected_updates.fetch_add(1, Ordering::SeqCst);
            }
            Ok(PayoutReceipt {
                payout_ref: format!("pay-{idempotency_key}"),
                status: PayoutAck::Paid,
            })
        }

        async fn register_destination(
            &self,
            _name: &str,
            _contact: &str,
            _destination: &PayoutDestination,
        ) -> Result<String, AdapterError> {
            Ok("dest".to_string())
        }
    }

    #[tokio::test]
    async fn destination_update_cannot_stall_a_running_settlement() {
        let store = Arc::new(MemoryStore::new());
        let sweep = Arc::new(CountingSweep::default());
        let payout = Arc::new(MeddlingPayout::default());
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            store.clone(),
            sweep,
            payout.clone(),
            Arc::new(SilentNotify),
            "INR",
        ));
        let service = Arc::new(AccountService::new(
            store.clone(),
            orchestrator,
            payout.clone(),
            clock.clone(),
        ));
        *payout.service.lock().unwrap() = Some(service.clone());

        let account = service.create_account(request("owner-wallet-1")).await.unwrap();
        clock.advance(Duration::days(30));

        // The mid-run updates are rejected instead of stealing the
        // account's version, so the workflow runs to completion.
        let report = service.check_account(account.clone()).await.unwrap();
        assert!(report.is_some());
        assert_eq!(payout.rejected_updates.load(Ordering::SeqCst), 2);

        let settled = store.get(account.id).await.unwrap().unwrap();
        assert_eq!(settled.lifecycle_state, LifecycleState::Settled);
        assert!(settled
            .recipients
            .iter()
            .all(|r| r.payout_state == PayoutState::Paid));

        // The settled account keeps rejecting updates.
        let err = service
            .update_recipient_destination(
                "owner-wallet-1",
                settled.recipients[0].id,
                PayoutDestination {
                    bank_code: "TEST0001234".to_string(),
                    account_number: "000111222333".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn startup_resume_completes_interrupted_settlements() {
        let h = harness();
        let account = h.service.create_account(request("owner-wallet-1")).await.unwrap();
        let mut stored = h.store.get(account.id).await.unwrap().unwrap();
        stored.lifecycle_state = LifecycleState::Settling;
        h.store.compare_and_update(stored).await.unwrap();

        let resumed = h.service.resume_pending_settlements().await.unwrap();
        assert_eq!(resumed, 1);

        let settled = h.store.get(account.id).await.unwrap().unwrap();
        assert_eq!(settled.lifecycle_state, LifecycleState::Settled);
        assert!(settled
            .recipients
            .iter()
            .all(|r| r.payout_state == PayoutState::Paid));
    }
}
