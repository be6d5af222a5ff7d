//! End-to-end settlement flow through the daemon's own components:
//! service, monitor pass, file store, and built-in providers.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use legator_core::{
    AccountService, AccountStore, Clock, CreateAccountRequest, FileStore, LifecycleState,
    ManualClock, NewRecipient, PayoutState, SettlementOrchestrator,
};
use legator_daemon::monitor::MonitorLoop;
use legator_daemon::providers::{LogNotify, SimulatedSweep, StubPayout};

struct World {
    service: Arc<AccountService>,
    monitor: MonitorLoop,
    clock: Arc<ManualClock>,
    _dir: TempDir,
}

fn world() -> World {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("accounts.json")).unwrap());
    let payout = Arc::new(StubPayout::new());
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        store.clone(),
        Arc::new(SimulatedSweep::new(100_000)),
        payout.clone(),
        Arc::new(LogNotify::new("legator@localhost")),
        "INR",
    ));
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    let service = Arc::new(AccountService::new(
        store,
        orchestrator,
        payout,
        clock.clone(),
    ));
    let monitor = MonitorLoop::new(service.clone(), std::time::Duration::from_secs(900));
    World {
        service,
        monitor,
        clock,
        _dir: dir,
    }
}

fn request(owner: &str) -> CreateAccountRequest {
    CreateAccountRequest {
        owner_key: owner.to_string(),
        inactivity_threshold_days: 30,
        backup_contact: None,
        recipients: vec![
            NewRecipient {
                name: "Asha".to_string(),
                contact: "asha@example.com".to_string(),
                share_percent: 60,
            },
            NewRecipient {
                name: "Bilal".to_string(),
                contact: "bilal@example.com".to_string(),
                share_percent: 40,
            },
        ],
    }
}

#[tokio::test]
async fn inactive_account_is_settled_by_one_monitor_pass() {
    let w = world();
    let account = w.service.create_account(request("owner-wallet-1")).await.unwrap();

    // Fresh accounts are untouched by a pass.
    assert_eq!(w.monitor.tick().await, 0);

    w.clock.advance(Duration::days(30));
    assert_eq!(w.monitor.tick().await, 1);

    let settled = w.service.store().get(account.id).await.unwrap().unwrap();
    assert_eq!(settled.lifecycle_state, LifecycleState::Settled);
    let sweep = settled.sweep.as_ref().unwrap();
    assert_eq!(sweep.amount_minor, 100_000);
    for recipient in &settled.recipients {
        assert_eq!(recipient.payout_state, PayoutState::Paid);
        assert!(recipient.payout_ref.is_some());
    }
    // A later pass leaves the settled account alone.
    assert_eq!(w.monitor.tick().await, 0);
}

#[tokio::test]
async fn warning_window_precedes_settlement_and_ping_resets_it() {
    let w = world();
    let account = w.service.create_account(request("owner-wallet-1")).await.unwrap();

    w.clock.advance(Duration::days(21));
    assert_eq!(w.monitor.tick().await, 0);
    let warned = w.service.store().get(account.id).await.unwrap().unwrap();
    assert_eq!(warned.lifecycle_state, LifecycleState::Warned);

    let pinged = w.service.record_activity("owner-wallet-1").await.unwrap();
    assert_eq!(pinged.lifecycle_state, LifecycleState::Active);
    assert_eq!(pinged.last_activity_at, Some(w.clock.now()));

    // The old threshold date no longer triggers anything.
    w.clock.advance(Duration::days(9));
    assert_eq!(w.monitor.tick().await, 0);
    let active = w.service.store().get(account.id).await.unwrap().unwrap();
    assert_eq!(active.lifecycle_state, LifecycleState::Active);
}

#[tokio::test]
async fn settlement_survives_a_process_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("accounts.json");
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));

    let build = |clock: Arc<ManualClock>| {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let payout = Arc::new(StubPayout::new());
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            store.clone(),
            Arc::new(SimulatedSweep::new(100_000)),
            payout.clone(),
            Arc::new(LogNotify::new("legator@localhost")),
            "INR",
        ));
        Arc::new(AccountService::new(store, orchestrator, payout, clock))
    };

    // First process: create the account, then "crash" mid-settlement by
    // leaving the record in Settling without running the orchestrator.
    let account_id = {
        let service = build(clock.clone());
        let account = service.create_account(request("owner-wallet-1")).await.unwrap();
        let mut stored = service.store().get(account.id).await.unwrap().unwrap();
        stored.lifecycle_state = LifecycleState::Settling;
        service.store().compare_and_update(stored).await.unwrap();
        account.id
    };

    // Second process: the startup resume pass finishes the job.
    let service = build(clock);
    let resumed = service.resume_pending_settlements().await.unwrap();
    assert_eq!(resumed, 1);

    let settled = service.store().get(account_id).await.unwrap().unwrap();
    assert_eq!(settled.lifecycle_state, LifecycleState::Settled);
    assert!(settled
        .recipients
        .iter()
        .all(|r| r.payout_state == PayoutState::Paid));
}
