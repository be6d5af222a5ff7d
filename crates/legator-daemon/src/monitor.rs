//! Periodic inactivity monitor.
//!
//! One pass lists the whole account population and reconciles each account
//! through the service; the service's conditional writes make overlapping
//! passes (or a second daemon process) safe, so the loop itself carries no
//! locking. Per-account failures are logged and never abort a pass.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use legator_core::AccountService;

/// Drives evaluator passes on a fixed interval.
pub struct MonitorLoop {
    service: Arc<AccountService>,
    interval: Duration,
}

impl MonitorLoop {
    /// Creates a monitor over `service` ticking every `interval`.
    #[must_use]
    pub fn new(service: Arc<AccountService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Runs until `shutdown` flips to `true`.
    ///
    /// Resumes any settlements interrupted by a previous process before the
    /// first tick, then reconciles the population every interval. The first
    /// tick fires immediately rather than one interval in.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.service.resume_pending_settlements().await {
            Ok(0) => {}
            Ok(resumed) => info!(resumed, "resumed interrupted settlements"),
            Err(e) => error!(error = %e, "settlement resume pass failed"),
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("monitor loop stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Runs one monitor pass and returns how many settlements it triggered.
    pub async fn tick(&self) -> usize {
        let accounts = match self.service.store().list().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "monitor pass could not list accounts");
                return 0;
            }
        };
        let total = accounts.len();

        let checks = accounts.into_iter().map(|account| {
            let service = self.service.clone();
            async move {
                let id = account.id;
                match service.check_account(account).await {
                    Ok(report) => report.is_some(),
                    Err(e) => {
                        warn!(account_id = %id, error = %e, "account check failed");
                        false
                    }
                }
            }
        });
        let settled = join_all(checks).await.into_iter().filter(|s| *s).count();

        debug!(accounts = total, settled, "monitor pass complete");
        settled
    }
}
