//! Core library for the legator inactivity-settlement daemon.
//!
//! Legator watches a population of custodian accounts and, once an account
//! has been inactive past its configured threshold, runs an irreversible
//! multi-recipient settlement: sweep the custodian balance, split it across
//! beneficiaries through a payout provider, and notify each beneficiary.
//!
//! # Architecture
//!
//! ```text
//! monitor tick --> AccountStore::list
//!                     |
//!                     v
//!             evaluator::evaluate (pure)
//!                     |
//!        Active/Warned persisted via compare_and_update
//!                     |
//!        Inactive --> Active/Warned -> Settling (CAS gate, one winner)
//!                     |
//!                     v
//!          SettlementOrchestrator (sweep once, payout per recipient,
//!                                  notify best-effort, then Settled)
//! ```
//!
//! # Key Concepts
//!
//! - **Account**: custodian entity monitored for inactivity, owning an
//!   ordered set of recipients with fixed payout shares.
//! - **Compare-and-update**: the store's only mutation primitive. The
//!   version-keyed conditional write is what makes the `Active/Warned ->
//!   Settling` transition exactly-once under overlapping ticks.
//! - **Idempotent settlement**: every state write lands before the side
//!   effect it guards is assumed durable, so an interrupted settlement
//!   resumes without re-sweeping or duplicating transfers.

pub mod account;
pub mod adapters;
pub mod clock;
pub mod error;
pub mod evaluator;
pub mod service;
pub mod settlement;
pub mod store;

pub use account::{
    Account, AccountId, LifecycleState, PayoutDestination, PayoutState, Recipient, RecipientId,
    SweepRecord,
};
pub use adapters::{
    AdapterError, NotifyAdapter, PayoutAck, PayoutAdapter, PayoutReceipt, SweepAdapter,
    SweepReceipt,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use evaluator::{evaluate, InactivitySignal};
pub use service::{AccountService, CreateAccountRequest, NewRecipient};
pub use settlement::{SettlementOrchestrator, SettlementReport};
pub use store::{AccountStore, FileStore, MemoryStore, StoreError};
