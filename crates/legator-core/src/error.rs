//! Core error taxonomy.

use thiserror::Error;

use crate::adapters::AdapterError;
use crate::store::StoreError;

/// Errors surfaced by the account service and settlement orchestrator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The referenced account or recipient does not exist. Surfaced to the
    /// caller, never retried.
    #[error("not found: {entity} {key}")]
    NotFound {
        /// What was looked up ("account", "recipient").
        entity: &'static str,
        /// The lookup key that missed.
        key: String,
    },

    /// Malformed input at creation or update time; rejected before any
    /// state is written.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Store-layer failure, including lost compare-and-update races.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Settlement adapter failure.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl CoreError {
    /// Builds a [`CoreError::Validation`].
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Builds a [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Whether this error is a lost compare-and-update race.
    ///
    /// Conflicts mean another actor already progressed the account; callers
    /// on the reconcile path absorb them silently.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}
