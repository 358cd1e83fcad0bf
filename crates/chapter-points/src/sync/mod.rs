//! Idempotent persistence of computed outcomes.
//!
//! System-generated records live under natural-key ids. Absent records are
//! created, stale system records are overwritten, and human-entered records are
//! left alone. Award records are write-once: a conflicting create means another
//! run got there first.

pub mod awards;
pub mod records;

pub use awards::{AwardContext, AwardSynchronizer};
pub use records::{upsert_system_record, SyncRecord};

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;
use crate::store::StoreError;

/// What an upsert did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
    SkippedManual,
}

impl SyncOutcome {
    pub fn wrote(self) -> bool {
        matches!(self, SyncOutcome::Created | SyncOutcome::Updated)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
