//! CSV import of event attendance into `event_registrations`.

mod parser;

pub use parser::AttendanceRecord;

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::activity::EventRegistration;
use crate::store::{collections, natural_key, DocumentStore, StoreError};
use crate::sync::{upsert_system_record, SyncOutcome, SyncRecord};
use parser::ParseError;

#[derive(Debug)]
pub enum AttendanceImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, reason: String },
    Store(StoreError),
}

impl std::fmt::Display for AttendanceImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceImportError::Io(err) => write!(f, "failed to read attendance export: {}", err),
            AttendanceImportError::Csv(err) => write!(f, "invalid attendance CSV data: {}", err),
            AttendanceImportError::InvalidRow { line, reason } => {
                write!(f, "attendance row {} rejected: {}", line, reason)
            }
            AttendanceImportError::Store(err) => {
                write!(f, "could not store attendance: {}", err)
            }
        }
    }
}

impl std::error::Error for AttendanceImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttendanceImportError::Io(err) => Some(err),
            AttendanceImportError::Csv(err) => Some(err),
            AttendanceImportError::InvalidRow { .. } => None,
            AttendanceImportError::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for AttendanceImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for AttendanceImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<StoreError> for AttendanceImportError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<ParseError> for AttendanceImportError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Csv(err) => Self::Csv(err),
            ParseError::Row { line, reason } => Self::InvalidRow { line, reason },
        }
    }
}

impl SyncRecord for EventRegistration {
    fn is_system(&self) -> bool {
        true
    }

    fn same_values(&self, other: &Self) -> bool {
        self.attended == other.attended && self.checked_in_at == other.checked_in_at
    }
}

/// Counts from one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Parsed attendance export, ready to apply to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceImporter {
    records: Vec<AttendanceRecord>,
}

impl AttendanceImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AttendanceImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AttendanceImportError> {
        let records = parser::parse_records(reader)?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Write registrations keyed `{event}__{member}`; unchanged rows cause no write.
    pub async fn apply<S>(&self, store: &S) -> Result<ImportSummary, AttendanceImportError>
    where
        S: DocumentStore + ?Sized,
    {
        let mut summary = ImportSummary {
            rows: self.records.len(),
            ..ImportSummary::default()
        };

        for record in &self.records {
            let id = natural_key(&[record.event_id.as_str(), record.member_id.as_str()]);
            let registration = EventRegistration {
                id: id.clone(),
                event_id: record.event_id.clone(),
                member_id: record.member_id.clone(),
                attended: record.attended,
                checked_in_at: record.checked_in_at,
            };
            match upsert_system_record(store, collections::REGISTRATIONS, &id, &registration).await? {
                SyncOutcome::Created => summary.created += 1,
                SyncOutcome::Updated => summary.updated += 1,
                SyncOutcome::Unchanged | SyncOutcome::SkippedManual => summary.unchanged += 1,
            }
        }

        info!(
            rows = summary.rows,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "attendance import applied"
        );
        Ok(summary)
    }
}
