use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::SyncOutcome;
use crate::store::{encode, DocumentStore, StoreError};

/// A record that recalculation may own.
pub trait SyncRecord: Serialize + DeserializeOwned {
    /// `false` for human-entered records, which recalculation never touches.
    fn is_system(&self) -> bool;

    /// Whether two records carry the same computed values.
    fn same_values(&self, other: &Self) -> bool;
}

/// Create, refresh, or leave alone the record stored under `id`.
///
/// Writes happen only when the stored values differ, so repeated runs over
/// unchanged data are write-free.
pub async fn upsert_system_record<S, T>(
    store: &S,
    collection: &str,
    id: &str,
    desired: &T,
) -> Result<SyncOutcome, StoreError>
where
    S: DocumentStore + ?Sized,
    T: SyncRecord,
{
    match store.get(collection, id).await? {
        None => match store.create_with_id(collection, id, encode(desired)?).await {
            Ok(()) => Ok(SyncOutcome::Created),
            Err(err) if err.is_conflict() => {
                debug!(collection, id, "concurrent create won; keeping existing record");
                Ok(SyncOutcome::Unchanged)
            }
            Err(err) => Err(err),
        },
        Some(document) => {
            let existing: T = document.decode()?;
            if !existing.is_system() {
                return Ok(SyncOutcome::SkippedManual);
            }
            if existing.same_values(desired) {
                return Ok(SyncOutcome::Unchanged);
            }
            store.update(collection, id, encode(desired)?).await?;
            Ok(SyncOutcome::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tally {
        #[serde(default)]
        id: String,
        count: u32,
        manual: bool,
    }

    impl SyncRecord for Tally {
        fn is_system(&self) -> bool {
            !self.manual
        }

        fn same_values(&self, other: &Self) -> bool {
            self.count == other.count
        }
    }

    fn tally(count: u32, manual: bool) -> Tally {
        Tally {
            id: String::new(),
            count,
            manual,
        }
    }

    #[tokio::test]
    async fn creates_then_updates_only_on_change() {
        let store = InMemoryDocumentStore::new();

        let outcome = upsert_system_record(&store, "tallies", "org__a", &tally(1, false))
            .await
            .expect("create");
        assert_eq!(outcome, SyncOutcome::Created);
        let writes = store.write_count();

        let outcome = upsert_system_record(&store, "tallies", "org__a", &tally(1, false))
            .await
            .expect("noop");
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(store.write_count(), writes);

        let outcome = upsert_system_record(&store, "tallies", "org__a", &tally(2, false))
            .await
            .expect("update");
        assert_eq!(outcome, SyncOutcome::Updated);
        assert!(outcome.wrote());
    }

    #[tokio::test]
    async fn manual_records_are_never_overwritten() {
        let store = InMemoryDocumentStore::new();
        store
            .create_with_id("tallies", "org__b", encode(&tally(9, true)).expect("encode"))
            .await
            .expect("seed");

        let outcome = upsert_system_record(&store, "tallies", "org__b", &tally(3, false))
            .await
            .expect("skip");
        assert_eq!(outcome, SyncOutcome::SkippedManual);

        let stored: Tally = store
            .get("tallies", "org__b")
            .await
            .expect("get")
            .expect("present")
            .decode()
            .expect("decode");
        assert_eq!(stored.count, 9);
    }
}
