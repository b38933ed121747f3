pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::Result,
    ledger::{BaseFilter, EntryFilter},
    models::{
        Attachment, DictionaryItem, DictionaryKind, Entry, EntryDetail, FundDirection,
        NewAttachment, NewEntry, Summary,
    },
};

/// Outcome of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Insert<T> {
    Created(T),
    Existing(T),
}

impl<T> Insert<T> {
    pub fn into_inner(self) -> T {
        match self {
            Insert::Created(v) | Insert::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Insert::Created(_))
    }
}

/// Persistence seam shared by the Postgres store and the in-memory store.
///
/// Implementations must enforce uniqueness of entry idempotency keys and of
/// dictionary names per kind, and return listed entries by date descending
/// (newest id first within a day).
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_entry_by_key(&self, key: &str) -> Result<Option<Entry>>;

    /// Inserts the entry. If another writer stored the same idempotency key in
    /// the meantime the stored row is returned as [`Insert::Existing`].
    async fn insert_entry(&self, new: &NewEntry) -> Result<Insert<Entry>>;

    async fn entry_exists(&self, id: i64) -> Result<bool>;

    async fn count_entries(&self) -> Result<i64>;

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<EntryDetail>>;

    async fn summarize(&self, filter: &BaseFilter) -> Result<Summary>;

    async fn insert_attachment(&self, new: &NewAttachment) -> Result<Attachment>;

    /// Active items, name ascending, optionally narrowed by a case-insensitive substring.
    async fn list_dictionary(
        &self,
        kind: DictionaryKind,
        query: Option<&str>,
    ) -> Result<Vec<DictionaryItem>>;

    /// Creates the item or reactivates the one with the same name. `direction`
    /// is only stored for funds and, when `None`, leaves an existing value alone.
    async fn upsert_dictionary(
        &self,
        kind: DictionaryKind,
        name: &str,
        direction: Option<FundDirection>,
    ) -> Result<DictionaryItem>;

    /// Returns false when no such item exists.
    async fn deactivate_dictionary(&self, kind: DictionaryKind, id: i64) -> Result<bool>;
}
