use std::sync::Arc;

use crate::{
    error::{Error, Result},
    models::{DictionaryItem, DictionaryKind, FundDirection},
    store::Store,
};

/// Lookup values (category, company, handler, fund) created on the fly while
/// entering data. Items are never removed, only hidden.
#[derive(Clone)]
pub struct Dictionaries {
    store: Arc<dyn Store>,
}

impl Dictionaries {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, kind: DictionaryKind, query: Option<&str>) -> Result<Vec<DictionaryItem>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        self.store.list_dictionary(kind, query).await
    }

    /// Upserts by trimmed name and reactivates a hidden item of that name.
    /// `direction` is only read for funds.
    pub async fn quick_create(
        &self,
        kind: DictionaryKind,
        name: &str,
        direction: Option<&str>,
    ) -> Result<DictionaryItem> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::MissingField("name is required"));
        }
        let direction = match (kind, direction.map(str::trim)) {
            (DictionaryKind::Fund, Some(d)) if !d.is_empty() => Some(d.parse::<FundDirection>()?),
            _ => None,
        };
        let item = self.store.upsert_dictionary(kind, name, direction).await?;
        log::info!("{} {:?} is active as id {}", kind, item.name, item.id);
        Ok(item)
    }

    pub async fn deactivate(&self, kind: DictionaryKind, id: i64) -> Result<()> {
        if !self.store.deactivate_dictionary(kind, id).await? {
            return Err(Error::DictionaryItemNotFound {
                kind: kind.as_str(),
                id,
            });
        }
        log::info!("{} {} deactivated", kind, id);
        Ok(())
    }
}
