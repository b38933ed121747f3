use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;

use super::{Insert, Store};
use crate::{
    error::{Error, Result},
    ledger::{BaseFilter, EntryFilter},
    models::{
        Attachment, DictionaryItem, DictionaryKind, Entry, EntryDetail, FundDirection,
        NewAttachment, NewEntry, Summary,
    },
};

#[derive(Debug, Default)]
struct Tables {
    entries: Vec<Entry>,
    attachments: Vec<Attachment>,
    dictionaries: HashMap<DictionaryKind, Vec<DictionaryItem>>,
    last_entry_id: i64,
    last_attachment_id: i64,
}

impl Tables {
    fn label(&self, kind: DictionaryKind, id: Option<i64>) -> Option<DictionaryItem> {
        let id = id?;
        self.dictionaries
            .get(&kind)?
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    fn detail(&self, entry: &Entry) -> EntryDetail {
        EntryDetail {
            category: self.label(DictionaryKind::Category, entry.category_id),
            company: self.label(DictionaryKind::Company, entry.company_id),
            handler: self.label(DictionaryKind::Handler, entry.handler_id),
            fund: self.label(DictionaryKind::Fund, entry.fund_id),
            attachments: self
                .attachments
                .iter()
                .filter(|a| a.entry_id == entry.id)
                .cloned()
                .collect(),
            entry: entry.clone(),
        }
    }
}

/// In-memory store for tests and local runs. Every write happens under one
/// lock, so check-then-insert is atomic here.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| Error::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| Error::Poisoned)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_entry_by_key(&self, key: &str) -> Result<Option<Entry>> {
        let t = self.read()?;
        Ok(t.entries
            .iter()
            .find(|e| e.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn insert_entry(&self, new: &NewEntry) -> Result<Insert<Entry>> {
        let mut t = self.write()?;
        if let Some(key) = &new.idempotency_key {
            if let Some(existing) = t
                .entries
                .iter()
                .find(|e| e.idempotency_key.as_ref() == Some(key))
            {
                return Ok(Insert::Existing(existing.clone()));
            }
        }
        t.last_entry_id += 1;
        let entry = Entry {
            id: t.last_entry_id,
            date: new.date,
            category_id: new.category_id,
            company_id: new.company_id,
            handler_id: new.handler_id,
            fund_id: new.fund_id,
            content: new.content.clone(),
            amount: new.amount.clone(),
            note: new.note.clone(),
            created_by: new.created_by.clone(),
            idempotency_key: new.idempotency_key.clone(),
        };
        t.entries.push(entry.clone());
        Ok(Insert::Created(entry))
    }

    async fn entry_exists(&self, id: i64) -> Result<bool> {
        Ok(self.read()?.entries.iter().any(|e| e.id == id))
    }

    async fn count_entries(&self) -> Result<i64> {
        Ok(self.read()?.entries.len() as i64)
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<EntryDetail>> {
        let t = self.read()?;
        let mut out: Vec<EntryDetail> = t
            .entries
            .iter()
            .map(|e| t.detail(e))
            .filter(|d| filter.matches(d))
            .collect();
        out.sort_by(|a, b| {
            b.entry
                .date
                .cmp(&a.entry.date)
                .then(b.entry.id.cmp(&a.entry.id))
        });
        Ok(out)
    }

    async fn summarize(&self, filter: &BaseFilter) -> Result<Summary> {
        let t = self.read()?;
        Ok(Summary::from_amounts(
            t.entries
                .iter()
                .filter(|e| filter.matches(e))
                .map(|e| &e.amount),
        ))
    }

    async fn insert_attachment(&self, new: &NewAttachment) -> Result<Attachment> {
        let mut t = self.write()?;
        t.last_attachment_id += 1;
        let att = Attachment {
            id: t.last_attachment_id,
            entry_id: new.entry_id,
            storage_key: new.storage_key.clone(),
            filename: new.filename.clone(),
            mime: new.mime.clone(),
            size: new.size,
            pages: new.pages,
        };
        t.attachments.push(att.clone());
        Ok(att)
    }

    async fn list_dictionary(
        &self,
        kind: DictionaryKind,
        query: Option<&str>,
    ) -> Result<Vec<DictionaryItem>> {
        let t = self.read()?;
        let needle = query.map(str::to_lowercase);
        let mut items: Vec<DictionaryItem> = t
            .dictionaries
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|d| d.active)
            .filter(|d| {
                needle
                    .as_ref()
                    .map_or(true, |n| d.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn upsert_dictionary(
        &self,
        kind: DictionaryKind,
        name: &str,
        direction: Option<FundDirection>,
    ) -> Result<DictionaryItem> {
        let mut t = self.write()?;
        let direction = direction.filter(|_| kind == DictionaryKind::Fund);
        let items = t.dictionaries.entry(kind).or_default();
        if let Some(item) = items.iter_mut().find(|d| d.name == name) {
            item.active = true;
            if direction.is_some() {
                item.direction = direction;
            }
            return Ok(item.clone());
        }
        let item = DictionaryItem {
            id: items.len() as i64 + 1,
            name: name.to_string(),
            active: true,
            direction,
        };
        items.push(item.clone());
        Ok(item)
    }

    async fn deactivate_dictionary(&self, kind: DictionaryKind, id: i64) -> Result<bool> {
        let mut t = self.write()?;
        match t
            .dictionaries
            .get_mut(&kind)
            .and_then(|items| items.iter_mut().find(|d| d.id == id))
        {
            Some(item) => {
                item.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
