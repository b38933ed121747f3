use std::{str::FromStr, sync::Arc};

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    models::{Attachment, Entry, EntryDetail, NewAttachment, NewEntry, Summary},
    store::{Insert, Store},
};

/// Direction tag that forces the sign of an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Income,
    Expense,
}

impl Flow {
    /// Unknown tags are treated as absent.
    pub fn parse(s: &str) -> Option<Flow> {
        match s.trim() {
            "income" => Some(Flow::Income),
            "expense" => Some(Flow::Expense),
            _ => None,
        }
    }

    pub fn apply(self, amount: BigDecimal) -> BigDecimal {
        match self {
            Flow::Income => amount.abs(),
            Flow::Expense => -amount.abs(),
        }
    }
}

/// Entry creation payload as sent by clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRequest {
    pub date: Option<String>,
    pub category_id: Option<i64>,
    pub company_id: Option<i64>,
    pub handler_id: Option<i64>,
    pub fund_id: Option<i64>,
    pub content: Option<String>,
    pub amount: Option<Value>,
    pub flow: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub idempotency_key: Option<String>,
}

impl EntryRequest {
    /// Validates the payload and computes the stored amount. A non-empty
    /// `header_key` wins over the body's idempotency key.
    pub fn normalize(self, header_key: Option<&str>, today: NaiveDate) -> Result<NewEntry> {
        let amount = parse_amount(self.amount.as_ref())?;
        let amount = match self.flow.as_deref().and_then(Flow::parse) {
            Some(flow) => flow.apply(amount),
            None => amount,
        };
        let date = match self.date.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => parse_date(d)?,
            _ => today,
        };
        let idempotency_key = header_key
            .map(str::to_string)
            .or(self.idempotency_key)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(NewEntry {
            date,
            category_id: self.category_id,
            company_id: self.company_id,
            handler_id: self.handler_id,
            fund_id: self.fund_id,
            content: self.content.unwrap_or_default(),
            amount,
            note: self.note,
            created_by: self.created_by,
            idempotency_key,
        })
    }
}

pub fn parse_amount(v: Option<&Value>) -> Result<BigDecimal> {
    let raw = match v {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(Error::InvalidAmount(other.to_string())),
        None => return Err(Error::InvalidAmount(String::new())),
    };
    match BigDecimal::from_str(&raw) {
        Ok(amount) if fits_amount_column(&amount) => Ok(amount),
        _ => Err(Error::InvalidAmount(raw)),
    }
}

/// Integer and fractional digits of the `NUMERIC(14, 2)` amount column.
const AMOUNT_INTEGER_DIGITS: i64 = 12;
const AMOUNT_SCALE: i64 = 2;

/// Compares unscaled digits against the column; the exponent is never expanded.
fn fits_amount_column(amount: &BigDecimal) -> bool {
    let (int, scale) = amount.as_bigint_and_exponent();
    let int = int.to_string();
    let digits = int.trim_start_matches('-');
    let significant = digits.trim_end_matches('0');
    if significant.is_empty() {
        return true;
    }
    let scale = scale.saturating_sub((digits.len() - significant.len()) as i64);
    let integer_digits = (significant.len() as i64).saturating_sub(scale);
    scale <= AMOUNT_SCALE && integer_digits <= AMOUNT_INTEGER_DIGITS
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its UTC date).
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc).date_naive()))
        .map_err(|_| Error::InvalidDate(s.to_string()))
}

/// Date range and dictionary references, shared by listing and summaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub category_id: Option<i64>,
    pub company_id: Option<i64>,
    pub handler_id: Option<i64>,
    pub fund_id: Option<i64>,
}

impl BaseFilter {
    pub fn matches(&self, e: &Entry) -> bool {
        self.date_from.map_or(true, |d| e.date >= d)
            && self.date_to.map_or(true, |d| e.date <= d)
            && same_ref(self.category_id, e.category_id)
            && same_ref(self.company_id, e.company_id)
            && same_ref(self.handler_id, e.handler_id)
            && same_ref(self.fund_id, e.fund_id)
    }
}

fn same_ref(wanted: Option<i64>, actual: Option<i64>) -> bool {
    wanted.map_or(true, |w| actual == Some(w))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub base: BaseFilter,
    pub keyword: Option<String>,
    pub min_amount: Option<BigDecimal>,
    pub max_amount: Option<BigDecimal>,
    pub flow: Option<Flow>,
    pub has_receipt: Option<bool>,
}

impl EntryFilter {
    pub fn matches(&self, d: &EntryDetail) -> bool {
        let e = &d.entry;
        if !self.base.matches(e) {
            return false;
        }
        if let Some(kw) = &self.keyword {
            let kw = kw.to_lowercase();
            let in_content = e.content.to_lowercase().contains(&kw);
            let in_note = e
                .note
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(&kw));
            if !in_content && !in_note {
                return false;
            }
        }
        if self.min_amount.as_ref().is_some_and(|min| e.amount < *min) {
            return false;
        }
        if self.max_amount.as_ref().is_some_and(|max| e.amount > *max) {
            return false;
        }
        match self.flow {
            Some(Flow::Income) if e.amount <= BigDecimal::zero() => return false,
            Some(Flow::Expense) if e.amount >= BigDecimal::zero() => return false,
            _ => {}
        }
        match self.has_receipt {
            Some(true) => !d.attachments.is_empty(),
            Some(false) => d.attachments.is_empty(),
            None => true,
        }
    }
}

/// Query string of the list and summary endpoints. Values stay raw strings so
/// that empty parameters can be ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterQuery {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub category: Option<String>,
    pub company: Option<String>,
    pub handler: Option<String>,
    pub fund: Option<String>,
    pub keyword: Option<String>,
    pub min_amount: Option<String>,
    pub max_amount: Option<String>,
    pub flow: Option<String>,
    pub has_receipt: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_with<T>(
    field: &'static str,
    v: &Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    present(v)
        .map(|s| {
            parse(s).ok_or_else(|| Error::InvalidFilter {
                field,
                value: s.to_string(),
            })
        })
        .transpose()
}

impl FilterQuery {
    pub fn base_filter(&self) -> Result<BaseFilter> {
        let date = |s: &str| parse_date(s).ok();
        let id = |s: &str| s.parse::<i64>().ok();
        Ok(BaseFilter {
            date_from: parse_with("date_from", &self.date_from, date)?,
            date_to: parse_with("date_to", &self.date_to, date)?,
            category_id: parse_with("category", &self.category, id)?,
            company_id: parse_with("company", &self.company, id)?,
            handler_id: parse_with("handler", &self.handler, id)?,
            fund_id: parse_with("fund", &self.fund, id)?,
        })
    }

    pub fn entry_filter(&self) -> Result<EntryFilter> {
        let amount = |s: &str| BigDecimal::from_str(s).ok();
        Ok(EntryFilter {
            base: self.base_filter()?,
            keyword: present(&self.keyword).map(str::to_string),
            min_amount: parse_with("min_amount", &self.min_amount, amount)?,
            max_amount: parse_with("max_amount", &self.max_amount, amount)?,
            flow: present(&self.flow).and_then(Flow::parse),
            has_receipt: match present(&self.has_receipt) {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            },
        })
    }
}

impl Summary {
    /// Folds amounts into income and expense buckets; zero amounts count in neither.
    pub fn from_amounts<'a>(amounts: impl IntoIterator<Item = &'a BigDecimal>) -> Summary {
        let mut income = BigDecimal::zero();
        let mut expense = BigDecimal::zero();
        let (mut count_income, mut count_expense) = (0, 0);
        for a in amounts {
            if *a > BigDecimal::zero() {
                income += a;
                count_income += 1;
            } else if *a < BigDecimal::zero() {
                expense += a;
                count_expense += 1;
            }
        }
        Summary {
            net: &income + &expense,
            income,
            expense,
            count_income,
            count_expense,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Existing,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub ok: bool,
    pub count: usize,
    pub items: Vec<Entry>,
    pub results: Vec<BatchItemResult>,
}

impl BatchOutcome {
    fn new() -> Self {
        BatchOutcome {
            ok: true,
            count: 0,
            items: Vec::new(),
            results: Vec::new(),
        }
    }

    fn push(&mut self, index: usize, res: Result<Insert<Entry>>) {
        let result = match res {
            Ok(insert) => {
                let status = match insert {
                    Insert::Created(_) => ItemStatus::Created,
                    Insert::Existing(_) => ItemStatus::Existing,
                };
                let entry = insert.into_inner();
                let id = entry.id;
                self.items.push(entry);
                BatchItemResult {
                    index,
                    status,
                    id: Some(id),
                    error: None,
                }
            }
            Err(err) => {
                log::warn!("batch item {} failed: {}", index, err);
                BatchItemResult {
                    index,
                    status: ItemStatus::Failed,
                    id: None,
                    error: Some(err.to_string()),
                }
            }
        };
        self.results.push(result);
        self.count = self.items.len();
    }
}

/// Entry ingestion, filtering and aggregation over a [`Store`].
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates an entry, or returns the one already stored under the same
    /// idempotency key without re-validating it against the new payload.
    pub async fn create(&self, req: EntryRequest, header_key: Option<&str>) -> Result<Entry> {
        let new = req.normalize(header_key, today())?;
        Ok(self.insert(new).await?.into_inner())
    }

    async fn insert(&self, new: NewEntry) -> Result<Insert<Entry>> {
        if let Some(key) = &new.idempotency_key {
            if let Some(existing) = self.store.find_entry_by_key(key).await? {
                log::debug!("idempotent replay of entry {} for key {:?}", existing.id, key);
                return Ok(Insert::Existing(existing));
            }
        }
        let res = self.store.insert_entry(&new).await?;
        match &res {
            Insert::Created(e) => log::info!("created entry {} amount {} on {}", e.id, e.amount, e.date),
            Insert::Existing(e) => log::debug!("lost idempotency race, returning entry {}", e.id),
        }
        Ok(res)
    }

    /// Processes payloads in order. A failing item is reported and skipped;
    /// items stored before a failure stay stored. Non-array input is an empty batch.
    pub async fn create_batch(&self, body: Value) -> BatchOutcome {
        let items = match body {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        let rows = items.into_iter().map(|item| {
            serde_json::from_value::<EntryRequest>(item)
                .map_err(|err| Error::MalformedItem(err.to_string()))
        });
        self.create_many(rows).await
    }

    /// Batch pipeline for payloads that are already decoded (or failed to decode).
    pub async fn create_many(
        &self,
        rows: impl IntoIterator<Item = Result<EntryRequest>>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();
        for (index, row) in rows.into_iter().enumerate() {
            let res = match row {
                Ok(req) => self.create_item(req).await,
                Err(err) => Err(err),
            };
            outcome.push(index, res);
        }
        log::info!(
            "batch finished: {} of {} items stored",
            outcome.count,
            outcome.results.len()
        );
        outcome
    }

    async fn create_item(&self, req: EntryRequest) -> Result<Insert<Entry>> {
        let new = req.normalize(None, today())?;
        self.insert(new).await
    }

    pub async fn list(&self, filter: &EntryFilter) -> Result<Vec<EntryDetail>> {
        self.store.list_entries(filter).await
    }

    pub async fn summary(&self, filter: &BaseFilter) -> Result<Summary> {
        self.store.summarize(filter).await
    }

    /// Records an uploaded object against an existing entry.
    pub async fn attach(&self, new: NewAttachment) -> Result<Attachment> {
        if !self.store.entry_exists(new.entry_id).await? {
            return Err(Error::EntryNotFound(new.entry_id));
        }
        let att = self.store.insert_attachment(&new).await?;
        log::info!(
            "attached {} ({}) to entry {}",
            att.filename,
            att.storage_key,
            att.entry_id
        );
        Ok(att)
    }

    pub async fn count(&self) -> Result<i64> {
        self.store.count_entries().await
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
