use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};

use super::{Insert, Store};
use crate::{
    error::{Error, Result},
    ledger::{BaseFilter, EntryFilter, Flow},
    models::{
        Attachment, DictionaryItem, DictionaryKind, Entry, EntryDetail, FundDirection,
        NewAttachment, NewEntry, Summary,
    },
    settings::DatabaseSettings,
};

const ENTRY_COLUMNS: &str = "id, date, category_id, company_id, handler_id, fund_id, \
     content, amount, note, created_by, idempotency_key";

const ATTACHMENT_COLUMNS: &str = "id, entry_id, storage_key, filename, mime, size, pages";

#[derive(Clone)]
pub struct PgStore {
    p: PgPool,
}

impl PgStore {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        log::info!(
            "connecting to postgres (max {} connections)",
            settings.max_connections
        );
        let p = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect(&settings.url)
            .await?;
        Ok(Self { p })
    }

    pub fn pool(&self) -> &PgPool {
        &self.p
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    #[sqlx(flatten)]
    entry: Entry,
    category_name: Option<String>,
    category_active: Option<bool>,
    company_name: Option<String>,
    company_active: Option<bool>,
    handler_name: Option<String>,
    handler_active: Option<bool>,
    fund_name: Option<String>,
    fund_active: Option<bool>,
    fund_direction: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DictionaryRow {
    id: i64,
    name: String,
    active: bool,
    direction: Option<String>,
}

impl From<DictionaryRow> for DictionaryItem {
    fn from(r: DictionaryRow) -> Self {
        DictionaryItem {
            id: r.id,
            name: r.name,
            active: r.active,
            direction: r.direction.and_then(|d| d.parse().ok()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    income: BigDecimal,
    expense: BigDecimal,
    count_income: i64,
    count_expense: i64,
}

fn label(
    id: Option<i64>,
    name: Option<String>,
    active: Option<bool>,
    direction: Option<String>,
) -> Option<DictionaryItem> {
    Some(DictionaryItem {
        id: id?,
        name: name?,
        active: active.unwrap_or(true),
        direction: direction.and_then(|d| d.parse::<FundDirection>().ok()),
    })
}

impl EntryRow {
    fn into_detail(self, attachments: Vec<Attachment>) -> EntryDetail {
        let e = self.entry;
        EntryDetail {
            category: label(e.category_id, self.category_name, self.category_active, None),
            company: label(e.company_id, self.company_name, self.company_active, None),
            handler: label(e.handler_id, self.handler_name, self.handler_active, None),
            fund: label(
                e.fund_id,
                self.fund_name,
                self.fund_active,
                self.fund_direction,
            ),
            attachments,
            entry: e,
        }
    }
}

/// Appends ` AND ...` predicates for the date range and dictionary references.
pub fn push_base_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &BaseFilter) {
    if let Some(d) = f.date_from {
        qb.push(" AND e.date >= ").push_bind(d);
    }
    if let Some(d) = f.date_to {
        qb.push(" AND e.date <= ").push_bind(d);
    }
    let refs = [
        ("e.category_id", f.category_id),
        ("e.company_id", f.company_id),
        ("e.handler_id", f.handler_id),
        ("e.fund_id", f.fund_id),
    ];
    for (column, id) in refs {
        if let Some(id) = id {
            qb.push(" AND ").push(column).push(" = ").push_bind(id);
        }
    }
}

pub fn push_entry_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &EntryFilter) {
    push_base_filter(qb, &f.base);
    if let Some(kw) = &f.keyword {
        // strpos matches literally, unlike LIKE which would treat % and _ as wildcards
        qb.push(" AND (strpos(lower(e.content), lower(")
            .push_bind(kw.clone())
            .push(")) > 0 OR strpos(lower(coalesce(e.note, '')), lower(")
            .push_bind(kw.clone())
            .push(")) > 0)");
    }
    if let Some(min) = &f.min_amount {
        qb.push(" AND e.amount >= ").push_bind(min.clone());
    }
    if let Some(max) = &f.max_amount {
        qb.push(" AND e.amount <= ").push_bind(max.clone());
    }
    match f.flow {
        Some(Flow::Income) => {
            qb.push(" AND e.amount > 0");
        }
        Some(Flow::Expense) => {
            qb.push(" AND e.amount < 0");
        }
        None => {}
    }
    match f.has_receipt {
        Some(true) => {
            qb.push(" AND EXISTS (SELECT 1 FROM attachment a WHERE a.entry_id = e.id)");
        }
        Some(false) => {
            qb.push(" AND NOT EXISTS (SELECT 1 FROM attachment a WHERE a.entry_id = e.id)");
        }
        None => {}
    }
}

pub fn list_query(filter: &EntryFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            e.id, e.date, e.category_id, e.company_id, e.handler_id, e.fund_id,
            e.content, e.amount, e.note, e.created_by, e.idempotency_key,
            c.name AS category_name, c.active AS category_active,
            co.name AS company_name, co.active AS company_active,
            h.name AS handler_name, h.active AS handler_active,
            f.name AS fund_name, f.active AS fund_active, f.direction AS fund_direction
        FROM entry e
        LEFT JOIN category c ON c.id = e.category_id
        LEFT JOIN company co ON co.id = e.company_id
        LEFT JOIN handler h ON h.id = e.handler_id
        LEFT JOIN fund f ON f.id = e.fund_id
        WHERE TRUE"#,
    );
    push_entry_filter(&mut qb, filter);
    qb.push(" ORDER BY e.date DESC, e.id DESC");
    qb
}

pub fn summary_query(filter: &BaseFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        r#"
        SELECT
            COALESCE(SUM(e.amount) FILTER (WHERE e.amount > 0), 0) AS income,
            COALESCE(SUM(e.amount) FILTER (WHERE e.amount < 0), 0) AS expense,
            COUNT(*) FILTER (WHERE e.amount > 0) AS count_income,
            COUNT(*) FILTER (WHERE e.amount < 0) AS count_expense
        FROM entry e
        WHERE TRUE"#,
    );
    push_base_filter(&mut qb, filter);
    qb
}

/// Only funds carry a direction column.
fn dictionary_columns(kind: DictionaryKind) -> &'static str {
    match kind {
        DictionaryKind::Fund => "id, name, active, direction",
        _ => "id, name, active, NULL::text AS direction",
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_entry_by_key(&self, key: &str) -> Result<Option<Entry>> {
        let entry = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entry WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.p)
        .await?;
        Ok(entry)
    }

    async fn insert_entry(&self, new: &NewEntry) -> Result<Insert<Entry>> {
        let inserted = sqlx::query_as::<_, Entry>(&format!(
            r#"
            INSERT INTO entry (
                date, category_id, company_id, handler_id, fund_id,
                content, amount, note, created_by, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(new.date)
        .bind(new.category_id)
        .bind(new.company_id)
        .bind(new.handler_id)
        .bind(new.fund_id)
        .bind(&new.content)
        .bind(&new.amount)
        .bind(&new.note)
        .bind(&new.created_by)
        .bind(&new.idempotency_key)
        .fetch_optional(&self.p)
        .await?;

        if let Some(entry) = inserted {
            return Ok(Insert::Created(entry));
        }
        // the conflict can only come from a concurrent writer using the same key
        let key = new
            .idempotency_key
            .as_deref()
            .ok_or(Error::Database(sqlx::Error::RowNotFound))?;
        self.find_entry_by_key(key)
            .await?
            .map(Insert::Existing)
            .ok_or(Error::Database(sqlx::Error::RowNotFound))
    }

    async fn entry_exists(&self, id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM entry WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.p)
            .await?;
        Ok(exists)
    }

    async fn count_entries(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM entry")
            .fetch_one(&self.p)
            .await?;
        Ok(count)
    }

    async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<EntryDetail>> {
        let rows = list_query(filter)
            .build_query_as::<EntryRow>()
            .fetch_all(&self.p)
            .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.entry.id).collect();
        let mut attachments: HashMap<i64, Vec<Attachment>> = HashMap::new();
        if !ids.is_empty() {
            let found = sqlx::query_as::<_, Attachment>(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE entry_id = ANY($1) ORDER BY id"
            ))
            .bind(&ids)
            .fetch_all(&self.p)
            .await?;
            for a in found {
                attachments.entry(a.entry_id).or_default().push(a);
            }
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let atts = attachments.remove(&r.entry.id).unwrap_or_default();
                r.into_detail(atts)
            })
            .collect())
    }

    async fn summarize(&self, filter: &BaseFilter) -> Result<Summary> {
        let row = summary_query(filter)
            .build_query_as::<SummaryRow>()
            .fetch_one(&self.p)
            .await?;
        Ok(Summary {
            net: &row.income + &row.expense,
            income: row.income,
            expense: row.expense,
            count_income: row.count_income,
            count_expense: row.count_expense,
        })
    }

    async fn insert_attachment(&self, new: &NewAttachment) -> Result<Attachment> {
        let att = sqlx::query_as::<_, Attachment>(&format!(
            r#"
            INSERT INTO attachment (entry_id, storage_key, filename, mime, size, pages)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ATTACHMENT_COLUMNS}
            "#
        ))
        .bind(new.entry_id)
        .bind(&new.storage_key)
        .bind(&new.filename)
        .bind(&new.mime)
        .bind(new.size)
        .bind(new.pages)
        .fetch_one(&self.p)
        .await?;
        Ok(att)
    }

    async fn list_dictionary(
        &self,
        kind: DictionaryKind,
        query: Option<&str>,
    ) -> Result<Vec<DictionaryItem>> {
        let rows = sqlx::query_as::<_, DictionaryRow>(&format!(
            r#"
            SELECT {}
            FROM {}
            WHERE active AND ($1::text IS NULL OR strpos(lower(name), lower($1)) > 0)
            ORDER BY name ASC
            "#,
            dictionary_columns(kind),
            kind.as_str(),
        ))
        .bind(query)
        .fetch_all(&self.p)
        .await?;
        Ok(rows.into_iter().map(DictionaryItem::from).collect())
    }

    async fn upsert_dictionary(
        &self,
        kind: DictionaryKind,
        name: &str,
        direction: Option<FundDirection>,
    ) -> Result<DictionaryItem> {
        let row = match kind {
            DictionaryKind::Fund => {
                sqlx::query_as::<_, DictionaryRow>(
                    r#"
                    INSERT INTO fund (name, active, direction)
                    VALUES ($1, TRUE, $2)
                    ON CONFLICT (name) DO UPDATE
                    SET active = TRUE, direction = COALESCE(EXCLUDED.direction, fund.direction)
                    RETURNING id, name, active, direction
                    "#,
                )
                .bind(name)
                .bind(direction.map(FundDirection::as_str))
                .fetch_one(&self.p)
                .await?
            }
            _ => {
                sqlx::query_as::<_, DictionaryRow>(&format!(
                    r#"
                    INSERT INTO {table} (name, active)
                    VALUES ($1, TRUE)
                    ON CONFLICT (name) DO UPDATE SET active = TRUE
                    RETURNING {columns}
                    "#,
                    table = kind.as_str(),
                    columns = dictionary_columns(kind),
                ))
                .bind(name)
                .fetch_one(&self.p)
                .await?
            }
        };
        Ok(row.into())
    }

    async fn deactivate_dictionary(&self, kind: DictionaryKind, id: i64) -> Result<bool> {
        let res = sqlx::query(&format!(
            "UPDATE {} SET active = FALSE WHERE id = $1",
            kind.as_str()
        ))
        .bind(id)
        .execute(&self.p)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
