use std::{fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The four lookup tables entries can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryKind {
    Category,
    Company,
    Handler,
    Fund,
}

impl DictionaryKind {
    pub const ALL: [DictionaryKind; 4] = [
        DictionaryKind::Category,
        DictionaryKind::Company,
        DictionaryKind::Handler,
        DictionaryKind::Fund,
    ];

    /// Table name, also used as the wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            DictionaryKind::Category => "category",
            DictionaryKind::Company => "company",
            DictionaryKind::Handler => "handler",
            DictionaryKind::Fund => "fund",
        }
    }
}

impl fmt::Display for DictionaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DictionaryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DictionaryKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownDictionary(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundDirection {
    Source,
    Destination,
    Neutral,
}

impl FundDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FundDirection::Source => "source",
            FundDirection::Destination => "destination",
            FundDirection::Neutral => "neutral",
        }
    }
}

impl FromStr for FundDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(FundDirection::Source),
            "destination" => Ok(FundDirection::Destination),
            "neutral" => Ok(FundDirection::Neutral),
            _ => Err(Error::InvalidDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DictionaryItem {
    pub id: i64,
    pub name: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<FundDirection>,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: i64,
    pub date: NaiveDate,
    pub category_id: Option<i64>,
    pub company_id: Option<i64>,
    pub handler_id: Option<i64>,
    pub fund_id: Option<i64>,
    pub content: String,
    pub amount: BigDecimal,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub idempotency_key: Option<String>,
}

/// A validated entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub category_id: Option<i64>,
    pub company_id: Option<i64>,
    pub handler_id: Option<i64>,
    pub fund_id: Option<i64>,
    pub content: String,
    pub amount: BigDecimal,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: i64,
    pub entry_id: i64,
    pub storage_key: String,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub pages: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAttachment {
    pub entry_id: i64,
    pub storage_key: String,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub pages: i32,
}

/// An entry joined with its dictionary labels and attachments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDetail {
    #[serde(flatten)]
    pub entry: Entry,
    pub category: Option<DictionaryItem>,
    pub company: Option<DictionaryItem>,
    pub handler: Option<DictionaryItem>,
    pub fund: Option<DictionaryItem>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub income: BigDecimal,
    pub expense: BigDecimal,
    pub net: BigDecimal,
    pub count_income: i64,
    pub count_expense: i64,
}
