use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    ledger::EntryRequest,
};

/// One CSV line. Headers use the JSON field names; snake_case is accepted too.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    date: Option<String>,
    content: Option<String>,
    amount: Option<String>,
    flow: Option<String>,
    note: Option<String>,
    #[serde(rename = "createdBy", alias = "created_by")]
    created_by: Option<String>,
    #[serde(rename = "idempotencyKey", alias = "idempotency_key")]
    idempotency_key: Option<String>,
    #[serde(rename = "categoryId", alias = "category_id")]
    category_id: Option<String>,
    #[serde(rename = "companyId", alias = "company_id")]
    company_id: Option<String>,
    #[serde(rename = "handlerId", alias = "handler_id")]
    handler_id: Option<String>,
    #[serde(rename = "fundId", alias = "fund_id")]
    fund_id: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn reference(field: &'static str, v: Option<String>) -> Result<Option<i64>> {
    non_empty(v)
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| Error::MalformedItem(format!("{field} {s:?} is not a number")))
        })
        .transpose()
}

impl CsvRow {
    fn into_request(self) -> Result<EntryRequest> {
        Ok(EntryRequest {
            category_id: reference("categoryId", self.category_id)?,
            company_id: reference("companyId", self.company_id)?,
            handler_id: reference("handlerId", self.handler_id)?,
            fund_id: reference("fundId", self.fund_id)?,
            date: non_empty(self.date),
            content: self.content,
            amount: self.amount.map(Value::String),
            flow: non_empty(self.flow),
            note: non_empty(self.note),
            created_by: non_empty(self.created_by),
            idempotency_key: non_empty(self.idempotency_key),
        })
    }
}

pub fn parse_delimiter(v: Option<&str>) -> Result<u8> {
    match v.map(|d| d.as_bytes()) {
        None | Some([]) => Ok(b','),
        Some([d]) if d.is_ascii() => Ok(*d),
        Some(_) => Err(Error::InvalidFilter {
            field: "delimiter",
            value: v.unwrap_or_default().to_string(),
        }),
    }
}

/// Decodes a CSV export into entry payloads, one result per data line.
pub fn read_rows(data: &[u8], delimiter: u8) -> Vec<Result<EntryRequest>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(data);

    rdr.deserialize::<CsvRow>()
        .map(|row| row.map_err(Error::from).and_then(CsvRow::into_request))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_map_to_requests() {
        let data = "date;content;amount;flow;category_id;idempotencyKey\n\
                    2024-01-05;lunch;50;expense;3;k1\n\
                    ;salary; 1200 ;;;\n";
        let rows = read_rows(data.as_bytes(), b';');
        assert_eq!(rows.len(), 2);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.date.as_deref(), Some("2024-01-05"));
        assert_eq!(first.category_id, Some(3));
        assert_eq!(first.flow.as_deref(), Some("expense"));
        assert_eq!(first.idempotency_key.as_deref(), Some("k1"));

        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.date, None);
        assert_eq!(second.amount, Some(Value::String("1200".into())));
        assert_eq!(second.idempotency_key, None);
    }

    #[test]
    fn bad_reference_fails_only_its_row() {
        let data = "content,amount,fundId\na,1,x\nb,2,4\n";
        let rows = read_rows(data.as_bytes(), b',');
        assert!(matches!(rows[0], Err(Error::MalformedItem(_))));
        assert_eq!(rows[1].as_ref().unwrap().fund_id, Some(4));
    }

    #[test]
    fn delimiter_must_be_one_ascii_byte() {
        assert_eq!(parse_delimiter(None).unwrap(), b',');
        assert_eq!(parse_delimiter(Some(";")).unwrap(), b';');
        assert!(parse_delimiter(Some(";;")).is_err());
        assert!(parse_delimiter(Some("é")).is_err());
    }
}
