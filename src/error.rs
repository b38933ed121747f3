use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),
    #[error("invalid date: {0:?}")]
    InvalidDate(String),
    #[error("invalid value {value:?} for filter '{field}'")]
    InvalidFilter { field: &'static str, value: String },
    #[error("invalid fund direction {0:?}, expected source, destination or neutral")]
    InvalidDirection(String),
    #[error("unknown dictionary kind {0:?}")]
    UnknownDictionary(String),
    #[error("malformed entry payload: {0}")]
    MalformedItem(String),
    #[error("invalid multipart upload: {0}")]
    Upload(String),
    #[error("{0}")]
    MissingField(&'static str),
    #[error("entry {0} not found")]
    EntryNotFound(i64),
    #[error("{kind} {id} not found")]
    DictionaryItemNotFound { kind: &'static str, id: i64 },
    #[error("upload of {size} bytes exceeds the limit of {limit} bytes")]
    UploadTooLarge { size: u64, limit: u64 },
    #[error("object storage is not configured")]
    StorageUnavailable,
    #[error("cannot sign storage request: {0}")]
    Signing(String),
    #[error("invalid csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing or invalid api key")]
    Unauthorized,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("migration {file} failed: {reason}")]
    Migration { file: String, reason: String },
}

impl Error {
    /// Errors caused by the caller's input rather than by the service.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InvalidDate(_)
                | Error::InvalidFilter { .. }
                | Error::InvalidDirection(_)
                | Error::UnknownDictionary(_)
                | Error::MalformedItem(_)
                | Error::Upload(_)
                | Error::MissingField(_)
                | Error::UploadTooLarge { .. }
                | Error::Csv(_)
        )
    }
}
