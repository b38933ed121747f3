pub mod dictionary;
pub mod error;
pub mod front;
pub mod import;
pub mod ledger;
pub mod migration;
pub mod models;
pub mod settings;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
