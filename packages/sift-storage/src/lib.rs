pub mod db;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod outbox;
pub mod queries;
pub mod schema;
pub mod vectors;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
