//! PostgreSQL adapters.
//!
//! Implement the persistence ports using sqlx with connection pooling.
//! The ledger store is the only adapter that opens transactions; readers
//! run single statements against the pool.

mod catalog_reader;
mod ledger_reader;
mod ledger_store;

pub use catalog_reader::PostgresCourseCatalog;
pub use ledger_reader::PostgresLedgerReader;
pub use ledger_store::PostgresLedgerStore;
