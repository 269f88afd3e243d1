pub mod sqlite_credit_ledger;
pub mod sqlite_job_repository;
pub mod sqlite_model_catalog;

pub use sqlite_credit_ledger::SqliteCreditLedger;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_model_catalog::SqliteModelCatalog;
