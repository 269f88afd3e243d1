pub mod manager;
pub mod mapping;
pub mod migrations;
pub mod sqlite;

pub use manager::{DatabaseManager, DbPool};
pub use migrations::run_migrations;
pub use sqlite::{SqliteCreditLedger, SqliteJobRepository, SqliteModelCatalog};
