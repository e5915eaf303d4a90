// Database module
//
// `CodeStore` is the gateway the rest of the app talks to. Each driver owns a
// single connection; callers hold the store by `&mut` so only one statement
// is ever in flight.

pub mod schema;
pub mod sqlite_store;
pub mod mysql_store;

use crate::config::{Configuration, Driver};
use crate::error::{CodeManagerError, Result};

pub use schema::{CodeFilter, CodeType, CodeUpdate, GeneratedCode, NewCode, NewScan, ScannedCode};
pub use sqlite_store::SqliteStore;
pub use mysql_store::MySqlStore;

/// Proof that the destructive drop was confirmed.
/// Only the admin module can construct one.
#[derive(Debug)]
pub struct ConfirmedDrop(());

impl ConfirmedDrop {
    pub(crate) fn new() -> Self {
        ConfirmedDrop(())
    }
}

pub trait CodeStore {
    /// Create the database (if the driver has one) and both tables. Idempotent.
    fn ensure_schema(&mut self) -> Result<()>;

    fn insert_code(&mut self, code: &NewCode) -> Result<i64>;

    /// Fails with `NotFound` if the id is absent.
    fn update_code(&mut self, id: i64, update: &CodeUpdate) -> Result<()>;

    /// Fails with `NotFound` if the id is absent.
    fn delete_code(&mut self, id: i64) -> Result<()>;

    fn get_code(&mut self, id: i64) -> Result<Option<GeneratedCode>>;

    fn list_codes(&mut self, filter: &CodeFilter) -> Result<Vec<GeneratedCode>>;

    fn insert_scan(&mut self, scan: &NewScan) -> Result<i64>;

    fn list_scans(&mut self) -> Result<Vec<ScannedCode>>;

    fn delete_scan(&mut self, id: i64) -> Result<()>;

    /// Destroy every table (and the database itself where the driver allows).
    fn drop_all(&mut self, confirmed: &ConfirmedDrop) -> Result<()>;
}

/// Open a store for the configured driver. Does not touch the schema.
pub fn open_store(config: &Configuration) -> Result<Box<dyn CodeStore>> {
    match config.driver {
        Driver::Sqlite => Ok(Box::new(SqliteStore::open(&config.database)?)),
        Driver::Mysql => Ok(Box::new(MySqlStore::connect(config)?)),
    }
}

/// Open a store and make sure the schema exists.
pub fn open_and_setup(config: &Configuration) -> Result<Box<dyn CodeStore>> {
    let mut store = open_store(config)?;
    store.ensure_schema()?;
    Ok(store)
}

/// Check that the configured server/file is reachable with these settings.
pub fn test_connection(config: &Configuration) -> Result<()> {
    let result = match config.driver {
        Driver::Sqlite => sqlite_store::test_connection(&config.database),
        Driver::Mysql => mysql_store::test_connection(config),
    };
    match result {
        Ok(()) => {
            log::info!("Connection to {} database '{}' OK", config.driver.as_str(), config.database);
            Ok(())
        }
        Err(CodeManagerError::Database(msg)) => Err(CodeManagerError::Connection(msg)),
        Err(e) => Err(e),
    }
}

/// Wrap non-connection failures raised during setup as schema errors.
pub(crate) fn schema_error(err: CodeManagerError) -> CodeManagerError {
    match err {
        CodeManagerError::Database(msg) => CodeManagerError::Schema(msg),
        other => other,
    }
}
