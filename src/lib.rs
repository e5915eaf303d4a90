// Code Manager - Library Entry Point

pub mod constants;
pub mod error;
pub mod config;
pub mod tools;
pub mod db;
pub mod generate;
pub mod records;
pub mod admin;
pub mod printing;

pub use config::{Configuration, Driver};
pub use db::{CodeFilter, CodeStore, CodeType, GeneratedCode, ScannedCode};
pub use error::{CodeManagerError, Result};
pub use generate::{CodeGenerator, Payload, WifiAuth, WifiCredentials};
pub use records::{RecordManager, UpdatePhase};

/// Open the configured database, make sure the schema exists, and wire a
/// record manager generating into the configured output directory.
pub fn open_manager(config: &Configuration) -> Result<RecordManager<dyn CodeStore>> {
    let store = db::open_and_setup(config)?;
    let generator = CodeGenerator::new(config.output_dir.clone());
    Ok(RecordManager::new(store, generator))
}
