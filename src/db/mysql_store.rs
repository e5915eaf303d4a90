// MySQL driver for the code store
//
// Connects at server level first so setup can create the database, then
// switches to it with USE. Timestamps are stored as DATETIME and read back
// through DATE_FORMAT so both drivers hand out the same string format.

use std::time::Duration;
use mysql::prelude::Queryable;
use mysql::{params, Conn, OptsBuilder, TxOpts};

use super::schema::*;
use super::{schema_error, CodeStore, ConfirmedDrop};
use crate::config::Configuration;
use crate::constants::FILE_PATH_MAX_LEN;
use crate::error::{CodeManagerError, Result};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const ER_BAD_DB_ERROR: u16 = 1049;

const CODE_COLUMNS: &str =
    "id, code_type, data_snippet, file_path, DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s')";

type CodeRow = (i64, String, String, String, String);

/// A stored type that no longer parses is a data problem, not bad input.
fn stored_code_type(value: &str) -> Result<CodeType> {
    CodeType::parse(value).map_err(|e| CodeManagerError::Database(e.to_string()))
}

fn code_from_row((id, code_type, data_snippet, file_path, created_at): CodeRow) -> Result<GeneratedCode> {
    Ok(GeneratedCode {
        id,
        code_type: stored_code_type(&code_type)?,
        data_snippet,
        file_path,
        created_at,
    })
}

/// Backtick-quote a database name. Only plain identifiers are accepted.
pub fn quote_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid {
        return Err(CodeManagerError::Config(format!(
            "Invalid database name '{}': use letters, digits, '_' or '$'",
            name
        )));
    }
    Ok(format!("`{}`", name))
}

fn server_opts(config: &Configuration) -> OptsBuilder {
    let password = if config.password.is_empty() {
        None
    } else {
        Some(config.password.clone())
    };
    OptsBuilder::new()
        .ip_or_hostname(Some(config.host.clone()))
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(password)
        .tcp_connect_timeout(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
}

fn connect_server(config: &Configuration) -> Result<Conn> {
    Conn::new(server_opts(config)).map_err(|e| CodeManagerError::Connection(e.to_string()))
}

pub struct MySqlStore {
    conn: Conn,
    database: String,
    selected: bool,
}

impl MySqlStore {
    /// Connect to the server and select the configured database if it exists.
    pub fn connect(config: &Configuration) -> Result<Self> {
        let database = quote_identifier(&config.database)?;
        let conn = connect_server(config)?;
        let mut store = Self { conn, database, selected: false };

        match store.use_database() {
            Ok(()) => {}
            Err(mysql::Error::MySqlError(e)) if e.code == ER_BAD_DB_ERROR => {
                log::info!("Database {} does not exist yet; run setup", store.database);
            }
            Err(e) => return Err(e.into()),
        }
        log::debug!("Connected to MySQL at {}:{}", config.host, config.port);
        Ok(store)
    }

    fn use_database(&mut self) -> std::result::Result<(), mysql::Error> {
        self.conn.query_drop(format!("USE {}", self.database))?;
        self.selected = true;
        Ok(())
    }

    fn require_database(&self) -> Result<()> {
        if self.selected {
            Ok(())
        } else {
            Err(CodeManagerError::Schema(format!(
                "Database {} does not exist; run setup first",
                self.database
            )))
        }
    }
}

impl CodeStore for MySqlStore {
    fn ensure_schema(&mut self) -> Result<()> {
        let setup = |store: &mut Self| -> std::result::Result<(), mysql::Error> {
            store
                .conn
                .query_drop(format!("CREATE DATABASE IF NOT EXISTS {}", store.database))?;
            store.use_database()?;
            store.conn.query_drop(format!(
                "CREATE TABLE IF NOT EXISTS created_codes (
                    id INT AUTO_INCREMENT PRIMARY KEY,
                    code_type VARCHAR(10) NOT NULL,
                    data_snippet TEXT NOT NULL,
                    file_path VARCHAR({}) NOT NULL,
                    created_at DATETIME NOT NULL,
                    INDEX idx_created_codes_created_at (created_at)
                )",
                FILE_PATH_MAX_LEN
            ))?;
            store.conn.query_drop(
                "CREATE TABLE IF NOT EXISTS scanned_codes (
                    id INT AUTO_INCREMENT PRIMARY KEY,
                    decoded_content TEXT NOT NULL,
                    code_type VARCHAR(10) NOT NULL,
                    scanned_at DATETIME NOT NULL
                )",
            )?;
            Ok(())
        };
        setup(self).map_err(|e| schema_error(e.into()))?;
        log::debug!("MySQL schema ready in {}", self.database);
        Ok(())
    }

    fn insert_code(&mut self, code: &NewCode) -> Result<i64> {
        self.require_database()?;
        self.conn.exec_drop(
            "INSERT INTO created_codes (code_type, data_snippet, file_path, created_at)
             VALUES (:code_type, :data_snippet, :file_path, :created_at)",
            params! {
                "code_type" => code.code_type.as_str(),
                "data_snippet" => &code.data_snippet,
                "file_path" => &code.file_path,
                "created_at" => &code.created_at,
            },
        )?;
        Ok(self.conn.last_insert_id() as i64)
    }

    fn update_code(&mut self, id: i64, update: &CodeUpdate) -> Result<()> {
        self.require_database()?;
        let mut tx = self.conn.start_transaction(TxOpts::default())?;
        // affected_rows() is 0 for unchanged rows, so check existence under a row lock
        let existing: Option<i64> = tx.exec_first(
            "SELECT id FROM created_codes WHERE id = :id FOR UPDATE",
            params! { "id" => id },
        )?;
        if existing.is_none() {
            tx.rollback()?;
            return Err(CodeManagerError::NotFound(id));
        }
        tx.exec_drop(
            "UPDATE created_codes
             SET data_snippet = :data_snippet, file_path = :file_path, created_at = :created_at
             WHERE id = :id",
            params! {
                "data_snippet" => &update.data_snippet,
                "file_path" => &update.file_path,
                "created_at" => &update.created_at,
                "id" => id,
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_code(&mut self, id: i64) -> Result<()> {
        self.require_database()?;
        self.conn.exec_drop(
            "DELETE FROM created_codes WHERE id = :id",
            params! { "id" => id },
        )?;
        if self.conn.affected_rows() == 0 {
            return Err(CodeManagerError::NotFound(id));
        }
        Ok(())
    }

    fn get_code(&mut self, id: i64) -> Result<Option<GeneratedCode>> {
        self.require_database()?;
        let row: Option<CodeRow> = self.conn.exec_first(
            format!("SELECT {} FROM created_codes WHERE id = :id", CODE_COLUMNS),
            params! { "id" => id },
        )?;
        row.map(code_from_row).transpose()
    }

    fn list_codes(&mut self, filter: &CodeFilter) -> Result<Vec<GeneratedCode>> {
        self.require_database()?;
        let sql = format!(
            "SELECT {} FROM created_codes
             WHERE (:code_type IS NULL OR code_type = :code_type)
               AND (:pattern IS NULL OR data_snippet LIKE :pattern ESCAPE '!')
             ORDER BY created_at DESC, id DESC{}",
            CODE_COLUMNS,
            filter.limit_clause()
        );
        let rows: Vec<CodeRow> = self.conn.exec(
            sql,
            params! {
                "code_type" => filter.code_type.map(|t| t.as_str()),
                "pattern" => filter.like_pattern(),
            },
        )?;
        rows.into_iter().map(code_from_row).collect()
    }

    fn insert_scan(&mut self, scan: &NewScan) -> Result<i64> {
        self.require_database()?;
        self.conn.exec_drop(
            "INSERT INTO scanned_codes (decoded_content, code_type, scanned_at)
             VALUES (:decoded_content, :code_type, :scanned_at)",
            params! {
                "decoded_content" => &scan.decoded_content,
                "code_type" => scan.code_type.as_str(),
                "scanned_at" => &scan.scanned_at,
            },
        )?;
        Ok(self.conn.last_insert_id() as i64)
    }

    fn list_scans(&mut self) -> Result<Vec<ScannedCode>> {
        self.require_database()?;
        let rows: Vec<(i64, String, String, String)> = self.conn.query(
            "SELECT id, decoded_content, code_type, DATE_FORMAT(scanned_at, '%Y-%m-%d %H:%i:%s')
             FROM scanned_codes ORDER BY scanned_at DESC, id DESC",
        )?;
        rows.into_iter()
            .map(|(id, decoded_content, code_type, scanned_at)| {
                Ok(ScannedCode {
                    id,
                    decoded_content,
                    code_type: stored_code_type(&code_type)?,
                    scanned_at,
                })
            })
            .collect()
    }

    fn delete_scan(&mut self, id: i64) -> Result<()> {
        self.require_database()?;
        self.conn.exec_drop(
            "DELETE FROM scanned_codes WHERE id = :id",
            params! { "id" => id },
        )?;
        if self.conn.affected_rows() == 0 {
            return Err(CodeManagerError::NotFound(id));
        }
        Ok(())
    }

    fn drop_all(&mut self, _confirmed: &ConfirmedDrop) -> Result<()> {
        self.conn
            .query_drop(format!("DROP DATABASE IF EXISTS {}", self.database))?;
        self.selected = false;
        log::warn!("Dropped database {}", self.database);
        Ok(())
    }
}

/// Connect at server level and run a trivial query.
pub fn test_connection(config: &Configuration) -> Result<()> {
    let mut conn = connect_server(config)?;
    conn.query_drop("SELECT 1")
        .map_err(|e| CodeManagerError::Connection(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_accepts_plain_names() {
        assert_eq!(quote_identifier("code_manager_db").unwrap(), "`code_manager_db`");
        assert_eq!(quote_identifier("Db$1").unwrap(), "`Db$1`");
    }

    #[test]
    fn test_quote_identifier_rejects_injection() {
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("db`; DROP TABLE x").is_err());
        assert!(quote_identifier("my db").is_err());
        assert!(quote_identifier(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_code_from_row_rejects_unknown_type() {
        let row: CodeRow = (1, "QR".into(), "x".into(), "/tmp/x.png".into(), "2026-01-01 00:00:00".into());
        assert!(matches!(code_from_row(row), Err(CodeManagerError::Database(_))));

        let row: CodeRow = (2, "BAR128".into(), "ABC".into(), "/tmp/a.png".into(), "2026-01-01 00:00:00".into());
        let code = code_from_row(row).unwrap();
        assert_eq!(code.code_type, CodeType::Barcode128);
    }

    #[test]
    fn test_unreachable_server_is_connection_error() {
        let config = Configuration {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Configuration::default()
        };
        assert!(matches!(test_connection(&config), Err(CodeManagerError::Connection(_))));
    }
}
