// SQLite driver for the code store
// `database` in the settings is the file path; ":memory:" opens a private in-memory DB.

use std::path::Path;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::schema::*;
use super::{schema_error, CodeStore, ConfirmedDrop};
use crate::error::{CodeManagerError, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS created_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code_type TEXT NOT NULL CHECK (code_type IN ('QR_TEXT', 'QR_LINK', 'QR_WIFI', 'BAR128')),
        data_snippet TEXT NOT NULL,
        file_path TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_created_codes_created_at ON created_codes(created_at);

    CREATE TABLE IF NOT EXISTS scanned_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        decoded_content TEXT NOT NULL,
        code_type TEXT NOT NULL CHECK (code_type IN ('QR_TEXT', 'QR_LINK', 'QR_WIFI', 'BAR128')),
        scanned_at TEXT NOT NULL
    );
"#;

const CODE_COLUMNS: &str = "id, code_type, data_snippet, file_path, created_at";

impl ToSql for CodeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CodeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        CodeType::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn row_to_code(row: &Row) -> rusqlite::Result<GeneratedCode> {
    Ok(GeneratedCode {
        id: row.get(0)?,
        code_type: row.get(1)?,
        data_snippet: row.get(2)?,
        file_path: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if missing) the database file.
    pub fn open(database: &str) -> Result<Self> {
        let conn = if database == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let path = Path::new(database);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| CodeManagerError::Connection(format!("{}: {}", parent.display(), e)))?;
                }
            }
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

impl CodeStore for SqliteStore {
    fn ensure_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|e| schema_error(e.into()))?;
        log::debug!("SQLite schema ready");
        Ok(())
    }

    fn insert_code(&mut self, code: &NewCode) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO created_codes (code_type, data_snippet, file_path, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![code.code_type, code.data_snippet, code.file_path, code.created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_code(&mut self, id: i64, update: &CodeUpdate) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE created_codes SET data_snippet = ?1, file_path = ?2, created_at = ?3 WHERE id = ?4",
            params![update.data_snippet, update.file_path, update.created_at, id],
        )?;
        if changed == 0 {
            return Err(CodeManagerError::NotFound(id));
        }
        Ok(())
    }

    fn delete_code(&mut self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM created_codes WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(CodeManagerError::NotFound(id));
        }
        Ok(())
    }

    fn get_code(&mut self, id: i64) -> Result<Option<GeneratedCode>> {
        let sql = format!("SELECT {} FROM created_codes WHERE id = ?1", CODE_COLUMNS);
        let result = self
            .conn
            .query_row(&sql, params![id], row_to_code)
            .optional()?;
        Ok(result)
    }

    fn list_codes(&mut self, filter: &CodeFilter) -> Result<Vec<GeneratedCode>> {
        let sql = format!(
            "SELECT {} FROM created_codes
             WHERE (?1 IS NULL OR code_type = ?1)
               AND (?2 IS NULL OR data_snippet LIKE ?2 ESCAPE '!')
             ORDER BY created_at DESC, id DESC{}",
            CODE_COLUMNS,
            filter.limit_clause()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![filter.code_type, filter.like_pattern()], row_to_code)?;
        let codes = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(codes)
    }

    fn insert_scan(&mut self, scan: &NewScan) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO scanned_codes (decoded_content, code_type, scanned_at) VALUES (?1, ?2, ?3)",
            params![scan.decoded_content, scan.code_type, scan.scanned_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_scans(&mut self) -> Result<Vec<ScannedCode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, decoded_content, code_type, scanned_at FROM scanned_codes
             ORDER BY scanned_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScannedCode {
                id: row.get(0)?,
                decoded_content: row.get(1)?,
                code_type: row.get(2)?,
                scanned_at: row.get(3)?,
            })
        })?;
        let scans = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scans)
    }

    fn delete_scan(&mut self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM scanned_codes WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(CodeManagerError::NotFound(id));
        }
        Ok(())
    }

    fn drop_all(&mut self, _confirmed: &ConfirmedDrop) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS created_codes;
             DROP TABLE IF EXISTS scanned_codes;",
        )?;
        log::warn!("Dropped all code tables");
        Ok(())
    }
}

/// Open the file and run a trivial query.
pub fn test_connection(database: &str) -> Result<()> {
    let store = SqliteStore::open(database)?;
    store.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

/// Write a consistent copy of the database file to `dest`.
pub fn snapshot(database: &str, dest: &Path) -> Result<()> {
    if database == ":memory:" {
        return Err(CodeManagerError::Config(
            "An in-memory database cannot be backed up".to_string(),
        ));
    }
    // Read-only so a mistyped path fails instead of creating an empty database
    let conn = Connection::open_with_flags(database, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    conn.execute(
        "VACUUM INTO ?1",
        params![dest.to_string_lossy().to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn new_code(code_type: CodeType, data: &str, created_at: &str) -> NewCode {
        NewCode {
            code_type,
            data_snippet: data.to_string(),
            file_path: format!("/tmp/{}.png", data.len()),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let mut store = setup_store();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();
        assert!(store.list_codes(&CodeFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_insert_get_update_delete() {
        let mut store = setup_store();
        let id = store
            .insert_code(&new_code(CodeType::QrLink, "https://example.com", "2026-01-01 10:00:00"))
            .unwrap();

        let code = store.get_code(id).unwrap().unwrap();
        assert_eq!(code.code_type, CodeType::QrLink);
        assert_eq!(code.data_snippet, "https://example.com");

        store
            .update_code(
                id,
                &CodeUpdate {
                    data_snippet: "https://example.org".to_string(),
                    file_path: "/tmp/new.png".to_string(),
                    created_at: "2026-01-02 10:00:00".to_string(),
                },
            )
            .unwrap();
        let code = store.get_code(id).unwrap().unwrap();
        assert_eq!(code.file_path, "/tmp/new.png");
        assert_eq!(code.created_at, "2026-01-02 10:00:00");

        store.delete_code(id).unwrap();
        assert!(store.get_code(id).unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete_missing_row_is_not_found() {
        let mut store = setup_store();
        let update = CodeUpdate {
            data_snippet: "x".to_string(),
            file_path: "/tmp/x.png".to_string(),
            created_at: now_timestamp(),
        };
        assert!(matches!(store.update_code(42, &update), Err(CodeManagerError::NotFound(42))));
        assert!(matches!(store.delete_code(42), Err(CodeManagerError::NotFound(42))));
    }

    #[test]
    fn test_list_orders_newest_first_and_filters() {
        let mut store = setup_store();
        store.insert_code(&new_code(CodeType::QrText, "hello", "2026-01-01 09:00:00")).unwrap();
        store.insert_code(&new_code(CodeType::Barcode128, "ABC-123", "2026-01-01 11:00:00")).unwrap();
        store.insert_code(&new_code(CodeType::QrText, "hello 100%", "2026-01-01 10:00:00")).unwrap();

        let all = store.list_codes(&CodeFilter::default()).unwrap();
        let snippets: Vec<_> = all.iter().map(|c| c.data_snippet.as_str()).collect();
        assert_eq!(snippets, vec!["ABC-123", "hello 100%", "hello"]);

        let qr_only = store
            .list_codes(&CodeFilter { code_type: Some(CodeType::QrText), ..Default::default() })
            .unwrap();
        assert_eq!(qr_only.len(), 2);

        let percent = store
            .list_codes(&CodeFilter { contains: Some("100%".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(percent.len(), 1);

        let limited = store
            .list_codes(&CodeFilter { limit: Some(1), ..Default::default() })
            .unwrap();
        assert_eq!(limited[0].data_snippet, "ABC-123");
    }

    #[test]
    fn test_scans_lifecycle() {
        let mut store = setup_store();
        let id = store
            .insert_scan(&NewScan {
                decoded_content: "WIFI:T:WPA;S:home;P:pw;;".to_string(),
                code_type: CodeType::QrWifi,
                scanned_at: now_timestamp(),
            })
            .unwrap();
        let scans = store.list_scans().unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].code_type, CodeType::QrWifi);

        store.delete_scan(id).unwrap();
        assert!(store.list_scans().unwrap().is_empty());
        assert!(matches!(store.delete_scan(id), Err(CodeManagerError::NotFound(_))));
    }

    #[test]
    fn test_drop_all_removes_tables() {
        let mut store = setup_store();
        store.insert_code(&new_code(CodeType::QrText, "a", "2026-01-01 09:00:00")).unwrap();
        store.drop_all(&ConfirmedDrop::new()).unwrap();
        assert!(store.list_codes(&CodeFilter::default()).is_err());

        store.ensure_schema().unwrap();
        assert!(store.list_codes(&CodeFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_file_database_is_created_and_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("data").join("codes.db");
        let db = db_path.to_str().unwrap();

        let mut store = SqliteStore::open(db).unwrap();
        store.ensure_schema().unwrap();
        store.insert_code(&new_code(CodeType::QrText, "kept", "2026-01-01 09:00:00")).unwrap();
        assert!(db_path.exists());
        test_connection(db).unwrap();

        let backup = tmp.path().join("backup.db");
        snapshot(db, &backup).unwrap();
        let mut copy = SqliteStore::open(backup.to_str().unwrap()).unwrap();
        assert_eq!(copy.list_codes(&CodeFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_of_missing_database_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("never-created.db");
        let backup = tmp.path().join("backup.db");

        let err = snapshot(missing.to_str().unwrap(), &backup).unwrap_err();
        assert!(matches!(err, CodeManagerError::Connection(_)));
        assert!(!missing.exists());
        assert!(!backup.exists());
    }

    #[test]
    fn test_snapshot_of_memory_database_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            snapshot(":memory:", &tmp.path().join("x.db")),
            Err(CodeManagerError::Config(_))
        ));
    }
}
