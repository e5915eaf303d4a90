// Database administration: backup and the gated drop-everything action
//
// MySQL backups shell out to mysqldump; the dump lands in `<dest>.partial`
// and is only renamed into place after a zero exit. A failed or cancelled
// dump never leaves a file at the destination.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{Configuration, Driver};
use crate::constants::*;
use crate::db::{sqlite_store, CodeFilter, CodeStore, ConfirmedDrop};
use crate::generate::is_generated_file_name;
use crate::error::{CodeManagerError, Result};
use crate::tools::Tool;

const MYSQLDUMP: &str = "mysqldump";

/// `code_manager_backup_<yyyymmdd_HHMMSS>.sql` inside `dir`
pub fn default_backup_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format(FILE_STAMP_FORMAT);
    dir.join(format!("{}_{}.sql", BACKUP_FILE_PREFIX, stamp))
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination.as_os_str().to_owned();
    name.push(".");
    name.push(BACKUP_PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn remove_partial(partial: &Path) {
    if let Err(e) = std::fs::remove_file(partial) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Could not discard partial backup {}: {}", partial.display(), e);
        }
    }
}

/// Snapshot the configured database to `destination` and wait for it.
pub fn backup(config: &Configuration, destination: &Path) -> Result<PathBuf> {
    match config.driver {
        Driver::Mysql => start_backup(config, destination)?.wait(),
        Driver::Sqlite => {
            let partial = partial_path(destination);
            remove_partial(&partial);
            if let Err(e) = sqlite_store::snapshot(&config.database, &partial) {
                remove_partial(&partial);
                return Err(e);
            }
            std::fs::rename(&partial, destination)?;
            log::info!("Database backed up to {}", destination.display());
            Ok(destination.to_path_buf())
        }
    }
}

/// Start mysqldump in the background with the configured credentials.
pub fn start_backup(config: &Configuration, destination: &Path) -> Result<BackupJob> {
    start_dump(&Tool::Mysqldump.path(), config, destination)
}

/// Start a dump with an explicit tool path.
pub fn start_dump(tool: &Path, config: &Configuration, destination: &Path) -> Result<BackupJob> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let partial = partial_path(destination);
    remove_partial(&partial);

    let mut cmd = Command::new(tool);
    cmd.args(["-h", &config.host])
        .args(["-P", &config.port.to_string()])
        .args(["-u", &config.user])
        .arg("--single-transaction")
        .arg("-r")
        .arg(&partial)
        .arg(&config.database)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    // Keep the password out of the process list
    if !config.password.is_empty() {
        cmd.env("MYSQL_PWD", &config.password);
    }

    let mut child = cmd.spawn().map_err(|e| CodeManagerError::Subprocess {
        tool: MYSQLDUMP.to_string(),
        code: None,
        stderr: format!("Could not start {}: {}", tool.display(), e),
    })?;

    let stderr_reader = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        })
    });

    log::info!("Backup of '{}' started -> {}", config.database, destination.display());
    Ok(BackupJob {
        child,
        stderr_reader,
        partial,
        destination: destination.to_path_buf(),
        cancel: Arc::new(AtomicBool::new(false)),
    })
}

/// A running dump. Dropping it without `wait` or `cancel` kills the process.
#[derive(Debug)]
pub struct BackupJob {
    child: Child,
    stderr_reader: Option<JoinHandle<String>>,
    partial: PathBuf,
    destination: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl BackupJob {
    /// Flag another thread can set to stop the dump.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Kill the dump and discard whatever it wrote.
    pub fn cancel(mut self) -> Result<()> {
        self.kill_and_discard();
        log::info!("Backup to {} cancelled", self.destination.display());
        Ok(())
    }

    fn kill_and_discard(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.stderr_reader.take() {
            let _ = reader.join();
        }
        remove_partial(&self.partial);
    }

    /// Block until the dump finishes (or the cancel flag is raised).
    pub fn wait(mut self) -> Result<PathBuf> {
        let status = loop {
            if self.cancel.load(Ordering::Relaxed) {
                self.kill_and_discard();
                return Err(CodeManagerError::Cancelled);
            }
            match self.child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(Duration::from_millis(BACKUP_POLL_INTERVAL_MS)),
            }
        };

        let stderr = self
            .stderr_reader
            .take()
            .and_then(|r| r.join().ok())
            .unwrap_or_default();

        if !status.success() {
            remove_partial(&self.partial);
            return Err(CodeManagerError::Subprocess {
                tool: MYSQLDUMP.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        if let Err(e) = std::fs::rename(&self.partial, &self.destination) {
            remove_partial(&self.partial);
            return Err(e.into());
        }
        log::info!("Database backed up to {}", self.destination.display());
        Ok(self.destination.clone())
    }
}

impl Drop for BackupJob {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.kill_and_discard();
        }
    }
}

/// What the user typed to confirm a drop. Must equal the database name.
#[derive(Debug, Clone)]
pub struct DropConfirmation(String);

impl DropConfirmation {
    pub fn new(typed: impl Into<String>) -> Self {
        Self(typed.into())
    }

    fn verify(&self, config: &Configuration) -> Result<ConfirmedDrop> {
        if self.0.is_empty() || self.0 != config.database {
            return Err(CodeManagerError::ConfirmationRejected(config.database.clone()));
        }
        Ok(ConfirmedDrop::new())
    }
}

/// Destroy the database and remove every generated image.
///
/// Only files named like generated images are deleted: those the rows point
/// at and those found in the output directory. Anything else stays.
pub fn drop_all<S: CodeStore + ?Sized>(
    store: &mut S,
    config: &Configuration,
    confirmation: &DropConfirmation,
) -> Result<()> {
    let confirmed = confirmation.verify(config)?;

    let recorded: Vec<PathBuf> = match store.list_codes(&CodeFilter::default()) {
        Ok(codes) => codes.into_iter().map(|c| PathBuf::from(c.file_path)).collect(),
        Err(e) => {
            log::debug!("No recorded images to collect before drop: {}", e);
            Vec::new()
        }
    };
    store.drop_all(&confirmed)?;

    let removed = remove_generated_images(&recorded, &config.output_dir);
    log::info!("Removed {} generated images", removed);
    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        log::warn!("Database dropped but could not recreate {}: {}", config.output_dir.display(), e);
    }
    Ok(())
}

fn remove_generated_images(recorded: &[PathBuf], output_dir: &Path) -> usize {
    let mut candidates: Vec<PathBuf> = recorded.to_vec();
    match std::fs::read_dir(output_dir) {
        Ok(entries) => candidates.extend(entries.filter_map(|e| e.ok()).map(|e| e.path())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not scan {}: {}", output_dir.display(), e),
    }

    let mut removed = 0;
    for path in candidates {
        let generated = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_generated_file_name);
        if !generated || !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::generate::{CodeGenerator, Payload};
    use crate::records::RecordManager;
    use tempfile::TempDir;

    fn sqlite_config(tmp: &TempDir) -> Configuration {
        Configuration::sqlite(
            tmp.path().join("codes.db").to_string_lossy().to_string(),
            tmp.path().join("codes_generated"),
        )
    }

    #[test]
    fn test_drop_rejected_without_matching_name() {
        let tmp = TempDir::new().unwrap();
        let config = sqlite_config(&tmp);
        let mut store = SqliteStore::open(&config.database).unwrap();
        store.ensure_schema().unwrap();

        for typed in ["", "wrong", "CODES.DB"] {
            let err = drop_all(&mut store, &config, &DropConfirmation::new(typed)).unwrap_err();
            assert!(matches!(err, CodeManagerError::ConfirmationRejected(_)));
        }
        assert!(store.list_codes(&CodeFilter::default()).is_ok());
    }

    #[test]
    fn test_drop_removes_generated_images_only() {
        let tmp = TempDir::new().unwrap();
        let config = sqlite_config(&tmp);
        let mut store = SqliteStore::open(&config.database).unwrap();
        store.ensure_schema().unwrap();

        let mut manager = RecordManager::new(Box::new(store), CodeGenerator::new(config.output_dir.clone()));
        let code = manager.create(&Payload::Text("to be dropped".to_string())).unwrap();
        let unrecorded = config.output_dir.join("code_BAR128_20260101_090000_0a1b2c3d.png");
        std::fs::write(&unrecorded, b"png").unwrap();
        let holiday = config.output_dir.join("holiday.png");
        std::fs::write(&holiday, b"not ours").unwrap();
        let notes = config.output_dir.join("notes").join("todo.txt");
        std::fs::create_dir_all(notes.parent().unwrap()).unwrap();
        std::fs::write(&notes, b"keep").unwrap();

        drop_all(manager.store_mut(), &config, &DropConfirmation::new(config.database.clone())).unwrap();

        assert!(manager.store_mut().list_codes(&CodeFilter::default()).is_err());
        assert!(!std::path::Path::new(&code.file_path).exists());
        assert!(!unrecorded.exists());
        assert_eq!(std::fs::read(&holiday).unwrap(), b"not ours");
        assert!(notes.exists());
        assert!(config.output_dir.is_dir());
    }

    #[test]
    fn test_drop_with_output_dir_pointing_at_user_folder() {
        let tmp = TempDir::new().unwrap();
        let mut config = sqlite_config(&tmp);
        config.output_dir = tmp.path().to_path_buf();
        let mut store = SqliteStore::open(&config.database).unwrap();
        store.ensure_schema().unwrap();
        let document = tmp.path().join("thesis.docx");
        std::fs::write(&document, b"months of work").unwrap();

        drop_all(&mut store, &config, &DropConfirmation::new(config.database.clone())).unwrap();

        assert!(document.exists());
        assert!(std::path::Path::new(&config.database).exists());
    }

    #[test]
    fn test_sqlite_backup() {
        let tmp = TempDir::new().unwrap();
        let config = sqlite_config(&tmp);
        let mut store = SqliteStore::open(&config.database).unwrap();
        store.ensure_schema().unwrap();

        let dest = default_backup_path(tmp.path());
        let written = backup(&config, &dest).unwrap();
        assert_eq!(written, dest);
        assert!(dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_missing_dump_tool_is_subprocess_error() {
        let tmp = TempDir::new().unwrap();
        let config = Configuration::default();
        let dest = tmp.path().join("dump.sql");
        let err = start_dump(Path::new("/no/such/mysqldump"), &config, &dest).unwrap_err();
        assert!(matches!(err, CodeManagerError::Subprocess { code: None, .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn test_default_backup_name() {
        let path = default_backup_path(Path::new("/backups"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("code_manager_backup_"));
        assert!(name.ends_with(".sql"));
    }

    #[cfg(unix)]
    mod fake_dump {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script standing in for mysqldump.
        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        // Writes its arguments and MYSQL_PWD into the -r target
        const WRITE_ARGS: &str = r#"
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-r" ]; then out="$a"; fi
  prev="$a"
done
echo "-- args: $*" > "$out"
echo "-- pwd: $MYSQL_PWD" >> "$out"
"#;

        #[test]
        fn test_successful_dump_is_renamed_into_place() {
            let tmp = TempDir::new().unwrap();
            let tool = script(tmp.path(), "dump_ok.sh", WRITE_ARGS);
            let mut config = Configuration::default();
            config.password = "s3cret".to_string();
            let dest = tmp.path().join("out").join("backup.sql");

            let written = start_dump(&tool, &config, &dest).unwrap().wait().unwrap();
            assert_eq!(written, dest);
            let text = std::fs::read_to_string(&dest).unwrap();
            assert!(text.contains("code_manager_db"));
            assert!(text.contains("-u root"));
            let args_line = text.lines().next().unwrap();
            assert!(!args_line.contains("s3cret"));
            assert!(text.contains("-- pwd: s3cret"));
            assert!(!partial_path(&dest).exists());
        }

        #[test]
        fn test_failed_dump_reports_exit_code_and_stderr() {
            let tmp = TempDir::new().unwrap();
            let tool = script(
                tmp.path(),
                "dump_fail.sh",
                &format!("{}\necho 'Access denied for user' >&2\nexit 2", WRITE_ARGS),
            );
            let dest = tmp.path().join("backup.sql");

            let err = start_dump(&tool, &Configuration::default(), &dest)
                .unwrap()
                .wait()
                .unwrap_err();
            match err {
                CodeManagerError::Subprocess { code, stderr, .. } => {
                    assert_eq!(code, Some(2));
                    assert!(stderr.contains("Access denied"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(!dest.exists());
            assert!(!partial_path(&dest).exists());
        }

        #[test]
        fn test_cancelled_dump_discards_partial_file() {
            let tmp = TempDir::new().unwrap();
            let tool = script(
                tmp.path(),
                "dump_slow.sh",
                &format!("{}\nexec sleep 30", WRITE_ARGS),
            );
            let dest = tmp.path().join("backup.sql");

            let job = start_dump(&tool, &Configuration::default(), &dest).unwrap();
            let flag = job.cancel_flag();
            std::thread::sleep(Duration::from_millis(200));
            flag.store(true, Ordering::Relaxed);

            assert!(matches!(job.wait(), Err(CodeManagerError::Cancelled)));
            assert!(!dest.exists());
            assert!(!partial_path(&dest).exists());
        }

        #[test]
        fn test_explicit_cancel() {
            let tmp = TempDir::new().unwrap();
            let tool = script(tmp.path(), "dump_sleep.sh", &format!("{}\nexec sleep 30", WRITE_ARGS));
            let dest = tmp.path().join("backup.sql");

            let job = start_dump(&tool, &Configuration::default(), &dest).unwrap();
            job.cancel().unwrap();
            assert!(!dest.exists());
            assert!(!partial_path(&dest).exists());
        }
    }
}
