// Record manager: keeps generated files and `created_codes` rows in step
//
// Files and rows live in two systems that cannot share a transaction, so each
// multi-step operation runs a fixed order with a compensating action:
//   create: generate -> insert            (insert fails: remove new file)
//   update: generate -> update row -> remove old file
//                                         (row update fails: remove new file)
//   delete: delete row -> remove file     (file removal failure is only logged)

use std::path::Path;

use crate::db::schema::{data_snippet, now_timestamp};
use crate::db::{CodeFilter, CodeStore, CodeType, CodeUpdate, GeneratedCode, NewCode, NewScan, ScannedCode};
use crate::constants::SCAN_BARCODE_MAX_CHARS;
use crate::error::{CodeManagerError, Result};
use crate::generate::{CodeGenerator, Payload};

/// Phases of an update. Anything that stops before `Committed` ends `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Regenerating,
    Persisting,
    Committed,
    RolledBack,
}

pub struct RecordManager<S: CodeStore + ?Sized> {
    store: Box<S>,
    generator: CodeGenerator,
    last_update_phase: UpdatePhase,
}

/// Remove a file we created, logging instead of failing.
fn discard_file(path: &Path, reason: &str) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {} ({})", path.display(), reason),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {} ({}): {}", path.display(), reason, e),
    }
}

impl<S: CodeStore + ?Sized> RecordManager<S> {
    pub fn new(store: Box<S>, generator: CodeGenerator) -> Self {
        Self {
            store,
            generator,
            last_update_phase: UpdatePhase::Idle,
        }
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn generator(&self) -> &CodeGenerator {
        &self.generator
    }

    /// Phase the most recent update ended in.
    pub fn last_update_phase(&self) -> UpdatePhase {
        self.last_update_phase
    }

    /// Generate an image, then record it.
    pub fn create(&mut self, payload: &Payload) -> Result<GeneratedCode> {
        let content = payload.encoded_content()?;
        let path = self.generator.generate(payload)?;
        let file_path = path.to_string_lossy().to_string();

        let new_code = NewCode {
            code_type: payload.code_type(),
            data_snippet: data_snippet(&content),
            file_path: file_path.clone(),
            created_at: now_timestamp(),
        };

        let id = match self.store.insert_code(&new_code) {
            Ok(id) => id,
            Err(e) => {
                discard_file(&path, "insert failed");
                return Err(e);
            }
        };

        log::info!("Created {} code #{} at {}", new_code.code_type, id, file_path);
        Ok(GeneratedCode {
            id,
            code_type: new_code.code_type,
            data_snippet: new_code.data_snippet,
            file_path: new_code.file_path,
            created_at: new_code.created_at,
        })
    }

    /// Regenerate the image for `id` with new content of the same type.
    pub fn update(&mut self, id: i64, payload: &Payload) -> Result<GeneratedCode> {
        self.last_update_phase = UpdatePhase::Idle;
        let result = self.run_update(id, payload);
        if result.is_err() {
            log::warn!("Update of code #{} rolled back during {:?}", id, self.last_update_phase);
            self.last_update_phase = UpdatePhase::RolledBack;
        }
        result
    }

    fn run_update(&mut self, id: i64, payload: &Payload) -> Result<GeneratedCode> {
        let existing = self
            .store
            .get_code(id)?
            .ok_or(CodeManagerError::NotFound(id))?;
        if existing.code_type != payload.code_type() {
            return Err(CodeManagerError::InvalidContent(format!(
                "Record #{} is {}, not {}",
                id,
                existing.code_type,
                payload.code_type()
            )));
        }

        self.last_update_phase = UpdatePhase::Regenerating;
        let content = payload.encoded_content()?;
        let new_path = self.generator.generate(payload)?;

        self.last_update_phase = UpdatePhase::Persisting;
        let update = CodeUpdate {
            data_snippet: data_snippet(&content),
            file_path: new_path.to_string_lossy().to_string(),
            created_at: now_timestamp(),
        };
        if let Err(e) = self.store.update_code(id, &update) {
            discard_file(&new_path, "row update failed");
            return Err(e);
        }

        self.last_update_phase = UpdatePhase::Committed;
        if existing.file_path != update.file_path {
            discard_file(Path::new(&existing.file_path), "superseded");
        }

        log::info!("Updated code #{} -> {}", id, update.file_path);
        Ok(GeneratedCode {
            id,
            code_type: existing.code_type,
            data_snippet: update.data_snippet,
            file_path: update.file_path,
            created_at: update.created_at,
        })
    }

    /// Delete the row, then its image.
    pub fn delete(&mut self, id: i64) -> Result<()> {
        self.delete_with(id, true)
    }

    /// Delete the row, optionally keeping the image on disk.
    pub fn delete_with(&mut self, id: i64, remove_file: bool) -> Result<()> {
        let existing = self.store.get_code(id)?;
        self.store.delete_code(id)?;
        log::info!("Deleted code #{}", id);

        if remove_file {
            if let Some(code) = existing {
                // The row is gone either way; a leftover file is accepted.
                if let Err(e) = std::fs::remove_file(&code.file_path) {
                    log::warn!("Deleted code #{} but kept orphaned file {}: {}", id, code.file_path, e);
                }
            }
        }
        Ok(())
    }

    pub fn get(&mut self, id: i64) -> Result<GeneratedCode> {
        self.store.get_code(id)?.ok_or(CodeManagerError::NotFound(id))
    }

    pub fn list(&mut self, filter: &CodeFilter) -> Result<Vec<GeneratedCode>> {
        self.store.list_codes(filter)
    }

    /// Record a decoded scan, detecting its type from the content.
    pub fn record_scan(&mut self, decoded_content: &str) -> Result<ScannedCode> {
        if decoded_content.is_empty() {
            return Err(CodeManagerError::InvalidContent("Scanned content is empty".to_string()));
        }
        let scan = NewScan {
            decoded_content: decoded_content.to_string(),
            code_type: detect_code_type(decoded_content),
            scanned_at: now_timestamp(),
        };
        let id = self.store.insert_scan(&scan)?;
        Ok(ScannedCode {
            id,
            decoded_content: scan.decoded_content,
            code_type: scan.code_type,
            scanned_at: scan.scanned_at,
        })
    }

    pub fn list_scans(&mut self) -> Result<Vec<ScannedCode>> {
        self.store.list_scans()
    }

    pub fn delete_scan(&mut self, id: i64) -> Result<()> {
        self.store.delete_scan(id)
    }
}

/// Best guess at which symbology produced a decoded string.
pub fn detect_code_type(content: &str) -> CodeType {
    let lower = content.to_ascii_lowercase();
    if content.starts_with("WIFI:") {
        CodeType::QrWifi
    } else if lower.starts_with("http://") || lower.starts_with("https://") {
        CodeType::QrLink
    } else if content.len() <= SCAN_BARCODE_MAX_CHARS
        && content.chars().all(|c| c.is_ascii_graphic())
    {
        CodeType::Barcode128
    } else {
        CodeType::QrText
    }
}
