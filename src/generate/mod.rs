// Code generation
//
// Turns a payload into exactly one PNG in the output directory. The image is
// written to a temp name and renamed, so a failure leaves nothing behind.

pub mod barcode;
pub mod qr;
pub mod wifi;

use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::db::CodeType;
use crate::error::{CodeManagerError, Result};

pub use wifi::{WifiAuth, WifiCredentials};

/// What the user asked to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Link(String),
    Wifi(WifiCredentials),
    Barcode(String),
}

impl Payload {
    pub fn code_type(&self) -> CodeType {
        match self {
            Payload::Text(_) => CodeType::QrText,
            Payload::Link(_) => CodeType::QrLink,
            Payload::Wifi(_) => CodeType::QrWifi,
            Payload::Barcode(_) => CodeType::Barcode128,
        }
    }

    /// The exact string that goes into the symbol, after validation.
    pub fn encoded_content(&self) -> Result<String> {
        match self {
            Payload::Text(text) => {
                if text.trim().is_empty() {
                    return Err(CodeManagerError::InvalidContent("Text cannot be empty".to_string()));
                }
                Ok(text.clone())
            }
            Payload::Link(url) => {
                let url = url.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(CodeManagerError::InvalidContent(format!(
                        "Link must start with http:// or https://: {}",
                        url
                    )));
                }
                Ok(url.to_string())
            }
            Payload::Wifi(creds) => wifi::format_payload(creds),
            Payload::Barcode(data) => {
                barcode::validate(data)?;
                Ok(data.clone())
            }
        }
    }
}

/// Keep only characters that are safe in a file name.
fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_FILE_PREFIX.to_string()
    } else {
        cleaned
    }
}

/// `<prefix>_<TYPE>_<yyyymmdd_HHMMSS>_<8 hex>.png`
pub fn unique_file_name(prefix: &str, code_type: CodeType) -> String {
    let stamp = chrono::Local::now().format(FILE_STAMP_FORMAT);
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}.{}",
        sanitize_prefix(prefix),
        code_type.as_str(),
        stamp,
        &suffix[..FILE_SUFFIX_LEN],
        IMAGE_EXTENSION
    )
}

/// True for names `unique_file_name` produces, including an interrupted
/// `.tmp.png` write.
pub fn is_generated_file_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(&format!(".{}", IMAGE_EXTENSION)) else {
        return false;
    };
    let stem = stem.strip_suffix(".tmp").unwrap_or(stem);

    let parts: Vec<&str> = stem.rsplitn(4, '_').collect();
    let [suffix, time, date, head] = parts[..] else {
        return false;
    };
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());

    suffix.len() == FILE_SUFFIX_LEN
        && suffix.bytes().all(|b| b.is_ascii_hexdigit())
        && digits(time, 6)
        && digits(date, 8)
        && CodeType::ALL.iter().any(|t| {
            head.strip_suffix(t.as_str())
                .and_then(|prefix| prefix.strip_suffix('_'))
                .is_some_and(|prefix| !prefix.is_empty())
        })
}

/// Generates images into one output directory.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    output_dir: PathBuf,
    file_prefix: String,
}

impl CodeGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.file_prefix = sanitize_prefix(prefix);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn generate(&self, payload: &Payload) -> Result<PathBuf> {
        generate_named(payload, &self.output_dir, &self.file_prefix)
    }
}

/// Generate an image for `payload` in `destination_dir` and return its path.
pub fn generate(payload: &Payload, destination_dir: &Path) -> Result<PathBuf> {
    generate_named(payload, destination_dir, DEFAULT_FILE_PREFIX)
}

fn generate_named(payload: &Payload, destination_dir: &Path, prefix: &str) -> Result<PathBuf> {
    let content = payload.encoded_content()?;
    let code_type = payload.code_type();

    // Render before touching the filesystem
    let img = match payload {
        Payload::Barcode(_) => barcode::render(&content)?,
        _ => qr::render(&content)?,
    };

    std::fs::create_dir_all(destination_dir)?;
    let output_path = destination_dir.join(unique_file_name(prefix, code_type));
    let tmp_path = output_path.with_extension(format!("tmp.{}", IMAGE_EXTENSION));

    if let Err(e) = img.save(&tmp_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    if let Err(e) = std::fs::rename(&tmp_path, &output_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    log::debug!("Generated {} image {}", code_type, output_path.display());
    Ok(output_path)
}
