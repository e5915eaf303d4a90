// Database row types shared by both drivers

use serde::{Deserialize, Serialize};

use crate::constants::{DATA_SNIPPET_MAX_CHARS, TIMESTAMP_FORMAT};
use crate::error::{CodeManagerError, Result};

// ----- Code type -----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CodeType {
    #[serde(rename = "QR_TEXT")]
    QrText,
    #[serde(rename = "QR_LINK")]
    QrLink,
    #[serde(rename = "QR_WIFI")]
    QrWifi,
    #[serde(rename = "BAR128")]
    Barcode128,
}

impl CodeType {
    pub const ALL: [CodeType; 4] = [
        CodeType::QrText,
        CodeType::QrLink,
        CodeType::QrWifi,
        CodeType::Barcode128,
    ];

    /// Value stored in the `code_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::QrText => "QR_TEXT",
            CodeType::QrLink => "QR_LINK",
            CodeType::QrWifi => "QR_WIFI",
            CodeType::Barcode128 => "BAR128",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CodeManagerError::InvalidContent(format!(
                    "Unknown code type '{}' (expected QR_TEXT, QR_LINK, QR_WIFI or BAR128)",
                    s
                ))
            })
    }

    pub fn is_qr(&self) -> bool {
        !matches!(self, CodeType::Barcode128)
    }
}

impl std::fmt::Display for CodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----- Created codes -----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedCode {
    pub id: i64,
    pub code_type: CodeType,
    pub data_snippet: String,
    pub file_path: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewCode {
    pub code_type: CodeType,
    pub data_snippet: String,
    pub file_path: String,
    pub created_at: String,
}

/// Fields revised when a code is regenerated
#[derive(Debug, Clone)]
pub struct CodeUpdate {
    pub data_snippet: String,
    pub file_path: String,
    pub created_at: String,
}

/// Filter for `list_codes`. Default lists everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct CodeFilter {
    pub code_type: Option<CodeType>,
    pub contains: Option<String>,
    pub limit: Option<i64>,
}

impl CodeFilter {
    /// LIKE pattern for `contains`, escaped with '!' so both drivers agree
    pub fn like_pattern(&self) -> Option<String> {
        self.contains.as_ref().map(|needle| {
            let mut escaped = String::with_capacity(needle.len() + 2);
            escaped.push('%');
            for c in needle.chars() {
                if matches!(c, '!' | '%' | '_') {
                    escaped.push('!');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        })
    }

    /// Trailing LIMIT clause; empty when unbounded
    pub fn limit_clause(&self) -> String {
        match self.limit {
            Some(n) if n >= 0 => format!(" LIMIT {}", n),
            _ => String::new(),
        }
    }
}

// ----- Scanned codes -----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannedCode {
    pub id: i64,
    pub decoded_content: String,
    pub code_type: CodeType,
    pub scanned_at: String,
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub decoded_content: String,
    pub code_type: CodeType,
    pub scanned_at: String,
}

// ----- Helpers -----

/// Representative copy of the encoded content stored with the row.
pub fn data_snippet(content: &str) -> String {
    content.chars().take(DATA_SNIPPET_MAX_CHARS).collect()
}

/// Current local time in the column format.
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
