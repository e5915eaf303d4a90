// Code Manager Constants
// Column sizes and file naming below are part of the on-disk/schema contract.

// Settings
pub const APP_DIR_NAME: &str = "code-manager";
pub const CONFIG_FILENAME: &str = "config.toml";
pub const DEFAULT_DRIVER: &str = "mysql";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_DATABASE: &str = "code_manager_db";
pub const DEFAULT_OUTPUT_DIR: &str = "codes_generated";

// Schema
pub const CREATED_CODES_TABLE: &str = "created_codes";
pub const SCANNED_CODES_TABLE: &str = "scanned_codes";
pub const DATA_SNIPPET_MAX_CHARS: usize = 250;
pub const FILE_PATH_MAX_LEN: usize = 255;

// Time
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// Generated files
pub const DEFAULT_FILE_PREFIX: &str = "code";
pub const IMAGE_EXTENSION: &str = "png";
pub const FILE_SUFFIX_LEN: usize = 8;

// QR rendering
pub const QR_MODULE_PX: u32 = 10;
pub const QR_QUIET_ZONE_MODULES: u32 = 4;

// Code 128 rendering
pub const BARCODE_MODULE_PX: u32 = 2;
pub const BARCODE_HEIGHT_PX: u32 = 120;
pub const BARCODE_QUIET_ZONE_MODULES: u32 = 10;

// Scan type detection
pub const SCAN_BARCODE_MAX_CHARS: usize = 48;

// Backup
pub const BACKUP_FILE_PREFIX: &str = "code_manager_backup";
pub const BACKUP_PARTIAL_SUFFIX: &str = "partial";
pub const BACKUP_POLL_INTERVAL_MS: u64 = 100;
