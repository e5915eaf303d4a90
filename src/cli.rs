// Code Manager CLI binary

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use anyhow::Result;

use code_manager_lib::admin::{self, DropConfirmation};
use code_manager_lib::config::{self, Configuration, CONFIG_KEYS};
use code_manager_lib::db::{self, CodeFilter, CodeType, GeneratedCode};
use code_manager_lib::generate::{Payload, WifiAuth, WifiCredentials};
use code_manager_lib::printing;
use code_manager_lib::tools::Tool;
use code_manager_lib::{open_manager, CodeGenerator};

#[derive(Parser)]
#[command(name = "codeman")]
#[command(about = "Code Manager - QR code and barcode generator with history", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change connection settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Check that the database is reachable with the current settings
    TestConnection,

    /// Create the database and tables if they don't exist
    Setup,

    /// Generate a code and record it
    Create {
        /// File name prefix for the image
        #[arg(short, long)]
        name: Option<String>,
        #[command(subcommand)]
        kind: CodeKind,
    },

    /// List generated codes
    List {
        /// Only this type (QR_TEXT, QR_LINK, QR_WIFI, BAR128)
        #[arg(short = 't', long = "type")]
        code_type: Option<String>,
        /// Only codes whose data contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Maximum codes to show
        #[arg(long)]
        limit: Option<i64>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one generated code
    Show {
        id: i64,
    },

    /// Regenerate a code with new content of the same type
    Update {
        id: i64,
        #[command(subcommand)]
        kind: CodeKind,
    },

    /// Delete a code and its image
    Delete {
        id: i64,
        /// Keep the image file on disk
        #[arg(long)]
        keep_file: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy a code's image to another location
    Export {
        id: i64,
        /// Target file or directory
        destination: PathBuf,
    },

    /// Send a code's image to the printer
    Print {
        id: i64,
        /// Printer name (default printer if omitted)
        #[arg(short, long)]
        printer: Option<String>,
    },

    /// List installed printers
    Printers,

    /// Back up the database
    Backup {
        /// Output file (defaults to code_manager_backup_<timestamp>.sql)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Permanently delete the database and all generated images
    Drop {
        /// Database name, to confirm without prompting
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Record and manage scanned codes
    Scan {
        #[command(subcommand)]
        action: ScanAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show,
    /// Change one setting
    Set { key: String, value: String },
    /// Print the settings file location
    Path,
}

#[derive(Subcommand, Clone)]
enum CodeKind {
    /// QR code with plain text
    Text { text: String },
    /// QR code with a web link
    Link { url: String },
    /// QR code that joins a Wi-Fi network
    Wifi {
        ssid: String,
        #[arg(short, long, default_value = "")]
        password: String,
        /// WPA/WPA2, WEP or None
        #[arg(short, long, default_value = "WPA/WPA2")]
        auth: String,
        #[arg(long)]
        hidden: bool,
    },
    /// Code 128 barcode
    Barcode { data: String },
}

#[derive(Subcommand)]
enum ScanAction {
    /// Record decoded content from a scan
    Add { content: String },
    /// List recorded scans
    List,
    /// Delete a recorded scan
    Delete { id: i64 },
}

impl CodeKind {
    fn into_payload(self) -> Result<Payload> {
        let payload = match self {
            CodeKind::Text { text } => Payload::Text(text),
            CodeKind::Link { url } => Payload::Link(url),
            CodeKind::Wifi { ssid, password, auth, hidden } => Payload::Wifi(WifiCredentials {
                ssid,
                password,
                auth: WifiAuth::parse(&auth)?,
                hidden,
            }),
            CodeKind::Barcode { data } => Payload::Barcode(data),
        };
        Ok(payload)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let config = config::load(&config_path)?;

    match cli.command {
        Commands::Settings { action } => cmd_settings(&config_path, config, action),
        Commands::TestConnection => cmd_test_connection(&config),
        Commands::Setup => cmd_setup(&config),
        Commands::Create { name, kind } => cmd_create(&config, name, kind),
        Commands::List { code_type, search, limit, json } => cmd_list(&config, code_type, search, limit, json),
        Commands::Show { id } => cmd_show(&config, id),
        Commands::Update { id, kind } => cmd_update(&config, id, kind),
        Commands::Delete { id, keep_file, yes } => cmd_delete(&config, id, keep_file, yes),
        Commands::Export { id, destination } => cmd_export(&config, id, destination),
        Commands::Print { id, printer } => cmd_print(&config, id, printer),
        Commands::Printers => cmd_printers(),
        Commands::Backup { output } => cmd_backup(&config, output),
        Commands::Drop { confirm } => cmd_drop(&config, confirm),
        Commands::Scan { action } => cmd_scan(&config, action),
    }
}

/// Ask a question on stdin; returns the trimmed answer.
fn prompt(question: &str) -> Result<String> {
    print!("{} ", question);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_code(code: &GeneratedCode) {
    println!("Code #{}", code.id);
    println!();
    println!("Type:        {}", code.code_type);
    println!("Data:        {}", code.data_snippet);
    println!("File:        {}", code.file_path);
    println!("Created:     {}", code.created_at);
    if !Path::new(&code.file_path).exists() {
        println!();
        println!("Warning: image file is missing");
    }
}

fn cmd_settings(path: &Path, mut config: Configuration, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            for key in CONFIG_KEYS {
                println!("{:<12} {}", key, config.get(key).unwrap_or_default());
            }
        }
        SettingsAction::Set { key, value } => {
            config.set(&key, &value)?;
            config::save(path, &config)?;
            println!("Saved {} to {}", key, path.display());
        }
        SettingsAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn cmd_test_connection(config: &Configuration) -> Result<()> {
    db::test_connection(config)?;
    println!("Connected to {} ({}) as {}", config.host, config.driver.as_str(), config.user);
    Ok(())
}

fn cmd_setup(config: &Configuration) -> Result<()> {
    db::open_and_setup(config)?;
    std::fs::create_dir_all(&config.output_dir)?;
    println!("Database '{}' and tables are ready", config.database);
    println!("Images will be written to {}", config.output_dir.display());
    Ok(())
}

fn cmd_create(config: &Configuration, name: Option<String>, kind: CodeKind) -> Result<()> {
    let payload = kind.into_payload()?;
    let store = db::open_and_setup(config)?;
    let mut generator = CodeGenerator::new(config.output_dir.clone());
    if let Some(ref name) = name {
        generator = generator.with_prefix(name);
    }
    let mut manager = code_manager_lib::RecordManager::new(store, generator);

    let code = manager.create(&payload)?;
    println!("Saved {} as record #{}", code.code_type, code.id);
    println!("  {}", code.file_path);
    Ok(())
}

fn cmd_list(
    config: &Configuration,
    code_type: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let filter = CodeFilter {
        code_type: code_type.as_deref().map(CodeType::parse).transpose()?,
        contains: search,
        limit,
    };
    let mut manager = open_manager(config)?;
    let codes = manager.list(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&codes)?);
        return Ok(());
    }

    if codes.is_empty() {
        println!("No codes found. Use 'codeman create' to generate one.");
        return Ok(());
    }

    println!("{:>5}  {:>8}  {:>19}  {}", "ID", "Type", "Created", "Data");
    println!("{}", "-".repeat(70));
    for code in &codes {
        let data: String = if code.data_snippet.chars().count() > 30 {
            format!("{}...", code.data_snippet.chars().take(27).collect::<String>())
        } else {
            code.data_snippet.clone()
        };
        println!("{:>5}  {:>8}  {:>19}  {}", code.id, code.code_type, code.created_at, data);
    }
    Ok(())
}

fn cmd_show(config: &Configuration, id: i64) -> Result<()> {
    let mut manager = open_manager(config)?;
    let code = manager.get(id)?;
    print_code(&code);
    Ok(())
}

fn cmd_update(config: &Configuration, id: i64, kind: CodeKind) -> Result<()> {
    let payload = kind.into_payload()?;
    let mut manager = open_manager(config)?;
    let code = manager.update(id, &payload)?;
    println!("Code #{} regenerated", code.id);
    println!("  {}", code.file_path);
    Ok(())
}

fn cmd_delete(config: &Configuration, id: i64, keep_file: bool, yes: bool) -> Result<()> {
    let mut manager = open_manager(config)?;
    let code = manager.get(id)?;

    if !yes {
        let answer = prompt(&format!("Permanently delete record #{} ({})? [y/N]", id, code.data_snippet))?;
        if !answer.eq_ignore_ascii_case("y") && !answer.eq_ignore_ascii_case("yes") {
            println!("Nothing deleted");
            return Ok(());
        }
    }

    manager.delete_with(id, !keep_file)?;
    println!("Deleted record #{}", id);
    Ok(())
}

fn cmd_export(config: &Configuration, id: i64, destination: PathBuf) -> Result<()> {
    let mut manager = open_manager(config)?;
    let code = manager.get(id)?;
    let target = printing::export_to(Path::new(&code.file_path), &destination)?;
    println!("Exported to {}", target.display());
    Ok(())
}

fn cmd_print(config: &Configuration, id: i64, printer_name: Option<String>) -> Result<()> {
    let mut manager = open_manager(config)?;
    let code = manager.get(id)?;

    let printer = printing::detect_printer(printer_name);
    printer.print(Path::new(&code.file_path))?;
    println!("Sent record #{} to the printer", id);
    Ok(())
}

fn cmd_printers() -> Result<()> {
    let printer = printing::detect_printer(None);
    let names = printer.printers();
    if names.is_empty() {
        println!("No printers found ({}). The default printer will be used.", printer.name());
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

fn cmd_backup(config: &Configuration, output: Option<PathBuf>) -> Result<()> {
    let destination = match output {
        Some(path) => path,
        None => admin::default_backup_path(&std::env::current_dir()?),
    };
    if config.driver == code_manager_lib::Driver::Mysql && !Tool::Mysqldump.is_available() {
        anyhow::bail!("mysqldump not found. Add it to PATH or set CODEMAN_MYSQLDUMP_PATH.");
    }
    println!("Backing up '{}'...", config.database);
    let written = admin::backup(config, &destination)?;
    println!("Database backed up to {}", written.display());
    Ok(())
}

fn cmd_drop(config: &Configuration, confirm: Option<String>) -> Result<()> {
    let typed = match confirm {
        Some(name) => name,
        None => {
            println!("WARNING: this permanently deletes database '{}' and every generated image.", config.database);
            prompt("Type the database name to confirm:")?
        }
    };

    let mut store = db::open_store(config)?;
    admin::drop_all(store.as_mut(), config, &DropConfirmation::new(typed))?;
    println!("Database '{}' deleted and {} reset", config.database, config.output_dir.display());
    Ok(())
}

fn cmd_scan(config: &Configuration, action: ScanAction) -> Result<()> {
    let mut manager = open_manager(config)?;
    match action {
        ScanAction::Add { content } => {
            let scan = manager.record_scan(&content)?;
            println!("Recorded scan #{} as {}", scan.id, scan.code_type);
        }
        ScanAction::List => {
            let scans = manager.list_scans()?;
            if scans.is_empty() {
                println!("No scans recorded.");
                return Ok(());
            }
            println!("{:>5}  {:>8}  {:>19}  {}", "ID", "Type", "Scanned", "Content");
            println!("{}", "-".repeat(70));
            for scan in scans {
                println!("{:>5}  {:>8}  {:>19}  {}", scan.id, scan.code_type, scan.scanned_at, scan.decoded_content);
            }
        }
        ScanAction::Delete { id } => {
            manager.delete_scan(id)?;
            println!("Deleted scan #{}", id);
        }
    }
    Ok(())
}
