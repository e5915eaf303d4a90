// Printing and export of generated images
//
// One `Printable` implementation per platform family, chosen once at startup
// from the host OS.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CodeManagerError, Result};
use crate::tools::Tool;

pub trait Printable {
    /// Send a file to the printer.
    fn print(&self, file_path: &Path) -> Result<()>;

    /// Installed printer names, best effort.
    fn printers(&self) -> Vec<String>;

    fn name(&self) -> &'static str;
}

fn require_file(file_path: &Path) -> Result<()> {
    if !file_path.is_file() {
        return Err(CodeManagerError::FileNotFound(file_path.display().to_string()));
    }
    Ok(())
}

fn spawn_error(tool: &str, err: std::io::Error) -> CodeManagerError {
    CodeManagerError::Subprocess {
        tool: tool.to_string(),
        code: None,
        stderr: format!("Could not run {}: {}", tool, err),
    }
}

// ----- CUPS (Linux, macOS, BSD) -----

#[derive(Debug, Clone)]
pub struct CupsPrinter {
    lpr: PathBuf,
    lpstat: PathBuf,
    destination: Option<String>,
}

impl CupsPrinter {
    pub fn new() -> Self {
        Self::with_tools(Tool::Lpr.path(), Tool::Lpstat.path())
    }

    pub fn with_tools(lpr: PathBuf, lpstat: PathBuf) -> Self {
        Self { lpr, lpstat, destination: None }
    }

    /// Print to a named queue instead of the default one.
    pub fn with_destination(mut self, printer: Option<String>) -> Self {
        self.destination = printer.filter(|p| !p.trim().is_empty());
        self
    }
}

impl Default for CupsPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Printer names from `lpstat -p` lines ("printer <name> is idle. ...").
pub fn parse_lpstat(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with("printer "))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|name| name.to_string())
        .collect()
}

impl Printable for CupsPrinter {
    fn print(&self, file_path: &Path) -> Result<()> {
        require_file(file_path)?;

        let mut cmd = Command::new(&self.lpr);
        if let Some(ref printer) = self.destination {
            cmd.args(["-P", printer]);
        }
        cmd.arg(file_path);

        let output = cmd.output().map_err(|e| spawn_error("lpr", e))?;
        if !output.status.success() {
            return Err(CodeManagerError::subprocess("lpr", &output));
        }
        log::info!(
            "Sent {} to {}",
            file_path.display(),
            self.destination.as_deref().unwrap_or("default printer")
        );
        Ok(())
    }

    fn printers(&self) -> Vec<String> {
        match Command::new(&self.lpstat).arg("-p").output() {
            Ok(output) => parse_lpstat(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                log::debug!("lpstat unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "cups"
    }
}

// ----- Windows -----

#[derive(Debug, Clone)]
pub struct WindowsPrinter {
    powershell: PathBuf,
    destination: Option<String>,
}

impl WindowsPrinter {
    pub fn new() -> Self {
        Self { powershell: Tool::Powershell.path(), destination: None }
    }

    /// Print to a named printer (PrintTo verb) instead of the default one.
    pub fn with_destination(mut self, printer: Option<String>) -> Self {
        self.destination = printer.filter(|p| !p.trim().is_empty());
        self
    }

    fn print_script(&self, file_path: &Path) -> String {
        let file = ps_quote(&file_path.display().to_string());
        match self.destination {
            Some(ref printer) => format!(
                "Start-Process -FilePath {} -Verb PrintTo -ArgumentList {}",
                file,
                ps_quote(&format!("\"{}\"", printer))
            ),
            None => format!("Start-Process -FilePath {} -Verb Print", file),
        }
    }
}

impl Default for WindowsPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-quote a value for PowerShell.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Printable for WindowsPrinter {
    fn print(&self, file_path: &Path) -> Result<()> {
        require_file(file_path)?;

        let script = self.print_script(file_path);
        let output = Command::new(&self.powershell)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .map_err(|e| spawn_error("powershell", e))?;
        if !output.status.success() {
            return Err(CodeManagerError::subprocess("powershell", &output));
        }
        log::info!(
            "Sent {} to {}",
            file_path.display(),
            self.destination.as_deref().unwrap_or("the default printer")
        );
        Ok(())
    }

    fn printers(&self) -> Vec<String> {
        Command::new(&self.powershell)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Get-Printer | Select-Object -ExpandProperty Name",
            ])
            .output()
            .map(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        "windows"
    }
}

// ----- Anything else -----

#[derive(Debug, Clone)]
pub struct UnsupportedPrinter {
    os: String,
}

impl Printable for UnsupportedPrinter {
    fn print(&self, _file_path: &Path) -> Result<()> {
        Err(CodeManagerError::UnsupportedPlatform(self.os.clone()))
    }

    fn printers(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "unsupported"
    }
}

/// Pick the print mechanism for an OS name as reported by `std::env::consts::OS`.
/// `destination` names a printer; `None` uses the system default.
pub fn printer_for_os(os: &str, destination: Option<String>) -> Box<dyn Printable> {
    match os {
        "linux" | "macos" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => {
            Box::new(CupsPrinter::new().with_destination(destination))
        }
        "windows" => Box::new(WindowsPrinter::new().with_destination(destination)),
        other => Box::new(UnsupportedPrinter { os: other.to_string() }),
    }
}

/// Print mechanism for the host OS.
pub fn detect_printer(destination: Option<String>) -> Box<dyn Printable> {
    printer_for_os(std::env::consts::OS, destination)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy a generated file. A directory destination keeps the file name.
pub fn export_to(file_path: &Path, destination: &Path) -> Result<PathBuf> {
    require_file(file_path)?;

    let target = if destination.is_dir() {
        match file_path.file_name() {
            Some(name) => destination.join(name),
            None => return Err(CodeManagerError::FileNotFound(file_path.display().to_string())),
        }
    } else {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        destination.to_path_buf()
    };

    // Copying a file onto itself truncates it
    if is_same_file(file_path, &target) {
        return Err(CodeManagerError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is already at the export destination", file_path.display()),
        )));
    }

    std::fs::copy(file_path, &target)?;
    log::info!("Exported {} to {}", file_path.display(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_lpstat() {
        let out = "printer Office_Laser is idle.  enabled since Mon 01 Jan\n\
                   printer Label-Printer disabled since Tue\n\
                   system default destination: Office_Laser\n";
        assert_eq!(parse_lpstat(out), vec!["Office_Laser", "Label-Printer"]);
        assert!(parse_lpstat("no destinations added.").is_empty());
    }

    #[test]
    fn test_printer_for_os() {
        assert_eq!(printer_for_os("linux", None).name(), "cups");
        assert_eq!(printer_for_os("macos", None).name(), "cups");
        assert_eq!(printer_for_os("windows", Some("Label".to_string())).name(), "windows");
        assert_eq!(printer_for_os("haiku", None).name(), "unsupported");
    }

    #[test]
    fn test_unsupported_platform_fails() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.png");
        std::fs::write(&file, b"png").unwrap();
        let err = printer_for_os("haiku", None).print(&file).unwrap_err();
        assert!(matches!(err, CodeManagerError::UnsupportedPlatform(ref os) if os == "haiku"));
    }

    #[test]
    fn test_print_missing_file() {
        let printer = CupsPrinter::with_tools(PathBuf::from("lpr"), PathBuf::from("lpstat"));
        let err = printer.print(Path::new("/no/such/code.png")).unwrap_err();
        assert!(matches!(err, CodeManagerError::FileNotFound(_)));
    }

    #[test]
    fn test_ps_quote() {
        assert_eq!(ps_quote("C:\\codes\\it's.png"), "'C:\\codes\\it''s.png'");
    }

    #[test]
    fn test_export_to_file_and_directory() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("code_QR_TEXT.png");
        std::fs::write(&src, b"png-bytes").unwrap();

        let out_dir = tmp.path().join("exports");
        std::fs::create_dir_all(&out_dir).unwrap();
        let copied = export_to(&src, &out_dir).unwrap();
        assert_eq!(copied, out_dir.join("code_QR_TEXT.png"));
        assert_eq!(std::fs::read(&copied).unwrap(), b"png-bytes");

        let named = export_to(&src, &tmp.path().join("nested").join("label.png")).unwrap();
        assert!(named.exists());
        assert!(src.exists());
    }

    #[test]
    fn test_windows_print_script_names_printer() {
        let file = Path::new("C:\\codes\\code.png");
        let default = WindowsPrinter::new().print_script(file);
        assert!(default.ends_with("-Verb Print"));

        let named = WindowsPrinter::new()
            .with_destination(Some("Office Laser".to_string()))
            .print_script(file);
        assert!(named.contains("-Verb PrintTo"));
        assert!(named.contains("'\"Office Laser\"'"));

        let blank = WindowsPrinter::new().with_destination(Some("  ".to_string()));
        assert!(blank.print_script(file).ends_with("-Verb Print"));
    }

    #[test]
    fn test_export_onto_itself_keeps_source() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("code.png");
        std::fs::write(&src, b"png-bytes").unwrap();

        let into_own_dir = export_to(&src, tmp.path()).unwrap_err();
        assert!(matches!(into_own_dir, CodeManagerError::Io(_)));
        let onto_own_path = export_to(&src, &tmp.path().join(".").join("code.png")).unwrap_err();
        assert!(matches!(onto_own_path, CodeManagerError::Io(_)));

        assert_eq!(std::fs::read(&src).unwrap(), b"png-bytes");
    }

    #[test]
    fn test_export_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = export_to(&tmp.path().join("missing.png"), tmp.path()).unwrap_err();
        assert!(matches!(err, CodeManagerError::FileNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_cups_print_with_fake_lpr() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let log_file = tmp.path().join("lpr.log");
        let lpr = tmp.path().join("fake_lpr.sh");
        std::fs::write(&lpr, format!("#!/bin/sh\necho \"$@\" > '{}'\n", log_file.display())).unwrap();
        std::fs::set_permissions(&lpr, std::fs::Permissions::from_mode(0o755)).unwrap();

        let file = tmp.path().join("code.png");
        std::fs::write(&file, b"png").unwrap();

        let printer = CupsPrinter::with_tools(lpr, PathBuf::from("lpstat"))
            .with_destination(Some("Label-Printer".to_string()));
        printer.print(&file).unwrap();

        let logged = std::fs::read_to_string(&log_file).unwrap();
        assert!(logged.contains("-P Label-Printer"));
        assert!(logged.contains("code.png"));
    }
}
