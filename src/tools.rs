// External programs the app shells out to
//
// A tool is looked up in order: CODEMAN_<TOOL>_PATH, the executable's own
// directory, then PATH.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Mysqldump,
    Lpr,
    Lpstat,
    Powershell,
}

impl Tool {
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::Mysqldump => "mysqldump",
            Tool::Lpr => "lpr",
            Tool::Lpstat => "lpstat",
            Tool::Powershell => "powershell",
        }
    }

    pub fn env_key(&self) -> &'static str {
        match self {
            Tool::Mysqldump => "CODEMAN_MYSQLDUMP_PATH",
            Tool::Lpr => "CODEMAN_LPR_PATH",
            Tool::Lpstat => "CODEMAN_LPSTAT_PATH",
            Tool::Powershell => "CODEMAN_POWERSHELL_PATH",
        }
    }

    /// Harmless argument used to check that the binary starts.
    fn version_arg(&self) -> &'static str {
        match self {
            Tool::Mysqldump => "--version",
            Tool::Lpr => "-V",
            Tool::Lpstat => "-r",
            Tool::Powershell => "-Help",
        }
    }

    pub fn path(&self) -> PathBuf {
        let override_path = env::var_os(self.env_key()).map(PathBuf::from);
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        locate(self.binary_name(), override_path, exe_dir.as_deref())
    }

    /// True if the resolved binary exists or can be spawned from PATH.
    pub fn is_available(&self) -> bool {
        let path = self.path();
        path.is_file()
            || Command::new(&path)
                .arg(self.version_arg())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
    }
}

fn locate(name: &str, override_path: Option<PathBuf>, exe_dir: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| p.is_file()) {
        return path;
    }

    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };
    exe_dir
        .map(|dir| dir.join(&file_name))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}
