use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_telemetry-hub") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "telemetry-hub.exe"
    } else {
        "telemetry-hub"
    };
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().and_then(Path::parent).map(|dir| dir.join(exe_name)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| panic!("unable to resolve telemetry-hub binary path"))
}

/// Run the binary in `cwd` with JSON output and a clean `TH_*` environment.
pub fn run_cli(cwd: &Path, args: &[&str]) -> CmdResult {
    let mut command = Command::new(resolve_bin_path());
    command
        .args(args)
        .current_dir(cwd)
        .env("TH_OUTPUT_FORMAT", "json")
        .env_remove("RUST_LOG");
    for (key, _) in std::env::vars() {
        if key.starts_with("TH_") && key != "TH_OUTPUT_FORMAT" {
            command.env_remove(key);
        }
    }
    let output = command.output().expect("execute telemetry-hub command");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
