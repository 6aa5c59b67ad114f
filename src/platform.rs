//! Platform detection utilities

use log::debug;
use std::fs;
use std::process::{Command, Stdio};

/// Detect if running in WSL (Windows Subsystem for Linux)
///
/// Checks for WSL-specific indicators in /proc/version and environment variables.
pub fn is_wsl() -> bool {
    if let Ok(contents) = fs::read_to_string("/proc/version") {
        let lower = contents.to_lowercase();
        if lower.contains("microsoft") || lower.contains("wsl") {
            return true;
        }
    }

    std::env::var("WSL_DISTRO_NAME").is_ok()
}

/// Find the first program that runs successfully with its version flag
///
/// Each candidate is `(program, version_arg)`. Returns the program that
/// answered, so backends can spawn it later without searching again.
pub fn find_program(candidates: &[(&str, &str)]) -> Option<String> {
    for (program, version_arg) in candidates {
        let status = Command::new(program)
            .arg(version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => return Some((*program).to_string()),
            Ok(status) => debug!("{} {} exited with {}", program, version_arg, status),
            Err(e) => debug!("{} not runnable: {}", program, e),
        }
    }

    None
}
