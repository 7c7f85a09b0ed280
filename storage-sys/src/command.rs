// SPDX-License-Identifier: GPL-3.0-only

//! Running external tools

use std::process::Command;

use tracing::debug;

use crate::{Result, SysError};

/// Fail with [`SysError::ToolMissing`] unless `tool` is on `PATH`
pub fn require_tool(tool: &str) -> Result<()> {
    which::which(tool)
        .map(|_| ())
        .map_err(|_| SysError::ToolMissing(tool.to_string()))
}

/// Run `command` and return its stdout; a non-zero exit becomes [`SysError::CommandFailed`]
pub fn run_capture(command: &str, args: &[&str]) -> Result<String> {
    require_tool(command)?;
    debug!("Running {command} {}", args.join(" "));
    let output = Command::new(command).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(SysError::CommandFailed {
            command: command.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Like [`run_capture`] for commands whose output is not needed
pub fn run(command: &str, args: &[&str]) -> Result<()> {
    run_capture(command, args).map(|_| ())
}

/// First run of ASCII digits in `input`
pub(crate) fn parse_first_u64(input: &str) -> Option<u64> {
    let digits: String = input
        .chars()
        .skip_while(|character| !character.is_ascii_digit())
        .take_while(|character| character.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_by_name() {
        let err = run_capture("storaged-no-such-tool", &[]).unwrap_err();
        assert!(matches!(err, SysError::ToolMissing(tool) if tool == "storaged-no-such-tool"));
    }

    #[test]
    fn first_number_skips_leading_text() {
        assert_eq!(parse_first_u64("FS bytes used 1024"), Some(1024));
        assert_eq!(parse_first_u64("none"), None);
    }
}
