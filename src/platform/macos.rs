use std::time::Duration;

use crate::core::OsInfo;
use crate::platform::run_command;

pub fn os_info(timeout: Duration) -> OsInfo {
    let version = match run_command("sw_vers", &["-productVersion"], timeout) {
        Ok(output) if output.success() => output.stdout.trim().to_string(),
        _ => "unknown".to_string(),
    };
    OsInfo {
        name: "macOS".to_string(),
        version,
    }
}
