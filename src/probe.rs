use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{ProbeError, SetupError};
use crate::language::Toolchain;

/// Runs the toolchain's version check and returns the first line it printed
///
/// Checked fresh on every execution; nothing is cached between calls.
pub async fn probe(toolchain: &Toolchain, budget: Duration) -> Result<String, ProbeError> {
    let child = Command::new(toolchain.binary)
        .arg(toolchain.version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ProbeError::NotFound(toolchain.binary.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    // Dropping the future on timeout kills the child
    let output = match timeout(budget, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(ProbeError::Timeout {
                binary: toolchain.binary.to_string(),
                timeout: budget,
            });
        }
    };

    if !output.status.success() {
        return Err(ProbeError::Unresponsive {
            binary: toolchain.binary.to_string(),
            status: output.status.to_string(),
        });
    }

    // Some toolchains (javac) report their version on stderr
    let version = [&output.stdout, &output.stderr]
        .into_iter()
        .flat_map(|bytes| {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        })
        .next()
        .unwrap_or_default();

    Ok(version)
}

/// Maps a failed probe to the setup error shown to the user
pub fn setup_error(toolchain: &Toolchain, error: ProbeError) -> SetupError {
    match error {
        ProbeError::Io(e) => SetupError::Infrastructure(format!(
            "could not probe {}: {e}",
            toolchain.name
        )),
        other => SetupError::MissingToolchain {
            toolchain: toolchain.name.to_string(),
            reason: other.to_string(),
            hint: toolchain.hint.to_string(),
        },
    }
}
