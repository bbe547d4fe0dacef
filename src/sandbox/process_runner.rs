use std::io::{self, Write};
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use serde::Deserialize;
use serde_json::Value;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::SetupError;
use crate::language::Language;
use crate::model::{CaseResult, TestCase};

use super::templates::{self, RESULT_MARKER};
use super::{Budget, SandboxRunner, block_on};

/// How an interpreter is launched on a harness file
#[derive(Debug, Clone, Copy)]
struct Profile {
    binary: &'static str,
    suffix: &'static str,
    /// Cap the address space of the child (Python has no heap flag)
    limit_address_space: bool,
}

impl Profile {
    fn for_language(language: Language) -> Option<Self> {
        match language {
            Language::Python => Some(Self {
                binary: "python3",
                suffix: ".py",
                limit_address_space: true,
            }),
            Language::JavaScript => Some(Self {
                binary: "node",
                suffix: ".js",
                limit_address_space: false,
            }),
            _ => None,
        }
    }

    fn args(&self, budget: &Budget) -> Vec<String> {
        if self.limit_address_space {
            // Isolated mode: ignore PYTHON* variables and the user site directory
            vec!["-I".to_string()]
        } else {
            let megabytes = (budget.memory_limit / (1024 * 1024)).max(16);
            vec![format!("--max-old-space-size={megabytes}")]
        }
    }
}

/// Runs Python and JavaScript submissions in a child process
///
/// The user's code is written, together with a generated test runner, to a
/// uniquely named temporary file that is removed on every exit path. The child
/// gets its own process group so a timeout kills everything it spawned.
pub struct ProcessRunner {
    language: Language,
    profile: Profile,
}

struct ProcessOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: ExitStatus,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum HarnessPayload {
    Failure { harness_error: String },
    Records(Vec<HarnessRecord>),
}

#[derive(Deserialize, Debug)]
struct HarnessRecord {
    index: usize,
    #[serde(default)]
    actual: Value,
    #[serde(default)]
    error: Option<String>,
}

impl SandboxRunner for ProcessRunner {
    fn language(&self) -> Language {
        self.language
    }

    fn name(&self) -> &'static str {
        self.profile.binary
    }

    fn run(
        &self,
        code: &str,
        cases: &[TestCase],
        budget: &Budget,
    ) -> Result<Vec<CaseResult>, SetupError> {
        let source = templates::render(self.language, code, cases)?;
        // Deleted when dropped, whichever way this function returns
        let script = self.write_harness_file(&source)?;

        let output = block_on(self.execute(&script, budget))??;
        log::debug!(
            "{} exited with {}, {} bytes of stdout",
            self.profile.binary,
            output.status,
            output.stdout.len()
        );

        collect_results(output, cases, budget)
    }
}

impl ProcessRunner {
    pub fn new(language: Language) -> Option<Self> {
        Profile::for_language(language).map(|profile| Self { language, profile })
    }

    fn write_harness_file(&self, source: &str) -> Result<TempPath, SetupError> {
        let create = || -> io::Result<TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix("harness-")
                .suffix(self.profile.suffix)
                .tempfile()?;
            file.write_all(source.as_bytes())?;
            file.flush()?;
            Ok(file.into_temp_path())
        };
        create().map_err(|e| {
            SetupError::Infrastructure(format!("could not create harness file: {e}"))
        })
    }

    async fn execute(&self, script: &Path, budget: &Budget) -> Result<ProcessOutput, SetupError> {
        let mut command = Command::new(self.profile.binary);
        command
            .args(self.profile.args(budget))
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            command.process_group(0);
            if self.profile.limit_address_space {
                limit_address_space(&mut command, budget.memory_limit);
            }
        }
        #[cfg(not(unix))]
        {
            if self.profile.limit_address_space {
                log::warn!("Memory limit is not enforced for {} on this platform", self.language);
            }
        }

        let mut child = command.spawn().map_err(|e| {
            SetupError::Infrastructure(format!("could not start {}: {e}", self.profile.binary))
        })?;
        // Whatever the submission left running dies with this guard
        let group = ProcessGroup(child.id());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = budget.max_output_bytes;

        let outcome = timeout(budget.run, async {
            let (stdout, stderr, status) = tokio::join!(
                read_bounded(stdout, limit),
                read_bounded(stderr, limit),
                child.wait()
            );
            io::Result::Ok(ProcessOutput {
                stdout: stdout?,
                stderr: stderr?,
                status: status?,
            })
        })
        .await;

        match outcome {
            Ok(output) => output.map_err(|e| {
                SetupError::Infrastructure(format!("lost contact with {}: {e}", self.profile.binary))
            }),
            Err(_) => {
                log::warn!(
                    "{} exceeded {}ms, killing process group",
                    self.profile.binary,
                    budget.run.as_millis()
                );
                terminate(&mut child, &group).await;
                Err(SetupError::TimeLimit(budget.run))
            }
        }
    }
}

#[cfg(unix)]
fn limit_address_space(command: &mut Command, bytes: u64) {
    let rlim = libc::rlim_t::try_from(bytes).unwrap_or(libc::RLIM_INFINITY);
    let limit = libc::rlimit {
        rlim_cur: rlim,
        rlim_max: rlim,
    };
    let apply = move || {
        // SAFETY: setrlimit only reads `limit` and is async-signal-safe
        if unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    };
    // SAFETY: the hook runs between fork and exec and performs a single syscall
    unsafe {
        command.pre_exec(apply);
    }
}

/// The process group led by a spawned child; every member is killed on drop
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn kill(&self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.0.and_then(|p| libc::pid_t::try_from(p).ok()) {
                // SAFETY: plain syscall on a group this runner created, ESRCH once it is empty
                unsafe {
                    libc::killpg(pgid, libc::SIGKILL);
                }
            }
        }
        #[cfg(not(unix))]
        let _ = self.0;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kills the child's whole process group, then reaps the child
async fn terminate(child: &mut Child, group: &ProcessGroup) {
    group.kill();
    if let Err(e) = child.kill().await {
        log::warn!("Failed to reap timed out child: {e}");
    }
}

/// Reads up to `limit` bytes, then drains the rest so the child never blocks on a full pipe
async fn read_bounded<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> io::Result<Vec<u8>> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut captured = Vec::new();
    (&mut reader)
        .take(limit as u64)
        .read_to_end(&mut captured)
        .await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(captured)
}

/// The payload on the last marker line of stdout, if any
fn extract_payload(stdout: &str) -> Option<Result<HarnessPayload, serde_json::Error>> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
        .map(serde_json::from_str)
}

fn diagnostic(stderr: &[u8], max_chars: usize, status: ExitStatus) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        format!("process exited with {status} and no output")
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn collect_results(
    output: ProcessOutput,
    cases: &[TestCase],
    budget: &Budget,
) -> Result<Vec<CaseResult>, SetupError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let payload = extract_payload(&stdout);
    let runtime_error =
        || SetupError::Runtime(diagnostic(&output.stderr, budget.max_diagnostic_chars, output.status));

    match payload {
        Some(Ok(HarnessPayload::Failure { harness_error })) => Err(SetupError::Harness(harness_error)),
        _ if !output.status.success() => Err(runtime_error()),
        Some(Ok(HarnessPayload::Records(records))) => build_case_results(records, cases),
        Some(Err(e)) => Err(SetupError::MalformedOutput(e.to_string())),
        None if !output.stderr.is_empty() => Err(runtime_error()),
        None => Err(SetupError::MalformedOutput(
            "no result line on stdout".to_string(),
        )),
    }
}

fn build_case_results(
    records: Vec<HarnessRecord>,
    cases: &[TestCase],
) -> Result<Vec<CaseResult>, SetupError> {
    if records.len() != cases.len() {
        return Err(SetupError::MalformedOutput(format!(
            "expected {} results, got {}",
            cases.len(),
            records.len()
        )));
    }

    cases
        .iter()
        .zip(records)
        .enumerate()
        .map(|(i, (case, record))| {
            let index = i + 1;
            if record.index != index {
                return Err(SetupError::MalformedOutput(format!(
                    "result {index} is labelled {}",
                    record.index
                )));
            }
            Ok(match record.error {
                Some(message) => CaseResult::errored(index, case, message),
                None => CaseResult::evaluated(index, case, &record.actual),
            })
        })
        .collect()
}
