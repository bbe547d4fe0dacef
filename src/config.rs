use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "codeharness", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Number of execution workers
    #[arg(long = "threads", short = 't', default_value_t = 4)]
    pub threads: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute one submission and print the report as JSON
    Run {
        /// Source file of the submission
        #[arg(long)]
        source: PathBuf,

        /// Language identifier or alias
        #[arg(long)]
        language: String,

        /// JSON file holding an array of test cases
        #[arg(long)]
        cases: PathBuf,
    },
}

impl CliArgs {
    /// Load the configuration from the specified file, or fall back to defaults
    pub fn to_config(&self) -> std::io::Result<Config> {
        let Some(path) = &self.config_path else {
            return Ok(Config::default());
        };
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

/// Everything an execution needs to know, passed explicitly into the harness
#[derive(Deserialize, Debug, Clone, Default)]
pub struct HarnessConfig {
    #[serde(default)]
    pub isolation: Isolation,
    #[serde(default)]
    pub limits: ExecutionLimits,
}

/// Strength of the in-process interpreter sandbox
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Allow-listed engine, named entry point, deadline and size ceilings
    #[default]
    Restricted,
    /// Full engine and first-public-function discovery, for locally trusted code
    Trusted,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Wall-clock budget for one whole submission
    pub timeout: Millisecond,
    /// Budget for the toolchain version check
    pub probe_timeout: Millisecond,
    pub memory_limit: ByteSize,
    /// Cap on captured stdout/stderr per stream
    pub max_output_bytes: usize,
    /// Cap on characters of stderr surfaced in a setup error
    pub max_diagnostic_chars: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Millisecond(5000),
            probe_timeout: Millisecond(2000),
            memory_limit: ByteSize(128 * 1024 * 1024),
            max_output_bytes: 1024 * 1024,
            max_diagnostic_chars: 1000,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Millisecond(pub u64);

impl From<Millisecond> for Duration {
    fn from(value: Millisecond) -> Self {
        Duration::from_millis(value.0)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let file = std::fs::File::open("data/example.json").unwrap();
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader).unwrap();
        assert_eq!(config.server.bind_address, Some("127.0.0.1".to_string()));
        assert_eq!(config.harness.isolation, Isolation::Restricted);
        assert_eq!(config.harness.limits.timeout, Millisecond(5000));
        assert_eq!(config.harness.limits.probe_timeout, Millisecond(2000));
    }

    #[test]
    fn test_partial_limits_keep_defaults() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{ "isolation": "trusted", "limits": { "timeout": 1000 } }"#,
        )
        .unwrap();
        assert_eq!(config.isolation, Isolation::Trusted);
        assert_eq!(config.limits.timeout, Millisecond(1000));
        assert_eq!(config.limits.max_diagnostic_chars, 1000);
        assert_eq!(Duration::from(config.limits.timeout), Duration::from_secs(1));
    }
}
