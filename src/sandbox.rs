mod process_runner;
mod restricted;
mod runner;
mod script_runner;
mod templates;
mod watchdog;

// Re-export the trait and common types
pub use process_runner::ProcessRunner;
pub use runner::SandboxRunner;
pub use script_runner::ScriptRunner;

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::{ExecutionLimits, Isolation};
use crate::language::{Backend, Language};

/// Resource budget of a single submission
#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    /// Wall-clock allowance for the user code, starting when it starts running
    pub run: Duration,
    /// Allowance for the toolchain version check
    pub probe: Duration,
    pub memory_limit: u64,
    pub max_output_bytes: usize,
    pub max_diagnostic_chars: usize,
}

impl Budget {
    pub fn from_limits(limits: &ExecutionLimits) -> Self {
        Self {
            run: limits.timeout.into(),
            probe: limits.probe_timeout.into(),
            memory_limit: limits.memory_limit.0,
            max_output_bytes: limits.max_output_bytes,
            max_diagnostic_chars: limits.max_diagnostic_chars,
        }
    }

    /// Fits the budget into whatever is left before `deadline`
    ///
    /// When the full probe + run allowance does not fit, both are shortened
    /// proportionally. Returns `None` if the deadline has already passed.
    pub fn until(limits: &ExecutionLimits, deadline: Instant) -> Option<Self> {
        let full = Self::from_limits(limits);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }

        let wanted = full.probe + full.run;
        if remaining >= wanted {
            return Some(full);
        }

        let ratio = remaining.as_secs_f64() / wanted.as_secs_f64();
        let probe = full.probe.mul_f64(ratio);
        Some(Self {
            run: remaining.saturating_sub(probe),
            probe,
            ..full
        })
    }
}

/// Creates the runner bound to `language`, or `None` for languages that are not executable yet
pub fn create_sandbox_runner(
    language: Language,
    isolation: Isolation,
) -> Option<Box<dyn SandboxRunner>> {
    let runner: Box<dyn SandboxRunner> = match language.backend() {
        Backend::InProcess => Box::new(ScriptRunner::new(isolation)),
        Backend::Subprocess => Box::new(ProcessRunner::new(language)?),
        Backend::Pending => return None,
    };
    log::debug!("Created {} for {}", runner.name(), runner.language());
    Some(runner)
}

/// Replaces typographic punctuation that editors and chat tools like to inject
pub fn sanitize_source(code: &str) -> String {
    code.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2014}' | '\u{2013}' => '-',
            other => other,
        })
        .collect()
}

/// Drives a future to completion from synchronous code
///
/// On a multi-threaded tokio runtime the ambient runtime is reused through
/// `block_in_place`. A current-thread runtime cannot block its only thread, so
/// the future then runs on a private runtime in a scoped thread. Outside any
/// runtime a private current-thread runtime is used directly.
pub(crate) fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => thread::scope(|scope| {
            scope
                .spawn(|| block_on_private(future))
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        }),
        Err(_) => block_on_private(future),
    }
}

fn block_on_private<F: Future>(future: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Millisecond;

    #[test]
    fn test_sanitize_source() {
        let code = "fn solution() { \u{201C}a\u{201D} + \u{2018}b\u{2019} } // x \u{2014} y \u{2013} z";
        assert_eq!(
            sanitize_source(code),
            "fn solution() { \"a\" + 'b' } // x - y - z"
        );
    }

    #[test]
    fn test_budget_without_deadline() {
        let budget = Budget::from_limits(&ExecutionLimits::default());
        assert_eq!(budget.run, Duration::from_secs(5));
        assert_eq!(budget.probe, Duration::from_secs(2));
    }

    #[test]
    fn test_budget_shrinks_proportionally() {
        let limits = ExecutionLimits {
            timeout: Millisecond(3000),
            probe_timeout: Millisecond(1000),
            ..ExecutionLimits::default()
        };
        let budget = Budget::until(&limits, Instant::now() + Duration::from_secs(2)).unwrap();
        assert!(budget.probe <= Duration::from_millis(500));
        assert!(budget.probe > Duration::from_millis(400));
        assert!(budget.run + budget.probe <= Duration::from_secs(2));

        let roomy = Budget::until(&limits, Instant::now() + Duration::from_secs(60)).unwrap();
        assert_eq!(roomy, Budget::from_limits(&limits));
    }

    #[test]
    fn test_budget_after_deadline() {
        let limits = ExecutionLimits::default();
        assert!(Budget::until(&limits, Instant::now()).is_none());
    }

    #[test]
    fn test_runner_factory() {
        for language in [Language::Rhai, Language::Python, Language::JavaScript] {
            let runner = create_sandbox_runner(language, Isolation::Restricted).unwrap();
            assert_eq!(runner.language(), language);
        }
        assert!(create_sandbox_runner(Language::Java, Isolation::Restricted).is_none());
    }

    async fn answer() -> u32 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        42
    }

    #[test]
    fn test_block_on_without_runtime() {
        assert_eq!(block_on(answer()).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_block_on_inside_current_thread_runtime() {
        assert_eq!(block_on(answer()).unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_on_inside_multi_thread_runtime() {
        assert_eq!(block_on(answer()).unwrap(), 42);
    }
}
