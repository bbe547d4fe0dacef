use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use codeharness::config::{CliArgs, Command, Config, HarnessConfig};
use codeharness::queue::JobQueue;
use codeharness::web_server::build_server;
use codeharness::worker::worker;
use codeharness::{ExecutionReport, Harness, TestCase};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_threads = cli.threads;

    if n_threads == 0 {
        panic!("The number of worker threads must not be 0");
    }

    let Config {
        server: server_config,
        harness: harness_config,
    } = cli.to_config().context("Failed to load configuration")?;

    if let Some(Command::Run {
        source,
        language,
        cases,
    }) = cli.command
    {
        let report = run_once(harness_config, &source, language, &cases).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        std::process::exit(if report.success { 0 } else { 1 });
    }

    let harness = Arc::new(Harness::new(harness_config));
    let job_queue = Arc::new(JobQueue::new());
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_threads {
        workers.spawn(worker(
            i,
            harness.clone(),
            job_queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let server = build_server(server_config, job_queue).context("Failed to build server")?;

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Broadcast shutdown signal to workers
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    // 3. Wait until every worker terminates
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                log::error!("Worker handle panicked: {:?}", e);
            } else {
                log::error!("Worker handle finished with error: {:?}", e);
            }
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Executes a single submission read from disk
async fn run_once(
    config: HarnessConfig,
    source: &Path,
    language: String,
    cases: &Path,
) -> anyhow::Result<ExecutionReport> {
    let code = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let file = std::fs::File::open(cases)
        .with_context(|| format!("Failed to open {}", cases.display()))?;
    let cases: Vec<TestCase> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse test cases in {}", cases.display()))?;

    let harness = Harness::new(config);
    let report =
        tokio::task::spawn_blocking(move || harness.execute(&code, &language, &cases)).await?;
    Ok(report)
}
