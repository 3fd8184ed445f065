//! kvfault command-line entry point.

mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use kvfault::client::ProxyConnection;
use kvfault::core::{HarnessConfig, HarnessError, TestReport};
use kvfault::harness::{ClientProbe, FailureOrchestrator, RunAborted};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, abort_before_setup, render_report};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "kvfault failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = match (cli.load_config(), &cli.command) {
        (Ok(config), _) => config,
        (Err(e), Command::Failover(_)) => return Err(emit_abort(abort_before_setup(e), cli.json)),
        (Err(e), Command::Probe(_)) => return Err(e).context("invalid configuration"),
    };
    match cli.command {
        Command::Failover(_) => failover(&config, cli.json).await,
        Command::Probe(_) => probe(&config, cli.json).await,
    }
}

async fn failover(config: &HarnessConfig, json: bool) -> anyhow::Result<ExitCode> {
    let controller = match kvfault::platform::from_config(&config.control) {
        Ok(controller) => controller,
        Err(e) => {
            let source = HarnessError::config(e.to_string());
            return Err(emit_abort(abort_before_setup(source), json));
        }
    };

    let conn = match ProxyConnection::connect(&config.proxy).await {
        Ok(conn) => conn,
        Err(e) => return Err(emit_abort(abort_before_setup(e), json)),
    };

    let orchestrator = FailureOrchestrator::new(conn, controller, config.run.clone())
        .with_topology(config.topology.clone());
    match orchestrator.run().await {
        Ok(report) => {
            emit_report(&report, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(aborted) => Err(emit_abort(aborted, json)),
    }
}

async fn probe(config: &HarnessConfig, json: bool) -> anyhow::Result<ExitCode> {
    let conn = ProxyConnection::connect(&config.proxy).await?;
    let report = ClientProbe::new(conn, config.probe.clone()).run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn emit_report(report: &TestReport, json: bool) -> anyhow::Result<()> {
    print!("{}", render_report(report, json)?);
    Ok(())
}

/// Prints the partial report of an aborted run and returns the abort.
fn emit_abort(aborted: RunAborted, json: bool) -> anyhow::Error {
    match emit_report(&aborted.report, json) {
        Ok(()) => aborted.into(),
        Err(e) => e,
    }
}
