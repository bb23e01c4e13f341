mod cli;
mod signals;

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use plugin_runner::{
    report_findings, report_status, CancellationToken, CapturedOutput, DetailRegistry,
    Invocation, PluginRunner, ReportValidator, RunnerError, SchemaDetails, ValidatorError,
};
use thiserror::Error;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Exit status for `--strict` runs whose plugin failed or printed an invalid report.
const STRICT_FAILURE_CODE: u8 = 3;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error("unable to read details schema {path:?}: {source}")]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("details schema {path:?} is not valid JSON: {source}")]
    SchemaParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed writing report: {0}")]
    Report(#[from] io::Error),
}

impl CliError {
    fn exit_status(&self) -> u8 {
        match self {
            CliError::Runner(RunnerError::Aborted) => 130,
            CliError::Runner(RunnerError::Timeout { .. }) => 124,
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli).await {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            eprintln!("Error running plugin: {err}");
            ExitCode::from(err.exit_status())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries the plugin feed; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();

    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}

async fn run(cli: Cli) -> Result<u8, CliError> {
    let config = cli.runner_config();
    let registry = detail_registry(&cli)?;
    let validator = ReportValidator::for_plugin(cli.plugin_type, &registry)?;

    let token = CancellationToken::new();
    let invocation = Invocation::render(&cli.plugin, cli.runner, &config)?.cancel_token(token.clone());
    signals::install(token);

    debug!(
        plugin = %cli.plugin,
        runner = %cli.runner,
        plugin_type = %cli.plugin_type,
        "starting plugin run"
    );
    let output = PluginRunner::new(config, validator)
        .run_console(&invocation)
        .await?;

    let mut stdout = io::stdout().lock();
    report_status(&mut stdout, output.exit_code)?;
    report_findings(&mut stdout, &output.findings)?;
    stdout.flush()?;

    Ok(exit_status(&output, cli.strict))
}

fn detail_registry(cli: &Cli) -> Result<DetailRegistry, CliError> {
    let registry = DetailRegistry::default();
    let Some(path) = &cli.details_schema else {
        return Ok(registry);
    };

    let bytes = fs::read(path).map_err(|source| CliError::SchemaRead {
        path: path.clone(),
        source,
    })?;
    let schema = serde_json::from_slice(&bytes).map_err(|source| CliError::SchemaParse {
        path: path.clone(),
        source,
    })?;
    Ok(registry.register(cli.plugin_type, SchemaDetails::new(&schema)?))
}

/// Completed runs exit 0 unless `--strict` asks for plugin failures and report
/// findings to count against the harness.
fn exit_status(output: &CapturedOutput, strict: bool) -> u8 {
    if strict && !(output.success() && output.report_is_valid()) {
        STRICT_FAILURE_CODE
    } else {
        0
    }
}
