#![forbid(unsafe_code)]
//! Local harness for scanner plugins: launch the plugin, mirror its stdout/stderr
//! live, and validate the JSON report it prints before telling the operator
//! whether it passed.
//!
//! Pipeline:
//! - [`Invocation`] describes the process (program, arguments, cancellation token);
//!   [`Invocation::render`] builds one from a plugin name, a [`RunnerKind`] and the
//!   arg files named in [`RunnerConfig`].
//! - [`PluginRunner::run`] spawns it with no stdin and feeds both output pipes to an
//!   [`OutputMultiplexer`]: two bounded line scanners, one consumer ([`LineSink`]).
//!   Stdout bytes are captured in full for validation.
//! - [`ReportValidator`] checks the captured bytes: UTF-8, JSON, the report shape
//!   (`success`, `truncated`, `details`, `errors`), `truncated == false`, then a
//!   per-[`PluginType`] [`DetailValidator`] for `details`.
//!
//! ```rust,no_run
//! use plugin_runner::{Invocation, PluginRunner, ReportValidator, RunnerConfig};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = PluginRunner::new(RunnerConfig::default(), ReportValidator::new()?);
//! let invocation = Invocation::new("./my-plugin").arg("{}");
//! let output = runner.run_console(&invocation).await?;
//! for finding in &output.findings {
//!     eprintln!("{finding}");
//! }
//! # Ok(()) }
//! ```

mod config;
mod console;
mod error;
mod invocation;
mod multiplex;
mod process;
mod reader;
mod validate;

pub use config::{
    CaptureLimits, RunnerConfig, ARG_ROOT_ENV, DEFAULT_ARG_FILES, DEFAULT_ARG_ROOT,
    DEFAULT_PLUGIN_ROOT, PLUGIN_ROOT_ENV,
};
pub use console::{report_findings, report_status, styled_line, ConsoleSink};
pub use error::{RunnerError, ValidatorError};
pub use invocation::{Invocation, RunnerKind};
pub use multiplex::{
    LineEvent, LineRecord, LineSink, MultiplexOutput, OutputMultiplexer, ScanEnd, ScanOutcome,
    StreamKind,
};
pub use process::{CapturedOutput, PluginRunner};
pub use reader::{AsyncBoundedLineReader, BoundedLine};
pub use validate::{
    AnyDetails, DetailRegistry, DetailValidator, Finding, PluginType, ReportValidator,
    SchemaDetails,
};

pub use tokio_util::sync::CancellationToken;
