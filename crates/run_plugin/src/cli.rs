use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Parser};
use plugin_runner::{PluginType, RunnerConfig, RunnerKind};

#[derive(Debug, Parser)]
#[command(name = "run-plugin")]
#[command(about = "Run a scanner plugin locally and validate the report it prints")]
pub struct Cli {
    /// Plugin name (a directory under the plugin root).
    pub plugin: String,

    /// How the plugin is launched: `core` (python main.py) or `boxed` (plugin.sh).
    pub runner: RunnerKind,

    /// Plugin category, selects the validation applied to `details`.
    #[arg(long, default_value = "inventory")]
    pub plugin_type: PluginType,

    /// JSON Schema file that `details` must satisfy for the selected plugin type.
    #[arg(long, value_name = "FILE")]
    pub details_schema: Option<PathBuf>,

    /// Directory holding the plugin sources [env: PLUGIN_RUNNER_PLUGIN_ROOT].
    #[arg(long, value_name = "DIR")]
    pub plugin_root: Option<PathBuf>,

    /// Directory holding the arg files [env: PLUGIN_RUNNER_ARG_ROOT].
    #[arg(long, value_name = "DIR")]
    pub arg_root: Option<PathBuf>,

    /// Longest accepted output line; output after a longer line is discarded.
    #[arg(long, value_name = "BYTES")]
    pub max_line_bytes: Option<usize>,

    /// Kill the plugin if it runs longer than this.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Exit non-zero when the plugin fails or its report has findings.
    #[arg(long)]
    pub strict: bool,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::from_env();
        if let Some(root) = &self.plugin_root {
            config = config.plugin_root(root);
        }
        if let Some(root) = &self.arg_root {
            config = config.arg_root(root);
        }
        if let Some(max) = self.max_line_bytes {
            config = config.max_line_bytes(max);
        }
        config.timeout(self.timeout.map(Duration::from_secs))
    }
}
