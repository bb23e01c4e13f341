use std::{
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{RunnerConfig, RunnerError};

/// How the plugin entry point is launched.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RunnerKind {
    /// `python <plugin_root>/<plugin>/main.py`, using the interpreter on `PATH`.
    Core,
    /// `<plugin_root>/plugin.sh --quiet -- <plugin>`.
    Boxed,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Core => "core",
            RunnerKind::Boxed => "boxed",
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerKind {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(RunnerKind::Core),
            "boxed" => Ok(RunnerKind::Boxed),
            other => Err(RunnerError::UnsupportedRunner(other.to_string())),
        }
    }
}

/// Immutable description of one plugin run.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    cancel: CancellationToken,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Ties the run to an externally owned token; cancelling it kills the plugin.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Builds the invocation for `plugin` under `kind`, appending the contents of every
    /// configured arg file. Fails before anything is spawned if a file cannot be read.
    pub fn render(plugin: &str, kind: RunnerKind, config: &RunnerConfig) -> Result<Self, RunnerError> {
        let invocation = match kind {
            RunnerKind::Core => Invocation::new("python")
                .arg(config.plugin_root.join(plugin).join("main.py")),
            RunnerKind::Boxed => Invocation::new(config.plugin_root.join("plugin.sh"))
                .args(["--quiet", "--", plugin]),
        };

        let mut extra = Vec::with_capacity(config.arg_files.len());
        for name in &config.arg_files {
            let path = config.arg_root.join(name);
            let bytes = fs::read(&path).map_err(|source| RunnerError::ArgFile {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), bytes = bytes.len(), "loaded arg file");
            extra.push(bytes_to_arg(bytes));
        }

        Ok(invocation.args(extra))
    }
}

#[cfg(unix)]
fn bytes_to_arg(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn bytes_to_arg(bytes: Vec<u8>) -> OsString {
    OsString::from(String::from_utf8_lossy(&bytes).into_owned())
}
