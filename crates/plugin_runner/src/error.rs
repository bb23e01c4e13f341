use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Run-level failures. Validation findings are never reported through this type.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unsupported plugin runner: {0:?}")]
    UnsupportedRunner(String),
    #[error("unknown plugin type: {0:?}")]
    UnknownPluginType(String),
    #[error("unable to read arg file {path:?}: {source}")]
    ArgFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to execute plugin (binary={binary:?}): {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for plugin process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("failed reading plugin stdout: {0}")]
    StdoutRead(String),
    #[error("internal error: missing stdout pipe")]
    MissingStdout,
    #[error("internal error: missing stderr pipe")]
    MissingStderr,
    #[error("internal error: join failure: {0}")]
    Join(String),
    #[error("plugin terminated abnormally: {0}")]
    AbnormalExit(String),
    #[error("plugin run aborted")]
    Aborted,
    #[error("plugin timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error(transparent)]
    Validator(#[from] ValidatorError),
}

#[derive(Debug, Error, Clone)]
pub enum ValidatorError {
    #[error("failed to compile JSON Schema: {0}")]
    SchemaCompile(String),
}
