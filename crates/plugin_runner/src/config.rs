use std::{path::PathBuf, time::Duration};

pub const DEFAULT_PLUGIN_ROOT: &str = "/srv/engine/plugins";
pub const DEFAULT_ARG_ROOT: &str = "/opt/artemis-run-plugin";
pub const DEFAULT_ARG_FILES: [&str; 3] = ["engine-vars.json", "images.json", "config.json"];

pub const PLUGIN_ROOT_ENV: &str = "PLUGIN_RUNNER_PLUGIN_ROOT";
pub const ARG_ROOT_ENV: &str = "PLUGIN_RUNNER_ARG_ROOT";

/// Buffer sizing for the output multiplexer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CaptureLimits {
    /// Starting capacity of each scanner's line buffer.
    pub initial_line_bytes: usize,
    /// A line longer than this terminates the stream it came from.
    pub max_line_bytes: usize,
    /// Starting capacity of the captured stdout buffer. Growth is unbounded.
    pub output_capacity: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            initial_line_bytes: 64 * 1024,
            max_line_bytes: 128 * 1024 * 1024,
            output_capacity: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub plugin_root: PathBuf,
    pub arg_root: PathBuf,
    pub arg_files: Vec<String>,
    pub limits: CaptureLimits,
    pub timeout: Option<Duration>,
    /// How long to keep draining streams after the child has been killed.
    pub drain_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            plugin_root: PathBuf::from(DEFAULT_PLUGIN_ROOT),
            arg_root: PathBuf::from(DEFAULT_ARG_ROOT),
            arg_files: DEFAULT_ARG_FILES.iter().map(|s| s.to_string()).collect(),
            limits: CaptureLimits::default(),
            timeout: None,
            drain_grace: Duration::from_secs(2),
        }
    }
}

impl RunnerConfig {
    /// Defaults with the root directories taken from the environment when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env_path(PLUGIN_ROOT_ENV) {
            config.plugin_root = root;
        }
        if let Some(root) = env_path(ARG_ROOT_ENV) {
            config.arg_root = root;
        }
        config
    }

    pub fn plugin_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.plugin_root = root.into();
        self
    }

    pub fn arg_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.arg_root = root.into();
        self
    }

    pub fn arg_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_line_bytes(mut self, max: usize) -> Self {
        self.limits.max_line_bytes = max;
        self.limits.initial_line_bytes = self.limits.initial_line_bytes.min(max);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capture_policy() {
        let limits = CaptureLimits::default();
        assert_eq!(limits.initial_line_bytes, 65_536);
        assert_eq!(limits.max_line_bytes, 134_217_728);
        assert_eq!(limits.output_capacity, 2_097_152);

        let config = RunnerConfig::default();
        assert_eq!(
            config.arg_files,
            vec!["engine-vars.json", "images.json", "config.json"]
        );
        assert!(config.timeout.is_none());
    }

    #[test]
    fn small_max_line_clamps_initial_buffer() {
        let config = RunnerConfig::default().max_line_bytes(16);
        assert_eq!(config.limits.max_line_bytes, 16);
        assert_eq!(config.limits.initial_line_bytes, 16);
    }
}
