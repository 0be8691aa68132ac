//! Runtime configuration.
//!
//! Settings come from the environment (`KESTREL_*`) with CLI flags taking
//! precedence; clap's `env` attribute handles the layering. Validation
//! happens here so `main` only sees a well-formed [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;
use crate::domain::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    /// Cadence of the snapshot timer.
    pub interval: Duration,
    /// Where the instrument socket is created.
    pub socket_dir: PathBuf,
    /// Optional application id stamped onto snapshots.
    pub app_id: Option<String>,
    /// Suppress banner and summary output.
    pub quiet: bool,
}

impl Config {
    /// Validate parsed arguments, splitting off the supervised command.
    pub fn from_args(args: Args) -> Result<(Self, Vec<String>), ConfigError> {
        if args.command.is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        if args.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let config = Self {
            interval: Duration::from_secs(args.interval),
            socket_dir: args.socket_dir.unwrap_or_else(std::env::temp_dir),
            app_id: args.app_id,
            quiet: args.quiet,
        };
        Ok((config, args.command))
    }

    /// Socket path for this agent instance. The agent pid keeps concurrent
    /// kestrel invocations from colliding.
    #[must_use]
    pub fn socket_path(&self, agent_pid: u32) -> PathBuf {
        self.socket_dir.join(format!("kestrel-{agent_pid}.sock"))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn missing_command_is_a_usage_error() {
        let args = Args::try_parse_from(["kestrel"]).expect("parses");
        assert!(matches!(Config::from_args(args), Err(ConfigError::MissingCommand)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let args = Args::try_parse_from(["kestrel", "--interval", "0", "./app"]).expect("parses");
        assert!(matches!(Config::from_args(args), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn socket_path_includes_agent_pid() {
        let args = Args::try_parse_from(["kestrel", "--socket-dir", "/run/kestrel", "./app"])
            .expect("parses");
        let (config, command) = Config::from_args(args).expect("valid");
        assert_eq!(command, vec!["./app"]);
        assert_eq!(config.socket_path(4242), PathBuf::from("/run/kestrel/kestrel-4242.sock"));
    }
}
