use clap::{Args, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration, read from `LSP_CLIENT_*` environment variables or
/// command-line flags
#[derive(Debug, Clone, PartialEq, Args)]
pub struct Settings {
    /// Workspace root that relative paths resolve against
    #[arg(long, env = "LSP_CLIENT_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,

    /// Seconds to wait for a server response
    #[arg(long, env = "LSP_CLIENT_REQUEST_TIMEOUT", default_value_t = 5.0)]
    pub request_timeout: f64,

    /// Seconds allowed for applying one workspace edit
    #[arg(long, env = "LSP_CLIENT_APPLY_TIMEOUT", default_value_t = 30.0)]
    pub apply_timeout: f64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LSP_CLIENT_LOG_FILTER", default_value = "lsp_client=info")]
    pub log_filter: String,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "LSP_CLIENT_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Parser)]
struct EnvOnly {
    #[command(flatten)]
    settings: Settings,
}

impl Settings {
    /// Read settings from the environment, ignoring the process arguments
    pub fn from_env() -> Result<Self, clap::Error> {
        EnvOnly::try_parse_from(["lsp-client"]).map(|parsed| parsed.settings)
    }

    pub fn request_timeout(&self) -> Duration {
        seconds(self.request_timeout)
    }

    pub fn apply_timeout(&self) -> Duration {
        seconds(self.apply_timeout)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            request_timeout: 5.0,
            apply_timeout: 30.0,
            log_filter: "lsp_client=info".to_string(),
            log_file: None,
        }
    }
}

// Negative or non-finite values fall back to zero
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.workspace, PathBuf::from("."));
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.apply_timeout(), Duration::from_secs(30));
        assert!(settings.log_file.is_none());
    }

    #[test]
    fn test_flags_match_defaults() {
        let parsed = EnvOnly::try_parse_from(["lsp-client", "--apply-timeout", "2.5"])
            .unwrap()
            .settings;

        assert_eq!(parsed.apply_timeout(), Duration::from_millis(2500));
        assert_eq!(parsed.log_filter, "lsp_client=info");
    }

    #[test]
    fn test_invalid_timeout_is_zero() {
        let settings = Settings {
            request_timeout: -1.0,
            ..Settings::default()
        };

        assert_eq!(settings.request_timeout(), Duration::ZERO);
    }
}
