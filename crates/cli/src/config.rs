//! The `branch-scan` configuration file.
//!
//! ```toml
//! api_url = "https://ghe.example.com/api/v3"
//! require_path = "Jenkinsfile"
//!
//! [discovery]
//! build_fork_pr_head = true
//! trust_policy = "contributors"
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use std::path::Path;

use anyhow::Context;
use discovery::DiscoveryConfig;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// GitHub API root; `https://api.github.com` when unset.
    pub api_url: Option<String>,
    /// Only report heads whose tree has this regular file.
    pub require_path: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    pub discovery: DiscoveryConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            require_path: None,
            request_timeout_secs: 30,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.discovery.validate()?;
        Ok(config)
    }
}
