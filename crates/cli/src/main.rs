//! `branch-scan`: discover buildable branches and pull requests of a GitHub
//! repository.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: command-line flags over an optional TOML file
//!    (see [`config`]).
//! 2. **Wire observability**: `tracing-subscriber` on stderr, plus an
//!    OpenTelemetry OTLP exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Construct infrastructure**: a [`github::RestClient`] injected into a
//!    [`discovery::DiscoveryEngine`].
//! 4. **Scan**: print one JSON line per discovered head on stdout, stopping
//!    cleanly on Ctrl-C or when `--timeout-secs` elapses.
//!
//! Exit status is 0 on success, 1 on failure and 130 when the scan was
//! cancelled.

mod config;
mod observability;
mod output;

use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use discovery::{
    AcceptAll, DiscoveryEngine, HeadCriteria, PathCriteria, RepositoryId, ScanError, ScanEvent,
    ScanSummary,
};
use github::{RestClient, DEFAULT_API_URL};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CliConfig;
use crate::observability::LogFormat;
use crate::output::JsonLines;

#[derive(Debug, Parser)]
#[command(
    name = "branch-scan",
    version,
    about = "Discover buildable branches and pull requests of a GitHub repository"
)]
struct Args {
    /// Repository to scan, as `owner/name`.
    #[arg(long, short)]
    repository: String,

    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// GitHub API root. Overrides `api_url` in the configuration file.
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,

    /// GitHub token. Anonymous access is heavily rate limited.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Abandon the scan after this many seconds.
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    /// Log format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Only report heads whose tree has this file, e.g. `Jenkinsfile`.
    #[arg(long)]
    require_path: Option<String>,

    /// Limit the scan to the named heads (`master`, `PR-2`). Repeatable.
    #[arg(long = "head", value_name = "NAME")]
    heads: Vec<String>,

    /// Print the repository metadata as the first line.
    #[arg(long)]
    metadata: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _telemetry = match observability::init(args.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(summary) => {
            for skipped in &summary.skipped {
                warn!(head = %skipped.name, reason = %skipped.reason, "head skipped");
            }
            ExitCode::SUCCESS
        }
        Err(e) if matches!(e.downcast_ref::<ScanError>(), Some(ScanError::Cancelled)) => {
            warn!("scan cancelled");
            ExitCode::from(130)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "branch-scan failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ScanSummary> {
    let repository = RepositoryId::parse(&args.repository)
        .ok_or_else(|| anyhow!("'{}' is not a repository in owner/name form", args.repository))?;

    let config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let api_url = args
        .api_url
        .or(config.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let client = RestClient::new(
        &api_url,
        args.token,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("failed to create GitHub client")?;
    let engine = DiscoveryEngine::new(Arc::new(client), repository, config.discovery)
        .context("invalid discovery configuration")?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    cancel_after(cancel.clone(), Duration::from_secs(args.timeout_secs));

    let criteria: Box<dyn HeadCriteria> = match args.require_path.or(config.require_path) {
        Some(path) => Box::new(PathCriteria::file(path)),
        None => Box::new(AcceptAll),
    };
    let event = (!args.heads.is_empty()).then(|| ScanEvent::for_heads("command line", args.heads));

    let mut output = JsonLines::new(BufWriter::new(std::io::stdout()));
    if args.metadata {
        let metadata = engine.fetch_metadata().await?;
        output
            .write_value(&metadata)
            .context("failed to write repository metadata")?;
    }

    let summary = engine
        .fetch(criteria.as_ref(), &mut output, event.as_ref(), &cancel)
        .await?;
    let written = output.finish().context("failed to write scan results")?;

    info!(
        scan_id = %summary.scan_id,
        heads = written,
        rejected = summary.rejected_by_criteria,
        skipped = summary.skipped.len(),
        "done"
    );
    Ok(summary)
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling scan");
            cancel.cancel();
        }
    });
}

fn cancel_after(cancel: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "scan timed out; cancelling");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from([
            "branch-scan",
            "--repository",
            "cloudbeers/yolo",
            "--require-path",
            "Jenkinsfile",
            "--head",
            "master",
            "--head",
            "PR-2",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.repository, "cloudbeers/yolo");
        assert_eq!(args.require_path.as_deref(), Some("Jenkinsfile"));
        assert_eq!(args.heads, vec!["master", "PR-2"]);
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.timeout_secs, 600);
        assert!(!args.metadata);
    }

    #[test]
    fn repository_is_required() {
        assert!(Args::try_parse_from(["branch-scan"]).is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
