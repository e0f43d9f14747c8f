//! Error types for the discovery domain.
//!
//! Errors are layered by how far they reach:
//!
//! - [`ApiError`] is what the GitHub collaborator reports for one request.
//! - [`ResolveError`] is a failure resolving one pull request. Most are
//!   per-item: the pull request is skipped and the scan continues.
//! - [`ScanError`] aborts the whole scan; no partial result is meaningful.
//! - [`MergeValidationError`] is raised at build time, not discovery time, when
//!   a merge revision cannot be built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::Cancelled;
use crate::revision::CheckoutStrategy;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// A failure reported by a [`crate::GitHubApi`] implementation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ApiError {
    /// The requested resource does not exist (HTTP 404).
    #[error("Not found: {resource}")]
    NotFound {
        /// Description of the resource that was requested.
        resource: String,
    },

    /// The credentials were rejected (HTTP 401).
    #[error("Authentication failed: {message}")]
    Unauthorized {
        /// Message returned by GitHub.
        message: String,
    },

    /// The credentials are valid but lack access (HTTP 403 without rate-limit
    /// exhaustion).
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Message returned by GitHub.
        message: String,
    },

    /// The API rate limit is exhausted.
    #[error("Rate limit exhausted{}", .reset_at.map(|t| format!(" until {t}")).unwrap_or_default())]
    RateLimited {
        /// When the limit resets, if GitHub said so.
        reset_at: Option<Timestamp>,
    },

    /// The request did not complete (connection, TLS, timeout, 5xx).
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The response could not be interpreted.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Description of the decoding problem.
        message: String,
    },
}

impl ApiError {
    /// Convenience constructor for [`ApiError::NotFound`].
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns `true` for [`ApiError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this error must abort the whole scan wherever it
    /// occurs: bad credentials and rate-limit exhaustion.
    pub fn is_scan_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::RateLimited { .. })
    }
}

// ---------------------------------------------------------------------------
// Scan-level errors
// ---------------------------------------------------------------------------

/// Errors that abort a whole discovery scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// GitHub rejected the configured credentials.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Message returned by GitHub.
        message: String,
    },

    /// The repository does not exist or is not visible to the credentials.
    #[error("Repository not found: {repository}")]
    RepositoryNotFound {
        /// The `owner/name` that was requested.
        repository: String,
    },

    /// The API rate limit ran out mid-scan.
    #[error("Rate limit exhausted{}", .reset_at.map(|t| format!(" until {t}")).unwrap_or_default())]
    RateLimitExhausted {
        /// When the limit resets, if known.
        reset_at: Option<Timestamp>,
    },

    /// Branches or pull requests could not be enumerated.
    #[error("Failed to enumerate {what}: {source}")]
    Enumeration {
        /// What was being listed.
        what: &'static str,
        /// The underlying API failure.
        #[source]
        source: ApiError,
    },

    /// The scan was cancelled before it completed. Heads observed before the
    /// cancellation are not a complete result.
    #[error("Scan cancelled before completion")]
    Cancelled,
}

impl ScanError {
    /// Maps a collaborator failure that happened while listing `what`.
    pub fn from_api(what: &'static str, error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized { message } => Self::Authentication { message },
            ApiError::RateLimited { reset_at } => Self::RateLimitExhausted { reset_at },
            source => Self::Enumeration { what, source },
        }
    }
}

impl From<Cancelled> for ScanError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Per-pull-request errors
// ---------------------------------------------------------------------------

/// Failure to resolve one pull request to a revision.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A GitHub request failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The pull request disappeared between listing and resolution.
    #[error("Pull request #{number} no longer exists")]
    PullRequestMissing {
        /// The pull-request number.
        number: u64,
    },

    /// The pull request was closed or merged after it was listed.
    #[error("Pull request #{number} has been closed")]
    PullRequestClosed {
        /// The pull-request number.
        number: u64,
    },

    /// The target branch was deleted or renamed mid-scan.
    #[error("Target branch '{branch}' no longer exists")]
    BaseBranchMissing {
        /// The target branch name.
        branch: String,
    },

    /// The fork holding the source branch has been deleted.
    #[error("Source repository of pull request #{number} no longer exists")]
    SourceRepositoryMissing {
        /// The pull-request number.
        number: u64,
    },

    /// The pull-request author's account could not be found.
    #[error("Author '{login}' could not be found")]
    AuthorMissing {
        /// The author's login.
        login: String,
    },

    /// The resolved data did not form a valid revision.
    #[error(transparent)]
    Revision(#[from] RevisionError),

    /// The scan was cancelled while this pull request was being resolved.
    #[error("Resolution cancelled")]
    Cancelled,
}

impl From<Cancelled> for ResolveError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl ResolveError {
    /// Splits per-item failures from failures that must abort the scan.
    ///
    /// Returns `Ok(reason)` when the pull request should be skipped and the
    /// scan continued, `Err` when the scan must stop.
    pub fn into_skip_reason(self) -> Result<String, ScanError> {
        match self {
            Self::Api(error) if error.is_scan_fatal() => {
                Err(ScanError::from_api("pull request details", error))
            }
            Self::Cancelled => Err(ScanError::Cancelled),
            other => Ok(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Build-time validation
// ---------------------------------------------------------------------------

/// A merge revision that must not be built.
///
/// Both variants render with a leading `"Not mergeable"` so build logs read
/// the same, while callers can still tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeValidationError {
    /// GitHub reported that the pull request conflicts with its target.
    #[error("Not mergeable: {head} cannot be merged into {target}")]
    NotMergeable {
        /// Name of the pull-request head (e.g. `PR-3`).
        head: String,
        /// Target branch name.
        target: String,
    },

    /// GitHub had not finished computing mergeability when the revision was
    /// resolved.
    #[error("Not mergeable: GitHub could not determine whether {head} can be merged into {target}")]
    MergeStateUnknown {
        /// Name of the pull-request head.
        head: String,
        /// Target branch name.
        target: String,
    },
}

/// Invalid construction of a revision value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevisionError {
    /// The revision kind does not match the head's checkout strategy.
    #[error("{head} uses the {actual} strategy but a {expected} revision was requested")]
    StrategyMismatch {
        /// Name of the head.
        head: String,
        /// Strategy the revision kind requires.
        expected: CheckoutStrategy,
        /// Strategy the head was constructed with.
        actual: CheckoutStrategy,
    },
}

/// Invalid discovery configuration. Produced at construction time; an engine
/// never starts with an invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigError {
    /// Description of the configuration problem.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_fatal_errors_are_credentials_and_rate_limits() {
        assert!(ApiError::Unauthorized {
            message: "bad".into()
        }
        .is_scan_fatal());
        assert!(ApiError::RateLimited { reset_at: None }.is_scan_fatal());
        assert!(!ApiError::not_found("user").is_scan_fatal());
        assert!(!ApiError::Forbidden {
            message: "no".into()
        }
        .is_scan_fatal());
    }

    #[test]
    fn per_item_failures_become_skip_reasons() {
        let reason = ResolveError::BaseBranchMissing {
            branch: "master".into(),
        }
        .into_skip_reason()
        .unwrap();
        assert!(reason.contains("master"));

        let reason = ResolveError::Api(ApiError::not_found("commit"))
            .into_skip_reason()
            .unwrap();
        assert!(reason.contains("commit"));
    }

    #[test]
    fn fatal_resolve_errors_escalate() {
        let err = ResolveError::Api(ApiError::RateLimited { reset_at: None })
            .into_skip_reason()
            .unwrap_err();
        assert!(matches!(err, ScanError::RateLimitExhausted { .. }));

        let err = ResolveError::Cancelled.into_skip_reason().unwrap_err();
        assert!(matches!(err, ScanError::Cancelled));
    }

    #[test]
    fn rate_limit_message_includes_reset_time() {
        let reset_at = Timestamp::from_unix_seconds(1_700_000_000);
        let err = ScanError::RateLimitExhausted { reset_at };
        assert_eq!(
            err.to_string(),
            "Rate limit exhausted until 2023-11-14T22:13:20+00:00"
        );
    }
}
