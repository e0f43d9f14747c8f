//! Branch and pull-request discovery for GitHub repositories.
//!
//! This crate decides which heads of a repository are worth building and
//! pins each to an exact revision. Pull requests may be built as the merge
//! of their source into their target; because GitHub computes that merge
//! asynchronously, resolution waits a bounded time for the merge state to
//! settle and records it as unknown otherwise.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no HTTP itself.
//! It defines the [`GitHubApi`] port; the `github` crate supplies the REST
//! implementation and `testing::InMemoryGitHub` an in-memory one.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`BranchName`, `CommitSha`, `RepositoryId`, etc.) |
//! | [`types`] | Shared value types (`Timestamp`) |
//! | [`errors`] | API, scan, resolution and validation errors |
//! | [`revision`] | Heads, revisions and the tri-state merge hash |
//! | [`retry`] | Bounded, cancellable polling |
//! | [`api`] | The `GitHubApi` port and its data types |
//! | [`trust`] | Fork trust policies |
//! | [`criteria`] | Caller-supplied head filters and source probes |
//! | [`observer`] | Receivers of discovered heads |
//! | [`merge`] | Merge-commit resolution |
//! | [`config`] | Discovery options |
//! | [`engine`] | The scan itself |
//! | `testing` | In-memory `GitHubApi` for tests (`testing` feature) |

pub mod api;
pub mod config;
pub mod criteria;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod merge;
pub mod observer;
pub mod retry;
pub mod revision;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trust;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use api::{
    BranchRef, Commit, GitHubApi, PathType, PermissionLevel, PullRequest, PullRequestState,
    RepositoryInfo, SourceRepository, User,
};
pub use config::DiscoveryConfig;
pub use criteria::{AcceptAll, ApiProbe, HeadCriteria, PathCriteria, SourceProbe};
pub use engine::{DiscoveryEngine, ScanEvent, ScanSummary, SkippedHead};
pub use errors::{
    ApiError, ConfigError, MergeValidationError, ResolveError, RevisionError, ScanError,
};
pub use identifiers::{
    BranchName, CommitSha, Login, OwnerName, PullRequestNumber, RepositoryId, RepositoryName,
    ScanId,
};
pub use merge::MergeCommitResolver;
pub use observer::{Collector, HeadObserver, Limited};
pub use retry::{poll_until_settled, Cancelled, Convergence, Observation, PollBudget};
pub use revision::{
    BranchHead, BranchRevision, CheckoutStrategy, Contributor, Head, HeadOrigin, MergeHash,
    PullRequestHead, PullRequestRevision, PullRequestSource, Revision,
};
pub use trust::{TrustDecision, TrustEvaluator, TrustPolicy, TrustSubject};
pub use types::Timestamp;
