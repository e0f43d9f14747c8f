//! The discovery engine: one scan over one repository.
//!
//! A scan enumerates branches and open pull requests, applies the configured
//! checkout strategies and trust policy, resolves every surviving head to a
//! revision, filters it through the caller's [`HeadCriteria`] and hands the
//! result to a [`HeadObserver`].
//!
//! ## Emission order
//!
//! Branches first, in listing order, then pull requests in listing order. A
//! pull request offered under both strategies emits its merge head before its
//! head head. Pull requests are resolved concurrently (bounded by
//! [`DiscoveryConfig::max_concurrent_resolutions`]) but emitted in order.
//!
//! ## Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Repository missing, bad credentials, rate limit, listing failure | scan aborts |
//! | Cancellation | scan aborts with [`ScanError::Cancelled`] |
//! | Anything else about one pull request or branch | head skipped, see [`ScanSummary::skipped`] |

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::api::{GitHubApi, PullRequest, RepositoryInfo};
use crate::config::DiscoveryConfig;
use crate::criteria::{ApiProbe, HeadCriteria};
use crate::errors::{ApiError, ConfigError, ResolveError, ScanError};
use crate::identifiers::{BranchName, CommitSha, Login, RepositoryId, ScanId};
use crate::merge::MergeCommitResolver;
use crate::observer::HeadObserver;
use crate::revision::{
    BranchHead, BranchRevision, CheckoutStrategy, Contributor, Head, HeadOrigin,
    PullRequestHead, PullRequestSource, Revision,
};
use crate::trust::{TrustEvaluator, TrustSubject};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Scan inputs and outputs
// ---------------------------------------------------------------------------

/// The event that triggered a scan, narrowing it to a set of head names.
///
/// A scan without an event considers every head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Free-form description for logs, e.g. `"push to master"`.
    pub label: String,
    heads: BTreeSet<String>,
}

impl ScanEvent {
    /// An event concerning only the named heads.
    pub fn for_heads<I, S>(label: impl Into<String>, heads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            heads: heads.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if a head called `name` is in scope.
    pub fn includes(&self, name: &str) -> bool {
        self.heads.contains(name)
    }
}

fn in_scope(event: Option<&ScanEvent>, name: &str) -> bool {
    event.map_or(true, |event| event.includes(name))
}

/// A head that was left out of a scan because of a per-item failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedHead {
    pub name: String,
    pub reason: String,
}

/// What one scan did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: ScanId,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Branch heads handed to the observer.
    pub branches: usize,
    /// Pull-request heads handed to the observer.
    pub pull_requests: usize,
    /// Heads the criteria turned down.
    pub rejected_by_criteria: usize,
    /// Heads dropped because of a per-item failure.
    pub skipped: Vec<SkippedHead>,
    /// `true` if the observer asked to stop before the scan was complete.
    pub stopped_early: bool,
}

impl ScanSummary {
    fn start(scan_id: ScanId) -> Self {
        let now = Timestamp::now();
        Self {
            scan_id,
            started_at: now,
            finished_at: now,
            branches: 0,
            pull_requests: 0,
            rejected_by_criteria: 0,
            skipped: Vec::new(),
            stopped_early: false,
        }
    }

    fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedHead {
            name: name.into(),
            reason: reason.into(),
        });
    }
}

/// Outcome for one candidate head, produced concurrently and applied in order.
enum Candidate {
    Accepted(Head, Revision),
    Rejected,
    Skipped(SkippedHead),
}

// ---------------------------------------------------------------------------
// DiscoveryEngine
// ---------------------------------------------------------------------------

/// Discovers buildable heads of one repository.
///
/// The engine holds no state between scans; every call to
/// [`DiscoveryEngine::fetch`] gets a fresh trust cache and scan id.
pub struct DiscoveryEngine {
    api: Arc<dyn GitHubApi>,
    repository: RepositoryId,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    /// Creates an engine after validating `config`.
    pub fn new(
        api: Arc<dyn GitHubApi>,
        repository: RepositoryId,
        config: DiscoveryConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            api,
            repository,
            config,
        })
    }

    pub fn repository(&self) -> &RepositoryId {
        &self.repository
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Runs one scan, reporting every accepted head to `observer`.
    ///
    /// Cancelling `cancel` aborts the scan at the next suspension point,
    /// including in the middle of a merge-state wait.
    pub async fn fetch(
        &self,
        criteria: &dyn HeadCriteria,
        observer: &mut dyn HeadObserver,
        event: Option<&ScanEvent>,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        let scan_id = ScanId::new_random();
        let span = info_span!("scan", %scan_id, repository = %self.repository);

        async move {
            if let Some(event) = event {
                info!(event = %event.label, "scan started");
            } else {
                info!("scan started");
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ScanError::Cancelled),
                result = self.scan(scan_id, criteria, observer, event, cancel) => result,
            };

            match &result {
                Ok(summary) => info!(
                    branches = summary.branches,
                    pull_requests = summary.pull_requests,
                    rejected = summary.rejected_by_criteria,
                    skipped = summary.skipped.len(),
                    stopped_early = summary.stopped_early,
                    "scan finished"
                ),
                Err(error) => warn!(%error, "scan aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn scan(
        &self,
        scan_id: ScanId,
        criteria: &dyn HeadCriteria,
        observer: &mut dyn HeadObserver,
        event: Option<&ScanEvent>,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary::start(scan_id);
        self.fetch_metadata().await?;

        // Origin pull requests are needed to exclude their source branches
        // even when no pull request is built.
        let pull_requests = if self.config.builds_pull_requests()
            || (self.config.build_origin_branches && !self.config.build_origin_branch_with_pr)
        {
            self.api
                .list_open_pull_requests(&self.repository)
                .await
                .map_err(|e| ScanError::from_api("pull requests", e))?
        } else {
            Vec::new()
        };

        if self.config.build_origin_branches {
            self.scan_branches(&pull_requests, criteria, observer, event, &mut summary)
                .await?;
        }

        if self.config.builds_pull_requests() && !summary.stopped_early {
            self.scan_pull_requests(
                &pull_requests,
                criteria,
                observer,
                event,
                cancel,
                &mut summary,
            )
            .await?;
        }

        summary.finished_at = Timestamp::now();
        Ok(summary)
    }

    async fn scan_branches(
        &self,
        pull_requests: &[PullRequest],
        criteria: &dyn HeadCriteria,
        observer: &mut dyn HeadObserver,
        event: Option<&ScanEvent>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let branches = self
            .api
            .list_branches(&self.repository)
            .await
            .map_err(|e| ScanError::from_api("branches", e))?;

        let with_open_pr: HashSet<&BranchName> = if self.config.build_origin_branch_with_pr {
            HashSet::new()
        } else {
            pull_requests
                .iter()
                .filter(|pr| self.origin_of(pr) == Some(HeadOrigin::Origin))
                .map(|pr| &pr.source_branch)
                .collect()
        };

        for branch in branches {
            if !observer.is_observing() {
                summary.stopped_early = true;
                return Ok(());
            }
            if with_open_pr.contains(&branch.name) {
                debug!(branch = %branch.name, "branch is the source of an open pull request");
                continue;
            }
            if !in_scope(event, branch.name.as_str()) {
                continue;
            }

            let head = Head::Branch(BranchHead::new(branch.name.clone()));
            match self.accepts(criteria, &head, &branch.sha).await {
                Ok(true) => {
                    let revision =
                        BranchRevision::new(BranchHead::new(branch.name), branch.sha).into();
                    observer.observe(head, revision);
                    summary.branches += 1;
                }
                Ok(false) => {
                    debug!(%head, "rejected by criteria");
                    summary.rejected_by_criteria += 1;
                }
                Err(error) if error.is_scan_fatal() => {
                    return Err(ScanError::from_api("branch contents", error));
                }
                Err(error) => {
                    warn!(%head, %error, "skipping branch");
                    summary.skip(head.name(), error.to_string());
                }
            }
        }
        Ok(())
    }

    async fn scan_pull_requests(
        &self,
        pull_requests: &[PullRequest],
        criteria: &dyn HeadCriteria,
        observer: &mut dyn HeadObserver,
        event: Option<&ScanEvent>,
        cancel: &CancellationToken,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let trust = &self.trust_evaluator();
        let resolver = &self.resolver();

        let mut outcomes = stream::iter(pull_requests)
            .map(move |pr| self.discover_pull_request(pr, trust, resolver, criteria, event, cancel))
            .buffered(self.config.max_concurrent_resolutions);

        while let Some(outcome) = outcomes.next().await {
            for candidate in outcome? {
                if !observer.is_observing() {
                    summary.stopped_early = true;
                    return Ok(());
                }
                match candidate {
                    Candidate::Accepted(head, revision) => {
                        observer.observe(head, revision);
                        summary.pull_requests += 1;
                    }
                    Candidate::Rejected => summary.rejected_by_criteria += 1,
                    Candidate::Skipped(skipped) => summary.skipped.push(skipped),
                }
            }
        }
        Ok(())
    }

    /// Turns one pull request into zero or more candidates. Per-item failures
    /// become a [`Candidate::Skipped`]; only scan-fatal failures are `Err`.
    async fn discover_pull_request(
        &self,
        pr: &PullRequest,
        trust: &TrustEvaluator<'_>,
        resolver: &MergeCommitResolver<'_>,
        criteria: &dyn HeadCriteria,
        event: Option<&ScanEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, ScanError> {
        match self
            .try_discover_pull_request(pr, trust, resolver, criteria, event, cancel)
            .await
        {
            Ok(candidates) => Ok(candidates),
            Err(error) => {
                let reason = error.into_skip_reason()?;
                warn!(pull_request = %pr.number, %reason, "skipping pull request");
                Ok(vec![Candidate::Skipped(SkippedHead {
                    name: format!("PR-{}", pr.number),
                    reason,
                })])
            }
        }
    }

    async fn try_discover_pull_request(
        &self,
        pr: &PullRequest,
        trust: &TrustEvaluator<'_>,
        resolver: &MergeCommitResolver<'_>,
        criteria: &dyn HeadCriteria,
        event: Option<&ScanEvent>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, ResolveError> {
        let (Some(origin), Some(source)) = (self.origin_of(pr), &pr.source_repository) else {
            return Err(ResolveError::SourceRepositoryMissing {
                number: pr.number.as_u64(),
            });
        };

        let mut strategies = self.config.strategies_for(origin);
        if strategies.is_empty() {
            return Ok(Vec::new());
        }

        let author = match self.api.get_user(&pr.author).await {
            Ok(user) => user,
            Err(error) if error.is_not_found() => {
                return Err(ResolveError::AuthorMissing {
                    login: pr.author.to_string(),
                })
            }
            Err(error) => return Err(error.into()),
        };

        if strategies.contains(&CheckoutStrategy::Merge) {
            let subject = TrustSubject {
                origin,
                source_owner: &source.owner,
                author: &pr.author,
            };
            if !trust.evaluate(subject).await.is_trusted() {
                strategies.retain(|strategy| *strategy != CheckoutStrategy::Merge);
                if strategies.is_empty() {
                    strategies.push(CheckoutStrategy::Head);
                }
                info!(
                    pull_request = %pr.number,
                    author = %pr.author,
                    "untrusted fork; building its own head only"
                );
            }
        }

        let contributor = Contributor {
            login: author.login,
            display_name: author.name,
            email: author.email,
        };
        let qualified = strategies.len() > 1;
        let mut candidates = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            let mut head = PullRequestHead::new(
                pr.number,
                PullRequestSource {
                    owner: source.owner.clone(),
                    repository: source.name.clone(),
                    branch: pr.source_branch.clone(),
                },
                BranchHead::new(pr.base_branch.clone()),
                origin,
                strategy,
            )
            .with_title(pr.title.clone())
            .with_author(contributor.clone());
            if qualified {
                head = head.with_qualified_name();
            }
            if !in_scope(event, head.name()) {
                continue;
            }

            let revision = resolver.resolve(&head, cancel).await?;
            let head = Head::PullRequest(head);
            if self.accepts(criteria, &head, revision.pull_sha()).await? {
                candidates.push(Candidate::Accepted(head, revision.into()));
            } else {
                debug!(%head, "rejected by criteria");
                candidates.push(Candidate::Rejected);
            }
        }
        Ok(candidates)
    }

    /// `None` when the source repository has been deleted.
    fn origin_of(&self, pr: &PullRequest) -> Option<HeadOrigin> {
        let source = pr.source_repository.as_ref()?;
        let source = RepositoryId::new(source.owner.clone(), source.name.clone());
        Some(if source.eq_ignore_case(&self.repository) {
            HeadOrigin::Origin
        } else {
            HeadOrigin::Fork
        })
    }

    fn trust_evaluator(&self) -> TrustEvaluator<'_> {
        TrustEvaluator::new(self.config.trust_policy, self.api.as_ref(), &self.repository)
    }

    fn resolver(&self) -> MergeCommitResolver<'_> {
        MergeCommitResolver::new(
            self.api.as_ref(),
            &self.repository,
            self.config.poll_budget(),
        )
    }

    async fn accepts(
        &self,
        criteria: &dyn HeadCriteria,
        head: &Head,
        commit: &CommitSha,
    ) -> Result<bool, ApiError> {
        let probe = ApiProbe::new(self.api.as_ref(), &self.repository, commit.clone());
        criteria.is_head(head, &probe).await
    }

    // -----------------------------------------------------------------------
    // Single-head operations
    // -----------------------------------------------------------------------

    /// Re-resolves one previously discovered head.
    ///
    /// Returns `Ok(None)` when the head no longer exists: the branch was
    /// deleted, the pull request was closed, or its target branch is gone.
    /// Cancelling `cancel` abandons the lookup at once.
    #[instrument(skip_all, fields(repository = %self.repository, head = %head))]
    pub async fn retrieve(
        &self,
        head: &Head,
        cancel: &CancellationToken,
    ) -> Result<Option<Revision>, ScanError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScanError::Cancelled),
            result = self.retrieve_head(head, cancel) => result,
        }
    }

    async fn retrieve_head(
        &self,
        head: &Head,
        cancel: &CancellationToken,
    ) -> Result<Option<Revision>, ScanError> {
        match head {
            Head::Branch(branch) => {
                match self.api.get_branch_ref(&self.repository, branch.name()).await {
                    Ok(sha) => Ok(Some(BranchRevision::new(branch.clone(), sha).into())),
                    Err(error) if error.is_not_found() => Ok(None),
                    Err(error) => Err(ScanError::from_api("branch", error)),
                }
            }
            Head::PullRequest(pr_head) => {
                match self.resolver().resolve(pr_head, cancel).await {
                    Ok(revision) => Ok(Some(revision.into())),
                    Err(ResolveError::PullRequestMissing { .. })
                    | Err(ResolveError::PullRequestClosed { .. })
                    | Err(ResolveError::BaseBranchMissing { .. }) => Ok(None),
                    Err(ResolveError::Api(error)) => {
                        Err(ScanError::from_api("pull request", error))
                    }
                    Err(ResolveError::Cancelled) => Err(ScanError::Cancelled),
                    Err(other) => Err(ScanError::Enumeration {
                        what: "pull request",
                        source: ApiError::InvalidResponse {
                            message: other.to_string(),
                        },
                    }),
                }
            }
        }
    }

    /// The revision it is safe to take build definitions from.
    ///
    /// A pull request from an untrusted fork could rewrite the build
    /// definition, so its target branch at the recorded base commit is used
    /// instead. Branches and trusted pull requests return `revision` itself.
    #[instrument(skip_all, fields(repository = %self.repository, revision = %revision))]
    pub async fn trusted_revision(&self, revision: &Revision) -> Revision {
        let Revision::PullRequest(pr_revision) = revision else {
            return revision.clone();
        };
        let head = pr_revision.pull_request_head();
        let source = head.source();

        let source_id = RepositoryId::new(source.owner.clone(), source.repository.clone());
        let origin = if source_id.eq_ignore_case(&self.repository) {
            HeadOrigin::Origin
        } else {
            head.origin()
        };
        let owner_login = Login::new(source.owner.as_str());
        let Some(author) = head
            .author()
            .map(|author| &author.login)
            .or(owner_login.as_ref())
        else {
            return revision.clone();
        };

        let trust = self.trust_evaluator();
        let subject = TrustSubject {
            origin,
            source_owner: &source.owner,
            author,
        };
        if trust.evaluate(subject).await.is_trusted() {
            revision.clone()
        } else {
            info!(
                target_branch = %head.target().name(),
                base = %pr_revision.base_sha().short(),
                "untrusted pull request; using the target branch revision"
            );
            BranchRevision::new(head.target().clone(), pr_revision.base_sha().clone()).into()
        }
    }

    /// Reads the repository's metadata.
    #[instrument(skip_all, fields(repository = %self.repository))]
    pub async fn fetch_metadata(&self) -> Result<RepositoryInfo, ScanError> {
        self.api
            .get_repository(&self.repository)
            .await
            .map_err(|error| match error {
                ApiError::NotFound { .. } => ScanError::RepositoryNotFound {
                    repository: self.repository.to_string(),
                },
                other => ScanError::from_api("repository", other),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_event_scopes_by_name() {
        let event = ScanEvent::for_heads("push", ["master", "PR-2"]);
        assert!(event.includes("master"));
        assert!(event.includes("PR-2"));
        assert!(!event.includes("PR-3"));
        assert!(in_scope(None, "anything"));
        assert!(!in_scope(Some(&event), "feature"));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let api = Arc::new(crate::testing::InMemoryGitHub::new(crate::testing::repository(
            "cloudbeers/yolo",
        )));
        let config = DiscoveryConfig {
            max_concurrent_resolutions: 0,
            ..DiscoveryConfig::default()
        };
        assert!(DiscoveryEngine::new(api, crate::testing::repository("cloudbeers/yolo"), config)
            .is_err());
    }
}
