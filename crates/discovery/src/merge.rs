//! Resolving a pull-request head to a revision.
//!
//! GitHub computes a pull request's mergeability and test merge commit
//! asynchronously after the pull request (or its target) changes. A read may
//! therefore report `mergeable: null`, or a merge commit built on a base that
//! has since moved. [`MergeCommitResolver`] re-reads the pull request within a
//! [`PollBudget`] until the state settles and always produces exactly one
//! terminal state per pull request:
//!
//! | GitHub says | Merge hash |
//! |-------------|------------|
//! | mergeable, merge commit built on the current base | [`MergeHash::Commit`] |
//! | not mergeable | [`MergeHash::NotMergeable`] |
//! | mergeable, but the merge commit is gone (404) | [`MergeHash::NotMergeable`] |
//! | still computing after the budget | [`MergeHash::Unknown`] |
//!
//! The base-branch head is read on every attempt rather than once per scan,
//! because the base moving between attempts is exactly what makes a merge
//! commit stale.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::api::{GitHubApi, PullRequest, PullRequestState};
use crate::errors::{ApiError, ResolveError};
use crate::identifiers::{BranchName, CommitSha, PullRequestNumber, RepositoryId};
use crate::retry::{poll_until_settled, Convergence, Observation, PollBudget};
use crate::revision::{CheckoutStrategy, MergeHash, PullRequestHead, PullRequestRevision};

/// The state of one pull request as seen by one attempt.
#[derive(Debug, Clone)]
struct MergeSnapshot {
    pull_sha: CommitSha,
    base_sha: CommitSha,
    merge: MergeHash,
}

/// Resolves pull-request heads against the GitHub API.
pub struct MergeCommitResolver<'a> {
    api: &'a dyn GitHubApi,
    repository: &'a RepositoryId,
    budget: PollBudget,
}

impl<'a> MergeCommitResolver<'a> {
    pub fn new(api: &'a dyn GitHubApi, repository: &'a RepositoryId, budget: PollBudget) -> Self {
        Self {
            api,
            repository,
            budget,
        }
    }

    /// Resolves `head` to the revision kind its checkout strategy calls for.
    #[instrument(skip_all, fields(head = %head.name(), strategy = %head.strategy()))]
    pub async fn resolve(
        &self,
        head: &PullRequestHead,
        cancel: &CancellationToken,
    ) -> Result<PullRequestRevision, ResolveError> {
        match head.strategy() {
            CheckoutStrategy::Head => self.resolve_head(head).await,
            CheckoutStrategy::Merge => self.resolve_merge(head, cancel).await,
        }
    }

    async fn resolve_head(
        &self,
        head: &PullRequestHead,
    ) -> Result<PullRequestRevision, ResolveError> {
        let pr = self.fetch_pull_request(head.number()).await?;
        let base_sha = self.base_sha(&pr.base_branch).await?;
        Ok(PullRequestRevision::head(head.clone(), base_sha, pr.head_sha)?)
    }

    async fn resolve_merge(
        &self,
        head: &PullRequestHead,
        cancel: &CancellationToken,
    ) -> Result<PullRequestRevision, ResolveError> {
        let convergence =
            poll_until_settled(self.budget, cancel, |attempt| self.observe(head, attempt)).await?;

        let snapshot = match convergence {
            Convergence::Settled { value, attempts } => {
                debug!(attempts, merge = %value.merge, "merge state settled");
                value
            }
            Convergence::Exhausted { last, attempts } => {
                warn!(
                    attempts,
                    "GitHub did not finish computing the merge state; recording it as unknown"
                );
                MergeSnapshot {
                    merge: MergeHash::Unknown,
                    ..last
                }
            }
        };

        Ok(PullRequestRevision::merge(
            head.clone(),
            snapshot.base_sha,
            snapshot.pull_sha,
            snapshot.merge,
        )?)
    }

    async fn observe(
        &self,
        head: &PullRequestHead,
        attempt: u32,
    ) -> Result<Observation<MergeSnapshot>, ResolveError> {
        let pr = self.fetch_pull_request(head.number()).await?;
        let base_sha = self.base_sha(&pr.base_branch).await?;
        debug!(attempt, mergeable = ?pr.mergeable, base = %base_sha.short(), "read pull request");

        let snapshot = |merge| MergeSnapshot {
            pull_sha: pr.head_sha.clone(),
            base_sha: base_sha.clone(),
            merge,
        };

        let merge_sha = match (pr.mergeable, &pr.merge_commit_sha) {
            (Some(false), _) => return Ok(Observation::Settled(snapshot(MergeHash::NotMergeable))),
            (None, _) | (Some(true), None) => {
                return Ok(Observation::Pending(snapshot(MergeHash::Unknown)))
            }
            (Some(true), Some(sha)) => sha,
        };

        match self.api.get_commit(self.repository, merge_sha).await {
            Ok(commit) if commit.is_merge_onto(&base_sha) => {
                Ok(Observation::Settled(snapshot(MergeHash::Commit(commit.sha))))
            }
            Ok(commit) => {
                debug!(
                    merge = %commit.sha.short(),
                    base = %base_sha.short(),
                    "merge commit is not built on the current base; waiting for GitHub to recompute"
                );
                Ok(Observation::Pending(snapshot(MergeHash::Unknown)))
            }
            Err(error) if error.is_not_found() => {
                warn!(
                    merge = %merge_sha.short(),
                    "merge commit reported by GitHub no longer exists; treating as not mergeable"
                );
                Ok(Observation::Settled(snapshot(MergeHash::NotMergeable)))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn fetch_pull_request(
        &self,
        number: PullRequestNumber,
    ) -> Result<PullRequest, ResolveError> {
        let pr = self
            .api
            .get_pull_request(self.repository, number)
            .await
            .map_err(|error| match error {
                ApiError::NotFound { .. } => ResolveError::PullRequestMissing {
                    number: number.as_u64(),
                },
                other => other.into(),
            })?;
        if pr.state != PullRequestState::Open {
            return Err(ResolveError::PullRequestClosed {
                number: number.as_u64(),
            });
        }
        Ok(pr)
    }

    async fn base_sha(&self, branch: &BranchName) -> Result<CommitSha, ResolveError> {
        self.api
            .get_branch_ref(self.repository, branch)
            .await
            .map_err(|error| match error {
                ApiError::NotFound { .. } => ResolveError::BaseBranchMissing {
                    branch: branch.to_string(),
                },
                other => other.into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::identifiers::{OwnerName, RepositoryName};
    use crate::revision::{BranchHead, HeadOrigin, PullRequestSource};
    use crate::testing::{pull_request, repository, sha, InMemoryGitHub};

    const MASTER: &str = "8f1314fc3c8284d8c6d5886d473db98f2126071c";
    const PULL: &str = "c0e024f89969b976da165eecaa71e09dc60c3da1";
    const MERGE: &str = "38814ca33833ff5583624c29f305be9133f27a40";

    fn head(strategy: CheckoutStrategy) -> PullRequestHead {
        PullRequestHead::new(
            PullRequestNumber::new(2).unwrap(),
            PullRequestSource {
                owner: OwnerName::new("stephenc").unwrap(),
                repository: RepositoryName::new("yolo").unwrap(),
                branch: BranchName::new("patch-1").unwrap(),
            },
            BranchHead::new(BranchName::new("master").unwrap()),
            HeadOrigin::Fork,
            strategy,
        )
    }

    fn pr() -> PullRequest {
        pull_request(2, "stephenc", "stephenc/yolo", "patch-1", PULL, "master")
    }

    fn mergeable(value: Option<bool>) -> PullRequest {
        PullRequest {
            mergeable: value,
            merge_commit_sha: Some(sha(MERGE)),
            ..pr()
        }
    }

    fn api() -> InMemoryGitHub {
        InMemoryGitHub::new(repository("cloudbeers/yolo"))
            .with_branch("master", MASTER)
            .with_pull_request(pr())
            .with_commit(MERGE, &[MASTER, PULL])
    }

    fn budget() -> PollBudget {
        PollBudget::new(3, Duration::ZERO).unwrap()
    }

    async fn resolve(
        api: &InMemoryGitHub,
        strategy: CheckoutStrategy,
    ) -> Result<PullRequestRevision, ResolveError> {
        let repo = repository("cloudbeers/yolo");
        let resolver = MergeCommitResolver::new(api, &repo, budget());
        resolver.resolve(&head(strategy), &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn mergeable_pull_request_resolves_to_merge_commit() {
        let api = api().script_pull_request(2, vec![Ok(mergeable(Some(true)))]);
        let revision = resolve(&api, CheckoutStrategy::Merge).await.unwrap();

        assert_eq!(revision.base_sha(), &sha(MASTER));
        assert_eq!(revision.pull_sha(), &sha(PULL));
        assert_eq!(revision.merge_hash().and_then(MergeHash::commit), Some(&sha(MERGE)));
        assert!(revision.validate_merge_hash().is_ok());
    }

    #[tokio::test]
    async fn not_mergeable_is_final_without_retry() {
        let api = api().script_pull_request(2, vec![Ok(mergeable(Some(false)))]);
        let revision = resolve(&api, CheckoutStrategy::Merge).await.unwrap();

        assert!(matches!(revision.merge_hash(), Some(MergeHash::NotMergeable)));
        assert_eq!(api.call_count("get_pull_request"), 1);
        assert_eq!(api.call_count("get_commit"), 0);
    }

    #[tokio::test]
    async fn unknown_state_is_retried_until_it_settles() {
        let api = api().script_pull_request(
            2,
            vec![
                Ok(mergeable(None)),
                Ok(mergeable(None)),
                Ok(mergeable(Some(true))),
            ],
        );
        let revision = resolve(&api, CheckoutStrategy::Merge).await.unwrap();

        assert_eq!(revision.merge_hash().and_then(MergeHash::commit), Some(&sha(MERGE)));
        assert_eq!(api.call_count("get_pull_request"), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_yields_unknown_not_the_sentinel() {
        let api = api().script_pull_request(2, vec![Ok(mergeable(None))]);
        let revision = resolve(&api, CheckoutStrategy::Merge).await.unwrap();

        assert!(matches!(revision.merge_hash(), Some(MergeHash::Unknown)));
        assert_eq!(revision.base_sha(), &sha(MASTER));
        assert_eq!(api.call_count("get_pull_request"), 3);
    }

    #[tokio::test]
    async fn missing_merge_commit_falls_back_to_not_mergeable() {
        let api = api()
            .script_pull_request(2, vec![Ok(mergeable(Some(true)))])
            .fail_commit(MERGE, ApiError::not_found("commit"));
        let revision = resolve(&api, CheckoutStrategy::Merge).await.unwrap();

        assert!(matches!(revision.merge_hash(), Some(MergeHash::NotMergeable)));
    }

    #[tokio::test]
    async fn stale_merge_commit_waits_for_the_moved_base() {
        let moved = "1111111111111111111111111111111111111111";
        let fresh_merge = "2222222222222222222222222222222222222222";
        let api = api()
            .script_branch_ref("master", vec![Ok(sha(moved))])
            .script_pull_request(
                2,
                vec![
                    Ok(mergeable(Some(true))),
                    Ok(PullRequest {
                        merge_commit_sha: Some(sha(fresh_merge)),
                        ..mergeable(Some(true))
                    }),
                ],
            )
            .with_commit(fresh_merge, &[moved, PULL]);
        let revision = resolve(&api, CheckoutStrategy::Merge).await.unwrap();

        assert_eq!(revision.base_sha(), &sha(moved));
        assert_eq!(
            revision.merge_hash().and_then(MergeHash::commit),
            Some(&sha(fresh_merge))
        );
        assert_eq!(api.call_count("get_pull_request"), 2);
    }

    #[tokio::test]
    async fn vanished_base_branch_is_a_per_item_failure() {
        let api = api()
            .script_pull_request(2, vec![Ok(mergeable(Some(true)))])
            .script_branch_ref("master", vec![Err(ApiError::not_found("refs/heads/master"))]);
        let err = resolve(&api, CheckoutStrategy::Merge).await.unwrap_err();

        assert!(matches!(
            err,
            ResolveError::BaseBranchMissing { ref branch } if branch == "master"
        ));
        assert!(err.into_skip_reason().is_ok());
    }

    #[tokio::test]
    async fn closed_pull_request_is_a_per_item_failure() {
        let closed = PullRequest {
            state: PullRequestState::Closed,
            ..mergeable(Some(true))
        };
        let api = api().script_pull_request(2, vec![Ok(closed)]);
        let err = resolve(&api, CheckoutStrategy::Head).await.unwrap_err();

        assert!(matches!(err, ResolveError::PullRequestClosed { number: 2 }));
        assert!(err.into_skip_reason().is_ok());
    }

    #[tokio::test]
    async fn head_strategy_reads_once() {
        let api = api();
        let revision = resolve(&api, CheckoutStrategy::Head).await.unwrap();

        assert!(revision.merge_hash().is_none());
        assert_eq!(revision.pull_sha(), &sha(PULL));
        assert_eq!(revision.base_sha(), &sha(MASTER));
        assert_eq!(api.call_count("get_pull_request"), 1);
    }

    #[tokio::test]
    async fn rate_limit_propagates_as_scan_fatal() {
        let api = api().script_pull_request(2, vec![Err(ApiError::RateLimited { reset_at: None })]);
        let err = resolve(&api, CheckoutStrategy::Merge).await.unwrap_err();

        assert!(err.into_skip_reason().is_err());
    }
}
