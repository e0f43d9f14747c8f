//! Head and revision identity.
//!
//! A [`Head`] names something buildable: a branch, or one checkout strategy of
//! a pull request. A [`Revision`] binds a head to the concrete commits needed
//! to reproduce a build. Downstream consumers compare revisions from two scans
//! to decide whether anything changed since the last build, so equality here
//! is part of the contract:
//!
//! - Pull-request heads compare by number, source owner/repository/branch and
//!   checkout strategy. The target-branch snapshot, display name and author
//!   metadata are ignored, so a head keeps its identity when the target
//!   advances.
//! - Merge revisions compare head and base SHAs; the merge SHA only takes part
//!   when both sides know it (see [`MergeHash`]).
//!
//! Values are created fresh on every scan and never mutated afterwards.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::errors::{MergeValidationError, RevisionError};
use crate::identifiers::{
    BranchName, CommitSha, Login, OwnerName, PullRequestNumber, RepositoryName,
};

// ---------------------------------------------------------------------------
// Classification enums
// ---------------------------------------------------------------------------

/// How a pull request is checked out for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStrategy {
    /// Build the pull request's own head commit.
    Head,
    /// Build GitHub's synthetic merge of the pull request into its target.
    Merge,
}

impl std::fmt::Display for CheckoutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Head => write!(f, "HEAD"),
            Self::Merge => write!(f, "MERGE"),
        }
    }
}

/// Where a pull request's source branch lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadOrigin {
    /// The source branch is in the scanned repository itself.
    Origin,
    /// The source branch is in a fork.
    Fork,
}

// ---------------------------------------------------------------------------
// Heads
// ---------------------------------------------------------------------------

/// A branch of the scanned repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchHead {
    name: BranchName,
}

impl BranchHead {
    /// Creates a branch head.
    pub fn new(name: BranchName) -> Self {
        Self { name }
    }

    /// The branch name.
    pub fn name(&self) -> &BranchName {
        &self.name
    }
}

/// Coordinates of a pull request's source branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestSource {
    /// Owner of the repository holding the source branch.
    pub owner: OwnerName,
    /// Name of the repository holding the source branch.
    pub repository: RepositoryName,
    /// Source branch name.
    pub branch: BranchName,
}

/// Account details of a pull-request author. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// GitHub login.
    pub login: Login,
    /// Display name, when the account has one.
    pub display_name: Option<String>,
    /// Public e-mail address, when the account exposes one.
    pub email: Option<String>,
}

/// One checkout strategy of one pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestHead {
    name: String,
    number: PullRequestNumber,
    source: PullRequestSource,
    target: BranchHead,
    origin: HeadOrigin,
    strategy: CheckoutStrategy,
    title: Option<String>,
    author: Option<Contributor>,
}

impl PullRequestHead {
    /// Creates a pull-request head named `PR-<number>`.
    ///
    /// The checkout strategy is fixed here and decides which kind of revision
    /// the head resolves to.
    pub fn new(
        number: PullRequestNumber,
        source: PullRequestSource,
        target: BranchHead,
        origin: HeadOrigin,
        strategy: CheckoutStrategy,
    ) -> Self {
        Self {
            name: format!("PR-{number}"),
            number,
            source,
            target,
            origin,
            strategy,
            title: None,
            author: None,
        }
    }

    /// Qualifies the name with the strategy (`PR-2-head`, `PR-2-merge`).
    ///
    /// Used when both strategies are offered for the same pull request so the
    /// two heads have distinct names.
    pub fn with_qualified_name(mut self) -> Self {
        let suffix = match self.strategy {
            CheckoutStrategy::Head => "head",
            CheckoutStrategy::Merge => "merge",
        };
        self.name = format!("PR-{}-{suffix}", self.number);
        self
    }

    /// Attaches the pull-request title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attaches the author's account details.
    pub fn with_author(mut self, author: Contributor) -> Self {
        self.author = Some(author);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> PullRequestNumber {
        self.number
    }

    pub fn source(&self) -> &PullRequestSource {
        &self.source
    }

    /// The target branch as it was when this head was constructed.
    pub fn target(&self) -> &BranchHead {
        &self.target
    }

    pub fn origin(&self) -> HeadOrigin {
        self.origin
    }

    pub fn strategy(&self) -> CheckoutStrategy {
        self.strategy
    }

    pub fn is_merge(&self) -> bool {
        self.strategy == CheckoutStrategy::Merge
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn author(&self) -> Option<&Contributor> {
        self.author.as_ref()
    }
}

impl PartialEq for PullRequestHead {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.source == other.source
            && self.strategy == other.strategy
    }
}

impl Eq for PullRequestHead {}

impl Hash for PullRequestHead {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state);
        self.source.hash(state);
        self.strategy.hash(state);
    }
}

/// Something buildable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Head {
    /// A branch.
    Branch(BranchHead),
    /// One checkout strategy of a pull request.
    PullRequest(PullRequestHead),
}

impl Head {
    /// The name downstream tooling shows for this head (`master`, `PR-2`).
    pub fn name(&self) -> &str {
        match self {
            Self::Branch(branch) => branch.name.as_str(),
            Self::PullRequest(pr) => pr.name(),
        }
    }
}

impl std::fmt::Display for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// The merge commit of a merge-strategy revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", content = "sha", rename_all = "snake_case")]
pub enum MergeHash {
    /// GitHub's test merge commit against the recorded base.
    Commit(CommitSha),
    /// GitHub reported the pull request as not mergeable.
    NotMergeable,
    /// GitHub had not finished computing mergeability within the retry budget.
    Unknown,
}

impl MergeHash {
    /// The merge commit SHA, if one was resolved.
    pub fn commit(&self) -> Option<&CommitSha> {
        match self {
            Self::Commit(sha) => Some(sha),
            _ => None,
        }
    }
}

impl PartialEq for MergeHash {
    /// [`MergeHash::Unknown`] matches anything; the other states only match
    /// themselves.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unknown, _) | (_, Self::Unknown) => true,
            (Self::NotMergeable, Self::NotMergeable) => true,
            (Self::Commit(a), Self::Commit(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for MergeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit(sha) => write!(f, "{}", sha.short()),
            Self::NotMergeable => write!(f, "not-mergeable"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A branch at a single commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchRevision {
    head: BranchHead,
    sha: CommitSha,
}

impl BranchRevision {
    pub fn new(head: BranchHead, sha: CommitSha) -> Self {
        Self { head, sha }
    }

    pub fn head(&self) -> &BranchHead {
        &self.head
    }

    pub fn sha(&self) -> &CommitSha {
        &self.sha
    }
}

/// A pull request resolved against its target branch.
///
/// `merge_hash` is present exactly when the head uses the merge strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PullRequestRevisionRepr", into = "PullRequestRevisionRepr")]
pub struct PullRequestRevision {
    head: PullRequestHead,
    base_sha: CommitSha,
    pull_sha: CommitSha,
    merge_hash: Option<MergeHash>,
}

impl PullRequestRevision {
    /// Creates the revision of a head-strategy pull request.
    pub fn head(
        head: PullRequestHead,
        base_sha: CommitSha,
        pull_sha: CommitSha,
    ) -> Result<Self, RevisionError> {
        Self::build(head, base_sha, pull_sha, None)
    }

    /// Creates the revision of a merge-strategy pull request.
    pub fn merge(
        head: PullRequestHead,
        base_sha: CommitSha,
        pull_sha: CommitSha,
        merge_hash: MergeHash,
    ) -> Result<Self, RevisionError> {
        Self::build(head, base_sha, pull_sha, Some(merge_hash))
    }

    fn build(
        head: PullRequestHead,
        base_sha: CommitSha,
        pull_sha: CommitSha,
        merge_hash: Option<MergeHash>,
    ) -> Result<Self, RevisionError> {
        let expected = if merge_hash.is_some() {
            CheckoutStrategy::Merge
        } else {
            CheckoutStrategy::Head
        };
        if head.strategy() != expected {
            return Err(RevisionError::StrategyMismatch {
                head: head.name().to_string(),
                expected,
                actual: head.strategy(),
            });
        }
        Ok(Self {
            head,
            base_sha,
            pull_sha,
            merge_hash,
        })
    }

    pub fn pull_request_head(&self) -> &PullRequestHead {
        &self.head
    }

    /// Head of the target branch when the revision was resolved.
    pub fn base_sha(&self) -> &CommitSha {
        &self.base_sha
    }

    /// Head commit of the pull request's source branch.
    pub fn pull_sha(&self) -> &CommitSha {
        &self.pull_sha
    }

    /// The merge state; `None` for head-strategy revisions.
    pub fn merge_hash(&self) -> Option<&MergeHash> {
        self.merge_hash.as_ref()
    }

    /// Fails when this is a merge revision that cannot be built.
    ///
    /// Called at build time. A pull request that is not mergeable stays
    /// visible to discovery and fails here instead, so its build aborts with
    /// an explicit message rather than silently building the source head.
    pub fn validate_merge_hash(&self) -> Result<(), MergeValidationError> {
        let head = self.head.name().to_string();
        let target = self.head.target().name().to_string();
        match self.merge_hash {
            Some(MergeHash::NotMergeable) => {
                Err(MergeValidationError::NotMergeable { head, target })
            }
            Some(MergeHash::Unknown) => {
                Err(MergeValidationError::MergeStateUnknown { head, target })
            }
            Some(MergeHash::Commit(_)) | None => Ok(()),
        }
    }
}

impl PartialEq for PullRequestRevision {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
            && self.base_sha == other.base_sha
            && self.pull_sha == other.pull_sha
            && self.merge_hash == other.merge_hash
    }
}

#[derive(Serialize, Deserialize)]
struct PullRequestRevisionRepr {
    head: PullRequestHead,
    base_sha: CommitSha,
    pull_sha: CommitSha,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merge_hash: Option<MergeHash>,
}

impl TryFrom<PullRequestRevisionRepr> for PullRequestRevision {
    type Error = RevisionError;

    fn try_from(repr: PullRequestRevisionRepr) -> Result<Self, Self::Error> {
        Self::build(repr.head, repr.base_sha, repr.pull_sha, repr.merge_hash)
    }
}

impl From<PullRequestRevision> for PullRequestRevisionRepr {
    fn from(revision: PullRequestRevision) -> Self {
        Self {
            head: revision.head,
            base_sha: revision.base_sha,
            pull_sha: revision.pull_sha,
            merge_hash: revision.merge_hash,
        }
    }
}

/// A head bound to concrete commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Revision {
    /// A branch revision.
    Branch(BranchRevision),
    /// A pull-request revision.
    PullRequest(PullRequestRevision),
}

impl Revision {
    /// The head this revision is bound to.
    pub fn head(&self) -> Head {
        match self {
            Self::Branch(rev) => Head::Branch(rev.head.clone()),
            Self::PullRequest(rev) => Head::PullRequest(rev.head.clone()),
        }
    }

    /// The commit whose source tree build definitions are read from: the
    /// branch commit, or the pull request's own head commit.
    pub fn source_sha(&self) -> &CommitSha {
        match self {
            Self::Branch(rev) => &rev.sha,
            Self::PullRequest(rev) => &rev.pull_sha,
        }
    }

    /// See [`PullRequestRevision::validate_merge_hash`]. Branch revisions
    /// always pass.
    pub fn validate_merge_hash(&self) -> Result<(), MergeValidationError> {
        match self {
            Self::Branch(_) => Ok(()),
            Self::PullRequest(rev) => rev.validate_merge_hash(),
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch(rev) => write!(f, "{} @ {}", rev.head.name, rev.sha.short()),
            Self::PullRequest(rev) => {
                write!(
                    f,
                    "{} @ {}+{}",
                    rev.head.name(),
                    rev.pull_sha.short(),
                    rev.base_sha.short()
                )?;
                if let Some(merge) = &rev.merge_hash {
                    write!(f, " (merge {merge})")?;
                }
                Ok(())
            }
        }
    }
}

impl From<BranchRevision> for Revision {
    fn from(rev: BranchRevision) -> Self {
        Self::Branch(rev)
    }
}

impl From<PullRequestRevision> for Revision {
    fn from(rev: PullRequestRevision) -> Self {
        Self::PullRequest(rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sha(value: &str) -> CommitSha {
        CommitSha::new(value).unwrap()
    }

    fn branch(name: &str) -> BranchHead {
        BranchHead::new(BranchName::new(name).unwrap())
    }

    fn pr_head(target: &str, strategy: CheckoutStrategy) -> PullRequestHead {
        PullRequestHead::new(
            PullRequestNumber::new(2).unwrap(),
            PullRequestSource {
                owner: OwnerName::new("stephenc").unwrap(),
                repository: RepositoryName::new("yolo").unwrap(),
                branch: BranchName::new("patch-1").unwrap(),
            },
            branch(target),
            HeadOrigin::Fork,
            strategy,
        )
    }

    #[test]
    fn pull_request_identity_ignores_target_and_metadata() {
        let before = pr_head("master", CheckoutStrategy::Merge);
        let after = pr_head("develop", CheckoutStrategy::Merge).with_title("Fix the thing");
        assert_eq!(before, after);

        let head_variant = pr_head("master", CheckoutStrategy::Head);
        assert_ne!(before, head_variant);
    }

    #[test]
    fn names_are_qualified_only_on_request() {
        assert_eq!(pr_head("master", CheckoutStrategy::Merge).name(), "PR-2");
        assert_eq!(
            pr_head("master", CheckoutStrategy::Merge)
                .with_qualified_name()
                .name(),
            "PR-2-merge"
        );
        assert_eq!(
            pr_head("master", CheckoutStrategy::Head)
                .with_qualified_name()
                .name(),
            "PR-2-head"
        );
    }

    #[test]
    fn revision_kind_must_match_strategy() {
        let err = PullRequestRevision::head(
            pr_head("master", CheckoutStrategy::Merge),
            sha("base"),
            sha("pull"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RevisionError::StrategyMismatch {
                expected: CheckoutStrategy::Head,
                actual: CheckoutStrategy::Merge,
                ..
            }
        ));

        assert!(PullRequestRevision::merge(
            pr_head("master", CheckoutStrategy::Head),
            sha("base"),
            sha("pull"),
            MergeHash::Unknown,
        )
        .is_err());
    }

    #[test]
    fn unknown_merge_hash_matches_any_state() {
        let head = pr_head("master", CheckoutStrategy::Merge);
        let resolved = PullRequestRevision::merge(
            head.clone(),
            sha("base"),
            sha("pull"),
            MergeHash::Commit(sha("merge")),
        )
        .unwrap();
        let unknown =
            PullRequestRevision::merge(head.clone(), sha("base"), sha("pull"), MergeHash::Unknown)
                .unwrap();
        let conflicted = PullRequestRevision::merge(
            head.clone(),
            sha("base"),
            sha("pull"),
            MergeHash::NotMergeable,
        )
        .unwrap();

        assert_eq!(resolved, unknown);
        assert_eq!(unknown, conflicted);
        assert_ne!(resolved, conflicted);
    }

    #[test]
    fn base_and_pull_shas_always_participate_in_equality() {
        let head = pr_head("master", CheckoutStrategy::Merge);
        let a =
            PullRequestRevision::merge(head.clone(), sha("base"), sha("pull"), MergeHash::Unknown)
                .unwrap();
        let moved_base =
            PullRequestRevision::merge(head.clone(), sha("base2"), sha("pull"), MergeHash::Unknown)
                .unwrap();
        let new_push =
            PullRequestRevision::merge(head, sha("base"), sha("pull2"), MergeHash::Unknown)
                .unwrap();
        assert_ne!(a, moved_base);
        assert_ne!(a, new_push);
    }

    #[test]
    fn validation_rejects_not_mergeable_and_unknown() {
        let head = pr_head("master", CheckoutStrategy::Merge);
        let conflicted = PullRequestRevision::merge(
            head.clone(),
            sha("base"),
            sha("pull"),
            MergeHash::NotMergeable,
        )
        .unwrap();
        let err = conflicted.validate_merge_hash().unwrap_err();
        assert!(matches!(err, MergeValidationError::NotMergeable { .. }));
        assert!(err.to_string().contains("Not mergeable"));

        let unknown =
            PullRequestRevision::merge(head.clone(), sha("base"), sha("pull"), MergeHash::Unknown)
                .unwrap();
        let err = unknown.validate_merge_hash().unwrap_err();
        assert!(matches!(err, MergeValidationError::MergeStateUnknown { .. }));
        assert!(err.to_string().contains("Not mergeable"));

        let merged = PullRequestRevision::merge(
            head,
            sha("base"),
            sha("pull"),
            MergeHash::Commit(sha("merge")),
        )
        .unwrap();
        assert!(merged.validate_merge_hash().is_ok());

        let head_only = PullRequestRevision::head(
            pr_head("master", CheckoutStrategy::Head),
            sha("base"),
            sha("pull"),
        )
        .unwrap();
        assert!(head_only.validate_merge_hash().is_ok());
    }

    #[test]
    fn display_is_stable() {
        let rev = Revision::from(BranchRevision::new(
            branch("master"),
            sha("8f1314fc3c8284d8c6d5886d473db98f2126071c"),
        ));
        assert_eq!(rev.to_string(), "master @ 8f1314f");

        let rev = Revision::from(
            PullRequestRevision::merge(
                pr_head("master", CheckoutStrategy::Merge),
                sha("8f1314fc3c8284d8c6d5886d473db98f2126071c"),
                sha("c0e024f89969b976da165eecaa71e09dc60c3da1"),
                MergeHash::NotMergeable,
            )
            .unwrap(),
        );
        assert_eq!(rev.to_string(), "PR-2 @ c0e024f+8f1314f (merge not-mergeable)");
    }

    #[test]
    fn deserialization_rechecks_strategy_invariant() {
        let rev = PullRequestRevision::merge(
            pr_head("master", CheckoutStrategy::Merge),
            sha("base"),
            sha("pull"),
            MergeHash::Commit(sha("merge")),
        )
        .unwrap();
        let mut json = serde_json::to_value(&rev).unwrap();
        let decoded: PullRequestRevision = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(decoded, rev);

        json.as_object_mut().unwrap().remove("merge_hash");
        let result: Result<PullRequestRevision, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
