//! Deciding whether a head is worth reporting.
//!
//! The caller supplies a [`HeadCriteria`] that inspects the head's source tree
//! through a lightweight [`SourceProbe`], typically "does the build
//! definition file exist". For pull requests the probe looks at the pull
//! request's own head commit, never at the merge result.

use async_trait::async_trait;

use crate::api::{GitHubApi, PathType};
use crate::errors::ApiError;
use crate::identifiers::{CommitSha, RepositoryId};
use crate::revision::Head;

/// Read-only view of one commit's tree.
#[async_trait]
pub trait SourceProbe: Send + Sync {
    /// The commit being probed.
    fn commit(&self) -> &CommitSha;

    /// What `path` is in the probed tree.
    async fn stat(&self, path: &str) -> Result<PathType, ApiError>;
}

/// Caller-supplied filter applied to every candidate head.
#[async_trait]
pub trait HeadCriteria: Send + Sync {
    /// Returns `true` if `head` should be reported.
    async fn is_head(&self, head: &Head, probe: &dyn SourceProbe) -> Result<bool, ApiError>;
}

/// [`SourceProbe`] backed by the contents API.
pub struct ApiProbe<'a> {
    api: &'a dyn GitHubApi,
    repository: &'a RepositoryId,
    commit: CommitSha,
}

impl<'a> ApiProbe<'a> {
    pub fn new(api: &'a dyn GitHubApi, repository: &'a RepositoryId, commit: CommitSha) -> Self {
        Self {
            api,
            repository,
            commit,
        }
    }
}

#[async_trait]
impl SourceProbe for ApiProbe<'_> {
    fn commit(&self) -> &CommitSha {
        &self.commit
    }

    async fn stat(&self, path: &str) -> Result<PathType, ApiError> {
        self.api.stat_path(self.repository, &self.commit, path).await
    }
}

/// Accepts every head without probing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl HeadCriteria for AcceptAll {
    async fn is_head(&self, _head: &Head, _probe: &dyn SourceProbe) -> Result<bool, ApiError> {
        Ok(true)
    }
}

/// Accepts heads whose tree has `path` of the expected type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCriteria {
    path: String,
    expected: PathType,
}

impl PathCriteria {
    pub fn new(path: impl Into<String>, expected: PathType) -> Self {
        Self {
            path: path.into(),
            expected,
        }
    }

    /// Accepts heads where `path` is a regular file.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, PathType::RegularFile)
    }
}

#[async_trait]
impl HeadCriteria for PathCriteria {
    async fn is_head(&self, head: &Head, probe: &dyn SourceProbe) -> Result<bool, ApiError> {
        let found = probe.stat(&self.path).await?;
        tracing::trace!(head = %head, path = %self.path, ?found, "probed source tree");
        Ok(found == self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::BranchName;
    use crate::revision::BranchHead;
    use crate::testing::{repository, sha, InMemoryGitHub};

    fn master() -> Head {
        Head::Branch(BranchHead::new(BranchName::new("master").unwrap()))
    }

    #[tokio::test]
    async fn path_criteria_matches_type() {
        let repo = repository("cloudbeers/yolo");
        let api = InMemoryGitHub::new(repo.clone())
            .with_file("abc", "README.md", PathType::RegularFile)
            .with_file("abc", "docs", PathType::Directory);
        let probe = ApiProbe::new(&api, &repo, sha("abc"));

        assert!(PathCriteria::file("README.md")
            .is_head(&master(), &probe)
            .await
            .unwrap());
        assert!(!PathCriteria::file("docs")
            .is_head(&master(), &probe)
            .await
            .unwrap());
        assert!(!PathCriteria::file("Jenkinsfile")
            .is_head(&master(), &probe)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn accept_all_does_not_probe() {
        let repo = repository("cloudbeers/yolo");
        let api = InMemoryGitHub::new(repo.clone());
        let probe = ApiProbe::new(&api, &repo, sha("abc"));

        assert!(AcceptAll.is_head(&master(), &probe).await.unwrap());
        assert_eq!(api.call_count("stat_path"), 0);
    }
}
