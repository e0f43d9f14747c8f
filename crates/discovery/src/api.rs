//! The GitHub REST collaborator port.
//!
//! Discovery never talks HTTP itself. It consumes [`GitHubApi`], which the
//! `github` crate implements over the REST v3 API and
//! `testing::InMemoryGitHub` implements for tests. Implementations
//! own transport concerns: authentication, pagination and mapping HTTP status
//! codes onto [`ApiError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::identifiers::{
    BranchName, CommitSha, Login, OwnerName, PullRequestNumber, RepositoryId, RepositoryName,
};

// ---------------------------------------------------------------------------
// Domain views of GitHub resources
// ---------------------------------------------------------------------------

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Canonical `owner/name` as GitHub reports it.
    pub id: RepositoryId,
    pub description: Option<String>,
    pub homepage: Option<String>,
    /// Web URL of the repository.
    pub html_url: Option<String>,
    pub default_branch: BranchName,
    pub private: bool,
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: BranchName,
    pub sha: CommitSha,
}

/// The repository holding a pull request's source branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepository {
    pub owner: OwnerName,
    pub name: RepositoryName,
}

/// Whether a pull request is still open. Merged pull requests are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    #[default]
    Open,
    Closed,
}

/// A pull request as GitHub reports it.
///
/// The list endpoint never computes `mergeable`; only
/// [`GitHubApi::get_pull_request`] does, and even then it may still be `None`
/// while GitHub works it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: PullRequestNumber,
    pub title: String,
    pub state: PullRequestState,
    pub author: Login,
    /// `None` when the fork holding the source branch has been deleted.
    pub source_repository: Option<SourceRepository>,
    pub source_branch: BranchName,
    /// Head commit of the source branch.
    pub head_sha: CommitSha,
    /// Target branch.
    pub base_branch: BranchName,
    /// `Some(true)` / `Some(false)` once computed, `None` while unknown.
    pub mergeable: Option<bool>,
    /// GitHub's test merge commit, when one has been created.
    pub merge_commit_sha: Option<CommitSha>,
}

/// A commit and its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: CommitSha,
    pub parents: Vec<CommitSha>,
}

impl Commit {
    /// Returns `true` if this is a two-parent merge commit built on `base`.
    pub fn is_merge_onto(&self, base: &CommitSha) -> bool {
        self.parents.len() == 2 && self.parents.contains(base)
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: Login,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A collaborator's effective permission on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Admin,
    Maintain,
    Write,
    Triage,
    Read,
    None,
}

impl PermissionLevel {
    /// Returns `true` for levels that can push to the repository.
    pub fn can_write(self) -> bool {
        matches!(self, Self::Admin | Self::Maintain | Self::Write)
    }
}

/// What a path resolves to in a commit's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    RegularFile,
    Directory,
    Symlink,
    Submodule,
    NonExistent,
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Read access to the GitHub REST API, scoped by repository per call.
///
/// Every method maps a missing resource to [`ApiError::NotFound`]; callers
/// decide whether that is fatal.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /repos/{owner}/{repo}`
    async fn get_repository(&self, repo: &RepositoryId) -> Result<RepositoryInfo, ApiError>;

    /// `GET /repos/{owner}/{repo}/branches`, all pages.
    async fn list_branches(&self, repo: &RepositoryId) -> Result<Vec<BranchRef>, ApiError>;

    /// Current head commit of one branch (`GET /repos/{owner}/{repo}/git/ref/heads/{branch}`).
    async fn get_branch_ref(
        &self,
        repo: &RepositoryId,
        branch: &BranchName,
    ) -> Result<CommitSha, ApiError>;

    /// `GET /repos/{owner}/{repo}/pulls?state=open`, all pages, in the order
    /// GitHub returns them.
    async fn list_open_pull_requests(
        &self,
        repo: &RepositoryId,
    ) -> Result<Vec<PullRequest>, ApiError>;

    /// `GET /repos/{owner}/{repo}/pulls/{number}`, which also triggers
    /// GitHub's mergeability computation.
    async fn get_pull_request(
        &self,
        repo: &RepositoryId,
        number: PullRequestNumber,
    ) -> Result<PullRequest, ApiError>;

    /// `GET /repos/{owner}/{repo}/commits/{sha}`
    async fn get_commit(&self, repo: &RepositoryId, sha: &CommitSha) -> Result<Commit, ApiError>;

    /// `GET /repos/{owner}/{repo}/collaborators/{user}/permission`
    async fn get_collaborator_permission(
        &self,
        repo: &RepositoryId,
        user: &Login,
    ) -> Result<PermissionLevel, ApiError>;

    /// `GET /users/{login}`
    async fn get_user(&self, login: &Login) -> Result<User, ApiError>;

    /// Type of `path` in the tree of commit `sha`
    /// (`GET /repos/{owner}/{repo}/contents/{path}?ref={sha}`). A missing path
    /// is [`PathType::NonExistent`], not an error.
    async fn stat_path(
        &self,
        repo: &RepositoryId,
        sha: &CommitSha,
        path: &str,
    ) -> Result<PathType, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(value: &str) -> CommitSha {
        CommitSha::new(value).unwrap()
    }

    #[test]
    fn merge_commit_must_have_two_parents_including_base() {
        let commit = Commit {
            sha: sha("merge"),
            parents: vec![sha("base"), sha("pull")],
        };
        assert!(commit.is_merge_onto(&sha("base")));
        assert!(!commit.is_merge_onto(&sha("moved-base")));

        let single_parent = Commit {
            sha: sha("merge"),
            parents: vec![sha("base")],
        };
        assert!(!single_parent.is_merge_onto(&sha("base")));
    }

    #[test]
    fn only_push_levels_can_write() {
        assert!(PermissionLevel::Admin.can_write());
        assert!(PermissionLevel::Maintain.can_write());
        assert!(PermissionLevel::Write.can_write());
        assert!(!PermissionLevel::Triage.can_write());
        assert!(!PermissionLevel::Read.can_write());
        assert!(!PermissionLevel::None.can_write());
    }
}
