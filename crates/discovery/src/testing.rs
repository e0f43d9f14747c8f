//! An in-memory, scriptable [`GitHubApi`] for tests.
//!
//! Responses are configured with builder methods before the fake is handed to
//! an engine. Endpoints that GitHub answers differently over time (the
//! pull-request detail while mergeability is computed, a branch ref that
//! vanishes and comes back) take a script: each call consumes the next
//! response and the last one repeats forever.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{
    BranchRef, Commit, GitHubApi, PathType, PermissionLevel, PullRequest, PullRequestState,
    RepositoryInfo, SourceRepository, User,
};
use crate::errors::ApiError;
use crate::identifiers::{BranchName, CommitSha, Login, PullRequestNumber, RepositoryId};

/// Builds a [`CommitSha`] from a literal. Panics on an empty string.
pub fn sha(value: &str) -> CommitSha {
    CommitSha::new(value).expect("commit sha literal must not be empty")
}

/// Builds an open pull request with mergeability not yet computed.
///
/// `source` is `"owner/repo"` of the repository holding `branch`.
pub fn pull_request(
    number: u64,
    author: &str,
    source: &str,
    branch: &str,
    head_sha: &str,
    base: &str,
) -> PullRequest {
    let source = RepositoryId::parse(source).expect("source must be owner/repo");
    PullRequest {
        number: PullRequestNumber::new(number).expect("pull request number must be positive"),
        title: format!("Pull request {number}"),
        state: PullRequestState::Open,
        author: Login::new(author).expect("author must not be empty"),
        source_repository: Some(SourceRepository {
            owner: source.owner,
            name: source.name,
        }),
        source_branch: BranchName::new(branch).expect("branch must not be empty"),
        head_sha: sha(head_sha),
        base_branch: BranchName::new(base).expect("base must not be empty"),
        mergeable: None,
        merge_commit_sha: None,
    }
}

/// Responses that repeat their last entry once the script is used up.
#[derive(Debug)]
struct Script<T>(VecDeque<T>);

impl<T: Clone> Script<T> {
    fn new(responses: Vec<T>) -> Self {
        Self(responses.into())
    }

    fn next(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: HashMap<&'static str, usize>,
    pull_request_scripts: HashMap<u64, Script<Result<PullRequest, ApiError>>>,
    branch_ref_scripts: HashMap<String, Script<Result<CommitSha, ApiError>>>,
}

/// In-memory GitHub serving one repository.
#[derive(Debug)]
pub struct InMemoryGitHub {
    repository: Result<RepositoryInfo, ApiError>,
    branches: Result<Vec<BranchRef>, ApiError>,
    pull_requests: Result<Vec<PullRequest>, ApiError>,
    commits: HashMap<String, Result<Commit, ApiError>>,
    users: HashMap<String, Result<User, ApiError>>,
    permissions: HashMap<String, Result<PermissionLevel, ApiError>>,
    files: HashMap<(String, String), PathType>,
    latency: Option<Duration>,
    state: Mutex<State>,
}

impl InMemoryGitHub {
    /// Creates an empty repository whose default branch is `master`.
    pub fn new(id: RepositoryId) -> Self {
        let repository = RepositoryInfo {
            id,
            description: None,
            homepage: None,
            html_url: None,
            default_branch: BranchName::new("master").expect("literal is not empty"),
            private: false,
        };
        Self {
            repository: Ok(repository),
            branches: Ok(Vec::new()),
            pull_requests: Ok(Vec::new()),
            commits: HashMap::new(),
            users: HashMap::new(),
            permissions: HashMap::new(),
            files: HashMap::new(),
            latency: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Replaces the repository metadata.
    pub fn with_repository_info(mut self, info: RepositoryInfo) -> Self {
        self.repository = Ok(info);
        self
    }

    /// Makes `get_repository` fail.
    pub fn fail_repository(mut self, error: ApiError) -> Self {
        self.repository = Err(error);
        self
    }

    /// Adds a branch, listed in insertion order.
    pub fn with_branch(mut self, name: &str, head: &str) -> Self {
        if let Ok(branches) = &mut self.branches {
            branches.push(BranchRef {
                name: BranchName::new(name).expect("branch must not be empty"),
                sha: sha(head),
            });
        }
        self
    }

    /// Makes `list_branches` fail.
    pub fn fail_branch_listing(mut self, error: ApiError) -> Self {
        self.branches = Err(error);
        self
    }

    /// Adds an open pull request, listed in insertion order. Unless scripted,
    /// `get_pull_request` returns it unchanged.
    pub fn with_pull_request(mut self, pr: PullRequest) -> Self {
        if let Ok(pull_requests) = &mut self.pull_requests {
            pull_requests.push(pr);
        }
        self
    }

    /// Makes `list_open_pull_requests` fail.
    pub fn fail_pull_request_listing(mut self, error: ApiError) -> Self {
        self.pull_requests = Err(error);
        self
    }

    /// Scripts successive `get_pull_request` responses for `number`.
    pub fn script_pull_request(
        self,
        number: u64,
        responses: Vec<Result<PullRequest, ApiError>>,
    ) -> Self {
        self.lock()
            .pull_request_scripts
            .insert(number, Script::new(responses));
        self
    }

    /// Scripts successive `get_branch_ref` responses for `branch`.
    pub fn script_branch_ref(
        self,
        branch: &str,
        responses: Vec<Result<CommitSha, ApiError>>,
    ) -> Self {
        self.lock()
            .branch_ref_scripts
            .insert(branch.to_string(), Script::new(responses));
        self
    }

    /// Adds a commit with the given parents.
    pub fn with_commit(mut self, commit: &str, parents: &[&str]) -> Self {
        self.commits.insert(
            commit.to_string(),
            Ok(Commit {
                sha: sha(commit),
                parents: parents.iter().map(|p| sha(p)).collect(),
            }),
        );
        self
    }

    /// Makes `get_commit` fail for `commit`.
    pub fn fail_commit(mut self, commit: &str, error: ApiError) -> Self {
        self.commits.insert(commit.to_string(), Err(error));
        self
    }

    /// Adds account details for a user. Users without an entry resolve to a
    /// bare account.
    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.login.to_string(), Ok(user));
        self
    }

    /// Makes `get_user` fail for `login`.
    pub fn fail_user(mut self, login: &str, error: ApiError) -> Self {
        self.users.insert(login.to_string(), Err(error));
        self
    }

    /// Grants `login` a collaborator permission. Users without an entry are
    /// not collaborators (404).
    pub fn with_permission(mut self, login: &str, level: PermissionLevel) -> Self {
        self.permissions.insert(login.to_string(), Ok(level));
        self
    }

    /// Makes the permission lookup for `login` fail.
    pub fn fail_permission(mut self, login: &str, error: ApiError) -> Self {
        self.permissions.insert(login.to_string(), Err(error));
        self
    }

    /// Places `path` in the tree of `commit`. Unlisted paths do not exist.
    pub fn with_file(mut self, commit: &str, path: &str, kind: PathType) -> Self {
        self.files
            .insert((commit.to_string(), path.to_string()), kind);
        self
    }

    /// Delays every response by `latency`, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made to the named [`GitHubApi`] method.
    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, method: &'static str) {
        *self.lock().calls.entry(method).or_default() += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_repository(&self, repo: &RepositoryId) -> Result<(), ApiError> {
        match &self.repository {
            Ok(info) if info.id.eq_ignore_case(repo) => Ok(()),
            Ok(_) => Err(ApiError::not_found(format!("repository {repo}"))),
            Err(error) => Err(error.clone()),
        }
    }
}

#[async_trait]
impl GitHubApi for InMemoryGitHub {
    async fn get_repository(&self, repo: &RepositoryId) -> Result<RepositoryInfo, ApiError> {
        self.enter("get_repository").await;
        self.check_repository(repo)?;
        self.repository.clone()
    }

    async fn list_branches(&self, repo: &RepositoryId) -> Result<Vec<BranchRef>, ApiError> {
        self.enter("list_branches").await;
        self.check_repository(repo)?;
        self.branches.clone()
    }

    async fn get_branch_ref(
        &self,
        repo: &RepositoryId,
        branch: &BranchName,
    ) -> Result<CommitSha, ApiError> {
        self.enter("get_branch_ref").await;
        self.check_repository(repo)?;
        if let Some(script) = self.lock().branch_ref_scripts.get_mut(branch.as_str()) {
            if let Some(response) = script.next() {
                return response;
            }
        }
        self.branches
            .as_ref()
            .ok()
            .and_then(|branches| branches.iter().find(|b| &b.name == branch))
            .map(|b| b.sha.clone())
            .ok_or_else(|| ApiError::not_found(format!("refs/heads/{branch}")))
    }

    async fn list_open_pull_requests(
        &self,
        repo: &RepositoryId,
    ) -> Result<Vec<PullRequest>, ApiError> {
        self.enter("list_open_pull_requests").await;
        self.check_repository(repo)?;
        // The list endpoint never reports mergeability.
        self.pull_requests.clone().map(|prs| {
            prs.into_iter()
                .filter(|pr| pr.state == PullRequestState::Open)
                .map(|pr| PullRequest {
                    mergeable: None,
                    ..pr
                })
                .collect()
        })
    }

    async fn get_pull_request(
        &self,
        repo: &RepositoryId,
        number: PullRequestNumber,
    ) -> Result<PullRequest, ApiError> {
        self.enter("get_pull_request").await;
        self.check_repository(repo)?;
        if let Some(script) = self.lock().pull_request_scripts.get_mut(&number.as_u64()) {
            if let Some(response) = script.next() {
                return response;
            }
        }
        self.pull_requests
            .as_ref()
            .ok()
            .and_then(|prs| prs.iter().find(|pr| pr.number == number))
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("pull request #{number}")))
    }

    async fn get_commit(&self, repo: &RepositoryId, sha: &CommitSha) -> Result<Commit, ApiError> {
        self.enter("get_commit").await;
        self.check_repository(repo)?;
        self.commits
            .get(sha.as_str())
            .cloned()
            .unwrap_or_else(|| Err(ApiError::not_found(format!("commit {sha}"))))
    }

    async fn get_collaborator_permission(
        &self,
        repo: &RepositoryId,
        user: &Login,
    ) -> Result<PermissionLevel, ApiError> {
        self.enter("get_collaborator_permission").await;
        self.check_repository(repo)?;
        self.permissions
            .get(user.as_str())
            .cloned()
            .unwrap_or_else(|| Err(ApiError::not_found(format!("{user} is not a collaborator"))))
    }

    async fn get_user(&self, login: &Login) -> Result<User, ApiError> {
        self.enter("get_user").await;
        self.users.get(login.as_str()).cloned().unwrap_or_else(|| {
            Ok(User {
                login: login.clone(),
                name: None,
                email: None,
            })
        })
    }

    async fn stat_path(
        &self,
        repo: &RepositoryId,
        sha: &CommitSha,
        path: &str,
    ) -> Result<PathType, ApiError> {
        self.enter("stat_path").await;
        self.check_repository(repo)?;
        Ok(self
            .files
            .get(&(sha.to_string(), path.to_string()))
            .copied()
            .unwrap_or(PathType::NonExistent))
    }
}

/// Parses `"owner/name"` into a [`RepositoryId`]. Panics on malformed input.
pub fn repository(value: &str) -> RepositoryId {
    RepositoryId::parse(value).expect("repository must be owner/name")
}
