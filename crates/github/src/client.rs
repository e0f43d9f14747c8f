//! [`RestClient`]: the REST implementation of [`GitHubApi`].

use std::time::Duration;

use async_trait::async_trait;
use discovery::{
    ApiError, BranchName, BranchRef, Commit, CommitSha, GitHubApi, Login, PathType,
    PermissionLevel, PullRequest, PullRequestNumber, RepositoryId, RepositoryInfo, User,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client as HttpClient, Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::response::{classify, next_link};
use crate::wire;

/// The public GitHub API root. GitHub Enterprise uses `https://<host>/api/v3`.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: &str = "100";
const USER_AGENT: &str = concat!("branch-scan/", env!("CARGO_PKG_VERSION"));

/// Failure to construct a [`RestClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid GitHub API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// GitHub REST v3 client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: HttpClient,
    base_url: Url,
    token: Option<String>,
}

impl RestClient {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// Without a token only public repositories are visible and the rate
    /// limit is much lower.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: parsed,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// `{base}/repos/{owner}/{repo}/{segments...}` with every segment
    /// percent-encoded.
    fn repo_url<'a>(
        &self,
        repo: &'a RepositoryId,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, ApiError> {
        self.url(
            ["repos", repo.owner.as_str(), repo.name.as_str()]
                .into_iter()
                .chain(segments),
        )
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidResponse {
                message: format!("cannot extend API URL {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, url: Url, resource: &str) -> Result<Response, ApiError> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| ApiError::Transport {
            message: format!("{resource}: {e}"),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, resource, "GitHub refused request");
        Err(classify(status, &headers, resource, &body))
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        resource: &str,
    ) -> Result<T, ApiError> {
        let body = response.text().await.map_err(|e| ApiError::Transport {
            message: format!("{resource}: {e}"),
        })?;
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse {
            message: format!("{resource}: {e}"),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, resource: &str) -> Result<T, ApiError> {
        let response = self.send(url, resource).await?;
        Self::decode(response, resource).await
    }

    /// Follows `Link: rel="next"` until the last page.
    async fn get_all<T: DeserializeOwned>(
        &self,
        mut url: Url,
        resource: &str,
    ) -> Result<Vec<T>, ApiError> {
        url.query_pairs_mut().append_pair("per_page", PAGE_SIZE);
        let mut items = Vec::new();
        loop {
            let response = self.send(url, resource).await?;
            let next = next_link(response.headers());
            let page: Vec<T> = Self::decode(response, resource).await?;
            items.extend(page);

            match next {
                Some(next) => {
                    url = Url::parse(&next).map_err(|e| ApiError::InvalidResponse {
                        message: format!("{resource}: bad next link '{next}': {e}"),
                    })?;
                }
                None => return Ok(items),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GitHubApi
// ---------------------------------------------------------------------------

#[async_trait]
impl GitHubApi for RestClient {
    #[instrument(level = "debug", skip_all, fields(repository = %repo))]
    async fn get_repository(&self, repo: &RepositoryId) -> Result<RepositoryInfo, ApiError> {
        let url = self.repo_url(repo, std::iter::empty())?;
        let payload: wire::Repository = self.get(url, &format!("repository {repo}")).await?;
        payload.into_domain()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo))]
    async fn list_branches(&self, repo: &RepositoryId) -> Result<Vec<BranchRef>, ApiError> {
        let url = self.repo_url(repo, ["branches"])?;
        let payload: Vec<wire::Branch> = self.get_all(url, "branches").await?;
        payload.into_iter().map(wire::Branch::into_domain).collect()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo, %branch))]
    async fn get_branch_ref(
        &self,
        repo: &RepositoryId,
        branch: &BranchName,
    ) -> Result<CommitSha, ApiError> {
        let url = self.repo_url(
            repo,
            ["git", "ref", "heads"]
                .into_iter()
                .chain(branch.as_str().split('/')),
        )?;
        let payload: wire::GitRef = self.get(url, &format!("refs/heads/{branch}")).await?;
        payload.into_domain()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo))]
    async fn list_open_pull_requests(
        &self,
        repo: &RepositoryId,
    ) -> Result<Vec<PullRequest>, ApiError> {
        let mut url = self.repo_url(repo, ["pulls"])?;
        url.query_pairs_mut().append_pair("state", "open");
        let payload: Vec<wire::PullRequestPayload> = self.get_all(url, "pull requests").await?;
        payload
            .into_iter()
            .map(wire::PullRequestPayload::into_domain)
            .collect()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo, %number))]
    async fn get_pull_request(
        &self,
        repo: &RepositoryId,
        number: PullRequestNumber,
    ) -> Result<PullRequest, ApiError> {
        let number_segment = number.to_string();
        let url = self.repo_url(repo, ["pulls", number_segment.as_str()])?;
        let payload: wire::PullRequestPayload =
            self.get(url, &format!("pull request #{number}")).await?;
        payload.into_domain()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo, %sha))]
    async fn get_commit(&self, repo: &RepositoryId, sha: &CommitSha) -> Result<Commit, ApiError> {
        let url = self.repo_url(repo, ["git", "commits", sha.as_str()])?;
        let payload: wire::GitCommit = self.get(url, &format!("commit {sha}")).await?;
        payload.into_domain()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo, %user))]
    async fn get_collaborator_permission(
        &self,
        repo: &RepositoryId,
        user: &Login,
    ) -> Result<PermissionLevel, ApiError> {
        let url = self.repo_url(repo, ["collaborators", user.as_str(), "permission"])?;
        let payload: wire::CollaboratorPermission = self
            .get(url, &format!("collaborator permission of {user}"))
            .await?;
        Ok(payload.into_domain())
    }

    #[instrument(level = "debug", skip_all, fields(%login))]
    async fn get_user(&self, login: &Login) -> Result<User, ApiError> {
        let url = self.url(["users", login.as_str()])?;
        let payload: wire::UserPayload = self.get(url, &format!("user {login}")).await?;
        payload.into_domain()
    }

    #[instrument(level = "debug", skip_all, fields(repository = %repo, %sha, path = %path))]
    async fn stat_path(
        &self,
        repo: &RepositoryId,
        sha: &CommitSha,
        path: &str,
    ) -> Result<PathType, ApiError> {
        let mut url = self.repo_url(
            repo,
            ["contents"]
                .into_iter()
                .chain(path.split('/').filter(|s| !s.is_empty())),
        )?;
        url.query_pairs_mut().append_pair("ref", sha.as_str());

        match self.get::<wire::Contents>(url, path).await {
            Ok(contents) => Ok(contents.into_domain()),
            Err(error) if error.is_not_found() => Ok(PathType::NonExistent),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client(base: &str) -> RestClient {
        RestClient::new(base, Some("ghp_test".to_string()), Duration::from_secs(5)).unwrap()
    }

    fn yolo() -> RepositoryId {
        RepositoryId::parse("cloudbeers/yolo").unwrap()
    }

    #[test]
    fn repository_urls_are_rooted_at_the_base() {
        let client = client(DEFAULT_API_URL);
        assert_eq!(
            client.repo_url(&yolo(), ["pulls", "2"]).unwrap().as_str(),
            "https://api.github.com/repos/cloudbeers/yolo/pulls/2"
        );
    }

    #[test]
    fn enterprise_base_path_is_kept() {
        let client = client("https://ghe.example.com/api/v3");
        assert_eq!(
            client.url(["users", "stephenc"]).unwrap().as_str(),
            "https://ghe.example.com/api/v3/users/stephenc"
        );
    }

    #[test]
    fn segments_are_percent_encoded() {
        let client = client(DEFAULT_API_URL);
        let url = client
            .repo_url(&yolo(), ["git", "ref", "heads", "feature", "50% off"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/cloudbeers/yolo/git/ref/heads/feature/50%25%20off"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = RestClient::new("not a url", None, Duration::from_secs(5));
        assert!(matches!(result, Err(ClientError::InvalidUrl { .. })));
    }

    #[test]
    fn empty_token_is_treated_as_anonymous() {
        let client = RestClient::new(DEFAULT_API_URL, Some(String::new()), Duration::from_secs(5))
            .unwrap();
        assert!(client.token.is_none());
    }
}
