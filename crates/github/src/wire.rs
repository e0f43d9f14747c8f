//! GitHub REST payloads.
//!
//! Only the fields discovery reads are declared; serde ignores the rest.
//! Each payload converts into its domain type with `into_domain`, failing
//! with [`ApiError::InvalidResponse`] when GitHub sends an empty identifier.

use discovery::{
    ApiError, BranchName, BranchRef, Commit, CommitSha, Login, OwnerName, PathType,
    PermissionLevel, PullRequest, PullRequestNumber, PullRequestState, RepositoryId,
    RepositoryInfo, RepositoryName, SourceRepository, User,
};
use serde::Deserialize;

fn invalid(field: &str) -> ApiError {
    ApiError::InvalidResponse {
        message: format!("GitHub sent an empty or invalid `{field}`"),
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| invalid(field))
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub login: String,
}

// ---------------------------------------------------------------------------
// Repositories and branches
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Account,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub html_url: Option<String>,
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
}

impl Repository {
    pub fn into_domain(self) -> Result<RepositoryInfo, ApiError> {
        Ok(RepositoryInfo {
            id: RepositoryId::new(
                required(OwnerName::new(self.owner.login), "owner.login")?,
                required(RepositoryName::new(self.name), "name")?,
            ),
            // GitHub sends "" for a cleared description or homepage.
            description: self.description.filter(|d| !d.is_empty()),
            homepage: self.homepage.filter(|h| !h.is_empty()),
            html_url: self.html_url,
            default_branch: required(BranchName::new(self.default_branch), "default_branch")?,
            private: self.private,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ObjectRef {
    pub sha: String,
}

impl ObjectRef {
    fn sha(self) -> Result<CommitSha, ApiError> {
        required(CommitSha::new(self.sha), "sha")
    }
}

/// An entry of `GET /repos/{owner}/{repo}/branches`.
#[derive(Debug, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: ObjectRef,
}

impl Branch {
    pub fn into_domain(self) -> Result<BranchRef, ApiError> {
        Ok(BranchRef {
            name: required(BranchName::new(self.name), "name")?,
            sha: self.commit.sha()?,
        })
    }
}

/// `GET /repos/{owner}/{repo}/git/ref/heads/{branch}`.
#[derive(Debug, Deserialize)]
pub struct GitRef {
    pub object: ObjectRef,
}

impl GitRef {
    pub fn into_domain(self) -> Result<CommitSha, ApiError> {
        self.object.sha()
    }
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub owner: Account,
}

/// The `head` or `base` of a pull request.
#[derive(Debug, Deserialize)]
pub struct PullRequestEnd {
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
    /// `null` when the fork has been deleted.
    pub repo: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    /// `"open"` or `"closed"`; merged pull requests are closed.
    #[serde(default)]
    pub state: Option<String>,
    pub user: Account,
    pub head: PullRequestEnd,
    pub base: PullRequestEnd,
    /// Absent from the list endpoint, `null` while GitHub is computing it.
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
}

impl PullRequestPayload {
    pub fn into_domain(self) -> Result<PullRequest, ApiError> {
        let source_repository = match self.head.repo {
            Some(repo) => Some(SourceRepository {
                owner: required(OwnerName::new(repo.owner.login), "head.repo.owner.login")?,
                name: required(RepositoryName::new(repo.name), "head.repo.name")?,
            }),
            None => None,
        };
        Ok(PullRequest {
            number: required(PullRequestNumber::new(self.number), "number")?,
            title: self.title,
            state: match self.state.as_deref() {
                None | Some("open") => PullRequestState::Open,
                Some(_) => PullRequestState::Closed,
            },
            author: required(Login::new(self.user.login), "user.login")?,
            source_repository,
            source_branch: required(BranchName::new(self.head.branch), "head.ref")?,
            head_sha: required(CommitSha::new(self.head.sha), "head.sha")?,
            base_branch: required(BranchName::new(self.base.branch), "base.ref")?,
            mergeable: self.mergeable,
            merge_commit_sha: self.merge_commit_sha.and_then(CommitSha::new),
        })
    }
}

// ---------------------------------------------------------------------------
// Commits, users, permissions, contents
// ---------------------------------------------------------------------------

/// `GET /repos/{owner}/{repo}/git/commits/{sha}`.
#[derive(Debug, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    #[serde(default)]
    pub parents: Vec<ObjectRef>,
}

impl GitCommit {
    pub fn into_domain(self) -> Result<Commit, ApiError> {
        Ok(Commit {
            sha: required(CommitSha::new(self.sha), "sha")?,
            parents: self
                .parents
                .into_iter()
                .map(ObjectRef::sha)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserPayload {
    pub fn into_domain(self) -> Result<User, ApiError> {
        Ok(User {
            login: required(Login::new(self.login), "login")?,
            name: self.name,
            email: self.email,
        })
    }
}

/// `GET /repos/{owner}/{repo}/collaborators/{username}/permission`.
///
/// `permission` only distinguishes admin, write, read and none; `role_name`
/// adds maintain and triage (and custom role names on organisations).
#[derive(Debug, Deserialize)]
pub struct CollaboratorPermission {
    pub permission: String,
    #[serde(default)]
    pub role_name: Option<String>,
}

impl CollaboratorPermission {
    pub fn into_domain(self) -> PermissionLevel {
        let level = |name: &str| match name {
            "admin" => Some(PermissionLevel::Admin),
            "maintain" => Some(PermissionLevel::Maintain),
            "write" => Some(PermissionLevel::Write),
            "triage" => Some(PermissionLevel::Triage),
            "read" => Some(PermissionLevel::Read),
            "none" => Some(PermissionLevel::None),
            _ => None,
        };
        self.role_name
            .as_deref()
            .and_then(level)
            .or_else(|| level(&self.permission))
            .unwrap_or(PermissionLevel::None)
    }
}

/// `GET /repos/{owner}/{repo}/contents/{path}` answers with an array for a
/// directory and an object with a `type` for anything else.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Listing(Vec<serde_json::Value>),
    Entry {
        #[serde(rename = "type")]
        kind: String,
    },
}

impl Contents {
    pub fn into_domain(self) -> PathType {
        match self {
            Self::Listing(_) => PathType::Directory,
            Self::Entry { kind } => match kind.as_str() {
                "file" => PathType::RegularFile,
                "dir" => PathType::Directory,
                "symlink" => PathType::Symlink,
                "submodule" => PathType::Submodule,
                _ => PathType::NonExistent,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pull_request_detail_decodes() {
        let json = r#"{
            "number": 2,
            "title": "Update README.md",
            "state": "open",
            "user": { "login": "stephenc", "id": 209336 },
            "head": {
                "ref": "master",
                "sha": "c0e024f89969b976da165eecaa71e09dc60c3da1",
                "repo": { "name": "yolo", "owner": { "login": "stephenc" } }
            },
            "base": {
                "ref": "master",
                "sha": "8f1314fc3c8284d8c6d5886d473db98f2126071c",
                "repo": { "name": "yolo", "owner": { "login": "cloudbeers" } }
            },
            "mergeable": true,
            "merge_commit_sha": "38814ca33833ff5fb8d6d35ad35f4d0a8d64ddaf"
        }"#;
        let pr = serde_json::from_str::<PullRequestPayload>(json)
            .unwrap()
            .into_domain()
            .unwrap();

        assert_eq!(pr.number.as_u64(), 2);
        assert_eq!(pr.state, PullRequestState::Open);
        assert_eq!(pr.author.as_str(), "stephenc");
        assert_eq!(
            pr.source_repository.map(|s| s.owner.to_string()),
            Some("stephenc".to_string())
        );
        assert_eq!(pr.base_branch.as_str(), "master");
        assert_eq!(pr.mergeable, Some(true));
        assert_eq!(
            pr.merge_commit_sha.map(|s| s.to_string()).as_deref(),
            Some("38814ca33833ff5fb8d6d35ad35f4d0a8d64ddaf")
        );
    }

    #[test]
    fn listed_pull_request_from_deleted_fork_decodes() {
        let json = r#"{
            "number": 7,
            "title": "Orphan",
            "user": { "login": "ghost" },
            "head": { "ref": "patch-1", "sha": "abc", "repo": null },
            "base": { "ref": "master", "sha": "def", "repo": null }
        }"#;
        let pr = serde_json::from_str::<PullRequestPayload>(json)
            .unwrap()
            .into_domain()
            .unwrap();
        assert_eq!(pr.source_repository, None);
        assert_eq!(pr.mergeable, None);
        assert_eq!(pr.merge_commit_sha, None);
    }

    #[test]
    fn merged_pull_request_is_closed() {
        let json = r#"{
            "number": 5,
            "state": "closed",
            "merged": true,
            "user": { "login": "stephenc" },
            "head": { "ref": "patch-5", "sha": "abc", "repo": null },
            "base": { "ref": "master", "sha": "def", "repo": null }
        }"#;
        let pr = serde_json::from_str::<PullRequestPayload>(json)
            .unwrap()
            .into_domain()
            .unwrap();
        assert_eq!(pr.state, PullRequestState::Closed);
    }

    #[test]
    fn empty_identifiers_are_invalid() {
        let branch = Branch {
            name: String::new(),
            commit: ObjectRef {
                sha: "abc".to_string(),
            },
        };
        assert!(matches!(
            branch.into_domain(),
            Err(ApiError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn commit_parents_decode_in_order() {
        let json = r#"{
            "sha": "38814ca3",
            "parents": [ { "sha": "8f1314fc", "url": "x" }, { "sha": "c0e024f8", "url": "y" } ]
        }"#;
        let commit = serde_json::from_str::<GitCommit>(json)
            .unwrap()
            .into_domain()
            .unwrap();
        assert_eq!(commit.parents.len(), 2);
        assert!(commit.is_merge_onto(&CommitSha::new("8f1314fc").unwrap()));
    }

    #[test]
    fn role_name_refines_permission() {
        let maintain: CollaboratorPermission =
            serde_json::from_str(r#"{ "permission": "write", "role_name": "maintain" }"#).unwrap();
        assert_eq!(maintain.into_domain(), PermissionLevel::Maintain);

        let custom: CollaboratorPermission =
            serde_json::from_str(r#"{ "permission": "read", "role_name": "security-auditor" }"#)
                .unwrap();
        assert_eq!(custom.into_domain(), PermissionLevel::Read);

        let legacy: CollaboratorPermission =
            serde_json::from_str(r#"{ "permission": "admin" }"#).unwrap();
        assert_eq!(legacy.into_domain(), PermissionLevel::Admin);
    }

    #[test]
    fn contents_distinguish_files_and_directories() {
        let file: Contents =
            serde_json::from_str(r#"{ "type": "file", "name": "Jenkinsfile", "size": 12 }"#)
                .unwrap();
        assert_eq!(file.into_domain(), PathType::RegularFile);

        let dir: Contents = serde_json::from_str(r#"[ { "type": "file", "name": "a" } ]"#).unwrap();
        assert_eq!(dir.into_domain(), PathType::Directory);

        let submodule: Contents = serde_json::from_str(r#"{ "type": "submodule" }"#).unwrap();
        assert_eq!(submodule.into_domain(), PathType::Submodule);
    }

    #[test]
    fn repository_drops_empty_description() {
        let json = r#"{
            "name": "yolo",
            "owner": { "login": "cloudbeers" },
            "description": "",
            "homepage": null,
            "html_url": "https://github.com/cloudbeers/yolo",
            "default_branch": "master",
            "private": false
        }"#;
        let info = serde_json::from_str::<Repository>(json)
            .unwrap()
            .into_domain()
            .unwrap();
        assert_eq!(info.id.to_string(), "cloudbeers/yolo");
        assert_eq!(info.description, None);
        assert_eq!(info.default_branch.as_str(), "master");
    }
}
