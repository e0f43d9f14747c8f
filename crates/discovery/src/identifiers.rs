//! Newtype domain identifiers.
//!
//! Every GitHub concept that has an identity is represented as a distinct
//! newtype wrapping a primitive. This prevents accidentally interchanging, for
//! example, a [`BranchName`] with a [`CommitSha`] even though both are strings
//! under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| format!("{} must not be empty", stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers backed by GitHub integers
// ---------------------------------------------------------------------------

/// A GitHub pull-request number.
///
/// GitHub assigns these starting at 1 per repository, so zero is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a pull-request number, returning `None` for zero.
    pub fn new(value: u64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for PullRequestNumber {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "pull request numbers start at 1".to_string())
    }
}

impl From<PullRequestNumber> for u64 {
    fn from(value: PullRequestNumber) -> Self {
        value.0
    }
}

impl std::fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers backed by UUIDs (generated locally)
// ---------------------------------------------------------------------------

/// Identifies a single discovery scan (one `fetch` call).
///
/// Generated fresh for every scan and recorded on the scan span so all log
/// events of one scan can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(Uuid);

impl ScanId {
    /// Generates a new random scan identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers backed by strings (GitHub and Git names)
// ---------------------------------------------------------------------------

string_id! {
    /// A Git branch name (e.g. `"master"`, `"stephenc-patch-1"`).
    BranchName
}

string_id! {
    /// A Git commit SHA (40-character lowercase hex string).
    CommitSha
}

string_id! {
    /// A GitHub account (user or organisation) that owns a repository.
    ///
    /// GitHub treats account names case-insensitively; use
    /// [`OwnerName::eq_ignore_case`] whenever two owners are compared for
    /// trust or origin decisions.
    OwnerName
}

string_id! {
    /// The name part of a repository (`"yolo"` in `"cloudbeers/yolo"`).
    RepositoryName
}

string_id! {
    /// A GitHub user login (e.g. the author of a pull request).
    Login
}

impl OwnerName {
    /// Compares two account names the way GitHub does: ignoring ASCII case.
    pub fn eq_ignore_case(&self, other: &OwnerName) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl CommitSha {
    /// Returns the first seven characters, for log output.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Repository coordinates
// ---------------------------------------------------------------------------

/// Identifies a GitHub repository as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    /// Owning account.
    pub owner: OwnerName,
    /// Repository name.
    pub name: RepositoryName,
}

impl RepositoryId {
    /// Creates a repository identifier from its parts.
    pub fn new(owner: OwnerName, name: RepositoryName) -> Self {
        Self { owner, name }
    }

    /// Parses `"owner/name"`, returning `None` for any other shape.
    pub fn parse(value: &str) -> Option<Self> {
        let (owner, name) = value.split_once('/')?;
        if name.contains('/') {
            return None;
        }
        Some(Self {
            owner: OwnerName::new(owner)?,
            name: RepositoryName::new(name)?,
        })
    }

    /// Returns `true` if both coordinates match ignoring ASCII case.
    pub fn eq_ignore_case(&self, other: &RepositoryId) -> bool {
        self.owner.eq_ignore_case(&other.owner)
            && self.name.as_str().eq_ignore_ascii_case(other.name.as_str())
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_are_rejected() {
        assert!(BranchName::new("").is_none());
        assert!(CommitSha::new(String::new()).is_none());
        assert_eq!(BranchName::new("master").unwrap().as_str(), "master");
    }

    #[test]
    fn pull_request_number_zero_is_rejected() {
        assert!(PullRequestNumber::new(0).is_none());
        assert_eq!(PullRequestNumber::new(2).unwrap().to_string(), "2");
    }

    #[test]
    fn owner_comparison_ignores_case() {
        let upper = OwnerName::new("CloudBeers").unwrap();
        let lower = OwnerName::new("cloudbeers").unwrap();
        assert!(upper.eq_ignore_case(&lower));
        assert_ne!(upper, lower);
    }

    #[test]
    fn repository_id_parses_owner_and_name() {
        let repo = RepositoryId::parse("cloudbeers/yolo").unwrap();
        assert_eq!(repo.owner.as_str(), "cloudbeers");
        assert_eq!(repo.name.as_str(), "yolo");
        assert_eq!(repo.to_string(), "cloudbeers/yolo");

        assert!(RepositoryId::parse("cloudbeers").is_none());
        assert!(RepositoryId::parse("/yolo").is_none());
        assert!(RepositoryId::parse("a/b/c").is_none());
    }

    #[test]
    fn short_sha_truncates_to_seven_characters() {
        let sha = CommitSha::new("8f1314fc3c8284d8c6d5886d473db98f2126071c").unwrap();
        assert_eq!(sha.short(), "8f1314f");
        assert_eq!(CommitSha::new("abc").unwrap().short(), "abc");
    }

    #[test]
    fn empty_identifier_fails_to_deserialize() {
        let result: Result<BranchName, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }
}
