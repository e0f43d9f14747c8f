//! Who may have their pull requests built with elevated semantics.
//!
//! A trusted pull request may be built as a merge and may have its own build
//! definition honoured; an untrusted one is only built as its isolated head,
//! with the build definition taken from the target branch.
//!
//! Pull requests from the scanned repository itself are always trusted. For
//! forks the configured [`TrustPolicy`] decides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::api::{GitHubApi, PermissionLevel};
use crate::identifiers::{Login, OwnerName, RepositoryId};
use crate::revision::HeadOrigin;

/// Which fork contributors are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustPolicy {
    /// No fork is trusted.
    Nobody,
    /// Forks owned by the repository's own account are trusted.
    SameAccount,
    /// Same-account forks and authors with write access or better are trusted.
    #[default]
    Contributors,
    /// Every fork is trusted.
    Everyone,
}

/// Outcome of a trust evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    Trusted,
    Untrusted,
}

impl TrustDecision {
    pub fn is_trusted(self) -> bool {
        self == Self::Trusted
    }
}

/// The facts about one pull request that trust depends on.
#[derive(Debug, Clone, Copy)]
pub struct TrustSubject<'a> {
    pub origin: HeadOrigin,
    pub source_owner: &'a OwnerName,
    pub author: &'a Login,
}

/// Applies a [`TrustPolicy`] for the duration of one scan.
///
/// Permission lookups are cached per author for the evaluator's lifetime;
/// create a new evaluator for every scan. Concurrent evaluations for the same
/// author share one lookup. A failed lookup is not cached.
pub struct TrustEvaluator<'a> {
    policy: TrustPolicy,
    api: &'a dyn GitHubApi,
    repository: &'a RepositoryId,
    permissions: Mutex<HashMap<Login, Arc<OnceCell<PermissionLevel>>>>,
}

impl<'a> TrustEvaluator<'a> {
    pub fn new(policy: TrustPolicy, api: &'a dyn GitHubApi, repository: &'a RepositoryId) -> Self {
        Self {
            policy,
            api,
            repository,
            permissions: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    /// Classifies one pull request. Never fails: a permission lookup that
    /// errors (rate limit, 403, 404) counts as untrusted.
    pub async fn evaluate(&self, subject: TrustSubject<'_>) -> TrustDecision {
        if subject.origin == HeadOrigin::Origin {
            return TrustDecision::Trusted;
        }

        let same_account = subject.source_owner.eq_ignore_case(&self.repository.owner);
        let trusted = match self.policy {
            TrustPolicy::Nobody => false,
            TrustPolicy::SameAccount => same_account,
            TrustPolicy::Contributors => {
                same_account || self.author_can_write(subject.author).await
            }
            TrustPolicy::Everyone => true,
        };

        debug!(
            policy = ?self.policy,
            source_owner = %subject.source_owner,
            author = %subject.author,
            trusted,
            "evaluated fork trust"
        );
        if trusted {
            TrustDecision::Trusted
        } else {
            TrustDecision::Untrusted
        }
    }

    async fn author_can_write(&self, author: &Login) -> bool {
        let permission = self.permission_of(author);
        let lookup = permission
            .get_or_try_init(|| self.api.get_collaborator_permission(self.repository, author))
            .await;

        match lookup {
            Ok(level) => level.can_write(),
            Err(error) => {
                warn!(
                    author = %author,
                    repository = %self.repository,
                    %error,
                    "permission lookup failed; treating author as untrusted"
                );
                false
            }
        }
    }

    fn permission_of(&self, author: &Login) -> Arc<OnceCell<PermissionLevel>> {
        self.permissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(author.clone())
            .or_default()
            .clone()
    }
}
