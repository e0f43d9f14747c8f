//! What a scan discovers and how.
//!
//! [`DiscoveryConfig`] deserialises from any `serde` format with every field
//! optional; missing fields take the defaults documented on each field.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::retry::{PollBudget, DEFAULT_ATTEMPTS};
use crate::revision::{CheckoutStrategy, HeadOrigin};
use crate::trust::TrustPolicy;

/// Discovery options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Report branches of the repository. Default `true`.
    pub build_origin_branches: bool,
    /// Also report branches that are the source of an open pull request from
    /// the same repository. Default `true`.
    pub build_origin_branch_with_pr: bool,
    /// Build same-repository pull requests merged with their target. Default `false`.
    pub build_origin_pr_merge: bool,
    /// Build same-repository pull requests at their own head. Default `false`.
    pub build_origin_pr_head: bool,
    /// Build fork pull requests merged with their target. Default `true`.
    pub build_fork_pr_merge: bool,
    /// Build fork pull requests at their own head. Default `false`.
    pub build_fork_pr_head: bool,
    /// Which fork contributors are trusted. Default `contributors`.
    pub trust_policy: TrustPolicy,
    /// Observations of a pull request's merge state before recording it as
    /// unknown. Default 3.
    pub merge_state_attempts: u32,
    /// Pause between merge-state observations, in milliseconds. Default 1000.
    pub merge_state_poll_interval_ms: u64,
    /// Pull requests resolved concurrently. Default 4.
    pub max_concurrent_resolutions: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            build_origin_branches: true,
            build_origin_branch_with_pr: true,
            build_origin_pr_merge: false,
            build_origin_pr_head: false,
            build_fork_pr_merge: true,
            build_fork_pr_head: false,
            trust_policy: TrustPolicy::default(),
            merge_state_attempts: DEFAULT_ATTEMPTS,
            merge_state_poll_interval_ms: 1000,
            max_concurrent_resolutions: 4,
        }
    }
}

impl DiscoveryConfig {
    /// Checks values that deserialisation cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merge_state_attempts == 0 {
            return Err(ConfigError {
                message: "merge_state_attempts must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_resolutions == 0 {
            return Err(ConfigError {
                message: "max_concurrent_resolutions must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The configured checkout strategies for pull requests of `origin`,
    /// before trust is taken into account. Merge comes first.
    pub fn strategies_for(&self, origin: HeadOrigin) -> Vec<CheckoutStrategy> {
        let (merge, head) = match origin {
            HeadOrigin::Origin => (self.build_origin_pr_merge, self.build_origin_pr_head),
            HeadOrigin::Fork => (self.build_fork_pr_merge, self.build_fork_pr_head),
        };
        let mut strategies = Vec::with_capacity(2);
        if merge {
            strategies.push(CheckoutStrategy::Merge);
        }
        if head {
            strategies.push(CheckoutStrategy::Head);
        }
        strategies
    }

    /// Returns `true` if any pull request would be built at all.
    pub fn builds_pull_requests(&self) -> bool {
        self.build_origin_pr_merge
            || self.build_origin_pr_head
            || self.build_fork_pr_merge
            || self.build_fork_pr_head
    }

    /// The merge-state poll budget.
    ///
    /// Falls back to the default budget when `merge_state_attempts` is zero;
    /// [`DiscoveryConfig::validate`] rejects that value up front.
    pub fn poll_budget(&self) -> PollBudget {
        PollBudget::new(
            self.merge_state_attempts,
            Duration::from_millis(self.merge_state_poll_interval_ms),
        )
        .unwrap_or_default()
    }
}
