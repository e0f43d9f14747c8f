//! GitHub REST adapter.
//!
//! Implements the [`discovery::GitHubApi`] port over the GitHub REST v3 API
//! using [`reqwest`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (authentication headers, pagination, rate-limit
//! headers, wire formats) are handled here; the [`discovery`] crate never
//! sees them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`client`] | [`RestClient`] and its `GitHubApi` implementation |
//! | [`response`] | HTTP status classification and `Link` pagination |
//! | [`wire`] | JSON payloads and their conversion to domain types |

pub mod client;
pub mod response;
pub mod wire;

pub use client::{ClientError, RestClient, DEFAULT_API_URL};
