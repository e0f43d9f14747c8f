//! Turning non-success HTTP responses into [`ApiError`]s, and following
//! `Link` pagination.

use discovery::{ApiError, Timestamp};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;

/// GitHub's error body: `{"message": "...", "documentation_url": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// The `message` of a GitHub error body, or the raw body if it is not JSON.
fn message_of(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Returns `true` if a 403 or 429 is GitHub refusing for rate-limit reasons.
///
/// Primary limits set `x-ratelimit-remaining: 0`; secondary limits send
/// `retry-after` instead.
fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || header(headers, "x-ratelimit-remaining") == Some("0")
        || headers.contains_key(reqwest::header::RETRY_AFTER)
}

/// Classifies a non-success response for `resource`.
pub fn classify(status: StatusCode, headers: &HeaderMap, resource: &str, body: &str) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized {
            message: message_of(body),
        },
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            if is_rate_limited(status, headers) =>
        {
            ApiError::RateLimited {
                reset_at: header(headers, "x-ratelimit-reset")
                    .and_then(|value| value.parse::<i64>().ok())
                    .and_then(Timestamp::from_unix_seconds),
            }
        }
        StatusCode::FORBIDDEN => ApiError::Forbidden {
            message: message_of(body),
        },
        StatusCode::NOT_FOUND => ApiError::not_found(resource),
        status if status.is_server_error() => ApiError::Transport {
            message: format!("{resource}: HTTP {status}: {}", message_of(body)),
        },
        status => ApiError::InvalidResponse {
            message: format!("{resource}: HTTP {status}: {}", message_of(body)),
        },
    }
}

/// The `rel="next"` target of a `Link` header, if any.
///
/// GitHub formats the header as
/// `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let value = header(headers, reqwest::header::LINK.as_str())?;
    value.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| param.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn primary_rate_limit_carries_reset_time() {
        let error = classify(
            StatusCode::FORBIDDEN,
            &headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1700000000"),
            ]),
            "branches",
            r#"{"message":"API rate limit exceeded"}"#,
        );
        assert_eq!(
            error,
            ApiError::RateLimited {
                reset_at: Timestamp::from_unix_seconds(1_700_000_000)
            }
        );
        assert!(error.is_scan_fatal());
    }

    #[test]
    fn secondary_rate_limit_is_rate_limited() {
        let error = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("retry-after", "60")]),
            "pulls",
            r#"{"message":"You have exceeded a secondary rate limit"}"#,
        );
        assert_eq!(error, ApiError::RateLimited { reset_at: None });
    }

    #[test]
    fn plain_forbidden_is_not_rate_limited() {
        let error = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "4999")]),
            "collaborators/stephenc/permission",
            r#"{"message":"Must have push access to view collaborator permission."}"#,
        );
        assert_eq!(
            error,
            ApiError::Forbidden {
                message: "Must have push access to view collaborator permission.".to_string()
            }
        );
        assert!(!error.is_scan_fatal());
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let none = HeaderMap::new();
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, &none, "repo", r#"{"message":"Bad credentials"}"#),
            ApiError::Unauthorized { message } if message == "Bad credentials"
        ));
        assert!(classify(StatusCode::NOT_FOUND, &none, "repo", "").is_not_found());
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, &none, "repo", "<html>"),
            ApiError::Transport { .. }
        ));
        assert!(matches!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, &none, "repo", "{}"),
            ApiError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn next_link_is_extracted() {
        let map = headers(&[(
            "link",
            r#"<https://api.github.com/repositories/1/pulls?page=2>; rel="next", <https://api.github.com/repositories/1/pulls?page=5>; rel="last""#,
        )]);
        assert_eq!(
            next_link(&map).as_deref(),
            Some("https://api.github.com/repositories/1/pulls?page=2")
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let map = headers(&[(
            "link",
            r#"<https://api.github.com/repositories/1/pulls?page=1>; rel="prev", <https://api.github.com/repositories/1/pulls?page=1>; rel="first""#,
        )]);
        assert_eq!(next_link(&map), None);
        assert_eq!(next_link(&HeaderMap::new()), None);
    }
}
