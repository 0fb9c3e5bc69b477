//! HTTP conditional-request helpers.
//!
//! The entity version doubles as a strong entity tag: `ETag: "<version>"`.
//! `If-Match` supplies the expected version for mutations and
//! `If-None-Match` turns an unchanged read into `304 Not Modified`.

use axum::http::header::{InvalidHeaderValue, IF_MATCH, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue};
use tablesync_core::error::CoreError;
use tablesync_core::types::{Timestamp, Version};

/// Expected version supplied through `If-Match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// `If-Match: *`: any current version of an existing entity.
    Any,
    Version(Version),
}

/// `ETag` header value for a version.
pub fn etag(version: &Version) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("\"{version}\""))
}

/// `Last-Modified` header value (IMF-fixdate, second precision).
pub fn last_modified(updated_at: &Timestamp) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&updated_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Parse `If-Match`. Only a single tag or `*` is accepted.
pub fn if_match(headers: &HeaderMap) -> Result<Option<Precondition>, CoreError> {
    let Some(raw) = headers.get(IF_MATCH) else {
        return Ok(None);
    };
    let raw = raw
        .to_str()
        .map_err(|_| CoreError::Validation("If-Match header is not valid ASCII".into()))?
        .trim();
    if raw == "*" {
        return Ok(Some(Precondition::Any));
    }
    if raw.contains(',') {
        return Err(CoreError::Validation(
            "If-Match must carry a single entity tag".into(),
        ));
    }
    Version::parse(unquote(raw)).map(|v| Some(Precondition::Version(v)))
}

/// Whether `If-None-Match` names `current` (or is `*`).
pub fn if_none_match(headers: &HeaderMap, current: &Version) -> bool {
    let Some(raw) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    raw.split(',').map(str::trim).any(|tag| {
        tag == "*" || unquote(tag) == current.as_str()
    })
}

/// Strip the weak prefix and surrounding quotes from an entity tag. Bare
/// tokens are accepted as-is.
fn unquote(tag: &str) -> &str {
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn headers(name: axum::http::HeaderName, value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn etag_is_quoted_version() {
        let version = Version::parse("abc123").unwrap();
        assert_eq!(etag(&version).unwrap(), "\"abc123\"");
    }

    #[test]
    fn if_match_parses_tags_and_wildcard() {
        assert_eq!(if_match(&HeaderMap::new()).unwrap(), None);
        assert_eq!(
            if_match(&headers(IF_MATCH, "*")).unwrap(),
            Some(Precondition::Any)
        );
        assert_eq!(
            if_match(&headers(IF_MATCH, "\"v1\"")).unwrap(),
            Some(Precondition::Version(Version::parse("v1").unwrap()))
        );
        assert_eq!(
            if_match(&headers(IF_MATCH, "W/\"v1\"")).unwrap(),
            Some(Precondition::Version(Version::parse("v1").unwrap()))
        );
    }

    #[test]
    fn if_match_rejects_lists_and_empty_tags() {
        assert_matches!(
            if_match(&headers(IF_MATCH, "\"a\", \"b\"")),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            if_match(&headers(IF_MATCH, "\"\"")),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn if_none_match_checks_every_tag() {
        let current = Version::parse("v2").unwrap();
        assert!(if_none_match(&headers(IF_NONE_MATCH, "\"v1\", \"v2\""), &current));
        assert!(if_none_match(&headers(IF_NONE_MATCH, "*"), &current));
        assert!(!if_none_match(&headers(IF_NONE_MATCH, "\"v1\""), &current));
        assert!(!if_none_match(&HeaderMap::new(), &current));
    }

    #[test]
    fn last_modified_uses_http_date() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-06-01T08:30:05.123456Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(last_modified(&ts).unwrap(), "Sat, 01 Jun 2024 08:30:05 GMT");
    }
}
