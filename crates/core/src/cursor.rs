//! Delta-sync continuation cursors.
//!
//! A cursor names a position in the `(updated_at, id)` ordering of a table.
//! On the wire it is an opaque URL-safe base64 token; clients must not parse
//! it. For convenience a bare RFC 3339 timestamp is also accepted as a
//! `since` value, meaning "everything updated strictly after this instant".

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};

use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

/// Position in the `(updated_at, id)` ordering.
///
/// With `id: None` the cursor sits after every entity stamped at or before
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub updated_at: Timestamp,
    pub id: Option<EntityId>,
}

impl Cursor {
    /// Cursor positioned exactly at the given entity key.
    pub fn at(updated_at: Timestamp, id: EntityId) -> Self {
        Self {
            updated_at,
            id: Some(id),
        }
    }

    /// Cursor positioned after every entity stamped at or before `updated_at`.
    pub fn since(updated_at: Timestamp) -> Self {
        Self {
            updated_at: updated_at.trunc_subsecs(6),
            id: None,
        }
    }

    /// Whether the entity keyed `(updated_at, id)` sorts after this cursor.
    pub fn is_before(&self, updated_at: &Timestamp, id: &EntityId) -> bool {
        match &self.id {
            None => *updated_at > self.updated_at,
            Some(cursor_id) => (updated_at, id) > (&self.updated_at, cursor_id),
        }
    }

    pub fn encode(&self) -> String {
        let id = self.id.as_ref().map(EntityId::as_str).unwrap_or("");
        let raw = format!("{}:{}", self.updated_at.timestamp_micros(), id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode a `since` value: an opaque cursor or an RFC 3339 timestamp.
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        if let Some(cursor) = Self::decode_token(raw) {
            return Ok(cursor);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| Self::since(ts.with_timezone(&Utc)))
            .map_err(|_| CoreError::Validation(format!("invalid since cursor '{raw}'")))
    }

    fn decode_token(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (micros, id) = text.split_once(':')?;
        let updated_at = DateTime::from_timestamp_micros(micros.parse().ok()?)?;
        let id = if id.is_empty() {
            None
        } else {
            Some(EntityId::parse(id).ok()?)
        };
        Some(Self { updated_at, id })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Duration;

    use super::*;
    use crate::clock;

    fn id(raw: &str) -> EntityId {
        EntityId::parse(raw).unwrap()
    }

    #[test]
    fn token_decodes_to_the_same_position() {
        let cursor = Cursor::at(clock::now(), id("abc"));
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);

        let open = Cursor::since(clock::now());
        assert_eq!(Cursor::decode(&open.encode()).unwrap(), open);
    }

    #[test]
    fn token_is_url_safe() {
        let token = Cursor::at(clock::now(), id("a|b:c")).encode();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rfc3339_timestamp_is_accepted() {
        let cursor = Cursor::decode("2024-05-01T12:00:00Z").unwrap();
        assert_eq!(cursor.id, None);
        assert_eq!(cursor.updated_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn garbage_is_a_validation_error() {
        assert_matches!(Cursor::decode("not a cursor"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn keyed_cursor_orders_ties_by_id() {
        let t = clock::now();
        let cursor = Cursor::at(t, id("m"));
        assert!(!cursor.is_before(&t, &id("a")));
        assert!(!cursor.is_before(&t, &id("m")));
        assert!(cursor.is_before(&t, &id("z")));
        assert!(cursor.is_before(&(t + Duration::microseconds(1)), &id("a")));
    }

    #[test]
    fn open_cursor_excludes_the_whole_instant() {
        let t = clock::now();
        let cursor = Cursor::since(t);
        assert!(!cursor.is_before(&t, &id("zzz")));
        assert!(cursor.is_before(&(t + Duration::microseconds(1)), &id("a")));
    }
}
