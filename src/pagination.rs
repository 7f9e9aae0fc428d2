//! Opaque cursor for reverse-chronological message paging.
//!
//! The cursor wraps the last seen message `seq`; the next page is everything
//! strictly below it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const CURSOR_PREFIX: &str = "seq:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    before_seq: i64,
}

impl Cursor {
    pub fn before(seq: i64) -> Self {
        Self { before_seq: seq }
    }

    pub fn before_seq(&self) -> i64 {
        self.before_seq
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{CURSOR_PREFIX}{}", self.before_seq))
    }

    pub fn decode(raw: &str) -> Result<Self, AppError> {
        let invalid = || AppError::BadRequest("invalid cursor".into());
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
        let text = String::from_utf8(bytes).map_err(|_| invalid())?;
        let seq = text
            .strip_prefix(CURSOR_PREFIX)
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|s| *s > 0)
            .ok_or_else(invalid)?;
        Ok(Self::before(seq))
    }
}

/// Clamp a requested page size into `1..=max`, `default` when absent.
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_decode_accepts_own_encoding() {
        let cursor = Cursor::before(42);
        assert_eq!(Cursor::decode(&cursor.encode()), Ok(cursor));
    }

    #[test]
    fn test_cursor_is_opaque() {
        let encoded = Cursor::before(7).encode();
        assert!(!encoded.contains('7'));
    }

    #[test]
    fn test_invalid_cursors_rejected() {
        assert!(Cursor::decode("not-base64!!").is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("seq:abc")).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("id:5")).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("seq:0")).is_err());
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 20, 50), 20);
        assert_eq!(clamp_limit(Some(500), 20, 50), 50);
        assert_eq!(clamp_limit(Some(0), 20, 50), 1);
        assert_eq!(clamp_limit(Some(35), 20, 50), 35);
    }
}
