use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AvailabilityError;

/// Opaque page token: URL-safe base64 over the JSON of the last key seen.
pub fn encode_cursor<K: Serialize>(key: &K) -> Result<String, AvailabilityError> {
    let bytes = serde_json::to_vec(key).map_err(|e| AvailabilityError::CursorEncoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub fn decode_cursor<K: DeserializeOwned>(token: Option<&str>) -> Result<Option<K>, AvailabilityError> {
    let token = match token.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(token) => token,
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| AvailabilityError::InvalidCursor)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|_| AvailabilityError::InvalidCursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::HashMap;
    use shared_database::SlotKey;
    use uuid::Uuid;

    #[test]
    fn test_slot_key_cursor() {
        let key = SlotKey {
            date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            starts_at: Utc.with_ymd_and_hms(2025, 1, 6, 9, 45, 0).unwrap(),
            id: Uuid::new_v4(),
        };

        let token = encode_cursor(&key).unwrap();
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
        assert_eq!(decode_cursor::<SlotKey>(Some(&token)).unwrap(), Some(key));
    }

    #[test]
    fn test_missing_and_garbage_cursors() {
        assert_eq!(decode_cursor::<NaiveDate>(None).unwrap(), None);
        assert_eq!(decode_cursor::<NaiveDate>(Some("")).unwrap(), None);
        assert_matches!(decode_cursor::<NaiveDate>(Some("%%%")), Err(AvailabilityError::InvalidCursor));
        let not_a_date = URL_SAFE_NO_PAD.encode(b"\"tuesday\"");
        assert_matches!(decode_cursor::<NaiveDate>(Some(&not_a_date)), Err(AvailabilityError::InvalidCursor));
    }

    #[test]
    fn test_unencodable_key_is_an_error_not_a_first_page() {
        let key: HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        assert_matches!(encode_cursor(&key), Err(AvailabilityError::CursorEncoding(_)));
    }
}
