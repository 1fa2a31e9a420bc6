use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Encodes a `(updated_at, user_id)` keyset position as
/// `base64("<rfc3339>|<uuid>")`. Opaque to everything but this module.
pub fn encode_cursor(updated_at: OffsetDateTime, user_id: Uuid) -> anyhow::Result<String> {
    let ts = updated_at.format(&Rfc3339).context("format cursor timestamp")?;
    Ok(BASE64.encode(format!("{ts}|{user_id}")))
}

/// Decodes a cursor produced by [`encode_cursor`].
pub fn decode_cursor(encoded: &str) -> anyhow::Result<(OffsetDateTime, Uuid)> {
    let raw = BASE64.decode(encoded).context("cursor is not base64")?;
    let raw = String::from_utf8(raw).context("cursor is not utf-8")?;

    let mut parts = raw.split('|');
    let (ts, id) = match (parts.next(), parts.next(), parts.next()) {
        (Some(ts), Some(id), None) => (ts, id),
        _ => bail!("cursor is invalid"),
    };

    let updated_at =
        OffsetDateTime::parse(ts, &Rfc3339).context("cursor is invalid: timestamp")?;
    let user_id = Uuid::parse_str(id).context("cursor is invalid: user id")?;
    Ok((updated_at, user_id))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn round_trip_preserves_nanosecond_precision() {
        let ts = datetime!(2024-08-22 20:09:11.938220139 +01:00);
        let id = Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap();

        let cursor = encode_cursor(ts, id).unwrap();
        let (decoded_ts, decoded_id) = decode_cursor(&cursor).unwrap();

        assert_eq!(decoded_ts, ts);
        assert_eq!(decoded_id, id);
    }

    #[test]
    fn round_trip_is_stable_for_well_formed_cursors() {
        let ts = datetime!(2024-08-22 20:09:11.93822 +01:00);
        let id = Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap();

        let cursor = encode_cursor(ts, id).unwrap();
        let (decoded_ts, decoded_id) = decode_cursor(&cursor).unwrap();
        assert_eq!(encode_cursor(decoded_ts, decoded_id).unwrap(), cursor);
    }

    #[test]
    fn rejects_garbage_base64() {
        assert!(decode_cursor("not-base64!!!").is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        let cursor = BASE64.encode("a|b|c");
        assert!(decode_cursor(&cursor).is_err());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let cursor = BASE64.encode("a|c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3");
        assert!(decode_cursor(&cursor).is_err());
    }

    #[test]
    fn rejects_bad_user_id() {
        let cursor = BASE64.encode("2024-08-22T20:09:11.93822+01:00|not-a-uuid");
        assert!(decode_cursor(&cursor).is_err());
    }
}
