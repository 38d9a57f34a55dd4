//! Timestamp decoding for entry metadata.
//!
//! The API reports `created_at`/`updated_at` in several shapes depending on
//! which endpoint produced the entry. Parsing never fails: a value that
//! matches none of the known formats decodes to [`ZERO_TIME`].

use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Value reported when no timestamp could be decoded.
pub const ZERO_TIME: OffsetDateTime = OffsetDateTime::UNIX_EPOCH;

const NAIVE_FORMATS: [&[BorrowedFormatItem<'static>]; 3] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
];

/// Parses a single timestamp, trying the known formats in priority order.
/// Offset-less values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed);
    }
    NAIVE_FORMATS.iter().find_map(|format| {
        PrimitiveDateTime::parse(value, *format)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    })
}

/// Picks the modification time of an entry: `updated` first, then `created`,
/// then [`ZERO_TIME`].
pub fn resolve_mod_time(updated: Option<&str>, created: Option<&str>) -> OffsetDateTime {
    updated
        .and_then(parse_timestamp)
        .or_else(|| created.and_then(parse_timestamp))
        .unwrap_or(ZERO_TIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_microsecond_rfc3339() {
        assert_eq!(
            parse_timestamp("2023-01-15T10:30:00.000000Z"),
            Some(datetime!(2023-01-15 10:30:00 UTC))
        );
    }

    #[test]
    fn parses_offsets_and_naive_formats() {
        assert_eq!(
            parse_timestamp("2023-01-15T12:30:00+02:00"),
            Some(datetime!(2023-01-15 10:30:00 UTC))
        );
        assert_eq!(
            parse_timestamp("2023-01-15T10:30:00.250"),
            Some(datetime!(2023-01-15 10:30:00.25 UTC))
        );
        assert_eq!(
            parse_timestamp("2023-01-15 10:30:00"),
            Some(datetime!(2023-01-15 10:30:00 UTC))
        );
    }

    #[test]
    fn prefers_updated_and_falls_back_to_created() {
        assert_eq!(
            resolve_mod_time(Some("2024-02-01T00:00:00Z"), Some("2023-01-01T00:00:00Z")),
            datetime!(2024-02-01 00:00:00 UTC)
        );
        assert_eq!(
            resolve_mod_time(Some("not a date"), Some("2023-01-01T00:00:00Z")),
            datetime!(2023-01-01 00:00:00 UTC)
        );
        assert_eq!(
            resolve_mod_time(None, Some("2023-01-01 08:00:00")),
            datetime!(2023-01-01 08:00:00 UTC)
        );
    }

    #[test]
    fn empty_values_yield_zero_time() {
        assert_eq!(resolve_mod_time(Some(""), Some("")), ZERO_TIME);
        assert_eq!(resolve_mod_time(None, None), ZERO_TIME);
        assert_eq!(resolve_mod_time(Some("garbage"), Some("??")), ZERO_TIME);
    }
}
