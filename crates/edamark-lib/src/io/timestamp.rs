use crate::error::LoadError;
use chrono::{DateTime, NaiveDateTime};

const LAYOUTS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
];

/// Epoch values above this magnitude are read as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Parse a wall-clock timestamp as written by sensor exports and event logs.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, LoadError> {
    let text = raw.trim().trim_matches('"').trim();
    if text.parse::<f64>().is_ok() {
        return from_epoch(text).ok_or_else(|| LoadError::Timestamp(raw.to_string()));
    }
    for layout in LAYOUTS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, layout) {
            return Ok(ts);
        }
    }
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.naive_utc())
        .map_err(|_| LoadError::Timestamp(raw.to_string()))
}

/// Decimal epoch text in seconds or milliseconds. Digits are read as
/// integers so fractional parts survive to the nanosecond.
fn from_epoch(text: &str) -> Option<NaiveDateTime> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    if frac.is_empty() && whole > MILLIS_THRESHOLD {
        let millis = if negative { -whole } else { whole };
        return DateTime::from_timestamp_millis(millis).map(|ts| ts.naive_utc());
    }
    // nanoseconds per unit, and how many fraction digits fit in it
    let (unit, places) = if whole > MILLIS_THRESHOLD {
        (1_000_000_i128, 6)
    } else {
        (NANOS_PER_SECOND, 9)
    };
    let mut frac_digits: String = frac.chars().take(places).collect();
    while frac_digits.len() < places {
        frac_digits.push('0');
    }
    let frac_nanos: i128 = frac_digits.parse().ok()?;
    let mut total = whole as i128 * unit + frac_nanos;
    if negative {
        total = -total;
    }
    let secs = i64::try_from(total.div_euclid(NANOS_PER_SECOND)).ok()?;
    let nanos = total.rem_euclid(NANOS_PER_SECOND) as u32;
    DateTime::from_timestamp(secs, nanos).map(|ts| ts.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn parses_datetime_layouts() {
        let expected = NaiveDate::from_ymd_opt(2019, 3, 14)
            .unwrap()
            .and_hms_milli_opt(10, 23, 45, 125)
            .unwrap();
        for raw in [
            "2019/03/14 10:23:45.125",
            "2019-03-14 10:23:45.125",
            "2019-03-14T10:23:45.125",
            "03/14/2019 10:23:45.125",
            "\"2019-03-14 10:23:45.125\"",
        ] {
            assert_eq!(parse_timestamp(raw).unwrap(), expected, "{}", raw);
        }
        let whole = parse_timestamp("2019-03-14 10:23:45").unwrap();
        assert_eq!(whole.nanosecond(), 0);
    }

    #[test]
    fn parses_epoch_seconds_and_millis() {
        let seconds = parse_timestamp("1552559025.5").unwrap();
        let millis = parse_timestamp("1552559025500").unwrap();
        assert_eq!(seconds, millis);
        assert_eq!(seconds.nanosecond(), 500_000_000);
    }

    #[test]
    fn epoch_millis_keep_exact_sub_second_digits() {
        let expected = NaiveDate::from_ymd_opt(2019, 3, 14)
            .unwrap()
            .and_hms_nano_opt(10, 13, 45, 125_000_000)
            .unwrap();
        assert_eq!(parse_timestamp("1552558425125").unwrap(), expected);

        let fractional = parse_timestamp("1552558425125.977").unwrap();
        assert_eq!(fractional.nanosecond(), 125_977_000);
        assert_eq!(fractional - expected, chrono::TimeDelta::microseconds(977));

        let seconds = parse_timestamp("1552558425.123456789").unwrap();
        assert_eq!(seconds.nanosecond(), 123_456_789);

        let before_epoch = parse_timestamp("-1.25").unwrap();
        assert_eq!(before_epoch.and_utc().timestamp(), -2);
        assert_eq!(before_epoch.nanosecond(), 750_000_000);
    }

    #[test]
    fn non_decimal_numbers_are_rejected() {
        assert!(matches!(
            parse_timestamp("1e12"),
            Err(LoadError::Timestamp(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_timestamp("breath start"),
            Err(LoadError::Timestamp(_))
        ));
    }
}
