//! Lenient instant parsing shared by the loader and the query surface.
//!
//! Boundary snapshots are often labelled by month ("June 2025", "2025-06")
//! rather than by day, so month-only forms are accepted and pinned to the
//! first of the month at 00:00 UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::{Error, Result};

/// Month-granularity formats, tried after the full-date forms.
const MONTH_FORMATS: &[&str] = &["%B %Y", "%b %Y", "%m %Y", "%Y-%m"];

/// Parse an instant from any of the supported textual forms.
///
/// Accepted, in order: RFC 3339, `YYYY-MM-DDTHH:MM:SS` (taken as UTC),
/// `YYYY-MM-DD`, `Month YYYY`, `Mon YYYY`, `MM YYYY`, `YYYY-MM`.
pub fn parse_instant(input: &str) -> Option<DateTime<Utc>> {
  let s = input.trim();
  if s.is_empty() {
    return None;
  }

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
    return Some(Utc.from_utc_datetime(&ndt));
  }
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return Some(start_of_day(date));
  }

  // chrono refuses to build a date without a day; supply the first.
  let padded = format!("01 {s}");
  MONTH_FORMATS.iter().find_map(|fmt| {
    NaiveDate::parse_from_str(&padded, &format!("%d {fmt}"))
      .ok()
      .map(start_of_day)
  })
}

/// Like [`parse_instant`], but reports failure as [`Error::UnparsableInstant`].
pub fn require_instant(input: &str) -> Result<DateTime<Utc>> {
  parse_instant(input).ok_or_else(|| Error::UnparsableInstant(input.to_owned()))
}

/// Midnight UTC on `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
  Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    start_of_day(NaiveDate::from_ymd_opt(y, m, d).unwrap())
  }

  #[test]
  fn parses_rfc3339_with_offset() {
    let dt = parse_instant("2021-06-01T02:00:00+02:00").unwrap();
    assert_eq!(dt, Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap());
  }

  #[test]
  fn parses_plain_date() {
    assert_eq!(parse_instant("2020-01-01"), Some(ymd(2020, 1, 1)));
  }

  #[test]
  fn parses_month_labels() {
    assert_eq!(parse_instant("June 2025"), Some(ymd(2025, 6, 1)));
    assert_eq!(parse_instant("Jun 2025"), Some(ymd(2025, 6, 1)));
    assert_eq!(parse_instant("2025-06"), Some(ymd(2025, 6, 1)));
    assert_eq!(parse_instant("06 2025"), Some(ymd(2025, 6, 1)));
  }

  #[test]
  fn rejects_garbage() {
    assert!(parse_instant("").is_none());
    assert!(parse_instant("not a date").is_none());
    assert!(parse_instant("2021-13-40").is_none());
    assert!(matches!(
      require_instant("soon"),
      Err(Error::UnparsableInstant(s)) if s == "soon"
    ));
  }
}
