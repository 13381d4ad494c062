//! The month domain of the scrub slider.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::time::start_of_day;

/// First-of-month instants from the earliest to the latest of `instants`,
/// inclusive. Empty when `instants` is.
pub fn month_domain(instants: impl IntoIterator<Item = DateTime<Utc>>) -> Vec<DateTime<Utc>> {
  let bounds = instants
    .into_iter()
    .fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, t| match acc {
      Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
      None => Some((t, t)),
    });
  let Some((min, max)) = bounds else {
    return Vec::new();
  };

  let (Some(mut month), Some(last)) = (first_of_month(min), first_of_month(max)) else {
    return Vec::new();
  };
  let mut months = Vec::new();
  while month <= last {
    months.push(start_of_day(month));
    match month.checked_add_months(Months::new(1)) {
      Some(next) => month = next,
      None => break,
    }
  }
  months
}

fn first_of_month(t: DateTime<Utc>) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(t.year(), t.month(), 1)
}
