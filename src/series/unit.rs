use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use serde_derive::{Deserialize, Serialize};

use super::SeriesError;

/// Width of a chart bucket.
///
/// All calendar arithmetic happens on local wall-clock time
/// (`NaiveDateTime`), so that a day bucket is a calendar day regardless of
/// DST transitions in the zone the caller works in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketUnit {
	Minute,
	Hour,
	Day,
	/// Weeks start on Sunday.
	Week,
	Month,
	Year,
}

impl BucketUnit {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Minute => "minute",
			Self::Hour => "hour",
			Self::Day => "day",
			Self::Week => "week",
			Self::Month => "month",
			Self::Year => "year",
		}
	}

	/// strftime pattern used for bucket labels.
	pub fn label_format(&self) -> &'static str {
		match self {
			Self::Minute => "%H:%M",
			Self::Hour => "%H:00",
			Self::Day | Self::Week => "%b %-d",
			Self::Month => "%b %Y",
			Self::Year => "%Y",
		}
	}

	/// Format a bucket start for display, in its local time.
	pub fn label<Tz: TimeZone>(&self, bucket_start: &DateTime<Tz>) -> String {
		bucket_start.naive_local().format(self.label_format()).to_string()
	}

	/// Return the start of the bucket containing `t`.
	pub fn truncate(&self, t: NaiveDateTime) -> NaiveDateTime {
		let date = t.date();
		let midnight = NaiveTime::MIN;
		match self {
			Self::Minute => {
				date.and_time(midnight)
					+ Duration::hours(t.hour() as i64)
					+ Duration::minutes(t.minute() as i64)
			}
			Self::Hour => date.and_time(midnight) + Duration::hours(t.hour() as i64),
			Self::Day => date.and_time(midnight),
			Self::Week => {
				let back = date.weekday().num_days_from_sunday() as i64;
				(date - Duration::days(back)).and_time(midnight)
			}
			Self::Month => (date - Duration::days(date.day0() as i64)).and_time(midnight),
			Self::Year => (date - Duration::days(date.ordinal0() as i64)).and_time(midnight),
		}
	}

	/// Number of whole unit steps from `from` to `to`.
	///
	/// Both arguments must already be truncated to this unit. The result is
	/// negative if `to` lies before `from`.
	pub fn steps_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> i64 {
		match self {
			Self::Minute => (to - from).num_minutes(),
			Self::Hour => (to - from).num_hours(),
			Self::Day => (to.date() - from.date()).num_days(),
			Self::Week => (to.date() - from.date()).num_days() / 7,
			Self::Month => {
				(to.year() as i64 - from.year() as i64) * 12 + to.month() as i64
					- from.month() as i64
			}
			Self::Year => to.year() as i64 - from.year() as i64,
		}
	}

	/// Move `t` by `n` units (backwards for negative `n`).
	///
	/// Returns `None` if the result is not representable.
	pub fn step(&self, t: NaiveDateTime, n: i64) -> Option<NaiveDateTime> {
		match self {
			Self::Minute => t.checked_add_signed(Duration::minutes(n)),
			Self::Hour => t.checked_add_signed(Duration::hours(n)),
			Self::Day => t.checked_add_signed(Duration::days(n)),
			Self::Week => t.checked_add_signed(Duration::weeks(n)),
			Self::Month => add_months(t, n),
			Self::Year => add_months(t, n.checked_mul(12)?),
		}
	}
}

fn add_months(t: NaiveDateTime, n: i64) -> Option<NaiveDateTime> {
	let months = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
	if n >= 0 {
		t.checked_add_months(months)
	} else {
		t.checked_sub_months(months)
	}
}

impl FromStr for BucketUnit {
	type Err = SeriesError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"minute" => Ok(Self::Minute),
			"hour" => Ok(Self::Hour),
			"day" => Ok(Self::Day),
			"week" => Ok(Self::Week),
			"month" => Ok(Self::Month),
			"year" => Ok(Self::Year),
			other => Err(SeriesError::InvalidUnit(other.into())),
		}
	}
}

impl fmt::Display for BucketUnit {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
