use std::fmt;
use std::error::Error;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use log::debug;

use smartstring::alias::{String as SmartString};

use crate::series::{self, BucketUnit, SeriesError};

/// Name of the preset covering the whole lifetime of a website.
pub const PRESET_ALL: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
	UnknownPreset(String),
	InvalidGranularity(String),
	MissingCreationDate,
	Series(SeriesError),
}

impl fmt::Display for RangeError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::UnknownPreset(s) => write!(f, "unknown date range preset {:?}", s),
			Self::InvalidGranularity(s) => write!(f, "invalid date range {:?}, expected e.g. \"7day\"", s),
			Self::MissingCreationDate => write!(f, "website creation date required to resolve range"),
			Self::Series(e) => fmt::Display::fmt(e, f),
		}
	}
}

impl Error for RangeError {
}

impl From<SeriesError> for RangeError {
	fn from(other: SeriesError) -> Self {
		Self::Series(other)
	}
}

/// What the user picked in the date filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSelection {
	/// A named range; only [`PRESET_ALL`] exists.
	Preset(SmartString),
	/// `<n><unit>`, e.g. `24hour`, `7day`, `-1day`.
	Granularity(SmartString),
	Explicit{
		start: DateTime<Utc>,
		end: DateTime<Utc>,
		unit: BucketUnit,
	},
}

impl FromStr for RangeSelection {
	type Err = RangeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s == PRESET_ALL {
			return Ok(Self::Preset(s.into()));
		}
		// validate early, so that bad CLI and config input is rejected on parse
		parse_granularity(s)?;
		Ok(Self::Granularity(s.into()))
	}
}

impl fmt::Display for RangeSelection {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Preset(s) | Self::Granularity(s) => f.write_str(s),
			Self::Explicit{start, end, unit} => write!(f, "{}..{} by {}", start, end, unit),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateRange<Tz: TimeZone> {
	pub start: DateTime<Tz>,
	pub end: DateTime<Tz>,
	pub unit: BucketUnit,
	/// The selection this range was resolved from, `custom` for explicit
	/// windows.
	pub value: SmartString,
}

impl<Tz: TimeZone> DateRange<Tz> {
	pub fn bucket_count(&self) -> Result<usize, SeriesError> {
		series::bucket_count(&self.start, &self.end, self.unit)
	}
}

fn parse_granularity(s: &str) -> Result<(i64, BucketUnit), RangeError> {
	let invalid = || RangeError::InvalidGranularity(s.into());
	let split = s.find(|c: char| c.is_ascii_alphabetic()).ok_or_else(invalid)?;
	let (num, unit) = s.split_at(split);
	let num = num.parse::<i64>().map_err(|_| invalid())?;
	let unit = unit.parse::<BucketUnit>().map_err(|_| invalid())?;
	if num == 0 || unit == BucketUnit::Minute {
		return Err(invalid());
	}
	Ok((num, unit))
}

/// Unit to chart a window of `[start, end]` with, when none was chosen
/// explicitly.
///
/// Calendar spans are counted on the wall clock of `start`'s zone.
pub fn unit_for_window<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> BucketUnit {
	let (a, b) = (start.naive_local(), end.with_timezone(&start.timezone()).naive_local());
	let span = |unit: BucketUnit| unit.steps_between(unit.truncate(a), unit.truncate(b));
	if end.clone().signed_duration_since(start.clone()) <= Duration::hours(48) {
		BucketUnit::Hour
	} else if span(BucketUnit::Day) <= 90 {
		BucketUnit::Day
	} else if span(BucketUnit::Month) <= 24 {
		BucketUnit::Month
	} else {
		BucketUnit::Year
	}
}

fn step(unit: BucketUnit, t: NaiveDateTime, n: i64, value: &str) -> Result<NaiveDateTime, RangeError> {
	unit.step(t, n).ok_or_else(|| RangeError::InvalidGranularity(value.into()))
}

/// Last representable instant before the local time `next`.
fn end_before<Tz: TimeZone>(tz: &Tz, next: NaiveDateTime) -> DateTime<Tz> {
	series::localize(tz, next) - Duration::milliseconds(1)
}

impl RangeSelection {
	pub fn needs_creation_date(&self) -> bool {
		matches!(self, Self::Preset(_))
	}

	/// Resolve the selection relative to `now`.
	///
	/// The resulting range is expressed in the time zone of `now`.
	/// `created_at` is only consulted for the `all` preset.
	pub fn resolve<Tz: TimeZone>(
		&self,
		now: &DateTime<Tz>,
		created_at: Option<DateTime<Utc>>,
	) -> Result<DateRange<Tz>, RangeError> {
		let tz = now.timezone();
		let range = match self {
			Self::Preset(name) => {
				if name.as_str() != PRESET_ALL {
					return Err(RangeError::UnknownPreset(name.to_string()));
				}
				let created_at = created_at.ok_or(RangeError::MissingCreationDate)?.with_timezone(&tz);
				let first = BucketUnit::Day.truncate(created_at.naive_local());
				let today = BucketUnit::Day.truncate(now.naive_local());
				let start = series::localize(&tz, first);
				let end = end_before(&tz, step(BucketUnit::Day, today, 1, name)?);
				if start > end {
					return Err(SeriesError::InvalidRange.into());
				}
				DateRange{
					// the age of the website, not the widened window
					unit: unit_for_window(&created_at, now),
					start,
					end,
					value: name.clone(),
				}
			},
			Self::Granularity(value) => {
				let (num, width) = parse_granularity(value)?;
				let current = width.truncate(now.naive_local());
				let (first, count) = if num > 0 {
					(step(width, current, 1 - num, value)?, num)
				} else {
					(step(width, current, num, value)?, 1)
				};
				let next = step(width, first, count, value)?;
				let unit = match width {
					BucketUnit::Day if count == 1 => BucketUnit::Hour,
					BucketUnit::Day | BucketUnit::Week => BucketUnit::Day,
					BucketUnit::Month if count == 1 => BucketUnit::Day,
					BucketUnit::Year => BucketUnit::Month,
					other => other,
				};
				DateRange{
					start: series::localize(&tz, first),
					end: end_before(&tz, next),
					unit,
					value: value.clone(),
				}
			},
			Self::Explicit{start, end, unit} => {
				if start > end {
					return Err(SeriesError::InvalidRange.into());
				}
				DateRange{
					start: start.with_timezone(&tz),
					end: end.with_timezone(&tz),
					unit: *unit,
					value: "custom".into(),
				}
			},
		};
		debug!("resolved date range {} to {}..{} by {}", self, range.start.naive_local(), range.end.naive_local(), range.unit);
		Ok(range)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use chrono::FixedOffset;

	fn utc(s: &str) -> DateTime<Utc> {
		series::parse_timestamp(s).unwrap()
	}

	fn now() -> DateTime<Utc> {
		// a Wednesday
		utc("2024-05-15T13:37:00Z")
	}

	fn resolve(s: &str) -> DateRange<Utc> {
		s.parse::<RangeSelection>().unwrap().resolve(&now(), None).unwrap()
	}

	#[test]
	fn test_last_24_hours() {
		let r = resolve("24hour");
		assert_eq!(r.start, utc("2024-05-14T14:00:00Z"));
		assert_eq!(r.end, utc("2024-05-15T13:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Hour);
		assert_eq!(r.value.as_str(), "24hour");
		assert_eq!(r.bucket_count().unwrap(), 24);
	}

	#[test]
	fn test_today_is_hourly() {
		let r = resolve("1day");
		assert_eq!(r.start, utc("2024-05-15T00:00:00Z"));
		assert_eq!(r.end, utc("2024-05-15T23:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Hour);
	}

	#[test]
	fn test_last_7_days() {
		let r = resolve("7day");
		assert_eq!(r.start, utc("2024-05-09T00:00:00Z"));
		assert_eq!(r.end, utc("2024-05-15T23:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Day);
		assert_eq!(r.bucket_count().unwrap(), 7);
	}

	#[test]
	fn test_yesterday() {
		let r = resolve("-1day");
		assert_eq!(r.start, utc("2024-05-14T00:00:00Z"));
		assert_eq!(r.end, utc("2024-05-14T23:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Hour);
	}

	#[test]
	fn test_this_week_starts_on_sunday() {
		let r = resolve("1week");
		assert_eq!(r.start, utc("2024-05-12T00:00:00Z"));
		assert_eq!(r.end, utc("2024-05-18T23:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Day);
	}

	#[test]
	fn test_months() {
		let r = resolve("1month");
		assert_eq!(r.start, utc("2024-05-01T00:00:00Z"));
		assert_eq!(r.end, utc("2024-05-31T23:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Day);

		let r = resolve("6month");
		assert_eq!(r.start, utc("2023-12-01T00:00:00Z"));
		assert_eq!(r.unit, BucketUnit::Month);

		let r = resolve("-1month");
		assert_eq!(r.start, utc("2024-04-01T00:00:00Z"));
		assert_eq!(r.end, utc("2024-04-30T23:59:59.999Z"));
	}

	#[test]
	fn test_this_year_is_monthly() {
		let r = resolve("1year");
		assert_eq!(r.start, utc("2024-01-01T00:00:00Z"));
		assert_eq!(r.end, utc("2024-12-31T23:59:59.999Z"));
		assert_eq!(r.unit, BucketUnit::Month);
		assert_eq!(r.bucket_count().unwrap(), 12);
	}

	#[test]
	fn test_ranges_follow_the_zone_of_now() {
		let tz = FixedOffset::west_opt(5 * 3600).unwrap();
		let r = "1day".parse::<RangeSelection>().unwrap()
			.resolve(&now().with_timezone(&tz), None)
			.unwrap();
		assert_eq!(r.start, utc("2024-05-15T05:00:00Z"));
		assert_eq!(r.end, utc("2024-05-16T04:59:59.999Z"));
	}

	#[test]
	fn test_invalid_granularities() {
		for s in ["", "day", "0day", "7", "7days", "7minute", "x7day", "7 day"].iter() {
			match s.parse::<RangeSelection>() {
				Err(RangeError::InvalidGranularity(v)) => assert_eq!(v, *s),
				other => panic!("{:?} parsed as {:?}", s, other),
			}
		}
	}

	#[test]
	fn test_all_requires_creation_date() {
		let sel = "all".parse::<RangeSelection>().unwrap();
		assert!(sel.needs_creation_date());
		assert_eq!(sel.resolve(&now(), None), Err(RangeError::MissingCreationDate));
	}

	#[test]
	fn test_all_picks_unit_from_age() {
		let sel = RangeSelection::Preset(PRESET_ALL.into());
		let cases = [
			("2024-05-15T09:00:00Z", BucketUnit::Hour),
			("2024-05-14T09:00:00Z", BucketUnit::Hour),
			("2024-04-01T09:00:00Z", BucketUnit::Day),
			("2023-01-01T09:00:00Z", BucketUnit::Month),
			("2019-01-01T09:00:00Z", BucketUnit::Year),
		];
		for (created, unit) in cases.iter() {
			let r = sel.resolve(&now(), Some(utc(created))).unwrap();
			assert_eq!(r.unit, *unit, "created at {}", created);
			assert_eq!(r.start, Utc.from_utc_datetime(&BucketUnit::Day.truncate(utc(created).naive_utc())));
			assert_eq!(r.end, utc("2024-05-15T23:59:59.999Z"));
			assert_eq!(r.value.as_str(), "all");
		}
	}

	#[test]
	fn test_all_unit_uses_age_not_whole_days() {
		let sel = RangeSelection::Preset(PRESET_ALL.into());
		// 47h37m old; the day-aligned window would span three days
		let r = sel.resolve(&now(), Some(utc("2024-05-13T14:00:00Z"))).unwrap();
		assert_eq!(r.unit, BucketUnit::Hour);
		assert_eq!(r.start, utc("2024-05-13T00:00:00Z"));
		assert_eq!(r.end, utc("2024-05-15T23:59:59.999Z"));
	}

	#[test]
	fn test_unit_for_window_with_mixed_offsets() {
		let start = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		// 2024-04-01T03:00Z, 91 days after start
		let end = FixedOffset::west_opt(5 * 3600).unwrap().with_ymd_and_hms(2024, 3, 31, 22, 0, 0).unwrap();
		assert_eq!(unit_for_window(&start, &end), BucketUnit::Month);
		let end = FixedOffset::west_opt(5 * 3600).unwrap().with_ymd_and_hms(2024, 3, 30, 18, 0, 0).unwrap();
		assert_eq!(unit_for_window(&start, &end), BucketUnit::Day);
	}

	#[test]
	fn test_unknown_preset() {
		let sel = RangeSelection::Preset("forever".into());
		assert_eq!(sel.resolve(&now(), Some(now())), Err(RangeError::UnknownPreset("forever".into())));
	}

	#[test]
	fn test_explicit_window() {
		let sel = RangeSelection::Explicit{
			start: utc("2024-01-01T00:00:00Z"),
			end: utc("2024-01-03T00:00:00Z"),
			unit: BucketUnit::Day,
		};
		let r = sel.resolve(&now(), None).unwrap();
		assert_eq!(r.value.as_str(), "custom");
		assert_eq!(r.bucket_count().unwrap(), 3);

		let sel = RangeSelection::Explicit{
			start: utc("2024-01-03T00:00:00Z"),
			end: utc("2024-01-01T00:00:00Z"),
			unit: BucketUnit::Day,
		};
		assert_eq!(sel.resolve(&now(), None), Err(RangeError::Series(SeriesError::InvalidRange)));
	}
}
