/*!
# Dense time series

Metric queries return sparse rows: one `(timestamp, count)` pair per bucket
which actually saw traffic, in no particular order. Charts want the
opposite, one value per bucket across the whole selected window, with
empty buckets present as zero.

## Bucket boundaries

The window `[start, end]` is inclusive on both ends at the bucket level:
both `start` and `end` are truncated to the bucket unit and every bucket
from the first to the last one is emitted. A day-unit window from
2024-01-01T00:00 to 2024-01-03T00:00 thus yields three buckets, and so
does one ending at 2024-01-03T23:59:59.999.

Samples, on the other hand, are filtered on their raw timestamp: a sample
later than `end` is dropped even when it would fall into the last bucket.

Truncation happens on the local wall-clock time of the time zone `start`
is expressed in; `end` is converted into that zone first. A bucket whose
local start is skipped entirely by a DST transition is merged into the
bucket following the gap, so bucket starts are strictly ascending.

A window may hold at most [`MAX_BUCKETS`] buckets.
*/
use std::fmt;
use std::error::Error;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use log::{debug, warn};

use serde::{de, Deserialize as DeserializeTrait, Deserializer};
use serde_derive::{Deserialize, Serialize};

mod unit;

pub use unit::BucketUnit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
	InvalidRange,
	InvalidUnit(String),
	/// The window holds more than [`MAX_BUCKETS`] buckets of the unit.
	TooManyBuckets(u64),
}

impl fmt::Display for SeriesError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidRange => write!(f, "start of the window lies after its end"),
			Self::InvalidUnit(s) => write!(f, "unknown bucket unit {:?}", s),
			Self::TooManyBuckets(n) => write!(f, "window spans {} buckets, at most {} are supported", n, MAX_BUCKETS),
		}
	}
}

impl Error for SeriesError {
}

/// Parse a timestamp as sent by the metrics API.
///
/// Accepts RFC 3339 and the bare `YYYY-MM-DD HH:MM:SS` form, which is
/// taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
	if let Ok(t) = DateTime::parse_from_rfc3339(s) {
		return Some(t.with_timezone(&Utc));
	}
	NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
		.ok()
		.map(|t| Utc.from_utc_datetime(&t))
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
	where D: Deserializer<'de>
{
	let s = String::deserialize(deserializer)?;
	parse_timestamp(&s).ok_or_else(|| de::Error::custom(format!("invalid timestamp {:?}", s)))
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Sample {
	#[serde(rename = "t", deserialize_with = "deserialize_timestamp")]
	pub timestamp: DateTime<Utc>,
	#[serde(rename = "y")]
	pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DensePoint {
	pub bucket_start: DateTime<Utc>,
	pub value: u64,
}

/// Upper bound on the number of buckets in one series.
///
/// A year of minute buckets still fits.
pub const MAX_BUCKETS: usize = 1_000_000;

/// Longest DST gap [`localize`] looks across, in minutes.
const MAX_GAP_MINUTES: usize = 24 * 60;

/// Map a local wall-clock time back to an instant in `tz`.
///
/// Ambiguous times resolve to the earlier instant. Times skipped by a DST
/// transition resolve to the first instant after the gap, so every local
/// time inside one gap maps to the same instant.
pub(crate) fn localize<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
	let mut candidate = local;
	for _ in 0..=MAX_GAP_MINUTES {
		if let Some(t) = tz.from_local_datetime(&candidate).earliest() {
			if candidate != local {
				debug!("local time {} does not exist, using {}", local, candidate);
			}
			return t;
		}
		candidate = match candidate.checked_add_signed(Duration::minutes(1)) {
			Some(next) => next,
			None => break,
		};
	}
	warn!("local time {} does not exist, interpreting it as UTC", local);
	tz.from_utc_datetime(&local)
}

/// Bucket starts of a window, in ascending order.
struct Layout {
	/// Truncated local start of the first bucket.
	first: NaiveDateTime,
	starts: Vec<DateTime<Utc>>,
	/// Index into `starts` for each unit step after `first`.
	slots: Vec<usize>,
}

impl Layout {
	fn new<Tz: TimeZone>(
		start: &DateTime<Tz>,
		end: &DateTime<Tz>,
		unit: BucketUnit,
	) -> Result<Self, SeriesError> {
		if start > end {
			return Err(SeriesError::InvalidRange);
		}
		let tz = start.timezone();
		// both ends are bucketed on the wall clock of start's zone
		let end = end.with_timezone(&tz);
		let first = unit.truncate(start.naive_local());
		let last = unit.truncate(end.naive_local());
		// start <= end, but a DST fold can still put end's wall clock first
		let steps = unit.steps_between(first, last).max(0) as u64;
		if steps >= MAX_BUCKETS as u64 {
			return Err(SeriesError::TooManyBuckets(steps + 1));
		}

		let mut starts: Vec<DateTime<Utc>> = Vec::with_capacity(steps as usize + 1);
		let mut slots = Vec::with_capacity(steps as usize + 1);
		for i in 0..=steps as i64 {
			// every bucket lies between first and last
			let local = unit.step(first, i).ok_or(SeriesError::InvalidRange)?;
			let instant = localize(&tz, local).with_timezone(&Utc);
			match starts.last() {
				// a bucket swallowed by a DST gap starts with its successor
				Some(prev) if instant <= *prev => (),
				_ => starts.push(instant),
			}
			slots.push(starts.len() - 1);
		}
		Ok(Self{first, starts, slots})
	}
}

/// Number of buckets of width `unit` spanning `[start, end]`.
pub fn bucket_count<Tz: TimeZone>(
	start: &DateTime<Tz>,
	end: &DateTime<Tz>,
	unit: BucketUnit,
) -> Result<usize, SeriesError> {
	Ok(Layout::new(start, end, unit)?.starts.len())
}

/// Aggregate `samples` into one point per bucket of `[start, end]`.
///
/// Values of samples falling into the same bucket are summed. Buckets
/// without samples are zero.
pub fn build_dense_series<Tz: TimeZone>(
	samples: &[Sample],
	start: &DateTime<Tz>,
	end: &DateTime<Tz>,
	unit: BucketUnit,
) -> Result<Vec<DensePoint>, SeriesError> {
	let layout = Layout::new(start, end, unit)?;
	let tz = start.timezone();
	let last_step = layout.slots.len() as i64 - 1;

	let mut values = vec![0u64; layout.starts.len()];
	let mut dropped = 0usize;
	for sample in samples.iter() {
		if sample.timestamp < *start || sample.timestamp > *end {
			dropped += 1;
			continue;
		}
		let local = sample.timestamp.with_timezone(&tz).naive_local();
		let step = unit.steps_between(layout.first, unit.truncate(local));
		// within the window, a step can only leave 0..=last_step across a DST fold
		let slot = layout.slots[step.max(0).min(last_step) as usize];
		values[slot] = values[slot].saturating_add(sample.value);
	}
	if dropped > 0 {
		debug!("{} of {} samples outside of the window", dropped, samples.len());
	}

	Ok(layout.starts.into_iter()
		.zip(values.into_iter())
		.map(|(bucket_start, value)| DensePoint{bucket_start, value})
		.collect())
}

/// Like [`build_dense_series`], with the unit given by name.
pub fn build_dense_series_str<Tz: TimeZone>(
	samples: &[Sample],
	start: &DateTime<Tz>,
	end: &DateTime<Tz>,
	unit: &str,
) -> Result<Vec<DensePoint>, SeriesError> {
	build_dense_series(samples, start, end, unit.parse()?)
}
