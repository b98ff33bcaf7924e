use chrono::{DateTime, TimeZone, Utc};

use log::debug;

use smartstring::alias::{String as SmartString};

use serde_derive::{Deserialize, Serialize};

use crate::range::DateRange;
use crate::series::{build_dense_series, BucketUnit, DensePoint, Sample, SeriesError};

/// Pageview response body, as returned by the metrics API.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PageviewData {
	#[serde(default)]
	pub pageviews: Vec<Sample>,
	#[serde(default)]
	pub sessions: Vec<Sample>,
}

#[derive(Debug)]
pub enum FetchState<T, E> {
	Loading,
	Loaded(T),
	Failed(E),
}

impl<T, E> FetchState<T, E> {
	pub fn is_loading(&self) -> bool {
		matches!(self, Self::Loading)
	}

	pub fn data(&self) -> Option<&T> {
		match self {
			Self::Loaded(v) => Some(v),
			_ => None,
		}
	}

	pub fn error(&self) -> Option<&E> {
		match self {
			Self::Failed(e) => Some(e),
			_ => None,
		}
	}
}

impl<T, E> From<Result<T, E>> for FetchState<T, E> {
	fn from(other: Result<T, E>) -> Self {
		match other {
			Ok(v) => Self::Loaded(v),
			Err(e) => Self::Failed(e),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterParam {
	Url,
	Referrer,
}

impl FilterParam {
	/// Name of the query parameter carrying the filter.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Url => "url",
			Self::Referrer => "ref",
		}
	}

	pub fn from_param(name: &str) -> Option<Self> {
		match name {
			"url" => Some(Self::Url),
			"ref" => Some(Self::Referrer),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filters {
	pub url: Option<SmartString>,
	pub referrer: Option<SmartString>,
}

impl Filters {
	/// Pick the filters out of query string pairs, ignoring anything else.
	pub fn from_params<'x, I: IntoIterator<Item = (&'x str, &'x str)>>(params: I) -> Self {
		let mut result = Self::default();
		for (k, v) in params {
			match FilterParam::from_param(k) {
				Some(FilterParam::Url) => result.url = Some(v.into()),
				Some(FilterParam::Referrer) => result.referrer = Some(v.into()),
				None => (),
			}
		}
		result
	}

	pub fn is_empty(&self) -> bool {
		self.url.is_none() && self.referrer.is_none()
	}

	pub fn get(&self, param: FilterParam) -> Option<&str> {
		match param {
			FilterParam::Url => self.url.as_deref(),
			FilterParam::Referrer => self.referrer.as_deref(),
		}
	}

	pub fn clear(&mut self, param: FilterParam) {
		match param {
			FilterParam::Url => self.url = None,
			FilterParam::Referrer => self.referrer = None,
		}
	}

	/// Active filters, in display order.
	pub fn tags(&self) -> Vec<(FilterParam, &str)> {
		[FilterParam::Url, FilterParam::Referrer]
			.iter()
			.filter_map(|p| self.get(*p).map(|v| (*p, v)))
			.collect()
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChartData {
	pub pageviews: Vec<DensePoint>,
	pub sessions: Vec<DensePoint>,
}

impl ChartData {
	pub fn build<Tz: TimeZone>(data: &PageviewData, range: &DateRange<Tz>) -> Result<Self, SeriesError> {
		Ok(Self{
			pageviews: build_dense_series(&data.pageviews, &range.start, &range.end, range.unit)?,
			sessions: build_dense_series(&data.sessions, &range.start, &range.end, range.unit)?,
		})
	}
}

/// Everything the chart renderer needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartModel {
	pub data: ChartData,
	pub unit: BucketUnit,
	/// Number of buckets in the range; independent of whether data arrived.
	pub records: usize,
	pub loading: bool,
	pub error: bool,
}

impl ChartModel {
	pub fn new<Tz: TimeZone, E>(
		state: &FetchState<PageviewData, E>,
		range: &DateRange<Tz>,
	) -> Result<Self, SeriesError> {
		let data = match state.data() {
			Some(data) => ChartData::build(data, range)?,
			None => ChartData::default(),
		};
		Ok(Self{
			data,
			unit: range.unit,
			records: range.bucket_count()?,
			loading: state.is_loading(),
			error: state.error().is_some(),
		})
	}
}

#[derive(Clone, Debug, PartialEq)]
struct MemoKey<Tz: TimeZone> {
	generation: u64,
	/// Bucket boundaries follow the wall clock of this zone.
	zone: Tz,
	start: DateTime<Utc>,
	end: DateTime<Utc>,
	unit: BucketUnit,
}

/// Keeps the last built [`ChartData`] until its inputs change.
///
/// `generation` identifies the fetched data; callers bump it whenever a new
/// response replaces the previous one. A range covering the same instants
/// in another time zone counts as a change.
#[derive(Debug)]
pub struct ChartMemo<Tz: TimeZone> {
	key: Option<MemoKey<Tz>>,
	data: ChartData,
	rebuilds: usize,
}

impl<Tz: TimeZone> Default for ChartMemo<Tz> {
	fn default() -> Self {
		Self{
			key: None,
			data: ChartData::default(),
			rebuilds: 0,
		}
	}
}

impl<Tz: TimeZone> ChartMemo<Tz> {
	pub fn new() -> Self {
		Self::default()
	}

	/// How often the data had to be rebuilt so far.
	pub fn rebuilds(&self) -> usize {
		self.rebuilds
	}
}

impl<Tz: TimeZone + PartialEq> ChartMemo<Tz> {
	pub fn get(
		&mut self,
		generation: u64,
		data: Option<&PageviewData>,
		range: &DateRange<Tz>,
	) -> Result<&ChartData, SeriesError> {
		let key = MemoKey{
			generation,
			zone: range.start.timezone(),
			start: range.start.with_timezone(&Utc),
			end: range.end.with_timezone(&Utc),
			unit: range.unit,
		};
		if self.key.as_ref() != Some(&key) {
			debug!("rebuilding chart data for generation {}", generation);
			self.data = match data {
				Some(data) => ChartData::build(data, range)?,
				None => ChartData::default(),
			};
			self.key = Some(key);
			self.rebuilds += 1;
		}
		Ok(&self.data)
	}
}
