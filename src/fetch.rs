use std::fmt;
use std::error::Error;

use chrono::{DateTime, TimeZone, Utc};

use log::{debug, trace};

use reqwest;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

use smartstring::alias::{String as SmartString};

use crate::chart::{Filters, PageviewData};
use crate::range::DateRange;
use crate::series::{deserialize_timestamp, BucketUnit};

/// Header carrying the token of a shared dashboard.
pub const SHARE_TOKEN_HEADER: &str = "x-umami-share-token";

#[derive(Debug)]
pub enum FetchError {
	Request(reqwest::Error),
	Status(u16),
	Decode(serde_json::Error),
}

impl fmt::Display for FetchError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Status(code) => write!(f, "unexpected status {}", code),
			Self::Decode(e) => write!(f, "malformed response: {}", e),
		}
	}
}

impl Error for FetchError {
}

impl From<reqwest::Error> for FetchError {
	fn from(err: reqwest::Error) -> Self {
		Self::Request(err)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageviewQuery {
	pub website_id: u64,
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	pub unit: BucketUnit,
	/// IANA zone name the server buckets in.
	pub timezone: SmartString,
	pub filters: Filters,
}

impl PageviewQuery {
	pub fn new<Tz: TimeZone>(website_id: u64, range: &DateRange<Tz>, timezone: &str, filters: &Filters) -> Self {
		Self{
			website_id,
			start: range.start.with_timezone(&Utc),
			end: range.end.with_timezone(&Utc),
			unit: range.unit,
			timezone: timezone.into(),
			filters: filters.clone(),
		}
	}

	pub fn path(&self) -> String {
		format!("/api/website/{}/pageviews", self.website_id)
	}

	/// Query string parameters; times are milliseconds since the epoch.
	pub fn params(&self) -> Vec<(&'static str, String)> {
		let mut params = vec![
			("start_at", self.start.timestamp_millis().to_string()),
			("end_at", self.end.timestamp_millis().to_string()),
			("unit", self.unit.as_str().to_string()),
			("tz", self.timezone.to_string()),
		];
		for (param, value) in self.filters.tags() {
			params.push((param.as_str(), value.to_string()));
		}
		params
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Website {
	#[serde(deserialize_with = "deserialize_timestamp")]
	pub created_at: DateTime<Utc>,
}

pub struct Client {
	client: reqwest::Client,
	base_url: String,
	share_token: Option<String>,
}

impl Client {
	pub fn new(base_url: String, share_token: Option<String>) -> Self {
		Self{
			client: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			share_token,
		}
	}

	fn get(&self, path: &str) -> reqwest::RequestBuilder {
		let req = self.client.get(format!("{}{}", self.base_url, path));
		match self.share_token {
			Some(ref token) => req.header(SHARE_TOKEN_HEADER, token.as_str()),
			None => req,
		}
	}

	async fn fetch_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, FetchError> {
		let resp = req.send().await?;
		let status = resp.status();
		if !status.is_success() {
			return Err(FetchError::Status(status.as_u16()));
		}
		let body = resp.bytes().await?;
		trace!("received {} bytes", body.len());
		serde_json::from_slice(&body).map_err(FetchError::Decode)
	}

	pub async fn pageviews(&self, query: &PageviewQuery) -> Result<PageviewData, FetchError> {
		debug!("fetching pageviews of website {} from {} to {}", query.website_id, query.start, query.end);
		let req = self.get(&query.path()).query(&query.params());
		Self::fetch_json(req).await
	}

	pub async fn website(&self, website_id: u64) -> Result<Website, FetchError> {
		debug!("fetching website {}", website_id);
		Self::fetch_json(self.get(&format!("/api/website/{}", website_id))).await
	}
}
