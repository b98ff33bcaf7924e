use std::fmt;
use std::error::Error;
use std::io;
use std::ops::Deref;
use std::path::Path;

use serde::{de, Deserializer, Deserialize as DeserializeTrait};
use serde_derive::{Deserialize};

use crate::range::RangeSelection;

#[derive(Debug)]
pub enum ConfigError {
	Io(io::Error),
	Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => write!(f, "failed to read config: {}", e),
			Self::Parse(e) => write!(f, "invalid config: {}", e),
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::Parse(e) => Some(e),
		}
	}
}

impl From<io::Error> for ConfigError {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<toml::de::Error> for ConfigError {
	fn from(other: toml::de::Error) -> Self {
		Self::Parse(other)
	}
}

fn default_timezone() -> TimezoneWrap {
	TimezoneWrap(chrono_tz::UTC)
}

fn default_range() -> SelectionWrap {
	SelectionWrap(RangeSelection::Granularity("24hour".into()))
}

#[derive(Debug, Clone)]
pub struct TimezoneWrap(pub chrono_tz::Tz);

impl Deref for TimezoneWrap {
	type Target = chrono_tz::Tz;

	fn deref(&self) -> &chrono_tz::Tz {
		&self.0
	}
}

impl<'de> DeserializeTrait<'de> for TimezoneWrap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: Deserializer<'de>
    {
        let s = String::deserialize(deserializer)?;
        let tz = s.parse::<chrono_tz::Tz>().map_err(de::Error::custom)?;
        Ok(TimezoneWrap(tz))
    }
}

#[derive(Debug, Clone)]
pub struct SelectionWrap(pub RangeSelection);

impl Deref for SelectionWrap {
	type Target = RangeSelection;

	fn deref(&self) -> &RangeSelection {
		&self.0
	}
}

impl<'de> DeserializeTrait<'de> for SelectionWrap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: Deserializer<'de>
    {
        let s = String::deserialize(deserializer)?;
        let selection = s.parse::<RangeSelection>().map_err(de::Error::custom)?;
        Ok(SelectionWrap(selection))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	/// Root of the analytics API, without the `/api` suffix.
	pub base_url: String,
	pub website_id: u64,
	/// Token of a shared dashboard, sent along with every request.
	#[serde(default)]
	pub share_token: Option<String>,
	/// IANA name of the zone buckets are aligned to.
	#[serde(default = "default_timezone")]
	pub timezone: TimezoneWrap,
	#[serde(default = "default_range")]
	pub default_range: SelectionWrap,
}

impl Config {
	pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(s)?)
	}

	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
		let s = std::fs::read_to_string(path)?;
		Self::from_toml(&s)
	}
}
