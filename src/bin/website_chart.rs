use std::path::PathBuf;

use chrono::Utc;

use env_logger;

use log::{info, warn};

use structopt::StructOpt;

use website_chart::chart::{ChartModel, FetchState, Filters};
use website_chart::config::Config;
use website_chart::fetch::{Client, PageviewQuery};
use website_chart::range::RangeSelection;

#[derive(StructOpt, Debug)]
#[structopt(name = "website_chart")]
struct Opt {
	#[structopt(short, long, default_value = "config.toml", parse(from_os_str))]
	config: PathBuf,
	/// Date range, e.g. "24hour", "7day", "-1month" or "all"
	#[structopt(short, long)]
	range: Option<RangeSelection>,
	/// Only count pageviews of this URL
	#[structopt(long)]
	url: Option<String>,
	/// Only count pageviews referred by this domain
	#[structopt(long = "ref")]
	referrer: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let opt = Opt::from_args();
	let config = Config::load(&opt.config)?;
	let tz = *config.timezone;

	let client = Client::new(config.base_url.clone(), config.share_token.clone());
	let selection = opt.range.unwrap_or_else(|| config.default_range.0.clone());
	let created_at = if selection.needs_creation_date() {
		Some(client.website(config.website_id).await?.created_at)
	} else {
		None
	};
	let range = selection.resolve(&Utc::now().with_timezone(&tz), created_at)?;
	info!("showing {} from {} to {} by {}", range.value, range.start, range.end, range.unit);

	let filters = Filters{
		url: opt.url.map(|v| v.into()),
		referrer: opt.referrer.map(|v| v.into()),
	};
	let query = PageviewQuery::new(config.website_id, &range, tz.name(), &filters);
	let state = FetchState::from(client.pageviews(&query).await);
	if let Some(e) = state.error() {
		warn!("failed to load pageviews: {}", e);
	}

	let model = ChartModel::new(&state, &range)?;
	if model.error {
		return Err("no data available".into());
	}

	for (param, value) in filters.tags() {
		println!("filter {}={}", param.as_str(), value);
	}
	let mut total_pageviews = 0u64;
	let mut total_sessions = 0u64;
	for (pageviews, sessions) in model.data.pageviews.iter().zip(model.data.sessions.iter()) {
		let label = range.unit.label(&pageviews.bucket_start.with_timezone(&tz));
		println!("{:>12} {:>10} {:>10}", label, pageviews.value, sessions.value);
		total_pageviews += pageviews.value;
		total_sessions += sessions.value;
	}
	println!("{:>12} {:>10} {:>10}", "total", total_pageviews, total_sessions);
	info!("{} buckets", model.records);
	Ok(())
}
