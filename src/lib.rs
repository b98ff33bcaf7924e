pub mod chart;
pub mod config;
#[cfg(feature = "client")]
pub mod fetch;
pub mod range;
pub mod series;
