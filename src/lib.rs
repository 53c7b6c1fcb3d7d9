//! Restaurant review harvester for Ukrainian cities.
//!
//! Two sources feed the same pipeline: the Places API ([`scrapers::ApiSourceAdapter`])
//! and a headless Chrome session on Google Maps ([`scrapers::BrowserSourceAdapter`]).

pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod pacing;
pub mod pipeline;
pub mod scrapers;
pub mod store;
