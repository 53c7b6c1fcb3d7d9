pub mod browser;
pub mod locators;
pub mod places_api;
pub mod traits;
pub mod types;

pub use browser::{BrowserSettings, BrowserSourceAdapter, LoadMoreSettings};
pub use locators::LocatorTable;
pub use places_api::ApiSourceAdapter;
pub use traits::SourceAdapter;
pub use types::{QueryPlan, SearchQuery};
