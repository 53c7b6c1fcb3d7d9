use crate::error::Result;
use crate::models::{PlaceCandidate, PlaceDetail};
use crate::scrapers::types::SearchQuery;
use async_trait::async_trait;

/// Common interface over every place/review source.
/// The pipeline only talks to this; provider-specific parsing stays in the adapters.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Run one search and return at most `max_results` candidates
    async fn search(&self, query: &SearchQuery, max_results: usize) -> Result<Vec<PlaceCandidate>>;

    /// Enrich a candidate with place details and its reviews
    async fn fetch_detail(&self, candidate: &PlaceCandidate) -> Result<PlaceDetail>;

    /// Get the name of the source
    fn source_name(&self) -> &'static str;
}
