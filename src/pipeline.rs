//! Sequential harvest over a query plan.
//!
//! Search phase: every query goes through [`SourceAdapter::search`], results are
//! deduplicated in a [`RecordStore`]. Review phase: every unique candidate goes
//! through [`SourceAdapter::fetch_detail`]. A failing query or place is logged,
//! counted and skipped; nothing short of a panic aborts the run.

use crate::models::{PlaceCandidate, ReviewRecord, UKRAINIAN};
use crate::pacing::RateLimiter;
use crate::scrapers::{QueryPlan, SourceAdapter};
use crate::store::RecordStore;
use tracing::{error, info, warn};

/// Outcome of the search phase
#[derive(Debug, Default)]
pub struct SearchReport {
    pub candidates: Vec<PlaceCandidate>,
    pub searches: usize,
    pub failed_searches: usize,
    /// Places returned across all searches, duplicates included
    pub places_seen: usize,
}

/// Outcome of the review phase
#[derive(Debug, Default)]
pub struct ReviewReport {
    pub reviews: Vec<ReviewRecord>,
    pub places: usize,
    pub failed_places: usize,
}

impl ReviewReport {
    /// Filtered view: reviews in Ukrainian
    pub fn ukrainian(&self) -> Vec<ReviewRecord> {
        self.reviews
            .iter()
            .filter(|r| r.is_ukrainian())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct HarvestReport {
    pub search: SearchReport,
    pub reviews: ReviewReport,
}

pub struct HarvestPipeline {
    adapter: Box<dyn SourceAdapter>,
    max_results: usize,
    search_pacing: RateLimiter,
    detail_pacing: RateLimiter,
}

impl HarvestPipeline {
    pub fn new(adapter: Box<dyn SourceAdapter>, max_results: usize) -> Self {
        Self {
            adapter,
            max_results,
            search_pacing: RateLimiter::unpaced(),
            detail_pacing: RateLimiter::unpaced(),
        }
    }

    pub fn with_pacing(mut self, search: RateLimiter, detail: RateLimiter) -> Self {
        self.search_pacing = search;
        self.detail_pacing = detail;
        self
    }

    /// Run every query of the plan and collect unique candidates
    pub async fn collect_candidates(&self, plan: &QueryPlan) -> SearchReport {
        let total = plan.len();
        let mut store = RecordStore::new();
        let mut report = SearchReport::default();

        info!(
            "Starting {} search(es) against {}",
            total,
            self.adapter.source_name()
        );

        let mut current_city = None;
        for (idx, query) in plan.queries.iter().enumerate() {
            if current_city != Some(&query.city) {
                info!("Processing city: {}", query.city);
                current_city = Some(&query.city);
            }
            info!("   [{}/{}] Searching: {}", idx + 1, total, query.text);
            report.searches += 1;

            match self.adapter.search(query, self.max_results).await {
                Ok(places) if places.is_empty() => {
                    self.search_pacing.record_success();
                    warn!("      No results found");
                }
                Ok(places) => {
                    self.search_pacing.record_success();
                    report.places_seen += places.len();
                    let found = places.len();
                    let mut new = 0;
                    for place in places {
                        if store.add(place) {
                            new += 1;
                        }
                    }
                    info!("      Found {} places, {} new unique restaurants", found, new);
                }
                Err(e) => {
                    self.search_pacing.record_failure();
                    report.failed_searches += 1;
                    error!("      Search failed: {}", e);
                }
            }

            if idx + 1 < total {
                self.search_pacing.wait().await;
            }
        }

        info!(
            "Search summary: {} unique restaurants from {} searches ({} failed)",
            store.len(),
            report.searches,
            report.failed_searches
        );

        report.candidates = store.into_vec();
        report
    }

    /// Fetch details for each candidate and flatten their reviews
    pub async fn collect_reviews(&self, candidates: &[PlaceCandidate]) -> ReviewReport {
        let total = candidates.len();
        let mut report = ReviewReport::default();

        info!("Starting review collection from {} restaurants", total);

        for (idx, candidate) in candidates.iter().enumerate() {
            info!("[{}/{}] {} ({})", idx + 1, total, candidate.name, candidate.city);
            report.places += 1;

            match self.adapter.fetch_detail(candidate).await {
                Ok(detail) => {
                    self.detail_pacing.record_success();
                    if detail.reviews.is_empty() {
                        warn!("   No reviews found");
                    } else {
                        let ukrainian = detail
                            .reviews
                            .iter()
                            .filter(|r| r.is_language(UKRAINIAN))
                            .count();
                        info!(
                            "   Found {} reviews, {} in Ukrainian",
                            detail.reviews.len(),
                            ukrainian
                        );
                    }
                    report.reviews.extend(detail.records());
                }
                Err(e) => {
                    self.detail_pacing.record_failure();
                    report.failed_places += 1;
                    error!("   Error: {}", e);
                }
            }

            if idx + 1 < total {
                self.detail_pacing.wait().await;
            }
        }

        info!(
            "Review summary: {} reviews from {} restaurants ({} failed)",
            report.reviews.len(),
            report.places,
            report.failed_places
        );

        report
    }

    /// Search phase followed by the review phase
    pub async fn run(&self, plan: &QueryPlan) -> HarvestReport {
        let search = self.collect_candidates(plan).await;
        let reviews = self.collect_reviews(&search.candidates).await;
        HarvestReport { search, reviews }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HarvestError, Result};
    use crate::models::{PlaceDetail, Review};
    use crate::scrapers::SearchQuery;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Adapter serving canned results; queries or ids listed in `failing` error out
    #[derive(Default)]
    struct FakeAdapter {
        results: HashMap<String, Vec<&'static str>>,
        reviews: HashMap<&'static str, Vec<(&'static str, &'static str)>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        async fn search(&self, query: &SearchQuery, max_results: usize) -> Result<Vec<PlaceCandidate>> {
            if self.failing.contains(&query.text) {
                return Err(HarvestError::transport("HTTP 503"));
            }
            Ok(self
                .results
                .get(&query.text)
                .into_iter()
                .flatten()
                .take(max_results)
                .map(|id| PlaceCandidate {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                    address: "Unknown".to_string(),
                    city: query.city.clone(),
                    category: query.category.clone(),
                    originating_query: query.text.clone(),
                })
                .collect())
        }

        async fn fetch_detail(&self, candidate: &PlaceCandidate) -> Result<PlaceDetail> {
            if self.failing.contains(&candidate.id) {
                return Err(HarvestError::MalformedResponse("bad payload".to_string()));
            }
            let reviews = self
                .reviews
                .get(candidate.id.as_str())
                .into_iter()
                .flatten()
                .map(|(lang, text)| Review {
                    place_id: candidate.id.clone(),
                    author: None,
                    rating: 5,
                    text: Some(text.to_string()),
                    language_code: Some(lang.to_string()),
                    published_at: None,
                    relative_time: None,
                    scraped_at: None,
                })
                .collect();
            Ok(PlaceDetail::new(candidate.clone(), reviews))
        }

        fn source_name(&self) -> &'static str {
            "fake"
        }
    }

    fn plan() -> QueryPlan {
        QueryPlan::cities_by_categories(
            &["Київ".to_string(), "Львів".to_string()],
            &["кафе".to_string(), "ресторан".to_string()],
        )
    }

    fn adapter() -> FakeAdapter {
        let mut fake = FakeAdapter::default();
        fake.results.insert("кафе у Київ".into(), vec!["a", "b"]);
        fake.results.insert("ресторан у Київ".into(), vec!["b", "c"]);
        fake.results.insert("кафе у Львів".into(), vec!["d"]);
        fake.results.insert("ресторан у Львів".into(), vec!["e", "a"]);
        fake
    }

    #[tokio::test]
    async fn search_phase_deduplicates_across_queries() {
        let pipeline = HarvestPipeline::new(Box::new(adapter()), 20);

        let report = pipeline.collect_candidates(&plan()).await;

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(report.searches, 4);
        assert_eq!(report.places_seen, 7);
        assert_eq!(report.failed_searches, 0);
        // first sighting wins
        assert_eq!(report.candidates[0].category, "кафе");
    }

    #[tokio::test]
    async fn failed_searches_are_counted_and_skipped() {
        let mut fake = adapter();
        fake.failing = vec!["ресторан у Київ".into(), "кафе у Львів".into()];
        let pipeline = HarvestPipeline::new(Box::new(fake), 20);

        let report = pipeline.collect_candidates(&plan()).await;

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "e"]);
        assert_eq!(report.failed_searches, 2);
        assert_eq!(report.searches, 4);
    }

    #[tokio::test]
    async fn max_results_is_passed_to_the_adapter() {
        let pipeline = HarvestPipeline::new(Box::new(adapter()), 1);

        let report = pipeline.collect_candidates(&plan()).await;

        let ids: Vec<&str> = report.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d", "e"]);
    }

    #[tokio::test]
    async fn failed_detail_skips_only_that_place() {
        let mut fake = adapter();
        fake.reviews.insert("a", vec![("uk", "Смачно"), ("en", "Great")]);
        fake.reviews.insert("b", vec![("uk", "Затишно")]);
        fake.reviews.insert("c", vec![("uk", "Дорого")]);
        fake.failing = vec!["b".into()];
        let pipeline = HarvestPipeline::new(Box::new(fake), 20);

        let candidates: Vec<PlaceCandidate> =
            ["a", "b", "c"].into_iter().map(PlaceCandidate::sample).collect();
        let report = pipeline.collect_reviews(&candidates).await;

        assert_eq!(report.places, 3);
        assert_eq!(report.failed_places, 1);
        let texts: Vec<_> = report
            .reviews
            .iter()
            .map(|r| r.review_text.as_deref().unwrap())
            .collect();
        assert_eq!(texts, vec!["Смачно", "Great", "Дорого"]);
    }

    #[tokio::test]
    async fn no_pause_after_the_last_item() {
        let pause = || RateLimiter::fixed(Duration::from_secs(30));
        let pipeline =
            HarvestPipeline::new(Box::new(adapter()), 20).with_pacing(pause(), pause());
        let plan = QueryPlan {
            queries: vec![SearchQuery::category_in_city("кафе", "Львів")],
        };

        let report = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&plan))
            .await
            .expect("run paused after its last query or place");

        assert_eq!(report.search.candidates.len(), 1);
        assert_eq!(report.reviews.places, 1);
    }

    #[tokio::test]
    async fn full_run_filters_ukrainian_view() {
        let mut fake = adapter();
        fake.reviews.insert("a", vec![("uk", "Смачно"), ("en", "Great"), ("uk", "")]);
        fake.reviews.insert("d", vec![("uk", "Найкраща кава")]);
        let pipeline = HarvestPipeline::new(Box::new(fake), 20);

        let report = pipeline.run(&plan()).await;

        assert_eq!(report.search.candidates.len(), 5);
        assert_eq!(report.reviews.reviews.len(), 3);
        let ukrainian = report.reviews.ukrainian();
        assert_eq!(ukrainian.len(), 2);
        assert!(ukrainian.iter().all(|r| r.is_ukrainian()));
        assert_eq!(ukrainian[0].restaurant_city, "Київ");
        assert_eq!(ukrainian[1].restaurant_city, "Львів");
    }
}
