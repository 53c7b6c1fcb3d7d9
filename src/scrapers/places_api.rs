use crate::error::{HarvestError, Result};
use crate::models::{PlaceCandidate, PlaceDetail, Review};
use crate::pacing::PacingStrategy;
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::SearchQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://places.googleapis.com/v1";

/// Hard cap on `maxResultCount` imposed by the provider
pub const PAGE_LIMIT: usize = 20;

const SEARCH_FIELD_MASK: &str = "places.displayName,places.id,places.formattedAddress";
const DETAIL_FIELD_MASK: &str =
    "reviews,displayName,formattedAddress,rating,userRatingCount,websiteUri,currentOpeningHours";

const BODY_PREVIEW_LEN: usize = 300;

/// Places API (New) adapter: text search plus place details
pub struct ApiSourceAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    language_code: String,
    region_code: String,
    max_retries: u32,
    backoff: PacingStrategy,
}

impl ApiSourceAdapter {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HarvestError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            language_code: "uk".to_string(),
            region_code: "UA".to_string(),
            max_retries: 2,
            backoff: PacingStrategy::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(16),
            },
        })
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: PacingStrategy) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    fn search_body(&self, query: &str, max_results: usize) -> Value {
        json!({
            "textQuery": query,
            "maxResultCount": max_results.clamp(1, PAGE_LIMIT),
            "languageCode": self.language_code,
            "regionCode": self.region_code,
        })
    }

    /// Send a request, retrying connection failures, 429 and 5xx with backoff.
    ///
    /// `build_request` is called once per attempt since builders are consumed by `send()`.
    async fn send_json<F>(&self, build_request: F) -> Result<Value>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            let err = match build_request().send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json::<Value>().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    status_error(status, &body)
                }
                Err(e) => HarvestError::from(e),
            };

            if attempt >= self.max_retries || !is_retryable(&err) {
                return Err(err);
            }

            let delay = self.backoff.delay(attempt);
            attempt += 1;
            warn!("  retry {}/{} in {:?} after: {}", attempt, self.max_retries, delay, err);
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SourceAdapter for ApiSourceAdapter {
    async fn search(&self, query: &SearchQuery, max_results: usize) -> Result<Vec<PlaceCandidate>> {
        let url = format!("{}/places:searchText", self.base_url);
        let body = self.search_body(&query.text, max_results);

        debug!("POST {} ({})", url, query.text);

        let value = self
            .send_json(|| {
                self.client
                    .post(&url)
                    .header("X-Goog-Api-Key", &self.api_key)
                    .header("X-Goog-FieldMask", SEARCH_FIELD_MASK)
                    .json(&body)
            })
            .await?;

        let mut candidates = parse_search_response(value, query)?;
        candidates.truncate(max_results.min(PAGE_LIMIT));
        Ok(candidates)
    }

    async fn fetch_detail(&self, candidate: &PlaceCandidate) -> Result<PlaceDetail> {
        let url = format!("{}/places/{}", self.base_url, candidate.id);

        debug!("GET {}", url);

        let value = self
            .send_json(|| {
                self.client
                    .get(&url)
                    .header("X-Goog-Api-Key", &self.api_key)
                    .header("X-Goog-FieldMask", DETAIL_FIELD_MASK)
                    .header("Content-Type", "application/json")
            })
            .await?;

        parse_detail_response(value, candidate)
    }

    fn source_name(&self) -> &'static str {
        "Places API"
    }
}

fn status_error(status: StatusCode, body: &str) -> HarvestError {
    let preview: String = body.chars().take(BODY_PREVIEW_LEN).collect();
    HarvestError::Transport {
        message: format!("HTTP {}: {}", status, preview),
        status: Some(status.as_u16()),
    }
}

/// 4xx other than 429 are permanent; everything else on the wire is worth another try.
fn is_retryable(err: &HarvestError) -> bool {
    match err {
        HarvestError::Transport {
            status: Some(code), ..
        } => *code == StatusCode::TOO_MANY_REQUESTS.as_u16() || *code >= 500,
        HarvestError::Transport { status: None, .. } => true,
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalizedText {
    text: Option<String>,
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    places: Vec<SearchPlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPlace {
    id: String,
    display_name: LocalizedText,
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailResponse {
    display_name: Option<LocalizedText>,
    formatted_address: Option<String>,
    rating: Option<f64>,
    user_rating_count: Option<u32>,
    website_uri: Option<String>,
    current_opening_hours: Option<Value>,
    #[serde(default)]
    reviews: Vec<ApiReview>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiReview {
    rating: Option<f64>,
    text: Option<LocalizedText>,
    author_attribution: Option<AuthorAttribution>,
    publish_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorAttribution {
    display_name: Option<String>,
}

/// Turn a `places:searchText` response into candidates.
///
/// An empty object means no results; a place without `id` or
/// `displayName.text` is malformed.
fn parse_search_response(value: Value, query: &SearchQuery) -> Result<Vec<PlaceCandidate>> {
    if !value.is_object() {
        return Err(HarvestError::MalformedResponse(format!(
            "search for '{}' did not return an object",
            query.text
        )));
    }

    let response: SearchResponse = serde_json::from_value(value).map_err(|e| {
        HarvestError::MalformedResponse(format!("search for '{}': {}", query.text, e))
    })?;

    response
        .places
        .into_iter()
        .map(|place| {
            let name = place.display_name.text.ok_or_else(|| {
                HarvestError::MalformedResponse(format!("place {} has no displayName.text", place.id))
            })?;

            Ok(PlaceCandidate {
                id: place.id,
                name,
                address: place.formatted_address.unwrap_or_else(|| "Unknown".to_string()),
                city: query.city.clone(),
                category: query.category.clone(),
                originating_query: query.text.clone(),
            })
        })
        .collect()
}

/// Turn a place-details response into a [`PlaceDetail`].
/// A missing `reviews` field means zero reviews.
fn parse_detail_response(value: Value, candidate: &PlaceCandidate) -> Result<PlaceDetail> {
    if !value.is_object() {
        return Err(HarvestError::MalformedResponse(format!(
            "details for {} did not return an object",
            candidate.id
        )));
    }

    let response: DetailResponse = serde_json::from_value(value).map_err(|e| {
        HarvestError::MalformedResponse(format!("details for {}: {}", candidate.id, e))
    })?;

    let mut place = candidate.clone();
    if place.name.is_empty() {
        if let Some(name) = response.display_name.and_then(|n| n.text) {
            place.name = name;
        }
    }
    if place.address.is_empty() {
        if let Some(address) = response.formatted_address {
            place.address = address;
        }
    }

    let reviews = response
        .reviews
        .into_iter()
        .map(|review| convert_review(review, &candidate.id))
        .collect();

    let mut detail = PlaceDetail::new(place, reviews);
    detail.rating = response.rating;
    detail.rating_count = response.user_rating_count;
    detail.website = response.website_uri;
    detail.opening_hours = response.current_opening_hours;
    Ok(detail)
}

fn convert_review(review: ApiReview, place_id: &str) -> Review {
    let (text, language_code) = match review.text {
        Some(t) => (t.text, t.language_code),
        None => (None, None),
    };

    // Unparseable timestamps are kept verbatim rather than dropped.
    let (published_at, relative_time) = match review.publish_time {
        Some(raw) => match raw.parse::<DateTime<Utc>>() {
            Ok(ts) => (Some(ts), None),
            Err(_) => (None, Some(raw)),
        },
        None => (None, None),
    };

    Review {
        place_id: place_id.to_string(),
        author: review.author_attribution.and_then(|a| a.display_name),
        rating: review.rating.map(|r| r.round().clamp(0.0, 5.0) as u8).unwrap_or(0),
        text,
        language_code,
        published_at,
        relative_time,
        scraped_at: None,
    }
}
