use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Language code of the reviews kept in the filtered dataset
pub const UKRAINIAN: &str = "uk";

/// A place returned by a search, before detail enrichment.
///
/// Serialized in the `restaurant_ids.json` shape so a candidate list can be
/// saved after the search phase and reloaded for the review phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceCandidate {
    #[serde(rename = "place_id")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    #[serde(rename = "restaurant_type")]
    pub category: String,
    #[serde(rename = "search_query")]
    pub originating_query: String,
}

/// A single review, owned by exactly one [`PlaceDetail`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub place_id: String,
    pub author: Option<String>,
    /// Star rating, 0 when the source gave none
    pub rating: u8,
    pub text: Option<String>,
    pub language_code: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Human-readable age as shown on a web page ("2 тижні тому")
    pub relative_time: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn is_language(&self, code: &str) -> bool {
        self.language_code.as_deref() == Some(code)
    }
}

/// A fully enriched place, including its reviews
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDetail {
    pub candidate: PlaceCandidate,
    pub rating: Option<f64>,
    pub rating_count: Option<u32>,
    pub website: Option<String>,
    pub opening_hours: Option<serde_json::Value>,
    pub reviews: Vec<Review>,
}

impl PlaceDetail {
    /// Build a detail record, dropping reviews that carry no text.
    pub fn new(candidate: PlaceCandidate, reviews: Vec<Review>) -> Self {
        Self {
            candidate,
            rating: None,
            rating_count: None,
            website: None,
            opening_hours: None,
            reviews: reviews.into_iter().filter(Review::has_text).collect(),
        }
    }

    /// Flatten into one output record per review.
    pub fn records(&self) -> Vec<ReviewRecord> {
        self.reviews
            .iter()
            .map(|review| ReviewRecord::new(&self.candidate, review))
            .collect()
    }
}

/// Review record as persisted in the review datasets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRecord {
    pub restaurant_name: String,
    pub restaurant_city: String,
    pub restaurant_type: String,
    pub restaurant_address: String,
    pub place_id: String,
    pub review_author: Option<String>,
    pub review_rating: u8,
    pub review_text: Option<String>,
    pub review_time: Option<String>,
    pub review_language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    pub fn new(place: &PlaceCandidate, review: &Review) -> Self {
        let review_time = review
            .published_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .or_else(|| review.relative_time.clone());

        Self {
            restaurant_name: place.name.clone(),
            restaurant_city: place.city.clone(),
            restaurant_type: place.category.clone(),
            restaurant_address: place.address.clone(),
            place_id: place.id.clone(),
            review_author: review.author.clone(),
            review_rating: review.rating,
            review_text: review.text.clone(),
            review_time,
            review_language_code: review.language_code.clone(),
            scraped_at: review.scraped_at,
        }
    }

    pub fn is_ukrainian(&self) -> bool {
        self.review_language_code.as_deref() == Some(UKRAINIAN)
    }
}

/// Binary-sentiment row for the CSV export
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SentimentRow {
    #[serde(rename = "Review")]
    pub review: String,
    #[serde(rename = "Liked")]
    pub liked: u8,
}

impl SentimentRow {
    /// 1–2 stars is negative, 5 is positive, everything else is ambiguous.
    pub fn from_record(record: &ReviewRecord) -> Option<Self> {
        let liked = match record.review_rating {
            1 | 2 => 0,
            5 => 1,
            _ => return None,
        };
        let review = record.review_text.clone().filter(|t| !t.trim().is_empty())?;
        Some(Self { review, liked })
    }
}

#[cfg(test)]
impl PlaceCandidate {
    pub(crate) fn sample(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Place {id}"),
            address: "вул. Хрещатик, 1".to_string(),
            city: "Київ".to_string(),
            category: "кафе".to_string(),
            originating_query: "кафе у Київ".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> PlaceCandidate {
        PlaceCandidate::sample(id)
    }

    fn review(lang: &str, text: Option<&str>) -> Review {
        Review {
            place_id: "a".to_string(),
            author: Some("Олена".to_string()),
            rating: 5,
            text: text.map(str::to_string),
            language_code: Some(lang.to_string()),
            published_at: None,
            relative_time: None,
            scraped_at: None,
        }
    }

    #[test]
    fn detail_drops_reviews_without_text() {
        let detail = PlaceDetail::new(
            candidate("a"),
            vec![
                review("uk", Some("Смачно")),
                review("uk", Some("")),
                review("en", None),
                review("en", Some("   ")),
            ],
        );

        assert_eq!(detail.reviews.len(), 1);
        assert_eq!(detail.reviews[0].text.as_deref(), Some("Смачно"));
    }

    #[test]
    fn candidate_uses_persisted_field_names() {
        let json = serde_json::to_value(candidate("abc")).unwrap();

        assert_eq!(json["place_id"], "abc");
        assert_eq!(json["restaurant_type"], "кафе");
        assert_eq!(json["search_query"], "кафе у Київ");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn record_prefers_publish_time_over_relative_time() {
        let mut r = review("uk", Some("Смачно"));
        r.published_at = Some("2024-03-01T10:00:00Z".parse().unwrap());
        r.relative_time = Some("рік тому".to_string());

        let record = ReviewRecord::new(&candidate("a"), &r);
        assert_eq!(record.review_time.as_deref(), Some("2024-03-01T10:00:00Z"));

        r.published_at = None;
        let record = ReviewRecord::new(&candidate("a"), &r);
        assert_eq!(record.review_time.as_deref(), Some("рік тому"));
    }

    #[test]
    fn sentiment_mapping_skips_middle_ratings() {
        let mut record = ReviewRecord::new(&candidate("a"), &review("uk", Some("Ок")));
        let liked = |rating: u8, record: &mut ReviewRecord| {
            record.review_rating = rating;
            SentimentRow::from_record(record).map(|row| row.liked)
        };

        assert_eq!(liked(1, &mut record), Some(0));
        assert_eq!(liked(2, &mut record), Some(0));
        assert_eq!(liked(3, &mut record), None);
        assert_eq!(liked(4, &mut record), None);
        assert_eq!(liked(5, &mut record), Some(1));
        assert_eq!(liked(0, &mut record), None);
    }
}
