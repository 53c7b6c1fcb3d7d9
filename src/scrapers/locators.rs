//! CSS locator table for the map page and review extraction from captured HTML.
//!
//! The ordered fallback lists are data, not code: when the page markup drifts,
//! ship a new table version instead of touching the extraction logic.

use crate::error::{HarvestError, Result};
use crate::models::Review;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

const EMBEDDED_TABLE: &str = include_str!("../../locators/google_maps.json");

pub const ANONYMOUS: &str = "Anonymous";

/// Texts shorter than this are kept only if no later locator does better
const MIN_TEXT_CHARS: usize = 6;

/// Versioned set of CSS locators for the map page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocatorTable {
    pub version: String,
    /// URL fragment present once a single place page is open
    pub place_url_marker: String,
    /// First entry of a search results list
    pub result_item: String,
    pub place_title: Vec<String>,
    pub place_address: Vec<String>,
    /// One loaded review
    pub review_item: String,
    /// Tab buttons on a place page
    pub review_tab: String,
    pub review_tab_index: String,
    /// Lowercase label fragments identifying the reviews tab
    pub review_tab_labels: Vec<String>,
    pub author: Vec<String>,
    /// Each match is one filled star
    pub rating_star: String,
    pub text: Vec<String>,
    pub relative_time: Vec<String>,
}

impl LocatorTable {
    /// Table shipped with the binary
    pub fn embedded() -> Result<Self> {
        serde_json::from_str(EMBEDDED_TABLE)
            .map_err(|e| HarvestError::Configuration(format!("embedded locator table: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Configuration(format!("locator table {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            HarvestError::Configuration(format!("locator table {}: {}", path.display(), e))
        })
    }

    /// Does the tab's text or aria-label look like the reviews tab?
    pub fn is_review_tab(&self, text: &str, label: &str, tab_index: &str) -> bool {
        if tab_index == self.review_tab_index {
            return true;
        }
        let text = text.to_lowercase();
        let label = label.to_lowercase();
        self.review_tab_labels
            .iter()
            .any(|needle| text.contains(needle.as_str()) || label.contains(needle.as_str()))
    }
}

/// [`LocatorTable`] with every selector parsed once
pub struct ReviewExtractor {
    item: Selector,
    author: Vec<Selector>,
    rating_star: Selector,
    text: Vec<Selector>,
    relative_time: Vec<Selector>,
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| HarvestError::Configuration(format!("invalid selector '{css}': {e}")))
}

fn parse_all(list: &[String]) -> Result<Vec<Selector>> {
    list.iter().map(|css| parse_selector(css)).collect()
}

impl ReviewExtractor {
    pub fn new(table: &LocatorTable) -> Result<Self> {
        Ok(Self {
            item: parse_selector(&table.review_item)?,
            author: parse_all(&table.author)?,
            rating_star: parse_selector(&table.rating_star)?,
            text: parse_all(&table.text)?,
            relative_time: parse_all(&table.relative_time)?,
        })
    }

    /// Extract every review from a captured page.
    ///
    /// Review ids repeat on nested elements, so each id is taken once.
    /// A broken item is logged and skipped; its siblings are still extracted.
    pub fn extract(&self, html: &str, place_id: &str) -> Vec<Review> {
        let document = Html::parse_document(html);
        let items: Vec<_> = document.select(&self.item).collect();
        debug!("Extracting data from {} review elements", items.len());

        let mut seen = HashSet::new();
        let mut reviews = Vec::new();

        for (idx, item) in items.iter().enumerate() {
            let review_id = item.value().attr("data-review-id").unwrap_or("").to_string();
            if !review_id.is_empty() && seen.contains(&review_id) {
                continue;
            }

            match self.extract_item(item, place_id) {
                Ok(review) if review.has_text() => {
                    seen.insert(review_id);
                    reviews.push(review);
                }
                Ok(_) => debug!("Review {} has no text, skipping", idx + 1),
                Err(e) => warn!("Error extracting review {}: {}", idx + 1, e),
            }
        }

        reviews
    }

    fn extract_item(&self, item: &ElementRef, place_id: &str) -> Result<Review> {
        let stars = item.select(&self.rating_star).count();
        if stars > 5 {
            return Err(HarvestError::MalformedResponse(format!(
                "{stars} rating stars in one review"
            )));
        }

        let author = first_text(item, &self.author, 1).unwrap_or_else(|| ANONYMOUS.to_string());
        let text = first_text(item, &self.text, MIN_TEXT_CHARS).unwrap_or_default();
        let time = first_text(item, &self.relative_time, 1).unwrap_or_default();

        Ok(Review {
            place_id: place_id.to_string(),
            author: Some(author),
            rating: stars as u8,
            text: Some(text),
            language_code: None,
            published_at: None,
            relative_time: Some(time).filter(|t| !t.is_empty()),
            scraped_at: Some(Utc::now()),
        })
    }
}

/// Try each selector in order; the first match with at least `min_chars`
/// characters wins, otherwise the first non-empty match.
fn first_text(item: &ElementRef, selectors: &[Selector], min_chars: usize) -> Option<String> {
    let mut fallback = None;
    for selector in selectors {
        let Some(el) = item.select(selector).next() else {
            continue;
        };
        let text = el.text().collect::<String>().trim().to_string();
        if text.chars().count() >= min_chars {
            return Some(text);
        }
        if !text.is_empty() && fallback.is_none() {
            fallback = Some(text);
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAR: &str = r#"<span class="hCCjke google-symbols NhBTye elGi1d"></span>"#;

    fn review_html(id: &str, author: &str, stars: usize, text: &str, time: &str) -> String {
        format!(
            r#"<div data-review-id="{id}">
                 <button data-review-id="{id}"></button>
                 <div class="WNxzHc"><div class="d4r55">{author}</div></div>
                 <span class="kvMYJc">{}</span>
                 <span class="rsqaWe">{time}</span>
                 <div class="MyEned"><span class="wiI7pd">{text}</span></div>
               </div>"#,
            STAR.repeat(stars)
        )
    }

    fn page(items: &[String]) -> String {
        format!("<html><body>{}</body></html>", items.join("\n"))
    }

    fn extractor() -> ReviewExtractor {
        ReviewExtractor::new(&LocatorTable::embedded().unwrap()).unwrap()
    }

    #[test]
    fn embedded_table_parses() {
        let table = LocatorTable::embedded().unwrap();

        assert_eq!(table.review_item, "[data-review-id]");
        assert_eq!(table.author.len(), 3);
        assert!(ReviewExtractor::new(&table).is_ok());
    }

    #[test]
    fn extracts_fields_and_skips_nested_duplicates() {
        let html = page(&[
            review_html("r1", "Олег", 5, "Дуже смачна кухня", "тиждень тому"),
            review_html("r2", "Марія", 2, "Повільне обслуговування", "2 місяці тому"),
        ]);

        let reviews = extractor().extract(&html, "place-1");

        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].author.as_deref(), Some("Олег"));
        assert_eq!(reviews[0].rating, 5);
        assert_eq!(reviews[0].text.as_deref(), Some("Дуже смачна кухня"));
        assert_eq!(reviews[0].relative_time.as_deref(), Some("тиждень тому"));
        assert_eq!(reviews[0].place_id, "place-1");
        assert!(reviews[0].scraped_at.is_some());
        assert_eq!(reviews[1].rating, 2);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let html = page(&[r#"<div data-review-id="r1">
                <div class="MyEned"><span class="wiI7pd">Найкращий борщ у місті</span></div>
            </div>"#
            .to_string()]);

        let reviews = extractor().extract(&html, "p");

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author.as_deref(), Some(ANONYMOUS));
        assert_eq!(reviews[0].rating, 0);
        assert_eq!(reviews[0].relative_time, None);
    }

    #[test]
    fn reviews_without_text_are_dropped() {
        let html = page(&[
            review_html("r1", "Олег", 4, "", "рік тому"),
            review_html("r2", "Іван", 5, "Чудово посиділи", "рік тому"),
        ]);

        let reviews = extractor().extract(&html, "p");

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author.as_deref(), Some("Іван"));
    }

    #[test]
    fn broken_item_does_not_abort_siblings() {
        let html = page(&[
            review_html("r1", "Зламаний", 9, "Зірочок забагато", "сьогодні"),
            review_html("r2", "Анна", 3, "Нормально, але дорого", "вчора"),
        ]);

        let reviews = extractor().extract(&html, "p");

        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author.as_deref(), Some("Анна"));
    }

    #[test]
    fn short_text_is_kept_only_without_better_match() {
        let html = page(&[r#"<div data-review-id="r1">
                <span class="wiI7pd">Ок</span>
            </div>"#
            .to_string()]);

        let reviews = extractor().extract(&html, "p");
        assert_eq!(reviews[0].text.as_deref(), Some("Ок"));
    }

    #[test]
    fn review_tab_matches_index_or_label() {
        let table = LocatorTable::embedded().unwrap();

        assert!(table.is_review_tab("Огляд", "", "2"));
        assert!(table.is_review_tab("Відгуки", "", "1"));
        assert!(table.is_review_tab("", "Reviews for Mafia", ""));
        assert!(!table.is_review_tab("Меню", "Menu", "0"));
    }

    #[test]
    fn invalid_selector_is_a_configuration_error() {
        let mut table = LocatorTable::embedded().unwrap();
        table.text = vec!["[[[".to_string()];

        let err = ReviewExtractor::new(&table).err().unwrap();
        assert!(matches!(err, HarvestError::Configuration(_)));
    }
}
