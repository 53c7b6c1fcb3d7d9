use crate::error::{HarvestError, Result};
use crate::models::{PlaceCandidate, PlaceDetail};
use crate::scrapers::locators::{LocatorTable, ReviewExtractor};
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::SearchQuery;
use anyhow::Context;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use reqwest::Url;
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SEARCH_URL: &str = "https://www.google.com/maps/search/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Bounds for the "request more, wait, count" loop
#[derive(Debug, Clone)]
pub struct LoadMoreSettings {
    /// Stop once this many items are loaded
    pub target: usize,
    pub max_attempts: usize,
    /// Pause after each request before counting
    pub pause: Duration,
}

impl Default for LoadMoreSettings {
    fn default() -> Self {
        Self {
            target: 200,
            max_attempts: 40,
            pause: Duration::from_secs(3),
        }
    }
}

/// Why [`load_more`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    Stagnated,
    AttemptsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub loaded: usize,
    pub requests: usize,
    pub reason: StopReason,
}

/// A page region that grows when asked to load more items
pub trait ReviewPane {
    fn request_more(&self) -> Result<()>;
    fn count(&self) -> Result<usize>;
}

/// Keep asking the pane for more items until the target is reached, the count
/// stops growing between two measurements, or `max_attempts` requests were made.
pub fn load_more(pane: &dyn ReviewPane, settings: &LoadMoreSettings) -> Result<LoadOutcome> {
    let mut current = pane.count()?;
    let mut requests = 0;

    let reason = loop {
        if current >= settings.target {
            break StopReason::TargetReached;
        }
        if requests >= settings.max_attempts {
            break StopReason::AttemptsExhausted;
        }

        pane.request_more()?;
        requests += 1;
        if !settings.pause.is_zero() {
            thread::sleep(settings.pause);
        }

        let previous = current;
        current = pane.count()?;
        debug!("Currently loaded: {} reviews", current);

        if current == previous {
            break StopReason::Stagnated;
        }
    };

    Ok(LoadOutcome {
        loaded: current,
        requests,
        reason,
    })
}

/// Browser session settings
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// How long to wait for a results list or place page after navigating
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after clicks so the page can react
    pub settle: Duration,
    pub load_more: LoadMoreSettings,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            ready_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            settle: Duration::from_secs(3),
            load_more: LoadMoreSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Place,
    Results,
}

/// Google Maps reviews through a headless Chrome session.
///
/// Owns one tab for its whole lifetime; calls run strictly one after another.
pub struct BrowserSourceAdapter {
    _browser: Browser,
    tab: Arc<Tab>,
    locators: LocatorTable,
    extractor: ReviewExtractor,
    settings: BrowserSettings,
}

impl BrowserSourceAdapter {
    /// Launch Chrome and open the working tab
    pub fn new(settings: BrowserSettings, locators: LocatorTable) -> anyhow::Result<Self> {
        info!("Launching headless Chrome (locators v{})...", locators.version);

        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
            ])
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tab.set_user_agent(USER_AGENT, None, None)
            .context("Failed to set user agent")?;

        let extractor = ReviewExtractor::new(&locators)?;

        Ok(Self {
            _browser: browser,
            tab,
            locators,
            extractor,
            settings,
        })
    }

    fn eval(&self, js: &str) -> Result<Option<Value>> {
        let result = self.tab.evaluate(js, false).map_err(HarvestError::browser)?;
        Ok(result.value)
    }

    fn count(&self, selector: &str) -> Result<usize> {
        count_in(&self.tab, selector)
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url).map_err(HarvestError::browser)?;
        self.tab.wait_until_navigated().map_err(HarvestError::browser)?;
        // Hide the automation flag from page scripts
        let _ = self.eval("Object.defineProperty(navigator, 'webdriver', {get: () => undefined})");
        Ok(())
    }

    /// Poll until either a place page or a results list is showing
    fn wait_for_ready(&self) -> Result<PageState> {
        let deadline = Instant::now() + self.settings.ready_timeout;
        loop {
            if self.current_url().contains(&self.locators.place_url_marker) {
                return Ok(PageState::Place);
            }
            if self.count(&self.locators.result_item)? > 0 {
                return Ok(PageState::Results);
            }
            if Instant::now() >= deadline {
                return Err(HarvestError::NavigationTimeout {
                    waiting_for: "place page or results list".to_string(),
                    waited_secs: self.settings.ready_timeout.as_secs(),
                });
            }
            thread::sleep(self.settings.poll_interval);
        }
    }

    fn wait_for_place_page(&self) -> Result<()> {
        let deadline = Instant::now() + self.settings.ready_timeout;
        while !self.current_url().contains(&self.locators.place_url_marker) {
            if Instant::now() >= deadline {
                return Err(HarvestError::NavigationTimeout {
                    waiting_for: "place page after selecting first result".to_string(),
                    waited_secs: self.settings.ready_timeout.as_secs(),
                });
            }
            thread::sleep(self.settings.poll_interval);
        }
        Ok(())
    }

    fn open_first_result(&self) -> Result<()> {
        let selector = js_string(&self.locators.result_item);
        let clicked = self.eval(&format!(
            "(() => {{ const el = document.querySelector({selector}); \
             if (!el) return false; el.scrollIntoView(true); el.click(); return true; }})()"
        ))?;
        if clicked.and_then(|v| v.as_bool()) != Some(true) {
            return Err(HarvestError::ElementNotFound {
                what: "first search result".to_string(),
                tried: vec![self.locators.result_item.clone()],
            });
        }
        thread::sleep(self.settings.settle);
        self.wait_for_place_page()
    }

    /// First non-empty inner text among `selectors`
    fn first_text(&self, selectors: &[String]) -> Result<Option<String>> {
        for selector in selectors {
            let value = self.eval(&format!(
                "(() => {{ const el = document.querySelector({}); return el ? el.innerText : ''; }})()",
                js_string(selector)
            ))?;
            let text = value
                .as_ref()
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or("");
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
        Ok(None)
    }

    /// Make the review list visible, clicking the reviews tab if needed
    fn open_reviews(&self) -> Result<()> {
        let existing = self.count(&self.locators.review_item)?;
        if existing > 0 {
            info!("   Reviews already visible - found {} reviews", existing);
            return Ok(());
        }

        // Arrays come back by reference, so ship them as a JSON string
        let tabs = self.eval(&format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(t => [\
             (t.innerText || '').trim(), t.getAttribute('aria-label') || '', \
             t.getAttribute('data-tab-index') || '']))",
            js_string(&self.locators.review_tab)
        ))?;
        let tabs: Vec<(String, String, String)> = tabs
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        debug!("Found {} tabs", tabs.len());

        let not_found = || HarvestError::ElementNotFound {
            what: "reviews tab".to_string(),
            tried: vec![
                self.locators.review_item.clone(),
                self.locators.review_tab.clone(),
            ],
        };

        let index = tabs
            .iter()
            .position(|(text, label, idx)| self.locators.is_review_tab(text, label, idx))
            .ok_or_else(not_found)?;

        self.eval(&format!(
            "(() => {{ const t = document.querySelectorAll({})[{index}]; \
             t.scrollIntoView({{block: 'center'}}); t.removeAttribute('tabindex'); t.click(); }})()",
            js_string(&self.locators.review_tab)
        ))?;
        thread::sleep(self.settings.settle);

        let loaded = self.count(&self.locators.review_item)?;
        if loaded == 0 {
            return Err(not_found());
        }
        info!("   Opened reviews tab - found {} reviews", loaded);
        Ok(())
    }

    fn page_html(&self) -> Result<String> {
        let value = self.eval("document.documentElement.outerHTML")?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl SourceAdapter for BrowserSourceAdapter {
    /// Navigates to the search page and opens the first hit; yields at most one candidate.
    async fn search(&self, query: &SearchQuery, max_results: usize) -> Result<Vec<PlaceCandidate>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let url = search_url(&query.text)?;
        info!("Searching: {}", query.text);
        self.navigate(&url)?;

        match self.wait_for_ready()? {
            PageState::Place => info!("   Already on restaurant page"),
            PageState::Results => {
                debug!("Results list showing, opening first result");
                self.open_first_result()?;
                info!("   Opened restaurant page");
            }
        }

        let name = self
            .first_text(&self.locators.place_title)?
            .unwrap_or_else(|| query.text.clone());
        let address = self
            .first_text(&self.locators.place_address)?
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(vec![PlaceCandidate {
            id: self.current_url(),
            name,
            address,
            city: query.city.clone(),
            category: query.category.clone(),
            originating_query: query.text.clone(),
        }])
    }

    async fn fetch_detail(&self, candidate: &PlaceCandidate) -> Result<PlaceDetail> {
        if self.current_url() != candidate.id {
            debug!("Session is elsewhere, reopening {}", candidate.id);
            self.navigate(&candidate.id)?;
            if self.wait_for_ready()? == PageState::Results {
                self.open_first_result()?;
            }
        }

        self.open_reviews()?;

        let pane = ChromePane {
            tab: &self.tab,
            selector: &self.locators.review_item,
        };
        info!(
            "   Loading more reviews (target: {})...",
            self.settings.load_more.target
        );
        let outcome = load_more(&pane, &self.settings.load_more)?;
        info!(
            "   Loaded {} reviews after {} requests ({:?})",
            outcome.loaded, outcome.requests, outcome.reason
        );

        if outcome.loaded == 0 {
            warn!("   No reviews found for {}", candidate.name);
            return Ok(PlaceDetail::new(candidate.clone(), Vec::new()));
        }

        let html = self.page_html()?;
        let reviews = self.extractor.extract(&html, &candidate.id);
        info!("   Extracted {} reviews", reviews.len());

        Ok(PlaceDetail::new(candidate.clone(), reviews))
    }

    fn source_name(&self) -> &'static str {
        "Google Maps (browser)"
    }
}

/// The review list of the live tab
struct ChromePane<'a> {
    tab: &'a Arc<Tab>,
    selector: &'a str,
}

impl ReviewPane for ChromePane<'_> {
    fn request_more(&self) -> Result<()> {
        let js = format!(
            "(() => {{ const items = document.querySelectorAll({}); \
             if (items.length) items[items.length - 1].scrollIntoView(); \
             else window.scrollTo(0, document.body.scrollHeight); }})()",
            js_string(self.selector)
        );
        self.tab.evaluate(&js, false).map_err(HarvestError::browser)?;
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        count_in(self.tab, self.selector)
    }
}

fn count_in(tab: &Tab, selector: &str) -> Result<usize> {
    let js = format!("document.querySelectorAll({}).length", js_string(selector));
    let result = tab.evaluate(&js, false).map_err(HarvestError::browser)?;
    Ok(result.value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
}

/// Map search URL with the query as one percent-encoded path segment
fn search_url(text: &str) -> Result<String> {
    let mut url = Url::parse(SEARCH_URL)
        .map_err(|e| HarvestError::Configuration(format!("bad search URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| HarvestError::Configuration(format!("{SEARCH_URL} cannot take a path")))?
        .pop_if_empty()
        .push(text);
    Ok(url.into())
}

/// Quote a selector as a JavaScript string literal
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Pane whose count follows a script, one entry per measurement
    struct ScriptedPane {
        counts: RefCell<Vec<usize>>,
        requests: Cell<usize>,
    }

    impl ScriptedPane {
        fn new(counts: &[usize]) -> Self {
            Self {
                counts: RefCell::new(counts.iter().rev().copied().collect()),
                requests: Cell::new(0),
            }
        }
    }

    impl ReviewPane for ScriptedPane {
        fn request_more(&self) -> Result<()> {
            self.requests.set(self.requests.get() + 1);
            Ok(())
        }

        fn count(&self) -> Result<usize> {
            let mut counts = self.counts.borrow_mut();
            let next = if counts.len() > 1 {
                counts.pop()
            } else {
                counts.last().copied()
            };
            Ok(next.unwrap_or(0))
        }
    }

    fn settings(target: usize, max_attempts: usize) -> LoadMoreSettings {
        LoadMoreSettings {
            target,
            max_attempts,
            pause: Duration::ZERO,
        }
    }

    #[test]
    fn stops_when_count_stagnates() {
        let pane = ScriptedPane::new(&[10, 20, 30, 30, 40]);

        let outcome = load_more(&pane, &settings(100, 40)).unwrap();

        assert_eq!(outcome.reason, StopReason::Stagnated);
        assert_eq!(outcome.loaded, 30);
        assert_eq!(outcome.requests, 3);
        assert_eq!(pane.requests.get(), 3);
    }

    #[test]
    fn stops_at_target() {
        let pane = ScriptedPane::new(&[10, 20, 55]);

        let outcome = load_more(&pane, &settings(50, 40)).unwrap();

        assert_eq!(outcome.reason, StopReason::TargetReached);
        assert_eq!(outcome.loaded, 55);
        assert_eq!(outcome.requests, 2);
    }

    #[test]
    fn already_at_target_makes_no_requests() {
        let pane = ScriptedPane::new(&[60]);

        let outcome = load_more(&pane, &settings(50, 40)).unwrap();

        assert_eq!(outcome.reason, StopReason::TargetReached);
        assert_eq!(outcome.requests, 0);
    }

    #[test]
    fn never_exceeds_max_attempts() {
        let growing: Vec<usize> = (1..=100).collect();
        let pane = ScriptedPane::new(&growing);

        let outcome = load_more(&pane, &settings(1_000, 5)).unwrap();

        assert_eq!(outcome.reason, StopReason::AttemptsExhausted);
        assert_eq!(outcome.requests, 5);
        assert_eq!(pane.requests.get(), 5);
        assert_eq!(outcome.loaded, 6);
    }

    #[test]
    fn empty_pane_stagnates_after_one_request() {
        let pane = ScriptedPane::new(&[0]);

        let outcome = load_more(&pane, &settings(50, 40)).unwrap();

        assert_eq!(outcome.reason, StopReason::Stagnated);
        assert_eq!(outcome.loaded, 0);
        assert_eq!(outcome.requests, 1);
    }

    #[test]
    fn search_url_encodes_reserved_characters() {
        let url = search_url("Хачапурі & Вино #1 / bar?").unwrap();

        assert!(url.starts_with(SEARCH_URL));
        let query = &url[SEARCH_URL.len()..];
        assert!(!query.contains(['#', '/', '?', ' ']));
        assert!(query.contains("%23"));
        assert!(query.contains("%2F"));
        assert!(query.contains("%3F"));
    }

    #[test]
    fn search_url_keeps_plain_queries_readable() {
        assert_eq!(
            search_url("Mafia Kyiv").unwrap(),
            "https://www.google.com/maps/search/Mafia%20Kyiv"
        );
    }

    #[test]
    fn selectors_are_quoted_for_javascript() {
        assert_eq!(js_string("[data-result-index='0']"), r#""[data-result-index='0']""#);
        assert_eq!(js_string(r#"a[title="x"]"#), r#""a[title=\"x\"]""#);
    }
}
