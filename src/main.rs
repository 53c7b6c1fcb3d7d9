use anyhow::Context;
use clap::{Parser, ValueEnum};
use review_harvester::config::{Settings, API_KEY_ENV, DEFAULT_CONFIG_FILE};
use review_harvester::models::{PlaceCandidate, ReviewRecord};
use review_harvester::output::{
    self, DatasetWriter, WriteOutcome, ALL_REVIEWS_FILE, CANDIDATES_FILE, SENTIMENT_CSV_FILE,
    UKRAINIAN_REVIEWS_FILE,
};
use review_harvester::pacing::RateLimiter;
use review_harvester::pipeline::{HarvestPipeline, ReviewReport};
use review_harvester::scrapers::{ApiSourceAdapter, BrowserSourceAdapter, QueryPlan};
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Places API text search and place details
    Api,
    /// Google Maps in headless Chrome
    Browser,
}

#[derive(Debug, Parser)]
#[command(name = "review-harvester", about = "Collect restaurant reviews for Ukrainian cities")]
struct Args {
    #[arg(long, value_enum, default_value_t = SourceKind::Api)]
    source: SourceKind,

    /// Menu choice (1-4); prompts when absent
    #[arg(long)]
    mode: Option<String>,

    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `output_dir` from the config file
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Candidate list to save to / load from
    #[arg(long)]
    ids_file: Option<PathBuf>,
}

impl Args {
    /// Flags given on the command line that the browser source has no use for
    fn api_only_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.mode.is_some() {
            flags.push("--mode");
        }
        if self.ids_file.is_some() {
            flags.push("--ids-file");
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CollectIds,
    CollectIdsAndReviews,
    LoadIdsAndReviews,
    ExportSentiment,
}

impl Mode {
    fn parse(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(Self::CollectIds),
            "2" => Some(Self::CollectIdsAndReviews),
            "3" => Some(Self::LoadIdsAndReviews),
            "4" => Some(Self::ExportSentiment),
            _ => None,
        }
    }
}

fn prompt_choice() -> anyhow::Result<String> {
    println!("🇺🇦 Ukrainian Restaurant Reviews Collector");
    println!("==================================================");
    println!("Choose an option:");
    println!("1. Collect restaurant IDs only");
    println!("2. Collect restaurant IDs + reviews");
    println!("3. Load existing IDs and collect reviews");
    println!("4. Export sentiment CSV from collected reviews");
    print!("\nEnter your choice (1/2/3/4): ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read menu choice")?;
    Ok(line)
}

fn print_sample(candidates: &[PlaceCandidate]) {
    println!("\n📋 Sample restaurants found:");
    for (i, place) in candidates.iter().take(5).enumerate() {
        println!("{}. {} ({}) - {}", i + 1, place.name, place.city, place.category);
    }
}

async fn write_datasets(writer: &DatasetWriter, report: &ReviewReport) -> anyhow::Result<()> {
    info!("💾 Saving datasets...");
    writer.write_all(&report.reviews).await?;

    match writer
        .write_filtered(UKRAINIAN_REVIEWS_FILE, &report.reviews, ReviewRecord::is_ukrainian)
        .await?
    {
        WriteOutcome::Written { count, .. } => info!(
            "🎉 SUCCESS! Collected {} Ukrainian reviews from {} restaurants!",
            count, report.places
        ),
        WriteOutcome::Empty => warn!("⚠️ No Ukrainian reviews found."),
    }
    Ok(())
}

async fn run_api(settings: &Settings, args: &Args, writer: &DatasetWriter) -> anyhow::Result<()> {
    let api_key = settings
        .resolve_api_key(std::env::var(API_KEY_ENV).ok())
        .map_err(|e| {
            error!("❌ {}", e);
            e
        })?;

    let choice = match &args.mode {
        Some(mode) => mode.clone(),
        None => prompt_choice()?,
    };
    let Some(mode) = Mode::parse(&choice) else {
        println!("❌ Invalid choice. Please run again and choose 1, 2, 3 or 4.");
        return Ok(());
    };

    let ids_path = args
        .ids_file
        .clone()
        .unwrap_or_else(|| writer.path(CANDIDATES_FILE));

    if mode == Mode::ExportSentiment {
        let reviews = output::load_reviews(&writer.path(ALL_REVIEWS_FILE)).await?;
        if reviews.is_empty() {
            warn!("No reviews in {}. Run option 2 or 3 first.", ALL_REVIEWS_FILE);
            return Ok(());
        }
        output::export_sentiment_csv(&writer.path(SENTIMENT_CSV_FILE), &reviews)?;
        return Ok(());
    }

    let adapter = ApiSourceAdapter::new(api_key)?
        .with_retries(settings.max_retries, settings.retry_backoff());
    let pipeline = HarvestPipeline::new(Box::new(adapter), settings.max_results_per_search)
        .with_pacing(settings.search_limiter(), settings.detail_limiter());

    let candidates = match mode {
        Mode::LoadIdsAndReviews => {
            let loaded = output::load_candidates(&ids_path).await?;
            if loaded.is_empty() {
                error!("❌ No restaurant IDs found. Run option 1 or 2 first.");
                return Ok(());
            }
            info!("📂 Loaded {} restaurants from {}", loaded.len(), ids_path.display());
            loaded
        }
        _ => {
            let plan = QueryPlan::cities_by_categories(&settings.cities, &settings.restaurant_types);
            info!(
                "🔍 Collecting restaurant IDs: {} cities x {} types = {} searches",
                settings.cities.len(),
                settings.restaurant_types.len(),
                plan.len()
            );
            let report = pipeline.collect_candidates(&plan).await;
            if report.candidates.is_empty() {
                warn!("⚠️ No restaurants found.");
                return Ok(());
            }
            output::save_candidates(&ids_path, &report.candidates).await?;
            report.candidates
        }
    };

    if mode == Mode::CollectIds {
        print_sample(&candidates);
        info!("🎉 Successfully collected {} restaurant IDs!", candidates.len());
        info!("💡 Run option 3 later to collect reviews from these restaurants.");
        return Ok(());
    }

    let report = pipeline.collect_reviews(&candidates).await;
    write_datasets(writer, &report).await
}

async fn run_browser(settings: &Settings, writer: &DatasetWriter) -> anyhow::Result<()> {
    let locators = settings.locators()?;
    let adapter = BrowserSourceAdapter::new(settings.browser_settings(), locators)?;

    let plan = QueryPlan::named_restaurants(
        &settings.browser.restaurants,
        &settings.browser.city,
        &settings.browser.restaurant_type,
    );
    let pipeline = HarvestPipeline::new(Box::new(adapter), 1)
        .with_pacing(RateLimiter::unpaced(), settings.browser_limiter());

    let report = pipeline.run(&plan).await;
    let reviews = &report.reviews.reviews;

    writer.write_timestamped("gmaps_reviews", reviews).await?;
    write_datasets(writer, &report.reviews).await?;

    info!("🎉 Scraping completed! Total reviews: {}", reviews.len());
    if let Some(sample) = reviews.first() {
        let text: String = sample
            .review_text
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(150)
            .collect();
        println!("\n📄 Sample review:");
        println!("Restaurant: {}", sample.restaurant_name);
        println!("Author: {}", sample.review_author.as_deref().unwrap_or("Anonymous"));
        println!("Rating: {}⭐", sample.review_rating);
        println!("Text: {}...", text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(&args.config).map_err(|e| {
        error!("❌ {}", e);
        e
    })?;
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.clone();
    }
    let writer = DatasetWriter::new(&settings.output_dir);

    match args.source {
        SourceKind::Api => run_api(&settings, &args, &writer).await,
        SourceKind::Browser => {
            for flag in args.api_only_flags() {
                warn!("{} only applies to --source api, ignoring it", flag);
            }
            run_browser(&settings, &writer).await
        }
    }
}
