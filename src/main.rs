//! Main module for the Shutterscout CLI application (scout).
//!
//! This module provides the main function and auxiliary functionalities for
//! the CLI application. It handles command parsing, configuration loading, and
//! initialization, as well as invoking the appropriate functionalities based on
//! the provided command-line arguments.
//!
//! # Examples
//!
//! Searching for photos:
//!
//! ```sh
//! cargo run -- search "two birds flying above the water"
//! scout search "two birds flying above the water"
//! ```
//!
//! Initializing the application's configuration:
//!
//! ```sh
//! cargo run -- init
//! scout init
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{env, error::Error, fs};
use tracing::{debug, error, info, warn};

use shutterscout::DatasetPaths;
use shutterscout::assistant;
use shutterscout::commands;
use shutterscout::config::{self, ScoutConfig};
use shutterscout::corpus;
use shutterscout::encoder::ClipEncoder;
use shutterscout::index::{IndexOutcome, build_index};
use shutterscout::judge::ChatJudge;
use shutterscout::search::{Hit, PhotoIndex};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    if let Err(err) = runtime.block_on(run()) {
        error!("Fatal: {err}");
        eprintln!("Something went wrong: {err}");
        std::process::exit(1);
    }
    Ok(())
}

/// Main asynchronous function of the Shutterscout CLI application.
///
/// Parses command-line arguments, loads configuration, and executes the
/// appropriate command.
///
/// # Errors
///
/// Returns an error if there is an issue loading the configuration, parsing the
/// command-line arguments, or executing the specified command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = commands::Cli::parse();

    if let commands::Commands::Init = cli.command {
        debug!("Initializing configuration");
        return init();
    }

    let config_path = if env::var("IN_TEST_ENVIRONMENT").is_ok() {
        // If we're in a test environment, load the config from the project directory
        env::current_dir()?.join("config.yaml")
    } else {
        // Otherwise, load the config from the user's config directory
        shutterscout::config_dir()?.join("config.yaml")
    };

    debug!("Loading config from: {}", config_path.display());
    let scout_config = config::load_config(config_path.to_str().ok_or("config path is not UTF-8")?)?;
    debug!("Config loaded: {:?}", scout_config);

    match cli.command {
        commands::Commands::Search {
            query,
            dataset,
            count,
            keep,
            no_rerank,
        } => {
            let paths = scout_config.dataset_paths(dataset.as_deref());
            let retrieve = count.unwrap_or(scout_config.search_count);
            let keep = keep.unwrap_or(scout_config.rerank_count);

            let encoder = ClipEncoder::load()?;
            ensure_index(&scout_config, &paths, &encoder).await?;
            let index = PhotoIndex::load(&paths.features_dir())?;

            if no_rerank {
                let hits = index.search_text(&encoder, &query, retrieve)?;
                println!("Search results for {query:?}:");
                print_hits(&paths, &hits);
            } else {
                let judge = ChatJudge::new(&scout_config);
                let outcome =
                    assistant::run_query(&index, &encoder, &judge, &paths, &query, retrieve, keep)
                        .await?;

                println!("{}", outcome.status);
                if outcome.selected.is_empty() {
                    println!("Search results for {query:?}:");
                    print_hits(&paths, &outcome.hits);
                } else {
                    println!("Best matches for {query:?}:");
                    print_hits(&paths, &outcome.selected);
                }
            }
        }
        commands::Commands::Fetch { dataset, threads } => {
            let paths = scout_config.dataset_paths(dataset.as_deref());
            let threads = threads.unwrap_or(scout_config.download_threads);
            fetch_corpus(&paths, threads).await?;
        }
        commands::Commands::Index {
            dataset,
            batch_size,
        } => {
            let paths = scout_config.dataset_paths(dataset.as_deref());
            let batch_size = batch_size.unwrap_or(scout_config.batch_size);
            let encoder = ClipEncoder::load()?;
            let outcome = build_index(&encoder, &paths.photos_dir(), &paths.features_dir(), batch_size)?;
            report_index_outcome(&outcome);
        }
        commands::Commands::Init => unreachable!("handled before config loading"),
    }

    Ok(())
}

/// Download the corpus for one dataset version.
async fn fetch_corpus(paths: &DatasetPaths, threads: usize) -> Result<(), Box<dyn Error>> {
    let manifest = paths.manifest();
    if !manifest.is_file() {
        return Err(format!(
            "No manifest at {}; place the dataset's photos.tsv000 there first",
            manifest.display()
        )
        .into());
    }
    let records = corpus::read_manifest(&manifest)?;
    let summary = corpus::fetch_photos(&records, &paths.photos_dir(), threads).await?;
    println!(
        "Fetched {} photos ({} already present, {} failed)",
        summary.downloaded, summary.skipped, summary.failed
    );
    Ok(())
}

/// Make sure the consolidated index exists, fetching and indexing on demand.
///
/// A search against a version that was never prepared triggers the full
/// acquisition + indexing pipeline first.
async fn ensure_index(
    config: &ScoutConfig,
    paths: &DatasetPaths,
    encoder: &ClipEncoder,
) -> Result<(), Box<dyn Error>> {
    if paths.index_ready() {
        return Ok(());
    }

    info!("Index missing for {}; building it now", paths.root().display());
    fetch_corpus(paths, config.download_threads).await?;
    let outcome = build_index(
        encoder,
        &paths.photos_dir(),
        &paths.features_dir(),
        config.batch_size,
    )?;
    report_index_outcome(&outcome);
    Ok(())
}

fn report_index_outcome(outcome: &IndexOutcome) {
    println!(
        "Indexed {} photos ({} embedded now, {} batches reused)",
        outcome.indexed, outcome.embedded, outcome.reused
    );
    for failed in &outcome.failed {
        warn!(
            "Batch {} dropped ({}): photos {:?}",
            failed.batch, failed.reason, failed.photo_ids
        );
    }
    if !outcome.failed.is_empty() {
        let dropped: usize = outcome.failed.iter().map(|f| f.photo_ids.len()).sum();
        println!("Warning: {dropped} photos could not be embedded and are absent from the index");
    }
}

fn print_hits(paths: &DatasetPaths, hits: &[Hit]) {
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:2}. {}  (score {:.3})  {}",
            i + 1,
            hit.photo_id,
            hit.score,
            paths.photo(&hit.photo_id).display()
        );
    }
}

/// Initializes the application's configuration.
///
/// Creates the configuration directory and writes a starter `config.yaml`
/// with placeholder credentials. An existing configuration is left alone.
///
/// # Errors
///
/// Returns an error if there is an issue creating the directory or file, or
/// serializing the configuration to YAML.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = shutterscout::config_dir()?;
    fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.yaml");
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    info!("Creating config file: {}", config_path.display());
    let config_yaml = serde_yaml::to_string(&ScoutConfig::starter())?;
    fs::write(&config_path, config_yaml)?;
    println!("Wrote starter config to {}", config_path.display());
    println!("Set api_key before using the re-ranking pass.");

    Ok(())
}
