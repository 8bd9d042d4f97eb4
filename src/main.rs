//! Headless driver for the marker engine.
//!
//! Usage: manviz [CONFIG_PATH] [START_DATE] [END_DATE]
//!
//! Loads the config (default `manviz.toml`), fetches the display options and
//! the site catalog for the given dates, selects every catalog site, fetches
//! the measurements, renders them into an in-memory canvas and prints what
//! ended up on the map.

use manviz_core::canvas::MemoryCanvas;
use manviz_core::config::load_config;
use manviz_core::engine::{Applied, MarkerEngine};
use manviz_core::ingest::api::{build_catalog_url, ApiClient};
use manviz_core::ingest::dispatch::{CatalogRequest, FetchDispatcher, MeasurementRequest};
use manviz_core::logging::{self, Component};
use manviz_core::model::FilterState;

use chrono::NaiveDate;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "manviz.toml";

/// Submits requests and counts how many completions are still owed.
struct Outstanding {
    dispatcher: FetchDispatcher<ApiClient>,
    pending: usize,
}

impl Outstanding {
    fn catalog(&mut self, request: Option<CatalogRequest>) {
        if let Some(request) = request {
            self.dispatcher.submit_catalog(request);
            self.pending += 1;
        }
    }

    fn measurements(&mut self, request: Option<MeasurementRequest>) {
        if let Some(request) = request {
            self.dispatcher.submit_measurements(request);
            self.pending += 1;
        }
    }
}

fn parse_date_arg(arg: Option<&String>) -> Result<Option<NaiveDate>, Box<dyn Error>> {
    match arg {
        Some(s) => Ok(Some(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)),
        None => Ok(None),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path)?;
    logging::init_logger(config.min_log_level(), config.log_file.as_deref(), false);

    let filter = FilterState {
        start_date: parse_date_arg(args.get(2))?,
        end_date: parse_date_arg(args.get(3))?,
        ..FilterState::default()
    };

    println!("📡 Backend: {}", config.api_base_url);
    let client = ApiClient::new(&config.api_base_url, config.request_timeout())?;

    match client.fetch_display_options() {
        Ok(options) => println!("   {} measurement types available", options.len()),
        Err(e) => logging::log_fetch_failure(Component::System, "Display options fetch", &e),
    }

    let mut engine = MarkerEngine::new(MemoryCanvas::new(config.initial_zoom), &config);
    let update = engine.set_filter(filter);
    if let Some(request) = &update.catalog {
        logging::debug(
            Component::Catalog,
            None,
            &build_catalog_url(&config.api_base_url, &request.query),
        );
    }

    let mut outstanding = Outstanding {
        dispatcher: FetchDispatcher::new(client),
        pending: 0,
    };
    // Nothing is selected yet, so only the catalog goes out; measurements
    // follow once every catalog site is selected.
    outstanding.catalog(update.catalog);

    let patience = config.request_timeout() + Duration::from_secs(5);
    while outstanding.pending > 0 {
        let Some(completion) = outstanding.dispatcher.wait(patience) else {
            logging::warn(Component::System, None, "gave up waiting for outstanding requests");
            break;
        };
        outstanding.pending -= 1;

        match engine.apply(completion) {
            Applied::CatalogRefreshed { measurements, .. } => {
                outstanding.measurements(measurements);
                outstanding.measurements(engine.edit_selection(|catalog| catalog.select_all("")));
            }
            Applied::Rendered(summary) => {
                println!(
                    "🗺  {} site groups, {} markers ({} records skipped)",
                    summary.groups, summary.rendered, summary.skipped
                );
            }
            Applied::Failed(e) => println!("✗ {}", e),
            Applied::Stale => {}
        }
    }

    println!(
        "   {} of {} catalog sites selected, scale ticks [{}]",
        engine.selected_sites().len(),
        engine.catalog().sites().len(),
        engine.scale().tick_labels().join(", ")
    );
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("manviz: {}", e);
        std::process::exit(1);
    }
}
