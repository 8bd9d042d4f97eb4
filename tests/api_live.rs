//! Live Backend Tests
//!
//! These hit a running measurement backend at MANVIZ_API_BASE_URL
//! (default http://localhost:8000). They are ignored by default.
//!
//! Run with: cargo test --test api_live -- --ignored --test-threads=1

use manviz_core::config::{EngineConfig, ENV_API_BASE_URL};
use manviz_core::ingest::api::{ApiClient, CatalogQuery, MeasurementQuery};
use manviz_core::ingest::MeasurementSource;
use manviz_core::model::{FetchError, FilterState};

fn live_client() -> ApiClient {
    dotenv::dotenv().ok();
    let config = EngineConfig::default();
    let base = std::env::var(ENV_API_BASE_URL).unwrap_or(config.api_base_url.clone());
    ApiClient::new(&base, config.request_timeout()).expect("client should build")
}

#[test]
#[ignore] // Only run manually - needs a running backend
fn test_live_display_options_include_default_type() {
    let client = live_client();
    let options = client.fetch_display_options().expect("display_info should answer");

    println!("\n📋 {} measurement types", options.len());
    assert!(!options.is_empty());
}

#[test]
#[ignore] // Only run manually - needs a running backend
fn test_live_catalog_then_measurements() {
    let client = live_client();
    let filter = FilterState::default();
    let sites = client
        .fetch_site_catalog(&CatalogQuery::from_filter(&filter))
        .expect("catalog should answer");
    println!("\n🗂  {} sites in catalog", sites.len());

    let Some(first) = sites.first() else {
        println!("  Catalog empty, nothing more to check");
        return;
    };

    let mut selected = filter.clone();
    selected.selected_sites.insert(first.name.clone());
    let batch = client
        .fetch_measurements(&MeasurementQuery::from_filter(&selected))
        .expect("measurements should answer");

    println!("  {}: {} records, {} skipped", first.name, batch.measurements.len(), batch.skipped.len());
    assert!(batch.measurements.iter().all(|m| m.site == first.name));
}

#[test]
#[ignore] // Only run manually - needs a running backend
fn test_live_empty_selection_is_rejected() {
    let client = live_client();
    let result = client.fetch_measurements(&MeasurementQuery::from_filter(&FilterState::default()));

    match result {
        Err(FetchError::Rejected(msg)) => println!("\n  Rejected as expected: {}", msg),
        other => panic!("expected a rejection, got {:?}", other),
    }
}
