/// Data retrieval for the marker engine.
///
/// Submodules:
/// - `api`: HTTP client and wire parsing for the measurement backend.
/// - `dispatch`: sequence-numbered requests and off-thread delivery of
///   their completions.

pub mod api;
pub mod dispatch;

use crate::model::{FetchError, Measurement, RecordError, Site};
use api::{CatalogQuery, MeasurementQuery};

/// A parsed measurement response: the renderable records plus the reasons
/// the others were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementBatch {
    pub measurements: Vec<Measurement>,
    pub skipped: Vec<RecordError>,
}

impl MeasurementBatch {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements,
            skipped: Vec::new(),
        }
    }
}

/// Anything that can answer catalog and measurement queries.
///
/// Implementations block; `dispatch::FetchDispatcher` runs them off the
/// UI thread.
pub trait MeasurementSource: Send + Sync + 'static {
    fn fetch_site_catalog(&self, query: &CatalogQuery) -> Result<Vec<Site>, FetchError>;
    fn fetch_measurements(&self, query: &MeasurementQuery) -> Result<MeasurementBatch, FetchError>;
}
