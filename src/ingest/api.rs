/// Measurement API Client
///
/// Retrieves the site catalog, measurement records, and the list of
/// displayable measurement types from the maritime measurement backend.
///
/// Endpoints:
///   GET  /maritimeapp/measurements/sites/   site catalog (query string)
///   POST /maritimeapp/measurements/         measurements (JSON body)
///   GET  /maritimeapp/display_info/         selectable measurement types
///
/// Only defined filter fields are sent. Responses are parsed record by
/// record so one malformed measurement never discards the batch.

use crate::ingest::{MeasurementBatch, MeasurementSource};
use crate::model::{Bounds, DateSpan, FetchError, FilterState, LatLng, Measurement, RecordError, Site};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CATALOG_PATH: &str = "/maritimeapp/measurements/sites/";
const MEASUREMENTS_PATH: &str = "/maritimeapp/measurements/";
const DISPLAY_INFO_PATH: &str = "/maritimeapp/display_info/";

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Queries
// ============================================================================

/// Parameters of a site catalog request.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bounds: Option<Bounds>,
}

impl CatalogQuery {
    pub fn from_filter(filter: &FilterState) -> Self {
        Self {
            start_date: filter.start_date,
            end_date: filter.end_date,
            bounds: filter.bounds,
        }
    }

    /// Query-string pairs, omitting undefined fields.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(d) = self.start_date {
            params.push(("start_date", d.format(DATE_FORMAT).to_string()));
        }
        if let Some(d) = self.end_date {
            params.push(("end_date", d.format(DATE_FORMAT).to_string()));
        }
        if let Some(b) = self.bounds {
            params.push(("min_lat", b.min_lat.to_string()));
            params.push(("min_lng", b.min_lng.to_string()));
            params.push(("max_lat", b.max_lat.to_string()));
            params.push(("max_lng", b.max_lng.to_string()));
        }
        params
    }
}

/// Builds the catalog URL for `base_url` (no trailing slash).
pub fn build_catalog_url(base_url: &str, query: &CatalogQuery) -> String {
    let params = query.params();
    if params.is_empty() {
        return format!("{}{}", base_url, CATALOG_PATH);
    }
    let qs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}{}?{}", base_url, CATALOG_PATH, qs.join("&"))
}

/// JSON body of a measurement request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub sites: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lng: Option<f64>,
    pub reading: String,
}

impl MeasurementQuery {
    pub fn from_filter(filter: &FilterState) -> Self {
        let fmt = |d: NaiveDate| d.format(DATE_FORMAT).to_string();
        Self {
            start_date: filter.start_date.map(fmt),
            end_date: filter.end_date.map(fmt),
            sites: filter.selected_sites.iter().cloned().collect(),
            min_lat: filter.bounds.map(|b| b.min_lat),
            min_lng: filter.bounds.map(|b| b.min_lng),
            max_lat: filter.bounds.map(|b| b.max_lat),
            max_lng: filter.bounds.map(|b| b.max_lng),
            reading: filter.measurement_type.clone(),
        }
    }
}

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireSite {
    name: String,
    #[serde(default)]
    span_date: Option<[Option<NaiveDate>; 2]>,
}

#[derive(Debug, Deserialize)]
struct WireLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct WireMeasurement {
    site: String,
    date: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    coordinates: Option<WireLatLng>,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct DisplayInfoResponse {
    opts: Vec<String>,
}

// ============================================================================
// Parsing
// ============================================================================

fn rejected(body: &str) -> Option<FetchError> {
    serde_json::from_str::<WireError>(body)
        .ok()
        .map(|e| FetchError::Rejected(e.error))
}

/// Parse a catalog response body.
pub fn parse_catalog_response(body: &str) -> Result<Vec<Site>, FetchError> {
    if let Some(err) = rejected(body) {
        return Err(err);
    }
    let wire: Vec<WireSite> = serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    Ok(wire
        .into_iter()
        .map(|s| Site {
            name: s.name,
            span: match s.span_date {
                Some([Some(start), Some(end)]) => Some(DateSpan { start, end }),
                _ => None,
            },
        })
        .collect())
}

fn parse_timestamp(date: &str, time: Option<&str>) -> Result<DateTime<Utc>, RecordError> {
    let bad = || RecordError::BadTimestamp(format!("{} {}", date, time.unwrap_or("")));
    let day = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|_| bad())?;
    let clock = match time.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S%.f").map_err(|_| bad())?,
        None => NaiveTime::default(),
    };
    Ok(NaiveDateTime::new(day, clock).and_utc())
}

fn parse_value(value: &serde_json::Value) -> Result<Option<f64>, RecordError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n.as_f64().map(Some).ok_or(RecordError::NonFiniteValue),
        _ => Err(RecordError::NonFiniteValue),
    }
}

fn parse_record(raw: serde_json::Value) -> Result<Measurement, RecordError> {
    let wire: WireMeasurement = serde_json::from_value(raw).map_err(|e| RecordError::Shape(e.to_string()))?;
    let coords = wire.coordinates.ok_or(RecordError::MissingPosition)?;
    let timestamp = parse_timestamp(&wire.date, wire.time.as_deref())?;
    let value = parse_value(&wire.value)?;
    Measurement::new(&wire.site, LatLng::new(coords.lat, coords.lng), timestamp, value)
}

/// Parse a measurements response body.
///
/// Fails only if the body is not a JSON array (or is a server error object).
/// Individual bad records land in `MeasurementBatch::skipped`.
pub fn parse_measurements_response(body: &str) -> Result<MeasurementBatch, FetchError> {
    if let Some(err) = rejected(body) {
        return Err(err);
    }
    let raw: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut batch = MeasurementBatch::default();
    for record in raw {
        match parse_record(record) {
            Ok(m) => batch.measurements.push(m),
            Err(e) => batch.skipped.push(e),
        }
    }
    Ok(batch)
}

/// Parse the display-options response into measurement type names.
pub fn parse_display_info_response(body: &str) -> Result<Vec<String>, FetchError> {
    serde_json::from_str::<DisplayInfoResponse>(body)
        .map(|r| r.opts)
        .map_err(|e| FetchError::Parse(e.to_string()))
}

// ============================================================================
// API Client
// ============================================================================

/// Blocking HTTP client for the measurement backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reads a response body, mapping non-success statuses to errors.
    fn read_body(response: reqwest::blocking::Response) -> Result<String, FetchError> {
        let status = response.status();
        let body = response.text().map_err(|e| FetchError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(rejected(&body).unwrap_or(FetchError::Http(status.as_u16())));
        }
        Ok(body)
    }

    /// Fetch the list of selectable measurement types.
    pub fn fetch_display_options(&self) -> Result<Vec<String>, FetchError> {
        let url = format!("{}{}", self.base_url, DISPLAY_INFO_PATH);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_display_info_response(&Self::read_body(response)?)
    }
}

impl MeasurementSource for ApiClient {
    fn fetch_site_catalog(&self, query: &CatalogQuery) -> Result<Vec<Site>, FetchError> {
        let url = format!("{}{}", self.base_url, CATALOG_PATH);
        let response = self
            .client
            .get(&url)
            .query(&query.params())
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_catalog_response(&Self::read_body(response)?)
    }

    fn fetch_measurements(&self, query: &MeasurementQuery) -> Result<MeasurementBatch, FetchError> {
        let url = format!("{}{}", self.base_url, MEASUREMENTS_PATH);
        let response = self
            .client
            .post(&url)
            .json(query)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        parse_measurements_response(&Self::read_body(response)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
