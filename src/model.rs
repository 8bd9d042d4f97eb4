/// Core data types for the measurement map engine.
///
/// This module defines the shared domain model imported by all other modules:
/// measurement records, catalog sites, the filter the caller owns, and the
/// error enums. It contains no I/O.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Value the measurement store writes for a reading it never had.
pub const MISSING_VALUE_SENTINEL: f64 = -999.0;

/// Measurement type shown before the user picks one.
pub const DEFAULT_MEASUREMENT_TYPE: &str = "aod_500nm";

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Checks the coordinate lies within ±90 latitude and ±180 longitude.
    pub fn validate(&self) -> Result<(), RecordError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(RecordError::LatitudeOutOfRange(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(RecordError::LongitudeOutOfRange(self.lng));
        }
        Ok(())
    }
}

/// A geographic rectangle, as delivered by the bounding-box drawing tool.
///
/// The producer clamps the corners to the valid ranges before delivery;
/// `Bounds::clamped` is the helper it uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Builds bounds from two arbitrary corners, clamped to ±90/±180 and
    /// ordered so that min <= max on both axes.
    pub fn clamped(a: LatLng, b: LatLng) -> Self {
        let clamp_lat = |v: f64| v.clamp(-90.0, 90.0);
        let clamp_lng = |v: f64| v.clamp(-180.0, 180.0);
        let (lat_a, lat_b) = (clamp_lat(a.lat), clamp_lat(b.lat));
        let (lng_a, lng_b) = (clamp_lng(a.lng), clamp_lng(b.lng));
        Self {
            min_lat: lat_a.min(lat_b),
            min_lng: lng_a.min(lng_b),
            max_lat: lat_a.max(lat_b),
            max_lng: lng_a.max(lng_b),
        }
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lng >= self.min_lng && p.lng <= self.max_lng
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One timestamped, positioned reading of the selected measurement type.
///
/// Built by `ingest::api` from a wire record after validation, so every
/// `Measurement` in the engine is renderable: a non-empty site, an in-range
/// position, and a finite value.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub site: String,
    pub position: LatLng,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Measurement {
    /// Validates raw parts and builds a renderable measurement.
    pub fn new(
        site: &str,
        position: LatLng,
        timestamp: DateTime<Utc>,
        value: Option<f64>,
    ) -> Result<Self, RecordError> {
        if site.trim().is_empty() {
            return Err(RecordError::EmptySite);
        }
        position.validate()?;
        let value = match value {
            None => return Err(RecordError::MissingValue),
            Some(v) if !v.is_finite() => return Err(RecordError::NonFiniteValue),
            Some(v) if v == MISSING_VALUE_SENTINEL => return Err(RecordError::SentinelValue(v)),
            Some(v) => v,
        };
        Ok(Self {
            site: site.to_string(),
            position,
            timestamp,
            value,
        })
    }
}

/// Inclusive date span of a site's known measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A catalog entry: a named cruise/site and its known date span.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    /// `None` means the span is unknown and treated as unbounded.
    pub span: Option<DateSpan>,
}

impl Site {
    /// Returns `true` if the site's span overlaps `[start, end]`.
    ///
    /// Either end of the query may be open. An absent span is unbounded and
    /// therefore always intersects.
    pub fn intersects(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
        let Some(span) = self.span else {
            return true;
        };
        let starts_before_end = end.map_or(true, |e| span.start <= e);
        let ends_after_start = start.map_or(true, |s| span.end >= s);
        starts_before_end && ends_after_start
    }
}

// ---------------------------------------------------------------------------
// Filter state
// ---------------------------------------------------------------------------

/// The current query. Owned by the caller and handed to the engine by value.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bounds: Option<Bounds>,
    pub selected_sites: BTreeSet<String>,
    pub measurement_type: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            bounds: None,
            selected_sites: BTreeSet::new(),
            measurement_type: DEFAULT_MEASUREMENT_TYPE.to_string(),
        }
    }
}

impl FilterState {
    /// Everything the measurement endpoint receives. Two filters with equal
    /// fingerprints produce the same measurement request.
    pub fn fingerprint(&self) -> FilterFingerprint {
        FilterFingerprint {
            catalog: self.catalog_key(),
            sites: self.selected_sites.iter().cloned().collect(),
            measurement_type: self.measurement_type.clone(),
        }
    }

    /// The subset of the filter the site catalog depends on.
    pub fn catalog_key(&self) -> CatalogKey {
        CatalogKey {
            start_date: self.start_date,
            end_date: self.end_date,
            bounds: self.bounds.map(|b| {
                [
                    b.min_lat.to_bits(),
                    b.min_lng.to_bits(),
                    b.max_lat.to_bits(),
                    b.max_lng.to_bits(),
                ]
            }),
        }
    }
}

/// Date and bounds portion of a filter, compared bit-exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    bounds: Option<[u64; 4]>,
}

/// Explicit identity of a measurement query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterFingerprint {
    catalog: CatalogKey,
    sites: Vec<String>,
    measurement_type: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while fetching the catalog, measurements, or display options.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Non-2xx HTTP response without a structured error body.
    Http(u16),
    /// The request never produced a response (connect, timeout, DNS).
    Transport(String),
    /// The response body could not be deserialized.
    Parse(String),
    /// The server answered with `{"error": ...}`, e.g. "No sites selected".
    Rejected(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(code) => write!(f, "HTTP error: {}", code),
            FetchError::Transport(msg) => write!(f, "Transport error: {}", msg),
            FetchError::Parse(msg) => write!(f, "Parse error: {}", msg),
            FetchError::Rejected(msg) => write!(f, "Request rejected: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Reasons an individual wire record is skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    /// The record does not match the wire layout at all.
    Shape(String),
    EmptySite,
    MissingPosition,
    MissingValue,
    NonFiniteValue,
    SentinelValue(f64),
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    BadTimestamp(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Shape(msg) => write!(f, "malformed record: {}", msg),
            RecordError::EmptySite => write!(f, "record has no site name"),
            RecordError::MissingPosition => write!(f, "record has no coordinates"),
            RecordError::MissingValue => write!(f, "record has no value"),
            RecordError::NonFiniteValue => write!(f, "record value is not a finite number"),
            RecordError::SentinelValue(v) => write!(f, "record value {} is the missing-data sentinel", v),
            RecordError::LatitudeOutOfRange(v) => write!(f, "latitude {} out of range", v),
            RecordError::LongitudeOutOfRange(v) => write!(f, "longitude {} out of range", v),
            RecordError::BadTimestamp(s) => write!(f, "unparseable timestamp: {}", s),
        }
    }
}

impl std::error::Error for RecordError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
