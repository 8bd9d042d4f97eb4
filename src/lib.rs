//! Marker data and interaction engine for a map of geotagged measurements.
//!
//! Fetches a site catalog and measurement records for a filter, renders the
//! records as colored markers grouped by site, and drives single-site
//! isolation with a chronological trace.

pub mod canvas;
pub mod catalog;
pub mod color_scale;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod render;
