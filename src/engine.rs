//! Marker engine orchestration.
//!
//! `MarkerEngine` owns the map canvas, the site catalog, the marker renderer
//! and the isolation machine, and is driven entirely from the UI thread:
//!
//! - `set_filter` compares the new filter against the last one sent and
//!   hands back the requests that actually need issuing. Catalog requests
//!   depend on dates and bounds only; measurement requests on the full
//!   fingerprint.
//! - `apply` takes a finished request. Only the latest sequence of each kind
//!   is accepted; anything older is dropped as stale.
//! - `on_click`, `on_hover`, `on_pointer_out` and `on_zoom_changed` route
//!   canvas events to the renderer and the isolation machine.
//!
//! The engine never performs I/O itself. Callers run the requests (see
//! `ingest::dispatch::FetchDispatcher`) and feed completions back in.

use crate::canvas::{MapCanvas, PointHandle};
use crate::catalog::SiteCatalog;
use crate::color_scale::{resolve_color_scale, ColorScale};
use crate::config::EngineConfig;
use crate::ingest::api::{CatalogQuery, MeasurementQuery};
use crate::ingest::dispatch::{CatalogRequest, Completion, MeasurementRequest, RequestTracker, Sequence};
use crate::ingest::MeasurementBatch;
use crate::logging::{self, Component};
use crate::model::{CatalogKey, FetchError, FilterFingerprint, FilterState, Site};
use crate::render::isolation::{IsolationMachine, IsolationState, Transition};
use crate::render::{marker_radius, MarkerRenderer, MarkerStyle, RebuildSummary};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Told whenever a trace appears or disappears, so a legend or banner can
/// show the "double-click to exit isolation" hint.
pub trait TraceObserver {
    fn trace_active_changed(&mut self, active: bool);
}

impl<F: FnMut(bool)> TraceObserver for F {
    fn trace_active_changed(&mut self, active: bool) {
        self(active)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Requests a filter change calls for. `None` means nothing relevant changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterUpdate {
    pub catalog: Option<CatalogRequest>,
    pub measurements: Option<MeasurementRequest>,
}

impl FilterUpdate {
    pub fn is_empty(&self) -> bool {
        self.catalog.is_none() && self.measurements.is_none()
    }
}

/// Outcome of applying a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Markers rebuilt from a measurement response.
    Rendered(RebuildSummary),
    /// Catalog installed. `dropped` lists selected names it no longer
    /// contains; if that changed the selection, `measurements` is the
    /// follow-up request to issue.
    CatalogRefreshed {
        dropped: Vec<String>,
        measurements: Option<MeasurementRequest>,
    },
    /// A newer request of the same kind is outstanding; nothing changed.
    Stale,
    /// The fetch failed; markers were cleared.
    Failed(FetchError),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct MarkerEngine<C: MapCanvas> {
    canvas: C,
    filter: FilterState,
    scale: ColorScale,
    catalog: SiteCatalog,
    catalog_loaded: bool,
    renderer: MarkerRenderer,
    isolation: IsolationMachine,
    catalog_requests: RequestTracker,
    measurement_requests: RequestTracker,
    last_catalog_key: Option<CatalogKey>,
    last_fingerprint: Option<FilterFingerprint>,
    observer: Option<Box<dyn TraceObserver>>,
    trace_active: bool,
    last_error: Option<FetchError>,
}

impl<C: MapCanvas> MarkerEngine<C> {
    /// Creates an idle engine. Nothing is requested until the first
    /// `set_filter`.
    pub fn new(canvas: C, config: &EngineConfig) -> Self {
        let filter = FilterState::default();
        let style = MarkerStyle {
            normal_opacity: config.marker_opacity,
            dimmed_opacity: config.dimmed_opacity,
        };
        let radius = marker_radius(canvas.zoom());
        Self {
            scale: resolve_color_scale(&filter.measurement_type),
            filter,
            canvas,
            catalog: SiteCatalog::new(),
            catalog_loaded: false,
            renderer: MarkerRenderer::new(radius, style),
            isolation: IsolationMachine::new(config.reclick_window(), config.trace_weight),
            catalog_requests: RequestTracker::new(),
            measurement_requests: RequestTracker::new(),
            last_catalog_key: None,
            last_fingerprint: None,
            observer: None,
            trace_active: false,
            last_error: None,
        }
    }

    pub fn set_trace_observer(&mut self, observer: impl TraceObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    // -- accessors ----------------------------------------------------------

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Mutable canvas access for the host, e.g. to change its zoom.
    /// Follow a zoom change with `on_zoom_changed`.
    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// The current selection, always a subset of the loaded catalog.
    pub fn selected_sites(&self) -> &BTreeSet<String> {
        &self.filter.selected_sites
    }

    pub fn catalog(&self) -> &SiteCatalog {
        &self.catalog
    }

    pub fn scale(&self) -> &ColorScale {
        &self.scale
    }

    pub fn renderer(&self) -> &MarkerRenderer {
        &self.renderer
    }

    pub fn isolation_state(&self) -> &IsolationState {
        self.isolation.state()
    }

    pub fn trace_active(&self) -> bool {
        self.trace_active
    }

    /// The error from the most recent accepted failure, cleared by the next
    /// accepted success.
    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    // -- filter -------------------------------------------------------------

    /// Adopts a new filter and returns the requests it calls for.
    ///
    /// Once a catalog has loaded, selected names outside it are dropped
    /// before the fingerprint is taken.
    pub fn set_filter(&mut self, mut filter: FilterState) -> FilterUpdate {
        if self.catalog_loaded {
            self.catalog.set_selection(filter.selected_sites.iter().cloned());
            filter.selected_sites = self.catalog.selected().clone();
        }
        if filter.measurement_type != self.filter.measurement_type {
            self.scale = resolve_color_scale(&filter.measurement_type);
        }
        self.filter = filter;

        FilterUpdate {
            catalog: self.request_catalog_if_changed(),
            measurements: self.request_measurements_if_changed(),
        }
    }

    /// Edits the selection through the catalog's operations (toggle,
    /// select/deselect over a search) and returns a measurement request if
    /// the selection changed.
    pub fn edit_selection<F>(&mut self, edit: F) -> Option<MeasurementRequest>
    where
        F: FnOnce(&mut SiteCatalog),
    {
        edit(&mut self.catalog);
        self.filter.selected_sites = self.catalog.selected().clone();
        self.request_measurements_if_changed()
    }

    fn request_catalog_if_changed(&mut self) -> Option<CatalogRequest> {
        let key = self.filter.catalog_key();
        if self.last_catalog_key.as_ref() == Some(&key) {
            return None;
        }
        self.last_catalog_key = Some(key);
        let seq = self.catalog_requests.issue();
        logging::debug(Component::Catalog, None, &format!("issuing catalog request #{}", seq.0));
        Some(CatalogRequest {
            seq,
            query: CatalogQuery::from_filter(&self.filter),
        })
    }

    fn request_measurements_if_changed(&mut self) -> Option<MeasurementRequest> {
        let fingerprint = self.filter.fingerprint();
        if self.last_fingerprint.as_ref() == Some(&fingerprint) {
            return None;
        }
        self.last_fingerprint = Some(fingerprint);
        let seq = self.measurement_requests.issue();
        logging::debug(
            Component::Measurements,
            None,
            &format!(
                "issuing measurement request #{} ({} sites, {})",
                seq.0,
                self.filter.selected_sites.len(),
                self.filter.measurement_type
            ),
        );
        Some(MeasurementRequest {
            seq,
            query: MeasurementQuery::from_filter(&self.filter),
        })
    }

    // -- completions --------------------------------------------------------

    pub fn apply(&mut self, completion: Completion) -> Applied {
        match completion {
            Completion::Catalog { seq, result } => self.complete_catalog(seq, result),
            Completion::Measurements { seq, result } => self.complete_measurements(seq, result),
        }
    }

    pub fn complete_catalog(&mut self, seq: Sequence, result: Result<Vec<Site>, FetchError>) -> Applied {
        if !self.catalog_requests.is_current(seq) {
            logging::debug(Component::Catalog, None, &format!("discarding stale catalog response #{}", seq.0));
            return Applied::Stale;
        }

        let sites = match result {
            Ok(sites) => sites,
            Err(e) => {
                logging::log_fetch_failure(Component::Catalog, "Catalog fetch", &e);
                self.clear_markers();
                self.last_error = Some(e.clone());
                return Applied::Failed(e);
            }
        };

        logging::info(Component::Catalog, None, &format!("catalog refreshed: {} sites", sites.len()));
        self.catalog.replace_sites(sites);
        self.catalog_loaded = true;
        self.last_error = None;

        let wanted = std::mem::take(&mut self.filter.selected_sites);
        self.catalog.set_selection(wanted.iter().cloned());
        let dropped: Vec<String> = wanted.difference(self.catalog.selected()).cloned().collect();
        self.filter.selected_sites = self.catalog.selected().clone();
        for name in &dropped {
            logging::info(Component::Catalog, Some(name), "dropped from selection, not in refreshed catalog");
        }

        Applied::CatalogRefreshed {
            dropped,
            measurements: self.request_measurements_if_changed(),
        }
    }

    pub fn complete_measurements(
        &mut self,
        seq: Sequence,
        result: Result<MeasurementBatch, FetchError>,
    ) -> Applied {
        if !self.measurement_requests.is_current(seq) {
            logging::debug(
                Component::Measurements,
                None,
                &format!("discarding stale measurement response #{}", seq.0),
            );
            return Applied::Stale;
        }

        let batch = match result {
            Ok(batch) => batch,
            Err(e) => {
                logging::log_fetch_failure(Component::Measurements, "Measurement fetch", &e);
                self.clear_markers();
                self.last_error = Some(e.clone());
                return Applied::Failed(e);
            }
        };

        for reason in &batch.skipped {
            logging::debug(Component::Measurements, None, &format!("malformed record skipped: {}", reason));
        }

        self.isolation.reset(&mut self.canvas);
        let mut summary = self.renderer.rebuild(
            &mut self.canvas,
            batch.measurements,
            &self.scale,
            &self.filter.measurement_type,
        );
        summary.skipped += batch.skipped.len();
        self.sync_trace_active();
        self.last_error = None;

        logging::log_render_summary(summary.groups, summary.rendered, summary.skipped);
        Applied::Rendered(summary)
    }

    fn clear_markers(&mut self) {
        self.isolation.reset(&mut self.canvas);
        self.renderer.clear(&mut self.canvas);
        self.sync_trace_active();
    }

    fn sync_trace_active(&mut self) {
        let active = self.isolation.trace_active();
        if active == self.trace_active {
            return;
        }
        self.trace_active = active;
        if let Some(observer) = self.observer.as_mut() {
            observer.trace_active_changed(active);
        }
    }

    // -- canvas events ------------------------------------------------------

    /// Routes a click on a marker. Returns `None` for handles the renderer
    /// does not own.
    pub fn on_click(&mut self, handle: PointHandle, now: DateTime<Utc>) -> Option<Transition> {
        let site = self.renderer.marker(handle)?.site.clone();
        let transition = self.isolation.click(&mut self.canvas, &mut self.renderer, &site, now);
        self.sync_trace_active();
        Some(transition)
    }

    /// Shows the hover label; `false` if the marker is dimmed or unknown.
    pub fn on_hover(&mut self, handle: PointHandle) -> bool {
        self.renderer.hover(&mut self.canvas, handle)
    }

    pub fn on_pointer_out(&mut self, handle: PointHandle) {
        self.renderer.pointer_out(&mut self.canvas, handle);
    }

    /// Re-reads the canvas zoom and resizes every marker in place.
    pub fn on_zoom_changed(&mut self) {
        let radius = marker_radius(self.canvas.zoom());
        self.renderer.set_radius(&mut self.canvas, radius);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::model::{LatLng, Measurement};
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn site(name: &str) -> Site {
        Site { name: name.to_string(), span: None }
    }

    fn reading(site: &str, day: u32, value: f64) -> Measurement {
        Measurement {
            site: site.to_string(),
            position: LatLng::new(day as f64, -40.0),
            timestamp: Utc.with_ymd_and_hms(2022, 3, day, 12, 0, 0).unwrap(),
            value,
        }
    }

    fn selecting(names: &[&str]) -> FilterState {
        FilterState {
            selected_sites: names.iter().map(|s| s.to_string()).collect(),
            ..FilterState::default()
        }
    }

    fn engine() -> MarkerEngine<MemoryCanvas> {
        MarkerEngine::new(MemoryCanvas::default(), &EngineConfig::default())
    }

    #[test]
    fn test_first_filter_requests_catalog_and_measurements() {
        let mut e = engine();
        let update = e.set_filter(selecting(&["A"]));
        assert!(update.catalog.is_some());
        let req = update.measurements.expect("measurement request");
        assert_eq!(req.query.sites, vec!["A".to_string()]);
        assert_eq!(req.query.reading, "aod_500nm");
    }

    #[test]
    fn test_unchanged_filter_requests_nothing() {
        let mut e = engine();
        e.set_filter(selecting(&["A"]));
        assert!(e.set_filter(selecting(&["A"])).is_empty());
    }

    #[test]
    fn test_selection_change_skips_catalog_request() {
        let mut e = engine();
        e.set_filter(selecting(&["A"]));
        let update = e.set_filter(selecting(&["A", "B"]));
        assert!(update.catalog.is_none());
        assert!(update.measurements.is_some());
    }

    #[test]
    fn test_measurement_type_change_switches_scale() {
        let mut e = engine();
        e.set_filter(selecting(&["A"]));
        let mut f = selecting(&["A"]);
        f.measurement_type = "water_vapor".into();
        let update = e.set_filter(f);
        assert!(update.catalog.is_none());
        assert!(update.measurements.is_some());
        assert_eq!(e.scale().max(), 5.0);
    }

    #[test]
    fn test_failure_clears_markers_and_records_error() {
        let mut e = engine();
        let first = e.set_filter(selecting(&["A"])).measurements.unwrap();
        e.complete_measurements(first.seq, Ok(MeasurementBatch::new(vec![reading("A", 1, 0.1)])));
        assert_eq!(e.canvas().points.len(), 1);

        let second = e.set_filter(selecting(&["A", "B"])).measurements.unwrap();
        let applied = e.complete_measurements(second.seq, Err(FetchError::Http(502)));

        assert_eq!(applied, Applied::Failed(FetchError::Http(502)));
        assert!(e.canvas().points.is_empty());
        assert_eq!(e.renderer().marker_count(), 0);
        assert_eq!(e.last_error(), Some(&FetchError::Http(502)));
    }

    #[test]
    fn test_skipped_wire_records_count_in_summary() {
        let mut e = engine();
        let req = e.set_filter(selecting(&["A"])).measurements.unwrap();
        let batch = MeasurementBatch {
            measurements: vec![reading("A", 1, 0.1)],
            skipped: vec![crate::model::RecordError::MissingValue],
        };
        let applied = e.complete_measurements(req.seq, Ok(batch));
        assert_eq!(applied, Applied::Rendered(RebuildSummary { groups: 1, rendered: 1, skipped: 1 }));
    }

    #[test]
    fn test_observer_fires_only_on_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine();
        let sink = Rc::clone(&seen);
        e.set_trace_observer(move |active: bool| sink.borrow_mut().push(active));

        let req = e.set_filter(selecting(&["A", "B"])).measurements.unwrap();
        e.complete_measurements(req.seq, Ok(MeasurementBatch::new(vec![reading("A", 1, 0.1), reading("B", 2, 0.2)])));
        let a = e.renderer().group("A").unwrap().markers[0].handle;
        let b = e.renderer().group("B").unwrap().markers[0].handle;
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        e.on_click(a, t0);
        e.on_click(b, t0 + chrono::Duration::milliseconds(100));
        e.on_click(b, t0 + chrono::Duration::milliseconds(300));

        assert_eq!(*seen.borrow(), vec![true, false]);
        assert!(!e.trace_active());
    }

    #[test]
    fn test_rebuild_while_isolated_returns_to_normal() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut e = engine();
        let sink = Rc::clone(&seen);
        e.set_trace_observer(move |active: bool| sink.borrow_mut().push(active));

        let req = e.set_filter(selecting(&["A"])).measurements.unwrap();
        e.complete_measurements(req.seq, Ok(MeasurementBatch::new(vec![reading("A", 1, 0.1), reading("A", 2, 0.2)])));
        let a = e.renderer().group("A").unwrap().markers[0].handle;
        e.on_click(a, Utc::now());
        assert_eq!(e.canvas().lines.len(), 1);

        let mut f = selecting(&["A"]);
        f.measurement_type = "angstrom_exponent".into();
        let req = e.set_filter(f).measurements.unwrap();
        e.complete_measurements(req.seq, Ok(MeasurementBatch::new(vec![reading("A", 3, 0.5)])));

        assert_eq!(e.isolation_state(), &IsolationState::Normal);
        assert!(e.canvas().lines.is_empty());
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn test_click_on_unknown_handle_is_ignored() {
        let mut e = engine();
        assert_eq!(e.on_click(PointHandle(999), Utc::now()), None);
        assert!(!e.on_hover(PointHandle(999)));
    }

    #[test]
    fn test_edit_selection_after_catalog_load() {
        let mut e = engine();
        let update = e.set_filter(FilterState::default());
        e.complete_catalog(update.catalog.unwrap().seq, Ok(vec![site("Alpha"), site("Beta"), site("alps")]));

        let req = e.edit_selection(|c| c.select_all("AL")).expect("selection changed");
        assert_eq!(req.query.sites, vec!["Alpha".to_string(), "alps".to_string()]);
        assert!(e.edit_selection(|c| c.select_all("al")).is_none());
        assert!(e.edit_selection(|c| { c.toggle("Gamma"); }).is_none());
    }

    #[test]
    fn test_filter_selection_restricted_to_loaded_catalog() {
        let mut e = engine();
        let update = e.set_filter(FilterState::default());
        e.complete_catalog(update.catalog.unwrap().seq, Ok(vec![site("A")]));

        let req = e.set_filter(selecting(&["A", "Z"])).measurements.unwrap();
        assert_eq!(req.query.sites, vec!["A".to_string()]);
        assert!(!e.selected_sites().contains("Z"));
    }

    #[test]
    fn test_catalog_failure_keeps_previous_catalog() {
        let mut e = engine();
        let update = e.set_filter(FilterState::default());
        e.complete_catalog(update.catalog.unwrap().seq, Ok(vec![site("A")]));

        let mut f = FilterState::default();
        f.start_date = chrono::NaiveDate::from_ymd_opt(2020, 1, 1);
        let req = e.set_filter(f).catalog.unwrap();
        let applied = e.complete_catalog(req.seq, Err(FetchError::Transport("refused".into())));

        assert!(matches!(applied, Applied::Failed(FetchError::Transport(_))));
        assert!(e.catalog().contains("A"));
    }
}
