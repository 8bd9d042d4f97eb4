//! Map canvas contract.
//!
//! The engine never inspects the canvas' internal layer registry. Every
//! object it adds comes back as an owned handle, and removal is always by
//! that handle. Pointer events are routed back into the engine by handle.
//!
//! `MemoryCanvas` records every object in plain maps; it backs the headless
//! driver and the tests.

use crate::color_scale::Color;
use crate::model::LatLng;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineHandle(pub u64);

/// Visual state of a circular point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointStyle {
    pub color: Color,
    pub radius: f64,
    pub opacity: f64,
    pub interactive: bool,
}

/// A single trace segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: Color,
    pub weight: f64,
    pub opacity: f64,
}

/// Primitives the engine consumes from a map canvas.
pub trait MapCanvas {
    fn add_point(&mut self, at: LatLng, style: PointStyle) -> PointHandle;
    fn set_point_style(&mut self, handle: PointHandle, style: PointStyle);
    fn remove_point(&mut self, handle: PointHandle);

    fn add_line(&mut self, path: &[LatLng], style: LineStyle) -> LineHandle;
    fn remove_line(&mut self, handle: LineHandle);

    /// Subscribes the point to hover and pointer-out events.
    fn attach_hover(&mut self, handle: PointHandle);
    fn detach_hover(&mut self, handle: PointHandle);
    fn attach_click(&mut self, handle: PointHandle);
    fn detach_click(&mut self, handle: PointHandle);

    fn show_label(&mut self, handle: PointHandle, text: &str);
    fn hide_label(&mut self, handle: PointHandle);

    fn zoom(&self) -> f64;
}

// ---------------------------------------------------------------------------
// In-memory canvas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPoint {
    pub at: LatLng,
    pub style: PointStyle,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLine {
    pub path: Vec<LatLng>,
    pub style: LineStyle,
}

/// A canvas that only records what it is told to draw.
#[derive(Debug, Clone)]
pub struct MemoryCanvas {
    next_id: u64,
    zoom: f64,
    pub points: BTreeMap<PointHandle, RecordedPoint>,
    pub lines: BTreeMap<LineHandle, RecordedLine>,
    /// Points that currently have hover handlers attached.
    pub hover_subscribed: BTreeSet<PointHandle>,
    pub click_subscribed: BTreeSet<PointHandle>,
    /// Number of attach calls made on a point that was already subscribed.
    pub duplicate_attaches: usize,
}

impl MemoryCanvas {
    pub fn new(zoom: f64) -> Self {
        Self {
            next_id: 1,
            zoom,
            points: BTreeMap::new(),
            lines: BTreeMap::new(),
            hover_subscribed: BTreeSet::new(),
            click_subscribed: BTreeSet::new(),
            duplicate_attaches: 0,
        }
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn point(&self, handle: PointHandle) -> Option<&RecordedPoint> {
        self.points.get(&handle)
    }

    /// Whether hovering this point would reach the engine.
    pub fn receives_hover(&self, handle: PointHandle) -> bool {
        self.hover_subscribed.contains(&handle)
            && self.points.get(&handle).is_some_and(|p| p.style.interactive)
    }

    pub fn receives_click(&self, handle: PointHandle) -> bool {
        self.click_subscribed.contains(&handle)
    }
}

impl Default for MemoryCanvas {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl MapCanvas for MemoryCanvas {
    fn add_point(&mut self, at: LatLng, style: PointStyle) -> PointHandle {
        let handle = PointHandle(self.next());
        self.points.insert(handle, RecordedPoint { at, style, label: None });
        handle
    }

    fn set_point_style(&mut self, handle: PointHandle, style: PointStyle) {
        if let Some(p) = self.points.get_mut(&handle) {
            p.style = style;
        }
    }

    fn remove_point(&mut self, handle: PointHandle) {
        self.points.remove(&handle);
        self.hover_subscribed.remove(&handle);
        self.click_subscribed.remove(&handle);
    }

    fn add_line(&mut self, path: &[LatLng], style: LineStyle) -> LineHandle {
        let handle = LineHandle(self.next());
        self.lines.insert(handle, RecordedLine { path: path.to_vec(), style });
        handle
    }

    fn remove_line(&mut self, handle: LineHandle) {
        self.lines.remove(&handle);
    }

    fn attach_hover(&mut self, handle: PointHandle) {
        if !self.hover_subscribed.insert(handle) {
            self.duplicate_attaches += 1;
        }
    }

    fn detach_hover(&mut self, handle: PointHandle) {
        self.hover_subscribed.remove(&handle);
    }

    fn attach_click(&mut self, handle: PointHandle) {
        if !self.click_subscribed.insert(handle) {
            self.duplicate_attaches += 1;
        }
    }

    fn detach_click(&mut self, handle: PointHandle) {
        self.click_subscribed.remove(&handle);
    }

    fn show_label(&mut self, handle: PointHandle, text: &str) {
        if let Some(p) = self.points.get_mut(&handle) {
            p.label = Some(text.to_string());
        }
    }

    fn hide_label(&mut self, handle: PointHandle) {
        if let Some(p) = self.points.get_mut(&handle) {
            p.label = None;
        }
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }
}
