//! Marker rendering.
//!
//! `MarkerRenderer` turns a measurement batch into colored points on the map
//! canvas, one `SiteGroup` per distinct site in first-appearance order. It
//! owns a handle for every point it adds and is the only code that adds,
//! restyles or removes them.
//!
//! Submodules:
//! - `trace`: ordered segments for an isolated site.
//! - `isolation`: the click-driven isolation state machine.

pub mod isolation;
pub mod trace;

use crate::canvas::{MapCanvas, PointHandle, PointStyle};
use crate::color_scale::{Color, ColorScale, UNKNOWN_COLOR};
use crate::model::{LatLng, Measurement, RecordError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Shared marker radius for a zoom level: `(zoom + 2) × (e − 1)`.
pub fn marker_radius(zoom: f64) -> f64 {
    (zoom + 2.0) * (std::f64::consts::E - 1.0)
}

/// Visual role of a marker within the current isolation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerVisual {
    Normal,
    Highlighted,
    Dimmed,
}

/// Opacity settings applied per visual role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub normal_opacity: f64,
    pub dimmed_opacity: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            normal_opacity: 0.9,
            dimmed_opacity: 0.3,
        }
    }
}

/// A point on the canvas plus what it was drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMarker {
    pub handle: PointHandle,
    pub site: String,
    pub position: LatLng,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub original_color: Color,
    pub visual: MarkerVisual,
    hover_attached: bool,
}

impl RenderedMarker {
    pub fn is_hoverable(&self) -> bool {
        self.visual != MarkerVisual::Dimmed
    }
}

/// All markers of one site; the unit of add/remove.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteGroup {
    pub site: String,
    pub markers: Vec<RenderedMarker>,
}

/// Counts from one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildSummary {
    pub groups: usize,
    pub rendered: usize,
    pub skipped: usize,
}

/// Formats the hover label for a marker.
pub fn hover_label(marker: &RenderedMarker, measurement_type: &str) -> String {
    format!(
        "Site: {}\n{}: {:.3}\nDate: {}",
        marker.site,
        measurement_type,
        marker.value,
        marker.timestamp.format("%Y-%m-%d %H:%M:%S")
    )
}

fn point_style(marker: &RenderedMarker, radius: f64, style: MarkerStyle) -> PointStyle {
    match marker.visual {
        MarkerVisual::Normal => PointStyle {
            color: marker.original_color,
            radius,
            opacity: style.normal_opacity,
            interactive: true,
        },
        MarkerVisual::Highlighted => PointStyle {
            color: marker.original_color,
            radius,
            opacity: 1.0,
            interactive: true,
        },
        MarkerVisual::Dimmed => PointStyle {
            color: UNKNOWN_COLOR,
            radius,
            opacity: style.dimmed_opacity,
            interactive: false,
        },
    }
}

#[derive(Debug, Clone)]
pub struct MarkerRenderer {
    groups: Vec<SiteGroup>,
    index: HashMap<PointHandle, (usize, usize)>,
    measurements: Vec<Measurement>,
    measurement_type: String,
    radius: f64,
    style: MarkerStyle,
}

impl MarkerRenderer {
    pub fn new(radius: f64, style: MarkerStyle) -> Self {
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
            measurements: Vec::new(),
            measurement_type: String::new(),
            radius,
            style,
        }
    }

    pub fn groups(&self) -> &[SiteGroup] {
        &self.groups
    }

    pub fn group(&self, site: &str) -> Option<&SiteGroup> {
        self.groups.iter().find(|g| g.site == site)
    }

    pub fn marker_count(&self) -> usize {
        self.index.len()
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Measurements backing the current marker set, in fetch order.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn marker(&self, handle: PointHandle) -> Option<&RenderedMarker> {
        let (g, m) = *self.index.get(&handle)?;
        self.groups.get(g)?.markers.get(m)
    }

    /// Removes every marker and its handlers from the canvas.
    pub fn clear<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) {
        for marker in self.groups.iter().flat_map(|g| g.markers.iter()) {
            if marker.hover_attached {
                canvas.hide_label(marker.handle);
                canvas.detach_hover(marker.handle);
            }
            canvas.detach_click(marker.handle);
            canvas.remove_point(marker.handle);
        }
        self.groups.clear();
        self.index.clear();
        self.measurements.clear();
    }

    /// Replaces the marker set with one built from `measurements`.
    ///
    /// Always clears first. Records that fail validation are skipped and
    /// counted; they never abort the rest of the batch.
    pub fn rebuild<C: MapCanvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        measurements: Vec<Measurement>,
        scale: &ColorScale,
        measurement_type: &str,
    ) -> RebuildSummary {
        self.clear(canvas);
        self.measurement_type = measurement_type.to_string();

        let mut summary = RebuildSummary::default();
        let mut group_of: HashMap<String, usize> = HashMap::new();

        for m in measurements {
            if let Err(e) = Self::check_renderable(&m) {
                crate::logging::debug(
                    crate::logging::Component::Renderer,
                    Some(&m.site),
                    &format!("skipping record: {}", e),
                );
                summary.skipped += 1;
                continue;
            }

            let g = *group_of.entry(m.site.clone()).or_insert_with(|| {
                self.groups.push(SiteGroup {
                    site: m.site.clone(),
                    markers: Vec::new(),
                });
                self.groups.len() - 1
            });

            let mut marker = RenderedMarker {
                handle: PointHandle(0),
                site: m.site.clone(),
                position: m.position,
                timestamp: m.timestamp,
                value: m.value,
                original_color: scale.color_for(m.value),
                visual: MarkerVisual::Normal,
                hover_attached: false,
            };
            marker.handle = canvas.add_point(m.position, point_style(&marker, self.radius, self.style));
            canvas.attach_click(marker.handle);
            canvas.attach_hover(marker.handle);
            marker.hover_attached = true;

            let slot = self.groups[g].markers.len();
            self.index.insert(marker.handle, (g, slot));
            self.groups[g].markers.push(marker);
            self.measurements.push(m);
            summary.rendered += 1;
        }

        summary.groups = self.groups.len();
        summary
    }

    fn check_renderable(m: &Measurement) -> Result<(), RecordError> {
        if m.site.trim().is_empty() {
            return Err(RecordError::EmptySite);
        }
        m.position.validate()?;
        if !m.value.is_finite() {
            return Err(RecordError::NonFiniteValue);
        }
        Ok(())
    }

    /// Applies a new shared radius to every existing marker in place.
    pub fn set_radius<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C, radius: f64) {
        self.radius = radius;
        for marker in self.groups.iter().flat_map(|g| g.markers.iter()) {
            canvas.set_point_style(marker.handle, point_style(marker, self.radius, self.style));
        }
    }

    /// Highlights `site` and dims every other group.
    pub fn isolate<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C, site: &str) {
        self.apply_visuals(canvas, |s| {
            if s == site {
                MarkerVisual::Highlighted
            } else {
                MarkerVisual::Dimmed
            }
        });
    }

    /// Returns every group to its normal style.
    pub fn restore_all<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) {
        self.apply_visuals(canvas, |_| MarkerVisual::Normal);
    }

    /// Restyles every marker and re-wires hover handlers: old handlers are
    /// always detached before new ones are attached, and dimmed markers get
    /// none.
    fn apply_visuals<C, F>(&mut self, canvas: &mut C, visual_for: F)
    where
        C: MapCanvas + ?Sized,
        F: Fn(&str) -> MarkerVisual,
    {
        let style = self.style;
        let radius = self.radius;
        for group in self.groups.iter_mut() {
            let visual = visual_for(&group.site);
            for marker in group.markers.iter_mut() {
                marker.visual = visual;
                if marker.hover_attached {
                    canvas.hide_label(marker.handle);
                    canvas.detach_hover(marker.handle);
                    marker.hover_attached = false;
                }
                canvas.set_point_style(marker.handle, point_style(marker, radius, style));

                if marker.is_hoverable() {
                    canvas.attach_hover(marker.handle);
                    marker.hover_attached = true;
                }
            }
        }
    }

    /// Shows the hover label if the marker currently accepts hover.
    pub fn hover<C: MapCanvas + ?Sized>(&self, canvas: &mut C, handle: PointHandle) -> bool {
        match self.marker(handle) {
            Some(marker) if marker.is_hoverable() && marker.hover_attached => {
                canvas.show_label(handle, &hover_label(marker, &self.measurement_type));
                true
            }
            _ => false,
        }
    }

    pub fn pointer_out<C: MapCanvas + ?Sized>(&self, canvas: &mut C, handle: PointHandle) {
        if self.marker(handle).is_some() {
            canvas.hide_label(handle);
        }
    }
}
