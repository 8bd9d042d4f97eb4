/// Trace construction for an isolated site.
///
/// A trace connects one site's measurement positions, most recent first.
/// Segment `i` is colored at fraction `i / point_count` along the trace
/// ramp, so the gradient encodes order, not elapsed time.

use crate::color_scale::{trace_color, Color};
use crate::model::{LatLng, Measurement};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSegment {
    pub from: LatLng,
    pub to: LatLng,
    pub color: Color,
}

/// The site's measurements ordered newest to oldest. Equal timestamps keep
/// their fetch order.
pub fn ordered_points<'a>(measurements: &'a [Measurement], site: &str) -> Vec<&'a Measurement> {
    let mut points: Vec<&Measurement> = measurements.iter().filter(|m| m.site == site).collect();
    points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    points
}

/// Builds the segments joining consecutive points. Fewer than two points
/// produce no segments.
pub fn build_trace(measurements: &[Measurement], site: &str) -> Vec<TraceSegment> {
    let points = ordered_points(measurements, site);
    let count = points.len();

    points
        .windows(2)
        .enumerate()
        .map(|(i, pair)| TraceSegment {
            from: pair[0].position,
            to: pair[1].position,
            color: trace_color(i as f64 / count as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_scale::TRACE_START_COLOR;
    use chrono::{TimeZone, Utc};

    fn m(site: &str, day: u32, lat: f64) -> Measurement {
        Measurement {
            site: site.to_string(),
            position: LatLng::new(lat, 0.0),
            timestamp: Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap(),
            value: 0.1,
        }
    }

    #[test]
    fn test_trace_runs_newest_to_oldest() {
        let data = vec![m("A", 3, 3.0), m("A", 1, 1.0), m("A", 2, 2.0)];
        let segments = build_trace(&data, "A");

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].from.lat, 3.0);
        assert_eq!(segments[0].to.lat, 2.0);
        assert_eq!(segments[1].from.lat, 2.0);
        assert_eq!(segments[1].to.lat, 1.0);
    }

    #[test]
    fn test_trace_ignores_other_sites() {
        let data = vec![m("A", 1, 1.0), m("B", 2, 9.0), m("A", 3, 3.0)];
        let segments = build_trace(&data, "A");
        assert_eq!(segments.len(), 1);
        assert!(segments.iter().all(|s| s.from.lat != 9.0 && s.to.lat != 9.0));
    }

    #[test]
    fn test_zero_or_one_point_draws_nothing() {
        assert!(build_trace(&[], "A").is_empty());
        assert!(build_trace(&[m("A", 1, 1.0)], "A").is_empty());
        assert!(build_trace(&[m("B", 1, 1.0), m("B", 2, 1.0)], "A").is_empty());
    }

    #[test]
    fn test_segment_colors_follow_position() {
        let data: Vec<Measurement> = (1..=5).map(|d| m("A", d, d as f64)).collect();
        let segments = build_trace(&data, "A");
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].color, TRACE_START_COLOR);
        assert_eq!(segments[2].color, trace_color(2.0 / 5.0));
        // never reaches the end color: the last fraction is (n-2)/n
        assert_ne!(segments[3].color, trace_color(1.0));
    }
}
