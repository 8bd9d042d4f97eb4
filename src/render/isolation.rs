/// Isolation interaction state machine.
///
/// One site at a time can be isolated: its markers stay opaque and
/// hoverable, every other group is dimmed, and a trace is drawn through the
/// site's points. A second click on the same site inside the re-click window
/// releases isolation; anything else (re)isolates the clicked site.
///
/// # Clock injection
/// Clicks carry a `now: DateTime<Utc>` instead of reading the clock, so the
/// re-click window is deterministic in tests.

use crate::canvas::{LineHandle, LineStyle, MapCanvas};
use crate::logging::{self, Component};
use crate::render::trace::build_trace;
use crate::render::MarkerRenderer;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolationState {
    Normal,
    Isolated(String),
}

/// What a click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Normal → Isolated, or a repeat click on the isolated site outside
    /// the window.
    Isolated(String),
    /// Isolated(from) → Isolated(to).
    Switched { from: String, to: String },
    /// Isolated → Normal.
    Released(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastClick {
    site: String,
    at: DateTime<Utc>,
}

/// The single trace on the canvas, owned by handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTrace {
    pub site: String,
    pub lines: Vec<LineHandle>,
}

#[derive(Debug, Clone)]
pub struct IsolationMachine {
    state: IsolationState,
    last_click: Option<LastClick>,
    trace: Option<ActiveTrace>,
    reclick_window: Duration,
    trace_weight: f64,
}

impl IsolationMachine {
    pub fn new(reclick_window: Duration, trace_weight: f64) -> Self {
        Self {
            state: IsolationState::Normal,
            last_click: None,
            trace: None,
            reclick_window,
            trace_weight,
        }
    }

    pub fn state(&self) -> &IsolationState {
        &self.state
    }

    pub fn isolated_site(&self) -> Option<&str> {
        match &self.state {
            IsolationState::Isolated(site) => Some(site),
            IsolationState::Normal => None,
        }
    }

    pub fn trace(&self) -> Option<&ActiveTrace> {
        self.trace.as_ref()
    }

    pub fn trace_active(&self) -> bool {
        self.trace.is_some()
    }

    /// Whether a click on `site` at `now` is the release gesture.
    fn is_reclick(&self, site: &str, now: DateTime<Utc>) -> bool {
        match &self.last_click {
            Some(last) => last.site == site && now - last.at < self.reclick_window,
            None => false,
        }
    }

    /// Handles a click on a marker of `site`.
    pub fn click<C: MapCanvas + ?Sized>(
        &mut self,
        canvas: &mut C,
        renderer: &mut MarkerRenderer,
        site: &str,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.is_reclick(site, now) {
            self.release(canvas, renderer);
            logging::debug(Component::Isolation, Some(site), "isolation released");
            return Transition::Released(site.to_string());
        }

        let previous = self.isolated_site().map(str::to_string);
        renderer.isolate(canvas, site);
        self.draw_trace(canvas, renderer, site);
        self.state = IsolationState::Isolated(site.to_string());
        self.last_click = Some(LastClick {
            site: site.to_string(),
            at: now,
        });

        match previous {
            Some(from) if from != site => {
                logging::debug(Component::Isolation, Some(site), &format!("switched from {}", from));
                Transition::Switched {
                    from,
                    to: site.to_string(),
                }
            }
            _ => {
                logging::debug(Component::Isolation, Some(site), "site isolated");
                Transition::Isolated(site.to_string())
            }
        }
    }

    /// Clears the trace and restores every marker.
    pub fn release<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C, renderer: &mut MarkerRenderer) {
        self.clear_trace(canvas);
        renderer.restore_all(canvas);
        self.state = IsolationState::Normal;
        self.last_click = None;
    }

    /// Returns to `Normal` without touching markers; used right before a
    /// full rebuild, which replaces them anyway.
    pub fn reset<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) {
        self.clear_trace(canvas);
        self.state = IsolationState::Normal;
        self.last_click = None;
    }

    fn clear_trace<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C) {
        if let Some(trace) = self.trace.take() {
            for line in trace.lines {
                canvas.remove_line(line);
            }
        }
    }

    /// Replaces the active trace with one for `site`.
    fn draw_trace<C: MapCanvas + ?Sized>(&mut self, canvas: &mut C, renderer: &MarkerRenderer, site: &str) {
        self.clear_trace(canvas);

        let lines = build_trace(renderer.measurements(), site)
            .into_iter()
            .map(|segment| {
                canvas.add_line(
                    &[segment.from, segment.to],
                    LineStyle {
                        color: segment.color,
                        weight: self.trace_weight,
                        opacity: 1.0,
                    },
                )
            })
            .collect();

        self.trace = Some(ActiveTrace {
            site: site.to_string(),
            lines,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::color_scale::resolve_color_scale;
    use crate::model::{LatLng, Measurement};
    use crate::render::{marker_radius, MarkerStyle};
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn ms(offset: i64) -> DateTime<Utc> {
        fixed_now() + Duration::milliseconds(offset)
    }

    fn setup() -> (MemoryCanvas, MarkerRenderer, IsolationMachine) {
        let mut canvas = MemoryCanvas::default();
        let mut renderer = MarkerRenderer::new(marker_radius(2.0), MarkerStyle::default());
        let data = ["A", "A", "A", "B", "B"]
            .iter()
            .enumerate()
            .map(|(i, site)| Measurement {
                site: site.to_string(),
                position: LatLng::new(i as f64, 0.0),
                timestamp: Utc.with_ymd_and_hms(2020, 1, 1 + i as u32, 0, 0, 0).unwrap(),
                value: 0.2,
            })
            .collect();
        renderer.rebuild(&mut canvas, data, &resolve_color_scale("aod_500nm"), "aod_500nm");
        let machine = IsolationMachine::new(Duration::milliseconds(1000), 3.0);
        (canvas, renderer, machine)
    }

    #[test]
    fn test_first_click_isolates_and_draws_trace() {
        let (mut canvas, mut renderer, mut machine) = setup();
        let t = machine.click(&mut canvas, &mut renderer, "A", ms(0));

        assert_eq!(t, Transition::Isolated("A".into()));
        assert_eq!(machine.state(), &IsolationState::Isolated("A".into()));
        assert!(machine.trace_active());
        assert_eq!(canvas.lines.len(), 2, "three A points make two segments");
    }

    #[test]
    fn test_reclick_within_window_releases() {
        let (mut canvas, mut renderer, mut machine) = setup();
        machine.click(&mut canvas, &mut renderer, "A", ms(0));
        let t = machine.click(&mut canvas, &mut renderer, "A", ms(500));

        assert_eq!(t, Transition::Released("A".into()));
        assert_eq!(machine.state(), &IsolationState::Normal);
        assert!(canvas.lines.is_empty());
        assert!(canvas.points.values().all(|p| p.style.opacity == 0.9 && p.style.interactive));
    }

    #[test]
    fn test_reclick_outside_window_stays_isolated() {
        let (mut canvas, mut renderer, mut machine) = setup();
        machine.click(&mut canvas, &mut renderer, "A", ms(0));
        let t = machine.click(&mut canvas, &mut renderer, "A", ms(1500));

        assert_eq!(t, Transition::Isolated("A".into()));
        assert_eq!(machine.isolated_site(), Some("A"));
        assert_eq!(canvas.lines.len(), 2, "old trace replaced, not duplicated");
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let (mut canvas, mut renderer, mut machine) = setup();
        machine.click(&mut canvas, &mut renderer, "A", ms(0));
        let t = machine.click(&mut canvas, &mut renderer, "A", ms(1000));
        assert_eq!(t, Transition::Isolated("A".into()));
    }

    #[test]
    fn test_click_other_site_switches_trace() {
        let (mut canvas, mut renderer, mut machine) = setup();
        machine.click(&mut canvas, &mut renderer, "A", ms(0));
        let t = machine.click(&mut canvas, &mut renderer, "B", ms(200));

        assert_eq!(t, Transition::Switched { from: "A".into(), to: "B".into() });
        assert_eq!(machine.trace().map(|tr| tr.site.as_str()), Some("B"));
        assert_eq!(canvas.lines.len(), 1, "two B points make one segment");
    }

    #[test]
    fn test_quick_click_on_other_site_is_not_a_release() {
        let (mut canvas, mut renderer, mut machine) = setup();
        machine.click(&mut canvas, &mut renderer, "A", ms(0));
        machine.click(&mut canvas, &mut renderer, "B", ms(100));
        let t = machine.click(&mut canvas, &mut renderer, "A", ms(200));
        assert_eq!(t, Transition::Switched { from: "B".into(), to: "A".into() });
    }

    #[test]
    fn test_reset_discards_trace_and_click_history() {
        let (mut canvas, mut renderer, mut machine) = setup();
        machine.click(&mut canvas, &mut renderer, "A", ms(0));
        machine.reset(&mut canvas);

        assert_eq!(machine.state(), &IsolationState::Normal);
        assert!(canvas.lines.is_empty());
        // no stale bookkeeping: the next click isolates rather than releases
        let t = machine.click(&mut canvas, &mut renderer, "A", ms(100));
        assert_eq!(t, Transition::Isolated("A".into()));
    }
}
