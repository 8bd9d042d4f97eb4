//! Value → color mapping for measurement markers and site traces.
//!
//! The marker scale has six breakpoints chosen by measurement-type category
//! and a fixed six-stop ramp. Values inside the domain are interpolated
//! linearly per RGB channel; values above the last breakpoint get a distinct
//! over-range color instead of being clamped, so "at max" and "exceeds max"
//! stay visually different.

use std::fmt;

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const TEAL: Color = Color::rgb(0, 128, 128);
    pub const GREEN: Color = Color::rgb(0, 128, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const ORANGE: Color = Color::rgb(255, 165, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const DARK_RED: Color = Color::rgb(139, 0, 0);
    pub const GREY: Color = Color::rgb(128, 128, 128);
    pub const LIME: Color = Color::rgb(0, 255, 0);

    /// Channel-wise linear blend; `t` is clamped to [0, 1].
    pub fn lerp(self, other: Color, t: f64) -> Color {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let mix = |a: u8, b: u8| -> u8 {
            let v = a as f64 + (b as f64 - a as f64) * t;
            v.round().clamp(0.0, 255.0) as u8
        };
        Color::rgb(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Ramp shared by every marker category.
pub const MARKER_RAMP: [Color; 6] = [
    Color::BLUE,
    Color::TEAL,
    Color::GREEN,
    Color::YELLOW,
    Color::ORANGE,
    Color::RED,
];

/// Color for values strictly greater than the domain maximum.
pub const OVER_RANGE_COLOR: Color = Color::DARK_RED;

/// Color for values that are not finite numbers.
pub const UNKNOWN_COLOR: Color = Color::GREY;

/// Trace segments run from the most recent point (start) to the oldest (end).
pub const TRACE_START_COLOR: Color = Color::RED;
pub const TRACE_END_COLOR: Color = Color::LIME;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Domain policy selected from the measurement-type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleCategory {
    /// Optical depth and standard deviations: 0.0 – 0.5.
    Optical,
    /// Water vapor and air mass: 0 – 5.
    Column,
    /// Ångström exponents: 0.0 – 2.0.
    Angstrom,
    /// Anything else, treated as a fraction: i/6.
    Fraction,
}

impl ScaleCategory {
    /// First match wins, in this order. Matching is case-sensitive.
    pub fn for_measurement_type(measurement_type: &str) -> Self {
        let has = |needle: &str| measurement_type.contains(needle);
        if has("std") || has("aod") {
            ScaleCategory::Optical
        } else if has("water") || has("air_mass") {
            ScaleCategory::Column
        } else if has("angstrom") {
            ScaleCategory::Angstrom
        } else {
            ScaleCategory::Fraction
        }
    }

    pub fn domain(self) -> [f64; 6] {
        let mut d = [0.0; 6];
        for (i, slot) in d.iter_mut().enumerate() {
            let i = i as f64;
            *slot = match self {
                ScaleCategory::Optical => i * 0.1,
                ScaleCategory::Column => i,
                ScaleCategory::Angstrom => i * 0.4,
                ScaleCategory::Fraction => i / 6.0,
            };
        }
        d
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// Ordered breakpoints and the colors at each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    pub category: ScaleCategory,
    pub domain: Vec<f64>,
    pub ramp: Vec<Color>,
}

/// Resolves the marker color scale for a measurement type.
pub fn resolve_color_scale(measurement_type: &str) -> ColorScale {
    let category = ScaleCategory::for_measurement_type(measurement_type);
    ColorScale {
        category,
        domain: category.domain().to_vec(),
        ramp: MARKER_RAMP.to_vec(),
    }
}

impl ColorScale {
    pub fn max(&self) -> f64 {
        self.domain.last().copied().unwrap_or(0.0)
    }

    /// Maps a value to its marker color.
    ///
    /// - non-finite → `UNKNOWN_COLOR`
    /// - above the last breakpoint → `OVER_RANGE_COLOR`
    /// - below the first breakpoint → first ramp stop
    /// - otherwise piecewise-linear between adjacent stops
    pub fn color_for(&self, value: f64) -> Color {
        if !value.is_finite() || self.domain.is_empty() || self.ramp.is_empty() {
            return UNKNOWN_COLOR;
        }
        if value > self.max() {
            return OVER_RANGE_COLOR;
        }
        if value <= self.domain[0] {
            return self.ramp[0];
        }

        let stops = self.domain.len().min(self.ramp.len());
        for i in 1..stops {
            let (lo, hi) = (self.domain[i - 1], self.domain[i]);
            if value <= hi {
                let span = hi - lo;
                if span <= 0.0 {
                    return self.ramp[i];
                }
                return self.ramp[i - 1].lerp(self.ramp[i], (value - lo) / span);
            }
        }
        self.ramp[stops - 1]
    }

    /// Breakpoints rounded to one decimal, for legend display.
    pub fn tick_labels(&self) -> Vec<String> {
        self.domain.iter().map(|v| format!("{:.1}", v)).collect()
    }
}

/// Color of the trace segment at `fraction` ∈ [0, 1] along the path.
pub fn trace_color(fraction: f64) -> Color {
    TRACE_START_COLOR.lerp(TRACE_END_COLOR, fraction)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
