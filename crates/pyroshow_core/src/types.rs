use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TimeUs
// ---------------------------------------------------------------------------

/// Signed time in microseconds. All show arithmetic happens in this unit so
/// accumulated clock ticks are exact and can never become `NaN`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(transparent)]
pub struct TimeUs(pub i64);

impl TimeUs {
    pub const ZERO: Self = Self(0);

    /// Converts seconds, saturating at the `i64` range. `NaN` maps to zero.
    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000_000.0).round() as i64)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn abs_diff(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0).saturating_abs())
    }

    /// Clamp into `[lo, hi]`. Unlike `Ord::clamp` this never panics; an
    /// inverted range resolves to `lo`.
    pub fn clamp_to(self, lo: Self, hi: Self) -> Self {
        self.min(hi).max(lo)
    }
}

impl Add for TimeUs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for TimeUs {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for TimeUs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for TimeUs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_us = self.0.unsigned_abs();
        let total_ms = total_us / 1_000;
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

// ---------------------------------------------------------------------------
// MediaProvision
// ---------------------------------------------------------------------------

/// What the download pipeline or file picker hands over when media is added.
/// The locator is opaque: a URL, a blob handle or a file path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaProvision {
    pub id: Uuid,
    pub display_name: String,
    pub locator: String,
}

impl MediaProvision {
    pub fn new(display_name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            locator: locator.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

pub const PALETTE: [&str; 8] = [
    "#ff6b35", "#f7c59f", "#efefd0", "#4ecdc4", "#c44dff", "#ff4f79", "#ffd23f", "#3bceac",
];

/// Display color for the n-th inserted item.
pub fn palette_color(insertion_index: usize) -> &'static str {
    PALETTE[insertion_index % PALETTE.len()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub locator: String,
    /// Zero until the playback layer reports metadata.
    pub duration_us: TimeUs,
    /// Master time at which local time 0 occurs. Never negative.
    pub offset_us: TimeUs,
    pub color: String,
}

impl Item {
    pub fn end_us(&self) -> TimeUs {
        self.offset_us + self.duration_us
    }

    pub fn local_time(&self, master: TimeUs) -> TimeUs {
        master - self.offset_us
    }

    pub fn is_loaded(&self) -> bool {
        self.duration_us > TimeUs::ZERO
    }

    /// True when `master` falls inside `[offset, offset + duration]`.
    pub fn is_active_at(&self, master: TimeUs) -> bool {
        let local = self.local_time(master);
        local >= TimeUs::ZERO && local <= self.duration_us
    }
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Show {
    pub id: Uuid,
    pub name: String,
    pub items: Vec<Item>,
    pub total_duration_us: TimeUs,
    pub zoom: f64,
    /// Number of items ever inserted; drives palette selection.
    #[serde(default)]
    pub inserted_count: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
