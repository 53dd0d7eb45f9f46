use crate::error::{CoreError, Result};
use crate::types::*;
use uuid::Uuid;

/// Smallest duration the pixel mapping divides by.
pub const MIN_GEOMETRY_DURATION: TimeUs = TimeUs(1_000_000);

/// Pixel mapping for a strip showing `[0, total]` at a given zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineView {
    pub track_width_px: f64,
    pub zoom: f64,
    pub total: TimeUs,
}

impl TimelineView {
    pub fn of(show: &Show, track_width_px: f64) -> Self {
        Self {
            track_width_px,
            zoom: show.zoom,
            total: show.total_duration_us,
        }
    }

    fn zoom(&self) -> f64 {
        if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }

    fn total_seconds(&self) -> f64 {
        self.total.max(MIN_GEOMETRY_DURATION).as_seconds()
    }

    pub fn pixels_per_second(&self) -> f64 {
        (self.track_width_px.max(0.0) * self.zoom()) / self.total_seconds()
    }

    /// Left edge of a block starting at `t`.
    pub fn x_at(&self, t: TimeUs) -> f64 {
        t.as_seconds() * self.pixels_per_second()
    }

    /// Master time under a click at `x`, clamped into the show.
    pub fn time_at(&self, x: f64) -> TimeUs {
        if self.track_width_px.is_nan() || self.track_width_px <= 0.0 || !x.is_finite() {
            return TimeUs::ZERO;
        }
        let seconds = (x / self.track_width_px) * self.total_seconds() / self.zoom();
        TimeUs::from_seconds(seconds).clamp_to(TimeUs::ZERO, self.total.max(TimeUs::ZERO))
    }

    /// Pointer travel in pixels converted to seconds.
    pub fn seconds_for(&self, dx: f64) -> TimeUs {
        let pps = self.pixels_per_second();
        if pps > 0.0 {
            TimeUs::from_seconds(dx / pps)
        } else {
            TimeUs::ZERO
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    item_id: Uuid,
    start_x: f64,
    baseline: TimeUs,
}

/// Turns pointer gestures into offset edits and seek targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEditor {
    pub track_width_px: f64,
    drag: Option<Drag>,
}

impl TimelineEditor {
    pub fn new(track_width_px: f64) -> Self {
        Self {
            track_width_px,
            drag: None,
        }
    }

    pub fn view(&self, show: &Show) -> TimelineView {
        TimelineView::of(show, self.track_width_px)
    }

    pub fn dragging(&self) -> Option<Uuid> {
        self.drag.map(|d| d.item_id)
    }

    /// Start dragging `item_id` from pointer position `x`. Only one drag may
    /// be active.
    pub fn begin_drag(&mut self, show: &Show, item_id: Uuid, x: f64) -> Result<()> {
        if let Some(active) = self.drag {
            return Err(CoreError::DragInProgress(active.item_id));
        }
        let item = show.item(item_id).ok_or(CoreError::ItemNotFound(item_id))?;
        self.drag = Some(Drag {
            item_id,
            start_x: x,
            baseline: item.offset_us,
        });
        Ok(())
    }

    /// Apply the live offset for the pointer at `x`. Returns the new offset,
    /// or `None` when no drag is active.
    pub fn drag_move(&mut self, show: &mut Show, x: f64) -> Result<Option<TimeUs>> {
        let Some(drag) = self.drag else {
            return Ok(None);
        };
        let delta = self.view(show).seconds_for(x - drag.start_x);
        let offset = show.set_offset(drag.item_id, drag.baseline + delta)?;
        Ok(Some(offset))
    }

    /// Finish the drag. The last applied offset stands.
    pub fn end_drag(&mut self) -> Option<Uuid> {
        self.drag.take().map(|d| d.item_id)
    }

    /// Seek target for a click on empty timeline. Ignored while dragging.
    pub fn click(&self, show: &Show, x: f64) -> Option<TimeUs> {
        if self.drag.is_some() {
            return None;
        }
        Some(self.view(show).time_at(x))
    }
}
