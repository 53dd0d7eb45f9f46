use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::types::*;
use std::path::Path;
use uuid::Uuid;

impl Show {
    /// Create an empty show at the configured default duration.
    pub fn new(name: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            items: vec![],
            total_duration_us: config.default_total_duration(),
            zoom: 1.0,
            inserted_count: 0,
        }
    }

    /// Save the show to a file as pretty-printed JSON.
    /// Automatically appends `.pyroshow` extension if not present.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = ensure_extension(path.as_ref());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::info!(show = %self.name, path = %path.display(), "show saved");
        Ok(())
    }

    /// Load a show from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let mut show: Show = serde_json::from_str(&data)?;
        for item in &mut show.items {
            item.offset_us = item.offset_us.max(TimeUs::ZERO);
            item.duration_us = item.duration_us.max(TimeUs::ZERO);
        }
        show.inserted_count = show.inserted_count.max(show.items.len());
        Ok(show)
    }

    /// Append newly provisioned media at offset 0. Its duration stays zero
    /// until metadata is reported.
    pub fn add_item(&mut self, media: MediaProvision) -> Uuid {
        let id = media.id;
        let color = palette_color(self.inserted_count).to_string();
        self.inserted_count += 1;
        self.items.push(Item {
            id,
            name: media.display_name,
            locator: media.locator,
            duration_us: TimeUs::ZERO,
            offset_us: TimeUs::ZERO,
            color,
        });
        id
    }

    /// Remove an item by its id. Returns the removed item.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<Item> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(CoreError::ItemNotFound(item_id))?;
        Ok(self.items.remove(pos))
    }

    pub fn item(&self, item_id: Uuid) -> Option<&Item> {
        self.items.iter().find(|i| i.id == item_id)
    }

    fn item_mut(&mut self, item_id: Uuid) -> Result<&mut Item> {
        self.items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(CoreError::ItemNotFound(item_id))
    }

    /// Record the media duration once metadata has loaded. Only the first
    /// usable report counts; later ones are ignored, as are non-finite or
    /// negative values. Returns whether the stored duration changed.
    pub fn set_item_duration(&mut self, item_id: Uuid, seconds: f64) -> Result<bool> {
        let item = self.item_mut(item_id)?;
        if item.is_loaded() {
            tracing::debug!(item = %item_id, seconds, "duration already known");
            return Ok(false);
        }
        if !seconds.is_finite() || seconds < 0.0 {
            tracing::warn!(item = %item_id, seconds, "ignoring bogus media duration");
            return Ok(false);
        }
        let duration = TimeUs::from_seconds(seconds);
        let changed = item.duration_us != duration;
        item.duration_us = duration;
        Ok(changed)
    }

    /// Move an item's start. Negative offsets clamp to zero.
    pub fn set_offset(&mut self, item_id: Uuid, offset: TimeUs) -> Result<TimeUs> {
        let item = self.item_mut(item_id)?;
        item.offset_us = offset.max(TimeUs::ZERO);
        Ok(item.offset_us)
    }

    /// Apply a numeric offset edit typed by the user. Text that does not
    /// parse to a finite number resets the offset to zero.
    pub fn set_offset_input(&mut self, item_id: Uuid, input: &str) -> Result<TimeUs> {
        let offset = parse_seconds(input).map(TimeUs::from_seconds).unwrap_or(TimeUs::ZERO);
        self.set_offset(item_id, offset)
    }

    /// Set the show length, never below the configured minimum.
    pub fn set_total_duration(&mut self, seconds: f64, config: &EngineConfig) -> TimeUs {
        let requested = if seconds.is_finite() {
            TimeUs::from_seconds(seconds)
        } else {
            config.default_total_duration()
        };
        self.total_duration_us = requested.max(config.min_total_duration());
        self.total_duration_us
    }

    /// Apply a duration field edit typed by the user. Unparseable text falls
    /// back to the configured default.
    pub fn set_duration_input(&mut self, input: &str, config: &EngineConfig) -> TimeUs {
        let seconds = parse_seconds(input).unwrap_or(config.default_total_duration_secs);
        self.set_total_duration(seconds, config)
    }

    /// Latest end of any item.
    pub fn latest_end(&self) -> TimeUs {
        self.items
            .iter()
            .map(Item::end_us)
            .max()
            .unwrap_or(TimeUs::ZERO)
    }

    /// Grow the show so every item fits, leaving `margin` after the last one.
    /// Never shrinks. Returns whether the duration changed.
    pub fn extend_to_fit(&mut self, margin: TimeUs) -> bool {
        let latest = self.latest_end();
        if latest <= self.total_duration_us {
            return false;
        }
        let extended = self.total_duration_us.max(latest + margin);
        tracing::debug!(from = %self.total_duration_us, to = %extended, "extending show");
        self.total_duration_us = extended;
        true
    }
}

fn parse_seconds(input: &str) -> Option<f64> {
    input
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn ensure_extension(path: &Path) -> std::path::PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some("pyroshow") {
        path.to_path_buf()
    } else {
        let mut p = path.to_path_buf();
        let mut name = p
            .file_name()
            .unwrap_or_default()
            .to_os_string();
        name.push(".pyroshow");
        p.set_file_name(name);
        p
    }
}
