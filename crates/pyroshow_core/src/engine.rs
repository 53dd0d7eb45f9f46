//! Wires the show, clock, synchronizer and editor into one per-frame pass.

use crate::clock::{ClockEvent, FrameScheduler, MasterClock};
use crate::config::EngineConfig;
use crate::editor::TimelineEditor;
use crate::error::{CoreError, Result};
use crate::sync::{PlaybackHandle, SyncReport, Synchronizer};
use crate::types::*;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;
use uuid::Uuid;

/// One-shot notification from the playback layer that an item's media
/// metadata is available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetadataLoaded {
    pub item_id: Uuid,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub event: ClockEvent,
    pub sync: SyncReport,
}

pub struct ShowEngine<S, H> {
    config: EngineConfig,
    show: Show,
    clock: MasterClock<S>,
    sync: Synchronizer<H>,
    editor: TimelineEditor,
    metadata_tx: Sender<MetadataLoaded>,
    metadata_rx: Receiver<MetadataLoaded>,
}

impl<S: FrameScheduler, H: PlaybackHandle> ShowEngine<S, H> {
    pub fn new(
        mut show: Show,
        config: EngineConfig,
        scheduler: S,
        track_width_px: f64,
    ) -> Result<Self> {
        config.validate()?;
        show.zoom = config.clamp_zoom(show.zoom);
        show.total_duration_us = show.total_duration_us.max(config.min_total_duration());
        show.extend_to_fit(config.extend_margin());

        let (metadata_tx, metadata_rx) = mpsc::channel();
        Ok(Self {
            clock: MasterClock::new(scheduler, config.end_of_show),
            sync: Synchronizer::new(config.drift_tolerance()),
            editor: TimelineEditor::new(track_width_px),
            config,
            show,
            metadata_tx,
            metadata_rx,
        })
    }

    pub fn show(&self) -> &Show {
        &self.show
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &MasterClock<S> {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut MasterClock<S> {
        &mut self.clock
    }

    pub fn synchronizer(&self) -> &Synchronizer<H> {
        &self.sync
    }

    pub fn editor(&self) -> &TimelineEditor {
        &self.editor
    }

    pub fn master_time(&self) -> TimeUs {
        self.clock.master_time()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Channel the playback layer uses to report loaded metadata.
    pub fn metadata_sender(&self) -> Sender<MetadataLoaded> {
        self.metadata_tx.clone()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.show.save_to_file(path)
    }

    // -- collection -----------------------------------------------------------

    /// Add provisioned media, optionally with its handle already created.
    pub fn add_media(&mut self, media: MediaProvision, handle: Option<H>) -> Uuid {
        let id = self.show.add_item(media);
        if let Some(handle) = handle {
            self.sync.attach(id, handle);
        }
        tracing::info!(item = %id, "media added");
        id
    }

    pub fn attach_handle(&mut self, item_id: Uuid, handle: H) -> Result<()> {
        if self.show.item(item_id).is_none() {
            return Err(CoreError::ItemNotFound(item_id));
        }
        self.sync.attach(item_id, handle);
        Ok(())
    }

    /// Remove an item and release its playback handle.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<Item> {
        let item = self.show.remove_item(item_id)?;
        if self.editor.dragging() == Some(item_id) {
            self.editor.end_drag();
        }
        if let Some(mut handle) = self.sync.detach(item_id) {
            if !handle.is_paused() {
                if let Err(e) = handle.pause() {
                    tracing::warn!(item = %item_id, error = %e, "pause on release failed");
                }
            }
        }
        tracing::info!(item = %item_id, "item removed");
        Ok(item)
    }

    /// Record an item's media duration. Reports for items that are gone
    /// are dropped.
    pub fn metadata_loaded(&mut self, item_id: Uuid, duration_secs: f64) -> Result<()> {
        match self.show.set_item_duration(item_id, duration_secs) {
            Ok(true) => {
                tracing::debug!(item = %item_id, duration_secs, "metadata loaded");
                self.after_edit();
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(CoreError::ItemNotFound(_)) => {
                tracing::debug!(item = %item_id, "metadata for removed item");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply every queued metadata notification. Returns how many were read.
    pub fn apply_metadata(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.metadata_rx.try_recv() {
            count += 1;
            if let Err(e) = self.metadata_loaded(msg.item_id, msg.duration_secs) {
                tracing::warn!(item = %msg.item_id, error = %e, "metadata rejected");
            }
        }
        count
    }

    // -- transport ------------------------------------------------------------

    pub fn play(&mut self, now: Instant) {
        self.clock.play(now);
        self.resync();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        self.resync();
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.clock.is_playing() {
            self.pause();
        } else {
            self.play(now);
        }
    }

    pub fn seek(&mut self, t: TimeUs) -> TimeUs {
        let at = self.clock.seek(t, self.show.total_duration_us);
        self.resync();
        at
    }

    /// One frame: apply pending metadata, advance the clock, then bring
    /// every handle in line with the resulting snapshot.
    pub fn frame(&mut self, now: Instant) -> FrameReport {
        self.apply_metadata();
        let event = self.clock.tick(now, self.show.total_duration_us);
        let sync = self.resync();
        FrameReport { event, sync }
    }

    /// Synchronize all handles against the current master time.
    pub fn resync(&mut self) -> SyncReport {
        let master = self.clock.master_time();
        let playing = self.clock.is_playing();
        self.sync.sync(&self.show.items, master, playing)
    }

    // -- editing --------------------------------------------------------------

    /// Pointer pressed at `x`. A press on an item starts a drag; a press on
    /// empty timeline seeks.
    pub fn pointer_down(&mut self, x: f64, hit: Option<Uuid>) -> Result<()> {
        match hit {
            Some(item_id) => self.editor.begin_drag(&self.show, item_id, x),
            None => {
                if let Some(t) = self.editor.click(&self.show, x) {
                    self.seek(t);
                }
                Ok(())
            }
        }
    }

    pub fn pointer_move(&mut self, x: f64) -> Result<Option<TimeUs>> {
        let offset = self.editor.drag_move(&mut self.show, x)?;
        if offset.is_some() {
            self.after_edit();
        }
        Ok(offset)
    }

    pub fn pointer_up(&mut self) {
        if let Some(item_id) = self.editor.end_drag() {
            tracing::debug!(item = %item_id, "drag finished");
        }
    }

    pub fn set_offset(&mut self, item_id: Uuid, offset: TimeUs) -> Result<TimeUs> {
        let offset = self.show.set_offset(item_id, offset)?;
        self.after_edit();
        Ok(offset)
    }

    pub fn set_offset_input(&mut self, item_id: Uuid, input: &str) -> Result<TimeUs> {
        let offset = self.show.set_offset_input(item_id, input)?;
        self.after_edit();
        Ok(offset)
    }

    pub fn set_total_duration(&mut self, seconds: f64) -> TimeUs {
        self.show.set_total_duration(seconds, &self.config);
        self.after_edit();
        self.show.total_duration_us
    }

    pub fn set_duration_input(&mut self, input: &str) -> TimeUs {
        self.show.set_duration_input(input, &self.config);
        self.after_edit();
        self.show.total_duration_us
    }

    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        self.show.zoom = self.config.clamp_zoom(zoom);
        self.show.zoom
    }

    pub fn set_track_width(&mut self, track_width_px: f64) {
        self.editor.track_width_px = track_width_px;
    }

    fn after_edit(&mut self) {
        self.show.extend_to_fit(self.config.extend_margin());
        self.clock.fit_to(self.show.total_duration_us);
        self.resync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrameRequest;
    use crate::sync::tests::FakeHandle;
    use crate::sync::TransportCommand;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    type Engine = ShowEngine<FrameRequest, FakeHandle>;

    fn secs(s: f64) -> TimeUs {
        TimeUs::from_seconds(s)
    }

    fn engine() -> Engine {
        let config = EngineConfig::default();
        let show = Show::new("Harbour", &config);
        ShowEngine::new(show, config, FrameRequest::new(), 600.0).unwrap()
    }

    fn add_loaded(engine: &mut Engine, offset: f64, duration: f64) -> Uuid {
        let id = engine.add_media(
            MediaProvision::new("clip", "https://cdn/clip.mp4"),
            Some(FakeHandle::ready_at(TimeUs::ZERO)),
        );
        engine.set_offset(id, secs(offset)).unwrap();
        engine.metadata_loaded(id, duration).unwrap();
        id
    }

    fn handle(engine: &Engine, id: Uuid) -> &FakeHandle {
        engine.synchronizer().handle(id).unwrap()
    }

    #[test]
    fn duration_auto_extends_and_never_shrinks() {
        let mut e = engine();
        let id = add_loaded(&mut e, 50.0, 20.0);
        assert!(e.show().total_duration_us >= secs(70.0));

        let extended = e.show().total_duration_us;
        e.remove_item(id).unwrap();
        assert_eq!(e.show().total_duration_us, extended);
    }

    #[test]
    fn scenario_two_overlapping_items() {
        let mut e = engine();
        e.set_total_duration(10.0);
        let a = add_loaded(&mut e, 0.0, 5.0);
        let b = add_loaded(&mut e, 3.0, 5.0);

        let start = Instant::now();
        e.play(start);
        e.frame(start + Duration::from_secs(4));
        assert_eq!(e.master_time(), secs(4.0));
        assert_eq!(handle(&e, a).position, secs(4.0));
        assert!(!handle(&e, a).paused);
        assert_eq!(handle(&e, b).position, secs(1.0));
        assert!(!handle(&e, b).paused);

        e.frame(start + Duration::from_secs(6));
        assert_eq!(e.master_time(), secs(6.0));
        assert!(handle(&e, a).paused);
        assert_eq!(handle(&e, a).position, secs(4.0));
        assert_eq!(handle(&e, b).position, secs(3.0));
        assert!(!handle(&e, b).paused);
    }

    #[test]
    fn end_of_show_pauses_and_parks_everything() {
        let mut e = engine();
        e.set_total_duration(10.0);
        let a = add_loaded(&mut e, 2.0, 5.0);

        e.seek(secs(4.0));
        assert_eq!(handle(&e, a).position, secs(2.0));

        let start = Instant::now();
        e.seek(secs(9.5));
        e.play(start);
        let report = e.frame(start + Duration::from_secs(1));

        assert_eq!(report.event, ClockEvent::Ended);
        assert!(!e.is_playing());
        assert_eq!(e.master_time(), TimeUs::ZERO);
        assert!(handle(&e, a).paused);
        assert_eq!(handle(&e, a).position, TimeUs::ZERO);
    }

    #[test]
    fn metadata_arrives_through_channel() {
        let mut e = engine();
        let id = e.add_media(
            MediaProvision::new("late", "late.mp4"),
            Some(FakeHandle::ready_at(TimeUs::ZERO)),
        );
        let start = Instant::now();
        e.play(start);

        let report = e.frame(start + Duration::from_millis(16));
        assert_eq!(report.sync.skipped, 1);

        let tx = e.metadata_sender();
        tx.send(MetadataLoaded { item_id: id, duration_secs: 90.0 }).unwrap();
        tx.send(MetadataLoaded { item_id: id, duration_secs: 90.0 }).unwrap();

        let report = e.frame(start + Duration::from_millis(32));
        assert_eq!(report.sync.skipped, 0);
        assert_eq!(e.show().item(id).unwrap().duration_us, secs(90.0));
        assert_eq!(e.show().total_duration_us, secs(100.0));
        assert!(!handle(&e, id).paused);
    }

    #[test]
    fn metadata_for_removed_item_is_dropped() {
        let mut e = engine();
        let id = e.add_media(MediaProvision::new("gone", "gone.mp4"), None);
        e.remove_item(id).unwrap();
        assert!(e.metadata_loaded(id, 12.0).is_ok());
    }

    #[test]
    fn remove_releases_handle() {
        struct Tracked(Rc<Cell<bool>>, FakeHandle);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }
        impl PlaybackHandle for Tracked {
            fn position(&self) -> Option<TimeUs> {
                self.1.position()
            }
            fn is_paused(&self) -> bool {
                self.1.is_paused()
            }
            fn seek_to(&mut self, t: TimeUs) -> Result<()> {
                self.1.seek_to(t)
            }
            fn play(&mut self) -> Result<()> {
                self.1.play()
            }
            fn pause(&mut self) -> Result<()> {
                self.1.pause()
            }
        }

        let config = EngineConfig::default();
        let mut e: ShowEngine<FrameRequest, Tracked> =
            ShowEngine::new(Show::new("x", &config), config, FrameRequest::new(), 600.0).unwrap();
        let released = Rc::new(Cell::new(false));
        let id = e.add_media(
            MediaProvision::new("local", "blob:local"),
            Some(Tracked(released.clone(), FakeHandle::ready_at(TimeUs::ZERO))),
        );

        e.remove_item(id).unwrap();
        assert!(released.get());
        assert!(e.synchronizer().is_empty());
        assert!(e.show().items.is_empty());
    }

    #[test]
    fn failed_pause_on_release_still_removes() {
        let mut e = engine();
        let mut h = FakeHandle::ready_at(TimeUs::ZERO);
        h.paused = false;
        h.reject_pause = true;
        let id = e.add_media(MediaProvision::new("stuck", "stuck.mp4"), Some(h));

        let removed = e.remove_item(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(e.synchronizer().is_empty());
    }

    #[test]
    fn click_seeks_but_drag_press_does_not() {
        let mut e = engine();
        let id = add_loaded(&mut e, 10.0, 5.0);

        e.pointer_down(300.0, None).unwrap();
        assert_eq!(e.master_time(), secs(30.0));

        e.pointer_down(100.0, Some(id)).unwrap();
        assert_eq!(e.master_time(), secs(30.0));
        assert_eq!(e.editor().dragging(), Some(id));

        // A second press while dragging neither seeks nor starts a drag.
        e.pointer_down(0.0, None).unwrap();
        assert_eq!(e.master_time(), secs(30.0));
    }

    #[test]
    fn drag_moves_item_and_resyncs() {
        let mut e = engine();
        let id = add_loaded(&mut e, 10.0, 5.0);
        e.seek(secs(12.0));
        assert_eq!(handle(&e, id).position, secs(2.0));

        e.pointer_down(100.0, Some(id)).unwrap();
        assert_eq!(e.pointer_move(90.0).unwrap(), Some(secs(9.0)));
        assert_eq!(handle(&e, id).position, secs(3.0));

        assert_eq!(e.pointer_move(-1_000.0).unwrap(), Some(TimeUs::ZERO));
        e.pointer_up();
        assert_eq!(e.show().item(id).unwrap().offset_us, TimeUs::ZERO);
        assert_eq!(e.pointer_move(500.0).unwrap(), None);
    }

    #[test]
    fn pause_mid_drag_keeps_state() {
        let mut e = engine();
        let id = add_loaded(&mut e, 0.0, 30.0);
        let start = Instant::now();
        e.play(start);
        e.frame(start + Duration::from_secs(2));
        e.pointer_down(0.0, Some(id)).unwrap();

        e.pause();
        assert!(!e.is_playing());
        assert_eq!(e.master_time(), secs(2.0));
        assert_eq!(e.editor().dragging(), Some(id));
        assert!(handle(&e, id).paused);
        assert_eq!(handle(&e, id).log.last(), Some(&TransportCommand::Pause));
    }

    #[test]
    fn pause_before_any_metadata() {
        let mut e = engine();
        e.add_media(MediaProvision::new("pending", "pending.mp4"), None);
        e.pause();
        assert!(!e.is_playing());
        assert_eq!(e.master_time(), TimeUs::ZERO);
    }

    #[test]
    fn user_inputs_are_sanitised() {
        let mut e = engine();
        let id = e.add_media(MediaProvision::new("a", "a"), None);
        assert_eq!(e.set_offset_input(id, "oops").unwrap(), TimeUs::ZERO);
        assert_eq!(e.set_duration_input("5"), secs(10.0));
        assert_eq!(e.set_duration_input(""), secs(60.0));
        assert_eq!(e.set_zoom(9.0), 4.0);
        assert_eq!(e.set_zoom(0.1), 0.5);
    }

    #[test]
    fn shortening_show_pulls_master_time_in() {
        let mut e = engine();
        e.seek(secs(50.0));
        e.set_total_duration(20.0);
        assert_eq!(e.master_time(), secs(20.0));
    }

    #[test]
    fn toggle_flips_play_state() {
        let mut e = engine();
        let now = Instant::now();
        e.toggle(now);
        assert!(e.is_playing());
        e.toggle(now);
        assert!(!e.is_playing());
    }

    #[test]
    fn attach_handle_to_unknown_item_fails() {
        let mut e = engine();
        let missing = Uuid::new_v4();
        assert!(matches!(
            e.attach_handle(missing, FakeHandle::default()),
            Err(CoreError::ItemNotFound(id)) if id == missing
        ));
    }
}
