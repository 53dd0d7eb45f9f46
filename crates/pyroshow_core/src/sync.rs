//! Keeps every item's playback handle in step with master time.

use crate::error::Result;
use crate::types::{Item, TimeUs};
use std::collections::HashMap;
use uuid::Uuid;

/// Transport surface of one loaded media element. Commands are
/// fire-and-forget; failures are reported but never block the pass.
pub trait PlaybackHandle {
    /// Current local position, or `None` while the handle is not ready.
    fn position(&self) -> Option<TimeUs>;
    fn is_paused(&self) -> bool;
    fn seek_to(&mut self, t: TimeUs) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleState {
    pub position: TimeUs,
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Seek(TimeUs),
    Play,
    Pause,
}

/// Decide what one handle needs so that it shows `master - offset`.
///
/// Inside the active window the handle is re-seeked only when it drifted
/// more than `tolerance`. Before the window it is paused and parked at
/// local zero; after the window it is paused where it stands.
pub fn plan_item(
    item: &Item,
    state: HandleState,
    master: TimeUs,
    playing: bool,
    tolerance: TimeUs,
) -> Vec<TransportCommand> {
    let mut commands = Vec::with_capacity(2);
    let local = item.local_time(master);

    if item.is_active_at(master) {
        if state.position.abs_diff(local) > tolerance {
            commands.push(TransportCommand::Seek(local));
        }
        if playing && state.paused {
            commands.push(TransportCommand::Play);
        } else if !playing && !state.paused {
            commands.push(TransportCommand::Pause);
        }
        return commands;
    }

    if !state.paused {
        commands.push(TransportCommand::Pause);
    }
    if local < TimeUs::ZERO && state.position != TimeUs::ZERO {
        commands.push(TransportCommand::Seek(TimeUs::ZERO));
    }
    commands
}

/// Counts from one synchronization pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub seeks: usize,
    pub plays: usize,
    pub pauses: usize,
    pub skipped: usize,
}

pub struct Synchronizer<H> {
    handles: HashMap<Uuid, H>,
    tolerance: TimeUs,
}

impl<H: PlaybackHandle> Synchronizer<H> {
    pub fn new(tolerance: TimeUs) -> Self {
        Self {
            handles: HashMap::new(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> TimeUs {
        self.tolerance
    }

    pub fn attach(&mut self, item_id: Uuid, handle: H) -> Option<H> {
        self.handles.insert(item_id, handle)
    }

    /// Remove the item's handle and hand it back so the caller can drop it.
    pub fn detach(&mut self, item_id: Uuid) -> Option<H> {
        self.handles.remove(&item_id)
    }

    pub fn handle(&self, item_id: Uuid) -> Option<&H> {
        self.handles.get(&item_id)
    }

    pub fn handle_mut(&mut self, item_id: Uuid) -> Option<&mut H> {
        self.handles.get_mut(&item_id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// One pass over every item against a single `(master, playing)`
    /// snapshot. Items without a ready handle or without metadata are
    /// skipped and picked up on a later pass.
    pub fn sync(&mut self, items: &[Item], master: TimeUs, playing: bool) -> SyncReport {
        let mut report = SyncReport::default();

        for item in items {
            let Some(handle) = self.handles.get_mut(&item.id) else {
                report.skipped += 1;
                continue;
            };
            let Some(position) = handle.position() else {
                report.skipped += 1;
                continue;
            };
            if !item.is_loaded() {
                report.skipped += 1;
                continue;
            }

            let state = HandleState {
                position,
                paused: handle.is_paused(),
            };
            for command in plan_item(item, state, master, playing, self.tolerance) {
                apply(item.id, handle, command, &mut report);
            }
        }

        report
    }
}

fn apply<H: PlaybackHandle>(
    item_id: Uuid,
    handle: &mut H,
    command: TransportCommand,
    report: &mut SyncReport,
) {
    tracing::debug!(item = %item_id, ?command, "transport");
    match command {
        TransportCommand::Seek(t) => {
            report.seeks += 1;
            if let Err(e) = handle.seek_to(t) {
                tracing::warn!(item = %item_id, error = %e, "seek failed");
            }
        }
        TransportCommand::Play => {
            report.plays += 1;
            // Rejected plays are retried by the next pass since the
            // paused/playing mismatch persists.
            if let Err(e) = handle.play() {
                tracing::debug!(item = %item_id, error = %e, "play rejected");
            }
        }
        TransportCommand::Pause => {
            report.pauses += 1;
            if let Err(e) = handle.pause() {
                tracing::warn!(item = %item_id, error = %e, "pause failed");
            }
        }
    }
}
