//! Master playback clock.
//!
//! Time advances by measured wall-clock deltas between frames, not by a
//! fixed tick, so playback speed does not depend on the host's frame rate.
//! The host owns the actual frame primitive and is reached through
//! [`FrameScheduler`].

use crate::config::EndOfShow;
use crate::types::TimeUs;
use std::time::Instant;

/// The host's per-frame callback mechanism.
pub trait FrameScheduler {
    /// Ask for one more frame callback.
    fn request_next_tick(&mut self);
    /// Drop any pending frame callback.
    fn cancel(&mut self);
    fn is_pending(&self) -> bool;
}

/// Flag-based scheduler: the host polls [`FrameRequest::take`] once per
/// frame and runs a tick only when a frame was requested.
#[derive(Debug, Default)]
pub struct FrameRequest {
    pending: bool,
    requested: u64,
}

impl FrameRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the pending request, if any.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// How many frames have been requested in total.
    pub fn requested(&self) -> u64 {
        self.requested
    }
}

impl FrameScheduler for FrameRequest {
    fn request_next_tick(&mut self) {
        self.pending = true;
        self.requested += 1;
    }

    fn cancel(&mut self) {
        self.pending = false;
    }

    fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Outcome of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Not playing; nothing changed.
    Idle,
    /// Master time moved to the given position.
    Advanced(TimeUs),
    /// The show reached its end and playback stopped.
    Ended,
}

#[derive(Debug)]
pub struct MasterClock<S> {
    master_time: TimeUs,
    is_playing: bool,
    last_tick: Option<Instant>,
    end_of_show: EndOfShow,
    scheduler: S,
}

impl<S: FrameScheduler> MasterClock<S> {
    pub fn new(scheduler: S, end_of_show: EndOfShow) -> Self {
        Self {
            master_time: TimeUs::ZERO,
            is_playing: false,
            last_tick: None,
            end_of_show,
            scheduler,
        }
    }

    pub fn master_time(&self) -> TimeUs {
        self.master_time
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Start advancing from `now`. Already playing is a no-op so the
    /// reference instant of the running frame is kept.
    pub fn play(&mut self, now: Instant) {
        if self.is_playing {
            return;
        }
        self.is_playing = true;
        self.last_tick = Some(now);
        self.scheduler.request_next_tick();
        tracing::info!(at = %self.master_time, "play");
    }

    /// Stop advancing. Safe to call repeatedly; master time is left alone.
    pub fn pause(&mut self) {
        if self.is_playing {
            tracing::info!(at = %self.master_time, "pause");
        }
        self.is_playing = false;
        self.last_tick = None;
        self.scheduler.cancel();
    }

    /// Jump to `t`, clamped into `[0, total]`. Play state is unchanged.
    pub fn seek(&mut self, t: TimeUs, total: TimeUs) -> TimeUs {
        self.master_time = t.clamp_to(TimeUs::ZERO, total);
        tracing::debug!(to = %self.master_time, "seek");
        self.master_time
    }

    /// Pull master time back inside a (possibly shorter) show.
    pub fn fit_to(&mut self, total: TimeUs) {
        self.master_time = self.master_time.clamp_to(TimeUs::ZERO, total);
    }

    /// Advance by the wall-clock time elapsed since the previous tick.
    /// A clock that went backwards counts as a zero-length tick.
    pub fn tick(&mut self, now: Instant, total: TimeUs) -> ClockEvent {
        if !self.is_playing {
            return ClockEvent::Idle;
        }

        let delta = self
            .last_tick
            .and_then(|last| now.checked_duration_since(last))
            .map(TimeUs::from_duration)
            .unwrap_or(TimeUs::ZERO);
        self.last_tick = Some(now);
        self.master_time += delta;

        if self.master_time >= total {
            self.pause();
            self.master_time = match self.end_of_show {
                EndOfShow::StopAndRewind => TimeUs::ZERO,
                EndOfShow::HoldAtEnd => total.max(TimeUs::ZERO),
            };
            tracing::info!(total = %total, "end of show");
            return ClockEvent::Ended;
        }

        self.scheduler.request_next_tick();
        ClockEvent::Advanced(self.master_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn secs(s: f64) -> TimeUs {
        TimeUs::from_seconds(s)
    }

    fn clock() -> MasterClock<FrameRequest> {
        MasterClock::new(FrameRequest::new(), EndOfShow::StopAndRewind)
    }

    #[test]
    fn seek_is_always_clamped() {
        let mut c = clock();
        let total = secs(60.0);
        for t in [-100.0, -0.001, 0.0, 12.5, 60.0, 60.001, 1e9] {
            let at = c.seek(secs(t), total);
            assert!(at >= TimeUs::ZERO && at <= total, "seek({}) gave {}", t, at);
        }
        assert_eq!(c.seek(secs(-3.0), total), TimeUs::ZERO);
        assert_eq!(c.seek(secs(75.0), total), total);
        assert_eq!(c.seek(secs(12.5), total), secs(12.5));
    }

    #[test]
    fn seek_does_not_change_play_state() {
        let mut c = clock();
        c.seek(secs(5.0), secs(60.0));
        assert!(!c.is_playing());

        c.play(Instant::now());
        c.seek(secs(1.0), secs(60.0));
        assert!(c.is_playing());
    }

    #[test]
    fn ticks_are_frame_rate_independent() {
        let start = Instant::now();
        let d1 = Duration::from_micros(16_667);
        let d2 = Duration::from_micros(33_333);
        let total = secs(60.0);

        let mut split = clock();
        split.play(start);
        split.tick(start + d1, total);
        split.tick(start + d1 + d2, total);

        let mut single = clock();
        single.play(start);
        single.tick(start + d1 + d2, total);

        assert_eq!(split.master_time(), single.master_time());
        assert_eq!(single.master_time(), TimeUs(50_000));
    }

    #[test]
    fn overrun_stops_and_rewinds() {
        let start = Instant::now();
        let mut c = clock();
        let total = secs(10.0);
        c.seek(secs(9.5), total);
        c.play(start);

        let event = c.tick(start + Duration::from_secs(1), total);

        assert_eq!(event, ClockEvent::Ended);
        assert!(!c.is_playing());
        assert_eq!(c.master_time(), TimeUs::ZERO);
        assert!(!c.scheduler().is_pending());
    }

    #[test]
    fn overrun_can_hold_at_end() {
        let start = Instant::now();
        let mut c = MasterClock::new(FrameRequest::new(), EndOfShow::HoldAtEnd);
        let total = secs(10.0);
        c.seek(secs(9.5), total);
        c.play(start);

        assert_eq!(c.tick(start + Duration::from_secs(1), total), ClockEvent::Ended);
        assert!(!c.is_playing());
        assert_eq!(c.master_time(), total);
    }

    #[test]
    fn backwards_clock_is_zero_delta() {
        let start = Instant::now() + Duration::from_secs(5);
        let mut c = clock();
        c.play(start);
        let event = c.tick(start - Duration::from_secs(2), secs(60.0));
        assert_eq!(event, ClockEvent::Advanced(TimeUs::ZERO));

        // The earlier instant becomes the new reference.
        c.tick(start - Duration::from_secs(1), secs(60.0));
        assert_eq!(c.master_time(), secs(1.0));
    }

    #[test]
    fn pause_stops_mutation_until_play() {
        let start = Instant::now();
        let mut c = clock();
        let total = secs(60.0);
        c.play(start);
        c.tick(start + Duration::from_secs(2), total);
        c.pause();
        c.pause();

        assert_eq!(c.tick(start + Duration::from_secs(30), total), ClockEvent::Idle);
        assert_eq!(c.master_time(), secs(2.0));
        assert!(!c.scheduler().is_pending());

        // Time spent paused is not counted after resuming.
        let resume = start + Duration::from_secs(40);
        c.play(resume);
        c.tick(resume + Duration::from_millis(500), total);
        assert_eq!(c.master_time(), secs(2.5));
    }

    #[test]
    fn play_while_playing_keeps_elapsed_time() {
        let start = Instant::now();
        let mut c = clock();
        let total = secs(60.0);
        c.play(start);
        c.tick(start + Duration::from_secs(1), total);
        c.play(start + Duration::from_millis(1_500));
        c.tick(start + Duration::from_secs(2), total);
        assert_eq!(c.master_time(), secs(2.0));
        assert_eq!(c.scheduler().requested(), 3);
    }

    #[test]
    fn each_tick_requests_the_next_frame() {
        let start = Instant::now();
        let mut c = clock();
        c.play(start);
        assert!(c.scheduler_mut().take());
        assert!(!c.scheduler().is_pending());

        c.tick(start + Duration::from_millis(16), secs(60.0));
        assert!(c.scheduler_mut().take());
        assert_eq!(c.scheduler().requested(), 2);
    }

    #[test]
    fn fit_to_pulls_master_time_back() {
        let mut c = clock();
        c.seek(secs(50.0), secs(60.0));
        c.fit_to(secs(20.0));
        assert_eq!(c.master_time(), secs(20.0));
    }
}
