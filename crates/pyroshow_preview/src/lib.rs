//! mpv-backed playback handles for previewing a show.

pub mod error;
pub mod mpv;
