//! Timeline synchronization for planning fireworks shows from video clips.

pub mod clock;
pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod show;
pub mod sync;
pub mod types;
