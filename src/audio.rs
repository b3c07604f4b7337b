//! Audio capability
//!
//! The field fires sound events and never waits on them. Whatever plays
//! them is handed to the field at construction; the field calls `init` then
//! and `teardown` when it is dropped.

use std::sync::atomic::{AtomicBool, Ordering};

/// Sound event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEvent {
    /// Flipper raised
    Flipper,
    /// Ball hits a bumper
    Bumper,
    /// Ball hits a slingshot or scoring wall
    Kicker,
    /// Drop target knocked down
    DropTarget,
    /// Every target in a group is down
    DropTargetGroupComplete,
    /// Rollover lit
    Rollover,
    /// Every rollover in a group is lit
    RolloverGroupComplete,
    /// Ball left play
    BallDrained,
    /// Drained ball returned by ball save
    BallSaved,
    /// Multiball started
    Multiball,
    /// Ball launched
    Launch,
    /// New game started
    GameStart,
    /// Game over
    GameOver,
}

/// Something that can play sound events
pub trait AudioPlayer: Send + Sync {
    /// Load resources; called when a field takes ownership
    fn init(&self) {}

    /// Fire-and-forget playback
    fn play(&self, event: SoundEvent);

    /// Stop background music (game paused)
    fn pause_music(&self) {}

    /// Release resources; called when the owning field is dropped
    fn teardown(&self) {}
}

/// Plays nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudio;

impl AudioPlayer for SilentAudio {
    fn play(&self, _event: SoundEvent) {}
}

/// Logs sound events instead of playing them (headless runs)
#[derive(Debug)]
pub struct LogAudio {
    sound_enabled: bool,
    music_enabled: bool,
    initialized: AtomicBool,
}

impl Default for LogAudio {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl LogAudio {
    pub fn new(sound_enabled: bool, music_enabled: bool) -> Self {
        Self {
            sound_enabled,
            music_enabled,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }
}

impl AudioPlayer for LogAudio {
    fn init(&self) {
        self.initialized.store(true, Ordering::Relaxed);
        log::debug!("Audio initialized");
    }

    fn play(&self, event: SoundEvent) {
        if !self.is_initialized() || !self.sound_enabled {
            return;
        }
        log::debug!("sound: {:?}", event);
    }

    fn pause_music(&self) {
        if self.music_enabled {
            log::debug!("music paused");
        }
    }

    fn teardown(&self) {
        self.initialized.store(false, Ordering::Relaxed);
        log::debug!("Audio released");
    }
}

/// Records every event; used by tests to observe the field
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingAudio {
    pub events: std::sync::Mutex<Vec<SoundEvent>>,
    pub init_calls: std::sync::atomic::AtomicU32,
    pub teardown_calls: std::sync::atomic::AtomicU32,
}

#[cfg(test)]
impl RecordingAudio {
    pub fn count(&self, event: SoundEvent) -> usize {
        crate::lock_or_recover(&self.events).iter().filter(|e| **e == event).count()
    }
}

#[cfg(test)]
impl AudioPlayer for RecordingAudio {
    fn init(&self) {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn play(&self, event: SoundEvent) {
        crate::lock_or_recover(&self.events).push(event);
    }

    fn teardown(&self) {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
    }
}
