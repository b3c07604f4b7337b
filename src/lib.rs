//! Vector Pinball - fixed-timestep pinball field simulation
//!
//! Core modules:
//! - `sim`: Deterministic simulation (physics world, field elements, game state)
//! - `driver`: Background stepping loop and frame-rate management
//! - `view`: Coordinate transforms, input translation, render snapshots
//! - `session`: Game session controller (start/pause/end, tables, high scores)
//! - `persistence`: Key-value preferences storage
//! - `rl`: Log-line boundary read by the external RL harness

pub mod audio;
pub mod driver;
pub mod error;
pub mod highscores;
pub mod persistence;
pub mod rl;
pub mod session;
pub mod settings;
pub mod sim;
pub mod view;

pub use error::{Error, Result};
pub use highscores::HighScoreList;
pub use settings::{RenderBackend, Settings};

use std::sync::{Mutex, MutexGuard};

/// Game configuration constants
pub mod consts {
    use std::time::Duration;

    /// Fixed physics step (120 Hz)
    pub const SIM_STEP: Duration = Duration::from_nanos(8_333_333);
    /// Solver iterations per step
    pub const VELOCITY_ITERATIONS: u32 = 8;
    pub const POSITION_ITERATIONS: u32 = 3;

    /// Largest wall-clock delta the driver hands to a single tick
    pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(100);

    /// Touches shortly after a game ends don't start a new one
    pub const END_GAME_DELAY: Duration = Duration::from_millis(1000);
    /// Pause between unpausing and the first tick
    pub const RESUME_DELAY: Duration = Duration::from_millis(75);

    /// Zoom applied when the zoom setting is on
    pub const ZOOM_FACTOR: f32 = 1.5;

    /// High score slots per table
    pub const MAX_HIGH_SCORES: usize = 5;

    /// Balls per game unless the table says otherwise
    pub const DEFAULT_BALLS_PER_GAME: u32 = 3;
}

/// Lock a mutex, recovering the data if another thread panicked while holding it
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("Recovering poisoned lock");
        poisoned.into_inner()
    })
}
