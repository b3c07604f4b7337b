//! Game session controller
//!
//! Owns the shared field and everything around it: the stepping driver, the
//! view manager, table selection, high scores and the RL log boundary. The
//! caller supplies the clock (`now`) so restart debouncing is testable.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audio::{AudioPlayer, SoundEvent};
use crate::consts::END_GAME_DELAY;
use crate::driver::{DriverConfig, FieldDriver};
use crate::error::Result;
use crate::highscores::HighScoreList;
use crate::lock_or_recover;
use crate::persistence::Preferences;
use crate::rl::RlTask;
use crate::settings::Settings;
use crate::sim::{Field, GameEvent, GamePhase, LayoutSource};
use crate::view::{FieldViewManager, HeadlessRenderer};

const INITIAL_LEVEL_PREFS_KEY: &str = "initialLevel";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Starts are ignored for this long after a game ends
    pub end_game_delay: Duration,
    pub driver: DriverConfig,
    /// Seed for the field's launch jitter
    pub seed: u64,
    /// Table to open with, overriding preferences
    pub level: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            end_game_delay: END_GAME_DELAY,
            driver: DriverConfig::default(),
            seed: 0,
            level: None,
        }
    }
}

/// Whether a start request may begin a new game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartGate {
    Open,
    GameRunning,
    EndedAt(Instant),
}

pub struct GameSession {
    field: Arc<Mutex<Field>>,
    view: Arc<FieldViewManager>,
    driver: FieldDriver,
    layouts: Box<dyn LayoutSource>,
    prefs: Box<dyn Preferences>,
    audio: Arc<dyn AudioPlayer>,
    rl: Arc<dyn RlTask>,
    settings: Settings,
    config: SessionConfig,
    level: u32,
    high_scores: HighScoreList,
    gate: StartGate,
    last_logged_score: Option<u64>,
}

impl GameSession {
    pub fn new(
        settings: Settings,
        layouts: Box<dyn LayoutSource>,
        prefs: Box<dyn Preferences>,
        audio: Arc<dyn AudioPlayer>,
        rl: Arc<dyn RlTask>,
        config: SessionConfig,
    ) -> Result<Self> {
        let requested = config.level.map(i64::from).unwrap_or_else(|| {
            saved_level(&settings, prefs.as_ref(), rl.is_enabled())
        });
        let level = clamp_level(requested, layouts.as_ref());

        let mut field = Field::with_seed(Arc::clone(&audio), config.seed);
        field.reset_for_level(layouts.as_ref(), level)?;
        let field = Arc::new(Mutex::new(field));

        let view = Arc::new(FieldViewManager::new(Arc::clone(&field)));
        view.set_renderer(Box::new(HeadlessRenderer::default()));
        let driver = FieldDriver::new(Arc::clone(&field), Arc::clone(&view), config.driver.clone());
        let high_scores = HighScoreList::load(prefs.as_ref(), level);

        let session = Self {
            field,
            view,
            driver,
            layouts,
            prefs,
            audio,
            rl,
            settings: settings.clone(),
            config,
            level,
            high_scores,
            gate: StartGate::Open,
            last_logged_score: None,
        };
        session.apply_view_settings(&settings);
        log::info!("Session ready on table {}", level);
        Ok(session)
    }

    fn apply_view_settings(&self, settings: &Settings) {
        self.view.set_zoom(settings.zoom_factor());
        self.view.set_independent_flippers(settings.independent_flippers);
        self.view.set_show_fps(settings.show_fps);
        self.view.set_high_quality(settings.high_quality);
    }

    /// Apply changed settings. Switching renderer or quality resets the
    /// frame rate target, since the achievable rate may change.
    pub fn update_settings(&mut self, settings: Settings) {
        if settings.renderer != self.settings.renderer
            || settings.high_quality != self.settings.high_quality
        {
            self.driver.reset_frame_rate();
        }
        self.apply_view_settings(&settings);
        self.settings = settings;
    }

    /// Start a new game, or resume a paused one.
    /// Returns true if a new game started.
    pub fn start_game(&mut self, now: Instant) -> Result<bool> {
        if self.is_paused() {
            self.unpause();
            return Ok(false);
        }
        if let StartGate::EndedAt(ended) = self.gate {
            if now < ended + self.config.end_game_delay {
                log::debug!("Ignoring start right after game end");
                return Ok(false);
            }
        }

        {
            let mut field = lock_or_recover(&self.field);
            if field.game_state().is_game_in_progress() {
                return Ok(false);
            }
            field.reset_for_level(self.layouts.as_ref(), self.level)?;
            if self.settings.unlimited_balls {
                field.start_game_with_unlimited_balls()?;
            } else {
                field.start_game()?;
            }
        }
        self.audio.play(SoundEvent::GameStart);
        self.gate = StartGate::GameRunning;
        self.last_logged_score = None;
        self.driver.start();
        Ok(true)
    }

    /// Manual end; works on paused games too
    pub fn end_game(&mut self) {
        self.unpause();
        lock_or_recover(&self.field).end_game();
    }

    pub fn pause(&mut self) {
        self.audio.pause_music();
        let paused = lock_or_recover(&self.field).set_paused(true);
        if paused {
            self.driver.stop();
        }
    }

    pub fn unpause(&mut self) {
        let resumed = lock_or_recover(&self.field).set_paused(false);
        if resumed {
            self.driver.start();
        }
    }

    /// Score display clicked: pause/resume a running game, else start one
    pub fn toggle_pause(&mut self, now: Instant) -> Result<()> {
        if self.rl.is_enabled() {
            return Ok(());
        }
        let (in_progress, paused) = {
            let field = lock_or_recover(&self.field);
            (field.game_state().is_game_in_progress(), field.game_state().is_paused())
        };
        match (in_progress, paused) {
            (true, true) => self.unpause(),
            (true, false) => self.pause(),
            (false, _) => {
                self.start_game(now)?;
            }
        }
        Ok(())
    }

    /// Move to the next table, wrapping around after the last
    pub fn switch_table(&mut self) -> Result<u32> {
        let count = self.layouts.level_count().max(1);
        let next = if self.level >= count { 1 } else { self.level + 1 };

        lock_or_recover(&self.field).reset_for_level(self.layouts.as_ref(), next)?;
        self.level = next;
        self.prefs.put_int(INITIAL_LEVEL_PREFS_KEY, i64::from(next))?;
        self.high_scores = HighScoreList::load(self.prefs.as_ref(), next);
        log::info!("Switched to table {}", next);
        Ok(next)
    }

    /// Periodic check: forwards score changes to the RL task and handles the
    /// end of a game. Returns the field's events since the last poll.
    pub fn poll(&mut self, now: Instant) -> Vec<GameEvent> {
        let (phase, score, unlimited, events) = {
            let mut field = lock_or_recover(&self.field);
            let state = field.game_state();
            let (phase, score, unlimited) =
                (state.phase(), state.score(), state.has_unlimited_balls());
            (phase, score, unlimited, field.take_events())
        };
        self.view.set_fps(self.driver.average_fps());

        if self.rl.is_enabled() {
            if self.last_logged_score != Some(score) {
                self.rl.log_score(score as f64);
                self.last_logged_score = Some(score);
            }
            for event in &events {
                if let GameEvent::BallLaunched { ball_number } = event {
                    self.rl.log_extra("ball_number", f64::from(*ball_number));
                }
            }
        }

        if self.gate == StartGate::GameRunning && phase == GamePhase::Ended {
            self.gate = StartGate::EndedAt(now);
            self.game_ended(score, unlimited);
        }
        events
    }

    fn game_ended(&mut self, score: u64, unlimited: bool) {
        if self.rl.is_enabled() {
            self.rl.log_episode_end();
            return;
        }
        // No high scores for unlimited balls
        if unlimited || !self.high_scores.qualifies(score) {
            return;
        }
        if let Some(rank) = self.high_scores.insert(score) {
            log::info!("New high score {} (rank {}) on table {}", score, rank, self.level);
        }
        if let Err(e) = self.high_scores.save(self.prefs.as_mut(), self.level) {
            log::warn!("Could not save high scores: {}", e);
        }
    }

    pub fn field(&self) -> &Arc<Mutex<Field>> {
        &self.field
    }

    pub fn view(&self) -> &Arc<FieldViewManager> {
        &self.view
    }

    pub fn driver(&self) -> &FieldDriver {
        &self.driver
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn high_scores(&self) -> &HighScoreList {
        &self.high_scores
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn score(&self) -> u64 {
        lock_or_recover(&self.field).game_state().score()
    }

    pub fn is_paused(&self) -> bool {
        lock_or_recover(&self.field).game_state().is_paused()
    }

    pub fn is_game_in_progress(&self) -> bool {
        lock_or_recover(&self.field).game_state().is_game_in_progress()
    }

    /// Stop stepping; the field keeps its state
    pub fn shutdown(&mut self) {
        self.driver.stop();
    }
}

/// The RL harness picks the table directly, otherwise it's the last one played
fn saved_level(settings: &Settings, prefs: &dyn Preferences, rl_enabled: bool) -> i64 {
    if rl_enabled {
        i64::from(settings.initial_level)
    } else {
        prefs.get_int(INITIAL_LEVEL_PREFS_KEY, i64::from(settings.initial_level))
    }
}

/// Out-of-range levels fall back to the first table
fn clamp_level(requested: i64, layouts: &dyn LayoutSource) -> u32 {
    match u32::try_from(requested) {
        Ok(level) if (1..=layouts.level_count()).contains(&level) => level,
        _ => 1,
    }
}
