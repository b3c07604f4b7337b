//! Game state: score, balls and multiplier
//!
//! Only the field mutates this, and only from inside a simulation step
//! (apart from starting, pausing and ending a game).

use serde::{Deserialize, Serialize};

use super::elements::ElementId;

/// Current phase of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GamePhase {
    /// Table loaded, waiting for a start
    #[default]
    NotStarted,
    /// Active gameplay
    InProgress,
    /// Game is paused
    Paused,
    /// Last ball drained or game ended manually
    Ended,
}

/// Notable things that happened during a step, for collaborators outside the sim
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    GameStarted { unlimited_balls: bool },
    BallLaunched { ball_number: u32 },
    BallDrained { balls_in_play: usize },
    BallSaved,
    MultiballStarted { balls_in_play: usize },
    MultiballEnded,
    DropTargetGroupCompleted { element: ElementId },
    DropTargetGroupReset { element: ElementId },
    RolloverGroupCompleted { element: ElementId, multiplier: f64 },
    GameEnded { score: u64 },
}

/// Score and ball bookkeeping for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    phase: GamePhase,
    score: u64,
    /// Balls left including the one in play; unused with unlimited balls
    balls_remaining: u32,
    /// 1-based number of the ball in play
    ball_number: u32,
    unlimited_balls: bool,
    multiplier: f64,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::NotStarted,
            score: 0,
            balls_remaining: 0,
            ball_number: 0,
            unlimited_balls: false,
            multiplier: 1.0,
        }
    }

    /// Begin a fresh game
    pub fn start_game(&mut self, balls: u32, unlimited_balls: bool) {
        self.phase = GamePhase::InProgress;
        self.score = 0;
        self.balls_remaining = balls.max(1);
        self.ball_number = 1;
        self.unlimited_balls = unlimited_balls;
        self.multiplier = 1.0;
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn balls_remaining(&self) -> u32 {
        self.balls_remaining
    }

    pub fn ball_number(&self) -> u32 {
        self.ball_number
    }

    pub fn has_unlimited_balls(&self) -> bool {
        self.unlimited_balls
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// True while in progress or paused
    pub fn is_game_in_progress(&self) -> bool {
        matches!(self.phase, GamePhase::InProgress | GamePhase::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.phase == GamePhase::Paused
    }

    /// Pause or resume; only games in progress can be paused.
    /// Returns whether the phase changed.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let next = match (self.phase, paused) {
            (GamePhase::InProgress, true) => GamePhase::Paused,
            (GamePhase::Paused, false) => GamePhase::InProgress,
            _ => return false,
        };
        self.phase = next;
        true
    }

    /// Award points scaled by the multiplier; returns the amount added
    pub fn add_score(&mut self, points: u64) -> u64 {
        if points == 0 || self.phase != GamePhase::InProgress {
            return 0;
        }
        let awarded = (points as f64 * self.multiplier).round() as u64;
        self.score = self.score.saturating_add(awarded);
        awarded
    }

    pub fn increment_multiplier(&mut self, amount: f64) {
        if amount > 0.0 {
            self.multiplier += amount;
        }
    }

    /// Account for a lost ball. Returns true when no balls are left.
    pub fn consume_ball(&mut self) -> bool {
        if self.unlimited_balls {
            self.ball_number += 1;
            return false;
        }
        self.balls_remaining = self.balls_remaining.saturating_sub(1);
        if self.balls_remaining == 0 {
            return true;
        }
        self.ball_number += 1;
        false
    }

    /// Finish the game. Returns true if the game was in progress.
    pub fn end_game(&mut self) -> bool {
        if !self.is_game_in_progress() {
            return false;
        }
        self.phase = GamePhase::Ended;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_game_resets_counters() {
        let mut state = GameState::new();
        assert_eq!(state.phase(), GamePhase::NotStarted);

        state.start_game(3, false);
        assert_eq!(state.phase(), GamePhase::InProgress);
        assert_eq!(state.score(), 0);
        assert_eq!(state.balls_remaining(), 3);
        assert_eq!(state.ball_number(), 1);
        assert_eq!(state.multiplier(), 1.0);
    }

    #[test]
    fn test_pause_only_while_in_progress() {
        let mut state = GameState::new();
        assert!(!state.set_paused(true));
        assert!(!state.is_paused());

        state.start_game(3, false);
        assert!(state.set_paused(true));
        assert!(state.is_paused());
        assert!(state.is_game_in_progress());
        assert!(!state.set_paused(true));

        assert!(state.set_paused(false));
        assert_eq!(state.phase(), GamePhase::InProgress);

        state.end_game();
        assert!(!state.set_paused(true));
        // Ended games are never paused
        assert!(!state.is_paused());
    }

    #[test]
    fn test_score_uses_multiplier() {
        let mut state = GameState::new();
        state.start_game(3, false);

        assert_eq!(state.add_score(100), 100);
        state.increment_multiplier(1.0);
        assert_eq!(state.add_score(100), 200);
        state.increment_multiplier(0.5);
        assert_eq!(state.add_score(10), 25);
        assert_eq!(state.score(), 325);

        // Negative increments are ignored
        state.increment_multiplier(-2.0);
        assert_eq!(state.multiplier(), 2.5);
    }

    #[test]
    fn test_no_score_while_paused() {
        let mut state = GameState::new();
        state.start_game(3, false);
        state.set_paused(true);
        assert_eq!(state.add_score(100), 0);
        assert_eq!(state.score(), 0);
    }

    #[test]
    fn test_consume_ball_limited() {
        let mut state = GameState::new();
        state.start_game(2, false);

        assert!(!state.consume_ball());
        assert_eq!(state.ball_number(), 2);
        assert_eq!(state.balls_remaining(), 1);
        assert!(state.consume_ball());
        assert_eq!(state.balls_remaining(), 0);
    }

    #[test]
    fn test_consume_ball_unlimited_never_runs_out() {
        let mut state = GameState::new();
        state.start_game(3, true);

        for _ in 0..50 {
            assert!(!state.consume_ball());
        }
        assert_eq!(state.balls_remaining(), 3);
        assert_eq!(state.ball_number(), 51);
    }

    #[test]
    fn test_end_game_once() {
        let mut state = GameState::new();
        assert!(!state.end_game());

        state.start_game(3, false);
        state.set_paused(true);
        assert!(state.end_game());
        assert_eq!(state.phase(), GamePhase::Ended);
        assert!(!state.end_game());
    }
}
