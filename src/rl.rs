//! Log lines read by the external RL harness
//!
//! The harness tails the log and parses lines on the `rl_task` target. Line
//! formats are fixed: `score: <float>`, `reward: <float>`, `episode_end`,
//! `extra: <name> <value>` and `json_extra: <json>`.

use std::fmt;

/// Log target the harness filters on
pub const RL_TARGET: &str = "rl_task";

/// One harness-visible line
#[derive(Debug, Clone, PartialEq)]
pub enum RlLine {
    Score(f64),
    Reward(f64),
    EpisodeEnd,
    Extra { name: String, value: f64 },
    JsonExtra(serde_json::Value),
}

impl fmt::Display for RlLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlLine::Score(score) => write!(f, "score: {:.1}", score),
            RlLine::Reward(reward) => write!(f, "reward: {:.1}", reward),
            RlLine::EpisodeEnd => write!(f, "episode_end"),
            RlLine::Extra { name, value } => write!(f, "extra: {} {:.1}", name, value),
            RlLine::JsonExtra(json) => write!(f, "json_extra: {}", json),
        }
    }
}

/// Where harness lines go
pub trait RlTask: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn emit(&self, line: RlLine);

    fn log_score(&self, score: f64) {
        self.emit(RlLine::Score(score));
    }

    fn log_reward(&self, reward: f64) {
        self.emit(RlLine::Reward(reward));
    }

    fn log_episode_end(&self) {
        self.emit(RlLine::EpisodeEnd);
    }

    fn log_extra(&self, name: &str, value: f64) {
        self.emit(RlLine::Extra {
            name: name.to_string(),
            value,
        });
    }

    fn log_json_extra(&self, json: serde_json::Value) {
        self.emit(RlLine::JsonExtra(json));
    }
}

/// Emits lines through `log` on [`RL_TARGET`]
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRlTask;

impl RlTask for LogRlTask {
    fn is_enabled(&self) -> bool {
        true
    }

    fn emit(&self, line: RlLine) {
        log::info!(target: RL_TARGET, "{}", line);
    }
}

/// No harness attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRlTask;

impl RlTask for NoopRlTask {
    fn is_enabled(&self) -> bool {
        false
    }

    fn emit(&self, _line: RlLine) {}
}

/// Keeps every line; used by tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingRlTask {
    pub lines: std::sync::Mutex<Vec<RlLine>>,
}

#[cfg(test)]
impl RecordingRlTask {
    pub fn lines(&self) -> Vec<RlLine> {
        crate::lock_or_recover(&self.lines).clone()
    }
}

#[cfg(test)]
impl RlTask for RecordingRlTask {
    fn is_enabled(&self) -> bool {
        true
    }

    fn emit(&self, line: RlLine) {
        crate::lock_or_recover(&self.lines).push(line);
    }
}
