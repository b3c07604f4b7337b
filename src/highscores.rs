//! High score tables
//!
//! One descending list per table, persisted as comma-separated integers
//! under `highScores.<level>`. Older installs kept a single integer under
//! `highScore.<level>`; that value is used when no list exists yet.

use crate::consts::MAX_HIGH_SCORES;
use crate::error::Result;
use crate::persistence::Preferences;

const PREFS_KEY: &str = "highScores";
const LEGACY_PREFS_KEY: &str = "highScore";

/// Top scores for one table, highest first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighScoreList {
    scores: Vec<u64>,
}

impl Default for HighScoreList {
    fn default() -> Self {
        Self { scores: vec![0] }
    }
}

impl HighScoreList {
    /// List from arbitrary scores: sorted, trimmed, `[0]` when empty
    pub fn from_scores(mut scores: Vec<u64>) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        scores.sort_unstable_by(|a, b| b.cmp(a));
        scores.truncate(MAX_HIGH_SCORES);
        Self { scores }
    }

    pub fn scores(&self) -> &[u64] {
        &self.scores
    }

    pub fn top_score(&self) -> u64 {
        self.scores.first().copied().unwrap_or(0)
    }

    /// Check if a score would make the list
    pub fn qualifies(&self, score: u64) -> bool {
        if self.scores.len() < MAX_HIGH_SCORES {
            return true;
        }
        self.scores.last().is_none_or(|lowest| score > *lowest)
    }

    /// Add a score if it qualifies.
    /// Returns the rank achieved (1-indexed) or None if it didn't.
    pub fn insert(&mut self, score: u64) -> Option<usize> {
        if !self.qualifies(score) {
            return None;
        }
        let pos = self
            .scores
            .iter()
            .position(|s| score > *s)
            .unwrap_or(self.scores.len());
        self.scores.insert(pos, score);
        self.scores.truncate(MAX_HIGH_SCORES);
        Some(pos + 1)
    }

    /// Comma-joined form used in preferences
    pub fn to_prefs_string(&self) -> String {
        self.scores
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the stored form, keeping its order. Malformed input yields `[0]`.
    pub fn parse(s: &str) -> Self {
        let parsed: std::result::Result<Vec<u64>, _> =
            s.split(',').map(|f| f.trim().parse::<u64>()).collect();
        match parsed {
            Ok(scores) if !scores.is_empty() => Self { scores },
            _ => {
                log::warn!("Ignoring malformed high scores {:?}", s);
                Self::default()
            }
        }
    }

    pub fn prefs_key(level: u32) -> String {
        format!("{}.{}", PREFS_KEY, level)
    }

    fn legacy_prefs_key(level: u32) -> String {
        format!("{}.{}", LEGACY_PREFS_KEY, level)
    }

    /// Load the list for `level`
    pub fn load(prefs: &dyn Preferences, level: u32) -> Self {
        let stored = prefs.get_string(&Self::prefs_key(level), "");
        if !stored.is_empty() {
            return Self::parse(&stored);
        }
        let legacy = prefs.get_int(&Self::legacy_prefs_key(level), 0);
        Self {
            scores: vec![u64::try_from(legacy).unwrap_or(0)],
        }
    }

    pub fn save(&self, prefs: &mut dyn Preferences, level: u32) -> Result<()> {
        prefs.put_string(&Self::prefs_key(level), &self.to_prefs_string())?;
        log::info!("High scores saved for table {} ({} entries)", level, self.scores.len());
        Ok(())
    }
}
