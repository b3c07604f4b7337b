//! Table layouts
//!
//! A layout is a JSON document describing the table's dimensions, ball
//! launch parameters and an ordered list of element descriptors. Built-in
//! tables are embedded in the binary; any other source can implement
//! [`LayoutSource`].

use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_BALLS_PER_GAME;
use crate::error::{Error, Result};

/// Longest delay a layout may ask for
const MAX_DELAY_SECS: f32 = 3600.0;

/// Which side of the table a flipper belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipperSide {
    Left,
    Right,
}

/// What happens when a ball crosses a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorAction {
    /// Ball leaves play
    Drain,
    /// Flat award, scaled by the multiplier
    Score { points: u64 },
}

/// Sensor geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorShape {
    Circle { center: Vec2, radius: f32 },
    Segment { start: Vec2, end: Vec2, radius: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallDesc {
    pub start: Vec2,
    pub end: Vec2,
    #[serde(default = "default_wall_radius")]
    pub radius: f32,
    #[serde(default)]
    pub restitution: f32,
    /// Impulse applied to the ball along the contact normal (slingshots)
    #[serde(default)]
    pub kick: f32,
    #[serde(default)]
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipperDesc {
    pub side: FlipperSide,
    pub pivot: Vec2,
    pub length: f32,
    #[serde(default = "default_flipper_radius")]
    pub radius: f32,
    /// Angle when released (radians, world frame)
    pub rest_angle: f32,
    /// Angle when fully raised
    pub up_angle: f32,
    #[serde(default = "default_flipper_up_speed")]
    pub up_speed: f32,
    #[serde(default = "default_flipper_down_speed")]
    pub down_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BumperDesc {
    pub center: Vec2,
    pub radius: f32,
    #[serde(default = "default_bumper_points")]
    pub points: u64,
    #[serde(default = "default_bumper_kick")]
    pub kick: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTargetGroupDesc {
    /// One segment per target: [start, end]
    pub targets: Vec<[Vec2; 2]>,
    #[serde(default = "default_target_radius")]
    pub radius: f32,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub completion_points: u64,
    /// Seconds before a completed group pops back up
    #[serde(default = "default_reset_delay")]
    pub reset_delay: f32,
    /// Completing the group grants ball save
    #[serde(default = "default_true")]
    pub ball_save: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloverGroupDesc {
    pub centers: Vec<Vec2>,
    pub radius: f32,
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub completion_points: u64,
    #[serde(default = "default_multiplier_increment")]
    pub multiplier_increment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDesc {
    pub geometry: SensorShape,
    pub action: SensorAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiballTriggerDesc {
    pub center: Vec2,
    pub radius: f32,
    #[serde(default = "default_extra_balls")]
    pub extra_balls: u32,
    #[serde(default)]
    pub points: u64,
}

/// One entry of a table layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementDescriptor {
    Wall(WallDesc),
    Flipper(FlipperDesc),
    Bumper(BumperDesc),
    DropTargetGroup(DropTargetGroupDesc),
    RolloverGroup(RolloverGroupDesc),
    Sensor(SensorDesc),
    MultiballTrigger(MultiballTriggerDesc),
}

/// A complete table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    pub width: f32,
    pub height: f32,
    pub gravity: Vec2,
    #[serde(default = "default_balls_per_game")]
    pub balls_per_game: u32,
    pub ball_radius: f32,
    pub launch_position: Vec2,
    pub launch_velocity: Vec2,
    /// Random spread added to the launch velocity's x component
    #[serde(default)]
    pub launch_jitter: f32,
    /// Seconds of protection granted by ball-save awards
    #[serde(default = "default_ball_save_secs")]
    pub ball_save_secs: f32,
    pub elements: Vec<ElementDescriptor>,
}

impl FieldLayout {
    /// Table with no elements, used before the first level is loaded
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            width: 20.0,
            height: 30.0,
            gravity: Vec2::new(0.0, -6.0),
            balls_per_game: DEFAULT_BALLS_PER_GAME,
            ball_radius: 0.45,
            launch_position: Vec2::new(10.0, 15.0),
            launch_velocity: Vec2::ZERO,
            launch_jitter: 0.0,
            ball_save_secs: 0.0,
            elements: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let layout: FieldLayout = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<()> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(Error::InvalidLayout(format!(
                "{}: table size must be positive",
                self.name
            )));
        }
        if !(self.ball_radius > 0.0 && self.ball_radius.is_finite()) {
            return Err(Error::InvalidLayout(format!(
                "{}: ball radius must be positive",
                self.name
            )));
        }
        if !self.launch_jitter.is_finite() {
            return Err(Error::InvalidLayout(format!(
                "{}: launch jitter must be finite",
                self.name
            )));
        }
        self.check_delay("ball save", self.ball_save_secs)?;
        for element in &self.elements {
            if let ElementDescriptor::DropTargetGroup(g) = element {
                self.check_delay("drop target reset delay", g.reset_delay)?;
            }
            let empty_group = match element {
                ElementDescriptor::DropTargetGroup(g) => g.targets.is_empty(),
                ElementDescriptor::RolloverGroup(g) => g.centers.is_empty(),
                _ => false,
            };
            if empty_group {
                return Err(Error::InvalidLayout(format!(
                    "{}: element groups need at least one member",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn check_delay(&self, what: &str, secs: f32) -> Result<()> {
        if (0.0..=MAX_DELAY_SECS).contains(&secs) {
            return Ok(());
        }
        Err(Error::InvalidLayout(format!(
            "{}: {} must be between 0 and {} seconds, got {}",
            self.name, what, MAX_DELAY_SECS, secs
        )))
    }
}

/// Seconds from a layout as a duration; out-of-range values become zero
pub(crate) fn secs_to_duration(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or_else(|e| {
        log::warn!("Ignoring delay of {} seconds: {}", secs, e);
        Duration::ZERO
    })
}

/// Produces table layouts by 1-based level number
pub trait LayoutSource: Send + Sync {
    fn level_count(&self) -> u32;
    fn load(&self, level: u32) -> Result<FieldLayout>;
}

const BUILTIN_TABLES: &[&str] = &[
    include_str!("../../tables/table1.json"),
    include_str!("../../tables/table2.json"),
];

/// Tables shipped with the game
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLayouts;

impl LayoutSource for BuiltinLayouts {
    fn level_count(&self) -> u32 {
        BUILTIN_TABLES.len() as u32
    }

    fn load(&self, level: u32) -> Result<FieldLayout> {
        let json = level
            .checked_sub(1)
            .and_then(|i| BUILTIN_TABLES.get(i as usize))
            .ok_or(Error::UnknownLevel {
                level,
                available: self.level_count(),
            })?;
        FieldLayout::from_json(json)
    }
}

fn default_wall_radius() -> f32 {
    0.05
}
fn default_flipper_radius() -> f32 {
    0.2
}
fn default_flipper_up_speed() -> f32 {
    24.0
}
fn default_flipper_down_speed() -> f32 {
    12.0
}
fn default_bumper_points() -> u64 {
    100
}
fn default_bumper_kick() -> f32 {
    4.0
}
fn default_target_radius() -> f32 {
    0.1
}
fn default_reset_delay() -> f32 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_multiplier_increment() -> f64 {
    1.0
}
fn default_extra_balls() -> u32 {
    2
}
fn default_balls_per_game() -> u32 {
    DEFAULT_BALLS_PER_GAME
}
fn default_ball_save_secs() -> f32 {
    10.0
}
