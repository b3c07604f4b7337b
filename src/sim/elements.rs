//! Field elements
//!
//! Every element owns one or more bodies in the world and reacts when a ball
//! starts touching one of them. Reactions are looked up in a table keyed by
//! the element's tag and run synchronously while the field drains the
//! contact queue after each physics step, in the order contacts were
//! reported.

use std::time::Duration;

use glam::Vec2;

use super::geometry::closest_point_on_segment;
use super::layout::{
    BumperDesc, DropTargetGroupDesc, ElementDescriptor, FlipperDesc, FlipperSide,
    MultiballTriggerDesc, RolloverGroupDesc, SensorAction, SensorDesc, SensorShape, WallDesc,
    secs_to_duration,
};
use super::physics::{BodyDef, BodyId, BodyKind, JointId, Shape, World};
use super::state::{GameEvent, GameState};
use crate::audio::{AudioPlayer, SoundEvent};

/// Flippers outweigh the ball so contacts barely slow the motor
const FLIPPER_MASS: f32 = 5.0;

/// Identifies an element within the current layout (its index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub u32);

/// Element kind without its data; indexes the reaction table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementTag {
    Wall,
    Flipper,
    Bumper,
    DropTargetGroup,
    RolloverGroup,
    Sensor,
    MultiballTrigger,
}

impl ElementTag {
    pub const COUNT: usize = 7;
}

#[derive(Debug, Clone)]
pub struct Wall {
    pub body: BodyId,
    pub start: Vec2,
    pub end: Vec2,
    pub kick: f32,
    pub points: u64,
}

#[derive(Debug, Clone)]
pub struct Flipper {
    pub body: BodyId,
    pub joint: JointId,
    pub side: FlipperSide,
    pub up_speed: f32,
    pub down_speed: f32,
    /// +1 when raising increases the angle, -1 otherwise
    direction: f32,
    engaged: bool,
}

impl Flipper {
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Returns true on the press edge
    pub fn set_engaged(&mut self, engaged: bool) -> bool {
        let pressed = engaged && !self.engaged;
        self.engaged = engaged;
        pressed
    }

    /// Signed joint motor speed for the current input
    pub fn motor_speed(&self) -> f32 {
        if self.engaged {
            self.direction * self.up_speed
        } else {
            -self.direction * self.down_speed
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bumper {
    pub body: BodyId,
    pub center: Vec2,
    pub points: u64,
    pub kick: f32,
}

#[derive(Debug, Clone)]
pub struct DropTargetGroup {
    pub bodies: Vec<BodyId>,
    down: Vec<bool>,
    pub points: u64,
    pub completion_points: u64,
    pub reset_delay: Duration,
    pub ball_save: bool,
    /// Completion indicator, on until the group resets
    lit: bool,
}

impl DropTargetGroup {
    pub fn is_down(&self, index: usize) -> bool {
        self.down.get(index).copied().unwrap_or(false)
    }

    pub fn all_down(&self) -> bool {
        self.down.iter().all(|d| *d)
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Raise every target again
    pub fn reset(&mut self, world: &mut World) {
        for (body, down) in self.bodies.iter().zip(self.down.iter_mut()) {
            *down = false;
            world.set_enabled(*body, true);
        }
        self.lit = false;
    }
}

#[derive(Debug, Clone)]
pub struct RolloverGroup {
    pub bodies: Vec<BodyId>,
    lit: Vec<bool>,
    pub points: u64,
    pub completion_points: u64,
    pub multiplier_increment: f64,
}

impl RolloverGroup {
    pub fn is_lit(&self, index: usize) -> bool {
        self.lit.get(index).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Sensor {
    pub body: BodyId,
    pub action: SensorAction,
}

#[derive(Debug, Clone)]
pub struct MultiballTrigger {
    pub body: BodyId,
    pub extra_balls: u32,
    pub points: u64,
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Wall(Wall),
    Flipper(Flipper),
    Bumper(Bumper),
    DropTargetGroup(DropTargetGroup),
    RolloverGroup(RolloverGroup),
    Sensor(Sensor),
    MultiballTrigger(MultiballTrigger),
}

/// An element placed on the table
#[derive(Debug, Clone)]
pub struct FieldElement {
    pub id: ElementId,
    pub kind: ElementKind,
}

/// Work a reaction hands back to the field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRequest {
    DrainBall(BodyId),
    StartMultiball { extra_balls: u32 },
    GrantBallSave,
    Schedule { delay: Duration, action: DelayedAction },
}

/// Actions run later on simulation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedAction {
    ResetDropTargets(ElementId),
}

/// Which element body a ball touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub body: BodyId,
    pub ball: BodyId,
}

/// Everything a reaction may touch
pub struct ReactionContext<'a> {
    pub world: &'a mut World,
    pub state: &'a mut GameState,
    pub audio: &'a dyn AudioPlayer,
    pub requests: &'a mut Vec<FieldRequest>,
    pub events: &'a mut Vec<GameEvent>,
}

pub type Reaction = fn(&mut ElementKind, ElementId, Hit, &mut ReactionContext<'_>);

/// Indexed by `ElementTag as usize`
const REACTIONS: [Reaction; ElementTag::COUNT] = [
    wall_hit,
    flipper_hit,
    bumper_hit,
    drop_target_hit,
    rollover_hit,
    sensor_hit,
    multiball_hit,
];

impl FieldElement {
    /// Create the element's bodies in `world`
    pub fn build(id: ElementId, desc: &ElementDescriptor, world: &mut World) -> Self {
        let kind = match desc {
            ElementDescriptor::Wall(d) => ElementKind::Wall(build_wall(id, d, world)),
            ElementDescriptor::Flipper(d) => ElementKind::Flipper(build_flipper(id, d, world)),
            ElementDescriptor::Bumper(d) => ElementKind::Bumper(build_bumper(id, d, world)),
            ElementDescriptor::DropTargetGroup(d) => {
                ElementKind::DropTargetGroup(build_drop_targets(id, d, world))
            }
            ElementDescriptor::RolloverGroup(d) => {
                ElementKind::RolloverGroup(build_rollovers(id, d, world))
            }
            ElementDescriptor::Sensor(d) => ElementKind::Sensor(build_sensor(id, d, world)),
            ElementDescriptor::MultiballTrigger(d) => {
                ElementKind::MultiballTrigger(build_multiball(id, d, world))
            }
        };
        Self { id, kind }
    }

    pub fn tag(&self) -> ElementTag {
        match self.kind {
            ElementKind::Wall(_) => ElementTag::Wall,
            ElementKind::Flipper(_) => ElementTag::Flipper,
            ElementKind::Bumper(_) => ElementTag::Bumper,
            ElementKind::DropTargetGroup(_) => ElementTag::DropTargetGroup,
            ElementKind::RolloverGroup(_) => ElementTag::RolloverGroup,
            ElementKind::Sensor(_) => ElementTag::Sensor,
            ElementKind::MultiballTrigger(_) => ElementTag::MultiballTrigger,
        }
    }

    /// Bodies owned by this element
    pub fn bodies(&self) -> Vec<BodyId> {
        match &self.kind {
            ElementKind::Wall(w) => vec![w.body],
            ElementKind::Flipper(f) => vec![f.body],
            ElementKind::Bumper(b) => vec![b.body],
            ElementKind::DropTargetGroup(g) => g.bodies.clone(),
            ElementKind::RolloverGroup(g) => g.bodies.clone(),
            ElementKind::Sensor(s) => vec![s.body],
            ElementKind::MultiballTrigger(m) => vec![m.body],
        }
    }

    /// Whether the body's light is on (lit rollovers, completed target groups)
    pub fn is_body_lit(&self, body: BodyId) -> bool {
        match &self.kind {
            ElementKind::RolloverGroup(g) => g
                .bodies
                .iter()
                .position(|b| *b == body)
                .is_some_and(|i| g.is_lit(i)),
            ElementKind::DropTargetGroup(g) => g.is_lit(),
            _ => false,
        }
    }

    /// Run this element's reaction to a ball contact
    pub fn react(&mut self, hit: Hit, ctx: &mut ReactionContext<'_>) {
        let reaction = REACTIONS[self.tag() as usize];
        reaction(&mut self.kind, self.id, hit, ctx);
    }
}

fn build_wall(id: ElementId, d: &WallDesc, world: &mut World) -> Wall {
    let body = world.create_body(
        BodyDef::new(BodyKind::Static, Vec2::ZERO)
            .with_shape(Shape::Segment { a: d.start, b: d.end, radius: d.radius })
            .with_restitution(d.restitution)
            .with_user_data(id),
    );
    Wall {
        body,
        start: d.start,
        end: d.end,
        kick: d.kick,
        points: d.points,
    }
}

fn build_flipper(id: ElementId, d: &FlipperDesc, world: &mut World) -> Flipper {
    let body = world.create_body(
        BodyDef::new(BodyKind::Hinged, d.pivot)
            .with_angle(d.rest_angle)
            .with_mass(FLIPPER_MASS)
            .with_shape(Shape::Segment {
                a: Vec2::ZERO,
                b: Vec2::new(d.length, 0.0),
                radius: d.radius,
            })
            .with_user_data(id),
    );
    // Joint limits are relative to the rest angle
    let swing = d.up_angle - d.rest_angle;
    let joint = world.create_revolute_joint(body, 0.0, swing);
    let direction = if swing >= 0.0 { 1.0 } else { -1.0 };
    let flipper = Flipper {
        body,
        joint,
        side: d.side,
        up_speed: d.up_speed,
        down_speed: d.down_speed,
        direction,
        engaged: false,
    };
    world.set_motor_speed(joint, flipper.motor_speed());
    flipper
}

fn build_bumper(id: ElementId, d: &BumperDesc, world: &mut World) -> Bumper {
    let body = world.create_body(
        BodyDef::new(BodyKind::Static, d.center)
            .with_shape(Shape::Circle { center: Vec2::ZERO, radius: d.radius })
            .with_user_data(id),
    );
    Bumper {
        body,
        center: d.center,
        points: d.points,
        kick: d.kick,
    }
}

fn build_drop_targets(id: ElementId, d: &DropTargetGroupDesc, world: &mut World) -> DropTargetGroup {
    let bodies: Vec<BodyId> = d
        .targets
        .iter()
        .map(|[a, b]| {
            world.create_body(
                BodyDef::new(BodyKind::Static, Vec2::ZERO)
                    .with_shape(Shape::Segment { a: *a, b: *b, radius: d.radius })
                    .with_user_data(id),
            )
        })
        .collect();
    DropTargetGroup {
        down: vec![false; bodies.len()],
        bodies,
        points: d.points,
        completion_points: d.completion_points,
        reset_delay: secs_to_duration(d.reset_delay),
        ball_save: d.ball_save,
        lit: false,
    }
}

fn build_rollovers(id: ElementId, d: &RolloverGroupDesc, world: &mut World) -> RolloverGroup {
    let bodies: Vec<BodyId> = d
        .centers
        .iter()
        .map(|center| {
            world.create_body(
                BodyDef::new(BodyKind::Static, *center)
                    .with_shape(Shape::Circle { center: Vec2::ZERO, radius: d.radius })
                    .with_user_data(id)
                    .sensor(),
            )
        })
        .collect();
    RolloverGroup {
        lit: vec![false; bodies.len()],
        bodies,
        points: d.points,
        completion_points: d.completion_points,
        multiplier_increment: d.multiplier_increment,
    }
}

fn build_sensor(id: ElementId, d: &SensorDesc, world: &mut World) -> Sensor {
    let shape = match d.geometry {
        SensorShape::Circle { center, radius } => Shape::Circle { center, radius },
        SensorShape::Segment { start, end, radius } => Shape::Segment { a: start, b: end, radius },
    };
    let body = world.create_body(
        BodyDef::new(BodyKind::Static, Vec2::ZERO)
            .with_shape(shape)
            .with_user_data(id)
            .sensor(),
    );
    Sensor { body, action: d.action }
}

fn build_multiball(id: ElementId, d: &MultiballTriggerDesc, world: &mut World) -> MultiballTrigger {
    let body = world.create_body(
        BodyDef::new(BodyKind::Static, d.center)
            .with_shape(Shape::Circle { center: Vec2::ZERO, radius: d.radius })
            .with_user_data(id)
            .sensor(),
    );
    MultiballTrigger {
        body,
        extra_balls: d.extra_balls,
        points: d.points,
    }
}

fn wall_hit(kind: &mut ElementKind, _id: ElementId, hit: Hit, ctx: &mut ReactionContext<'_>) {
    let ElementKind::Wall(wall) = kind else { return };
    ctx.state.add_score(wall.points);
    if wall.kick <= 0.0 {
        return;
    }
    let Some(ball_pos) = ctx.world.body(hit.ball).map(|b| b.position()) else {
        return;
    };
    let closest = closest_point_on_segment(ball_pos, wall.start, wall.end);
    let away = (ball_pos - closest).normalize_or_zero();
    ctx.world.apply_linear_impulse(hit.ball, away * wall.kick);
    ctx.audio.play(SoundEvent::Kicker);
}

/// Flippers act purely through physics
fn flipper_hit(_kind: &mut ElementKind, _id: ElementId, _hit: Hit, _ctx: &mut ReactionContext<'_>) {}

fn bumper_hit(kind: &mut ElementKind, _id: ElementId, hit: Hit, ctx: &mut ReactionContext<'_>) {
    let ElementKind::Bumper(bumper) = kind else { return };
    ctx.state.add_score(bumper.points);
    if let Some(ball_pos) = ctx.world.body(hit.ball).map(|b| b.position()) {
        let away = (ball_pos - bumper.center).normalize_or_zero();
        ctx.world.apply_linear_impulse(hit.ball, away * bumper.kick);
    }
    ctx.audio.play(SoundEvent::Bumper);
}

fn drop_target_hit(kind: &mut ElementKind, id: ElementId, hit: Hit, ctx: &mut ReactionContext<'_>) {
    let ElementKind::DropTargetGroup(group) = kind else { return };
    let Some(index) = group.bodies.iter().position(|b| *b == hit.body) else {
        return;
    };
    if group.down[index] {
        return;
    }

    group.down[index] = true;
    ctx.world.set_enabled(hit.body, false);
    ctx.state.add_score(group.points);
    ctx.audio.play(SoundEvent::DropTarget);

    if !group.all_down() {
        return;
    }
    group.lit = true;
    ctx.state.add_score(group.completion_points);
    ctx.audio.play(SoundEvent::DropTargetGroupComplete);
    ctx.events.push(GameEvent::DropTargetGroupCompleted { element: id });
    if group.ball_save {
        ctx.requests.push(FieldRequest::GrantBallSave);
    }
    ctx.requests.push(FieldRequest::Schedule {
        delay: group.reset_delay,
        action: DelayedAction::ResetDropTargets(id),
    });
}

fn rollover_hit(kind: &mut ElementKind, id: ElementId, hit: Hit, ctx: &mut ReactionContext<'_>) {
    let ElementKind::RolloverGroup(group) = kind else { return };
    let Some(index) = group.bodies.iter().position(|b| *b == hit.body) else {
        return;
    };
    if group.lit[index] {
        return;
    }

    group.lit[index] = true;
    ctx.state.add_score(group.points);
    ctx.audio.play(SoundEvent::Rollover);

    if !group.lit.iter().all(|l| *l) {
        return;
    }
    ctx.state.increment_multiplier(group.multiplier_increment);
    ctx.state.add_score(group.completion_points);
    group.lit.iter_mut().for_each(|l| *l = false);
    ctx.audio.play(SoundEvent::RolloverGroupComplete);
    ctx.events.push(GameEvent::RolloverGroupCompleted {
        element: id,
        multiplier: ctx.state.multiplier(),
    });
}

fn sensor_hit(kind: &mut ElementKind, _id: ElementId, hit: Hit, ctx: &mut ReactionContext<'_>) {
    let ElementKind::Sensor(sensor) = kind else { return };
    match sensor.action {
        SensorAction::Drain => ctx.requests.push(FieldRequest::DrainBall(hit.ball)),
        SensorAction::Score { points } => {
            ctx.state.add_score(points);
        }
    }
}

fn multiball_hit(kind: &mut ElementKind, _id: ElementId, _hit: Hit, ctx: &mut ReactionContext<'_>) {
    let ElementKind::MultiballTrigger(trigger) = kind else { return };
    ctx.state.add_score(trigger.points);
    ctx.requests.push(FieldRequest::StartMultiball {
        extra_balls: trigger.extra_balls,
    });
}
