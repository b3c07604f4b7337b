//! 2D rigid-body world
//!
//! A thin adapter over rapier2d that speaks the table's vocabulary. Balls
//! are dynamic circles; walls, targets and sensors are fixed. Flippers are
//! hinged bodies held to a fixed anchor by a revolute joint whose motor
//! drives them between the joint limits. Hinged bodies only collide with
//! balls.
//!
//! `step` must always be called with the same delta. Each collider carries
//! its body id and element id in `user_data`, so contact begin/end events
//! come out already tagged; they are stamped with the world's epoch and
//! drained by the owner once the step is done.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use glam::Vec2;
use rapier2d::crossbeam::channel::{Receiver, unbounded};
use rapier2d::prelude::*;

use super::elements::ElementId;
use super::geometry::WorldShape;
use crate::consts::{POSITION_ITERATIONS, SIM_STEP, VELOCITY_ITERATIONS};

/// Collision group of balls
const BALLS: Group = Group::GROUP_1;
/// Collision group of everything else; only ever meets balls
const TABLE: Group = Group::GROUP_2;
/// Motor velocity gain; large values track the target speed closely
const MOTOR_DAMPING: Real = 1.0e3;
const MOTOR_MAX_FORCE: Real = 1.0e5;

/// Handle to a body; never reused within a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub u32);

/// Handle to a joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Never moves
    Static,
    /// Driven by a joint motor, ignores gravity, collides with balls only
    Hinged,
    /// Affected by gravity and contacts
    Dynamic,
}

/// Shape in body-local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { center: Vec2, radius: f32 },
    /// Capsule around the segment `a`-`b`
    Segment { a: Vec2, b: Vec2, radius: f32 },
}

/// Everything needed to create a body
#[derive(Debug, Clone)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub mass: f32,
    pub restitution: f32,
    /// Sensors report contacts but never push back
    pub sensor: bool,
    pub user_data: Option<ElementId>,
    pub shapes: Vec<Shape>,
}

impl BodyDef {
    pub fn new(kind: BodyKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            mass: 1.0,
            restitution: 0.0,
            sensor: false,
            user_data: None,
            shapes: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn with_user_data(mut self, id: ElementId) -> Self {
        self.user_data = Some(id);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }
}

/// Per-body bookkeeping kept next to the rapier body
#[derive(Debug, Clone)]
struct Entry {
    handle: RigidBodyHandle,
    kind: BodyKind,
    sensor: bool,
    user_data: Option<ElementId>,
    shapes: Vec<Shape>,
}

/// Read-only view of a live body
#[derive(Clone, Copy)]
pub struct Body<'a> {
    entry: &'a Entry,
    rigid: &'a RigidBody,
}

impl<'a> Body<'a> {
    pub fn kind(&self) -> BodyKind {
        self.entry.kind
    }

    pub fn position(&self) -> Vec2 {
        from_vector(self.rigid.translation())
    }

    pub fn angle(&self) -> f32 {
        self.rigid.rotation().angle()
    }

    pub fn linear_velocity(&self) -> Vec2 {
        from_vector(self.rigid.linvel())
    }

    pub fn angular_velocity(&self) -> f32 {
        self.rigid.angvel()
    }

    /// Disabled bodies take no part in collision
    pub fn is_enabled(&self) -> bool {
        self.rigid.is_enabled()
    }

    pub fn is_sensor(&self) -> bool {
        self.entry.sensor
    }

    pub fn user_data(&self) -> Option<ElementId> {
        self.entry.user_data
    }

    pub fn shapes(&self) -> &'a [Shape] {
        &self.entry.shapes
    }

    /// Transform a body-local point to world space
    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.position() + Vec2::from_angle(self.angle()).rotate(local)
    }

    /// Shapes placed at the body's current transform
    pub fn world_shapes(&self) -> impl Iterator<Item = WorldShape> + 'a {
        let body = *self;
        self.entry.shapes.iter().map(move |shape| match *shape {
            Shape::Circle { center, radius } => WorldShape::Circle {
                center: body.world_point(center),
                radius,
            },
            Shape::Segment { a, b, radius } => WorldShape::Segment {
                a: body.world_point(a),
                b: body.world_point(b),
                radius,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Begin,
    End,
}

/// Contact notification carrying both bodies' user data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    /// Epoch of the world that produced the event
    pub world: u32,
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub user_a: Option<ElementId>,
    pub user_b: Option<ElementId>,
}

/// The physics world owned by a field
pub struct World {
    epoch: u32,
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    collector: ChannelEventCollector,
    collisions: Receiver<CollisionEvent>,
    entries: Vec<Option<Entry>>,
    joints: Vec<Option<ImpulseJointHandle>>,
    /// Touching body pairs and how many collider pairs touch
    touching: BTreeMap<(BodyId, BodyId), u32>,
    events: Vec<ContactEvent>,
    steps: u64,
}

impl World {
    pub fn new(gravity: Vec2, epoch: u32) -> Self {
        let (collision_send, collisions) = unbounded();
        // Contact force events are never enabled on any collider
        let (force_send, _) = unbounded();
        let params = IntegrationParameters {
            dt: SIM_STEP.as_secs_f32(),
            num_solver_iterations: NonZeroUsize::new(VELOCITY_ITERATIONS as usize)
                .unwrap_or(NonZeroUsize::MIN),
            num_internal_stabilization_iterations: POSITION_ITERATIONS as usize,
            ..IntegrationParameters::default()
        };

        Self {
            epoch,
            gravity: to_vector(gravity),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            collector: ChannelEventCollector::new(collision_send, force_send),
            collisions,
            entries: Vec::new(),
            joints: Vec::new(),
            touching: BTreeMap::new(),
            events: Vec::new(),
            steps: 0,
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Number of completed steps
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    pub fn create_body(&mut self, def: BodyDef) -> BodyId {
        let id = BodyId(self.entries.len() as u32);
        let builder = match def.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Hinged => RigidBodyBuilder::dynamic().gravity_scale(0.0).can_sleep(false),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic().ccd_enabled(true).can_sleep(false),
        };
        let rigid = builder
            .translation(to_vector(def.position))
            .rotation(def.angle)
            .linvel(to_vector(def.linear_velocity))
            .build();
        let handle = self.rigid_bodies.insert(rigid);

        let groups = match def.kind {
            BodyKind::Dynamic => InteractionGroups::new(BALLS, Group::ALL),
            BodyKind::Static | BodyKind::Hinged => InteractionGroups::new(TABLE, BALLS),
        };
        let shape_mass = def.mass / def.shapes.len().max(1) as f32;
        for shape in &def.shapes {
            let builder = match *shape {
                Shape::Circle { center, radius } => {
                    ColliderBuilder::ball(radius).translation(to_vector(center))
                }
                Shape::Segment { a, b, radius } => {
                    ColliderBuilder::new(SharedShape::capsule(to_point(a), to_point(b), radius))
                }
            };
            let collider = builder
                .sensor(def.sensor)
                .restitution(def.restitution)
                .restitution_combine_rule(CoefficientCombineRule::Max)
                .collision_groups(groups)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .mass(shape_mass)
                .user_data(pack_user_data(id, def.user_data))
                .build();
            self.colliders.insert_with_parent(collider, handle, &mut self.rigid_bodies);
        }

        self.entries.push(Some(Entry {
            handle,
            kind: def.kind,
            sensor: def.sensor,
            user_data: def.user_data,
            shapes: def.shapes,
        }));
        id
    }

    /// Remove a body; its contacts disappear without end events
    pub fn destroy_body(&mut self, id: BodyId) -> bool {
        let Some(entry) = self.entries.get_mut(id.0 as usize).and_then(Option::take) else {
            return false;
        };
        self.rigid_bodies.remove(
            entry.handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.forget_contacts(id);
        true
    }

    pub fn body(&self, id: BodyId) -> Option<Body<'_>> {
        let entry = self.entries.get(id.0 as usize)?.as_ref()?;
        let rigid = self.rigid_bodies.get(entry.handle)?;
        Some(Body { entry, rigid })
    }

    /// Live bodies in creation order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, Body<'_>)> {
        self.entries.iter().enumerate().filter_map(|(i, entry)| {
            let entry = entry.as_ref()?;
            let rigid = self.rigid_bodies.get(entry.handle)?;
            Some((BodyId(i as u32), Body { entry, rigid }))
        })
    }

    fn rigid_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        let handle = self.entries.get(id.0 as usize)?.as_ref()?.handle;
        self.rigid_bodies.get_mut(handle)
    }

    /// Disabling a body drops its contacts without end events
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) {
        let Some(rigid) = self.rigid_mut(id) else { return };
        rigid.set_enabled(enabled);
        if !enabled {
            self.forget_contacts(id);
        }
    }

    pub fn set_position(&mut self, id: BodyId, position: Vec2) {
        if let Some(rigid) = self.rigid_mut(id) {
            rigid.set_translation(to_vector(position), true);
        }
    }

    pub fn apply_linear_impulse(&mut self, id: BodyId, impulse: Vec2) {
        if let Some(rigid) = self.rigid_mut(id) {
            rigid.apply_impulse(to_vector(impulse), true);
        }
    }

    /// Hinge `body` at its origin to a fixed anchor.
    ///
    /// Limits are angles relative to the body's angle when the joint is
    /// created. The motor starts at rest.
    pub fn create_revolute_joint(&mut self, body: BodyId, lower: f32, upper: f32) -> JointId {
        let id = JointId(self.joints.len() as u32);
        let target = self
            .entries
            .get(body.0 as usize)
            .and_then(Option::as_ref)
            .and_then(|entry| {
                let rigid = self.rigid_bodies.get(entry.handle)?;
                Some((entry.handle, *rigid.position()))
            });
        let Some((handle, pose)) = target else {
            log::warn!("Revolute joint on missing body {:?}", body);
            self.joints.push(None);
            return id;
        };

        let anchor = self.rigid_bodies.insert(RigidBodyBuilder::fixed().position(pose).build());
        let joint = RevoluteJointBuilder::new()
            .limits([lower.min(upper), lower.max(upper)])
            .motor_velocity(0.0, MOTOR_DAMPING)
            .motor_max_force(MOTOR_MAX_FORCE);
        self.joints.push(Some(self.impulse_joints.insert(anchor, handle, joint, true)));
        id
    }

    /// Angular speed the joint motor drives toward (radians/sec, signed)
    pub fn set_motor_speed(&mut self, id: JointId, speed: f32) {
        let Some(handle) = self.joints.get(id.0 as usize).copied().flatten() else {
            return;
        };
        if let Some(joint) = self.impulse_joints.get_mut(handle) {
            joint.data.set_motor_velocity(JointAxis::AngX, speed, MOTOR_DAMPING);
        }
    }

    /// Events recorded since the last drain, in the order they were detected
    pub fn drain_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether two bodies were touching at the end of the last step
    pub fn is_touching(&self, a: BodyId, b: BodyId) -> bool {
        self.touching.contains_key(&ordered(a, b))
    }

    /// Advance the simulation by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &self.collector,
        );
        self.collect_events();
        self.steps += 1;
    }

    /// Fold collider-pair events into body-pair begin/end events
    fn collect_events(&mut self) {
        while let Ok(event) = self.collisions.try_recv() {
            // Colliders removed this step can't be attributed to a body
            let (Some(first), Some(second)) =
                (self.colliders.get(event.collider1()), self.colliders.get(event.collider2()))
            else {
                continue;
            };
            let (body_1, user_1) = unpack_user_data(first.user_data);
            let (body_2, user_2) = unpack_user_data(second.user_data);
            if body_1 == body_2 {
                continue;
            }
            let (a, user_a, b, user_b) = if body_1 < body_2 {
                (body_1, user_1, body_2, user_2)
            } else {
                (body_2, user_2, body_1, user_1)
            };

            let phase = if event.started() {
                let count = self.touching.entry((a, b)).or_insert(0);
                *count += 1;
                if *count > 1 {
                    continue;
                }
                ContactPhase::Begin
            } else {
                let Some(count) = self.touching.get_mut(&(a, b)) else {
                    continue;
                };
                *count -= 1;
                if *count > 0 {
                    continue;
                }
                self.touching.remove(&(a, b));
                ContactPhase::End
            };

            let event = ContactEvent {
                phase,
                world: self.epoch,
                body_a: a,
                body_b: b,
                user_a,
                user_b,
            };
            log::trace!("contact {:?}", event);
            self.events.push(event);
        }
    }

    fn forget_contacts(&mut self, id: BodyId) {
        self.touching.retain(|&(a, b), _| a != id && b != id);
    }
}

fn ordered(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Body id in the low 32 bits, element id + 1 above it (0 for none)
fn pack_user_data(body: BodyId, element: Option<ElementId>) -> u128 {
    let element = element.map_or(0, |e| u128::from(e.0) + 1);
    u128::from(body.0) | (element << 32)
}

fn unpack_user_data(data: u128) -> (BodyId, Option<ElementId>) {
    let body = BodyId(data as u32);
    let element = ((data >> 32) as u64).checked_sub(1).map(|e| ElementId(e as u32));
    (body, element)
}

fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn to_point(v: Vec2) -> Point<Real> {
    point![v.x, v.y]
}

fn from_vector(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 120.0;

    fn ball_def(position: Vec2) -> BodyDef {
        BodyDef::new(BodyKind::Dynamic, position).with_shape(Shape::Circle {
            center: Vec2::ZERO,
            radius: 0.5,
        })
    }

    fn floor_def(user: u32) -> BodyDef {
        BodyDef::new(BodyKind::Static, Vec2::ZERO)
            .with_shape(Shape::Segment {
                a: Vec2::new(-10.0, 0.0),
                b: Vec2::new(10.0, 0.0),
                radius: 0.1,
            })
            .with_user_data(ElementId(user))
    }

    fn flipper_def() -> BodyDef {
        BodyDef::new(BodyKind::Hinged, Vec2::ZERO).with_shape(Shape::Segment {
            a: Vec2::ZERO,
            b: Vec2::new(2.0, 0.0),
            radius: 0.2,
        })
    }

    fn begins(events: &[ContactEvent]) -> Vec<ContactEvent> {
        events
            .iter()
            .filter(|e| e.phase == ContactPhase::Begin)
            .copied()
            .collect()
    }

    #[test]
    fn test_user_data_packing() {
        assert_eq!(unpack_user_data(pack_user_data(BodyId(3), None)), (BodyId(3), None));
        assert_eq!(
            unpack_user_data(pack_user_data(BodyId(u32::MAX), Some(ElementId(0)))),
            (BodyId(u32::MAX), Some(ElementId(0)))
        );
        assert_eq!(
            unpack_user_data(pack_user_data(BodyId(0), Some(ElementId(u32::MAX)))),
            (BodyId(0), Some(ElementId(u32::MAX)))
        );
    }

    #[test]
    fn test_gravity_accelerates_dynamic_bodies_only() {
        let mut world = World::new(Vec2::new(0.0, -10.0), 0);
        let ball = world.create_body(ball_def(Vec2::new(0.0, 5.0)));
        let wall = world.create_body(floor_def(1));
        let flipper = world.create_body(flipper_def().with_angle(0.3));
        world.create_revolute_joint(flipper, 0.0, 0.5);

        world.step(DT);

        assert!(world.body(ball).unwrap().linear_velocity().y < 0.0);
        assert_eq!(world.body(wall).unwrap().position(), Vec2::ZERO);
        assert!(world.body(flipper).unwrap().position().length() < 1e-3);
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_ball_rests_on_floor() {
        let mut world = World::new(Vec2::new(0.0, -10.0), 0);
        let ball = world.create_body(ball_def(Vec2::new(0.0, 2.0)));
        world.create_body(floor_def(1));

        for _ in 0..600 {
            world.step(DT);
        }

        let body = world.body(ball).unwrap();
        // Resting on top of the floor capsule (radius 0.1 + ball radius 0.5)
        let y = body.position().y;
        assert!((y - 0.6).abs() < 0.05, "y = {}", y);
        assert!(body.linear_velocity().y.abs() < 0.5);
    }

    #[test]
    fn test_contact_begin_and_end_events() {
        let mut world = World::new(Vec2::ZERO, 7);
        let wall = world.create_body(floor_def(3));
        let ball = world.create_body(ball_def(Vec2::new(0.0, 0.55)));

        world.step(DT);
        let events = world.drain_events();
        let started = begins(&events);
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].world, 7);
        assert_eq!((started[0].body_a, started[0].body_b), (wall, ball));
        assert_eq!(started[0].user_a, Some(ElementId(3)));
        assert_eq!(started[0].user_b, None);
        assert!(world.is_touching(ball, wall));

        // Move away and the contact ends
        world.set_position(ball, Vec2::new(0.0, 5.0));
        world.step(DT);
        let events = world.drain_events();
        assert!(events.iter().any(|e| e.phase == ContactPhase::End && e.body_b == ball));
        assert!(!world.is_touching(ball, wall));
        assert!(world.drain_events().is_empty());
    }

    #[test]
    fn test_sensor_reports_without_response() {
        let mut world = World::new(Vec2::ZERO, 0);
        let sensor = world.create_body(
            BodyDef::new(BodyKind::Static, Vec2::ZERO)
                .with_shape(Shape::Circle { center: Vec2::ZERO, radius: 1.0 })
                .with_user_data(ElementId(0))
                .sensor(),
        );
        let ball = world.create_body(ball_def(Vec2::new(-1.0, 0.0)).with_velocity(Vec2::new(6.0, 0.0)));

        world.step(DT);

        let started = begins(&world.drain_events());
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].user_a, Some(ElementId(0)));
        assert!(world.body(sensor).unwrap().is_sensor());
        let body = world.body(ball).unwrap();
        assert!((body.linear_velocity().x - 6.0).abs() < 1e-3);
    }

    #[test]
    fn test_disabled_body_is_ignored() {
        let mut world = World::new(Vec2::ZERO, 0);
        let wall = world.create_body(floor_def(0));
        world.set_enabled(wall, false);
        assert!(!world.body(wall).unwrap().is_enabled());
        let ball = world.create_body(ball_def(Vec2::new(0.0, 0.3)).with_velocity(Vec2::new(0.0, -3.0)));

        world.step(DT);

        assert!(begins(&world.drain_events()).is_empty());
        assert!(world.body(ball).unwrap().linear_velocity().y < -2.9);
    }

    #[test]
    fn test_reenabled_body_reports_again() {
        let mut world = World::new(Vec2::ZERO, 0);
        let wall = world.create_body(floor_def(0));
        let ball = world.create_body(ball_def(Vec2::new(0.0, 0.55)));
        world.step(DT);
        assert_eq!(begins(&world.drain_events()).len(), 1);

        world.set_enabled(wall, false);
        assert!(!world.is_touching(wall, ball));
        world.step(DT);
        world.drain_events();

        world.set_enabled(wall, true);
        world.set_position(ball, Vec2::new(0.0, 0.55));
        world.step(DT);
        assert_eq!(begins(&world.drain_events()).len(), 1);
    }

    #[test]
    fn test_restitution_bounces_ball() {
        let mut world = World::new(Vec2::ZERO, 0);
        world.create_body(floor_def(0).with_restitution(1.0));
        let ball = world.create_body(ball_def(Vec2::new(0.0, 0.7)).with_velocity(Vec2::new(0.0, -10.0)));

        for _ in 0..6 {
            world.step(DT);
        }

        let v = world.body(ball).unwrap().linear_velocity();
        assert!(v.y > 8.0, "vy = {}", v.y);
    }

    #[test]
    fn test_impulse_changes_velocity_by_mass() {
        let mut world = World::new(Vec2::ZERO, 0);
        let light = world.create_body(ball_def(Vec2::ZERO));
        let heavy = world.create_body(ball_def(Vec2::new(5.0, 0.0)).with_mass(4.0));

        world.apply_linear_impulse(light, Vec2::new(2.0, 0.0));
        world.apply_linear_impulse(heavy, Vec2::new(2.0, 0.0));

        assert!((world.body(light).unwrap().linear_velocity().x - 2.0).abs() < 1e-3);
        assert!((world.body(heavy).unwrap().linear_velocity().x - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_revolute_joint_motor_respects_limits() {
        let mut world = World::new(Vec2::ZERO, 0);
        let flipper = world.create_body(flipper_def());
        let joint = world.create_revolute_joint(flipper, -0.5, 0.5);
        world.set_motor_speed(joint, 20.0);

        for _ in 0..60 {
            world.step(DT);
        }
        let body = world.body(flipper).unwrap();
        assert!((body.angle() - 0.5).abs() < 0.05, "angle = {}", body.angle());
        assert!(body.angular_velocity().abs() < 1.0);

        world.set_motor_speed(joint, -20.0);
        for _ in 0..60 {
            world.step(DT);
        }
        let angle = world.body(flipper).unwrap().angle();
        assert!((angle + 0.5).abs() < 0.05, "angle = {}", angle);
    }

    #[test]
    fn test_joint_limits_follow_initial_angle() {
        // Rest angle past pi, where absolute angles wrap
        let mut world = World::new(Vec2::ZERO, 0);
        let flipper = world.create_body(flipper_def().with_angle(3.6));
        let joint = world.create_revolute_joint(flipper, -0.9, 0.0);
        world.set_motor_speed(joint, -20.0);

        for _ in 0..60 {
            world.step(DT);
        }
        let tip = world.body(flipper).unwrap().world_point(Vec2::new(2.0, 0.0));
        let expected = Vec2::from_angle(2.7) * 2.0;
        assert!(tip.distance(expected) < 0.1, "tip = {}", tip);
    }

    #[test]
    fn test_moving_flipper_launches_ball() {
        let mut world = World::new(Vec2::ZERO, 0);
        let flipper = world.create_body(flipper_def());
        let joint = world.create_revolute_joint(flipper, -0.5, 0.5);
        world.set_motor_speed(joint, 15.0);
        let ball = world.create_body(ball_def(Vec2::new(1.5, 0.71)));

        for _ in 0..8 {
            world.step(DT);
        }

        assert!(world.body(ball).unwrap().linear_velocity().y > 3.0);
    }

    #[test]
    fn test_hinged_bodies_ignore_table() {
        let mut world = World::new(Vec2::ZERO, 0);
        let wall = world.create_body(floor_def(0));
        let flipper = world.create_body(flipper_def().with_angle(0.0));
        world.create_revolute_joint(flipper, -0.5, 0.5);

        world.step(DT);

        assert!(world.drain_events().is_empty());
        assert!(!world.is_touching(wall, flipper));
    }

    #[test]
    fn test_destroyed_body_is_gone() {
        let mut world = World::new(Vec2::ZERO, 0);
        let wall = world.create_body(floor_def(0));
        let ball = world.create_body(ball_def(Vec2::new(0.0, 0.55)));
        world.step(DT);
        assert!(world.is_touching(wall, ball));

        assert!(world.destroy_body(ball));
        assert!(world.body(ball).is_none());
        assert!(!world.is_touching(wall, ball));
        assert!(!world.destroy_body(ball));
        assert_eq!(world.bodies().count(), 1);

        // Removal never surfaces as an end event
        world.step(DT);
        assert!(world.drain_events().is_empty());
    }
}
