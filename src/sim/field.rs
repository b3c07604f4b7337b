//! The playfield
//!
//! Owns the physics world, the elements built from the current layout and
//! the game state. Everything that changes the score happens inside `tick`,
//! which consumes wall-clock time in fixed-size physics steps and carries
//! the remainder to the next call.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::elements::{
    DelayedAction, ElementId, ElementKind, FieldElement, FieldRequest, Hit, ReactionContext,
};
use super::layout::{FieldLayout, FlipperSide, LayoutSource, secs_to_duration};
use super::physics::{BodyDef, BodyId, BodyKind, ContactPhase, Shape, World};
use super::state::{GameEvent, GamePhase, GameState};
use crate::audio::{AudioPlayer, SoundEvent};
use crate::consts::SIM_STEP;
use crate::error::{Error, Result};

/// Most time a single tick will simulate; the rest is dropped
const MAX_TICK_DELTA: Duration = Duration::from_secs(1);

/// Action waiting for simulation time to reach `due`
#[derive(Debug, Clone, Copy)]
struct Scheduled {
    due: Duration,
    action: DelayedAction,
}

pub struct Field {
    audio: Arc<dyn AudioPlayer>,
    layout: FieldLayout,
    level: Option<u32>,
    world: World,
    elements: Vec<FieldElement>,
    state: GameState,
    /// Balls in play, oldest first
    balls: Vec<BodyId>,
    multiball: bool,
    ball_save_until: Option<Duration>,
    /// Unconsumed time, always shorter than one step
    accumulator: Duration,
    /// Simulation time since the last reset
    sim_time: Duration,
    scheduled: Vec<Scheduled>,
    requests: Vec<FieldRequest>,
    events: Vec<GameEvent>,
    seed: u64,
    games_started: u64,
    rng: Pcg32,
}

impl Field {
    pub fn new(audio: Arc<dyn AudioPlayer>) -> Self {
        Self::with_seed(audio, 0)
    }

    /// Field whose launch jitter is derived from `seed`
    pub fn with_seed(audio: Arc<dyn AudioPlayer>, seed: u64) -> Self {
        audio.init();
        let layout = FieldLayout::empty();
        Self {
            audio,
            world: World::new(layout.gravity, 0),
            layout,
            level: None,
            elements: Vec::new(),
            state: GameState::new(),
            balls: Vec::new(),
            multiball: false,
            ball_save_until: None,
            accumulator: Duration::ZERO,
            sim_time: Duration::ZERO,
            scheduled: Vec::new(),
            requests: Vec::new(),
            events: Vec::new(),
            seed,
            games_started: 0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Tear down the world and build the table for `level`.
    ///
    /// On error the current table is left untouched.
    pub fn reset_for_level(&mut self, source: &dyn LayoutSource, level: u32) -> Result<()> {
        let layout = source.load(level)?;
        self.reset_with_layout(layout);
        self.level = Some(level);
        Ok(())
    }

    /// Replace the table with `layout`; the game returns to not started
    pub fn reset_with_layout(&mut self, layout: FieldLayout) {
        let epoch = self.world.epoch().wrapping_add(1);
        let mut world = World::new(layout.gravity, epoch);
        let elements = layout
            .elements
            .iter()
            .enumerate()
            .map(|(i, desc)| FieldElement::build(ElementId(i as u32), desc, &mut world))
            .collect();

        log::info!(
            "Loaded table '{}' with {} elements",
            layout.name,
            layout.elements.len()
        );

        self.world = world;
        self.elements = elements;
        self.layout = layout;
        self.level = None;
        self.state = GameState::new();
        self.balls.clear();
        self.multiball = false;
        self.ball_save_until = None;
        self.accumulator = Duration::ZERO;
        self.sim_time = Duration::ZERO;
        self.scheduled.clear();
        self.requests.clear();
        self.events.clear();
    }

    /// Start a game with the layout's ball count
    pub fn start_game(&mut self) -> Result<()> {
        self.begin(false)
    }

    /// Start a game that never ends by draining
    pub fn start_game_with_unlimited_balls(&mut self) -> Result<()> {
        self.begin(true)
    }

    fn begin(&mut self, unlimited_balls: bool) -> Result<()> {
        match self.state.phase() {
            GamePhase::NotStarted => {}
            GamePhase::Ended => return Err(Error::FieldNotReset),
            GamePhase::InProgress | GamePhase::Paused => return Err(Error::GameInProgress),
        }

        self.state.start_game(self.layout.balls_per_game, unlimited_balls);
        self.rng = Pcg32::seed_from_u64(self.seed.wrapping_add(self.games_started));
        self.games_started += 1;
        self.events.push(GameEvent::GameStarted { unlimited_balls });
        log::info!(
            "Game started on '{}' (unlimited balls: {})",
            self.layout.name,
            unlimited_balls
        );
        self.launch_ball();
        Ok(())
    }

    /// Force the game to end; no-op unless a game is running
    pub fn end_game(&mut self) {
        if !self.state.end_game() {
            return;
        }
        let score = self.state.score();
        self.audio.play(SoundEvent::GameOver);
        self.events.push(GameEvent::GameEnded { score });
        log::info!("Game over, score {}", score);
    }

    /// Pause or resume. Returns whether anything changed.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let changed = self.state.set_paused(paused);
        if changed {
            if paused {
                self.audio.pause_music();
            }
            log::debug!("Game {}", if paused { "paused" } else { "resumed" });
        }
        changed
    }

    /// Consume `dt` in fixed steps; returns how many steps ran.
    ///
    /// Does nothing unless a game is in progress. Stops early if the game
    /// ends during the call. Deltas over a second are cut to one second.
    pub fn tick(&mut self, dt: Duration) -> u32 {
        if self.state.phase() != GamePhase::InProgress {
            return 0;
        }
        if dt > MAX_TICK_DELTA {
            log::warn!("Tick of {:?} cut to {:?}", dt, MAX_TICK_DELTA);
        }

        let step = SIM_STEP.as_nanos();
        let total = self.accumulator.saturating_add(dt.min(MAX_TICK_DELTA)).as_nanos();
        let steps = total / step;
        self.accumulator = Duration::from_nanos((total % step) as u64);

        let mut executed = 0;
        for _ in 0..steps {
            if self.state.phase() != GamePhase::InProgress {
                break;
            }
            self.step();
            executed += 1;
        }
        executed
    }

    fn step(&mut self) {
        self.world.step(SIM_STEP.as_secs_f32());
        self.sim_time += SIM_STEP;
        self.dispatch_contacts();
        self.process_requests();
        self.run_due_actions();
    }

    /// Run element reactions in the order the world reported contacts
    fn dispatch_contacts(&mut self) {
        let epoch = self.world.epoch();
        for event in self.world.drain_events() {
            if event.phase != ContactPhase::Begin {
                continue;
            }
            if event.world != epoch {
                log::trace!("dropping contact from world {}", event.world);
                continue;
            }

            let a_is_ball = self.balls.contains(&event.body_a);
            let b_is_ball = self.balls.contains(&event.body_b);
            let (user, body, ball) = match (a_is_ball, b_is_ball) {
                (true, false) => (event.user_b, event.body_b, event.body_a),
                (false, true) => (event.user_a, event.body_a, event.body_b),
                _ => continue,
            };
            let Some(id) = user else { continue };
            let Some(element) = self.elements.get_mut(id.0 as usize).filter(|e| e.id == id) else {
                log::debug!("ignoring contact for unknown element {:?}", id);
                continue;
            };

            let mut ctx = ReactionContext {
                world: &mut self.world,
                state: &mut self.state,
                audio: self.audio.as_ref(),
                requests: &mut self.requests,
                events: &mut self.events,
            };
            element.react(Hit { body, ball }, &mut ctx);
        }
    }

    fn process_requests(&mut self) {
        for request in std::mem::take(&mut self.requests) {
            match request {
                FieldRequest::DrainBall(ball) => self.drain_ball(ball),
                FieldRequest::StartMultiball { extra_balls } => self.start_multiball(extra_balls),
                FieldRequest::GrantBallSave => {
                    let secs = secs_to_duration(self.layout.ball_save_secs);
                    self.ball_save_until = Some(self.sim_time.saturating_add(secs));
                }
                FieldRequest::Schedule { delay, action } => self.scheduled.push(Scheduled {
                    due: self.sim_time.saturating_add(delay),
                    action,
                }),
            }
        }
    }

    fn run_due_actions(&mut self) {
        let now = self.sim_time;
        if !self.scheduled.iter().any(|s| s.due <= now) {
            return;
        }
        let (mut due, pending): (Vec<Scheduled>, Vec<Scheduled>) =
            std::mem::take(&mut self.scheduled).into_iter().partition(|s| s.due <= now);
        self.scheduled = pending;
        due.sort_by_key(|s| s.due);

        for scheduled in due {
            match scheduled.action {
                DelayedAction::ResetDropTargets(id) => {
                    let Some(ElementKind::DropTargetGroup(group)) =
                        self.elements.get_mut(id.0 as usize).map(|e| &mut e.kind)
                    else {
                        continue;
                    };
                    group.reset(&mut self.world);
                    self.events.push(GameEvent::DropTargetGroupReset { element: id });
                }
            }
        }
    }

    fn drain_ball(&mut self, ball: BodyId) {
        let Some(index) = self.balls.iter().position(|b| *b == ball) else {
            return;
        };
        self.balls.remove(index);
        self.world.destroy_body(ball);
        self.audio.play(SoundEvent::BallDrained);
        self.events.push(GameEvent::BallDrained {
            balls_in_play: self.balls.len(),
        });

        if !self.balls.is_empty() {
            if self.multiball && self.balls.len() == 1 {
                self.multiball = false;
                self.events.push(GameEvent::MultiballEnded);
            }
            return;
        }

        if self.is_ball_save_active() {
            self.ball_save_until = None;
            self.audio.play(SoundEvent::BallSaved);
            self.events.push(GameEvent::BallSaved);
            self.launch_ball();
            return;
        }

        if self.state.consume_ball() {
            self.end_game();
        } else {
            self.launch_ball();
        }
    }

    fn start_multiball(&mut self, extra_balls: u32) {
        if self.multiball || extra_balls == 0 {
            return;
        }
        self.multiball = true;
        for _ in 0..extra_balls {
            self.spawn_ball();
        }
        self.audio.play(SoundEvent::Multiball);
        self.events.push(GameEvent::MultiballStarted {
            balls_in_play: self.balls.len(),
        });
    }

    fn launch_ball(&mut self) {
        self.spawn_ball();
        self.audio.play(SoundEvent::Launch);
        self.events.push(GameEvent::BallLaunched {
            ball_number: self.state.ball_number(),
        });
    }

    fn spawn_ball(&mut self) -> BodyId {
        let jitter = self.layout.launch_jitter.abs();
        let dx = if jitter > 0.0 && jitter.is_finite() {
            self.rng.random_range(-jitter..=jitter)
        } else {
            0.0
        };
        let ball = self.world.create_body(
            BodyDef::new(BodyKind::Dynamic, self.layout.launch_position)
                .with_velocity(self.layout.launch_velocity + Vec2::new(dx, 0.0))
                .with_shape(Shape::Circle {
                    center: Vec2::ZERO,
                    radius: self.layout.ball_radius,
                }),
        );
        self.balls.push(ball);
        ball
    }

    pub fn set_left_flippers_engaged(&mut self, engaged: bool) {
        self.set_flippers_engaged(Some(FlipperSide::Left), engaged);
    }

    pub fn set_right_flippers_engaged(&mut self, engaged: bool) {
        self.set_flippers_engaged(Some(FlipperSide::Right), engaged);
    }

    pub fn set_all_flippers_engaged(&mut self, engaged: bool) {
        self.set_flippers_engaged(None, engaged);
    }

    /// Hold or release flippers on `side` (all when `None`)
    pub fn set_flippers_engaged(&mut self, side: Option<FlipperSide>, engaged: bool) {
        let mut pressed = false;
        for element in &mut self.elements {
            let ElementKind::Flipper(flipper) = &mut element.kind else {
                continue;
            };
            if side.is_some_and(|s| s != flipper.side) {
                continue;
            }
            pressed |= flipper.set_engaged(engaged);
            self.world.set_motor_speed(flipper.joint, flipper.motor_speed());
        }
        if pressed && self.state.phase() == GamePhase::InProgress {
            self.audio.play(SoundEvent::Flipper);
        }
    }

    /// Events since the last call, oldest first
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn game_state(&self) -> &GameState {
        &self.state
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn elements(&self) -> &[FieldElement] {
        &self.elements
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Level loaded through a layout source, if any
    pub fn level(&self) -> Option<u32> {
        self.level
    }

    pub fn balls(&self) -> &[BodyId] {
        &self.balls
    }

    /// Positions of the balls in play
    pub fn ball_positions(&self) -> Vec<Vec2> {
        self.balls
            .iter()
            .filter_map(|b| self.world.body(*b))
            .map(|b| b.position())
            .collect()
    }

    pub fn is_multiball(&self) -> bool {
        self.multiball
    }

    pub fn is_ball_save_active(&self) -> bool {
        self.ball_save_until.is_some_and(|until| self.sim_time < until)
    }

    /// Time carried over to the next tick
    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    pub fn sim_time(&self) -> Duration {
        self.sim_time
    }
}

impl Drop for Field {
    fn drop(&mut self) {
        self.audio.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use proptest::prelude::*;

    use super::*;
    use crate::audio::{RecordingAudio, SilentAudio};
    use crate::sim::layout::{
        BuiltinLayouts, DropTargetGroupDesc, ElementDescriptor, MultiballTriggerDesc, SensorAction,
        SensorDesc, SensorShape, WallDesc,
    };

    fn drain() -> ElementDescriptor {
        ElementDescriptor::Sensor(SensorDesc {
            geometry: SensorShape::Segment {
                start: Vec2::new(-5.0, 0.0),
                end: Vec2::new(15.0, 0.0),
                radius: 0.3,
            },
            action: SensorAction::Drain,
        })
    }

    /// Ball dropped from (5, 5) straight onto a drain
    fn drop_layout(balls: u32, extra: Vec<ElementDescriptor>) -> FieldLayout {
        let mut elements = vec![drain()];
        elements.extend(extra);
        FieldLayout {
            name: "drop".into(),
            gravity: Vec2::new(0.0, -10.0),
            balls_per_game: balls,
            launch_position: Vec2::new(5.0, 5.0),
            elements,
            ..FieldLayout::empty()
        }
    }

    /// Ball resting on a floor forever
    fn floor_layout() -> FieldLayout {
        FieldLayout {
            name: "floor".into(),
            gravity: Vec2::new(0.0, -10.0),
            launch_position: Vec2::new(5.0, 1.0),
            elements: vec![ElementDescriptor::Wall(WallDesc {
                start: Vec2::new(-5.0, 0.0),
                end: Vec2::new(15.0, 0.0),
                radius: 0.1,
                restitution: 0.0,
                kick: 0.0,
                points: 0,
            })],
            ..FieldLayout::empty()
        }
    }

    fn field_with(layout: FieldLayout) -> (Field, Arc<RecordingAudio>) {
        let audio = Arc::new(RecordingAudio::default());
        let mut field = Field::new(audio.clone());
        field.reset_with_layout(layout);
        (field, audio)
    }

    fn run_for(field: &mut Field, total: Duration) {
        let chunk = Duration::from_millis(100);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            field.tick(chunk);
            elapsed += chunk;
        }
    }

    #[test]
    fn test_tick_before_start_is_noop() {
        let (mut field, _) = field_with(floor_layout());
        assert_eq!(field.tick(Duration::from_secs(1)), 0);
        assert_eq!(field.accumulator(), Duration::ZERO);
        assert_eq!(field.world().step_count(), 0);
    }

    #[test]
    fn test_start_game_transitions() {
        let (mut field, _) = field_with(floor_layout());
        field.start_game().unwrap();
        assert_eq!(field.game_state().phase(), GamePhase::InProgress);
        assert_eq!(field.game_state().balls_remaining(), 3);
        assert_eq!(field.balls().len(), 1);
        assert!(matches!(field.start_game(), Err(Error::GameInProgress)));

        field.end_game();
        assert_eq!(field.game_state().phase(), GamePhase::Ended);
        assert!(matches!(field.start_game(), Err(Error::FieldNotReset)));

        field.reset_with_layout(floor_layout());
        assert!(field.start_game_with_unlimited_balls().is_ok());
        assert!(field.game_state().has_unlimited_balls());
    }

    #[test]
    fn test_pause_preserves_state_exactly() {
        let (mut field, _) = field_with(drop_layout(3, Vec::new()));
        field.start_game().unwrap();
        field.tick(Duration::from_millis(120));

        let before_state = field.game_state().clone();
        let before_balls = field.ball_positions();
        let before_acc = field.accumulator();
        let before_time = field.sim_time();
        assert_eq!(before_time, SIM_STEP * 14);

        assert!(field.set_paused(true));
        assert_eq!(field.tick(Duration::from_secs(2)), 0);
        assert!(field.set_paused(false));

        assert_eq!(field.sim_time(), before_time);

        assert_eq!(field.game_state().score(), before_state.score());
        assert_eq!(field.game_state().balls_remaining(), before_state.balls_remaining());
        assert_eq!(field.ball_positions(), before_balls);
        assert_eq!(field.accumulator(), before_acc);
    }

    #[test]
    fn test_last_drain_ends_game_once() {
        let (mut field, audio) = field_with(drop_layout(2, Vec::new()));
        field.start_game().unwrap();

        run_for(&mut field, Duration::from_secs(10));

        assert_eq!(field.game_state().phase(), GamePhase::Ended);
        let events = field.take_events();
        let ended = events
            .iter()
            .filter(|e| matches!(e, GameEvent::GameEnded { .. }))
            .count();
        assert_eq!(ended, 1);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GameEvent::BallLaunched { .. }))
                .count(),
            2
        );
        assert_eq!(audio.count(SoundEvent::GameOver), 1);
        assert_eq!(field.tick(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_unlimited_balls_never_end() {
        let (mut field, _) = field_with(drop_layout(1, Vec::new()));
        field.start_game_with_unlimited_balls().unwrap();

        run_for(&mut field, Duration::from_secs(10));

        assert_eq!(field.game_state().phase(), GamePhase::InProgress);
        assert!(field.game_state().ball_number() > 3);
        assert_eq!(field.game_state().balls_remaining(), 1);
        assert_eq!(field.balls().len(), 1);
    }

    #[test]
    fn test_ball_save_relaunches_without_consuming() {
        let mut layout = drop_layout(2, Vec::new());
        layout.ball_save_secs = 30.0;
        let (mut field, audio) = field_with(layout);
        field.start_game().unwrap();
        field.requests.push(FieldRequest::GrantBallSave);
        field.tick(SIM_STEP);
        assert!(field.is_ball_save_active());

        run_for(&mut field, Duration::from_millis(1500));

        assert_eq!(field.game_state().balls_remaining(), 2);
        assert_eq!(field.game_state().ball_number(), 1);
        assert!(!field.is_ball_save_active());
        assert_eq!(audio.count(SoundEvent::BallSaved), 1);
        assert!(field.take_events().contains(&GameEvent::BallSaved));
    }

    #[test]
    fn test_multiball_starts_once_and_ends() {
        let trigger = ElementDescriptor::MultiballTrigger(MultiballTriggerDesc {
            center: Vec2::new(5.0, 5.0),
            radius: 1.0,
            extra_balls: 2,
            points: 0,
        });
        let (mut field, _) = field_with(drop_layout(1, vec![trigger]));
        field.start_game().unwrap();

        field.tick(SIM_STEP);
        assert!(field.is_multiball());
        assert_eq!(field.balls().len(), 3);

        run_for(&mut field, Duration::from_secs(5));

        let events = field.take_events();
        let started = events
            .iter()
            .filter(|e| matches!(e, GameEvent::MultiballStarted { .. }))
            .count();
        assert_eq!(started, 1);
        assert!(events.contains(&GameEvent::MultiballEnded));
        assert_eq!(field.game_state().phase(), GamePhase::Ended);
    }

    #[test]
    fn test_drop_target_group_resets_after_delay() {
        let targets = ElementDescriptor::DropTargetGroup(DropTargetGroupDesc {
            targets: vec![[Vec2::new(4.0, 3.0), Vec2::new(6.0, 3.0)]],
            radius: 0.1,
            points: 100,
            completion_points: 1000,
            reset_delay: 0.5,
            ball_save: true,
        });
        let (mut field, _) = field_with(drop_layout(3, vec![targets]));
        field.start_game().unwrap();

        run_for(&mut field, Duration::from_millis(800));
        assert_eq!(field.game_state().score(), 1100);
        let events = field.take_events();
        assert!(events.contains(&GameEvent::DropTargetGroupCompleted { element: ElementId(1) }));

        run_for(&mut field, Duration::from_millis(400));
        assert!(field.take_events().contains(&GameEvent::DropTargetGroupReset { element: ElementId(1) }));
        let ElementKind::DropTargetGroup(group) = &field.elements()[1].kind else {
            panic!("not a drop target group");
        };
        assert!(!group.is_down(0));
    }

    #[test]
    fn test_contact_with_unknown_element_is_ignored() {
        let (mut field, _) = field_with(floor_layout());
        field.start_game().unwrap();
        // A body claiming to belong to an element that doesn't exist
        field.world.create_body(
            BodyDef::new(BodyKind::Static, Vec2::new(5.0, 1.0))
                .with_shape(Shape::Circle { center: Vec2::ZERO, radius: 1.0 })
                .with_user_data(ElementId(99))
                .sensor(),
        );

        field.tick(Duration::from_millis(100));
        assert_eq!(field.game_state().score(), 0);
        assert_eq!(field.game_state().phase(), GamePhase::InProgress);
    }

    #[test]
    fn test_reset_for_level() {
        let audio: Arc<dyn AudioPlayer> = Arc::new(SilentAudio);
        let mut field = Field::new(audio);
        let epoch = field.world().epoch();

        field.reset_for_level(&BuiltinLayouts, 2).unwrap();
        assert_eq!(field.level(), Some(2));
        assert_eq!(field.world().epoch(), epoch + 1);
        assert_eq!(field.elements().len(), field.layout().elements.len());
        assert!(field.start_game().is_ok());

        // A failed load keeps the game that's running
        assert!(matches!(
            field.reset_for_level(&BuiltinLayouts, 9),
            Err(Error::UnknownLevel { level: 9, .. })
        ));
        assert_eq!(field.level(), Some(2));
        assert!(field.game_state().is_game_in_progress());
    }

    #[test]
    fn test_flipper_sound_is_edge_triggered() {
        let audio = Arc::new(RecordingAudio::default());
        let mut field = Field::new(audio.clone());
        field.reset_for_level(&BuiltinLayouts, 1).unwrap();
        field.start_game().unwrap();

        field.set_left_flippers_engaged(true);
        field.set_left_flippers_engaged(true);
        field.set_left_flippers_engaged(false);
        field.set_all_flippers_engaged(true);
        assert_eq!(audio.count(SoundEvent::Flipper), 2);
    }

    #[test]
    fn test_audio_lifecycle_follows_field() {
        let audio = Arc::new(RecordingAudio::default());
        let field = Field::new(audio.clone());
        assert_eq!(audio.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(audio.teardown_calls.load(Ordering::SeqCst), 0);
        drop(field);
        assert_eq!(audio.teardown_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_launch_jitter_is_seeded() {
        let mut layout = floor_layout();
        layout.launch_jitter = 1.0;
        let velocities = |seed| {
            let mut field = Field::with_seed(Arc::new(SilentAudio), seed);
            field.reset_with_layout(layout.clone());
            field.start_game().unwrap();
            let ball = field.balls()[0];
            field.world().body(ball).unwrap().linear_velocity()
        };
        assert_eq!(velocities(7), velocities(7));
        assert!(velocities(7).x.abs() <= 1.0);
    }

    #[test]
    fn test_huge_tick_is_capped() {
        let (mut field, _) = field_with(floor_layout());
        field.start_game().unwrap();
        field.tick(Duration::from_millis(5));
        let carried = field.accumulator();

        let steps = field.tick(Duration::MAX);
        let expected = (carried + MAX_TICK_DELTA).as_nanos() / SIM_STEP.as_nanos();
        assert_eq!(u128::from(steps), expected);
        assert!(field.accumulator() < SIM_STEP);
        assert_eq!(field.sim_time(), SIM_STEP * steps);
    }

    #[test]
    fn test_out_of_range_delays_do_not_panic() {
        let targets = ElementDescriptor::DropTargetGroup(DropTargetGroupDesc {
            targets: vec![[Vec2::new(4.0, 3.0), Vec2::new(6.0, 3.0)]],
            radius: 0.1,
            points: 100,
            completion_points: 1000,
            reset_delay: f32::INFINITY,
            ball_save: true,
        });
        let mut layout = drop_layout(3, vec![targets]);
        layout.ball_save_secs = 1e39_f64 as f32;
        layout.launch_jitter = f32::NAN;
        let (mut field, _) = field_with(layout);
        field.start_game().unwrap();

        run_for(&mut field, Duration::from_millis(800));

        assert!(field.game_state().score() >= 1100);
        // Both delays fall back to zero
        assert!(!field.is_ball_save_active());
        let events = field.take_events();
        assert!(events.contains(&GameEvent::DropTargetGroupCompleted { element: ElementId(1) }));
        assert!(events.contains(&GameEvent::DropTargetGroupReset { element: ElementId(1) }));
    }

    proptest! {
        #[test]
        fn prop_accumulator_carries_remainder(
            deltas in prop::collection::vec(0u64..60_000_000, 1..40)
        ) {
            let (mut field, _) = field_with(floor_layout());
            field.start_game().unwrap();
            let h = SIM_STEP.as_nanos();

            let mut residual: u128 = 0;
            let mut total_steps: u128 = 0;
            for dt in &deltas {
                let accumulated = residual + *dt as u128;
                let steps = field.tick(Duration::from_nanos(*dt));
                prop_assert_eq!(steps as u128, accumulated / h);
                residual = accumulated % h;
                prop_assert_eq!(field.accumulator().as_nanos(), residual);
                total_steps += steps as u128;
            }

            let elapsed: u128 = deltas.iter().map(|d| *d as u128).sum();
            prop_assert_eq!(total_steps, elapsed / h);
            prop_assert_eq!(field.world().step_count() as u128, total_steps);
        }

        #[test]
        fn prop_score_never_decreases(
            deltas in prop::collection::vec(1u64..50_000_000, 1..60),
            flips in prop::collection::vec(any::<bool>(), 60)
        ) {
            let mut field = Field::with_seed(Arc::new(SilentAudio), 3);
            field.reset_for_level(&BuiltinLayouts, 1).unwrap();
            field.start_game().unwrap();

            let mut last = 0;
            for (dt, flip) in deltas.iter().zip(flips.iter()) {
                field.set_all_flippers_engaged(*flip);
                field.tick(Duration::from_nanos(*dt));
                let score = field.game_state().score();
                prop_assert!(score >= last);
                last = score;
            }
        }
    }
}
