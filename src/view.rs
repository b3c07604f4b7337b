//! Field view management
//!
//! Sits between the shared field and whatever draws it: builds read-only
//! snapshots, maps world units to screen pixels (optionally zoomed in around
//! the balls) and turns touches and keys into flipper activation or a
//! request to start a game.

use std::sync::{Arc, Mutex};

use glam::Vec2;

use crate::lock_or_recover;
use crate::sim::geometry::WorldShape;
use crate::sim::{BodyId, ElementId, ElementTag, Field, FlipperSide, GameState};

/// One body as the renderer sees it
#[derive(Debug, Clone)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub element: Option<ElementId>,
    pub tag: Option<ElementTag>,
    pub shapes: Vec<WorldShape>,
    pub enabled: bool,
    pub sensor: bool,
    pub lit: bool,
}

/// Read-only copy of everything needed to draw a frame
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    pub table_name: String,
    pub width: f32,
    pub height: f32,
    pub bodies: Vec<BodySnapshot>,
    pub balls: Vec<Vec2>,
    pub ball_radius: f32,
    pub state: GameState,
    pub ball_save_active: bool,
}

impl FieldSnapshot {
    pub fn capture(field: &Field) -> Self {
        let elements = field.elements();
        let world = field.world();
        let bodies = world
            .bodies()
            .filter(|(id, _)| !field.balls().contains(id))
            .map(|(id, body)| {
                let element = body.user_data().and_then(|e| elements.get(e.0 as usize));
                BodySnapshot {
                    id,
                    element: body.user_data(),
                    tag: element.map(|e| e.tag()),
                    shapes: body.world_shapes().collect(),
                    enabled: body.is_enabled(),
                    sensor: body.is_sensor(),
                    lit: element.is_some_and(|e| e.is_body_lit(id)),
                }
            })
            .collect();

        let layout = field.layout();
        Self {
            table_name: layout.name.clone(),
            width: layout.width,
            height: layout.height,
            bodies,
            balls: field.ball_positions(),
            ball_radius: layout.ball_radius,
            state: field.game_state().clone(),
            ball_save_active: field.is_ball_save_active(),
        }
    }
}

/// World (y up) to screen (y down, pixels) mapping for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Pixels per world unit
    pub scale: f32,
    /// World point shown at the screen's bottom-left corner
    pub origin: Vec2,
    pub view_height: f32,
}

impl ViewTransform {
    pub fn world_to_screen(&self, p: Vec2) -> Vec2 {
        let local = (p - self.origin) * self.scale;
        Vec2::new(local.x, self.view_height - local.y)
    }

    pub fn screen_to_world(&self, s: Vec2) -> Vec2 {
        Vec2::new(s.x, self.view_height - s.y) / self.scale + self.origin
    }

    pub fn world_length(&self, pixels: f32) -> f32 {
        pixels / self.scale
    }
}

/// Draws field snapshots (canvas, GL, or nothing at all)
pub trait FieldRenderer: Send {
    fn render(&mut self, snapshot: &FieldSnapshot, transform: &ViewTransform);
}

/// Counts frames and draws nothing
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: u64,
}

impl HeadlessRenderer {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FieldRenderer for HeadlessRenderer {
    fn render(&mut self, snapshot: &FieldSnapshot, _transform: &ViewTransform) {
        self.frames += 1;
        log::trace!(
            "frame {}: score {} balls {}",
            self.frames,
            snapshot.state.score(),
            snapshot.balls.len()
        );
    }
}

/// Keys that control the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    /// Any other key: both flippers, or start a game
    Other,
}

/// What an input event turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// No game running; the caller should start one
    StartGame,
    Flippers,
    Ignored,
}

#[derive(Debug, Clone, Copy)]
struct ViewSettings {
    view_size: Vec2,
    zoom: f32,
    independent_flippers: bool,
    high_quality: bool,
    show_fps: bool,
    fps: f64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            view_size: Vec2::new(480.0, 800.0),
            zoom: 1.0,
            independent_flippers: true,
            high_quality: false,
            show_fps: false,
            fps: 0.0,
        }
    }
}

pub struct FieldViewManager {
    field: Arc<Mutex<Field>>,
    settings: Mutex<ViewSettings>,
    renderer: Mutex<Option<Box<dyn FieldRenderer>>>,
}

impl FieldViewManager {
    pub fn new(field: Arc<Mutex<Field>>) -> Self {
        Self {
            field,
            settings: Mutex::new(ViewSettings::default()),
            renderer: Mutex::new(None),
        }
    }

    pub fn field(&self) -> &Arc<Mutex<Field>> {
        &self.field
    }

    fn settings(&self) -> ViewSettings {
        *lock_or_recover(&self.settings)
    }

    /// Bind a renderer, replacing the previous one. The field is untouched.
    pub fn set_renderer(&self, renderer: Box<dyn FieldRenderer>) {
        *lock_or_recover(&self.renderer) = Some(renderer);
    }

    /// Unbind the renderer; draws become no-ops
    pub fn clear_renderer(&self) -> Option<Box<dyn FieldRenderer>> {
        lock_or_recover(&self.renderer).take()
    }

    pub fn set_view_size(&self, width: f32, height: f32) {
        lock_or_recover(&self.settings).view_size = Vec2::new(width.max(1.0), height.max(1.0));
    }

    pub fn set_zoom(&self, zoom: f32) {
        lock_or_recover(&self.settings).zoom = zoom.max(1.0);
    }

    pub fn zoom(&self) -> f32 {
        self.settings().zoom
    }

    pub fn set_independent_flippers(&self, independent: bool) {
        lock_or_recover(&self.settings).independent_flippers = independent;
    }

    pub fn set_high_quality(&self, high_quality: bool) {
        lock_or_recover(&self.settings).high_quality = high_quality;
    }

    pub fn is_high_quality(&self) -> bool {
        self.settings().high_quality
    }

    pub fn set_show_fps(&self, show: bool) {
        lock_or_recover(&self.settings).show_fps = show;
    }

    /// FPS value passed through from the driver for display
    pub fn set_fps(&self, fps: f64) {
        lock_or_recover(&self.settings).fps = fps;
    }

    /// FPS to display, if enabled
    pub fn fps(&self) -> Option<f64> {
        let settings = self.settings();
        settings.show_fps.then_some(settings.fps)
    }

    /// Transform for the field's current state
    pub fn transform(&self) -> ViewTransform {
        let snapshot = FieldSnapshot::capture(&lock_or_recover(&self.field));
        self.transform_for(&snapshot)
    }

    /// Fit the table to the view, then zoom in around the balls, never
    /// showing anything past the table's edges
    pub fn transform_for(&self, snapshot: &FieldSnapshot) -> ViewTransform {
        let settings = self.settings();
        let view = settings.view_size;
        let table = Vec2::new(snapshot.width, snapshot.height);
        let fit = (view.x / table.x).min(view.y / table.y);
        let scale = fit * settings.zoom;
        let visible = view / scale;

        let center = if settings.zoom > 1.0 && !snapshot.balls.is_empty() {
            snapshot.balls.iter().copied().sum::<Vec2>() / snapshot.balls.len() as f32
        } else {
            table / 2.0
        };
        let clamp_axis = |c: f32, vis: f32, size: f32| {
            if vis >= size {
                size / 2.0
            } else {
                c.clamp(vis / 2.0, size - vis / 2.0)
            }
        };
        let center = Vec2::new(
            clamp_axis(center.x, visible.x, table.x),
            clamp_axis(center.y, visible.y, table.y),
        );

        ViewTransform {
            scale,
            origin: center - visible / 2.0,
            view_height: view.y,
        }
    }

    /// Apply the set of points currently touching the screen
    pub fn handle_touches(&self, touches: &[Vec2]) -> InputOutcome {
        let settings = self.settings();
        let mut field = lock_or_recover(&self.field);

        if !field.game_state().is_game_in_progress() {
            return if touches.is_empty() {
                InputOutcome::Ignored
            } else {
                InputOutcome::StartGame
            };
        }

        if settings.independent_flippers {
            let half = settings.view_size.x / 2.0;
            field.set_left_flippers_engaged(touches.iter().any(|t| t.x < half));
            field.set_right_flippers_engaged(touches.iter().any(|t| t.x >= half));
        } else {
            field.set_all_flippers_engaged(!touches.is_empty());
        }
        InputOutcome::Flippers
    }

    pub fn handle_key(&self, key: Key, pressed: bool) -> InputOutcome {
        let mut field = lock_or_recover(&self.field);

        if !field.game_state().is_game_in_progress() {
            return if pressed {
                InputOutcome::StartGame
            } else {
                InputOutcome::Ignored
            };
        }

        match key {
            Key::Left => field.set_flippers_engaged(Some(FlipperSide::Left), pressed),
            Key::Right => field.set_flippers_engaged(Some(FlipperSide::Right), pressed),
            Key::Other => field.set_all_flippers_engaged(pressed),
        }
        InputOutcome::Flippers
    }

    /// Injected activation from an agent, bypassing screen coordinates
    pub fn set_flippers_active(&self, left: bool, right: bool) {
        let mut field = lock_or_recover(&self.field);
        field.set_left_flippers_engaged(left);
        field.set_right_flippers_engaged(right);
    }

    /// Render the current state. Returns false when no renderer is bound.
    pub fn draw(&self) -> bool {
        let mut renderer = lock_or_recover(&self.renderer);
        let Some(renderer) = renderer.as_mut() else {
            return false;
        };
        let snapshot = FieldSnapshot::capture(&lock_or_recover(&self.field));
        let transform = self.transform_for(&snapshot);
        renderer.render(&snapshot, &transform);
        true
    }

    /// Immediate draw outside the driver's cadence (e.g. coming back from
    /// the background while paused)
    pub fn draw_field(&self) -> bool {
        log::debug!("Forced field redraw");
        self.draw()
    }
}
