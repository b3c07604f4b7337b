//! Background stepping loop
//!
//! A dedicated thread repeatedly measures elapsed wall-clock time, ticks the
//! field under its lock, asks the view to redraw and then sleeps toward the
//! current target frame rate. The target degrades when the achieved rate
//! stays short of it rather than letting lag build up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::consts::{MAX_FRAME_DELTA, RESUME_DELAY};
use crate::lock_or_recover;
use crate::sim::Field;
use crate::view::FieldViewManager;

/// Target rates tried in order, highest first
pub const FRAME_RATES: [f64; 5] = [60.0, 50.0, 45.0, 40.0, 30.0];
/// Frames per averaging window
pub const FPS_WINDOW: usize = 60;
/// Achieved rate must reach this fraction of the target
const DEGRADE_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Pause before the first tick after (re)starting
    pub resume_delay: Duration,
    /// Largest delta handed to a single tick
    pub max_frame_delta: Duration,
    pub frame_rates: Vec<f64>,
    pub fps_window: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            resume_delay: RESUME_DELAY,
            max_frame_delta: MAX_FRAME_DELTA,
            frame_rates: FRAME_RATES.to_vec(),
            fps_window: FPS_WINDOW,
        }
    }
}

/// Tracks achieved frame rate and picks the target rate
#[derive(Debug, Clone)]
pub struct FrameRateManager {
    rates: Vec<f64>,
    index: usize,
    window: usize,
    /// Start times of the most recent frames, oldest first
    frame_times: VecDeque<Instant>,
    /// Frames recorded since the target last changed
    frames_at_rate: usize,
}

impl Default for FrameRateManager {
    fn default() -> Self {
        Self::new(FRAME_RATES.to_vec(), FPS_WINDOW)
    }
}

impl FrameRateManager {
    pub fn new(mut rates: Vec<f64>, window: usize) -> Self {
        rates.retain(|r| *r > 0.0);
        if rates.is_empty() {
            rates = FRAME_RATES.to_vec();
        }
        let window = window.max(2);
        Self {
            rates,
            index: 0,
            window,
            frame_times: VecDeque::with_capacity(window + 1),
            frames_at_rate: 0,
        }
    }

    pub fn target_fps(&self) -> f64 {
        self.rates[self.index]
    }

    pub fn target_frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps())
    }

    /// Average over the last window of frames, 0 until two frames exist
    pub fn average_fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_times.front(), self.frame_times.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        (self.frame_times.len() - 1) as f64 / elapsed
    }

    /// Record a frame starting at `now`. Returns true if the target dropped.
    pub fn frame_started(&mut self, now: Instant) -> bool {
        self.frame_times.push_back(now);
        while self.frame_times.len() > self.window + 1 {
            self.frame_times.pop_front();
        }
        self.frames_at_rate += 1;

        let lower_available = self.index + 1 < self.rates.len();
        if !lower_available || self.frames_at_rate <= self.window {
            return false;
        }
        let achieved = self.average_fps();
        if achieved >= self.target_fps() * DEGRADE_THRESHOLD {
            return false;
        }

        self.index += 1;
        self.frames_at_rate = 0;
        log::info!(
            "Frame rate {:.1} below target, lowering target to {}",
            achieved,
            self.target_fps()
        );
        true
    }

    /// How long to sleep for a frame that started at `frame_start`
    pub fn sleep_time(&self, frame_start: Instant, now: Instant) -> Duration {
        self.target_frame_duration()
            .saturating_sub(now.saturating_duration_since(frame_start))
    }

    /// Back to the highest target (renderer or quality changed)
    pub fn reset_frame_rate(&mut self) {
        self.index = 0;
        self.frames_at_rate = 0;
        self.frame_times.clear();
    }
}

/// A spawned loop and the flag that keeps it going
struct LoopHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.thread.is_finished()
    }
}

/// Runs the field on a background thread
pub struct FieldDriver {
    field: Arc<Mutex<Field>>,
    view: Arc<FieldViewManager>,
    config: DriverConfig,
    handle: Mutex<Option<LoopHandle>>,
    frame_rate: Arc<Mutex<FrameRateManager>>,
}

impl FieldDriver {
    pub fn new(field: Arc<Mutex<Field>>, view: Arc<FieldViewManager>, config: DriverConfig) -> Self {
        let frame_rate = FrameRateManager::new(config.frame_rates.clone(), config.fps_window);
        Self {
            field,
            view,
            config,
            handle: Mutex::new(None),
            frame_rate: Arc::new(Mutex::new(frame_rate)),
        }
    }

    /// Start the loop; no-op if it is already running
    pub fn start(&self) {
        let mut handle = lock_or_recover(&self.handle);
        if handle.as_ref().is_some_and(LoopHandle::is_live) {
            return;
        }
        if let Some(stale) = handle.take() {
            stale.running.store(false, Ordering::SeqCst);
            join_loop(stale.thread);
        }

        // Each loop owns its flag so a stale loop can never be revived
        let running = Arc::new(AtomicBool::new(true));
        let field = Arc::clone(&self.field);
        let view = Arc::clone(&self.view);
        let loop_running = Arc::clone(&running);
        let frame_rate = Arc::clone(&self.frame_rate);
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name("field-driver".into())
            .spawn(move || run_loop(field, view, loop_running, frame_rate, config));
        match spawned {
            Ok(thread) => {
                log::debug!("Field driver started");
                *handle = Some(LoopHandle { running, thread });
            }
            Err(e) => log::error!("Failed to spawn field driver: {}", e),
        }
    }

    /// Stop the loop. Once this returns no tick is running or will start.
    ///
    /// Safe to call repeatedly and from any thread, including the loop's own.
    /// A concurrent `start` waits until the old loop has been joined.
    pub fn stop(&self) {
        let mut handle = lock_or_recover(&self.handle);
        let Some(current) = handle.take() else {
            return;
        };
        current.running.store(false, Ordering::SeqCst);
        if current.thread.thread().id() == thread::current().id() {
            // Exits after the current iteration
            return;
        }
        join_loop(current.thread);
        drop(handle);
        log::debug!("Field driver stopped");
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.handle).as_ref().is_some_and(LoopHandle::is_live)
    }

    pub fn average_fps(&self) -> f64 {
        lock_or_recover(&self.frame_rate).average_fps()
    }

    pub fn target_fps(&self) -> f64 {
        lock_or_recover(&self.frame_rate).target_fps()
    }

    pub fn reset_frame_rate(&self) {
        lock_or_recover(&self.frame_rate).reset_frame_rate();
    }

    /// Draw now, without waiting for the loop
    pub fn draw_field(&self) -> bool {
        self.view.draw_field()
    }
}

impl Drop for FieldDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_loop(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("Field driver thread panicked");
    }
}

fn run_loop(
    field: Arc<Mutex<Field>>,
    view: Arc<FieldViewManager>,
    running: Arc<AtomicBool>,
    frame_rate: Arc<Mutex<FrameRateManager>>,
    config: DriverConfig,
) {
    if !config.resume_delay.is_zero() {
        thread::sleep(config.resume_delay);
    }

    let mut last = Instant::now();
    while running.load(Ordering::SeqCst) {
        let frame_start = Instant::now();
        let elapsed = frame_start.duration_since(last).min(config.max_frame_delta);
        last = frame_start;

        lock_or_recover(&field).tick(elapsed);
        view.draw();

        let sleep = {
            let mut rate = lock_or_recover(&frame_rate);
            rate.frame_started(frame_start);
            view.set_fps(rate.average_fps());
            rate.sleep_time(frame_start, Instant::now())
        };
        if !sleep.is_zero() {
            thread::sleep(sleep);
        }
    }
}
