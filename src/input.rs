//! Keyboard and pointer state accumulated from window events.

use std::time::{Duration, Instant};

use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

use crate::lattice::LatticeDims;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSignals {
    pub should_reset: bool,
    pub should_quit: bool,
}

#[derive(Debug, Default)]
pub struct InputState {
    reset_held: bool,
    quit: bool,
    left_down: bool,
    cursor: Option<(f64, f64)>,
}

impl InputState {
    pub fn key(&mut self, code: KeyCode, state: ElementState) {
        let pressed = state == ElementState::Pressed;
        match code {
            KeyCode::Escape if pressed => self.quit = true,
            KeyCode::KeyR => self.reset_held = pressed,
            _ => {}
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.left_down = state == ElementState::Pressed;
        }
    }

    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        self.cursor = Some((x, y));
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn poll_input(&self) -> InputSignals {
        InputSignals {
            should_reset: self.reset_held,
            should_quit: self.quit,
        }
    }

    /// Window-space pointer position, only while the left button is held.
    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        if self.left_down { self.cursor } else { None }
    }
}

/// Maps a window-space position onto lattice cells when the window has
/// been resized away from the mask size.
pub fn window_to_lattice(pos: (f64, f64), window: (u32, u32), dims: LatticeDims) -> (f64, f64) {
    let sx = dims.width as f64 / window.0.max(1) as f64;
    let sy = dims.height as f64 / window.1.max(1) as f64;
    (pos.0 * sx, pos.1 * sy)
}

/// Frames-per-second over a fixed reporting interval.
#[derive(Debug)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    pub fn new(interval_secs: f64, now: Instant) -> Self {
        Self {
            interval: Duration::from_secs_f64(interval_secs),
            window_start: now,
            frames: 0,
        }
    }

    /// Counts a frame; returns the rate once per elapsed interval.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.frames = 0;
        Some(fps)
    }
}

pub fn fps_title(fps: f64) -> String {
    format!("LBM [{fps:.1} FPS]")
}
