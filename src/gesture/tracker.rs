//! Per-frame gesture state machine: candidate persistence with cooldown,
//! dwell-click, smoothed scrolling and wave detection.

use tracing::debug;

use super::{GestureConfig, HandFrame, Landmark, RawGesture, INDEX_TIP};

/// A coarse UI action emitted by the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureAction {
    SendMessage,
    Click { x: f32, y: f32 },
    Scroll { dy: f32 },
    PointerMove { x: f32, y: f32 },
}

/// Per-frame output. Recomputed every frame; nothing here is history.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// The active candidate label, for rendering.
    pub label: Option<RawGesture>,
    /// Progress toward the active threshold (frames or dwell time), `[0,1]`.
    pub progress: f32,
    /// Smoothed pointer position while pointing.
    pub pointer: Option<(f32, f32)>,
    /// The landmark-derived pose state; reported, never acted on.
    pub middle_finger: bool,
    pub actions: Vec<GestureAction>,
}

#[derive(Debug, Clone, Copy, Default)]
struct WaveState {
    last_x: Option<f32>,
    direction: i8,
    reversals: u32,
    window_start_ms: u64,
    last_move_ms: u64,
}

/// Gesture persistence state for one camera session.
///
/// Call [`GestureTracker::update`] once per video frame with the frame's
/// wall-clock `now_ms` and whether a text input currently has focus. Call
/// [`GestureTracker::reset`] when tracking stops.
#[derive(Debug)]
pub struct GestureTracker {
    cfg: GestureConfig,
    candidate: Option<RawGesture>,
    streak: u32,
    last_trigger_ms: Option<u64>,
    pointer: Option<(f32, f32)>,
    dwell_anchor: Option<(f32, f32)>,
    dwell_start_ms: u64,
    scroll_ref_y: Option<f32>,
    scroll_velocity: f32,
    wave: WaveState,
    middle_streak: u32,
    middle_active: bool,
}

impl GestureTracker {
    pub fn new(cfg: GestureConfig) -> Self {
        GestureTracker {
            cfg,
            candidate: None,
            streak: 0,
            last_trigger_ms: None,
            pointer: None,
            dwell_anchor: None,
            dwell_start_ms: 0,
            scroll_ref_y: None,
            scroll_velocity: 0.0,
            wave: WaveState::default(),
            middle_streak: 0,
            middle_active: false,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.cfg
    }

    /// Reset all per-session state (camera stopped or tracking disabled).
    pub fn reset(&mut self) {
        self.candidate = None;
        self.streak = 0;
        self.last_trigger_ms = None;
        self.middle_streak = 0;
        self.middle_active = false;
        self.reset_continuous();
    }

    /// Evaluate one video frame.
    pub fn update(
        &mut self,
        frame: Option<&HandFrame>,
        now_ms: u64,
        input_focused: bool,
    ) -> FrameOutput {
        let mut out = FrameOutput::default();

        let Some(frame) = frame else {
            self.candidate = None;
            self.streak = 0;
            self.middle_streak = 0;
            self.middle_active = false;
            self.reset_continuous();
            return out;
        };

        let raw = frame
            .gesture
            .filter(|_| frame.confidence >= self.cfg.min_confidence);
        match (raw, self.candidate) {
            (Some(r), Some(c)) if r == c => self.streak += 1,
            (Some(r), _) => {
                self.candidate = Some(r);
                self.streak = 1;
            }
            (None, _) => {
                self.candidate = None;
                self.streak = 0;
            }
        }
        out.label = self.candidate;

        // The pose check runs on raw landmarks, independent of the label.
        // Same persistence threshold as discrete gestures; clears instantly.
        if super::middle_finger_extended(&frame.landmarks) {
            self.middle_streak += 1;
            if self.middle_streak >= self.cfg.persistence_frames {
                self.middle_active = true;
            }
        } else {
            self.middle_streak = 0;
            self.middle_active = false;
        }
        out.middle_finger = self.middle_active;

        let wrist = frame.wrist();
        match self.candidate {
            Some(RawGesture::ThumbsUp) => {
                self.reset_continuous();
                self.update_discrete(wrist, now_ms, input_focused, &mut out);
            }
            Some(RawGesture::PointingUp) => {
                self.reset_scroll();
                self.reset_wave();
                self.update_pointer(frame, now_ms, &mut out);
            }
            Some(RawGesture::ClosedFist) => {
                self.reset_pointer();
                self.reset_wave();
                self.update_scroll(wrist, &mut out);
            }
            Some(RawGesture::OpenPalm) => {
                self.reset_pointer();
                self.reset_scroll();
                self.update_wave(wrist, now_ms, input_focused, &mut out);
            }
            _ => self.reset_continuous(),
        }
        out
    }

    // -- discrete message gesture -------------------------------------------

    fn update_discrete(
        &mut self,
        wrist: Option<Landmark>,
        now_ms: u64,
        input_focused: bool,
        out: &mut FrameOutput,
    ) {
        out.progress =
            (self.streak as f32 / self.cfg.persistence_frames as f32).min(1.0);
        if self.streak < self.cfg.persistence_frames {
            return;
        }
        let cooled = self
            .last_trigger_ms
            .map_or(true, |t| now_ms.saturating_sub(t) >= self.cfg.trigger_cooldown_ms);
        let in_region = wrist
            .map_or(false, |w| self.cfg.active_region.contains(w.x, w.y));
        if cooled && in_region && !input_focused {
            debug!(streak = self.streak, "discrete gesture trigger");
            out.actions.push(GestureAction::SendMessage);
            self.last_trigger_ms = Some(now_ms);
            // Counter resets; the candidate stays so a sustained hold only
            // re-triggers after the cooldown.
            self.streak = 0;
        }
    }

    // -- pointing + dwell click ---------------------------------------------

    fn update_pointer(&mut self, frame: &HandFrame, now_ms: u64, out: &mut FrameOutput) {
        let Some(tip) = frame.landmarks.get(INDEX_TIP).copied() else {
            return;
        };
        let target = (tip.x, tip.y);
        let smoothed = match self.pointer {
            Some((sx, sy)) => (
                sx + (target.0 - sx) * self.cfg.pointer_smoothing,
                sy + (target.1 - sy) * self.cfg.pointer_smoothing,
            ),
            None => target,
        };
        self.pointer = Some(smoothed);
        out.pointer = Some(smoothed);
        out.actions.push(GestureAction::PointerMove { x: smoothed.0, y: smoothed.1 });

        match self.dwell_anchor {
            None => {
                self.dwell_anchor = Some(smoothed);
                self.dwell_start_ms = now_ms;
            }
            Some(anchor) => {
                if distance(anchor, smoothed) > self.cfg.dwell_radius {
                    self.dwell_anchor = Some(smoothed);
                    self.dwell_start_ms = now_ms;
                } else {
                    let held = now_ms.saturating_sub(self.dwell_start_ms);
                    out.progress =
                        (held as f32 / self.cfg.dwell_duration_ms as f32).min(1.0);
                    if held >= self.cfg.dwell_duration_ms {
                        debug!(x = smoothed.0, y = smoothed.1, "dwell click");
                        out.actions.push(GestureAction::Click {
                            x: smoothed.0,
                            y: smoothed.1,
                        });
                        self.dwell_anchor = Some(smoothed);
                        self.dwell_start_ms = now_ms;
                    }
                }
            }
        }
    }

    // -- fist scroll --------------------------------------------------------

    fn update_scroll(&mut self, wrist: Option<Landmark>, out: &mut FrameOutput) {
        let Some(w) = wrist else {
            return;
        };
        match self.scroll_ref_y {
            None => {
                self.scroll_ref_y = Some(w.y);
                self.scroll_velocity = 0.0;
            }
            Some(ref_y) => {
                let raw = w.y - ref_y;
                let a = self.cfg.scroll_smoothing;
                self.scroll_velocity = self.scroll_velocity * (1.0 - a) + raw * a;
                if self.scroll_velocity.abs() > self.cfg.scroll_noise_threshold {
                    out.actions.push(GestureAction::Scroll { dy: self.scroll_velocity });
                    // Rebase so a held position cannot accumulate drift.
                    self.scroll_ref_y = Some(w.y);
                }
            }
        }
    }

    // -- wave ---------------------------------------------------------------

    fn update_wave(
        &mut self,
        wrist: Option<Landmark>,
        now_ms: u64,
        input_focused: bool,
        out: &mut FrameOutput,
    ) {
        let Some(w) = wrist else {
            return;
        };
        let Some(last_x) = self.wave.last_x else {
            self.wave = WaveState {
                last_x: Some(w.x),
                direction: 0,
                reversals: 0,
                window_start_ms: now_ms,
                last_move_ms: now_ms,
            };
            return;
        };

        let idle = now_ms.saturating_sub(self.wave.last_move_ms);
        let window_age = now_ms.saturating_sub(self.wave.window_start_ms);
        if idle > self.cfg.wave_idle_timeout_ms || window_age > self.cfg.wave_window_ms {
            self.wave = WaveState {
                last_x: Some(w.x),
                direction: 0,
                reversals: 0,
                window_start_ms: now_ms,
                last_move_ms: now_ms,
            };
            return;
        }

        let delta = w.x - last_x;
        if delta.abs() >= self.cfg.wave_min_delta {
            let dir: i8 = if delta > 0.0 { 1 } else { -1 };
            if self.wave.direction != 0 && dir != self.wave.direction {
                self.wave.reversals += 1;
            }
            self.wave.direction = dir;
            self.wave.last_x = Some(w.x);
            self.wave.last_move_ms = now_ms;
        }

        if self.wave.reversals >= self.cfg.wave_reversals
            && self.cfg.active_region.contains(w.x, w.y)
            && !input_focused
        {
            debug!(reversals = self.wave.reversals, "wave trigger");
            out.actions.push(GestureAction::SendMessage);
            self.reset_wave();
        }
    }

    // -- state resets -------------------------------------------------------

    fn reset_pointer(&mut self) {
        self.pointer = None;
        self.dwell_anchor = None;
        self.dwell_start_ms = 0;
    }

    fn reset_scroll(&mut self) {
        self.scroll_ref_y = None;
        self.scroll_velocity = 0.0;
    }

    fn reset_wave(&mut self) {
        self.wave = WaveState::default();
    }

    fn reset_continuous(&mut self) {
        self.reset_pointer();
        self.reset_scroll();
        self.reset_wave();
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}
