//! Frame-driven hand-gesture classification.
//!
//! The embedding UI runs an upstream landmark model once per video frame
//! (~30 fps) and feeds each [`HandFrame`] — 21 normalized landmark points
//! plus an optional pre-classified gesture label — into a
//! [`GestureTracker`]. The tracker applies temporal persistence, cooldown
//! and region gating, and emits coarse [`GestureAction`]s: send-message,
//! pointer movement, dwell clicks and smoothed scrolling.
//!
//! All timing flows through an explicit `now_ms` argument so tests control
//! the clock.

mod pose;
mod tracker;

pub use pose::middle_finger_extended;
pub use tracker::{FrameOutput, GestureAction, GestureTracker};

use serde::{Deserialize, Serialize};

/// Landmarks per tracked hand (MediaPipe hand topology).
pub const LANDMARKS_PER_HAND: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

/// A single hand landmark in normalized `[0, 1]` image coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Landmark { x, y, z }
    }
}

/// Raw gesture label from the upstream landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawGesture {
    ThumbsUp,
    OpenPalm,
    ClosedFist,
    PointingUp,
    Victory,
    ILoveYou,
}

impl RawGesture {
    /// Parse the label strings the landmark model emits.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Thumb_Up" => Some(RawGesture::ThumbsUp),
            "Open_Palm" => Some(RawGesture::OpenPalm),
            "Closed_Fist" => Some(RawGesture::ClosedFist),
            "Pointing_Up" => Some(RawGesture::PointingUp),
            "Victory" => Some(RawGesture::Victory),
            "ILoveYou" => Some(RawGesture::ILoveYou),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RawGesture::ThumbsUp => "thumbs_up",
            RawGesture::OpenPalm => "open_palm",
            RawGesture::ClosedFist => "closed_fist",
            RawGesture::PointingUp => "pointing_up",
            RawGesture::Victory => "victory",
            RawGesture::ILoveYou => "i_love_you",
        }
    }
}

/// One frame of upstream landmark-model output for a single hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandFrame {
    pub landmarks: Vec<Landmark>,
    pub gesture: Option<RawGesture>,
    pub confidence: f32,
}

impl HandFrame {
    pub fn wrist(&self) -> Option<Landmark> {
        self.landmarks.get(WRIST).copied()
    }
}

/// Normalized screen rectangle inside which message gestures are accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Region {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl Region {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Region { x_min, y_min, x_max, y_max }
    }

    /// The whole frame.
    pub fn full() -> Self {
        Region::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Tunable thresholds for the gesture state machines.
///
/// The defaults are the tuned constants from live use; every one is
/// overridable because none of them has a derivable "correct" value.
#[derive(Debug, Clone)]
pub struct GestureConfig {
    /// Raw labels below this confidence are treated as no gesture.
    pub min_confidence: f32,
    /// Consecutive frames a discrete gesture must persist before triggering.
    pub persistence_frames: u32,
    /// Minimum time between discrete triggers.
    pub trigger_cooldown_ms: u64,
    /// Message gestures only fire with the wrist inside this region.
    pub active_region: Region,
    /// Exponential smoothing factor for the pointing cursor.
    pub pointer_smoothing: f32,
    /// Dwell anchor radius in normalized coordinates.
    pub dwell_radius: f32,
    /// Hold time before a dwell click fires.
    pub dwell_duration_ms: u64,
    /// Weight of the newest delta in the scroll velocity estimate.
    pub scroll_smoothing: f32,
    /// Scroll events fire only above this velocity magnitude.
    pub scroll_noise_threshold: f32,
    /// Rolling window for counting wave direction reversals.
    pub wave_window_ms: u64,
    /// Wave tracking resets after this much time without movement.
    pub wave_idle_timeout_ms: u64,
    /// Direction reversals required to count as a wave.
    pub wave_reversals: u32,
    /// Minimum wrist-x movement that counts as a direction move.
    pub wave_min_delta: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureConfig {
            min_confidence: 0.5,
            persistence_frames: 6,
            trigger_cooldown_ms: 1_500,
            active_region: Region::new(0.05, 0.05, 0.95, 0.95),
            pointer_smoothing: 0.35,
            dwell_radius: 0.05,
            dwell_duration_ms: 900,
            scroll_smoothing: 0.4,
            scroll_noise_threshold: 0.004,
            wave_window_ms: 1_500,
            wave_idle_timeout_ms: 600,
            wave_reversals: 4,
            wave_min_delta: 0.02,
        }
    }
}
