//! Landmark geometry checks that the upstream model's label set does not
//! cover.

use super::{
    Landmark, INDEX_TIP, LANDMARKS_PER_HAND, MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP, PINKY_TIP,
    RING_TIP, WRIST,
};

/// How much farther (squared) the middle tip must sit from the wrist than
/// every other fingertip for the pose to count.
const EXTENSION_MARGIN: f32 = 1.4;

/// Detect an extended middle finger with the other fingers curled.
///
/// Uses squared distance from the wrist: the middle fingertip must be the
/// clear outlier, and the middle finger must be straight — distances grow
/// monotonically along mcp → pip → tip.
pub fn middle_finger_extended(landmarks: &[Landmark]) -> bool {
    if landmarks.len() < LANDMARKS_PER_HAND {
        return false;
    }
    let wrist = landmarks[WRIST];
    let tip = dist_sq(landmarks[MIDDLE_TIP], wrist);
    let pip = dist_sq(landmarks[MIDDLE_PIP], wrist);
    let mcp = dist_sq(landmarks[MIDDLE_MCP], wrist);

    // Straightness: a curled middle finger folds its tip back toward the wrist.
    if !(tip > pip && pip > mcp) {
        return false;
    }

    [INDEX_TIP, RING_TIP, PINKY_TIP]
        .iter()
        .all(|&i| tip > dist_sq(landmarks[i], wrist) * EXTENSION_MARGIN)
}

fn dist_sq(a: Landmark, b: Landmark) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}
