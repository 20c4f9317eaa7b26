//! Windowed hand-position proximity with optional mirroring.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::reference::ReferenceTrack;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityVerdict {
    pub reference_index: usize,
    pub threshold: f32,
    pub left_valid: bool,
    pub right_valid: bool,
    pub choreography_valid: bool,
}

/// Horizontal mirror image around the body's vertical axis.
pub fn mirror(p: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(-p.x, p.y)
}

/// True when `live` (or its mirror image, if enabled) is closer than
/// `threshold` to any position of the window.
pub fn hand_valid<I>(live: Vector2<f32>, window: I, threshold: f32, mirrored: bool) -> bool
where
    I: IntoIterator<Item = Vector2<f32>>,
{
    let flipped = mirror(live);
    window.into_iter().any(|reference| {
        (live - reference).norm() < threshold || (mirrored && (flipped - reference).norm() < threshold)
    })
}

#[derive(Debug, Clone)]
pub struct ProximityScorer {
    window_frames: usize,
    mirrored: bool,
}

impl ProximityScorer {
    pub fn new(window_frames: usize, mirrored: bool) -> Self {
        Self { window_frames: window_frames.max(1), mirrored }
    }

    /// Reference frames `[index - window + 1, index]`, clamped at the start
    /// of the track. Never empty.
    pub fn window(&self, index: usize) -> std::ops::RangeInclusive<usize> {
        index.saturating_sub(self.window_frames - 1)..=index
    }

    /// Judges both live hands (left, right) against the reference hands of
    /// the trailing window.
    pub fn observe(
        &self,
        track: &ReferenceTrack,
        reference_index: usize,
        hands: [Vector2<f32>; 2],
    ) -> ProximityVerdict {
        let threshold = track.phases().threshold_at(reference_index);
        let range = self.window(reference_index);
        let valid = |side: usize| {
            let window = range.clone().filter_map(|i| track.hands_at(i)).map(|h| h[side]);
            hand_valid(hands[side], window, threshold, self.mirrored)
        };
        let left_valid = valid(0);
        let right_valid = valid(1);

        ProximityVerdict {
            reference_index,
            threshold,
            left_valid,
            right_valid,
            choreography_valid: left_valid && right_valid,
        }
    }
}
