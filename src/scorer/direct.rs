//! Direct angle-difference scoring with a running in-sync percentage.

use serde::{Deserialize, Serialize};

use crate::motion::AngleCalculator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVerdict {
    pub reference_index: usize,
    /// Mean normalized angle difference, 0 (identical) to 1 (opposite).
    pub distortion: f32,
    pub in_sync: bool,
    /// Share of frames in sync since the session (or level) started, 0-100.
    pub sync_percentage: f32,
    pub frames_seen: u64,
    pub frames_in_sync: u64,
    pub live_angles: Vec<f32>,
    pub reference_angles: Vec<f32>,
    pub angles_close: Vec<bool>,
    pub live_energy: f32,
    pub reference_energy: f32,
}

/// Per-frame comparison input.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectInput {
    pub reference_index: usize,
    pub live_angles: Vec<f32>,
    pub reference_angles: Vec<f32>,
    pub live_energy: f32,
    pub reference_energy: f32,
}

#[derive(Debug, Clone)]
pub struct DirectScorer {
    sync_threshold: f32,
    tolerance: f32,
    frames_seen: u64,
    frames_in_sync: u64,
}

impl DirectScorer {
    pub fn new(sync_threshold: f32, tolerance: f32) -> Self {
        Self { sync_threshold, tolerance, frames_seen: 0, frames_in_sync: 0 }
    }

    pub fn observe(&mut self, calc: &AngleCalculator, input: DirectInput) -> ScoreVerdict {
        let distortion = calc.distortion(&input.live_angles, &input.reference_angles);
        let in_sync = distortion < self.sync_threshold;
        self.frames_seen += 1;
        if in_sync {
            self.frames_in_sync += 1;
        }

        ScoreVerdict {
            reference_index: input.reference_index,
            distortion,
            in_sync,
            sync_percentage: self.sync_percentage(),
            frames_seen: self.frames_seen,
            frames_in_sync: self.frames_in_sync,
            angles_close: calc.within_tolerance(&input.live_angles, &input.reference_angles, self.tolerance),
            live_angles: input.live_angles,
            reference_angles: input.reference_angles,
            live_energy: input.live_energy,
            reference_energy: input.reference_energy,
        }
    }

    pub fn sync_percentage(&self) -> f32 {
        if self.frames_seen == 0 {
            0.0
        } else {
            self.frames_in_sync as f32 / self.frames_seen as f32 * 100.0
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn reset(&mut self) {
        self.frames_seen = 0;
        self.frames_in_sync = 0;
    }
}
