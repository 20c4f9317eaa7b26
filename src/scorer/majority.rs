//! Interval-smoothed majority voting over angle agreement.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::motion::AngleCalculator;
use crate::reference::ReferenceTrack;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorityVerdict {
    /// Reference frame of the last sample in the interval.
    pub reference_index: usize,
    pub samples: usize,
    pub averaged_angles: Vec<f32>,
    pub reference_angles: Vec<f32>,
    pub angles_close: Vec<bool>,
    pub choreography_valid: bool,
    /// Frames of the interval that passed the vote on their own.
    pub frames_valid: usize,
}

/// More than half of `flags` are set.
pub fn majority(flags: &[bool]) -> bool {
    flags.iter().filter(|&&f| f).count() * 2 > flags.len()
}

#[derive(Debug, Clone)]
pub struct MajorityScorer {
    interval: Duration,
    tolerance: f32,
    started: Option<Instant>,
    samples: Vec<Vec<f32>>,
    frame_close: Vec<Vec<bool>>,
    indices: Vec<usize>,
}

impl MajorityScorer {
    pub fn new(interval: Duration, tolerance: f32) -> Self {
        Self {
            interval,
            tolerance,
            started: None,
            samples: Vec::new(),
            frame_close: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.samples.len()
    }

    /// Adds one frame. Returns a verdict once `interval` of wall-clock time
    /// has passed since the interval started; the next interval starts at
    /// `now`.
    pub fn observe(
        &mut self,
        calc: &AngleCalculator,
        track: &ReferenceTrack,
        reference_index: usize,
        live_angles: Vec<f32>,
        now: Instant,
    ) -> Option<MajorityVerdict> {
        let started = *self.started.get_or_insert(now);
        let reference = track.angles_at(reference_index).to_vec();
        self.frame_close.push(calc.within_tolerance(&live_angles, &reference, self.tolerance));
        self.samples.push(live_angles);
        self.indices.push(reference_index);

        if now.saturating_duration_since(started) < self.interval {
            return None;
        }
        let verdict = self.flush(calc, track);
        self.reset();
        self.started = Some(now);
        Some(verdict)
    }

    fn flush(&self, calc: &AngleCalculator, track: &ReferenceTrack) -> MajorityVerdict {
        let mut averaged_angles = Vec::with_capacity(calc.len());
        let mut reference_angles = Vec::with_capacity(calc.len());
        for (k, spec) in calc.specs().iter().enumerate() {
            let live: Vec<f32> = self.samples.iter().filter_map(|s| s.get(k).copied()).collect();
            let reference: Vec<f32> = self
                .indices
                .iter()
                .filter_map(|&i| track.angles().get((i, k)).copied())
                .collect();
            averaged_angles.push(spec.mean(&live).unwrap_or(0.0));
            reference_angles.push(spec.mean(&reference).unwrap_or(0.0));
        }
        let angles_close = calc.within_tolerance(&averaged_angles, &reference_angles, self.tolerance);

        MajorityVerdict {
            reference_index: self.indices.last().copied().unwrap_or(0),
            samples: self.samples.len(),
            choreography_valid: majority(&angles_close),
            frames_valid: self.frame_close.iter().filter(|f| majority(f)).count(),
            averaged_angles,
            reference_angles,
            angles_close,
        }
    }

    pub fn reset(&mut self) {
        self.started = None;
        self.samples.clear();
        self.frame_close.clear();
        self.indices.clear();
    }
}
