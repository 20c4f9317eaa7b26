use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::error::Result;
use crate::skeleton::Frame;

/// Samples kept per joint.
pub const DEFAULT_HISTORY_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: Vector3<f32>,
    /// Position on the caller's clock. Velocity and acceleration are per
    /// unit of this clock.
    pub time: f32,
}

/// Bounded position history of one joint with finite-difference velocity
/// and acceleration. The oldest sample is evicted when full.
#[derive(Debug, Clone)]
pub struct JointHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
    velocity: Option<Vector3<f32>>,
    acceleration: Vector3<f32>,
}

impl JointHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            velocity: None,
            acceleration: Vector3::zeros(),
        }
    }

    pub fn push(&mut self, position: Vector3<f32>, time: f32) {
        if let Some(last) = self.samples.back() {
            let dt = time - last.time;
            if dt > 0.0 {
                let velocity = (position - last.position) / dt;
                if let Some(prev) = self.velocity {
                    self.acceleration = (velocity - prev) / dt;
                }
                self.velocity = Some(velocity);
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { position, time });
    }

    pub fn velocity(&self) -> Vector3<f32> {
        self.velocity.unwrap_or_else(Vector3::zeros)
    }

    pub fn acceleration(&self) -> Vector3<f32> {
        self.acceleration
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.velocity = None;
        self.acceleration = Vector3::zeros();
    }
}

/// Histories for the joints whose live energy is tracked (usually both hands).
#[derive(Debug, Clone)]
pub struct TrackedJoints {
    joints: Vec<usize>,
    histories: Vec<JointHistory>,
    dims: usize,
}

impl TrackedJoints {
    pub fn new(joints: Vec<usize>, capacity: usize) -> Self {
        let histories = joints.iter().map(|_| JointHistory::new(capacity)).collect();
        Self { joints, histories, dims: 3 }
    }

    pub fn joints(&self) -> &[usize] {
        &self.joints
    }

    pub fn histories(&self) -> &[JointHistory] {
        &self.histories
    }

    /// Positions of the tracked joints in `frame`, in tracking order.
    pub fn positions(&self, frame: &Frame) -> Result<Vec<Vector3<f32>>> {
        self.joints.iter().map(|&j| frame.joint(j)).collect()
    }

    /// Appends one sample per joint. Positions come from [`positions`](Self::positions)
    /// and `dims` from the frame they were read from.
    pub fn push(&mut self, positions: &[Vector3<f32>], dims: usize, time: f32) {
        self.dims = dims;
        for (history, p) in self.histories.iter_mut().zip(positions) {
            history.push(*p, time);
        }
    }

    /// Live counterpart of the reference energy: mean absolute acceleration
    /// over every tracked input coordinate, squared. Comparable with
    /// [`frame_energy`](super::frame_energy) when samples are timed in
    /// reference frames.
    pub fn energy(&self) -> f32 {
        if self.histories.is_empty() {
            return 0.0;
        }
        let dims = self.dims;
        let sum: f32 = self
            .histories
            .iter()
            .map(|h| h.acceleration().iter().take(dims).map(|c| c.abs()).sum::<f32>())
            .sum();
        let mean = sum / (self.histories.len() * dims) as f32;
        mean * mean
    }

    pub fn clear(&mut self) {
        for h in &mut self.histories {
            h.clear();
        }
    }
}
