//! Joint angles measured in a 2D projection of the skeleton.

use log::debug;
use nalgebra::Vector2;
use ndarray::Array2;

use crate::error::{Result, SyncError};
use crate::skeleton::{Frame, PlaneAxes, Topology};

/// Folds any angle in degrees into `[0, 360)`.
pub fn wrap_degrees(deg: f32) -> f32 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to the modulus itself
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Angle at vertex `b` from ray `b→c` to ray `b→a`, counter-clockwise, in
/// `[0, 360)`. Direction-sensitive: swapping `a` and `c` gives `360 - angle`.
pub fn three_point_angle(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> f32 {
    let ba = a - b;
    let bc = c - b;
    let deg = ba.y.atan2(ba.x).to_degrees() - bc.y.atan2(bc.x).to_degrees();
    wrap_degrees(deg + 360.0)
}

/// Angle between the limb `start→end` and the vertical axis, in `[0, 180]`.
pub fn limb_vertical_angle(start: Vector2<f32>, end: Vector2<f32>) -> f32 {
    let d = end - start;
    let angle = d.x.atan2(d.y).to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

/// Shortest distance between two directions on the circle; never above 180.
pub fn circular_distance(a: f32, b: f32) -> f32 {
    let diff = wrap_degrees(a - b);
    diff.min(360.0 - diff)
}

/// Mean direction of a set of angles, `None` for an empty set.
pub fn circular_mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let (s, c) = values.iter().fold((0.0f32, 0.0f32), |(s, c), v| {
        let r = v.to_radians();
        (s + r.sin(), c + r.cos())
    });
    Some(wrap_degrees(s.atan2(c).to_degrees()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleKind {
    /// Angle at `b` between rays to `a` and `c`.
    Joint { a: usize, b: usize, c: usize },
    /// Limb `start→end` against the vertical.
    Limb { start: usize, end: usize },
}

/// A named angle to monitor. Static configuration, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleSpec {
    pub name: String,
    pub kind: AngleKind,
}

impl AngleSpec {
    pub fn joint(name: impl Into<String>, a: usize, b: usize, c: usize) -> Self {
        Self { name: name.into(), kind: AngleKind::Joint { a, b, c } }
    }

    pub fn limb(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self { name: name.into(), kind: AngleKind::Limb { start, end } }
    }

    /// Three joint names make a joint angle, two a limb angle.
    pub fn from_names<S: AsRef<str>>(topology: Topology, names: &[S]) -> Result<Self> {
        let idx = names
            .iter()
            .map(|n| topology.resolve(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let label = names.iter().map(|n| n.as_ref()).collect::<Vec<_>>().join("-");
        match idx.as_slice() {
            [a, b, c] => Ok(Self::joint(label, *a, *b, *c)),
            [start, end] => Ok(Self::limb(label, *start, *end)),
            _ => Err(SyncError::InvalidAngle { label, joints: idx.len() }),
        }
    }

    /// Joint angles live on the full circle; limb angles are folded to 180.
    pub fn is_full_circle(&self) -> bool {
        matches!(self.kind, AngleKind::Joint { .. })
    }

    pub fn measure(&self, frame: &Frame, axes: PlaneAxes) -> Result<f32> {
        match self.kind {
            AngleKind::Joint { a, b, c } => Ok(three_point_angle(
                frame.joint_2d(a, axes)?,
                frame.joint_2d(b, axes)?,
                frame.joint_2d(c, axes)?,
            )),
            AngleKind::Limb { start, end } => Ok(limb_vertical_angle(
                frame.joint_2d(start, axes)?,
                frame.joint_2d(end, axes)?,
            )),
        }
    }

    /// Difference between two values of this angle, in degrees.
    pub fn distance(&self, a: f32, b: f32) -> f32 {
        if self.is_full_circle() {
            circular_distance(a, b)
        } else {
            (a - b).abs()
        }
    }

    /// Average of several values of this angle.
    pub fn mean(&self, values: &[f32]) -> Option<f32> {
        if self.is_full_circle() {
            circular_mean(values)
        } else if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f32>() / values.len() as f32)
        }
    }
}

/// Computes a fixed list of angles for frames of one topology.
#[derive(Debug, Clone)]
pub struct AngleCalculator {
    specs: Vec<AngleSpec>,
}

impl AngleCalculator {
    pub fn new(specs: Vec<AngleSpec>) -> Self {
        Self { specs }
    }

    /// The topology's default shoulder and elbow angles.
    pub fn default_for(topology: Topology) -> Self {
        let names = topology.joint_names();
        let specs = topology
            .default_angle_triplets()
            .into_iter()
            .map(|[a, b, c]| AngleSpec::joint(names[b], a, b, c))
            .collect();
        Self::new(specs)
    }

    pub fn specs(&self) -> &[AngleSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Angles in spec order. A spec whose joints are missing yields 0 for that
    /// entry only.
    pub fn frame_angles(&self, frame: &Frame, axes: PlaneAxes) -> Vec<f32> {
        self.specs
            .iter()
            .map(|spec| {
                spec.measure(frame, axes).unwrap_or_else(|e| {
                    debug!("angle {}: {e}, using 0", spec.name);
                    0.0
                })
            })
            .collect()
    }

    /// `frames.len() x specs.len()` matrix, one row per frame.
    pub fn batch(&self, frames: &[Frame], axes: PlaneAxes) -> Array2<f32> {
        let mut out = Array2::zeros((frames.len(), self.specs.len()));
        for (mut row, frame) in out.rows_mut().into_iter().zip(frames) {
            for (cell, angle) in row.iter_mut().zip(self.frame_angles(frame, axes)) {
                *cell = angle;
            }
        }
        out
    }

    /// Per-angle "within tolerance" flags for two angle vectors.
    pub fn within_tolerance(&self, live: &[f32], reference: &[f32], tolerance: f32) -> Vec<bool> {
        self.specs
            .iter()
            .zip(live.iter().zip(reference))
            .map(|(spec, (l, r))| spec.distance(*l, *r) <= tolerance)
            .collect()
    }

    /// Mean normalized difference in `[0, 1]`: each angle's difference divided
    /// by 180, averaged over the specs.
    pub fn distortion(&self, live: &[f32], reference: &[f32]) -> f32 {
        if self.specs.is_empty() {
            return 0.0;
        }
        let total: f32 = self
            .specs
            .iter()
            .zip(live.iter().zip(reference))
            .map(|(spec, (l, r))| spec.distance(*l, *r) / 180.0)
            .sum();
        total / self.specs.len() as f32
    }
}
