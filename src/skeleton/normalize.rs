//! Canonical pose: root-centered, scaled so the farthest joint sits at unit
//! distance from the root.

use std::collections::BTreeMap;

use log::debug;
use nalgebra::Vector3;

use super::frame::{Frame, PlaneAxes};
use crate::error::{Result, SyncError};

/// Normalization applies uniformly to a frame, a sequence of frames, or a
/// keyed set of sequences (one per choreography).
pub trait Normalize {
    type Output;

    fn normalized(&self) -> Result<Self::Output>;
}

impl Normalize for Frame {
    type Output = Frame;

    fn normalized(&self) -> Result<Frame> {
        let root = self.joint(self.topology().root())?;
        let scale = match reach(self, &root) {
            Ok(scale) => scale,
            Err(e) => {
                debug!("{e}; using unit scale");
                1.0
            }
        };
        Ok(self.map_joints(|p| (p - root) / scale))
    }
}

impl<T: Normalize> Normalize for [T] {
    type Output = Vec<T::Output>;

    fn normalized(&self) -> Result<Self::Output> {
        self.iter().map(T::normalized).collect()
    }
}

impl<T: Normalize> Normalize for Vec<T> {
    type Output = Vec<T::Output>;

    fn normalized(&self) -> Result<Self::Output> {
        self.as_slice().normalized()
    }
}

impl<K: Ord + Clone, T: Normalize> Normalize for BTreeMap<K, T> {
    type Output = BTreeMap<K, T::Output>;

    fn normalized(&self) -> Result<Self::Output> {
        self.iter()
            .map(|(k, v)| -> Result<(K, T::Output)> { Ok((k.clone(), v.normalized()?)) })
            .collect()
    }
}

/// Largest root-to-joint distance. Zero (every joint on the root) has no
/// usable scale.
fn reach(frame: &Frame, root: &Vector3<f32>) -> Result<f32> {
    let max = frame
        .joints()
        .iter()
        .map(|p| (p - root).norm())
        .fold(0.0f32, f32::max);
    if max > 0.0 && max.is_finite() {
        Ok(max)
    } else {
        Err(SyncError::DegenerateGeometry("all joints coincide with the root"))
    }
}

/// First index holding the largest value.
fn argmax(values: impl Iterator<Item = (usize, f32)>) -> Option<usize> {
    values
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Picks the world axes that best match the performer's left/right and
/// up/down directions: horizontal is the axis with the widest shoulder
/// separation, vertical the remaining axis with the largest neck-to-hip
/// extent. A heuristic; it assumes a roughly upright, camera-facing pose.
pub fn select_axes(frame: &Frame) -> Result<PlaneAxes> {
    let lm = frame.topology().landmarks();
    let across = (frame.joint(lm.left_shoulder)? - frame.joint(lm.right_shoulder)?).abs();
    let along = (frame.joint(lm.neck)? - frame.joint(lm.root)?).abs();

    let horizontal = argmax((0..3).map(|a| (a, across[a]))).unwrap_or(0);
    let vertical = argmax((0..3).filter(|&a| a != horizontal).map(|a| (a, along[a])))
        .unwrap_or(if horizontal == 1 { 0 } else { 1 });
    Ok(PlaneAxes::new(horizontal, vertical))
}

/// How the 2D projection plane is chosen for a stream of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisMode {
    /// [`select_axes`] on the first frame seen.
    Auto,
    Fixed(PlaneAxes),
}

impl AxisMode {
    pub fn resolve(self, frame: &Frame) -> Result<PlaneAxes> {
        match self {
            Self::Auto => select_axes(frame),
            Self::Fixed(axes) => Ok(axes),
        }
    }
}

impl Default for AxisMode {
    fn default() -> Self {
        Self::Fixed(PlaneAxes::XY)
    }
}
