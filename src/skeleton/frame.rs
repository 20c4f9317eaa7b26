use nalgebra::{Vector2, Vector3};

use super::topology::Topology;
use crate::error::{Result, SyncError};

/// Two spatial axes a 3D frame is projected onto for planar geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneAxes {
    pub horizontal: usize,
    pub vertical: usize,
}

impl PlaneAxes {
    pub const XY: PlaneAxes = PlaneAxes { horizontal: 0, vertical: 1 };

    pub fn new(horizontal: usize, vertical: usize) -> Self {
        Self { horizontal, vertical }
    }

    pub fn project(&self, p: &Vector3<f32>) -> Vector2<f32> {
        Vector2::new(p[self.horizontal], p[self.vertical])
    }
}

impl Default for PlaneAxes {
    fn default() -> Self {
        Self::XY
    }
}

/// One skeleton sample: exactly `topology.joint_count()` joint positions.
/// Planar input keeps `dims == 2` and sits on z = 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    topology: Topology,
    joints: Vec<Vector3<f32>>,
    dims: usize,
}

impl Frame {
    pub fn new(topology: Topology, joints: Vec<Vector3<f32>>) -> Result<Self> {
        if joints.len() != topology.joint_count() {
            return Err(SyncError::MalformedFrame(format!(
                "{} joints for {topology} (expected {})",
                joints.len(),
                topology.joint_count()
            )));
        }
        if let Some(i) = joints.iter().position(|j| !j.iter().all(|c| c.is_finite())) {
            return Err(SyncError::MalformedFrame(format!("joint {i} is not finite")));
        }
        Ok(Self { topology, joints, dims: 3 })
    }

    /// Builds a frame from packed coordinates, `dims` (2 or 3) per joint.
    /// 2D input is lifted onto the z = 0 plane.
    pub fn from_flat(topology: Topology, coords: &[f32], dims: usize) -> Result<Self> {
        if dims != 2 && dims != 3 {
            return Err(SyncError::MalformedFrame(format!("unsupported dimension {dims}")));
        }
        if coords.len() != topology.joint_count() * dims {
            return Err(SyncError::MalformedFrame(format!(
                "{} values cannot be reshaped into {} x {dims}",
                coords.len(),
                topology.joint_count()
            )));
        }
        let joints = coords
            .chunks_exact(dims)
            .map(|c| Vector3::new(c[0], c[1], if dims == 3 { c[2] } else { 0.0 }))
            .collect();
        let mut frame = Self::new(topology, joints)?;
        frame.dims = dims;
        Ok(frame)
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Coordinates per joint in the original input (2 or 3).
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joints(&self) -> &[Vector3<f32>] {
        &self.joints
    }

    pub fn get(&self, index: usize) -> Option<&Vector3<f32>> {
        self.joints.get(index)
    }

    /// Joint position, or `MissingJoint` when the index is out of range.
    pub fn joint(&self, index: usize) -> Result<Vector3<f32>> {
        self.joints.get(index).copied().ok_or(SyncError::MissingJoint {
            index,
            joint_count: self.joints.len(),
        })
    }

    pub fn joint_2d(&self, index: usize, axes: PlaneAxes) -> Result<Vector2<f32>> {
        self.joint(index).map(|p| axes.project(&p))
    }

    /// Same motion with every joint transformed.
    pub(crate) fn map_joints(&self, f: impl Fn(&Vector3<f32>) -> Vector3<f32>) -> Frame {
        Frame {
            topology: self.topology,
            joints: self.joints.iter().map(f).collect(),
            dims: self.dims,
        }
    }

    /// Translates the frame into `target` through the fixed index table.
    pub fn remap(&self, target: Topology) -> Result<Frame> {
        match target.mapping_from(self.topology) {
            None if target == self.topology => Ok(self.clone()),
            None => Err(SyncError::MalformedFrame(format!(
                "no joint mapping from {} to {target}",
                self.topology
            ))),
            Some(table) => {
                let joints = table
                    .iter()
                    .map(|&src| self.joint(src))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Frame { topology: target, joints, dims: self.dims })
            }
        }
    }
}
