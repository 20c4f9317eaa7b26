//! Pre-parsed animation files: global joint positions per frame plus a fixed
//! frame time. Parsing BVH/FBX happens upstream; this module only reads the
//! exported result.

use std::fs;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::skeleton::{Frame, Topology};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    /// Seconds between frames.
    pub frame_time: f32,
    pub joint_names: Vec<String>,
    /// `frames[i][j]` is the global position of `joint_names[j]` in frame `i`.
    pub frames: Vec<Vec<[f32; 3]>>,
}

impl AnimationClip {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Seconds covered by the clip.
    pub fn duration(&self) -> f32 {
        self.frame_time * self.frames.len() as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(SyncError::Animation("clip has no frames".into()));
        }
        if !(self.frame_time > 0.0 && self.frame_time.is_finite()) {
            return Err(SyncError::Animation(format!(
                "frame time must be positive, got {}",
                self.frame_time
            )));
        }
        let width = self.joint_names.len();
        if let Some(i) = self.frames.iter().position(|f| f.len() != width) {
            return Err(SyncError::Animation(format!(
                "frame {i} has {} joints, expected {width}",
                self.frames[i].len()
            )));
        }
        Ok(())
    }

    /// Frames laid out in `topology`, matching joints by name. Extra joints
    /// in the clip are ignored; a missing one rejects the clip.
    pub fn to_frames(&self, topology: Topology) -> Result<Vec<Frame>> {
        self.validate()?;
        let columns = topology
            .joint_names()
            .iter()
            .map(|name| {
                self.joint_names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| SyncError::Animation(format!("clip lacks joint '{name}' of {topology}")))
            })
            .collect::<Result<Vec<_>>>()?;

        self.frames
            .iter()
            .map(|positions| {
                let joints = columns
                    .iter()
                    .map(|&c| Vector3::from(positions[c]))
                    .collect();
                Frame::new(topology, joints)
            })
            .collect()
    }
}

/// Anything that can produce a clip for a level's animation path.
pub trait AnimationSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<AnimationClip>;
}

/// Reads clips exported as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAnimationSource;

impl AnimationSource for JsonAnimationSource {
    fn open(&self, path: &Path) -> Result<AnimationClip> {
        let text = fs::read_to_string(path)?;
        let clip: AnimationClip = serde_json::from_str(&text)?;
        clip.validate()?;
        Ok(clip)
    }
}
