//! Motion energy: squared mean absolute acceleration of a joint subset.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::skeleton::Frame;

/// Energy of each frame of `frames`, measured over `joints`.
///
/// `accel[i] = (f[i+1] - f[i]) - (f[i] - f[i-1])`; energy is the mean of
/// `|accel|` over every input coordinate of the selected joints, squared:
/// two per joint for planar frames, three otherwise. The first and last
/// frame have no second difference and report 0.
pub fn frame_energy(frames: &[Frame], joints: &[usize]) -> Result<Vec<f32>> {
    let mut energy = vec![0.0; frames.len()];
    if frames.len() < 3 || joints.is_empty() {
        return Ok(energy);
    }
    for i in 1..frames.len() - 1 {
        let dims = frames[i].dims();
        let mut sum = 0.0f32;
        for &j in joints {
            let prev = frames[i - 1].joint(j)?;
            let curr = frames[i].joint(j)?;
            let next = frames[i + 1].joint(j)?;
            let accel = (next - curr) - (curr - prev);
            sum += accel.iter().take(dims).map(|c| c.abs()).sum::<f32>();
        }
        let mean = sum / (joints.len() * dims) as f32;
        energy[i] = mean * mean;
    }
    Ok(energy)
}

/// Energy per named sequence. Sequences never mix.
pub fn energy_by_name(
    sequences: &BTreeMap<String, Vec<Frame>>,
    joints: &[usize],
) -> Result<BTreeMap<String, Vec<f32>>> {
    sequences
        .iter()
        .map(|(name, frames)| -> Result<(String, Vec<f32>)> {
            Ok((name.clone(), frame_energy(frames, joints)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::skeleton::{BvhJoint, Topology};
    use nalgebra::Vector3;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    /// Frames where joint 10 follows `xs` along x; everything else is still.
    fn track(xs: &[f32]) -> Vec<Frame> {
        xs.iter()
            .map(|&x| {
                let mut joints = vec![Vector3::zeros(); BvhJoint::COUNT];
                joints[10] = Vector3::new(x, 0.0, 0.0);
                Frame::new(Topology::Bvh33, joints).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_boundaries_are_zero() {
        let e = frame_energy(&track(&[0.0, 1.0, 4.0, 9.0, 16.0]), &[10]).unwrap();
        assert_eq!(e.len(), 5);
        assert_eq!(e[0], 0.0);
        assert_eq!(e[4], 0.0);
        assert!(e[1..4].iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_constant_velocity_has_no_energy() {
        let e = frame_energy(&track(&[0.0, 1.0, 2.0, 3.0]), &[10]).unwrap();
        assert!(e.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_value() {
        // accel.x = 2 at every interior frame; mean over 3 coords = 2/3
        let e = frame_energy(&track(&[0.0, 1.0, 4.0, 9.0]), &[10]).unwrap();
        assert!(approx_eq_f32(e[1], (2.0f32 / 3.0).powi(2), 1e-6));
    }

    #[test]
    fn test_planar_frames_average_two_coords() {
        let frames: Vec<Frame> = [0.0f32, 1.0, 4.0]
            .iter()
            .map(|&x| {
                let mut coords = vec![0.0; BvhJoint::COUNT * 2];
                coords[20] = x;
                Frame::from_flat(Topology::Bvh33, &coords, 2).unwrap()
            })
            .collect();
        let e = frame_energy(&frames, &[10]).unwrap();
        // accel.x = 2 over 2 coords
        assert!(approx_eq_f32(e[1], 1.0, 1e-6));
    }

    #[test]
    fn test_short_sequences() {
        assert!(frame_energy(&[], &[10]).unwrap().is_empty());
        assert_eq!(frame_energy(&track(&[0.0, 5.0]), &[10]).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_joint() {
        assert!(matches!(
            frame_energy(&track(&[0.0, 1.0, 4.0]), &[40]),
            Err(SyncError::MissingJoint { index: 40, .. })
        ));
    }

    #[test]
    fn test_by_name_keeps_sequences_apart() {
        let mut seqs = BTreeMap::new();
        seqs.insert("still".to_string(), track(&[1.0, 1.0, 1.0]));
        seqs.insert("moving".to_string(), track(&[0.0, 1.0, 4.0]));
        let e = energy_by_name(&seqs, &[10]).unwrap();
        assert_eq!(e["still"], vec![0.0, 0.0, 0.0]);
        assert!(e["moving"][1] > 0.0);
    }
}
