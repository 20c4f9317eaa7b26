use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Joints of the 38-keypoint detector format (camera body tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Body38Joint {
    Pelvis = 0,
    Spine1 = 1,
    Spine2 = 2,
    Spine3 = 3,
    Neck = 4,
    Nose = 5,
    LeftEye = 6,
    RightEye = 7,
    LeftEar = 8,
    RightEar = 9,
    LeftClavicle = 10,
    RightClavicle = 11,
    LeftShoulder = 12,
    RightShoulder = 13,
    LeftElbow = 14,
    RightElbow = 15,
    LeftWrist = 16,
    RightWrist = 17,
    LeftHip = 18,
    RightHip = 19,
    LeftKnee = 20,
    RightKnee = 21,
    LeftAnkle = 22,
    RightAnkle = 23,
    LeftBigToe = 24,
    RightBigToe = 25,
    LeftSmallToe = 26,
    RightSmallToe = 27,
    LeftHeel = 28,
    RightHeel = 29,
    LeftHandThumb4 = 30,
    RightHandThumb4 = 31,
    LeftHandIndex1 = 32,
    RightHandIndex1 = 33,
    LeftHandMiddle4 = 34,
    RightHandMiddle4 = 35,
    LeftHandPinky1 = 36,
    RightHandPinky1 = 37,
}

impl Body38Joint {
    pub const COUNT: usize = 38;

    const ALL: [Body38Joint; Self::COUNT] = {
        use Body38Joint::*;
        [
            Pelvis, Spine1, Spine2, Spine3, Neck, Nose, LeftEye, RightEye, LeftEar, RightEar,
            LeftClavicle, RightClavicle, LeftShoulder, RightShoulder, LeftElbow, RightElbow,
            LeftWrist, RightWrist, LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            LeftBigToe, RightBigToe, LeftSmallToe, RightSmallToe, LeftHeel, RightHeel,
            LeftHandThumb4, RightHandThumb4, LeftHandIndex1, RightHandIndex1, LeftHandMiddle4,
            RightHandMiddle4, LeftHandPinky1, RightHandPinky1,
        ]
    };

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        BODY38_NAMES[self as usize]
    }
}

/// Joints of the 33-joint skeleton exported from the BVH choreography files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BvhJoint {
    Hips = 0,
    Spine = 1,
    Spine1 = 2,
    Spine2 = 3,
    Neck = 4,
    Head = 5,
    HeadEnd = 6,
    LeftShoulder = 7,
    LeftArm = 8,
    LeftForeArm = 9,
    LeftHand = 10,
    LeftHandIndex1 = 11,
    LeftHandIndex2 = 12,
    LeftHandIndex3 = 13,
    LeftHandIndex3End = 14,
    RightShoulder = 15,
    RightArm = 16,
    RightForeArm = 17,
    RightHand = 18,
    RightHandIndex1 = 19,
    RightHandIndex2 = 20,
    RightHandIndex3 = 21,
    RightHandIndex3End = 22,
    LeftUpLeg = 23,
    LeftLeg = 24,
    LeftFoot = 25,
    LeftToeBase = 26,
    LeftToeBaseEnd = 27,
    RightUpLeg = 28,
    RightLeg = 29,
    RightFoot = 30,
    RightToeBase = 31,
    RightToeBaseEnd = 32,
}

impl BvhJoint {
    pub const COUNT: usize = 33;

    const ALL: [BvhJoint; Self::COUNT] = {
        use BvhJoint::*;
        [
            Hips, Spine, Spine1, Spine2, Neck, Head, HeadEnd, LeftShoulder, LeftArm, LeftForeArm,
            LeftHand, LeftHandIndex1, LeftHandIndex2, LeftHandIndex3, LeftHandIndex3End,
            RightShoulder, RightArm, RightForeArm, RightHand, RightHandIndex1, RightHandIndex2,
            RightHandIndex3, RightHandIndex3End, LeftUpLeg, LeftLeg, LeftFoot, LeftToeBase,
            LeftToeBaseEnd, RightUpLeg, RightLeg, RightFoot, RightToeBase, RightToeBaseEnd,
        ]
    };

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        BVH33_NAMES[self as usize]
    }
}

const BODY38_NAMES: [&str; Body38Joint::COUNT] = [
    "PELVIS", "SPINE_1", "SPINE_2", "SPINE_3", "NECK", "NOSE", "LEFT_EYE", "RIGHT_EYE",
    "LEFT_EAR", "RIGHT_EAR", "LEFT_CLAVICLE", "RIGHT_CLAVICLE", "LEFT_SHOULDER",
    "RIGHT_SHOULDER", "LEFT_ELBOW", "RIGHT_ELBOW", "LEFT_WRIST", "RIGHT_WRIST", "LEFT_HIP",
    "RIGHT_HIP", "LEFT_KNEE", "RIGHT_KNEE", "LEFT_ANKLE", "RIGHT_ANKLE", "LEFT_BIG_TOE",
    "RIGHT_BIG_TOE", "LEFT_SMALL_TOE", "RIGHT_SMALL_TOE", "LEFT_HEEL", "RIGHT_HEEL",
    "LEFT_HAND_THUMB_4", "RIGHT_HAND_THUMB_4", "LEFT_HAND_INDEX_1", "RIGHT_HAND_INDEX_1",
    "LEFT_HAND_MIDDLE_4", "RIGHT_HAND_MIDDLE_4", "LEFT_HAND_PINKY_1", "RIGHT_HAND_PINKY_1",
];

const BVH33_NAMES: [&str; BvhJoint::COUNT] = [
    "Hips", "Spine", "Spine1", "Spine2", "Neck", "Head", "Head_end_site", "LeftShoulder",
    "LeftArm", "LeftForeArm", "LeftHand", "LeftHandIndex1", "LeftHandIndex2", "LeftHandIndex3",
    "LeftHandIndex3_end_site", "RightShoulder", "RightArm", "RightForeArm", "RightHand",
    "RightHandIndex1", "RightHandIndex2", "RightHandIndex3", "RightHandIndex3_end_site",
    "LeftUpLeg", "LeftLeg", "LeftFoot", "LeftToeBase", "LeftToeBase_end_site", "RightUpLeg",
    "RightLeg", "RightFoot", "RightToeBase", "RightToeBase_end_site",
];

const BODY38_PARENTS: [Option<usize>; Body38Joint::COUNT] = [
    None, Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), Some(5), Some(6), Some(7),
    Some(3), Some(3), Some(10), Some(11), Some(12), Some(13), Some(14), Some(15), Some(0),
    Some(0), Some(18), Some(19), Some(20), Some(21), Some(22), Some(23), Some(22), Some(23),
    Some(22), Some(23), Some(16), Some(17), Some(16), Some(17), Some(16), Some(17), Some(16),
    Some(17),
];

const BVH33_PARENTS: [Option<usize>; BvhJoint::COUNT] = [
    None, Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), Some(3), Some(7), Some(8),
    Some(9), Some(10), Some(11), Some(12), Some(13), Some(3), Some(15), Some(16), Some(17),
    Some(18), Some(19), Some(20), Some(21), Some(0), Some(23), Some(24), Some(25), Some(26),
    Some(0), Some(28), Some(29), Some(30), Some(31),
];

/// `BODY38_FROM_BVH33[body38] = bvh33`. Face points collapse onto the head,
/// finger points onto the nearest index-finger joint.
const BODY38_FROM_BVH33: [usize; Body38Joint::COUNT] = [
    0, 1, 2, 3, 4, 5, 5, 5, 5, 5, // pelvis, spine, neck, face
    7, 15, 8, 16, 9, 17, 10, 18, // clavicles, arms, wrists
    23, 28, 24, 29, 25, 30, 26, 31, 27, 32, 25, 30, // legs, feet
    11, 19, 11, 19, 14, 22, 11, 19, // hands
];

/// `BVH33_FROM_BODY38[bvh33] = body38`.
const BVH33_FROM_BODY38: [usize; BvhJoint::COUNT] = [
    0, 1, 2, 3, 4, 5, 5, // hips, spine, neck, head
    10, 12, 14, 16, 32, 32, 34, 34, // left arm
    11, 13, 15, 17, 33, 33, 35, 35, // right arm
    18, 20, 22, 24, 26, // left leg
    19, 21, 23, 25, 27, // right leg
];

/// Joints the scorer refers to by role rather than by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Landmarks {
    pub root: usize,
    pub neck: usize,
    pub left_shoulder: usize,
    pub right_shoulder: usize,
    pub left_hand: usize,
    pub right_hand: usize,
}

/// Skeleton layout: joint count, naming and kinematic tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Body38,
    Bvh33,
}

impl Topology {
    pub fn name(self) -> &'static str {
        match self {
            Self::Body38 => "body38",
            Self::Bvh33 => "bvh33",
        }
    }

    pub fn joint_count(self) -> usize {
        match self {
            Self::Body38 => Body38Joint::COUNT,
            Self::Bvh33 => BvhJoint::COUNT,
        }
    }

    pub fn joint_names(self) -> &'static [&'static str] {
        match self {
            Self::Body38 => &BODY38_NAMES,
            Self::Bvh33 => &BVH33_NAMES,
        }
    }

    /// Parent index per joint; `None` for the root.
    pub fn parents(self) -> &'static [Option<usize>] {
        match self {
            Self::Body38 => &BODY38_PARENTS,
            Self::Bvh33 => &BVH33_PARENTS,
        }
    }

    pub fn index_of(self, name: &str) -> Option<usize> {
        self.joint_names().iter().position(|n| *n == name)
    }

    /// Like [`index_of`](Self::index_of) but reports unknown names.
    pub fn resolve(self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| SyncError::UnknownJoint {
            name: name.to_string(),
            topology: self.name(),
        })
    }

    pub fn root(self) -> usize {
        self.landmarks().root
    }

    pub fn landmarks(self) -> Landmarks {
        match self {
            Self::Body38 => Landmarks {
                root: Body38Joint::Pelvis as usize,
                neck: Body38Joint::Neck as usize,
                left_shoulder: Body38Joint::LeftShoulder as usize,
                right_shoulder: Body38Joint::RightShoulder as usize,
                left_hand: Body38Joint::LeftHandMiddle4 as usize,
                right_hand: Body38Joint::RightHandMiddle4 as usize,
            },
            Self::Bvh33 => Landmarks {
                root: BvhJoint::Hips as usize,
                neck: BvhJoint::Neck as usize,
                left_shoulder: BvhJoint::LeftArm as usize,
                right_shoulder: BvhJoint::RightArm as usize,
                left_hand: BvhJoint::LeftHand as usize,
                right_hand: BvhJoint::RightHand as usize,
            },
        }
    }

    /// Shoulder and elbow angles, vertex in the middle.
    pub fn default_angle_triplets(self) -> Vec<[usize; 3]> {
        match self {
            Self::Body38 => {
                use Body38Joint::*;
                vec![
                    [LeftClavicle as usize, LeftShoulder as usize, LeftElbow as usize],
                    [RightClavicle as usize, RightShoulder as usize, RightElbow as usize],
                    [LeftShoulder as usize, LeftElbow as usize, LeftWrist as usize],
                    [RightShoulder as usize, RightElbow as usize, RightWrist as usize],
                ]
            }
            Self::Bvh33 => {
                use BvhJoint::*;
                vec![
                    [LeftShoulder as usize, LeftArm as usize, LeftForeArm as usize],
                    [RightShoulder as usize, RightArm as usize, RightForeArm as usize],
                    [LeftArm as usize, LeftForeArm as usize, LeftHand as usize],
                    [RightArm as usize, RightForeArm as usize, RightHand as usize],
                ]
            }
        }
    }

    /// Index table translating a `source` frame into this topology:
    /// `table[target_joint] = source_joint`. `None` when both are the same.
    pub fn mapping_from(self, source: Topology) -> Option<&'static [usize]> {
        match (self, source) {
            (Self::Body38, Self::Bvh33) => Some(&BODY38_FROM_BVH33),
            (Self::Bvh33, Self::Body38) => Some(&BVH33_FROM_BODY38),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
