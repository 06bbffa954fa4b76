// src/pose/landmark.rs
//
// Closed landmark vocabulary (COCO-17 order, as produced by MoveNet-style
// single-person models) and a fixed-size landmark container with one
// presence bit per slot.

use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Landmark {
    pub const COUNT: usize = 17;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Landmark::Nose,
        Landmark::LeftEye,
        Landmark::RightEye,
        Landmark::LeftEar,
        Landmark::RightEar,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    /// Subset used for measurement and wrist tracking
    pub const BODY: [Landmark; 11] = [
        Landmark::Nose,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Landmark::Nose => "nose",
            Landmark::LeftEye => "left_eye",
            Landmark::RightEye => "right_eye",
            Landmark::LeftEar => "left_ear",
            Landmark::RightEar => "right_ear",
            Landmark::LeftShoulder => "left_shoulder",
            Landmark::RightShoulder => "right_shoulder",
            Landmark::LeftElbow => "left_elbow",
            Landmark::RightElbow => "right_elbow",
            Landmark::LeftWrist => "left_wrist",
            Landmark::RightWrist => "right_wrist",
            Landmark::LeftHip => "left_hip",
            Landmark::RightHip => "right_hip",
            Landmark::LeftKnee => "left_knee",
            Landmark::RightKnee => "right_knee",
            Landmark::LeftAnkle => "left_ankle",
            Landmark::RightAnkle => "right_ankle",
        }
    }
}

// ============================================================================
// DETECTOR OUTPUT
// ============================================================================

/// One landmark as reported by a pose model
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// Normalized X (0.0 - 1.0)
    pub x: f32,
    /// Normalized Y (0.0 - 1.0)
    pub y: f32,
    /// Visibility / confidence (0.0 - 1.0)
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }
}

/// Full 17-landmark detection for one image
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: [Keypoint; Landmark::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; Landmark::COUNT]) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, landmark: Landmark) -> &Keypoint {
        &self.keypoints[landmark as usize]
    }

    pub fn best_visibility(&self) -> f32 {
        self.keypoints
            .iter()
            .map(|k| k.visibility)
            .fold(0.0, f32::max)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); Landmark::COUNT],
        }
    }
}

// ============================================================================
// LANDMARK SET
// ============================================================================

/// Fixed-size landmark container. Slot `i` is meaningful only when bit `i`
/// of `present` is set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkSet {
    points: [[f32; 2]; Landmark::COUNT],
    present: u32,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the landmarks of `subset` whose visibility is strictly above
    /// `min_visibility`, mapping their normalized position through `project`.
    pub fn from_pose<F>(pose: &Pose, subset: &[Landmark], min_visibility: f32, project: F) -> Self
    where
        F: Fn(f32, f32) -> [f32; 2],
    {
        let mut set = Self::new();
        for &landmark in subset {
            let kp = pose.get(landmark);
            if kp.visibility > min_visibility {
                set.insert(landmark, project(kp.x, kp.y));
            }
        }
        set
    }

    pub fn insert(&mut self, landmark: Landmark, point: [f32; 2]) {
        let slot = landmark as usize;
        self.points[slot] = point;
        self.present |= 1 << slot;
    }

    pub fn contains(&self, landmark: Landmark) -> bool {
        self.present & (1 << landmark as usize) != 0
    }

    pub fn get(&self, landmark: Landmark) -> Option<[f32; 2]> {
        if self.contains(landmark) {
            Some(self.points[landmark as usize])
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.present.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.present == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Landmark, [f32; 2])> + '_ {
        Landmark::ALL
            .iter()
            .filter_map(move |&landmark| self.get(landmark).map(|p| (landmark, p)))
    }
}

impl Serialize for LandmarkSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (landmark, point) in self.iter() {
            map.serialize_entry(landmark.as_str(), &point)?;
        }
        map.end()
    }
}

/// Euclidean distance between two points
pub fn distance(a: [f32; 2], b: [f32; 2]) -> f64 {
    let dx = (a[0] - b[0]) as f64;
    let dy = (a[1] - b[1]) as f64;
    (dx * dx + dy * dy).sqrt()
}
