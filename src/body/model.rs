//! Canonical body model: the classifier's mapping from raw bone indices to
//! humanoid roles.

use glam::{Quat, Vec3};
use serde::Serialize;

use crate::skeleton::{BoneIndex, Skeleton};

/// Finger chains per hand: thumb, index, middle, ring, pinky.
pub const FINGER_COUNT: usize = 5;

/// A local rotation axis candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// An inferred rotation convention: which local axis, and which sign of a
/// 90-degree turn, moves a limb along its reference direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisPick {
    pub axis: Axis,
    pub sign: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Arm roles plus per-limb derived data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arm {
    pub shoulder: Option<BoneIndex>,
    pub upper: Option<BoneIndex>,
    pub lower: Option<BoneIndex>,
    pub hand: Option<BoneIndex>,
    /// Ordered root-to-tip chains: thumb, index, middle, ring, pinky.
    pub fingers: [Vec<BoneIndex>; FINGER_COUNT],
    /// Bend plane (elbow).
    pub front_axis: Option<AxisPick>,
    /// Abduction (shoulder).
    pub side_axis: Option<AxisPick>,
    pub upper_length: f32,
    pub lower_length: f32,
}

impl Arm {
    /// Partial limbs are rejected: either both segments are known or the arm
    /// is unusable.
    pub fn is_complete(&self) -> bool {
        self.upper.is_some() && self.lower.is_some()
    }
}

/// Leg roles plus per-limb derived data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leg {
    pub upper: Option<BoneIndex>,
    pub lower: Option<BoneIndex>,
    /// Foot/toe chain below the lower leg, root to tip.
    pub foot: Vec<BoneIndex>,
    pub front_axis: Option<AxisPick>,
    pub upper_length: f32,
    pub lower_length: f32,
}

impl Leg {
    pub fn is_complete(&self) -> bool {
        self.upper.is_some() && self.lower.is_some()
    }
}

/// Classification result for one skeleton.
///
/// Built once per loaded (non-instanced) skeleton; instanced avatars share
/// the canonical model by reference and never recompute it.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyModel {
    pub root: Option<BoneIndex>,
    pub hips: Option<BoneIndex>,
    /// Hips toward neck, in order.
    pub spine: Vec<BoneIndex>,
    pub left_arm: Arm,
    pub right_arm: Arm,
    pub left_leg: Leg,
    pub right_leg: Leg,
    pub neck: Option<BoneIndex>,
    pub head: Option<BoneIndex>,
    /// World-space rest orientations of head and neck, with inverses.
    pub head_quat: Quat,
    pub head_quat_inv: Quat,
    pub neck_quat: Quat,
    pub neck_quat_inv: Quat,
    /// +1 when head and neck rest Z conventions agree, -1 when they oppose.
    pub head_axis_fix: f32,
    /// Reference direction `look_at` rotates from, in head-local space.
    pub head_target: Vec3,
    /// True once classification and axis inference have both run.
    pub processed: bool,
}

impl Default for BodyModel {
    fn default() -> Self {
        Self {
            root: None,
            hips: None,
            spine: Vec::new(),
            left_arm: Arm::default(),
            right_arm: Arm::default(),
            left_leg: Leg::default(),
            right_leg: Leg::default(),
            neck: None,
            head: None,
            head_quat: Quat::IDENTITY,
            head_quat_inv: Quat::IDENTITY,
            neck_quat: Quat::IDENTITY,
            neck_quat_inv: Quat::IDENTITY,
            head_axis_fix: 1.0,
            head_target: Vec3::Z,
            processed: false,
        }
    }
}

impl BodyModel {
    pub fn arm(&self, side: Side) -> &Arm {
        match side {
            Side::Left => &self.left_arm,
            Side::Right => &self.right_arm,
        }
    }

    pub fn arm_mut(&mut self, side: Side) -> &mut Arm {
        match side {
            Side::Left => &mut self.left_arm,
            Side::Right => &mut self.right_arm,
        }
    }

    pub fn leg(&self, side: Side) -> &Leg {
        match side {
            Side::Left => &self.left_leg,
            Side::Right => &self.right_leg,
        }
    }

    pub fn leg_mut(&mut self, side: Side) -> &mut Leg {
        match side {
            Side::Left => &mut self.left_leg,
            Side::Right => &mut self.right_leg,
        }
    }

    /// Every bone index holding a body-part role slot, duplicates included.
    /// A well-formed classification yields no duplicates.
    pub fn assigned_roles(&self) -> Vec<BoneIndex> {
        let mut roles = Vec::new();
        roles.extend(self.spine.iter().copied());
        for arm in [&self.left_arm, &self.right_arm] {
            roles.extend(arm.shoulder);
            roles.extend(arm.upper);
            roles.extend(arm.lower);
            roles.extend(arm.hand);
            for finger in &arm.fingers {
                roles.extend(finger.iter().copied());
            }
        }
        for leg in [&self.left_leg, &self.right_leg] {
            roles.extend(leg.upper);
            roles.extend(leg.lower);
            roles.extend(leg.foot.iter().copied());
        }
        roles.extend(self.neck);
        roles.extend(self.head);
        roles
    }

    /// Human-readable role-to-bone mapping, for logs and the host boundary.
    pub fn report(&self, skeleton: &Skeleton) -> ClassificationReport {
        let name = |ix: Option<BoneIndex>| ix.map(|i| skeleton.bone(i).name.clone());
        let names = |chain: &[BoneIndex]| -> Vec<String> {
            chain
                .iter()
                .map(|&i| skeleton.bone(i).name.clone())
                .collect()
        };
        let limb = |arm: &Arm| LimbReport {
            shoulder: name(arm.shoulder),
            upper: name(arm.upper),
            lower: name(arm.lower),
            hand: name(arm.hand),
            front_axis: arm.front_axis,
            side_axis: arm.side_axis,
        };
        let leg = |leg: &Leg| LegReport {
            upper: name(leg.upper),
            lower: name(leg.lower),
            foot: names(&leg.foot),
            front_axis: leg.front_axis,
        };

        ClassificationReport {
            root: name(self.root),
            hips: name(self.hips),
            spine: names(&self.spine),
            neck: name(self.neck),
            head: name(self.head),
            left_arm: limb(&self.left_arm),
            right_arm: limb(&self.right_arm),
            left_leg: leg(&self.left_leg),
            right_leg: leg(&self.right_leg),
            processed: self.processed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LimbReport {
    pub shoulder: Option<String>,
    pub upper: Option<String>,
    pub lower: Option<String>,
    pub hand: Option<String>,
    pub front_axis: Option<AxisPick>,
    pub side_axis: Option<AxisPick>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegReport {
    pub upper: Option<String>,
    pub lower: Option<String>,
    pub foot: Vec<String>,
    pub front_axis: Option<AxisPick>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub root: Option<String>,
    pub hips: Option<String>,
    pub spine: Vec<String>,
    pub neck: Option<String>,
    pub head: Option<String>,
    pub left_arm: LimbReport,
    pub right_arm: LimbReport,
    pub left_leg: LegReport,
    pub right_leg: LegReport,
    pub processed: bool,
}
