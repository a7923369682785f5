//! Empirical rotation-axis inference.
//!
//! Asset rigs disagree on which local axis bends an elbow or swings a hip.
//! Rather than trusting naming conventions, each candidate axis is probed:
//! apply a quarter turn, observe which way the child bone actually moved,
//! and keep the axis/sign whose displacement best matches a reference
//! direction. Every probe restores the original rotation, so the skeleton
//! pose is unchanged afterwards.

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use crate::skeleton::{BoneIndex, Skeleton};

use super::model::{Axis, AxisPick, BodyModel, Side};

/// Probe `bone` with quarter turns about each candidate axis and pick the
/// one that moves `child` furthest along `reference`.
pub fn guess_rotation(
    skeleton: &mut Skeleton,
    bone: BoneIndex,
    child: BoneIndex,
    reference: Vec3,
    candidates: &[Axis],
) -> AxisPick {
    let original = skeleton.bone(bone).rotation();
    let baseline = skeleton.world_position(child);

    let mut best = AxisPick {
        axis: candidates[0],
        sign: 1.0,
    };
    let mut best_score = f32::NEG_INFINITY;

    for &axis in candidates {
        for sign in [1.0_f32, -1.0] {
            let probe = Quat::from_axis_angle(axis.unit(), sign * FRAC_PI_2);
            skeleton.set_rotation(bone, original * probe);

            let score = (skeleton.world_position(child) - baseline).dot(reference);
            if score > best_score {
                best_score = score;
                best = AxisPick { axis, sign };
            }
        }
    }

    skeleton.set_rotation(bone, original);
    best
}

/// Fill in the axis conventions for every complete limb and mark the model
/// processed.
///
/// Humanoid rigs are bilaterally symmetric, so only the left limbs probe
/// all three axes; the right limbs re-probe just the left winner's axis to
/// settle the sign.
pub fn infer_axes(skeleton: &mut Skeleton, body: &mut BodyModel) {
    let left = infer_arm(skeleton, body, Side::Left, &Axis::ALL, &Axis::ALL);
    match left {
        Some((side, front)) => {
            infer_arm(skeleton, body, Side::Right, &[side.axis], &[front.axis]);
        }
        None => {
            infer_arm(skeleton, body, Side::Right, &Axis::ALL, &Axis::ALL);
        }
    }

    let left = infer_leg(skeleton, body, Side::Left, &Axis::ALL);
    match left {
        Some(pick) => {
            infer_leg(skeleton, body, Side::Right, &[pick.axis]);
        }
        None => {
            infer_leg(skeleton, body, Side::Right, &Axis::ALL);
        }
    }

    body.processed = true;
}

fn infer_arm(
    skeleton: &mut Skeleton,
    body: &mut BodyModel,
    side: Side,
    side_candidates: &[Axis],
    front_candidates: &[Axis],
) -> Option<(AxisPick, AxisPick)> {
    let arm = body.arm(side);
    let (upper, lower) = (arm.upper?, arm.lower?);

    // Raising the arm moves the elbow up; swinging it forward moves the
    // elbow along +Z.
    let side_axis = guess_rotation(skeleton, upper, lower, Vec3::Y, side_candidates);
    let front_axis = guess_rotation(skeleton, upper, lower, Vec3::Z, front_candidates);

    let arm = body.arm_mut(side);
    arm.side_axis = Some(side_axis);
    arm.front_axis = Some(front_axis);
    Some((side_axis, front_axis))
}

fn infer_leg(
    skeleton: &mut Skeleton,
    body: &mut BodyModel,
    side: Side,
    candidates: &[Axis],
) -> Option<AxisPick> {
    let leg = body.leg(side);
    let (upper, lower) = (leg.upper?, leg.lower?);

    // Kicking forward moves the knee along +Z.
    let front_axis = guess_rotation(skeleton, upper, lower, Vec3::Z, candidates);
    body.leg_mut(side).front_axis = Some(front_axis);
    Some(front_axis)
}
