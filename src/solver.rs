//! Procedural limb posing.
//!
//! Not a general IK solver: limbs are two-segment chains with a known hinge
//! axis, so a reach decomposes into a shortest-arc aim of the whole limb
//! followed by an analytic isosceles bend that sets the hinge. Gaze works
//! the same way on the head bone, with no joint limits.
//!
//! All solving happens in the limb's rest frame (the upper bone's parent
//! frame at first solve), so targets are transformed in once and the
//! results compose with whatever pose the rig was authored in.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Quat, Vec3};

use crate::body::{BodyModel, Side};
use crate::clip::SweepClip;
use crate::math::{rotation_align, EPSILON};
use crate::skeleton::{BoneIndex, Skeleton};

/// Seconds a reach sweep takes when animation is requested.
pub const SWEEP_DURATION: f32 = 0.25;

/// Rest-frame data captured lazily at a limb's first solve.
#[derive(Debug, Clone)]
pub struct LimbRest {
    /// Local rotations of both segments at capture time.
    pub upper_quat: Quat,
    pub lower_quat: Quat,
    /// World rotation of the upper bone's parent, with inverse. Targets are
    /// transformed through this into the solve frame.
    pub world_quat: Quat,
    pub world_quat_inv: Quat,
    /// Unit direction from upper joint to lower joint, in the solve frame.
    pub limb_vector: Vec3,
}

/// Mutable per-limb solver state owned by the rig.
#[derive(Debug, Clone, Default)]
pub struct LimbState {
    pub rest: Option<LimbRest>,
    pub upper_rot: Quat,
    pub lower_rot: Quat,
    /// Distance to the last target, in the solve frame.
    pub length: f32,
    /// In-flight sweep toward the last solved pose, if animating.
    pub sweep: Option<SweepClip>,
}

fn capture_rest(skeleton: &Skeleton, upper: BoneIndex, lower: BoneIndex) -> LimbRest {
    let world_quat = match skeleton.bone(upper).parent {
        Some(p) => skeleton.world_rotation(p),
        None => Quat::IDENTITY,
    };
    let world_quat_inv = world_quat.inverse();
    let limb_vector = (world_quat_inv
        * (skeleton.world_position(lower) - skeleton.world_position(upper)))
    .normalize_or_zero();

    LimbRest {
        upper_quat: skeleton.bone(upper).rotation(),
        lower_quat: skeleton.bone(lower).rotation(),
        world_quat,
        world_quat_inv,
        limb_vector,
    }
}

/// Isosceles bend angles for a two-segment limb reaching across `length`.
///
/// Returns `(joint, bend, reached)`: `joint` tips the upper segment off the
/// chord, `bend` is the hinge deviation from straight, and `reached` is
/// false when the target lies beyond full extension (the limb straightens
/// and points at it instead).
pub fn bend_angles(upper_len: f32, lower_len: f32, length: f32) -> (f32, f32, bool) {
    let bone = (upper_len + lower_len) / 2.0;
    if bone < EPSILON {
        return (0.0, 0.0, false);
    }

    let reached = length <= upper_len + lower_len;
    let clamped = length.clamp(0.0, 2.0 * bone);

    let inner = (clamped / (2.0 * bone)).clamp(-1.0, 1.0).asin();
    let joint = FRAC_PI_2 - inner;
    (joint, 2.0 * joint, reached)
}

fn aim_rotation(rest: &LimbRest, dir: Vec3, side: Side, pointer: Option<Quat>) -> Quat {
    let aim = rotation_align(rest.limb_vector, dir);

    let Some(pointer) = pointer else {
        return aim;
    };

    // The pointer's down vector says which way the underside of the limb
    // should face. Mirror it for the right side and keep it out of the
    // body (no negative Z).
    let mut side_vec = pointer * Vec3::NEG_Y;
    if side == Side::Right {
        side_vec.y = -side_vec.y;
    }
    if side_vec.z < 0.0 {
        side_vec.z = 0.0;
    }

    let current = aim * Vec3::NEG_Y;
    let current = (current - dir * current.dot(dir)).normalize_or_zero();
    let goal = (side_vec - dir * side_vec.dot(dir)).normalize_or_zero();
    if current.length_squared() < EPSILON || goal.length_squared() < EPSILON {
        return aim;
    }

    let twist = rotation_align(current, goal);
    let rot = twist * aim;
    if rot.is_nan() {
        Quat::from_rotation_z(PI)
    } else {
        rot
    }
}

/// Point an arm at a world-space target.
///
/// Returns true when the target is within the arm's reach. With `pointer`
/// set, the hand's orientation follows the pointing device instead of the
/// plain shortest arc. With `animate`, the result feeds the limb's sweep
/// instead of being written immediately.
pub fn reach_for(
    skeleton: &mut Skeleton,
    body: &BodyModel,
    side: Side,
    state: &mut LimbState,
    target: Vec3,
    pointer: Option<Quat>,
    animate: bool,
) -> bool {
    let arm = body.arm(side);
    let (Some(upper), Some(lower)) = (arm.upper, arm.lower) else {
        log::debug!("reach_for on incomplete {:?} arm", side);
        return false;
    };

    let rest = state
        .rest
        .get_or_insert_with(|| capture_rest(skeleton, upper, lower))
        .clone();

    let local_target = rest.world_quat_inv * (target - skeleton.world_position(upper));
    state.length = local_target.length();
    let dir = local_target.normalize_or_zero();

    let rot = aim_rotation(&rest, dir, side, pointer);
    state.upper_rot = rot * rest.upper_quat;
    state.lower_rot = rest.lower_quat;

    let (joint, bend, reached) = bend_angles(arm.upper_length, arm.lower_length, state.length);
    if let Some(pick) = arm.front_axis {
        let axis = pick.axis.unit();
        state.upper_rot *= Quat::from_axis_angle(axis, pick.sign * joint);
        state.lower_rot = rest.lower_quat * Quat::from_axis_angle(axis, -pick.sign * bend);
    }

    commit(skeleton, upper, lower, state, animate);
    reached
}

/// Bend a leg so the hip-to-foot distance becomes `length`.
///
/// Lengths at or beyond full extension straighten the leg back to rest.
pub fn bend_leg(skeleton: &mut Skeleton, body: &BodyModel, side: Side, state: &mut LimbState, length: f32) {
    let leg = body.leg(side);
    let (Some(upper), Some(lower)) = (leg.upper, leg.lower) else {
        return;
    };

    let rest = state
        .rest
        .get_or_insert_with(|| capture_rest(skeleton, upper, lower))
        .clone();
    state.length = length;

    let (joint, bend, _) = bend_angles(leg.upper_length, leg.lower_length, length);
    match leg.front_axis {
        Some(pick) => {
            // Knee travels forward, so the thigh tips back off the chord.
            let axis = pick.axis.unit();
            state.upper_rot = rest.upper_quat * Quat::from_axis_angle(axis, pick.sign * joint);
            state.lower_rot = rest.lower_quat * Quat::from_axis_angle(axis, -pick.sign * bend);
        }
        None => {
            state.upper_rot = rest.upper_quat;
            state.lower_rot = rest.lower_quat;
        }
    }

    commit(skeleton, upper, lower, state, false);
}

fn commit(
    skeleton: &mut Skeleton,
    upper: BoneIndex,
    lower: BoneIndex,
    state: &mut LimbState,
    animate: bool,
) {
    if animate {
        let to = (state.upper_rot, state.lower_rot);
        match state.sweep.as_mut() {
            Some(sweep) => sweep.refresh(to),
            None => {
                let from = (skeleton.bone(upper).rotation(), skeleton.bone(lower).rotation());
                state.sweep = Some(SweepClip::new(from, to, SWEEP_DURATION));
            }
        }
    } else {
        state.sweep = None;
        skeleton.set_rotation(upper, state.upper_rot);
        skeleton.set_rotation(lower, state.lower_rot);
    }
}

/// Turn the head toward a world-space target. No-op on headless models.
pub fn look_at(skeleton: &mut Skeleton, body: &BodyModel, target: Vec3) {
    let Some(head) = body.head else {
        return;
    };

    let dir = (body.head_quat_inv * (target - skeleton.world_position(head))).normalize_or_zero();
    if dir.length_squared() < EPSILON {
        return;
    }

    let rot = rotation_align(body.head_target, dir);

    // Rigs where head and neck disagree on their rest Z need the gaze
    // corrected through the neck's frame.
    let mut comp = body.head_quat * body.neck_quat_inv;
    if body.head_axis_fix < 0.0 {
        comp = comp.inverse();
    }

    let local = skeleton.bone(head).rest_rotation * (comp * rot);
    skeleton.set_rotation(head, local.normalize());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Arm, Axis, AxisPick};
    use crate::skeleton::BoneIndex;

    #[test]
    fn bend_angles_full_extension_is_straight() {
        let (joint, bend, reached) = bend_angles(0.25, 0.25, 0.5);
        assert!(joint.abs() < 1e-5);
        assert!(bend.abs() < 1e-5);
        assert!(reached);
    }

    #[test]
    fn bend_angles_zero_length_folds_flat() {
        let (joint, bend, reached) = bend_angles(0.25, 0.25, 0.0);
        assert!((joint - FRAC_PI_2).abs() < 1e-5);
        assert!((bend - PI).abs() < 1e-5);
        assert!(reached);
    }

    #[test]
    fn bend_angles_clamp_beyond_reach() {
        let (joint, bend, reached) = bend_angles(0.25, 0.25, 2.0);
        assert!(joint.abs() < 1e-5);
        assert!(bend.abs() < 1e-5);
        assert!(!reached);
    }

    /// Arm pointing down -X with an exact Y hinge.
    fn arm_rig() -> (Skeleton, BodyModel, BoneIndex, BoneIndex) {
        let mut s = Skeleton::new();
        let q = Quat::IDENTITY;
        let shoulder = s.add_bone("shoulder", None, Vec3::ZERO, q);
        let upper = s.add_bone("upper", Some(shoulder), Vec3::new(-0.1, 0.0, 0.0), q);
        let lower = s.add_bone("lower", Some(upper), Vec3::new(-0.25, 0.0, 0.0), q);
        let hand = s.add_bone("hand", Some(lower), Vec3::new(-0.25, 0.0, 0.0), q);

        let mut body = BodyModel::default();
        body.left_arm = Arm {
            shoulder: Some(shoulder),
            upper: Some(upper),
            lower: Some(lower),
            hand: Some(hand),
            upper_length: 0.25,
            lower_length: 0.25,
            front_axis: Some(AxisPick { axis: Axis::Y, sign: 1.0 }),
            side_axis: Some(AxisPick { axis: Axis::Z, sign: 1.0 }),
            ..Arm::default()
        };
        (s, body, upper, hand)
    }

    #[test]
    fn reach_in_range_places_hand_at_target_distance() {
        let (mut s, body, upper, hand) = arm_rig();
        let mut state = LimbState::default();

        let target = Vec3::new(-0.4, 0.2, 0.0);
        let reached = reach_for(&mut s, &body, Side::Left, &mut state, target, None, false);
        assert!(reached);

        // The chord across both segments must equal the target distance.
        let expected = target.distance(s.world_position(upper));
        let chord = s.world_position(hand).distance(s.world_position(upper));
        assert!((chord - expected).abs() < 1e-4, "chord {chord} vs {expected}");
    }

    #[test]
    fn reach_out_of_range_straightens_and_reports_false() {
        let (mut s, body, upper, hand) = arm_rig();
        let mut state = LimbState::default();

        let reached = reach_for(
            &mut s,
            &body,
            Side::Left,
            &mut state,
            Vec3::new(-5.0, 0.0, 0.0),
            None,
            false,
        );
        assert!(!reached);

        let chord = s.world_position(hand).distance(s.world_position(upper));
        assert!((chord - 0.5).abs() < 1e-4);
    }

    #[test]
    fn reach_on_incomplete_arm_is_a_noop() {
        let mut s = Skeleton::new();
        s.add_bone("solo", None, Vec3::ZERO, Quat::IDENTITY);
        let body = BodyModel::default();
        let mut state = LimbState::default();

        assert!(!reach_for(
            &mut s,
            &body,
            Side::Left,
            &mut state,
            Vec3::ONE,
            None,
            false
        ));
        assert!(state.rest.is_none());
    }

    #[test]
    fn animated_reach_defers_to_sweep() {
        let (mut s, body, upper, _) = arm_rig();
        let mut state = LimbState::default();
        let before = s.bone(upper).rotation();

        reach_for(&mut s, &body, Side::Left, &mut state, Vec3::new(-0.3, 0.1, 0.0), None, true);

        // Nothing written yet; the sweep owns the transition.
        assert_eq!(s.bone(upper).rotation(), before);
        assert!(state.sweep.is_some());
    }

    #[test]
    fn bend_leg_shortens_hip_to_foot_distance() {
        let mut s = Skeleton::new();
        let q = Quat::IDENTITY;
        let hips = s.add_bone("hips", None, Vec3::new(0.0, 1.0, 0.0), q);
        let upper = s.add_bone("upleg", Some(hips), Vec3::new(0.1, 0.0, 0.0), q);
        let lower = s.add_bone("leg", Some(upper), Vec3::new(0.0, -0.45, 0.0), q);
        let foot = s.add_bone("foot", Some(lower), Vec3::new(0.0, -0.45, 0.0), q);

        let mut body = BodyModel::default();
        body.left_leg.upper = Some(upper);
        body.left_leg.lower = Some(lower);
        body.left_leg.foot = vec![foot];
        body.left_leg.upper_length = 0.45;
        body.left_leg.lower_length = 0.45;
        body.left_leg.front_axis = Some(AxisPick { axis: Axis::X, sign: 1.0 });

        let mut state = LimbState::default();
        bend_leg(&mut s, &body, Side::Left, &mut state, 0.6);

        let chord = s.world_position(foot).distance(s.world_position(upper));
        assert!((chord - 0.6).abs() < 1e-4, "chord {chord}");
    }

    #[test]
    fn look_at_rotates_head_only_when_present() {
        let mut s = Skeleton::new();
        s.add_bone("lonely", None, Vec3::ZERO, Quat::IDENTITY);
        let body = BodyModel::default();
        // Headless model: must not panic or touch the pose.
        look_at(&mut s, &body, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.bone(0).rotation(), Quat::IDENTITY);
    }
}
