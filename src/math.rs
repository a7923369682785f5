//! Quaternion and vector helpers shared by the classifier and the limb solver.

use glam::{Quat, Vec3};

/// Small epsilon value for floating-point comparisons
pub const EPSILON: f32 = 1e-6;

/// Shortest-arc rotation taking `from` to `to` (inputs need not be unit length).
///
/// Rig rest poses routinely produce near-parallel and anti-parallel pairs.
/// glam handles the anti-parallel case, but degenerate inputs (zero vectors,
/// denormals from accumulated transforms) can still yield NaN components;
/// those are replaced with a fixed 180-degree rotation about Z so no NaN
/// ever reaches the render state.
pub fn rotation_align(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from.length_squared() < EPSILON || to.length_squared() < EPSILON {
        return Quat::from_rotation_z(std::f32::consts::PI);
    }

    let rot = Quat::from_rotation_arc(from, to);
    if rot.is_nan() {
        Quat::from_rotation_z(std::f32::consts::PI)
    } else {
        rot
    }
}

/// Round a direction to the nearest signed unit axis.
///
/// Used when sampling a bone's rest-pose Z axis: hand-authored rigs are
/// rarely axis-aligned exactly, but their conventions are, so the dominant
/// component decides.
pub fn round_to_unit(v: Vec3) -> Vec3 {
    let ax = v.x.abs();
    let ay = v.y.abs();
    let az = v.z.abs();

    if ax >= ay && ax >= az {
        Vec3::new(v.x.signum(), 0.0, 0.0)
    } else if ay >= az {
        Vec3::new(0.0, v.y.signum(), 0.0)
    } else {
        Vec3::new(0.0, 0.0, v.z.signum())
    }
}
