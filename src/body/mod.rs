//! Body-model construction: classification plus axis inference.

pub mod axis;
pub mod classify;
pub mod model;

pub use axis::{guess_rotation, infer_axes};
pub use classify::classify;
pub use model::{Arm, Axis, AxisPick, BodyModel, ClassificationReport, Leg, Side};

use crate::skeleton::Skeleton;

/// Classify a skeleton and infer its rotation conventions in one pass.
pub fn build(skeleton: &mut Skeleton) -> BodyModel {
    let mut body = classify(skeleton);
    infer_axes(skeleton, &mut body);
    body
}
