//! Avatar skeleton inference and procedural limb animation.
//!
//! Takes hand-authored humanoid rigs with arbitrary bone names and
//! hierarchies, classifies them into a canonical body model, empirically
//! probes their rotation conventions, and then poses them procedurally:
//! arm reaches, gaze tracking, crouch/jump posture driven by a tracked
//! head height, plus keyframed animation groups corrected by per-asset
//! fixes sidecars.
//!
//! The core is engine-agnostic and runs in native tests; the `bindings`
//! module exposes the handle-based JS surface when built for wasm.

pub mod avatar;
pub mod body;
pub mod clip;
pub mod error;
pub mod fixes;
pub mod math;
pub mod posture;
pub mod skeleton;
pub mod solver;

#[cfg(target_arch = "wasm32")]
pub mod bindings;

pub use avatar::{Avatar, AvatarBody, AvatarInfo, AvatarRegistry, HumanoidRig};
pub use body::{BodyModel, Side};
pub use error::AvatarError;
pub use fixes::AvatarFixes;
pub use posture::{HeightAction, Posture, Stance};
pub use skeleton::{BoneIndex, Skeleton};
