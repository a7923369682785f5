//! Avatar assembly and lifecycle.
//!
//! A loaded avatar is either a [`HumanoidRig`] (skeleton classified, limbs
//! solvable) or a mesh-only prop that still occupies the world but ignores
//! posing calls. Instanced copies of the same asset clone the skeleton but
//! share one immutable [`BodyModel`] behind an `Rc`; classification and
//! axis probing run once per asset, never per instance.

use std::collections::HashMap;
use std::rc::Rc;

use glam::{Quat, Vec3};

use crate::body::{self, BodyModel, Side};
use crate::clip::AnimationGroup;
use crate::error::AvatarError;
use crate::fixes::AvatarFixes;
use crate::posture::{HeightAction, Posture, MIN_LEG_LENGTH};
use crate::skeleton::{BoneIndex, Skeleton};
use crate::solver::{self, LimbState};

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

/// A posable humanoid: skeleton plus shared body model plus solver state.
#[derive(Debug, Clone)]
pub struct HumanoidRig {
    skeleton: Skeleton,
    body: Rc<BodyModel>,
    arms: [LimbState; 2],
    legs: [LimbState; 2],
    posture: Posture,
    /// How far crouched legs have lowered the hips below standing (<= 0).
    leg_drop: f32,
}

impl HumanoidRig {
    /// Classify and probe a freshly loaded skeleton.
    pub fn new(mut skeleton: Skeleton) -> Self {
        let model = body::build(&mut skeleton);
        let mut posture = Posture::new();
        posture.set_standing_height(skeleton.height());

        Self {
            skeleton,
            body: Rc::new(model),
            arms: [LimbState::default(), LimbState::default()],
            legs: [LimbState::default(), LimbState::default()],
            posture,
            leg_drop: 0.0,
        }
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn body(&self) -> &Rc<BodyModel> {
        &self.body
    }

    pub fn posture(&self) -> &Posture {
        &self.posture
    }

    /// Vertical displacement the host should apply to the avatar's scene
    /// node: positive while jumping, negative while crouched.
    ///
    /// Bending the knees moves the feet, not the hips; the hips are the FK
    /// root. The drop that keeps the feet planted comes back through here.
    pub fn root_offset(&self) -> f32 {
        self.posture.root_offset() + self.leg_drop
    }

    /// Current head height including the root offset.
    pub fn head_height(&self) -> f32 {
        self.skeleton.height() + self.root_offset()
    }

    /// Point one arm at a world-space target; see [`solver::reach_for`].
    pub fn reach_for(
        &mut self,
        side: Side,
        target: Vec3,
        pointer: Option<Quat>,
        animate: bool,
    ) -> bool {
        solver::reach_for(
            &mut self.skeleton,
            &self.body,
            side,
            &mut self.arms[side_index(side)],
            target,
            pointer,
            animate,
        )
    }

    pub fn look_at(&mut self, target: Vec3) {
        solver::look_at(&mut self.skeleton, &self.body, target);
    }

    /// Feed a tracked head-height sample and apply whatever the posture
    /// state machine decides.
    pub fn track_height(&mut self, height: f32, now: f64) {
        match self.posture.track_height(height, now) {
            HeightAction::None => {}
            HeightAction::Adjust { delta } => self.solve_legs_shortened(delta),
            HeightAction::EnterJump { .. } | HeightAction::HoldJump { .. } => {
                // Airborne: legs hang straight, the root offset carries the
                // lift.
                self.solve_legs_shortened(0.0);
            }
            HeightAction::ExitJump => {
                self.posture.stand_up();
                self.solve_legs_shortened(0.0);
            }
        }
    }

    pub fn crouch(&mut self, amount: f32) {
        self.posture.clamp_leg_length(self.longest_leg());
        let length = self.posture.crouch(amount);
        self.solve_legs_to(length);
    }

    pub fn rise(&mut self, amount: f32) {
        self.posture.clamp_leg_length(self.longest_leg());
        let length = self.posture.rise(amount);
        self.solve_legs_to(length);
    }

    pub fn stand_up(&mut self) {
        let length = self.posture.stand_up();
        self.solve_legs_to(length);
    }

    fn longest_leg(&self) -> f32 {
        [Side::Left, Side::Right]
            .into_iter()
            .map(|side| {
                let leg = self.body.leg(side);
                leg.upper_length + leg.lower_length
            })
            .fold(0.0_f32, f32::max)
    }

    fn solve_legs_shortened(&mut self, delta: f32) {
        let mut drop = 0.0_f32;
        for side in [Side::Left, Side::Right] {
            let leg = self.body.leg(side);
            let total = leg.upper_length + leg.lower_length;
            if total <= 0.0 || !leg.is_complete() {
                continue;
            }
            let length = (total - delta).max(MIN_LEG_LENGTH);
            drop = drop.min(length - total);
            solver::bend_leg(
                &mut self.skeleton,
                &self.body,
                side,
                &mut self.legs[side_index(side)],
                length,
            );
        }
        self.leg_drop = drop;
    }

    fn solve_legs_to(&mut self, length: f32) {
        let mut drop = 0.0_f32;
        for side in [Side::Left, Side::Right] {
            let leg = self.body.leg(side);
            let total = leg.upper_length + leg.lower_length;
            if !leg.is_complete() {
                continue;
            }
            drop = drop.min(length.min(total) - total);
            solver::bend_leg(
                &mut self.skeleton,
                &self.body,
                side,
                &mut self.legs[side_index(side)],
                length,
            );
        }
        self.leg_drop = drop;
    }

    /// Rescale the skeleton so its height becomes `new_height` and make
    /// that the standing reference.
    pub fn resize(&mut self, new_height: f32) {
        let current = self.skeleton.height();
        if current > 0.0 && new_height > 0.0 {
            let scale = self.skeleton.scale() * new_height / current;
            self.skeleton.set_scale(scale);
        }
        self.posture.set_standing_height(self.skeleton.height());
    }

    /// Advance in-flight reach sweeps by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        let body = Rc::clone(&self.body);
        for side in [Side::Left, Side::Right] {
            let arm = body.arm(side);
            if let (Some(upper), Some(lower)) = (arm.upper, arm.lower) {
                step_sweep(
                    &mut self.skeleton,
                    upper,
                    lower,
                    &mut self.arms[side_index(side)],
                    dt,
                );
            }
        }
    }

    /// Cheap copy for an instanced avatar: fresh skeleton pose, shared body
    /// model, carried-over solver state.
    pub fn instantiate(&self) -> Self {
        Self {
            skeleton: self.skeleton.clone(),
            body: Rc::clone(&self.body),
            arms: self.arms.clone(),
            legs: self.legs.clone(),
            posture: self.posture.clone(),
            leg_drop: self.leg_drop,
        }
    }
}

fn step_sweep(
    skeleton: &mut Skeleton,
    upper: BoneIndex,
    lower: BoneIndex,
    state: &mut LimbState,
    dt: f32,
) {
    let Some(sweep) = state.sweep.as_mut() else {
        return;
    };
    let finished = sweep.advance(dt);
    let (u, l) = sweep.current();
    skeleton.set_rotation(upper, u);
    skeleton.set_rotation(lower, l);
    if finished {
        state.sweep = None;
    }
}

/// Identity and placement metadata, as the host reported it.
#[derive(Debug, Clone, Default)]
pub struct AvatarInfo {
    pub url: String,
    pub name: String,
    pub base_position: Vec3,
}

#[derive(Debug, Clone)]
pub enum AvatarBody {
    Humanoid(Box<HumanoidRig>),
    /// Asset without a usable skeleton; posing calls are no-ops.
    MeshOnly,
}

/// One avatar in the world.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub info: AvatarInfo,
    pub fixes: Option<AvatarFixes>,
    pub animations: Vec<AnimationGroup>,
    pub body: AvatarBody,
}

impl Avatar {
    pub fn new(url: impl Into<String>, skeleton: Option<Skeleton>) -> Self {
        let body = match skeleton {
            Some(s) if !s.is_empty() => AvatarBody::Humanoid(Box::new(HumanoidRig::new(s))),
            _ => AvatarBody::MeshOnly,
        };

        Self {
            info: AvatarInfo {
                url: url.into(),
                name: String::new(),
                base_position: Vec3::ZERO,
            },
            fixes: None,
            animations: Vec::new(),
            body,
        }
    }

    pub fn is_humanoid(&self) -> bool {
        matches!(self.body, AvatarBody::Humanoid(_))
    }

    pub fn rig(&self) -> Option<&HumanoidRig> {
        match &self.body {
            AvatarBody::Humanoid(rig) => Some(rig),
            AvatarBody::MeshOnly => None,
        }
    }

    pub fn rig_mut(&mut self) -> Option<&mut HumanoidRig> {
        match &mut self.body {
            AvatarBody::Humanoid(rig) => Some(rig),
            AvatarBody::MeshOnly => None,
        }
    }

    /// Attach a fixes sidecar, applying the standing-height override and
    /// deriving the corrected animation groups.
    pub fn apply_fixes(&mut self, fixes: AvatarFixes, source_groups: &[AnimationGroup]) {
        self.animations = fixes.apply_groups(source_groups);
        if let (Some(standing), Some(rig)) = (fixes.standing, self.rig_mut()) {
            rig.posture.set_standing_height(standing);
        }
        self.fixes = Some(fixes);
    }

    pub fn animation(&self, name: &str) -> Result<&AnimationGroup, AvatarError> {
        self.animations
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| AvatarError::UnknownAnimation(name.to_string()))
    }
}

/// Handle-keyed store for every live avatar. The host speaks in opaque
/// integer handles; all avatar state stays on this side of the boundary.
#[derive(Debug, Default)]
pub struct AvatarRegistry {
    avatars: HashMap<u32, Avatar>,
    next_handle: u32,
}

impl AvatarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, avatar: Avatar) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.avatars.insert(handle, avatar);
        handle
    }

    pub fn get(&self, handle: u32) -> Option<&Avatar> {
        self.avatars.get(&handle)
    }

    pub fn get_mut(&mut self, handle: u32) -> Option<&mut Avatar> {
        self.avatars.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: u32) -> Option<Avatar> {
        self.avatars.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    /// Instanced copy of an existing avatar: shared body model and fixes,
    /// independent skeleton pose.
    pub fn instantiate(&mut self, handle: u32) -> Option<u32> {
        let source = self.avatars.get(&handle)?;
        let body = match &source.body {
            AvatarBody::Humanoid(rig) => AvatarBody::Humanoid(Box::new(rig.instantiate())),
            AvatarBody::MeshOnly => AvatarBody::MeshOnly,
        };
        let copy = Avatar {
            info: source.info.clone(),
            fixes: source.fixes.clone(),
            animations: source.animations.clone(),
            body,
        };
        Some(self.insert(copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn humanoid_skeleton() -> Skeleton {
        let mut s = Skeleton::new();
        let q = Quat::IDENTITY;
        let hips = s.add_bone("Hips", None, Vec3::new(0.0, 0.9, 0.0), q);
        let spine = s.add_bone("Spine", Some(hips), Vec3::new(0.0, 0.2, 0.0), q);
        let neck = s.add_bone("Neck", Some(spine), Vec3::new(0.0, 0.3, 0.0), q);
        s.add_bone("Head", Some(neck), Vec3::new(0.0, 0.1, 0.0), q);

        let ls = s.add_bone("LeftShoulder", Some(spine), Vec3::new(-0.1, 0.25, 0.0), q);
        let lu = s.add_bone("LeftArm", Some(ls), Vec3::new(-0.1, 0.0, 0.0), q);
        let ll = s.add_bone("LeftForeArm", Some(lu), Vec3::new(-0.25, 0.0, 0.0), q);
        s.add_bone("LeftHand", Some(ll), Vec3::new(-0.25, 0.0, 0.0), q);
        let rs = s.add_bone("RightShoulder", Some(spine), Vec3::new(0.1, 0.25, 0.0), q);
        let ru = s.add_bone("RightArm", Some(rs), Vec3::new(0.1, 0.0, 0.0), q);
        let rl = s.add_bone("RightForeArm", Some(ru), Vec3::new(0.25, 0.0, 0.0), q);
        s.add_bone("RightHand", Some(rl), Vec3::new(0.25, 0.0, 0.0), q);

        let lul = s.add_bone("LeftUpLeg", Some(hips), Vec3::new(-0.1, 0.0, 0.0), q);
        let lll = s.add_bone("LeftLeg", Some(lul), Vec3::new(0.0, -0.45, 0.0), q);
        s.add_bone("LeftFoot", Some(lll), Vec3::new(0.0, -0.45, 0.0), q);
        let rul = s.add_bone("RightUpLeg", Some(hips), Vec3::new(0.1, 0.0, 0.0), q);
        let rll = s.add_bone("RightLeg", Some(rul), Vec3::new(0.0, -0.45, 0.0), q);
        s.add_bone("RightFoot", Some(rll), Vec3::new(0.0, -0.45, 0.0), q);
        s
    }

    #[test]
    fn avatar_without_skeleton_is_mesh_only() {
        let avatar = Avatar::new("prop.glb", None);
        assert!(!avatar.is_humanoid());
        assert!(avatar.rig().is_none());
    }

    #[test]
    fn instances_share_one_body_model() {
        let mut registry = AvatarRegistry::new();
        let a = registry.insert(Avatar::new("user.glb", Some(humanoid_skeleton())));
        let b = registry.instantiate(a).unwrap();

        let rig_a = registry.get(a).unwrap().rig().unwrap();
        let rig_b = registry.get(b).unwrap().rig().unwrap();
        assert!(Rc::ptr_eq(rig_a.body(), rig_b.body()));
    }

    #[test]
    fn instance_pose_is_independent() {
        let mut registry = AvatarRegistry::new();
        let a = registry.insert(Avatar::new("user.glb", Some(humanoid_skeleton())));
        let b = registry.instantiate(a).unwrap();

        registry
            .get_mut(b)
            .unwrap()
            .rig_mut()
            .unwrap()
            .crouch(0.3);

        let rig_a = registry.get(a).unwrap().rig().unwrap();
        let rig_b = registry.get(b).unwrap().rig().unwrap();
        assert_eq!(rig_a.root_offset(), 0.0);
        assert!(rig_b.root_offset() < -0.01);
    }

    #[test]
    fn resize_rescales_to_requested_height() {
        let mut rig = HumanoidRig::new(humanoid_skeleton());
        rig.resize(1.0);
        assert!((rig.skeleton().height() - 1.0).abs() < 1e-4);
        assert!((rig.posture().standing_head_height() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn crouch_lowers_and_stand_up_restores() {
        let mut rig = HumanoidRig::new(humanoid_skeleton());
        let standing = rig.head_height();

        rig.crouch(0.3);
        let crouched = rig.head_height();
        assert!(crouched < standing - 0.25, "crouched {crouched} vs {standing}");

        rig.stand_up();
        assert!((rig.head_height() - standing).abs() < 1e-3);
        assert_eq!(rig.root_offset(), 0.0);
    }

    #[test]
    fn tracked_height_drop_bends_the_knees() {
        let mut rig = HumanoidRig::new(humanoid_skeleton());
        let standing = rig.head_height();

        rig.track_height(standing, 0.0);
        rig.track_height(standing - 0.2, 0.1);
        assert!(rig.head_height() < standing - 0.1);
        assert!(rig.root_offset() < 0.0);
    }

    #[test]
    fn jump_lifts_the_root_not_the_legs() {
        let mut rig = HumanoidRig::new(humanoid_skeleton());
        let standing = rig.head_height();

        rig.track_height(standing, 0.0);
        rig.track_height(standing + 0.2, 0.05);

        assert!((rig.root_offset() - 0.2).abs() < 1e-4);
        // Legs stay straight; the lift is all root offset.
        assert!((rig.head_height() - (standing + 0.2)).abs() < 1e-3);
    }

    #[test]
    fn advance_completes_animated_reach() {
        let mut rig = HumanoidRig::new(humanoid_skeleton());
        let target = Vec3::new(-0.5, 1.3, 0.1);
        rig.reach_for(Side::Left, target, None, true);

        let upper = rig.body().left_arm.upper.unwrap();
        let before = rig.skeleton().bone(upper).rotation();
        rig.advance(1.0);
        let after = rig.skeleton().bone(upper).rotation();
        assert_ne!(before, after);

        // Sweep consumed once finished.
        assert!(rig.arms[0].sweep.is_none());
    }

    #[test]
    fn unknown_animation_is_an_error() {
        let avatar = Avatar::new("user.glb", Some(humanoid_skeleton()));
        assert!(matches!(
            avatar.animation("wave"),
            Err(AvatarError::UnknownAnimation(_))
        ));
    }

    #[test]
    fn dispose_removes_from_registry() {
        let mut registry = AvatarRegistry::new();
        let handle = registry.insert(Avatar::new("user.glb", None));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(handle).is_some());
        assert!(registry.is_empty());
    }
}
