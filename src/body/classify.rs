//! Heuristic skeleton classifier.
//!
//! Ingests a bone tree of unknown naming convention and routes bones into
//! the canonical [`BodyModel`] roles using an ordered list of name-pattern
//! and topology rules. The asset corpus is hand-authored and inconsistent,
//! so nothing here is fatal: an unmatched bone is logged and skipped, and
//! the worst outcome is a sparser model (straight limbs, no gaze).
//!
//! Each bone is consumed at most once, tracked through a processed set, so
//! running the classifier twice over the same skeleton yields an identical
//! model.

use crate::skeleton::{BoneIndex, Skeleton};

use super::model::{BodyModel, Side, FINGER_COUNT};

/// Classify a skeleton into a body model.
///
/// Axis inference and the `processed` flag are handled separately by
/// [`super::axis::infer_axes`], which needs mutable skeleton access.
pub fn classify(skeleton: &Skeleton) -> BodyModel {
    let mut classifier = Classifier::new(skeleton);
    for &root in skeleton.roots() {
        classifier.visit(root);
    }
    classifier.finish()
}

// --- Name predicates ---
//
// All matching happens on lowercased names. Kept as standalone functions so
// each rule is testable on its own and the precedence lives in one place.

pub(crate) fn is_root_joint_name(name: &str) -> bool {
    name.contains("rootjoint")
}

pub(crate) fn is_hips_name(name: &str) -> bool {
    name.contains("pelvis") || name.contains("hip") || name.contains("spine") || name.contains("root")
}

pub(crate) fn is_spine_name(name: &str) -> bool {
    name.contains("spine") || name.contains("body")
}

pub(crate) fn is_breast_name(name: &str) -> bool {
    name.contains("breast")
}

/// Neck/head/collar family, excluding collarbones and side collars which
/// belong to the arms.
pub(crate) fn is_neck_name(name: &str) -> bool {
    name.contains("neck")
        || name.contains("head")
        || (name.contains("collar")
            && !name.contains("bone")
            && !name.contains("lcollar")
            && !name.contains("rcollar"))
}

pub(crate) fn leg_side_token(name: &str, side: Side) -> bool {
    match side {
        Side::Left => {
            name.contains("left")
                || name.contains("lleg")
                || name.contains("l_")
                || name.contains(" l ")
                || name.contains("lthigh")
                || name.contains("lhip")
        }
        Side::Right => {
            name.contains("right")
                || name.contains("rleg")
                || name.contains("r_")
                || name.contains(" r ")
                || name.contains("rthigh")
                || name.contains("rhip")
        }
    }
}

pub(crate) fn arm_side_token(name: &str, side: Side) -> bool {
    match side {
        Side::Left => {
            name.contains("left")
                || name.contains("lshoulder")
                || name.contains("lclavicle")
                || name.contains("lcollar")
                || name.contains("larm")
                || name.contains(" l ")
                || name.contains("l_")
        }
        Side::Right => {
            name.contains("right")
                || name.contains("rshoulder")
                || name.contains("rclavicle")
                || name.contains("rcollar")
                || name.contains("rarm")
                || name.contains(" r ")
                || name.contains("r_")
        }
    }
}

pub(crate) fn is_leg_name(name: &str) -> bool {
    name.contains("thigh") || name.contains("leg")
}

/// Where a hip child gets routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HipChildOutcome {
    Spine,
    Leg(Side),
    NestedHips,
    SpineFallback,
    Discard,
}

type HipChildPredicate = fn(&Skeleton, BoneIndex, &str) -> bool;

/// Ordered routing rules for the children of the hips bone. The first
/// matching rule wins; precedence is part of the contract.
pub(crate) const HIP_CHILD_RULES: &[(HipChildPredicate, HipChildOutcome)] = &[
    (|_, _, name| is_spine_name(name), HipChildOutcome::Spine),
    (
        |s, ix, name| leg_side_token(name, Side::Left) || grandchild_token(s, ix, "l_"),
        HipChildOutcome::Leg(Side::Left),
    ),
    (
        |s, ix, name| leg_side_token(name, Side::Right) || grandchild_token(s, ix, "r_"),
        HipChildOutcome::Leg(Side::Right),
    ),
    (
        |s, ix, name| s.bone(ix).children.len() >= 3 && is_hips_name(name),
        HipChildOutcome::NestedHips,
    ),
    (
        |s, ix, _| !s.bone(ix).children.is_empty(),
        HipChildOutcome::SpineFallback,
    ),
    (|_, _, _| true, HipChildOutcome::Discard),
];

fn grandchild_token(skeleton: &Skeleton, ix: BoneIndex, token: &str) -> bool {
    skeleton.bone(ix).children.iter().any(|&child| {
        skeleton
            .bone(child)
            .children
            .iter()
            .any(|&gc| skeleton.bone(gc).name.to_lowercase().contains(token))
    })
}

/// Length of the chain below `ix` following first children only.
fn chain_depth_below(skeleton: &Skeleton, ix: BoneIndex) -> usize {
    let mut depth = 0;
    let mut cursor = skeleton.bone(ix).children.first().copied();
    while let Some(c) = cursor {
        depth += 1;
        cursor = skeleton.bone(c).children.first().copied();
    }
    depth
}

/// Arm shape test: named like a shoulder, or deep enough to hold
/// shoulder/upper/lower/hand.
fn looks_like_arm(skeleton: &Skeleton, ix: BoneIndex, name: &str) -> bool {
    name.contains("shoulder") || name.contains("clavicle") || chain_depth_below(skeleton, ix) >= 3
}

struct Classifier<'a> {
    skeleton: &'a Skeleton,
    body: BodyModel,
    processed: Vec<bool>,
}

impl<'a> Classifier<'a> {
    fn new(skeleton: &'a Skeleton) -> Self {
        Self {
            skeleton,
            body: BodyModel::default(),
            processed: vec![false; skeleton.len()],
        }
    }

    fn consumed(&self, ix: BoneIndex) -> bool {
        self.processed[ix]
    }

    fn mark(&mut self, ix: BoneIndex) {
        self.processed[ix] = true;
    }

    fn name_lc(&self, ix: BoneIndex) -> String {
        self.skeleton.bone(ix).name.to_lowercase()
    }

    fn unconsumed_children(&self, ix: BoneIndex) -> Vec<BoneIndex> {
        self.skeleton
            .bone(ix)
            .children
            .iter()
            .copied()
            .filter(|&c| !self.consumed(c))
            .collect()
    }

    /// Depth-first descent looking for the root joint and the hips anchor.
    fn visit(&mut self, ix: BoneIndex) {
        if self.consumed(ix) {
            return;
        }

        let name = self.name_lc(ix);

        if is_root_joint_name(&name) && self.body.root.is_none() {
            self.body.root = Some(ix);
            self.mark(ix);
            for child in self.skeleton.bone(ix).children.clone() {
                self.visit(child);
            }
            return;
        }

        if self.body.hips.is_none()
            && is_hips_name(&name)
            && self.skeleton.bone(ix).children.len() >= 3
        {
            self.body.hips = Some(ix);
            self.mark(ix);
            self.route_hip_children(ix);
            return;
        }

        self.mark(ix);
        for child in self.skeleton.bone(ix).children.clone() {
            self.visit(child);
        }
    }

    fn route_hip_children(&mut self, hips: BoneIndex) {
        for child in self.unconsumed_children(hips) {
            let name = self.name_lc(child);
            let outcome = HIP_CHILD_RULES
                .iter()
                .find(|(test, _)| test(self.skeleton, child, &name))
                .map(|(_, outcome)| *outcome)
                .unwrap_or(HipChildOutcome::Discard);

            match outcome {
                HipChildOutcome::Spine | HipChildOutcome::SpineFallback => {
                    self.process_spine(child)
                }
                HipChildOutcome::Leg(side) => self.process_leg(child, side),
                HipChildOutcome::NestedHips => {
                    // Malformed rig with a second hip-shaped joint below the
                    // hips; route its children as if it were the anchor.
                    self.mark(child);
                    self.route_hip_children(child);
                }
                HipChildOutcome::Discard => {
                    self.mark(child);
                    log::debug!(
                        "discarding childless hip bone '{}'",
                        self.skeleton.bone(child).name
                    );
                }
            }
        }
    }

    /// Walk single-child chains upward, then classify the branch children.
    fn process_spine(&mut self, start: BoneIndex) {
        let mut ix = start;
        loop {
            self.mark(ix);
            self.body.spine.push(ix);

            let kids = self.unconsumed_children(ix);
            match kids.len() {
                0 => break,
                1 => ix = kids[0],
                _ => {
                    self.classify_branch(&kids);
                    break;
                }
            }
        }
    }

    fn classify_branch(&mut self, children: &[BoneIndex]) {
        for &child in children {
            if self.consumed(child) {
                continue;
            }
            let name = self.name_lc(child);

            if is_neck_name(&name) {
                let grandchildren = self.skeleton.bone(child).children.len();
                self.process_neck(child);
                if name.contains("neck") && grandchildren > 2 {
                    // Ambiguous rig: the neck bone is also the arm split
                    // point. Classify its remaining children here as well.
                    let rest = self.unconsumed_children(child);
                    self.classify_branch(&rest);
                }
                continue;
            }

            if is_breast_name(&name) {
                self.mark(child);
                log::debug!("skipping breast bone '{}'", self.skeleton.bone(child).name);
                continue;
            }

            if looks_like_arm(self.skeleton, child, &name) {
                let side = if arm_side_token(&name, Side::Left) {
                    Some(Side::Left)
                } else if arm_side_token(&name, Side::Right) {
                    Some(Side::Right)
                } else {
                    None
                };
                if let Some(side) = side {
                    self.process_arm(child, side);
                    continue;
                }
            }

            self.mark(child);
            log::warn!(
                "unclassified bone '{}' at spine branch",
                self.skeleton.bone(child).name
            );
        }
    }

    fn process_neck(&mut self, ix: BoneIndex) {
        self.mark(ix);
        if self.body.neck.is_some() {
            return;
        }
        self.body.neck = Some(ix);

        // Prefer a child actually named like a head; rigs where the neck
        // doubles as the arm split put shoulders next to it.
        let children = self.unconsumed_children(ix);
        let head = children
            .iter()
            .copied()
            .find(|&c| self.name_lc(c).contains("head"))
            .or_else(|| children.first().copied());
        if let Some(head) = head {
            self.mark(head);
            self.body.head = Some(head);
        }
    }

    fn process_arm(&mut self, ix: BoneIndex, side: Side) {
        self.mark(ix);
        if self.body.arm(side).is_complete() {
            log::warn!(
                "duplicate {:?} arm candidate '{}' ignored",
                side,
                self.skeleton.bone(ix).name
            );
            return;
        }

        let upper = self.unconsumed_children(ix).first().copied();
        let lower = upper.and_then(|u| {
            self.mark(u);
            self.unconsumed_children(u).first().copied()
        });
        let hand = lower.and_then(|l| {
            self.mark(l);
            self.unconsumed_children(l).first().copied()
        });
        if let Some(h) = hand {
            self.mark(h);
        }

        // Either both segments exist or the limb stays empty.
        let (Some(upper), Some(lower)) = (upper, lower) else {
            log::warn!(
                "partial {:?} arm under '{}' ignored",
                side,
                self.skeleton.bone(ix).name
            );
            return;
        };

        let arm = self.body.arm_mut(side);
        arm.shoulder = Some(ix);
        arm.upper = Some(upper);
        arm.lower = Some(lower);
        arm.hand = hand;

        if let Some(hand) = hand {
            self.classify_fingers(hand, side);
        }
    }

    fn classify_fingers(&mut self, hand: BoneIndex, side: Side) {
        let children = self.unconsumed_children(hand);
        if children.len() != FINGER_COUNT {
            log::debug!(
                "hand '{}' has {} children, skipping finger classification",
                self.skeleton.bone(hand).name,
                children.len()
            );
            return;
        }

        for child in children {
            let name = self.name_lc(child);
            let slot = if name.contains("thumb") {
                Some(0)
            } else if name.contains("index") || name.contains("point") {
                Some(1)
            } else if name.contains("middle") {
                Some(2)
            } else if name.contains("ring") {
                Some(3)
            } else if name.contains("pink") || name.contains("little") {
                Some(4)
            } else {
                None
            };

            let Some(slot) = slot else {
                self.mark(child);
                log::warn!("unrecognized finger '{}'", self.skeleton.bone(child).name);
                continue;
            };

            // Walk the chain to the fingertip, appending every bone.
            let mut chain = Vec::new();
            let mut cursor = Some(child);
            while let Some(c) = cursor {
                self.mark(c);
                chain.push(c);
                cursor = self.unconsumed_children(c).first().copied();
            }
            self.body.arm_mut(side).fingers[slot] = chain;
        }
    }

    fn process_leg(&mut self, ix: BoneIndex, side: Side) {
        if self.body.leg(side).is_complete() {
            self.mark(ix);
            return;
        }

        let name = self.name_lc(ix);
        let upper = if is_leg_name(&name) {
            self.mark(ix);
            Some(ix)
        } else {
            // Shape heuristics for unnamed hip-side helpers.
            let depth = chain_depth_below(self.skeleton, ix);
            self.mark(ix);
            if self.skeleton.bone(ix).children.is_empty() {
                log::debug!("ignoring vestigial leg bone '{}'", self.skeleton.bone(ix).name);
                None
            } else if depth == 2 {
                // Missing-foot leg: the wrapper's chain is upper/lower only.
                self.unconsumed_children(ix).first().copied()
            } else {
                let first = self.unconsumed_children(ix).first().copied();
                if let Some(first) = first {
                    self.process_leg(first, side);
                }
                return;
            }
        };

        let Some(upper) = upper else {
            return;
        };
        self.mark(upper);

        let Some(lower) = self.unconsumed_children(upper).first().copied() else {
            log::warn!(
                "partial {:?} leg under '{}' ignored",
                side,
                self.skeleton.bone(upper).name
            );
            return;
        };
        self.mark(lower);

        // Consume the whole foot/toe chain below the lower leg.
        let mut foot = Vec::new();
        let mut cursor = self.unconsumed_children(lower).first().copied();
        while let Some(c) = cursor {
            self.mark(c);
            foot.push(c);
            cursor = self.unconsumed_children(c).first().copied();
        }

        let leg = self.body.leg_mut(side);
        leg.upper = Some(upper);
        leg.lower = Some(lower);
        leg.foot = foot;
    }

    /// Derive rest lengths and head orientation caches.
    fn finish(mut self) -> BodyModel {
        let s = self.skeleton;

        for side in [Side::Left, Side::Right] {
            let arm = self.body.arm(side).clone();
            if let (Some(upper), Some(lower)) = (arm.upper, arm.lower) {
                let upper_len = s.world_position(upper).distance(s.world_position(lower));
                let lower_len = match arm.hand {
                    Some(hand) => s.world_position(lower).distance(s.world_position(hand)),
                    None => upper_len,
                };
                let arm = self.body.arm_mut(side);
                arm.upper_length = upper_len;
                arm.lower_length = lower_len;
            }

            let leg = self.body.leg(side).clone();
            if let (Some(upper), Some(lower)) = (leg.upper, leg.lower) {
                let upper_len = s.world_position(upper).distance(s.world_position(lower));
                let lower_len = match leg.foot.first() {
                    Some(&foot) => s.world_position(lower).distance(s.world_position(foot)),
                    None => upper_len,
                };
                let leg = self.body.leg_mut(side);
                leg.upper_length = upper_len;
                leg.lower_length = lower_len;
            }
        }

        if let (Some(neck), Some(head)) = (self.body.neck, self.body.head) {
            let neck_quat = s.world_rotation(neck);
            let head_quat = s.world_rotation(head);
            self.body.neck_quat = neck_quat;
            self.body.neck_quat_inv = neck_quat.inverse();
            self.body.head_quat = head_quat;
            self.body.head_quat_inv = head_quat.inverse();

            // Rest Z conventions, snapped to the nearest axis: rigs where
            // head and neck point opposite ways need a compensating flip
            // during gaze tracking.
            let neck_ref = crate::math::round_to_unit(neck_quat * glam::Vec3::Z);
            let head_ref = crate::math::round_to_unit(head_quat * glam::Vec3::Z);
            let dot = head_ref.dot(neck_ref);
            self.body.head_axis_fix = if dot < 0.0 { -1.0 } else { 1.0 };

            self.body.head_target = -(self.body.head_quat_inv * glam::Vec3::Z);
        }

        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn name_predicates() {
        assert!(is_hips_name("mixamorig:hips"));
        assert!(is_hips_name("pelvis"));
        assert!(!is_hips_name("head"));

        assert!(is_neck_name("neck_01"));
        assert!(is_neck_name("uppercollar"));
        assert!(!is_neck_name("lcollar"));
        assert!(!is_neck_name("collarbone"));

        assert!(leg_side_token("leftupleg", Side::Left));
        assert!(leg_side_token("lthigh", Side::Left));
        assert!(!leg_side_token("rightupleg", Side::Left));

        assert!(arm_side_token("rshoulder", Side::Right));
        assert!(arm_side_token("left arm", Side::Left));
    }

    #[test]
    fn hip_rule_precedence_prefers_spine_over_leg_tokens() {
        // "spinel_01" contains both "spine" and "l_"; the spine rule is
        // listed first and must win.
        let mut s = Skeleton::new();
        let hips = s.add_bone("hips", None, Vec3::ZERO, Quat::IDENTITY);
        let child = s.add_bone("spinel_01", Some(hips), Vec3::Y, Quat::IDENTITY);

        let name = "spinel_01";
        let outcome = HIP_CHILD_RULES
            .iter()
            .find(|(test, _)| test(&s, child, name))
            .map(|(_, o)| *o)
            .unwrap();
        assert_eq!(outcome, HipChildOutcome::Spine);
    }

    #[test]
    fn childless_hip_child_is_discarded() {
        let mut s = Skeleton::new();
        let hips = s.add_bone("hips", None, Vec3::ZERO, Quat::IDENTITY);
        s.add_bone("stub", Some(hips), Vec3::X, Quat::IDENTITY);
        s.add_bone("spine", Some(hips), Vec3::Y, Quat::IDENTITY);
        s.add_bone("leftleg", Some(hips), Vec3::NEG_X, Quat::IDENTITY);

        let body = classify(&s);
        assert_eq!(body.hips, Some(hips));
        assert!(!body.assigned_roles().contains(&1));
    }

    #[test]
    fn partial_arm_is_rejected_whole() {
        // Shoulder with an upper arm but nothing below: neither segment may
        // be assigned.
        let mut s = Skeleton::new();
        let hips = s.add_bone("hips", None, Vec3::ZERO, Quat::IDENTITY);
        s.add_bone("leftupleg", Some(hips), Vec3::NEG_X, Quat::IDENTITY);
        s.add_bone("rightupleg", Some(hips), Vec3::X, Quat::IDENTITY);
        let spine = s.add_bone("spine", Some(hips), Vec3::Y, Quat::IDENTITY);
        s.add_bone("neck", Some(spine), Vec3::Y, Quat::IDENTITY);
        let shoulder = s.add_bone("leftshoulder", Some(spine), Vec3::NEG_X, Quat::IDENTITY);
        s.add_bone("leftarm", Some(shoulder), Vec3::NEG_X, Quat::IDENTITY);

        let body = classify(&s);
        assert!(!body.left_arm.is_complete());
        assert_eq!(body.left_arm.upper, None);
        assert_eq!(body.left_arm.shoulder, None);
    }

    #[test]
    fn root_joint_is_recognized_without_consuming_children() {
        let mut s = Skeleton::new();
        let root = s.add_bone("RootJoint", None, Vec3::ZERO, Quat::IDENTITY);
        let hips = s.add_bone("hips", Some(root), Vec3::Y, Quat::IDENTITY);
        s.add_bone("spine", Some(hips), Vec3::Y, Quat::IDENTITY);
        s.add_bone("leftupleg", Some(hips), Vec3::NEG_X, Quat::IDENTITY);
        s.add_bone("rightupleg", Some(hips), Vec3::X, Quat::IDENTITY);

        let body = classify(&s);
        assert_eq!(body.root, Some(root));
        assert_eq!(body.hips, Some(hips));
    }
}
