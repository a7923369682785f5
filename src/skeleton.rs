//! Runtime bone arena with lazy forward kinematics.
//!
//! Unlike a fixed bind-pose hierarchy, avatar assets arrive with arbitrary
//! bone counts, names and parenting, so the tree is runtime data: a flat
//! arena of [`Bone`] nodes addressed by [`BoneIndex`]. World transforms are
//! derived on demand and cached with per-bone dirty flags; setting a local
//! rotation invalidates only the affected subtree.
//!
//! The host engine owns the real scene graph. This arena is a snapshot of
//! its names, hierarchy and rest transforms; the only thing flowing back to
//! the host is per-bone local rotations.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

use crate::error::AvatarError;

/// Index into the skeleton's bone arena.
pub type BoneIndex = usize;

/// A node in the skeletal hierarchy.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub parent: Option<BoneIndex>,
    pub children: Vec<BoneIndex>,
    /// Local translation relative to the parent, at rest.
    pub rest_position: Vec3,
    /// Local rotation relative to the parent, at rest.
    pub rest_rotation: Quat,
    /// Current local rotation (written by the solver and clips).
    rotation: Quat,
}

impl Bone {
    /// Current local rotation.
    pub fn rotation(&self) -> Quat {
        self.rotation
    }
}

/// Cache for derived world transforms
#[derive(Debug, Clone, Default)]
struct WorldCache {
    positions: Vec<Vec3>,
    rotations: Vec<Quat>,
    dirty: Vec<bool>,
}

/// Flat bone arena with cached world transforms.
#[derive(Debug, Clone)]
pub struct Skeleton {
    bones: Vec<Bone>,
    roots: Vec<BoneIndex>,
    /// Uniform scale applied to every rest translation (see `resize`).
    scale: f32,
    cache: RefCell<WorldCache>,
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new()
    }
}

impl Skeleton {
    pub fn new() -> Self {
        Self {
            bones: Vec::new(),
            roots: Vec::new(),
            scale: 1.0,
            cache: RefCell::new(WorldCache::default()),
        }
    }

    /// Append a bone to the arena and link it to its parent.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<BoneIndex>,
        rest_position: Vec3,
        rest_rotation: Quat,
    ) -> BoneIndex {
        let index = self.bones.len();
        self.bones.push(Bone {
            name: name.into(),
            parent,
            children: Vec::new(),
            rest_position,
            rest_rotation,
            rotation: rest_rotation,
        });

        match parent {
            Some(p) => self.bones[p].children.push(index),
            None => self.roots.push(index),
        }

        let mut cache = self.cache.borrow_mut();
        cache.positions.push(Vec3::ZERO);
        cache.rotations.push(Quat::IDENTITY);
        cache.dirty.push(true);

        index
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, index: BoneIndex) -> &Bone {
        &self.bones[index]
    }

    pub fn roots(&self) -> &[BoneIndex] {
        &self.roots
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Find a bone by exact name.
    pub fn find(&self, name: &str) -> Option<BoneIndex> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Set the local rotation of a bone, invalidating its subtree.
    pub fn set_rotation(&mut self, index: BoneIndex, rotation: Quat) {
        if self.bones[index].rotation == rotation {
            return;
        }
        self.bones[index].rotation = rotation;
        self.mark_subtree_dirty(index);
    }

    /// Reset every bone to its rest rotation.
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.rotation = bone.rest_rotation;
        }
        self.mark_all_dirty();
    }

    /// Apply a uniform scale to the whole hierarchy.
    pub fn set_scale(&mut self, scale: f32) {
        if (self.scale - scale).abs() > f32::EPSILON {
            self.scale = scale;
            self.mark_all_dirty();
        }
    }

    fn mark_subtree_dirty(&self, index: BoneIndex) {
        let mut cache = self.cache.borrow_mut();
        let mut stack = vec![index];
        while let Some(ix) = stack.pop() {
            cache.dirty[ix] = true;
            stack.extend_from_slice(&self.bones[ix].children);
        }
    }

    fn mark_all_dirty(&self) {
        let mut cache = self.cache.borrow_mut();
        for flag in cache.dirty.iter_mut() {
            *flag = true;
        }
    }

    /// World-space position of a bone's origin (computes FK if needed).
    pub fn world_position(&self, index: BoneIndex) -> Vec3 {
        self.ensure_computed(index);
        self.cache.borrow().positions[index]
    }

    /// World-space rotation of a bone (computes FK if needed).
    pub fn world_rotation(&self, index: BoneIndex) -> Quat {
        self.ensure_computed(index);
        self.cache.borrow().rotations[index]
    }

    /// Highest bone origin in world space, or zero for an empty skeleton.
    ///
    /// Stands in for a bounding-box query over the hierarchy; the posture
    /// lifecycle uses it as the avatar's head-height reference.
    pub fn height(&self) -> f32 {
        (0..self.bones.len())
            .map(|ix| self.world_position(ix).y)
            .fold(0.0_f32, f32::max)
    }

    fn ensure_computed(&self, index: BoneIndex) {
        // Subtree dirtying guarantees a clean bone has clean ancestors, so
        // collecting the dirty chain upward and replaying it downward is
        // enough.
        let mut chain = Vec::new();
        let mut cursor = Some(index);
        while let Some(ix) = cursor {
            if self.cache.borrow().dirty[ix] {
                chain.push(ix);
            }
            cursor = self.bones[ix].parent;
        }

        for &ix in chain.iter().rev() {
            self.compute_bone(ix);
        }
    }

    fn compute_bone(&self, index: BoneIndex) {
        let bone = &self.bones[index];
        let mut cache = self.cache.borrow_mut();

        let (parent_pos, parent_rot) = match bone.parent {
            Some(p) => (cache.positions[p], cache.rotations[p]),
            None => (Vec3::ZERO, Quat::IDENTITY),
        };

        let world_rot = parent_rot * bone.rotation;
        let world_pos = parent_pos + parent_rot * (bone.rest_position * self.scale);

        cache.positions[index] = world_pos;
        cache.rotations[index] = world_rot;
        cache.dirty[index] = false;
    }

    /// Force recomputation of the whole hierarchy.
    pub fn compute_all(&self) {
        for ix in 0..self.bones.len() {
            self.ensure_computed(ix);
        }
    }

    /// All current local rotations, arena order. Hosts write these back into
    /// their scene graph each frame.
    pub fn local_rotations(&self) -> Vec<Quat> {
        self.bones.iter().map(|b| b.rotation).collect()
    }

    /// Build a skeleton from a host-provided scene graph snapshot.
    pub fn from_json(json: &str) -> Result<Self, AvatarError> {
        let nodes: Vec<BoneNodeJson> = serde_json::from_str(json)?;
        if nodes.is_empty() {
            return Err(AvatarError::NoSkeleton);
        }

        let mut skeleton = Skeleton::new();
        for node in &nodes {
            add_node(&mut skeleton, node, None);
        }
        Ok(skeleton)
    }
}

fn add_node(skeleton: &mut Skeleton, node: &BoneNodeJson, parent: Option<BoneIndex>) {
    let [x, y, z] = node.position;
    let [qx, qy, qz, qw] = node.rotation;
    let index = skeleton.add_bone(
        node.name.clone(),
        parent,
        Vec3::new(x, y, z),
        Quat::from_xyzw(qx, qy, qz, qw).normalize(),
    );
    for child in &node.children {
        add_node(skeleton, child, Some(index));
    }
}

/// Interchange format for a bone-tree snapshot: a top-level array of root
/// nodes, each carrying name, local rest transform and nested children.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoneNodeJson {
    pub name: String,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default = "identity_quat")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub children: Vec<BoneNodeJson>,
}

fn identity_quat() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bone_chain() -> Skeleton {
        let mut s = Skeleton::new();
        let root = s.add_bone("root", None, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY);
        s.add_bone("child", Some(root), Vec3::new(0.0, 0.5, 0.0), Quat::IDENTITY);
        s
    }

    #[test]
    fn world_positions_accumulate() {
        let s = two_bone_chain();
        assert!(s.world_position(0).distance(Vec3::new(0.0, 1.0, 0.0)) < 1e-6);
        assert!(s.world_position(1).distance(Vec3::new(0.0, 1.5, 0.0)) < 1e-6);
    }

    #[test]
    fn rotation_moves_children() {
        let mut s = two_bone_chain();
        s.set_rotation(0, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));

        // Child offset (0, 0.5, 0) rotates to (-0.5, 0, 0) around the root.
        let child = s.world_position(1);
        assert!(child.distance(Vec3::new(-0.5, 1.0, 0.0)) < 1e-5);
    }

    #[test]
    fn dirty_propagates_to_subtree_only() {
        let mut s = Skeleton::new();
        let root = s.add_bone("root", None, Vec3::ZERO, Quat::IDENTITY);
        let a = s.add_bone("a", Some(root), Vec3::Y, Quat::IDENTITY);
        let b = s.add_bone("b", Some(root), Vec3::X, Quat::IDENTITY);
        s.compute_all();

        s.set_rotation(a, Quat::from_rotation_x(0.3));
        assert!(s.cache.borrow().dirty[a]);
        assert!(!s.cache.borrow().dirty[b]);
        assert!(!s.cache.borrow().dirty[root]);
    }

    #[test]
    fn scale_rescales_uniformly() {
        let mut s = two_bone_chain();
        s.set_scale(2.0);
        assert!(s.world_position(1).distance(Vec3::new(0.0, 3.0, 0.0)) < 1e-5);
        assert!((s.height() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn json_roundtrip_builds_hierarchy() {
        let json = r#"[
            {
                "name": "Hips",
                "position": [0.0, 0.9, 0.0],
                "children": [
                    { "name": "Spine", "position": [0.0, 0.3, 0.0] }
                ]
            }
        ]"#;

        let s = Skeleton::from_json(json).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.bone(1).name, "Spine");
        assert_eq!(s.bone(1).parent, Some(0));
        assert!(s.world_position(1).distance(Vec3::new(0.0, 1.2, 0.0)) < 1e-6);
    }

    #[test]
    fn empty_json_is_no_skeleton() {
        assert!(matches!(
            Skeleton::from_json("[]"),
            Err(AvatarError::NoSkeleton)
        ));
    }
}
