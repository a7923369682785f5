//! JS boundary.
//!
//! The host engine keeps opaque integer handles; every avatar lives in a
//! thread-local registry on this side (wasm is single-threaded, so a
//! thread-local is effectively a per-module singleton). Data crossing the
//! boundary is limited to JSON strings in, flat float arrays and
//! serde-converted report objects out.

use std::cell::RefCell;

use glam::{Quat, Vec3};
use wasm_bindgen::prelude::*;

use crate::avatar::{Avatar, AvatarRegistry};
use crate::body::Side;
use crate::error::AvatarError;
use crate::fixes::AvatarFixes;
use crate::skeleton::Skeleton;
use crate::clip;

thread_local! {
    static REGISTRY: RefCell<AvatarRegistry> = RefCell::new(AvatarRegistry::new());
}

fn with_registry<R>(f: impl FnOnce(&mut AvatarRegistry) -> R) -> R {
    REGISTRY.with(|registry| f(&mut registry.borrow_mut()))
}

fn err_to_js(err: AvatarError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn side_of(right: bool) -> Side {
    if right {
        Side::Right
    } else {
        Side::Left
    }
}

/// Set up logging and panic reporting. Call once before anything else.
#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
    log::info!("avatar rig initialized");
}

/// Load an avatar from a skeleton snapshot. An empty or absent skeleton
/// yields a mesh-only avatar rather than an error; malformed JSON is an
/// error.
#[wasm_bindgen]
pub fn create_avatar(skeleton_json: &str, url: &str) -> Result<u32, JsValue> {
    let skeleton = if skeleton_json.trim().is_empty() {
        None
    } else {
        match Skeleton::from_json(skeleton_json) {
            Ok(s) => Some(s),
            Err(AvatarError::NoSkeleton) => None,
            Err(e) => return Err(err_to_js(e)),
        }
    };

    let handle = with_registry(|r| r.insert(Avatar::new(url, skeleton)));
    log::info!("created avatar {handle} from {url}");
    Ok(handle)
}

#[wasm_bindgen]
pub fn dispose_avatar(handle: u32) -> bool {
    with_registry(|r| r.remove(handle).is_some())
}

#[wasm_bindgen]
pub fn avatar_count() -> usize {
    with_registry(|r| r.len())
}

/// Instanced copy sharing the source's body model.
#[wasm_bindgen]
pub fn instantiate_avatar(handle: u32) -> Option<u32> {
    with_registry(|r| r.instantiate(handle))
}

#[wasm_bindgen]
pub fn set_base_position(handle: u32, x: f32, y: f32, z: f32) {
    with_registry(|r| {
        if let Some(avatar) = r.get_mut(handle) {
            avatar.info.base_position = Vec3::new(x, y, z);
        }
    });
}

#[wasm_bindgen]
pub fn set_avatar_name(handle: u32, name: &str) {
    with_registry(|r| {
        if let Some(avatar) = r.get_mut(handle) {
            avatar.info.name = name.to_string();
        }
    });
}

#[wasm_bindgen]
pub fn avatar_url(handle: u32) -> Option<String> {
    with_registry(|r| r.get(handle).map(|a| a.info.url.clone()))
}

#[wasm_bindgen]
pub fn is_humanoid(handle: u32) -> bool {
    with_registry(|r| r.get(handle).is_some_and(Avatar::is_humanoid))
}

/// Import animation groups for an avatar (see the clip JSON format).
#[wasm_bindgen]
pub fn load_animations(handle: u32, json: &str) -> Result<(), JsValue> {
    with_registry(|r| {
        let Some(avatar) = r.get_mut(handle) else {
            return Ok(());
        };
        let Some(rig) = avatar.rig() else {
            return Ok(());
        };
        let groups = clip::groups_from_json(json, rig.skeleton()).map_err(err_to_js)?;
        avatar.animations = groups;
        Ok(())
    })
}

/// Attach a fixes sidecar. A broken sidecar is logged and ignored; the
/// avatar keeps running uncorrected.
#[wasm_bindgen]
pub fn load_fixes(handle: u32, json: &str) {
    let fixes = match AvatarFixes::from_json(json) {
        Ok(fixes) => fixes,
        Err(e) => {
            log::warn!("ignoring broken fixes sidecar for avatar {handle}: {e}");
            return;
        }
    };

    with_registry(|r| {
        if let Some(avatar) = r.get_mut(handle) {
            let source = avatar.animations.clone();
            avatar.apply_fixes(fixes, &source);
        }
    });
}

/// Pose the skeleton from a named animation group at `frame`.
#[wasm_bindgen]
pub fn apply_animation(handle: u32, name: &str, frame: f32) -> Result<(), JsValue> {
    with_registry(|r| {
        let Some(avatar) = r.get_mut(handle) else {
            return Ok(());
        };
        let group = avatar.animation(name).map_err(err_to_js)?.clone();
        if let Some(rig) = avatar.rig_mut() {
            group.apply(rig.skeleton_mut(), frame);
        }
        Ok(())
    })
}

/// Serialize the avatar's current animation groups (after fixes).
#[wasm_bindgen]
pub fn export_animations(handle: u32) -> Result<String, JsValue> {
    with_registry(|r| {
        let Some(avatar) = r.get(handle) else {
            return Ok(String::from("[]"));
        };
        let Some(rig) = avatar.rig() else {
            return Ok(String::from("[]"));
        };
        clip::groups_to_json_string(&avatar.animations, rig.skeleton()).map_err(err_to_js)
    })
}

/// Scene nodes the fixes sidecar wants hidden.
#[wasm_bindgen]
pub fn nodes_disabled(handle: u32) -> Vec<String> {
    with_registry(|r| {
        r.get(handle)
            .and_then(|a| a.fixes.as_ref())
            .map(|f| f.nodes_disabled.clone())
            .unwrap_or_default()
    })
}

/// Animation group the fixes sidecar wants started on load.
#[wasm_bindgen]
pub fn auto_play(handle: u32) -> Option<String> {
    with_registry(|r| {
        r.get(handle)
            .and_then(|a| a.fixes.as_ref())
            .and_then(|f| f.auto_play.clone())
    })
}

/// Role-to-bone-name classification report, as a plain JS object.
#[wasm_bindgen]
pub fn body_report(handle: u32) -> Result<JsValue, JsValue> {
    with_registry(|r| {
        let report = r
            .get(handle)
            .and_then(Avatar::rig)
            .map(|rig| rig.body().report(rig.skeleton()));
        match report {
            Some(report) => {
                serde_wasm_bindgen::to_value(&report).map_err(|e| JsValue::from_str(&e.to_string()))
            }
            None => Ok(JsValue::NULL),
        }
    })
}

/// Point an arm at a world-space target. Returns true when in reach.
#[wasm_bindgen]
pub fn reach_for(handle: u32, right: bool, x: f32, y: f32, z: f32, animate: bool) -> bool {
    with_registry(|r| {
        r.get_mut(handle)
            .and_then(Avatar::rig_mut)
            .map(|rig| rig.reach_for(side_of(right), Vec3::new(x, y, z), None, animate))
            .unwrap_or(false)
    })
}

/// Like `reach_for`, but the hand follows a pointing device's orientation
/// (quaternion in xyzw order).
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn point_at(
    handle: u32,
    right: bool,
    x: f32,
    y: f32,
    z: f32,
    qx: f32,
    qy: f32,
    qz: f32,
    qw: f32,
    animate: bool,
) -> bool {
    let pointer = Quat::from_xyzw(qx, qy, qz, qw).normalize();
    with_registry(|r| {
        r.get_mut(handle)
            .and_then(Avatar::rig_mut)
            .map(|rig| rig.reach_for(side_of(right), Vec3::new(x, y, z), Some(pointer), animate))
            .unwrap_or(false)
    })
}

#[wasm_bindgen]
pub fn look_at(handle: u32, x: f32, y: f32, z: f32) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.look_at(Vec3::new(x, y, z));
        }
    });
}

/// Feed one tracked head-height sample with an explicit clock (seconds).
#[wasm_bindgen]
pub fn track_height(handle: u32, height: f32, now_secs: f64) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.track_height(height, now_secs);
        }
    });
}

/// `track_height` stamped with the browser's performance clock.
#[wasm_bindgen]
pub fn track_height_now(handle: u32, height: f32) {
    let now_secs = web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now() / 1000.0)
        .unwrap_or_default();
    track_height(handle, height, now_secs);
}

#[wasm_bindgen]
pub fn crouch(handle: u32, amount: f32) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.crouch(amount);
        }
    });
}

#[wasm_bindgen]
pub fn rise(handle: u32, amount: f32) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.rise(amount);
        }
    });
}

#[wasm_bindgen]
pub fn stand_up(handle: u32) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.stand_up();
        }
    });
}

#[wasm_bindgen]
pub fn resize(handle: u32, height: f32) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.resize(height);
        }
    });
}

/// Advance reach sweeps by `delta_ms`.
#[wasm_bindgen]
pub fn advance_time(handle: u32, delta_ms: f32) {
    with_registry(|r| {
        if let Some(rig) = r.get_mut(handle).and_then(Avatar::rig_mut) {
            rig.advance(delta_ms / 1000.0);
        }
    });
}

/// Vertical offset the host should apply to the avatar's scene node.
#[wasm_bindgen]
pub fn root_offset(handle: u32) -> f32 {
    with_registry(|r| {
        r.get(handle)
            .and_then(Avatar::rig)
            .map(|rig| rig.root_offset())
            .unwrap_or(0.0)
    })
}

/// All local bone rotations in arena order, flattened xyzw. The host writes
/// these back into its scene graph each frame.
#[wasm_bindgen]
pub fn bone_rotations(handle: u32) -> Vec<f32> {
    with_registry(|r| {
        r.get(handle)
            .and_then(Avatar::rig)
            .map(|rig| {
                rig.skeleton()
                    .local_rotations()
                    .iter()
                    .flat_map(|q| q.to_array())
                    .collect()
            })
            .unwrap_or_default()
    })
}

/// Local rotation of a single named bone, xyzw.
#[wasm_bindgen]
pub fn bone_rotation(handle: u32, name: &str) -> Result<Vec<f32>, JsValue> {
    with_registry(|r| {
        let Some(rig) = r.get(handle).and_then(Avatar::rig) else {
            return Err(JsValue::from_str("no such avatar"));
        };
        let ix = rig
            .skeleton()
            .find(name)
            .ok_or_else(|| err_to_js(AvatarError::UnknownBone(name.to_string())))?;
        Ok(rig.skeleton().bone(ix).rotation().to_array().to_vec())
    })
}
