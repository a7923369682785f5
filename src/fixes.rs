//! Per-asset fixes sidecar.
//!
//! Avatar assets come from many authoring tools and a lot of them need
//! hand-written corrections: a standing height override, nodes to hide,
//! animation groups cut out of one long timeline. Those corrections live in
//! a JSON sidecar next to the asset, keyed by the conventions below. A
//! missing or broken sidecar never blocks loading; the avatar just runs
//! uncorrected.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clip::AnimationGroup;
use crate::error::AvatarError;

/// One animation-group cut: slice `source` between `start` and `end`,
/// optionally renaming it and overriding its loop flag.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnimationGroupFix {
    pub source: String,
    pub start: Option<f32>,
    pub end: Option<f32>,
    pub name: Option<String>,
    #[serde(rename = "loop")]
    pub looping: Option<bool>,
}

/// The sidecar document. Every field is optional; absent fields mean "leave
/// the asset alone".
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvatarFixes {
    /// Override for the standing head height, in world units.
    pub standing: Option<f32>,
    /// Scene nodes the host should hide (stray helper meshes and such).
    pub nodes_disabled: Vec<String>,
    /// Frame to pose the skeleton at before any animation plays.
    pub before_animation: Option<f32>,
    /// Default loop flag for groups that do not override it.
    pub loop_animations: Option<bool>,
    /// Cuts to derive named groups from the asset's timelines.
    pub animation_groups: Vec<AnimationGroupFix>,
    /// Group to start playing as soon as the avatar loads.
    pub auto_play: Option<String>,
    /// Groups to play once before the named group starts, keyed by name.
    pub before: HashMap<String, Vec<String>>,
}

impl AvatarFixes {
    pub fn from_json(json: &str) -> Result<Self, AvatarError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Derive the corrected group list from the asset's groups.
    ///
    /// Without cut entries the input passes through untouched apart from the
    /// `loop_animations` default. Cut entries referring to a missing source
    /// group are logged and skipped.
    pub fn apply_groups(&self, source: &[AnimationGroup]) -> Vec<AnimationGroup> {
        let mut groups: Vec<AnimationGroup> = if self.animation_groups.is_empty() {
            source.to_vec()
        } else {
            self.animation_groups
                .iter()
                .filter_map(|fix| {
                    let Some(origin) = source.iter().find(|g| g.name == fix.source) else {
                        log::warn!("fixes reference unknown animation group '{}'", fix.source);
                        return None;
                    };

                    let name = fix.name.clone().unwrap_or_else(|| fix.source.clone());
                    let mut group = origin.slice(fix.start, fix.end, name);
                    if let Some(looping) = fix.looping {
                        group.looping = looping;
                    }
                    Some(group)
                })
                .collect()
        };

        if let Some(default) = self.loop_animations {
            let overridden: Vec<&str> = self
                .animation_groups
                .iter()
                .filter(|f| f.looping.is_some())
                .map(|f| f.name.as_deref().unwrap_or(f.source.as_str()))
                .collect();
            for group in &mut groups {
                if !overridden.contains(&group.name.as_str()) {
                    group.looping = default;
                }
            }
        }

        groups
    }

    /// Groups queued before `name` plays, per the `before` table.
    pub fn before_groups(&self, name: &str) -> &[String] {
        self.before.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{BoneTrack, RotationKey};
    use glam::Quat;

    fn source_group() -> AnimationGroup {
        AnimationGroup {
            name: "timeline".into(),
            looping: false,
            tracks: vec![BoneTrack {
                bone: 0,
                keys: (0..=4)
                    .map(|i| RotationKey {
                        frame: i as f32 * 10.0,
                        rotation: Quat::from_rotation_y(i as f32 * 0.1),
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn parses_representative_sidecar() {
        let json = r#"{
            "standing": 1.72,
            "nodesDisabled": ["Plane001"],
            "loopAnimations": true,
            "animationGroups": [
                { "source": "timeline", "start": 0, "end": 20, "name": "walk" },
                { "source": "timeline", "start": 20, "end": 40, "name": "wave", "loop": false }
            ],
            "autoPlay": "walk",
            "before": { "sit": ["sitdown"] }
        }"#;

        let fixes = AvatarFixes::from_json(json).unwrap();
        assert_eq!(fixes.standing, Some(1.72));
        assert_eq!(fixes.nodes_disabled, vec!["Plane001".to_string()]);
        assert_eq!(fixes.auto_play.as_deref(), Some("walk"));
        assert_eq!(fixes.before_groups("sit"), ["sitdown".to_string()]);
        assert_eq!(fixes.animation_groups.len(), 2);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let fixes = AvatarFixes::from_json("{}").unwrap();
        assert!(fixes.standing.is_none());
        assert!(fixes.animation_groups.is_empty());
        assert!(fixes.before_groups("anything").is_empty());
    }

    #[test]
    fn malformed_sidecar_is_an_error() {
        assert!(matches!(
            AvatarFixes::from_json("{ not json"),
            Err(AvatarError::Json(_))
        ));
    }

    #[test]
    fn apply_groups_cuts_and_overrides() {
        let fixes = AvatarFixes::from_json(
            r#"{
                "loopAnimations": true,
                "animationGroups": [
                    { "source": "timeline", "start": 0, "end": 20, "name": "walk" },
                    { "source": "timeline", "start": 20, "end": 40, "name": "wave", "loop": false },
                    { "source": "missing", "name": "ghost" }
                ]
            }"#,
        )
        .unwrap();

        let groups = fixes.apply_groups(&[source_group()]);

        // The missing source is skipped, not fatal.
        assert_eq!(groups.len(), 2);

        let walk = &groups[0];
        assert_eq!(walk.name, "walk");
        assert!(walk.looping);
        assert!((walk.duration() - 20.0).abs() < 1e-6);

        let wave = &groups[1];
        assert_eq!(wave.name, "wave");
        assert!(!wave.looping);
        assert_eq!(wave.tracks[0].keys[0].frame, 0.0);
    }

    #[test]
    fn loop_default_applies_without_cuts() {
        let fixes = AvatarFixes::from_json(r#"{ "loopAnimations": true }"#).unwrap();
        let groups = fixes.apply_groups(&[source_group()]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].looping);
        assert_eq!(groups[0].name, "timeline");
    }
}
