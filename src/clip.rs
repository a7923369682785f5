//! Keyframed rotation clips.
//!
//! Animation groups are named slices of the asset's keyframe data: a set of
//! per-bone rotation tracks sampled on a shared frame timeline. Groups can
//! be cut out of a longer source group (fixes sidecars describe the cuts)
//! and are re-based so every group starts at frame zero.
//!
//! [`SweepClip`] is the solver's much smaller cousin: a two-keyframe
//! interpolation moving one limb pair from its current rotations toward the
//! solved ones, so procedural reaches glide instead of snapping.

use glam::Quat;
use serde::{Deserialize, Serialize};

use crate::error::AvatarError;
use crate::skeleton::{BoneIndex, Skeleton};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationKey {
    pub frame: f32,
    pub rotation: Quat,
}

/// Rotation keys for a single bone, ordered by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTrack {
    pub bone: BoneIndex,
    pub keys: Vec<RotationKey>,
}

impl BoneTrack {
    /// Slerped rotation at `frame`, clamped to the track's ends.
    pub fn sample(&self, frame: f32) -> Option<Quat> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if frame <= first.frame {
            return Some(first.rotation);
        }
        if frame >= last.frame {
            return Some(last.rotation);
        }

        let after = self.keys.iter().position(|k| k.frame > frame)?;
        let a = &self.keys[after - 1];
        let b = &self.keys[after];
        let span = b.frame - a.frame;
        let t = if span > f32::EPSILON {
            (frame - a.frame) / span
        } else {
            0.0
        };
        Some(a.rotation.slerp(b.rotation, t))
    }
}

/// A named set of bone tracks on a shared frame timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationGroup {
    pub name: String,
    pub looping: bool,
    pub tracks: Vec<BoneTrack>,
}

impl AnimationGroup {
    /// Last keyframe across all tracks.
    pub fn duration(&self) -> f32 {
        self.tracks
            .iter()
            .filter_map(|t| t.keys.last())
            .map(|k| k.frame)
            .fold(0.0_f32, f32::max)
    }

    /// Cut `[start, end]` out of this group as a new group named `name`,
    /// with frames re-based to zero.
    ///
    /// `None` bounds extend to the group's ends. Keys exactly on a bound are
    /// kept in the slice.
    pub fn slice(&self, start: Option<f32>, end: Option<f32>, name: impl Into<String>) -> Self {
        let start = start.unwrap_or(0.0);
        let end = end.unwrap_or_else(|| self.duration());

        let tracks = self
            .tracks
            .iter()
            .map(|track| BoneTrack {
                bone: track.bone,
                keys: track
                    .keys
                    .iter()
                    .filter(|k| k.frame >= start && k.frame <= end)
                    .map(|k| RotationKey {
                        frame: k.frame - start,
                        rotation: k.rotation,
                    })
                    .collect(),
            })
            .collect();

        Self {
            name: name.into(),
            looping: self.looping,
            tracks,
        }
    }

    /// Apply the group's pose at `frame` to the skeleton. Looping groups
    /// wrap the frame; one-shot groups clamp at the last key.
    pub fn apply(&self, skeleton: &mut Skeleton, frame: f32) {
        let duration = self.duration();
        let frame = if self.looping && duration > f32::EPSILON {
            frame.rem_euclid(duration)
        } else {
            frame
        };

        for track in &self.tracks {
            if let Some(rotation) = track.sample(frame) {
                skeleton.set_rotation(track.bone, rotation);
            }
        }
    }
}

/// Two-keyframe sweep carrying an upper/lower limb pair from its current
/// rotations to the solver's result over a fixed duration.
#[derive(Debug, Clone)]
pub struct SweepClip {
    upper_from: Quat,
    lower_from: Quat,
    upper_to: Quat,
    lower_to: Quat,
    elapsed: f32,
    duration: f32,
}

impl SweepClip {
    pub fn new(from: (Quat, Quat), to: (Quat, Quat), duration: f32) -> Self {
        Self {
            upper_from: from.0,
            lower_from: from.1,
            upper_to: to.0,
            lower_to: to.1,
            elapsed: 0.0,
            duration: duration.max(f32::EPSILON),
        }
    }

    /// Retarget a sweep in flight: the current interpolated pose becomes the
    /// new start, progress resets, the endpoint is replaced.
    pub fn refresh(&mut self, to: (Quat, Quat)) {
        let (upper, lower) = self.current();
        self.upper_from = upper;
        self.lower_from = lower;
        self.upper_to = to.0;
        self.lower_to = to.1;
        self.elapsed = 0.0;
    }

    /// Advance by `dt` seconds. Returns true once the sweep has finished.
    pub fn advance(&mut self, dt: f32) -> bool {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.finished()
    }

    pub fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn current(&self) -> (Quat, Quat) {
        let t = self.elapsed / self.duration;
        (
            self.upper_from.slerp(self.upper_to, t),
            self.lower_from.slerp(self.lower_to, t),
        )
    }

    pub fn target(&self) -> (Quat, Quat) {
        (self.upper_to, self.lower_to)
    }
}

// --- JSON interchange ---

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RotationKeyJson {
    frame: f32,
    rotation: [f32; 4],
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct BoneTrackJson {
    bone: String,
    keys: Vec<RotationKeyJson>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct AnimationGroupJson {
    name: String,
    #[serde(rename = "loop", default)]
    looping: bool,
    tracks: Vec<BoneTrackJson>,
}

/// Parse a JSON array of animation groups, resolving bone names against the
/// skeleton. Tracks naming unknown bones are logged and dropped.
pub fn groups_from_json(json: &str, skeleton: &Skeleton) -> Result<Vec<AnimationGroup>, AvatarError> {
    let parsed: Vec<AnimationGroupJson> = serde_json::from_str(json)?;

    let groups = parsed
        .into_iter()
        .map(|group| {
            let tracks = group
                .tracks
                .into_iter()
                .filter_map(|track| match skeleton.find(&track.bone) {
                    Some(bone) => Some(BoneTrack {
                        bone,
                        keys: track
                            .keys
                            .into_iter()
                            .map(|k| RotationKey {
                                frame: k.frame,
                                rotation: Quat::from_array(k.rotation).normalize(),
                            })
                            .collect(),
                    }),
                    None => {
                        log::warn!(
                            "animation '{}': dropping track for unknown bone '{}'",
                            group.name,
                            track.bone
                        );
                        None
                    }
                })
                .collect();

            AnimationGroup {
                name: group.name,
                looping: group.looping,
                tracks,
            }
        })
        .collect();

    Ok(groups)
}

/// Serialize groups back to the interchange format.
pub fn groups_to_json_string(
    groups: &[AnimationGroup],
    skeleton: &Skeleton,
) -> Result<String, AvatarError> {
    let out: Vec<AnimationGroupJson> = groups
        .iter()
        .map(|group| AnimationGroupJson {
            name: group.name.clone(),
            looping: group.looping,
            tracks: group
                .tracks
                .iter()
                .map(|track| BoneTrackJson {
                    bone: skeleton.bone(track.bone).name.clone(),
                    keys: track
                        .keys
                        .iter()
                        .map(|k| RotationKeyJson {
                            frame: k.frame,
                            rotation: k.rotation.to_array(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(serde_json::to_string(&out)?)
}
