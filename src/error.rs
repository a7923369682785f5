use thiserror::Error;

/// Errors from the fallible loading paths (skeleton JSON, fixes sidecars,
/// animation group import).
///
/// Classification and solving never return these: heuristic failures are
/// logged and degrade to a simpler result instead (see `body::classify`).
#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("container has no skeleton")]
    NoSkeleton,

    #[error("unknown animation group '{0}'")]
    UnknownAnimation(String),

    #[error("unknown bone '{0}'")]
    UnknownBone(String),
}
