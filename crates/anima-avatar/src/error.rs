//! Error types for the anima avatar animation layer

use thiserror::Error;

/// Result type alias for avatar operations
pub type AvatarResult<T> = Result<T, AvatarError>;

/// Errors that can occur while animating the avatar
#[derive(Error, Debug)]
pub enum AvatarError {
    /// A playback request named a clip that was never registered.
    #[error("Animation clip not found: {0}")]
    ClipNotFound(String),

    /// Retargeting left a clip with no usable tracks. The clip is not
    /// registered; nothing plays for that request.
    #[error("Clip \"{0}\" has no tracks matching the target skeleton")]
    EmptyClip(String),

    /// A clip with the same name is already registered.
    #[error("Animation clip already registered: {0}")]
    DuplicateClip(String),
}
