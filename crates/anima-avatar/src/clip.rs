//! Engine-neutral animation clip model.
//!
//! A clip is an ordered set of tracks, each binding a bone identifier and
//! a property to a time-sampled curve. Clips arrive from whatever loader
//! the host uses (GLTF, FBX); retargeting derives a new clip against a
//! specific skeleton and the derived clip is immutable from then on.

use serde::{Deserialize, Serialize};

/// The property a track animates on its bone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackProperty {
    Position,
    Quaternion,
    Scale,
    /// Anything else (e.g. morph-target weight tracks).
    Other(String),
}

impl TrackProperty {
    /// Parse the suffix of a `Node.property` track name.
    pub fn parse(suffix: &str) -> TrackProperty {
        match suffix {
            "position" => TrackProperty::Position,
            "quaternion" => TrackProperty::Quaternion,
            "scale" => TrackProperty::Scale,
            other => TrackProperty::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrackProperty::Position => "position",
            TrackProperty::Quaternion => "quaternion",
            TrackProperty::Scale => "scale",
            TrackProperty::Other(s) => s,
        }
    }
}

/// One sampled curve bound to a (bone, property) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Bone identifier as authored (possibly namespaced).
    pub bone: String,
    pub property: TrackProperty,
    /// Key times in seconds, ascending.
    pub times: Vec<f32>,
    /// Flat key values, `value_size` floats per key.
    pub values: Vec<f32>,
    /// Floats per key (3 for position/scale, 4 for quaternion).
    pub value_size: usize,
}

impl Track {
    /// Full track name in `Bone.property` form.
    pub fn name(&self) -> String {
        format!("{}.{}", self.bone, self.property.as_str())
    }

    /// Split a `Node.property` track name at its last dot. None when the
    /// name carries no property suffix.
    pub fn split_name(name: &str) -> Option<(&str, &str)> {
        let dot = name.rfind('.')?;
        Some((&name[..dot], &name[dot + 1..]))
    }

    /// End time of the last key.
    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

/// An ordered set of named tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    /// Clip duration: the latest key across all tracks.
    pub fn duration(&self) -> f32 {
        self.tracks
            .iter()
            .map(Track::end_time)
            .fold(0.0, f32::max)
    }
}
