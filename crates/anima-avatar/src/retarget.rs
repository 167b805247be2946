//! Retargeting: adapt clips authored against one bone-naming scheme to a
//! differently-named skeleton.
//!
//! Matching is a pure function of the track names and the target's bone
//! set. Candidates are derived by progressively stripping known authoring
//! artifacts (animation-path namespaces, colon namespaces, leading indices,
//! the mixamo rig prefix) and tested for an exact match first; a normalized
//! substring comparison catches the rest. Tracks that would distort the
//! target body — uniform scale, and root/hip translation — are stripped
//! after matching.

use crate::clip::{AnimationClip, Track, TrackProperty};
use crate::error::{AvatarError, AvatarResult};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Bone identifiers present on a target skeleton. Built once per rig.
pub struct BoneNameIndex {
    names: HashSet<String>,
    /// (original, normalized) pairs for the fuzzy pass, in a stable order.
    normalized: Vec<(String, String)>,
}

impl BoneNameIndex {
    pub fn new<I, S>(bones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = HashSet::new();
        let mut normalized = Vec::new();
        for bone in bones {
            let bone: String = bone.into();
            if names.insert(bone.clone()) {
                normalized.push((bone.clone(), normalize(&bone)));
            }
        }
        Self { names, normalized }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve a raw track node name to a bone on this skeleton.
    pub fn resolve(&self, raw_node: &str) -> Option<&str> {
        let candidates = candidate_names(raw_node);
        for candidate in &candidates {
            if let Some(exact) = self.names.get(candidate.as_str()) {
                return Some(exact.as_str());
            }
        }
        self.fuzzy_resolve(&candidates)
    }

    /// Normalized substring match, either direction, first hit wins.
    fn fuzzy_resolve(&self, candidates: &[String]) -> Option<&str> {
        let candidate_norms: Vec<String> = candidates
            .iter()
            .map(|c| normalize(c))
            .filter(|n| !n.is_empty())
            .collect();
        for (bone, bone_norm) in &self.normalized {
            if bone_norm.is_empty() {
                continue;
            }
            for norm in &candidate_norms {
                if norm == bone_norm
                    || norm.ends_with(bone_norm.as_str())
                    || bone_norm.ends_with(norm.as_str())
                    || norm.contains(bone_norm.as_str())
                    || bone_norm.contains(norm.as_str())
                {
                    return Some(bone.as_str());
                }
            }
        }
        None
    }
}

/// Lowercase, alphanumeric-only form used by the fuzzy pass.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Known third-party rig prefix on mixamo-authored clips.
const MIXAMO_PREFIX: &str = "mixamorig";

/// Progressively stripped candidate spellings for a raw node name, most
/// specific first, deduplicated.
fn candidate_names(raw_node: &str) -> Vec<String> {
    let pipe_stripped = raw_node
        .rsplit('|')
        .next()
        .unwrap_or(raw_node)
        .to_string();
    let colon_stripped = pipe_stripped
        .rsplit(':')
        .next()
        .unwrap_or(&pipe_stripped)
        .to_string();
    let numeric_stripped = colon_stripped
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .to_string();
    let no_mixamo = numeric_stripped
        .strip_prefix(MIXAMO_PREFIX)
        .unwrap_or(&numeric_stripped)
        .to_string();
    let re_mixamo = format!("{}{}", MIXAMO_PREFIX, no_mixamo);

    let mut candidates = Vec::with_capacity(6);
    for candidate in [
        raw_node.to_string(),
        pipe_stripped,
        colon_stripped,
        numeric_stripped,
        no_mixamo,
        re_mixamo,
    ] {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Whether a resolved bone is a root/hip/pelvis whose translation would
/// slide or stretch the retargeted body.
fn is_root_bone(bone: &str) -> bool {
    let lower = bone.to_lowercase();
    lower.contains("hip") || lower.contains("root") || lower.contains("pelv")
}

/// Derive a clip playable on the target skeleton.
///
/// Tracks with no resolvable bone are dropped; matched tracks are renamed
/// to the target's spelling; scale tracks and root translation tracks are
/// stripped. A clip reduced to zero tracks is rejected and must not be
/// registered.
pub fn retarget_clip(
    clip: &AnimationClip,
    index: &BoneNameIndex,
) -> AvatarResult<AnimationClip> {
    let mut matched: Vec<Track> = Vec::with_capacity(clip.tracks.len());
    for track in &clip.tracks {
        match index.resolve(&track.bone) {
            Some(bone) => {
                let mut retargeted = track.clone();
                retargeted.bone = bone.to_string();
                matched.push(retargeted);
            }
            None => {
                debug!(
                    "Retarget: no bone for track \"{}\" in clip \"{}\"",
                    track.name(),
                    clip.name
                );
            }
        }
    }

    if matched.is_empty() {
        warn!("Retarget: no matching tracks for clip \"{}\"", clip.name);
        return Err(AvatarError::EmptyClip(clip.name.clone()));
    }

    let matched_count = matched.len();
    let kept: Vec<Track> = matched
        .into_iter()
        .filter(|track| match track.property {
            // Scale tracks morph the body on a differently-proportioned rig.
            TrackProperty::Scale => false,
            // Root motion slides or stretches the target.
            TrackProperty::Position => !is_root_bone(&track.bone),
            _ => true,
        })
        .collect();

    if kept.is_empty() {
        warn!(
            "Retarget: clip \"{}\" reduced to zero tracks after filtering",
            clip.name
        );
        return Err(AvatarError::EmptyClip(clip.name.clone()));
    }

    info!(
        "Retarget: clip \"{}\" kept {}/{} matched tracks",
        clip.name,
        kept.len(),
        matched_count
    );
    Ok(AnimationClip::new(clip.name.clone(), kept))
}
