//! The closed catalog of emotion expressions.
//!
//! Each profile is a fixed mapping from morph-target name to influence.
//! Morph targets a profile does not mention ease back to zero, so profiles
//! only list the shapes they actively pose.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// All recognized emotion names, lowercase.
pub const EMOTIONS: [&str; 8] = [
    "neutral",
    "happy",
    "sad",
    "angry",
    "surprised",
    "disgusted",
    "fearful",
    "calm",
];

/// A named, read-only set of morph-target influences.
#[derive(Debug, Clone)]
pub struct EmotionProfile {
    pub name: &'static str,
    pub targets: &'static [(&'static str, f32)],
}

impl EmotionProfile {
    /// Influence for one morph target; unspecified targets are 0.
    pub fn target(&self, morph: &str) -> f32 {
        self.targets
            .iter()
            .find(|(name, _)| *name == morph)
            .map(|(_, value)| *value)
            .unwrap_or(0.0)
    }
}

static PROFILES: Lazy<HashMap<&'static str, EmotionProfile>> = Lazy::new(|| {
    let mut map = HashMap::new();
    let mut add = |name: &'static str, targets: &'static [(&'static str, f32)]| {
        map.insert(name, EmotionProfile { name, targets });
    };

    add("neutral", &[]);

    add(
        "happy",
        &[
            ("mouthSmileLeft", 0.8),
            ("mouthSmileRight", 0.8),
            ("cheekSquintLeft", 0.5),
            ("cheekSquintRight", 0.5),
            ("eyeSquintLeft", 0.3),
            ("eyeSquintRight", 0.3),
            ("browInnerUp", 0.15),
        ],
    );

    add(
        "sad",
        &[
            ("mouthFrownLeft", 0.7),
            ("mouthFrownRight", 0.7),
            ("browDownLeft", 0.4),
            ("browDownRight", 0.4),
            ("browInnerUp", 0.6),
            ("eyeSquintLeft", 0.2),
            ("eyeSquintRight", 0.2),
            ("mouthPucker", 0.15),
        ],
    );

    add(
        "angry",
        &[
            ("browDownLeft", 0.8),
            ("browDownRight", 0.8),
            ("eyeSquintLeft", 0.5),
            ("eyeSquintRight", 0.5),
            ("jawForward", 0.3),
            ("mouthFrownLeft", 0.5),
            ("mouthFrownRight", 0.5),
            ("noseSneerLeft", 0.6),
            ("noseSneerRight", 0.6),
        ],
    );

    add(
        "surprised",
        &[
            ("browInnerUp", 0.9),
            ("browOuterUpLeft", 0.8),
            ("browOuterUpRight", 0.8),
            ("eyeWideLeft", 0.85),
            ("eyeWideRight", 0.85),
            ("jawOpen", 0.5),
            ("mouthFunnel", 0.4),
        ],
    );

    add(
        "disgusted",
        &[
            ("noseSneerLeft", 0.8),
            ("noseSneerRight", 0.8),
            ("mouthUpperUpLeft", 0.5),
            ("mouthUpperUpRight", 0.5),
            ("browDownLeft", 0.4),
            ("browDownRight", 0.4),
            ("mouthFrownLeft", 0.3),
            ("mouthFrownRight", 0.3),
            ("cheekSquintLeft", 0.3),
            ("cheekSquintRight", 0.3),
        ],
    );

    add(
        "fearful",
        &[
            ("browInnerUp", 0.8),
            ("browOuterUpLeft", 0.5),
            ("browOuterUpRight", 0.5),
            ("eyeWideLeft", 0.7),
            ("eyeWideRight", 0.7),
            ("mouthStretchLeft", 0.4),
            ("mouthStretchRight", 0.4),
            ("jawOpen", 0.2),
        ],
    );

    add(
        "calm",
        &[
            ("mouthSmileLeft", 0.2),
            ("mouthSmileRight", 0.2),
            ("eyeBlinkLeft", 0.1),
            ("eyeBlinkRight", 0.1),
            ("browInnerUp", 0.05),
        ],
    );

    map
});

/// Look up a profile by name, case-insensitively. None for unknown names.
pub fn profile(name: &str) -> Option<&'static EmotionProfile> {
    PROFILES.get(name.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_closed_and_complete() {
        for name in EMOTIONS {
            assert!(profile(name).is_some(), "missing profile for {}", name);
        }
        assert!(profile("smug").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(profile("Happy").unwrap().name, "happy");
        assert_eq!(profile("ANGRY").unwrap().name, "angry");
    }

    #[test]
    fn neutral_poses_nothing() {
        assert!(profile("neutral").unwrap().targets.is_empty());
    }

    #[test]
    fn unspecified_targets_default_to_zero() {
        let happy = profile("happy").unwrap();
        assert_eq!(happy.target("mouthSmileLeft"), 0.8);
        assert_eq!(happy.target("jawForward"), 0.0);
    }

    #[test]
    fn influences_stay_in_range() {
        for name in EMOTIONS {
            for (morph, value) in profile(name).unwrap().targets {
                assert!(
                    (0.0..=1.0).contains(value),
                    "{}.{} out of range: {}",
                    name,
                    morph,
                    value
                );
            }
        }
    }
}
