//! Per-frame blending of visemes and emotion into morph influences.
//!
//! The rig's morph dictionary is flattened once into an arena: a
//! name→index table plus a flat influence array the renderer reads
//! directly. Per frame, every target eases toward a value chosen by
//! channel — viseme-owned names follow the synthesizer while talking (and
//! rest at zero otherwise), everything else follows the active emotion
//! profile.

use crate::emotion::{self, EmotionProfile};
use crate::viseme::{viseme_slot, VisemeFrame, JAW_OPEN};
use std::collections::HashMap;
use tracing::warn;

/// Arena of morph-target influences for one avatar instance.
///
/// Built once per loaded rig; per-frame access is index-based.
pub struct MorphTargetMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
    influences: Vec<f32>,
}

impl MorphTargetMap {
    /// Build from the rig's morph-target dictionary.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let influences = vec![0.0; names.len()];
        Self {
            names,
            index,
            influences,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Current influence values, index-aligned with the rig's morph array.
    pub fn influences(&self) -> &[f32] {
        &self.influences
    }

    /// Influence by name; None for unknown targets.
    pub fn influence(&self, name: &str) -> Option<f32> {
        self.index_of(name).map(|i| self.influences[i])
    }
}

/// Blend configuration
#[derive(Debug, Clone)]
pub struct BlendConfig {
    /// Exponential approach rate toward per-frame targets (default: 5.0).
    pub lerp_speed: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self { lerp_speed: 5.0 }
    }
}

/// How one morph target sources its per-frame value.
#[derive(Debug, Clone, Copy)]
enum TargetChannel {
    /// Owned by the viseme synthesizer: slot in the viseme frame.
    Viseme(usize),
    /// Owned by the viseme synthesizer: jaw openness.
    Jaw,
    /// Driven by the active emotion profile.
    Emotion,
}

/// Eases every morph influence toward its blended target each frame.
pub struct ExpressionBlender {
    config: BlendConfig,
    /// Per-arena-index channel assignment, resolved once.
    channels: Vec<TargetChannel>,
    /// Per-arena-index targets of the active emotion, rebuilt on change.
    emotion_targets: Vec<f32>,
    emotion: &'static EmotionProfile,
}

impl ExpressionBlender {
    /// Resolve channels for the given arena. Starts on `neutral`.
    pub fn new(map: &MorphTargetMap, config: BlendConfig) -> Self {
        let channels = (0..map.len())
            .map(|i| {
                let name = map.name(i);
                if name == JAW_OPEN {
                    TargetChannel::Jaw
                } else if let Some(slot) = viseme_slot(name) {
                    TargetChannel::Viseme(slot)
                } else {
                    TargetChannel::Emotion
                }
            })
            .collect();

        let neutral = emotion::profile("neutral").expect("neutral profile exists");
        let mut blender = Self {
            config,
            channels,
            emotion_targets: vec![0.0; map.len()],
            emotion: neutral,
        };
        blender.rebuild_emotion_targets(map);
        blender
    }

    /// Switch the active emotion. Unrecognized names are logged and
    /// ignored; the previous emotion stays active.
    pub fn set_emotion(&mut self, map: &MorphTargetMap, name: &str) -> bool {
        match emotion::profile(name) {
            Some(profile) => {
                self.emotion = profile;
                self.rebuild_emotion_targets(map);
                true
            }
            None => {
                warn!("Blender: unknown emotion \"{}\"", name);
                false
            }
        }
    }

    /// Name of the active emotion.
    pub fn current_emotion(&self) -> &'static str {
        self.emotion.name
    }

    fn rebuild_emotion_targets(&mut self, map: &MorphTargetMap) {
        for (i, target) in self.emotion_targets.iter_mut().enumerate() {
            *target = match self.channels[i] {
                TargetChannel::Emotion => self.emotion.target(map.name(i)),
                // Viseme-owned names (jaw included) never take emotion
                // values; outside speech they rest at zero.
                TargetChannel::Jaw | TargetChannel::Viseme(_) => 0.0,
            };
        }
    }

    /// Advance all influences by one frame.
    ///
    /// The step factor is clamped to 1 so a long frame lands exactly on
    /// the target instead of overshooting.
    pub fn update(
        &self,
        map: &mut MorphTargetMap,
        frame: &VisemeFrame,
        talking: bool,
        dt: f32,
    ) {
        let step = (self.config.lerp_speed * dt).min(1.0);
        for (i, influence) in map.influences.iter_mut().enumerate() {
            let target = match self.channels[i] {
                TargetChannel::Viseme(slot) => {
                    if talking {
                        frame.weights[slot]
                    } else {
                        0.0
                    }
                }
                TargetChannel::Jaw => {
                    if talking {
                        frame.jaw_open
                    } else {
                        0.0
                    }
                }
                TargetChannel::Emotion => self.emotion_targets[i],
            };
            *influence += (target - *influence) * step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viseme::VisemeSynth;

    fn rig() -> MorphTargetMap {
        MorphTargetMap::new([
            "viseme_aa",
            "viseme_sil",
            "jawOpen",
            "mouthSmileLeft",
            "browInnerUp",
            "somethingCustom",
        ])
    }

    #[test]
    fn arena_indexing_round_trips() {
        let map = rig();
        assert_eq!(map.len(), 6);
        let idx = map.index_of("mouthSmileLeft").unwrap();
        assert_eq!(map.name(idx), "mouthSmileLeft");
        assert!(map.index_of("nonexistent").is_none());
    }

    #[test]
    fn emotion_drives_non_viseme_targets() {
        let mut map = rig();
        let mut blender = ExpressionBlender::new(&map, BlendConfig::default());
        assert!(blender.set_emotion(&map, "happy"));

        // Big dt clamps the step to 1: influences land on targets.
        blender.update(&mut map, &VisemeFrame::IDLE, false, 10.0);
        assert_eq!(map.influence("mouthSmileLeft"), Some(0.8));
        assert_eq!(map.influence("browInnerUp"), Some(0.15));
        assert_eq!(map.influence("somethingCustom"), Some(0.0));
    }

    #[test]
    fn viseme_targets_rest_at_zero_when_silent() {
        let mut map = rig();
        let mut blender = ExpressionBlender::new(&map, BlendConfig::default());
        blender.set_emotion(&map, "happy");

        let mut frame = VisemeFrame::IDLE;
        frame.weights[0] = 0.9; // viseme_aa
        frame.jaw_open = 0.3;

        // Talking: the synthesizer owns visemes and jaw.
        blender.update(&mut map, &frame, true, 10.0);
        assert_eq!(map.influence("viseme_aa"), Some(0.9));
        assert_eq!(map.influence("jawOpen"), Some(0.3));

        // Not talking: they return to zero even with a stale frame.
        blender.update(&mut map, &frame, false, 10.0);
        assert_eq!(map.influence("viseme_aa"), Some(0.0));
        assert_eq!(map.influence("jawOpen"), Some(0.0));
    }

    #[test]
    fn jaw_is_viseme_owned_even_for_posed_emotions() {
        let mut map = rig();
        let mut blender = ExpressionBlender::new(&map, BlendConfig::default());
        // Surprised poses jawOpen, but the jaw belongs to the viseme set:
        // silent means closed.
        blender.set_emotion(&map, "surprised");

        blender.update(&mut map, &VisemeFrame::IDLE, false, 10.0);
        assert_eq!(map.influence("jawOpen"), Some(0.0));
        assert_eq!(map.influence("browInnerUp"), Some(0.9));

        let mut frame = VisemeFrame::IDLE;
        frame.jaw_open = 0.1;
        blender.update(&mut map, &frame, true, 10.0);
        assert_eq!(map.influence("jawOpen"), Some(0.1));
    }

    #[test]
    fn unknown_emotion_keeps_previous() {
        let map = rig();
        let mut blender = ExpressionBlender::new(&map, BlendConfig::default());
        blender.set_emotion(&map, "sad");
        assert!(!blender.set_emotion(&map, "melancholic"));
        assert_eq!(blender.current_emotion(), "sad");
    }

    #[test]
    fn easing_approaches_without_overshoot() {
        let mut map = rig();
        let mut blender = ExpressionBlender::new(&map, BlendConfig { lerp_speed: 5.0 });
        blender.set_emotion(&map, "happy");

        let mut last = 0.0;
        for _ in 0..120 {
            blender.update(&mut map, &VisemeFrame::IDLE, false, 1.0 / 60.0);
            let now = map.influence("mouthSmileLeft").unwrap();
            assert!(now >= last && now <= 0.8 + 1e-6);
            last = now;
        }
        // Two seconds at speed 5 is well past the settling time.
        assert!((last - 0.8).abs() < 1e-3);
    }

    #[test]
    fn blends_synthesizer_output_end_to_end() {
        let mut map = rig();
        let blender = ExpressionBlender::new(&map, BlendConfig::default());
        let mut synth = VisemeSynth::with_seed(9);
        synth.start_talking();

        for _ in 0..60 {
            let frame = synth.advance(1.0 / 60.0);
            blender.update(&mut map, &frame, synth.is_talking(), 1.0 / 60.0);
        }
        for value in map.influences() {
            assert!((0.0..=1.0).contains(value));
        }
    }
}
