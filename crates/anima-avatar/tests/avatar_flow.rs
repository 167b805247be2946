//! Integration tests: the full face pipeline and the clip pipeline, wired
//! the way a rendering host would drive them.

use anima_avatar::{
    AnimationClip, BlendConfig, BoneNameIndex, ClipPlayer, ExpressionBlender, MorphTargetMap,
    PlayOptions, Track, TrackProperty, VisemeSynth, VISEME_MORPHS,
};

/// A Ready-Player-Me-style morph dictionary: all visemes, the jaw, and a
/// few ARKit expression shapes.
fn rpm_morphs() -> Vec<String> {
    let mut names: Vec<String> = VISEME_MORPHS.iter().map(|s| s.to_string()).collect();
    names.extend(
        [
            "jawOpen",
            "mouthSmileLeft",
            "mouthSmileRight",
            "browInnerUp",
            "eyeWideLeft",
            "eyeWideRight",
            "noseSneerLeft",
        ]
        .map(String::from),
    );
    names
}

#[test]
fn talking_face_with_emotion_underneath() {
    let mut map = MorphTargetMap::new(rpm_morphs());
    let mut blender = ExpressionBlender::new(&map, BlendConfig::default());
    let mut synth = VisemeSynth::with_seed(21);

    blender.set_emotion(&map, "happy");
    synth.start_talking();

    let dt = 1.0 / 60.0;
    let mut peak_jaw: f32 = 0.0;
    for _ in 0..240 {
        let frame = synth.advance(dt);
        blender.update(&mut map, &frame, synth.is_talking(), dt);
        peak_jaw = peak_jaw.max(map.influence("jawOpen").unwrap());
    }

    // Emotion shapes hold while the mouth is busy talking.
    assert!(map.influence("mouthSmileLeft").unwrap() > 0.7);
    // The mouth actually moved at some point in four seconds of speech.
    assert!(peak_jaw > 0.01, "jaw never opened: {}", peak_jaw);

    // Speech ends: the mouth settles closed, the smile stays.
    synth.stop_talking();
    for _ in 0..240 {
        let frame = synth.advance(dt);
        blender.update(&mut map, &frame, synth.is_talking(), dt);
    }
    assert!(map.influence("jawOpen").unwrap() < 1e-3);
    for v in VISEME_MORPHS {
        assert!(map.influence(v).unwrap() < 1e-3, "{} still open", v);
    }
    assert!(map.influence("mouthSmileLeft").unwrap() > 0.7);
}

#[test]
fn emotion_switch_eases_between_profiles() {
    let mut map = MorphTargetMap::new(rpm_morphs());
    let mut blender = ExpressionBlender::new(&map, BlendConfig::default());
    let idle = anima_avatar::VisemeFrame::IDLE;

    blender.set_emotion(&map, "surprised");
    blender.update(&mut map, &idle, false, 10.0);
    assert_eq!(map.influence("eyeWideLeft"), Some(0.85));

    blender.set_emotion(&map, "neutral");
    blender.update(&mut map, &idle, false, 0.02);
    let partway = map.influence("eyeWideLeft").unwrap();
    assert!(partway > 0.0 && partway < 0.85);

    blender.update(&mut map, &idle, false, 10.0);
    assert_eq!(map.influence("eyeWideLeft"), Some(0.0));
}

fn mixamo_clip(name: &str) -> AnimationClip {
    let quat = |bone: &str| Track {
        bone: bone.to_string(),
        property: TrackProperty::Quaternion,
        times: vec![0.0, 0.5, 1.0],
        values: vec![0.0; 12],
        value_size: 4,
    };
    let pos = |bone: &str| Track {
        bone: bone.to_string(),
        property: TrackProperty::Position,
        times: vec![0.0, 1.0],
        values: vec![0.0; 6],
        value_size: 3,
    };
    AnimationClip::new(
        name,
        vec![
            pos("mixamorig:Hips"),
            quat("mixamorig:Hips"),
            quat("mixamorig:Spine"),
            quat("mixamorig:LeftArm"),
            Track {
                bone: "mixamorig:Spine".to_string(),
                property: TrackProperty::Scale,
                times: vec![0.0, 1.0],
                values: vec![1.0; 6],
                value_size: 3,
            },
        ],
    )
}

#[test]
fn retargeted_clip_plays_with_crossfade() {
    let index = BoneNameIndex::new(["Hips", "Spine", "LeftArm", "RightArm"]);
    let mut player = ClipPlayer::new();

    player
        .register_retargeted(&mixamo_clip("idle"), &index)
        .unwrap();
    player
        .register_retargeted(&mixamo_clip("wave"), &index)
        .unwrap();

    // Root position and scale are gone; rotation tracks remain, renamed.
    player.play("idle", PlayOptions { fade_in: 0.0, ..Default::default() }).unwrap();
    let samples = player.update(0.1);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].clip, "idle");
    assert_eq!(samples[0].weight, 1.0);

    player.play("wave", PlayOptions::default()).unwrap();
    let samples = player.update(0.2);
    assert_eq!(samples.len(), 2);
    let total: f32 = samples.iter().map(|s| s.weight).sum();
    assert!((total - 1.0).abs() < 1e-4);

    let samples = player.update(1.0);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].clip, "wave");
}

#[test]
fn retargeted_tracks_match_the_skeleton_spelling() {
    let index = BoneNameIndex::new(["Hips", "Spine", "LeftArm", "RightArm"]);
    let retargeted = anima_avatar::retarget_clip(&mixamo_clip("walk"), &index).unwrap();

    let names: Vec<String> = retargeted.tracks.iter().map(Track::name).collect();
    assert!(names.contains(&"Hips.quaternion".to_string()));
    assert!(names.contains(&"Spine.quaternion".to_string()));
    assert!(names.contains(&"LeftArm.quaternion".to_string()));
    assert!(!names.iter().any(|n| n.ends_with(".position")));
    assert!(!names.iter().any(|n| n.ends_with(".scale")));
}
