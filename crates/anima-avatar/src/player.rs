//! Clip playback with crossfade transitions.
//!
//! Holds the registered (already retargeted) clips and manages the blend
//! between the outgoing and incoming clip when a new one is requested.
//! The renderer calls `update` once per frame and samples each returned
//! (clip, time, weight) against its skeleton.

use crate::clip::AnimationClip;
use crate::error::{AvatarError, AvatarResult};
use crate::retarget::{retarget_clip, BoneNameIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default crossfade window in seconds.
pub const DEFAULT_CROSSFADE: f32 = 0.4;

/// Options for one play request.
#[derive(Debug, Clone)]
pub struct PlayOptions {
    /// Repeat from the start when the clip ends. Non-looping clips clamp
    /// on their final frame instead of resetting.
    pub looping: bool,
    /// Fade-in window; the outgoing clip fades out over the same window.
    pub fade_in: f32,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            looping: true,
            fade_in: DEFAULT_CROSSFADE,
        }
    }
}

/// One clip's contribution this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSample {
    pub clip: String,
    /// Clip-local time in seconds.
    pub time: f32,
    /// Blend weight, 0..=1.
    pub weight: f32,
}

struct ClipInstance {
    clip: Arc<AnimationClip>,
    time: f32,
    weight: f32,
    /// Weight the fade is moving toward (1 fading in, 0 fading out).
    fade_target: f32,
    /// Weight change per second; f32::INFINITY for an instant switch.
    fade_rate: f32,
    looping: bool,
}

impl ClipInstance {
    fn advance(&mut self, dt: f32) {
        // Weight moves linearly toward the fade target.
        if self.weight < self.fade_target {
            self.weight = (self.weight + self.fade_rate * dt).min(self.fade_target);
        } else if self.weight > self.fade_target {
            self.weight = (self.weight - self.fade_rate * dt).max(self.fade_target);
        }

        self.time += dt;
        let duration = self.clip.duration();
        if duration > 0.0 {
            if self.looping {
                self.time %= duration;
            } else if self.time > duration {
                // Clamp on the final frame.
                self.time = duration;
            }
        }
    }

    fn sample(&self) -> ClipSample {
        ClipSample {
            clip: self.clip.name.clone(),
            time: self.time,
            weight: self.weight,
        }
    }
}

fn fade_rate(window: f32) -> f32 {
    if window > 0.0 {
        1.0 / window
    } else {
        f32::INFINITY
    }
}

/// Registered clips plus the currently active/fading instances.
pub struct ClipPlayer {
    clips: HashMap<String, Arc<AnimationClip>>,
    active: Option<ClipInstance>,
    fading_out: Vec<ClipInstance>,
}

impl ClipPlayer {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            active: None,
            fading_out: Vec::new(),
        }
    }

    /// Register a clip for later playback.
    pub fn register(&mut self, clip: AnimationClip) -> AvatarResult<()> {
        if self.clips.contains_key(&clip.name) {
            return Err(AvatarError::DuplicateClip(clip.name));
        }
        debug!(
            "Player: registered clip \"{}\" ({} tracks, {:.2}s)",
            clip.name,
            clip.tracks.len(),
            clip.duration()
        );
        self.clips.insert(clip.name.clone(), Arc::new(clip));
        Ok(())
    }

    /// Retarget a source clip onto the skeleton and register the result.
    /// A clip that retargets to zero tracks is reported and not registered.
    pub fn register_retargeted(
        &mut self,
        source: &AnimationClip,
        index: &BoneNameIndex,
    ) -> AvatarResult<()> {
        let retargeted = retarget_clip(source, index)?;
        self.register(retargeted)
    }

    /// Names of all registered clips.
    pub fn clip_names(&self) -> Vec<&str> {
        self.clips.keys().map(String::as_str).collect()
    }

    /// Name of the clip currently fading in or fully active.
    pub fn active_clip(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.clip.name.as_str())
    }

    /// Start a clip, crossfading from the previous one over the same
    /// window. Unknown names are reported and change nothing.
    pub fn play(&mut self, name: &str, options: PlayOptions) -> AvatarResult<()> {
        let Some(clip) = self.clips.get(name) else {
            warn!(
                "Player: clip \"{}\" not found. Available: {:?}",
                name,
                self.clip_names()
            );
            return Err(AvatarError::ClipNotFound(name.to_string()));
        };
        let clip = Arc::clone(clip);
        let rate = fade_rate(options.fade_in);

        if let Some(mut previous) = self.active.take() {
            if previous.clip.name == name {
                // Same clip requested again: restart it without fading out.
                previous.time = 0.0;
                previous.fade_target = 1.0;
                previous.fade_rate = rate;
                previous.looping = options.looping;
                self.active = Some(previous);
                return Ok(());
            }
            previous.fade_target = 0.0;
            previous.fade_rate = rate;
            self.fading_out.push(previous);
        }

        self.active = Some(ClipInstance {
            clip,
            time: 0.0,
            weight: if options.fade_in > 0.0 { 0.0 } else { 1.0 },
            fade_target: 1.0,
            fade_rate: rate,
            looping: options.looping,
        });
        Ok(())
    }

    /// Fade out and clear the active clip.
    pub fn stop(&mut self, fade_out: f32) {
        if let Some(mut active) = self.active.take() {
            active.fade_target = 0.0;
            active.fade_rate = fade_rate(fade_out);
            self.fading_out.push(active);
        }
    }

    /// Advance fades and clip times by one frame; returns the samples the
    /// renderer should apply, active clip first.
    pub fn update(&mut self, dt: f32) -> Vec<ClipSample> {
        if let Some(active) = &mut self.active {
            active.advance(dt);
        }
        for instance in &mut self.fading_out {
            instance.advance(dt);
        }
        self.fading_out.retain(|i| i.weight > 0.0);

        let mut samples = Vec::with_capacity(1 + self.fading_out.len());
        if let Some(active) = &self.active {
            samples.push(active.sample());
        }
        samples.extend(self.fading_out.iter().map(ClipInstance::sample));
        samples
    }
}

impl Default for ClipPlayer {
    fn default() -> Self {
        Self::new()
    }
}
