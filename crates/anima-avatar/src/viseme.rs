//! Procedural viseme synthesis.
//!
//! Approximates lip motion for whatever speech is currently playing: while
//! talking, a syllable machine rolls a new mouth shape every 80–180ms,
//! easing between the outgoing and incoming shapes with a smoothstep. Runs
//! of voiced syllables are broken by short silences so the mouth pauses the
//! way natural speech does. No phoneme alignment — the shapes are random
//! picks from a fixed catalog.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One mouth shape: viseme morph name, jaw openness, blend intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Syllable {
    pub viseme: &'static str,
    pub jaw: f32,
    pub weight: f32,
}

/// The voiced syllable catalog.
pub const SYLLABLES: [Syllable; 14] = [
    Syllable { viseme: "viseme_aa", jaw: 0.35, weight: 0.9 },
    Syllable { viseme: "viseme_E", jaw: 0.2, weight: 0.8 },
    Syllable { viseme: "viseme_I", jaw: 0.15, weight: 0.7 },
    Syllable { viseme: "viseme_O", jaw: 0.3, weight: 0.85 },
    Syllable { viseme: "viseme_U", jaw: 0.25, weight: 0.7 },
    Syllable { viseme: "viseme_CH", jaw: 0.1, weight: 0.6 },
    Syllable { viseme: "viseme_FF", jaw: 0.05, weight: 0.5 },
    Syllable { viseme: "viseme_PP", jaw: 0.02, weight: 0.7 },
    Syllable { viseme: "viseme_SS", jaw: 0.08, weight: 0.55 },
    Syllable { viseme: "viseme_TH", jaw: 0.12, weight: 0.5 },
    Syllable { viseme: "viseme_nn", jaw: 0.05, weight: 0.4 },
    Syllable { viseme: "viseme_RR", jaw: 0.18, weight: 0.6 },
    Syllable { viseme: "viseme_DD", jaw: 0.15, weight: 0.55 },
    Syllable { viseme: "viseme_kk", jaw: 0.1, weight: 0.5 },
];

/// The closed-mouth rest shape used for pauses.
pub const REST: Syllable = Syllable {
    viseme: "viseme_sil",
    jaw: 0.0,
    weight: 0.0,
};

/// Every viseme morph name, in frame-slot order.
pub const VISEME_MORPHS: [&str; 15] = [
    "viseme_aa", "viseme_E", "viseme_I", "viseme_O", "viseme_U",
    "viseme_CH", "viseme_DD", "viseme_FF", "viseme_kk", "viseme_nn",
    "viseme_PP", "viseme_RR", "viseme_SS", "viseme_TH", "viseme_sil",
];

/// The jaw morph driven alongside the visemes.
pub const JAW_OPEN: &str = "jawOpen";

/// Slot of a viseme morph name in [`VisemeFrame::weights`].
pub fn viseme_slot(name: &str) -> Option<usize> {
    VISEME_MORPHS.iter().position(|&v| v == name)
}

/// Whether the synthesizer owns this morph target while talking.
pub fn is_viseme_target(name: &str) -> bool {
    name == JAW_OPEN || viseme_slot(name).is_some()
}

/// One frame of synthesized mouth state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisemeFrame {
    /// Weight per entry of [`VISEME_MORPHS`].
    pub weights: [f32; 15],
    /// Jaw openness.
    pub jaw_open: f32,
}

impl VisemeFrame {
    /// The closed, idle mouth.
    pub const IDLE: VisemeFrame = VisemeFrame {
        weights: [0.0; 15],
        jaw_open: 0.0,
    };

    /// Weight for a viseme morph name; None if the name is not a viseme.
    pub fn weight(&self, name: &str) -> Option<f32> {
        viseme_slot(name).map(|slot| self.weights[slot])
    }
}

/// Smoothstep ease used for syllable transitions.
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Per-frame syllable machine. Advance every rendered frame; toggling
/// talking on resets the machine so speech always opens from rest.
pub struct VisemeSynth {
    talking: bool,
    current: Syllable,
    next: Syllable,
    elapsed: f32,
    syllable_duration: f32,
    /// Voiced rollovers since the last silence pick.
    run_length: u32,
    rng: StdRng,
}

impl VisemeSynth {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic synthesizer for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            talking: false,
            current: REST,
            next: REST,
            elapsed: 0.0,
            syllable_duration: 0.12,
            run_length: 0,
            rng,
        }
    }

    /// Assert talking: reset to rest and queue the first random syllable.
    pub fn start_talking(&mut self) {
        self.talking = true;
        self.elapsed = 0.0;
        self.current = REST;
        self.next = self.random_syllable();
        self.run_length = 0;
    }

    pub fn stop_talking(&mut self) {
        self.talking = false;
    }

    pub fn is_talking(&self) -> bool {
        self.talking
    }

    /// Advance by one frame and return the mouth state. While not talking
    /// every viseme and the jaw resolve to zero.
    pub fn advance(&mut self, dt: f32) -> VisemeFrame {
        if !self.talking {
            return VisemeFrame::IDLE;
        }

        self.elapsed += dt;
        if self.elapsed >= self.syllable_duration {
            self.elapsed = 0.0;
            self.current = self.next;
            self.run_length += 1;

            // Pause probability rises with the run: certain once the run
            // outlasts a threshold drawn from 3..=6.
            if self.run_length > 2 + self.rng.gen_range(0..4) {
                self.next = REST;
                self.syllable_duration = 0.06 + self.rng.gen::<f32>() * 0.08;
                self.run_length = 0;
            } else {
                self.next = self.random_syllable();
                self.syllable_duration = 0.08 + self.rng.gen::<f32>() * 0.10;
            }
        }

        let t = (self.elapsed / self.syllable_duration).min(1.0);
        let blend = smoothstep(t);

        let mut frame = VisemeFrame::IDLE;
        if let Some(slot) = viseme_slot(self.current.viseme) {
            frame.weights[slot] += self.current.weight * (1.0 - blend);
        }
        if let Some(slot) = viseme_slot(self.next.viseme) {
            frame.weights[slot] += self.next.weight * blend;
        }
        frame.jaw_open = self.current.jaw * (1.0 - blend) + self.next.jaw * blend;
        frame
    }

    fn random_syllable(&mut self) -> Syllable {
        SYLLABLES[self.rng.gen_range(0..SYLLABLES.len())]
    }
}

impl Default for VisemeSynth {
    fn default() -> Self {
        Self::new()
    }
}
