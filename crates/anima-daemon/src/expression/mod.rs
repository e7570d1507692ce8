//! Avatar face driving: emotion blendshapes and amplitude-based lip sync.
//!
//! Everything here is pure math over an [`ExpressionSink`]; the renderer on
//! the other side of the bridge owns the actual model.

use std::collections::{BTreeMap, HashMap};

use crate::brain::Emotion;

/// Expression channels reset by [`apply_emotion`].
pub const EMOTION_CHANNELS: [&str; 5] = ["happy", "sad", "angry", "relaxed", "surprised"];
pub const MOUTH_CHANNEL: &str = "aa";

const MOUTH_MAX_OPEN: f32 = 0.4;
const MOUTH_GAIN: f32 = 0.6;
const MOUTH_SMOOTHING: f32 = 0.15;
/// Frequency bins that carry most of the voice energy.
const VOICE_BINS: std::ops::Range<usize> = 3..8;

pub trait ExpressionSink {
    fn set_expression_weight(&mut self, name: &str, value: f32);
}

impl ExpressionSink for HashMap<String, f32> {
    fn set_expression_weight(&mut self, name: &str, value: f32) {
        self.insert(name.to_string(), value);
    }
}

impl ExpressionSink for BTreeMap<String, f32> {
    fn set_expression_weight(&mut self, name: &str, value: f32) {
        self.insert(name.to_string(), value);
    }
}

pub fn emotion_channel(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Happy | Emotion::Excited | Emotion::Mischievous => "happy",
        Emotion::Sad | Emotion::Shy => "sad",
        Emotion::Angry => "angry",
        Emotion::Bored => "relaxed",
        Emotion::Curious => "surprised",
    }
}

pub fn apply_emotion(sink: &mut impl ExpressionSink, emotion: Emotion, intensity: f32) {
    for channel in EMOTION_CHANNELS {
        sink.set_expression_weight(channel, 0.0);
    }
    sink.set_expression_weight(emotion_channel(emotion), intensity.clamp(0.0, 1.0));
}

/// Opens the mouth in step with speech amplitude. The mouth snaps shut the
/// moment speech stops.
///
/// Renderer-side helper: the daemon only ships audio in `Speak` messages, so
/// this is driven by whichever renderer plays it back, once per frame.
#[derive(Debug, Default, Clone)]
pub struct MouthSync {
    value: f32,
    target: f32,
}

impl MouthSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advance one frame. `bins` is a byte frequency spectrum of the audio
    /// currently playing.
    pub fn update(&mut self, sink: &mut impl ExpressionSink, speaking: bool, bins: &[u8]) -> f32 {
        if speaking {
            self.target = Self::target_for(bins);
            self.value += (self.target - self.value) * MOUTH_SMOOTHING;
        } else {
            self.target = 0.0;
            self.value = 0.0;
        }
        sink.set_expression_weight(MOUTH_CHANNEL, self.value);
        self.value
    }

    fn target_for(bins: &[u8]) -> f32 {
        let voiced: Vec<f32> = bins
            .iter()
            .take(VOICE_BINS.end)
            .skip(VOICE_BINS.start)
            .filter(|&&bin| bin > 0)
            .map(|&bin| bin as f32)
            .collect();
        if voiced.is_empty() {
            return 0.0;
        }
        let average = voiced.iter().sum::<f32>() / voiced.len() as f32;
        (average / 128.0 * MOUTH_GAIN).min(MOUTH_MAX_OPEN)
    }
}
