//! Emotion state machine.
//!
//! The character is always in exactly one [`Emotion`] with an intensity in
//! `[INTENSITY_FLOOR, 1.0]`. Intensity fades every tick at the emotion's decay
//! rate; moving to another emotion is gated by the current emotion's allowed
//! transitions, which gives the mood some inertia.

use std::{collections::VecDeque, fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, Utc};
use rand::{Rng, rngs::StdRng, seq::SliceRandom};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BrainError, BrainResult};

/// The character never becomes emotionally flat.
pub const INTENSITY_FLOOR: f32 = 0.1;
pub const INTENSITY_CEILING: f32 = 1.0;

const HISTORY_LIMIT: usize = 50;
/// Upper bound for a single mood modifier.
pub const MOOD_MODIFIER_MAX: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Curious,
    Bored,
    Excited,
    Shy,
    Mischievous,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Curious,
        Emotion::Bored,
        Emotion::Excited,
        Emotion::Shy,
        Emotion::Mischievous,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Curious => "curious",
            Emotion::Bored => "bored",
            Emotion::Excited => "excited",
            Emotion::Shy => "shy",
            Emotion::Mischievous => "mischievous",
        }
    }

    pub fn definition(self) -> &'static EmotionDefinition {
        match self {
            Emotion::Happy => &HAPPY,
            Emotion::Sad => &SAD,
            Emotion::Angry => &ANGRY,
            Emotion::Curious => &CURIOUS,
            Emotion::Bored => &BORED,
            Emotion::Excited => &EXCITED,
            Emotion::Shy => &SHY,
            Emotion::Mischievous => &MISCHIEVOUS,
        }
    }

    pub fn can_transition_to(self, target: Emotion) -> bool {
        self.definition().transitions.contains(&target)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|emotion| emotion.as_str() == needle)
            .ok_or_else(|| BrainError::UnknownEmotion(s.to_string()))
    }
}

/// Static per-emotion behavior.
#[derive(Debug)]
pub struct EmotionDefinition {
    /// Intensity the emotion starts at when entered.
    pub base_intensity: f32,
    /// Intensity lost per second.
    pub decay: f32,
    pub transitions: &'static [Emotion],
    pub triggers: &'static [&'static str],
    pub inhibitors: &'static [&'static str],
}

static HAPPY: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.5,
    decay: 0.02,
    transitions: &[Emotion::Excited, Emotion::Curious, Emotion::Mischievous],
    triggers: &["compliment", "success", "music", "surprise"],
    inhibitors: &["criticism", "sadness", "boredom"],
};

static SAD: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.3,
    decay: 0.015,
    transitions: &[Emotion::Bored, Emotion::Shy, Emotion::Angry],
    triggers: &["loss", "rejection", "loneliness", "rain"],
    inhibitors: &["joy", "excitement", "comfort"],
};

static ANGRY: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.7,
    decay: 0.03,
    transitions: &[Emotion::Sad, Emotion::Bored, Emotion::Mischievous],
    triggers: &["injustice", "interruption", "disrespect", "frustration"],
    inhibitors: &["calm", "understanding", "humor"],
};

static CURIOUS: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.6,
    decay: 0.025,
    transitions: &[Emotion::Happy, Emotion::Excited, Emotion::Mischievous],
    triggers: &["mystery", "question", "new_information", "puzzle"],
    inhibitors: &["boredom", "certainty", "distraction"],
};

static BORED: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.4,
    decay: 0.01,
    transitions: &[
        Emotion::Curious,
        Emotion::Mischievous,
        Emotion::Sad,
        Emotion::Happy,
        Emotion::Excited,
    ],
    triggers: &["repetition", "inactivity", "predictability"],
    inhibitors: &["novelty", "challenge", "interaction"],
};

static EXCITED: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.8,
    decay: 0.04,
    transitions: &[Emotion::Happy, Emotion::Curious, Emotion::Mischievous],
    triggers: &["achievement", "anticipation", "discovery", "play"],
    inhibitors: &["exhaustion", "disappointment", "calm"],
};

static SHY: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.3,
    decay: 0.02,
    transitions: &[Emotion::Happy, Emotion::Curious, Emotion::Sad],
    triggers: &["attention", "compliment", "stranger", "spotlight"],
    inhibitors: &["confidence", "familiarity", "comfort"],
};

static MISCHIEVOUS: EmotionDefinition = EmotionDefinition {
    base_intensity: 0.7,
    decay: 0.035,
    transitions: &[Emotion::Happy, Emotion::Excited, Emotion::Curious],
    triggers: &["opportunity", "boredom", "playfulness", "rebellion"],
    inhibitors: &["responsibility", "seriousness", "caution"],
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionSnapshot {
    pub emotion: Emotion,
    pub intensity: f32,
    pub timestamp: DateTime<Utc>,
}

/// One accepted transition. Appended to the history and handed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionTransition {
    pub from: Emotion,
    pub to: Emotion,
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
}

/// Environmental multipliers applied after decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodModifier {
    UserInteraction,
    TimeOfDay,
    ConversationLength,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodModifiers {
    pub user_interaction: f32,
    pub time_of_day: f32,
    pub conversation_length: f32,
}

impl Default for MoodModifiers {
    fn default() -> Self {
        Self {
            user_interaction: 1.0,
            time_of_day: 1.0,
            conversation_length: 1.0,
        }
    }
}

impl MoodModifiers {
    pub fn product(&self) -> f32 {
        let product = self.user_interaction * self.time_of_day * self.conversation_length;
        if product.is_finite() { product } else { 1.0 }
    }

    /// Non-finite values are ignored; everything else is clamped to
    /// `[0, MOOD_MODIFIER_MAX]`.
    pub fn set(&mut self, modifier: MoodModifier, value: f32) {
        if !value.is_finite() {
            warn!(?modifier, value, "Ignoring non-finite mood modifier");
            return;
        }
        let value = value.clamp(0.0, MOOD_MODIFIER_MAX);
        match modifier {
            MoodModifier::UserInteraction => self.user_interaction = value,
            MoodModifier::TimeOfDay => self.time_of_day = value,
            MoodModifier::ConversationLength => self.conversation_length = value,
        }
    }
}

pub struct EmotionEngine {
    current: Emotion,
    intensity: f32,
    last_change: DateTime<Utc>,
    history: VecDeque<EmotionTransition>,
    mood: MoodModifiers,
    rng: StdRng,
    pending: Vec<EmotionTransition>,
}

impl EmotionEngine {
    pub fn new(initial: Emotion, intensity: f32, rng: StdRng) -> Self {
        Self {
            current: initial,
            intensity: intensity.clamp(INTENSITY_FLOOR, INTENSITY_CEILING),
            last_change: Utc::now(),
            history: VecDeque::new(),
            mood: MoodModifiers::default(),
            rng,
            pending: Vec::new(),
        }
    }

    pub fn current(&self) -> EmotionSnapshot {
        EmotionSnapshot {
            emotion: self.current,
            intensity: self.intensity,
            timestamp: self.last_change,
        }
    }

    pub fn emotion(&self) -> Emotion {
        self.current
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn history(&self) -> impl Iterator<Item = &EmotionTransition> {
        self.history.iter()
    }

    pub fn mood(&self) -> &MoodModifiers {
        &self.mood
    }

    pub fn set_mood_modifier(&mut self, modifier: MoodModifier, value: f32) {
        self.mood.set(modifier, value);
    }

    /// Fade intensity by `delta_secs` worth of decay, then scale by the mood
    /// modifiers. Must run on a fixed cadence.
    pub fn update_intensity(&mut self, delta_secs: f32) {
        let decay = self.current.definition().decay;
        let faded = (self.intensity - decay * delta_secs.max(0.0)).max(INTENSITY_FLOOR);
        self.intensity = (faded * self.mood.product()).clamp(INTENSITY_FLOOR, INTENSITY_CEILING);
    }

    pub fn try_transition(&mut self, target: Emotion, trigger: &str) -> BrainResult<()> {
        let from = self.current;
        if !from.can_transition_to(target) {
            return Err(BrainError::InvalidTransition { from, to: target });
        }

        let now = Utc::now();
        let transition = EmotionTransition {
            from,
            to: target,
            trigger: trigger.to_string(),
            timestamp: now,
        };
        self.history.push_back(transition.clone());
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }

        self.current = target;
        self.intensity = target.definition().base_intensity;
        self.last_change = now;
        self.pending.push(transition);

        info!(%from, to = %target, trigger, "Emotion transition");
        Ok(())
    }

    /// Move to `target` if the current emotion allows it. A rejected move is
    /// a no-op that leaves emotion and intensity untouched.
    pub fn transition_to_emotion(&mut self, target: Emotion, trigger: &str) -> bool {
        match self.try_transition(target, trigger) {
            Ok(()) => true,
            Err(err) => {
                debug!(%err, trigger, "Emotion transition rejected");
                false
            }
        }
    }

    pub fn trigger_random_transition(&mut self) -> bool {
        let options = self.current.definition().transitions;
        match options.choose(&mut self.rng).copied() {
            Some(target) => self.transition_to_emotion(target, "random"),
            None => false,
        }
    }

    /// Keyword heuristics over a user message. Transitions only when the
    /// picked emotion differs from the current one.
    pub fn react_to_user_input(&mut self, message: &str) -> bool {
        let sentiment = analyze_message(message);
        let target = if sentiment.positive {
            Some(if self.rng.gen_bool(0.5) {
                Emotion::Happy
            } else {
                Emotion::Excited
            })
        } else if sentiment.negative {
            Some(if self.rng.gen_bool(0.5) {
                Emotion::Sad
            } else {
                Emotion::Angry
            })
        } else if sentiment.question {
            Some(Emotion::Curious)
        } else if sentiment.funny {
            Some(Emotion::Mischievous)
        } else {
            None
        };

        match target {
            Some(target) if target != self.current => {
                self.transition_to_emotion(target, "user_interaction")
            }
            _ => false,
        }
    }

    /// Accepted transitions since the last drain, oldest first.
    pub fn drain_transitions(&mut self) -> Vec<EmotionTransition> {
        std::mem::take(&mut self.pending)
    }

    /// Draw from the engine's random source.
    pub fn roll(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSentiment {
    pub positive: bool,
    pub negative: bool,
    pub question: bool,
    pub funny: bool,
}

static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(güzel|harika|mükemmel|seviyorum|teşekkür\w*|iyi)\b").expect("valid regex")
});
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(kötü|berbat|nefret|sinir\w*|üzgün|kızgın)\b").expect("valid regex")
});
static QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(nedir|nasıl|ne|kim|nere\w*|niye)\b").expect("valid regex")
});
static FUNNY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(haha\w*|lol|komik|gülüyorum)\b|😂").expect("valid regex")
});

pub fn analyze_message(message: &str) -> MessageSentiment {
    let lower = message.to_lowercase();
    MessageSentiment {
        positive: POSITIVE.is_match(&lower),
        negative: NEGATIVE.is_match(&lower),
        question: message.contains('?') || QUESTION.is_match(&lower),
        funny: FUNNY.is_match(&lower),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn engine(initial: Emotion, intensity: f32) -> EmotionEngine {
        EmotionEngine::new(initial, intensity, StdRng::seed_from_u64(7))
    }

    #[test]
    fn every_transition_target_has_a_definition() {
        for emotion in Emotion::ALL {
            let definition = emotion.definition();
            assert!(!definition.transitions.is_empty(), "{emotion} is a dead end");
            assert!(!definition.transitions.contains(&emotion));
            assert!(definition.base_intensity >= INTENSITY_FLOOR);
        }
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Curious".parse::<Emotion>().unwrap(), Emotion::Curious);
        assert_eq!(" shy ".parse::<Emotion>().unwrap(), Emotion::Shy);
        assert!(matches!(
            "melancholic".parse::<Emotion>(),
            Err(BrainError::UnknownEmotion(_))
        ));
    }

    #[test]
    fn decay_stops_at_floor() {
        let mut engine = engine(Emotion::Excited, 0.8);
        engine.update_intensity(0.1);
        assert!((engine.intensity() - 0.796).abs() < 1e-6);

        engine.update_intensity(600.0);
        assert_eq!(engine.intensity(), INTENSITY_FLOOR);
    }

    #[test]
    fn mood_modifiers_scale_but_never_escape_bounds() {
        let mut engine = engine(Emotion::Happy, 0.9);
        engine.set_mood_modifier(MoodModifier::UserInteraction, 2.0);
        engine.update_intensity(0.1);
        assert_eq!(engine.intensity(), INTENSITY_CEILING);

        engine.set_mood_modifier(MoodModifier::UserInteraction, 0.0);
        engine.update_intensity(0.1);
        assert_eq!(engine.intensity(), INTENSITY_FLOOR);
    }

    #[test]
    fn extreme_mood_modifiers_keep_intensity_finite() {
        let mut engine = engine(Emotion::Happy, 0.5);
        engine.set_mood_modifier(MoodModifier::UserInteraction, 1e30);
        engine.set_mood_modifier(MoodModifier::TimeOfDay, 1e30);
        engine.set_mood_modifier(MoodModifier::ConversationLength, 0.0);
        assert_eq!(engine.mood().user_interaction, MOOD_MODIFIER_MAX);
        engine.update_intensity(0.1);
        assert_eq!(engine.intensity(), INTENSITY_FLOOR);

        engine.set_mood_modifier(MoodModifier::ConversationLength, 1.0);
        engine.set_mood_modifier(MoodModifier::TimeOfDay, f32::INFINITY);
        engine.set_mood_modifier(MoodModifier::UserInteraction, f32::NAN);
        assert_eq!(engine.mood().time_of_day, MOOD_MODIFIER_MAX);
        assert_eq!(engine.mood().user_interaction, MOOD_MODIFIER_MAX);
        engine.update_intensity(0.1);
        assert_eq!(engine.intensity(), INTENSITY_CEILING);
    }

    #[test]
    fn allowed_transition_resets_intensity_and_records_history() {
        let mut engine = engine(Emotion::Happy, 0.2);
        assert!(engine.transition_to_emotion(Emotion::Curious, "test"));

        let snapshot = engine.current();
        assert_eq!(snapshot.emotion, Emotion::Curious);
        assert_eq!(snapshot.intensity, 0.6);

        let history: Vec<_> = engine.history().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, Emotion::Happy);
        assert_eq!(history[0].to, Emotion::Curious);
        assert_eq!(history[0].trigger, "test");

        let drained = engine.drain_transitions();
        assert_eq!(drained.len(), 1);
        assert!(engine.drain_transitions().is_empty());
    }

    #[test]
    fn rejected_transition_is_a_no_op() {
        let mut engine = engine(Emotion::Happy, 0.42);
        assert!(!engine.transition_to_emotion(Emotion::Sad, "test"));
        assert_eq!(engine.emotion(), Emotion::Happy);
        assert_eq!(engine.intensity(), 0.42);
        assert_eq!(engine.history().count(), 0);
        assert!(engine.drain_transitions().is_empty());

        assert!(matches!(
            engine.try_transition(Emotion::Sad, "test"),
            Err(BrainError::InvalidTransition {
                from: Emotion::Happy,
                to: Emotion::Sad
            })
        ));
    }

    #[test]
    fn random_transition_stays_within_allowed_set() {
        let mut engine = engine(Emotion::Shy, 0.3);
        for _ in 0..20 {
            let from = engine.emotion();
            assert!(engine.trigger_random_transition());
            assert!(from.can_transition_to(engine.emotion()));
        }
        assert_eq!(engine.history().count(), 20);
    }

    #[test]
    fn history_is_bounded() {
        let mut engine = engine(Emotion::Happy, 0.5);
        for _ in 0..(HISTORY_LIMIT + 10) {
            engine.trigger_random_transition();
        }
        assert_eq!(engine.history().count(), HISTORY_LIMIT);
    }

    #[test]
    fn sentiment_heuristics() {
        let praise = analyze_message("Bu çok güzel, teşekkürler!");
        assert!(praise.positive);
        assert!(!praise.negative);

        assert!(analyze_message("Bugün berbat bir gün").negative);
        assert!(analyze_message("Bu nedir").question);
        assert!(analyze_message("really?").question);
        assert!(analyze_message("hahaha 😂").funny);
        assert!(analyze_message("😂").funny);
        assert_eq!(analyze_message("merhaba"), MessageSentiment::default());
    }

    #[test]
    fn positive_message_lifts_boredom() {
        for seed in 0..16 {
            let mut engine = EmotionEngine::new(Emotion::Bored, 0.4, StdRng::seed_from_u64(seed));
            assert!(engine.react_to_user_input("Bu çok güzel, teşekkürler!"));
            assert!(matches!(engine.emotion(), Emotion::Happy | Emotion::Excited));
        }
    }

    #[test]
    fn question_while_curious_does_not_transition() {
        let mut engine = engine(Emotion::Curious, 0.6);
        assert!(!engine.react_to_user_input("Bu nasıl çalışıyor?"));
        assert_eq!(engine.history().count(), 0);
    }

    #[test]
    fn neutral_message_does_not_transition() {
        let mut engine = engine(Emotion::Happy, 0.5);
        assert!(!engine.react_to_user_input("merhaba"));
        assert_eq!(engine.emotion(), Emotion::Happy);
    }
}
