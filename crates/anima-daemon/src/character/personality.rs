use serde::{Deserialize, Serialize};

/// Static character traits, each in `[0, 1]`. They weight both the will
/// calculation and the wording of generated prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityProfile {
    pub talkativeness: f32,
    pub slang: f32,
    pub friendliness: f32,
    pub spontaneity: f32,
    pub intellectual: f32,
    pub emotional: f32,
    pub playfulness: f32,
}

impl Default for PersonalityProfile {
    fn default() -> Self {
        Self {
            talkativeness: 0.7,
            slang: 0.7,
            friendliness: 0.8,
            spontaneity: 0.6,
            intellectual: 0.5,
            emotional: 0.8,
            playfulness: 0.6,
        }
    }
}

impl PersonalityProfile {
    /// Personality share of the desire to speak.
    pub fn speaking_bias(&self) -> f32 {
        self.talkativeness * 0.4
            + self.spontaneity * 0.3
            + self.friendliness * 0.2
            + self.emotional * 0.1
    }

    /// Clamp every trait back into range. Config files are not trusted.
    pub fn normalized(mut self) -> Self {
        for trait_value in [
            &mut self.talkativeness,
            &mut self.slang,
            &mut self.friendliness,
            &mut self.spontaneity,
            &mut self.intellectual,
            &mut self.emotional,
            &mut self.playfulness,
        ] {
            *trait_value = trait_value.clamp(0.0, 1.0);
        }
        self
    }

    /// Register instruction derived from the slang trait.
    pub fn register_hint(&self) -> &'static str {
        if self.slang > 0.7 {
            "Argo ve günlük konuşma dilin rahat olsun. \"ya\", \"valla\", \"be\" gibi kelimeler kullanabilirsin."
        } else if self.slang > 0.4 {
            "Samimi ama kibar bir dil kullan."
        } else {
            ""
        }
    }

    /// Trait block quoted into self-talk prompts, scaled to a 0-10 rating.
    pub fn describe(&self) -> String {
        let rate = |value: f32| (value * 10.0).round() as u8;
        format!(
            "- Konuşkanlık: {}/10\n- Argo kullanım: {}/10\n- Samimilik: {}/10\n\
             - Spontanlık: {}/10\n- Duygusallık: {}/10\n- Oyunculuk: {}/10",
            rate(self.talkativeness),
            rate(self.slang),
            rate(self.friendliness),
            rate(self.spontaneity),
            rate(self.emotional),
            rate(self.playfulness),
        )
    }
}
