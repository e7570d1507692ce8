//! The will system decides whether the character wants to speak unprompted.

use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::{
    context::SharedContext,
    emotion::{Emotion, EmotionSnapshot},
};
use crate::{character::PersonalityProfile, config::WillConfig};

/// How talkative each emotion makes the character, before intensity.
pub fn emotion_speaking_multiplier(emotion: Emotion) -> f32 {
    match emotion {
        Emotion::Happy => 0.8,
        Emotion::Excited => 0.9,
        Emotion::Curious => 0.7,
        Emotion::Mischievous => 0.6,
        Emotion::Bored => 0.5,
        Emotion::Angry => 0.4,
        Emotion::Sad => 0.2,
        Emotion::Shy => 0.1,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ContextFactors {
    pub loneliness: f32,
    pub excitement: f32,
    pub curiosity: f32,
    pub boredom: f32,
    pub social_need: f32,
}

impl ContextFactors {
    const COUNT: f32 = 5.0;
}

#[derive(Debug, Clone, Serialize)]
pub struct WillDecision {
    pub speak: bool,
    pub desire: f32,
    pub emotion: EmotionSnapshot,
    pub factors: ContextFactors,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WillState {
    pub desire_to_speak: f32,
    pub context_factors: ContextFactors,
    pub last_decision: Option<WillDecision>,
    pub threshold: f32,
}

pub struct WillSystem {
    config: WillConfig,
    personality: PersonalityProfile,
    desire: f32,
    factors: ContextFactors,
    last_decision_at: Instant,
    history: VecDeque<WillDecision>,
}

impl WillSystem {
    pub fn new(config: WillConfig, personality: PersonalityProfile) -> Self {
        Self {
            config,
            personality,
            desire: 0.0,
            factors: ContextFactors::default(),
            last_decision_at: Instant::now(),
            history: VecDeque::new(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.config.speaking_threshold
    }

    /// Recompute the desire to speak and compare it against the threshold.
    /// Every call is logged in the bounded decision history.
    pub fn should_speak(&mut self, emotion: &EmotionSnapshot, context: &SharedContext) -> bool {
        let desire = self.evaluate(
            emotion,
            context.since_user_interaction(),
            context.since_self_talk(),
        );
        let speak = desire >= self.config.speaking_threshold;

        self.history.push_back(WillDecision {
            speak,
            desire,
            emotion: *emotion,
            factors: self.factors,
            timestamp: Utc::now(),
        });
        while self.history.len() > self.config.decision_history {
            self.history.pop_front();
        }
        self.last_decision_at = Instant::now();

        debug!(
            speak,
            desire,
            threshold = self.config.speaking_threshold,
            "Will decision"
        );
        speak
    }

    /// Desire to speak for the given emotion and idle durations, clamped to
    /// `[0, 1]`. Updates the context factors but not the decision log.
    pub fn evaluate(
        &mut self,
        emotion: &EmotionSnapshot,
        since_user: Duration,
        since_self_talk: Duration,
    ) -> f32 {
        self.factors = self.context_factors(emotion, since_user, since_self_talk);

        let emotion_share =
            emotion_speaking_multiplier(emotion.emotion) * emotion.intensity;
        let since_decision = self.last_decision_at.elapsed().as_secs_f32();
        let time_factor = (since_decision / self.config.time_factor_horizon_secs)
            .min(self.config.time_factor_cap);

        let desire = self.config.base_desire
            + self.config.emotion_influence * emotion_share
            + self.config.context_influence * self.weighted_context()
            + self.config.personality_influence * self.personality.speaking_bias()
            + time_factor;

        self.desire = desire.clamp(0.0, 1.0);
        self.desire
    }

    fn context_factors(
        &self,
        emotion: &EmotionSnapshot,
        since_user: Duration,
        since_self_talk: Duration,
    ) -> ContextFactors {
        let mirror = |target: Emotion| {
            if emotion.emotion == target {
                emotion.intensity
            } else {
                0.0
            }
        };
        ContextFactors {
            loneliness: (since_user.as_secs_f32() / self.config.loneliness_horizon_secs).min(1.0),
            excitement: mirror(Emotion::Excited),
            curiosity: mirror(Emotion::Curious),
            boredom: (since_self_talk.as_secs_f32() / self.config.boredom_horizon_secs).min(1.0),
            social_need: self.personality.friendliness,
        }
    }

    fn weighted_context(&self) -> f32 {
        let w = &self.config.factor_weights;
        let f = &self.factors;
        (f.loneliness * w.loneliness
            + f.excitement * w.excitement
            + f.curiosity * w.curiosity
            + f.boredom * w.boredom
            + f.social_need * w.social_need)
            / ContextFactors::COUNT
    }

    pub fn state(&self) -> WillState {
        WillState {
            desire_to_speak: self.desire,
            context_factors: self.factors,
            last_decision: self.history.back().cloned(),
            threshold: self.config.speaking_threshold,
        }
    }

    pub fn decision_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(emotion: Emotion, intensity: f32) -> EmotionSnapshot {
        EmotionSnapshot {
            emotion,
            intensity,
            timestamp: Utc::now(),
        }
    }

    fn will() -> WillSystem {
        WillSystem::new(WillConfig::default(), PersonalityProfile::default())
    }

    #[tokio::test(start_paused = true)]
    async fn happy_at_full_intensity_wants_to_speak() {
        let mut will = will();
        let desire = will.evaluate(&snapshot(Emotion::Happy, 1.0), Duration::ZERO, Duration::ZERO);
        // 0.1 + 0.6 * 0.8 + 0.5 * (0.8 * 0.5 / 5) + 0.4 * 0.7
        assert!((desire - 0.90).abs() < 1e-4, "desire was {desire}");
        assert!(desire >= will.threshold());
    }

    #[tokio::test(start_paused = true)]
    async fn same_inputs_same_decision() {
        let context = SharedContext::new();
        let emotion = snapshot(Emotion::Happy, 1.0);

        let first = will().should_speak(&emotion, &context);
        let second = will().should_speak(&emotion, &context);
        assert_eq!(first, second);
        assert!(first);
    }

    #[tokio::test(start_paused = true)]
    async fn shy_and_faint_stays_quiet() {
        let context = SharedContext::new();
        let mut will = will();
        assert!(!will.should_speak(&snapshot(Emotion::Shy, 0.1), &context));
        assert_eq!(will.decision_count(), 1);
        let state = will.state();
        assert!(!state.last_decision.unwrap().speak);
        assert_eq!(state.threshold, 0.75);
    }

    #[tokio::test(start_paused = true)]
    async fn long_silence_builds_boredom_and_loneliness() {
        let context = SharedContext::new();
        let mut will = will();
        let bored = snapshot(Emotion::Bored, 0.4);

        let baseline = will.evaluate(&bored, Duration::ZERO, Duration::ZERO);

        tokio::time::advance(Duration::from_secs(70)).await;
        will.should_speak(&bored, &context);

        let state = will.state();
        assert!((state.context_factors.boredom - 1.0).abs() < 1e-6);
        assert!((state.context_factors.loneliness - 0.5833).abs() < 1e-3);
        assert!(state.desire_to_speak > baseline);
    }

    #[tokio::test(start_paused = true)]
    async fn time_factor_is_capped() {
        let mut will = will();
        let quiet = snapshot(Emotion::Sad, 0.1);
        let fresh = will.evaluate(&quiet, Duration::ZERO, Duration::ZERO);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let stale = will.evaluate(&quiet, Duration::ZERO, Duration::ZERO);
        assert!((stale - fresh - 0.1).abs() < 1e-4);
    }

    #[tokio::test(start_paused = true)]
    async fn excitement_mirrors_active_emotion_only() {
        let mut will = will();
        will.evaluate(&snapshot(Emotion::Excited, 0.8), Duration::ZERO, Duration::ZERO);
        assert_eq!(will.state().context_factors.excitement, 0.8);
        assert_eq!(will.state().context_factors.curiosity, 0.0);

        will.evaluate(&snapshot(Emotion::Curious, 0.6), Duration::ZERO, Duration::ZERO);
        assert_eq!(will.state().context_factors.excitement, 0.0);
        assert_eq!(will.state().context_factors.curiosity, 0.6);
    }

    #[tokio::test(start_paused = true)]
    async fn decision_history_is_bounded() {
        let context = SharedContext::new();
        let config = WillConfig {
            decision_history: 3,
            ..WillConfig::default()
        };
        let mut will = WillSystem::new(config, PersonalityProfile::default());
        for _ in 0..10 {
            will.should_speak(&snapshot(Emotion::Happy, 0.5), &context);
        }
        assert_eq!(will.decision_count(), 3);
    }
}
