use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

use anima_daemon::brain::{Emotion, EmotionEngine, MoodModifier};

#[derive(Debug, Clone, Copy)]
enum Op {
    Decay(f32),
    Transition(Emotion),
    Random,
    Mood(MoodModifier, f32),
    React(&'static str),
}

const MESSAGES: [&str; 6] = [
    "Bu çok güzel, teşekkürler!",
    "Berbat bir gün",
    "Bu ne?",
    "hahaha çok komik",
    "tamam",
    "",
];

fn emotion() -> impl Strategy<Value = Emotion> {
    prop::sample::select(Emotion::ALL.to_vec())
}

fn mood_value() -> impl Strategy<Value = f32> {
    prop_oneof![
        0.0f32..4.0,
        Just(0.0f32),
        1e20f32..f32::MAX,
        Just(f32::INFINITY),
        Just(f32::NEG_INFINITY),
        Just(f32::NAN),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0.0f32..30.0).prop_map(Op::Decay),
        emotion().prop_map(Op::Transition),
        Just(Op::Random),
        (
            prop::sample::select(vec![
                MoodModifier::UserInteraction,
                MoodModifier::TimeOfDay,
                MoodModifier::ConversationLength,
            ]),
            mood_value(),
        )
            .prop_map(|(modifier, value)| Op::Mood(modifier, value)),
        prop::sample::select(MESSAGES.to_vec()).prop_map(Op::React),
    ]
}

proptest! {
    #[test]
    fn intensity_stays_in_bounds(
        start in emotion(),
        intensity in -1.0f32..2.0,
        seed in any::<u64>(),
        ops in prop::collection::vec(op(), 0..64),
    ) {
        let mut engine = EmotionEngine::new(start, intensity, StdRng::seed_from_u64(seed));
        prop_assert!((0.1..=1.0).contains(&engine.intensity()));

        for op in ops {
            match op {
                Op::Decay(secs) => engine.update_intensity(secs),
                Op::Transition(target) => {
                    engine.transition_to_emotion(target, "prop");
                }
                Op::Random => {
                    engine.trigger_random_transition();
                }
                Op::Mood(modifier, value) => engine.set_mood_modifier(modifier, value),
                Op::React(message) => {
                    engine.react_to_user_input(message);
                }
            }
            let intensity = engine.intensity();
            prop_assert!((0.1..=1.0).contains(&intensity), "intensity {intensity} after {op:?}");
        }
    }

    #[test]
    fn transitions_follow_the_table(
        from in emotion(),
        to in emotion(),
        intensity in 0.1f32..1.0,
    ) {
        let mut engine = EmotionEngine::new(from, intensity, StdRng::seed_from_u64(0));
        let before = engine.current();

        let moved = engine.transition_to_emotion(to, "prop");
        prop_assert_eq!(moved, from.can_transition_to(to));
        if moved {
            prop_assert_eq!(engine.emotion(), to);
            prop_assert_eq!(engine.intensity(), to.definition().base_intensity);
            prop_assert_eq!(engine.drain_transitions().len(), 1);
        } else {
            prop_assert_eq!(engine.emotion(), before.emotion);
            prop_assert_eq!(engine.intensity(), before.intensity);
            prop_assert!(engine.drain_transitions().is_empty());
        }
    }
}
