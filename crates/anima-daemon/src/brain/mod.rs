pub mod context;
pub mod emotion;
pub mod self_talk;
pub mod thought;
pub mod will;

use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

pub use context::{HostState, SharedContext};
pub use emotion::{
    Emotion, EmotionEngine, EmotionSnapshot, EmotionTransition, MoodModifier, MoodModifiers,
};
pub use self_talk::{SelfTalkCallback, SelfTalkManager, SelfTalkOutcome, SelfTalkState};
pub use thought::{ContextKind, Reply, Thought, ThoughtGenerator, ThoughtKind, parse_reply};
pub use will::{WillState, WillSystem};

use crate::{config::AppConfig, llm::SharedLlm};

pub type EmotionChangeCallback = Arc<dyn Fn(Emotion, &str) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct MemorySizes {
    pub context: usize,
    pub emotion_memory: usize,
    pub emotion_history: usize,
}

/// Everything a debugging host might want to look at, in one serializable
/// snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DebugState {
    pub running: bool,
    pub host_state: HostState,
    pub emotion: EmotionSnapshot,
    pub mood: MoodModifiers,
    pub will: WillState,
    pub memory: MemorySizes,
    pub self_talk: SelfTalkState,
}

/// Hands accepted emotion transitions to the host callback and the self-talk
/// manager, once each.
struct EmotionRelay {
    engine: Arc<Mutex<EmotionEngine>>,
    self_talk: Arc<SelfTalkManager>,
    callback: RwLock<Option<EmotionChangeCallback>>,
}

impl EmotionRelay {
    fn flush(&self) {
        let transitions = self.engine.lock().drain_transitions();
        self.dispatch(transitions);
    }

    fn dispatch(&self, transitions: Vec<EmotionTransition>) {
        if transitions.is_empty() {
            return;
        }
        let callback = self.callback.read().clone();
        for transition in transitions {
            if let Some(callback) = &callback {
                callback(transition.to, &transition.trigger);
            }
            self.self_talk.on_emotion_change(transition.to);
        }
    }
}

/// The character's brain: owns the emotion engine, will system, thought
/// generator and self-talk manager, and is the only surface the host talks to.
pub struct BrainSystem {
    emotion: Arc<Mutex<EmotionEngine>>,
    will: Arc<Mutex<WillSystem>>,
    thoughts: Arc<ThoughtGenerator>,
    self_talk: Arc<SelfTalkManager>,
    context: SharedContext,
    relay: Arc<EmotionRelay>,
    tick_interval: Duration,
    random_transition_chance: f64,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl BrainSystem {
    pub fn new(config: &AppConfig, llm: SharedLlm) -> Self {
        let mut seeds = match config.brain.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let emotion = Arc::new(Mutex::new(EmotionEngine::new(
            config.brain.initial_emotion,
            config.brain.initial_intensity,
            StdRng::seed_from_u64(seeds.r#gen()),
        )));
        let personality = config.personality.clone().normalized();
        let will = Arc::new(Mutex::new(WillSystem::new(
            config.will.clone(),
            personality.clone(),
        )));
        let thoughts = Arc::new(ThoughtGenerator::new(
            emotion.clone(),
            llm,
            config.llm.model.clone(),
            personality,
            config.thought.clone(),
        ));
        let context = SharedContext::new();
        let self_talk = Arc::new(SelfTalkManager::new(
            config.self_talk.clone(),
            emotion.clone(),
            will.clone(),
            thoughts.clone(),
            context.clone(),
            StdRng::seed_from_u64(seeds.r#gen()),
        ));
        let relay = Arc::new(EmotionRelay {
            engine: emotion.clone(),
            self_talk: self_talk.clone(),
            callback: RwLock::new(None),
        });

        Self {
            emotion,
            will,
            thoughts,
            self_talk,
            context,
            relay,
            tick_interval: config.brain.tick_interval().max(Duration::from_millis(1)),
            random_transition_chance: config.brain.random_transition_chance,
            tick_task: Mutex::new(None),
        }
    }

    /// Start the decay tick and self-talk. Calling it again is a no-op.
    pub fn initialize(&self) {
        let mut tick_task = self.tick_task.lock();
        if tick_task.is_some() {
            return;
        }
        *tick_task = Some(tokio::spawn(tick_loop(
            self.relay.clone(),
            self.tick_interval,
            self.random_transition_chance,
        )));
        self.self_talk.start();
        info!(
            emotion = %self.emotion.lock().emotion(),
            tick = ?self.tick_interval,
            "Brain initialized"
        );
    }

    /// Stop the tick and self-talk. Generations still in flight resolve into
    /// nothing.
    pub fn shutdown(&self) {
        let Some(task) = self.tick_task.lock().take() else {
            return;
        };
        task.abort();
        self.self_talk.stop();
        info!("Brain shut down");
    }

    pub fn is_running(&self) -> bool {
        self.tick_task.lock().is_some()
    }

    pub fn set_callbacks(
        &self,
        on_self_talk: Option<SelfTalkCallback>,
        on_emotion_change: Option<EmotionChangeCallback>,
    ) {
        self.self_talk.set_callback(on_self_talk);
        *self.relay.callback.write() = on_emotion_change;
    }

    /// React to a user message and return the prompt the host should submit
    /// to its text generator.
    pub fn process_user_message(&self, message: &str) -> String {
        self.context.record_user_interaction();
        let prompt = self.thoughts.generate_response_to_user(message);
        self.relay.flush();
        debug!(chars = prompt.len(), "Built reply prompt");
        prompt
    }

    /// Feed the generator's answer to a user message back into memory and
    /// adopt the emotion it names when reachable.
    pub fn record_reply(&self, reply: &Reply) {
        self.thoughts.add_to_context(ContextKind::AssistantReply, &reply.text);
        if let Some(target) = reply.emotion {
            let mut engine = self.emotion.lock();
            if engine.emotion() != target {
                engine.transition_to_emotion(target, "reply");
            }
        }
        self.relay.flush();
    }

    pub fn get_current_emotion(&self) -> EmotionSnapshot {
        self.emotion.lock().current()
    }

    pub fn force_emotion_transition(&self, emotion: Emotion, trigger: &str) -> bool {
        let moved = self.emotion.lock().transition_to_emotion(emotion, trigger);
        self.relay.flush();
        moved
    }

    pub async fn trigger_manual_self_talk(&self) -> SelfTalkOutcome {
        self.self_talk.trigger_self_talk("manual").await
    }

    pub fn set_host_state(&self, state: HostState) {
        debug!(%state, "Host state changed");
        self.context.set_host_state(state);
    }

    /// Mark the host busy while a reply is generated. Returns false and
    /// leaves the state alone when an utterance is already playing.
    pub fn begin_thinking(&self) -> bool {
        self.context.begin_thinking()
    }

    /// Leave `Thinking` for `next`. A state the host reported in the
    /// meantime wins.
    pub fn finish_thinking(&self, next: HostState) -> bool {
        let moved = self
            .context
            .compare_and_set_host_state(HostState::Thinking, next);
        if moved {
            debug!(state = %next, "Host state changed");
        }
        moved
    }

    pub fn set_mood_modifier(&self, modifier: MoodModifier, value: f32) {
        self.emotion.lock().set_mood_modifier(modifier, value);
    }

    /// Handle onto the coordination state shared with the host.
    pub fn context(&self) -> SharedContext {
        self.context.clone()
    }

    pub fn get_debug_state(&self) -> DebugState {
        let (emotion, mood, emotion_history) = {
            let engine = self.emotion.lock();
            (engine.current(), engine.mood().clone(), engine.history().count())
        };
        DebugState {
            running: self.is_running(),
            host_state: self.context.host_state(),
            emotion,
            mood,
            will: self.will.lock().state(),
            memory: MemorySizes {
                context: self.thoughts.context_len(),
                emotion_memory: self.thoughts.emotion_memory_len(),
                emotion_history,
            },
            self_talk: self.self_talk.state(),
        }
    }
}

impl Drop for BrainSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn tick_loop(relay: Arc<EmotionRelay>, period: Duration, random_transition_chance: f64) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let delta = now.duration_since(last);
        last = now;

        let transitions = {
            let mut engine = relay.engine.lock();
            engine.update_intensity(delta.as_secs_f32());
            if engine.roll() < random_transition_chance {
                engine.trigger_random_transition();
            }
            engine.drain_transitions()
        };
        relay.dispatch(transitions);
    }
}
