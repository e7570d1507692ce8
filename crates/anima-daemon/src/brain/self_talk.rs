//! Autonomous self-talk scheduling.
//!
//! While active, a polling task asks the will system whether the character
//! wants to speak and, if so, generates a thought and hands it to the host.
//! User activity always wins: nothing is delivered while the host is busy or
//! shortly after a user message, and at most one generation runs at a time.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use rand::{Rng, rngs::StdRng};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{
    context::SharedContext,
    emotion::{Emotion, EmotionEngine},
    thought::{ContextKind, Thought, ThoughtGenerator},
    will::WillSystem,
};
use crate::config::SelfTalkConfig;

pub type SelfTalkCallback = Arc<dyn Fn(&Thought, &str) + Send + Sync>;

/// What a single poll or manual trigger ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum SelfTalkOutcome {
    Spoke(Thought),
    Inactive,
    HostBusy,
    UserPriority,
    InFlight,
    Quiet,
    /// Generation finished after the manager was stopped or the user took
    /// over; the thought was dropped.
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfTalkState {
    pub active: bool,
    pub adaptive_interval_ms: u64,
    pub in_flight: bool,
}

struct Schedule {
    active: bool,
    interval: Duration,
    poll_task: Option<JoinHandle<()>>,
    one_shots: Vec<JoinHandle<()>>,
}

/// Clears the in-flight flag when the generation ends, including when the
/// task running it is aborted.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SelfTalkManager {
    config: SelfTalkConfig,
    emotion: Arc<Mutex<EmotionEngine>>,
    will: Arc<Mutex<WillSystem>>,
    thoughts: Arc<ThoughtGenerator>,
    context: SharedContext,
    on_self_talk: RwLock<Option<SelfTalkCallback>>,
    rng: Mutex<StdRng>,
    schedule: Mutex<Schedule>,
    /// Bumped on every start and stop; results from an older epoch are stale.
    epoch: AtomicU64,
    in_flight: AtomicBool,
}

impl SelfTalkManager {
    pub fn new(
        config: SelfTalkConfig,
        emotion: Arc<Mutex<EmotionEngine>>,
        will: Arc<Mutex<WillSystem>>,
        thoughts: Arc<ThoughtGenerator>,
        context: SharedContext,
        rng: StdRng,
    ) -> Self {
        let interval = config.base_interval();
        Self {
            config,
            emotion,
            will,
            thoughts,
            context,
            on_self_talk: RwLock::new(None),
            rng: Mutex::new(rng),
            schedule: Mutex::new(Schedule {
                active: false,
                interval,
                poll_task: None,
                one_shots: Vec::new(),
            }),
            epoch: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn set_callback(&self, callback: Option<SelfTalkCallback>) {
        *self.on_self_talk.write() = callback;
    }

    pub fn is_active(&self) -> bool {
        self.schedule.lock().active
    }

    pub fn interval(&self) -> Duration {
        self.schedule.lock().interval
    }

    pub fn state(&self) -> SelfTalkState {
        let schedule = self.schedule.lock();
        SelfTalkState {
            active: schedule.active,
            adaptive_interval_ms: schedule.interval.as_millis() as u64,
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// inactive -> active. Starts the polling task; no-op when already active.
    pub fn start(self: &Arc<Self>) {
        let mut schedule = self.schedule.lock();
        if schedule.active {
            return;
        }
        schedule.active = true;
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        let manager = Arc::downgrade(self);
        schedule.poll_task = Some(tokio::spawn(poll_loop(manager, epoch)));
        info!(interval = ?schedule.interval, "Self-talk activated");
    }

    /// active -> inactive. Cancels the polling task and any pending one-shot
    /// triggers; a generation still in flight is discarded when it resolves.
    pub fn stop(&self) {
        let mut schedule = self.schedule.lock();
        if !schedule.active {
            return;
        }
        schedule.active = false;
        self.epoch.fetch_add(1, Ordering::AcqRel);

        if let Some(task) = schedule.poll_task.take() {
            task.abort();
        }
        for task in schedule.one_shots.drain(..) {
            task.abort();
        }
        info!("Self-talk deactivated");
    }

    /// One scheduled poll: consult the will system and speak if it says so.
    pub async fn poll(&self) -> SelfTalkOutcome {
        self.run_cycle("will_based", true).await
    }

    /// Host-forced self-talk. Skips the will check but not the busy,
    /// user-priority and in-flight guards.
    pub async fn trigger_self_talk(&self, trigger: &str) -> SelfTalkOutcome {
        info!(trigger, "Self-talk triggered");
        self.run_cycle(trigger, false).await
    }

    /// Emotion changes occasionally prompt a delayed remark about the new mood.
    pub fn on_emotion_change(self: &Arc<Self>, emotion: Emotion) {
        let mut schedule = self.schedule.lock();
        if !schedule.active {
            return;
        }

        let delay = {
            let mut rng = self.rng.lock();
            if !rng.gen_bool(self.config.emotion_trigger_chance.clamp(0.0, 1.0)) {
                return;
            }
            let [low, high] = self.config.emotion_trigger_delay_ms;
            Duration::from_millis(rng.gen_range(low.min(high)..=high.max(low)))
        };

        let epoch = self.epoch.load(Ordering::Acquire);
        let manager = Arc::downgrade(self);
        let trigger = format!("emotion_change_{emotion}");
        debug!(?delay, trigger, "Scheduling emotion-driven self-talk");

        schedule.one_shots.retain(|task| !task.is_finished());
        schedule.one_shots.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if manager.epoch.load(Ordering::Acquire) == epoch {
                manager.trigger_self_talk(&trigger).await;
            }
        }));
    }

    async fn run_cycle(&self, trigger: &str, consult_will: bool) -> SelfTalkOutcome {
        let epoch = self.epoch.load(Ordering::Acquire);
        if !self.is_active() {
            return SelfTalkOutcome::Inactive;
        }
        if let Some(blocked) = self.blocked() {
            return blocked;
        }
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("Skipping self-talk, a generation is already in flight");
            return SelfTalkOutcome::InFlight;
        };

        if consult_will {
            let snapshot = self.emotion.lock().current();
            let wants_to_speak = self.will.lock().should_speak(&snapshot, &self.context);
            if !wants_to_speak {
                return SelfTalkOutcome::Quiet;
            }
            info!("Will decided to speak");
        }

        let thought = self.thoughts.generate_spontaneous_thought().await;

        if self.epoch.load(Ordering::Acquire) != epoch || !self.is_active() {
            debug!("Discarding thought generated before stop");
            return SelfTalkOutcome::Discarded;
        }
        if self.blocked().is_some() {
            debug!("Discarding thought, the user took over meanwhile");
            return SelfTalkOutcome::Discarded;
        }

        self.deliver(&thought, trigger);
        if consult_will {
            self.adapt_interval();
        }
        SelfTalkOutcome::Spoke(thought)
    }

    fn blocked(&self) -> Option<SelfTalkOutcome> {
        let host = self.context.host_state();
        if host.is_busy() {
            debug!(%host, "Skipping self-talk, character is busy");
            return Some(SelfTalkOutcome::HostBusy);
        }
        if self.context.since_user_interaction() < self.config.user_priority_window() {
            debug!("Skipping self-talk, user spoke recently");
            return Some(SelfTalkOutcome::UserPriority);
        }
        None
    }

    fn deliver(&self, thought: &Thought, trigger: &str) {
        self.context.record_self_talk();
        self.thoughts.add_to_context(ContextKind::SelfTalk, &thought.text);

        let callback = self.on_self_talk.read().clone();
        if let Some(callback) = callback {
            callback(thought, trigger);
        }
        info!(text = %thought.text, emotion = %thought.emotion, trigger, "Self-talk delivered");
    }

    /// Poll more often while the character is eager to talk; otherwise fall
    /// back to the base interval.
    fn adapt_interval(&self) {
        let emotion = self.emotion.lock().emotion();
        let will = self.will.lock().state();

        let mut multiplier = 1.0_f64;
        if will.desire_to_speak > 0.8 {
            multiplier *= 0.5;
        }
        if matches!(emotion, Emotion::Excited | Emotion::Curious) {
            multiplier *= 0.7;
        }
        if will.context_factors.boredom > 0.6 {
            multiplier *= 0.8;
        }

        let interval = self
            .config
            .base_interval()
            .mul_f64(multiplier)
            .max(self.config.min_interval());
        self.schedule.lock().interval = interval;
        debug!(?interval, "Adapted self-talk interval");
    }
}

async fn poll_loop(manager: Weak<SelfTalkManager>, epoch: u64) {
    loop {
        let interval = match manager.upgrade() {
            Some(manager) => manager.interval(),
            None => return,
        };
        tokio::time::sleep(interval).await;

        let Some(manager) = manager.upgrade() else {
            return;
        };
        if manager.epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        let outcome = manager.poll().await;
        debug!(?outcome, "Self-talk poll finished");
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{
        brain::context::HostState,
        character::PersonalityProfile,
        config::{ThoughtConfig, WillConfig},
        llm::ScriptedLlm,
    };

    struct Rig {
        manager: Arc<SelfTalkManager>,
        context: SharedContext,
        llm: Arc<ScriptedLlm>,
        spoken: Arc<Mutex<Vec<(String, String)>>>,
    }

    fn rig(llm: ScriptedLlm, emotion: Emotion, intensity: f32, config: SelfTalkConfig) -> Rig {
        let llm = Arc::new(llm);
        let engine = Arc::new(Mutex::new(EmotionEngine::new(
            emotion,
            intensity,
            StdRng::seed_from_u64(3),
        )));
        let will = Arc::new(Mutex::new(WillSystem::new(
            WillConfig::default(),
            PersonalityProfile::default(),
        )));
        let thoughts = Arc::new(ThoughtGenerator::new(
            engine.clone(),
            llm.clone(),
            "test-model",
            PersonalityProfile::default(),
            ThoughtConfig::default(),
        ));
        let context = SharedContext::new();
        context.set_host_state(HostState::Idle);
        let manager = Arc::new(SelfTalkManager::new(
            config,
            engine,
            will,
            thoughts,
            context.clone(),
            StdRng::seed_from_u64(5),
        ));

        let spoken = Arc::new(Mutex::new(Vec::new()));
        let sink = spoken.clone();
        manager.set_callback(Some(Arc::new(move |thought: &Thought, trigger: &str| {
            sink.lock().push((thought.text.clone(), trigger.to_string()));
        })));

        Rig {
            manager,
            context,
            llm,
            spoken,
        }
    }

    fn thought_json(text: &str) -> String {
        format!(r#"{{"thought": "{text}"}}"#)
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_manager_never_speaks() {
        let rig = rig(ScriptedLlm::new(), Emotion::Happy, 1.0, SelfTalkConfig::default());
        assert_eq!(rig.manager.poll().await, SelfTalkOutcome::Inactive);
        assert_eq!(
            rig.manager.trigger_self_talk("manual").await,
            SelfTalkOutcome::Inactive
        );
        assert!(rig.spoken.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn eager_character_speaks_and_polls_faster() {
        let rig = rig(
            ScriptedLlm::new().reply(thought_json("Selam!")),
            Emotion::Excited,
            1.0,
            SelfTalkConfig::default(),
        );
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;

        let outcome = rig.manager.poll().await;
        assert!(matches!(outcome, SelfTalkOutcome::Spoke(_)));
        assert_eq!(
            rig.spoken.lock().as_slice(),
            &[("Selam!".to_string(), "will_based".to_string())]
        );
        assert_eq!(rig.context.since_self_talk(), Duration::ZERO);
        // desire > 0.8 and excited: 8s * 0.5 * 0.7
        assert_eq!(rig.manager.interval(), Duration::from_millis(2800));
        rig.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn busy_host_blocks_every_path() {
        let rig = rig(
            ScriptedLlm::new().reply(thought_json("x")),
            Emotion::Excited,
            1.0,
            SelfTalkConfig::default(),
        );
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;

        for state in [HostState::Speaking, HostState::Thinking] {
            rig.context.set_host_state(state);
            assert_eq!(rig.manager.poll().await, SelfTalkOutcome::HostBusy);
            assert_eq!(
                rig.manager.trigger_self_talk("manual").await,
                SelfTalkOutcome::HostBusy
            );
        }
        assert!(rig.spoken.lock().is_empty());
        assert_eq!(rig.llm.call_count(), 0);
        rig.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn user_keeps_priority_for_five_seconds() {
        let rig = rig(
            ScriptedLlm::new().reply(thought_json("x")),
            Emotion::Excited,
            1.0,
            SelfTalkConfig::default(),
        );
        rig.manager.start();
        rig.context.record_user_interaction();

        tokio::time::advance(Duration::from_millis(4_900)).await;
        assert_eq!(
            rig.manager.trigger_self_talk("manual").await,
            SelfTalkOutcome::UserPriority
        );

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(matches!(
            rig.manager.trigger_self_talk("manual").await,
            SelfTalkOutcome::Spoke(_)
        ));
        assert_eq!(rig.spoken.lock()[0].1, "manual");
        rig.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn shy_character_stays_quiet() {
        let rig = rig(ScriptedLlm::new(), Emotion::Shy, 0.1, SelfTalkConfig::default());
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(rig.manager.poll().await, SelfTalkOutcome::Quiet);
        assert_eq!(rig.llm.call_count(), 0);
        assert_eq!(rig.manager.interval(), Duration::from_secs(8));
        rig.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_generation_in_flight() {
        let rig = rig(
            ScriptedLlm::held().reply(thought_json("ilk")),
            Emotion::Excited,
            1.0,
            SelfTalkConfig::default(),
        );
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;

        let first = tokio::spawn({
            let manager = rig.manager.clone();
            async move { manager.trigger_self_talk("manual").await }
        });
        while rig.llm.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            rig.manager.trigger_self_talk("manual").await,
            SelfTalkOutcome::InFlight
        );
        assert!(rig.manager.state().in_flight);

        rig.llm.release(1);
        assert!(matches!(first.await.unwrap(), SelfTalkOutcome::Spoke(_)));
        assert!(!rig.manager.state().in_flight);
        rig.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn result_resolving_after_stop_is_discarded() {
        let rig = rig(
            ScriptedLlm::held().reply(thought_json("geç")),
            Emotion::Excited,
            1.0,
            SelfTalkConfig::default(),
        );
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;

        let pending = tokio::spawn({
            let manager = rig.manager.clone();
            async move { manager.trigger_self_talk("manual").await }
        });
        while rig.llm.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        rig.manager.stop();
        rig.llm.release(1);
        assert_eq!(pending.await.unwrap(), SelfTalkOutcome::Discarded);
        assert!(rig.spoken.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_task_speaks_on_its_own() {
        let rig = rig(
            ScriptedLlm::new().reply(thought_json("kendi kendime")),
            Emotion::Excited,
            1.0,
            SelfTalkConfig::default(),
        );
        rig.manager.start();

        tokio::time::sleep(Duration::from_millis(8_100)).await;
        assert_eq!(rig.spoken.lock().len(), 1);

        rig.manager.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rig.spoken.lock().len(), 1);
        assert_eq!(rig.llm.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn emotion_change_can_schedule_a_remark() {
        let config = SelfTalkConfig {
            emotion_trigger_chance: 1.0,
            emotion_trigger_delay_ms: [2_000, 2_000],
            base_interval_ms: 600_000,
            ..SelfTalkConfig::default()
        };
        let rig = rig(
            ScriptedLlm::new().reply(thought_json("Oh!")),
            Emotion::Happy,
            0.5,
            config,
        );
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;

        rig.manager.on_emotion_change(Emotion::Curious);
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let spoken = rig.spoken.lock().clone();
        assert_eq!(spoken, vec![("Oh!".to_string(), "emotion_change_curious".to_string())]);
        rig.manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_emotion_remark() {
        let config = SelfTalkConfig {
            emotion_trigger_chance: 1.0,
            base_interval_ms: 600_000,
            ..SelfTalkConfig::default()
        };
        let rig = rig(
            ScriptedLlm::new().reply(thought_json("x")),
            Emotion::Happy,
            0.5,
            config,
        );
        rig.manager.start();
        tokio::time::advance(Duration::from_secs(6)).await;

        rig.manager.on_emotion_change(Emotion::Excited);
        rig.manager.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rig.spoken.lock().is_empty());
        assert_eq!(rig.llm.call_count(), 0);
    }
}
