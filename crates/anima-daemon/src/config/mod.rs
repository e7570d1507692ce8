use std::{env, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{brain::Emotion, character::PersonalityProfile};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub brain: BrainConfig,
    #[serde(default)]
    pub will: WillConfig,
    #[serde(default)]
    pub self_talk: SelfTalkConfig,
    #[serde(default)]
    pub thought: ThoughtConfig,
    #[serde(default)]
    pub personality: PersonalityProfile,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var("ANIMA_CONFIG") {
            return Self::from_path(Path::new(&path));
        }

        let project_root = env::var("ANIMA_ROOT").unwrap_or_else(|_| ".".to_string());
        let default_path = Path::new(&project_root).join("config/anima.toml");
        if default_path.exists() {
            return Self::from_path(&default_path);
        }

        let example_path = Path::new(&project_root).join("config/anima.example.toml");
        if example_path.exists() {
            tracing::warn!("Using example configuration at {:?}", example_path);
            return Self::from_path(&example_path);
        }

        Ok(Self::default())
    }

    fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config: {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "BridgeConfig::default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "BridgeConfig::default_max_clients")]
    pub max_clients: usize,
}

impl BridgeConfig {
    fn default_listen_addr() -> String {
        "127.0.0.1:7777".into()
    }
    fn default_max_clients() -> usize {
        4
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            max_clients: Self::default_max_clients(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrainConfig {
    #[serde(default = "BrainConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Per-tick probability of an unprompted emotion drift.
    #[serde(default = "BrainConfig::default_random_transition_chance")]
    pub random_transition_chance: f64,
    #[serde(default = "BrainConfig::default_initial_emotion")]
    pub initial_emotion: Emotion,
    #[serde(default = "BrainConfig::default_initial_intensity")]
    pub initial_intensity: f32,
    /// Seeds every random source in the brain when set.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl BrainConfig {
    fn default_tick_interval_ms() -> u64 {
        100
    }
    fn default_random_transition_chance() -> f64 {
        0.001
    }
    fn default_initial_emotion() -> Emotion {
        Emotion::Happy
    }
    fn default_initial_intensity() -> f32 {
        0.5
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            random_transition_chance: Self::default_random_transition_chance(),
            initial_emotion: Self::default_initial_emotion(),
            initial_intensity: Self::default_initial_intensity(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WillConfig {
    #[serde(default = "WillConfig::default_base_desire")]
    pub base_desire: f32,
    #[serde(default = "WillConfig::default_emotion_influence")]
    pub emotion_influence: f32,
    #[serde(default = "WillConfig::default_context_influence")]
    pub context_influence: f32,
    #[serde(default = "WillConfig::default_personality_influence")]
    pub personality_influence: f32,
    #[serde(default = "WillConfig::default_speaking_threshold")]
    pub speaking_threshold: f32,
    #[serde(default)]
    pub factor_weights: FactorWeights,
    #[serde(default = "WillConfig::default_loneliness_horizon_secs")]
    pub loneliness_horizon_secs: f32,
    #[serde(default = "WillConfig::default_boredom_horizon_secs")]
    pub boredom_horizon_secs: f32,
    #[serde(default = "WillConfig::default_time_factor_horizon_secs")]
    pub time_factor_horizon_secs: f32,
    #[serde(default = "WillConfig::default_time_factor_cap")]
    pub time_factor_cap: f32,
    #[serde(default = "WillConfig::default_decision_history")]
    pub decision_history: usize,
}

impl WillConfig {
    fn default_base_desire() -> f32 {
        0.1
    }
    fn default_emotion_influence() -> f32 {
        0.6
    }
    fn default_context_influence() -> f32 {
        0.5
    }
    fn default_personality_influence() -> f32 {
        0.4
    }
    fn default_speaking_threshold() -> f32 {
        0.75
    }
    fn default_loneliness_horizon_secs() -> f32 {
        120.0
    }
    fn default_boredom_horizon_secs() -> f32 {
        60.0
    }
    fn default_time_factor_horizon_secs() -> f32 {
        120.0
    }
    fn default_time_factor_cap() -> f32 {
        0.1
    }
    fn default_decision_history() -> usize {
        50
    }
}

impl Default for WillConfig {
    fn default() -> Self {
        Self {
            base_desire: Self::default_base_desire(),
            emotion_influence: Self::default_emotion_influence(),
            context_influence: Self::default_context_influence(),
            personality_influence: Self::default_personality_influence(),
            speaking_threshold: Self::default_speaking_threshold(),
            factor_weights: FactorWeights::default(),
            loneliness_horizon_secs: Self::default_loneliness_horizon_secs(),
            boredom_horizon_secs: Self::default_boredom_horizon_secs(),
            time_factor_horizon_secs: Self::default_time_factor_horizon_secs(),
            time_factor_cap: Self::default_time_factor_cap(),
            decision_history: Self::default_decision_history(),
        }
    }
}

/// Weight of each context factor in the will calculation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub loneliness: f32,
    pub excitement: f32,
    pub curiosity: f32,
    pub boredom: f32,
    pub social_need: f32,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            loneliness: 0.8,
            excitement: 0.9,
            curiosity: 0.7,
            boredom: 0.6,
            social_need: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfTalkConfig {
    #[serde(default = "SelfTalkConfig::default_base_interval_ms")]
    pub base_interval_ms: u64,
    #[serde(default = "SelfTalkConfig::default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Self-talk is suppressed for this long after a user message.
    #[serde(default = "SelfTalkConfig::default_user_priority_window_ms")]
    pub user_priority_window_ms: u64,
    #[serde(default = "SelfTalkConfig::default_emotion_trigger_chance")]
    pub emotion_trigger_chance: f64,
    #[serde(default = "SelfTalkConfig::default_emotion_trigger_delay_ms")]
    pub emotion_trigger_delay_ms: [u64; 2],
}

impl SelfTalkConfig {
    fn default_base_interval_ms() -> u64 {
        8_000
    }
    fn default_min_interval_ms() -> u64 {
        1_000
    }
    fn default_user_priority_window_ms() -> u64 {
        5_000
    }
    fn default_emotion_trigger_chance() -> f64 {
        0.3
    }
    fn default_emotion_trigger_delay_ms() -> [u64; 2] {
        [2_000, 5_000]
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn user_priority_window(&self) -> Duration {
        Duration::from_millis(self.user_priority_window_ms)
    }
}

impl Default for SelfTalkConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: Self::default_base_interval_ms(),
            min_interval_ms: Self::default_min_interval_ms(),
            user_priority_window_ms: Self::default_user_priority_window_ms(),
            emotion_trigger_chance: Self::default_emotion_trigger_chance(),
            emotion_trigger_delay_ms: Self::default_emotion_trigger_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThoughtConfig {
    #[serde(default = "ThoughtConfig::default_emotion_memory")]
    pub emotion_memory: usize,
    #[serde(default = "ThoughtConfig::default_context_memory")]
    pub context_memory: usize,
    /// How many context entries are quoted back into prompts.
    #[serde(default = "ThoughtConfig::default_context_window")]
    pub context_window: usize,
    /// Characters of raw generator output kept when JSON parsing fails.
    #[serde(default = "ThoughtConfig::default_salvage_chars")]
    pub salvage_chars: usize,
}

impl ThoughtConfig {
    fn default_emotion_memory() -> usize {
        10
    }
    fn default_context_memory() -> usize {
        10
    }
    fn default_context_window() -> usize {
        3
    }
    fn default_salvage_chars() -> usize {
        100
    }
}

impl Default for ThoughtConfig {
    fn default() -> Self {
        Self {
            emotion_memory: Self::default_emotion_memory(),
            context_memory: Self::default_context_memory(),
            context_window: Self::default_context_window(),
            salvage_chars: Self::default_salvage_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::LmStudio {
                endpoint: "http://127.0.0.1:1234".into(),
            },
            model: "qwen2.5-7b-instruct".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum LlmProvider {
    #[serde(rename = "lmstudio")]
    LmStudio { endpoint: String },
    #[serde(rename = "gemini")]
    Gemini {
        /// Environment variable holding the API key
        #[serde(default = "LlmProvider::default_gemini_key_env")]
        api_key_env: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl LlmProvider {
    fn default_gemini_key_env() -> String {
        "GEMINI_API_KEY".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// `null` renders silence, `http` posts to a `/speak` server.
    #[serde(default = "TtsConfig::default_provider")]
    pub provider: String,
    #[serde(default = "TtsConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "TtsConfig::default_voice")]
    pub voice: String,
    #[serde(default = "TtsConfig::default_rate")]
    pub rate: String,
    #[serde(default = "TtsConfig::default_pitch")]
    pub pitch: String,
}

impl TtsConfig {
    fn default_provider() -> String {
        "null".into()
    }
    fn default_endpoint() -> String {
        "http://127.0.0.1:5000".into()
    }
    fn default_voice() -> String {
        "tr-TR-EmelNeural".into()
    }
    fn default_rate() -> String {
        "+0%".into()
    }
    fn default_pitch() -> String {
        "+0Hz".into()
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            endpoint: Self::default_endpoint(),
            voice: Self::default_voice(),
            rate: Self::default_rate(),
            pitch: Self::default_pitch(),
        }
    }
}
