use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::brain::{Emotion, HostState, MoodModifier};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(default)]
        nonce: Option<String>,
    },
    UserChat {
        text: String,
    },
    /// The renderer reports what the avatar is doing.
    HostState {
        state: HostState,
    },
    ForceEmotion {
        emotion: Emotion,
        #[serde(default = "ClientMessage::default_trigger")]
        trigger: String,
    },
    ManualSelfTalk,
    DebugState,
    SetMoodModifier {
        name: MoodModifier,
        value: f32,
    },
}

impl ClientMessage {
    fn default_trigger() -> String {
        "manual".into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechSource {
    UserReply,
    SelfTalk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    Hello {
        version: String,
        capabilities: Vec<String>,
    },
    Speak {
        text: String,
        emotion: Emotion,
        intensity: f32,
        source: SpeechSource,
        /// What prompted self-talk; absent for replies.
        #[serde(default)]
        trigger: Option<String>,
        audio_base64: Option<String>,
    },
    Emotion {
        emotion: Emotion,
        intensity: f32,
        trigger: String,
        /// Expression channel weights for the avatar face.
        #[serde(default)]
        expressions: BTreeMap<String, f32>,
    },
    DebugState {
        state: Value,
    },
    Log {
        level: String,
        message: String,
        timestamp: i64,
    },
}
