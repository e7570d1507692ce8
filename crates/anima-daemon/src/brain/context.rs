use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::BrainError;

/// What the host application is doing right now. Owned by the host; the
/// brain only reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    #[default]
    Loading,
    Idle,
    Thinking,
    Speaking,
    Error,
}

impl HostState {
    /// Self-talk must never interrupt an utterance in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, HostState::Thinking | HostState::Speaking)
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostState::Loading => "loading",
            HostState::Idle => "idle",
            HostState::Thinking => "thinking",
            HostState::Speaking => "speaking",
            HostState::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for HostState {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "loading" => Ok(HostState::Loading),
            "idle" => Ok(HostState::Idle),
            "thinking" => Ok(HostState::Thinking),
            "speaking" => Ok(HostState::Speaking),
            "error" => Ok(HostState::Error),
            _ => Err(BrainError::UnknownHostState(s.to_string())),
        }
    }
}

#[derive(Debug)]
struct Timeline {
    host_state: HostState,
    last_user_interaction: Instant,
    last_self_talk: Instant,
}

/// Coordination state shared between the host and the brain components.
/// Cloning yields another handle onto the same state.
#[derive(Debug, Clone)]
pub struct SharedContext {
    inner: Arc<RwLock<Timeline>>,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedContext {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(RwLock::new(Timeline {
                host_state: HostState::default(),
                last_user_interaction: now,
                last_self_talk: now,
            })),
        }
    }

    pub fn host_state(&self) -> HostState {
        self.inner.read().host_state
    }

    pub fn set_host_state(&self, state: HostState) {
        self.inner.write().host_state = state;
    }

    /// Move to `next` only if the host is still in `expected`.
    pub fn compare_and_set_host_state(&self, expected: HostState, next: HostState) -> bool {
        let mut timeline = self.inner.write();
        if timeline.host_state != expected {
            return false;
        }
        timeline.host_state = next;
        true
    }

    /// Enter `Thinking` unless an utterance is already playing.
    pub fn begin_thinking(&self) -> bool {
        let mut timeline = self.inner.write();
        if timeline.host_state == HostState::Speaking {
            return false;
        }
        timeline.host_state = HostState::Thinking;
        true
    }

    pub fn record_user_interaction(&self) {
        self.inner.write().last_user_interaction = Instant::now();
    }

    pub fn record_self_talk(&self) {
        self.inner.write().last_self_talk = Instant::now();
    }

    pub fn since_user_interaction(&self) -> Duration {
        self.inner.read().last_user_interaction.elapsed()
    }

    pub fn since_self_talk(&self) -> Duration {
        self.inner.read().last_self_talk.elapsed()
    }
}
