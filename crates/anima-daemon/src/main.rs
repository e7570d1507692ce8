use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use anima_daemon::{
    brain::{BrainSystem, Emotion, HostState, Thought, parse_reply},
    bridge::{Bridge, BridgeHandle, ClientMessage, DaemonMessage, SpeechSource},
    config::AppConfig,
    expression,
    llm::{self, LlmClient, SharedLlm},
    tts::{self, SharedSynth},
};

/// Something the avatar should say out loud.
struct Utterance {
    text: String,
    emotion: Emotion,
    intensity: f32,
    source: SpeechSource,
    trigger: Option<String>,
}

/// Everything client handlers need, cheap to clone into spawned tasks.
#[derive(Clone)]
struct Daemon {
    brain: Arc<BrainSystem>,
    llm: SharedLlm,
    model: String,
    speech: mpsc::UnboundedSender<Utterance>,
    bridge: BridgeHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    info!("Starting Anima daemon");

    let llm_client = llm::create_client(&config.llm)?;
    let synth = tts::create_synthesizer(&config.tts);
    let brain = Arc::new(BrainSystem::new(&config, llm_client.clone()));

    let mut bridge = Bridge::bind(&config.bridge).await?;
    let bridge_handle = bridge.handle();

    let (speech_tx, speech_rx) = mpsc::unbounded_channel();
    tokio::spawn(speak_loop(
        speech_rx,
        synth,
        bridge_handle.clone(),
        brain.clone(),
    ));

    let self_talk_tx = speech_tx.clone();
    let emotion_bridge = bridge_handle.clone();
    brain.set_callbacks(
        Some(Arc::new(move |thought: &Thought, trigger: &str| {
            let _ = self_talk_tx.send(Utterance {
                text: thought.text.clone(),
                emotion: thought.emotion,
                intensity: thought.intensity,
                source: SpeechSource::SelfTalk,
                trigger: Some(trigger.to_string()),
            });
        })),
        Some(Arc::new(move |emotion: Emotion, trigger: &str| {
            emotion_bridge.broadcast(emotion_message(
                emotion,
                emotion.definition().base_intensity,
                trigger,
            ));
        })),
    );
    brain.initialize();

    let daemon = Daemon {
        brain: brain.clone(),
        llm: llm_client,
        model: config.llm.model.clone(),
        speech: speech_tx,
        bridge: bridge_handle,
    };

    loop {
        tokio::select! {
            next = bridge.next_message() => {
                let Some(message) = next else {
                    info!("Bridge closed");
                    break;
                };
                if let Err(err) = handle_client_message(message, &daemon) {
                    error!(?err, "Failed to handle client event");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    brain.shutdown();
    Ok(())
}

fn handle_client_message(message: ClientMessage, daemon: &Daemon) -> Result<()> {
    match message {
        ClientMessage::Ping { nonce } => {
            daemon
                .bridge
                .log("debug", format!("pong {}", nonce.unwrap_or_default()));
        }
        ClientMessage::UserChat { text } => {
            let prompt = daemon.brain.process_user_message(&text);
            daemon.brain.begin_thinking();
            tokio::spawn(reply_to_user(daemon.clone(), prompt));
        }
        ClientMessage::HostState { state } => daemon.brain.set_host_state(state),
        ClientMessage::ForceEmotion { emotion, trigger } => {
            if !daemon.brain.force_emotion_transition(emotion, &trigger) {
                let current = daemon.brain.get_current_emotion().emotion;
                daemon
                    .bridge
                    .log("warn", format!("{current} cannot become {emotion}"));
            }
        }
        ClientMessage::ManualSelfTalk => {
            let daemon = daemon.clone();
            tokio::spawn(async move {
                let outcome = daemon.brain.trigger_manual_self_talk().await;
                info!(?outcome, "Manual self-talk finished");
            });
        }
        ClientMessage::DebugState => {
            let state = serde_json::to_value(daemon.brain.get_debug_state())?;
            daemon.bridge.broadcast(DaemonMessage::DebugState { state });
        }
        ClientMessage::SetMoodModifier { name, value } => {
            daemon.brain.set_mood_modifier(name, value);
        }
    }
    Ok(())
}

async fn reply_to_user(daemon: Daemon, prompt: String) {
    match daemon.llm.complete_text(&daemon.model, &prompt).await {
        Ok(raw) => {
            let reply = parse_reply(&raw);
            daemon.brain.record_reply(&reply);
            let snapshot = daemon.brain.get_current_emotion();
            let queued = daemon.speech.send(Utterance {
                text: reply.text,
                emotion: snapshot.emotion,
                intensity: snapshot.intensity,
                source: SpeechSource::UserReply,
                trigger: None,
            });
            // speak_loop hands the host from thinking to speaking
            if queued.is_err() {
                daemon.brain.finish_thinking(HostState::Idle);
            }
        }
        Err(err) => {
            warn!(?err, "Reply generation failed");
            daemon.bridge.log("error", format!("Reply generation failed: {err}"));
            daemon.brain.finish_thinking(HostState::Idle);
        }
    }
}

async fn speak_loop(
    mut speech: mpsc::UnboundedReceiver<Utterance>,
    synth: SharedSynth,
    bridge: BridgeHandle,
    brain: Arc<BrainSystem>,
) {
    while let Some(utterance) = speech.recv().await {
        let audio_base64 = match synth.synthesize(&utterance.text).await {
            Ok(audio) => Some(BASE64.encode(audio)),
            Err(err) => {
                warn!(?err, "Speech synthesis failed, sending text only");
                None
            }
        };
        bridge.broadcast(DaemonMessage::Speak {
            text: utterance.text,
            emotion: utterance.emotion,
            intensity: utterance.intensity,
            source: utterance.source,
            trigger: utterance.trigger,
            audio_base64,
        });
        // The renderer reports idle once playback ends
        if utterance.source == SpeechSource::UserReply {
            brain.finish_thinking(HostState::Speaking);
        }
    }
}

fn emotion_message(emotion: Emotion, intensity: f32, trigger: &str) -> DaemonMessage {
    let mut expressions: BTreeMap<String, f32> = BTreeMap::new();
    expression::apply_emotion(&mut expressions, emotion, intensity);
    DaemonMessage::Emotion {
        emotion,
        intensity,
        trigger: trigger.to_string(),
        expressions,
    }
}
