//! Thought generation: emotion-conditioned prompts for the external text
//! generator, parsing of its replies, and the short rolling memories that
//! feed back into later prompts.

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::emotion::{Emotion, EmotionEngine, EmotionSnapshot};
use crate::{
    character::PersonalityProfile,
    config::ThoughtConfig,
    error::{BrainError, BrainResult},
    llm::{SharedLlm, strip_code_fences},
};

const SELF_TALK_CONTEXT: &str = "spontaneous_self_talk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    DynamicEmotion,
    Fallback,
}

/// A spontaneous utterance, handed to the host to be spoken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thought {
    pub text: String,
    pub emotion: Emotion,
    pub intensity: f32,
    #[serde(rename = "type")]
    pub kind: ThoughtKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Thought {
    pub fn fallback(emotion: Emotion, intensity: f32) -> Self {
        Self {
            text: fallback_line(emotion).to_string(),
            emotion,
            intensity,
            kind: ThoughtKind::Fallback,
            timestamp: Utc::now(),
            context: None,
        }
    }
}

fn fallback_line(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Happy => "Keyfim yerinde! Güzel bir gün bugün.",
        Emotion::Sad => "Biraz keyifsizim... Geçer umarım.",
        Emotion::Angry => "Sinirlerim gergin şu an. Neyse...",
        Emotion::Curious => "Merak ediyorum... Ne olacak acaba?",
        Emotion::Bored => "Sıkıldım ya... Ne yapsam?",
        Emotion::Excited => "Çok heyecanlıyım! Bu harika!",
        Emotion::Shy => "Biraz utangacım şu an...",
        Emotion::Mischievous => "Hehe... Yaramazlık yapasım var!",
    }
}

/// Structured self-talk reply expected from the generator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThoughtReply {
    pub thought: String,
    #[serde(default = "ThoughtReply::default_mood_shift")]
    pub mood_shift: String,
    #[serde(default)]
    pub next_likely_emotion: Option<String>,
}

impl ThoughtReply {
    fn default_mood_shift() -> String {
        "none".into()
    }
}

/// Parse a self-talk reply. Text that is not JSON is salvaged: its first
/// `salvage_chars` characters become the thought and the emotion is reported
/// unchanged.
pub fn parse_thought_reply(
    raw: &str,
    current: Emotion,
    salvage_chars: usize,
) -> BrainResult<ThoughtReply> {
    let cleaned = strip_code_fences(raw);
    let reply = match serde_json::from_str::<ThoughtReply>(&cleaned) {
        Ok(reply) => reply,
        Err(err) => {
            debug!(%err, "Salvaging unparseable thought reply");
            ThoughtReply {
                thought: cleaned.chars().take(salvage_chars).collect(),
                mood_shift: ThoughtReply::default_mood_shift(),
                next_likely_emotion: Some(current.to_string()),
            }
        }
    };

    if reply.thought.trim().is_empty() {
        return Err(BrainError::MalformedResponse("empty thought".into()));
    }
    Ok(reply)
}

/// Answer to a host-submitted user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Emotion the answer claims, when it names one we know.
    pub emotion: Option<Emotion>,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    cevap: String,
    #[serde(default)]
    duygu: Option<String>,
}

/// Parse `{"cevap": ..., "duygu": ...}`. Anything else is taken verbatim as
/// the reply text with no emotion claim.
pub fn parse_reply(raw: &str) -> Reply {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<RawReply>(&cleaned) {
        Ok(reply) => Reply {
            text: reply.cevap.trim().to_string(),
            emotion: reply.duygu.and_then(|name| name.parse().ok()),
        },
        Err(_) => Reply {
            text: cleaned,
            emotion: None,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    UserMessage,
    AssistantReply,
    SelfTalk,
}

impl ContextKind {
    fn label(self) -> &'static str {
        match self {
            ContextKind::UserMessage => "user_message",
            ContextKind::AssistantReply => "assistant_reply",
            ContextKind::SelfTalk => "self_talk",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub kind: ContextKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmotionMemoryEntry {
    pub emotion: Emotion,
    pub intensity: f32,
    pub thought: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct ThoughtMemory {
    context: VecDeque<ContextEntry>,
    emotions: VecDeque<EmotionMemoryEntry>,
}

pub struct ThoughtGenerator {
    emotion: Arc<Mutex<EmotionEngine>>,
    llm: SharedLlm,
    model: String,
    personality: PersonalityProfile,
    config: ThoughtConfig,
    memory: Mutex<ThoughtMemory>,
}

impl ThoughtGenerator {
    pub fn new(
        emotion: Arc<Mutex<EmotionEngine>>,
        llm: SharedLlm,
        model: impl Into<String>,
        personality: PersonalityProfile,
        config: ThoughtConfig,
    ) -> Self {
        Self {
            emotion,
            llm,
            model: model.into(),
            personality,
            config,
            memory: Mutex::new(ThoughtMemory::default()),
        }
    }

    /// Always yields a thought: any failure of the generator call or of its
    /// reply degrades to the canned line for the current emotion.
    pub async fn generate_spontaneous_thought(&self) -> Thought {
        let snapshot = self.emotion.lock().current();
        debug!(
            emotion = %snapshot.emotion,
            intensity = snapshot.intensity,
            "Generating spontaneous thought"
        );

        match self.generate_dynamic(&snapshot, SELF_TALK_CONTEXT).await {
            Ok(thought) => thought,
            Err(err) => {
                warn!(%err, emotion = %snapshot.emotion, "Dynamic thought failed, using fallback");
                Thought::fallback(snapshot.emotion, snapshot.intensity)
            }
        }
    }

    async fn generate_dynamic(
        &self,
        snapshot: &EmotionSnapshot,
        context: &str,
    ) -> BrainResult<Thought> {
        let prompt = self.build_emotion_prompt(snapshot, context);
        let raw = self.llm.complete_text(&self.model, &prompt).await?;
        let reply = parse_thought_reply(&raw, snapshot.emotion, self.config.salvage_chars)?;

        self.remember_emotion(snapshot, &reply.thought);

        Ok(Thought {
            text: reply.thought,
            emotion: snapshot.emotion,
            intensity: snapshot.intensity,
            kind: ThoughtKind::DynamicEmotion,
            timestamp: Utc::now(),
            context: Some(context.to_string()),
        })
    }

    /// React emotionally to the message, then build the reply prompt for the
    /// host to submit. Does not call the generator.
    pub fn generate_response_to_user(&self, message: &str) -> String {
        let snapshot = {
            let mut engine = self.emotion.lock();
            engine.react_to_user_input(message);
            engine.current()
        };
        let prompt = self.build_reply_prompt(message, &snapshot);
        self.add_to_context(ContextKind::UserMessage, message);
        prompt
    }

    pub fn build_emotion_prompt(&self, snapshot: &EmotionSnapshot, context: &str) -> String {
        let situation = if context.is_empty() || context == SELF_TALK_CONTEXT {
            "Sessizlik içinde düşünüyor"
        } else {
            context
        };

        format!(
            "Sen gerçek bir anime kızı karakterisin ve şu an {mood} hissediyorsun ({level} yoğunlukta).\n\n\
            KİŞİLİĞİN:\n{personality}\n\n\
            SON DUYGUSAL GEÇMİŞİN: {history}\n\
            SON KONUŞMA: {recent}\n\
            MEVCUT DURUM: {situation}\n\n\
            GÖREV: Bu duygu durumunda kendi kendine söyleyeceğin spontan, doğal bir düşünce üret.\n\n\
            KURALLAR:\n\
            - Hazır şablon kullanma, özgün ol\n\
            - Bu duyguya uygun doğal bir iç ses olsun\n\
            - Argo kullanabilirsin ama abartma\n\
            - 10-50 kelime arası olsun\n\n\
            JSON formatında cevap ver: {{\"thought\": \"...\", \"mood_shift\": \"none/slight/strong\", \"next_likely_emotion\": \"...\"}}",
            mood = mood_description(snapshot.emotion),
            level = intensity_label(snapshot.intensity),
            personality = self.personality.describe(),
            history = self.emotional_history(),
            recent = self.recent_context_line(),
            situation = situation,
        )
    }

    fn build_reply_prompt(&self, message: &str, snapshot: &EmotionSnapshot) -> String {
        format!(
            "Sen çok doğal, samimi ve gerçek bir anime kızısın. Şu anki ruh halin: {emotion} (yoğunluk: {intensity:.1}).\n\n\
            {tone}\n\n\
            {register}\n\n\
            Önceki konuşma: {recent}\n\n\
            Kullanıcının mesajı: \"{message}\"\n\n\
            Karakterin kişiliği:\n\
            - Spontan ve doğal konuşur\n\
            - Duygularını açık şekilde ifade eder\n\
            - Samimi ve arkadaş canlısı\n\
            - Bazen yaramaz, bazen utangaç olabilir\n\n\
            En az 3 kelimeden oluşan, karaktere uygun, doğal bir cevap ver. JSON formatında: {{\"cevap\": \"...\", \"duygu\": \"{emotion}\"}}",
            emotion = snapshot.emotion,
            intensity = snapshot.intensity,
            tone = tone_instruction(snapshot.emotion, snapshot.intensity),
            register = self.personality.register_hint(),
            recent = self.recent_context_line(),
            message = message,
        )
    }

    pub fn add_to_context(&self, kind: ContextKind, content: &str) {
        let mut memory = self.memory.lock();
        memory.context.push_back(ContextEntry {
            kind,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        while memory.context.len() > self.config.context_memory {
            memory.context.pop_front();
        }
    }

    /// The newest context entries, most recent first.
    pub fn recent_context(&self) -> Vec<ContextEntry> {
        self.memory
            .lock()
            .context
            .iter()
            .rev()
            .take(self.config.context_window)
            .cloned()
            .collect()
    }

    fn recent_context_line(&self) -> String {
        let recent = self.recent_context();
        if recent.is_empty() {
            return "(henüz konuşma yok)".into();
        }
        recent
            .iter()
            .map(|entry| format!("{}: {}", entry.kind.label(), entry.content))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn remember_emotion(&self, snapshot: &EmotionSnapshot, thought: &str) {
        let mut memory = self.memory.lock();
        memory.emotions.push_back(EmotionMemoryEntry {
            emotion: snapshot.emotion,
            intensity: snapshot.intensity,
            thought: thought.to_string(),
            timestamp: Utc::now(),
        });
        while memory.emotions.len() > self.config.emotion_memory {
            memory.emotions.pop_front();
        }
    }

    fn emotional_history(&self) -> String {
        let memory = self.memory.lock();
        let skip = memory.emotions.len().saturating_sub(3);
        let trail = memory
            .emotions
            .iter()
            .skip(skip)
            .map(|entry| format!("{}({:.1})", entry.emotion, entry.intensity))
            .collect::<Vec<_>>();
        if trail.is_empty() {
            "ilk duygu".into()
        } else {
            trail.join(" → ")
        }
    }

    pub fn context_len(&self) -> usize {
        self.memory.lock().context.len()
    }

    pub fn emotion_memory_len(&self) -> usize {
        self.memory.lock().emotions.len()
    }
}

fn mood_description(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Happy => "çok mutlu ve enerjik",
        Emotion::Sad => "melankolik ve düşünceli",
        Emotion::Angry => "sinirli ve gergin",
        Emotion::Curious => "meraklı ve ilgili",
        Emotion::Bored => "sıkılmış ve isteksiz",
        Emotion::Excited => "heyecanlı ve coşkulu",
        Emotion::Shy => "utangaç ve çekingen",
        Emotion::Mischievous => "yaramaz ve şeytanca",
    }
}

fn intensity_label(intensity: f32) -> &'static str {
    if intensity > 0.7 {
        "çok yoğun"
    } else if intensity > 0.4 {
        "orta seviye"
    } else {
        "hafif"
    }
}

fn tone_instruction(emotion: Emotion, intensity: f32) -> String {
    let strong = intensity > 0.7;
    let pick = |high: &'static str, low: &'static str| if strong { high } else { low };
    match emotion {
        Emotion::Happy => format!(
            "Mutlu ve keyiflisin. {} bir ruh halinde cevap ver.",
            pick("Enerji dolu ve coşkulu", "Sakin ama mutlu")
        ),
        Emotion::Sad => format!(
            "Biraz keyifsiz ve melankoliksin. {} ama konuşmaya açık.",
            pick("Oldukça üzgün", "Hafif karamsar")
        ),
        Emotion::Angry => format!(
            "Sinirli ve rahatsızsın. {} ama agresif olmadan cevap ver.",
            pick("Oldukça kızgın", "Biraz gergin")
        ),
        Emotion::Curious => format!(
            "Meraklısın ve ilgiyle dinliyorsun. {} bir tavırda ol.",
            pick("Çok heyecanlı ve soru soran", "İlgili ve dikkatli")
        ),
        Emotion::Bored => format!(
            "Sıkılmış durumdasın. {} ama samimi kal.",
            pick("Çok sıkıldığını belli et", "Hafif ilgisiz")
        ),
        Emotion::Excited => format!(
            "Heyecanlı ve enerjiksin! {} konuş.",
            pick("Çok coşkulu ve ünlemli", "Neşeli ve dinamik")
        ),
        Emotion::Shy => format!(
            "Utangaç ve çekingensin. {} ama sevimli bir şekilde cevap ver.",
            pick("Çok mahcup", "Biraz çekingen")
        ),
        Emotion::Mischievous => format!(
            "Yaramaz ve şeytansın! {} davran.",
            pick("Çok muzip", "Hafif şeytanca")
        ),
    }
}
