//! Speech synthesis for directed sentences.
//!
//! Builds the style instruction string for each sentence and drives the
//! speech port. A failed synthesis drops that sentence's clip; the rest of
//! the paragraph is unaffected.

use futures_util::future::join_all;

use crate::ports::retry::call_with_retries;
use crate::ports::{SpeechPort, SpeechRequest};

use super::SentenceDirection;

const AFFECT_DIRECTIVE: &str =
    "[Affect: a gentle, curious narrator guiding a child through a friendly storybook adventure]";
const PRONUNCIATION_DIRECTIVE: &str =
    "[Pronunciation: clear, precise storytelling diction, every word easy to follow]";

/// Fixed style used for the two front-page title readings.
pub const TITLE_INSTRUCTIONS: &str = "[Affect: a bright storyteller announcing the title of \
     tonight's adventure] [Pronunciation: clear and celebratory, each word distinct] \
     [Tone: inviting] [Emotion: excited anticipation] [Pacing: measured and proud]";

/// Voices the synthesis backend accepts as session preferences.
pub const KNOWN_VOICES: [&str; 10] = [
    "alloy", "ash", "ballad", "coral", "echo", "nova", "onyx", "sage", "shimmer", "verse",
];

pub fn is_known_voice(voice: &str) -> bool {
    KNOWN_VOICES.contains(&voice)
}

/// Synthesis parameters that do not vary per sentence.
#[derive(Debug, Clone)]
pub struct SpeechStyle {
    pub model: String,
    pub format: String,
}

/// Affect, pronunciation and mood directives, concatenated in that order.
pub fn style_instructions(direction: &SentenceDirection) -> String {
    format!(
        "{} {} [Tone: {}] [Emotion: {}] [Pacing: {}]",
        AFFECT_DIRECTIVE,
        PRONUNCIATION_DIRECTIVE,
        direction.tone,
        direction.emotion,
        direction.pacing
    )
}

/// Voice one region's sentences concurrently. Clip order matches sentence
/// order; failed sentences are skipped.
pub async fn synthesize_sentences(
    speech: &dyn SpeechPort,
    style: &SpeechStyle,
    voice: &str,
    directions: &[SentenceDirection],
) -> Vec<Vec<u8>> {
    let futures = directions.iter().map(|direction| async move {
        let request = SpeechRequest {
            model: style.model.clone(),
            voice: voice.to_string(),
            text: direction.translation.clone(),
            instructions: style_instructions(direction),
            format: style.format.clone(),
        };
        call_with_retries("sentence synthesis", || {
            speech.synthesize(request.clone())
        })
        .await
        .ok()
    });
    join_all(futures).await.into_iter().flatten().collect()
}

/// Voice a front-page title once per voice, in the given voice order.
pub async fn synthesize_title(
    speech: &dyn SpeechPort,
    style: &SpeechStyle,
    voices: &[String],
    title: &str,
) -> Vec<Vec<u8>> {
    let futures = voices.iter().map(|voice| async move {
        let request = SpeechRequest {
            model: style.model.clone(),
            voice: voice.clone(),
            text: title.to_string(),
            instructions: TITLE_INSTRUCTIONS.to_string(),
            format: style.format.clone(),
        };
        call_with_retries("title synthesis", || speech.synthesize(request.clone()))
            .await
            .ok()
    });
    join_all(futures).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortFuture;
    use anyhow::anyhow;

    fn direction(translation: &str) -> SentenceDirection {
        SentenceDirection {
            source: "source".to_string(),
            translation: translation.to_string(),
            tone: "warm".to_string(),
            emotion: "gentle wonder".to_string(),
            pacing: "slow and steady".to_string(),
        }
    }

    #[test]
    fn instructions_concatenate_affect_pronunciation_and_mood() {
        let instructions = style_instructions(&direction("안녕"));
        let affect = instructions.find("[Affect:").unwrap();
        let pronunciation = instructions.find("[Pronunciation:").unwrap();
        let tone = instructions.find("[Tone: warm]").unwrap();
        assert!(affect < pronunciation && pronunciation < tone);
        assert!(instructions.contains("[Emotion: gentle wonder]"));
        assert!(instructions.ends_with("[Pacing: slow and steady]"));
    }

    /// Speech fake: echoes voice + text as the audio payload; fails on texts
    /// listed in `failing`.
    struct EchoSpeech {
        failing: Vec<String>,
    }

    impl SpeechPort for EchoSpeech {
        fn synthesize(&self, request: SpeechRequest) -> PortFuture<Vec<u8>> {
            let fail = self.failing.contains(&request.text);
            let payload = format!("{}:{}", request.voice, request.text).into_bytes();
            Box::pin(async move {
                if fail {
                    Err(anyhow!("synthesis failed"))
                } else {
                    Ok(payload)
                }
            })
        }
    }

    fn style() -> SpeechStyle {
        SpeechStyle {
            model: "tts-test".to_string(),
            format: "mp3".to_string(),
        }
    }

    #[tokio::test]
    async fn clips_follow_sentence_order() {
        let speech = EchoSpeech { failing: vec![] };
        let directions = vec![direction("first"), direction("second")];
        let clips = synthesize_sentences(&speech, &style(), "shimmer", &directions).await;
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0], b"shimmer:first");
        assert_eq!(clips[1], b"shimmer:second");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sentence_yields_no_clip() {
        let speech = EchoSpeech {
            failing: vec!["second".to_string()],
        };
        let directions = vec![direction("first"), direction("second"), direction("third")];
        let clips = synthesize_sentences(&speech, &style(), "shimmer", &directions).await;
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0], b"shimmer:first");
        assert_eq!(clips[1], b"shimmer:third");
    }

    #[tokio::test]
    async fn title_is_voiced_once_per_voice_in_order() {
        let speech = EchoSpeech { failing: vec![] };
        let voices = vec!["echo".to_string(), "shimmer".to_string()];
        let clips = synthesize_title(&speech, &style(), &voices, "The Brave Fox").await;
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0], b"echo:The Brave Fox");
        assert_eq!(clips[1], b"shimmer:The Brave Fox");
    }
}
