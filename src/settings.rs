use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub conf_threshold: f32,
    pub profanity_words: Vec<String>,
    pub audio_workers: usize,
    pub queue_depth: usize,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub speech_model: String,
    pub speech_format: String,
    pub default_voice: String,
    pub masculine_voice: String,
    pub feminine_voice: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conf_threshold: layout::DEFAULT_CONF_THRESHOLD,
            profanity_words: Vec::new(),
            audio_workers: 0,
            queue_depth: 32,
            chat_model: "gpt-4o-mini".to_string(),
            chat_temperature: 0.7,
            speech_model: "gpt-4o-mini-tts".to_string(),
            speech_format: "mp3".to_string(),
            default_voice: "shimmer".to_string(),
            masculine_voice: "echo".to_string(),
            feminine_voice: "shimmer".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    pipeline: Option<PipelineSettings>,
    audio: Option<AudioSettings>,
    chat: Option<ChatSettings>,
    speech: Option<SpeechSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    conf_threshold: Option<f32>,
    profanity_words: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioSettings {
    workers: Option<usize>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatSettings {
    model: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechSettings {
    model: Option<String>,
    format: Option<String>,
    default_voice: Option<String>,
    masculine_voice: Option<String>,
    feminine_voice: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(pipeline) = incoming.pipeline {
            if let Some(threshold) = pipeline.conf_threshold {
                if (0.0..=1.0).contains(&threshold) {
                    self.conf_threshold = threshold;
                }
            }
            if let Some(words) = pipeline.profanity_words {
                self.profanity_words = words;
            }
        }
        if let Some(audio) = incoming.audio {
            if let Some(workers) = audio.workers {
                self.audio_workers = workers;
            }
            if let Some(depth) = audio.queue_depth {
                if depth > 0 {
                    self.queue_depth = depth;
                }
            }
        }
        if let Some(chat) = incoming.chat {
            if let Some(model) = chat.model {
                if !model.trim().is_empty() {
                    self.chat_model = model;
                }
            }
            if let Some(temperature) = chat.temperature {
                if (0.0..=2.0).contains(&temperature) {
                    self.chat_temperature = temperature;
                }
            }
        }
        if let Some(speech) = incoming.speech {
            if let Some(model) = speech.model {
                if !model.trim().is_empty() {
                    self.speech_model = model;
                }
            }
            if let Some(format) = speech.format {
                if !format.trim().is_empty() {
                    self.speech_format = format;
                }
            }
            if let Some(voice) = speech.default_voice {
                if !voice.trim().is_empty() {
                    self.default_voice = voice;
                }
            }
            if let Some(voice) = speech.masculine_voice {
                if !voice.trim().is_empty() {
                    self.masculine_voice = voice;
                }
            }
            if let Some(voice) = speech.feminine_voice {
                if !voice.trim().is_empty() {
                    self.feminine_voice = voice;
                }
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".storyvoice"))
        }
    })
}
