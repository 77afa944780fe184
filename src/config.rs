use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::api::DEFAULT_TOP_K;
use crate::view::DEFAULT_COMPACT_WIDTH;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "NYAYA_API_URL";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub api_url: Option<String>,
    pub top_k: Option<u32>,
    pub use_llm: Option<bool>,
    pub language: Option<String>,
    pub compact_width: Option<u16>,
    pub services_path: Option<String>,
    pub speech_voice: Option<String>,
    pub tts_command: Option<String>,
    pub stt_command: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_speech_voice(voice: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.speech_voice = Some(voice.to_string());
        config.save()
    }

    /// Environment, then the value baked in at build time, then the config
    /// file, then the local development server.
    pub fn api_base_url(&self) -> String {
        let runtime = std::env::var(API_URL_ENV).ok();
        let build_time = option_env!("NYAYA_API_URL").map(str::to_string);
        resolve_api_url(runtime, build_time, self.api_url.clone())
    }

    pub fn top_k(&self) -> u32 {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }

    pub fn use_llm(&self) -> bool {
        self.use_llm.unwrap_or(true)
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }

    pub fn compact_width(&self) -> u16 {
        self.compact_width.unwrap_or(DEFAULT_COMPACT_WIDTH)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("nyaya"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

fn resolve_api_url(
    runtime: Option<String>,
    build_time: Option<String>,
    configured: Option<String>,
) -> String {
    [runtime, build_time, configured]
        .into_iter()
        .flatten()
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .find(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}
