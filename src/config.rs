//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::speech::RestartPolicy;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/chat";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Conversation endpoint (`POST`)
    pub endpoint: String,

    /// Per-request timeout for the conversation endpoint
    pub request_timeout: Duration,

    /// Fixed locale for speech recognition
    pub recognition_locale: String,

    pub restart_delay: Duration,
    pub restart_max_delay: Duration,
    pub max_recognition_failures: u32,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("chat-voice");

        let socket_path = data_dir.join("daemon.sock");

        Ok(Self {
            socket_path,
            data_dir,
            endpoint: lookup("CHAT_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            request_timeout: Duration::from_secs(parse_or(&lookup, "CHAT_TIMEOUT_SECS", 30)?),
            recognition_locale: lookup("RECOGNITION_LOCALE").unwrap_or_else(|| "en-US".to_string()),
            restart_delay: Duration::from_millis(parse_or(&lookup, "VOICE_RESTART_DELAY_MS", 300)?),
            restart_max_delay: Duration::from_millis(parse_or(
                &lookup,
                "VOICE_RESTART_MAX_DELAY_MS",
                5000,
            )?),
            max_recognition_failures: parse_or(&lookup, "VOICE_MAX_FAILURES", 5)?,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            base_delay: self.restart_delay,
            max_delay: self.restart_max_delay.max(self.restart_delay),
            max_failures: self.max_recognition_failures.max(1),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
