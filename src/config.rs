use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Frame-matching policy for the MP3 walker. Every recognized frame is
/// compared against the first confirmed frame under these flags.
#[derive(Debug, Deserialize, Clone)]
pub struct Mp3Options {
    pub max_gap_bytes: usize,
    pub match_frame_size: bool,
    pub match_version: bool,
    pub match_layer: bool,
    pub match_bitrate: bool,
    pub match_sampling_rate: bool,
}

impl Default for Mp3Options {
    fn default() -> Self {
        Self {
            max_gap_bytes: 768,
            match_frame_size: false,
            match_version: true,
            match_layer: false,
            match_bitrate: false,
            match_sampling_rate: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_id: String,
    pub enabled_formats: Vec<String>,
    #[serde(default)]
    pub mp3: Mp3Options,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig {
        config,
        config_hash,
    })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}", nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let loaded = load_config(None).expect("default config");
        assert_eq!(loaded.config.enabled_formats.len(), 5);
        assert_eq!(loaded.config.mp3.max_gap_bytes, 768);
        assert!(loaded.config.mp3.match_version);
        assert!(!loaded.config.mp3.match_bitrate);
        assert!(!loaded.config.run_id.is_empty());
        assert_eq!(loaded.config_hash.len(), 64);
    }
}
