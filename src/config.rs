use std::{io, path::PathBuf};

use emath::Vec2;

use crate::{
    generation::{ArtStyle, CommandProviderConfig, Quality, RetryPolicy},
    raster::{BrushSettings, StampSettings},
    storage::DEFAULT_HISTORY_LIMIT,
};

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub viewport: Vec2,
    pub provider: CommandProviderConfig,
    /// Persist history here; kept in memory when unset.
    pub history_dir: Option<PathBuf>,
    pub history_limit: usize,
    pub retry: RetryPolicy,
    pub brush: BrushSettings,
    pub stamp: StampSettings,
    pub style: ArtStyle,
    pub quality: Quality,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewport: [1100.0, 800.0].into(),
            provider: Default::default(),
            history_dir: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            retry: Default::default(),
            brush: Default::default(),
            stamp: Default::default(),
            style: Default::default(),
            quality: Default::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        match std::fs::File::open(path) {
            Ok(f) => Ok(serde_json::from_reader(io::BufReader::new(f))?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "retry": { "max_retries": 5 },
                "brush": { "hardness": 80 },
                "style": "Anime",
                "provider": { "program": "/usr/local/bin/gen", "capabilities": { "accepts_input_image": true } }
            }"#,
        )
        .unwrap();
        assert_eq!(5, config.retry.max_retries);
        assert_eq!(2000, config.retry.base_delay_ms);
        assert_eq!(80.0, config.brush.hardness);
        assert_eq!(40.0, config.brush.size);
        assert_eq!(ArtStyle::Anime, config.style);
        assert_eq!(PathBuf::from("/usr/local/bin/gen"), config.provider.program);
        assert!(!config.provider.capabilities.preserves_framing);
        assert_eq!(DEFAULT_HISTORY_LIMIT, config.history_limit);
    }

    #[test]
    fn missing_file_is_default() {
        let config = Config::load("/nonexistent/caricature/config.json").unwrap();
        assert_eq!(Config::default(), config);
    }
}
