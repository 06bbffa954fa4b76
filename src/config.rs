use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Missing file means defaults; a broken file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let config = Config::load_or_default("does/not/exist.yaml").unwrap();
        assert_eq!(config.video.default_fps, 30.0);
        assert!(config.pose.model_path.is_none());
    }

    #[test]
    fn test_load_overrides_analysis_constants() {
        let dir = std::env::temp_dir().join(format!("swing_speed_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(
            &path,
            "analysis:\n  speed:\n    lever_ratio: 2.0\n  fusion:\n    agreement_band: 0.2\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.analysis.speed.lever_ratio, 2.0);
        assert_eq!(config.analysis.speed.flow_blend, 0.6);
        assert_eq!(config.analysis.fusion.agreement_band, 0.2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
