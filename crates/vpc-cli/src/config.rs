use serde::{Deserialize, Serialize};

/// Replay tool defaults, loaded from vpc.toml. Command-line flags win
/// over anything set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayToolConfig {
    /// Worker process count for master mode.
    #[serde(default)]
    pub num_threads: Option<u32>,
    /// Silence worker stderr.
    #[serde(default)]
    pub quiet_slave: Option<bool>,
    /// Validate the SPIR-V magic word before creating modules.
    #[serde(default)]
    pub spirv_val: Option<bool>,
    /// Deduplicate pipelines against an in-memory cache during replay.
    #[serde(default)]
    pub pipeline_cache: Option<bool>,
    /// Persist created pipeline hashes here.
    #[serde(default)]
    pub on_disk_pipeline_cache: Option<String>,
}

impl ReplayToolConfig {
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ReplayToolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_threads = 4\nspirv_val = true").unwrap();

        let config = ReplayToolConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.spirv_val, Some(true));
        assert_eq!(config.pipeline_cache, None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ReplayToolConfig::load_or_default("/nonexistent/vpc.toml");
        assert!(config.num_threads.is_none());
    }
}
