use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub embed: EmbedConfig,
    pub recommend: RecommendConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the .reelsim directory lives (default: inside the project root)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub backend: EmbedBackend,
    /// Upper bound on a single embedding call, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EmbedBackend {
    #[serde(rename = "ollama")]
    Ollama { model: String, url: String },
    /// Offline feature hashing. A stand-in for tests and air-gapped use;
    /// `ollama` with `all-minilm` runs the pretrained sentence model.
    #[serde(rename = "hashing")]
    Hashing { dimensions: usize },
    #[serde(rename = "none")]
    None,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Result count used when the caller does not pass one (1..=100)
    pub default_limit: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            backend: EmbedBackend::Hashing { dimensions: 384 },
            timeout_secs: 30,
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

impl EmbedBackend {
    pub fn ollama_default() -> Self {
        Self::Ollama {
            model: "all-minilm".into(),
            url: "http://localhost:11434".into(),
        }
    }
}

impl Config {
    /// Load config from a .reelsim/config.toml file, falling back to defaults.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".reelsim").join("config.toml");
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading config from {}", config_path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("parsing config from {}", config_path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the actual storage directory path.
    pub fn storage_dir(&self, project_root: &Path) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| project_root.join(".reelsim"))
    }

    /// Write current config to disk (for `reelsim init`).
    pub fn save(&self, project_root: &Path) -> Result<PathBuf> {
        let dir = project_root.join(".reelsim");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating config dir {}", dir.display()))?;
        let config_path = dir.join("config.toml");
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("writing config to {}", config_path.display()))?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.embed.backend, EmbedBackend::Hashing { dimensions: 384 });
        assert_eq!(config.recommend.default_limit, 10);
        assert_eq!(config.storage_dir(dir.path()), dir.path().join(".reelsim"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.embed.backend = EmbedBackend::ollama_default();
        config.recommend.default_limit = 25;
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.embed.backend, EmbedBackend::ollama_default());
        assert_eq!(loaded.recommend.default_limit, 25);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".reelsim")).unwrap();
        std::fs::write(
            dir.path().join(".reelsim").join("config.toml"),
            "[embed]\nbackend = { type = \"none\" }\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.embed.backend, EmbedBackend::None);
        assert_eq!(config.embed.timeout_secs, 30);
        assert_eq!(config.recommend.default_limit, 10);
    }

    #[test]
    fn custom_storage_path_wins() {
        let mut config = Config::default();
        config.storage.path = Some(PathBuf::from("/var/lib/reelsim"));
        assert_eq!(
            config.storage_dir(Path::new("/home/me/catalog")),
            PathBuf::from("/var/lib/reelsim")
        );
    }
}
