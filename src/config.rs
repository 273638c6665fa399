use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub transcripts: TranscriptsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptsConfig {
    #[serde(default = "default_transcripts_dir")]
    pub dir: PathBuf,
}

impl Default for TranscriptsConfig {
    fn default() -> Self {
        Self {
            dir: default_transcripts_dir(),
        }
    }
}

fn default_transcripts_dir() -> PathBuf {
    PathBuf::from("~/.claude/projects")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

fn default_exclude_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "dist",
        "build",
        ".next",
        "coverage",
        "__pycache__",
        ".venv",
        "venv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 32,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

fn default_limit() -> i64 {
    10
}
fn default_overfetch_factor() -> i64 {
    2
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// In-memory defaults for commands that operate on a target path and
    /// never touch the database (audit, plan, validate).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/sdx.sqlite"),
            },
            transcripts: TranscriptsConfig::default(),
            audit: AuditConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.transcripts.dir = expand_home(&config.transcripts.dir);

    // Validate search
    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }
    if config.search.overfetch_factor < 1 {
        anyhow::bail!("search.overfetch_factor must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if config.embedding.provider != "local"
            && (config.embedding.model.is_none() || config.embedding.dims.is_none())
        {
            anyhow::bail!(
                "embedding.model and embedding.dims must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(config)
}

/// Expand a leading `~/` against $HOME so the transcripts dir can be
/// written portably in config files.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_defaults() {
        let cfg = Config::minimal();
        assert_eq!(cfg.embedding.provider, "disabled");
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.search.default_limit, 10);
        assert!(cfg
            .audit
            .exclude_dirs
            .contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_expand_home() {
        std::env::set_var("HOME", "/home/tester");
        let expanded = expand_home(Path::new("~/.claude/projects"));
        assert_eq!(expanded, PathBuf::from("/home/tester/.claude/projects"));

        let absolute = expand_home(Path::new("/var/data"));
        assert_eq!(absolute, PathBuf::from("/var/data"));
    }

    #[test]
    fn test_load_rejects_unknown_provider() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[db]
path = "./data/test.sqlite"

[embedding]
provider = "quantum"
"#,
        )
        .unwrap();

        let result = load_config(tmp.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }

    #[test]
    fn test_load_requires_model_for_remote_provider() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[db]
path = "./data/test.sqlite"

[embedding]
provider = "openai"
"#,
        )
        .unwrap();

        let result = load_config(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_local_provider_without_model() {
        // Local provider resolves model and dims from built-in defaults.
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
[db]
path = "./data/test.sqlite"

[embedding]
provider = "local"
"#,
        )
        .unwrap();

        let cfg = load_config(tmp.path()).unwrap();
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.embedding.batch_size, 32);
    }
}
