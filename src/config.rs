//! YAML configuration loading and validation.
//!
//! The config file drives every subsystem: storage backend selection,
//! workspace definitions, embedding/chat provider choice, schedule
//! intervals, and API-key permission grants. Provider kinds are enumerated
//! and rejected at load time rather than at first use. Environment
//! variables override scalar values by dotted path (`BACKEND__API_KEY`
//! overrides `backend.api_key`) when the path already exists in the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceConfig>,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub output_models: Vec<OutputModelConfig>,
    /// Static built-in tools enabled by name.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./db/cache.sqlite")
}

/// Base URL + API key the CLI jobs use to reach the document API.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_key: None,
        }
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

/// Per-job interval seconds for `rgw schedule`.
#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub index_secs: u64,
    #[serde(default = "default_interval")]
    pub vectorize_secs: u64,
    #[serde(default = "default_interval")]
    pub reduce_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            index_secs: default_interval(),
            vectorize_secs: default_interval(),
            reduce_secs: default_interval(),
        }
    }
}

fn default_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Rclone,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_provider")]
    pub provider: StorageProvider,
    #[serde(default)]
    pub opts: Option<RcloneOpts>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            opts: None,
        }
    }
}

fn default_storage_provider() -> StorageProvider {
    StorageProvider::Local
}

/// Connection options for the rclone remote-control API.
#[derive(Debug, Deserialize, Clone)]
pub struct RcloneOpts {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    pub id: String,
    #[serde(default)]
    pub remote: Option<String>,
    pub dirs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    ["md", "txt", "csv", "log", "html", "xml", "json"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Disabled,
    OpenAI,
    Ollama,
    Google,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Disabled,
            model: None,
            dims: None,
            api_key: None,
            base_url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != EmbeddingProviderKind::Disabled
    }
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Disabled
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrieverConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatProviderKind {
    OpenAI,
    Google,
}

/// One entry in the `/v1/models` catalogue, with its chat backend.
#[derive(Debug, Deserialize, Clone)]
pub struct OutputModelConfig {
    pub id: String,
    pub owned_by: String,
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub provider: ChatProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_max_tokens_limit")]
    pub max_tokens: usize,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_temperature() -> f64 {
    0.2
}
fn default_max_messages() -> usize {
    40
}
fn default_max_message_length() -> usize {
    8_000
}
fn default_max_tokens_limit() -> usize {
    16_000
}
fn default_max_tool_rounds() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Maps API keys (optionally scoped to users) to workspace access strings
/// of the form `workspace:rw` or `workspace` (read-only).
#[derive(Debug, Deserialize, Clone)]
pub struct PermissionGrant {
    #[serde(default)]
    pub users: Vec<String>,
    pub api_keys: Vec<String>,
    pub workspaces: Vec<String>,
}

/// Load, overlay, and validate the configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut doc: serde_yaml::Value =
        serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

    overlay_env(&mut doc, std::env::vars());

    let config: Config = serde_yaml::from_value(doc).with_context(|| "Invalid config structure")?;

    validate(&config)?;

    Ok(config)
}

/// Replace scalar values with environment overrides matched by dotted path.
///
/// `BACKEND__API_KEY=secret` targets `backend.api_key`. Only paths that
/// already exist in the document are replaced, so unrelated environment
/// variables cannot inject new keys.
pub fn overlay_env(doc: &mut serde_yaml::Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        if !key.contains("__") {
            continue;
        }
        let path: Vec<String> = key.to_lowercase().split("__").map(String::from).collect();
        set_path(doc, &path, &value);
    }
}

fn set_path(doc: &mut serde_yaml::Value, path: &[String], value: &str) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Some(entry) = doc.get_mut(head.as_str()) else {
        return;
    };
    if rest.is_empty() {
        if !entry.is_mapping() && !entry.is_sequence() {
            *entry = serde_yaml::Value::String(value.to_string());
        }
    } else {
        set_path(entry, rest, value);
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retriever.k == 0 {
        anyhow::bail!("retriever.k must be >= 1");
    }

    for workspace in &config.workspaces {
        if workspace.id.trim().is_empty() {
            anyhow::bail!("workspaces[].id must not be empty");
        }
        if workspace.dirs.is_empty() {
            anyhow::bail!("workspace '{}' has no directories", workspace.id);
        }
    }

    if config.storage.provider == StorageProvider::Rclone && config.storage.opts.is_none() {
        anyhow::bail!("storage.opts (url, username, password) required for the rclone provider");
    }

    if config.embeddings.is_enabled() {
        if config.embeddings.model.is_none() {
            anyhow::bail!("embeddings.model must be set when a provider is configured");
        }
        if config.embeddings.dims.is_none() || config.embeddings.dims == Some(0) {
            anyhow::bail!("embeddings.dims must be > 0 when a provider is configured");
        }
    }

    for model in &config.output_models {
        if model.id.trim().is_empty() {
            anyhow::bail!("output_models[].id must not be empty");
        }
        if !(0.0..=1.0).contains(&model.chat.temperature) {
            anyhow::bail!(
                "output model '{}': chat.temperature must be in [0.0, 1.0]",
                model.id
            );
        }
    }

    for tool in &config.tools {
        if !crate::tools::is_static_tool(tool) {
            anyhow::bail!("unknown tool: '{}'", tool);
        }
    }

    for grant in &config.permissions {
        if grant.api_keys.is_empty() {
            anyhow::bail!("permissions[] entry has no api_keys");
        }
        for workspace in &grant.workspaces {
            let name = workspace.split(':').next().unwrap_or("");
            if name.is_empty() {
                anyhow::bail!("invalid workspace grant: '{}'", workspace);
            }
            if let Some(access) = workspace.split(':').nth(1) {
                if access != "rw" && access != "r" {
                    anyhow::bail!("invalid workspace access: '{}'", workspace);
                }
            }
        }
    }

    Ok(())
}

impl Config {
    /// Look up an output model by its public id.
    pub fn output_model(&self, id: &str) -> Option<&OutputModelConfig> {
        self.output_models.iter().find(|m| m.id == id)
    }

    /// Minimal config for contexts where no file is available (tests, scaffolding).
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:3000".to_string(),
            },
            db: DbConfig {
                path: PathBuf::from("./db/api.sqlite"),
                cache_path: default_cache_path(),
            },
            backend: BackendConfig::default(),
            schedule: ScheduleConfig::default(),
            storage: StorageConfig::default(),
            workspaces: Vec::new(),
            chunking: ChunkingConfig::default(),
            embeddings: EmbeddingConfig::default(),
            retriever: RetrieverConfig::default(),
            output_models: Vec::new(),
            tools: Vec::new(),
            mcp_servers: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
server:
  bind: "127.0.0.1:3000"
db:
  path: "./db/api.sqlite"
backend:
  base_url: "http://127.0.0.1:3000"
  api_key: "from-file"
workspaces:
  - id: eng
    dirs: ["/srv/docs/eng"]
permissions:
  - users: []
    api_keys: ["k1"]
    workspaces: ["eng:rw"]
"#;

    fn parse(yaml: &str, vars: Vec<(String, String)>) -> Result<Config> {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        overlay_env(&mut doc, vars.into_iter());
        let config: Config = serde_yaml::from_value(doc)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_parse_minimal() {
        let config = parse(BASE, vec![]).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.workspaces.len(), 1);
        assert_eq!(config.backend.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.schedule.index_secs, 300);
    }

    #[test]
    fn test_env_overlay_replaces_existing_scalar() {
        let vars = vec![("BACKEND__API_KEY".to_string(), "from-env".to_string())];
        let config = parse(BASE, vars).unwrap();
        assert_eq!(config.backend.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_env_overlay_ignores_unknown_paths() {
        let vars = vec![("BACKEND__NO_SUCH_KEY".to_string(), "x".to_string())];
        let config = parse(BASE, vars).unwrap();
        assert_eq!(config.backend.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_env_overlay_ignores_plain_vars() {
        let vars = vec![("PATH".to_string(), "/usr/bin".to_string())];
        assert!(parse(BASE, vars).is_ok());
    }

    #[test]
    fn test_unknown_storage_provider_rejected() {
        let yaml = format!("{}\nstorage:\n  provider: ftp\n", BASE);
        assert!(parse(&yaml, vec![]).is_err());
    }

    #[test]
    fn test_rclone_requires_opts() {
        let yaml = format!("{}\nstorage:\n  provider: rclone\n", BASE);
        assert!(parse(&yaml, vec![]).is_err());
    }

    #[test]
    fn test_embeddings_require_model_and_dims() {
        let yaml = format!("{}\nembeddings:\n  provider: openai\n", BASE);
        assert!(parse(&yaml, vec![]).is_err());

        let yaml = format!(
            "{}\nembeddings:\n  provider: openai\n  model: text-embedding-3-small\n  dims: 1536\n",
            BASE
        );
        assert!(parse(&yaml, vec![]).is_ok());
    }

    #[test]
    fn test_tool_names_validated() {
        let yaml = format!("{}\ntools: [get_weather, exchange_rates]\n", BASE);
        let config = parse(&yaml, vec![]).unwrap();
        assert_eq!(config.tools.len(), 2);

        let yaml = format!("{}\ntools: [get_weather, telepathy]\n", BASE);
        assert!(parse(&yaml, vec![]).is_err());
    }

    #[test]
    fn test_invalid_workspace_grant_rejected() {
        let yaml = BASE.replace("eng:rw", "eng:admin");
        assert!(parse(&yaml, vec![]).is_err());
    }

    #[test]
    fn test_output_model_lookup() {
        let yaml = format!(
            r#"{}
output_models:
  - id: assistant
    owned_by: acme
    chat:
      provider: openai
      model: gpt-4o-mini
      api_key: sk-test
"#,
            BASE
        );
        let config = parse(&yaml, vec![]).unwrap();
        assert!(config.output_model("assistant").is_some());
        assert!(config.output_model("missing").is_none());
        let model = config.output_model("assistant").unwrap();
        assert_eq!(model.chat.max_messages, 40);
    }

    #[test]
    fn test_temperature_range_validated() {
        let yaml = format!(
            r#"{}
output_models:
  - id: assistant
    owned_by: acme
    chat:
      provider: openai
      model: gpt-4o-mini
      temperature: 1.5
"#,
            BASE
        );
        assert!(parse(&yaml, vec![]).is_err());
    }
}
