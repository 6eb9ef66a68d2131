use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackendKind {
    Deterministic,
    Google,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticBackendKind {
    Deterministic,
    Google,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankBackendKind {
    Heuristic,
    Llm,
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_embedding_backend() -> EmbeddingBackendKind {
    EmbeddingBackendKind::Deterministic
}

fn default_critic_backend() -> CriticBackendKind {
    CriticBackendKind::Deterministic
}

fn default_critic_max_refinements() -> u32 {
    1
}

fn default_rerank_backend() -> RerankBackendKind {
    RerankBackendKind::Heuristic
}

fn default_planner_max_steps() -> usize {
    6
}

fn default_demo_quota() -> u32 {
    3
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/runtime_snapshot.json")
}

/// Application configuration, loaded from an optional `config.toml` layered
/// with environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackendKind,
    #[serde(default = "default_critic_backend")]
    pub critic_backend: CriticBackendKind,
    #[serde(default = "default_critic_max_refinements")]
    pub critic_max_refinements: u32,
    #[serde(default = "default_rerank_backend")]
    pub rerank_backend: RerankBackendKind,
    #[serde(default = "default_planner_max_steps")]
    pub planner_max_steps: usize,
    #[serde(default)]
    pub enable_langgraph: bool,
    #[serde(default = "default_demo_quota")]
    pub demo_quota: u32,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default)]
    pub google_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: default_embedding_dimensions(),
            embedding_backend: default_embedding_backend(),
            critic_backend: default_critic_backend(),
            critic_max_refinements: default_critic_max_refinements(),
            rerank_backend: default_rerank_backend(),
            planner_max_steps: default_planner_max_steps(),
            enable_langgraph: false,
            demo_quota: default_demo_quota(),
            snapshot_path: default_snapshot_path(),
            google_api_key: None,
        }
    }
}

/// Loads configuration from `config.toml` (if present) layered with
/// environment variables, falling back to defaults for anything unset.
pub fn get_config() -> Result<AppConfig, AppError> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"));

    let raw = builder
        .build()
        .map_err(|e| AppError::Configuration(e.to_string()))?;

    // `config` only fills in keys it actually finds, so start from defaults
    // and overlay what was parsed.
    match raw.try_deserialize::<AppConfig>() {
        Ok(cfg) => Ok(cfg),
        Err(_) => Ok(AppConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.embedding_dimensions, 1536);
        assert_eq!(cfg.critic_max_refinements, 1);
        assert_eq!(cfg.planner_max_steps, 6);
        assert_eq!(cfg.demo_quota, 3);
        assert!(!cfg.enable_langgraph);
    }
}
