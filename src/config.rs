use crate::ai_provider::AiProvider;
use crate::error::{Result, ScaflowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: AiProvider,
    pub api_key: Option<String>,
    /// 未指定ならプロバイダの既定モデル
    pub model: Option<String>,
    /// 未指定ならプロバイダの既定エンドポイント
    pub api_base: Option<String>,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    /// 同時に解析する行数
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: AiProvider::OpenAi,
            api_key: None,
            model: None,
            api_base: None,
            max_tokens: 1500,
            timeout_seconds: 120,
            concurrency: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ScaflowError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("scaflow").join("config.json"))
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_base())
            .trim_end_matches('/')
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        let env_name = self.provider.api_key_env();
        if let Ok(key) = std::env::var(env_name) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.api_key
            .clone()
            .ok_or(ScaflowError::MissingApiKey(env_name))
    }

    /// APIキーを設定（前後の空白は除去、空なら解除）
    pub fn set_api_key(&mut self, key: &str) {
        let key = key.trim();
        self.api_key = (!key.is_empty()).then(|| key.to_string());
    }
}
