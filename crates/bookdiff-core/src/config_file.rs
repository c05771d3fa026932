use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::prompts::PromptVariant;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub chat: Option<ChatConfig>,
    pub chunking: Option<ChunkingConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub prompt: Option<PromptConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub google_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub tesseract_path: Option<String>,
    pub ocr_language: Option<String>,
    pub render_dpi: Option<f32>,
    pub header_exclusion: Option<f32>,
    pub footer_exclusion: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    pub variant: Option<PromptVariant>,
    /// Path to a custom comparison template.
    pub template_path: Option<String>,
}

/// Platform config directory path: `<config_dir>/bookdiff/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bookdiff").join("config.toml"))
}

/// Load config by cascading CWD `.bookdiff.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".bookdiff.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    macro_rules! pick {
        ($section:ident . $field:ident) => {
            overlay
                .$section
                .as_ref()
                .and_then(|s| s.$field.clone())
                .or_else(|| base.$section.as_ref().and_then(|s| s.$field.clone()))
        };
    }

    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            google_api_key: pick!(api_keys.google_api_key),
        }),
        chat: Some(ChatConfig {
            model: pick!(chat.model),
            base_url: pick!(chat.base_url),
            timeout_secs: pick!(chat.timeout_secs),
            temperature: pick!(chat.temperature),
        }),
        chunking: Some(ChunkingConfig {
            chunk_size: pick!(chunking.chunk_size),
            chunk_overlap: pick!(chunking.chunk_overlap),
        }),
        extraction: Some(ExtractionConfig {
            tesseract_path: pick!(extraction.tesseract_path),
            ocr_language: pick!(extraction.ocr_language),
            render_dpi: pick!(extraction.render_dpi),
            header_exclusion: pick!(extraction.header_exclusion),
            footer_exclusion: pick!(extraction.footer_exclusion),
        }),
        prompt: Some(PromptConfig {
            variant: pick!(prompt.variant),
            template_path: pick!(prompt.template_path),
        }),
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(())
}
