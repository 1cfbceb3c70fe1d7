use crate::core::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Largest accepted request body (multipart uploads included)
    pub max_upload_bytes: usize,
}

/// Inpainting configuration
#[derive(Debug, Clone)]
pub struct InpaintConfig {
    pub model_path: PathBuf,
    /// Padded dimensions must be multiples of this
    pub pad_stride: u32,
    pub inference_backend: Option<String>,
}

/// OCR configuration
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Directory holding `ocr/ocr.onnx` and `ocr/cjk_vocab.txt`
    pub models_dir: PathBuf,
}

/// Translation backend configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub inpaint: InpaintConfig,
    pub ocr: OcrConfig,
    pub translation: TranslationConfig,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let port = match env::var("SERVER_PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::EnvVarError(format!("SERVER_PORT={raw}")))?,
            Err(_) => 8000,
        };

        Ok(Self {
            server: ServerConfig {
                port,
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
                max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            },
            inpaint: InpaintConfig {
                model_path: env::var("INPAINT_MODEL_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("models/inpainting/anime-manga-big-lama.onnx")),
                pad_stride: env_or("INPAINT_PAD_STRIDE", 8),
                inference_backend: env::var("INFERENCE_BACKEND")
                    .ok()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty()),
            },
            ocr: OcrConfig {
                models_dir: env::var("OCR_MODELS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("models")),
            },
            translation: TranslationConfig {
                api_key: env::var("DEEPL_API_KEY")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                api_url: env::var("DEEPL_API_URL")
                    .unwrap_or_else(|_| "https://api-free.deepl.com/v2/translate".to_string()),
                source_lang: env::var("TRANSLATE_SOURCE_LANG").unwrap_or_else(|_| "JA".to_string()),
                target_lang: env::var("TRANSLATE_TARGET_LANG").unwrap_or_else(|_| "EN".to_string()),
                timeout_seconds: env_or("API_TIMEOUT_SECONDS", 60),
                max_retries: env_or("MAX_RETRIES", 2),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.inpaint.pad_stride == 0 {
            return Err(ConfigError::InvalidPadStride(self.inpaint.pad_stride));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidUploadLimit);
        }

        if self.translation.source_lang.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage("source"));
        }
        if self.translation.target_lang.trim().is_empty() {
            return Err(ConfigError::EmptyLanguage("target"));
        }

        if !self.translation.api_url.starts_with("http://")
            && !self.translation.api_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidTranslationConfig(format!(
                "DEEPL_API_URL must be an http(s) URL, got {}",
                self.translation.api_url
            )));
        }

        if self.translation.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "API_TIMEOUT_SECONDS must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_bytes
    }

    pub fn pad_stride(&self) -> u32 {
        self.inpaint.pad_stride
    }
}

// Note: No Default implementation because Config::new() can fail.
// Tests build configs through `Config::for_tests()`.
#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                port: 8000,
                host: "127.0.0.1".to_string(),
                log_level: Level::DEBUG,
                max_upload_bytes: 1024 * 1024,
            },
            inpaint: InpaintConfig {
                model_path: PathBuf::from("models/inpainting/missing.onnx"),
                pad_stride: 8,
                inference_backend: None,
            },
            ocr: OcrConfig {
                models_dir: PathBuf::from("models"),
            },
            translation: TranslationConfig {
                api_key: None,
                api_url: "https://api-free.deepl.com/v2/translate".to_string(),
                source_lang: "JA".to_string(),
                target_lang: "EN".to_string(),
                timeout_seconds: 5,
                max_retries: 0,
            },
        }
    }
}
