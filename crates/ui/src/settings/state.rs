use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use colloquy_api::BackendConfig;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::message_list::{DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH, ListConfig};
use crate::chat::size_cache::DEFAULT_FALLBACK_HEIGHT;
use crate::chat::view::ThreadOptions;
use crate::chat::virtual_list::{DEFAULT_OVERSCAN_ROWS, Viewport};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8081";
pub const DEFAULT_API_PATH: &str = "/api";
pub const DEFAULT_SEND_DEBOUNCE_MS: u64 = 300;
pub const SETTINGS_DIRECTORY_NAME: &str = "colloquy";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "COLLOQUY_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_send_debounce_ms")]
    pub send_debounce_ms: u64,
    #[serde(default = "default_overscan_rows")]
    pub overscan_rows: usize,
    #[serde(default = "default_fallback_row_height")]
    pub fallback_row_height: f32,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            api_path: default_api_path(),
            bearer_token: String::new(),
            send_debounce_ms: default_send_debounce_ms(),
            overscan_rows: default_overscan_rows(),
            fallback_row_height: default_fallback_row_height(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        let backend_url = self.backend_url.trim().trim_end_matches('/');
        self.backend_url = if backend_url.is_empty() {
            default_backend_url()
        } else {
            backend_url.to_string()
        };

        // An empty path is allowed: the API then lives at the server root.
        let api_path = self.api_path.trim().trim_matches('/');
        self.api_path = if api_path.is_empty() {
            String::new()
        } else {
            format!("/{api_path}")
        };

        self.bearer_token = self.bearer_token.trim().to_string();
        self.fallback_row_height =
            positive_or(self.fallback_row_height, default_fallback_row_height());
        self.viewport_width = positive_or(self.viewport_width, default_viewport_width());
        self.viewport_height = positive_or(self.viewport_height, default_viewport_height());

        self
    }

    /// Base URL every REST path is joined onto, e.g. `http://localhost:8081/api`.
    pub fn api_base_url(&self) -> String {
        format!("{}{}", self.backend_url, self.api_path)
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig::new(self.api_base_url()).with_bearer_token(self.bearer_token.as_str())
    }

    pub fn thread_options(&self) -> ThreadOptions {
        ThreadOptions {
            list: ListConfig {
                viewport: Viewport::new(self.viewport_width, self.viewport_height),
                overscan: self.overscan_rows,
                fallback_row_height: self.fallback_row_height,
            },
            send_debounce: Duration::from_millis(self.send_debounce_ms),
        }
    }
}

/// Active settings plus the file-backed layer they were built from.
///
/// Environment overrides apply only to the active snapshot; `update` persists the file layer.
pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    stored: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".colloquy"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let stored = Self::load_from_disk(&config_path);
        let settings = Self::with_environment(&stored);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            stored: Arc::new(ArcSwap::from_pointee(stored)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Effective settings: defaults, then the settings file, then `COLLOQUY_*` variables.
    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// Defaults plus the settings file, without environment overrides.
    pub fn stored_settings(&self) -> Arc<ClientSettings> {
        self.stored.load_full()
    }

    /// Persists `settings` as the file layer and re-applies the environment on top.
    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings
            .store(Arc::new(Self::with_environment(&normalized_settings)));
        self.stored.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return ClientSettings::default();
        }

        let figment = Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    fn with_environment(stored: &ClientSettings) -> ClientSettings {
        let figment = Figment::from(Serialized::defaults(stored))
            .merge(Env::prefixed(SETTINGS_ENV_PREFIX));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "ignoring invalid {}* environment overrides: {}",
                    SETTINGS_ENV_PREFIX,
                    error
                );
                stored.clone()
            }
        }
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_api_path() -> String {
    DEFAULT_API_PATH.to_string()
}

fn default_send_debounce_ms() -> u64 {
    DEFAULT_SEND_DEBOUNCE_MS
}

fn default_overscan_rows() -> usize {
    DEFAULT_OVERSCAN_ROWS
}

fn default_fallback_row_height() -> f32 {
    DEFAULT_FALLBACK_HEIGHT
}

fn default_viewport_width() -> f32 {
    DEFAULT_VIEWPORT_WIDTH
}

fn default_viewport_height() -> f32 {
    DEFAULT_VIEWPORT_HEIGHT
}
