use anyhow::Context;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_WINDOW_TITLE: &str = "Spotify Artwork";
pub const DEFAULT_WINDOW_SIZE: u32 = 720;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 600;
pub const DEFAULT_ARTWORK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_CACHE_PATH: &str = ".spotify_token_cache.json";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub window: WindowConfig,
    pub poll: PollConfig,
    pub auth: AuthConfig,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.extend(config_candidates(&current_dir));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.extend(config_candidates(dir));
            }
        }

        for path in candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::from_path(&path);
            }
        }

        Ok(Config::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&data)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_toml(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }
}

fn config_candidates(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join("config.toml"),
        dir.join("config").join("config.toml"),
        dir.join("config").join("artwork.toml"),
    ]
}

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub size: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_WINDOW_TITLE.to_owned(),
            size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl WindowConfig {
    /// Side length in pixels of both the window and the decoded artwork.
    pub fn side(&self) -> u32 {
        self.size.clamp(64, 4096)
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub artwork_timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            artwork_timeout_secs: DEFAULT_ARTWORK_TIMEOUT_SECS,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.clamp(100, 60_000))
    }

    pub fn artwork_timeout(&self) -> Duration {
        Duration::from_secs(self.artwork_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_cache: bool,
    pub cache_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_cache: false,
            cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    window: WindowSection,
    #[serde(default)]
    poll: PollSection,
    #[serde(default)]
    auth: AuthSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let window = WindowConfig {
            title: value
                .window
                .title
                .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_owned()),
            size: value.window.size.unwrap_or(DEFAULT_WINDOW_SIZE),
        };
        let poll = PollConfig {
            interval_ms: value.poll.interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            artwork_timeout_secs: value
                .poll
                .artwork_timeout_secs
                .unwrap_or(DEFAULT_ARTWORK_TIMEOUT_SECS),
        };
        let auth = AuthConfig {
            token_cache: value.auth.token_cache.unwrap_or(false),
            cache_path: value
                .auth
                .cache_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_CACHE_PATH)),
        };

        Config { window, poll, auth }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WindowSection {
    title: Option<String>,
    size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PollSection {
    interval_ms: Option<u64>,
    artwork_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthSection {
    token_cache: Option<bool>,
    cache_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("missing environment variable {0} (or its RSPOTIFY_ equivalent)")]
    Missing(&'static str),
}

/// Spotify OAuth app registration read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl Credentials {
    /// Loads `.env` if present, then reads the `SPOTIFY_*` variables.
    pub fn from_env() -> Result<Self, CredentialsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &'static str, fallback: &str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .filter(|value| !value.trim().is_empty())
                .ok_or(CredentialsError::Missing(primary))
        };

        Ok(Self {
            client_id: read("SPOTIFY_CLIENT_ID", "RSPOTIFY_CLIENT_ID")?,
            client_secret: read("SPOTIFY_CLIENT_SECRET", "RSPOTIFY_CLIENT_SECRET")?,
            redirect_uri: read("SPOTIFY_REDIRECT_URI", "RSPOTIFY_REDIRECT_URI")?,
        })
    }
}
