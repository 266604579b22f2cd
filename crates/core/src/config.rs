//! Runtime configuration.
//!
//! Layers, last one wins: built-in defaults, the TOML file (with `${VAR}`
//! interpolation), `QUESTPAL_<SECTION>_<KEY>` environment variables, then the
//! caller's [`ConfigOverrides`]. The merged result is validated once.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "questpal.toml";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub dispatch: DispatchConfig,
    pub hunt: HuntConfig,
    pub catalog: CatalogConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    #[serde(deserialize_with = "secret")]
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
}

/// Outbound flood limits. A global window shared by every conversation and a
/// second window per group conversation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub enabled: bool,
    pub global_burst_limit: u32,
    pub global_window_ms: u64,
    pub group_burst_limit: u32,
    pub group_window_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    pub geocoder_url: String,
    pub geocode_timeout_secs: u64,
    pub input_delete_delay_secs: u64,
    /// Shown with "no quests found" when set.
    pub quest_map_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub feed_path: Option<PathBuf>,
    pub refresh_interval_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Values supplied by the embedding process; they beat every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub dispatch_enabled: Option<bool>,
    pub catalog_feed_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Must exist when given. Without it `questpal.toml` in the working
    /// directory is read if present.
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("config file references `${{{var}}}` but it is not set")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` without a closing `}}` in config file")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://questpal.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: SecretString::from(String::new()),
            api_base_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_burst_limit: 29,
            global_window_ms: 1017,
            group_burst_limit: 20,
            group_window_ms: 60_000,
        }
    }
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            geocode_timeout_secs: 10,
            input_delete_delay_secs: 5,
            quest_map_url: None,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { feed_path: None, refresh_interval_secs: 300 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), health_check_port: 8080, graceful_shutdown_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported log format `{other}`")),
        }
    }
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = match options.config_path {
            Some(path) if !path.exists() => return Err(ConfigError::MissingConfigFile(path)),
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        toml::from_str(&interpolate(&raw)?)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        env_value("QUESTPAL_DATABASE_URL", &mut self.database.url)?;
        env_value("QUESTPAL_DATABASE_MAX_CONNECTIONS", &mut self.database.max_connections)?;
        env_value("QUESTPAL_DATABASE_TIMEOUT_SECS", &mut self.database.timeout_secs)?;

        if let Some(token) = env_text("QUESTPAL_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = SecretString::from(token);
        }
        env_value("QUESTPAL_TELEGRAM_API_BASE_URL", &mut self.telegram.api_base_url)?;
        env_value("QUESTPAL_TELEGRAM_POLL_TIMEOUT_SECS", &mut self.telegram.poll_timeout_secs)?;

        let dispatch = &mut self.dispatch;
        env_value("QUESTPAL_DISPATCH_ENABLED", &mut dispatch.enabled)?;
        env_value("QUESTPAL_DISPATCH_GLOBAL_BURST_LIMIT", &mut dispatch.global_burst_limit)?;
        env_value("QUESTPAL_DISPATCH_GLOBAL_WINDOW_MS", &mut dispatch.global_window_ms)?;
        env_value("QUESTPAL_DISPATCH_GROUP_BURST_LIMIT", &mut dispatch.group_burst_limit)?;
        env_value("QUESTPAL_DISPATCH_GROUP_WINDOW_MS", &mut dispatch.group_window_ms)?;

        let hunt = &mut self.hunt;
        env_value("QUESTPAL_HUNT_GEOCODER_URL", &mut hunt.geocoder_url)?;
        env_value("QUESTPAL_HUNT_GEOCODE_TIMEOUT_SECS", &mut hunt.geocode_timeout_secs)?;
        env_value("QUESTPAL_HUNT_INPUT_DELETE_DELAY_SECS", &mut hunt.input_delete_delay_secs)?;
        if let Some(url) = env_text("QUESTPAL_HUNT_QUEST_MAP_URL") {
            hunt.quest_map_url = Some(url);
        }

        if let Some(path) = env_text("QUESTPAL_CATALOG_FEED_PATH") {
            self.catalog.feed_path = Some(PathBuf::from(path));
        }
        env_value("QUESTPAL_CATALOG_REFRESH_INTERVAL_SECS", &mut self.catalog.refresh_interval_secs)?;

        env_value("QUESTPAL_SERVER_BIND_ADDRESS", &mut self.server.bind_address)?;
        env_value("QUESTPAL_SERVER_HEALTH_CHECK_PORT", &mut self.server.health_check_port)?;
        env_value("QUESTPAL_SERVER_GRACEFUL_SHUTDOWN_SECS", &mut self.server.graceful_shutdown_secs)?;

        env_value("QUESTPAL_LOGGING_LEVEL", &mut self.logging.level)?;
        env_value("QUESTPAL_LOGGING_FORMAT", &mut self.logging.format)?;
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides { database_url, log_level, telegram_bot_token, dispatch_enabled, catalog_feed_path } =
            overrides;

        if let Some(url) = database_url {
            self.database.url = url;
        }
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        if let Some(token) = telegram_bot_token {
            self.telegram.bot_token = SecretString::from(token);
        }
        if let Some(enabled) = dispatch_enabled {
            self.dispatch.enabled = enabled;
        }
        if catalog_feed_path.is_some() {
            self.catalog.feed_path = catalog_feed_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        let url = database.url.trim();
        require(
            url.starts_with("sqlite:") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::memory:` or `:memory:`)",
        )?;
        require(database.max_connections > 0, "database.max_connections must be greater than zero")?;
        require((1..=300).contains(&database.timeout_secs), "database.timeout_secs must be in range 1..=300")?;

        let token = self.telegram.bot_token.expose_secret();
        require(!token.is_empty(), "telegram.bot_token is required. Ask @BotFather for one with /newbot")?;
        require(
            token.split_once(':').is_some_and(|(bot_id, key)| {
                !bot_id.is_empty() && bot_id.bytes().all(|byte| byte.is_ascii_digit()) && !key.is_empty()
            }),
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather",
        )?;
        require(is_http_url(&self.telegram.api_base_url), "telegram.api_base_url must be an http(s) URL")?;
        require(self.telegram.poll_timeout_secs <= 120, "telegram.poll_timeout_secs must be at most 120")?;

        let dispatch = &self.dispatch;
        if dispatch.enabled {
            require(
                dispatch.global_burst_limit > 0 && dispatch.global_window_ms > 0,
                "dispatch.global_burst_limit and dispatch.global_window_ms must be greater than zero",
            )?;
            require(
                dispatch.group_burst_limit > 0 && dispatch.group_window_ms > 0,
                "dispatch.group_burst_limit and dispatch.group_window_ms must be greater than zero",
            )?;
        }

        let hunt = &self.hunt;
        require(is_http_url(&hunt.geocoder_url), "hunt.geocoder_url must be an http(s) URL")?;
        require(
            (1..=60).contains(&hunt.geocode_timeout_secs),
            "hunt.geocode_timeout_secs must be in range 1..=60",
        )?;
        require(
            hunt.quest_map_url.as_deref().map_or(true, is_http_url),
            "hunt.quest_map_url must be an http(s) URL",
        )?;

        require(self.catalog.refresh_interval_secs > 0, "catalog.refresh_interval_secs must be greater than zero")?;
        require(self.server.health_check_port > 0, "server.health_check_port must be greater than zero")?;
        require(self.server.graceful_shutdown_secs > 0, "server.graceful_shutdown_secs must be greater than zero")?;

        require(
            matches!(
                self.logging.level.trim().to_ascii_lowercase().as_str(),
                "trace" | "debug" | "info" | "warn" | "error"
            ),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Replaces every `${VAR}` with the variable's value.
fn interpolate(raw: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value =
            env::var(var).map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Blank variables count as unset.
fn env_text(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_value<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Some(raw) = env_text(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: raw.clone() })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    /// Tests in this module share the process environment.
    static ENV: Mutex<()> = Mutex::new(());

    const TOKEN: &str = "123456:abc-DEF";

    /// Runs `body` with `vars` set, removing them again afterwards.
    fn with_env<R>(vars: &[(&str, &str)], body: impl FnOnce() -> R) -> R {
        let _guard = ENV.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = body();
        for (key, _) in vars {
            env::remove_var(key);
        }
        result
    }

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("questpal.toml");
        fs::write(&path, contents).expect("config written");
        (dir, path)
    }

    fn load_file(path: PathBuf) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
    }

    #[test]
    fn defaults_match_the_bot_api_flood_limits() {
        let config = with_env(&[("QUESTPAL_TELEGRAM_BOT_TOKEN", TOKEN)], || AppConfig::load(LoadOptions::default()))
            .expect("defaults load");

        assert!(config.dispatch.enabled);
        assert_eq!((config.dispatch.global_burst_limit, config.dispatch.global_window_ms), (29, 1017));
        assert_eq!((config.dispatch.group_burst_limit, config.dispatch.group_window_ms), (20, 60_000));
        assert_eq!(config.hunt.geocode_timeout_secs, 10);
        assert_eq!(config.hunt.input_delete_delay_secs, 5);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_sections_keep_defaults_and_interpolate_env() {
        let (_dir, path) = write_config(
            r#"
[telegram]
bot_token = "${QUESTPAL_TEST_TOKEN}"

[hunt]
quest_map_url = "https://map.example.org"
geocode_timeout_secs = 4
"#,
        );

        let config = with_env(&[("QUESTPAL_TEST_TOKEN", "987654:from-env")], || load_file(path))
            .expect("file loads");

        assert_eq!(config.telegram.bot_token.expose_secret(), "987654:from-env");
        assert_eq!(config.hunt.quest_map_url.as_deref(), Some("https://map.example.org"));
        assert_eq!(config.hunt.geocode_timeout_secs, 4);
        assert_eq!(config.hunt.input_delete_delay_secs, 5);
        assert_eq!(config.telegram.api_base_url, "https://api.telegram.org");
    }

    #[test]
    fn overrides_beat_env_and_env_beats_the_file() {
        let (_dir, path) = write_config(
            r#"
[database]
url = "sqlite://file.db"

[telegram]
bot_token = "222:file"

[dispatch]
group_burst_limit = 10
group_window_ms = 30000

[logging]
level = "warn"
"#,
        );

        let config = with_env(
            &[
                ("QUESTPAL_DATABASE_URL", "sqlite://env.db"),
                ("QUESTPAL_TELEGRAM_BOT_TOKEN", "111:env"),
                ("QUESTPAL_DISPATCH_GROUP_BURST_LIMIT", "15"),
                ("QUESTPAL_LOGGING_FORMAT", "JSON"),
            ],
            || {
                AppConfig::load(LoadOptions {
                    config_path: Some(path),
                    overrides: ConfigOverrides {
                        database_url: Some("sqlite://override.db".to_string()),
                        dispatch_enabled: Some(false),
                        catalog_feed_path: Some(PathBuf::from("quests.json")),
                        ..ConfigOverrides::default()
                    },
                })
            },
        )
        .expect("layers load");

        assert_eq!(config.database.url, "sqlite://override.db");
        assert_eq!(config.telegram.bot_token.expose_secret(), "111:env");
        assert_eq!(config.dispatch.group_burst_limit, 15);
        assert_eq!(config.dispatch.group_window_ms, 30_000);
        assert!(!config.dispatch.enabled);
        assert_eq!(config.catalog.feed_path, Some(PathBuf::from("quests.json")));
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn bot_token_problems_name_the_setting() {
        for token in ["", "not-a-token", "abc:def", "123:"] {
            let error = with_env(&[], || {
                AppConfig::load(LoadOptions {
                    overrides: ConfigOverrides {
                        telegram_bot_token: Some(token.to_string()),
                        ..ConfigOverrides::default()
                    },
                    ..LoadOptions::default()
                })
            })
            .expect_err("token rejected");

            assert!(
                matches!(&error, ConfigError::Validation(message) if message.contains("telegram.bot_token")),
                "{token:?} gave {error}"
            );
        }
    }

    #[test]
    fn unparsable_env_value_names_the_variable() {
        let error = with_env(
            &[("QUESTPAL_TELEGRAM_BOT_TOKEN", TOKEN), ("QUESTPAL_HUNT_GEOCODE_TIMEOUT_SECS", "soon")],
            || AppConfig::load(LoadOptions::default()),
        )
        .expect_err("bad number rejected");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, ref value }
                if key == "QUESTPAL_HUNT_GEOCODE_TIMEOUT_SECS" && value == "soon"
        ));
    }

    #[test]
    fn file_problems_are_reported_with_their_cause() {
        let (_dir, unset) = write_config("[telegram]\nbot_token = \"${QUESTPAL_TEST_NEVER_SET}\"\n");
        let error = with_env(&[], || load_file(unset)).expect_err("unset variable");
        assert!(matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "QUESTPAL_TEST_NEVER_SET"));

        let (_dir, open) = write_config("[telegram]\nbot_token = \"${TOKEN\"\n");
        let error = with_env(&[], || load_file(open)).expect_err("unterminated");
        assert!(matches!(error, ConfigError::UnterminatedInterpolation));

        let (dir, _) = write_config("");
        let missing = dir.path().join("absent.toml");
        let error = with_env(&[], || load_file(missing.clone())).expect_err("missing file");
        assert!(matches!(error, ConfigError::MissingConfigFile(ref path) if *path == missing));
    }

    #[test]
    fn bot_token_stays_out_of_debug_output() {
        let config = with_env(&[("QUESTPAL_TELEGRAM_BOT_TOKEN", "424242:hunter2")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect("config loads");

        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
