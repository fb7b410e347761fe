use crate::error::{AdvisorError, Result};
use dialoguer::{Input, Password};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options file written by the Home Assistant supervisor
pub const ADDON_OPTIONS_PATH: &str = "/data/options.json";

/// Persistent data directory inside the add-on container
pub const ADDON_DATA_DIR: &str = "/data";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub openweathermap: OpenWeatherMapConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct OpenWeatherMapConfig {
    pub api_key: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Days of history folded into the soil moisture deficit
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

fn default_history_days() -> u32 {
    7
}

impl std::fmt::Debug for OpenWeatherMapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherMapConfig")
            .field("api_key", &"[REDACTED]")
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("history_days", &self.history_days)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_topic_base")]
    pub topic_base: String,
    /// Also publish temperature, soil deficit and rain forecast
    #[serde(default)]
    pub extended_topics: bool,
    /// Seconds to wait for broker acknowledgements
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_broker() -> String {
    "core-mosquitto".into()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "irrigation_advisor".into()
}

fn default_topic_base() -> String {
    "irrigation/scheduler".into()
}

fn default_publish_timeout() -> u64 {
    10
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            broker: default_broker(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
            topic_base: default_topic_base(),
            extended_topics: false,
            publish_timeout_secs: default_publish_timeout(),
        }
    }
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("enabled", &self.enabled)
            .field("broker", &self.broker)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("topic_base", &self.topic_base)
            .field("extended_topics", &self.extended_topics)
            .field("publish_timeout_secs", &self.publish_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdvisorConfig {
    /// Look-back window for recent irrigation
    #[serde(default = "default_suppression_window")]
    pub suppression_window_hours: i64,
    /// Entries kept by the JSON state file
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,
}

fn default_suppression_window() -> i64 {
    6
}

fn default_max_log_entries() -> usize {
    50
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            suppression_window_hours: default_suppression_window(),
            max_log_entries: default_max_log_entries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Run advise + publish on this interval while serving
    #[serde(default)]
    pub auto_publish_interval_minutes: Option<u64>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            auto_publish_interval_minutes: None,
        }
    }
}

/// Flat options as written by the add-on supervisor
#[derive(Debug, Clone, Deserialize)]
struct AddonOptions {
    api_key: String,
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon")]
    longitude: f64,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    history_days: Option<u32>,
    #[serde(default)]
    mqtt_enabled: Option<bool>,
    #[serde(default)]
    mqtt_broker: Option<String>,
    #[serde(default)]
    mqtt_port: Option<u16>,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    mqtt_topic_base: Option<String>,
    #[serde(default)]
    mqtt_extended_topics: Option<bool>,
    #[serde(default)]
    storage_backend: Option<StorageBackend>,
    #[serde(default)]
    server_port: Option<u16>,
    #[serde(default)]
    auto_publish_interval_minutes: Option<u64>,
}

impl From<AddonOptions> for Config {
    fn from(opts: AddonOptions) -> Self {
        if let Some(units) = opts.units.as_deref() {
            if units != "metric" {
                tracing::warn!(units, "Ignoring configured units, metric is always used");
            }
        }

        let defaults = MqttConfig::default();
        Config {
            openweathermap: OpenWeatherMapConfig {
                api_key: opts.api_key,
                latitude: opts.latitude,
                longitude: opts.longitude,
                history_days: opts.history_days.unwrap_or_else(default_history_days),
            },
            mqtt: MqttConfig {
                enabled: opts.mqtt_enabled.unwrap_or(defaults.enabled),
                broker: opts.mqtt_broker.unwrap_or(defaults.broker),
                port: opts.mqtt_port.unwrap_or(defaults.port),
                username: opts.mqtt_username.filter(|u| !u.is_empty()),
                password: opts.mqtt_password.filter(|p| !p.is_empty()),
                topic_base: opts.mqtt_topic_base.unwrap_or(defaults.topic_base),
                extended_topics: opts.mqtt_extended_topics.unwrap_or(defaults.extended_topics),
                ..defaults
            },
            advisor: AdvisorConfig::default(),
            storage: StorageConfig {
                backend: opts.storage_backend.unwrap_or_default(),
            },
            server: ServerConfig {
                port: opts.server_port.unwrap_or_else(default_server_port),
                auto_publish_interval_minutes: opts.auto_publish_interval_minutes,
                ..ServerConfig::default()
            },
        }
    }
}

impl Config {
    pub fn load(config_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => p,
            None => Self::find_config_path()?,
        };

        if !config_path.exists() {
            return Err(AdvisorError::Config(format!(
                "Config file not found at {:?}. Run `irrigation-advisor init` to set up.",
                config_path
            )));
        }

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| AdvisorError::Config(format!("Failed to read config: {}", e)))?;

        // Substitute environment variables
        let config_str = Self::substitute_env_vars(&config_str);

        let config = if is_json(&config_path) {
            Self::from_addon_options(&config_str)?
        } else {
            Self::from_yaml(&config_str)?
        };

        config.validate()?;
        tracing::debug!(path = %config_path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| AdvisorError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Parse the flat add-on options JSON
    pub fn from_addon_options(content: &str) -> Result<Self> {
        let opts: AddonOptions = serde_json::from_str(content)
            .map_err(|e| AdvisorError::Config(format!("Failed to parse add-on options: {}", e)))?;
        Ok(opts.into())
    }

    pub fn validate(&self) -> Result<()> {
        let owm = &self.openweathermap;
        if owm.api_key.trim().is_empty() {
            return Err(AdvisorError::Config(
                "openweathermap.api_key must not be empty".into(),
            ));
        }
        if !(-90.0..=90.0).contains(&owm.latitude) || !(-180.0..=180.0).contains(&owm.longitude) {
            return Err(AdvisorError::Config(format!(
                "Invalid coordinates: {}, {}",
                owm.latitude, owm.longitude
            )));
        }
        if owm.history_days == 0 {
            return Err(AdvisorError::Config(
                "openweathermap.history_days must be at least 1".into(),
            ));
        }
        if self.advisor.suppression_window_hours <= 0 {
            return Err(AdvisorError::Config(
                "advisor.suppression_window_hours must be positive".into(),
            ));
        }
        if self.server.auto_publish_interval_minutes == Some(0) {
            return Err(AdvisorError::Config(
                "server.auto_publish_interval_minutes must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Search for the config in standard locations.
    /// Returns the path of the first found config, or the XDG default path if none found.
    fn find_config_path() -> Result<PathBuf> {
        // Running as a Home Assistant add-on
        let addon_options = PathBuf::from(ADDON_OPTIONS_PATH);
        if addon_options.exists() {
            return Ok(addon_options);
        }

        let local_config = PathBuf::from("config/config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        // Return XDG path as the default (will trigger "not found" in load)
        Self::default_config_path()
    }

    /// Returns true if a config file can be found in any standard location.
    pub fn exists(config_override: Option<&PathBuf>) -> bool {
        match config_override {
            Some(p) => p.exists(),
            None => Self::find_config_path()
                .map(|p| p.exists())
                .unwrap_or(false),
        }
    }

    /// Default path for writing new config files (~/.config/irrigation-advisor/config.yaml).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AdvisorError::Config("Cannot determine config directory".into()))?
            .join("irrigation-advisor");
        Ok(config_dir.join("config.yaml"))
    }

    /// Run interactive setup prompts and write config to disk.
    /// Returns the loaded Config and the path it was written to.
    pub fn setup_interactive() -> Result<(Self, PathBuf)> {
        println!();
        println!("Let's set up the irrigation advisor!");
        println!();

        // --- OpenWeatherMap ---
        println!("OpenWeatherMap (One Call 3.0 subscription required for history)");
        let api_key: String = Password::new()
            .with_prompt("  API key")
            .interact()
            .map_err(input_error)?;

        let latitude: f64 = Input::new()
            .with_prompt("  Latitude")
            .default(47.4979)
            .interact_text()
            .map_err(input_error)?;

        let longitude: f64 = Input::new()
            .with_prompt("  Longitude")
            .default(19.0402)
            .interact_text()
            .map_err(input_error)?;

        println!();

        // --- MQTT (optional) ---
        println!("MQTT broker (leave host blank to disable publishing)");
        let broker: String = Input::new()
            .with_prompt("  Host")
            .default(default_broker())
            .allow_empty(true)
            .interact_text()
            .map_err(input_error)?;

        let mqtt = if broker.is_empty() {
            MqttConfig {
                enabled: false,
                ..MqttConfig::default()
            }
        } else {
            let port: u16 = Input::new()
                .with_prompt("  Port")
                .default(default_mqtt_port())
                .interact_text()
                .map_err(input_error)?;

            let username: String = Input::new()
                .with_prompt("  Username (blank for none)")
                .default(String::new())
                .allow_empty(true)
                .interact_text()
                .map_err(input_error)?;

            let password = if username.is_empty() {
                None
            } else {
                let password: String = Password::new()
                    .with_prompt("  Password")
                    .allow_empty_password(true)
                    .interact()
                    .map_err(input_error)?;
                Some(password)
            };

            let topic_base: String = Input::new()
                .with_prompt("  Topic base")
                .default(default_topic_base())
                .interact_text()
                .map_err(input_error)?;

            MqttConfig {
                broker,
                port,
                username: Some(username).filter(|u| !u.is_empty()),
                password,
                topic_base,
                ..MqttConfig::default()
            }
        };

        println!();

        let config = Config {
            openweathermap: OpenWeatherMapConfig {
                api_key,
                latitude,
                longitude,
                history_days: default_history_days(),
            },
            mqtt,
            advisor: AdvisorConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        };
        config.validate()?;

        // Write to default config path
        let config_path = Self::default_config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| AdvisorError::Config(format!("Failed to serialize config: {}", e)))?;

        // Write with a header comment
        let content = format!(
            "# Irrigation Advisor Configuration\n# Generated by `irrigation-advisor init`\n# Environment variable substitution (${{VAR}}) is supported.\n\n{}",
            yaml
        );
        std::fs::write(&config_path, content)?;

        println!("Configuration saved to {}", config_path.display());
        println!();

        Ok((config, config_path))
    }

    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        // Find all ${VAR_NAME} patterns and substitute
        let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") else {
            return result;
        };

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(placeholder, &value);
            }
        }

        result
    }

    pub fn data_dir(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        // CLI override takes priority
        if let Some(dir) = data_dir_override {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }

        // Then check env var
        if let Ok(dir) = std::env::var("IRRIGATION_DATA_DIR") {
            let p = PathBuf::from(dir);
            std::fs::create_dir_all(&p)?;
            return Ok(p);
        }

        // Shared add-on volume
        let addon_dir = PathBuf::from(ADDON_DATA_DIR);
        if addon_dir.is_dir() {
            return Ok(addon_dir);
        }

        // Use XDG data directory
        let data_dir = dirs::data_dir()
            .ok_or_else(|| AdvisorError::Config("Cannot determine data directory".into()))?
            .join("irrigation-advisor");

        std::fs::create_dir_all(&data_dir)?;
        Ok(data_dir)
    }

    pub fn db_path(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        Ok(Self::data_dir(data_dir_override)?.join("irrigation.db"))
    }

    pub fn state_file_path(data_dir_override: Option<&PathBuf>) -> Result<PathBuf> {
        Ok(Self::data_dir(data_dir_override)?.join("irrigation_state.json"))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn input_error(e: dialoguer::Error) -> AdvisorError {
    AdvisorError::Config(format!("Input error: {}", e))
}
