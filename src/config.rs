use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Deployment environment; selects which `<env>.yaml` is layered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration file found at: {}", path.display())]
    Missing { path: PathBuf },
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Merged configuration is invalid: {0}")]
    Invalid(#[source] serde_yaml::Error),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub slack: SlackConfig,
    pub google: GoogleConfig,
    pub records: RecordsConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    pub bot_user: TokenConfig,
    pub outgoing_webhook: OutgoingWebhookConfig,
    pub traffic_command: TokenConfig,
    pub tinnitus_command: TokenConfig,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutgoingWebhookConfig {
    pub token: String,
    /// Keyed by the Slack user name whose messages are inspected.
    #[serde(default)]
    pub matchers: HashMap<String, MatcherConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatcherConfig {
    pub text_contains: Vec<String>,
    pub output_channel: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    pub directions: DirectionsConfig,
    pub static_map: StaticMapConfig,
    #[serde(default)]
    pub location_aliases: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectionsConfig {
    pub key: String,
    #[serde(default = "default_directions_url")]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticMapConfig {
    pub key: String,
    #[serde(default = "default_static_map_url")]
    pub url_base: String,
    pub size: MapSize,
    /// `{}` is replaced by the encoded route polyline.
    pub path_format: String,
    /// `{}` placeholders take the marker label, then the location.
    pub marker_format: String,
    /// Public URL of a stored image; `{}` is replaced by the file name.
    pub url_format: String,
    pub image_directory: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct MapSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    pub tinnitus: RecordFileConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordFileConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_all_origins: bool,
    #[serde(default)]
    pub allow_origins_list: Vec<String>,
    #[serde(default)]
    pub allow_all_methods: bool,
    #[serde(default)]
    pub allow_all_headers: bool,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_directions_url() -> String {
    "https://maps.googleapis.com/maps/api/directions/json".to_string()
}

fn default_static_map_url() -> String {
    "https://maps.googleapis.com/maps/api/staticmap".to_string()
}

impl Config {
    /// Load `default.yaml`, `<env>.yaml` and `secret.yaml` from `config_dir`
    /// and merge them in that order. Every file must exist.
    pub fn load(env: Environment, config_dir: &Path) -> Result<Self, ConfigError> {
        let env_file = format!("{}.yaml", env);
        let mut layers = Vec::with_capacity(3);
        for name in ["default.yaml", env_file.as_str(), "secret.yaml"] {
            layers.push(read_layer(&config_dir.join(name))?);
        }

        let merged = merge_many(layers);
        let config: Config = serde_yaml::from_value(merged).map_err(ConfigError::Invalid)?;

        info!(
            env = %env,
            dir = %config_dir.display(),
            matchers = config.slack.outgoing_webhook.matchers.len(),
            aliases = config.google.location_aliases.len(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

fn read_layer(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Read config layer");
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge layers left to right. The first layer to set a key keeps it;
/// nested mappings are merged recursively.
pub fn merge_many(layers: impl IntoIterator<Item = Value>) -> Value {
    layers
        .into_iter()
        .fold(Value::Mapping(Mapping::new()), merge_values)
}

pub fn merge_values(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Mapping(mut base), Value::Mapping(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => {
                        let current = std::mem::take(existing);
                        *existing = merge_values(current, value);
                    }
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            Value::Mapping(base)
        }
        (base, _) => base,
    }
}

/// `$XDG_CONFIG_HOME/fanghorn`, falling back to `~/.config/fanghorn`.
pub fn default_config_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("fanghorn")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    pub(crate) const DEFAULT_YAML: &str = r##"
slack:
  outgoing_webhook:
    matchers:
      alice:
        text_contains: ["deploy", "outage"]
        output_channel: "#alerts"
google:
  static_map:
    url_base: "https://maps.example.com/staticmap"
    size:
      width: 640
      height: 480
    path_format: "enc:{}"
    marker_format: "label:{}|{}"
  location_aliases:
    home: "1 Main St"
    work: "500 Office Park"
cors:
  allow_all_origins: true
"##;

    pub(crate) const LOCAL_YAML: &str = r##"
google:
  static_map:
    url_format: "http://localhost:8080/images/{}"
    image_directory: "/tmp/fanghorn-images"
records:
  tinnitus:
    path: "/tmp/tinnitus.jsonl"
"##;

    pub(crate) const SECRET_YAML: &str = r##"
slack:
  bot_user:
    token: "xoxb-bot"
  outgoing_webhook:
    token: "webhook-secret"
  traffic_command:
    token: "traffic-secret"
  tinnitus_command:
    token: "tinnitus-secret"
google:
  directions:
    key: "directions-key"
  static_map:
    key: "static-key"
"##;

    pub(crate) fn sample_config() -> Config {
        let merged = merge_many([yaml(DEFAULT_YAML), yaml(LOCAL_YAML), yaml(SECRET_YAML)]);
        serde_yaml::from_value(merged).unwrap()
    }

    fn write_layers(dir: &Path, env_file: &str) {
        std::fs::write(dir.join("default.yaml"), DEFAULT_YAML).unwrap();
        std::fs::write(dir.join(env_file), LOCAL_YAML).unwrap();
        std::fs::write(dir.join("secret.yaml"), SECRET_YAML).unwrap();
    }

    #[test]
    fn test_first_writer_wins() {
        let merged = merge_many([yaml("a: 1"), yaml("a: 2")]);
        assert_eq!(merged, yaml("a: 1"));
    }

    #[test]
    fn test_nested_mappings_merge_recursively() {
        let merged = merge_many([yaml("a: {b: 1}"), yaml("a: {c: 2}")]);
        assert_eq!(merged, yaml("a: {b: 1, c: 2}"));
    }

    #[test]
    fn test_scalar_does_not_replace_mapping() {
        let merged = merge_values(yaml("a: {b: 1}"), yaml("a: 3"));
        assert_eq!(merged, yaml("a: {b: 1}"));
    }

    #[test]
    fn test_empty_layer_is_ignored() {
        let merged = merge_many([yaml("a: 1"), Value::Null, yaml("b: 2")]);
        assert_eq!(merged, yaml("{a: 1, b: 2}"));
    }

    #[test]
    fn test_load_merges_three_layers() {
        let dir = TempDir::new().unwrap();
        write_layers(dir.path(), "local.yaml");

        let config = Config::load(Environment::Local, dir.path()).unwrap();
        assert_eq!(config.slack.bot_user.token, "xoxb-bot");
        assert_eq!(config.slack.api_base, "https://slack.com/api");
        assert_eq!(config.google.static_map.size.width, 640);
        assert_eq!(
            config.google.static_map.url_format,
            "http://localhost:8080/images/{}"
        );
        assert_eq!(config.google.location_aliases["home"], "1 Main St");
        assert_eq!(
            config.slack.outgoing_webhook.matchers["alice"].output_channel,
            "#alerts"
        );
        assert!(config.cors.allow_all_origins);
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_layers(dir.path(), "local.yaml");

        let err = Config::load(Environment::Prod, dir.path()).unwrap_err();
        match err {
            ConfigError::Missing { path } => assert!(path.ends_with("prod.yaml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_incomplete_config_is_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("default.yaml"), DEFAULT_YAML).unwrap();
        std::fs::write(dir.path().join("local.yaml"), "").unwrap();
        std::fs::write(dir.path().join("secret.yaml"), "").unwrap();

        let err = Config::load(Environment::Local, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/var/log/records.jsonl");
        assert_eq!(expand_home(plain), plain.to_path_buf());

        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home(Path::new("~/records.jsonl")),
                home.join("records.jsonl")
            );
        }
    }
}
