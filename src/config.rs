use serde::{Deserialize, Deserializer, de};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use url::Url;

use crate::error::{Error, Result};
use crate::parser::sku_from_digits;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const ENV_CONFIG_PATH: &str = "ZARA_WATCH_CONFIG";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/143.0.0.0 Safari/537.36";
const DEFAULT_COOKIE_JAR: &str = "jar.txt";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_TIME_SECS: u64 = 15;
const DEFAULT_SLEEP_SECONDS: f64 = 5.0;
const DEFAULT_SMTP_PORT: u16 = 465;

/// Picks the config file: CLI flag first, then `ZARA_WATCH_CONFIG`, then `./config.json`.
pub fn resolve_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    resolve_config_path_with(cli_path, |key| dotenvy::var(key).ok())
}

fn resolve_config_path_with<F>(cli_path: Option<PathBuf>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    cli_path
        .or_else(|| {
            lookup(ENV_CONFIG_PATH)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[derive(Debug, Deserialize)]
struct RawWatchConfig {
    product_id: u64,
    store_id: u64,
    #[serde(default, deserialize_with = "deserialize_skus")]
    watch_skus: Vec<u64>,
    #[serde(default)]
    valid_states: Vec<String>,
    product_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSku {
    Number(u64),
    Text(String),
}

// Same normalization as the availability parser: `100` and `"100"` are equal.
fn deserialize_skus<'de, D>(deserializer: D) -> std::result::Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<RawSku>::deserialize(deserializer)?
        .into_iter()
        .map(|sku| match sku {
            RawSku::Number(n) => Ok(n),
            RawSku::Text(s) => sku_from_digits(&s)
                .ok_or_else(|| de::Error::custom(format!("invalid sku {s:?} in watch_skus"))),
        })
        .collect()
}

/// What to watch: one product in one store, and which SKUs/states count as a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub product_id: u64,
    pub store_id: u64,
    pub watch_skus: BTreeSet<u64>,
    pub valid_states: BTreeSet<String>,
    pub product_url: Option<Url>,
}

impl WatchConfig {
    /// Reads and validates the JSON config file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is unreadable, is not valid JSON
    /// of the expected shape, has an invalid `product_url`, or leaves
    /// `watch_skus` or `valid_states` empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<WatchConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|err| match err {
            Error::ConfigParse { source, .. } => Error::ConfigParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parses a config document that did not come from a file.
    ///
    /// # Errors
    ///
    /// Same conditions as [`WatchConfig::load`], minus the file read.
    pub fn from_json(content: &str) -> Result<WatchConfig> {
        let raw: RawWatchConfig =
            serde_json::from_str(content).map_err(|source| Error::ConfigParse {
                path: "<inline>".to_string(),
                source,
            })?;

        let product_url = raw
            .product_url
            .filter(|u| !u.trim().is_empty())
            .map(|u| Url::parse(u.trim()))
            .transpose()?;

        let config = WatchConfig {
            product_id: raw.product_id,
            store_id: raw.store_id,
            watch_skus: raw.watch_skus.into_iter().collect(),
            valid_states: raw.valid_states.into_iter().collect(),
            product_url,
        };

        // An empty set here means the loop could never report anything
        if config.watch_skus.is_empty() {
            return Err(Error::Config("watch_skus must not be empty".into()));
        }
        if config.valid_states.is_empty() {
            return Err(Error::Config("valid_states must not be empty".into()));
        }

        Ok(config)
    }
}

/// Transport and pacing parameters, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub cookie_jar: PathBuf,
    pub connect_timeout_secs: u64,
    pub max_time_secs: u64,
    pub poll_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            cookie_jar: PathBuf::from(DEFAULT_COOKIE_JAR),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_time_secs: DEFAULT_MAX_TIME_SECS,
            poll_interval: Duration::from_secs_f64(DEFAULT_SLEEP_SECONDS),
        }
    }
}

impl PollSettings {
    /// # Errors
    ///
    /// Returns a configuration error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `CONNECT_TIMEOUT`, `MAX_TIME` or
    /// `SLEEP_SECONDS` is present but not a valid non-negative number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let sleep_seconds: f64 =
            parse_var(&lookup, "SLEEP_SECONDS")?.unwrap_or(DEFAULT_SLEEP_SECONDS);
        let poll_interval = Duration::try_from_secs_f64(sleep_seconds).map_err(|_| {
            Error::Config(format!(
                "SLEEP_SECONDS must be a non-negative number, got {sleep_seconds}"
            ))
        })?;

        Ok(Self {
            user_agent: lookup("UA").unwrap_or(defaults.user_agent),
            proxy: lookup("PROXY").filter(|p| !p.trim().is_empty()),
            cookie_jar: lookup("COOKIE_JAR")
                .filter(|p| !p.trim().is_empty())
                .map_or(defaults.cookie_jar, PathBuf::from),
            connect_timeout_secs: parse_var(&lookup, "CONNECT_TIMEOUT")?
                .unwrap_or(defaults.connect_timeout_secs),
            max_time_secs: parse_var(&lookup, "MAX_TIME")?.unwrap_or(defaults.max_time_secs),
            poll_interval,
        })
    }
}

/// SMTP credentials and recipients. Only built when every required value is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub to_emails: Vec<String>,
}

impl EmailSettings {
    /// # Errors
    ///
    /// Returns a configuration error if `SMTP_PORT` is set but not a port number.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Returns `Ok(None)` when email is not fully configured, so the watcher
    /// runs without notifications.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `SMTP_PORT` is set but not a port number.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();

        let smtp_server = get("SMTP_SERVER");
        let username = get("EMAIL_USERNAME");
        let password = get("EMAIL_PASSWORD");
        let to_emails: Vec<String> = get("TO_EMAIL")
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(String::from)
            .collect();
        let smtp_port = parse_var(&lookup, "SMTP_PORT")?.unwrap_or(DEFAULT_SMTP_PORT);

        if smtp_server.is_empty()
            || username.is_empty()
            || password.is_empty()
            || to_emails.is_empty()
        {
            return Ok(None);
        }

        Ok(Some(Self {
            smtp_server,
            smtp_port,
            username,
            password,
            to_emails,
        }))
    }
}

/// Optional path of the CSV event log (`CSV_LOG`).
pub fn csv_log_path() -> Option<PathBuf> {
    csv_log_path_with(|key| dotenvy::var(key).ok())
}

fn csv_log_path_with<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("CSV_LOG")
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={v:?} is invalid: {e}"))),
    }
}
