use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERVAL_ENV: &str = "WS_INTERVAL_SEC";
pub const ANY_ORIGIN: &str = "*";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Allowing every origin is only suitable for trusted networks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Environment variable consulted at the start of every stream.
    #[serde(default = "default_interval_env")]
    pub interval_env: String,
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors: CorsConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_env: default_interval_env(),
            default_interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
    #[error("некорректный интервал потока в {var}='{value}': ожидается число секунд > 0")]
    Interval { var: String, value: String },
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }

        validate_cors(&self.cors)?;
        validate_stream(&self.stream)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == ANY_ORIGIN)
    }
}

impl StreamConfig {
    /// Reads the interval from the process environment. Called once per stream, never cached.
    pub fn resolve_interval(&self) -> Result<Duration, ConfigError> {
        self.resolve_interval_with(|name| {
            std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
        })
    }

    pub fn resolve_interval_with(
        &self,
        lookup: impl FnOnce(&str) -> Option<String>,
    ) -> Result<Duration, ConfigError> {
        match lookup(&self.interval_env) {
            Some(raw) => parse_interval_secs(raw.trim()).ok_or(ConfigError::Interval {
                var: self.interval_env.clone(),
                value: raw,
            }),
            None => parse_interval_secs_f64(self.default_interval_secs).ok_or_else(|| {
                ConfigError::Interval {
                    var: "stream.default_interval_secs".to_string(),
                    value: self.default_interval_secs.to_string(),
                }
            }),
        }
    }
}

fn parse_interval_secs(raw: &str) -> Option<Duration> {
    raw.parse::<f64>().ok().and_then(parse_interval_secs_f64)
}

fn parse_interval_secs_f64(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

fn validate_cors(cfg: &CorsConfig) -> Result<(), ConfigError> {
    if cfg.allowed_origins.is_empty() {
        return Err(ConfigError::Validation(
            "cors.allowed_origins не должен быть пустым".to_string(),
        ));
    }
    if cfg.allows_any_origin() {
        if cfg.allowed_origins.len() > 1 {
            return Err(ConfigError::Validation(
                "cors.allowed_origins: '*' нельзя сочетать с явными источниками".to_string(),
            ));
        }
        return Ok(());
    }
    for origin in &cfg.allowed_origins {
        if origin.trim().is_empty() || HeaderValue::from_str(origin).is_err() {
            return Err(ConfigError::Validation(format!(
                "cors.allowed_origins: некорректный источник '{origin}'"
            )));
        }
    }
    Ok(())
}

fn validate_stream(cfg: &StreamConfig) -> Result<(), ConfigError> {
    if cfg.interval_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "stream.interval_env не должен быть пустым".to_string(),
        ));
    }
    if parse_interval_secs_f64(cfg.default_interval_secs).is_none() {
        return Err(ConfigError::Validation(
            "stream.default_interval_secs должно быть > 0".to_string(),
        ));
    }
    Ok(())
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![ANY_ORIGIN.to_string()]
}

fn default_interval_env() -> String {
    DEFAULT_INTERVAL_ENV.to_string()
}

const fn default_interval_secs() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_cfg() -> StreamConfig {
        StreamConfig {
            interval_env: "TEST_INTERVAL_ENV".to_string(),
            default_interval_secs: 1.0,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("конфигурация по умолчанию должна быть валидной");
        assert!(cfg.cors.allows_any_origin());
        assert_eq!(cfg.stream.interval_env, "WS_INTERVAL_SEC");
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("разбор примера");
        cfg.validate().expect("пример должен быть валидным");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("listen: \"0.0.0.0:9000\"\n").unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:9000");
        assert_eq!(cfg.stream.default_interval_secs, 1.0);
        assert_eq!(cfg.cors.allowed_origins, vec!["*".to_string()]);
    }

    #[test]
    fn invalid_listen_is_rejected() {
        let cfg = Config {
            listen: "localhost".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn wildcard_cannot_be_mixed_with_origins() {
        let mut cfg = Config::default();
        cfg.cors.allowed_origins = vec!["*".to_string(), "https://dash.local".to_string()];
        assert!(cfg.validate().is_err());

        cfg.cors.allowed_origins = vec!["https://dash.local".to_string()];
        cfg.validate().expect("явный источник допустим");
        assert!(!cfg.cors.allows_any_origin());
    }

    #[test]
    fn non_positive_default_interval_is_rejected() {
        let mut cfg = Config::default();
        cfg.stream.default_interval_secs = 0.0;
        assert!(cfg.validate().is_err());
        cfg.stream.default_interval_secs = f64::INFINITY;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn interval_defaults_when_env_unset() {
        let interval = stream_cfg().resolve_interval_with(|_| None).unwrap();
        assert_eq!(interval, Duration::from_secs(1));
    }

    #[test]
    fn interval_is_read_from_env_value() {
        let interval = stream_cfg()
            .resolve_interval_with(|name| {
                assert_eq!(name, "TEST_INTERVAL_ENV");
                Some(" 0.25 ".to_string())
            })
            .unwrap();
        assert_eq!(interval, Duration::from_millis(250));
    }

    #[test]
    fn invalid_interval_values_fail() {
        for raw in ["abc", "", "-1", "0", "inf", "NaN", "1e400"] {
            let err = stream_cfg()
                .resolve_interval_with(|_| Some(raw.to_string()))
                .expect_err(raw);
            assert!(matches!(err, ConfigError::Interval { .. }), "{raw}");
        }
    }

    #[test]
    fn interval_is_resolved_from_process_env() {
        let cfg = StreamConfig {
            interval_env: "HEALTHD_CONFIG_TEST_INTERVAL".to_string(),
            default_interval_secs: 2.0,
        };
        std::env::remove_var("HEALTHD_CONFIG_TEST_INTERVAL");
        assert_eq!(cfg.resolve_interval().unwrap(), Duration::from_secs(2));
        std::env::set_var("HEALTHD_CONFIG_TEST_INTERVAL", "0.5");
        assert_eq!(cfg.resolve_interval().unwrap(), Duration::from_millis(500));
        std::env::remove_var("HEALTHD_CONFIG_TEST_INTERVAL");
    }
}
